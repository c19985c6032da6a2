//! WorkerPool - event 処理ループと reaper の起動・停止
//!
//! # フロー
//! 1. `claim_next()` で lease 発行 + Event 取得
//! 2. `process()` で rule 照合 → dispatch → decide → finalize
//! 3. 対象が無ければ emit 通知か `poll_interval` まで待機
//! 4. shutdown は watch channel で全 worker に通知

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};

use super::engine::Engine;
use super::reaper_loop::reaper_loop;
use crate::domain::ErrorKind;

/// Worker group handle.
///
/// `request_shutdown` stops workers from taking new events; an attempt already in
/// flight runs to completion.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `config.worker_count` workers and one reaper.
    pub fn spawn(engine: Arc<Engine>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let n = engine.config().worker_count;

        let mut joins = Vec::with_capacity(n + 1);
        for worker_id in 0..n {
            let engine = Arc::clone(&engine);
            let rx = shutdown_rx.clone();
            let name = format!("worker-{worker_id}");
            let span = tracing::info_span!("worker", worker = %name);
            joins.push(tokio::spawn(
                async move { worker_loop(name, engine, rx).await }.instrument(span),
            ));
        }

        let rx = shutdown_rx.clone();
        joins.push(tokio::spawn(
            reaper_loop(engine, rx).instrument(tracing::info_span!("reaper")),
        ));

        info!(workers = n, "worker pool started");
        Self { shutdown_tx, joins }
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for every worker.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }
        info!("worker pool stopped");
    }
}

async fn worker_loop(name: String, engine: Arc<Engine>, mut shutdown_rx: watch::Receiver<bool>) {
    let idle = engine.config().poll_interval();

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match engine.run_once(&name).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(err) if err.kind() == ErrorKind::Infrastructure => {
                error!(error = %err, "event store unavailable; backing off");
            }
            Err(err) => {
                error!(error = %err, "attempt aborted");
            }
        }

        // nothing claimable: wait for an emit, the poll tick, or shutdown
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender dropped: the pool handle is gone
                if changed.is_err() {
                    break;
                }
            }
            _ = engine.wait_for_work() => {}
            _ = tokio::time::sleep(idle) => {}
        }
    }
}
