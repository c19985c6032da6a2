//! ReaperLoop - Lease 期限切れの回収
//!
//! # フロー
//! 1. `reap_interval` ごとに `Engine::reap()` を呼ぶ
//! 2. 期限切れ lease を持つ event を processing → pending へ戻す
//! 3. retry は消費しない（worker の crash / hang は event の失敗ではない）

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use super::engine::Engine;

pub(crate) async fn reaper_loop(engine: Arc<Engine>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval(engine.config().reap_interval());
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tick.tick() => {
                match engine.reap().await {
                    Ok(reaped) if !reaped.is_empty() => {
                        info!(count = reaped.len(), "reaped expired leases");
                    }
                    Ok(_) => {}
                    Err(err) => error!(error = %err, "lease reaping failed"),
                }
            }
        }

        if *shutdown_rx.borrow() {
            break;
        }
    }
}
