use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tokio::time::{Duration, sleep};
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_core::domain::{ActionOutcome, Event};
use relay_core::ports::{Clock, EventStore, SystemClock};
use relay_core::rules::defaults::{SEED_ACTIONS, UPDATE_ARRIS_MEMORY};
use relay_core::store::InMemoryEventStore;
use relay_core::{ActionHandler, EngineBuilder, EngineConfig, HandlerError, WorkerPool};

/// Logs the action and succeeds.
struct LogOnly {
    action: &'static str,
}

#[async_trait]
impl ActionHandler for LogOnly {
    async fn execute(&self, event: &Event) -> Result<ActionOutcome, HandlerError> {
        info!(action = self.action, event_id = %event.id(), source_id = event.source_id(), "action ran");
        Ok(ActionOutcome::success())
    }
}

/// Fails transiently a fixed number of times, then succeeds.
struct Flaky {
    remaining_failures: AtomicU32,
}

#[async_trait]
impl ActionHandler for Flaky {
    async fn execute(&self, event: &Event) -> Result<ActionOutcome, HandlerError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(HandlerError::Transient(format!(
                "memory service unavailable (left={left})"
            )));
        }
        info!(event_id = %event.id(), "memory updated");
        Ok(ActionOutcome::success())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = EngineConfig::from_env()?;
    info!(workers = config.worker_count, journal = ?config.journal_path, "starting relay");

    let store: Arc<dyn EventStore> = match &config.journal_path {
        Some(path) => Arc::new(InMemoryEventStore::open(path, SystemClock.now()).await?),
        None => Arc::new(InMemoryEventStore::new()),
    };

    let mut builder = EngineBuilder::new().config(config).store(store);
    for action in SEED_ACTIONS {
        let handler: Arc<dyn ActionHandler> = if action == UPDATE_ARRIS_MEMORY {
            Arc::new(Flaky {
                remaining_failures: AtomicU32::new(1),
            })
        } else {
            Arc::new(LogOnly { action })
        };
        builder = builder.handler(action, handler)?;
    }
    let engine = Arc::new(builder.build()?);
    let pool = WorkerPool::spawn(Arc::clone(&engine));

    engine
        .emit(
            "CREATOR_REGISTERED",
            json!({"name": "Ada", "email": "ada@example.com"}),
            "creator",
            "c-1",
            Some("u-1"),
        )
        .await?;
    engine
        .emit(
            "PROPOSAL_SUBMITTED",
            json!({"proposal_id": "pr-7", "title": "Spring collab"}),
            "proposal",
            "pr-7",
            Some("u-1"),
        )
        .await?;
    engine
        .emit(
            "SUBSCRIPTION_UPGRADED",
            json!({"old_tier": "basic", "new_tier": "pro"}),
            "subscription",
            "s-3",
            Some("u-1"),
        )
        .await?;

    loop {
        let counts = engine.counts().await?;
        if counts.is_settled() {
            break;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            _ = sleep(Duration::from_millis(200)) => {}
        }
    }

    pool.shutdown_and_join().await;

    let counts = engine.counts().await?;
    println!("{}", serde_json::to_string_pretty(&counts)?);
    for rule in engine.rules().list() {
        println!(
            "{} {:<28} triggered={}",
            rule.id, rule.name, rule.times_triggered
        );
    }
    Ok(())
}
