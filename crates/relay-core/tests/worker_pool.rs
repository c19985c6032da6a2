mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{Calls, Scripted};
use relay_core::domain::EventStatus;
use relay_core::rules::defaults::SEED_ACTIONS;
use relay_core::store::EventFilter;
use relay_core::{EngineBuilder, EngineConfig, WorkerPool};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_drains_emitted_events_and_shuts_down() {
    let config = EngineConfig {
        worker_count: 3,
        poll_interval_ms: 20,
        reap_interval_ms: 50,
        ..EngineConfig::default()
    };
    let calls = Arc::new(Calls::default());
    let mut builder = EngineBuilder::new().config(config);
    for action in SEED_ACTIONS {
        builder = builder
            .handler(action, Arc::new(Scripted::new(action, Arc::clone(&calls), vec![])))
            .unwrap();
    }
    let engine = Arc::new(builder.build().unwrap());
    let pool = WorkerPool::spawn(Arc::clone(&engine));

    for n in 0..10 {
        engine
            .emit(
                "CREATOR_REGISTERED",
                json!({"name": format!("creator-{n}")}),
                "creator",
                &format!("c-{n}"),
                None,
            )
            .await
            .unwrap();
    }

    let drained = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if engine.counts().await.unwrap().completed == 10 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(drained.is_ok(), "workers did not drain the store");

    pool.shutdown_and_join().await;

    let counts = engine.counts().await.unwrap();
    assert!(counts.is_settled());
    assert_eq!(counts.total(), 10);
    // each event ran its three actions exactly once
    assert_eq!(calls.all().len(), 30);

    let completed = engine
        .list_events(&EventFilter::with_status(EventStatus::Completed))
        .await
        .unwrap();
    assert!(completed.iter().all(|e| e.actions_triggered().len() == 3));
}
