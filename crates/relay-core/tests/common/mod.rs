#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use relay_core::domain::{ActionOutcome, Event};
use relay_core::ports::FixedClock;
use relay_core::rules::defaults::SEED_ACTIONS;
use relay_core::{ActionHandler, Engine, EngineBuilder, EngineConfig, HandlerError};

pub type Step = Result<ActionOutcome, HandlerError>;

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

/// Ordered log of handler invocations, shared by every scripted handler.
#[derive(Default)]
pub struct Calls(Mutex<Vec<String>>);

impl Calls {
    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, action: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|a| *a == action).count()
    }

    fn push(&self, action: &str) {
        self.0.lock().unwrap().push(action.to_string());
    }
}

/// Plays back `script` one step per call, then succeeds forever.
pub struct Scripted {
    name: String,
    calls: Arc<Calls>,
    script: Mutex<VecDeque<Step>>,
}

impl Scripted {
    pub fn new(name: &str, calls: Arc<Calls>, script: Vec<Step>) -> Self {
        Self {
            name: name.to_string(),
            calls,
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl ActionHandler for Scripted {
    async fn execute(&self, _event: &Event) -> Result<ActionOutcome, HandlerError> {
        self.calls.push(&self.name);
        let step = self.script.lock().unwrap().pop_front();
        step.unwrap_or_else(|| Ok(ActionOutcome::success()))
    }
}

pub struct Sleepy(pub Duration);

#[async_trait]
impl ActionHandler for Sleepy {
    async fn execute(&self, _event: &Event) -> Result<ActionOutcome, HandlerError> {
        tokio::time::sleep(self.0).await;
        Ok(ActionOutcome::success())
    }
}

pub struct Panics;

#[async_trait]
impl ActionHandler for Panics {
    async fn execute(&self, _event: &Event) -> Result<ActionOutcome, HandlerError> {
        panic!("handler blew up");
    }
}

pub fn transient(detail: &str) -> Step {
    Err(HandlerError::Transient(detail.to_string()))
}

pub fn permanent(detail: &str) -> Step {
    Err(HandlerError::Permanent(detail.to_string()))
}

pub struct Harness {
    pub engine: Engine,
    pub clock: FixedClock,
    pub calls: Arc<Calls>,
}

impl Harness {
    /// Engine with the seed rules and a scripted handler for every seed action.
    pub fn new(scripts: Vec<(&str, Vec<Step>)>) -> Self {
        Self::with(EngineConfig::default(), scripts, |b| b)
    }

    pub fn with(
        config: EngineConfig,
        scripts: Vec<(&str, Vec<Step>)>,
        customize: impl FnOnce(EngineBuilder) -> EngineBuilder,
    ) -> Self {
        let clock = FixedClock::new(start());
        let calls = Arc::new(Calls::default());
        let mut scripts: HashMap<&str, Vec<Step>> = scripts.into_iter().collect();

        let mut builder = EngineBuilder::new()
            .config(config)
            .clock(Arc::new(clock.clone()));
        for action in SEED_ACTIONS {
            let script = scripts.remove(action).unwrap_or_default();
            let handler = Scripted::new(action, Arc::clone(&calls), script);
            builder = builder.handler(action, Arc::new(handler)).unwrap();
        }

        let engine = customize(builder).build().unwrap();
        Self {
            engine,
            clock,
            calls,
        }
    }

    /// Moves the clock past any backoff and runs whatever became eligible.
    pub async fn advance_and_run(&self, by: chrono::Duration) -> usize {
        self.clock.advance(by);
        self.engine.run_until_idle().await.unwrap()
    }
}
