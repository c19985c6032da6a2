//! EngineBuilder - Engine の構築とワイヤリング
//!
//! # Fail-fast
//! - `handler()` で action ごとの ActionHandler を登録（二重登録はエラー）
//! - `build()` 時に「active rule の action ⊆ 登録済み handler」をチェック
//! - 不足があれば `BuildError::MissingHandlers` を返す

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Notify;

use super::dispatcher::Dispatcher;
use super::engine::Engine;
use crate::config::{ConfigError, EngineConfig};
use crate::domain::{ActionId, Decider, DefaultDecider, EngineError};
use crate::handlers::{ActionHandler, HandlerRegistry};
use crate::ports::{Clock, EventStore, IdGenerator, SystemClock, UlidGenerator};
use crate::rules::{RuleMatcher, RuleRegistry};
use crate::store::InMemoryEventStore;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("missing handlers for actions {0:?} referenced by active rules")]
    MissingHandlers(Vec<ActionId>),

    #[error("handler for action '{0}' is already registered")]
    DuplicateHandler(ActionId),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("rule setup failed: {0}")]
    Rules(#[from] EngineError),
}

/// # Example
/// ```ignore
/// let engine = EngineBuilder::new()
///     .config(config)
///     .handler("log_event", Arc::new(LogEvent))?
///     .build()?;
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    handlers: HandlerRegistry,
    rules: Option<Arc<RuleRegistry>>,
    store: Option<Arc<dyn EventStore>>,
    clock: Option<Arc<dyn Clock>>,
    decider: Option<Arc<dyn Decider>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            handlers: HandlerRegistry::new(),
            rules: None,
            store: None,
            clock: None,
            decider: None,
            ids: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn handler(
        mut self,
        action: impl Into<ActionId>,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<Self, BuildError> {
        self.handlers.register(action, handler)?;
        Ok(self)
    }

    /// Rule set to start with. Defaults to the seed rules.
    pub fn rules(mut self, rules: Arc<RuleRegistry>) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Defaults to a volatile [`InMemoryEventStore`].
    pub fn store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to [`DefaultDecider`] over the configured retry policy.
    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Result<Engine, BuildError> {
        self.config.validate()?;

        let rules = match self.rules {
            Some(rules) => rules,
            None => Arc::new(RuleRegistry::seeded()?),
        };

        let missing: BTreeSet<ActionId> = rules
            .list()
            .into_iter()
            .filter(|rule| rule.is_active)
            .flat_map(|rule| rule.actions)
            .filter(|action| !self.handlers.contains(action))
            .collect();
        if !missing.is_empty() {
            return Err(BuildError::MissingHandlers(missing.into_iter().collect()));
        }

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store: Arc<dyn EventStore> = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryEventStore::new()));
        let ids: Arc<dyn IdGenerator> = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let decider: Arc<dyn Decider> = self
            .decider
            .unwrap_or_else(|| Arc::new(DefaultDecider::new(self.config.retry_policy())));

        let dispatcher = Dispatcher::new(
            Arc::new(self.handlers),
            Arc::clone(&store),
            Arc::clone(&clock),
            self.config.action_timeout(),
            self.config.lease_ttl(),
        );

        Ok(Engine {
            config: self.config,
            store,
            matcher: RuleMatcher::new(rules),
            dispatcher,
            decider,
            clock,
            ids,
            wakeup: Notify::new(),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
