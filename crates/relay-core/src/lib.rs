//! relay-core
//!
//! Event-driven automation engine: business events go in through
//! [`Engine::emit`], get matched against automation rules, and fan out to
//! registered action handlers with per-action results, retries and leases.
//!
//! # Modules
//! - **domain**: events, rules, outcomes, decisions, errors
//! - **ports**: EventStore, Clock, IdGenerator
//! - **store**: records, leases, retry policy, in-memory store and journal
//! - **rules**: rule registry, matcher, seed rules
//! - **handlers**: ActionHandler trait and registry
//! - **app**: builder, engine, dispatcher, worker pool
//! - **config**: EngineConfig

pub mod app;
pub mod config;
pub mod domain;
pub mod handlers;
pub mod ports;
pub mod rules;
pub mod store;

pub use app::{BuildError, Engine, EngineBuilder, EventCounts, WorkerPool};
pub use config::{ConfigError, EngineConfig};
pub use handlers::{ActionHandler, HandlerError, HandlerRegistry};
