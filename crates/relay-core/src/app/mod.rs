//! App layer: wires the store, rules and handlers into a running engine.
//!
//! - **EngineBuilder**: construction and startup validation
//! - **Engine**: emit, claim, process, operator queries
//! - **Dispatcher**: per-rule concurrent action execution
//! - **WorkerPool**: worker loops plus the lease reaper

pub mod builder;
pub mod dispatcher;
pub mod engine;
mod reaper_loop;
pub mod status;
pub mod worker_loop;

pub use self::builder::{BuildError, EngineBuilder};
pub use self::dispatcher::Dispatcher;
pub use self::engine::Engine;
pub use self::status::EventCounts;
pub use self::worker_loop::WorkerPool;
