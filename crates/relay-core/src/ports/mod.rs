//! Ports - 外部依存の抽象化
//!
//! - **EventStore**: event と処理状態の永続化
//! - **Clock**: 時刻の抽象化（テストでは FixedClock）
//! - **IdGenerator**: event / lease の ID 生成

pub mod clock;
pub mod event_store;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_store::{EventStore, Resolution};
pub use self::id_generator::{IdGenerator, UlidGenerator};
