//! Grid domain: ladder construction, the position ledger, strategy config
//! and the shared error taxonomy

pub mod builder;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod types;

pub use builder::build;
pub use config::{FeeModel, GridConfig};
pub use errors::{EngineError, EngineResult};
pub use ledger::Ledger;
pub use types::{
    ClosedTrade, EventSink, ExitReason, GridEvent, GridLevel, LevelStatus, LogSink, Position,
    RecordingSink, Side,
};
