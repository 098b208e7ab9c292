//! FreeStrm History - Task execution history
//!
//! Provides:
//! - `HistoryRecorder`: checkpoint writer the sync engine uses during a run
//! - `JsonHistoryStore`: `ITaskHistoryStore` persisted to one JSON file
//! - `MemoryHistoryStore`: `ITaskHistoryStore` kept in memory
//!
//! Both stores share the retention rules in [`log::HistoryLog`]: only the
//! newest records are kept, and a record whose log grows past its cap is
//! trimmed to its newest lines.

pub mod json_store;
pub mod log;
pub mod memory;
pub mod recorder;

pub use json_store::JsonHistoryStore;
pub use log::{HistoryLimits, HistoryLog};
pub use memory::MemoryHistoryStore;
pub use recorder::HistoryRecorder;
