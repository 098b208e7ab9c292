//! Port definitions (hexagonal architecture interfaces)
//!
//! - [`ICloudDrive`] - Remote tree, listing and download operations
//! - [`ITaskHistoryStore`] - Persistent run history

pub mod cloud_drive;
pub mod task_history;

pub use cloud_drive::{ByteStream, Download, ICloudDrive, RemoteEntry};
pub use task_history::ITaskHistoryStore;
