//! FreeStrm Core - Domain types, configuration and ports
//!
//! This crate is the hexagonal core shared by every other FreeStrm crate:
//! - **Domain types** - `AccountCredential`, `SyncTask`, `TreeRecord`, `ProgressEvent`,
//!   `TaskExecutionHistory`
//! - **Error taxonomy** - `DriveError` for remote operations, `DomainError` for validation
//! - **Port definitions** - `ICloudDrive`, `ITaskHistoryStore`
//! - **Configuration** - the YAML configuration file and its validation
//!
//! # Architecture
//!
//! Adapter crates (`freestrm-drive`, `freestrm-history`) implement the ports;
//! `freestrm-sync` drives them through the trait objects defined here.

pub mod config;
pub mod domain;
pub mod ports;
