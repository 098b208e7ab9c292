//! FreeStrm Drive - remote drive clients
//!
//! Provides async clients for:
//! - the 115 drive web API (cookie authentication, encrypted download links,
//!   directory export jobs)
//! - OpenList / AList servers (token authentication, recursive listings)
//!
//! ## Modules
//!
//! - [`crypto`] - payload codec of the 115 download endpoint
//! - [`rate_limit`] - rolling-window, per-account rate-limited operation queue
//! - [`cache`] - TTL caches for directory ids, listings and pickcodes
//! - [`tree`] - export listing parser and flat tree record builder
//! - [`client`] - 115 HTTP client
//! - [`openlist`] - OpenList HTTP client
//! - [`provider`] - `ICloudDrive` implementations and the adapter factory

pub mod cache;
pub mod client;
pub mod crypto;
pub mod openlist;
pub mod provider;
pub mod rate_limit;
pub mod tree;

pub use provider::connect;
