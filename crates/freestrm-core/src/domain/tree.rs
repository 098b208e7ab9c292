//! Flat remote tree records
//!
//! Both backends deliver the remote tree as a pre-order list of records.
//! Key 0 is the synthetic root; every other record's `parent_key` refers to
//! a record that appeared earlier in the list.

use serde::{Deserialize, Serialize};

/// Key of the synthetic root record
pub const ROOT_KEY: u64 = 0;

/// One node of a remote tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeRecord {
    pub depth: u32,
    pub key: u64,
    pub name: String,
    pub parent_key: u64,
}

impl TreeRecord {
    /// The synthetic root every list starts with.
    pub fn root() -> Self {
        Self {
            depth: 0,
            key: ROOT_KEY,
            name: String::new(),
            parent_key: ROOT_KEY,
        }
    }

    pub fn is_root(&self) -> bool {
        self.key == ROOT_KEY
    }
}
