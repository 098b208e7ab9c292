//! Sync planning
//!
//! Turns flat remote tree records into the set of files a task should have
//! locally, and diffs that against a scan of the task root:
//!
//! - `missing = remote - local`: files to write or download
//! - `extra = local - remote`: entries removed when `remove_extra_files` is set
//!
//! Empty directories take part in the diff on both sides: a remote one is
//! wanted locally, and a local one nobody wants is extra. A local empty
//! directory that remote files will be written into is not extra.
//!
//! Both sets are ordered, so a plan is the same whatever order the records
//! arrived in.
//!
//! A record is a file when it has no children and its name ends in an
//! extension (`.mkv`, `.srt`, ...). Any other record is a directory; a
//! directory whose whole subtree holds no files is kept once, at its highest
//! level, so it can be created locally.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;

use freestrm_core::domain::task::{FileAction, SyncTask, STRM_EXTENSION};
use freestrm_core::domain::tree::TreeRecord;
use regex::Regex;

use crate::filesystem::has_descendant;

fn file_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\.[a-z0-9]+$").expect("file name pattern compiles"))
}

/// Whether a childless node named `name` is a file.
pub fn looks_like_file(name: &str) -> bool {
    file_name_pattern().is_match(name)
}

// ============================================================================
// Tree
// ============================================================================

/// A node of the rebuilt remote tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub children: Vec<TreeNode>,
    /// Files anywhere below this node
    pub file_count: usize,
}

impl TreeNode {
    pub fn is_file(&self) -> bool {
        self.children.is_empty() && looks_like_file(&self.name)
    }
}

/// Rebuild the forest below the synthetic root.
///
/// Records may come in any order; children keep their relative order.
pub fn build_forest(records: &[TreeRecord]) -> Vec<TreeNode> {
    let mut children: HashMap<u64, Vec<&TreeRecord>> = HashMap::new();
    for record in records.iter().filter(|r| !r.is_root()) {
        children.entry(record.parent_key).or_default().push(record);
    }

    fn build(record: &TreeRecord, children: &HashMap<u64, Vec<&TreeRecord>>, depth: usize) -> TreeNode {
        let kids: Vec<TreeNode> = if depth > MAX_DEPTH {
            Vec::new()
        } else {
            children
                .get(&record.key)
                .map(|list| list.iter().map(|c| build(c, children, depth + 1)).collect())
                .unwrap_or_default()
        };
        let file_count = if kids.is_empty() {
            usize::from(looks_like_file(&record.name))
        } else {
            kids.iter().map(|k| k.file_count).sum()
        };
        TreeNode {
            name: record.name.clone(),
            children: kids,
            file_count,
        }
    }

    children
        .get(&freestrm_core::domain::tree::ROOT_KEY)
        .map(|roots| roots.iter().map(|r| build(r, &children, 0)).collect())
        .unwrap_or_default()
}

/// Guard against malformed records that loop back on themselves.
const MAX_DEPTH: usize = 256;

/// Files and empty directories of a remote tree, relative to each root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteListing {
    pub files: BTreeSet<String>,
    pub empty_dirs: BTreeSet<String>,
}

pub fn collect(forest: &[TreeNode]) -> RemoteListing {
    fn walk(node: &TreeNode, prefix: &str, out: &mut RemoteListing) {
        for child in &node.children {
            let path = if prefix.is_empty() {
                child.name.clone()
            } else {
                format!("{prefix}/{}", child.name)
            };
            if child.is_file() {
                out.files.insert(path);
            } else if child.file_count == 0 {
                out.empty_dirs.insert(path);
            } else {
                walk(child, &path, out);
            }
        }
    }

    let mut listing = RemoteListing::default();
    for root in forest {
        walk(root, "", &mut listing);
    }
    listing
}

// ============================================================================
// Plan
// ============================================================================

/// One file a run has to produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    /// Path below the origin folder
    pub remote: String,
    /// Path below the task root
    pub local: String,
    pub action: FileAction,
}

/// Everything a run has to do
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Local paths the remote tree calls for
    pub remote_files: BTreeSet<String>,
    /// Local files and highest empty directories under the task root
    pub local_files: BTreeSet<String>,
    /// Files to produce, ordered by local path
    pub missing: Vec<PlannedFile>,
    /// Local files and empty directories with no remote counterpart
    pub extra: Vec<String>,
    /// Remote directories without files, created locally
    pub empty_dirs: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty() && self.empty_dirs.is_empty()
    }
}

/// `tv/ep1.mkv` -> `tv/ep1.strm`
pub fn strm_name(relative: &str) -> String {
    let (dir, name) = match relative.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, relative),
    };
    let stem = match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    };
    match dir {
        Some(dir) => format!("{dir}/{stem}{STRM_EXTENSION}"),
        None => format!("{stem}{STRM_EXTENSION}"),
    }
}

/// Plan `task` from remote `records` and the `local` entries under its root,
/// as reported by [`TaskRoot::scan`](crate::filesystem::TaskRoot::scan).
pub fn plan(task: &SyncTask, records: &[TreeRecord], local: &BTreeSet<String>) -> SyncPlan {
    let listing = collect(&build_forest(records));

    let mut wanted: BTreeMap<String, PlannedFile> = BTreeMap::new();
    for remote in &listing.files {
        let action = task.classify(remote);
        let local_path = match action {
            FileAction::Reference => strm_name(remote),
            FileAction::Download => remote.clone(),
            FileAction::Skip => continue,
        };
        wanted.entry(local_path.clone()).or_insert(PlannedFile {
            remote: remote.clone(),
            local: local_path,
            action,
        });
    }

    let remote_files: BTreeSet<String> = wanted.keys().cloned().collect();
    let missing = wanted
        .into_values()
        .filter(|f| !local.contains(&f.local))
        .collect();
    let mut wanted_paths = remote_files.clone();
    wanted_paths.extend(listing.empty_dirs.iter().cloned());
    let extra = local
        .difference(&wanted_paths)
        .filter(|path| !has_descendant(&wanted_paths, path))
        .cloned()
        .collect();

    SyncPlan {
        remote_files,
        local_files: local.clone(),
        missing,
        extra,
        empty_dirs: listing.empty_dirs.into_iter().collect(),
    }
}
