//! Export listing parser
//!
//! A 115 directory export produces a text file (UTF-16 with a BOM) that
//! draws the tree with ASCII guides:
//!
//! ```text
//! |——根目录
//! | |-tv
//! | | |-ep1.mkv
//! | | |-ep2.srt
//! | |-movies
//! ```
//!
//! [`ExportPaths`] turns that text into escaped absolute paths, one per node
//! in pre-order, and [`TreeRecordBuilder`] folds the paths into the flat
//! [`TreeRecord`] list the planner consumes.
//!
//! Names that contain a newline continue on the following lines; those lines
//! do not match the node pattern and are appended to the previous node.

use std::collections::{HashMap, VecDeque};
use std::str::Lines;
use std::sync::OnceLock;

use freestrm_core::domain::tree::{TreeRecord, ROOT_KEY};
use regex::Regex;
use tracing::{debug, warn};

/// Label the export uses for the drive root.
pub const ROOT_LABEL: &str = "根目录";

fn node_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?:\| )+\|-(.*)").expect("node pattern compiles"))
}

/// Decode an export file, sniffing the BOM (UTF-16LE when there is none).
pub fn decode_export(bytes: &[u8]) -> String {
    let (text, encoding, had_errors) = encoding_rs::UTF_16LE.decode(bytes);
    if had_errors {
        warn!(encoding = encoding.name(), "Export listing contained undecodable sequences");
    }
    text.into_owned()
}

/// Escape a node name so it can be joined with `/`.
pub fn escape_name(name: &str) -> String {
    if name == "." || name == ".." {
        return format!("\\{name}");
    }
    name.replace('/', "\\/")
}

/// Split an escaped path on unescaped `/` and undo [`escape_name`].
pub fn split_escaped(path: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'/') => {
                current.push('\\');
                current.push('/');
                chars.next();
            }
            '/' => parts.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    parts.push(current);

    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .map(|p| match p.as_str() {
            "\\." | "\\.." => p[1..].to_string(),
            _ => p.replace("\\/", "/"),
        })
        .collect()
}

// ============================================================================
// ExportPaths
// ============================================================================

/// Single-pass iterator over the escaped paths of an export listing
pub struct ExportPaths<'a> {
    lines: Lines<'a>,
    stack: Vec<String>,
    depth: usize,
    ready: VecDeque<String>,
    started: bool,
    finished: bool,
}

impl<'a> ExportPaths<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
            stack: Vec::new(),
            depth: 0,
            ready: VecDeque::new(),
            started: false,
            finished: false,
        }
    }

    fn read_root(&mut self) {
        self.started = true;
        let Some(first) = self.lines.next().filter(|l| !l.is_empty()) else {
            self.finished = true;
            return;
        };
        let label: String = if first.chars().count() >= 3 {
            first.chars().skip(3).collect()
        } else {
            first.to_string()
        };
        if label == ROOT_LABEL {
            self.stack = vec![String::new()];
            self.ready.push_back("/".to_string());
        } else {
            let root = format!("/{}", escape_name(&label));
            self.stack = vec![root.clone()];
            self.ready.push_back(root);
        }
    }

    fn read_line(&mut self, line: &str) {
        let Some(name) = node_pattern().captures(line).and_then(|c| c.get(1)) else {
            // Continuation of a multi-line name.
            if let Some(current) = self.stack.get_mut(self.depth) {
                current.push('\n');
                current.push_str(line);
            }
            return;
        };

        // Guides are ASCII, so the byte offset of the name is the prefix width.
        let depth = (name.start() / 2).saturating_sub(1).max(1);
        if self.depth > 0 {
            if let Some(previous) = self.stack.get(self.depth) {
                self.ready.push_back(previous.clone());
            }
        }
        self.depth = depth;

        let parent = self.stack.get(depth - 1).cloned().unwrap_or_default();
        let path = format!("{parent}/{}", escape_name(name.as_str()));
        self.stack.resize(depth, String::new());
        self.stack.push(path);
    }
}

impl Iterator for ExportPaths<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if let Some(path) = self.ready.pop_front() {
                return Some(path);
            }
            if self.finished {
                return None;
            }
            if !self.started {
                self.read_root();
                continue;
            }
            match self.lines.next() {
                Some(line) => self.read_line(line),
                None => {
                    self.finished = true;
                    if self.depth > 0 {
                        if let Some(last) = self.stack.get(self.depth) {
                            self.ready.push_back(last.clone());
                        }
                    }
                }
            }
        }
    }
}

// ============================================================================
// TreeRecordBuilder
// ============================================================================

/// Folds escaped paths into flat records, one per distinct node
#[derive(Debug)]
pub struct TreeRecordBuilder {
    records: Vec<TreeRecord>,
    index: HashMap<(u64, String), u64>,
    next_key: u64,
}

impl Default for TreeRecordBuilder {
    fn default() -> Self {
        Self {
            records: vec![TreeRecord::root()],
            index: HashMap::new(),
            next_key: ROOT_KEY + 1,
        }
    }
}

impl TreeRecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every node along `path`, reusing nodes already seen.
    pub fn push_path(&mut self, path: &str) {
        let parts: Vec<String> = split_escaped(path)
            .into_iter()
            .map(|p| p.trim().to_string())
            .collect();
        self.push_parts(&parts);
    }

    /// Add every node along an already split path.
    pub fn push_parts(&mut self, parts: &[String]) {
        let mut parent = ROOT_KEY;
        for (depth, name) in parts.iter().enumerate() {
            if name.is_empty() || name == "." || name == ".." {
                warn!(name = %name, "Skipping remote entry with an unusable name");
                return;
            }
            let entry_key = (parent, name.clone());
            parent = match self.index.get(&entry_key) {
                Some(&key) => key,
                None => {
                    let key = self.next_key;
                    self.next_key += 1;
                    self.records.push(TreeRecord {
                        depth: depth as u32,
                        key,
                        name: name.clone(),
                        parent_key: parent,
                    });
                    self.index.insert(entry_key, key);
                    key
                }
            };
        }
    }

    pub fn finish(self) -> Vec<TreeRecord> {
        debug!(records = self.records.len(), "Built tree records");
        self.records
    }
}

/// Parse a decoded export listing straight into records.
pub fn records_from_export(text: &str) -> Vec<TreeRecord> {
    let mut builder = TreeRecordBuilder::new();
    for path in ExportPaths::new(text) {
        builder.push_path(&path);
    }
    builder.finish()
}
