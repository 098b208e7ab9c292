//! Sync task definitions
//!
//! A task mirrors one remote folder (`origin_path`) of one account into a
//! local folder (`target_path`, relative to the data root). Files whose
//! extension is listed in `strm_extensions` become `.strm` reference files;
//! files listed in `download_extensions` are copied literally.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Extension every reference file is written with
pub const STRM_EXTENSION: &str = ".strm";

/// A configured sync task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: String,
    /// Name of the account the task reads from
    pub account: String,
    /// Remote folder to mirror
    pub origin_path: String,
    /// Local folder, relative to the data root
    pub target_path: String,
    /// Extensions written as `.strm` reference files. Empty means the configured defaults.
    #[serde(default)]
    pub strm_extensions: Vec<String>,
    /// Extensions downloaded literally. Empty means the configured defaults.
    #[serde(default)]
    pub download_extensions: Vec<String>,
    /// Prefix written before the locator inside each `.strm` file
    #[serde(default)]
    pub strm_prefix: Option<String>,
    /// Delete local files that no longer exist remotely
    #[serde(default)]
    pub remove_extra_files: bool,
}

/// What the executor does with a remote file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    /// Write a `.strm` reference file
    Reference,
    /// Copy the bytes
    Download,
    /// Neither list matches
    Skip,
}

/// Lower-case an extension and make sure it starts with a dot.
pub fn normalize_extension(ext: &str) -> Result<String, DomainError> {
    let trimmed = ext.trim().trim_start_matches('.');
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(DomainError::InvalidExtension(ext.to_string()));
    }
    Ok(format!(".{}", trimmed.to_ascii_lowercase()))
}

/// Lower-cased extension of the last path component, including the dot.
pub fn extension_of(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let dot = name.rfind('.')?;
    if dot == 0 || dot + 1 == name.len() {
        return None;
    }
    Some(name[dot..].to_ascii_lowercase())
}

impl SyncTask {
    /// Fill empty extension lists and prefix from the configured defaults.
    pub fn with_defaults(
        mut self,
        strm_extensions: &[String],
        download_extensions: &[String],
        strm_prefix: &str,
    ) -> Self {
        if self.strm_extensions.is_empty() {
            self.strm_extensions = strm_extensions.to_vec();
        }
        if self.download_extensions.is_empty() {
            self.download_extensions = download_extensions.to_vec();
        }
        if self.strm_prefix.is_none() {
            self.strm_prefix = Some(strm_prefix.to_string());
        }
        self
    }

    /// Check the task's own fields.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.trim().is_empty() {
            return Err(DomainError::ValidationFailed("task id is empty".into()));
        }
        if !self.origin_path.starts_with('/') {
            return Err(DomainError::InvalidRemotePath(self.origin_path.clone()));
        }
        let target = self.target_path.trim_matches('/');
        if target.is_empty() || target.split('/').any(|part| part == "..") {
            return Err(DomainError::InvalidTargetPath(self.target_path.clone()));
        }
        for ext in self.strm_extensions.iter().chain(&self.download_extensions) {
            normalize_extension(ext)?;
        }
        Ok(())
    }

    /// Reference extensions, normalized.
    pub fn strm_set(&self) -> Vec<String> {
        self.strm_extensions
            .iter()
            .filter_map(|e| normalize_extension(e).ok())
            .collect()
    }

    /// Literal-download extensions, normalized.
    pub fn download_set(&self) -> Vec<String> {
        self.download_extensions
            .iter()
            .filter_map(|e| normalize_extension(e).ok())
            .collect()
    }

    /// Decide what happens to a remote file. Reference extensions win when an
    /// extension appears in both lists.
    pub fn classify(&self, path: &str) -> FileAction {
        let Some(ext) = extension_of(path) else {
            return FileAction::Skip;
        };
        if self.strm_set().contains(&ext) {
            FileAction::Reference
        } else if self.download_set().contains(&ext) {
            FileAction::Download
        } else {
            FileAction::Skip
        }
    }

    /// Remote path of a file given its path relative to the origin folder.
    pub fn remote_path(&self, relative: &str) -> String {
        format!(
            "{}/{}",
            self.origin_path.trim_end_matches('/'),
            relative.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> SyncTask {
        SyncTask {
            id: "t1".into(),
            account: "main".into(),
            origin_path: "/media".into(),
            target_path: "media".into(),
            strm_extensions: vec![".MKV".into(), "mp4".into()],
            download_extensions: vec![".srt".into()],
            strm_prefix: None,
            remove_extra_files: false,
        }
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("MKV").unwrap(), ".mkv");
        assert_eq!(normalize_extension(" .Srt ").unwrap(), ".srt");
        assert!(normalize_extension(".").is_err());
        assert!(normalize_extension(".tar.gz").is_err());
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("tv/ep1.MKV").as_deref(), Some(".mkv"));
        assert_eq!(extension_of("tv/.hidden"), None);
        assert_eq!(extension_of("tv/noext"), None);
        assert_eq!(extension_of("a.b/noext"), None);
    }

    #[test]
    fn test_classify() {
        let t = task();
        assert_eq!(t.classify("tv/ep1.mkv"), FileAction::Reference);
        assert_eq!(t.classify("tv/ep1.Mp4"), FileAction::Reference);
        assert_eq!(t.classify("tv/ep1.srt"), FileAction::Download);
        assert_eq!(t.classify("tv/ep1.nfo"), FileAction::Skip);
    }

    #[test]
    fn test_with_defaults_keeps_task_values() {
        let mut t = task();
        t.download_extensions.clear();
        let t = t.with_defaults(&[".avi".into()], &[".nfo".into()], "http://host/d");
        assert_eq!(t.strm_extensions, vec![".MKV".to_string(), "mp4".to_string()]);
        assert_eq!(t.download_extensions, vec![".nfo".to_string()]);
        assert_eq!(t.strm_prefix.as_deref(), Some("http://host/d"));
    }

    #[test]
    fn test_validate() {
        assert!(task().validate().is_ok());

        let mut t = task();
        t.origin_path = "media".into();
        assert!(matches!(t.validate(), Err(DomainError::InvalidRemotePath(_))));

        let mut t = task();
        t.target_path = "../escape".into();
        assert!(matches!(t.validate(), Err(DomainError::InvalidTargetPath(_))));
    }

    #[test]
    fn test_remote_path() {
        let mut t = task();
        assert_eq!(t.remote_path("tv/ep1.mkv"), "/media/tv/ep1.mkv");
        t.origin_path = "/media/".into();
        assert_eq!(t.remote_path("/tv/ep1.mkv"), "/media/tv/ep1.mkv");
    }
}
