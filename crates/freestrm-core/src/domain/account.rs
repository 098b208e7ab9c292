//! Account credentials
//!
//! Accounts are configured outside the core and are read-only here. Each
//! account belongs to one backend kind, which decides both how requests are
//! authenticated and which rate window its operations share.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Backend a credential authenticates against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// The 115 drive, authenticated with a browser cookie
    Pan115,
    /// An OpenList (AList-compatible) server, authenticated with a bearer token
    OpenList,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Pan115 => write!(f, "pan115"),
            BackendKind::OpenList => write!(f, "openlist"),
        }
    }
}

/// Secret material for one backend
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credential {
    Pan115 {
        cookie: String,
    },
    OpenList {
        url: String,
        username: String,
        password: String,
    },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Pan115 { .. } => f
                .debug_struct("Pan115")
                .field("cookie", &"<redacted>")
                .finish(),
            Credential::OpenList { url, username, .. } => f
                .debug_struct("OpenList")
                .field("url", url)
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// A named account and its credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCredential {
    /// Account name, referenced by tasks
    pub name: String,
    #[serde(flatten)]
    pub credential: Credential,
}

impl AccountCredential {
    pub fn pan115(name: impl Into<String>, cookie: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            credential: Credential::Pan115 {
                cookie: cookie.into(),
            },
        }
    }

    pub fn open_list(
        name: impl Into<String>,
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            credential: Credential::OpenList {
                url: url.into(),
                username: username.into(),
                password: password.into(),
            },
        }
    }

    pub fn backend(&self) -> BackendKind {
        match self.credential {
            Credential::Pan115 { .. } => BackendKind::Pan115,
            Credential::OpenList { .. } => BackendKind::OpenList,
        }
    }

    pub fn identity(&self) -> Identity {
        Identity {
            backend: self.backend(),
            account: self.name.clone(),
        }
    }

    /// Short stable digest of the secret material.
    ///
    /// Used in cache keys so two accounts never share cached entries and a
    /// rotated cookie never reads entries cached under the old one.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        match &self.credential {
            Credential::Pan115 { cookie } => hasher.update(cookie.as_bytes()),
            Credential::OpenList {
                url,
                username,
                password,
            } => {
                hasher.update(url.as_bytes());
                hasher.update([0u8]);
                hasher.update(username.as_bytes());
                hasher.update([0u8]);
                hasher.update(password.as_bytes());
            }
        }
        hasher
            .finalize()
            .iter()
            .take(8)
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// Scope under which throughput is bounded
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub backend: BackendKind,
    pub account: String,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.backend, self.account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_depends_on_secret() {
        let a = AccountCredential::pan115("main", "UID=1; CID=2");
        let b = AccountCredential::pan115("main", "UID=1; CID=3");
        assert_eq!(a.fingerprint().len(), 16);
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let acct = AccountCredential::open_list("nas", "http://nas:5244", "admin", "hunter2");
        let printed = format!("{acct:?}");
        assert!(printed.contains("admin"));
        assert!(!printed.contains("hunter2"));

        let acct = AccountCredential::pan115("main", "UID=secret");
        assert!(!format!("{acct:?}").contains("UID=secret"));
    }

    #[test]
    fn test_deserialize_tagged_credentials() {
        let yaml = r#"
- name: main
  kind: pan115
  cookie: "UID=1"
- name: nas
  kind: open_list
  url: http://nas:5244
  username: admin
  password: pw
"#;
        let accounts: Vec<AccountCredential> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(accounts[0].backend(), BackendKind::Pan115);
        assert_eq!(accounts[1].backend(), BackendKind::OpenList);
        assert_eq!(accounts[1].identity().to_string(), "openlist:nas");
    }
}
