//! OpenList (AList-compatible) HTTP client
//!
//! OpenList servers mount many storage providers behind one JSON API. The
//! client logs in with username and password, reuses the bearer token until
//! it is close to expiry, walks directories with `/api/fs/list`, and resolves
//! direct links with `/api/fs/get`.
//!
//! Every response is an envelope `{code, message, data}`; anything but
//! `code == 200` is an error. A `401` drops the cached token so the retry
//! that follows logs in again.

use std::{sync::Arc, time::Duration};

use freestrm_core::domain::account::{AccountCredential, Credential, Identity};
use freestrm_core::domain::errors::DriveError;
use freestrm_core::domain::tree::TreeRecord;
use freestrm_core::ports::cloud_drive::Download;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::client::{network_error, normalize_path, open_stream};
use crate::rate_limit::{OperationKind, RateLimitedQueue};
use crate::tree::TreeRecordBuilder;

/// Tokens are issued for 48 hours; refresh an hour early.
const TOKEN_LIFETIME: Duration = Duration::from_secs(47 * 60 * 60);

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
}

#[derive(Debug, Serialize)]
struct ListRequest<'a> {
    path: &'a str,
    password: &'a str,
    page: u32,
    per_page: u32,
    refresh: bool,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    content: Option<Vec<ObjectInfo>>,
}

/// One object of a listing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObjectInfo {
    pub name: String,
    pub is_dir: bool,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Serialize)]
struct GetRequest<'a> {
    path: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct GetData {
    #[serde(default)]
    raw_url: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    issued_at: Instant,
}

// ============================================================================
// OpenListClient
// ============================================================================

/// HTTP client for one OpenList account
pub struct OpenListClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
    identity: Identity,
    token: Mutex<Option<CachedToken>>,
    queue: Arc<RateLimitedQueue>,
}

impl std::fmt::Debug for OpenListClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenListClient")
            .field("identity", &self.identity)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenListClient {
    pub fn new(
        account: &AccountCredential,
        request_timeout: Duration,
        queue: Arc<RateLimitedQueue>,
    ) -> Result<Self, DriveError> {
        let Credential::OpenList {
            url,
            username,
            password,
        } = &account.credential
        else {
            return Err(DriveError::Protocol(format!(
                "account '{}' is not an OpenList account",
                account.name
            )));
        };
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(network_error)?;
        Ok(Self {
            http,
            base_url: url.trim_end_matches('/').to_string(),
            username: username.clone(),
            password: password.clone(),
            identity: account.identity(),
            token: Mutex::new(None),
            queue,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a JSON body and unwrap the envelope.
    async fn post<B, T>(&self, path: &str, body: &B, token: Option<&str>) -> Result<T, DriveError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.http.post(self.endpoint(path)).json(body);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, token);
        }
        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        if status.is_server_error() {
            return Err(DriveError::Protocol(format!("HTTP {status}")));
        }
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| DriveError::Decode(format!("invalid OpenList response: {e}")))?;

        match envelope.code {
            200 => envelope
                .data
                .ok_or_else(|| DriveError::Decode(format!("{path} returned no data"))),
            401 if token.is_some() => {
                self.token.lock().await.take();
                Err(DriveError::Protocol(format!("unauthorized: {}", envelope.message)))
            }
            404 => Err(DriveError::NotFound(envelope.message)),
            code => Err(DriveError::Protocol(format!("code {code}: {}", envelope.message))),
        }
    }

    /// Current token, logging in when none is cached or it has expired.
    pub async fn token(&self) -> Result<String, DriveError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.issued_at.elapsed() < TOKEN_LIFETIME {
                return Ok(token.value.clone());
            }
            debug!(identity = %self.identity, "OpenList token expired");
        }

        let request = LoginRequest {
            username: &self.username,
            password: &self.password,
        };
        let data: LoginData = self.post("/api/auth/login", &request, None).await?;
        info!(identity = %self.identity, "Logged in to OpenList");
        *cached = Some(CachedToken {
            value: data.token.clone(),
            issued_at: Instant::now(),
        });
        Ok(data.token)
    }

    /// Direct children of `path`.
    #[instrument(skip(self), fields(identity = %self.identity))]
    pub async fn list_objects(&self, path: &str) -> Result<Vec<ObjectInfo>, DriveError> {
        let path = normalize_path(path);
        let path = path.as_str();
        let data: ListData = self
            .queue
            .schedule(&self.identity, OperationKind::Listing, move || async move {
                let token = self.token().await?;
                let request = ListRequest {
                    path,
                    password: "",
                    page: 1,
                    per_page: 0,
                    refresh: true,
                };
                self.post("/api/fs/list", &request, Some(token.as_str())).await
            })
            .await?;
        Ok(data.content.unwrap_or_default())
    }

    /// Direct link for the file at `path`.
    #[instrument(skip(self), fields(identity = %self.identity))]
    pub async fn raw_url(&self, path: &str) -> Result<String, DriveError> {
        let path = normalize_path(path);
        let path = path.as_str();
        let data: GetData = self
            .queue
            .schedule(&self.identity, OperationKind::Link, move || async move {
                let token = self.token().await?;
                let request = GetRequest {
                    path,
                    password: "",
                };
                self.post("/api/fs/get", &request, Some(token.as_str())).await
            })
            .await?;
        if data.raw_url.is_empty() {
            return Err(DriveError::NotFound(format!("download URL for {path}")));
        }
        Ok(data.raw_url)
    }

    /// Walk the tree under `origin_path` depth-first.
    ///
    /// The origin folder becomes the single top-level record so the result
    /// has the same shape as a parsed 115 export.
    pub async fn fetch_tree(&self, origin_path: &str) -> Result<Vec<TreeRecord>, DriveError> {
        let origin = normalize_path(origin_path);
        let origin_name = origin
            .rsplit('/')
            .find(|p| !p.is_empty())
            .unwrap_or("/")
            .to_string();

        let mut builder = TreeRecordBuilder::new();
        builder.push_parts(&[origin_name.clone()]);

        // (remote path, components below the origin)
        let mut pending: Vec<(String, Vec<String>)> = vec![(origin.clone(), Vec::new())];
        while let Some((dir, relative)) = pending.pop() {
            let objects = self.list_objects(&dir).await?;
            for object in objects.into_iter().rev() {
                let mut parts = relative.clone();
                parts.push(object.name.clone());

                let mut full = Vec::with_capacity(parts.len() + 1);
                full.push(origin_name.clone());
                full.extend(parts.iter().cloned());
                builder.push_parts(&full);

                if object.is_dir {
                    let child = format!("{}/{}", dir.trim_end_matches('/'), object.name);
                    pending.push((child, parts));
                }
            }
        }
        let records = builder.finish();
        info!(identity = %self.identity, origin = %origin, records = records.len(), "Walked OpenList tree");
        Ok(records)
    }

    pub async fn open_download(&self, url: &str) -> Result<Download, DriveError> {
        let response = self.http.get(url).send().await.map_err(network_error)?;
        open_stream(response)
    }
}
