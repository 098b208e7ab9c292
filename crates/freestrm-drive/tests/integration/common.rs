//! Shared helpers for drive integration tests
//!
//! Builds clients pointed at a wiremock server with fast rate limits, and
//! signs download responses the way the 115 server does so the client's
//! codec can decrypt them.

use std::sync::Arc;

use freestrm_core::config::{Backoff, DriveConfig, OperationLimits, RateLimitingConfig};
use freestrm_core::domain::AccountCredential;
use freestrm_drive::cache::DriveCaches;
use freestrm_drive::client::Pan115Client;
use freestrm_drive::crypto::{CryptoCodec, RequestKey};
use freestrm_drive::openlist::OpenListClient;
use freestrm_drive::rate_limit::RateLimitedQueue;
use rsa::BigUint;
use wiremock::MockServer;

const TEST_N: &[u8] = b"ae3d92f627374028ab8bdb60583c7ee58a49a16d0632e36e5159f1b620f9f70aeb8e7aa547e60f50bd58c8590d4d83ee4cc0e30db61b82a74d527279d7813b374ac470ae625457214610197a14ca0e67e55c5edd3743ed790d7e9cccfb01df1407d5ffb2be6e5dc7c4f667534e0a13bdc093e6f5bb6de3c2b3ccb91eb56c77dd";
const TEST_D: &[u8] = b"31ae00bf0a836859b03fda36e831a784cf1f1b55b894bddff07612c2f9380c4622cfa70c8529856861f4747b5f9da0664ba01b9d073564d54ae89d173c68ee76e6e6bc37d36ab49116302f18f02a4dc26a7e6d417cbece0256c6a235b201a25e66bbf410a9eeff61a41f0cf22799aba5e224ffba67984f57fb27a7e20cb29481";
const PUBLIC_EXPONENT: u32 = 65537;

fn hex(s: &[u8]) -> BigUint {
    BigUint::parse_bytes(s, 16).unwrap()
}

/// Limits that never make a test wait noticeably.
pub fn fast_limits() -> RateLimitingConfig {
    let limits = OperationLimits {
        per_second: 1000,
        concurrent: 4,
        max_retries: 2,
        retry_delay_ms: 5,
        backoff: Backoff::Fixed,
    };
    RateLimitingConfig {
        listing: limits.clone(),
        link: limits.clone(),
        download: limits,
    }
}

/// Codec the client uses against the test key.
pub fn client_codec() -> CryptoCodec {
    CryptoCodec::new(
        hex(TEST_N),
        BigUint::from(PUBLIC_EXPONENT),
        BigUint::from(PUBLIC_EXPONENT),
        RequestKey::wire(),
    )
    .unwrap()
}

/// Encrypt `json` the way the server answers the download endpoint.
pub fn sign_response(json: &serde_json::Value) -> String {
    let server = CryptoCodec::new(
        hex(TEST_N),
        hex(TEST_D),
        BigUint::from(PUBLIC_EXPONENT),
        RequestKey::derived([3; 16]),
    )
    .unwrap();
    server.encrypt(json.to_string())
}

pub fn drive_config(server: &MockServer) -> DriveConfig {
    DriveConfig {
        webapi_base_url: server.uri(),
        proapi_base_url: server.uri(),
        export_timeout_secs: 2,
        export_poll_interval_ms: 10,
        list_page_size: 2,
        ..DriveConfig::default()
    }
}

pub async fn setup_pan115() -> (MockServer, Pan115Client) {
    let server = MockServer::start().await;
    let account = AccountCredential::pan115("main", "UID=1_A1; CID=abc; SEID=def");
    let queue = Arc::new(RateLimitedQueue::new(fast_limits()));
    let client = Pan115Client::new(&account, drive_config(&server), DriveCaches::default(), queue)
        .unwrap()
        .with_codec(client_codec());
    (server, client)
}

pub async fn setup_openlist() -> (MockServer, OpenListClient) {
    let server = MockServer::start().await;
    let account = AccountCredential::open_list("nas", server.uri(), "admin", "secret");
    let queue = Arc::new(RateLimitedQueue::new(fast_limits()));
    let client =
        OpenListClient::new(&account, std::time::Duration::from_secs(5), queue).unwrap();
    (server, client)
}

/// UTF-16LE with a BOM, as the export artifact is stored.
pub fn utf16_with_bom(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xff, 0xfe];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}
