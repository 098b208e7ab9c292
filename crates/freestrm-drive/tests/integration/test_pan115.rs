//! Integration tests for the 115 client against a mocked web API

use freestrm_core::domain::DriveError;
use freestrm_core::ports::cloud_drive::ICloudDrive;
use futures_util::TryStreamExt;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

async fn mount_getid(server: &MockServer, remote: &str, id: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/files/getid"))
        .and(query_param("path", remote))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id, "state": true, "error": ""
        })))
        .mount(server)
        .await;
}

async fn mount_download_url(server: &MockServer, url: &str) {
    Mock::given(method("POST"))
        .and(path("/android/2.0/ufile/download"))
        .and(body_string_contains("data="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": true,
            "msg": "",
            "data": common::sign_response(&json!({"url": {"url": url}})),
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_directory_id_is_cached() {
    let (server, client) = common::setup_pan115().await;
    Mock::given(method("GET"))
        .and(path("/files/getid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "42", "state": true})))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client.resolve_directory_id("/media/tv").await.unwrap(), "42");
    assert_eq!(client.resolve_directory_id("/media/tv/").await.unwrap(), "42");
    assert_eq!(client.resolve_directory_id("/").await.unwrap(), "0");
}

#[tokio::test]
async fn test_missing_directory_is_not_found() {
    let (server, client) = common::setup_pan115().await;
    mount_getid(&server, "/nope", json!(0)).await;

    let err = client.resolve_directory_id("/nope").await.unwrap_err();
    assert!(matches!(err, DriveError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn test_block_page_is_reported_and_not_retried() {
    let (server, client) = common::setup_pan115().await;
    Mock::given(method("GET"))
        .and(path("/files/getid"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<!DOCTYPE html><html><body>您的访问被阻断</body></html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = client.resolve_directory_id("/media").await.unwrap_err();
    assert!(matches!(err, DriveError::AccountBlocked(_)), "got {err:?}");
    assert!(err.user_message().contains("blocked"));
}

#[tokio::test]
async fn test_error_envelope_is_retried_then_reported() {
    let (server, client) = common::setup_pan115().await;
    Mock::given(method("GET"))
        .and(path("/files/getid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": false, "error": "请求过于频繁"
        })))
        // first try plus two retries
        .expect(3)
        .mount(&server)
        .await;

    let err = client.resolve_directory_id("/media").await.unwrap_err();
    assert_eq!(err, DriveError::Protocol("请求过于频繁".into()));
}

#[tokio::test]
async fn test_list_all_follows_pages() {
    let (server, client) = common::setup_pan115().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param("cid", "42"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": true,
            "count": 3,
            "data": [
                {"n": "s1", "cid": "43", "pid": "42"},
                {"n": "ep1.mkv", "fid": "100", "cid": "42", "pc": "pc100", "sha": "AA"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param("cid", "42"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": true,
            "count": 3,
            "data": [{"n": "ep2.srt", "fid": 101, "cid": 42, "pc": "pc101", "sha": "BB"}]
        })))
        .mount(&server)
        .await;

    let entries = client.list_all("42").await.unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["s1", "ep1.mkv", "ep2.srt"]);
    assert!(entries[0].is_dir);
    assert_eq!(entries[2].file_id.as_deref(), Some("101"));

    // Second listing comes from the cache.
    let again = client.list_all("42").await.unwrap();
    assert_eq!(again, entries);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_path_resolves_to_download_url() {
    let (server, client) = common::setup_pan115().await;
    mount_getid(&server, "/media/tv", json!("42")).await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": true,
            "count": 1,
            "data": [{"n": "ep1.mkv", "fid": "100", "cid": "42", "sha": "AA"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/file"))
        .and(query_param("file_id", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": true,
            "data": [{"file_id": "100", "pick_code": "pc100"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_download_url(&server, "https://cdn.example.com/ep1.mkv?t=1").await;

    let url = ICloudDrive::resolve_download_url(&client, "/media/tv/ep1.mkv")
        .await
        .unwrap();
    assert_eq!(url, "https://cdn.example.com/ep1.mkv?t=1");

    let err = ICloudDrive::resolve_download_url(&client, "/media/tv/missing.mkv")
        .await
        .unwrap_err();
    assert!(matches!(err, DriveError::NotFound(_)), "got {err:?}");
}

async fn mount_export_job(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/android/2.0/ufile/export_dir"))
        .and(body_string_contains("target=U_1_0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": true, "data": {"export_id": "e1"}
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/export_dir"))
        .and(query_param("export_id", "e1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": true, "data": {}
        })))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/export_dir"))
        .and(query_param("export_id", "e1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": true,
            "data": {"export_id": "e1", "file_id": "900", "file_name": "tree.txt", "pick_code": "pcexp"}
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rb/delete"))
        .and(body_string_contains("900"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": true})))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_tree_reroots_export_at_origin() {
    let (server, client) = common::setup_pan115().await;
    mount_getid(&server, "/media/tv", json!("42")).await;
    mount_export_job(&server).await;
    mount_download_url(&server, &format!("{}/export/tree.txt", server.uri())).await;

    let listing = "|——根目录\n| |-media\n| | |-tv\n| | | |-ep1.mkv\n| | | |-s1\n| | | | |-ep2.srt\n";
    Mock::given(method("GET"))
        .and(path("/export/tree.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(common::utf16_with_bom(listing)))
        .mount(&server)
        .await;

    let records = client.fetch_tree("/media/tv").await.unwrap();
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["", "tv", "ep1.mkv", "s1", "ep2.srt"]);
    let top: Vec<&str> = records
        .iter()
        .filter(|r| !r.is_root() && r.parent_key == 0)
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(top, vec!["tv"]);
}

#[tokio::test]
async fn test_export_artifact_deleted_when_download_fails() {
    let (server, client) = common::setup_pan115().await;
    mount_getid(&server, "/media/tv", json!("42")).await;
    mount_export_job(&server).await;
    mount_download_url(&server, &format!("{}/export/gone.txt", server.uri())).await;
    Mock::given(method("GET"))
        .and(path("/export/gone.txt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client.fetch_tree("/media/tv").await.unwrap_err();
    assert!(matches!(err, DriveError::Transfer(_)), "got {err:?}");
    // The delete expectation is verified when the server drops.
}

#[tokio::test]
async fn test_open_download_streams_body() {
    let (server, client) = common::setup_pan115().await;
    Mock::given(method("GET"))
        .and(path("/cdn/ep2.srt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"1\n00:00:01,000 --> 00:00:02,000\nhi\n".to_vec()))
        .mount(&server)
        .await;

    let download = ICloudDrive::open_download(&client, &format!("{}/cdn/ep2.srt", server.uri()))
        .await
        .unwrap();
    assert_eq!(download.content_length, Some(35));
    let chunks: Vec<bytes::Bytes> = download.body.try_collect().await.unwrap();
    let body: Vec<u8> = chunks.concat();
    assert!(body.ends_with(b"hi\n"));

    let err = ICloudDrive::open_download(&client, &format!("{}/cdn/missing", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, DriveError::NotFound(_)));
}
