//! Integration tests for the OpenList client against a mocked server

use freestrm_core::domain::DriveError;
use freestrm_core::ports::cloud_drive::ICloudDrive;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

async fn mount_login(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_partial_json(json!({"username": "admin", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200, "message": "success", "data": {"token": "tok-1"}
        })))
        .expect(expected)
        .mount(server)
        .await;
}

async fn mount_list(server: &MockServer, dir: &str, content: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/api/fs/list"))
        .and(header("Authorization", "tok-1"))
        .and(body_partial_json(json!({"path": dir})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200, "message": "success", "data": {"content": content, "total": 0}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_tree_walks_recursively_with_one_login() {
    let (server, client) = common::setup_openlist().await;
    mount_login(&server, 1).await;
    mount_list(
        &server,
        "/media/tv",
        json!([
            {"name": "ep1.mkv", "is_dir": false, "size": 10},
            {"name": "s1", "is_dir": true},
            {"name": "empty", "is_dir": true}
        ]),
    )
    .await;
    mount_list(&server, "/media/tv/s1", json!([{"name": "ep2.srt", "is_dir": false}])).await;
    mount_list(&server, "/media/tv/empty", json!(null)).await;

    let records = client.fetch_tree("/media/tv").await.unwrap();

    let top: Vec<&str> = records
        .iter()
        .filter(|r| !r.is_root() && r.parent_key == 0)
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(top, vec!["tv"]);

    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    for expected in ["ep1.mkv", "s1", "ep2.srt", "empty"] {
        assert!(names.contains(&expected), "missing {expected}");
    }
    let s1 = records.iter().find(|r| r.name == "s1").unwrap();
    let ep2 = records.iter().find(|r| r.name == "ep2.srt").unwrap();
    assert_eq!(ep2.parent_key, s1.key);
    assert_eq!(ep2.depth, 2);
}

#[tokio::test]
async fn test_raw_url_and_list() {
    let (server, client) = common::setup_openlist().await;
    mount_login(&server, 1).await;
    mount_list(&server, "/media", json!([{"name": "tv", "is_dir": true}])).await;
    Mock::given(method("POST"))
        .and(path("/api/fs/get"))
        .and(body_partial_json(json!({"path": "/media/tv/ep1.mkv"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200, "message": "success",
            "data": {"name": "ep1.mkv", "raw_url": "https://storage.example.com/ep1.mkv"}
        })))
        .mount(&server)
        .await;

    let entries = client.list("/media").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, "/media/tv");
    assert!(entries[0].is_dir);

    let url = client.resolve_download_url("/media/tv/ep1.mkv").await.unwrap();
    assert_eq!(url, "https://storage.example.com/ep1.mkv");
}

#[tokio::test]
async fn test_unauthorized_drops_token_and_logs_in_again() {
    let (server, client) = common::setup_openlist().await;
    mount_login(&server, 2).await;
    Mock::given(method("POST"))
        .and(path("/api/fs/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 401, "message": "token is expired", "data": null
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_list(&server, "/media", json!([])).await;

    let objects = client.list_objects("/media").await.unwrap();
    assert!(objects.is_empty());
}

#[tokio::test]
async fn test_missing_path_is_not_found() {
    let (server, client) = common::setup_openlist().await;
    mount_login(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/api/fs/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 404, "message": "object not found", "data": null
        })))
        .mount(&server)
        .await;

    let err = client.raw_url("/media/nope.mkv").await.unwrap_err();
    assert_eq!(err, DriveError::NotFound("object not found".into()));
}
