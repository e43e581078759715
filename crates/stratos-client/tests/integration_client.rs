#![allow(unused_crate_dependencies)]
#![allow(clippy::expect_used, reason = "integration test — panics are the assertion mechanism")]

use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use stratos_client::{
    Client, ClientConfig, ClientError, GenericObject, ObjectFactory, RemoteObject,
    HEADER_BACKEND_ID, HEADER_BACKEND_SECRET,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(server: &MockServer) -> Client {
    Client::new(ClientConfig {
        backend_id: "backend-1".to_string(),
        backend_secret: "s3cr3t".to_string(),
        base_url: server.uri(),
        timeout_secs: 5,
        accept_invalid_certs: false,
    })
    .expect("client builds")
}

/// Claims `objects.Book` and stamps a marker so tests can tell custom
/// construction from the generic fallback.
struct BookFactory;

impl ObjectFactory for BookFactory {
    fn create_for_type(&self, object_type: &str, id: Option<&str>) -> Option<Box<dyn RemoteObject>> {
        if object_type != "objects.Book" {
            return None;
        }
        let mut book = GenericObject::with_type(object_type, id);
        book.set_field("catalogued", json!(true));
        Some(Box::new(book))
    }
}

#[tokio::test]
async fn query_builds_rows_through_registered_factory() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/objects/Book"))
        .and(header(HEADER_BACKEND_ID, "backend-1"))
        .and(header(HEADER_BACKEND_SECRET, "s3cr3t"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"objectType": "objects.Book", "id": "b-1", "title": "X"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    client.register_object_factory(Box::new(BookFactory));

    let reply = client.query(json!({"objectType": "objects.Book"})).expect("valid payload");
    let payload = reply.wait().await.expect("query succeeds");

    assert_eq!(payload.status, 200);
    assert_eq!(payload.objects.len(), 1);
    let row = payload.objects[0].read();
    assert_eq!(row.field("title"), Some(json!("X")));
    assert_eq!(row.field("catalogued"), Some(json!(true)), "built by BookFactory, not fallback");
}

#[tokio::test]
async fn unauthorized_query_finishes_with_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/objects/Book"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errors": [{"message": "Unauthorized", "reason": "InvalidToken"}]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let reply = client.query(json!({"objectType": "objects.Book"})).expect("valid payload");
    let err = reply.wait().await.expect_err("401 surfaces as an error");

    match err {
        ClientError::Backend { status, code, message } => {
            assert_eq!(status, 401);
            assert_eq!(code.as_deref(), Some("InvalidToken"));
            assert_eq!(message, "Unauthorized");
        }
        other => panic!("expected backend error, got {other}"),
    }
}

#[tokio::test]
async fn model_append_reconciles_against_live_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/objects/Note"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "objectType": "objects.Note",
            "id": "n-7",
            "text": "hi",
            "createdAt": "2024-01-01T00:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let model = stratos_client::ListModel::new(client);

    let reply =
        model.append(json!({"objectType": "objects.Note", "text": "hi"})).expect("valid payload");
    assert_eq!(model.row_count(), 1, "optimistic insert happens before the exchange resolves");

    reply.wait().await.expect("create succeeds");
    // Reconciliation runs on a background task right after the reply settles.
    tokio::time::timeout(Duration::from_secs(2), async {
        while model.data(0, "id") != Some(json!("n-7")) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("row reconciled with the server-assigned id");
}

#[tokio::test]
async fn upload_sends_file_bytes_with_association() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/files"))
        .and(header("Content-Type", "application/octet-stream"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "objectType": "files", "id": "f-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(b"cover-bytes").expect("write temp file");

    let client = test_client(&server);
    let reply = client
        .upload_file(
            json!({"object": {"id": "b-1", "objectType": "objects.Book"}}),
            file.path(),
        )
        .expect("association declares objectType");

    let payload = reply.wait().await.expect("upload succeeds");
    assert_eq!(payload.status, 201);
    assert_eq!(payload.first_object().expect("file object").read().id().as_deref(), Some("f-1"));
}

#[tokio::test]
async fn login_round_trip_stores_session_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/identity"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"sessionToken": "tok-abc"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    client.set_identity(Some(Arc::new(stratos_client::PasswordIdentity::new("u", "p"))));
    client.login().await.expect("login succeeds");
    assert_eq!(client.session().auth_token(), "tok-abc");
}
