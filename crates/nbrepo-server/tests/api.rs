//! End-to-end tests driving the HTTP router over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::Utc;
use nbrepo_core::{ManualClock, Username};
use nbrepo_server::{AppState, FsWorkspace, ServerConfig, routes};
use nbrepo_store::Store;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    clock: Arc<ManualClock>,
    users: TempDir,
}

fn test_app() -> TestApp {
    let users = tempfile::tempdir().unwrap();
    let mut config = ServerConfig::default();
    config.jwt_secret = "api-test-secret".into();
    config.users_path = users.path().to_path_buf();
    config.admin_users.insert(Username::parse("admin").unwrap());

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let state = AppState::new(Store::in_memory(), config)
        .with_clock(clock.clone())
        .with_workspace(Arc::new(FsWorkspace::new(
            users.path(),
            Duration::from_secs(5),
        )));

    TestApp {
        router: routes::build_router(state),
        clock,
        users,
    }
}

impl TestApp {
    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Token {token}"));
        }
        let request = match body {
            Some(payload) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&payload).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Exchange a username for a token, registering the user.
    async fn login(&self, username: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api-token-auth/",
                None,
                Some(json!({ "username": username })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    fn write_notebook(&self, owner: &str, path: &str, content: &str) {
        let full = self.users.path().join(owner).join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    }

    fn read_notebook(&self, user: &str, path: &str) -> String {
        std::fs::read_to_string(self.users.path().join(user).join(path)).unwrap()
    }
}

fn publication(path: &str, name: &str, tags: Value) -> Value {
    json!({
        "api_path": path,
        "name": name,
        "author": "Alice Example",
        "quality": "Beta",
        "description": "Differential expression walkthrough",
        "tags": tags,
    })
}

// ============================================================================
// Identity
// ============================================================================

#[tokio::test]
async fn test_health_reports_store_backend() {
    let app = test_app();
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");
}

#[tokio::test]
async fn test_token_identifies_caller() {
    let app = test_app();
    let token = app.login("Alice").await;

    let (status, body) = app
        .call(Method::GET, "/api-token-auth/me", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["admin"], false);
    assert!(body["registered"].is_string());
}

#[tokio::test]
async fn test_mutation_without_identity_is_unauthorized() {
    let app = test_app();
    let (status, body) = app
        .call(
            Method::POST,
            "/notebooks/",
            None,
            Some(publication("a.ipynb", "A", json!([]))),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

// ============================================================================
// Publication registry
// ============================================================================

#[tokio::test]
async fn test_publish_list_unpublish() {
    let app = test_app();
    let alice = app.login("alice").await;

    let (status, created) = app
        .call(
            Method::POST,
            "/notebooks/",
            Some(&alice),
            Some(publication("analysis.ipynb", "Gene Analysis", json!("genomics, RNA-seq"))),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["owner"], "alice");
    assert_eq!(created["tags"], json!(["genomics", "rna-seq"]));
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["url"], format!("/notebooks/{id}/"));

    // Listing is public.
    let (status, listing) = app.call(Method::GET, "/notebooks/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["publications"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .call(Method::DELETE, &format!("/notebooks/{id}/"), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, listing) = app.call(Method::GET, "/notebooks/", None, None).await;
    assert!(listing["publications"].as_array().unwrap().is_empty());

    let (status, _) = app
        .call(Method::GET, &format!("/notebooks/{id}/"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_publish_conflicts() {
    let app = test_app();
    let alice = app.login("alice").await;
    let form = publication("analysis.ipynb", "Gene Analysis", json!([]));

    let (status, _) = app
        .call(Method::POST, "/notebooks/", Some(&alice), Some(form.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .call(Method::POST, "/notebooks/", Some(&alice), Some(form))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_publish_requires_metadata() {
    let app = test_app();
    let alice = app.login("alice").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/notebooks/",
            Some(&alice),
            Some(json!({ "api_path": "a.ipynb", "name": "A" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_update_is_owner_only() {
    let app = test_app();
    let alice = app.login("alice").await;
    let bob = app.login("bob").await;

    let (_, created) = app
        .call(
            Method::POST,
            "/notebooks/",
            Some(&alice),
            Some(publication("a.ipynb", "A", json!([]))),
        )
        .await;
    let uri = format!("/notebooks/{}/", created["id"]);

    let (status, _) = app
        .call(
            Method::PUT,
            &uri,
            Some(&bob),
            Some(publication("a.ipynb", "Hijacked", json!([]))),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = app
        .call(
            Method::PUT,
            &uri,
            Some(&alice),
            Some(publication("a.ipynb", "Renamed", json!(["methods"]))),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Renamed");
    assert_eq!(updated["tags"], json!(["methods"]));
}

#[tokio::test]
async fn test_copy_into_workspace_and_count() {
    let app = test_app();
    let alice = app.login("alice").await;
    let bob = app.login("bob").await;
    app.write_notebook("alice", "analysis.ipynb", "{\"cells\": []}");

    let (_, created) = app
        .call(
            Method::POST,
            "/notebooks/",
            Some(&alice),
            Some(publication("analysis.ipynb", "Gene Analysis", json!([]))),
        )
        .await;
    let id = created["id"].as_i64().unwrap();

    let (status, first) = app
        .call(Method::POST, &format!("/notebooks/{id}/copy"), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["filename"], "gene_analysis/analysis.ipynb");
    assert_eq!(
        app.read_notebook("bob", "gene_analysis/analysis.ipynb"),
        "{\"cells\": []}"
    );

    let (status, second) = app
        .call(
            Method::POST,
            &format!("/notebooks/{id}/copy/gene_analysis"),
            Some(&bob),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["filename"], "gene_analysis/analysis (copy 1).ipynb");

    let (_, publication) = app
        .call(Method::GET, &format!("/notebooks/{id}/"), None, None)
        .await;
    assert_eq!(publication["copied"], 2);
}

#[tokio::test]
async fn test_copy_of_unpublished_notebook_is_not_found() {
    let app = test_app();
    let alice = app.login("alice").await;
    let bob = app.login("bob").await;

    let (_, created) = app
        .call(
            Method::POST,
            "/notebooks/",
            Some(&alice),
            Some(publication("a.ipynb", "A", json!([]))),
        )
        .await;
    let id = created["id"].as_i64().unwrap();
    app.call(Method::DELETE, &format!("/notebooks/{id}/"), Some(&alice), None)
        .await;

    let (status, _) = app
        .call(Method::POST, &format!("/notebooks/{id}/copy"), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Tag governance
// ============================================================================

#[tokio::test]
async fn test_protected_tag_is_admin_only() {
    let app = test_app();
    let admin = app.login("admin").await;
    let alice = app.login("alice").await;

    let (status, tag) = app
        .call(
            Method::PUT,
            "/tags/label/featured/",
            Some(&admin),
            Some(json!({ "protected": true, "pinned": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{tag}");
    assert_eq!(tag["protected"], true);

    let (status, _) = app
        .call(
            Method::POST,
            "/notebooks/",
            Some(&alice),
            Some(publication("a.ipynb", "A", json!(["featured"]))),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            Method::POST,
            "/notebooks/",
            Some(&admin),
            Some(publication("b.ipynb", "B", json!(["featured"]))),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, listing) = app.call(Method::GET, "/notebooks/", None, None).await;
    assert_eq!(listing["pinned"], json!(["featured"]));
    assert_eq!(listing["protected"], json!(["featured"]));
}

#[tokio::test]
async fn test_tag_changes_by_non_admin_are_forbidden() {
    let app = test_app();
    let alice = app.login("alice").await;

    let (status, _) = app
        .call(
            Method::PUT,
            "/tags/label/anything/",
            Some(&alice),
            Some(json!({ "pinned": true })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ============================================================================
// Sharing
// ============================================================================

#[tokio::test]
async fn test_share_accept_and_list() {
    let app = test_app();
    let alice = app.login("alice").await;
    let bob = app.login("bob").await;

    let (status, share) = app
        .call(
            Method::POST,
            "/sharing/begin/",
            Some(&alice),
            Some(json!({ "notebook": "proj.ipynb", "share_with": "Bob" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{share}");
    assert_eq!(share["owner"], "alice");
    let invite_id = share["collaborators"][0]["id"].as_i64().unwrap();
    assert_eq!(share["collaborators"][0]["user"], "bob");
    assert_eq!(share["collaborators"][0]["accepted"], false);

    let (_, overview) = app
        .call(Method::GET, "/sharing/list/", Some(&bob), None)
        .await;
    assert_eq!(overview["pending_invites"], 1);

    let (status, entry) = app
        .call(
            Method::PUT,
            &format!("/sharing/{invite_id}/accept/"),
            Some(&bob),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entry["accepted"], true);

    let (_, overview) = app
        .call(Method::GET, "/sharing/list/", Some(&bob), None)
        .await;
    assert_eq!(overview["pending_invites"], 0);
    assert_eq!(overview["shared_with_me"][0]["accepted"], true);

    let (_, current) = app
        .call(
            Method::GET,
            "/sharing/current/alice/proj.ipynb",
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(current["users"], json!(["bob"]));
}

#[tokio::test]
async fn test_share_with_nobody_is_rejected() {
    let app = test_app();
    let alice = app.login("alice").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/sharing/begin/",
            Some(&alice),
            Some(json!({ "notebook": "proj.ipynb", "share_with": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_share_with_unknown_users_names_them() {
    let app = test_app();
    let alice = app.login("alice").await;
    app.login("bob").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/sharing/begin/",
            Some(&alice),
            Some(json!({ "notebook": "proj.ipynb", "share_with": ["bob", "ghost"] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unable to share with the indicated users");
    assert_eq!(body["users"], json!(["ghost"]));

    // Nothing was shared.
    let (_, current) = app
        .call(
            Method::GET,
            "/sharing/current/alice/proj.ipynb",
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(current["share_id"], Value::Null);
}

#[tokio::test]
async fn test_decline_last_invite_deletes_share() {
    let app = test_app();
    let alice = app.login("alice").await;
    let bob = app.login("bob").await;

    let (_, share) = app
        .call(
            Method::POST,
            "/sharing/begin/",
            Some(&alice),
            Some(json!({ "notebook": "proj.ipynb", "share_with": ["bob"] })),
        )
        .await;
    let invite_id = share["collaborators"][0]["id"].as_i64().unwrap();

    let (status, result) = app
        .call(
            Method::PUT,
            &format!("/sharing/{invite_id}/decline/"),
            Some(&bob),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["share_deleted"], true);

    let (status, _) = app
        .call(
            Method::PUT,
            "/sharing/heartbeat/alice/proj.ipynb",
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pull_shared_notebook_after_accept() {
    let app = test_app();
    let alice = app.login("alice").await;
    let bob = app.login("bob").await;
    app.write_notebook("alice", "proj.ipynb", "v1");

    let (_, share) = app
        .call(
            Method::POST,
            "/sharing/begin/",
            Some(&alice),
            Some(json!({ "notebook": "proj.ipynb", "share_with": ["bob"] })),
        )
        .await;
    let share_id = share["id"].as_i64().unwrap();
    let invite_id = share["collaborators"][0]["id"].as_i64().unwrap();

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/sharing/{share_id}/copy"),
            Some(&bob),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.call(
        Method::PUT,
        &format!("/sharing/{invite_id}/accept/"),
        Some(&bob),
        None,
    )
    .await;

    let (status, pulled) = app
        .call(
            Method::PUT,
            &format!("/sharing/{share_id}/copy"),
            Some(&bob),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{pulled}");
    assert_eq!(pulled["location"], "proj/proj.ipynb");
    assert_eq!(app.read_notebook("bob", "proj/proj.ipynb"), "v1");

    // A later pull overwrites with the owner's current content.
    app.write_notebook("alice", "proj.ipynb", "v2");
    app.call(
        Method::PUT,
        &format!("/sharing/{share_id}/copy"),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(app.read_notebook("bob", "proj/proj.ipynb"), "v2");
}

// ============================================================================
// Presence
// ============================================================================

#[tokio::test]
async fn test_heartbeat_reports_other_editors_within_window() {
    let app = test_app();
    let alice = app.login("alice").await;
    let bob = app.login("bob").await;

    let (_, share) = app
        .call(
            Method::POST,
            "/sharing/begin/",
            Some(&alice),
            Some(json!({ "notebook": "proj.ipynb", "share_with": ["bob"] })),
        )
        .await;
    let invite_id = share["collaborators"][0]["id"].as_i64().unwrap();
    app.call(
        Method::PUT,
        &format!("/sharing/{invite_id}/accept/"),
        Some(&bob),
        None,
    )
    .await;

    let (status, report) = app
        .call(
            Method::PUT,
            "/sharing/heartbeat/alice/proj.ipynb",
            Some(&alice),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(report["editors"].as_array().unwrap().is_empty());
    assert_eq!(report["window_secs"], 120);

    app.clock.advance(chrono::Duration::seconds(30));
    let (_, report) = app
        .call(
            Method::PUT,
            "/sharing/heartbeat/alice/proj.ipynb",
            Some(&bob),
            None,
        )
        .await;
    assert_eq!(report["editors"][0]["user"], "alice");

    // Alice's last heartbeat falls out of the window.
    app.clock.advance(chrono::Duration::seconds(100));
    let (_, report) = app
        .call(
            Method::PUT,
            "/sharing/heartbeat/alice/proj.ipynb",
            Some(&bob),
            None,
        )
        .await;
    assert!(report["editors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_heartbeat_from_outsider_is_forbidden() {
    let app = test_app();
    let alice = app.login("alice").await;
    app.login("bob").await;
    let mallory = app.login("mallory").await;

    app.call(
        Method::POST,
        "/sharing/begin/",
        Some(&alice),
        Some(json!({ "notebook": "proj.ipynb", "share_with": ["bob"] })),
    )
    .await;

    let (status, _) = app
        .call(
            Method::PUT,
            "/sharing/heartbeat/alice/proj.ipynb",
            Some(&mallory),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
