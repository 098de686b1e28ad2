//! End-to-end export runs against a scripted API stub and local git
//! fixtures. No network access, no real credentials.

mod common;

use std::fs;
use std::time::Duration;

use bbx::Error;
use bbx::api::{ApiClient, Auth, RetryPolicy};
use bbx::export::{
    ExportOptions, Exporter, ISSUE_COMMENTS_FILE, ORGANIZATIONS_FILE, PULL_REQUESTS_FILE,
    REPOSITORIES_FILE, REVIEW_COMMENTS_FILE, REVIEW_THREADS_FILE, REVIEWS_FILE, SCHEMA_FILE,
    USERS_FILE,
};
use common::{StubServer, fixture_repo};
use tempfile::TempDir;

fn client(base_url: &str) -> ApiClient {
    ApiClient::new(Auth::WorkspaceToken("tok".to_string()), "acme", "widgets")
        .with_base_url(base_url)
        .with_retry(RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
        })
}

fn repository_body(description: &str) -> String {
    format!(
        r#"{{
            "name": "Widgets",
            "description": "{}",
            "created_on": "2023-01-01T00:00:00+00:00",
            "is_private": true,
            "mainbranch": {{"name": "main"}}
        }}"#,
        description
    )
}

#[test]
fn test_export_survives_clone_failure_with_empty_fallback() {
    let sha_a = "a".repeat(40);
    let sha_b = "b".repeat(40);
    let pull_requests = format!(
        r#"{{"values": [{{
            "id": 1, "title": "Add widget", "state": "OPEN",
            "created_on": "2023-06-01T00:00:00+00:00",
            "author": {{"nickname": "jo"}},
            "source": {{"branch": {{"name": "feature"}}, "commit": {{"hash": "{a}"}}}},
            "destination": {{"branch": {{"name": "main"}}, "commit": {{"hash": "{b}"}}}}
        }}]}}"#,
        a = sha_a,
        b = sha_b
    );
    let comments = r#"{"values": [
        {
            "id": 100,
            "content": {"raw": "first"},
            "user": {"nickname": "jo"},
            "created_on": "2023-06-01T10:00:00+00:00",
            "inline": {"path": "src/lib.rs", "to": 3}
        },
        {
            "id": 101,
            "content": {"raw": "second"},
            "user": {"nickname": "sam"},
            "created_on": "2023-06-01T11:00:00+00:00",
            "inline": {"path": "src/lib.rs", "to": 3},
            "parent": {"id": 100}
        },
        {
            "id": 102,
            "content": {"raw": "overall fine"},
            "user": {"nickname": "sam"},
            "created_on": "2023-06-01T12:00:00+00:00"
        }
    ]}"#;

    let server = StubServer::start(vec![
        (200, repository_body(r"line one\r\n\r\nline   two")),
        (500, "members down".to_string()),
        (200, pull_requests),
        (200, comments.to_string()),
    ]);
    let out = TempDir::new().unwrap();

    let options = ExportOptions {
        open_only: false,
        from_date: None,
        clone_url: Some("/nonexistent/source/repo.git".to_string()),
    };
    let summary = Exporter::new(client(&server.base_url), out.path(), options)
        .run()
        .unwrap();

    assert!(summary.fell_back);
    assert_eq!(summary.default_branch, "main");
    assert_eq!(summary.pull_requests, 1);
    assert_eq!(summary.threads, 1);
    assert_eq!(summary.reviews, 1);
    assert_eq!(summary.review_comments, 2);
    assert_eq!(summary.issue_comments, 1);

    // Minimum guarantee: schema, repository record, git mirror.
    let schema: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join(SCHEMA_FILE)).unwrap()).unwrap();
    assert_eq!(schema["version"], "1.2.0");

    let repos: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join(REPOSITORIES_FILE)).unwrap())
            .unwrap();
    assert_eq!(repos[0]["default_branch"], "main");
    assert_eq!(
        repos[0]["git_url"],
        "tarball://root/repositories/acme/widgets.git"
    );
    // Validator collapsed the CR/LF runs.
    assert_eq!(repos[0]["description"], "line one line two");

    let mirror = out
        .path()
        .join("repositories")
        .join("acme")
        .join("widgets.git");
    assert_eq!(
        fs::read_to_string(mirror.join("HEAD")).unwrap(),
        "ref: refs/heads/main\n"
    );
    assert_eq!(
        fs::read_to_string(mirror.join("info").join("nwo")).unwrap(),
        "acme/widgets\n"
    );

    // Member fetch failed, so the workspace stands in as the only user.
    let users: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join(USERS_FILE)).unwrap()).unwrap();
    assert_eq!(users.as_array().unwrap().len(), 1);
    assert_eq!(users[0]["login"], "acme");

    let threads: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join(REVIEW_THREADS_FILE)).unwrap())
            .unwrap();
    assert_eq!(threads.as_array().unwrap().len(), 1);
    assert_eq!(threads[0]["created_at"], "2023-06-01T10:00:00Z");
    assert_eq!(threads[0]["comments"], serde_json::json!([100, 101]));

    let reviews: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join(REVIEWS_FILE)).unwrap()).unwrap();
    assert_eq!(reviews[0]["id"], 100);
    assert_eq!(reviews[0]["submitted_at"], "2023-06-01T10:00:00Z");

    let review_comments: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join(REVIEW_COMMENTS_FILE)).unwrap())
            .unwrap();
    assert_eq!(review_comments[1]["in_reply_to"], 100);

    let issue_comments: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join(ISSUE_COMMENTS_FILE)).unwrap())
            .unwrap();
    assert_eq!(issue_comments[0]["id"], 102);

    let prs: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join(PULL_REQUESTS_FILE)).unwrap())
            .unwrap();
    assert_eq!(prs[0]["source"]["sha"], sha_a);
}

#[test]
fn test_rate_limit_exhaustion_on_pull_request_list_is_fatal() {
    // Two 429s exceed the one-retry test policy; exhaustion must abort the
    // run rather than degrade to an empty pull request list.
    let server = StubServer::start(vec![
        (200, repository_body("clean description")),
        (200, r#"{"values": []}"#.to_string()),
        (429, "{}".to_string()),
        (429, "{}".to_string()),
    ]);
    let out = TempDir::new().unwrap();

    let err = Exporter::new(client(&server.base_url), out.path(), ExportOptions::default())
        .run()
        .unwrap_err();

    assert!(
        matches!(err, Error::RateLimitExhausted { attempts: 2 }),
        "got: {:?}",
        err
    );
    // No mirror was attempted after the abort.
    assert!(!out.path().join("repositories").exists());
}

#[test]
fn test_mid_run_auth_failure_is_fatal() {
    let server = StubServer::start(vec![
        (200, repository_body("clean description")),
        (401, "token expired".to_string()),
    ]);
    let out = TempDir::new().unwrap();

    let err = Exporter::new(client(&server.base_url), out.path(), ExportOptions::default())
        .run()
        .unwrap_err();

    assert!(matches!(err, Error::Auth(_)), "got: {:?}", err);
}

#[test]
fn test_export_with_real_mirror_keeps_declared_branch() {
    let fixture = fixture_repo();
    let server = StubServer::start(vec![
        (200, repository_body("clean description")),
        (
            200,
            r#"{"values": [{"user": {"nickname": "jo", "display_name": "Jo Doe"}}]}"#.to_string(),
        ),
        (200, r#"{"values": []}"#.to_string()),
    ]);
    let out = TempDir::new().unwrap();

    let options = ExportOptions {
        open_only: true,
        from_date: None,
        clone_url: Some(fixture.path().to_string_lossy().into_owned()),
    };
    let summary = Exporter::new(client(&server.base_url), out.path(), options)
        .run()
        .unwrap();

    assert!(!summary.fell_back);
    assert_eq!(summary.default_branch, "main");
    assert_eq!(summary.pull_requests, 0);

    let mirror = out
        .path()
        .join("repositories")
        .join("acme")
        .join("widgets.git");
    assert_eq!(
        fs::read_to_string(mirror.join("HEAD")).unwrap(),
        "ref: refs/heads/main\n"
    );
    assert!(mirror.join("refs").join("heads").join("main").exists());

    let users: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join(USERS_FILE)).unwrap()).unwrap();
    assert_eq!(users[0]["login"], "jo");
    assert_eq!(users[0]["name"], "Jo Doe");

    let orgs: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join(ORGANIZATIONS_FILE)).unwrap())
            .unwrap();
    assert_eq!(orgs[0]["login"], "acme");
}
