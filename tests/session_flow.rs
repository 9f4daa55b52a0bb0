//! End-to-end session flows against a mock grading API.

use std::sync::Arc;

use gradedesk::session::{MemorySessionStorage, SessionStorage};
use gradedesk::{ClientApp, ClientConfig, ClientError, Guard, RegisterRequest, Role, Route};
use serde_json::json;
use gradedesk::api::{AssignmentUpdate, NewAssignment};
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SAVED_TEACHER: &str = r#"{"state":{"user":{"id":1,"username":"alice","role":"teacher","class_id":"101","student_id":null},"token":"tok-saved","isAuthenticated":true},"version":0}"#;

fn app_for(server: &MockServer, storage: Arc<MemorySessionStorage>) -> ClientApp {
    let config = ClientConfig {
        api_base_url: format!("{}/api", server.uri()),
        ..ClientConfig::default()
    };
    ClientApp::new(config, storage).unwrap()
}

fn login_ok(token: &str, username: &str, role: &str) -> ResponseTemplate {
    let student_id = if role == "student" { json!("S-1") } else { json!(null) };
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": token,
        "token_type": "bearer",
        "user": {
            "id": 1,
            "username": username,
            "role": role,
            "class_id": "101",
            "student_id": student_id,
        }
    }))
}

async fn mount_login(server: &MockServer, token: &str, username: &str, role: &str) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains(format!("username={username}").as_str()))
        .respond_with(login_ok(token, username, role))
        .mount(server)
        .await;
}

#[tokio::test]
async fn login_token_rides_on_later_requests() {
    let server = MockServer::start().await;
    mount_login(&server, "tok123", "alice", "teacher").await;
    Mock::given(method("GET"))
        .and(path("/api/assignments/"))
        .and(header("authorization", "Bearer tok123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(MemorySessionStorage::new());
    let app = app_for(&server, storage.clone());
    app.session.login("alice", "pw").await.unwrap();

    assert!(app.session.is_authenticated());
    assert_eq!(app.session.token().as_deref(), Some("tok123"));
    assert_eq!(app.session.role(), Some(Role::Teacher));
    assert_eq!(
        app.transport.default_authorization().as_deref(),
        Some("Bearer tok123")
    );

    let persisted = storage.load().unwrap().unwrap();
    assert_eq!(persisted.state.token.as_deref(), Some("tok123"));
    assert!(persisted.state.is_authenticated);

    let list = app.api.list_assignments().await.unwrap();
    assert!(list.is_empty());
}

#[tokio::test]
async fn rejected_credential_evicts_everywhere() {
    let server = MockServer::start().await;
    mount_login(&server, "tok123", "alice", "teacher").await;
    Mock::given(method("GET"))
        .and(path("/api/assignments/"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Could not validate credentials"})),
        )
        .mount(&server)
        .await;

    let storage = Arc::new(MemorySessionStorage::new());
    let app = app_for(&server, storage.clone());
    app.session.login("alice", "pw").await.unwrap();

    let err = app.api.list_assignments().await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized { .. }));

    assert!(!app.session.is_authenticated());
    assert!(app.session.user().is_none());
    assert!(app.session.token().is_none());
    assert!(app.transport.default_authorization().is_none());
    assert!(storage.is_empty());
    assert_eq!(app.navigator.current(), Route::Login);
}

#[tokio::test]
async fn failed_login_leaves_session_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Incorrect username or password"})),
        )
        .mount(&server)
        .await;

    let storage = Arc::new(MemorySessionStorage::new());
    let app = app_for(&server, storage.clone());
    let err = app.session.login("alice", "wrong").await.unwrap_err();

    assert_eq!(err.detail(), Some("Incorrect username or password"));
    assert!(matches!(err, ClientError::Api { .. }));
    assert!(!app.session.is_authenticated());
    assert!(storage.is_empty());
    // A bad password is not a session expiry.
    assert_eq!(app.navigator.current(), Route::Root);
}

#[tokio::test]
async fn empty_credentials_never_reach_the_server() {
    let server = MockServer::start().await;
    let app = app_for(&server, Arc::new(MemorySessionStorage::new()));

    for username in ["", "   "] {
        let err = app.session.login(username, "pw").await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn student_without_student_id_is_rejected_locally() {
    let server = MockServer::start().await;
    let app = app_for(&server, Arc::new(MemorySessionStorage::new()));

    let request = RegisterRequest {
        username: "bob".into(),
        password: "pw".into(),
        role: Role::Student,
        invite_code: "student-101".into(),
        student_id: Some("   ".into()),
    };
    let err = app.session.register(&request).await.unwrap_err();

    assert!(matches!(err, ClientError::Validation(_)));
    assert!(err.user_message("x").contains("student ID"));
    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(!app.session.is_authenticated());
}

#[tokio::test]
async fn register_then_logs_in() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .and(header("content-type", "application/json"))
        .and(body_string_contains("\"invite_code\":\"teacher-101\""))
        .and(body_string_contains("\"student_id\":null"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 5, "username": "carol", "role": "teacher", "class_id": "101", "student_id": null
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_login(&server, "tok-carol", "carol", "teacher").await;

    let app = app_for(&server, Arc::new(MemorySessionStorage::new()));
    let request = RegisterRequest {
        username: "carol".into(),
        password: "pw".into(),
        role: Role::Teacher,
        invite_code: "teacher-101".into(),
        student_id: Some("ignored-for-teachers".into()),
    };
    app.session.register(&request).await.unwrap();

    assert!(app.session.is_authenticated());
    assert_eq!(app.session.token().as_deref(), Some("tok-carol"));
}

#[tokio::test]
async fn register_ok_but_login_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .and(body_string_contains("\"student_id\":\" S-9 \""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "database down"})))
        .mount(&server)
        .await;

    let app = app_for(&server, Arc::new(MemorySessionStorage::new()));
    let request = RegisterRequest {
        username: "dave".into(),
        password: "pw".into(),
        role: Role::Student,
        invite_code: "student-101".into(),
        student_id: Some(" S-9 ".into()),
    };
    let err = app.session.register(&request).await.unwrap_err();

    assert_eq!(err.detail(), Some("database down"));
    assert!(!app.session.is_authenticated());
    assert!(app.session.user().is_none());
}

#[tokio::test]
async fn register_rejection_carries_server_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"detail": "Invalid invite code"})),
        )
        .mount(&server)
        .await;

    let app = app_for(&server, Arc::new(MemorySessionStorage::new()));
    let request = RegisterRequest {
        username: "erin".into(),
        password: "pw".into(),
        role: Role::Teacher,
        invite_code: "teacher-999".into(),
        student_id: None,
    };
    let err = app.session.register(&request).await.unwrap_err();
    assert_eq!(err.user_message("registration failed"), "Invalid invite code");
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn logout_drops_default_header_and_persists_empty_record() {
    let server = MockServer::start().await;
    mount_login(&server, "tok123", "alice", "teacher").await;

    let storage = Arc::new(MemorySessionStorage::new());
    let app = app_for(&server, storage.clone());
    app.session.login("alice", "pw").await.unwrap();
    app.session.logout();

    assert!(!app.session.is_authenticated());
    assert!(app.transport.default_authorization().is_none());
    let record = storage.load().unwrap().unwrap();
    assert!(record.credentials().is_none());
    assert!(!record.state.is_authenticated);
}

#[tokio::test]
async fn homework_upload_goes_out_as_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/students/assignments/3/submit"))
        .and(header("authorization", "Bearer tok-saved"))
        .and(body_string_contains("name=\"homework_file\""))
        .and(body_string_contains("%PDF-1.4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 11, "status": "submitted"})))
        .expect(1)
        .mount(&server)
        .await;

    let app = app_for(&server, Arc::new(MemorySessionStorage::with_raw(SAVED_TEACHER)));
    assert!(app.boot().await.restored().await);

    let reply = app
        .api
        .submit_homework(3, "hw.pdf", b"%PDF-1.4 fake".to_vec())
        .await
        .unwrap();
    assert_eq!(reply["status"], "submitted");

}

#[tokio::test]
async fn excel_download_clears_its_task_either_way() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/teachers/assignments/4/download-excel"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04xlsx".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/teachers/assignments/5/download-excel"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "export failed"})))
        .mount(&server)
        .await;

    let app = app_for(&server, Arc::new(MemorySessionStorage::with_raw(SAVED_TEACHER)));
    app.boot().await.restored().await;

    let bytes = app.api.download_excel(4).await.unwrap();
    assert!(bytes.starts_with(b"PK"));
    assert!(!app.tasks.has_background_tasks());

    let err = app.api.download_excel(5).await.unwrap_err();
    assert_eq!(err.detail(), Some("export failed"));
    assert!(!app.tasks.has_background_tasks());
    // A server error is not an eviction.
    assert!(app.session.is_authenticated());
}

#[tokio::test]
async fn boot_restores_saved_session_and_routes_home() {
    let server = MockServer::start().await;
    let app = app_for(&server, Arc::new(MemorySessionStorage::with_raw(SAVED_TEACHER)));

    assert_eq!(app.guard(&Route::Root), Guard::Loading);
    let applied = app.boot().await.restored().await;

    assert!(applied);
    assert!(app.session.hydrated());
    assert_eq!(app.session.user().unwrap().username, "alice");
    assert_eq!(
        app.transport.default_authorization().as_deref(),
        Some("Bearer tok-saved")
    );
    assert_eq!(app.guard(&Route::Root), Guard::Redirect(Route::TeacherDashboard));
    assert_eq!(
        app.guard(&Route::StudentDashboard),
        Guard::Redirect(Route::Root)
    );
}

#[tokio::test]
async fn boot_with_corrupt_record_starts_signed_out() {
    let server = MockServer::start().await;
    let app = app_for(&server, Arc::new(MemorySessionStorage::with_raw("{not json")));

    let applied = app.boot().await.restored().await;

    assert!(!applied);
    assert!(app.session.hydrated());
    assert!(!app.session.is_authenticated());
    assert_eq!(app.guard(&Route::TeacherDashboard), Guard::Redirect(Route::Login));
}

async fn teacher_app(server: &MockServer) -> ClientApp {
    let app = app_for(server, Arc::new(MemorySessionStorage::with_raw(SAVED_TEACHER)));
    app.boot().await.restored().await;
    app
}

#[tokio::test]
async fn answer_key_upload_goes_out_as_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/assignments/7/extract-answer"))
        .and(header("authorization", "Bearer tok-saved"))
        .and(body_string_contains("name=\"pdf_file\""))
        .and(body_string_contains("name=\"teacher_msg\""))
        .and(body_string_contains("questions 1-5 only"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answer_content": "1. B\n2. D",
            "message": "ok"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = teacher_app(&server).await;
    let extracted = app
        .api
        .extract_answer(7, "key.pdf", b"%PDF-1.4 key".to_vec(), "questions 1-5 only")
        .await
        .unwrap();
    assert_eq!(extracted.answer_content, "1. B\n2. D");
}

#[tokio::test]
async fn answer_key_upload_needs_a_note() {
    let server = MockServer::start().await;
    let app = teacher_app(&server).await;

    let err = app
        .api
        .extract_answer(7, "key.pdf", b"%PDF".to_vec(), "  ")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn reviewed_answer_is_saved_as_json() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/assignments/7/answer"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"answer_content": "1. B\n2. C"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "saved"})))
        .expect(1)
        .mount(&server)
        .await;

    let app = teacher_app(&server).await;
    let reply = app.api.save_answer(7, "1. B\n2. C").await.unwrap();
    assert_eq!(reply["message"], "saved");

    let err = app.api.save_answer(7, "   ").await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
}

#[tokio::test]
async fn assignment_create_edit_delete() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/assignments/"))
        .and(body_json(json!({"title": "Unit 4", "class_id": "101", "deadline": null})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 8, "title": "Unit 4", "teacher_id": 1, "class_id": "101",
            "status": "draft", "answer_file_path": null, "deadline": null,
            "created_at": "2024-03-02T09:00:00"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/assignments/8"))
        .and(body_json(json!({"title": "Unit 4 (final)"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "updated"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/assignments/8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "deleted"})))
        .expect(1)
        .mount(&server)
        .await;

    let app = teacher_app(&server).await;
    let created = app
        .api
        .create_assignment(&NewAssignment {
            title: "Unit 4".into(),
            class_id: "101".into(),
            deadline: None,
        })
        .await
        .unwrap();
    assert_eq!(created.id, 8);

    // Nothing changed: no request.
    let err = app
        .api
        .update_assignment(8, &AssignmentUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));

    let update = AssignmentUpdate {
        title: Some("Unit 4 (final)".into()),
        ..Default::default()
    };
    app.api.update_assignment(8, &update).await.unwrap();
    app.api.delete_assignment(8).await.unwrap();
}

#[tokio::test]
async fn class_report_passes_timestamp_as_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/teachers/assignments/5/class-report"))
        .and(query_param("timestamp", "20240301_120000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": "# Report"})))
        .expect(1)
        .mount(&server)
        .await;

    let app = teacher_app(&server).await;
    let report = app
        .api
        .class_report(5, Some("20240301_120000"))
        .await
        .unwrap();
    assert_eq!(report["content"], "# Report");
}

#[tokio::test]
async fn missing_submission_is_none_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/students/assignments/3/submission"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "no submission"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/students/assignments/4/submission"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 2, "status": "graded"})))
        .mount(&server)
        .await;

    let app = teacher_app(&server).await;
    assert!(app.api.my_submission(3).await.unwrap().is_none());
    let found = app.api.my_submission(4).await.unwrap().unwrap();
    assert_eq!(found["status"], "graded");
    assert!(app.session.is_authenticated());
}
