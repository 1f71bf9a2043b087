use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use taskdesk::auth::Authenticator;
use taskdesk::sms::{DisabledSender, SmsSender, TwilioSender};
use taskdesk::user::{NewUser, Role};
use taskdesk::{router, AppState, Config, TaskStore};

const SECRET: &str = "integration-secret";

struct Harness {
    app: Router,
    admin: String,
    bea: String,
    cal: String,
}

fn harness_with(sms: Arc<dyn SmsSender>) -> Harness {
    let store = TaskStore::in_memory();
    let now = Utc::now();
    let add = |name: &str, role: Role| {
        store
            .add_user(
                NewUser {
                    name: name.into(),
                    email: format!("{}@example.com", name.to_lowercase()),
                    role,
                    department: None,
                },
                now,
            )
            .unwrap()
    };
    let admin = add("Admin", Role::Admin);
    let bea = add("Bea", Role::User);
    let cal = add("Cal", Role::User);

    let auth = Authenticator::new(SECRET, 1);
    let config = Config {
        jwt_secret: SECRET.into(),
        ..Config::default()
    };
    Harness {
        app: router(AppState::new(config, store, sms)),
        admin: auth.issue(&admin.id, Role::Admin).unwrap(),
        bea: auth.issue(&bea.id, Role::User).unwrap(),
        cal: auth.issue(&cal.id, Role::User).unwrap(),
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(DisabledSender))
}

impl Harness {
    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn user_id(&self, token: &str) -> String {
        let (status, me) = self.call(Method::GET, "/api/users/me", Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
        me["id"].as_str().unwrap().to_string()
    }

    async fn create_task(&self, body: Value) -> Value {
        let (status, task) = self
            .call(Method::POST, "/api/tasks", Some(&self.admin), Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{task}");
        task
    }

    async fn titles(&self, token: &str, uri: &str) -> Vec<String> {
        let (status, page) = self.call(Method::GET, uri, Some(token), None).await;
        assert_eq!(status, StatusCode::OK, "{uri}: {page}");
        let mut titles: Vec<String> = page["tasks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["title"].as_str().unwrap().to_string())
            .collect();
        titles.sort();
        titles
    }

    async fn create_task_for(&self, assignee_token: &str, title: &str) -> Value {
        let assignee = self.user_id(assignee_token).await;
        let (status, task) = self
            .call(
                Method::POST,
                "/api/tasks",
                Some(&self.admin),
                Some(json!({ "title": title, "assignedTo": assignee, "priority": "high" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{task}");
        task
    }
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthorized() {
    let h = harness();
    let (status, body) = h.call(Method::GET, "/api/tasks", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let forged = Authenticator::new("other", 1).issue("x", Role::Admin).unwrap();
    let (status, _) = h.call(Method::GET, "/api/tasks", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn post_without_title_is_bad_request() {
    let h = harness();
    let bea = h.user_id(&h.bea).await;
    let (status, body) = h
        .call(Method::POST, "/api/tasks", Some(&h.admin), Some(json!({ "assignedTo": bea })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Title is required");
}

#[tokio::test]
async fn only_admins_create_tasks() {
    let h = harness();
    let bea = h.user_id(&h.bea).await;
    let (status, _) = h
        .call(
            Method::POST,
            "/api/tasks",
            Some(&h.bea),
            Some(json!({ "title": "self-assigned", "assignedTo": bea })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_assignee_is_rejected() {
    let h = harness();
    let (status, _) = h
        .call(
            Method::POST,
            "/api/tasks",
            Some(&h.admin),
            Some(json!({ "title": "orphan", "assignedTo": "ghost" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn full_lifecycle_sets_timestamps_once() {
    let h = harness();
    let task = h.create_task_for(&h.bea, "Ship the release").await;
    let id = task["id"].as_str().unwrap();
    assert_eq!(task["status"], "pending");
    assert_eq!(task["priority"], "high");

    let (status, page) = h.call(Method::GET, "/api/tasks", Some(&h.bea), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);

    let (status, accepted) = h
        .call(Method::POST, &format!("/api/tasks/{id}/accept"), Some(&h.bea), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["status"], "accepted");
    assert!(accepted["acceptedAt"].is_string());

    let (status, started) = h
        .call(Method::POST, &format!("/api/tasks/{id}/start"), Some(&h.bea), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["status"], "in-progress");

    let (status, done) = h
        .call(
            Method::POST,
            &format!("/api/tasks/{id}/complete"),
            Some(&h.bea),
            Some(json!({ "actualHours": 3 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "completed");
    assert_eq!(done["actualHours"], 3.0);
    let completed_at = done["completedAt"].clone();
    assert!(completed_at.is_string());

    let (status, again) = h
        .call(
            Method::PATCH,
            "/api/tasks",
            Some(&h.bea),
            Some(json!({ "id": id, "status": "completed" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["completedAt"], completed_at);
}

#[tokio::test]
async fn decline_requires_reason() {
    let h = harness();
    let task = h.create_task_for(&h.bea, "Weekend on-call").await;
    let uri = format!("/api/tasks/{}/decline", task["id"].as_str().unwrap());

    let (status, _) = h.call(Method::POST, &uri, Some(&h.bea), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, declined) = h
        .call(Method::POST, &uri, Some(&h.bea), Some(json!({ "reason": "on leave" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(declined["status"], "declined");
    assert_eq!(declined["declineReason"], "on leave");
}

#[tokio::test]
async fn illegal_transition_conflicts() {
    let h = harness();
    let task = h.create_task_for(&h.bea, "Skip ahead").await;
    let id = task["id"].as_str().unwrap();

    let (status, body) = h
        .call(Method::POST, &format!("/api/tasks/{id}/start"), Some(&h.bea), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "cannot move task from pending to in-progress");
}

#[tokio::test]
async fn participants_only() {
    let h = harness();
    let task = h.create_task_for(&h.bea, "Private").await;
    let id = task["id"].as_str().unwrap();

    let (status, _) = h.call(Method::GET, &format!("/api/tasks/{id}"), Some(&h.cal), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = h
        .call(Method::POST, &format!("/api/tasks/{id}/accept"), Some(&h.cal), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = h.call(Method::GET, &format!("/api/tasks/{id}"), Some(&h.admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = h.call(Method::GET, "/api/tasks/missing", Some(&h.admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, page) = h.call(Method::GET, "/api/tasks", Some(&h.cal), None).await;
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn assignee_cannot_edit_details() {
    let h = harness();
    let task = h.create_task_for(&h.bea, "Fixed title").await;
    let id = task["id"].as_str().unwrap();

    let (status, _) = h
        .call(
            Method::PATCH,
            &format!("/api/tasks/{id}"),
            Some(&h.bea),
            Some(json!({ "title": "Easier task" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, edited) = h
        .call(
            Method::PATCH,
            &format!("/api/tasks/{id}"),
            Some(&h.admin),
            Some(json!({ "title": "Sharper title", "expectedRevision": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["title"], "Sharper title");
    assert_eq!(edited["revision"], 2);
}

#[tokio::test]
async fn stale_revision_conflicts() {
    let h = harness();
    let task = h.create_task_for(&h.bea, "Contended").await;
    let id = task["id"].as_str().unwrap();
    let patch = json!({ "description": "first", "expectedRevision": 1 });

    let (status, _) = h
        .call(Method::PATCH, &format!("/api/tasks/{id}"), Some(&h.admin), Some(patch.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = h
        .call(Method::PATCH, &format!("/api/tasks/{id}"), Some(&h.admin), Some(patch))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn delete_by_query() {
    let h = harness();
    let task = h.create_task_for(&h.bea, "Throwaway").await;
    let uri = format!("/api/tasks?id={}", task["id"].as_str().unwrap());

    let (status, _) = h.call(Method::DELETE, &uri, Some(&h.bea), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = h.call(Method::DELETE, &uri, Some(&h.admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let (status, _) = h.call(Method::DELETE, &uri, Some(&h.admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = h.call(Method::DELETE, "/api/tasks", Some(&h.admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn performance_and_stats() {
    let h = harness();
    let task = h.create_task_for(&h.bea, "Measured").await;
    h.create_task_for(&h.bea, "Still open").await;
    let id = task["id"].as_str().unwrap();
    for action in ["accept", "complete"] {
        let (status, _) = h
            .call(Method::POST, &format!("/api/tasks/{id}/{action}"), Some(&h.bea), None)
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, perf) = h
        .call(Method::GET, "/api/performance?period=month", Some(&h.bea), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(perf["period"], "month");
    assert_eq!(perf["total"], 2);
    assert_eq!(perf["completed"], 1);
    assert_eq!(perf["completionRate"], 50.0);

    let (status, empty) = h.call(Method::GET, "/api/performance", Some(&h.cal), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(empty["completionRate"], 0.0);

    let (status, _) = h
        .call(Method::GET, "/api/performance?period=decade", Some(&h.bea), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bea = h.user_id(&h.bea).await;
    let (status, _) = h
        .call(Method::GET, &format!("/api/performance?userId={bea}"), Some(&h.cal), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, stats) = h.call(Method::GET, "/api/stats", Some(&h.admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalTasks"], 2);
    assert_eq!(stats["completedTasks"], 1);
    assert_eq!(stats["pendingTasks"], 1);
    assert_eq!(stats["tasksCompletedThisWeek"], 1);
}

#[tokio::test]
async fn user_management() {
    let h = harness();
    let new_user = json!({ "name": "Dee", "email": "dee@example.com" });

    let (status, _) = h.call(Method::POST, "/api/users", Some(&h.bea), Some(new_user.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, created) = h.call(Method::POST, "/api/users", Some(&h.admin), Some(new_user.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["role"], "user");
    let (status, _) = h.call(Method::POST, "/api/users", Some(&h.admin), Some(new_user)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, users) = h.call(Method::GET, "/api/users", Some(&h.admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 4);
    assert_eq!(users[0]["stats"]["totalTasksAssigned"], 0);

    let unregistered = Authenticator::new(SECRET, 1).issue("ghost", Role::User).unwrap();
    let (status, _) = h.call(Method::GET, "/api/users/me", Some(&unregistered), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sms_reminder_validation_and_failure() {
    let h = harness();
    let (status, _) = h
        .call(Method::POST, "/api/send-sms-reminder", Some(&h.bea), Some(json!({ "phone": "" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = h
        .call(
            Method::POST,
            "/api/send-sms-reminder",
            Some(&h.bea),
            Some(json!({ "phone": "+15550199", "message": "Task due tomorrow" })),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to send SMS");
}

#[tokio::test]
async fn sms_reminder_delivers_through_twilio() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2010-04-01/Accounts/AC1/Messages.json"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let sender =
        TwilioSender::new(server.uri(), "AC1".into(), "tok".into(), "+15550100".into()).unwrap();
    let h = harness_with(Arc::new(sender));
    let (status, body) = h
        .call(
            Method::POST,
            "/api/send-sms-reminder",
            Some(&h.bea),
            Some(json!({ "phone": "+15550199", "message": "Task due tomorrow" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn list_filters_from_query_string() {
    let h = harness();
    let bea = h.user_id(&h.bea).await;
    h.create_task(json!({
        "title": "Fix login bug",
        "assignedTo": bea,
        "priority": "urgent",
        "category": "development",
        "tags": ["Auth"],
        "dueDate": "2030-01-05T00:00:00Z",
    }))
    .await;
    let review = h
        .create_task(json!({
            "title": "Design review",
            "assignedTo": bea,
            "priority": "low",
            "category": "design",
            "dueDate": "2030-02-01T00:00:00Z",
        }))
        .await;
    h.create_task(json!({ "title": "Write docs", "assignedTo": bea, "category": "documentation" }))
        .await;
    let id = review["id"].as_str().unwrap();
    let (status, _) = h
        .call(Method::POST, &format!("/api/tasks/{id}/accept"), Some(&h.bea), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(h.titles(&h.admin, "/api/tasks?status=accepted").await, ["Design review"]);
    assert_eq!(h.titles(&h.admin, "/api/tasks?priority=urgent").await, ["Fix login bug"]);
    assert_eq!(h.titles(&h.admin, "/api/tasks?category=documentation").await, ["Write docs"]);
    assert_eq!(h.titles(&h.admin, "/api/tasks?search=auth").await, ["Fix login bug"]);
    assert_eq!(
        h.titles(
            &h.admin,
            "/api/tasks?dueFrom=2030-01-01T00:00:00Z&dueTo=2030-01-31T00:00:00Z"
        )
        .await,
        ["Fix login bug"]
    );

    let cal = h.user_id(&h.cal).await;
    let (_, mine) = h
        .call(Method::GET, &format!("/api/tasks?assignedTo={cal}"), Some(&h.bea), None)
        .await;
    assert_eq!(mine["total"], 3);

    let (status, page) = h
        .call(Method::GET, "/api/tasks?page=2&pageSize=2", Some(&h.admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 3);
    assert_eq!(page["page"], 2);
    assert_eq!(page["pageSize"], 2);
    assert_eq!(page["totalPages"], 2);
    assert_eq!(page["tasks"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn huge_page_number_is_an_empty_page() {
    let h = harness();
    h.create_task_for(&h.bea, "Only one").await;

    let uri = format!("/api/tasks?page={}", usize::MAX);
    let (status, page) = h.call(Method::GET, &uri, Some(&h.admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert!(page["tasks"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn bad_query_values_get_json_errors() {
    let h = harness();
    for uri in [
        "/api/tasks?status=bogus",
        "/api/tasks?page=abc",
        "/api/tasks?dueFrom=yesterday",
        "/api/tasks?id=x&pageSize=-1",
    ] {
        let (status, body) = h.call(Method::GET, uri, Some(&h.admin), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["error"].is_string(), "{uri}: {body}");
    }
}

#[tokio::test]
async fn only_admins_cancel() {
    let h = harness();
    let task = h.create_task_for(&h.bea, "Obsolete").await;
    let uri = format!("/api/tasks/{}/cancel", task["id"].as_str().unwrap());

    let (status, body) = h.call(Method::POST, &uri, Some(&h.bea), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].is_string());

    let (status, cancelled) = h.call(Method::POST, &uri, Some(&h.admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (status, _) = h
        .call(Method::POST, "/api/tasks/missing/cancel", Some(&h.admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_resets_declined_task() {
    let h = harness();
    let task = h.create_task_for(&h.bea, "Bounced").await;
    let id = task["id"].as_str().unwrap();
    let (status, _) = h
        .call(
            Method::POST,
            &format!("/api/tasks/{id}/decline"),
            Some(&h.bea),
            Some(json!({ "reason": "no capacity" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let reset = json!({ "status": "pending" });
    let (status, _) = h
        .call(Method::PATCH, &format!("/api/tasks/{id}"), Some(&h.bea), Some(reset.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, pending) = h
        .call(Method::PATCH, &format!("/api/tasks/{id}"), Some(&h.admin), Some(reset))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["status"], "pending");
    assert!(pending["declineReason"].is_null());
    assert!(pending["declinedAt"].is_null());
}

#[tokio::test]
async fn reopening_clears_completed_at() {
    let h = harness();
    let task = h.create_task_for(&h.bea, "Needs another pass").await;
    let id = task["id"].as_str().unwrap();
    for action in ["accept", "complete"] {
        let (status, _) = h
            .call(Method::POST, &format!("/api/tasks/{id}/{action}"), Some(&h.bea), None)
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, reopened) = h
        .call(Method::POST, &format!("/api/tasks/{id}/start"), Some(&h.bea), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reopened["status"], "in-progress");
    assert!(reopened["completedAt"].is_null());

    let (status, done) = h
        .call(Method::POST, &format!("/api/tasks/{id}/complete"), Some(&h.bea), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(done["completedAt"].is_string());
}

#[tokio::test]
async fn admin_reads_anyones_performance() {
    let h = harness();
    let task = h.create_task_for(&h.bea, "Tracked").await;
    let id = task["id"].as_str().unwrap();
    for action in ["accept", "complete"] {
        h.call(Method::POST, &format!("/api/tasks/{id}/{action}"), Some(&h.bea), None)
            .await;
    }

    let bea = h.user_id(&h.bea).await;
    let (status, perf) = h
        .call(
            Method::GET,
            &format!("/api/performance?userId={bea}&period=6months"),
            Some(&h.admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(perf["period"], "6months");
    assert_eq!(perf["total"], 1);
    assert_eq!(perf["completed"], 1);
    assert_eq!(perf["completionRate"], 100.0);
    assert_eq!(perf["tasks"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn patch_by_body_requires_id() {
    let h = harness();
    let (status, body) = h
        .call(Method::PATCH, "/api/tasks", Some(&h.admin), Some(json!({ "title": "No target" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "id is required");
}

#[tokio::test]
async fn decline_reason_alone_is_rejected() {
    let h = harness();
    let task = h.create_task_for(&h.bea, "Annotated").await;
    let id = task["id"].as_str().unwrap();

    let (status, _) = h
        .call(
            Method::PATCH,
            &format!("/api/tasks/{id}"),
            Some(&h.bea),
            Some(json!({ "declineReason": "just saying" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, stored) = h.call(Method::GET, &format!("/api/tasks/{id}"), Some(&h.bea), None).await;
    assert_eq!(stored["revision"], 1);
    assert!(stored["declineReason"].is_null());
}
