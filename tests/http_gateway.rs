//! Integration tests for `HttpGateway`.
//!
//! Each test spins up an Axum stub of the interview service on a random
//! port and exercises the real JSON-over-HTTP contract.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use reqwest::Url;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use interview_assist::error::GatewayError;
use interview_assist::gateway::{Gateway, HttpGateway, InterviewStartRequest};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Request bodies seen by the stub, tagged by path.
type Seen = Arc<Mutex<Vec<(String, Value)>>>;

async fn onboarding_start(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
    seen.lock().unwrap().push(("start".into(), body));
    Json(json!({
        "onboarding_session_id": "o1",
        "message": "Hi, what's your name?",
        "finished": false,
    }))
}

async fn onboarding_continue(
    State(seen): State<Seen>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    seen.lock().unwrap().push(("continue".into(), body.clone()));
    if body["onboarding_session_id"] != "o1" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Onboarding session not found.", "finished": true})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "message": "Check your inbox.",
            "stage": "email_code",
            "resend_available_in": 30,
            "expires_in": 300,
            "attempts_left": 3,
            "finished": false,
        })),
    )
}

async fn onboarding_resend(
    State(seen): State<Seen>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    seen.lock().unwrap().push(("resend".into(), body));
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({"error": "Please wait before requesting a new code."})),
    )
}

async fn start_interview(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
    seen.lock().unwrap().push(("start-interview".into(), body));
    Json(json!({"session_id": "s1", "question": "What is a goroutine?"}))
}

async fn submit(State(seen): State<Seen>, Json(body): Json<Value>) -> (StatusCode, String) {
    seen.lock().unwrap().push(("submit".into(), body.clone()));
    match body["answer"].as_str() {
        Some("slow") => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            (StatusCode::OK, json!({"finished": true}).to_string())
        }
        Some("garbage") => (StatusCode::OK, "<html>oops</html>".into()),
        Some("crash") => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".into()),
        _ => (StatusCode::OK, json!({"finished": true}).to_string()),
    }
}

/// Start the stub service on a random port, return (base url, seen bodies).
async fn start_server() -> (Url, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/api/onboarding/start", post(onboarding_start))
        .route("/api/onboarding/continue", post(onboarding_continue))
        .route("/api/onboarding/resend", post(onboarding_resend))
        .route("/api/start-interview", post(start_interview))
        .route("/api/submit", post(submit))
        .with_state(Arc::clone(&seen));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let base = Url::parse(&format!("http://127.0.0.1:{port}/api")).unwrap();
    (base, seen)
}

fn gateway(base: Url) -> HttpGateway {
    HttpGateway::new(base, Duration::from_secs(1)).unwrap()
}

#[tokio::test]
async fn onboarding_round_trip() {
    timeout(TEST_TIMEOUT, async {
        let (base, seen) = start_server().await;
        let gateway = gateway(base);

        let start = gateway.start_onboarding().await.unwrap();
        assert_eq!(start.onboarding_session_id, "o1");
        assert_eq!(start.message, "Hi, what's your name?");
        assert!(!start.verification.is_email_code());

        let reply = gateway.continue_onboarding("o1", "a@x.com").await.unwrap();
        assert!(reply.verification.is_email_code());
        assert_eq!(reply.verification.resend_available_in, Some(30));
        assert_eq!(reply.verification.expires_in, Some(300));
        assert_eq!(reply.verification.attempts_left, Some(3));
        assert!(!reply.finished);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, "start");
        assert_eq!(
            seen[1],
            (
                "continue".to_string(),
                json!({"onboarding_session_id": "o1", "message": "a@x.com"})
            )
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn error_body_is_a_server_error_with_finished_flag() {
    timeout(TEST_TIMEOUT, async {
        let (base, _seen) = start_server().await;
        let gateway = gateway(base);

        let err = gateway.continue_onboarding("gone", "hello").await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Server {
                message: "Onboarding session not found.".into(),
                finished: true,
            }
        );

        let err = gateway.resend_code("o1").await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::server("Please wait before requesting a new code.")
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn interview_round_trip() {
    timeout(TEST_TIMEOUT, async {
        let (base, seen) = start_server().await;
        let gateway = gateway(base);

        let request = InterviewStartRequest {
            topic: "Go".into(),
            name: "A".into(),
            email: "a@x.com".into(),
        };
        let start = gateway.start_interview(&request).await.unwrap();
        assert_eq!(start.session_id, "s1");
        assert_eq!(start.question, "What is a goroutine?");

        let reply = gateway.submit_answer("s1", "green threads").await.unwrap();
        assert!(reply.finished);
        assert!(reply.question.is_none());

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].1, json!({"topic": "Go", "name": "A", "email": "a@x.com"}));
        assert_eq!(seen[1].1, json!({"session_id": "s1", "answer": "green threads"}));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unreadable_and_failed_responses() {
    timeout(TEST_TIMEOUT, async {
        let (base, _seen) = start_server().await;
        let gateway = gateway(base);

        let err = gateway.submit_answer("s1", "garbage").await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));

        let err = gateway.submit_answer("s1", "crash").await.unwrap_err();
        assert!(matches!(err, GatewayError::Server { ref message, .. } if message.contains("500")));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn slow_server_times_out_as_transport_failure() {
    timeout(TEST_TIMEOUT, async {
        let (base, _seen) = start_server().await;
        let gateway = gateway(base);

        let err = gateway.submit_answer("s1", "slow").await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(ref m) if m.contains("timed out")));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unreachable_server_is_transport_failure() {
    timeout(TEST_TIMEOUT, async {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let gateway = gateway(Url::parse(&format!("http://127.0.0.1:{port}")).unwrap());
        let err = gateway.start_onboarding().await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
        assert!(!err.is_fatal());
    })
    .await
    .expect("test timed out");
}
