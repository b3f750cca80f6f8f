//! HTTP clients against a local axum mock of the recognition service and
//! the telemetry sink.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use sanus_node::config::secrets::SecretString;
use sanus_node::forwarder::{EventSink, HttpEventSink};
use sanus_node::model::{
    CaptureEvent, CaptureId, DispatchRequest, EventType, NodeProfile, RecheckRequest,
    RecognitionResult, ResponseMessage, StaffProfile, TelemetryEvent, Verdict,
};
use sanus_node::recognition::{HttpRecognitionClient, RecognitionClient};

/// What the mock received: (path, body, authorization header, accept header).
type Seen = Arc<Mutex<Vec<(String, Value, Option<String>, Option<String>)>>>;

#[derive(Clone)]
struct Mock {
    seen: Seen,
    entry_reply: Value,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn entry(
    State(mock): State<Mock>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    mock.seen.lock().unwrap().push((
        "/entry".to_string(),
        body,
        header(&headers, "authorization"),
        header(&headers, "accept"),
    ));
    Json(mock.entry_reply.clone())
}

async fn recheck(State(mock): State<Mock>, Json(body): Json<Value>) -> Json<Value> {
    let identities = body["identities"].as_array().cloned().unwrap_or_default();
    mock.seen
        .lock()
        .unwrap()
        .push(("/recheck".to_string(), body, None, None));
    let verdicts: Vec<Value> = identities
        .into_iter()
        .map(|id| json!({ "identity": id, "compliant": id == "alice" }))
        .collect();
    Json(Value::Array(verdicts))
}

async fn events(
    State(mock): State<Mock>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let reject = body["identity"] == "reject-me";
    mock.seen.lock().unwrap().push((
        "/events".to_string(),
        body,
        header(&headers, "authorization"),
        None,
    ));
    if reject {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::CREATED
    }
}

async fn serve(entry_reply: Value) -> (String, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/entry", post(entry))
        .route("/recheck", post(recheck))
        .route("/events", post(events))
        .route("/telemetry-event", post(events))
        .with_state(Mock {
            seen: seen.clone(),
            entry_reply,
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), seen)
}

fn request(image: &[u8]) -> DispatchRequest {
    DispatchRequest::new(CaptureEvent::new("ward3_door", 1000.25, image.to_vec()))
}

#[tokio::test]
async fn identify_posts_base64_image_and_parses_results() {
    let (url, seen) = serve(json!({
        "face_found": true,
        "results": [
            { "identity": "alice", "compliant": true },
            { "identity": "None", "compliant": false },
        ]
    }))
    .await;
    let client = HttpRecognitionClient::new(&url, Duration::from_secs(5)).unwrap();

    let results = client.identify(&request(b"\x01\x02\x03")).await.unwrap();

    assert_eq!(
        results,
        vec![
            RecognitionResult::identified("alice", true),
            RecognitionResult {
                identity: None,
                compliant: Some(false),
                face_found: true,
            },
        ]
    );

    let seen = seen.lock().unwrap();
    let (path, body, _, accept) = &seen[0];
    assert_eq!(path, "/entry");
    assert_eq!(body["node_id"], "ward3_door");
    assert_eq!(body["image"], "AQID");
    assert_eq!(body["shape"], "(480, 640, 3)");
    assert_eq!(body["timestamp"], 1000.25);
    assert_eq!(accept.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn identify_without_face_yields_single_no_face_result() {
    let (url, _) = serve(json!({ "face_found": false, "results": [] })).await;
    let client = HttpRecognitionClient::new(&url, Duration::from_secs(5)).unwrap();

    let results = client.identify(&request(b"nobody")).await.unwrap();

    assert_eq!(results, vec![RecognitionResult::no_face()]);
}

#[tokio::test]
async fn recheck_sends_batch_and_parses_verdicts() {
    let (url, seen) = serve(json!({})).await;
    let client = HttpRecognitionClient::new(format!("{url}/"), Duration::from_secs(5)).unwrap();
    let capture_id = CaptureId::new();

    let verdicts = client
        .recheck(&RecheckRequest {
            node_id: "ward3_door".to_string(),
            identities: vec!["alice".to_string(), "bob".to_string()],
            timestamp: 1020.0,
            captured_at: 1000.0,
            capture_ids: vec![capture_id],
            headers: Default::default(),
        })
        .await
        .unwrap();

    assert_eq!(
        verdicts,
        vec![
            Verdict {
                identity: "alice".to_string(),
                compliant: true,
            },
            Verdict {
                identity: "bob".to_string(),
                compliant: false,
            },
        ]
    );

    let seen = seen.lock().unwrap();
    let (_, body, _, _) = &seen[0];
    assert_eq!(body["captured_at"], 1000.0);
    assert_eq!(body["capture_ids"][0], capture_id.0.to_string());
}

#[tokio::test]
async fn unreachable_service_is_a_transient_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client =
        HttpRecognitionClient::new(format!("http://{addr}"), Duration::from_secs(2)).unwrap();
    let err = client.identify(&request(b"x")).await.unwrap_err();

    assert!(err.is_transient(), "{err}");
}

fn event(identity: &str) -> TelemetryEvent {
    TelemetryEvent::build(
        EventType::Alert,
        chrono::Utc::now(),
        &NodeProfile::unknown("ward3_door"),
        &StaffProfile::unknown(identity),
        ResponseMessage::AlertGiven,
    )
}

#[tokio::test]
async fn sink_posts_event_json_with_bearer_token() {
    let (url, seen) = serve(json!({})).await;
    let sink = HttpEventSink::new(format!("{url}/events"), Duration::from_secs(5))
        .unwrap()
        .with_token(SecretString::from("sink-token".to_string()));

    sink.post(&event("bob")).await.unwrap();

    let seen = seen.lock().unwrap();
    let (path, body, auth, _) = &seen[0];
    assert_eq!(path, "/events");
    assert_eq!(body["type"], "Alert");
    assert_eq!(body["response_message"], "Alert given");
    assert_eq!(auth.as_deref(), Some("Bearer sink-token"));
}

#[tokio::test]
async fn sink_rejection_is_an_error() {
    let (url, _) = serve(json!({})).await;
    let sink = HttpEventSink::new(format!("{url}/events"), Duration::from_secs(5)).unwrap();

    let err = sink.post(&event("reject-me")).await.unwrap_err();

    assert!(matches!(err, sanus_node::error::Error::Sink(_)), "{err}");
}

#[tokio::test]
async fn sink_url_without_path_posts_to_default_route() {
    let (url, seen) = serve(json!({})).await;
    let sink = HttpEventSink::new(&url, Duration::from_secs(5)).unwrap();

    sink.post(&event("bob")).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1["identity"], "bob");
}

#[test]
fn malformed_sink_url_is_a_config_error() {
    let result = HttpEventSink::new("not a url", Duration::from_secs(1));
    assert!(matches!(result, Err(sanus_node::error::Error::Config(_))));
}
