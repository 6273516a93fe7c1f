//! The webhook HTTP server.
//!
//! | Route | Response |
//! |-------|----------|
//! | `POST <webhook path>` | `202` + dispatch summary, `401` bad signature, `400` bad payload |
//! | `GET /health` | `200 ok` |
//!
//! Every delivery whose signature verifies is answered `202 Accepted`, even if
//! it was suppressed, ignored, or abandoned: redelivering it would not change
//! the outcome.

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use reconciler::{DispatchOutcome, EventDispatcher, SyncEvent};

use crate::payload::{decode_event, DecodeError, DELIVERY_HEADER, EVENT_HEADER};
use crate::signature::{SignatureError, WebhookSecret, SIGNATURE_HEADER};

/// Default path GitHub posts deliveries to.
pub const DEFAULT_WEBHOOK_PATH: &str = "/webhooks";

/// A delivery was rejected before reaching the dispatcher.
#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("missing {EVENT_HEADER} header")]
    MissingEventType,

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ReceiveError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Signature(_) => StatusCode::UNAUTHORIZED,
            Self::MissingEventType | Self::Decode(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Authenticates deliveries, decodes them, and hands them to the dispatcher.
#[derive(Debug, Clone)]
pub struct WebhookReceiver {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    secret: WebhookSecret,
    dispatcher: EventDispatcher,
}

impl WebhookReceiver {
    pub fn new(secret: WebhookSecret, dispatcher: EventDispatcher) -> Self {
        Self {
            inner: Arc::new(Inner { secret, dispatcher }),
        }
    }

    /// Turns a raw delivery into a typed event.
    ///
    /// The signature is checked before the body is parsed.
    pub fn parse(
        &self,
        body: &[u8],
        signature: Option<&str>,
        event_type: Option<&str>,
    ) -> Result<SyncEvent, ReceiveError> {
        self.inner.secret.verify(body, signature)?;
        let event_type = event_type.ok_or(ReceiveError::MissingEventType)?;
        Ok(decode_event(event_type, body)?)
    }

    /// Parses and dispatches one delivery.
    pub async fn receive(
        &self,
        body: &[u8],
        signature: Option<&str>,
        event_type: Option<&str>,
    ) -> Result<DispatchOutcome, ReceiveError> {
        let event = self.parse(body, signature, event_type)?;
        Ok(self.inner.dispatcher.dispatch(event).await)
    }
}

/// Builds the application router.
pub fn router(receiver: WebhookReceiver, webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, post(handle_delivery))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(receiver)
}

/// Serves `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening for webhooks");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> &'static str {
    "ok"
}

async fn handle_delivery(
    State(receiver): State<WebhookReceiver>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let delivery = header(&headers, DELIVERY_HEADER)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let event_type = header(&headers, EVENT_HEADER);
    let span = info_span!(
        "delivery",
        delivery = %delivery,
        event = event_type.unwrap_or("-"),
    );

    async {
        match receiver
            .receive(&body, header(&headers, SIGNATURE_HEADER), event_type)
            .await
        {
            Ok(outcome) => (StatusCode::ACCEPTED, Json(outcome.summary())).into_response(),
            Err(err) => {
                warn!(error = %err, "rejected delivery");
                (err.status(), Json(json!({ "error": err.to_string() }))).into_response()
            }
        }
    }
    .instrument(span)
    .await
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use reconciler::testing::InMemoryGateway;
    use reconciler::{
        BotIdentity, ColumnName, LabelName, ProjectName, ReconciliationEngine, StateName,
        SyncStateDefinition, SyncStateRegistry,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    const SECRET: &str = "webhook-secret";

    async fn app() -> (Arc<InMemoryGateway>, Router) {
        let gateway = Arc::new(InMemoryGateway::new());
        let project = gateway.add_project("Suggestions overview");
        gateway.add_label("Suggestion");
        let mut registry = SyncStateRegistry::new();
        for state in ["Pending", "Rejected"] {
            gateway.add_column(&project, state);
            gateway.add_label(state);
            registry
                .register(
                    gateway.as_ref(),
                    SyncStateDefinition {
                        name: StateName::new(state).unwrap(),
                        project: ProjectName::new("Suggestions overview").unwrap(),
                        column: ColumnName::new(state).unwrap(),
                        labels: vec![
                            LabelName::new("Suggestion").unwrap(),
                            LabelName::new(state).unwrap(),
                        ],
                    },
                )
                .await
                .unwrap();
        }
        gateway.clear_calls();

        let engine = ReconciliationEngine::new(gateway.clone(), Arc::new(registry));
        let dispatcher =
            EventDispatcher::new(engine, BotIdentity::new("boardsync[bot]").unwrap());
        let receiver = WebhookReceiver::new(WebhookSecret::new(SECRET).unwrap(), dispatcher);
        (gateway, router(receiver, DEFAULT_WEBHOOK_PATH))
    }

    fn labeled_body(sender: &str) -> Vec<u8> {
        json!({
            "action": "labeled",
            "issue": {"number": 1},
            "label": {"name": "Pending"},
            "sender": {"login": sender}
        })
        .to_string()
        .into_bytes()
    }

    fn delivery(event: &str, body: Vec<u8>, signature: Option<String>) -> Request<Body> {
        let mut request = Request::post(DEFAULT_WEBHOOK_PATH)
            .header(EVENT_HEADER, event)
            .header(DELIVERY_HEADER, "72d3162e-cc78-11e3-81ab-4c9367dc0958");
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        request.body(Body::from(body)).unwrap()
    }

    fn signed(event: &str, body: Vec<u8>) -> Request<Body> {
        let signature = WebhookSecret::new(SECRET).unwrap().sign(&body);
        delivery(event, body, Some(signature))
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn signed_label_event_is_reconciled() {
        let (gateway, app) = app().await;
        gateway.add_issue(1, &["Suggestion", "Pending"]);

        let response = app.oneshot(signed("issues", labeled_body("octocat"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["status"], "reconciled");
        assert_eq!(body["result"]["outcome"], "card_created");
        assert_eq!(gateway.cards_in(gateway.column_id("Pending")).len(), 1);
    }

    #[tokio::test]
    async fn bad_or_missing_signature_is_unauthorized_and_touches_nothing() {
        let (gateway, app) = app().await;
        gateway.add_issue(1, &["Suggestion", "Pending"]);

        let forged = WebhookSecret::new("other-secret")
            .unwrap()
            .sign(&labeled_body("octocat"));
        let response = app
            .clone()
            .oneshot(delivery("issues", labeled_body("octocat"), Some(forged)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(delivery("issues", labeled_body("octocat"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn undecodable_payload_is_a_bad_request() {
        let (gateway, app) = app().await;

        let response = app
            .oneshot(signed("issues", br#"{"action": "labeled"}"#.to_vec()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn own_events_are_accepted_but_suppressed() {
        let (gateway, app) = app().await;
        gateway.add_issue(1, &["Suggestion", "Pending"]);

        let response = app
            .oneshot(signed("issues", labeled_body("boardsync[bot]")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(response).await["status"], "suppressed");
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn untracked_event_types_are_ignored() {
        let (_, app) = app().await;

        let response = app
            .oneshot(signed("ping", br#"{"zen": "Keep it logically awesome."}"#.to_vec()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(response).await["status"], "ignored");
    }

    #[tokio::test]
    async fn health_check_answers_ok() {
        let (_, app) = app().await;

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }
}
