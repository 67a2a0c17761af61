//! Bridge service: wires the bus, the correlation table and the HTTP server.
//!
//! The HTTP listener is bound only after the readiness controller opens the
//! bridge, so no caller can reach the prompt route before the execution unit
//! is provisioned.

use crate::domain::config::BridgeConfig;
use crate::domain::error::{BridgeError, ServiceError};
use crate::domain::pending::{sweep_task, CorrelationStore, CorrelationTable};
use crate::domain::types::{HealthResponse, PendingReport, ReadinessState};
use crate::ipc::{
    BusCommandSender, ConnectionMonitor, PromptHandler, ResultDispatcher, ResultEvent,
    ResultRouter, TransportStatus,
};
use crate::middleware::{create_cors_layer, TracingLayer};
use crate::ports::DeploymentApi;
use crate::provisioning::ProvisioningGate;
use crate::readiness::ReadinessController;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use shared_bus::{EventFilter, EventTopic, InMemoryEventBus, Subscription};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};

/// Buffered result events between the router and the dispatcher
const RESULT_CHANNEL_CAPACITY: usize = 1024;

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

/// Subscriptions taken at construction so no early event is missed.
struct Listeners {
    monitor: ConnectionMonitor,
    router: ResultRouter,
    results_rx: mpsc::Receiver<ResultEvent>,
    heartbeats: Subscription,
}

/// Handles of the background tasks. Dropping aborts them.
pub struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

pub struct BridgeService {
    config: BridgeConfig,
    table: Arc<CorrelationTable>,
    readiness: Arc<ReadinessController>,
    handler: Arc<PromptHandler>,
    transport: Arc<TransportStatus>,
    listeners: Option<Listeners>,
}

impl BridgeService {
    pub fn new(
        config: BridgeConfig,
        bus: Arc<InMemoryEventBus>,
        deployments: Arc<dyn DeploymentApi>,
    ) -> Result<Self, ServiceError> {
        config
            .validate()
            .map_err(|e| ServiceError::Config(e.to_string()))?;

        let unit = config.execution_unit();
        let table = Arc::new(CorrelationTable::new(
            config.timeouts.request,
            config.limits.max_pending,
        ));

        let gate = Arc::new(ProvisioningGate::new(
            deployments,
            unit,
            config.target.signature.clone(),
        ));
        let readiness = Arc::new(ReadinessController::new(gate));

        let handler = Arc::new(PromptHandler::new(
            table.clone(),
            Arc::new(BusCommandSender::new(bus.clone())),
            readiness.subscribe(),
            &config,
        ));

        let monitor = ConnectionMonitor::new(&bus);
        let transport = monitor.status();
        let (results_tx, results_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let router = ResultRouter::new(&bus, config.target.signature.clone(), results_tx);
        let heartbeats = bus.subscribe(EventFilter::topics(vec![EventTopic::Heartbeat]));

        Ok(Self {
            config,
            table,
            readiness,
            handler,
            transport,
            listeners: Some(Listeners {
                monitor,
                router,
                results_rx,
                heartbeats,
            }),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn table(&self) -> Arc<CorrelationTable> {
        self.table.clone()
    }

    pub fn readiness(&self) -> Arc<ReadinessController> {
        self.readiness.clone()
    }

    /// Spawn the connection monitor, result routing, readiness and sweep tasks.
    pub fn start_background(&mut self) -> Result<BackgroundTasks, ServiceError> {
        let listeners = self.listeners.take().ok_or(ServiceError::AlreadyStarted)?;

        let dispatcher = ResultDispatcher::new(self.table.clone(), self.config.execution_unit());
        let handles = vec![
            tokio::spawn(listeners.monitor.run()),
            tokio::spawn(listeners.router.run()),
            tokio::spawn(dispatcher.run(listeners.results_rx)),
            tokio::spawn(self.readiness.clone().run(listeners.heartbeats)),
            tokio::spawn(sweep_task(
                self.table.clone(),
                self.config.timeouts.sweep_interval,
            )),
        ];

        info!(
            unit = %self.config.execution_unit(),
            "Bridge started, waiting for target node heartbeat"
        );
        Ok(BackgroundTasks { handles })
    }

    /// HTTP routes and middleware.
    pub fn router(&self) -> Router {
        let state = AppState {
            handler: self.handler.clone(),
            table: self.table.clone(),
            readiness: self.readiness.clone(),
            transport: self.transport.clone(),
        };

        Router::new()
            .route(&self.config.http.prompt_path, post(handle_prompt))
            .route("/health", get(health_check))
            .route("/pending", get(pending_report))
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(self.config.limits.max_body_bytes))
            .layer(create_cors_layer(&self.config.cors))
            .layer(TracingLayer::new())
            .with_state(state)
    }

    /// Run until `shutdown` resolves.
    ///
    /// Binds the listener once the bridge is ready. Pending callers are failed
    /// with `Cancelled` on the way out.
    pub async fn run<F>(mut self, shutdown: F) -> Result<(), ServiceError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let tasks = self.start_background()?;
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            shutdown.await;
            let _ = stop_tx.send(());
        });

        let ready = self.readiness.clone();
        tokio::select! {
            _ = ready.wait_ready() => {}
            _ = &mut stop_rx => {
                info!("Shutdown requested before the bridge opened");
                drop(tasks);
                return Ok(());
            }
        }

        let addr = self.config.http_addr();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServiceError::Bind(format!("{addr}: {e}")))?;
        info!(
            addr = %addr,
            route = %self.config.http.prompt_path,
            "Bridge open, accepting prompts"
        );

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await;

        let cancelled = self.table.fail_all();
        drop(tasks);
        info!(cancelled, "Bridge stopped");

        served.map_err(|e| {
            error!(error = %e, "HTTP server error");
            ServiceError::Serve(e.to_string())
        })
    }
}

#[derive(Clone)]
struct AppState {
    handler: Arc<PromptHandler>,
    table: Arc<CorrelationTable>,
    readiness: Arc<ReadinessController>,
    transport: Arc<TransportStatus>,
}

async fn handle_prompt(State(state): State<AppState>, body: Bytes) -> Response {
    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return BridgeError::MalformedRequest(format!("invalid JSON: {e}")).into_response()
        }
    };

    match state.handler.handle_json(&value).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let readiness = state.readiness.state();
    let status = if readiness == ReadinessState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthResponse {
        status: if readiness.is_ready() { "ok" } else { "starting" }.to_string(),
        readiness,
        execution_unit: state.handler.unit().to_string(),
        transport_booted: state.transport.is_booted(),
        pending: state.table.pending_count(),
    };
    (status, Json(body))
}

async fn pending_report(State(state): State<AppState>) -> Json<PendingReport> {
    Json(PendingReport {
        max_pending: state.table.max_pending(),
        stats: state.table.snapshot(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockDeploymentApi;
    use axum::body::Body;
    use axum::http::Request;
    use shared_types::entities::NodeId;
    use tower::ServiceExt;

    fn service() -> BridgeService {
        let mut config = BridgeConfig::default();
        config.target.node = NodeId::from("node-a");
        config.limits.max_body_bytes = 512;
        BridgeService::new(
            config,
            Arc::new(InMemoryEventBus::new()),
            Arc::new(MockDeploymentApi::new()),
        )
        .unwrap()
    }

    fn post_prompt(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/prompt")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = BridgeService::new(
            BridgeConfig::default(),
            Arc::new(InMemoryEventBus::new()),
            Arc::new(MockDeploymentApi::new()),
        );
        assert!(matches!(result, Err(ServiceError::Config(_))));
    }

    #[tokio::test]
    async fn test_prompt_before_ready() {
        let service = service();
        let response = service
            .router()
            .oneshot(post_prompt(
                r#"{"correlationKey":"r1","content":"hi","history":[]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["error"]["kind"], "not_ready");
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let service = service();
        let response = service.router().oneshot(post_prompt("{not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["kind"], "malformed_request");
    }

    #[tokio::test]
    async fn test_malformed_after_ready() {
        let service = service();
        service.readiness().on_heartbeat(&NodeId::from("node-a")).await;

        let response = service
            .router()
            .oneshot(post_prompt(r#"{"correlationKey":"r1","history":[]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"]["message"].as_str().unwrap().contains("content"));
    }

    #[tokio::test]
    async fn test_body_limit() {
        let service = service();
        let big = format!(
            r#"{{"correlationKey":"r1","content":"{}","history":[]}}"#,
            "x".repeat(1024)
        );
        let response = service.router().oneshot(post_prompt(&big)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_health_reflects_readiness() {
        let service = service();

        let response = service
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["readiness"], "not_ready");
        assert_eq!(body["execution_unit"], "node-a/llm-example/llm-example-instance");

        service.readiness().on_heartbeat(&NodeId::from("node-a")).await;

        let response = service
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_pending_report() {
        let service = service();
        let response = service
            .router()
            .oneshot(Request::get("/pending").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["pending"], 0);
        assert_eq!(body["max_pending"], 0);
        assert_eq!(body["registered"], 0);
    }

    #[tokio::test]
    async fn test_start_background_once() {
        let mut service = service();
        let tasks = service.start_background().unwrap();
        assert_eq!(tasks.len(), 5);
        assert!(matches!(
            service.start_background(),
            Err(ServiceError::AlreadyStarted)
        ));
    }
}
