//! # Integration Test Flows
//!
//! Drives the bridge end to end: an HTTP request enters the router, the
//! command crosses the in-memory bus to a loopback node, and the plugin
//! result travels back to the waiting caller.
//!
//! ## Flows Tested:
//!
//! 1. **Provisioning**: heartbeat from the target node → pipeline created → bridge open
//! 2. **Correlation**: results delivered out of order reach the right callers
//! 3. **Failures**: dispatch, upstream, timeout and duplicate keys map to HTTP errors
//! 4. **Isolation**: foreign heartbeats, unknown keys and foreign sources change nothing

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tokio::time::timeout;
    use tower::ServiceExt;

    use bridge_runtime::adapters::Responder;
    use bridge_runtime::LoopbackNode;
    use prompt_bridge::{
        BackgroundTasks, BridgeConfig, BridgeService, DeploymentApi, ReadinessState,
    };
    use shared_bus::{EventFilter, EventPublisher, EventTopic, InMemoryEventBus, NetworkEvent};
    use shared_types::entities::{
        DataCaptureConfig, ExecutionUnitId, NodeId, PluginCommand, PluginInstanceSpec,
        PluginResultPayload, LLM_CODEGEN_SIGNATURE,
    };

    const NODE: &str = "node-a";

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct Harness {
        bus: Arc<InMemoryEventBus>,
        node: Arc<LoopbackNode>,
        service: BridgeService,
        _tasks: BackgroundTasks,
    }

    fn config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.target.node = NodeId::from(NODE);
        config
    }

    fn unit() -> ExecutionUnitId {
        ExecutionUnitId::new(NODE, "llm-example", "llm-example-instance")
    }

    fn codegen() -> Responder {
        Arc::new(|command: &PluginCommand| -> Result<String, String> {
            match command.request.as_str() {
                "write a sort function" => Ok("def sort(...)".to_string()),
                other => Ok(format!("generated: {other}")),
            }
        })
    }

    fn harness_with(config: BridgeConfig, responder: Responder) -> Harness {
        let bus = Arc::new(InMemoryEventBus::new());
        let node = Arc::new(LoopbackNode::with_responder(
            NodeId::from(NODE),
            bus.clone(),
            responder,
        ));
        let mut service = BridgeService::new(config, bus.clone(), node.clone()).unwrap();
        let tasks = service.start_background().unwrap();
        Harness {
            bus,
            node,
            service,
            _tasks: tasks,
        }
    }

    fn harness() -> Harness {
        harness_with(config(), codegen())
    }

    impl Harness {
        /// Heartbeat from the target node and wait for the bridge to open.
        async fn open(&self) {
            self.node.heartbeat().await;
            timeout(Duration::from_secs(2), self.service.readiness().wait_ready())
                .await
                .expect("bridge did not open");
        }

        async fn publish_result(&self, source: ExecutionUnitId, payload: PluginResultPayload) {
            self.bus
                .publish(NetworkEvent::PluginResult {
                    source,
                    signature: LLM_CODEGEN_SIGNATURE.to_string(),
                    error: None,
                    payload,
                })
                .await;
        }

        async fn pending(&self) -> Value {
            get(self.service.router(), "/pending").await.1
        }

        /// Poll `/pending` until `field` reaches `expected`.
        async fn wait_for_stat(&self, field: &str, expected: u64) {
            for _ in 0..200 {
                if self.pending().await[field] == json!(expected) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("{field} never reached {expected}: {}", self.pending().await);
        }
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn post(router: Router, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/prompt")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(router, request).await
    }

    async fn get(router: Router, path: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        send(router, request).await
    }

    fn prompt(key: &str, content: &str) -> Value {
        json!({ "correlationKey": key, "content": content, "history": [] })
    }

    // =============================================================================
    // PROVISIONING → HAPPY PATH
    // =============================================================================

    #[tokio::test]
    async fn test_prompt_round_trip() {
        let h = harness();
        let _responder = h.node.spawn_responder();
        h.open().await;

        assert!(h.node.is_deployed("llm-example", "llm-example-instance"));

        let (status, body) = post(h.service.router(), prompt("r1", "write a sort function")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "response": "def sort(...)" }));

        let stats = h.pending().await;
        assert_eq!(stats["pending"], 0);
        assert_eq!(stats["resolved"], 1);
    }

    #[tokio::test]
    async fn test_history_reaches_plugin() {
        let h = harness_with(config(), Arc::new(bridge_runtime_echo));
        let _responder = h.node.spawn_responder();
        h.open().await;

        let body = json!({
            "requestId": "r-hist",
            "prompt": "and now in rust",
            "history": [
                { "request": "write a sort function", "response": "def sort(...)" },
                { "prompt": "make it stable", "response": "def stable_sort(...)" }
            ]
        });
        let (status, body) = post(h.service.router(), body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "2 prior, last: make it stable");
    }

    fn bridge_runtime_echo(command: &PluginCommand) -> Result<String, String> {
        let last = command.history.last().map(|e| e.request.as_str()).unwrap_or("-");
        Ok(format!("{} prior, last: {last}", command.history.len()))
    }

    #[tokio::test]
    async fn test_existing_pipeline_is_reused() {
        let h = harness();
        let node = NodeId::from(NODE);
        h.node
            .create_pipeline(&node, DataCaptureConfig::Void, "llm-example")
            .await
            .unwrap();
        h.node
            .attach_and_deploy(
                &node,
                "llm-example",
                PluginInstanceSpec::new("llm-example-instance", LLM_CODEGEN_SIGNATURE),
            )
            .await
            .unwrap();
        let _responder = h.node.spawn_responder();

        // A second create would be rejected by the node and keep the bridge closed.
        h.open().await;
        assert_eq!(h.node.list_pipelines(&node).await.unwrap(), vec!["llm-example"]);

        let (status, _) = post(h.service.router(), prompt("r1", "write a sort function")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_follows_readiness() {
        let h = harness();

        let (status, body) = get(h.service.router(), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["readiness"], "not_ready");

        h.open().await;
        let (status, body) = get(h.service.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["readiness"], "ready");
        assert_eq!(body["execution_unit"], "node-a/llm-example/llm-example-instance");
    }

    // =============================================================================
    // CORRELATION
    // =============================================================================

    #[tokio::test]
    async fn test_out_of_order_results() {
        let h = harness();
        h.open().await;
        let mut commands = h
            .bus
            .subscribe(EventFilter::topics(vec![EventTopic::Commands]));

        let router = h.service.router();
        let a = tokio::spawn(post(router.clone(), prompt("a", "first")));
        let b = tokio::spawn(post(router.clone(), prompt("b", "second")));

        let mut seen = Vec::new();
        while seen.len() < 2 {
            let event = timeout(Duration::from_secs(2), commands.recv())
                .await
                .expect("command not sent")
                .expect("bus closed");
            if let NetworkEvent::PluginCommand { payload, .. } = event {
                seen.push(payload.request_id);
            }
        }
        seen.sort();
        assert_eq!(seen, vec!["a", "b"]);

        h.publish_result(unit(), PluginResultPayload::success("b", "for b"))
            .await;
        h.publish_result(unit(), PluginResultPayload::success("a", "for a"))
            .await;

        let (status_a, body_a) = a.await.unwrap();
        let (status_b, body_b) = b.await.unwrap();
        assert_eq!((status_a, body_a["response"].clone()), (StatusCode::OK, json!("for a")));
        assert_eq!((status_b, body_b["response"].clone()), (StatusCode::OK, json!("for b")));
    }

    #[tokio::test]
    async fn test_duplicate_key_in_flight() {
        let h = harness();
        h.open().await;
        let mut commands = h
            .bus
            .subscribe(EventFilter::topics(vec![EventTopic::Commands]));

        let router = h.service.router();
        let first = tokio::spawn(post(router.clone(), prompt("dup", "one")));
        timeout(Duration::from_secs(2), commands.recv())
            .await
            .expect("command not sent");

        let (status, body) = post(router.clone(), prompt("dup", "two")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["kind"], "duplicate_key");

        h.publish_result(unit(), PluginResultPayload::success("dup", "one done"))
            .await;
        let (status, body) = first.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "one done");
    }

    // =============================================================================
    // FAILURES
    // =============================================================================

    #[tokio::test]
    async fn test_dispatch_failure_rolls_back() {
        // No responder: nothing listens for commands
        let h = harness();
        h.open().await;

        let (status, body) = post(h.service.router(), prompt("r1", "hello")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["kind"], "dispatch_failed");

        let stats = h.pending().await;
        assert_eq!(stats["pending"], 0);
        assert_eq!(stats["rolled_back"], 1);
    }

    #[tokio::test]
    async fn test_listener_on_other_node_is_no_route() {
        let h = harness();
        h.open().await;
        let _other = h.bus.subscribe(
            EventFilter::topics(vec![EventTopic::Commands]).for_nodes(vec![NodeId::from("node-b")]),
        );

        let (status, body) = post(h.service.router(), prompt("r1", "hello")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["kind"], "dispatch_failed");
        assert_eq!(h.pending().await["rolled_back"], 1);
    }

    #[tokio::test]
    async fn test_restarted_node_fails_fast() {
        let mut config = config();
        config.timeouts.request = Duration::from_secs(30);
        let h = harness_with(config, codegen());
        h.open().await;

        // Same node identity, deployments lost
        let restarted = Arc::new(LoopbackNode::new(NodeId::from(NODE), h.bus.clone()));
        let _responder = restarted.spawn_responder();

        let (status, body) = timeout(
            Duration::from_secs(2),
            post(h.service.router(), prompt("r1", "hello")),
        )
        .await
        .expect("caller left waiting for the timeout");
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["kind"], "upstream_error");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("not deployed"));
        assert_eq!(h.pending().await["failed"], 1);
    }

    #[tokio::test]
    async fn test_upstream_error() {
        let h = harness_with(
            config(),
            Arc::new(|_: &PluginCommand| -> Result<String, String> {
                Err("model overloaded".to_string())
            }),
        );
        let _responder = h.node.spawn_responder();
        h.open().await;

        let (status, body) = post(h.service.router(), prompt("r1", "hello")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["kind"], "upstream_error");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("model overloaded"));
        assert_eq!(h.pending().await["failed"], 1);
    }

    #[tokio::test]
    async fn test_timeout_ignores_foreign_source() {
        let mut config = config();
        config.timeouts.request = Duration::from_millis(200);
        let h = harness_with(config, codegen());
        h.open().await;
        let mut commands = h
            .bus
            .subscribe(EventFilter::topics(vec![EventTopic::Commands]));

        let request = tokio::spawn(post(h.service.router(), prompt("r1", "hello")));
        timeout(Duration::from_secs(2), commands.recv())
            .await
            .expect("command not sent");

        // Same key from another instance must not satisfy the caller
        let foreign = ExecutionUnitId::new(NODE, "llm-example", "other-instance");
        h.publish_result(foreign, PluginResultPayload::success("r1", "wrong"))
            .await;

        let (status, body) = request.await.unwrap();
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["error"]["kind"], "timeout");

        let stats = h.pending().await;
        assert_eq!(stats["pending"], 0);
        assert_eq!(stats["timed_out"], 1);
        assert_eq!(stats["resolved"], 0);
    }

    #[tokio::test]
    async fn test_malformed_prompt_rejected() {
        let h = harness();
        h.open().await;

        let (status, body) = post(h.service.router(), json!({ "correlationKey": "r1" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "malformed_request");
        assert_eq!(h.pending().await["registered"], 0);
    }

    // =============================================================================
    // ISOLATION
    // =============================================================================

    #[tokio::test]
    async fn test_unknown_key_is_counted() {
        let h = harness();
        h.open().await;

        h.publish_result(unit(), PluginResultPayload::success("zzz", "orphan"))
            .await;
        h.wait_for_stat("unknown", 1).await;
        assert_eq!(h.pending().await["pending"], 0);
    }

    #[tokio::test]
    async fn test_foreign_heartbeat_keeps_bridge_closed() {
        let h = harness();

        h.bus
            .publish(NetworkEvent::Heartbeat {
                node: NodeId::from("node-b"),
            })
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(h.service.readiness().state(), ReadinessState::NotReady);
        assert!(h
            .node
            .list_pipelines(&NodeId::from(NODE))
            .await
            .unwrap()
            .is_empty());

        let (status, body) = post(h.service.router(), prompt("r1", "hello")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["kind"], "not_ready");
    }

    // =============================================================================
    // SERVICE LIFECYCLE
    // =============================================================================

    #[tokio::test]
    async fn test_shutdown_before_ready() {
        let bus = Arc::new(InMemoryEventBus::new());
        let node = Arc::new(LoopbackNode::new(NodeId::from(NODE), bus.clone()));
        let service = BridgeService::new(config(), bus, node).unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn(service.run(async {
            let _ = stop_rx.await;
        }));
        stop_tx.send(()).unwrap();

        let result = timeout(Duration::from_secs(2), running)
            .await
            .expect("service did not stop")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_serves_after_ready_and_stops() {
        let mut config = config();
        config.http.host = [127, 0, 0, 1].into();
        config.http.port = 0;

        let bus = Arc::new(InMemoryEventBus::new());
        let node = Arc::new(LoopbackNode::new(NodeId::from(NODE), bus.clone()));
        let service = BridgeService::new(config, bus, node.clone()).unwrap();
        let readiness = service.readiness();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn(service.run(async {
            let _ = stop_rx.await;
        }));
        let heartbeats = node.spawn_heartbeats(Duration::from_millis(20));

        timeout(Duration::from_secs(2), readiness.wait_ready())
            .await
            .expect("bridge did not open");
        stop_tx.send(()).unwrap();

        let result = timeout(Duration::from_secs(2), running)
            .await
            .expect("service did not stop")
            .unwrap();
        heartbeats.abort();
        assert!(result.is_ok());
    }
}
