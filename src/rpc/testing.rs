//! In-process fake base node for tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::State, routing::post, Json, Router};
use reqwest::Url;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use super::NodeClient;

/// Answer for one RPC call: a result value or `(code, message)` error
pub(crate) type Answer = Result<Value, (i64, String)>;

pub(crate) struct FakeNode {
    pub client: NodeClient,
    /// Request ids in arrival order
    pub ids: Arc<Mutex<Vec<u64>>>,
    /// Method names in arrival order
    pub methods: Arc<Mutex<Vec<String>>>,
}

#[derive(Clone)]
struct FakeState {
    handler: Arc<dyn Fn(&str, &Value) -> Answer + Send + Sync>,
    ids: Arc<Mutex<Vec<u64>>>,
    methods: Arc<Mutex<Vec<String>>>,
}

async fn handle(State(state): State<FakeState>, Json(request): Json<Value>) -> Json<Value> {
    let id = request["id"].as_u64().unwrap_or_default();
    let method = request["method"].as_str().unwrap_or_default().to_string();
    state.ids.lock().unwrap().push(id);
    state.methods.lock().unwrap().push(method.clone());

    match (state.handler)(&method, &request["params"]) {
        Ok(result) => Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })),
        Err((code, message)) => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message },
        })),
    }
}

/// Serves JSON-RPC on an ephemeral local port, answering with `handler`
pub(crate) async fn spawn_fake_node<F>(handler: F) -> FakeNode
where
    F: Fn(&str, &Value) -> Answer + Send + Sync + 'static,
{
    let state = FakeState {
        handler: Arc::new(handler),
        ids: Arc::default(),
        methods: Arc::default(),
    };
    let ids = state.ids.clone();
    let methods = state.methods.clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route("/json_rpc", post(handle))
        .with_state(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let endpoint = Url::parse(&format!("http://{}/json_rpc", addr)).unwrap();
    FakeNode {
        client: NodeClient::new(endpoint, Duration::from_secs(5)).unwrap(),
        ids,
        methods,
    }
}

/// Client pointed at a port nothing listens on
pub(crate) fn unreachable_client() -> NodeClient {
    let endpoint = Url::parse("http://127.0.0.1:1/json_rpc").unwrap();
    NodeClient::new(endpoint, Duration::from_secs(2)).unwrap()
}
