//! Tiny HTTP server exposing bridge health and metrics, independent of the
//! hub's own `/health` endpoint (this one reports on the bridge process
//! itself: is each agent's SSE connection alive, is the runtime reachable).

use crate::metrics::Metrics;
use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub name: String,
    pub org_slug: String,
    pub sse_connected: bool,
    pub active_sessions: usize,
    pub reconnect_count: u32,
}

#[derive(Debug, Clone, Serialize, Default)]
struct HealthSnapshot {
    agent_statuses: Vec<AgentStatus>,
    gateway_reachable: bool,
    mc_reachable: bool,
}

#[derive(Clone)]
struct HealthState {
    metrics: Arc<Metrics>,
    snapshot: Arc<RwLock<HealthSnapshot>>,
}

pub struct HealthServer {
    state: HealthState,
    handle: Option<JoinHandle<()>>,
}

impl HealthServer {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            state: HealthState { metrics, snapshot: Arc::new(RwLock::new(HealthSnapshot::default())) },
            handle: None,
        }
    }

    pub fn update_status(&self, agent_statuses: Vec<AgentStatus>, gateway_reachable: bool, mc_reachable: bool) {
        let mut snapshot = self.state.snapshot.write().expect("health snapshot lock poisoned");
        *snapshot = HealthSnapshot { agent_statuses, gateway_reachable, mc_reachable };
    }

    pub async fn start(&mut self, host: &str, port: u16) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone());

        let addr: SocketAddr = format!("{host}:{port}").parse()?;
        let listener = TcpListener::bind(addr).await?;

        self.handle = Some(tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!(error = %err, "bridge health server exited with error");
            }
        }));
        Ok(())
    }

    pub async fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    agents: Vec<AgentStatus>,
    gateway_reachable: bool,
    mission_control_reachable: bool,
}

async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().expect("health snapshot lock poisoned").clone();
    let status = if snapshot.mc_reachable { "healthy" } else { "degraded" };
    Json(HealthBody {
        status,
        agents: snapshot.agent_statuses,
        gateway_reachable: snapshot.gateway_reachable,
        mission_control_reachable: snapshot.mc_reachable,
    })
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    state.metrics.to_prometheus()
}
