//! Top-level orchestrator: wires state, relay, health server, and one
//! SSE listener + router per configured agent, and owns the run/shutdown
//! lifecycle.

use crate::config::BridgeConfig;
use crate::health::{AgentStatus, HealthServer};
use crate::metrics::Metrics;
use crate::relay::MessageRelay;
use crate::router::EventRouter;
use crate::sse::SseListener;
use crate::state::BridgeState;
use crate::subscriptions::SubscriptionManager;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);
const HEALTH_UPDATE_INTERVAL: Duration = Duration::from_secs(30);

struct AgentHandle {
    name: String,
    org_slug: String,
    state: Arc<BridgeState>,
    connected: Arc<AtomicBool>,
    reconnect_count: Arc<AtomicU32>,
    shutdown_tx: watch::Sender<bool>,
    listener_task: JoinHandle<()>,
    router_task: JoinHandle<()>,
}

pub struct CommsBridge {
    config: BridgeConfig,
    metrics: Arc<Metrics>,
    state: Arc<BridgeState>,
    relay: Arc<MessageRelay>,
    health: Mutex<HealthServer>,
    agents: Mutex<Vec<AgentHandle>>,
    running: AtomicBool,
}

impl CommsBridge {
    pub async fn new(config: BridgeConfig) -> anyhow::Result<Self> {
        let metrics = Arc::new(Metrics::new());
        let state = Arc::new(BridgeState::open(&config.state.db_path).await?);
        let relay = Arc::new(MessageRelay::new(
            &config.mission_control.url,
            &config.runtime.url,
            config.mission_control.verify_tls,
            config.mission_control.request_timeout_seconds,
            metrics.clone(),
        ));
        let health = HealthServer::new(metrics.clone());

        Ok(Self {
            config,
            metrics,
            state,
            relay,
            health: Mutex::new(health),
            agents: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        })
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        info!(agents = self.config.agents.len(), "bridge starting");

        if self.config.metrics.enabled {
            if let Err(err) = self.health.lock().await.start(&self.config.metrics.host, self.config.metrics.port).await {
                warn!(error = %err, "bridge health server failed to start");
            } else {
                info!(host = self.config.metrics.host, port = self.config.metrics.port, "bridge health server started");
            }
        }

        let mut agents = self.agents.lock().await;
        for agent_cfg in &self.config.agents {
            let Some(api_key) = agent_cfg.api_key() else {
                error!(agent = agent_cfg.name, env = agent_cfg.api_key_env, "missing api key, skipping agent");
                continue;
            };

            let subscriptions = Arc::new(Mutex::new(SubscriptionManager::new()));
            let router = Arc::new(EventRouter::new(agent_cfg.clone(), self.state.clone(), self.relay.clone(), subscriptions));

            let mut listener = SseListener::new(
                &self.config.mission_control.url,
                &agent_cfg.org_slug,
                &api_key,
                self.config.mission_control.sse_heartbeat_timeout_seconds,
                self.config.mission_control.verify_tls,
            );

            if let Ok(Some(cursor)) = self.state.get_cursor(&agent_cfg.name).await {
                listener.set_last_event_id(cursor.to_string());
                info!(agent = agent_cfg.name, cursor, "resuming from persisted cursor");
            }

            let (event_tx, mut event_rx) = mpsc::channel(256);
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let connected = Arc::new(AtomicBool::new(false));
            let reconnect_count = Arc::new(AtomicU32::new(0));

            let connected_for_task = connected.clone();
            let reconnect_count_for_task = reconnect_count.clone();
            let listener_task = tokio::spawn(async move {
                listener.run(event_tx, shutdown_rx, connected_for_task, reconnect_count_for_task).await;
            });

            let router_for_task = router.clone();
            let router_task = tokio::spawn(async move {
                while let Some(event) = event_rx.recv().await {
                    router_for_task.handle_event(event).await;
                }
            });

            self.metrics.set_gauge("sse_connections_active", agents.len() as f64 + 1.0);
            info!(agent = agent_cfg.name, org = agent_cfg.org_slug, "agent started");

            agents.push(AgentHandle {
                name: agent_cfg.name.clone(),
                org_slug: agent_cfg.org_slug.clone(),
                state: self.state.clone(),
                connected,
                reconnect_count,
                shutdown_tx,
                listener_task,
                router_task,
            });
        }

        self.running.store(true, Ordering::SeqCst);
        info!(agents = agents.len(), "bridge started");
        Ok(())
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("bridge stopping");

        let mut agents = self.agents.lock().await;
        for agent in agents.drain(..) {
            let _ = agent.shutdown_tx.send(true);
            let _ = agent.listener_task.await;
            agent.router_task.abort();
        }
        info!("sse listeners stopped");

        let flushed = self.relay.flush_outbound().await;
        if flushed > 0 {
            info!(flushed, "flushed buffered outbound messages");
        }

        self.health.lock().await.stop().await;
        self.state.close().await;
        info!("bridge stopped");
    }

    pub async fn run_forever(&self) -> anyhow::Result<()> {
        self.start().await?;

        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("received interrupt signal");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("received terminate signal");
                    break;
                }
                _ = tokio::time::sleep(HEALTH_UPDATE_INTERVAL) => {
                    self.update_health().await;
                }
            }
        }

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.stop()).await {
            Ok(()) => {}
            Err(_) => warn!("bridge shutdown exceeded timeout, exiting anyway"),
        }
        Ok(())
    }

    async fn update_health(&self) {
        let agents = self.agents.lock().await;
        let mut statuses = Vec::with_capacity(agents.len());
        let mut connected_count = 0usize;

        for agent in agents.iter() {
            let sessions = agent.state.list_sessions(&agent.name).await.unwrap_or_default();
            let connected = agent.connected.load(Ordering::Relaxed);
            if connected {
                connected_count += 1;
            }
            statuses.push(AgentStatus {
                name: agent.name.clone(),
                org_slug: agent.org_slug.clone(),
                sse_connected: connected,
                active_sessions: sessions.len(),
                reconnect_count: agent.reconnect_count.load(Ordering::Relaxed),
            });
        }
        drop(agents);

        let gateway_ok = self.relay.check_gateway_health().await;
        let mc_ok = self.relay.check_mc_health().await;
        self.metrics.set_gauge("sse_connections_active", connected_count as f64);

        self.health.lock().await.update_status(statuses, gateway_ok, mc_ok);
    }
}
