use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::messages::WebSocketMessage;
use crate::config::ConnectionConfig;

/// A viewer subscribing to one contest's leaderboard stream
#[derive(Debug)]
pub struct Registration {
    pub connection_id: Uuid,
    pub user_id: Uuid,
    pub contest_id: Uuid,
    pub outbound: mpsc::Sender<String>,
}

/// Fan-out surface used by the scoring and settlement services
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    async fn register(&self, registration: Registration);

    async fn unregister(&self, connection_id: Uuid);

    /// Non-blocking delivery to every connection subscribed to `contest_id`
    async fn broadcast(&self, contest_id: Uuid, message: WebSocketMessage);

    /// Non-blocking delivery to one user's connections on `contest_id`
    async fn send_personalized(&self, user_id: Uuid, contest_id: Uuid, message: WebSocketMessage);

    /// Refreshes a connection's liveness timestamp
    async fn touch(&self, connection_id: Uuid);
}

struct ConnectionEntry {
    user_id: Uuid,
    contest_id: Uuid,
    outbound: mpsc::Sender<String>,
    last_seen: Instant,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<Uuid, ConnectionEntry>,
    // contest id -> connection ids
    subscriptions: HashMap<Uuid, HashSet<Uuid>>,
}

impl Registry {
    fn remove(&mut self, connection_id: Uuid) -> Option<ConnectionEntry> {
        let entry = self.connections.remove(&connection_id)?;
        if let Some(ids) = self.subscriptions.get_mut(&entry.contest_id) {
            ids.remove(&connection_id);
            if ids.is_empty() {
                self.subscriptions.remove(&entry.contest_id);
            }
        }
        Some(entry)
    }

    /// Drops every connection silent for at least `timeout`, returning how many went
    fn reclaim_silent(&mut self, now: Instant, timeout: Duration) -> usize {
        let expired: Vec<Uuid> = self
            .connections
            .iter()
            .filter(|(_, c)| now.duration_since(c.last_seen) >= timeout)
            .map(|(id, _)| *id)
            .collect();
        for connection_id in &expired {
            self.remove(*connection_id);
        }
        expired.len()
    }
}

enum Request {
    Broadcast {
        contest_id: Uuid,
        message: WebSocketMessage,
    },
    SendPersonalized {
        user_id: Uuid,
        contest_id: Uuid,
        message: WebSocketMessage,
    },
    Touch(Uuid),
    Subscribers {
        contest_id: Uuid,
        reply: oneshot::Sender<Vec<Uuid>>,
    },
}

/// Cloneable handle to the connection actor.
///
/// The actor is the only writer of the registry; every caller goes through one of its
/// three command queues (register, unregister, requests). Queries travel on the request
/// queue so they observe every command submitted before them.
#[derive(Clone)]
pub struct ConnectionManagerHandle {
    register_tx: mpsc::UnboundedSender<Registration>,
    unregister_tx: mpsc::UnboundedSender<Uuid>,
    request_tx: mpsc::UnboundedSender<Request>,
    registry: Arc<RwLock<Registry>>,
    config: ConnectionConfig,
}

impl ConnectionManagerHandle {
    /// Starts the actor on the current runtime and returns its handle
    pub fn spawn(config: ConnectionConfig) -> Self {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(RwLock::new(Registry::default()));

        let actor = ConnectionActor {
            registry: registry.clone(),
            config: config.clone(),
            next_message_id: 0,
        };
        tokio::spawn(actor.run(register_rx, unregister_rx, request_rx));

        Self {
            register_tx,
            unregister_tx,
            request_tx,
            registry,
            config,
        }
    }

    /// Bounded outbound queue sized for one viewer connection
    pub fn outbound_channel(&self) -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
        mpsc::channel(self.config.outbound_capacity)
    }

    /// Connection ids currently subscribed to a contest
    pub async fn subscribers(&self, contest_id: Uuid) -> Vec<Uuid> {
        let (reply, response) = oneshot::channel();
        if self
            .request_tx
            .send(Request::Subscribers { contest_id, reply })
            .is_err()
        {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }

    /// Snapshot of the number of live connections
    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.connections.len()
    }
}

#[async_trait]
impl ConnectionManager for ConnectionManagerHandle {
    async fn register(&self, registration: Registration) {
        if self.register_tx.send(registration).is_err() {
            warn!("Connection actor stopped; registration dropped");
        }
    }

    async fn unregister(&self, connection_id: Uuid) {
        let _ = self.unregister_tx.send(connection_id);
    }

    async fn broadcast(&self, contest_id: Uuid, message: WebSocketMessage) {
        let _ = self.request_tx.send(Request::Broadcast {
            contest_id,
            message,
        });
    }

    async fn send_personalized(&self, user_id: Uuid, contest_id: Uuid, message: WebSocketMessage) {
        let _ = self.request_tx.send(Request::SendPersonalized {
            user_id,
            contest_id,
            message,
        });
    }

    async fn touch(&self, connection_id: Uuid) {
        let _ = self.request_tx.send(Request::Touch(connection_id));
    }
}

struct ConnectionActor {
    registry: Arc<RwLock<Registry>>,
    config: ConnectionConfig,
    next_message_id: u64,
}

impl ConnectionActor {
    async fn run(
        mut self,
        mut register_rx: mpsc::UnboundedReceiver<Registration>,
        mut unregister_rx: mpsc::UnboundedReceiver<Uuid>,
        mut request_rx: mpsc::UnboundedReceiver<Request>,
    ) {
        let mut sweep = interval_at(
            Instant::now() + self.config.ping_interval,
            self.config.ping_interval,
        );
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            ping_interval_secs = self.config.ping_interval.as_secs(),
            liveness_timeout_secs = self.config.liveness_timeout.as_secs(),
            "Connection manager started"
        );

        loop {
            tokio::select! {
                biased;

                Some(registration) = register_rx.recv() => self.register(registration).await,
                Some(connection_id) = unregister_rx.recv() => self.unregister(connection_id).await,
                _ = sweep.tick() => self.sweep().await,
                request = request_rx.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => break,
                },
            }
        }

        debug!("Connection manager stopped");
    }

    fn stamp(&mut self, message: WebSocketMessage) -> Option<String> {
        self.next_message_id += 1;
        let stamped = message.stamped(self.next_message_id);
        match serde_json::to_string(&stamped) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!(error = %e, "Failed to serialize outbound message");
                None
            }
        }
    }

    async fn register(&mut self, registration: Registration) {
        let Registration {
            connection_id,
            user_id,
            contest_id,
            outbound,
        } = registration;

        let confirmation = self.stamp(WebSocketMessage::connected(connection_id, contest_id, user_id));
        let mut registry = self.registry.write().await;
        if let Some(json) = confirmation {
            if outbound.try_send(json).is_err() {
                debug!(connection_id = %connection_id, "Connection closed before confirmation");
                return;
            }
        }

        registry.connections.insert(
            connection_id,
            ConnectionEntry {
                user_id,
                contest_id,
                outbound,
                last_seen: Instant::now(),
            },
        );
        registry
            .subscriptions
            .entry(contest_id)
            .or_default()
            .insert(connection_id);

        debug!(
            connection_id = %connection_id,
            user_id = %user_id,
            contest_id = %contest_id,
            connections = registry.connections.len(),
            "Connection registered"
        );
    }

    async fn unregister(&mut self, connection_id: Uuid) {
        // Dropping the entry drops the sender, which ends the viewer's outbound stream
        if self.registry.write().await.remove(connection_id).is_some() {
            debug!(connection_id = %connection_id, "Connection unregistered");
        }
    }

    async fn handle_request(&mut self, request: Request) {
        // Silent connections must not outlive the timeout between sweep ticks
        self.sweep().await;
        match request {
            Request::Broadcast {
                contest_id,
                message,
            } => {
                let Some(json) = self.stamp(message) else {
                    return;
                };
                let mut registry = self.registry.write().await;
                let targets: Vec<Uuid> = registry
                    .subscriptions
                    .get(&contest_id)
                    .map(|ids| ids.iter().copied().collect())
                    .unwrap_or_default();
                deliver(&mut registry, &targets, &json);
            }
            Request::SendPersonalized {
                user_id,
                contest_id,
                message,
            } => {
                let Some(json) = self.stamp(message) else {
                    return;
                };
                let mut registry = self.registry.write().await;
                let targets: Vec<Uuid> = registry
                    .subscriptions
                    .get(&contest_id)
                    .map(|ids| {
                        ids.iter()
                            .copied()
                            .filter(|id| {
                                registry
                                    .connections
                                    .get(id)
                                    .is_some_and(|c| c.user_id == user_id)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                deliver(&mut registry, &targets, &json);
            }
            Request::Touch(connection_id) => {
                if let Some(entry) = self
                    .registry
                    .write()
                    .await
                    .connections
                    .get_mut(&connection_id)
                {
                    entry.last_seen = Instant::now();
                }
            }
            Request::Subscribers { contest_id, reply } => {
                let ids = self
                    .registry
                    .read()
                    .await
                    .subscriptions
                    .get(&contest_id)
                    .map(|ids| ids.iter().copied().collect())
                    .unwrap_or_default();
                let _ = reply.send(ids);
            }
        }
    }

    async fn sweep(&mut self) {
        let mut registry = self.registry.write().await;
        let reclaimed = registry.reclaim_silent(Instant::now(), self.config.liveness_timeout);
        if reclaimed > 0 {
            info!(
                reclaimed,
                remaining = registry.connections.len(),
                "Reclaimed silent connections"
            );
        }
    }
}

/// Attempts a non-blocking send to each target; full or closed queues are unregistered
/// after the pass so one slow viewer never stalls the others.
fn deliver(registry: &mut Registry, targets: &[Uuid], json: &str) {
    let mut unresponsive = Vec::new();
    for connection_id in targets {
        let Some(entry) = registry.connections.get(connection_id) else {
            continue;
        };
        match entry.outbound.try_send(json.to_string()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(connection_id = %connection_id, "Outbound queue full; dropping connection");
                unresponsive.push(*connection_id);
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection_id = %connection_id, "Outbound queue closed; dropping connection");
                unresponsive.push(*connection_id);
            }
        }
    }
    for connection_id in unresponsive {
        registry.remove(connection_id);
    }
}
