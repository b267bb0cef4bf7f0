//! Connection registry: at most one live push subscription per agent id.
//!
//! The first subscriber for an agent spawns a pump task that connects the
//! [`EventChannel`], normalizes frames and broadcasts them. Later subscribers
//! share it. Routing to a specific execution happens downstream: each
//! subscriber filters by execution id. When the last [`AgentSubscription`]
//! for an agent drops, the pump is aborted.

use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::EventChannel;
use crate::events::ExecutionEvent;
use crate::normalizer::normalize;

const CHANNEL_CAPACITY: usize = 1024;

/// What a subscriber receives from an agent's pump.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    Connected,
    Event(ExecutionEvent),
    /// The push channel failed or ended. No more messages follow until a
    /// subscriber re-subscribes.
    Disconnected { reason: String },
}

struct Subscription {
    tx: broadcast::Sender<ChannelMessage>,
    subscribers: usize,
    task: JoinHandle<()>,
}

type Subscriptions = Arc<Mutex<HashMap<String, Subscription>>>;

pub struct ConnectionRegistry {
    channel: Arc<dyn EventChannel>,
    subscriptions: Subscriptions,
}

impl ConnectionRegistry {
    pub fn new(channel: Arc<dyn EventChannel>) -> Self {
        Self {
            channel,
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn channel_name(&self) -> &str {
        self.channel.name()
    }

    /// Subscribe to an agent's events, connecting if no live pump exists.
    ///
    /// A pump whose stream already ended is replaced, so this is also how a
    /// caller re-subscribes after [`ChannelMessage::Disconnected`].
    pub fn subscribe(&self, agent_id: &str) -> AgentSubscription {
        let mut subscriptions = lock(&self.subscriptions);
        let rx = match subscriptions.get_mut(agent_id) {
            Some(entry) => {
                let rx = entry.tx.subscribe();
                if entry.task.is_finished() {
                    info!(agent_id = %agent_id, "Reconnecting event stream");
                    entry.task = self.spawn_pump(agent_id, entry.tx.clone());
                }
                entry.subscribers += 1;
                rx
            }
            None => {
                info!(
                    agent_id = %agent_id,
                    channel = %self.channel.name(),
                    "Opening event subscription"
                );
                let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
                let task = self.spawn_pump(agent_id, tx.clone());
                subscriptions.insert(
                    agent_id.to_string(),
                    Subscription {
                        tx,
                        subscribers: 1,
                        task,
                    },
                );
                rx
            }
        };

        AgentSubscription {
            agent_id: agent_id.to_string(),
            rx,
            subscriptions: Arc::clone(&self.subscriptions),
        }
    }

    /// Agent ids with a live subscription, sorted.
    pub fn subscribed_agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = lock(&self.subscriptions).keys().cloned().collect();
        agents.sort();
        agents
    }

    pub fn subscriber_count(&self, agent_id: &str) -> usize {
        lock(&self.subscriptions)
            .get(agent_id)
            .map(|entry| entry.subscribers)
            .unwrap_or(0)
    }

    /// Abort every pump. Outstanding subscriptions stop receiving messages.
    pub fn shutdown(&self) {
        let mut subscriptions = lock(&self.subscriptions);
        for (agent_id, entry) in subscriptions.drain() {
            debug!("Closing event subscription for {}", agent_id);
            entry.task.abort();
        }
    }

    fn spawn_pump(&self, agent_id: &str, tx: broadcast::Sender<ChannelMessage>) -> JoinHandle<()> {
        tokio::spawn(pump(Arc::clone(&self.channel), agent_id.to_string(), tx))
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn pump(
    channel: Arc<dyn EventChannel>,
    agent_id: String,
    tx: broadcast::Sender<ChannelMessage>,
) {
    let mut frames = match channel.connect(&agent_id).await {
        Ok(frames) => frames,
        Err(err) => {
            warn!(agent_id = %agent_id, "Event stream connect failed: {}", err);
            let _ = tx.send(ChannelMessage::Disconnected {
                reason: err.to_string(),
            });
            return;
        }
    };
    let _ = tx.send(ChannelMessage::Connected);

    while let Some(frame) = frames.next().await {
        match frame {
            Ok(frame) => {
                if let Some(event) = normalize(&frame.event, &frame.data) {
                    let _ = tx.send(ChannelMessage::Event(event));
                }
            }
            Err(err) => {
                warn!(agent_id = %agent_id, "Event stream failed: {}", err);
                let _ = tx.send(ChannelMessage::Disconnected {
                    reason: err.to_string(),
                });
                return;
            }
        }
    }

    info!(agent_id = %agent_id, "Event stream ended");
    let _ = tx.send(ChannelMessage::Disconnected {
        reason: "event stream ended".to_string(),
    });
}

fn lock(subscriptions: &Subscriptions) -> MutexGuard<'_, HashMap<String, Subscription>> {
    subscriptions
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One subscriber's handle on an agent's event stream. Dropping it releases
/// the subscription.
pub struct AgentSubscription {
    agent_id: String,
    rx: broadcast::Receiver<ChannelMessage>,
    subscriptions: Subscriptions,
}

impl AgentSubscription {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub async fn recv(&mut self) -> Result<ChannelMessage, broadcast::error::RecvError> {
        self.rx.recv().await
    }
}

impl Drop for AgentSubscription {
    fn drop(&mut self) {
        let mut subscriptions = lock(&self.subscriptions);
        let Some(entry) = subscriptions.get_mut(&self.agent_id) else {
            return;
        };
        entry.subscribers = entry.subscribers.saturating_sub(1);
        if entry.subscribers == 0 {
            entry.task.abort();
            subscriptions.remove(&self.agent_id);
            info!(agent_id = %self.agent_id, "Released event subscription");
        }
    }
}
