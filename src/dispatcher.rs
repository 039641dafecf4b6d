//! Fan-out of cached telemetry to subscribed clients
//!
//! ## Message Flow
//!
//! ```text
//! collection tick → active_topics() → registry.run_due(active)
//! dispatch tick   → for each client, for each subscribed topic with a cached value
//!                       → ClientSender (bounded mpsc) → WebSocket task → client
//! ```
//!
//! A dispatch tick re-sends whatever is cached, repeats included, so the
//! dispatch cadence is independent of how often producers are polled.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::collector::CollectorRegistry;
use crate::subscriptions::{ClientId, SubscriptionError, SubscriptionTable};
use crate::topic::Topic;

/// Outbound frames buffered per client before new ones are dropped
pub const CLIENT_BUFFER: usize = 64;

/// One cached value addressed to a client
#[derive(Debug, Clone, PartialEq)]
pub struct TopicMessage {
    pub topic: Topic,
    pub data: Value,
}

impl TopicMessage {
    /// Wire form: `{"event": <topic>, "data": <value>}`
    pub fn to_json(&self) -> Value {
        json!({
            "event": self.topic,
            "data": self.data,
        })
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The client's transport has gone away
    #[error("client {0} is gone")]
    Closed(ClientId),
}

/// Sending half of a client's outbound queue
#[derive(Debug, Clone)]
pub struct ClientSender {
    client: ClientId,
    tx: mpsc::Sender<TopicMessage>,
}

impl ClientSender {
    /// Queue a message without waiting
    ///
    /// A full queue drops the message: the next tick sends the then-current
    /// value anyway.
    fn push(&self, message: TopicMessage) -> Result<(), DeliveryError> {
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(message)) => {
                debug!("{} is lagging, dropping {}", self.client, message.topic);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DeliveryError::Closed(self.client)),
        }
    }
}

/// Owns the subscription table and the client transports
pub struct Dispatcher {
    registry: Arc<CollectorRegistry>,
    subscriptions: RwLock<SubscriptionTable>,
    clients: RwLock<HashMap<ClientId, ClientSender>>,
}

impl Dispatcher {
    /// The valid topics are the ones `registry` has collectors for
    pub fn new(registry: Arc<CollectorRegistry>) -> Self {
        let subscriptions = SubscriptionTable::new(registry.topics());
        Self {
            registry,
            subscriptions: RwLock::new(subscriptions),
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<CollectorRegistry> {
        &self.registry
    }

    /// Register a new client and hand back its outbound queue
    ///
    /// The client receives nothing until it subscribes.
    pub async fn connect(&self) -> (ClientId, mpsc::Receiver<TopicMessage>) {
        let client = ClientId::next();
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);

        self.clients
            .write()
            .await
            .insert(client, ClientSender { client, tx });

        info!("{client} connected");
        (client, rx)
    }

    /// Replace the topics of `client`; invalid requests change nothing
    pub async fn subscribe<S: AsRef<str>>(
        &self,
        client: ClientId,
        topics: &[S],
    ) -> Result<(), SubscriptionError> {
        let mut subscriptions = self.subscriptions.write().await;
        match subscriptions.subscribe(client, topics) {
            Ok(topics) => {
                info!("{client} subscribed to {topics:?}");
                Ok(())
            }
            Err(e) => {
                warn!("{client}: ignoring subscription: {e}");
                Err(e)
            }
        }
    }

    pub async fn unsubscribe(&self, client: ClientId) {
        if self.subscriptions.write().await.unsubscribe(client) {
            info!("{client} unsubscribed");
        }
    }

    /// Forget the client and its subscription
    pub async fn disconnect(&self, client: ClientId) {
        self.subscriptions.write().await.unsubscribe(client);
        if self.clients.write().await.remove(&client).is_some() {
            info!("{client} disconnected");
        }
    }

    pub async fn subscribed_topics(&self, client: ClientId) -> Option<HashSet<Topic>> {
        self.subscriptions.read().await.topics(client).cloned()
    }

    /// Union of all subscribed topics
    pub async fn active_topics(&self) -> HashSet<Topic> {
        self.subscriptions.read().await.active_topics()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Start polls of the due collectors among the topics anyone is
    /// subscribed to, without waiting for them
    #[instrument(skip_all)]
    pub async fn start_collect(&self) -> Vec<JoinHandle<()>> {
        let active = self.active_topics().await;
        if active.is_empty() {
            trace!("no subscriptions, nothing to collect");
            return vec![];
        }
        self.registry.spawn_due(Some(&active))
    }

    /// [`Dispatcher::start_collect`] and wait for the polls it started
    pub async fn collect(&self) {
        for result in join_all(self.start_collect().await).await {
            if let Err(e) = result {
                warn!("poll task ended abnormally: {e}");
            }
        }
    }

    /// Push every client the cached value of each topic it subscribed to
    ///
    /// Clients whose transport is gone are disconnected; delivery to the
    /// others continues. Returns the number of queued messages.
    #[instrument(skip_all)]
    pub async fn dispatch_tick(&self) -> usize {
        let subscriptions: Vec<(ClientId, HashSet<Topic>)> = self
            .subscriptions
            .read()
            .await
            .iter()
            .map(|(client, topics)| (client, topics.clone()))
            .collect();

        let mut cached = HashMap::new();
        for topic in subscriptions.iter().flat_map(|(_, topics)| topics) {
            if !cached.contains_key(topic)
                && let Some(value) = self.registry.get(*topic).await
            {
                cached.insert(*topic, value);
            }
        }

        let mut delivered = 0;
        let mut gone = vec![];
        {
            let clients = self.clients.read().await;
            for (client, topics) in &subscriptions {
                let Some(sender) = clients.get(client) else {
                    gone.push(*client);
                    continue;
                };

                for topic in topics {
                    let Some(data) = cached.get(topic) else {
                        continue;
                    };

                    let message = TopicMessage {
                        topic: *topic,
                        data: data.clone(),
                    };
                    match sender.push(message) {
                        Ok(()) => delivered += 1,
                        Err(e) => {
                            debug!("delivery failed: {e}");
                            gone.push(*client);
                            break;
                        }
                    }
                }
            }
        }

        for client in gone {
            self.disconnect(client).await;
        }

        trace!("queued {delivered} messages");
        delivered
    }
}
