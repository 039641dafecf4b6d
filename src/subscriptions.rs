//! Per-client topic subscriptions

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::topic::Topic;

/// Identifies one connected telemetry client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    /// Allocate a process-wide unique id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ClientId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// The request named a topic that is not served
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
}

/// Which topics each client wants
///
/// Subscribing replaces a client's whole set; a request with any invalid
/// topic is rejected without touching the existing set.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    valid: HashSet<Topic>,
    clients: HashMap<ClientId, HashSet<Topic>>,
}

impl SubscriptionTable {
    pub fn new(valid: HashSet<Topic>) -> Self {
        Self {
            valid,
            clients: HashMap::new(),
        }
    }

    /// Replace the subscription of `client` with exactly `topics`
    pub fn subscribe<S: AsRef<str>>(
        &mut self,
        client: ClientId,
        topics: &[S],
    ) -> Result<&HashSet<Topic>, SubscriptionError> {
        let topics = topics
            .iter()
            .map(|name| {
                let name = name.as_ref();
                name.parse::<Topic>()
                    .ok()
                    .filter(|topic| self.valid.contains(topic))
                    .ok_or_else(|| SubscriptionError::UnknownTopic(name.to_string()))
            })
            .collect::<Result<HashSet<_>, _>>()?;

        let entry = self.clients.entry(client).or_default();
        *entry = topics;
        Ok(entry)
    }

    /// Drop the subscription of `client`; returns whether it had one
    pub fn unsubscribe(&mut self, client: ClientId) -> bool {
        self.clients.remove(&client).is_some()
    }

    pub fn topics(&self, client: ClientId) -> Option<&HashSet<Topic>> {
        self.clients.get(&client)
    }

    /// Union of every client's topics
    pub fn active_topics(&self) -> HashSet<Topic> {
        self.clients.values().flatten().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClientId, &HashSet<Topic>)> {
        self.clients.iter().map(|(client, topics)| (*client, topics))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
