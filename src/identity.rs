//! Cross-conversation actor clustering.
//!
//! Scammers reuse payment handles, phone numbers, and drop URLs across
//! campaigns. Every validated identifier registered here unions its actor with
//! every other actor previously seen holding the same normalized identifier
//! (union-find with path compression), building a standing graph of connected
//! actors for network-level risk escalation.
//!
//! Callers must screen identifiers through [`crate::extract::EntityValidator`]
//! before registration — a coincidental match on a placeholder or
//! low-specificity value must never merge two actors.
//!
//! The union-find structure is shared across all conversations; the interior
//! mutex serializes `register` and `detect_clusters` since path compression
//! mutates shared parent pointers.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::IdentityError;
use crate::extract::EntityType;

/// One observed actor and everything tied to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorNode {
    pub actor_id: String,
    /// Normalized identifiers by type.
    pub identifiers: HashMap<EntityType, BTreeSet<String>>,
    /// Actors observed sharing at least one identifier; symmetric.
    pub connections: BTreeSet<String>,
    pub conversations: BTreeSet<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl ActorNode {
    fn new(actor_id: String) -> Self {
        let now = Utc::now();
        Self {
            actor_id,
            identifiers: HashMap::new(),
            connections: BTreeSet::new(),
            conversations: BTreeSet::new(),
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    pub fn identifier_count(&self) -> usize {
        self.identifiers.values().map(BTreeSet::len).sum()
    }
}

/// Derived view of one connected group of actors. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorCluster {
    /// Member actor ids, sorted.
    pub members: Vec<String>,
    /// `type:value` identifiers held by at least two members, sorted.
    pub shared_identifiers: Vec<String>,
    pub total_conversations: usize,
    pub cluster_risk_score: f32,
}

struct GraphInner {
    actors: HashMap<String, ActorNode>,
    /// actor id → union-find slot.
    slots: HashMap<String, usize>,
    uf: UnionFind<usize>,
    capacity: usize,
    /// Union history, replayed when the union-find is regrown.
    union_edges: Vec<(usize, usize)>,
    /// Normalized identifier → holder actor ids.
    holders: HashMap<(EntityType, String), BTreeSet<String>>,
}

impl GraphInner {
    fn slot_for(&mut self, actor_id: &str) -> usize {
        if let Some(&slot) = self.slots.get(actor_id) {
            return slot;
        }
        let slot = self.slots.len();
        if slot >= self.capacity {
            // Regrow by doubling and replay the union history.
            self.capacity *= 2;
            let mut uf = UnionFind::new(self.capacity);
            for &(a, b) in &self.union_edges {
                uf.union(a, b);
            }
            self.uf = uf;
        }
        self.slots.insert(actor_id.to_string(), slot);
        slot
    }
}

/// Union-find based identity graph over scammer actors.
pub struct IdentityGraph {
    inner: Mutex<GraphInner>,
}

impl IdentityGraph {
    const INITIAL_CAPACITY: usize = 64;

    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GraphInner {
                actors: HashMap::new(),
                slots: HashMap::new(),
                uf: UnionFind::new(Self::INITIAL_CAPACITY),
                capacity: Self::INITIAL_CAPACITY,
                union_edges: Vec::new(),
                holders: HashMap::new(),
            }),
        }
    }

    /// Register identifiers for an actor, unioning it with every previous
    /// holder of an identical normalized identifier. Idempotent under repeated
    /// registration of the same pair.
    pub fn register(
        &self,
        actor_id: &str,
        identifiers: &HashMap<EntityType, Vec<String>>,
        conversation_id: Option<&str>,
    ) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();

        inner
            .actors
            .entry(actor_id.to_string())
            .or_insert_with(|| {
                info!(actor_id, "new actor observed");
                ActorNode::new(actor_id.to_string())
            });
        let slot = inner.slot_for(actor_id);

        for (entity_type, values) in identifiers {
            for value in values {
                let Some(normalized) = normalize_identifier(entity_type, value) else {
                    continue;
                };

                let key = (entity_type.clone(), normalized.clone());
                let holders = inner.holders.entry(key).or_default();
                let peers: Vec<String> = holders
                    .iter()
                    .filter(|peer| peer.as_str() != actor_id)
                    .cloned()
                    .collect();
                holders.insert(actor_id.to_string());

                for peer in peers {
                    let peer_slot = inner.slot_for(&peer);
                    if inner.uf.union(slot, peer_slot) {
                        inner.union_edges.push((slot, peer_slot));
                    }
                    debug!(actor_id, peer = %peer, identifier = %normalized, "identifier reuse links actors");
                    if let Some(node) = inner.actors.get_mut(&peer) {
                        node.connections.insert(actor_id.to_string());
                    }
                    if let Some(node) = inner.actors.get_mut(actor_id) {
                        node.connections.insert(peer);
                    }
                }

                if let Some(node) = inner.actors.get_mut(actor_id) {
                    node.identifiers
                        .entry(entity_type.clone())
                        .or_default()
                        .insert(normalized);
                }
            }
        }

        if let Some(node) = inner.actors.get_mut(actor_id) {
            if let Some(conv) = conversation_id {
                node.conversations.insert(conv.to_string());
            }
            node.last_seen = now;
        }
    }

    /// Snapshot of one actor.
    pub fn actor(&self, actor_id: &str) -> Result<ActorNode, IdentityError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .actors
            .get(actor_id)
            .cloned()
            .ok_or_else(|| IdentityError::ActorNotFound {
                actor_id: actor_id.to_string(),
            })
    }

    pub fn actor_count(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.actors.len()
    }

    /// Snapshot every actor node, for persistence sync.
    pub fn snapshot_all(&self) -> Vec<ActorNode> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.actors.values().cloned().collect()
    }

    /// Restore a previously externalized actor node (connections and
    /// identifier index are rebuilt from its identifier sets).
    pub fn restore(&self, node: ActorNode) {
        let identifiers: HashMap<EntityType, Vec<String>> = node
            .identifiers
            .iter()
            .map(|(t, vs)| (t.clone(), vs.iter().cloned().collect()))
            .collect();
        let conversations: Vec<String> = node.conversations.iter().cloned().collect();
        self.register(&node.actor_id, &identifiers, None);
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = inner.actors.get_mut(&node.actor_id) {
            existing.conversations.extend(conversations);
            existing.first_seen = existing.first_seen.min(node.first_seen);
        }
    }

    /// Bounded BFS over the connection relation. Returns every actor reachable
    /// from `actor_id` within `max_depth` hops, excluding the start.
    pub fn find_connected(
        &self,
        actor_id: &str,
        max_depth: usize,
    ) -> Result<Vec<String>, IdentityError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !inner.actors.contains_key(actor_id) {
            return Err(IdentityError::ActorNotFound {
                actor_id: actor_id.to_string(),
            });
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut found: Vec<String> = Vec::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();

        visited.insert(actor_id.to_string());
        queue.push_back((actor_id.to_string(), 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let Some(node) = inner.actors.get(&current) else {
                continue;
            };
            for neighbor in &node.connections {
                if visited.insert(neighbor.clone()) {
                    found.push(neighbor.clone());
                    queue.push_back((neighbor.clone(), depth + 1));
                }
            }
        }

        found.sort();
        Ok(found)
    }

    /// Group actors by union-find root and keep groups of at least `min_size`.
    /// Output is deterministic and invariant to registration order.
    pub fn detect_clusters(&self, min_size: usize) -> Vec<ActorCluster> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let slots: Vec<(String, usize)> = inner
            .slots
            .iter()
            .map(|(id, &slot)| (id.clone(), slot))
            .collect();

        let mut groups: HashMap<usize, Vec<String>> = HashMap::new();
        for (actor_id, slot) in slots {
            let root = inner.uf.find_mut(slot);
            groups.entry(root).or_default().push(actor_id);
        }

        let mut clusters = Vec::new();
        for (_, mut members) in groups {
            if members.len() < min_size {
                continue;
            }
            members.sort();
            let member_set: HashSet<&String> = members.iter().collect();

            let mut shared: Vec<String> = inner
                .holders
                .iter()
                .filter(|(_, holders)| {
                    holders.iter().filter(|h| member_set.contains(h)).count() >= 2
                })
                .map(|((entity_type, value), _)| format!("{entity_type}:{value}"))
                .collect();
            shared.sort();

            let total_conversations: usize = members
                .iter()
                .filter_map(|id| inner.actors.get(id))
                .map(ActorNode::conversation_count)
                .sum();

            let cluster_risk_score = cluster_risk(members.len(), shared.len(), total_conversations);

            clusters.push(ActorCluster {
                members,
                shared_identifiers: shared,
                total_conversations,
                cluster_risk_score,
            });
        }

        clusters.sort_by(|a, b| a.members.cmp(&b.members));
        clusters
    }

    /// Identifiers reused by more than one actor, for investigative reporting.
    pub fn reused_identifiers(&self) -> Vec<(EntityType, String, Vec<String>)> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut reused: Vec<(EntityType, String, Vec<String>)> = inner
            .holders
            .iter()
            .filter(|(_, holders)| holders.len() > 1)
            .map(|((entity_type, value), holders)| {
                (
                    entity_type.clone(),
                    value.clone(),
                    holders.iter().cloned().collect(),
                )
            })
            .collect();
        reused.sort_by(|a, b| (a.0.label(), &a.1).cmp(&(b.0.label(), &b.1)));
        reused
    }
}

impl Default for IdentityGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier normalization for graph membership: digits-only phones,
/// lower-cased handles and emails, host-only URLs, upper-cased routing codes.
fn normalize_identifier(entity_type: &EntityType, value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    match entity_type {
        EntityType::Phone => {
            let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
            let national = if digits.len() == 12 && digits.starts_with("91") {
                digits[2..].to_string()
            } else {
                digits
            };
            (national.len() == 10).then_some(national)
        }
        EntityType::PaymentHandle | EntityType::Email => Some(trimmed.to_lowercase()),
        EntityType::RoutingCode => Some(trimmed.to_uppercase()),
        EntityType::Url => {
            let stripped = trimmed
                .strip_prefix("https://")
                .or_else(|| trimmed.strip_prefix("http://"))
                .unwrap_or(trimmed);
            let host = stripped.split(['/', '?', '#']).next().unwrap_or("");
            (!host.is_empty()).then(|| host.to_lowercase())
        }
        EntityType::BankAccount => {
            let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
            (9..=18).contains(&digits.len()).then_some(digits)
        }
        EntityType::Amount => None, // amounts identify nobody
        EntityType::Other(_) => Some(trimmed.to_lowercase()),
    }
}

fn cluster_risk(members: usize, shared_identifiers: usize, total_conversations: usize) -> f32 {
    let base = 0.3
        + 0.1 * members.min(3) as f32
        + 0.1 * shared_identifiers.min(2) as f32
        + (0.05 * total_conversations as f32).min(0.2);
    base.clamp(0.0, 1.0)
}
