/*
 * ‌
 * clustrans
 * ​
 * Copyright (C) 2024 The clustrans Authors
 * ​
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 * ‍
 */

//! The node pool: membership, liveness, and round-robin selection.
//!
//! The live node set lives behind an atomically-swapped snapshot so a sniff
//! never blocks an in-flight request, and per-node liveness is tracked with
//! an exponential dead-time backoff.

use std::sync::atomic::{
    AtomicUsize,
    Ordering,
};
use std::time::{
    Duration,
    Instant,
};

use http::Uri;
use parking_lot::RwLock;
use triomphe::Arc;

use crate::node::Node;
use crate::ArcSwap;

/// What kind of pool this is, which determines whether it may be refreshed
/// by a [`crate::sniffer::Sniffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Exactly one node; never sniffable.
    SingleNode,
    /// A fixed list of nodes configured up front; never sniffable.
    Static,
    /// A pool whose membership is refreshed from the cluster at runtime.
    Sniffing,
    /// Like `Sniffing`, but callers may pin a request to a specific node.
    Sticky,
}

impl PoolKind {
    /// Whether this pool kind may have its membership refreshed by a sniff.
    pub fn is_sniffable(self) -> bool {
        matches!(self, PoolKind::Sniffing | PoolKind::Sticky)
    }
}

#[derive(Debug, Clone, Copy)]
struct NodeState {
    is_alive: bool,
    dead_until: Option<Instant>,
    failed_attempts: u32,
}

impl Default for NodeState {
    fn default() -> Self {
        Self { is_alive: true, dead_until: None, failed_attempts: 0 }
    }
}

struct NodeSlot {
    uri: Uri,
    state: RwLock<NodeState>,
}

struct PoolData {
    nodes: Box<[NodeSlot]>,
}

impl PoolData {
    fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// Exponential-backoff bounds for dead-node revival.
#[derive(Debug, Clone, Copy)]
pub struct DeadTimeout {
    /// Base dead-time applied after the first failure. Default: 60s.
    pub dead_timeout: Duration,
    /// Ceiling on the exponential backoff. Default: 30 minutes.
    pub max_dead_timeout: Duration,
}

impl Default for DeadTimeout {
    fn default() -> Self {
        Self { dead_timeout: Duration::from_secs(60), max_dead_timeout: Duration::from_secs(30 * 60) }
    }
}

/// Enumerates live candidate nodes with timed revival of dead ones, plus
/// round-robin selection with a retry budget bounded by the live node count.
pub struct NodePool {
    kind: PoolKind,
    data: ArcSwap<PoolData>,
    cursor: AtomicUsize,
    dead_timeout: DeadTimeout,
}

impl NodePool {
    /// Build a pool from an initial node list.
    pub fn new(kind: PoolKind, uris: Vec<Uri>, dead_timeout: DeadTimeout) -> Self {
        let nodes = uris
            .into_iter()
            .map(|uri| NodeSlot { uri, state: RwLock::new(NodeState::default()) })
            .collect();

        Self {
            kind,
            data: ArcSwap::new(Arc::new(PoolData { nodes })),
            cursor: AtomicUsize::new(0),
            dead_timeout,
        }
    }

    /// The kind of pool this is.
    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    /// Number of nodes currently in the pool, alive or dead.
    pub fn len(&self) -> usize {
        self.data.load().len()
    }

    /// Whether the pool currently has zero nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot_nodes(&self, now: Instant) -> (arc_swap::Guard<Arc<PoolData>>, Vec<usize>) {
        let snapshot = self.data.load();
        let usable: Vec<usize> = (0..snapshot.len())
            .filter(|&i| snapshot.nodes[i].state.read().is_alive_at(now))
            .collect();

        if !usable.is_empty() {
            return (snapshot, usable);
        }

        // Last-resort revival: nothing currently qualifies, so surface the
        // single node with the earliest `dead_until`.
        let earliest = (0..snapshot.len()).min_by_key(|&i| {
            snapshot.nodes[i].state.read().dead_until.unwrap_or(now)
        });

        (snapshot, earliest.into_iter().collect())
    }

    /// Compute the retry budget for a request: `min(max_retries + 1,
    /// live_node_count)`, with `max_retries` defaulting to
    /// `live_node_count - 1`, floored at 1.
    fn retry_budget(max_retries: Option<usize>, live_node_count: usize) -> usize {
        let max_retries = max_retries.unwrap_or_else(|| live_node_count.saturating_sub(1));
        (max_retries + 1).min(live_node_count.max(1)).max(1)
    }

    /// Yield the bounded sequence of node indices to attempt for one
    /// request, honoring the round-robin cursor. The snapshot is taken
    /// once up front so a concurrent sniff or mark-alive/dead from another
    /// request cannot mutate this request's view mid-iteration.
    pub(crate) fn next_nodes(&self, now: Instant, max_retries: Option<usize>) -> Vec<NodeHandle> {
        let (snapshot, usable) = self.snapshot_nodes(now);

        if usable.is_empty() {
            return Vec::new();
        }

        let budget = Self::retry_budget(max_retries, usable.len());
        let start = self.cursor.fetch_add(budget, Ordering::Relaxed) % usable.len();

        (0..budget)
            .map(|i| {
                let node_index = usable[(start + i) % usable.len()];
                let slot = &snapshot.nodes[node_index];
                NodeHandle { node_index, node: read_node(slot) }
            })
            .collect()
    }

    /// Record a successful attempt against a node: resets its failure
    /// count and marks it alive.
    pub(crate) fn mark_alive(&self, node_index: usize) {
        let snapshot = self.data.load();
        if let Some(slot) = snapshot.nodes.get(node_index) {
            let mut state = slot.state.write();
            state.is_alive = true;
            state.dead_until = None;
            state.failed_attempts = 0;
        }
    }

    /// Record a failed attempt against a node: bumps its failure count and
    /// sets `dead_until = now + min(2^failed_attempts * dead_timeout,
    /// max_dead_timeout)`.
    pub(crate) fn mark_dead(&self, node_index: usize, now: Instant) {
        let snapshot = self.data.load();
        let Some(slot) = snapshot.nodes.get(node_index) else {
            return;
        };

        let mut state = slot.state.write();
        state.is_alive = false;
        let backoff = self
            .dead_timeout
            .dead_timeout
            .saturating_mul(1u32.checked_shl(state.failed_attempts).unwrap_or(u32::MAX))
            .min(self.dead_timeout.max_dead_timeout);
        state.dead_until = Some(now + backoff);
        state.failed_attempts = state.failed_attempts.saturating_add(1);

        log::debug!(
            "node {} marked dead for {backoff:?} (attempt {})",
            slot.uri,
            state.failed_attempts
        );
    }

    /// Atomically replace the node set, preserving the health of any node
    /// whose URI is unchanged, and preserving the cursor position modulo
    /// the new length.
    pub(crate) fn sniff(&self, new_uris: Vec<Uri>) {
        let old = self.data.load();

        let nodes = new_uris
            .into_iter()
            .map(|uri| {
                let state = old
                    .nodes
                    .iter()
                    .find(|slot| slot.uri == uri)
                    .map(|slot| *slot.state.read())
                    .unwrap_or_default();

                NodeSlot { uri, state: RwLock::new(state) }
            })
            .collect();

        let count = nodes.len();
        self.data.store(Arc::new(PoolData { nodes }));
        log::debug!("pool membership refreshed: {count} node(s)");
    }

    /// A read-only snapshot of every node currently in the pool, for
    /// diagnostics and audit purposes.
    pub fn nodes(&self) -> Vec<Node> {
        let snapshot = self.data.load();
        (0..snapshot.len()).map(|i| read_node(&snapshot.nodes[i])).collect()
    }
}

fn read_node(slot: &NodeSlot) -> Node {
    let state = *slot.state.read();
    Node {
        uri: slot.uri.clone(),
        is_alive: state.is_alive,
        dead_until: state.dead_until,
        failed_attempts: state.failed_attempts,
    }
}

impl NodeState {
    fn is_alive_at(&self, now: Instant) -> bool {
        self.is_alive || self.dead_until.map_or(true, |until| until <= now)
    }
}

/// A node yielded by [`NodePool::next_nodes`], paired with the index
/// needed to report mark-alive/mark-dead back to the pool.
pub(crate) struct NodeHandle {
    pub(crate) node_index: usize,
    pub(crate) node: Node,
}

#[cfg(test)]
mod tests {
    use std::time::{
        Duration,
        Instant,
    };

    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn round_robin_visits_all_alive_nodes() {
        let pool = NodePool::new(
            PoolKind::Static,
            vec![uri("http://a"), uri("http://b")],
            DeadTimeout::default(),
        );

        let now = Instant::now();
        let first = pool.next_nodes(now, None);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn mark_dead_sets_exponential_backoff() {
        let pool =
            NodePool::new(PoolKind::Static, vec![uri("http://a")], DeadTimeout::default());

        let now = Instant::now();
        pool.mark_dead(0, now);

        let nodes = pool.nodes();
        assert!(!nodes[0].is_alive());
        assert_eq!(nodes[0].failed_attempts(), 1);
    }

    #[test]
    fn sniff_preserves_health_for_unchanged_nodes() {
        let pool = NodePool::new(
            PoolKind::Sniffing,
            vec![uri("http://a"), uri("http://b")],
            DeadTimeout::default(),
        );

        let now = Instant::now();
        pool.mark_dead(0, now);

        pool.sniff(vec![uri("http://a"), uri("http://c")]);

        let nodes = pool.nodes();
        let a = nodes.iter().find(|n| n.uri() == &uri("http://a")).unwrap();
        assert!(!a.is_alive());

        let c = nodes.iter().find(|n| n.uri() == &uri("http://c")).unwrap();
        assert!(c.is_alive());
    }

    #[test]
    fn last_resort_revival_when_all_dead() {
        let pool = NodePool::new(
            PoolKind::Static,
            vec![uri("http://a"), uri("http://b")],
            DeadTimeout { dead_timeout: Duration::from_secs(1), max_dead_timeout: Duration::from_secs(60) },
        );

        let now = Instant::now();
        pool.mark_dead(0, now);
        pool.mark_dead(1, now);

        let handles = pool.next_nodes(now, None);
        assert_eq!(handles.len(), 1);
    }
}
