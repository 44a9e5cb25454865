//! Kademlia-style routing table

use crate::types::Node;
use ember_primitives::NodeId;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Nodes kept per distance bucket
pub const BUCKET_SIZE: usize = 16;

/// What `RoutingTable::insert` did with a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New node stored
    Added,
    /// Known node, last-seen refreshed
    Refreshed,
    /// Bucket was full; the oldest entry was evicted for the newcomer
    Replaced {
        /// The node pushed out
        evicted: Node,
    },
    /// Dropped: self, blacklisted host, or full bucket with fresher entries
    Rejected,
}

#[derive(Debug)]
struct Bucket {
    nodes: Vec<Node>,
    last_refresh: Instant,
}

impl Bucket {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            last_refresh: Instant::now(),
        }
    }
}

/// The live routing table: one bucket per XOR-distance magnitude, plus the
/// blacklist applied on ingest and peer selection.
pub struct RoutingTable {
    local: Node,
    buckets: Vec<Bucket>,
    blacklist: HashSet<String>,
}

impl RoutingTable {
    /// Create a table around the local node
    pub fn new(local: Node, blacklist: impl IntoIterator<Item = String>) -> Self {
        Self {
            local,
            buckets: (0..NodeId::BITS).map(|_| Bucket::new()).collect(),
            blacklist: blacklist.into_iter().collect(),
        }
    }

    /// The local node
    pub fn local(&self) -> &Node {
        &self.local
    }

    /// Replace the local contact (self-IP discovery). The node identity is
    /// deliberately not re-derived for existing table entries.
    pub fn set_local(&mut self, local: Node) {
        self.local = local;
    }

    /// Whether a host is blacklisted
    pub fn is_blacklisted(&self, host: &str) -> bool {
        self.blacklist.contains(host)
    }

    /// Insert or refresh a node
    pub fn insert(&mut self, node: Node) -> InsertOutcome {
        if node.id == self.local.id || self.is_blacklisted(&node.host) {
            return InsertOutcome::Rejected;
        }
        let Some(index) = self.local.id.bucket_index(&node.id) else {
            return InsertOutcome::Rejected;
        };
        let bucket = &mut self.buckets[index];

        if let Some(existing) = bucket.nodes.iter_mut().find(|n| n.id == node.id) {
            if node.seen > existing.seen {
                existing.seen = node.seen;
            }
            existing.host = node.host;
            existing.port = node.port;
            return InsertOutcome::Refreshed;
        }

        if bucket.nodes.len() < BUCKET_SIZE {
            bucket.nodes.push(node);
            return InsertOutcome::Added;
        }

        // Full bucket: the newcomer replaces the oldest entry only if that
        // entry is older than the newcomer.
        let (oldest_pos, oldest_seen) = match bucket
            .nodes
            .iter()
            .enumerate()
            .min_by_key(|(_, n)| n.seen)
        {
            Some((pos, n)) => (pos, n.seen),
            None => return InsertOutcome::Rejected,
        };
        if oldest_seen < node.seen {
            let evicted = std::mem::replace(&mut bucket.nodes[oldest_pos], node);
            return InsertOutcome::Replaced { evicted };
        }
        InsertOutcome::Rejected
    }

    /// Remove a node by id
    pub fn remove(&mut self, id: &NodeId) -> Option<Node> {
        let index = self.local.id.bucket_index(id)?;
        let bucket = &mut self.buckets[index];
        let pos = bucket.nodes.iter().position(|n| &n.id == id)?;
        Some(bucket.nodes.remove(pos))
    }

    /// Whether a node is in the table
    pub fn contains(&self, id: &NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Look up a node by id
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        let index = self.local.id.bucket_index(id)?;
        self.buckets[index].nodes.iter().find(|n| &n.id == id)
    }

    /// Number of stored nodes
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.nodes.len()).sum()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored node
    pub fn all_nodes(&self) -> Vec<Node> {
        self.buckets
            .iter()
            .flat_map(|b| b.nodes.iter().cloned())
            .collect()
    }

    /// The health set: live nodes minus blacklist minus self, deduplicated
    /// by endpoint.
    pub fn healthy_nodes(&self) -> Vec<Node> {
        let self_endpoint = self.local.endpoint();
        let mut seen = HashSet::new();
        self.all_nodes()
            .into_iter()
            .filter(|n| !self.is_blacklisted(&n.host))
            .filter(|n| n.endpoint() != self_endpoint)
            .filter(|n| seen.insert(n.endpoint()))
            .collect()
    }

    /// Up to `count` healthy nodes, chosen uniformly at random
    pub fn random_nodes(&self, count: usize) -> Vec<Node> {
        let mut healthy = self.healthy_nodes();
        healthy.shuffle(&mut rand::thread_rng());
        healthy.truncate(count);
        healthy
    }

    /// The `count` stored nodes closest to `target` in XOR distance
    pub fn closest(&self, target: &NodeId, count: usize) -> Vec<Node> {
        let mut nodes = self.all_nodes();
        nodes.sort_by_key(|n| n.id.distance(target));
        nodes.truncate(count);
        nodes
    }

    /// Indices of buckets that hold nodes but have not been refreshed
    /// within `max_age`
    pub fn stale_buckets(&self, max_age: Duration) -> Vec<usize> {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.nodes.is_empty() && b.last_refresh.elapsed() >= max_age)
            .map(|(i, _)| i)
            .collect()
    }

    /// Reset a bucket's refresh timer
    pub fn mark_refreshed(&mut self, index: usize) {
        if let Some(bucket) = self.buckets.get_mut(index) {
            bucket.last_refresh = Instant::now();
        }
    }

    /// Drop every node last seen before `cutoff` (unix millis); returns the
    /// dropped nodes.
    pub fn evict_seen_before(&mut self, cutoff: i64) -> Vec<Node> {
        let mut evicted = Vec::new();
        for bucket in &mut self.buckets {
            let (stale, fresh): (Vec<Node>, Vec<Node>) =
                bucket.nodes.drain(..).partition(|n| n.seen < cutoff);
            bucket.nodes = fresh;
            evicted.extend(stale);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> Node {
        Node::new("127.0.0.1", 7000, 0)
    }

    fn table() -> RoutingTable {
        RoutingTable::new(local(), Vec::new())
    }

    fn peer(last_octet: u8, seen: i64) -> Node {
        Node::new(format!("10.0.0.{}", last_octet), 7000, seen)
    }

    #[test]
    fn test_insert_and_get() {
        let mut table = table();
        let node = peer(1, 100);
        assert_eq!(table.insert(node.clone()), InsertOutcome::Added);
        assert!(table.contains(&node.id));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_insert_self_rejected() {
        let mut table = table();
        assert_eq!(table.insert(local()), InsertOutcome::Rejected);
        assert!(table.is_empty());
    }

    #[test]
    fn test_insert_blacklisted_rejected() {
        let mut table = RoutingTable::new(local(), vec!["10.0.0.66".to_string()]);
        let node = Node::new("10.0.0.66", 7000, 100);
        assert_eq!(table.insert(node), InsertOutcome::Rejected);
    }

    #[test]
    fn test_insert_refreshes_seen() {
        let mut table = table();
        let node = peer(1, 100);
        table.insert(node.clone());

        let mut fresher = node.clone();
        fresher.seen = 500;
        assert_eq!(table.insert(fresher), InsertOutcome::Refreshed);
        assert_eq!(table.get(&node.id).unwrap().seen, 500);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_refresh_never_rolls_seen_back() {
        let mut table = table();
        let node = peer(1, 500);
        table.insert(node.clone());

        let mut older = node.clone();
        older.seen = 100;
        table.insert(older);
        assert_eq!(table.get(&node.id).unwrap().seen, 500);
    }

    #[test]
    fn test_remove() {
        let mut table = table();
        let node = peer(1, 100);
        table.insert(node.clone());

        let removed = table.remove(&node.id).unwrap();
        assert_eq!(removed.id, node.id);
        assert!(!table.contains(&node.id));
    }

    #[test]
    fn test_healthy_excludes_blacklist_and_self() {
        let mut table = RoutingTable::new(local(), vec!["10.0.0.2".to_string()]);
        table.insert(peer(1, 100));
        table.insert(peer(2, 100)); // rejected at ingest anyway

        let healthy = table.healthy_nodes();
        assert_eq!(healthy.len(), 1);
        assert_eq!(healthy[0].host, "10.0.0.1");
    }

    #[test]
    fn test_random_nodes_bounded() {
        let mut table = table();
        for i in 1..=10u8 {
            table.insert(peer(i, 100));
        }
        assert_eq!(table.random_nodes(3).len(), 3);
        assert_eq!(table.random_nodes(50).len(), 10);
    }

    #[test]
    fn test_closest_orders_by_distance() {
        let mut table = table();
        for i in 1..=10u8 {
            table.insert(peer(i, 100));
        }
        let target = peer(1, 0).id;
        let closest = table.closest(&target, 3);
        assert_eq!(closest.len(), 3);
        assert_eq!(closest[0].id, target);

        // Distances are non-decreasing
        let d0 = closest[0].id.distance(&target);
        let d1 = closest[1].id.distance(&target);
        let d2 = closest[2].id.distance(&target);
        assert!(d0 <= d1 && d1 <= d2);
    }

    #[test]
    fn test_bucket_eviction_prefers_fresher() {
        let mut table = table();

        // Insert far more nodes than one bucket holds
        let mut added = 0;
        for i in 0..=200u8 {
            let node = Node::new(format!("10.0.{}.{}", i / 64, i), 7000, 100 + i as i64);
            if table.insert(node) == InsertOutcome::Added {
                added += 1;
            }
        }
        assert!(added > 0);

        // A newcomer older than everything in a full bucket is rejected;
        // verified indirectly: table never exceeds bucket capacity.
        for bucket_nodes in table.buckets.iter().map(|b| b.nodes.len()) {
            assert!(bucket_nodes <= BUCKET_SIZE);
        }
    }

    #[test]
    fn test_evict_seen_before() {
        let mut table = table();
        table.insert(peer(1, 100));
        table.insert(peer(2, 2000));

        let evicted = table.evict_seen_before(1000);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].host, "10.0.0.1");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_stale_buckets_and_refresh() {
        let mut table = table();
        table.insert(peer(1, 100));

        // Zero max-age marks every non-empty bucket stale
        let stale = table.stale_buckets(Duration::ZERO);
        assert_eq!(stale.len(), 1);

        table.mark_refreshed(stale[0]);
        let stale = table.stale_buckets(Duration::from_secs(60));
        assert!(stale.is_empty());
    }

    #[test]
    fn test_set_local_keeps_entries() {
        let mut table = table();
        table.insert(peer(1, 100));

        table.set_local(Node::new("203.0.113.5", 7000, 0));
        assert_eq!(table.local().host, "203.0.113.5");
        // Entries bucketed under the old identity remain reachable
        assert_eq!(table.all_nodes().len(), 1);
    }
}
