//! nametree.rs — authenticated binary trie over the name set
//!
//! Keys are 32-byte name-hashes, values the serialized `NameState`. Nodes
//! are shared structurally (`Arc`), so snapshots are O(1) handles and every
//! mutation is copy-on-write along one root-to-leaf path. The root is the
//! commitment recorded in block headers at tree-interval boundaries.
//!
//! Shape invariant: a leaf sits at the shallowest depth where it is alone in
//! its subtree, and an internal node never has a lone leaf child. That makes
//! the structure (and therefore the root) a function of the key set alone,
//! independent of insertion order.

use std::sync::Arc;

use crate::types::{blake3_hash, Hash32, ZERO_HASH};

const LEAF_TAG: u8 = 0x00;
const INTERNAL_TAG: u8 = 0x01;

fn bit(key: &Hash32, depth: usize) -> bool {
    (key[depth >> 3] >> (7 - (depth & 7))) & 1 == 1
}

fn leaf_hash(key: &Hash32, value: &[u8]) -> Hash32 {
    let vh = blake3_hash(value);
    let mut buf = Vec::with_capacity(1 + 32 + 32);
    buf.push(LEAF_TAG);
    buf.extend_from_slice(key);
    buf.extend_from_slice(&vh);
    blake3_hash(&buf)
}

fn internal_hash(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut buf = Vec::with_capacity(1 + 32 + 32);
    buf.push(INTERNAL_TAG);
    buf.extend_from_slice(left);
    buf.extend_from_slice(right);
    blake3_hash(&buf)
}

#[derive(Debug)]
enum Node {
    Leaf { key: Hash32, value: Vec<u8>, hash: Hash32 },
    Internal { left: Option<Arc<Node>>, right: Option<Arc<Node>>, hash: Hash32 },
}

impl Node {
    fn hash(&self) -> Hash32 {
        match self {
            Node::Leaf { hash, .. } | Node::Internal { hash, .. } => *hash,
        }
    }
}

fn child_hash(child: &Option<Arc<Node>>) -> Hash32 {
    child.as_ref().map(|n| n.hash()).unwrap_or(ZERO_HASH)
}

fn leaf(key: Hash32, value: Vec<u8>) -> Arc<Node> {
    let hash = leaf_hash(&key, &value);
    Arc::new(Node::Leaf { key, value, hash })
}

fn internal(left: Option<Arc<Node>>, right: Option<Arc<Node>>) -> Arc<Node> {
    let hash = internal_hash(&child_hash(&left), &child_hash(&right));
    Arc::new(Node::Internal { left, right, hash })
}

/// O(1) handle to a committed tree shape.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    root: Option<Arc<Node>>,
}

/// Merkle proof for one key: sibling hashes from the root down, and the
/// terminal node encountered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeProof {
    pub siblings: Vec<Hash32>,
    /// Leaf found at the end of the path, if any.
    pub leaf: Option<(Hash32, Vec<u8>)>,
}

#[derive(Debug, Clone, Default)]
pub struct NameTree {
    root: Option<Arc<Node>>,
}

impl NameTree {
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Root commitment; the zero hash for an empty tree.
    pub fn root(&self) -> Hash32 {
        child_hash(&self.root)
    }

    pub fn insert(&mut self, key: Hash32, value: Vec<u8>) {
        let root = self.root.take();
        self.root = Some(insert_rec(root, key, value, 0));
    }

    /// Remove a key; returns whether it was present.
    pub fn remove(&mut self, key: &Hash32) -> bool {
        let root = self.root.take();
        let (root, removed) = remove_rec(root, key, 0);
        self.root = root;
        removed
    }

    pub fn get(&self, key: &Hash32) -> Option<&[u8]> {
        let mut node = self.root.as_deref()?;
        let mut depth = 0;
        loop {
            match node {
                Node::Leaf { key: k, value, .. } => {
                    return if k == key { Some(value) } else { None };
                }
                Node::Internal { left, right, .. } => {
                    let next = if bit(key, depth) { right } else { left };
                    node = next.as_deref()?;
                    depth += 1;
                }
            }
        }
    }

    /// Membership (or absence) proof for a key against the current root.
    pub fn prove(&self, key: &Hash32) -> TreeProof {
        let mut siblings = Vec::new();
        let mut node = self.root.as_deref();
        let mut depth = 0;
        loop {
            match node {
                None => return TreeProof { siblings, leaf: None },
                Some(Node::Leaf { key: k, value, .. }) => {
                    return TreeProof { siblings, leaf: Some((*k, value.clone())) };
                }
                Some(Node::Internal { left, right, .. }) => {
                    let (next, sibling) =
                        if bit(key, depth) { (right, left) } else { (left, right) };
                    siblings.push(child_hash(sibling));
                    node = next.as_deref();
                    depth += 1;
                }
            }
        }
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot { root: self.root.clone() }
    }

    pub fn rollback(&mut self, snapshot: TreeSnapshot) {
        self.root = snapshot.root;
    }
}

/// Verify a proof produced by [`NameTree::prove`] against a root. Proves
/// membership when the terminal leaf matches the key, absence otherwise.
pub fn verify_proof(root: &Hash32, key: &Hash32, proof: &TreeProof) -> bool {
    let mut hash = match &proof.leaf {
        Some((k, value)) => leaf_hash(k, value),
        None => ZERO_HASH,
    };
    for (depth, sibling) in proof.siblings.iter().enumerate().rev() {
        hash = if bit(key, depth) {
            internal_hash(sibling, &hash)
        } else {
            internal_hash(&hash, sibling)
        };
    }
    hash == *root
}

fn insert_rec(node: Option<Arc<Node>>, key: Hash32, value: Vec<u8>, depth: usize) -> Arc<Node> {
    match node {
        None => leaf(key, value),
        Some(n) => match &*n {
            Node::Leaf { key: existing, .. } => {
                if *existing == key {
                    return leaf(key, value);
                }
                split(n.clone(), leaf(key, value), depth)
            }
            Node::Internal { left, right, .. } => {
                if bit(&key, depth) {
                    let new_right = insert_rec(right.clone(), key, value, depth + 1);
                    internal(left.clone(), Some(new_right))
                } else {
                    let new_left = insert_rec(left.clone(), key, value, depth + 1);
                    internal(Some(new_left), right.clone())
                }
            }
        },
    }
}

/// Push two distinct leaves down to their first diverging bit, wrapping the
/// shared-prefix levels in single-child internals.
fn split(a: Arc<Node>, b: Arc<Node>, depth: usize) -> Arc<Node> {
    let (ka, kb) = match (&*a, &*b) {
        (Node::Leaf { key: ka, .. }, Node::Leaf { key: kb, .. }) => (*ka, *kb),
        _ => unreachable!("split on non-leaves"),
    };
    let mut fork = depth;
    while bit(&ka, fork) == bit(&kb, fork) {
        fork += 1;
    }
    let mut node = if bit(&ka, fork) {
        internal(Some(b), Some(a))
    } else {
        internal(Some(a), Some(b))
    };
    for level in (depth..fork).rev() {
        node = if bit(&ka, level) {
            internal(None, Some(node))
        } else {
            internal(Some(node), None)
        };
    }
    node
}

fn remove_rec(
    node: Option<Arc<Node>>,
    key: &Hash32,
    depth: usize,
) -> (Option<Arc<Node>>, bool) {
    match node {
        None => (None, false),
        Some(n) => match &*n {
            Node::Leaf { key: existing, .. } => {
                if existing == key {
                    (None, true)
                } else {
                    (Some(n), false)
                }
            }
            Node::Internal { left, right, .. } => {
                let (new_left, new_right, removed) = if bit(key, depth) {
                    let (r, removed) = remove_rec(right.clone(), key, depth + 1);
                    (left.clone(), r, removed)
                } else {
                    let (l, removed) = remove_rec(left.clone(), key, depth + 1);
                    (l, right.clone(), removed)
                };
                if !removed {
                    return (Some(n), false);
                }
                // Collapse: a lone leaf lifts up; a lone internal keeps its
                // place on the path to a deeper split.
                if new_left.is_none() && new_right.is_none() {
                    return (None, true);
                }
                let lone = match (&new_left, &new_right) {
                    (Some(only), None) | (None, Some(only)) => Some(only.clone()),
                    _ => None,
                };
                if let Some(only) = lone {
                    if matches!(&*only, Node::Leaf { .. }) {
                        return (Some(only), true);
                    }
                }
                (Some(internal(new_left, new_right)), true)
            }
        },
    }
}

#[cfg(test)]
mod nametree_tests {
    use super::*;
    use crate::types::blake3_hash;

    fn key(s: &str) -> Hash32 {
        blake3_hash(s.as_bytes())
    }

    #[test]
    fn empty_tree_has_zero_root() {
        assert_eq!(NameTree::new().root(), ZERO_HASH);
    }

    #[test]
    fn root_is_insertion_order_independent() {
        let keys: Vec<(Hash32, Vec<u8>)> =
            (0..24).map(|i| (key(&format!("name-{i}")), vec![i as u8; 9])).collect();

        let mut a = NameTree::new();
        for (k, v) in &keys {
            a.insert(*k, v.clone());
        }
        let mut b = NameTree::new();
        for (k, v) in keys.iter().rev() {
            b.insert(*k, v.clone());
        }
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn remove_restores_the_smaller_set_root() {
        let mut tree = NameTree::new();
        tree.insert(key("one"), b"1".to_vec());
        let one_only = tree.root();

        tree.insert(key("two"), b"2".to_vec());
        tree.insert(key("three"), b"3".to_vec());
        assert!(tree.remove(&key("two")));
        assert!(tree.remove(&key("three")));
        assert!(!tree.remove(&key("three")));
        assert_eq!(tree.root(), one_only);

        assert!(tree.remove(&key("one")));
        assert_eq!(tree.root(), ZERO_HASH);
    }

    #[test]
    fn overwrite_changes_root_and_value() {
        let mut tree = NameTree::new();
        tree.insert(key("one"), b"a".to_vec());
        let before = tree.root();
        tree.insert(key("one"), b"b".to_vec());
        assert_ne!(tree.root(), before);
        assert_eq!(tree.get(&key("one")), Some(b"b".as_ref()));
    }

    #[test]
    fn snapshot_rollback_is_exact() {
        let mut tree = NameTree::new();
        for i in 0..8 {
            tree.insert(key(&format!("k{i}")), vec![i]);
        }
        let snap = tree.snapshot();
        let root = tree.root();

        for i in 8..16 {
            tree.insert(key(&format!("k{i}")), vec![i]);
        }
        tree.remove(&key("k1"));
        assert_ne!(tree.root(), root);

        tree.rollback(snap);
        assert_eq!(tree.root(), root);
        assert_eq!(tree.get(&key("k1")), Some(vec![1u8].as_slice()));
    }

    #[test]
    fn proofs_verify_membership_and_absence() {
        let mut tree = NameTree::new();
        for i in 0..12 {
            tree.insert(key(&format!("k{i}")), vec![i]);
        }
        let root = tree.root();

        let k = key("k5");
        let proof = tree.prove(&k);
        assert!(verify_proof(&root, &k, &proof));
        assert_eq!(proof.leaf.as_ref().map(|(lk, _)| *lk), Some(k));

        let absent = key("nosuch");
        let proof = tree.prove(&absent);
        assert!(verify_proof(&root, &absent, &proof));
        assert!(proof.leaf.as_ref().map(|(lk, _)| *lk) != Some(absent));

        // a tampered proof fails
        let mut bad = tree.prove(&k);
        if let Some((_, v)) = bad.leaf.as_mut() {
            v.push(0xff);
        }
        assert!(!verify_proof(&root, &k, &bad));
    }
}
