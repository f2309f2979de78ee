//! nameview.rs — copy-on-write staging layer over the persisted name store
//!
//! The block connector stages every name mutation here and commits the view
//! atomically once the whole block validates. Undo records are produced from
//! the prior values captured at first write, never by aliasing live state.

use std::collections::BTreeMap;

use crate::consensus::NetworkParams;
use crate::errors::DecodeError;
use crate::namestate::{NameHash, NameState};
use crate::types::{write_var_bytes, write_varint, ByteReader};

/// Per-block inverse deltas: for each touched name, the state to restore on
/// disconnect (`None` means the name did not exist).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NameUndo {
    pub entries: Vec<(NameHash, Option<NameState>)>,
}

impl NameUndo {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, self.entries.len() as u64);
        for (nh, prior) in &self.entries {
            out.extend_from_slice(nh);
            match prior {
                None => out.push(0),
                Some(ns) => {
                    out.push(1);
                    write_var_bytes(&mut out, &ns.encode());
                }
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = ByteReader::new(bytes);
        let count = r.read_varint()? as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let nh = r.read_hash()?;
            let prior = match r.read_u8()? {
                0 => None,
                1 => {
                    let raw = r.read_var_bytes()?;
                    Some(NameState::decode(&raw)?)
                }
                _ => return Err(DecodeError::Invalid("bad undo tag")),
            };
            entries.push((nh, prior));
        }
        r.finish()?;
        Ok(Self { entries })
    }
}

/// Staged view of the name set during one block's application.
#[derive(Debug, Default)]
pub struct NameView {
    /// Staged writes; `None` stages a deletion.
    staged: BTreeMap<NameHash, Option<NameState>>,
    /// Committed value at first write, in touch order, for the undo record.
    prior: Vec<(NameHash, Option<NameState>)>,
}

impl NameView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read through the view: staged value if present, else the committed
    /// store. Expired states read as absent (the maybe-expire probe) and the
    /// expiry is staged so it persists with the block.
    pub fn read(
        &mut self,
        store: &BTreeMap<NameHash, NameState>,
        nh: &NameHash,
        height: u32,
        net: &NetworkParams,
    ) -> Option<NameState> {
        if let Some(staged) = self.staged.get(nh) {
            return staged.clone();
        }
        match store.get(nh) {
            None => None,
            Some(ns) if ns.is_expired(height, net) => {
                self.write(store, *nh, None);
                None
            }
            Some(ns) => Some(ns.clone()),
        }
    }

    /// Peek without staging expiry; used by read-only snapshots.
    pub fn peek<'a>(
        &'a self,
        store: &'a BTreeMap<NameHash, NameState>,
        nh: &NameHash,
    ) -> Option<&'a NameState> {
        if let Some(staged) = self.staged.get(nh) {
            return staged.as_ref();
        }
        store.get(nh)
    }

    /// Stage a write, capturing the committed prior value on first touch.
    pub fn write(
        &mut self,
        store: &BTreeMap<NameHash, NameState>,
        nh: NameHash,
        ns: Option<NameState>,
    ) {
        if !self.staged.contains_key(&nh) {
            self.prior.push((nh, store.get(&nh).cloned()));
        }
        self.staged.insert(nh, ns);
    }

    pub fn is_touched(&self, nh: &NameHash) -> bool {
        self.staged.contains_key(nh)
    }

    /// Inverse delta for this block, in touch order.
    pub fn undo(&self) -> NameUndo {
        NameUndo { entries: self.prior.clone() }
    }

    /// Staged writes to commit.
    pub fn drain(self) -> BTreeMap<NameHash, Option<NameState>> {
        self.staged
    }

    pub fn staged_iter(&self) -> impl Iterator<Item = (&NameHash, &Option<NameState>)> {
        self.staged.iter()
    }
}

#[cfg(test)]
mod nameview_tests {
    use super::*;
    use crate::namebase::name_hash;

    fn store_with(ns: NameState) -> BTreeMap<NameHash, NameState> {
        let mut m = BTreeMap::new();
        m.insert(ns.name_hash, ns);
        m
    }

    #[test]
    fn reads_fall_through_to_store_and_stage_on_write() {
        let net = NetworkParams::regtest();
        let ns = NameState::open(name_hash(b"abcd"), b"abcd".to_vec(), 5);
        let store = store_with(ns.clone());
        let mut view = NameView::new();

        assert_eq!(view.read(&store, &ns.name_hash, 6, &net), Some(ns.clone()));

        let mut edited = ns.clone();
        edited.highest = 42;
        view.write(&store, ns.name_hash, Some(edited.clone()));
        assert_eq!(view.read(&store, &ns.name_hash, 6, &net), Some(edited));

        let undo = view.undo();
        assert_eq!(undo.entries, vec![(ns.name_hash, Some(ns))]);
    }

    #[test]
    fn expired_names_read_as_absent_and_stage_the_expiry() {
        let net = NetworkParams::regtest();
        let ns = NameState::open(name_hash(b"abcd"), b"abcd".to_vec(), 5);
        let expiry = ns.renewal + net.renewal_window + 1;
        let store = store_with(ns.clone());
        let mut view = NameView::new();

        assert_eq!(view.read(&store, &ns.name_hash, expiry, &net), None);
        assert!(view.is_touched(&ns.name_hash));
        // the undo restores the pre-expiry state
        assert_eq!(view.undo().entries, vec![(ns.name_hash, Some(ns))]);
    }

    #[test]
    fn prior_captured_only_on_first_write() {
        let net = NetworkParams::regtest();
        let ns = NameState::open(name_hash(b"abcd"), b"abcd".to_vec(), 5);
        let store = store_with(ns.clone());
        let mut view = NameView::new();

        view.write(&store, ns.name_hash, None);
        view.write(&store, ns.name_hash, Some(ns.clone()));
        assert_eq!(view.undo().entries.len(), 1);
        let _ = net;
    }

    #[test]
    fn undo_round_trip() {
        let ns = NameState::open(name_hash(b"abcd"), b"abcd".to_vec(), 5);
        let undo = NameUndo {
            entries: vec![(ns.name_hash, Some(ns.clone())), (name_hash(b"gone"), None)],
        };
        assert_eq!(NameUndo::decode(&undo.encode()).unwrap(), undo);
    }
}
