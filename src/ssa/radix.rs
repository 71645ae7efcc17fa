//! Radix hash tables for constant-set membership and lookup.
//!
//! A [`RadixTree64`] indexes fixed-size payloads by a 64-bit key, consuming four key bits
//! per level starting from the least significant nibble. Interior nodes are 16-slot
//! arrays stored contiguously in one `Vec<i32>`, leaves are stored contiguously in one
//! byte buffer, so the whole structure is two flat allocations that an executor can
//! consume directly.
//!
//! Insertion order fully determines the layout: building the same keys in the same order
//! always yields byte-identical buffers.
//!
//! [`HashTable`] wraps a tree with the key derivation used by the compiler: every
//! constant is encoded with the active [`Encoding`] and keyed by the low 64 bits of its
//! `xxh3_128` hash.

use xxhash_rust::xxh3::xxh3_128;

use crate::{encoding::Encoding, ssa::Datum};

const FANOUT: usize = 16;
const KEY_BYTES: usize = 8;

/// Hashes an encoded constant to its 64-bit radix key.
#[must_use]
pub fn radix_key(encoded: &[u8]) -> u64 {
    xxh3_128(encoded) as u64
}

/// A 16-way radix tree over 64-bit keys with fixed-size payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadixTree64 {
    value_size: usize,
    /// Interior slots: 0 is empty, positive is a child node number, negative is `!leaf`.
    index: Vec<i32>,
    /// Leaves: 8 key bytes (little endian) followed by `value_size` payload bytes.
    leaves: Vec<u8>,
}

impl RadixTree64 {
    /// Creates an empty tree whose leaves carry `value_size` payload bytes.
    #[must_use]
    pub fn new(value_size: usize) -> Self {
        Self {
            value_size,
            index: vec![0; FANOUT],
            leaves: Vec::new(),
        }
    }

    /// Payload size of each leaf.
    #[must_use]
    pub const fn value_size(&self) -> usize {
        self.value_size
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.len() / self.stride()
    }

    /// Returns true if no key has been inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// The interior node array, 16 slots per node.
    #[must_use]
    pub fn index(&self) -> &[i32] {
        &self.index
    }

    /// The leaf buffer.
    #[must_use]
    pub fn leaves(&self) -> &[u8] {
        &self.leaves
    }

    fn stride(&self) -> usize {
        KEY_BYTES + self.value_size
    }

    fn leaf_key(&self, leaf: usize) -> u64 {
        let start = leaf * self.stride();
        let mut key = [0u8; KEY_BYTES];
        key.copy_from_slice(&self.leaves[start..start + KEY_BYTES]);
        u64::from_le_bytes(key)
    }

    fn payload(&self, leaf: usize) -> &[u8] {
        let start = leaf * self.stride() + KEY_BYTES;
        &self.leaves[start..start + self.value_size]
    }

    fn push_leaf(&mut self, key: u64, value: &[u8]) -> usize {
        let leaf = self.len();
        self.leaves.extend_from_slice(&key.to_le_bytes());
        let mut payload = value.to_vec();
        payload.resize(self.value_size, 0);
        self.leaves.extend_from_slice(&payload);
        leaf
    }

    fn push_node(&mut self) -> usize {
        let node = self.index.len() / FANOUT;
        self.index.extend_from_slice(&[0; FANOUT]);
        node
    }

    /// Inserts `key` with `value` (zero-padded or truncated to the payload size).
    ///
    /// Returns false, leaving the stored payload untouched, if the key was already present.
    pub fn insert(&mut self, key: u64, value: &[u8]) -> bool {
        let mut node = 0usize;
        let mut shift = 0u32;
        loop {
            let slot = node * FANOUT + ((key >> shift) & 0xf) as usize;
            let entry = self.index[slot];
            if entry == 0 {
                let leaf = self.push_leaf(key, value);
                self.index[slot] = !(leaf as i32);
                return true;
            }
            if entry > 0 {
                node = entry as usize;
                shift += 4;
                continue;
            }

            let leaf = !entry as usize;
            let other = self.leaf_key(leaf);
            if other == key {
                return false;
            }
            // Push the resident leaf one level down and retry there.
            let child = self.push_node();
            self.index[slot] = child as i32;
            shift += 4;
            let moved = child * FANOUT + ((other >> shift) & 0xf) as usize;
            self.index[moved] = !(leaf as i32);
            node = child;
        }
    }

    /// Returns the payload stored for `key`.
    #[must_use]
    pub fn get(&self, key: u64) -> Option<&[u8]> {
        let mut node = 0usize;
        let mut shift = 0u32;
        loop {
            let entry = *self.index.get(node * FANOUT + ((key >> shift) & 0xf) as usize)?;
            if entry == 0 {
                return None;
            }
            if entry > 0 {
                node = entry as usize;
                shift += 4;
                if shift >= 64 {
                    return None;
                }
                continue;
            }
            let leaf = !entry as usize;
            return (self.leaf_key(leaf) == key).then(|| self.payload(leaf));
        }
    }
}

/// The immediate of a `hashmember` or `hashlookup` node.
///
/// Membership tables have empty payloads. Lookup tables store, per key, a
/// `(base: u32, len: u32)` little-endian reference into [`HashTable::literals`], which
/// holds the encoded result constants back to back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashTable {
    tree: RadixTree64,
    literals: Vec<u8>,
}

impl HashTable {
    /// Builds a membership table over `values`.
    #[must_use]
    pub fn membership(encoding: &dyn Encoding, values: &[Datum]) -> Self {
        let mut tree = RadixTree64::new(0);
        let mut buf = Vec::new();
        for value in values {
            buf.clear();
            encoding.encode(value, &mut buf);
            tree.insert(radix_key(&buf), &[]);
        }
        Self {
            tree,
            literals: Vec::new(),
        }
    }

    /// Builds a lookup table mapping each of `pairs`' keys to its result.
    ///
    /// When a key appears more than once the first result wins.
    #[must_use]
    pub fn lookup(encoding: &dyn Encoding, pairs: &[(Datum, Datum)]) -> Self {
        let mut tree = RadixTree64::new(8);
        let mut literals = Vec::new();
        let mut buf = Vec::new();
        for (key, result) in pairs {
            buf.clear();
            encoding.encode(key, &mut buf);
            let hash = radix_key(&buf);
            if tree.get(hash).is_some() {
                continue;
            }
            let base = literals.len();
            encoding.encode(result, &mut literals);
            let len = literals.len() - base;
            let mut payload = [0u8; 8];
            payload[..4].copy_from_slice(&(base as u32).to_le_bytes());
            payload[4..].copy_from_slice(&(len as u32).to_le_bytes());
            tree.insert(hash, &payload);
        }
        Self { tree, literals }
    }

    /// The underlying radix tree.
    #[must_use]
    pub fn tree(&self) -> &RadixTree64 {
        &self.tree
    }

    /// Encoded result constants of a lookup table.
    #[must_use]
    pub fn literals(&self) -> &[u8] {
        &self.literals
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns true if the table has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns true if the encoded value `encoded` is a key of the table.
    #[must_use]
    pub fn contains(&self, encoded: &[u8]) -> bool {
        self.tree.get(radix_key(encoded)).is_some()
    }

    /// Returns the encoded result stored for the encoded key `encoded`.
    #[must_use]
    pub fn fetch(&self, encoded: &[u8]) -> Option<&[u8]> {
        let payload = self.tree.get(radix_key(encoded))?;
        if payload.len() != 8 {
            return None;
        }
        let base = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
        let len = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]) as usize;
        self.literals.get(base..base + len)
    }
}
