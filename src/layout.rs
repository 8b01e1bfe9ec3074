//! This module contains the storage layout calculator, which reconstructs
//! the slot and intra-slot offset assignment that the Solidity compiler
//! gives a contract's declared variables, and derives the keccak-based
//! slots used by `mapping` storage.
//!
//! # Allocation Rules
//!
//! Allocation is sequential and packed, following the compiler:
//!
//! - A value variable packs into the current slot while it fits; a variable
//!   is never split across a slot boundary, so one that would overflow the
//!   current slot starts a fresh slot at offset zero.
//! - Dynamic types (mappings, dynamic arrays, `string`, `bytes`) always
//!   consume a fresh base slot regardless of remaining space. Their elements
//!   are never stored at that slot; element slots are derived from it.
//! - Value data of 32 bytes or more consumes whole consecutive slots, and
//!   nothing packs against it inside those slots.

use serde::{Deserialize, Serialize};

use crate::{
    constant::WORD_SIZE_BYTES,
    utility::{keccak256_word, U256Wrapper, U256W},
};

/// The storage kind of a declared variable, as far as allocation is
/// concerned.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    /// An inline value type of a known byte width.
    Value,
    /// A `mapping`; occupies a base slot only.
    Mapping,
    /// A dynamically-sized array; occupies a base slot only.
    DynamicArray,
    /// A `string` or `bytes` value; occupies a base slot only.
    Bytes,
}

impl VariableKind {
    /// Checks whether this kind always claims a fresh base slot.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        !matches!(self, Self::Value)
    }
}

/// One variable declaration, in source declaration order.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct DeclaredVariable {
    /// The source name of the variable.
    pub name: String,

    /// The inline byte width of the variable. Dynamic kinds always occupy
    /// one full base slot regardless of this field.
    pub size: usize,

    /// The allocation kind.
    pub kind: VariableKind,
}

impl DeclaredVariable {
    /// Declares a value variable of `size` bytes.
    pub fn value(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            kind: VariableKind::Value,
        }
    }

    /// Declares a mapping.
    pub fn mapping(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: WORD_SIZE_BYTES,
            kind: VariableKind::Mapping,
        }
    }

    /// Declares a dynamically-sized array.
    pub fn dynamic_array(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: WORD_SIZE_BYTES,
            kind: VariableKind::DynamicArray,
        }
    }

    /// Declares a `string` or `bytes` variable.
    pub fn bytes(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: WORD_SIZE_BYTES,
            kind: VariableKind::Bytes,
        }
    }
}

/// The placement of one declared variable within contract storage.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct LayoutEntry {
    /// The source name of the variable.
    pub name: String,

    /// The slot index the variable starts at. For dynamic kinds this is the
    /// base slot their element slots are derived from.
    pub slot: U256W,

    /// The byte offset within the slot, counted from the low-order end.
    pub offset: usize,

    /// The byte width the variable occupies inline.
    pub size: usize,
}

/// The computed storage layout of one contract.
///
/// Entries are kept sorted by slot index with ties broken by the offset
/// within the slot, so iteration order is deterministic.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StorageLayout {
    entries: Vec<LayoutEntry>,
}

impl StorageLayout {
    /// Computes the layout for `variables`, which must be supplied in
    /// source declaration order.
    #[must_use]
    pub fn compute(variables: &[DeclaredVariable]) -> Self {
        let mut entries = Vec::with_capacity(variables.len());
        let mut slot = ethnum::U256::ZERO;
        let mut offset = 0usize;

        for variable in variables {
            if variable.kind.is_dynamic() {
                // Dynamic types never share a base slot with anything.
                if offset != 0 {
                    slot += ethnum::U256::ONE;
                    offset = 0;
                }
                entries.push(LayoutEntry {
                    name: variable.name.clone(),
                    slot: U256Wrapper(slot),
                    offset: 0,
                    size: WORD_SIZE_BYTES,
                });
                slot += ethnum::U256::ONE;
                continue;
            }

            if variable.size >= WORD_SIZE_BYTES {
                // Whole-slot data: no packing on either side within the
                // claimed slots.
                if offset != 0 {
                    slot += ethnum::U256::ONE;
                    offset = 0;
                }
                let claimed = variable.size.div_ceil(WORD_SIZE_BYTES);
                entries.push(LayoutEntry {
                    name: variable.name.clone(),
                    slot: U256Wrapper(slot),
                    offset: 0,
                    size: variable.size,
                });
                slot += ethnum::U256::from(claimed as u128);
                continue;
            }

            if offset + variable.size > WORD_SIZE_BYTES {
                slot += ethnum::U256::ONE;
                offset = 0;
            }
            entries.push(LayoutEntry {
                name: variable.name.clone(),
                slot: U256Wrapper(slot),
                offset,
                size: variable.size,
            });
            offset += variable.size;
            if offset == WORD_SIZE_BYTES {
                slot += ethnum::U256::ONE;
                offset = 0;
            }
        }

        entries.sort_by(|a, b| (a.slot, a.offset).cmp(&(b.slot, b.offset)));
        Self { entries }
    }

    /// Gets the layout entries, sorted by slot and then offset.
    #[must_use]
    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    /// Finds the entry for the variable called `name`.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&LayoutEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Checks if the layout places `name` at exactly (`slot`, `offset`,
    /// `size`).
    #[must_use]
    pub fn has_entry(
        &self,
        name: &str,
        slot: impl Into<U256W>,
        offset: usize,
        size: usize,
    ) -> bool {
        let slot = slot.into();
        self.entries
            .iter()
            .any(|e| e.name == name && e.slot == slot && e.offset == offset && e.size == size)
    }

    /// Gets the number of entries in the layout.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the layout is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Derives the storage slot for `mapping_base[key]`, i.e.
/// `keccak256(pad32(key) ++ pad32(base))`.
#[must_use]
pub fn mapping_slot(key: &U256W, base: &U256W) -> U256W {
    let mut preimage = [0u8; WORD_SIZE_BYTES * 2];
    preimage[..WORD_SIZE_BYTES].copy_from_slice(&key.0.to_be_bytes());
    preimage[WORD_SIZE_BYTES..].copy_from_slice(&base.0.to_be_bytes());
    keccak256_word(&preimage)
}

/// Derives the storage slot reached by indexing a (possibly nested) mapping
/// with `keys` applied outermost-first.
///
/// Each nesting level applies the single-level rule once, feeding the
/// derived slot back in as the next level's base. An empty key list yields
/// the base slot itself.
#[must_use]
pub fn nested_mapping_slot(keys: &[U256W], base: &U256W) -> U256W {
    keys.iter().fold(*base, |acc, key| mapping_slot(key, &acc))
}
