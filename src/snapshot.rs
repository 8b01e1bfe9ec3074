//! This module contains the representation of captured chain-state
//! snapshots and the ingestion of their on-disk JSON form.
//!
//! A snapshot captures the observable state of a set of contracts at a
//! single point in time: every storage slot of interest, the native balance
//! and the account nonce. Two snapshots — taken immediately before and after
//! an exploit transaction — are the mandatory inputs to an analysis run.
//! Once constructed a snapshot is never mutated; the pipeline that loaded it
//! owns it exclusively.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::snapshot::{Error, Result},
    utility::{normalize_address, U256W},
};

/// The state of a single contract account within one snapshot.
///
/// # Invariants
///
/// The `address` is always lowercase `0x`-prefixed hex; normalisation
/// happens at ingestion and is never the caller's concern. A slot that is
/// absent from `storage` holds the zero word, exactly as it would on chain.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ContractState {
    /// The canonical lowercase address of the contract.
    pub address: String,

    /// The captured storage slots, keyed by slot index.
    pub storage: BTreeMap<U256W, U256W>,

    /// The native token balance of the account, in wei.
    pub balance_wei: U256W,

    /// The account nonce.
    pub nonce: u64,
}

impl ContractState {
    /// Reads the value of `slot`, yielding the zero word for any slot that
    /// was not captured.
    #[must_use]
    pub fn slot_value(&self, slot: &U256W) -> U256W {
        self.storage.get(slot).copied().unwrap_or(U256W::ZERO)
    }
}

/// Free-form capture metadata carried alongside a snapshot.
///
/// Only the fields the engine itself reads are typed; everything else the
/// collector wrote is retained verbatim in `extra` so the output report can
/// round-trip it.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct SnapshotMetadata {
    /// The chain the snapshot was captured on.
    #[serde(default)]
    pub chain: Option<String>,

    /// The block number the snapshot was captured at.
    #[serde(default)]
    pub block_number: Option<u64>,

    /// The wall-clock capture timestamp, as the collector recorded it.
    #[serde(default)]
    pub collected_at: Option<String>,

    /// Any additional collector-specific fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One complete before- or after-state snapshot across all captured
/// contracts.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct StateSnapshot {
    /// The capture metadata.
    pub metadata: SnapshotMetadata,

    /// The captured contracts, keyed by canonical lowercase address.
    pub contracts: BTreeMap<String, ContractState>,
}

impl StateSnapshot {
    /// Parses and structurally validates a snapshot document.
    ///
    /// # Errors
    ///
    /// Returns [`enum@Error`] when the document is not valid JSON, is missing
    /// one of its required top-level keys, or contains an address, slot key,
    /// slot value or balance that cannot be normalised. These are the only
    /// hard failures in the engine; see [`crate::error`].
    pub fn from_json(document: &str) -> Result<Self> {
        let raw: RawDocument =
            serde_json::from_str(document).map_err(|source| Error::InvalidJson {
                reason: source.to_string(),
            })?;

        let metadata = raw.metadata.ok_or(Error::MissingKey { key: "metadata" })?;
        let addresses = raw.addresses.ok_or(Error::MissingKey { key: "addresses" })?;

        let mut contracts = BTreeMap::new();
        for (address, account) in addresses {
            let canonical =
                normalize_address(&address).ok_or_else(|| Error::InvalidAddress {
                    address: address.clone(),
                })?;

            let mut storage = BTreeMap::new();
            for (key, value) in account.storage {
                let slot = U256W::parse(&key).ok_or_else(|| Error::InvalidSlotKey {
                    address: canonical.clone(),
                    key: key.clone(),
                })?;
                let word = parse_slot_value(&value).ok_or_else(|| Error::InvalidSlotValue {
                    address: canonical.clone(),
                    key: key.clone(),
                    value: value.clone(),
                })?;
                storage.insert(slot, word);
            }

            let balance_wei =
                U256W::parse(&account.balance_wei).ok_or_else(|| Error::InvalidBalance {
                    address: canonical.clone(),
                    value: account.balance_wei.clone(),
                })?;

            contracts.insert(
                canonical.clone(),
                ContractState {
                    address: canonical,
                    storage,
                    balance_wei,
                    nonce: account.nonce,
                },
            );
        }

        Ok(Self {
            metadata,
            contracts,
        })
    }

    /// Gets the state of the contract at `address`, if it was captured.
    ///
    /// The lookup address is normalised first so callers need not care about
    /// casing.
    #[must_use]
    pub fn contract(&self, address: &str) -> Option<&ContractState> {
        let canonical = normalize_address(address)?;
        self.contracts.get(&canonical)
    }
}

/// Parses a `0x` + 64-hex-character storage value as the document format
/// requires.
fn parse_slot_value(value: &str) -> Option<U256W> {
    let digits = value.strip_prefix("0x")?;
    if digits.len() != 64 {
        return None;
    }
    U256W::parse(value)
}

/// The raw serde shape of the snapshot document, prior to validation.
#[derive(Clone, Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    metadata: Option<SnapshotMetadata>,

    #[serde(default)]
    addresses: Option<BTreeMap<String, RawAccount>>,
}

#[derive(Clone, Debug, Deserialize)]
struct RawAccount {
    #[serde(default)]
    storage: BTreeMap<String, String>,

    #[serde(default = "zero_balance")]
    balance_wei: String,

    #[serde(default)]
    nonce: u64,
}

fn zero_balance() -> String {
    "0".into()
}
