//! This module contains common utilities for simplifying the writing of
//! integration tests for this library.

#![cfg(test)]

use serde_json::json;
use storage_invariant_extractor::snapshot::StateSnapshot;

/// One account's state as the tests declare it: address, storage slots as
/// (decimal slot index, value) pairs, balance in wei and nonce.
pub type Account<'a> = (&'a str, &'a [(u64, u128)], u128, u64);

/// Renders a value as the `0x`-prefixed 64-character word the snapshot
/// document format uses.
#[allow(unused)] // It is actually
pub fn word(value: u128) -> String {
    format!("0x{value:064x}")
}

/// Builds a snapshot document from the account descriptions and parses it
/// through the real ingestion path, so tests exercise validation and
/// normalisation too.
#[allow(unused)] // It is actually
pub fn snapshot(accounts: &[Account]) -> anyhow::Result<StateSnapshot> {
    let mut addresses = serde_json::Map::new();
    for (address, slots, balance, nonce) in accounts {
        let storage: serde_json::Map<String, serde_json::Value> = slots
            .iter()
            .map(|(slot, value)| (slot.to_string(), json!(word(*value))))
            .collect();
        addresses.insert(
            (*address).to_owned(),
            json!({
                "storage": storage,
                "balance_wei": balance.to_string(),
                "nonce": nonce,
            }),
        );
    }

    let document = json!({
        "metadata": {"chain": "ethereum", "block_number": 19_000_000},
        "addresses": addresses,
    });

    Ok(StateSnapshot::from_json(&document.to_string())?)
}
