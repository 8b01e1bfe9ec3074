//! This module contains the auxiliary evidence documents that accompany a
//! pair of snapshots.
//!
//! All of these inputs are optional. A missing document simply zero-weights
//! the corresponding detection source; it is never an error (see
//! [`crate::error`]). Entries that cannot be attributed to a contract are
//! retained but unused, matching the give-up-gracefully policy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::utility::normalize_address;

/// One entry of the name-evidence document: a human- or indexer-supplied
/// label for a contract address.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct NameEvidence {
    /// The address the name applies to.
    pub address: String,

    /// The primary label for the contract.
    pub name: String,

    /// The chain the label was observed on.
    #[serde(default)]
    pub chain: Option<String>,

    /// Where the label came from (explorer, registry, manual tag).
    #[serde(default)]
    pub source: Option<String>,

    /// Free-text context around the label.
    #[serde(default)]
    pub context: Option<String>,

    /// The token symbol, when the contract is a token.
    #[serde(default)]
    pub symbol: Option<String>,

    /// The token decimal count, when the contract is a token.
    #[serde(default)]
    pub decimals: Option<u8>,

    /// Whether the source believes this contract is an ERC-20 token.
    #[serde(default)]
    pub is_erc20: Option<bool>,

    /// A semantic-type hint supplied by the source.
    #[serde(default)]
    pub semantic_type: Option<String>,

    /// Alternative labels for the same contract.
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// The exposed interface of a single contract, as recovered by an external
/// ABI source.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ContractInterface {
    /// The address the interface belongs to.
    pub address: String,

    /// The exposed function names (or selectors rendered as names).
    #[serde(default)]
    pub functions: Vec<String>,

    /// The event names the contract declares or was observed emitting.
    #[serde(default)]
    pub events: Vec<String>,
}

/// All auxiliary evidence for one analysis run, indexed by canonical
/// lowercase contract address.
///
/// Addresses are normalised on insertion so lookups from the pipeline can
/// use snapshot addresses directly.
#[derive(Clone, Debug, Default)]
pub struct EvidenceBundle {
    names: BTreeMap<String, NameEvidence>,
    interfaces: BTreeMap<String, ContractInterface>,
}

impl EvidenceBundle {
    /// Creates an empty bundle, for runs with no auxiliary evidence at all.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a name-evidence entry, keeping the first entry seen for any
    /// address.
    ///
    /// Entries with unnormalisable addresses are dropped silently; a bad
    /// label is a data-quality gap, not an error.
    pub fn add_name(&mut self, entry: NameEvidence) {
        if let Some(address) = normalize_address(&entry.address) {
            self.names.entry(address).or_insert(entry);
        }
    }

    /// Adds an interface entry, keeping the first entry seen for any
    /// address.
    pub fn add_interface(&mut self, entry: ContractInterface) {
        if let Some(address) = normalize_address(&entry.address) {
            self.interfaces.entry(address).or_insert(entry);
        }
    }

    /// Bulk-loads a name-evidence document.
    pub fn with_names(mut self, entries: impl IntoIterator<Item = NameEvidence>) -> Self {
        for entry in entries {
            self.add_name(entry);
        }
        self
    }

    /// Bulk-loads contract interface documents.
    pub fn with_interfaces(
        mut self,
        entries: impl IntoIterator<Item = ContractInterface>,
    ) -> Self {
        for entry in entries {
            self.add_interface(entry);
        }
        self
    }

    /// Gets the name evidence for `address`, if any was supplied.
    #[must_use]
    pub fn name(&self, address: &str) -> Option<&NameEvidence> {
        self.names.get(&normalize_address(address)?)
    }

    /// Gets the recovered interface for `address`, if any was supplied.
    #[must_use]
    pub fn interface(&self, address: &str) -> Option<&ContractInterface> {
        self.interfaces.get(&normalize_address(address)?)
    }
}

#[cfg(test)]
mod test {
    use super::{ContractInterface, EvidenceBundle, NameEvidence};

    #[test]
    fn normalises_addresses_on_insertion() {
        let bundle = EvidenceBundle::new().with_names([NameEvidence {
            address: "0xDAC17F958D2ee523a2206206994597C13D831ec7".into(),
            name:    "Tether USD".into(),
            ..NameEvidence::default()
        }]);

        let found = bundle
            .name("0xdac17f958d2ee523a2206206994597c13d831ec7")
            .unwrap();
        assert_eq!(found.name, "Tether USD");
    }

    #[test]
    fn drops_entries_with_bad_addresses() {
        let bundle = EvidenceBundle::new().with_interfaces([ContractInterface {
            address: "not-an-address".into(),
            functions: vec!["deposit".into()],
            events: vec![],
        }]);

        assert!(bundle.interface("not-an-address").is_none());
    }
}
