//! A library for generating machine-checkable protocol invariants from
//! before/after storage snapshots of EVM contracts involved in an exploit
//! transaction.
//!
//! The analysis is a pure function of its inputs and proceeds in stages:
//!
//! 1. The snapshot pair is parsed and validated ([`snapshot`]), alongside
//!    any auxiliary naming and interface evidence ([`evidence`]) and
//!    declared variable lists resolved to concrete slots ([`layout`]).
//! 2. Every slot touched by the transaction is assigned a semantic role
//!    with a confidence ([`semantics`]).
//! 3. The contracts are classified into a protocol category by fusing
//!    function, event, semantic and naming evidence ([`protocol`]).
//! 4. The snapshots are diffed slot by slot, changes are classified by
//!    direction and magnitude, and cross-contract relations are inferred
//!    ([`diff`]).
//! 5. Attack signatures are matched against the diff ([`patterns`]).
//! 6. Protocol-driven templates and pattern-driven defensive properties
//!    are instantiated into concrete invariants ([`invariant`]) and
//!    assembled into the output document ([`report`]).
//!
//! Every stage is deterministic. Identical inputs produce byte-identical
//! reports, so generated invariants can be diffed across runs.

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod constant;
pub mod diff;
pub mod error;
pub mod evidence;
pub mod invariant;
pub mod layout;
pub mod patterns;
pub mod protocol;
pub mod report;
pub mod semantics;
pub mod snapshot;
pub mod utility;

use std::collections::BTreeMap;

use crate::{
    constant::{
        DEFAULT_MATERIALITY_FLOOR, DEFAULT_MIN_PROTOCOL_CONFIDENCE,
        DEFAULT_MIN_ROLE_CONFIDENCE, DEFAULT_NONCE_DELTA_THRESHOLD,
        DEFAULT_TRANSFER_TOLERANCE,
    },
    evidence::EvidenceBundle,
    layout::{DeclaredVariable, StorageLayout},
    protocol::DetectionEvidence,
    report::Report,
    semantics::{classify_slot, SemanticMap, SemanticType, SlotRef},
    snapshot::StateSnapshot,
    utility::{normalize_address, U256W},
};

/// The tunable thresholds of the analysis.
///
/// The defaults are usable as-is; they are collected in [`constant`] so the
/// numbers live in one place.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// The relative mismatch tolerated when matching an outflow to an
    /// inflow as a balance transfer.
    pub transfer_tolerance: f64,

    /// The absolute value (in the token's smallest unit) below which a
    /// change out of or into zero is treated as dust.
    pub materiality_floor: u128,

    /// The nonce movement within one transaction beyond which recursive
    /// calling is suspected.
    pub nonce_delta_threshold: u64,

    /// The minimum semantic confidence at which a slot may fill a template
    /// role.
    pub min_role_confidence: f64,

    /// The minimum protocol-detection confidence at which protocol-driven
    /// templates are instantiated.
    pub min_protocol_confidence: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transfer_tolerance: DEFAULT_TRANSFER_TOLERANCE,
            materiality_floor: DEFAULT_MATERIALITY_FLOOR,
            nonce_delta_threshold: DEFAULT_NONCE_DELTA_THRESHOLD,
            min_role_confidence: DEFAULT_MIN_ROLE_CONFIDENCE,
            min_protocol_confidence: DEFAULT_MIN_PROTOCOL_CONFIDENCE,
        }
    }
}

/// Everything one analysis run consumes.
///
/// Only the snapshot pair is mandatory. Evidence and declared layouts are
/// optional enrichments; their absence degrades confidence, never
/// correctness.
#[derive(Clone, Debug, Default)]
pub struct AnalysisInput {
    /// The caller-supplied project name, echoed into the report.
    pub project: String,

    /// The pre-transaction snapshot.
    pub before: StateSnapshot,

    /// The post-transaction snapshot.
    pub after: StateSnapshot,

    /// Auxiliary naming and interface evidence.
    pub evidence: EvidenceBundle,

    /// Declared variable lists per contract address, resolved to slots via
    /// [`StorageLayout::compute`].
    pub layouts: BTreeMap<String, Vec<DeclaredVariable>>,
}

impl AnalysisInput {
    /// Builds an input from the raw on-disk snapshot documents, with no
    /// auxiliary evidence. Evidence and layouts can be attached to the
    /// returned value afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`enum@error::Error`] when either document is structurally
    /// malformed; see [`crate::error`] for the policy on what qualifies.
    pub fn from_documents(
        project: impl Into<String>,
        before: &str,
        after: &str,
    ) -> error::Result<Self> {
        Ok(Self {
            project: project.into(),
            before: StateSnapshot::from_json(before)?,
            after: StateSnapshot::from_json(after)?,
            ..Self::default()
        })
    }
}

/// The analysis driver, running the full pipeline over one input set.
#[derive(Clone, Debug, Default)]
pub struct Engine {
    config: Config,
}

impl Engine {
    /// Creates an engine with the provided configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the full pipeline and assembles the output document.
    #[must_use]
    pub fn analyze(&self, input: &AnalysisInput) -> Report {
        let semantics = self.map_semantics(input);
        let protocol = self.detect_protocol(input, &semantics);
        let diff_report = diff::compute(&input.before, &input.after, &semantics, &self.config);
        let patterns = patterns::detect(&diff_report, &self.config);
        let invariants = invariant::generate(&protocol, &semantics, &patterns, &self.config);
        let coverage = Self::coverage(&diff_report, &semantics);

        Report::assemble(
            input.project.clone(),
            &protocol,
            coverage,
            &diff_report,
            &patterns,
            invariants,
        )
    }

    /// Classifies every slot either snapshot touches, for every contract in
    /// either snapshot.
    fn map_semantics(&self, input: &AnalysisInput) -> SemanticMap {
        // Layout keys arrive in whatever casing the caller used, while
        // snapshot addresses were normalized at ingestion.
        let layouts: BTreeMap<String, StorageLayout> = input
            .layouts
            .iter()
            .filter_map(|(address, variables)| {
                normalize_address(address)
                    .map(|address| (address, StorageLayout::compute(variables)))
            })
            .collect();

        let mut semantics = SemanticMap::new();
        let addresses = input
            .before
            .contracts
            .keys()
            .chain(input.after.contracts.keys());

        for address in addresses {
            let before = input.before.contract(address);
            let after = input.after.contract(address);
            let slots = before
                .iter()
                .flat_map(|c| c.storage.keys())
                .chain(after.iter().flat_map(|c| c.storage.keys()));

            for slot in slots {
                let reference = SlotRef::new(address.clone(), *slot);
                if semantics.contains_key(&reference) {
                    continue;
                }

                let name = layouts.get(address).and_then(|layout| {
                    layout
                        .entries()
                        .iter()
                        .find(|entry| entry.slot == *slot)
                        .map(|entry| entry.name.as_str())
                });

                // Classify on the post-state value, falling back to the
                // pre-state when the slot was cleared.
                let after_value = after.map_or(U256W::ZERO, |c| c.slot_value(slot));
                let value = if after_value.is_zero() {
                    before.map_or(U256W::ZERO, |c| c.slot_value(slot))
                } else {
                    after_value
                };

                semantics.insert(reference, classify_slot(slot, name, &value));
            }
        }

        semantics
    }

    /// Fuses evidence across all contracts into one protocol
    /// classification.
    fn detect_protocol(
        &self,
        input: &AnalysisInput,
        semantics: &SemanticMap,
    ) -> protocol::ProtocolDetectionResult {
        let mut functions = Vec::new();
        let mut events = Vec::new();
        let mut name_holders: Vec<String> = Vec::new();
        let mut erc20_hint = false;

        let addresses = input
            .before
            .contracts
            .keys()
            .chain(input.after.contracts.keys());
        let mut seen = Vec::new();
        for address in addresses {
            if seen.contains(address) {
                continue;
            }
            seen.push(address.clone());

            if let Some(interface) = input.evidence.interface(address) {
                functions.extend(interface.functions.iter().cloned());
                events.extend(interface.events.iter().cloned());
            }
            if let Some(name) = input.evidence.name(address) {
                name_holders.push(name.name.clone());
                name_holders.extend(name.symbol.iter().cloned());
                name_holders.extend(name.aliases.iter().cloned());
                erc20_hint |= name.is_erc20.unwrap_or(false);
            }
        }

        let semantic_types: Vec<SemanticType> = semantics
            .values()
            .filter(|c| c.semantic_type != SemanticType::Unknown)
            .map(|c| c.semantic_type)
            .collect();

        protocol::detect(&DetectionEvidence {
            functions: &functions,
            events: &events,
            semantics: &semantic_types,
            names: name_holders.iter().map(String::as_str).collect(),
            erc20_hint,
        })
    }

    /// The fraction of moved slots carrying a non-`Unknown` semantic.
    ///
    /// A run in which nothing moved has no mapping to measure and reports
    /// zero coverage.
    fn coverage(diff_report: &diff::DiffReport, semantics: &SemanticMap) -> f64 {
        let mut moved = 0usize;
        let mut mapped = 0usize;
        for contract in diff_report.contracts.values() {
            for change in contract.moved() {
                moved += 1;
                let reference = SlotRef::new(contract.address.clone(), change.slot);
                if semantics
                    .get(&reference)
                    .map_or(false, |c| c.semantic_type != SemanticType::Unknown)
                {
                    mapped += 1;
                }
            }
        }
        if moved == 0 {
            0.0
        } else {
            mapped as f64 / moved as f64
        }
    }
}
