//! This module contains the protocol type detector, which fuses up to four
//! independent evidence sources — exposed function names, emitted event
//! names, resolved slot semantics and free-text contract names — into a
//! single protocol classification.
//!
//! # How it Works
//!
//! Each present source independently scores every protocol category against
//! the static tables in [`signatures`]. The per-source scores are then fused
//! with fixed weights (functions 0.4, events 0.3, storage semantics 0.2,
//! name 0.1); the weight of any missing source is redistributed
//! proportionally across the sources that are present. The detected type is
//! the argmax of the fused scores, with ties broken by a fixed category
//! priority order. Detection never fails: a contract with no evidence at all
//! is classified [`ProtocolType::Unknown`] with zero confidence, and the
//! full per-source evidence trail is carried on the result for audit.

pub mod signatures;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    constant::{
        EVENT_EVIDENCE_WEIGHT, FUNCTION_EVIDENCE_WEIGHT, NAME_EVIDENCE_WEIGHT,
        STORAGE_EVIDENCE_WEIGHT,
    },
    protocol::signatures::SIGNATURE_TABLES,
    semantics::SemanticType,
};

/// The closed set of protocol categories the detector can assign.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolType {
    /// A yield or share vault.
    Vault,
    /// An automated market maker.
    Amm,
    /// A collateralised lending market.
    Lending,
    /// A staking or reward-distribution contract.
    Staking,
    /// A cross-chain bridge.
    Bridge,
    /// An NFT marketplace.
    NftMarketplace,
    /// An on-chain governor.
    Governance,
    /// A plain ERC-20 token.
    Erc20,
    /// No category could be established.
    Unknown,
}

/// The fixed priority order used to break score ties between categories.
///
/// More systemically-sensitive categories come first, so that a contract
/// scoring equally as a vault and as a token is treated as the vault.
pub const CATEGORY_PRIORITY: &[ProtocolType] = &[
    ProtocolType::Vault,
    ProtocolType::Lending,
    ProtocolType::Amm,
    ProtocolType::Staking,
    ProtocolType::Bridge,
    ProtocolType::NftMarketplace,
    ProtocolType::Governance,
    ProtocolType::Erc20,
];

/// The four evidence sources that feed detection.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    /// Exposed function names or selectors.
    Functions,
    /// Emitted event names.
    Events,
    /// Resolved storage slot semantics.
    StorageSemantics,
    /// Free-text contract names and aliases.
    Name,
}

impl EvidenceSource {
    /// The fixed fusion weight of this source when all four are present.
    #[must_use]
    pub fn weight(&self) -> f64 {
        match self {
            Self::Functions => FUNCTION_EVIDENCE_WEIGHT,
            Self::Events => EVENT_EVIDENCE_WEIGHT,
            Self::StorageSemantics => STORAGE_EVIDENCE_WEIGHT,
            Self::Name => NAME_EVIDENCE_WEIGHT,
        }
    }
}

/// How much one matched function signature contributes to a source score.
const FUNCTION_MATCH_CONTRIBUTION: f64 = 0.25;

/// How much one matched event signature contributes to a source score.
const EVENT_MATCH_CONTRIBUTION: f64 = 0.34;

/// How much one matched semantic signature contributes to a source score.
const SEMANTIC_MATCH_CONTRIBUTION: f64 = 0.30;

/// How much one matched name keyword contributes to a source score.
const NAME_MATCH_CONTRIBUTION: f64 = 0.60;

/// The evidence available for one contract, any subset of which may be
/// absent.
///
/// An empty collection counts as an absent source; there is no distinction
/// between "the collaborator supplied nothing" and "the collaborator was
/// never consulted".
#[derive(Clone, Debug, Default)]
pub struct DetectionEvidence<'a> {
    /// Exposed function names, when an interface was recovered.
    pub functions: &'a [String],

    /// Emitted event names, when an interface was recovered.
    pub events: &'a [String],

    /// The resolved semantics of the contract's diffed slots.
    pub semantics: &'a [SemanticType],

    /// Candidate contract names: primary label, aliases and symbol.
    pub names: Vec<&'a str>,

    /// Whether a naming source explicitly flagged the contract as ERC-20.
    pub erc20_hint: bool,
}

/// The outcome of protocol detection for one contract.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ProtocolDetectionResult {
    /// The winning category.
    pub detected_type: ProtocolType,

    /// The fused confidence of the winner, in `[0, 1]`.
    pub confidence: f64,

    /// The raw score each present source gave the winning category.
    pub source_scores: BTreeMap<EvidenceSource, f64>,

    /// Human-readable descriptions of every matched signature.
    pub evidence: Vec<String>,
}

impl ProtocolDetectionResult {
    /// The give-up result for a contract with no usable evidence.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            detected_type: ProtocolType::Unknown,
            confidence: 0.0,
            source_scores: BTreeMap::new(),
            evidence: Vec::new(),
        }
    }
}

/// Detects the protocol category of one contract from whatever evidence is
/// available.
///
/// This function is pure and never fails; see the module documentation for
/// the fusion rules.
#[must_use]
pub fn detect(evidence: &DetectionEvidence) -> ProtocolDetectionResult {
    let mut per_source: Vec<(EvidenceSource, BTreeMap<ProtocolType, f64>, Vec<String>)> =
        Vec::new();

    if !evidence.functions.is_empty() {
        let (scores, trail) = score_functions(evidence.functions);
        per_source.push((EvidenceSource::Functions, scores, trail));
    }
    if !evidence.events.is_empty() {
        let (scores, trail) = score_events(evidence.events);
        per_source.push((EvidenceSource::Events, scores, trail));
    }
    if !evidence.semantics.is_empty() {
        let (scores, trail) = score_semantics(evidence.semantics);
        per_source.push((EvidenceSource::StorageSemantics, scores, trail));
    }
    if !evidence.names.is_empty() || evidence.erc20_hint {
        let (scores, trail) = score_names(&evidence.names, evidence.erc20_hint);
        per_source.push((EvidenceSource::Name, scores, trail));
    }

    if per_source.is_empty() {
        return ProtocolDetectionResult::unknown();
    }

    // Redistribute the weight of absent sources proportionally across the
    // sources that are present.
    let present_weight: f64 = per_source.iter().map(|(source, ..)| source.weight()).sum();

    let mut fused: BTreeMap<ProtocolType, f64> = BTreeMap::new();
    for (source, scores, _) in &per_source {
        let normalised_weight = source.weight() / present_weight;
        for (protocol, score) in scores {
            *fused.entry(*protocol).or_insert(0.0) += normalised_weight * score;
        }
    }

    // Argmax with the fixed priority order as the tie-break: iterating in
    // priority order and requiring a strictly greater score keeps the
    // earlier category on equal scores.
    let mut detected = ProtocolType::Unknown;
    let mut best = 0.0f64;
    for candidate in CATEGORY_PRIORITY {
        let score = fused.get(candidate).copied().unwrap_or(0.0);
        if score > best {
            best = score;
            detected = *candidate;
        }
    }

    if detected == ProtocolType::Unknown {
        return ProtocolDetectionResult::unknown();
    }

    let source_scores = per_source
        .iter()
        .map(|(source, scores, _)| {
            (*source, scores.get(&detected).copied().unwrap_or(0.0))
        })
        .collect();
    let evidence_trail = per_source
        .into_iter()
        .flat_map(|(_, _, trail)| trail)
        .collect();

    ProtocolDetectionResult {
        detected_type: detected,
        confidence: best.clamp(0.0, 1.0),
        source_scores,
        evidence: evidence_trail,
    }
}

/// Scores function-name evidence against every category's table.
fn score_functions(functions: &[String]) -> (BTreeMap<ProtocolType, f64>, Vec<String>) {
    score_name_list(
        functions,
        FUNCTION_MATCH_CONTRIBUTION,
        |table| table.functions,
        "function",
    )
}

/// Scores event-name evidence against every category's table.
fn score_events(events: &[String]) -> (BTreeMap<ProtocolType, f64>, Vec<String>) {
    score_name_list(events, EVENT_MATCH_CONTRIBUTION, |table| table.events, "event")
}

fn score_name_list(
    observed: &[String],
    contribution: f64,
    select: impl Fn(&signatures::ProtocolSignatures) -> &'static [&'static str],
    kind: &str,
) -> (BTreeMap<ProtocolType, f64>, Vec<String>) {
    let mut scores = BTreeMap::new();
    let mut trail = Vec::new();

    for table in SIGNATURE_TABLES {
        let mut score = 0.0f64;
        for signature in select(table) {
            if observed
                .iter()
                .any(|name| name.eq_ignore_ascii_case(signature))
            {
                score += contribution;
                trail.push(format!(
                    "{kind} `{signature}` matches {:?}",
                    table.protocol
                ));
            }
        }
        if score > 0.0 {
            scores.insert(table.protocol, score.min(1.0));
        }
    }

    (scores, trail)
}

/// Scores resolved slot semantics against every category's table.
fn score_semantics(semantics: &[SemanticType]) -> (BTreeMap<ProtocolType, f64>, Vec<String>) {
    let mut scores = BTreeMap::new();
    let mut trail = Vec::new();

    for table in SIGNATURE_TABLES {
        let mut score = 0.0f64;
        for signature in table.semantics {
            if semantics.contains(signature) {
                score += SEMANTIC_MATCH_CONTRIBUTION;
                trail.push(format!(
                    "slot semantic {signature:?} matches {:?}",
                    table.protocol
                ));
            }
        }
        if score > 0.0 {
            scores.insert(table.protocol, score.min(1.0));
        }
    }

    (scores, trail)
}

/// Scores contract labels against every category's keyword list.
fn score_names(names: &[&str], erc20_hint: bool) -> (BTreeMap<ProtocolType, f64>, Vec<String>) {
    let lowered: Vec<String> = names.iter().map(|n| n.to_ascii_lowercase()).collect();

    let mut scores = BTreeMap::new();
    let mut trail = Vec::new();

    for table in SIGNATURE_TABLES {
        let mut score = 0.0f64;
        for keyword in table.name_keywords {
            if lowered.iter().any(|name| name.contains(keyword)) {
                score += NAME_MATCH_CONTRIBUTION;
                trail.push(format!(
                    "name keyword `{keyword}` matches {:?}",
                    table.protocol
                ));
            }
        }
        if score > 0.0 {
            scores.insert(table.protocol, score.min(1.0));
        }
    }

    if erc20_hint {
        let entry = scores.entry(ProtocolType::Erc20).or_insert(0.0);
        *entry = (*entry + NAME_MATCH_CONTRIBUTION).min(1.0);
        trail.push("naming source flags the contract as ERC-20".into());
    }

    (scores, trail)
}
