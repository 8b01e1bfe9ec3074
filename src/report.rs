//! This module contains the exported output document of an analysis run.
//!
//! The report is the single serializable artifact the engine produces. It
//! summarizes the upstream stages (protocol detection, semantic coverage,
//! state-diff statistics, fired attack patterns) and embeds the full
//! generated invariant list. Serialization is deterministic: every
//! collection is either an ordered map or a vector whose order the pipeline
//! fixes, so identical inputs serialize to byte-identical JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    diff::DiffReport,
    invariant::{ComplexInvariant, InvariantCategory},
    patterns::{ChangePattern, PatternType, Severity},
    protocol::{ProtocolDetectionResult, ProtocolType},
};

/// The complete output document of one analysis run.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Report {
    /// The caller-supplied project name.
    pub project: String,

    /// The fused protocol classification.
    pub protocol_type: ProtocolType,

    /// The confidence of the protocol classification.
    pub protocol_confidence: f64,

    /// The fraction of changed slots that received a non-`Unknown`
    /// semantic classification.
    pub semantic_mapping_coverage: f64,

    /// Aggregate statistics over the state diff.
    pub state_changes: StateChangeSummary,

    /// The attack patterns that fired, in detector order.
    pub attack_patterns: Vec<PatternSummary>,

    /// Aggregate statistics over the generated invariants.
    pub statistics: Statistics,

    /// The generated invariants, in generation order.
    pub invariants: Vec<ComplexInvariant>,
}

/// Aggregate counts over the state diff.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StateChangeSummary {
    /// The number of contracts in which at least one slot moved.
    pub contracts_changed: usize,

    /// The total number of slots that moved across all contracts.
    pub slots_changed: usize,

    /// The number of slot changes classifying as `Extreme`.
    pub extreme_changes: usize,
}

/// The report-level summary of one fired pattern.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PatternSummary {
    /// The signature that fired.
    #[serde(rename = "type")]
    pub pattern_type: PatternType,

    /// The severity of the signature.
    pub severity: Severity,

    /// The detector's confidence in the match.
    pub confidence: f64,

    /// The detector's evidence trail, joined into one line.
    pub description: String,
}

impl From<&ChangePattern> for PatternSummary {
    fn from(pattern: &ChangePattern) -> Self {
        Self {
            pattern_type: pattern.pattern_type,
            severity: pattern.severity,
            confidence: pattern.confidence,
            description: pattern.evidence.join("; "),
        }
    }
}

/// Aggregate counts over the generated invariants.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Statistics {
    /// The total number of generated invariants.
    pub total_invariants: usize,

    /// Invariant counts keyed by category.
    pub by_category: BTreeMap<InvariantCategory, usize>,

    /// Invariant counts keyed by severity.
    pub by_severity: BTreeMap<Severity, usize>,
}

impl Statistics {
    /// Tallies the category and severity histograms of `invariants`.
    #[must_use]
    pub fn tally(invariants: &[ComplexInvariant]) -> Self {
        let mut statistics = Self {
            total_invariants: invariants.len(),
            ..Self::default()
        };
        for invariant in invariants {
            *statistics.by_category.entry(invariant.category).or_insert(0) += 1;
            *statistics.by_severity.entry(invariant.severity).or_insert(0) += 1;
        }
        statistics
    }
}

impl Report {
    /// Assembles the output document from the pipeline's stage results.
    #[must_use]
    pub fn assemble(
        project: impl Into<String>,
        protocol: &ProtocolDetectionResult,
        semantic_mapping_coverage: f64,
        diff_report: &DiffReport,
        patterns: &[ChangePattern],
        invariants: Vec<ComplexInvariant>,
    ) -> Self {
        Self {
            project: project.into(),
            protocol_type: protocol.detected_type,
            protocol_confidence: protocol.confidence,
            semantic_mapping_coverage,
            state_changes: StateChangeSummary {
                contracts_changed: diff_report.contracts_changed(),
                slots_changed: diff_report.slots_changed(),
                extreme_changes: diff_report.extreme_changes.len(),
            },
            attack_patterns: patterns.iter().map(PatternSummary::from).collect(),
            statistics: Statistics::tally(&invariants),
            invariants,
        }
    }

    /// Serializes the report as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
