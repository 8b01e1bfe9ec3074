//! This module contains the invariant generator, the terminal stage of the
//! pipeline.
//!
//! Generation has two halves. Protocol-driven generation selects the
//! template subset for the detected protocol type and resolves each
//! template's required semantic roles to concrete (contract, slot) pairs; a
//! template that cannot fully resolve every role above the configured
//! confidence is skipped whole, never partially emitted. Pattern-driven
//! generation then appends defensive invariants bounding the behavior that
//! each fired attack pattern exhibited.
//!
//! Output is deterministic: invariants appear in a fixed order and their
//! ids derive from a per-category counter, never from time or randomness,
//! so identical inputs produce byte-identical output documents.

pub mod templates;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    invariant::templates::{templates_for, InvariantTemplate},
    patterns::{ChangePattern, PatternType, Severity},
    protocol::{ProtocolDetectionResult, ProtocolType},
    semantics::{SemanticMap, SemanticType, SlotRef},
    Config,
};

/// The closed set of invariant categories.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum InvariantCategory {
    /// Supply, debt and stake conservation properties.
    SupplyIntegrity,
    /// Price and exchange-rate stability properties.
    PriceStability,
    /// Pool and reserve consistency properties.
    LiquidityConsistency,
    /// Privileged-slot immutability properties.
    AccessControl,
    /// Pattern-driven properties bounding observed attack behavior.
    Defensive,
}

impl InvariantCategory {
    /// The stable id prefix of the category.
    #[must_use]
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::SupplyIntegrity => "SUP",
            Self::PriceStability => "PRC",
            Self::LiquidityConsistency => "LIQ",
            Self::AccessControl => "ACC",
            Self::Defensive => "DEF",
        }
    }
}

/// A fully-resolved, exportable invariant.
///
/// # Invariants
///
/// The formula is fully substituted: no `{placeholder}` token survives into
/// a constructed value. Every confidence in the confidence map lies in
/// `[0, 1]`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ComplexInvariant {
    /// The stable id, derived from the category and a per-category counter.
    pub id: String,

    /// The template or pattern name this invariant was instantiated from.
    #[serde(rename = "type")]
    pub invariant_type: String,

    /// The category of the invariant.
    pub category: InvariantCategory,

    /// A human-readable statement of the protected property.
    pub description: String,

    /// The fully-resolved, machine-checkable formula.
    pub formula: String,

    /// The numeric threshold the formula references.
    pub threshold: f64,

    /// The severity of a violation.
    pub severity: Severity,

    /// The contracts the invariant constrains.
    pub contracts: Vec<String>,

    /// The concrete slots the formula references.
    pub slots: Vec<SlotRef>,

    /// Upstream confidences carried forward for downstream trust weighting.
    pub confidence: BTreeMap<String, f64>,

    /// The protocol classification this invariant descends from, when it is
    /// protocol-driven.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_type: Option<ProtocolType>,

    /// The attack pattern this invariant descends from, when it is
    /// pattern-driven.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_pattern: Option<PatternType>,
}

/// Hands out per-category sequential ids.
#[derive(Clone, Debug, Default)]
struct IdAllocator {
    counters: BTreeMap<InvariantCategory, usize>,
}

impl IdAllocator {
    fn next(&mut self, category: InvariantCategory) -> String {
        let counter = self.counters.entry(category).or_insert(0);
        *counter += 1;
        format!("{}-{:03}", category.id_prefix(), counter)
    }
}

/// Generates the full ordered invariant list for one analysis run.
///
/// Protocol-driven invariants come first, in template declaration order,
/// followed by one defensive invariant per fired pattern in detector order.
#[must_use]
pub fn generate(
    protocol: &ProtocolDetectionResult,
    semantics: &SemanticMap,
    patterns: &[ChangePattern],
    config: &Config,
) -> Vec<ComplexInvariant> {
    let mut ids = IdAllocator::default();
    let mut invariants = Vec::new();

    if protocol.confidence >= config.min_protocol_confidence {
        for template in templates_for(protocol.detected_type) {
            if let Some(invariant) =
                instantiate(template, protocol, semantics, config, &mut ids)
            {
                invariants.push(invariant);
            }
        }
    }

    for pattern in patterns {
        if let Some(invariant) = defend_against(pattern, config, &mut ids) {
            invariants.push(invariant);
        }
    }

    invariants
}

/// Resolves `role` to the most confidently matching slot, if any
/// classification clears the configured minimum. When `contract` is given,
/// only slots of that contract are candidates.
///
/// Iteration over the semantic map is in key order and a candidate only
/// replaces the incumbent on a strictly greater confidence, so resolution
/// is deterministic.
fn resolve_role(
    role: SemanticType,
    semantics: &SemanticMap,
    contract: Option<&str>,
    config: &Config,
) -> Option<(SlotRef, f64)> {
    let mut best: Option<(SlotRef, f64)> = None;
    for (slot, classification) in semantics {
        if contract.map_or(false, |wanted| slot.contract != wanted) {
            continue;
        }
        if classification.semantic_type != role
            || classification.confidence < config.min_role_confidence
        {
            continue;
        }
        if best
            .as_ref()
            .map_or(true, |(_, incumbent)| classification.confidence > *incumbent)
        {
            best = Some((slot.clone(), classification.confidence));
        }
    }
    best
}

/// Resolves every role of `template`, in declaration order.
///
/// A template relating several roles describes a property of one protocol
/// contract, so a multi-role template must bind all of its roles within a
/// single contract; the contract with the strictly greatest summed role
/// confidence wins. Single-role templates resolve over the whole map.
fn resolve_roles(
    template: &InvariantTemplate,
    semantics: &SemanticMap,
    config: &Config,
) -> Option<Vec<(SlotRef, f64)>> {
    if template.required_roles.len() <= 1 {
        return template
            .required_roles
            .iter()
            .map(|(_, role)| resolve_role(*role, semantics, None, config))
            .collect();
    }

    let contracts: BTreeSet<&str> =
        semantics.keys().map(|slot| slot.contract.as_str()).collect();
    let mut best: Option<(f64, Vec<(SlotRef, f64)>)> = None;
    for contract in contracts {
        let binding: Option<Vec<(SlotRef, f64)>> = template
            .required_roles
            .iter()
            .map(|(_, role)| resolve_role(*role, semantics, Some(contract), config))
            .collect();
        let Some(binding) = binding else { continue };
        let total: f64 = binding.iter().map(|(_, confidence)| confidence).sum();
        if best
            .as_ref()
            .map_or(true, |(incumbent, _)| total > *incumbent)
        {
            best = Some((total, binding));
        }
    }
    best.map(|(_, binding)| binding)
}

/// Renders a slot reference inside a formula.
fn slot_expr(slot: &SlotRef) -> String {
    format!("storage({}, {})", slot.contract, slot.slot)
}

/// Instantiates one template, or gives up if any required role fails to
/// resolve.
fn instantiate(
    template: &InvariantTemplate,
    protocol: &ProtocolDetectionResult,
    semantics: &SemanticMap,
    config: &Config,
    ids: &mut IdAllocator,
) -> Option<ComplexInvariant> {
    let mut formula = template.formula.to_owned();
    let mut slots = Vec::new();
    let mut confidence = BTreeMap::new();
    confidence.insert("protocol".to_owned(), protocol.confidence);

    let bindings = resolve_roles(template, semantics, config)?;
    for ((placeholder, _), (slot, role_confidence)) in
        template.required_roles.iter().zip(bindings)
    {
        formula = formula.replace(&format!("{{{placeholder}}}"), &slot_expr(&slot));
        confidence.insert(format!("role:{placeholder}"), role_confidence);
        if !slots.contains(&slot) {
            slots.push(slot);
        }
    }
    formula = formula.replace("{threshold}", &template.threshold.to_string());

    // A template whose formula still carries a placeholder is a library
    // bug; refuse to emit it rather than exporting an unresolved token.
    if formula.contains('{') {
        return None;
    }

    let mut contracts: Vec<String> = Vec::new();
    for slot in &slots {
        if !contracts.contains(&slot.contract) {
            contracts.push(slot.contract.clone());
        }
    }

    Some(ComplexInvariant {
        id: ids.next(template.category),
        invariant_type: template.name.to_owned(),
        category: template.category,
        description: template.description.to_owned(),
        formula,
        threshold: template.threshold,
        severity: template.severity,
        contracts,
        slots,
        confidence,
        protocol_type: Some(protocol.detected_type),
        attack_pattern: None,
    })
}

/// The per-slot defensive constraint for a pattern.
fn defensive_slot_constraint(pattern_type: PatternType, slot: &SlotRef) -> String {
    match pattern_type {
        PatternType::OwnershipChange => format!("delta({}) == 0", slot_expr(slot)),
        PatternType::MonotonicIncrease => format!("delta({}) >= 0", slot_expr(slot)),
        PatternType::ZeroValueChange => format!("{} != 0", slot_expr(slot)),
        _ => format!("magnitude({}) < extreme", slot_expr(slot)),
    }
}

/// Builds the defensive invariant for one fired pattern.
fn defend_against(
    pattern: &ChangePattern,
    config: &Config,
    ids: &mut IdAllocator,
) -> Option<ComplexInvariant> {
    let (formula, threshold) = if !pattern.slots.is_empty() {
        let constraints: Vec<String> = pattern
            .slots
            .iter()
            .map(|slot| defensive_slot_constraint(pattern.pattern_type, slot))
            .collect();
        (constraints.join(" and "), 0.0)
    } else if !pattern.contracts.is_empty() {
        let threshold = config.nonce_delta_threshold as f64;
        let constraints: Vec<String> = pattern
            .contracts
            .iter()
            .map(|contract| match pattern.pattern_type {
                PatternType::RecursiveCall => {
                    format!("nonce_delta({contract}) <= {threshold}")
                }
                PatternType::ReentrancyBalance => {
                    format!(
                        "native_balance_delta({contract}) == 0 or slots_changed({contract}) > 0"
                    )
                }
                _ => format!("magnitude_any({contract}) < extreme"),
            })
            .collect();
        let threshold = if pattern.pattern_type == PatternType::RecursiveCall {
            threshold
        } else {
            0.0
        };
        (constraints.join(" and "), threshold)
    } else {
        return None;
    };

    let mut confidence = BTreeMap::new();
    confidence.insert("pattern".to_owned(), pattern.confidence);

    Some(ComplexInvariant {
        id: ids.next(InvariantCategory::Defensive),
        invariant_type: format!("prevent_{}", pattern_slug(pattern.pattern_type)),
        category: InvariantCategory::Defensive,
        description: format!(
            "Bounds the behavior exhibited by the detected {} pattern.",
            pattern_slug(pattern.pattern_type)
        ),
        formula,
        threshold,
        severity: pattern.severity,
        contracts: pattern.contracts.clone(),
        slots: pattern.slots.clone(),
        confidence,
        protocol_type: None,
        attack_pattern: Some(pattern.pattern_type),
    })
}

/// The stable snake-case name of a pattern type.
fn pattern_slug(pattern_type: PatternType) -> &'static str {
    match pattern_type {
        PatternType::FlashChange => "flash_change",
        PatternType::FlashMint => "flash_mint",
        PatternType::PriceManipulation => "price_manipulation",
        PatternType::RatioBreak => "ratio_break",
        PatternType::MonotonicIncrease => "monotonic_increase",
        PatternType::RecursiveCall => "recursive_call",
        PatternType::ReentrancyBalance => "reentrancy_balance",
        PatternType::OwnershipChange => "ownership_change",
        PatternType::UnauthorizedMint => "unauthorized_mint",
        PatternType::ZeroValueChange => "zero_value_change",
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use super::{generate, InvariantCategory};
    use crate::{
        protocol::{EvidenceSource, ProtocolDetectionResult, ProtocolType},
        semantics::{SemanticClassification, SemanticMap, SemanticType, SlotRef},
        Config,
    };

    const VAULT: &str = "0xdddddddddddddddddddddddddddddddddddddddd";

    fn vault_detection(confidence: f64) -> ProtocolDetectionResult {
        ProtocolDetectionResult {
            detected_type: ProtocolType::Vault,
            confidence,
            source_scores: BTreeMap::from([(EvidenceSource::StorageSemantics, confidence)]),
            evidence: vec!["slot semantic TotalSupply matches Vault".into()],
        }
    }

    fn vault_semantics() -> SemanticMap {
        let mut semantics = SemanticMap::new();
        semantics.insert(
            SlotRef::new(VAULT, 2u64),
            SemanticClassification::new(SemanticType::TotalSupply, 0.95),
        );
        semantics
    }

    #[test]
    fn vault_detection_emits_share_price_stability() {
        let invariants = generate(
            &vault_detection(0.8),
            &vault_semantics(),
            &[],
            &Config::default(),
        );

        let share_price = invariants
            .iter()
            .find(|i| i.invariant_type == "share_price_stability")
            .unwrap();
        assert_eq!(share_price.category, InvariantCategory::PriceStability);
        assert_eq!(share_price.slots, vec![SlotRef::new(VAULT, 2u64)]);
        assert_eq!(share_price.protocol_type, Some(ProtocolType::Vault));
        assert!(share_price.formula.contains(VAULT));
    }

    #[test]
    fn templates_with_unresolvable_roles_are_skipped_whole() {
        // The asset/share consistency template needs TotalAssets as well,
        // which the semantics cannot supply.
        let invariants = generate(
            &vault_detection(0.8),
            &vault_semantics(),
            &[],
            &Config::default(),
        );
        assert!(invariants
            .iter()
            .all(|i| i.invariant_type != "vault_asset_share_consistency"));
    }

    #[test]
    fn no_formula_carries_an_unresolved_placeholder() {
        let invariants = generate(
            &vault_detection(0.8),
            &vault_semantics(),
            &[],
            &Config::default(),
        );
        assert!(!invariants.is_empty());
        for invariant in &invariants {
            assert!(!invariant.formula.contains('{'), "{}", invariant.formula);
            assert!(!invariant.formula.contains('}'), "{}", invariant.formula);
        }
    }

    #[test]
    fn low_protocol_confidence_suppresses_template_invariants() {
        let invariants = generate(
            &vault_detection(0.1),
            &vault_semantics(),
            &[],
            &Config::default(),
        );
        assert!(invariants.is_empty());
    }

    #[test]
    fn low_role_confidence_suppresses_resolution() {
        let mut semantics = SemanticMap::new();
        semantics.insert(
            SlotRef::new(VAULT, 2u64),
            SemanticClassification::new(SemanticType::TotalSupply, 0.1),
        );
        let invariants = generate(&vault_detection(0.8), &semantics, &[], &Config::default());
        assert!(invariants.is_empty());
    }

    #[test]
    fn multi_role_templates_never_bind_across_contracts() {
        const OTHER: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

        // TotalSupply and TotalAssets live in different contracts, so the
        // asset/share consistency template must not be emitted.
        let mut semantics = vault_semantics();
        semantics.insert(
            SlotRef::new(OTHER, 1u64),
            SemanticClassification::new(SemanticType::TotalAssets, 0.9),
        );

        let invariants = generate(
            &vault_detection(0.8),
            &semantics,
            &[],
            &Config::default(),
        );
        assert!(invariants
            .iter()
            .all(|i| i.invariant_type != "vault_asset_share_consistency"));
    }

    #[test]
    fn multi_role_templates_bind_within_the_best_single_contract() {
        const OTHER: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

        // Both roles resolve inside the vault; the stray higher-confidence
        // supply slot elsewhere must not be pulled into the binding.
        let mut semantics = vault_semantics();
        semantics.insert(
            SlotRef::new(VAULT, 3u64),
            SemanticClassification::new(SemanticType::TotalAssets, 0.9),
        );
        semantics.insert(
            SlotRef::new(OTHER, 0u64),
            SemanticClassification::new(SemanticType::TotalSupply, 0.99),
        );

        let invariants = generate(
            &vault_detection(0.8),
            &semantics,
            &[],
            &Config::default(),
        );

        let consistency = invariants
            .iter()
            .find(|i| i.invariant_type == "vault_asset_share_consistency")
            .unwrap();
        assert_eq!(consistency.contracts, vec![VAULT.to_owned()]);
        assert!(consistency
            .slots
            .iter()
            .all(|slot| slot.contract == VAULT));
    }

    #[test]
    fn ids_are_sequential_within_a_category() {
        let mut semantics = vault_semantics();
        semantics.insert(
            SlotRef::new(VAULT, 3u64),
            SemanticClassification::new(SemanticType::TotalAssets, 0.9),
        );

        let invariants = generate(
            &vault_detection(0.8),
            &semantics,
            &[],
            &Config::default(),
        );

        // Both vault templates resolve now; each category counts on its own.
        let ids: Vec<&str> = invariants.iter().map(|i| i.id.as_str()).collect();
        assert!(ids.contains(&"PRC-001"));
        assert!(ids.contains(&"SUP-001"));
    }

    #[test]
    fn generation_is_deterministic() {
        let first = generate(
            &vault_detection(0.8),
            &vault_semantics(),
            &[],
            &Config::default(),
        );
        let second = generate(
            &vault_detection(0.8),
            &vault_semantics(),
            &[],
            &Config::default(),
        );
        assert_eq!(first, second);
    }
}
