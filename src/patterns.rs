//! This module contains the attack pattern detector, which classifies a
//! diff report into a fixed set of attack signatures.
//!
//! Ten independent detectors run over every report; each has a fixed
//! trigger rule, a fixed severity and a documented confidence formula, and
//! any number of them may co-fire. Detection is deterministic: the same
//! report always yields the same patterns in the same order.

use serde::{Deserialize, Serialize};

use crate::{
    constant::NONCE_DELTA_SATURATION,
    diff::{ChangeDirection, ContractDiff, DiffReport, Magnitude, SlotChange},
    semantics::{SemanticType, SlotRef},
    utility::U256W,
    Config,
};

/// The closed set of attack signatures the detector can assign.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Some slot changed by an extreme magnitude within one transaction.
    FlashChange,
    /// A supply-tracking slot grew abruptly.
    FlashMint,
    /// A price-determining slot moved severely.
    PriceManipulation,
    /// Paired reserves moved in opposite directions.
    RatioBreak,
    /// An accumulator that should only grow went down.
    MonotonicIncrease,
    /// A contract's nonce jumped far beyond normal single-transaction use.
    RecursiveCall,
    /// Native balance drained while internal accounting stood still.
    ReentrancyBalance,
    /// A privileged control slot changed hands.
    OwnershipChange,
    /// A holder balance grew severely with no matching supply movement.
    UnauthorizedMint,
    /// A materially large value was zeroed out.
    ZeroValueChange,
}

/// The severity ladder for detected patterns.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One detected attack signature.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ChangePattern {
    /// The signature that fired.
    pub pattern_type: PatternType,

    /// The fixed severity of the signature.
    pub severity: Severity,

    /// The detector's confidence, in `[0, 1]`.
    pub confidence: f64,

    /// Descriptions of the triggering slots and contracts.
    pub evidence: Vec<String>,

    /// The slots that triggered the detector, for patterns that are
    /// slot-level.
    pub slots: Vec<SlotRef>,

    /// The contracts that triggered the detector.
    pub contracts: Vec<String>,
}

impl ChangePattern {
    fn new(
        pattern_type: PatternType,
        severity: Severity,
        confidence: f64,
        evidence: Vec<String>,
        slots: Vec<SlotRef>,
    ) -> Self {
        let mut contracts: Vec<String> =
            slots.iter().map(|slot| slot.contract.clone()).collect();
        contracts.dedup();

        Self {
            pattern_type,
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            evidence,
            slots,
            contracts,
        }
    }

    fn for_contracts(
        pattern_type: PatternType,
        severity: Severity,
        confidence: f64,
        evidence: Vec<String>,
        contracts: Vec<String>,
    ) -> Self {
        Self {
            pattern_type,
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            evidence,
            slots: Vec::new(),
            contracts,
        }
    }
}

/// Runs all ten detectors over `report` and returns every pattern that
/// fired, in fixed detector order.
#[must_use]
pub fn detect(report: &DiffReport, config: &Config) -> Vec<ChangePattern> {
    let detectors: [fn(&DiffReport, &Config) -> Option<ChangePattern>; 10] = [
        detect_flash_change,
        detect_flash_mint,
        detect_price_manipulation,
        detect_ratio_break,
        detect_monotonic_violation,
        detect_recursive_call,
        detect_reentrancy_balance,
        detect_ownership_change,
        detect_unauthorized_mint,
        detect_zero_value_change,
    ];

    detectors
        .iter()
        .filter_map(|detector| detector(report, config))
        .collect()
}

fn changed_slots(report: &DiffReport) -> impl Iterator<Item = (&ContractDiff, &SlotChange)> {
    report
        .contracts
        .values()
        .flat_map(|diff| diff.moved().map(move |change| (diff, change)))
}

/// Fires on any `Extreme` slot change.
///
/// Confidence: `0.6 + 0.1` per extreme slot, capped at `1.0`.
fn detect_flash_change(report: &DiffReport, _config: &Config) -> Option<ChangePattern> {
    let evidence: Vec<String> = report
        .extreme_changes
        .iter()
        .map(|slot| format!("slot {} of {} changed extremely", slot.slot, slot.contract))
        .collect();

    if evidence.is_empty() {
        return None;
    }

    let confidence = 0.6 + 0.1 * evidence.len() as f64;
    Some(ChangePattern::new(
        PatternType::FlashChange,
        Severity::Critical,
        confidence,
        evidence,
        report.extreme_changes.clone(),
    ))
}

/// Fires when a supply-tracking slot grows by `Large` or worse.
///
/// Confidence by worst magnitude: `Large` 0.6, `Massive` 0.75, `Extreme`
/// 0.9.
fn detect_flash_mint(report: &DiffReport, _config: &Config) -> Option<ChangePattern> {
    let mut worst: Option<Magnitude> = None;
    let mut evidence = Vec::new();
    let mut slots = Vec::new();

    for (diff, change) in changed_slots(report) {
        let supply_role = matches!(
            change.semantics.semantic_type,
            SemanticType::TotalSupply | SemanticType::TotalShares
        );
        let grew = matches!(
            change.direction,
            ChangeDirection::Increase | ChangeDirection::NewValue
        );
        if supply_role && grew && change.magnitude >= Magnitude::Large {
            worst = Some(worst.map_or(change.magnitude, |w| w.max(change.magnitude)));
            evidence.push(format!(
                "supply slot {} of {} grew with {:?} magnitude",
                change.slot, diff.address, change.magnitude
            ));
            slots.push(SlotRef::new(diff.address.clone(), change.slot));
        }
    }

    let confidence = match worst? {
        Magnitude::Massive => 0.75,
        Magnitude::Extreme => 0.9,
        _ => 0.6,
    };
    Some(ChangePattern::new(
        PatternType::FlashMint,
        Severity::Critical,
        confidence,
        evidence,
        slots,
    ))
}

/// Fires when a price-determining slot moves by `Massive` or worse.
///
/// Confidence: `0.55 + 0.15` per triggering slot, capped at `0.9`.
fn detect_price_manipulation(report: &DiffReport, _config: &Config) -> Option<ChangePattern> {
    let triggering: Vec<(&ContractDiff, &SlotChange)> = changed_slots(report)
        .filter(|(_, change)| {
            change.semantics.semantic_type.is_price_related() && change.magnitude.is_severe()
        })
        .collect();

    if triggering.is_empty() {
        return None;
    }

    let evidence = triggering
        .iter()
        .map(|(diff, change)| {
            format!(
                "price-related slot {} of {} moved with {:?} magnitude",
                change.slot, diff.address, change.magnitude
            )
        })
        .collect();
    let slots = triggering
        .iter()
        .map(|(diff, change)| SlotRef::new(diff.address.clone(), change.slot))
        .collect();

    let confidence = (0.55 + 0.15 * (triggering.len() as f64 - 1.0)).min(0.9);
    Some(ChangePattern::new(
        PatternType::PriceManipulation,
        Severity::High,
        confidence,
        evidence,
        slots,
    ))
}

/// Fires when both reserves of a pool move at least `Medium` in opposite
/// directions.
///
/// Confidence: fixed 0.7.
fn detect_ratio_break(report: &DiffReport, _config: &Config) -> Option<ChangePattern> {
    let mut evidence = Vec::new();
    let mut slots = Vec::new();

    for diff in report.contracts.values() {
        let reserve = |role: SemanticType| {
            diff.moved().find(|change| {
                change.semantics.semantic_type == role && change.magnitude >= Magnitude::Medium
            })
        };
        let Some(reserve0) = reserve(SemanticType::Reserve0) else {
            continue;
        };
        let Some(reserve1) = reserve(SemanticType::Reserve1) else {
            continue;
        };

        let opposed = matches!(
            (reserve0.direction, reserve1.direction),
            (ChangeDirection::Increase, ChangeDirection::Decrease)
                | (ChangeDirection::Decrease, ChangeDirection::Increase)
                | (ChangeDirection::NewValue, ChangeDirection::RemovedValue)
                | (ChangeDirection::RemovedValue, ChangeDirection::NewValue)
        );
        if opposed {
            evidence.push(format!(
                "reserves {} and {} of {} moved in opposite directions",
                reserve0.slot, reserve1.slot, diff.address
            ));
            slots.push(SlotRef::new(diff.address.clone(), reserve0.slot));
            slots.push(SlotRef::new(diff.address.clone(), reserve1.slot));
        }
    }

    if evidence.is_empty() {
        return None;
    }
    Some(ChangePattern::new(
        PatternType::RatioBreak,
        Severity::High,
        0.7,
        evidence,
        slots,
    ))
}

/// Fires when an expected-monotonic accumulator decreases.
///
/// Confidence: fixed 0.8 — accumulators going down is close to proof of a
/// broken assumption.
fn detect_monotonic_violation(report: &DiffReport, _config: &Config) -> Option<ChangePattern> {
    let triggering: Vec<(&ContractDiff, &SlotChange)> = changed_slots(report)
        .filter(|(_, change)| {
            change.semantics.semantic_type.is_monotonic()
                && matches!(
                    change.direction,
                    ChangeDirection::Decrease | ChangeDirection::RemovedValue
                )
        })
        .collect();

    if triggering.is_empty() {
        return None;
    }

    let evidence = triggering
        .iter()
        .map(|(diff, change)| {
            format!(
                "monotonic slot {} of {} decreased",
                change.slot, diff.address
            )
        })
        .collect();
    let slots = triggering
        .iter()
        .map(|(diff, change)| SlotRef::new(diff.address.clone(), change.slot))
        .collect();

    Some(ChangePattern::new(
        PatternType::MonotonicIncrease,
        Severity::Medium,
        0.8,
        evidence,
        slots,
    ))
}

/// Fires when a contract's nonce delta exceeds the configured threshold.
///
/// Confidence: `delta / NONCE_DELTA_SATURATION`, capped at `1.0`.
fn detect_recursive_call(report: &DiffReport, config: &Config) -> Option<ChangePattern> {
    let mut max_delta = 0u64;
    let mut evidence = Vec::new();
    let mut contracts = Vec::new();

    for diff in report.contracts.values() {
        if diff.nonce_delta > config.nonce_delta_threshold {
            max_delta = max_delta.max(diff.nonce_delta);
            evidence.push(format!(
                "nonce of {} moved by {} in one transaction",
                diff.address, diff.nonce_delta
            ));
            contracts.push(diff.address.clone());
        }
    }

    if evidence.is_empty() {
        return None;
    }
    let confidence = (max_delta as f64 / NONCE_DELTA_SATURATION as f64).min(1.0);
    Some(ChangePattern::for_contracts(
        PatternType::RecursiveCall,
        Severity::High,
        confidence,
        evidence,
        contracts,
    ))
}

/// Fires when a contract's native balance falls materially while none of
/// its storage slots moved — the classic drain-before-bookkeeping shape.
///
/// Confidence: fixed 0.65.
fn detect_reentrancy_balance(report: &DiffReport, config: &Config) -> Option<ChangePattern> {
    let floor = U256W::from(config.materiality_floor);
    let drained: Vec<&ContractDiff> = report
        .contracts
        .values()
        .filter(|diff| {
            let fell = diff.balance_before > diff.balance_after
                && diff.balance_before.abs_diff(&diff.balance_after) >= floor;
            fell && diff.moved().next().is_none()
        })
        .collect();

    if drained.is_empty() {
        return None;
    }

    let evidence = drained
        .iter()
        .map(|diff| {
            format!(
                "native balance of {} fell from {} to {} wei with no storage movement",
                diff.address, diff.balance_before, diff.balance_after
            )
        })
        .collect();
    let contracts = drained.iter().map(|diff| diff.address.clone()).collect();

    Some(ChangePattern::for_contracts(
        PatternType::ReentrancyBalance,
        Severity::High,
        0.65,
        evidence,
        contracts,
    ))
}

/// Fires when a privileged control slot (owner, admin, implementation)
/// changes.
///
/// Confidence: `0.6 + 0.3 * semantic_confidence` of the strongest hit.
fn detect_ownership_change(report: &DiffReport, _config: &Config) -> Option<ChangePattern> {
    let mut best_semantic = 0.0f64;
    let mut evidence = Vec::new();
    let mut slots = Vec::new();

    for (diff, change) in changed_slots(report) {
        if change.semantics.semantic_type.is_privileged() {
            best_semantic = best_semantic.max(change.semantics.confidence);
            evidence.push(format!(
                "{:?} slot {} of {} changed",
                change.semantics.semantic_type, change.slot, diff.address
            ));
            slots.push(SlotRef::new(diff.address.clone(), change.slot));
        }
    }

    if evidence.is_empty() {
        return None;
    }
    Some(ChangePattern::new(
        PatternType::OwnershipChange,
        Severity::Critical,
        0.6 + 0.3 * best_semantic,
        evidence,
        slots,
    ))
}

/// Fires when a holder-balance slot grows by `Massive` or worse while the
/// same contract's supply slot does not move at all.
///
/// Confidence: fixed 0.7.
fn detect_unauthorized_mint(report: &DiffReport, _config: &Config) -> Option<ChangePattern> {
    let mut evidence = Vec::new();
    let mut slots = Vec::new();

    for diff in report.contracts.values() {
        let supply_moved = diff.moved().any(|change| {
            change.semantics.semantic_type == SemanticType::TotalSupply
        });
        let has_supply_slot = diff.changes.iter().any(|change| {
            change.semantics.semantic_type == SemanticType::TotalSupply
        });
        if supply_moved || !has_supply_slot {
            continue;
        }

        for change in diff.moved() {
            let balance_role = change.semantics.semantic_type == SemanticType::BalanceMapping;
            let grew = matches!(
                change.direction,
                ChangeDirection::Increase | ChangeDirection::NewValue
            );
            if balance_role && grew && change.magnitude.is_severe() {
                evidence.push(format!(
                    "balance slot {} of {} grew severely with no supply movement",
                    change.slot, diff.address
                ));
                slots.push(SlotRef::new(diff.address.clone(), change.slot));
            }
        }
    }

    if evidence.is_empty() {
        return None;
    }
    Some(ChangePattern::new(
        PatternType::UnauthorizedMint,
        Severity::Critical,
        0.7,
        evidence,
        slots,
    ))
}

/// Fires when a slot holding a materially large value is zeroed out.
///
/// Confidence: `0.6 + 0.1` per zeroed slot, capped at `0.9`.
fn detect_zero_value_change(report: &DiffReport, config: &Config) -> Option<ChangePattern> {
    let floor = U256W::from(config.materiality_floor);
    let triggering: Vec<(&ContractDiff, &SlotChange)> = changed_slots(report)
        .filter(|(_, change)| {
            change.direction == ChangeDirection::RemovedValue && change.value_before >= floor
        })
        .collect();

    if triggering.is_empty() {
        return None;
    }

    let evidence = triggering
        .iter()
        .map(|(diff, change)| {
            format!(
                "slot {} of {} was zeroed from {}",
                change.slot, diff.address, change.value_before
            )
        })
        .collect();
    let slots = triggering
        .iter()
        .map(|(diff, change)| SlotRef::new(diff.address.clone(), change.slot))
        .collect();

    let confidence = (0.6 + 0.1 * (triggering.len() as f64 - 1.0)).min(0.9);
    Some(ChangePattern::new(
        PatternType::ZeroValueChange,
        Severity::High,
        confidence,
        evidence,
        slots,
    ))
}

#[cfg(test)]
mod test {
    use super::{detect, PatternType, Severity};
    use crate::{
        diff,
        semantics::{SemanticClassification, SemanticMap, SemanticType, SlotRef},
        snapshot::{ContractState, SnapshotMetadata, StateSnapshot},
        utility::U256W,
        Config,
    };

    const ADDR: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

    fn snapshot(contracts: Vec<ContractState>) -> StateSnapshot {
        StateSnapshot {
            metadata: SnapshotMetadata::default(),
            contracts: contracts
                .into_iter()
                .map(|c| (c.address.clone(), c))
                .collect(),
        }
    }

    fn contract(slots: &[(u64, u128)]) -> ContractState {
        ContractState {
            address: ADDR.into(),
            storage: slots
                .iter()
                .map(|(k, v)| (U256W::from(*k), U256W::from(*v)))
                .collect(),
            balance_wei: U256W::ZERO,
            nonce: 0,
        }
    }

    fn report_for(
        before: StateSnapshot,
        after: StateSnapshot,
        semantics: &SemanticMap,
    ) -> diff::DiffReport {
        diff::compute(&before, &after, semantics, &Config::default())
    }

    #[test]
    fn a_silent_report_fires_nothing() {
        let state = contract(&[(0, 1000)]);
        let report = report_for(
            snapshot(vec![state.clone()]),
            snapshot(vec![state]),
            &SemanticMap::new(),
        );
        assert!(detect(&report, &Config::default()).is_empty());
    }

    #[test]
    fn extreme_changes_fire_flash_change() {
        let report = report_for(
            snapshot(vec![contract(&[(0, 10)])]),
            snapshot(vec![contract(&[(0, 100_000)])]),
            &SemanticMap::new(),
        );
        let patterns = detect(&report, &Config::default());
        let flash = patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::FlashChange)
            .unwrap();
        assert_eq!(flash.severity, Severity::Critical);
        assert!((0.0..=1.0).contains(&flash.confidence));
        assert!(!flash.evidence.is_empty());
    }

    #[test]
    fn nonce_delta_beyond_threshold_fires_recursive_call() {
        let mut before_state = contract(&[]);
        before_state.nonce = 0;
        let mut after_state = contract(&[]);
        after_state.nonce = 25;

        let report = report_for(
            snapshot(vec![before_state]),
            snapshot(vec![after_state]),
            &SemanticMap::new(),
        );
        let patterns = detect(&report, &Config::default());
        let recursive = patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::RecursiveCall)
            .unwrap();
        assert_eq!(recursive.severity, Severity::High);
        // delta 25 over saturation 50.
        assert!((recursive.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn a_nonce_delta_at_the_threshold_does_not_fire() {
        let mut after_state = contract(&[]);
        after_state.nonce = 10;

        let report = report_for(
            snapshot(vec![contract(&[])]),
            snapshot(vec![after_state]),
            &SemanticMap::new(),
        );
        assert!(detect(&report, &Config::default())
            .iter()
            .all(|p| p.pattern_type != PatternType::RecursiveCall));
    }

    #[test]
    fn supply_growth_fires_flash_mint() {
        let mut semantics = SemanticMap::new();
        semantics.insert(
            SlotRef::new(ADDR, 2u64),
            SemanticClassification::new(SemanticType::TotalSupply, 0.95),
        );

        let report = report_for(
            snapshot(vec![contract(&[(2, 1_000_000)])]),
            snapshot(vec![contract(&[(2, 2_500_000)])]),
            &semantics,
        );
        let patterns = detect(&report, &Config::default());
        let mint = patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::FlashMint)
            .unwrap();
        assert_eq!(mint.severity, Severity::Critical);
    }

    #[test]
    fn ownership_transfer_fires_ownership_change() {
        let mut semantics = SemanticMap::new();
        semantics.insert(
            SlotRef::new(ADDR, 0u64),
            SemanticClassification::new(SemanticType::Owner, 0.95),
        );

        let report = report_for(
            snapshot(vec![contract(&[(0, 1111)])]),
            snapshot(vec![contract(&[(0, 2222)])]),
            &semantics,
        );
        let patterns = detect(&report, &Config::default());
        let ownership = patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::OwnershipChange)
            .unwrap();
        assert_eq!(ownership.severity, Severity::Critical);
        assert!((ownership.confidence - (0.6 + 0.3 * 0.95)).abs() < 1e-9);
    }

    #[test]
    fn balance_drain_without_storage_movement_fires_reentrancy() {
        let mut before_state = contract(&[]);
        before_state.balance_wei = U256W::from(10u128.pow(18));
        let after_state = contract(&[]);

        let report = report_for(
            snapshot(vec![before_state]),
            snapshot(vec![after_state]),
            &SemanticMap::new(),
        );
        let patterns = detect(&report, &Config::default());
        assert!(patterns
            .iter()
            .any(|p| p.pattern_type == PatternType::ReentrancyBalance));
    }

    #[test]
    fn zeroing_a_material_slot_fires_zero_value_change() {
        let report = report_for(
            snapshot(vec![contract(&[(3, 5 * 10u128.pow(18))])]),
            snapshot(vec![contract(&[(3, 0)])]),
            &SemanticMap::new(),
        );
        let patterns = detect(&report, &Config::default());
        assert!(patterns
            .iter()
            .any(|p| p.pattern_type == PatternType::ZeroValueChange));
    }

    #[test]
    fn all_confidences_lie_in_unit_interval() {
        let mut semantics = SemanticMap::new();
        for (slot, role) in [
            (0u64, SemanticType::Owner),
            (1, SemanticType::Reserve0),
            (2, SemanticType::Reserve1),
            (3, SemanticType::TotalSupply),
        ] {
            semantics.insert(
                SlotRef::new(ADDR, slot),
                SemanticClassification::new(role, 0.9),
            );
        }

        let report = report_for(
            snapshot(vec![contract(&[(0, 1), (1, 100), (2, 100), (3, 10)])]),
            snapshot(vec![contract(&[(0, 2), (1, 10_000), (2, 30), (3, 10_000)])]),
            &semantics,
        );
        for pattern in detect(&report, &Config::default()) {
            assert!((0.0..=1.0).contains(&pattern.confidence));
        }
    }
}
