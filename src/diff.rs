//! This module contains the state diff calculator, which compares the
//! before and after snapshots contract by contract and classifies every
//! slot's change by direction and magnitude.
//!
//! The diff is computed over the set union of slot keys: a slot absent from
//! one side simply reads as the zero word, never as an error. Beyond the
//! per-slot changes the calculator searches for cross-contract relations —
//! matched balance transfers and co-occurring extreme changes — and records
//! free-text anomaly notes such as runaway nonce deltas.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    constant::{
        MAGNITUDE_LARGE_BOUND, MAGNITUDE_MASSIVE_BOUND, MAGNITUDE_MEDIUM_BOUND,
        MAGNITUDE_SMALL_BOUND, MAGNITUDE_TINY_BOUND,
    },
    semantics::{SemanticClassification, SemanticMap, SlotRef},
    snapshot::{ContractState, StateSnapshot},
    utility::U256W,
    Config,
};

/// The direction a slot value moved between the two snapshots.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDirection {
    /// The value grew.
    Increase,
    /// The value shrank.
    Decrease,
    /// The value is identical on both sides.
    NoChange,
    /// The value went from zero to nonzero.
    NewValue,
    /// The value went from nonzero to zero.
    RemovedValue,
}

/// The relative change rate of a slot.
///
/// A change out of a zero before-value has no defined rate; it is
/// represented explicitly rather than as a floating-point infinity so that
/// every consumer is forced to handle the case.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "rate")]
pub enum ChangeRate {
    /// Both sides are equal; the rate is zero by definition.
    NoChange,
    /// `|after - before| / before` for a nonzero before-value.
    Defined(f64),
    /// The before-value was zero and the after-value was not.
    UndefinedFromZero,
}

/// The seven-tier magnitude classification of a slot change.
///
/// # Boundary Convention
///
/// Classification is monotonic in the absolute change rate and uses
/// upper-bound-inclusive intervals: a rate exactly on a tier's upper
/// breakpoint belongs to that tier, so a rate of exactly 0.10 is `Small`
/// and anything above it is `Medium`. A change out of zero is `Extreme`
/// when the new value clears the configured materiality floor and `Small`
/// otherwise.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Magnitude {
    /// No change at all.
    None,
    /// A rate in `(0, 1%]`.
    Tiny,
    /// A rate in `(1%, 10%]`.
    Small,
    /// A rate in `(10%, 50%]`.
    Medium,
    /// A rate in `(50%, 200%]`.
    Large,
    /// A rate in `(200%, 1000%]`.
    Massive,
    /// A rate above 1000%, or a material change out of zero.
    Extreme,
}

impl Magnitude {
    /// Classifies an absolute change rate against the fixed breakpoints.
    #[must_use]
    pub fn classify(rate: f64) -> Self {
        if rate <= 0.0 {
            Self::None
        } else if rate <= MAGNITUDE_TINY_BOUND {
            Self::Tiny
        } else if rate <= MAGNITUDE_SMALL_BOUND {
            Self::Small
        } else if rate <= MAGNITUDE_MEDIUM_BOUND {
            Self::Medium
        } else if rate <= MAGNITUDE_LARGE_BOUND {
            Self::Large
        } else if rate <= MAGNITUDE_MASSIVE_BOUND {
            Self::Massive
        } else {
            Self::Extreme
        }
    }

    /// Checks whether the tier is `Massive` or `Extreme`.
    #[must_use]
    pub fn is_severe(&self) -> bool {
        matches!(self, Self::Massive | Self::Extreme)
    }
}

/// The classified change of a single storage slot.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SlotChange {
    /// The slot that changed.
    pub slot: U256W,

    /// The word stored before the transaction.
    pub value_before: U256W,

    /// The word stored after the transaction.
    pub value_after: U256W,

    /// Which way the value moved.
    pub direction: ChangeDirection,

    /// The relative change rate.
    pub change_rate: ChangeRate,

    /// The absolute unsigned delta, or [`None`] when the slot's semantics
    /// make a numeric difference meaningless (addresses, flags, roots).
    pub absolute_change: Option<U256W>,

    /// The magnitude tier of the change.
    pub magnitude: Magnitude,

    /// The resolved semantics of the slot.
    pub semantics: SemanticClassification,
}

/// The diffed state of one contract.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ContractDiff {
    /// The canonical lowercase address of the contract.
    pub address: String,

    /// Every slot that appears in either snapshot, with its classified
    /// change. Slots that did not change are retained with
    /// [`Magnitude::None`] so coverage statistics can be computed.
    pub changes: Vec<SlotChange>,

    /// The native balance before the transaction.
    pub balance_before: U256W,

    /// The native balance after the transaction.
    pub balance_after: U256W,

    /// The nonce delta across the transaction.
    pub nonce_delta: u64,
}

impl ContractDiff {
    /// Iterates over the changes that actually moved.
    pub fn moved(&self) -> impl Iterator<Item = &SlotChange> {
        self.changes
            .iter()
            .filter(|c| c.magnitude != Magnitude::None)
    }
}

/// The kind of a detected cross-contract relation.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// One contract's tracked amount fell by (almost) exactly what
    /// another's rose by.
    BalanceTransfer,
    /// Two or more contracts showed severe changes in the same run.
    ExtremeCoOccurrence,
}

/// A detected relation between the changes of two or more contracts.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CrossContractRelation {
    /// What kind of relation was detected.
    pub kind: RelationKind,

    /// The participating contracts, in address order.
    pub contracts: Vec<String>,

    /// The participating slots, when the relation is slot-level.
    pub slots: Vec<SlotRef>,

    /// How confidently the changes are causally related, in `[0, 1]`.
    pub correlation_score: f64,

    /// A human-readable description of the detected relation.
    pub evidence: String,
}

/// The aggregated diff of one analysis run.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DiffReport {
    /// Per-contract diffs, keyed by canonical lowercase address.
    pub contracts: BTreeMap<String, ContractDiff>,

    /// All detected cross-contract relations.
    pub relations: Vec<CrossContractRelation>,

    /// References to every slot whose change classified as `Extreme`.
    pub extreme_changes: Vec<SlotRef>,

    /// Free-text anomaly notes.
    pub anomalies: Vec<String>,
}

impl DiffReport {
    /// Counts the contracts in which at least one slot moved.
    #[must_use]
    pub fn contracts_changed(&self) -> usize {
        self.contracts
            .values()
            .filter(|diff| diff.moved().next().is_some())
            .count()
    }

    /// Counts the slots that moved across all contracts.
    #[must_use]
    pub fn slots_changed(&self) -> usize {
        self.contracts.values().map(|diff| diff.moved().count()).sum()
    }
}

/// Computes the full diff report between `before` and `after`.
///
/// `semantics` supplies the resolved role of every slot of interest;
/// unmapped slots classify as unknown. The calculator itself is pure: the
/// only tunables it reads are the calibration parameters on `config`.
#[must_use]
pub fn compute(
    before: &StateSnapshot,
    after: &StateSnapshot,
    semantics: &SemanticMap,
    config: &Config,
) -> DiffReport {
    let addresses: BTreeSet<&String> =
        before.contracts.keys().chain(after.contracts.keys()).collect();

    let empty = |address: &str| ContractState {
        address: address.to_owned(),
        storage: BTreeMap::new(),
        balance_wei: U256W::ZERO,
        nonce: 0,
    };

    let mut contracts = BTreeMap::new();
    let mut extreme_changes = Vec::new();
    let mut anomalies = Vec::new();

    for address in addresses {
        let before_state = before.contracts.get(address).cloned();
        let after_state = after.contracts.get(address).cloned();
        if before_state.is_none() {
            anomalies.push(format!("contract {address} appears only in the after snapshot"));
        }
        if after_state.is_none() {
            anomalies.push(format!("contract {address} appears only in the before snapshot"));
        }
        let before_state = before_state.unwrap_or_else(|| empty(address));
        let after_state = after_state.unwrap_or_else(|| empty(address));

        let diff = diff_contract(address, &before_state, &after_state, semantics, config);

        for change in &diff.changes {
            if change.magnitude == Magnitude::Extreme {
                extreme_changes.push(SlotRef::new(address.clone(), change.slot));
            }
        }
        if diff.nonce_delta > config.nonce_delta_threshold {
            anomalies.push(format!(
                "contract {address} nonce moved by {} in a single transaction (threshold {})",
                diff.nonce_delta, config.nonce_delta_threshold
            ));
        }

        contracts.insert(address.clone(), diff);
    }

    let mut relations = detect_balance_transfers(&contracts, config);
    relations.extend(detect_extreme_co_occurrence(&contracts));

    DiffReport {
        contracts,
        relations,
        extreme_changes,
        anomalies,
    }
}

/// Diffs a single contract's state across the two snapshots.
fn diff_contract(
    address: &str,
    before: &ContractState,
    after: &ContractState,
    semantics: &SemanticMap,
    config: &Config,
) -> ContractDiff {
    let slots: BTreeSet<U256W> = before
        .storage
        .keys()
        .chain(after.storage.keys())
        .copied()
        .collect();

    let changes = slots
        .into_iter()
        .map(|slot| {
            let semantic = semantics
                .get(&SlotRef::new(address, slot))
                .copied()
                .unwrap_or_else(SemanticClassification::unknown);
            classify_change(
                slot,
                before.slot_value(&slot),
                after.slot_value(&slot),
                semantic,
                config,
            )
        })
        .collect();

    ContractDiff {
        address: address.to_owned(),
        changes,
        balance_before: before.balance_wei,
        balance_after: after.balance_wei,
        nonce_delta: after.nonce.saturating_sub(before.nonce),
    }
}

/// Classifies the change of one slot.
fn classify_change(
    slot: U256W,
    value_before: U256W,
    value_after: U256W,
    semantics: SemanticClassification,
    config: &Config,
) -> SlotChange {
    let direction = if value_before == value_after {
        ChangeDirection::NoChange
    } else if value_before.is_zero() {
        ChangeDirection::NewValue
    } else if value_after.is_zero() {
        ChangeDirection::RemovedValue
    } else if value_after > value_before {
        ChangeDirection::Increase
    } else {
        ChangeDirection::Decrease
    };

    let change_rate = match direction {
        ChangeDirection::NoChange => ChangeRate::NoChange,
        ChangeDirection::NewValue => ChangeRate::UndefinedFromZero,
        _ => {
            let delta = value_after.abs_diff(&value_before).to_f64_lossy();
            ChangeRate::Defined(delta / value_before.to_f64_lossy())
        }
    };

    let magnitude = match change_rate {
        ChangeRate::NoChange => Magnitude::None,
        ChangeRate::Defined(rate) => Magnitude::classify(rate),
        ChangeRate::UndefinedFromZero => {
            // A change out of zero has no rate; materiality decides the tier.
            if value_after >= U256W::from(config.materiality_floor) {
                Magnitude::Extreme
            } else {
                Magnitude::Small
            }
        }
    };

    let absolute_change = semantics
        .semantic_type
        .numeric_diff_applicable()
        .then(|| value_after.abs_diff(&value_before));

    SlotChange {
        slot,
        value_before,
        value_after,
        direction,
        change_rate,
        absolute_change,
        magnitude,
        semantics,
    }
}

/// A slot whose numeric delta can participate in a balance-transfer match.
fn transferable(change: &SlotChange) -> Option<U256W> {
    use crate::semantics::SemanticType;

    let delta = change.absolute_change?;
    if delta.is_zero() {
        return None;
    }
    let role_ok = change.semantics.semantic_type.is_amount_like()
        || change.semantics.semantic_type == SemanticType::Unknown;
    role_ok.then_some(delta)
}

/// Searches every contract pair for a matched decrease/increase of (nearly)
/// equal size.
///
/// At most one relation is emitted per contract pair: the best-scoring slot
/// pairing across both transfer directions. The correlation score is
/// `1 - |delta_a - delta_b| / max(delta_a, delta_b)`, and a candidate only
/// qualifies when the mismatch is within the configured tolerance.
fn detect_balance_transfers(
    contracts: &BTreeMap<String, ContractDiff>,
    config: &Config,
) -> Vec<CrossContractRelation> {
    let mut relations = Vec::new();

    for (address_a, address_b) in contracts.keys().tuple_combinations() {
        let diff_a = &contracts[address_a];
        let diff_b = &contracts[address_b];

        let mut best: Option<(f64, SlotRef, SlotRef)> = None;
        for (source, sink) in [(diff_a, diff_b), (diff_b, diff_a)] {
            for out_change in source.moved().filter(|c| {
                matches!(
                    c.direction,
                    ChangeDirection::Decrease | ChangeDirection::RemovedValue
                )
            }) {
                let Some(out_delta) = transferable(out_change) else {
                    continue;
                };
                for in_change in sink.moved().filter(|c| {
                    matches!(
                        c.direction,
                        ChangeDirection::Increase | ChangeDirection::NewValue
                    )
                }) {
                    let Some(in_delta) = transferable(in_change) else {
                        continue;
                    };

                    let mismatch = out_delta.abs_diff(&in_delta).to_f64_lossy();
                    let larger = out_delta.max(in_delta).to_f64_lossy();
                    if mismatch > config.transfer_tolerance * larger {
                        continue;
                    }

                    let score = 1.0 - mismatch / larger;
                    let candidate = (
                        score,
                        SlotRef::new(source.address.clone(), out_change.slot),
                        SlotRef::new(sink.address.clone(), in_change.slot),
                    );
                    if best.as_ref().map_or(true, |(b, ..)| score > *b) {
                        best = Some(candidate);
                    }
                }
            }
        }

        if let Some((score, out_ref, in_ref)) = best {
            let evidence = format!(
                "slot {} of {} decreased while slot {} of {} increased by a matching amount",
                out_ref.slot, out_ref.contract, in_ref.slot, in_ref.contract
            );
            relations.push(CrossContractRelation {
                kind: RelationKind::BalanceTransfer,
                contracts: vec![address_a.clone(), address_b.clone()],
                slots: vec![out_ref, in_ref],
                correlation_score: score.clamp(0.0, 1.0),
                evidence,
            });
        }
    }

    relations
}

/// Detects two or more contracts showing severe changes in the same run.
///
/// Scored below any matched transfer: the score is the overlap ratio of the
/// participants' severe-change counts, capped at
/// [`crate::constant::CO_OCCURRENCE_SCORE_CAP`].
fn detect_extreme_co_occurrence(
    contracts: &BTreeMap<String, ContractDiff>,
) -> Vec<CrossContractRelation> {
    let severe: Vec<(&String, usize, Vec<SlotRef>)> = contracts
        .iter()
        .filter_map(|(address, diff)| {
            let slots: Vec<SlotRef> = diff
                .moved()
                .filter(|c| c.magnitude.is_severe())
                .map(|c| SlotRef::new(address.clone(), c.slot))
                .collect();
            (!slots.is_empty()).then(|| (address, slots.len(), slots))
        })
        .collect();

    if severe.len() < 2 {
        return Vec::new();
    }

    let min_count = severe.iter().map(|(_, count, _)| *count).min().unwrap_or(0);
    let max_count = severe.iter().map(|(_, count, _)| *count).max().unwrap_or(1);
    let overlap = min_count as f64 / max_count as f64;
    let score = (crate::constant::CO_OCCURRENCE_SCORE_CAP * overlap).clamp(0.0, 1.0);

    let participants: Vec<String> =
        severe.iter().map(|(address, ..)| (*address).clone()).collect();
    let slots: Vec<SlotRef> = severe
        .into_iter()
        .flat_map(|(_, _, slots)| slots)
        .collect();

    let evidence = format!(
        "{} contracts showed massive-or-worse changes in the same transaction: {}",
        participants.len(),
        participants.join(", ")
    );

    vec![CrossContractRelation {
        kind: RelationKind::ExtremeCoOccurrence,
        contracts: participants,
        slots,
        correlation_score: score,
        evidence,
    }]
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use super::{compute, ChangeDirection, ChangeRate, Magnitude, RelationKind};
    use crate::{
        semantics::{SemanticClassification, SemanticMap, SemanticType, SlotRef},
        snapshot::{ContractState, SnapshotMetadata, StateSnapshot},
        utility::U256W,
        Config,
    };

    const ADDR_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const ADDR_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn snapshot(contracts: Vec<ContractState>) -> StateSnapshot {
        StateSnapshot {
            metadata: SnapshotMetadata::default(),
            contracts: contracts
                .into_iter()
                .map(|c| (c.address.clone(), c))
                .collect(),
        }
    }

    fn contract(address: &str, slots: &[(u64, u64)]) -> ContractState {
        ContractState {
            address: address.into(),
            storage: slots
                .iter()
                .map(|(k, v)| (U256W::from(*k), U256W::from(*v)))
                .collect(),
            balance_wei: U256W::ZERO,
            nonce: 0,
        }
    }

    #[test]
    fn identical_snapshots_produce_a_silent_report() {
        let state = contract(ADDR_A, &[(0, 100), (1, 0)]);
        let before = snapshot(vec![state.clone()]);
        let after = snapshot(vec![state]);

        let report = compute(&before, &after, &SemanticMap::new(), &Config::default());
        assert_eq!(report.contracts_changed(), 0);
        assert_eq!(report.slots_changed(), 0);
        assert!(report.relations.is_empty());
        assert!(report.extreme_changes.is_empty());
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn zero_to_zero_is_no_change() {
        let before = snapshot(vec![contract(ADDR_A, &[(5, 0)])]);
        let after = snapshot(vec![contract(ADDR_A, &[(5, 0)])]);

        let report = compute(&before, &after, &SemanticMap::new(), &Config::default());
        let change = &report.contracts[ADDR_A].changes[0];
        assert_eq!(change.direction, ChangeDirection::NoChange);
        assert_eq!(change.magnitude, Magnitude::None);
        assert_eq!(change.change_rate, ChangeRate::NoChange);
    }

    #[test]
    fn slots_missing_from_one_side_read_as_zero() {
        let before = snapshot(vec![contract(ADDR_A, &[(0, 7)])]);
        let after = snapshot(vec![contract(ADDR_A, &[(1, 9)])]);

        let report = compute(&before, &after, &SemanticMap::new(), &Config::default());
        let changes = &report.contracts[ADDR_A].changes;
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].direction, ChangeDirection::RemovedValue);
        assert_eq!(changes[1].direction, ChangeDirection::NewValue);
        assert_eq!(changes[1].change_rate, ChangeRate::UndefinedFromZero);
    }

    #[test]
    fn magnitude_boundaries_follow_the_documented_convention() {
        assert_eq!(Magnitude::classify(0.0), Magnitude::None);
        assert_eq!(Magnitude::classify(0.01), Magnitude::Tiny);
        assert_eq!(Magnitude::classify(0.0100001), Magnitude::Small);
        assert_eq!(Magnitude::classify(0.10), Magnitude::Small);
        assert_eq!(Magnitude::classify(0.100001), Magnitude::Medium);
        assert_eq!(Magnitude::classify(0.50), Magnitude::Medium);
        assert_eq!(Magnitude::classify(2.0), Magnitude::Large);
        assert_eq!(Magnitude::classify(10.0), Magnitude::Massive);
        assert_eq!(Magnitude::classify(10.01), Magnitude::Extreme);
    }

    #[test]
    fn magnitude_is_monotonic_in_the_rate() {
        let rates = [0.0, 0.005, 0.01, 0.05, 0.1, 0.3, 0.5, 1.0, 2.0, 5.0, 10.0, 50.0];
        let tiers: Vec<Magnitude> = rates.iter().map(|r| Magnitude::classify(*r)).collect();
        assert!(tiers.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn numeric_diff_is_withheld_for_address_slots() {
        let mut semantics = SemanticMap::new();
        semantics.insert(
            SlotRef::new(ADDR_A, 0u64),
            SemanticClassification::new(SemanticType::Owner, 0.95),
        );

        let before = snapshot(vec![contract(ADDR_A, &[(0, 1111)])]);
        let after = snapshot(vec![contract(ADDR_A, &[(0, 2222)])]);

        let report = compute(&before, &after, &semantics, &Config::default());
        let change = &report.contracts[ADDR_A].changes[0];
        assert_eq!(change.absolute_change, None);
        assert_ne!(change.magnitude, Magnitude::None);
    }

    #[test]
    fn matched_transfer_scores_a_perfect_correlation() {
        let mut semantics = SemanticMap::new();
        for address in [ADDR_A, ADDR_B] {
            semantics.insert(
                SlotRef::new(address, 0u64),
                SemanticClassification::new(SemanticType::TokenAmount, 0.8),
            );
        }

        let before = snapshot(vec![
            contract(ADDR_A, &[(0, 5000)]),
            contract(ADDR_B, &[(0, 1000)]),
        ]);
        let after = snapshot(vec![
            contract(ADDR_A, &[(0, 4000)]),
            contract(ADDR_B, &[(0, 2000)]),
        ]);

        let report = compute(&before, &after, &semantics, &Config::default());
        let transfers: Vec<_> = report
            .relations
            .iter()
            .filter(|r| r.kind == RelationKind::BalanceTransfer)
            .collect();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].correlation_score, 1.0);
        assert_eq!(transfers[0].contracts, vec![ADDR_A.to_owned(), ADDR_B.to_owned()]);
    }

    #[test]
    fn mismatched_deltas_beyond_tolerance_do_not_relate() {
        let before = snapshot(vec![
            contract(ADDR_A, &[(0, 5000)]),
            contract(ADDR_B, &[(0, 1000)]),
        ]);
        let after = snapshot(vec![
            contract(ADDR_A, &[(0, 4000)]),
            contract(ADDR_B, &[(0, 1500)]),
        ]);

        let report = compute(&before, &after, &SemanticMap::new(), &Config::default());
        assert!(report
            .relations
            .iter()
            .all(|r| r.kind != RelationKind::BalanceTransfer));
    }

    #[test]
    fn co_occurring_extreme_changes_relate_below_the_cap() {
        // Both contracts 100x a slot.
        let before = snapshot(vec![
            contract(ADDR_A, &[(0, 10)]),
            contract(ADDR_B, &[(0, 10)]),
        ]);
        let after = snapshot(vec![
            contract(ADDR_A, &[(0, 1000)]),
            contract(ADDR_B, &[(0, 1000)]),
        ]);

        let report = compute(&before, &after, &SemanticMap::new(), &Config::default());
        let relation = report
            .relations
            .iter()
            .find(|r| r.kind == RelationKind::ExtremeCoOccurrence)
            .unwrap();
        assert_eq!(relation.contracts.len(), 2);
        assert!(relation.correlation_score <= crate::constant::CO_OCCURRENCE_SCORE_CAP);
        assert!(relation.correlation_score > 0.0);
    }

    #[test]
    fn runaway_nonce_deltas_are_noted() {
        let mut before_state = contract(ADDR_A, &[]);
        before_state.nonce = 1;
        let mut after_state = contract(ADDR_A, &[]);
        after_state.nonce = 26;

        let report = compute(
            &snapshot(vec![before_state]),
            &snapshot(vec![after_state]),
            &SemanticMap::new(),
            &Config::default(),
        );
        assert_eq!(report.contracts[ADDR_A].nonce_delta, 25);
        assert!(report.anomalies.iter().any(|a| a.contains("nonce")));
    }
}
