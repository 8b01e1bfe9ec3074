//! This module contains the slot semantic mapper, which assigns a business
//! meaning to a storage slot from a candidate variable name and/or its raw
//! value.
//!
//! Classification is a pure function and never fails: input that resolves to
//! nothing yields [`SemanticType::Unknown`] with a confidence of zero, which
//! downstream consumers treat as an ordinary, inspectable result.
//!
//! # How it Works
//!
//! Name evidence is evaluated against five priority tiers of rules, from
//! tier 5 (exact, case-sensitive Solidity variable names) down to tier 1
//! (generic keyword heuristics). The first match at the highest matching
//! tier wins; ties within a tier are broken by the fixed declaration order
//! of the rule table. When no name is available the mapper falls back to
//! value-shape heuristics, and a handful of well-known slot keys (the
//! ERC-1967 proxy slots) are recognised ahead of everything else because
//! their meaning is fixed by standard rather than by naming convention.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    constant::{ERC1967_ADMIN_SLOT, ERC1967_IMPLEMENTATION_SLOT},
    utility::U256W,
};

/// A reference to one storage slot of one contract.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct SlotRef {
    /// The canonical lowercase address of the contract.
    pub contract: String,

    /// The slot index within the contract's storage.
    pub slot: U256W,
}

impl SlotRef {
    /// Creates a reference to `slot` of the contract at `contract`.
    pub fn new(contract: impl Into<String>, slot: impl Into<U256W>) -> Self {
        Self {
            contract: contract.into(),
            slot: slot.into(),
        }
    }
}

/// The resolved semantics of every slot of interest in one analysis run.
pub type SemanticMap = BTreeMap<SlotRef, SemanticClassification>;

/// The closed set of business roles a storage slot can be classified as.
///
/// The set is deliberately closed: every consumer matches exhaustively, and
/// anything the mapper cannot place lands in [`Self::Unknown`] rather than
/// in an unrecognised-string state.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    /// The total supply of a token or of vault shares.
    TotalSupply,
    /// The total assets under management of a vault.
    TotalAssets,
    /// The total share count of a share-based pool.
    TotalShares,
    /// The total outstanding borrows of a lending market.
    TotalBorrows,
    /// The total principal staked in a staking contract.
    TotalStaked,
    /// A per-holder balance mapping base slot.
    BalanceMapping,
    /// A per-(owner, spender) allowance mapping base slot.
    AllowanceMapping,
    /// The contract owner.
    Owner,
    /// A privileged admin distinct from the owner.
    Admin,
    /// A two-step ownership transfer in flight.
    PendingOwner,
    /// The paused flag of a pausable contract.
    Paused,
    /// A reentrancy guard status word.
    ReentrancyLock,
    /// The implementation address behind a proxy.
    Implementation,
    /// The admin address of a proxy.
    ProxyAdmin,
    /// The first reserve of a two-token pool.
    Reserve0,
    /// The second reserve of a two-token pool.
    Reserve1,
    /// A cumulative price accumulator.
    PriceCumulative,
    /// The cached product of reserves in a constant-product pool.
    KLast,
    /// An exchange rate or share price.
    ExchangeRate,
    /// A fee rate expressed in basis points or ray units.
    FeeRate,
    /// Accumulated protocol fee balance.
    ProtocolFees,
    /// The treasury or fee-recipient address.
    Treasury,
    /// A per-second or per-block reward emission rate.
    RewardRate,
    /// The accumulated reward-per-token checkpoint.
    RewardPerToken,
    /// The collateral factor of a lending market.
    CollateralFactor,
    /// The last accrual or update timestamp.
    LastUpdateTime,
    /// A Merkle distribution or bridge commitment root.
    MerkleRoot,
    /// The proposal counter of a governor.
    ProposalCount,
    /// The quorum threshold of a governor.
    QuorumVotes,
    /// A slot holding some contract or account address.
    AddressReference,
    /// A slot holding a boolean flag.
    BooleanFlag,
    /// A generic token or wei amount.
    TokenAmount,
    /// A timestamp-valued slot.
    Timestamp,
    /// A length counter for an array or set.
    ArrayLength,
    /// No meaning could be resolved.
    Unknown,
}

impl SemanticType {
    /// Checks whether a numeric before/after delta is meaningful for this
    /// role.
    ///
    /// Addresses, flags and roots change identity, not quantity; reporting
    /// an arithmetic difference for them would be misleading.
    #[must_use]
    pub fn numeric_diff_applicable(&self) -> bool {
        !matches!(
            self,
            Self::Owner
                | Self::Admin
                | Self::PendingOwner
                | Self::Paused
                | Self::ReentrancyLock
                | Self::Implementation
                | Self::ProxyAdmin
                | Self::Treasury
                | Self::AddressReference
                | Self::BooleanFlag
                | Self::MerkleRoot
        )
    }

    /// Checks whether the role denotes a transferable quantity, i.e. one
    /// that can plausibly participate in a cross-contract balance transfer.
    #[must_use]
    pub fn is_amount_like(&self) -> bool {
        matches!(
            self,
            Self::TotalSupply
                | Self::TotalAssets
                | Self::TotalShares
                | Self::TotalBorrows
                | Self::TotalStaked
                | Self::BalanceMapping
                | Self::Reserve0
                | Self::Reserve1
                | Self::ProtocolFees
                | Self::TokenAmount
        )
    }

    /// Checks whether the role is expected to only ever grow under normal
    /// operation.
    #[must_use]
    pub fn is_monotonic(&self) -> bool {
        matches!(self, Self::PriceCumulative | Self::ProposalCount)
    }

    /// Checks whether the role participates in pricing.
    #[must_use]
    pub fn is_price_related(&self) -> bool {
        matches!(
            self,
            Self::Reserve0
                | Self::Reserve1
                | Self::PriceCumulative
                | Self::KLast
                | Self::ExchangeRate
        )
    }

    /// Checks whether the role confers privileged control.
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        matches!(
            self,
            Self::Owner | Self::Admin | Self::PendingOwner | Self::Implementation | Self::ProxyAdmin
        )
    }
}

/// The outcome of classifying one (contract, slot) pair.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct SemanticClassification {
    /// The resolved role.
    pub semantic_type: SemanticType,

    /// How certain the mapper is of the role, in `[0, 1]`.
    pub confidence: f64,
}

impl SemanticClassification {
    /// Creates a classification, clamping `confidence` into `[0, 1]`.
    #[must_use]
    pub fn new(semantic_type: SemanticType, confidence: f64) -> Self {
        Self {
            semantic_type,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// The give-up result: no meaning, no confidence.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(SemanticType::Unknown, 0.0)
    }
}

/// How a rule's pattern is matched against a candidate name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Match {
    /// The name must equal the pattern exactly.
    Exact,
    /// The name must equal the pattern ignoring case and leading/trailing
    /// underscores.
    Loose,
    /// The lowercased name must contain the pattern.
    Contains,
}

/// One name-classification rule.
struct Rule {
    tier: u8,
    kind: Match,
    pattern: &'static str,
    semantic: SemanticType,
    confidence: f64,
}

const fn rule(
    tier: u8,
    kind: Match,
    pattern: &'static str,
    semantic: SemanticType,
    confidence: f64,
) -> Rule {
    Rule {
        tier,
        kind,
        pattern,
        semantic,
        confidence,
    }
}

/// The fixed rule table.
///
/// Order within a tier is significant: it is the tie-break between rules of
/// equal priority.
#[rustfmt::skip]
static RULES: &[Rule] = &[
    // Tier 5: exact Solidity variable names as they appear in the wild.
    rule(5, Match::Exact, "totalSupply",             SemanticType::TotalSupply,     0.95),
    rule(5, Match::Exact, "totalAssets",             SemanticType::TotalAssets,     0.95),
    rule(5, Match::Exact, "totalShares",             SemanticType::TotalShares,     0.95),
    rule(5, Match::Exact, "totalBorrows",            SemanticType::TotalBorrows,    0.95),
    rule(5, Match::Exact, "totalStaked",             SemanticType::TotalStaked,     0.95),
    rule(5, Match::Exact, "balanceOf",               SemanticType::BalanceMapping,  0.95),
    rule(5, Match::Exact, "balances",                SemanticType::BalanceMapping,  0.95),
    rule(5, Match::Exact, "allowance",               SemanticType::AllowanceMapping, 0.95),
    rule(5, Match::Exact, "allowances",              SemanticType::AllowanceMapping, 0.95),
    rule(5, Match::Exact, "owner",                   SemanticType::Owner,           0.95),
    rule(5, Match::Exact, "admin",                   SemanticType::Admin,           0.95),
    rule(5, Match::Exact, "pendingOwner",            SemanticType::PendingOwner,    0.95),
    rule(5, Match::Exact, "paused",                  SemanticType::Paused,          0.95),
    rule(5, Match::Exact, "reserve0",                SemanticType::Reserve0,        0.95),
    rule(5, Match::Exact, "reserve1",                SemanticType::Reserve1,        0.95),
    rule(5, Match::Exact, "price0CumulativeLast",    SemanticType::PriceCumulative, 0.95),
    rule(5, Match::Exact, "price1CumulativeLast",    SemanticType::PriceCumulative, 0.95),
    rule(5, Match::Exact, "kLast",                   SemanticType::KLast,           0.95),
    rule(5, Match::Exact, "exchangeRate",            SemanticType::ExchangeRate,    0.95),
    rule(5, Match::Exact, "rewardRate",              SemanticType::RewardRate,      0.95),
    rule(5, Match::Exact, "rewardPerTokenStored",    SemanticType::RewardPerToken,  0.95),
    rule(5, Match::Exact, "lastUpdateTime",          SemanticType::LastUpdateTime,  0.95),
    rule(5, Match::Exact, "merkleRoot",              SemanticType::MerkleRoot,      0.95),
    rule(5, Match::Exact, "proposalCount",           SemanticType::ProposalCount,   0.95),
    rule(5, Match::Exact, "quorumVotes",             SemanticType::QuorumVotes,     0.95),
    rule(5, Match::Exact, "implementation",          SemanticType::Implementation,  0.95),
    rule(5, Match::Exact, "treasury",                SemanticType::Treasury,        0.95),

    // Tier 4: the same names up to casing and underscore decoration, plus
    // well-known library aliases.
    rule(4, Match::Loose, "totalsupply",             SemanticType::TotalSupply,     0.85),
    rule(4, Match::Loose, "totalassets",             SemanticType::TotalAssets,     0.85),
    rule(4, Match::Loose, "totalborrows",            SemanticType::TotalBorrows,    0.85),
    rule(4, Match::Loose, "totalstaked",             SemanticType::TotalStaked,     0.85),
    rule(4, Match::Loose, "balances",                SemanticType::BalanceMapping,  0.85),
    rule(4, Match::Loose, "allowances",              SemanticType::AllowanceMapping, 0.85),
    rule(4, Match::Loose, "owner",                   SemanticType::Owner,           0.85),
    rule(4, Match::Loose, "admin",                   SemanticType::Admin,           0.85),
    rule(4, Match::Loose, "status",                  SemanticType::ReentrancyLock,  0.75),
    rule(4, Match::Loose, "locked",                  SemanticType::ReentrancyLock,  0.75),
    rule(4, Match::Loose, "notentered",              SemanticType::ReentrancyLock,  0.75),
    rule(4, Match::Loose, "collateralfactor",        SemanticType::CollateralFactor, 0.85),
    rule(4, Match::Loose, "protocolfees",            SemanticType::ProtocolFees,    0.85),
    rule(4, Match::Loose, "feeto",                   SemanticType::Treasury,        0.80),

    // Tier 3: strong substrings that almost always mean what they say.
    rule(3, Match::Contains, "totalsupply",          SemanticType::TotalSupply,     0.70),
    rule(3, Match::Contains, "reserve0",             SemanticType::Reserve0,        0.70),
    rule(3, Match::Contains, "reserve1",             SemanticType::Reserve1,        0.70),
    rule(3, Match::Contains, "allowance",            SemanticType::AllowanceMapping, 0.65),
    rule(3, Match::Contains, "balance",              SemanticType::BalanceMapping,  0.60),
    rule(3, Match::Contains, "borrow",               SemanticType::TotalBorrows,    0.60),
    rule(3, Match::Contains, "stake",                SemanticType::TotalStaked,     0.60),
    rule(3, Match::Contains, "share",                SemanticType::TotalShares,     0.60),
    rule(3, Match::Contains, "implementation",       SemanticType::Implementation,  0.70),
    rule(3, Match::Contains, "exchangerate",         SemanticType::ExchangeRate,    0.70),
    rule(3, Match::Contains, "merkle",               SemanticType::MerkleRoot,      0.65),
    rule(3, Match::Contains, "proposal",             SemanticType::ProposalCount,   0.60),

    // Tier 2: weaker keywords with a plausible but not certain meaning.
    rule(2, Match::Contains, "owner",                SemanticType::Owner,           0.50),
    rule(2, Match::Contains, "admin",                SemanticType::Admin,           0.50),
    rule(2, Match::Contains, "paus",                 SemanticType::Paused,          0.50),
    rule(2, Match::Contains, "reward",               SemanticType::RewardRate,      0.45),
    rule(2, Match::Contains, "fee",                  SemanticType::FeeRate,         0.45),
    rule(2, Match::Contains, "price",                SemanticType::ExchangeRate,    0.45),
    rule(2, Match::Contains, "debt",                 SemanticType::TotalBorrows,    0.45),
    rule(2, Match::Contains, "quorum",               SemanticType::QuorumVotes,     0.45),
    rule(2, Match::Contains, "treasury",             SemanticType::Treasury,        0.45),
    rule(2, Match::Contains, "supply",               SemanticType::TotalSupply,     0.40),

    // Tier 1: generic fallbacks.
    rule(1, Match::Contains, "timestamp",            SemanticType::Timestamp,       0.35),
    rule(1, Match::Contains, "time",                 SemanticType::Timestamp,       0.30),
    rule(1, Match::Contains, "deadline",             SemanticType::Timestamp,       0.30),
    rule(1, Match::Contains, "count",                SemanticType::ArrayLength,     0.30),
    rule(1, Match::Contains, "length",               SemanticType::ArrayLength,     0.30),
    rule(1, Match::Contains, "address",              SemanticType::AddressReference, 0.30),
    rule(1, Match::Contains, "addr",                 SemanticType::AddressReference, 0.25),
    rule(1, Match::Contains, "amount",               SemanticType::TokenAmount,     0.30),
    rule(1, Match::Contains, "total",                SemanticType::TokenAmount,     0.25),
];

/// Classifies the business meaning of one storage slot.
///
/// `name` is the candidate variable name when one is known; `value` is the
/// raw word currently stored at the slot, used for shape heuristics when no
/// name resolves anything.
///
/// This function is pure and total: it never fails, and unresolvable input
/// yields [`SemanticClassification::unknown`].
#[must_use]
pub fn classify_slot(
    slot: &U256W,
    name: Option<&str>,
    value: &U256W,
) -> SemanticClassification {
    // Slots fixed by standard outrank any naming or value evidence.
    if let Some(well_known) = classify_well_known_slot(slot) {
        return well_known;
    }

    if let Some(name) = name {
        if let Some(by_name) = classify_name(name) {
            return by_name;
        }
    }

    classify_value_shape(value).unwrap_or_else(SemanticClassification::unknown)
}

/// Classifies a candidate variable name against the rule table, highest
/// tier first.
#[must_use]
pub fn classify_name(name: &str) -> Option<SemanticClassification> {
    let lower = name.to_ascii_lowercase();
    let loose = lower.trim_matches('_');

    for tier in (1..=5u8).rev() {
        for rule in RULES.iter().filter(|r| r.tier == tier) {
            let hit = match rule.kind {
                Match::Exact => name == rule.pattern,
                Match::Loose => loose == rule.pattern,
                Match::Contains => lower.contains(rule.pattern),
            };
            if hit {
                return Some(SemanticClassification::new(rule.semantic, rule.confidence));
            }
        }
    }

    None
}

/// Classifies a raw stored word from its shape alone.
fn classify_value_shape(value: &U256W) -> Option<SemanticClassification> {
    if value.is_zero() {
        return None;
    }

    if value.has_address_shape() {
        return Some(SemanticClassification::new(
            SemanticType::AddressReference,
            0.40,
        ));
    }

    let as_u256 = value.0;
    if as_u256 == ethnum::U256::ONE {
        return Some(SemanticClassification::new(SemanticType::BooleanFlag, 0.30));
    }

    // Plausible unix timestamps: mid-2015 through mid-2033.
    if as_u256 >= ethnum::U256::from(1_430_000_000u64)
        && as_u256 < ethnum::U256::from(2_000_000_000u64)
    {
        return Some(SemanticClassification::new(SemanticType::Timestamp, 0.35));
    }

    // Large values divisible by 10^18 read like whole-token amounts.
    let token_unit = ethnum::U256::from(10u128.pow(18));
    if as_u256 >= token_unit && as_u256 % token_unit == ethnum::U256::ZERO {
        return Some(SemanticClassification::new(SemanticType::TokenAmount, 0.30));
    }

    None
}

/// Recognises slot keys whose meaning is fixed by standard.
fn classify_well_known_slot(slot: &U256W) -> Option<SemanticClassification> {
    let implementation = U256W::parse(ERC1967_IMPLEMENTATION_SLOT)?;
    let admin = U256W::parse(ERC1967_ADMIN_SLOT)?;

    if *slot == implementation {
        Some(SemanticClassification::new(SemanticType::Implementation, 0.90))
    } else if *slot == admin {
        Some(SemanticClassification::new(SemanticType::ProxyAdmin, 0.90))
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::{classify_name, classify_slot, SemanticType};
    use crate::{constant::ERC1967_IMPLEMENTATION_SLOT, utility::U256W};

    #[test]
    fn exact_names_win_at_full_tier_confidence() {
        let result = classify_name("totalSupply").unwrap();
        assert_eq!(result.semantic_type, SemanticType::TotalSupply);
        assert_eq!(result.confidence, 0.95);
    }

    #[test]
    fn higher_tiers_shadow_lower_tiers() {
        // "owner" matches tier 5 exactly, tier 4 loosely and tier 2 as a
        // substring; the exact rule must win.
        let exact = classify_name("owner").unwrap();
        assert_eq!(exact.confidence, 0.95);

        // "_owner" misses tier 5 but hits the loose tier-4 rule.
        let decorated = classify_name("_owner").unwrap();
        assert_eq!(decorated.semantic_type, SemanticType::Owner);
        assert_eq!(decorated.confidence, 0.85);

        // "vaultOwnerAccount" only hits the tier-2 substring rule.
        let weak = classify_name("vaultOwnerAccount").unwrap();
        assert_eq!(weak.semantic_type, SemanticType::Owner);
        assert_eq!(weak.confidence, 0.50);
    }

    #[test]
    fn declaration_order_breaks_ties_within_a_tier() {
        // "stakedShareBalance" contains the tier-3 substrings "balance",
        // "stake" and "share"; "balance" is declared first in the table, so
        // it wins the tie.
        let result = classify_name("stakedShareBalance").unwrap();
        assert_eq!(result.semantic_type, SemanticType::BalanceMapping);
    }

    #[test]
    fn unknown_input_gives_up_gracefully() {
        let result = classify_slot(&U256W::from(7u64), None, &U256W::ZERO);
        assert_eq!(result.semantic_type, SemanticType::Unknown);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn value_shape_fallback_recognises_addresses() {
        let value =
            U256W::parse("0x000000000000000000000000dac17f958d2ee523a2206206994597c13d831ec7")
                .unwrap();
        let result = classify_slot(&U256W::from(12u64), None, &value);
        assert_eq!(result.semantic_type, SemanticType::AddressReference);
    }

    #[test]
    fn erc1967_slots_outrank_naming_evidence() {
        let slot = U256W::parse(ERC1967_IMPLEMENTATION_SLOT).unwrap();
        let result = classify_slot(&slot, Some("balances"), &U256W::ZERO);
        assert_eq!(result.semantic_type, SemanticType::Implementation);
        assert_eq!(result.confidence, 0.90);
    }

    #[test]
    fn all_confidences_lie_in_unit_interval() {
        for rule in super::RULES {
            assert!((0.0..=1.0).contains(&rule.confidence));
        }
    }
}
