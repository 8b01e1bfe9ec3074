//! This module contains the static invariant template library.
//!
//! Templates are read-only reference data shared across runs. Each one
//! names the semantic roles it needs; the generator only instantiates a
//! template once every role has resolved to a concrete (contract, slot)
//! pair, so no partially-filled formula can ever escape.
//!
//! Formula placeholders use `{role}` syntax, plus the reserved
//! `{threshold}` placeholder filled from the template's own threshold.

use crate::{invariant::InvariantCategory, patterns::Severity, protocol::ProtocolType, semantics::SemanticType};

/// A static, protocol-specific invariant skeleton.
pub struct InvariantTemplate {
    /// The template's stable name, used as the invariant type of everything
    /// instantiated from it.
    pub name: &'static str,

    /// The category the instantiated invariant belongs to.
    pub category: InvariantCategory,

    /// A human-readable statement of the protected property.
    pub description: &'static str,

    /// The formula skeleton with `{role}` placeholders.
    pub formula: &'static str,

    /// The semantic roles that must resolve, as `(placeholder, role)`.
    pub required_roles: &'static [(&'static str, SemanticType)],

    /// The numeric threshold substituted for `{threshold}`.
    pub threshold: f64,

    /// The severity of a violation.
    pub severity: Severity,
}

/// Selects the template subset for `protocol`.
///
/// An unknown protocol selects nothing; the generator can still emit
/// pattern-driven defensive invariants.
#[must_use]
pub fn templates_for(protocol: ProtocolType) -> &'static [InvariantTemplate] {
    match protocol {
        ProtocolType::Vault => VAULT_TEMPLATES,
        ProtocolType::Amm => AMM_TEMPLATES,
        ProtocolType::Lending => LENDING_TEMPLATES,
        ProtocolType::Staking => STAKING_TEMPLATES,
        ProtocolType::Bridge => BRIDGE_TEMPLATES,
        ProtocolType::NftMarketplace => NFT_MARKETPLACE_TEMPLATES,
        ProtocolType::Governance => GOVERNANCE_TEMPLATES,
        ProtocolType::Erc20 => ERC20_TEMPLATES,
        ProtocolType::Unknown => &[],
    }
}

static VAULT_TEMPLATES: &[InvariantTemplate] = &[
    InvariantTemplate {
        name: "share_price_stability",
        category: InvariantCategory::PriceStability,
        description: "The vault share price must not move more than the threshold within one transaction.",
        formula: "abs(delta({total_supply})) / prev({total_supply}) <= {threshold}",
        required_roles: &[("total_supply", SemanticType::TotalSupply)],
        threshold: 0.05,
        severity: Severity::High,
    },
    InvariantTemplate {
        name: "vault_asset_share_consistency",
        category: InvariantCategory::SupplyIntegrity,
        description: "Vault assets and shares must move together; their ratio drift is bounded.",
        formula: "abs(delta({total_assets} / {total_supply})) / prev({total_assets} / {total_supply}) <= {threshold}",
        required_roles: &[
            ("total_assets", SemanticType::TotalAssets),
            ("total_supply", SemanticType::TotalSupply),
        ],
        threshold: 0.05,
        severity: Severity::Critical,
    },
];

static AMM_TEMPLATES: &[InvariantTemplate] = &[
    InvariantTemplate {
        name: "constant_product_bound",
        category: InvariantCategory::LiquidityConsistency,
        description: "The reserve product of a constant-product pool must not fall within one transaction.",
        formula: "({reserve0} * {reserve1}) >= prev({reserve0} * {reserve1}) * (1 - {threshold})",
        required_roles: &[
            ("reserve0", SemanticType::Reserve0),
            ("reserve1", SemanticType::Reserve1),
        ],
        threshold: 0.003,
        severity: Severity::Critical,
    },
    InvariantTemplate {
        name: "reserve_ratio_stability",
        category: InvariantCategory::PriceStability,
        description: "The pool's spot price (reserve ratio) must not move more than the threshold per transaction.",
        formula: "abs(delta({reserve0} / {reserve1})) / prev({reserve0} / {reserve1}) <= {threshold}",
        required_roles: &[
            ("reserve0", SemanticType::Reserve0),
            ("reserve1", SemanticType::Reserve1),
        ],
        threshold: 0.10,
        severity: Severity::High,
    },
];

static LENDING_TEMPLATES: &[InvariantTemplate] = &[
    InvariantTemplate {
        name: "borrow_growth_bound",
        category: InvariantCategory::SupplyIntegrity,
        description: "Total borrows must not jump more than the threshold within one transaction.",
        formula: "abs(delta({total_borrows})) / prev({total_borrows}) <= {threshold}",
        required_roles: &[("total_borrows", SemanticType::TotalBorrows)],
        threshold: 0.25,
        severity: Severity::High,
    },
    InvariantTemplate {
        name: "collateral_factor_immutable",
        category: InvariantCategory::AccessControl,
        description: "The collateral factor must not change outside governance actions.",
        formula: "delta({collateral_factor}) == 0",
        required_roles: &[("collateral_factor", SemanticType::CollateralFactor)],
        threshold: 0.0,
        severity: Severity::Critical,
    },
];

static STAKING_TEMPLATES: &[InvariantTemplate] = &[
    InvariantTemplate {
        name: "staked_total_consistency",
        category: InvariantCategory::SupplyIntegrity,
        description: "The total staked principal must not move more than the threshold per transaction.",
        formula: "abs(delta({total_staked})) / prev({total_staked}) <= {threshold}",
        required_roles: &[("total_staked", SemanticType::TotalStaked)],
        threshold: 0.20,
        severity: Severity::High,
    },
    InvariantTemplate {
        name: "reward_rate_bound",
        category: InvariantCategory::AccessControl,
        description: "The reward emission rate must not change outside an explicit notification.",
        formula: "delta({reward_rate}) == 0",
        required_roles: &[("reward_rate", SemanticType::RewardRate)],
        threshold: 0.0,
        severity: Severity::Medium,
    },
];

static BRIDGE_TEMPLATES: &[InvariantTemplate] = &[
    InvariantTemplate {
        name: "commitment_root_stability",
        category: InvariantCategory::AccessControl,
        description: "The bridge commitment root must only advance through the relay path.",
        formula: "delta({merkle_root}) == 0",
        required_roles: &[("merkle_root", SemanticType::MerkleRoot)],
        threshold: 0.0,
        severity: Severity::Critical,
    },
    InvariantTemplate {
        name: "locked_value_conservation",
        category: InvariantCategory::SupplyIntegrity,
        description: "Locked bridge value must not fall more than the threshold per transaction.",
        formula: "delta({balances}) >= -prev({balances}) * {threshold}",
        required_roles: &[("balances", SemanticType::BalanceMapping)],
        threshold: 0.10,
        severity: Severity::Critical,
    },
];

static NFT_MARKETPLACE_TEMPLATES: &[InvariantTemplate] = &[
    InvariantTemplate {
        name: "fee_rate_bound",
        category: InvariantCategory::AccessControl,
        description: "The marketplace fee rate must not change outside governance actions.",
        formula: "delta({fee_rate}) == 0",
        required_roles: &[("fee_rate", SemanticType::FeeRate)],
        threshold: 0.0,
        severity: Severity::High,
    },
    InvariantTemplate {
        name: "treasury_address_stability",
        category: InvariantCategory::AccessControl,
        description: "The fee recipient address must not change within a trade.",
        formula: "delta({treasury}) == 0",
        required_roles: &[("treasury", SemanticType::Treasury)],
        threshold: 0.0,
        severity: Severity::Critical,
    },
];

static GOVERNANCE_TEMPLATES: &[InvariantTemplate] = &[
    InvariantTemplate {
        name: "proposal_count_monotonic",
        category: InvariantCategory::SupplyIntegrity,
        description: "The proposal counter must never decrease.",
        formula: "delta({proposal_count}) >= 0",
        required_roles: &[("proposal_count", SemanticType::ProposalCount)],
        threshold: 0.0,
        severity: Severity::Medium,
    },
    InvariantTemplate {
        name: "quorum_stability",
        category: InvariantCategory::AccessControl,
        description: "The quorum threshold must not change outside a governance action.",
        formula: "delta({quorum_votes}) == 0",
        required_roles: &[("quorum_votes", SemanticType::QuorumVotes)],
        threshold: 0.0,
        severity: Severity::High,
    },
];

static ERC20_TEMPLATES: &[InvariantTemplate] = &[
    InvariantTemplate {
        name: "total_supply_change_bound",
        category: InvariantCategory::SupplyIntegrity,
        description: "Token supply must not move more than the threshold within one transaction.",
        formula: "abs(delta({total_supply})) / prev({total_supply}) <= {threshold}",
        required_roles: &[("total_supply", SemanticType::TotalSupply)],
        threshold: 0.10,
        severity: Severity::High,
    },
    InvariantTemplate {
        name: "owner_address_stability",
        category: InvariantCategory::AccessControl,
        description: "The token owner must not change within a transfer transaction.",
        formula: "delta({owner}) == 0",
        required_roles: &[("owner", SemanticType::Owner)],
        threshold: 0.0,
        severity: Severity::Critical,
    },
];

#[cfg(test)]
mod test {
    use super::templates_for;
    use crate::protocol::ProtocolType;

    #[test]
    fn every_concrete_protocol_has_templates() {
        for protocol in [
            ProtocolType::Vault,
            ProtocolType::Amm,
            ProtocolType::Lending,
            ProtocolType::Staking,
            ProtocolType::Bridge,
            ProtocolType::NftMarketplace,
            ProtocolType::Governance,
            ProtocolType::Erc20,
        ] {
            assert!(!templates_for(protocol).is_empty());
        }
        assert!(templates_for(ProtocolType::Unknown).is_empty());
    }

    #[test]
    fn every_placeholder_in_a_formula_is_declared() {
        for protocol in [
            ProtocolType::Vault,
            ProtocolType::Amm,
            ProtocolType::Lending,
            ProtocolType::Staking,
            ProtocolType::Bridge,
            ProtocolType::NftMarketplace,
            ProtocolType::Governance,
            ProtocolType::Erc20,
        ] {
            for template in templates_for(protocol) {
                let mut formula = template.formula.to_owned();
                for (placeholder, _) in template.required_roles {
                    formula = formula.replace(&format!("{{{placeholder}}}"), "x");
                }
                formula = formula.replace("{threshold}", "x");
                assert!(
                    !formula.contains('{'),
                    "undeclared placeholder in `{}`",
                    template.name
                );
            }
        }
    }
}
