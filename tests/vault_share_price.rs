//! This module tests that a vault whose total supply moves is classified
//! as a vault and receives a `share_price_stability` invariant referencing
//! the supply slot.
#![cfg(test)]

use std::collections::BTreeMap;

use storage_invariant_extractor::{
    evidence::{ContractInterface, EvidenceBundle, NameEvidence},
    invariant::InvariantCategory,
    layout::DeclaredVariable,
    protocol::ProtocolType,
    semantics::SlotRef,
    AnalysisInput,
    Engine,
};

mod common;

const VAULT: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

const SUPPLY_BEFORE: u128 = 1_000_000_000_000_000_000_000_000; // 1,000,000e18
const SUPPLY_AFTER: u128 = 1_500_000_000_000_000_000_000_000; // 1,500,000e18

#[test]
fn vault_supply_growth_emits_share_price_stability() -> anyhow::Result<()> {
    let evidence = EvidenceBundle::new()
        .with_names([NameEvidence {
            address: VAULT.into(),
            name: "Yield Vault".into(),
            ..NameEvidence::default()
        }])
        .with_interfaces([ContractInterface {
            address: VAULT.into(),
            functions: vec![
                "deposit".into(),
                "withdraw".into(),
                "redeem".into(),
                "totalAssets".into(),
            ],
            events: vec!["Deposit".into(), "Withdraw".into()],
        }]);

    let input = AnalysisInput {
        project: "vault-exploit".into(),
        before: common::snapshot(&[(VAULT, &[(0, SUPPLY_BEFORE)], 0, 1)])?,
        after: common::snapshot(&[(VAULT, &[(0, SUPPLY_AFTER)], 0, 1)])?,
        evidence,
        layouts: BTreeMap::from([(
            VAULT.to_owned(),
            vec![DeclaredVariable::value("totalSupply", 32)],
        )]),
    };

    let report = Engine::default().analyze(&input);

    assert_eq!(report.protocol_type, ProtocolType::Vault);
    assert!(report.protocol_confidence >= 0.6);

    // The supply variable must have been mapped, so coverage is total.
    assert_eq!(report.semantic_mapping_coverage, 1.0);

    let share_price = report
        .invariants
        .iter()
        .find(|invariant| invariant.invariant_type == "share_price_stability")
        .expect("no share_price_stability invariant was generated");
    assert_eq!(share_price.category, InvariantCategory::PriceStability);
    assert_eq!(share_price.slots, vec![SlotRef::new(VAULT, 0u64)]);
    assert!(share_price.formula.contains(VAULT));

    Ok(())
}

#[test]
fn checksummed_layout_keys_still_map_the_supply_slot() -> anyhow::Result<()> {
    let input = AnalysisInput {
        project: "vault-exploit".into(),
        before: common::snapshot(&[(VAULT, &[(0, SUPPLY_BEFORE)], 0, 1)])?,
        after: common::snapshot(&[(VAULT, &[(0, SUPPLY_AFTER)], 0, 1)])?,
        evidence: EvidenceBundle::new(),
        layouts: BTreeMap::from([(
            "0xBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB".to_owned(),
            vec![DeclaredVariable::value("totalSupply", 32)],
        )]),
    };

    let report = Engine::default().analyze(&input);

    assert_eq!(report.semantic_mapping_coverage, 1.0);

    Ok(())
}
