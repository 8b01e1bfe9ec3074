//! This module tests cross-contract relation inference: a matched outflow
//! and inflow in the same run must yield exactly one balance-transfer
//! relation.
#![cfg(test)]

use storage_invariant_extractor::{
    diff::{self, RelationKind},
    semantics::SemanticMap,
    Config,
};

mod common;

const SENDER: &str = "0x1111111111111111111111111111111111111111";
const RECEIVER: &str = "0x2222222222222222222222222222222222222222";

#[test]
fn matched_outflow_and_inflow_yield_one_perfect_relation() -> anyhow::Result<()> {
    // The sender's tracked slot loses exactly what the receiver's gains.
    let before = common::snapshot(&[
        (SENDER, &[(0, 5_000)], 0, 1),
        (RECEIVER, &[(0, 1_000)], 0, 1),
    ])?;
    let after = common::snapshot(&[
        (SENDER, &[(0, 4_000)], 0, 1),
        (RECEIVER, &[(0, 2_000)], 0, 1),
    ])?;

    let report = diff::compute(&before, &after, &SemanticMap::new(), &Config::default());

    let transfers: Vec<_> = report
        .relations
        .iter()
        .filter(|relation| relation.kind == RelationKind::BalanceTransfer)
        .collect();
    assert_eq!(transfers.len(), 1);

    let transfer = transfers[0];
    assert_eq!(transfer.correlation_score, 1.0);
    assert!(transfer.contracts.contains(&SENDER.to_owned()));
    assert!(transfer.contracts.contains(&RECEIVER.to_owned()));

    Ok(())
}
