//! This module holds known-answer tests for mapping slot derivation, pinned
//! against values produced by Solidity's documented storage encoding.
#![cfg(test)]

use storage_invariant_extractor::{
    layout::{mapping_slot, nested_mapping_slot},
    utility::U256W,
};

#[test]
fn address_key_in_base_slot_three_derives_the_documented_slot() -> anyhow::Result<()> {
    // keccak256(pad32(0x...0001) ++ pad32(3)).
    let key = U256W::parse("0x0000000000000000000000000000000000000001")
        .ok_or_else(|| anyhow::anyhow!("key did not parse"))?;
    let base = U256W::from(3u64);

    let derived = mapping_slot(&key, &base);

    let expected =
        U256W::parse("0xa15bc60c955c405d20d9149c709e2460f1c2d9a497496a7f46004d1772c3054c")
            .ok_or_else(|| anyhow::anyhow!("expected value did not parse"))?;
    assert_eq!(derived, expected);

    Ok(())
}

#[test]
fn single_key_nested_derivation_matches_the_flat_form() {
    let key = U256W::from(1u64);
    let base = U256W::from(3u64);

    assert_eq!(
        nested_mapping_slot(&[key], &base),
        mapping_slot(&key, &base)
    );
}
