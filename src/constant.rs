//! This module contains constants that are needed throughout the codebase.

/// The width of a word in EVM storage in bytes.
///
/// Every storage slot holds exactly one word.
pub const WORD_SIZE_BYTES: usize = 32;

/// The width of an address in bytes.
pub const ADDRESS_WIDTH_BYTES: usize = 20;

/// The upper bound of the `Tiny` magnitude tier as a relative change rate.
pub const MAGNITUDE_TINY_BOUND: f64 = 0.01;

/// The upper bound of the `Small` magnitude tier as a relative change rate.
pub const MAGNITUDE_SMALL_BOUND: f64 = 0.10;

/// The upper bound of the `Medium` magnitude tier as a relative change rate.
pub const MAGNITUDE_MEDIUM_BOUND: f64 = 0.50;

/// The upper bound of the `Large` magnitude tier as a relative change rate.
pub const MAGNITUDE_LARGE_BOUND: f64 = 2.00;

/// The upper bound of the `Massive` magnitude tier as a relative change
/// rate. Rates above this bound are `Extreme`.
pub const MAGNITUDE_MASSIVE_BOUND: f64 = 10.00;

/// The weight given to function-signature evidence when fusing protocol
/// detection sources.
pub const FUNCTION_EVIDENCE_WEIGHT: f64 = 0.4;

/// The weight given to event-signature evidence when fusing protocol
/// detection sources.
pub const EVENT_EVIDENCE_WEIGHT: f64 = 0.3;

/// The weight given to storage-semantic evidence when fusing protocol
/// detection sources.
pub const STORAGE_EVIDENCE_WEIGHT: f64 = 0.2;

/// The weight given to contract-name evidence when fusing protocol detection
/// sources.
pub const NAME_EVIDENCE_WEIGHT: f64 = 0.1;

/// The default nonce delta above which a contract is considered to have made
/// a suspicious number of nested or repeated calls within one transaction.
pub const DEFAULT_NONCE_DELTA_THRESHOLD: u64 = 10;

/// The nonce delta at which the recursive-call pattern reaches full
/// confidence.
pub const NONCE_DELTA_SATURATION: u64 = 50;

/// The default relative tolerance when matching a decrease in one contract
/// against an increase in another as a balance transfer.
///
/// This is a calibration parameter rather than a protocol constant, so it
/// lives on [`crate::Config`] with this value as its default.
pub const DEFAULT_TRANSFER_TOLERANCE: f64 = 0.01;

/// The default floor, in wei-scale units, above which a change from zero is
/// considered material enough to classify as an extreme change.
///
/// Defaults to `10^15`, i.e. one thousandth of an 18-decimal token unit.
/// Like the transfer tolerance this is a calibration parameter carried on
/// [`crate::Config`].
pub const DEFAULT_MATERIALITY_FLOOR: u128 = 1_000_000_000_000_000;

/// The default minimum confidence a semantic classification must carry for a
/// template role to resolve against it.
pub const DEFAULT_MIN_ROLE_CONFIDENCE: f64 = 0.3;

/// The default minimum fused confidence a protocol detection must carry for
/// protocol-specific templates to be selected at all.
pub const DEFAULT_MIN_PROTOCOL_CONFIDENCE: f64 = 0.3;

/// The maximum score an extreme-co-occurrence relation can carry.
///
/// Co-occurrence is weaker evidence than a matched balance transfer, so its
/// score is capped strictly below the transfer range.
pub const CO_OCCURRENCE_SCORE_CAP: f64 = 0.5;

/// The storage slot key holding the implementation address under
/// [ERC-1967](https://eips.ethereum.org/EIPS/eip-1967), i.e.
/// `keccak256("eip1967.proxy.implementation") - 1`.
pub const ERC1967_IMPLEMENTATION_SLOT: &str =
    "0x360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc";

/// The storage slot key holding the admin address under
/// [ERC-1967](https://eips.ethereum.org/EIPS/eip-1967), i.e.
/// `keccak256("eip1967.proxy.admin") - 1`.
pub const ERC1967_ADMIN_SLOT: &str =
    "0xb53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103";
