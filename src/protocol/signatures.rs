//! This module contains the static signature tables that protocol detection
//! scores evidence against.
//!
//! The tables are read-only reference data, shared freely across concurrent
//! analysis runs. Function and event names are matched case-insensitively
//! against recovered interface names; name keywords are matched as
//! substrings of contract labels; semantic signatures are matched against
//! the resolved slot semantics of the contract.

use crate::{protocol::ProtocolType, semantics::SemanticType};

/// The evidence signatures characterising one protocol category.
pub struct ProtocolSignatures {
    /// The category the signatures describe.
    pub protocol: ProtocolType,

    /// Function names typical of the category.
    pub functions: &'static [&'static str],

    /// Event names typical of the category.
    pub events: &'static [&'static str],

    /// Slot semantics typical of the category.
    pub semantics: &'static [SemanticType],

    /// Keywords found in the names of contracts of the category.
    pub name_keywords: &'static [&'static str],
}

/// The signature tables for all eight protocol categories.
///
/// Order here is unimportant; detection scores every category and the
/// tie-break uses [`crate::protocol::CATEGORY_PRIORITY`].
pub static SIGNATURE_TABLES: &[ProtocolSignatures] = &[
    ProtocolSignatures {
        protocol: ProtocolType::Vault,
        functions: &[
            "deposit",
            "withdraw",
            "redeem",
            "mint",
            "convertToShares",
            "convertToAssets",
            "previewDeposit",
            "previewRedeem",
            "asset",
            "totalAssets",
            "pricePerShare",
        ],
        events: &["Deposit", "Withdraw", "Harvest"],
        semantics: &[
            SemanticType::TotalAssets,
            SemanticType::TotalShares,
            SemanticType::TotalSupply,
            SemanticType::ExchangeRate,
        ],
        name_keywords: &["vault", "4626", "yvault", "yearn", "strategy"],
    },
    ProtocolSignatures {
        protocol: ProtocolType::Amm,
        functions: &[
            "swap",
            "addLiquidity",
            "removeLiquidity",
            "getReserves",
            "skim",
            "sync",
            "token0",
            "token1",
            "getAmountOut",
        ],
        events: &["Swap", "Sync", "Mint", "Burn"],
        semantics: &[
            SemanticType::Reserve0,
            SemanticType::Reserve1,
            SemanticType::KLast,
            SemanticType::PriceCumulative,
        ],
        name_keywords: &["pair", "pool", "swap", "amm", "uniswap", "curve"],
    },
    ProtocolSignatures {
        protocol: ProtocolType::Lending,
        functions: &[
            "borrow",
            "repay",
            "repayBorrow",
            "liquidate",
            "liquidateBorrow",
            "seize",
            "accrueInterest",
            "borrowBalanceOf",
            "getAccountLiquidity",
        ],
        events: &["Borrow", "RepayBorrow", "LiquidateBorrow", "AccrueInterest"],
        semantics: &[
            SemanticType::TotalBorrows,
            SemanticType::CollateralFactor,
            SemanticType::ExchangeRate,
        ],
        name_keywords: &["lending", "comptroller", "ctoken", "atoken", "compound", "market"],
    },
    ProtocolSignatures {
        protocol: ProtocolType::Staking,
        functions: &[
            "stake",
            "unstake",
            "getReward",
            "exit",
            "earned",
            "notifyRewardAmount",
            "rewardPerToken",
        ],
        events: &["Staked", "Withdrawn", "RewardPaid", "RewardAdded"],
        semantics: &[
            SemanticType::TotalStaked,
            SemanticType::RewardRate,
            SemanticType::RewardPerToken,
            SemanticType::LastUpdateTime,
        ],
        name_keywords: &["staking", "rewards", "farm", "masterchef", "gauge"],
    },
    ProtocolSignatures {
        protocol: ProtocolType::Bridge,
        functions: &[
            "lock",
            "unlock",
            "bridge",
            "relayTokens",
            "sendMessage",
            "executeMessage",
            "depositFor",
            "withdrawTo",
        ],
        events: &["TokensBridged", "MessageSent", "MessageExecuted", "Locked"],
        semantics: &[SemanticType::MerkleRoot, SemanticType::BalanceMapping],
        name_keywords: &["bridge", "portal", "gateway", "tunnel", "wormhole"],
    },
    ProtocolSignatures {
        protocol: ProtocolType::NftMarketplace,
        functions: &[
            "listItem",
            "buyItem",
            "cancelListing",
            "makeOffer",
            "acceptOffer",
            "matchOrders",
            "fulfillOrder",
        ],
        events: &["ItemListed", "ItemSold", "ItemCanceled", "OrderFulfilled"],
        semantics: &[SemanticType::FeeRate, SemanticType::Treasury],
        name_keywords: &["marketplace", "seaport", "exchange", "auction"],
    },
    ProtocolSignatures {
        protocol: ProtocolType::Governance,
        functions: &[
            "propose",
            "castVote",
            "castVoteWithReason",
            "queue",
            "execute",
            "getVotes",
            "delegate",
        ],
        events: &["ProposalCreated", "VoteCast", "ProposalQueued", "ProposalExecuted"],
        semantics: &[SemanticType::ProposalCount, SemanticType::QuorumVotes],
        name_keywords: &["governor", "governance", "dao", "timelock"],
    },
    ProtocolSignatures {
        protocol: ProtocolType::Erc20,
        functions: &[
            "transfer",
            "transferFrom",
            "approve",
            "balanceOf",
            "totalSupply",
            "allowance",
        ],
        events: &["Transfer", "Approval"],
        semantics: &[
            SemanticType::TotalSupply,
            SemanticType::BalanceMapping,
            SemanticType::AllowanceMapping,
        ],
        name_keywords: &["token", "erc20", "coin", "usd", "wrapped"],
    },
];
