pub mod amount;
pub mod store;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use amount::TokenAmount;

/// Asset identifier of the on-chain bitcoin leg.
pub const BTC: &str = "BTC";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapType {
    /// On-chain BTC in, lightning out.
    Submarine,
    /// Lightning in, on-chain out.
    Reverse,
    /// On-chain in, on-chain out on another chain.
    Chain,
    EvmSubmarine,
    EvmReverse,
}

impl SwapType {
    pub const ALL: [SwapType; 5] = [
        SwapType::Submarine,
        SwapType::Reverse,
        SwapType::Chain,
        SwapType::EvmSubmarine,
        SwapType::EvmReverse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SwapType::Submarine => "submarine",
            SwapType::Reverse => "reverse",
            SwapType::Chain => "chain",
            SwapType::EvmSubmarine => "evm_submarine",
            SwapType::EvmReverse => "evm_reverse",
        }
    }

    /// Whether the user funds an on-chain lockup, and can therefore be owed a refund.
    pub fn has_user_lockup(self) -> bool {
        !self.is_reverse()
    }

    pub fn is_reverse(self) -> bool {
        matches!(self, SwapType::Reverse | SwapType::EvmReverse)
    }
}

impl fmt::Display for SwapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SwapType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown swap type: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapStatus {
    #[serde(rename = "swap.created")]
    SwapCreated,
    #[serde(rename = "invoice.set")]
    InvoiceSet,
    #[serde(rename = "invoice.pending")]
    InvoicePending,
    #[serde(rename = "invoice.paid")]
    InvoicePaid,
    #[serde(rename = "invoice.settled")]
    InvoiceSettled,
    #[serde(rename = "invoice.expired")]
    InvoiceExpired,
    #[serde(rename = "invoice.failedToPay")]
    InvoiceFailedToPay,
    #[serde(rename = "transaction.mempool")]
    TransactionMempool,
    #[serde(rename = "transaction.confirmed")]
    TransactionConfirmed,
    #[serde(rename = "transaction.server.mempool")]
    TransactionServerMempool,
    #[serde(rename = "transaction.server.confirmed")]
    TransactionServerConfirmed,
    #[serde(rename = "transaction.claim.pending")]
    TransactionClaimPending,
    #[serde(rename = "transaction.claimed")]
    TransactionClaimed,
    #[serde(rename = "transaction.refunded")]
    TransactionRefunded,
    #[serde(rename = "transaction.failed")]
    TransactionFailed,
    #[serde(rename = "transaction.lockupFailed")]
    TransactionLockupFailed,
    #[serde(rename = "swap.expired")]
    SwapExpired,
    #[serde(rename = "user.claimable")]
    UserClaimable,
    #[serde(rename = "user.claimed")]
    UserClaimed,
    #[serde(rename = "user.refundable")]
    UserRefundable,
    #[serde(rename = "user.refunded")]
    UserRefunded,
}

impl SwapStatus {
    pub const ALL: [SwapStatus; 21] = [
        SwapStatus::SwapCreated,
        SwapStatus::InvoiceSet,
        SwapStatus::InvoicePending,
        SwapStatus::InvoicePaid,
        SwapStatus::InvoiceSettled,
        SwapStatus::InvoiceExpired,
        SwapStatus::InvoiceFailedToPay,
        SwapStatus::TransactionMempool,
        SwapStatus::TransactionConfirmed,
        SwapStatus::TransactionServerMempool,
        SwapStatus::TransactionServerConfirmed,
        SwapStatus::TransactionClaimPending,
        SwapStatus::TransactionClaimed,
        SwapStatus::TransactionRefunded,
        SwapStatus::TransactionFailed,
        SwapStatus::TransactionLockupFailed,
        SwapStatus::SwapExpired,
        SwapStatus::UserClaimable,
        SwapStatus::UserClaimed,
        SwapStatus::UserRefundable,
        SwapStatus::UserRefunded,
    ];

    pub const PENDING: [SwapStatus; 10] = [
        SwapStatus::SwapCreated,
        SwapStatus::InvoiceSet,
        SwapStatus::InvoicePending,
        SwapStatus::InvoicePaid,
        SwapStatus::TransactionMempool,
        SwapStatus::TransactionConfirmed,
        SwapStatus::TransactionServerMempool,
        SwapStatus::TransactionServerConfirmed,
        SwapStatus::TransactionClaimPending,
        SwapStatus::UserClaimable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SwapStatus::SwapCreated => "swap.created",
            SwapStatus::InvoiceSet => "invoice.set",
            SwapStatus::InvoicePending => "invoice.pending",
            SwapStatus::InvoicePaid => "invoice.paid",
            SwapStatus::InvoiceSettled => "invoice.settled",
            SwapStatus::InvoiceExpired => "invoice.expired",
            SwapStatus::InvoiceFailedToPay => "invoice.failedToPay",
            SwapStatus::TransactionMempool => "transaction.mempool",
            SwapStatus::TransactionConfirmed => "transaction.confirmed",
            SwapStatus::TransactionServerMempool => "transaction.server.mempool",
            SwapStatus::TransactionServerConfirmed => "transaction.server.confirmed",
            SwapStatus::TransactionClaimPending => "transaction.claim.pending",
            SwapStatus::TransactionClaimed => "transaction.claimed",
            SwapStatus::TransactionRefunded => "transaction.refunded",
            SwapStatus::TransactionFailed => "transaction.failed",
            SwapStatus::TransactionLockupFailed => "transaction.lockupFailed",
            SwapStatus::SwapExpired => "swap.expired",
            SwapStatus::UserClaimable => "user.claimable",
            SwapStatus::UserClaimed => "user.claimed",
            SwapStatus::UserRefundable => "user.refundable",
            SwapStatus::UserRefunded => "user.refunded",
        }
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SwapStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown swap status: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swap {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub swap_type: SwapType,
    pub status: SwapStatus,
    pub version: u32,

    pub asset_send: String,
    pub asset_receive: String,
    pub send_amount: TokenAmount,
    pub receive_amount: TokenAmount,
    pub created_at: i64,

    pub preimage: Option<String>,
    pub preimage_hash: String,
    pub preimage_seed: Option<String>,
    pub claim_key_index: Option<u32>,
    pub refund_key_index: Option<u32>,

    pub claim_address: Option<String>,
    pub refund_address: Option<String>,
    pub lockup_address: Option<String>,

    pub claim_tx: Option<String>,
    pub refund_tx: Option<String>,
    pub lockup_tx: Option<String>,

    pub invoice: Option<String>,
    pub accept_zero_conf: bool,
    pub expected_amount: Option<TokenAmount>,
    pub onchain_amount: Option<TokenAmount>,
    pub timeout_block_height: u32,

    pub claim_details: Option<serde_json::Value>,
    pub lockup_details: Option<serde_json::Value>,
    pub referral_id: Option<String>,
    pub chain_id: Option<u64>,
}

/// The only columns this engine ever writes back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapDelta {
    pub id: String,
    pub status: SwapStatus,
    pub claim_tx: Option<String>,
    pub refund_tx: Option<String>,
}

impl SwapDelta {
    /// `None` when `after` carries the same reconciled fields as `before`.
    pub fn between(before: &Swap, after: &Swap) -> Option<Self> {
        let unchanged = before.status == after.status
            && before.claim_tx == after.claim_tx
            && before.refund_tx == after.refund_tx;
        if unchanged {
            return None;
        }
        Some(Self {
            id: after.id.clone(),
            status: after.status,
            claim_tx: after.claim_tx.clone(),
            refund_tx: after.refund_tx.clone(),
        })
    }
}
