//! Corrections derived from on-chain ground truth.
//!
//! Each [`SwapFixer`] answers with one optional [`SwapPatch`] per input swap;
//! `None` means the fixer had nothing to change. The pipeline applies patches
//! in order, so later fixers see the corrections made by earlier ones.

pub mod btc;
pub mod evm;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;

use crate::swap::{Swap, SwapStatus};

/// Upper bound on indexer requests a fixer keeps in flight for one batch.
pub const INDEXER_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapPatch {
    pub status: Option<SwapStatus>,
    pub claim_tx: Option<String>,
    pub refund_tx: Option<String>,
}

impl SwapPatch {
    pub fn status(status: SwapStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn claimed(status: SwapStatus, claim_tx: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            claim_tx: Some(claim_tx.into()),
            refund_tx: None,
        }
    }

    pub fn refunded(status: SwapStatus, refund_tx: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            claim_tx: None,
            refund_tx: Some(refund_tx.into()),
        }
    }

    /// Whether applying the patch to `swap` would alter any field.
    pub fn changes(&self, swap: &Swap) -> bool {
        self.status.is_some_and(|s| s != swap.status)
            || self
                .claim_tx
                .as_ref()
                .is_some_and(|tx| swap.claim_tx.as_ref() != Some(tx))
            || self
                .refund_tx
                .as_ref()
                .is_some_and(|tx| swap.refund_tx.as_ref() != Some(tx))
    }

    pub fn apply(self, swap: &mut Swap) {
        if let Some(status) = self.status {
            swap.status = status;
        }
        if let Some(tx) = self.claim_tx {
            swap.claim_tx = Some(tx);
        }
        if let Some(tx) = self.refund_tx {
            swap.refund_tx = Some(tx);
        }
    }
}

/// Which party funded the lockup a fixer is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockupSide {
    User,
    Server,
}

impl LockupSide {
    pub fn claimed(self, tx: String) -> SwapPatch {
        match self {
            LockupSide::User => SwapPatch::claimed(SwapStatus::TransactionClaimed, tx),
            LockupSide::Server => SwapPatch::claimed(SwapStatus::UserClaimed, tx),
        }
    }

    pub fn refunded(self, tx: String) -> SwapPatch {
        match self {
            LockupSide::User => SwapPatch::refunded(SwapStatus::UserRefunded, tx),
            LockupSide::Server => SwapPatch::refunded(SwapStatus::TransactionRefunded, tx),
        }
    }

    /// Funded, unspent user lockups of failed or expired swaps can be refunded.
    pub fn unspent(self, swap: &Swap) -> Option<SwapPatch> {
        let awaiting_refund = matches!(
            swap.status,
            SwapStatus::TransactionLockupFailed | SwapStatus::SwapExpired
        );
        (self == LockupSide::User && awaiting_refund)
            .then(|| SwapPatch::status(SwapStatus::UserRefundable))
    }
}

#[async_trait]
pub trait SwapFixer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Must return exactly one entry per input swap, in input order.
    async fn fix(&self, swaps: &[Swap]) -> Result<Vec<Option<SwapPatch>>>;
}

#[derive(Clone, Default)]
pub struct FixerPipeline {
    fixers: Vec<Arc<dyn SwapFixer>>,
}

impl FixerPipeline {
    pub fn new(fixers: Vec<Arc<dyn SwapFixer>>) -> Self {
        Self { fixers }
    }

    /// Standard composition: bitcoin lockups first, then EVM lockups.
    pub fn from_indexers(
        bitcoin: Arc<dyn btc::BitcoinIndexer>,
        evm: Arc<dyn evm::EvmIndexer>,
    ) -> Self {
        Self::new(vec![
            Arc::new(btc::BitcoinLockupFixer::new(bitcoin)),
            Arc::new(evm::EvmLockupFixer::new(evm)),
        ])
    }

    pub async fn fix(&self, mut swaps: Vec<Swap>) -> Result<Vec<Swap>> {
        for fixer in &self.fixers {
            if swaps.is_empty() {
                break;
            }

            let patches = fixer
                .fix(&swaps)
                .await
                .with_context(|| format!("run fixer {}", fixer.name()))?;
            anyhow::ensure!(
                patches.len() == swaps.len(),
                "fixer {} returned {} entries for {} swaps",
                fixer.name(),
                patches.len(),
                swaps.len()
            );

            for (swap, patch) in swaps.iter_mut().zip(patches) {
                if let Some(patch) = patch
                    && patch.changes(swap)
                {
                    tracing::debug!(
                        fixer = fixer.name(),
                        swap_id = %swap.id,
                        from = %swap.status,
                        to = ?patch.status,
                        "fixer corrected swap"
                    );
                    patch.apply(swap);
                }
            }
        }
        Ok(swaps)
    }
}

impl std::fmt::Debug for FixerPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.fixers.iter().map(|fixer| fixer.name()))
            .finish()
    }
}
