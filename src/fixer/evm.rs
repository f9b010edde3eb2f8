use std::sync::Arc;

use alloy_primitives::{B256, TxHash};
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use futures::{StreamExt as _, TryStreamExt as _, stream};

use super::{INDEXER_CONCURRENCY, LockupSide, SwapFixer, SwapPatch};
use crate::swap::{BTC, Swap, SwapType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvmSwapEventKind {
    Lockup,
    Claim,
    Refund,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmSwapEvent {
    pub kind: EvmSwapEventKind,
    pub tx_hash: TxHash,
    pub block_number: u64,
}

#[async_trait]
pub trait EvmIndexer: Send + Sync {
    /// Lockup contract events for `preimage_hash` on `chain_id`.
    async fn swap_events(&self, chain_id: u64, preimage_hash: B256) -> Result<Vec<EvmSwapEvent>>;
}

/// Reconciles swaps whose lockup lives in an EVM swap contract.
pub struct EvmLockupFixer {
    indexer: Arc<dyn EvmIndexer>,
}

impl EvmLockupFixer {
    pub fn new(indexer: Arc<dyn EvmIndexer>) -> Self {
        Self { indexer }
    }

    async fn fix_one(&self, swap: &Swap) -> Result<Option<SwapPatch>> {
        let (Some(chain_id), Some(side)) = (swap.chain_id, evm_side(swap)) else {
            return Ok(None);
        };
        let Some(preimage_hash) = parse_preimage_hash(&swap.preimage_hash) else {
            tracing::warn!(swap_id = %swap.id, "skipping swap with malformed preimage hash");
            return Ok(None);
        };

        let events = self
            .indexer
            .swap_events(chain_id, preimage_hash)
            .await
            .with_context(|| format!("evm events for swap {} on chain {chain_id}", swap.id))?;
        Ok(resolve(swap, side, &events))
    }
}

#[async_trait]
impl SwapFixer for EvmLockupFixer {
    fn name(&self) -> &'static str {
        "evm_lockup"
    }

    async fn fix(&self, swaps: &[Swap]) -> Result<Vec<Option<SwapPatch>>> {
        let futures: Vec<_> = swaps.iter().map(|swap| self.fix_one(swap)).collect();
        stream::iter(futures)
            .buffered(INDEXER_CONCURRENCY)
            .try_collect()
            .await
    }
}

fn evm_side(swap: &Swap) -> Option<LockupSide> {
    match swap.swap_type {
        SwapType::EvmSubmarine => Some(LockupSide::User),
        SwapType::EvmReverse => Some(LockupSide::Server),
        SwapType::Chain if swap.asset_send == BTC => Some(LockupSide::Server),
        SwapType::Chain => Some(LockupSide::User),
        SwapType::Submarine | SwapType::Reverse => None,
    }
}

fn parse_preimage_hash(s: &str) -> Option<B256> {
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s)).ok()?;
    (bytes.len() == 32).then(|| B256::from_slice(&bytes))
}

fn resolve(swap: &Swap, side: LockupSide, events: &[EvmSwapEvent]) -> Option<SwapPatch> {
    let settled = events
        .iter()
        .filter(|e| e.kind != EvmSwapEventKind::Lockup)
        .min_by_key(|e| e.block_number);
    if let Some(event) = settled {
        let tx = format!("{:#x}", event.tx_hash);
        return Some(match event.kind {
            EvmSwapEventKind::Refund => side.refunded(tx),
            _ => side.claimed(tx),
        });
    }

    if events.iter().any(|e| e.kind == EvmSwapEventKind::Lockup) {
        return side.unspent(swap);
    }
    None
}
