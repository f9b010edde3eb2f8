use std::sync::Arc;

use ::bitcoin::Txid;
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use futures::{StreamExt as _, TryStreamExt as _, stream};

use super::{INDEXER_CONCURRENCY, LockupSide, SwapFixer, SwapPatch};
use crate::swap::{BTC, Swap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockupSpend {
    pub txid: Txid,
    /// Address receiving the spent lockup output, when the indexer could decode it.
    pub destination: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressActivity {
    pub funding_txids: Vec<Txid>,
    pub spends: Vec<LockupSpend>,
}

#[async_trait]
pub trait BitcoinIndexer: Send + Sync {
    async fn address_activity(&self, address: &str) -> Result<AddressActivity>;
}

/// Reconciles swaps against the bitcoin lockup address they fund or claim from.
pub struct BitcoinLockupFixer {
    indexer: Arc<dyn BitcoinIndexer>,
}

impl BitcoinLockupFixer {
    pub fn new(indexer: Arc<dyn BitcoinIndexer>) -> Self {
        Self { indexer }
    }

    async fn fix_one(&self, swap: &Swap) -> Result<Option<SwapPatch>> {
        let Some((side, address)) = bitcoin_lockup(swap) else {
            return Ok(None);
        };
        let activity = self
            .indexer
            .address_activity(address)
            .await
            .with_context(|| format!("bitcoin activity for swap {} at {address}", swap.id))?;
        Ok(resolve(swap, side, &activity))
    }
}

#[async_trait]
impl SwapFixer for BitcoinLockupFixer {
    fn name(&self) -> &'static str {
        "bitcoin_lockup"
    }

    async fn fix(&self, swaps: &[Swap]) -> Result<Vec<Option<SwapPatch>>> {
        let futures: Vec<_> = swaps.iter().map(|swap| self.fix_one(swap)).collect();
        stream::iter(futures)
            .buffered(INDEXER_CONCURRENCY)
            .try_collect()
            .await
    }
}

fn bitcoin_lockup(swap: &Swap) -> Option<(LockupSide, &str)> {
    let address = swap.lockup_address.as_deref()?;
    if swap.swap_type.has_user_lockup() && swap.asset_send == BTC {
        Some((LockupSide::User, address))
    } else if !swap.swap_type.has_user_lockup() && swap.asset_receive == BTC {
        Some((LockupSide::Server, address))
    } else {
        None
    }
}

fn resolve(swap: &Swap, side: LockupSide, activity: &AddressActivity) -> Option<SwapPatch> {
    if let Some(spend) = activity.spends.first() {
        let txid = spend.txid.to_string();
        let paid_to = |address: &Option<String>| {
            spend.destination.is_some() && spend.destination == *address
        };
        let patch = match side {
            LockupSide::User if paid_to(&swap.refund_address) => side.refunded(txid),
            LockupSide::User => side.claimed(txid),
            LockupSide::Server if paid_to(&swap.claim_address) => side.claimed(txid),
            LockupSide::Server => side.refunded(txid),
        };
        return Some(patch);
    }

    if activity.funding_txids.is_empty() {
        return None;
    }
    side.unspent(swap)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::str::FromStr as _;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::swap::tests::sample_swap;
    use crate::swap::{SwapStatus, SwapType};

    const FUNDING: &str = "0000000000000000000000000000000000000000000000000000000000000001";
    const SPEND: &str = "00000000000000000000000000000000000000000000000000000000000000ff";

    struct Activity(HashMap<String, AddressActivity>);

    #[async_trait]
    impl BitcoinIndexer for Activity {
        async fn address_activity(&self, address: &str) -> Result<AddressActivity> {
            Ok(self.0.get(address).cloned().unwrap_or_default())
        }
    }

    fn txid(s: &str) -> Txid {
        Txid::from_str(s).unwrap()
    }

    fn spent_to(destination: &str) -> AddressActivity {
        AddressActivity {
            funding_txids: vec![txid(FUNDING)],
            spends: vec![LockupSpend {
                txid: txid(SPEND),
                destination: Some(destination.to_string()),
            }],
        }
    }

    #[test]
    fn user_lockup_spent_to_refund_address_is_refunded() {
        let swap = sample_swap("a", SwapType::Chain, SwapStatus::TransactionLockupFailed);
        let patch = resolve(&swap, LockupSide::User, &spent_to("bcrt1qrefund")).unwrap();
        assert_eq!(patch.status, Some(SwapStatus::UserRefunded));
        assert_eq!(patch.refund_tx.as_deref(), Some(SPEND));
        assert_eq!(patch.claim_tx, None);
    }

    #[test]
    fn user_lockup_spent_elsewhere_is_claimed() {
        let swap = sample_swap("a", SwapType::Submarine, SwapStatus::TransactionConfirmed);
        let patch = resolve(&swap, LockupSide::User, &spent_to("bcrt1qserver")).unwrap();
        assert_eq!(patch.status, Some(SwapStatus::TransactionClaimed));
        assert_eq!(patch.claim_tx.as_deref(), Some(SPEND));
    }

    #[test]
    fn server_lockup_spent_to_claim_address_is_user_claimed() {
        let swap = sample_swap("a", SwapType::Reverse, SwapStatus::TransactionConfirmed);
        let patch = resolve(&swap, LockupSide::Server, &spent_to("bcrt1qclaim")).unwrap();
        assert_eq!(patch.status, Some(SwapStatus::UserClaimed));
        assert_eq!(patch.claim_tx.as_deref(), Some(SPEND));
    }

    #[test]
    fn funded_unspent_lockup_of_failed_swap_becomes_refundable() {
        let activity = AddressActivity {
            funding_txids: vec![txid(FUNDING)],
            spends: Vec::new(),
        };

        let failed = sample_swap("a", SwapType::Chain, SwapStatus::TransactionLockupFailed);
        assert_eq!(
            resolve(&failed, LockupSide::User, &activity),
            Some(SwapPatch::status(SwapStatus::UserRefundable))
        );

        let pending = sample_swap("b", SwapType::Chain, SwapStatus::TransactionMempool);
        assert_eq!(resolve(&pending, LockupSide::User, &activity), None);
        assert_eq!(resolve(&failed, LockupSide::User, &AddressActivity::default()), None);
    }

    #[tokio::test]
    async fn skips_swaps_without_a_bitcoin_lockup() {
        let mut evm = sample_swap("evm", SwapType::EvmSubmarine, SwapStatus::SwapExpired);
        evm.asset_send = "USDT0".to_string();
        let btc = sample_swap("btc", SwapType::Chain, SwapStatus::SwapExpired);

        let indexer = Activity(HashMap::from([
            (evm.lockup_address.clone().unwrap(), spent_to("bcrt1qrefund")),
            (btc.lockup_address.clone().unwrap(), spent_to("bcrt1qrefund")),
        ]));
        let fixer = BitcoinLockupFixer::new(Arc::new(indexer));

        let patches = fixer.fix(&[evm, btc]).await.unwrap();
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0], None);
        assert_eq!(
            patches[1],
            Some(SwapPatch::refunded(SwapStatus::UserRefunded, SPEND))
        );
    }

    #[derive(Default)]
    struct Throttled {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl BitcoinIndexer for Throttled {
        async fn address_activity(&self, address: &str) -> Result<AddressActivity> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            let even = address
                .strip_prefix("bcrt1qlockup")
                .and_then(|n| n.parse::<usize>().ok())
                .is_some_and(|n| n % 2 == 0);
            Ok(if even {
                spent_to("bcrt1qserver")
            } else {
                AddressActivity::default()
            })
        }
    }

    #[tokio::test]
    async fn large_batches_keep_indexer_requests_bounded_and_ordered() {
        let indexer = Arc::new(Throttled::default());
        let fixer = BitcoinLockupFixer::new(indexer.clone());
        let swaps: Vec<Swap> = (0..3 * INDEXER_CONCURRENCY)
            .map(|i| sample_swap(&i.to_string(), SwapType::Submarine, SwapStatus::TransactionMempool))
            .collect();

        let patches = fixer.fix(&swaps).await.unwrap();
        assert_eq!(patches.len(), swaps.len());
        for (i, patch) in patches.iter().enumerate() {
            assert_eq!(patch.is_some(), i % 2 == 0, "swap {i}");
        }
        let peak = indexer.peak.load(Ordering::SeqCst);
        assert!(peak <= INDEXER_CONCURRENCY, "peak {peak}");
        assert!(peak > 1, "requests were not overlapped");
    }
}
