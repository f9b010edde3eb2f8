#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use swap_sync::fixer::btc::{AddressActivity, BitcoinIndexer};
use swap_sync::fixer::evm::{EvmIndexer, EvmSwapEvent};
use swap_sync::fixer::{SwapFixer, SwapPatch};
use swap_sync::sources::{RemoteStatus, StatusSource, SwapPredicate, SwapStore};
use swap_sync::swap::store::{SharedSwapStore, SqliteSwapStore};
use swap_sync::swap::{Swap, SwapDelta, SwapStatus, SwapType, TokenAmount};

pub fn sample_swap(id: &str, user_id: &str, swap_type: SwapType, status: SwapStatus) -> Swap {
    let created_at = 1_700_000_000 + id.bytes().map(i64::from).sum::<i64>();
    Swap {
        id: id.to_string(),
        user_id: user_id.to_string(),
        swap_type,
        status,
        version: 2,
        asset_send: "BTC".to_string(),
        asset_receive: "LN".to_string(),
        send_amount: TokenAmount::from(250_000),
        receive_amount: TokenAmount::from(249_100),
        created_at,
        preimage: None,
        preimage_hash: "22".repeat(32),
        preimage_seed: Some(format!("seed:{id}")),
        claim_key_index: None,
        refund_key_index: Some(7),
        claim_address: Some(format!("bcrt1qclaim{id}")),
        refund_address: Some(format!("bcrt1qrefund{id}")),
        lockup_address: Some(format!("bcrt1qlockup{id}")),
        claim_tx: None,
        refund_tx: None,
        lockup_tx: None,
        invoice: Some(format!("lnbcrt:{id}")),
        accept_zero_conf: false,
        expected_amount: Some(TokenAmount::from(250_000)),
        onchain_amount: None,
        timeout_block_height: 840_000,
        claim_details: None,
        lockup_details: Some(serde_json::json!({ "redeemScript": format!("script:{id}") })),
        referral_id: Some("pro".to_string()),
        chain_id: None,
    }
}

pub struct TestStore {
    _dir: tempfile::TempDir,
    pub path: PathBuf,
    pub shared: Arc<Mutex<SqliteSwapStore>>,
}

impl TestStore {
    pub fn open() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let path = dir.path().join("swaps.sqlite3");
        let store = SqliteSwapStore::open(path.clone()).context("open sqlite store")?;
        Ok(Self {
            _dir: dir,
            path,
            shared: Arc::new(Mutex::new(store)),
        })
    }

    pub fn insert(&self, swap: &Swap) -> Result<()> {
        self.shared.lock().unwrap().insert_swap(swap)
    }

    pub fn get(&self, swap_id: &str) -> Result<Swap> {
        self.shared
            .lock()
            .unwrap()
            .get_swap(swap_id)?
            .with_context(|| format!("{swap_id} missing"))
    }

    pub fn counting(&self) -> Arc<CountingStore> {
        Arc::new(CountingStore::new(SharedSwapStore::from_shared(
            self.shared.clone(),
        )))
    }
}

/// Wraps the real store and records every call made through the trait.
pub struct CountingStore {
    inner: SharedSwapStore,
    pub queries: AtomicUsize,
    pub writes: Mutex<Vec<Vec<SwapDelta>>>,
}

impl CountingStore {
    pub fn new(inner: SharedSwapStore) -> Self {
        Self {
            inner,
            queries: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn written_ids(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|d| d.id.clone())
            .collect()
    }
}

#[async_trait]
impl SwapStore for CountingStore {
    async fn query(&self, user_id: &str, predicate: &SwapPredicate) -> Result<Vec<Swap>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(user_id, predicate).await
    }

    async fn update_many(&self, deltas: Vec<SwapDelta>) -> Result<()> {
        self.writes.lock().unwrap().push(deltas.clone());
        self.inner.update_many(deltas).await
    }
}

#[derive(Default)]
pub struct FakeStatusSource {
    statuses: Mutex<HashMap<String, SwapStatus>>,
    delay: Duration,
    fail: bool,
    pub requests: Mutex<Vec<Vec<String>>>,
}

impl FakeStatusSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn report(&self, id: &str, status: SwapStatus) {
        self.statuses.lock().unwrap().insert(id.to_string(), status);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl StatusSource for FakeStatusSource {
    async fn current_status(&self, ids: &[String]) -> Result<HashMap<String, RemoteStatus>> {
        self.requests.lock().unwrap().push(ids.to_vec());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        anyhow::ensure!(!self.fail, "status service unreachable");

        let statuses = self.statuses.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| {
                statuses
                    .get(id)
                    .map(|status| (id.clone(), RemoteStatus { status: *status }))
            })
            .collect())
    }
}

/// A fixer that changes nothing and remembers which swaps it was shown.
#[derive(Default)]
pub struct RecordingFixer {
    pub seen: Mutex<Vec<String>>,
}

impl RecordingFixer {
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl SwapFixer for RecordingFixer {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn fix(&self, swaps: &[Swap]) -> Result<Vec<Option<SwapPatch>>> {
        self.seen
            .lock()
            .unwrap()
            .extend(swaps.iter().map(|s| s.id.clone()));
        Ok(vec![None; swaps.len()])
    }
}

#[derive(Default)]
pub struct FakeBitcoinIndexer {
    pub activity: Mutex<HashMap<String, AddressActivity>>,
}

impl FakeBitcoinIndexer {
    pub fn set(&self, address: &str, activity: AddressActivity) {
        self.activity
            .lock()
            .unwrap()
            .insert(address.to_string(), activity);
    }
}

#[async_trait]
impl BitcoinIndexer for FakeBitcoinIndexer {
    async fn address_activity(&self, address: &str) -> Result<AddressActivity> {
        Ok(self
            .activity
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeEvmIndexer;

#[async_trait]
impl EvmIndexer for FakeEvmIndexer {
    async fn swap_events(
        &self,
        _chain_id: u64,
        _preimage_hash: alloy_primitives::B256,
    ) -> Result<Vec<EvmSwapEvent>> {
        Ok(Vec::new())
    }
}
