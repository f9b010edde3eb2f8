use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension as _, Row, params, params_from_iter};

use super::{Swap, SwapDelta, SwapStatus, SwapType, TokenAmount};
use crate::sources::{SwapPredicate, SwapStore};

const SWAP_COLUMNS: &str = r#"
  swap_id,
  user_id,
  swap_type,
  status,
  version,
  asset_send,
  asset_receive,
  send_amount,
  receive_amount,
  created_at,
  preimage,
  preimage_hash,
  preimage_seed,
  claim_key_index,
  refund_key_index,
  claim_address,
  refund_address,
  lockup_address,
  claim_tx,
  refund_tx,
  lockup_tx,
  invoice,
  accept_zero_conf,
  expected_amount,
  onchain_amount,
  timeout_block_height,
  claim_details,
  lockup_details,
  referral_id,
  chain_id
"#;

#[derive(Debug)]
pub struct SqliteSwapStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteSwapStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create swap store dir {}", dir.display()))?;
        }

        let conn =
            Connection::open(&path).with_context(|| format!("open sqlite {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("set sqlite busy_timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .context("configure sqlite pragmas")?;

        migrate(&conn).context("migrate sqlite schema")?;

        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn insert_swap(&mut self, swap: &Swap) -> Result<()> {
        let claim_details = json_to_sql(swap.claim_details.as_ref())?;
        let lockup_details = json_to_sql(swap.lockup_details.as_ref())?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO swaps ({SWAP_COLUMNS}) VALUES (
  ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
  ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30
)"
                ),
                params![
                    &swap.id,
                    &swap.user_id,
                    swap.swap_type.as_str(),
                    swap.status.as_str(),
                    swap.version,
                    &swap.asset_send,
                    &swap.asset_receive,
                    swap.send_amount.to_string(),
                    swap.receive_amount.to_string(),
                    swap.created_at,
                    &swap.preimage,
                    &swap.preimage_hash,
                    &swap.preimage_seed,
                    swap.claim_key_index,
                    swap.refund_key_index,
                    &swap.claim_address,
                    &swap.refund_address,
                    &swap.lockup_address,
                    &swap.claim_tx,
                    &swap.refund_tx,
                    &swap.lockup_tx,
                    &swap.invoice,
                    swap.accept_zero_conf,
                    swap.expected_amount.map(|a| a.to_string()),
                    swap.onchain_amount.map(|a| a.to_string()),
                    swap.timeout_block_height,
                    claim_details,
                    lockup_details,
                    &swap.referral_id,
                    swap.chain_id,
                ],
            )
            .with_context(|| format!("insert swap {}", swap.id))?;
        Ok(())
    }

    pub fn get_swap(&self, swap_id: &str) -> Result<Option<Swap>> {
        self.conn
            .query_row(
                &format!("SELECT {SWAP_COLUMNS} FROM swaps WHERE swap_id = ?1"),
                params![swap_id],
                swap_from_row,
            )
            .optional()
            .with_context(|| format!("get swap {swap_id}"))
    }

    pub fn list_swaps(&self, user_id: &str) -> Result<Vec<Swap>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {SWAP_COLUMNS} FROM swaps WHERE user_id = ?1 ORDER BY created_at, swap_id"
            ))
            .context("prepare list swaps")?;

        let mut out = Vec::new();
        let rows = stmt
            .query_map(params![user_id], swap_from_row)
            .context("query list swaps")?;
        for row in rows {
            out.push(row.context("read swap row")?);
        }
        Ok(out)
    }

    pub fn query(&self, user_id: &str, predicate: &SwapPredicate) -> Result<Vec<Swap>> {
        if predicate.statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT {SWAP_COLUMNS} FROM swaps WHERE user_id = ?1 AND status IN ({})",
            placeholders(2, predicate.statuses.len())
        );
        if !predicate.excluded_types.is_empty() {
            sql.push_str(&format!(
                " AND swap_type NOT IN ({})",
                placeholders(2 + predicate.statuses.len(), predicate.excluded_types.len())
            ));
        }
        sql.push_str(" ORDER BY created_at, swap_id");

        let args = std::iter::once(user_id)
            .chain(predicate.statuses.iter().map(|s| s.as_str()))
            .chain(predicate.excluded_types.iter().map(|t| t.as_str()));

        let mut stmt = self.conn.prepare(&sql).context("prepare swap query")?;
        let mut out = Vec::new();
        let rows = stmt
            .query_map(params_from_iter(args), swap_from_row)
            .with_context(|| format!("query swaps for user {user_id}"))?;
        for row in rows {
            out.push(row.context("read swap row")?);
        }
        Ok(out)
    }

    pub fn update_many(&mut self, deltas: &[SwapDelta]) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .context("begin swap update transaction")?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "UPDATE swaps SET status = ?2, claim_tx = ?3, refund_tx = ?4 WHERE swap_id = ?1",
                )
                .context("prepare swap update")?;
            for delta in deltas {
                let rows = stmt
                    .execute(params![
                        &delta.id,
                        delta.status.as_str(),
                        &delta.claim_tx,
                        &delta.refund_tx,
                    ])
                    .with_context(|| format!("update swap {}", delta.id))?;
                anyhow::ensure!(rows == 1, "swap not found: {}", delta.id);
            }
        }
        tx.commit().context("commit swap updates")?;
        Ok(())
    }
}

/// Async handle over a shared [`SqliteSwapStore`]; queries run on the blocking pool.
#[derive(Debug, Clone)]
pub struct SharedSwapStore {
    inner: Arc<Mutex<SqliteSwapStore>>,
}

impl SharedSwapStore {
    pub fn from_shared(inner: Arc<Mutex<SqliteSwapStore>>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl SwapStore for SharedSwapStore {
    async fn query(&self, user_id: &str, predicate: &SwapPredicate) -> Result<Vec<Swap>> {
        let store = self.inner.clone();
        let user_id = user_id.to_string();
        let predicate = predicate.clone();
        tokio::task::spawn_blocking(move || {
            store
                .lock()
                .expect("store mutex poisoned")
                .query(&user_id, &predicate)
        })
        .await
        .context("join swap query")?
    }

    async fn update_many(&self, deltas: Vec<SwapDelta>) -> Result<()> {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            store
                .lock()
                .expect("store mutex poisoned")
                .update_many(&deltas)
        })
        .await
        .context("join swap update")?
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS swaps (
  swap_id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL,
  swap_type TEXT NOT NULL,
  status TEXT NOT NULL,
  version INTEGER NOT NULL,
  asset_send TEXT NOT NULL,
  asset_receive TEXT NOT NULL,
  send_amount TEXT NOT NULL,
  receive_amount TEXT NOT NULL,
  created_at INTEGER NOT NULL,
  preimage TEXT,
  preimage_hash TEXT NOT NULL,
  preimage_seed TEXT,
  claim_key_index INTEGER,
  refund_key_index INTEGER,
  claim_address TEXT,
  refund_address TEXT,
  lockup_address TEXT,
  claim_tx TEXT,
  refund_tx TEXT,
  lockup_tx TEXT,
  invoice TEXT,
  accept_zero_conf INTEGER NOT NULL,
  expected_amount TEXT,
  onchain_amount TEXT,
  timeout_block_height INTEGER NOT NULL,
  claim_details TEXT,
  lockup_details TEXT,
  referral_id TEXT,
  chain_id INTEGER
);
CREATE INDEX IF NOT EXISTS swaps_user_status_idx ON swaps(user_id, status);
"#,
    )
    .context("create tables")?;
    Ok(())
}

fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn json_to_sql(value: Option<&serde_json::Value>) -> Result<Option<String>> {
    value
        .map(serde_json::to_string)
        .transpose()
        .context("encode swap details")
}

fn conversion_error(col: usize, ty: Type, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, ty, msg.into())
}

fn swap_from_row(row: &Row<'_>) -> rusqlite::Result<Swap> {
    let swap_type: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(Swap {
        id: row.get(0)?,
        user_id: row.get(1)?,
        swap_type: swap_type
            .parse::<SwapType>()
            .map_err(|e| conversion_error(2, Type::Text, format!("{e:#}")))?,
        status: status
            .parse::<SwapStatus>()
            .map_err(|e| conversion_error(3, Type::Text, format!("{e:#}")))?,
        version: u32_column(row, 4)?,
        asset_send: row.get(5)?,
        asset_receive: row.get(6)?,
        send_amount: amount_column(row, 7)?,
        receive_amount: amount_column(row, 8)?,
        created_at: row.get(9)?,
        preimage: row.get(10)?,
        preimage_hash: row.get(11)?,
        preimage_seed: row.get(12)?,
        claim_key_index: opt_u32_column(row, 13)?,
        refund_key_index: opt_u32_column(row, 14)?,
        claim_address: row.get(15)?,
        refund_address: row.get(16)?,
        lockup_address: row.get(17)?,
        claim_tx: row.get(18)?,
        refund_tx: row.get(19)?,
        lockup_tx: row.get(20)?,
        invoice: row.get(21)?,
        accept_zero_conf: row.get(22)?,
        expected_amount: opt_amount_column(row, 23)?,
        onchain_amount: opt_amount_column(row, 24)?,
        timeout_block_height: u32_column(row, 25)?,
        claim_details: json_column(row, 26)?,
        lockup_details: json_column(row, 27)?,
        referral_id: row.get(28)?,
        chain_id: opt_u64_column(row, 29)?,
    })
}

fn u32_column(row: &Row<'_>, col: usize) -> rusqlite::Result<u32> {
    let value: i64 = row.get(col)?;
    u32::try_from(value)
        .map_err(|_| conversion_error(col, Type::Integer, format!("invalid u32 {value}")))
}

fn opt_u32_column(row: &Row<'_>, col: usize) -> rusqlite::Result<Option<u32>> {
    let value: Option<i64> = row.get(col)?;
    value
        .map(|v| {
            u32::try_from(v)
                .map_err(|_| conversion_error(col, Type::Integer, format!("invalid u32 {v}")))
        })
        .transpose()
}

fn opt_u64_column(row: &Row<'_>, col: usize) -> rusqlite::Result<Option<u64>> {
    let value: Option<i64> = row.get(col)?;
    value
        .map(|v| {
            u64::try_from(v)
                .map_err(|_| conversion_error(col, Type::Integer, format!("invalid u64 {v}")))
        })
        .transpose()
}

fn amount_column(row: &Row<'_>, col: usize) -> rusqlite::Result<TokenAmount> {
    let value: String = row.get(col)?;
    value
        .parse()
        .map_err(|e| conversion_error(col, Type::Text, format!("{e:#}")))
}

fn opt_amount_column(row: &Row<'_>, col: usize) -> rusqlite::Result<Option<TokenAmount>> {
    let value: Option<String> = row.get(col)?;
    value
        .map(|v| {
            v.parse()
                .map_err(|e| conversion_error(col, Type::Text, format!("{e:#}")))
        })
        .transpose()
}

fn json_column(row: &Row<'_>, col: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let value: Option<String> = row.get(col)?;
    value
        .map(|v| {
            serde_json::from_str(&v)
                .map_err(|e| conversion_error(col, Type::Text, format!("invalid json: {e}")))
        })
        .transpose()
}
