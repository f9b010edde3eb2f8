//! Collaborator contracts consumed by the sync engine.
//!
//! Concrete network clients for the status service live outside this crate;
//! the engine only sees these traits.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::swap::{Swap, SwapDelta, SwapStatus, SwapType};

/// Filter applied to a user's swaps when selecting phase candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPredicate {
    pub statuses: Vec<SwapStatus>,
    pub excluded_types: Vec<SwapType>,
}

impl SwapPredicate {
    pub fn status_in(statuses: impl IntoIterator<Item = SwapStatus>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
            excluded_types: Vec::new(),
        }
    }

    pub fn excluding_types(mut self, types: impl IntoIterator<Item = SwapType>) -> Self {
        self.excluded_types.extend(types);
        self
    }

    pub fn matches(&self, swap: &Swap) -> bool {
        self.statuses.contains(&swap.status) && !self.excluded_types.contains(&swap.swap_type)
    }
}

#[async_trait]
pub trait SwapStore: Send + Sync {
    /// Swaps owned by `user_id` that satisfy `predicate`, ordered by creation time.
    async fn query(&self, user_id: &str, predicate: &SwapPredicate) -> Result<Vec<Swap>>;

    /// Applies every delta in one transaction. Either all rows commit or none do.
    async fn update_many(&self, deltas: Vec<SwapDelta>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub status: SwapStatus,
}

#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Batched, best-effort status lookup. Ids missing from the reply have no update.
    async fn current_status(&self, ids: &[String]) -> Result<HashMap<String, RemoteStatus>>;
}

