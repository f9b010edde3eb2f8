use std::collections::HashMap;
use std::fmt;

use anyhow::{Context as _, Result};

use crate::fixer::FixerPipeline;
use crate::sources::{RemoteStatus, StatusSource, SwapPredicate, SwapStore};
use crate::swap::{Swap, SwapDelta, SwapStatus, SwapType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Pending,
    Expired,
    Failed,
}

impl Phase {
    /// Execution order within one sync call.
    pub const ORDER: [Phase; 3] = [Phase::Pending, Phase::Expired, Phase::Failed];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Pending => "pending",
            Phase::Expired => "expired",
            Phase::Failed => "failed",
        }
    }

    pub fn predicate(self) -> SwapPredicate {
        match self {
            Phase::Pending => SwapPredicate::status_in(SwapStatus::PENDING),
            // Reverse and plain submarine swaps have nothing left to recover once expired.
            Phase::Expired => SwapPredicate::status_in([SwapStatus::SwapExpired])
                .excluding_types([SwapType::Reverse, SwapType::Submarine]),
            Phase::Failed => SwapPredicate::status_in([SwapStatus::TransactionLockupFailed]),
        }
    }

    fn polls_status_source(self) -> bool {
        self == Phase::Pending
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseOutcome {
    pub candidates: usize,
    pub updated: usize,
}

pub async fn run_phase(
    phase: Phase,
    user_id: &str,
    store: &dyn SwapStore,
    status_source: &dyn StatusSource,
    pipeline: &FixerPipeline,
) -> Result<PhaseOutcome> {
    let original = store
        .query(user_id, &phase.predicate())
        .await
        .context("query candidate swaps")?;
    if original.is_empty() {
        return Ok(PhaseOutcome::default());
    }

    let provisional = if phase.polls_status_source() {
        let ids: Vec<String> = original.iter().map(|s| s.id.clone()).collect();
        let remote = status_source
            .current_status(&ids)
            .await
            .context("fetch current swap status")?;
        apply_remote_status(&original, &remote)
    } else {
        original.clone()
    };

    let fixed = pipeline
        .fix(provisional)
        .await
        .context("run fixer pipeline")?;
    let deltas = diff_swaps(&original, &fixed)?;

    let outcome = PhaseOutcome {
        candidates: original.len(),
        updated: deltas.len(),
    };
    if !deltas.is_empty() {
        store
            .update_many(deltas)
            .await
            .context("persist swap updates")?;
    }
    Ok(outcome)
}

pub fn apply_remote_status(swaps: &[Swap], remote: &HashMap<String, RemoteStatus>) -> Vec<Swap> {
    swaps
        .iter()
        .map(|swap| match remote.get(&swap.id) {
            Some(reported) if reported.status != swap.status => Swap {
                status: reported.status,
                ..swap.clone()
            },
            _ => swap.clone(),
        })
        .collect()
}

/// Pairs `before[i]` with `after[i]`; both slices must describe the same swaps in the same order.
pub fn diff_swaps(before: &[Swap], after: &[Swap]) -> Result<Vec<SwapDelta>> {
    anyhow::ensure!(
        before.len() == after.len(),
        "fixer pipeline returned {} swaps for {} candidates",
        after.len(),
        before.len()
    );

    let mut deltas = Vec::new();
    for (old, new) in before.iter().zip(after) {
        anyhow::ensure!(
            old.id == new.id,
            "fixer pipeline reordered swaps: expected {} got {}",
            old.id,
            new.id
        );
        deltas.extend(SwapDelta::between(old, new));
    }
    Ok(deltas)
}
