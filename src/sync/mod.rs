//! Best-effort reconciliation of a user's swaps.
//!
//! [`SyncCoordinator::sync`] runs the pending, expired and failed phases in
//! order on a background task. Concurrent calls for the same user attach to
//! the task already running. Failures end the run, are logged and are never
//! returned to the caller; the next call starts again from the first phase.

pub mod inflight;
pub mod phase;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::Instrument as _;
use uuid::Uuid;

use crate::fixer::FixerPipeline;
use crate::sources::{StatusSource, SwapStore};
use inflight::InFlight;
use phase::{Phase, run_phase};

#[derive(Clone)]
pub struct SyncCoordinator {
    engine: Arc<SyncEngine>,
    in_flight: InFlight<String>,
}

struct SyncEngine {
    store: Arc<dyn SwapStore>,
    status_source: Arc<dyn StatusSource>,
    pipeline: FixerPipeline,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn SwapStore>,
        status_source: Arc<dyn StatusSource>,
        pipeline: FixerPipeline,
    ) -> Self {
        Self {
            engine: Arc::new(SyncEngine {
                store,
                status_source,
                pipeline,
            }),
            in_flight: InFlight::new(),
        }
    }

    pub async fn sync(&self, user_id: &str) {
        let engine = self.engine.clone();
        let user_id = user_id.to_string();

        self.in_flight
            .run_deduplicated(user_id.clone(), move || {
                let span =
                    tracing::info_span!("swap_sync", user_id = %user_id, run_id = %Uuid::new_v4());
                async move {
                    match engine.run(&user_id).await {
                        Ok(()) => tracing::debug!("swap sync finished"),
                        Err(err) => {
                            tracing::warn!(error = %format!("{err:#}"), "swap sync failed");
                        }
                    }
                }
                .instrument(span)
            })
            .await;
    }

    pub fn is_syncing(&self, user_id: &str) -> bool {
        self.in_flight.contains(&user_id.to_string())
    }
}

impl SyncEngine {
    async fn run(&self, user_id: &str) -> Result<()> {
        for phase in Phase::ORDER {
            let outcome = run_phase(
                phase,
                user_id,
                self.store.as_ref(),
                self.status_source.as_ref(),
                &self.pipeline,
            )
            .await
            .with_context(|| format!("{phase} phase"))?;

            if outcome.updated > 0 {
                tracing::info!(
                    %phase,
                    candidates = outcome.candidates,
                    updated = outcome.updated,
                    "persisted swap corrections"
                );
            } else {
                tracing::debug!(%phase, candidates = outcome.candidates, "no swap corrections");
            }
        }
        Ok(())
    }
}
