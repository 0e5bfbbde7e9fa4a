//! Delta reconciliation with snapshot bootstrap.
//!
//! The reconciler owns the book and decides, for each incoming batch, whether
//! it can be applied now:
//!
//! 1. Until a snapshot lands, batches are buffered in arrival order.
//! 2. The snapshot replaces both sides of the book.
//! 3. Buffered batches are replayed on top of it and the book goes live.
//! 4. Live batches are applied immediately.
//!
//! Under [`SequencePolicy::Verify`] batches that carry update ids are also
//! checked for continuity: stale batches are dropped and a gap sends the
//! reconciler back to step 1. A buffer overflow does the same under either
//! policy, since a replay with missing batches cannot be trusted.

use std::collections::VecDeque;

use model::{DepthSnapshot, DepthUpdate, SequencePolicy};
use tracing::{debug, info, warn};

use crate::book::{ApplySummary, OrderBook};
use crate::error::OrderBookError;

/// Maximum number of batches held while waiting for a snapshot. Overflow
/// discards the buffer and asks for a fresh snapshot.
pub const MAX_BUFFERED_UPDATES: usize = 1000;

#[derive(Debug)]
enum Phase {
    /// Waiting for the snapshot of `bootstrap_id`. `None` means a snapshot is
    /// needed but none has been requested yet.
    Bootstrapping {
        bootstrap_id: Option<u64>,
        buffer: VecDeque<DepthUpdate>,
    },
    Live {
        last_update_id: Option<u64>,
    },
}

/// Result of feeding one batch to the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(ApplySummary),
    /// Held until the pending snapshot is applied.
    Buffered,
    /// Already covered by the book (update ids at or below the last applied id).
    Dropped,
    /// Sequence gap or buffer overflow; the batch was buffered and a fresh
    /// snapshot is required.
    NeedSnapshot,
}

/// Result of completing a bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapshotOutcome {
    /// Changes made by the snapshot itself plus the replayed batches.
    pub summary: ApplySummary,
    /// Buffered batches applied after the snapshot.
    pub replayed: usize,
    /// Buffered batches discarded as stale or disconnected from the snapshot.
    pub dropped: usize,
}

/// Applies snapshots and delta batches to an [`OrderBook`].
#[derive(Debug)]
pub struct OrderBookReconciler {
    book: OrderBook,
    phase: Phase,
    policy: SequencePolicy,
}

impl OrderBookReconciler {
    /// Create a reconciler for an empty book. Deltas are buffered until the first snapshot.
    pub fn new(symbol: impl Into<String>, policy: SequencePolicy) -> Self {
        Self {
            book: OrderBook::new(symbol),
            phase: Phase::Bootstrapping {
                bootstrap_id: None,
                buffer: VecDeque::new(),
            },
            policy,
        }
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn policy(&self) -> SequencePolicy {
        self.policy
    }

    /// True once a snapshot (or a degraded bootstrap) has completed.
    pub fn is_live(&self) -> bool {
        matches!(self.phase, Phase::Live { .. })
    }

    /// Bootstrap currently awaited, if any.
    pub fn pending_bootstrap(&self) -> Option<u64> {
        match &self.phase {
            Phase::Bootstrapping { bootstrap_id, .. } => *bootstrap_id,
            Phase::Live { .. } => None,
        }
    }

    /// Number of batches waiting for the snapshot.
    pub fn buffered_len(&self) -> usize {
        match &self.phase {
            Phase::Bootstrapping { buffer, .. } => buffer.len(),
            Phase::Live { .. } => 0,
        }
    }

    /// Last update id applied, when the feed supplies ids.
    pub fn last_update_id(&self) -> Option<u64> {
        match &self.phase {
            Phase::Live { last_update_id } => *last_update_id,
            Phase::Bootstrapping { .. } => None,
        }
    }

    /// Start the bootstrap of a new depth connection.
    ///
    /// Anything buffered so far came from an earlier connection and is
    /// discarded. The book keeps its contents until the snapshot replaces them.
    pub fn begin_bootstrap(&mut self, bootstrap_id: u64) {
        if let Phase::Bootstrapping { buffer, .. } = &self.phase {
            if !buffer.is_empty() {
                info!(
                    symbol = %self.book.symbol(),
                    discarded = buffer.len(),
                    "Discarding batches from previous connection"
                );
            }
        }
        debug!(symbol = %self.book.symbol(), bootstrap_id, "Bootstrap started");
        self.phase = Phase::Bootstrapping {
            bootstrap_id: Some(bootstrap_id),
            buffer: VecDeque::new(),
        };
    }

    /// Request a fresh snapshot on the same connection.
    ///
    /// Batches already buffered are kept and replayed once the snapshot of
    /// `bootstrap_id` lands.
    pub fn resync(&mut self, bootstrap_id: u64) {
        match &mut self.phase {
            Phase::Bootstrapping {
                bootstrap_id: current,
                buffer,
            } => {
                debug!(
                    symbol = %self.book.symbol(),
                    bootstrap_id,
                    buffered = buffer.len(),
                    "Resync started"
                );
                *current = Some(bootstrap_id);
            }
            Phase::Live { .. } => self.begin_bootstrap(bootstrap_id),
        }
    }

    /// Feed one delta batch.
    pub fn apply_update(&mut self, update: DepthUpdate) -> ApplyOutcome {
        let symbol = self.book.symbol().to_string();

        match &mut self.phase {
            Phase::Bootstrapping {
                bootstrap_id,
                buffer,
            } => {
                if buffer.len() >= MAX_BUFFERED_UPDATES {
                    warn!(
                        symbol = %symbol,
                        capacity = MAX_BUFFERED_UPDATES,
                        "Bootstrap buffer full, discarding it and re-syncing"
                    );
                    buffer.clear();
                    buffer.push_back(update);
                    // The pending snapshot can no longer be completed by this buffer
                    *bootstrap_id = None;
                    return ApplyOutcome::NeedSnapshot;
                }
                buffer.push_back(update);
                ApplyOutcome::Buffered
            }
            Phase::Live { last_update_id } => {
                if self.policy == SequencePolicy::Verify {
                    if let (Some(last), Some(first), Some(last_in_batch)) = (
                        *last_update_id,
                        update.first_update_id,
                        update.final_update_id,
                    ) {
                        if last_in_batch <= last {
                            return ApplyOutcome::Dropped;
                        }
                        if first > last + 1 {
                            warn!(
                                symbol = %symbol,
                                expected = last + 1,
                                got_first = first,
                                got_final = last_in_batch,
                                "Depth sequence gap detected, re-syncing"
                            );
                            let mut buffer = VecDeque::with_capacity(MAX_BUFFERED_UPDATES);
                            buffer.push_back(update);
                            self.phase = Phase::Bootstrapping {
                                bootstrap_id: None,
                                buffer,
                            };
                            return ApplyOutcome::NeedSnapshot;
                        }
                    }
                }

                if update.final_update_id.is_some() {
                    *last_update_id = update.final_update_id;
                }
                ApplyOutcome::Applied(self.book.apply_update(&update.bids, &update.asks))
            }
        }
    }

    /// Replace the book with `snapshot` and replay the buffered batches.
    ///
    /// Fails with [`OrderBookError::StaleSnapshot`] when `bootstrap_id` is not the
    /// bootstrap currently awaited; the book is left untouched in that case.
    pub fn apply_snapshot(
        &mut self,
        bootstrap_id: u64,
        snapshot: &DepthSnapshot,
    ) -> Result<SnapshotOutcome, OrderBookError> {
        let buffer = self.take_buffer(bootstrap_id)?;

        let mut outcome = SnapshotOutcome {
            summary: self.book.apply_snapshot(snapshot),
            ..SnapshotOutcome::default()
        };

        let verify = self.policy == SequencePolicy::Verify;
        let mut last_update_id = snapshot.last_update_id;
        let mut bridged = false;

        for update in buffer {
            if verify {
                if let (Some(last), Some(first), Some(last_in_batch)) =
                    (last_update_id, update.first_update_id, update.final_update_id)
                {
                    if last_in_batch <= last {
                        outcome.dropped += 1;
                        continue;
                    }
                    // The first replayed batch has to straddle the snapshot id.
                    if !bridged && first > last + 1 {
                        warn!(
                            symbol = %self.book.symbol(),
                            snapshot_id = last,
                            event_first = first,
                            event_final = last_in_batch,
                            "Gap between snapshot and first buffered event"
                        );
                        outcome.dropped += 1;
                        continue;
                    }
                    bridged = true;
                }
            }

            if update.final_update_id.is_some() {
                last_update_id = update.final_update_id;
            }
            outcome
                .summary
                .merge(self.book.apply_update(&update.bids, &update.asks));
            outcome.replayed += 1;
        }

        self.phase = Phase::Live { last_update_id };

        info!(
            symbol = %self.book.symbol(),
            bootstrap_id,
            bid_levels = self.book.bid_levels(),
            ask_levels = self.book.ask_levels(),
            replayed = outcome.replayed,
            dropped = outcome.dropped,
            "Order book synchronized"
        );

        Ok(outcome)
    }

    /// Give up on the snapshot for `bootstrap_id` and go live on the last-known book.
    ///
    /// Buffered batches are replayed without continuity checks since there is
    /// no snapshot id to anchor them to.
    pub fn snapshot_failed(
        &mut self,
        bootstrap_id: u64,
        reason: &str,
    ) -> Result<SnapshotOutcome, OrderBookError> {
        let buffer = self.take_buffer(bootstrap_id)?;

        let mut outcome = SnapshotOutcome::default();
        let mut last_update_id = None;

        for update in buffer {
            if update.final_update_id.is_some() {
                last_update_id = update.final_update_id;
            }
            outcome
                .summary
                .merge(self.book.apply_update(&update.bids, &update.asks));
            outcome.replayed += 1;
        }

        self.phase = Phase::Live { last_update_id };

        warn!(
            symbol = %self.book.symbol(),
            bootstrap_id,
            reason = %reason,
            replayed = outcome.replayed,
            bid_levels = self.book.bid_levels(),
            ask_levels = self.book.ask_levels(),
            "Snapshot unavailable, continuing on last-known book"
        );

        Ok(outcome)
    }

    /// Drop all book state and wait for a new snapshot.
    pub fn reset(&mut self) {
        self.book.clear();
        self.phase = Phase::Bootstrapping {
            bootstrap_id: None,
            buffer: VecDeque::new(),
        };
    }

    fn take_buffer(
        &mut self,
        bootstrap_id: u64,
    ) -> Result<VecDeque<DepthUpdate>, OrderBookError> {
        match &mut self.phase {
            Phase::Bootstrapping {
                bootstrap_id: Some(current),
                buffer,
            } if *current == bootstrap_id => Ok(std::mem::take(buffer)),
            _ => Err(OrderBookError::StaleSnapshot { bootstrap_id }),
        }
    }
}
