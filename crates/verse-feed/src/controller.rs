//! Prefetch/evict policy over the pool and slot array.
//!
//! The controller is synchronous and owns no I/O: a move fills what the pool
//! can serve and parks the rest as Loading. The caller fetches a batch and
//! hands it back through [`WindowController::accept_batch`].
//!
//! Within one move, eviction runs before filling. Evicted items are back in
//! the pool before the fill pass draws from it, and the evict distance always
//! exceeds the prefetch reach, so a slot is never evicted and refilled in the
//! same move.

use std::sync::Arc;
use tracing::{debug, warn};
use verse_proto::config::FeedConfig;
use verse_proto::protocol::PositionedSlot;
use verse_proto::{Item, ItemId};

use crate::pool::{AddReport, PoemPool};
use crate::slots::{SlotArray, SlotError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("cursor position {position} is outside 0..{capacity}")]
    OutOfRange { position: usize, capacity: usize },
    #[error(transparent)]
    Slot(#[from] SlotError),
}

/// Slot transitions produced by one policy pass.
#[derive(Debug, Default)]
pub struct FillOutcome {
    /// Empty|Loading -> Filled, in fill order.
    pub filled: Vec<(usize, Arc<Item>)>,
    /// Empty -> Loading; waiting on a fetch.
    pub loading: Vec<usize>,
    /// Loading -> Empty; the fetch did not bring enough items.
    pub abandoned: Vec<usize>,
}

impl FillOutcome {
    pub fn needs_fetch(&self) -> bool {
        !self.loading.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct MoveOutcome {
    pub cursor: usize,
    /// Ids released by an eviction pass run as part of this move.
    pub released: Vec<ItemId>,
    pub fill: FillOutcome,
}

#[derive(Debug)]
pub struct WindowController {
    config: FeedConfig,
    pool: PoemPool,
    slots: SlotArray,
    cursor: usize,
    moves_since_evict: usize,
}

impl WindowController {
    pub fn new(config: FeedConfig) -> Self {
        let slots = SlotArray::new(config.capacity);
        Self {
            config,
            pool: PoemPool::new(),
            slots,
            cursor: 0,
            moves_since_evict: 0,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn pool(&self) -> &PoemPool {
        &self.pool
    }

    pub fn slots(&self) -> &SlotArray {
        &self.slots
    }

    /// Empty slots around `p` that a fill pass would target, nearest first.
    /// At equal distance the slot ahead of the cursor comes first.
    pub fn targets(&self, p: usize) -> Vec<usize> {
        let capacity = self.slots.capacity();
        if p >= capacity {
            return Vec::new();
        }
        let mut targets = vec![p];
        for d in 1..=self.config.ahead.max(self.config.behind) {
            if d <= self.config.ahead && p + d < capacity {
                targets.push(p + d);
            }
            if d <= self.config.behind && d <= p {
                targets.push(p - d);
            }
        }
        targets.retain(|&t| self.slots.is_empty_at(t));
        targets
    }

    /// Move the cursor to `p`: maybe evict, then fill around it.
    pub fn move_to(&mut self, p: usize) -> Result<MoveOutcome, FeedError> {
        let capacity = self.slots.capacity();
        if p >= capacity {
            return Err(FeedError::OutOfRange {
                position: p,
                capacity,
            });
        }
        self.cursor = p;
        self.moves_since_evict += 1;

        let released = if self.moves_since_evict >= self.config.evict_every {
            self.moves_since_evict = 0;
            self.evict()
        } else {
            Vec::new()
        };

        let fill = self.fill_targets();
        Ok(MoveOutcome {
            cursor: p,
            released,
            fill,
        })
    }

    /// Fill every Empty target around the cursor from the pool; targets the
    /// pool cannot serve go Loading.
    pub fn fill_targets(&mut self) -> FillOutcome {
        let mut outcome = FillOutcome::default();
        for target in self.targets(self.cursor) {
            match self.pool.take() {
                Some(item) => {
                    if let Some(item) = self.place(target, item) {
                        outcome.filled.push((target, item));
                    }
                }
                None => match self.slots.begin_loading(target) {
                    Ok(()) => outcome.loading.push(target),
                    Err(e) => warn!("[feed] {}", e),
                },
            }
        }
        outcome
    }

    /// Pool a fetched batch and retry every Loading slot, nearest to the
    /// cursor first. Slots still unserved go back to Empty.
    pub fn accept_batch(&mut self, batch: Vec<Item>) -> (AddReport, FillOutcome) {
        let report = self.pool.add_batch(batch);
        debug!(
            "[feed] batch pooled: +{} (dup ids {}, dup content {}), {} unconsumed",
            report.added,
            report.duplicate_ids,
            report.duplicate_content,
            self.pool.unconsumed_count()
        );

        let mut outcome = FillOutcome::default();
        for position in self.loading_by_distance() {
            match self.pool.take() {
                Some(item) => {
                    if let Some(item) = self.place(position, item) {
                        outcome.filled.push((position, item));
                    }
                }
                None => {
                    if self.slots.cancel_loading(position).is_ok() {
                        outcome.abandoned.push(position);
                    }
                }
            }
        }
        (report, outcome)
    }

    /// Re-run the fill pass for targets an earlier shortfall left Empty.
    /// A no-op while the pool has nothing unconsumed, so an exhausted source
    /// cannot turn this into a fetch loop.
    pub fn retry_empty_targets(&mut self) -> FillOutcome {
        if self.pool.unconsumed_count() == 0 || self.targets(self.cursor).is_empty() {
            return FillOutcome::default();
        }
        self.fill_targets()
    }

    /// Loading -> Empty for every parked slot. Used when a fetch produced
    /// nothing at all.
    pub fn abandon_loading(&mut self) -> Vec<usize> {
        let mut abandoned = Vec::new();
        for position in self.slots.loading_positions() {
            if self.slots.cancel_loading(position).is_ok() {
                abandoned.push(position);
            }
        }
        abandoned
    }

    /// Empty every Filled slot further than the evict distance from the
    /// cursor and release its item back to the pool.
    pub fn evict(&mut self) -> Vec<ItemId> {
        let mut released = Vec::new();
        for position in self.slots.filled_positions() {
            if position.abs_diff(self.cursor) <= self.config.evict_distance {
                continue;
            }
            match self.slots.evict(position) {
                Ok(item) => {
                    self.pool.release(&item.id);
                    released.push(item.id);
                }
                Err(e) => warn!("[feed] eviction: {}", e),
            }
        }
        if !released.is_empty() {
            debug!(
                "[feed] evicted {} slots around cursor {}",
                released.len(),
                self.cursor
            );
        }
        released
    }

    pub fn needs_replenish(&self) -> bool {
        self.pool.unconsumed_count() < self.config.replenish_floor
    }

    pub fn has_loading(&self) -> bool {
        self.slots.loading_count() > 0
    }

    /// Slots in the prefetch range around the cursor.
    pub fn window_views(&self) -> Vec<PositionedSlot> {
        let start = self.cursor.saturating_sub(self.config.behind);
        let end = self.cursor + self.config.ahead;
        self.slots
            .views(start..=end)
            .into_iter()
            .map(|(position, slot)| PositionedSlot { position, slot })
            .collect()
    }

    fn loading_by_distance(&self) -> Vec<usize> {
        let mut loading = self.slots.loading_positions();
        let cursor = self.cursor;
        loading.sort_by_key(|&p| (p.abs_diff(cursor), p < cursor));
        loading
    }

    /// Put a freshly taken item into a slot and hand it back on success. On
    /// failure the item stays consumed only if it already occupies another
    /// slot.
    fn place(&mut self, position: usize, item: Arc<Item>) -> Option<Arc<Item>> {
        let id = item.id;
        match self.slots.fill(position, Arc::clone(&item)) {
            Ok(()) => Some(item),
            Err(SlotError::DuplicateItem { .. }) => {
                warn!("[feed] {} is already on screen, not placing it at {}", id, position);
                None
            }
            Err(e) => {
                warn!("[feed] {}", e);
                self.pool.release(&id);
                None
            }
        }
    }
}
