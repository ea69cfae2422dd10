//! Sparse virtual slot array.
//!
//! Positions `0..capacity` are addressable; only Loading and Filled slots are
//! stored, an absent entry is Empty. Transitions:
//!
//!   Empty -> Loading -> Filled -> Empty
//!   Empty -> Filled             (pool had an item ready)
//!   Loading -> Empty            (fetch came back short)
//!
//! Filled -> Filled is rejected, as is filling an item that already sits in
//! another slot.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use verse_proto::protocol::SlotView;
use verse_proto::{Item, ItemId};

#[derive(Debug, Clone)]
pub enum Slot {
    Loading,
    Filled(Arc<Item>),
}

/// Borrowed view of a slot, including the implicit Empty state.
#[derive(Debug, Clone, Copy)]
pub enum SlotState<'a> {
    Empty,
    Loading,
    Filled(&'a Arc<Item>),
}

impl SlotState<'_> {
    fn name(&self) -> &'static str {
        match self {
            SlotState::Empty => "empty",
            SlotState::Loading => "loading",
            SlotState::Filled(_) => "filled",
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SlotState::Empty)
    }

    pub fn to_view(&self) -> SlotView {
        match self {
            SlotState::Empty => SlotView::Empty,
            SlotState::Loading => SlotView::Loading,
            SlotState::Filled(item) => SlotView::Filled {
                item: Item::clone(item),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("position {position} is outside 0..{capacity}")]
    OutOfRange { position: usize, capacity: usize },
    #[error("slot {position}: cannot go from {from} to {to}")]
    IllegalTransition {
        position: usize,
        from: &'static str,
        to: &'static str,
    },
    #[error("item {id} already fills slot {existing}")]
    DuplicateItem { id: ItemId, existing: usize },
}

#[derive(Debug)]
pub struct SlotArray {
    capacity: usize,
    slots: BTreeMap<usize, Slot>,
    /// Reverse index of Filled slots.
    filled_ids: HashMap<ItemId, usize>,
}

impl SlotArray {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: BTreeMap::new(),
            filled_ids: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn check(&self, position: usize) -> Result<(), SlotError> {
        if position >= self.capacity {
            return Err(SlotError::OutOfRange {
                position,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    pub fn state(&self, position: usize) -> SlotState<'_> {
        match self.slots.get(&position) {
            None => SlotState::Empty,
            Some(Slot::Loading) => SlotState::Loading,
            Some(Slot::Filled(item)) => SlotState::Filled(item),
        }
    }

    pub fn is_empty_at(&self, position: usize) -> bool {
        position < self.capacity && !self.slots.contains_key(&position)
    }

    /// Empty -> Loading.
    pub fn begin_loading(&mut self, position: usize) -> Result<(), SlotError> {
        self.check(position)?;
        let from = self.state(position);
        if !from.is_empty() {
            return Err(SlotError::IllegalTransition {
                position,
                from: from.name(),
                to: "loading",
            });
        }
        self.slots.insert(position, Slot::Loading);
        Ok(())
    }

    /// Empty | Loading -> Filled.
    pub fn fill(&mut self, position: usize, item: Arc<Item>) -> Result<(), SlotError> {
        self.check(position)?;
        if let SlotState::Filled(_) = self.state(position) {
            return Err(SlotError::IllegalTransition {
                position,
                from: "filled",
                to: "filled",
            });
        }
        if let Some(&existing) = self.filled_ids.get(&item.id) {
            return Err(SlotError::DuplicateItem {
                id: item.id,
                existing,
            });
        }
        self.filled_ids.insert(item.id, position);
        self.slots.insert(position, Slot::Filled(item));
        Ok(())
    }

    /// Loading -> Empty.
    pub fn cancel_loading(&mut self, position: usize) -> Result<(), SlotError> {
        self.check(position)?;
        match self.slots.get(&position) {
            Some(Slot::Loading) => {
                self.slots.remove(&position);
                Ok(())
            }
            _ => Err(SlotError::IllegalTransition {
                position,
                from: self.state(position).name(),
                to: "empty",
            }),
        }
    }

    /// Filled -> Empty, handing back the item.
    pub fn evict(&mut self, position: usize) -> Result<Arc<Item>, SlotError> {
        self.check(position)?;
        match self.slots.remove(&position) {
            Some(Slot::Filled(item)) => {
                self.filled_ids.remove(&item.id);
                Ok(item)
            }
            other => {
                let from = match other {
                    Some(slot) => {
                        self.slots.insert(position, slot);
                        "loading"
                    }
                    None => "empty",
                };
                Err(SlotError::IllegalTransition {
                    position,
                    from,
                    to: "empty",
                })
            }
        }
    }

    pub fn filled_positions(&self) -> Vec<usize> {
        self.slots
            .iter()
            .filter(|(_, s)| matches!(s, Slot::Filled(_)))
            .map(|(&p, _)| p)
            .collect()
    }

    pub fn loading_positions(&self) -> Vec<usize> {
        self.slots
            .iter()
            .filter(|(_, s)| matches!(s, Slot::Loading))
            .map(|(&p, _)| p)
            .collect()
    }

    pub fn filled_count(&self) -> usize {
        self.filled_ids.len()
    }

    pub fn loading_count(&self) -> usize {
        self.slots.len() - self.filled_ids.len()
    }

    pub fn position_of(&self, id: &ItemId) -> Option<usize> {
        self.filled_ids.get(id).copied()
    }

    /// Views for `range`, clamped to the array.
    pub fn views(&self, range: std::ops::RangeInclusive<usize>) -> Vec<(usize, SlotView)> {
        let end = (*range.end()).min(self.capacity.saturating_sub(1));
        if self.capacity == 0 || *range.start() > end {
            return Vec::new();
        }
        (*range.start()..=end)
            .map(|p| (p, self.state(p).to_view()))
            .collect()
    }
}
