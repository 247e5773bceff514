//! Ordered, bounded collection of pipeline items
//!
//! Items are addressed by [`ItemId`] only, never by position, so a task that
//! finishes after the user reordered or removed items still updates the
//! right slot (or nothing at all). The collection size always stays within
//! the bounds of its [`CollectionKind`].

use crate::error::{Error, Result};
use crate::types::{CollectionKind, ItemId, ItemPatch, ItemStatus, PipelineItem};

/// Reorderable list of items with stable identities
#[derive(Clone, Debug)]
pub struct ItemCollection {
    kind: CollectionKind,
    items: Vec<PipelineItem>,
    next_id: u64,
}

impl ItemCollection {
    /// New collection holding the minimum number of empty items
    pub fn new(kind: CollectionKind) -> Self {
        let mut collection = Self {
            kind,
            items: Vec::with_capacity(kind.max()),
            next_id: 1,
        };
        for _ in 0..kind.min() {
            let id = collection.mint_id();
            collection.items.push(PipelineItem::empty(id));
        }
        collection
    }

    fn mint_id(&mut self) -> ItemId {
        let id = ItemId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Collection kind and therefore its bounds
    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Never true for a collection with a non-zero minimum
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in submission order
    pub fn items(&self) -> &[PipelineItem] {
        &self.items
    }

    /// Look up an item
    pub fn get(&self, id: ItemId) -> Option<&PipelineItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Current index of an item
    pub fn position(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    /// Whether another item fits
    pub fn can_add(&self) -> bool {
        self.items.len() < self.kind.max()
    }

    /// Whether an item may be removed without going below the minimum
    pub fn can_remove(&self) -> bool {
        self.items.len() > self.kind.min()
    }

    /// Append an empty item; `None` when the collection is full
    pub fn add(&mut self) -> Option<ItemId> {
        if !self.can_add() {
            return None;
        }
        let id = self.mint_id();
        self.items.push(PipelineItem::empty(id));
        Some(id)
    }

    /// Remove an item; false at the minimum size or for an unknown id
    pub fn remove(&mut self, id: ItemId) -> bool {
        if !self.can_remove() {
            return false;
        }
        match self.position(id) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }

    /// Insert a copy of an item right after it
    ///
    /// An item that is still being acquired is copied as an empty slot, since
    /// no task will ever write to the copy.
    pub fn duplicate(&mut self, id: ItemId) -> Option<ItemId> {
        if !self.can_add() {
            return None;
        }
        let index = self.position(id)?;
        let new_id = self.mint_id();
        let source = &self.items[index];
        let copy = if source.status.is_active() {
            PipelineItem::empty(new_id)
        } else {
            PipelineItem {
                id: new_id,
                ..source.clone()
            }
        };
        self.items.insert(index + 1, copy);
        Some(new_id)
    }

    /// Move `moved` to the index `target` currently occupies
    pub fn reorder(&mut self, moved: ItemId, target: ItemId) -> bool {
        if moved == target {
            return false;
        }
        let (Some(from), Some(to)) = (self.position(moved), self.position(target)) else {
            return false;
        };
        let item = self.items.remove(from);
        self.items.insert(to, item);
        true
    }

    /// Merge a patch into an item by id
    ///
    /// Returns `Ok(false)` when the id is gone, so late task results for a
    /// removed item are dropped. An illegal status change is rejected and
    /// leaves the item untouched.
    pub fn patch(&mut self, id: ItemId, patch: ItemPatch) -> Result<bool> {
        let Some(item) = self.items.iter_mut().find(|item| item.id == id) else {
            return Ok(false);
        };

        if let Some(next) = patch.status
            && !item.status.can_transition_to(next)
        {
            return Err(Error::InvalidTransition {
                id,
                from: item.status,
                to: next,
            });
        }

        if let Some(origin) = patch.origin {
            item.origin = origin;
        }
        if let Some(source) = patch.source {
            item.source = Some(source);
        }
        if let Some(derived_ref) = patch.derived_ref {
            item.derived_ref = derived_ref;
        }
        if let Some(preview_ref) = patch.preview_ref {
            item.preview_ref = Some(preview_ref);
        }
        if let Some(duration) = patch.duration_secs {
            item.duration_secs = Some(duration);
        }
        if let Some(prompt) = patch.prompt {
            item.prompt = Some(prompt);
        }
        if let Some(status) = patch.status {
            item.status = status;
        }

        if item.status == ItemStatus::Error {
            if let Some(message) = patch.error_message {
                item.error_message = Some(message);
            }
        } else {
            item.error_message = None;
        }

        Ok(true)
    }

    /// Items that are ready with a server reference
    pub fn ready_count(&self) -> usize {
        self.items.iter().filter(|i| i.is_submittable()).count()
    }

    /// Items currently owned by an acquisition task
    pub fn active_count(&self) -> usize {
        self.items.iter().filter(|i| i.status.is_active()).count()
    }

    /// Whether any acquisition is in flight
    pub fn has_active_work(&self) -> bool {
        self.items.iter().any(|i| i.status.is_active())
    }

    /// Enough ready items for a submission
    pub fn is_valid(&self) -> bool {
        self.ready_count() >= self.kind.min()
    }

    /// Summed duration of ready items, in seconds
    pub fn total_ready_duration(&self) -> f64 {
        self.items
            .iter()
            .filter(|i| i.is_submittable())
            .filter_map(|i| i.duration_secs)
            .sum()
    }
}
