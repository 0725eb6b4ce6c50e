//! Entries of one tier: an id-keyed arena plus insertion order.

use phylactery_types::memory::{MemoryEntry, MemoryId};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
pub(crate) struct TierState {
    order: VecDeque<MemoryId>,
    entries: HashMap<MemoryId, MemoryEntry>,
}

impl TierState {
    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn push(&mut self, entry: MemoryEntry) {
        self.order.push_back(entry.id.clone());
        self.entries.insert(entry.id.clone(), entry);
    }

    pub(crate) fn pop_oldest(&mut self) -> Option<MemoryEntry> {
        let id = self.order.pop_front()?;
        self.entries.remove(&id)
    }

    pub(crate) fn remove(&mut self, id: &MemoryId) -> Option<MemoryEntry> {
        let entry = self.entries.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(entry)
    }

    pub(crate) fn get(&self, id: &MemoryId) -> Option<&MemoryEntry> {
        self.entries.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &MemoryId) -> Option<&mut MemoryEntry> {
        self.entries.get_mut(id)
    }

    /// Entries oldest first.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// Mutable entries, in no particular order.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut MemoryEntry> {
        self.entries.values_mut()
    }

    /// The newest `limit` entries, oldest first.
    pub(crate) fn newest(&self, limit: usize) -> Vec<MemoryEntry> {
        let skip = self.order.len().saturating_sub(limit);
        self.order
            .iter()
            .skip(skip)
            .filter_map(|id| self.entries.get(id))
            .cloned()
            .collect()
    }

    pub(crate) fn snapshot(&self) -> Vec<MemoryEntry> {
        self.iter().cloned().collect()
    }

    /// Empty the tier, returning the removed ids.
    pub(crate) fn drain_ids(&mut self) -> Vec<MemoryId> {
        self.entries.clear();
        self.order.drain(..).collect()
    }
}
