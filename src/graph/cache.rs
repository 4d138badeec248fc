//! Per-node field cache.
//!
//! Maps a [`Field`] to the buffer last computed for it and the epoch in which
//! that happened. [`FieldCache::trigger`] opens a new epoch at the start of
//! every execute pass, so entries computed in earlier passes become stale
//! while their buffers stay available. Pulling the same field twice within
//! one pass finds it fresh and skips recomputation.

use crate::field::Field;
use crate::memory::Buffer;
use std::collections::BTreeMap;

/// Freshness of a cached field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    /// Never inserted, or cleared.
    Absent,
    /// Buffer present but must be recomputed before being read.
    Stale,
    /// Computed in the current epoch.
    Fresh,
}

/// Result of a cache lookup carrying the buffer when one exists.
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Absent,
    Stale(Buffer),
    Fresh(Buffer),
}

#[derive(Debug, Clone)]
struct CacheSlot {
    buffer: Buffer,
    updated_epoch: Option<u64>,
}

#[derive(Debug, Default)]
pub struct FieldCache {
    slots: BTreeMap<Field, CacheSlot>,
    epoch: u64,
}

impl FieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, field: Field) -> bool {
        self.slots.contains_key(&field)
    }

    /// Register a slot. With `mark_stale` the buffer must be recomputed
    /// before it is read; otherwise it counts as computed in this epoch.
    pub fn insert(&mut self, field: Field, buffer: Buffer, mark_stale: bool) {
        let updated_epoch = if mark_stale { None } else { Some(self.epoch) };
        self.slots.insert(
            field,
            CacheSlot {
                buffer,
                updated_epoch,
            },
        );
    }

    pub fn is_latest(&self, field: Field) -> bool {
        self.state(field) == FieldState::Fresh
    }

    pub fn state(&self, field: Field) -> FieldState {
        match self.slots.get(&field) {
            None => FieldState::Absent,
            Some(slot) if slot.updated_epoch == Some(self.epoch) => FieldState::Fresh,
            Some(_) => FieldState::Stale,
        }
    }

    pub fn lookup(&self, field: Field) -> CacheLookup {
        match self.slots.get(&field) {
            None => CacheLookup::Absent,
            Some(slot) if slot.updated_epoch == Some(self.epoch) => {
                CacheLookup::Fresh(slot.buffer.clone())
            }
            Some(slot) => CacheLookup::Stale(slot.buffer.clone()),
        }
    }

    /// Current buffer, possibly stale.
    pub fn get_value(&self, field: Field) -> Option<Buffer> {
        self.slots.get(&field).map(|slot| slot.buffer.clone())
    }

    /// Mark a field as recomputed in the current epoch.
    pub fn set_updated(&mut self, field: Field) {
        let epoch = self.epoch;
        if let Some(slot) = self.slots.get_mut(&field) {
            slot.updated_epoch = Some(epoch);
        }
    }

    /// Install a newly computed buffer as fresh.
    ///
    /// Published buffers are never mutated in place; consumers holding the
    /// previous buffer keep seeing the previous content.
    pub fn replace(&mut self, field: Field, buffer: Buffer) {
        self.insert(field, buffer, false);
    }

    /// Open a new epoch; every entry becomes stale.
    pub fn trigger(&mut self) {
        self.epoch += 1;
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Fields currently cached, in field order.
    pub fn keys(&self) -> Vec<Field> {
        self.slots.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::ElementKind;

    fn buffer() -> Buffer {
        Buffer::host_only(ElementKind::F32)
    }

    #[test]
    fn test_insert_stale_then_update() {
        let mut cache = FieldCache::new();
        assert_eq!(cache.state(Field::Distance), FieldState::Absent);

        cache.insert(Field::Distance, buffer(), true);
        assert!(cache.contains(Field::Distance));
        assert!(!cache.is_latest(Field::Distance));
        assert!(matches!(cache.lookup(Field::Distance), CacheLookup::Stale(_)));

        cache.set_updated(Field::Distance);
        assert!(cache.is_latest(Field::Distance));
    }

    #[test]
    fn test_trigger_makes_entries_stale() {
        let mut cache = FieldCache::new();
        cache.replace(Field::Xyz, buffer());
        assert!(cache.is_latest(Field::Xyz));

        cache.trigger();
        assert_eq!(cache.state(Field::Xyz), FieldState::Stale);
        assert!(cache.get_value(Field::Xyz).is_some());

        cache.set_updated(Field::Xyz);
        assert!(cache.is_latest(Field::Xyz));
    }

    #[test]
    fn test_replace_swaps_buffer() {
        let mut cache = FieldCache::new();
        let old = buffer();
        cache.replace(Field::Azimuth, old.clone());
        cache.trigger();
        let new = buffer();
        cache.replace(Field::Azimuth, new.clone());
        let current = cache.get_value(Field::Azimuth).unwrap();
        assert!(current.ptr_eq(&new));
        assert!(!current.ptr_eq(&old));
    }

    #[test]
    fn test_clear_and_keys() {
        let mut cache = FieldCache::new();
        cache.insert(Field::Normal, buffer(), true);
        cache.insert(Field::Distance, buffer(), true);
        assert_eq!(cache.keys(), vec![Field::Distance, Field::Normal]);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.state(Field::Normal), FieldState::Absent);
    }
}
