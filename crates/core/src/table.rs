//! Open-addressed hash table keyed by interned strings
//!
//! Linear probing with tombstone-aware deletion. Because keys are interned,
//! key comparison inside a probe is a pointer comparison; the stored FNV-1a
//! hash picks the starting bucket.
//!
//! Slot states:
//! - live:      `key: Some(_)`
//! - empty:     `key: None, value: Nil`
//! - tombstone: `key: None, value: Bool(true)`
//!
//! A probe sequence ends at an empty slot, never at a tombstone, so deleted
//! slots do not break chains. The table grows at 75% load (counting
//! tombstones); rehashing drops tombstones and recomputes the count, so
//! every probe sequence terminates.

use crate::object::ObjString;
use crate::value::Value;
use std::rc::Rc;

const MIN_CAPACITY: usize = 8;

#[derive(Clone)]
struct Entry {
    key: Option<Rc<ObjString>>,
    value: Value,
}

impl Entry {
    fn empty() -> Entry {
        Entry {
            key: None,
            value: Value::Nil,
        }
    }

    fn is_tombstone(&self) -> bool {
        self.key.is_none() && !matches!(self.value, Value::Nil)
    }
}

/// Hash map from interned string to [`Value`].
pub struct Table {
    /// Live entries plus tombstones; never decremented by delete.
    count: usize,
    entries: Vec<Entry>,
}

impl Table {
    pub fn new() -> Table {
        Table {
            count: 0,
            entries: Vec::new(),
        }
    }

    /// Find the slot for `key`: either its live entry, or the insertion
    /// site (the first tombstone seen along the probe, else the empty slot
    /// that terminated it).
    fn find_entry(entries: &[Entry], key: &Rc<ObjString>) -> usize {
        let capacity = entries.len();
        let mut index = key.hash() as usize % capacity;
        let mut tombstone = None;
        loop {
            let entry = &entries[index];
            match &entry.key {
                Some(existing) => {
                    if Rc::ptr_eq(existing, key) {
                        return index;
                    }
                }
                None => {
                    if entry.is_tombstone() {
                        if tombstone.is_none() {
                            tombstone = Some(index);
                        }
                    } else {
                        return tombstone.unwrap_or(index);
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }

    pub fn get(&self, key: &Rc<ObjString>) -> Option<&Value> {
        if self.count == 0 {
            return None;
        }
        let entry = &self.entries[Self::find_entry(&self.entries, key)];
        entry.key.as_ref().map(|_| &entry.value)
    }

    /// Insert or overwrite. Returns true when the key was previously absent.
    pub fn set(&mut self, key: Rc<ObjString>, value: Value) -> bool {
        // Load factor 0.75, counting tombstones.
        if (self.count + 1) * 4 > self.entries.len() * 3 {
            self.grow();
        }

        let index = Self::find_entry(&self.entries, &key);
        let entry = &mut self.entries[index];
        let is_new = entry.key.is_none();
        // A reclaimed tombstone is already in the count.
        if is_new && !entry.is_tombstone() {
            self.count += 1;
        }
        entry.key = Some(key);
        entry.value = value;
        is_new
    }

    /// Replace the entry with a tombstone. Returns true if the key was
    /// present. The count is unchanged: tombstones still occupy probe slots.
    pub fn delete(&mut self, key: &Rc<ObjString>) -> bool {
        if self.count == 0 {
            return false;
        }
        let index = Self::find_entry(&self.entries, key);
        let entry = &mut self.entries[index];
        if entry.key.is_none() {
            return false;
        }
        entry.key = None;
        entry.value = Value::Bool(true);
        true
    }

    /// Content lookup for the interner: probe by a precomputed hash and
    /// compare candidates by length, hash, then bytes. This is the one
    /// place content comparison happens; it lets interning check for an
    /// existing string without allocating one.
    pub fn find_string(&self, text: &str, hash: u32) -> Option<Rc<ObjString>> {
        if self.count == 0 {
            return None;
        }
        let capacity = self.entries.len();
        let mut index = hash as usize % capacity;
        loop {
            let entry = &self.entries[index];
            match &entry.key {
                Some(key) => {
                    if key.len() == text.len() && key.hash() == hash && key.as_str() == text {
                        return Some(Rc::clone(key));
                    }
                }
                None => {
                    if !entry.is_tombstone() {
                        return None;
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }

    fn grow(&mut self) {
        let capacity = if self.entries.len() < MIN_CAPACITY {
            MIN_CAPACITY
        } else {
            self.entries.len() * 2
        };
        let old = std::mem::replace(&mut self.entries, vec![Entry::empty(); capacity]);

        // Re-insert live entries only; tombstones are dropped and the count
        // rebuilt from scratch.
        self.count = 0;
        for entry in old {
            if let Some(key) = entry.key {
                let index = Self::find_entry(&self.entries, &key);
                self.entries[index] = Entry {
                    key: Some(key),
                    value: entry.value,
                };
                self.count += 1;
            }
        }
    }

    #[cfg(test)]
    fn capacity(&self) -> usize {
        self.entries.len()
    }
}

impl Default for Table {
    fn default() -> Table {
        Table::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strings::Strings;

    #[test]
    fn test_set_then_get() {
        let mut strings = Strings::new();
        let mut table = Table::new();
        let key = strings.intern("answer");
        assert!(table.set(Rc::clone(&key), Value::Number(42.0)));
        assert_eq!(table.get(&key), Some(&Value::Number(42.0)));
    }

    #[test]
    fn test_overwrite_does_not_count_twice() {
        let mut strings = Strings::new();
        let mut table = Table::new();
        let key = strings.intern("k");
        assert!(table.set(Rc::clone(&key), Value::Number(1.0)));
        assert!(!table.set(Rc::clone(&key), Value::Number(2.0)));
        assert_eq!(table.get(&key), Some(&Value::Number(2.0)));
        assert_eq!(table.count, 1);
    }

    #[test]
    fn test_get_missing() {
        let mut strings = Strings::new();
        let mut table = Table::new();
        let present = strings.intern("present");
        let absent = strings.intern("absent");
        table.set(present, Value::Nil);
        assert_eq!(table.get(&absent), None);
    }

    #[test]
    fn test_delete_then_get() {
        let mut strings = Strings::new();
        let mut table = Table::new();
        let key = strings.intern("gone");
        table.set(Rc::clone(&key), Value::Bool(true));
        assert!(table.delete(&key));
        assert_eq!(table.get(&key), None);
        assert!(!table.delete(&key));
    }

    #[test]
    fn test_tombstone_does_not_break_probe_chain() {
        let mut strings = Strings::new();
        let mut table = Table::new();
        // Fill enough that some keys collide, then delete from the middle
        // of chains and verify every survivor is still reachable.
        let keys: Vec<_> = (0..32).map(|i| strings.intern(&format!("key{i}"))).collect();
        for (i, key) in keys.iter().enumerate() {
            table.set(Rc::clone(key), Value::Number(i as f64));
        }
        for key in keys.iter().step_by(2) {
            assert!(table.delete(key));
        }
        for (i, key) in keys.iter().enumerate() {
            if i % 2 == 0 {
                assert_eq!(table.get(key), None);
            } else {
                assert_eq!(table.get(key), Some(&Value::Number(i as f64)));
            }
        }
    }

    #[test]
    fn test_tombstone_slot_is_reused() {
        let mut strings = Strings::new();
        let mut table = Table::new();
        let key = strings.intern("slot");
        table.set(Rc::clone(&key), Value::Number(1.0));
        let count_before = table.count;
        table.delete(&key);
        // Re-inserting the same key reclaims the tombstone without growing
        // the count.
        assert!(table.set(Rc::clone(&key), Value::Number(2.0)));
        assert_eq!(table.count, count_before);
        assert_eq!(table.get(&key), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_growth_preserves_entries_and_drops_tombstones() {
        let mut strings = Strings::new();
        let mut table = Table::new();
        let doomed = strings.intern("doomed");
        table.set(Rc::clone(&doomed), Value::Nil);
        table.delete(&doomed);

        let keys: Vec<_> = (0..100).map(|i| strings.intern(&format!("g{i}"))).collect();
        for (i, key) in keys.iter().enumerate() {
            table.set(Rc::clone(key), Value::Number(i as f64));
        }
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(table.get(key), Some(&Value::Number(i as f64)));
        }
        // After at least one rehash, only live entries remain in the count.
        assert_eq!(table.count, 100);
        // Load stays at or below 0.75.
        assert!(table.count * 4 <= table.capacity() * 3);
    }

    #[test]
    fn test_find_string_by_content() {
        let mut strings = Strings::new();
        let mut table = Table::new();
        let key = strings.intern("needle");
        table.set(Rc::clone(&key), Value::Nil);

        let found = table.find_string("needle", key.hash());
        assert!(found.is_some_and(|f| Rc::ptr_eq(&f, &key)));
        assert!(
            table
                .find_string("haystack", crate::object::hash_bytes(b"haystack"))
                .is_none()
        );
    }
}
