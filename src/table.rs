/// One slot of a [`HashTable`]
#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    hash: u64,
    /// Value + 1, zero marks an empty slot
    value: u32,
}

/// Open-addressed, linear-probed table keyed by precomputed hashes
///
/// Only the hash of a key is stored, never the key itself. Two distinct keys
/// with the same hash are indistinguishable: the first inserted value wins and
/// later inserts for that hash are dropped.
#[derive(Debug, Clone)]
pub struct HashTable {
    slots: Vec<Slot>,
    len: usize,
}

impl HashTable {
    /// Capacity used for `n_items` keys: the next power of two of `sqrt(2) * n_items`
    pub fn capacity_for(n_items: usize) -> usize {
        if n_items == 0 {
            return 1;
        }
        let exp = ((n_items as f64).log2() + 0.5).ceil() as u32;
        1usize << exp
    }

    /// Create an empty table sized for `n_items` keys
    pub fn with_items(n_items: usize) -> Self {
        Self {
            slots: vec![Slot::default(); Self::capacity_for(n_items)],
            len: 0,
        }
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    /// Insert `value` under `hash`.
    ///
    /// Returns `false` when the hash is already present (the existing value is
    /// kept) or when the table has no free slot left.
    pub fn insert(&mut self, hash: u64, value: u32) -> bool {
        // one slot always stays empty so that probing terminates
        if self.len + 1 >= self.slots.len() || value == u32::MAX {
            return false;
        }
        let mask = self.mask();
        let mut i = hash as usize & mask;
        loop {
            let slot = &mut self.slots[i];
            if slot.value == 0 {
                *slot = Slot {
                    hash,
                    value: value + 1,
                };
                self.len += 1;
                return true;
            }
            if slot.hash == hash {
                return false;
            }
            i = (i + 1) & mask;
        }
    }

    /// Look up the value stored under `hash`
    #[inline]
    pub fn get(&self, hash: u64) -> Option<u32> {
        let mask = self.mask();
        let mut i = hash as usize & mask;
        loop {
            let slot = self.slots[i];
            if slot.value == 0 {
                return None;
            }
            if slot.hash == hash {
                return Some(slot.value - 1);
            }
            i = (i + 1) & mask;
        }
    }
}
