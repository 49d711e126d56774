//! Generational arena owning pending operations and tasks.
//!
//! A [`Key`] names one occupant of one slot. Freed slots are reused with the
//! next generation, so a key that outlived its entry never reaches the new
//! occupant.

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Key {
  generation: u32,
  slot: u32,
}

impl Key {
  pub fn as_u64(&self) -> u64 {
    ((self.generation as u64) << 32) | (self.slot as u64)
  }

  #[cfg(test)]
  pub fn from_u64(packed: u64) -> Self {
    Key { slot: (packed & 0xFFFF_FFFF) as u32, generation: (packed >> 32) as u32 }
  }

  fn next_generation(self) -> Self {
    Key { slot: self.slot, generation: self.generation.wrapping_add(1) }
  }
}

enum Entry<T> {
  Occupied { generation: u32, value: T },
  Vacant { generation: u32 },
}

pub(crate) struct Store<T> {
  entries: Vec<Entry<T>>,
  free: Vec<Key>,
  len: usize,
}

impl<T> Store<T> {
  pub fn with_capacity(cap: usize) -> Self {
    Self { entries: Vec::with_capacity(cap), free: Vec::new(), len: 0 }
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn insert(&mut self, value: T) -> Key {
    let key = match self.free.pop() {
      Some(freed) => freed.next_generation(),
      None => {
        let slot = u32::try_from(self.entries.len())
          .expect("store exceeded u32::MAX slots");
        self.entries.push(Entry::Vacant { generation: 0 });
        Key { slot, generation: 0 }
      }
    };

    let entry = &mut self.entries[key.slot as usize];
    assert!(
      matches!(entry, Entry::Vacant { .. }),
      "Store::insert: slot {} is already occupied",
      key.slot
    );
    *entry = Entry::Occupied { generation: key.generation, value };
    self.len += 1;
    key
  }

  pub fn get_mut(&mut self, key: Key) -> Option<&mut T> {
    match self.entries.get_mut(key.slot as usize)? {
      Entry::Occupied { generation, value } if *generation == key.generation => {
        Some(value)
      }
      _ => None,
    }
  }

  pub fn contains(&self, key: Key) -> bool {
    matches!(
      self.entries.get(key.slot as usize),
      Some(Entry::Occupied { generation, .. }) if *generation == key.generation
    )
  }

  pub fn remove(&mut self, key: Key) -> Option<T> {
    if !self.contains(key) {
      return None;
    }
    let entry = std::mem::replace(
      &mut self.entries[key.slot as usize],
      Entry::Vacant { generation: key.generation },
    );
    self.free.push(key);
    self.len -= 1;
    match entry {
      Entry::Occupied { value, .. } => Some(value),
      Entry::Vacant { .. } => unreachable!("checked occupied above"),
    }
  }

  /// Removes every occupant, in slot order.
  pub fn drain(&mut self) -> Vec<T> {
    let mut out = Vec::with_capacity(self.len);
    for slot in 0..self.entries.len() {
      if let Entry::Occupied { generation, .. } = self.entries[slot] {
        let key = Key { slot: slot as u32, generation };
        out.extend(self.remove(key));
      }
    }
    out
  }
}
