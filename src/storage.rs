use anyhow::{anyhow, Result};

/// Keyed record store owned by the surrounding service.
pub trait RecordStore<V> {
    /// Fails if `id` already exists.
    fn insert(&mut self, id: &str, value: V) -> Result<()>;

    fn get(&self, id: &str) -> Option<&V>;

    /// Apply `f` to the stored value. Fails if `id` is unknown.
    fn update(&mut self, id: &str, f: &mut dyn FnMut(&mut V)) -> Result<()>;

    fn remove(&mut self, id: &str) -> Option<V>;

    /// Values in insertion order, after skipping `skip`, at most `limit`.
    fn list(&self, skip: usize, limit: usize) -> Vec<&V>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Insertion-ordered in-memory store.
#[derive(Debug)]
pub struct InMemoryStore<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for InMemoryStore<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> InMemoryStore<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|(key, _)| key == id)
    }
}

impl<V> RecordStore<V> for InMemoryStore<V> {
    fn insert(&mut self, id: &str, value: V) -> Result<()> {
        if self.position(id).is_some() {
            return Err(anyhow!("record {} already exists", id));
        }
        self.entries.push((id.to_string(), value));
        Ok(())
    }

    fn get(&self, id: &str) -> Option<&V> {
        self.position(id).map(|i| &self.entries[i].1)
    }

    fn update(&mut self, id: &str, f: &mut dyn FnMut(&mut V)) -> Result<()> {
        let i = self
            .position(id)
            .ok_or_else(|| anyhow!("record {} not found", id))?;
        f(&mut self.entries[i].1);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Option<V> {
        self.position(id).map(|i| self.entries.remove(i).1)
    }

    fn list(&self, skip: usize, limit: usize) -> Vec<&V> {
        self.entries
            .iter()
            .skip(skip)
            .take(limit)
            .map(|(_, v)| v)
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crud_round_trip() {
        let mut store = InMemoryStore::new();
        store.insert("a", 1).unwrap();
        store.insert("b", 2).unwrap();
        assert!(store.insert("a", 3).is_err());

        store.update("b", &mut |v| *v += 10).unwrap();
        assert_eq!(store.get("b"), Some(&12));
        assert!(store.update("zzz", &mut |_| {}).is_err());

        assert_eq!(store.remove("a"), Some(1));
        assert_eq!(store.get("a"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn list_keeps_insertion_order_and_pages() {
        let mut store = InMemoryStore::new();
        for (i, id) in ["x", "y", "z"].iter().enumerate() {
            store.insert(id, i).unwrap();
        }
        assert_eq!(store.list(0, 10), vec![&0, &1, &2]);
        assert_eq!(store.list(1, 1), vec![&1]);
        assert!(store.list(5, 10).is_empty());
    }
}
