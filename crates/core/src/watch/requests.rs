use lanescope_protocol::WatchRequest;
use uuid::Uuid;

use crate::store::{self, StateStore, StoreError, WATCH_REQUESTS_KEY};

/// The persisted list of watch requests.
///
/// Each mutation reads the current list, changes it, and writes it back.
/// Concurrent mutations are not serialised; the last write wins.
pub struct WatchList<'a, St: ?Sized> {
    store: &'a St,
}

impl<'a, St: StateStore + ?Sized> WatchList<'a, St> {
    pub fn new(store: &'a St) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Vec<WatchRequest> {
        store::load_or_default(self.store, WATCH_REQUESTS_KEY)
    }

    /// Register `expression`, generating a time-ordered id when none is
    /// supplied. Re-adding an existing id replaces its expression.
    pub fn add(
        &self,
        unique_id: Option<String>,
        expression: &str,
    ) -> Result<WatchRequest, StoreError> {
        let unique_id = unique_id.unwrap_or_else(|| Uuid::now_v7().simple().to_string());
        let request = WatchRequest::new(unique_id, expression.trim());
        let mut requests = self.load();
        requests.retain(|r| r.unique_id != request.unique_id);
        requests.push(request.clone());
        store::save(self.store, WATCH_REQUESTS_KEY, &requests)?;
        Ok(request)
    }

    /// Returns whether a request was removed.
    pub fn remove(&self, unique_id: &str) -> Result<bool, StoreError> {
        let mut requests = self.load();
        let before = requests.len();
        requests.retain(|r| r.unique_id != unique_id);
        if requests.len() == before {
            return Ok(false);
        }
        store::save(self.store, WATCH_REQUESTS_KEY, &requests)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        store::save(self.store, WATCH_REQUESTS_KEY, &Vec::<WatchRequest>::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn add_remove_clear() {
        let store = MemoryStore::new();
        let list = WatchList::new(&store);

        let a = list.add(None, " a[i] ").unwrap();
        let b = list.add(Some("fixed".into()), "b").unwrap();
        assert_eq!(a.expression, "a[i]");
        assert_eq!(b.unique_id, "fixed");
        assert_eq!(list.load(), vec![a.clone(), b.clone()]);

        assert!(list.remove(&a.unique_id).unwrap());
        assert!(!list.remove(&a.unique_id).unwrap());
        assert_eq!(list.load(), vec![b]);

        list.clear().unwrap();
        assert!(list.load().is_empty());
    }

    #[test]
    fn generated_ids_are_unique_and_dashless() {
        let store = MemoryStore::new();
        let list = WatchList::new(&store);
        let a = list.add(None, "x").unwrap();
        let b = list.add(None, "x").unwrap();
        assert_ne!(a.unique_id, b.unique_id);
        assert!(!a.unique_id.contains('-'));
        assert_eq!(list.load().len(), 2);
    }

    #[test]
    fn re_adding_an_id_replaces_it() {
        let store = MemoryStore::new();
        let list = WatchList::new(&store);
        list.add(Some("w".into()), "old").unwrap();
        list.add(Some("w".into()), "new").unwrap();
        let requests = list.load();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].expression, "new");
    }
}
