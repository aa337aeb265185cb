//! Process-lifetime session cache.
//!
//! Memoizes the last result of each fully specified request. Entries never
//! expire; an optional capacity evicts the oldest insertions first.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use filmshelf_core::types::{MetadataRecord, SearchPage};
use filmshelf_provider::SearchQuery;

/// A fully specified request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Detail(String),
    Title { title: String, year: Option<i32> },
    Search(SearchQuery),
}

impl SessionKey {
    pub fn detail(external_id: &str) -> Self {
        SessionKey::Detail(external_id.trim().to_string())
    }

    pub fn title(title: &str, year: Option<i32>) -> Self {
        SessionKey::Title {
            title: title.trim().to_string(),
            year,
        }
    }
}

/// The resolved result of a request.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionValue {
    Record(MetadataRecord),
    Page(SearchPage),
}

#[derive(Default)]
struct Entries {
    map: HashMap<SessionKey, SessionValue>,
    order: VecDeque<SessionKey>,
}

/// In-memory request cache, safe to share between tasks.
#[derive(Default)]
pub struct SessionCache {
    entries: RwLock<Entries>,
    /// 0 means unbounded.
    capacity: usize,
}

impl SessionCache {
    /// Unbounded cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache holding at most `capacity` entries (0 for unbounded).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::default(),
            capacity,
        }
    }

    pub fn get(&self, key: &SessionKey) -> Option<SessionValue> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.map.get(key).cloned()
    }

    pub fn get_record(&self, key: &SessionKey) -> Option<MetadataRecord> {
        match self.get(key)? {
            SessionValue::Record(record) => Some(record),
            SessionValue::Page(_) => None,
        }
    }

    pub fn get_page(&self, key: &SessionKey) -> Option<SearchPage> {
        match self.get(key)? {
            SessionValue::Page(page) => Some(page),
            SessionValue::Record(_) => None,
        }
    }

    /// Store a value, overwriting any previous value for the key.
    pub fn put(&self, key: SessionKey, value: SessionValue) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.map.insert(key.clone(), value).is_none() {
            entries.order.push_back(key);
        }
        while self.capacity > 0 && entries.map.len() > self.capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    entries.map.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .map
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.map.clear();
        entries.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> SessionValue {
        SessionValue::Record(MetadataRecord::new(id, format!("Title {}", id)))
    }

    #[test]
    fn test_put_then_get() {
        let cache = SessionCache::new();
        cache.put(SessionKey::detail("tt1"), record("tt1"));
        let found = cache.get_record(&SessionKey::detail("tt1")).unwrap();
        assert_eq!(found.external_id, "tt1");
        assert!(cache.get(&SessionKey::detail("tt2")).is_none());
    }

    #[test]
    fn test_overwrite_keeps_last_value() {
        let cache = SessionCache::new();
        cache.put(SessionKey::detail("tt1"), record("tt1"));
        let mut newer = MetadataRecord::new("tt1", "Renamed");
        newer.version = 7;
        cache.put(SessionKey::detail("tt1"), SessionValue::Record(newer));
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get_record(&SessionKey::detail("tt1")).unwrap().title,
            "Renamed"
        );
    }

    #[test]
    fn test_search_keys_include_every_parameter() {
        let cache = SessionCache::new();
        let page = SearchPage {
            items: vec![],
            total_results: 3,
        };
        let q1 = SearchQuery::new("batman");
        cache.put(SessionKey::Search(q1.clone()), SessionValue::Page(page));

        assert!(cache.get_page(&SessionKey::Search(q1.clone())).is_some());
        assert!(cache
            .get_page(&SessionKey::Search(q1.clone().with_page(2)))
            .is_none());
        assert!(cache
            .get_page(&SessionKey::Search(q1.with_year(1989)))
            .is_none());
        assert!(cache
            .get_page(&SessionKey::Search(SearchQuery::new("batman*")))
            .is_none());
    }

    #[test]
    fn test_value_kind_mismatch_is_a_miss() {
        let cache = SessionCache::new();
        cache.put(SessionKey::detail("tt1"), record("tt1"));
        assert!(cache.get_page(&SessionKey::detail("tt1")).is_none());
    }

    #[test]
    fn test_unbounded_by_default() {
        let cache = SessionCache::new();
        for i in 0..1_000 {
            cache.put(SessionKey::detail(&format!("tt{}", i)), record("x"));
        }
        assert_eq!(cache.len(), 1_000);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = SessionCache::with_capacity(2);
        cache.put(SessionKey::detail("tt1"), record("tt1"));
        cache.put(SessionKey::detail("tt2"), record("tt2"));
        // Overwriting does not refresh insertion order.
        cache.put(SessionKey::detail("tt1"), record("tt1"));
        cache.put(SessionKey::detail("tt3"), record("tt3"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&SessionKey::detail("tt1")).is_none());
        assert!(cache.get(&SessionKey::detail("tt2")).is_some());
        assert!(cache.get(&SessionKey::detail("tt3")).is_some());
    }

    #[test]
    fn test_clear() {
        let cache = SessionCache::with_capacity(10);
        cache.put(SessionKey::detail("tt1"), record("tt1"));
        cache.put(SessionKey::title("Alien", Some(1979)), record("tt2"));
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_keys_are_trimmed() {
        assert_eq!(SessionKey::detail(" tt1 "), SessionKey::detail("tt1"));
        assert_eq!(
            SessionKey::title(" Alien ", None),
            SessionKey::title("Alien", None)
        );
    }
}
