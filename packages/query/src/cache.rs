//! Bounded, insertion-ordered memo of store results.
//!
//! Entries are keyed by [`QueryKey`], so two parameter tuples that differ
//! only in tag order share an entry. When the cache is full the entry with
//! the oldest insertion is evicted before the new one goes in. There is no
//! TTL; entries live for the life of the process or until [`QueryCache::clear`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use osm_explorer_geometry_models::{QueryKey, QueryParameters};

/// Default number of cached results.
pub const DEFAULT_CAPACITY: usize = 128;

/// One cached result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Parameters the result was produced for.
    pub key: QueryParameters,
    /// The store document.
    pub value: Arc<geojson::FeatureCollection>,
    /// When the entry was (last) inserted.
    pub inserted_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<QueryKey, (u64, CacheEntry)>,
    /// Insertion sequence -> key, oldest first.
    order: BTreeMap<u64, QueryKey>,
    next_seq: u64,
}

/// Thread-safe bounded cache of query results.
pub struct QueryCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // try_lock: formatting must not block on (or panic over) the lock.
        let len = self.inner.try_lock().ok().map(|inner| inner.entries.len());
        f.debug_struct("QueryCache")
            .field("capacity", &self.capacity)
            .field("len", &len)
            .finish_non_exhaustive()
    }
}

impl QueryCache {
    /// Creates a cache holding at most `capacity` entries (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the cached document for `params`, if any.
    ///
    /// # Panics
    ///
    /// Panics if the cache lock is poisoned.
    #[must_use]
    pub fn get(&self, params: &QueryParameters) -> Option<Arc<geojson::FeatureCollection>> {
        self.entry(params).map(|entry| entry.value)
    }

    /// Returns the full cache entry for `params`, if any.
    ///
    /// # Panics
    ///
    /// Panics if the cache lock is poisoned.
    #[must_use]
    pub fn entry(&self, params: &QueryParameters) -> Option<CacheEntry> {
        let key = params.key();
        let inner = self.lock();
        let hit = inner.entries.get(&key).map(|(_, entry)| entry.clone());
        drop(inner);

        if hit.is_some() {
            log::debug!("Cache hit for {} {}", params.table, params.column);
        } else {
            log::debug!("Cache miss for {} {}", params.table, params.column);
        }
        hit
    }

    /// Stores `value` for `params`, evicting the oldest entries if full.
    ///
    /// Re-inserting an existing key replaces its value and makes it the
    /// newest entry.
    ///
    /// # Panics
    ///
    /// Panics if the cache lock is poisoned or the eviction order no longer
    /// matches the entries.
    pub fn put(&self, params: QueryParameters, value: Arc<geojson::FeatureCollection>) {
        let key = params.key();
        let mut inner = self.lock();

        if let Some((seq, _)) = inner.entries.remove(&key) {
            inner.order.remove(&seq);
        }

        while inner.entries.len() >= self.capacity {
            let Some((_, oldest)) = inner.order.pop_first() else {
                break;
            };
            let evicted = inner.entries.remove(&oldest);
            assert!(evicted.is_some(), "query cache order references a missing entry");
            log::debug!("Evicted oldest cache entry");
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, key.clone());
        inner.entries.insert(
            key,
            (
                seq,
                CacheEntry {
                    key: params,
                    value,
                    inserted_at: Utc::now(),
                },
            ),
        );

        assert_eq!(
            inner.order.len(),
            inner.entries.len(),
            "query cache order and entries diverged"
        );
    }

    /// Number of cached entries.
    ///
    /// # Panics
    ///
    /// Panics if the cache lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache is empty.
    ///
    /// # Panics
    ///
    /// Panics if the cache lock is poisoned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry.
    ///
    /// # Panics
    ///
    /// Panics if the cache lock is poisoned.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("query cache lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use osm_explorer_geometry_models::{
        AttributeName, BoundingRectangle, Filters, GeometryKind, TagSet,
    };

    use super::*;

    fn params(row_cap: u32) -> QueryParameters {
        let filters = Filters {
            row_cap,
            ..Filters::default()
        };
        QueryParameters::new(
            &filters,
            BoundingRectangle::new(-140.0, 10.0, -52.0, 58.0).unwrap(),
        )
    }

    fn document(n: usize) -> Arc<geojson::FeatureCollection> {
        let features = (0..n)
            .map(|_| geojson::Feature {
                bbox: None,
                geometry: None,
                id: None,
                properties: None,
                foreign_members: None,
            })
            .collect();
        Arc::new(geojson::FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        })
    }

    #[test]
    fn put_then_get_returns_same_document() {
        let cache = QueryCache::new(4);
        let value = document(3);
        cache.put(params(100), Arc::clone(&value));

        let hit = cache.get(&params(100)).expect("entry should be cached");
        assert!(Arc::ptr_eq(&hit, &value));
        assert!(cache.get(&params(1000)).is_none());
    }

    #[test]
    fn first_inserted_key_evicted_after_capacity_plus_one() {
        let capacity = 3;
        let cache = QueryCache::new(capacity);
        for i in 0..=capacity {
            cache.put(params(u32::try_from(i).unwrap() + 1), document(i));
        }

        assert_eq!(cache.len(), capacity);
        assert!(cache.get(&params(1)).is_none(), "oldest key should be evicted");
        for i in 2..=4 {
            assert!(cache.get(&params(i)).is_some(), "key {i} should survive");
        }
    }

    #[test]
    fn reinserting_refreshes_insertion_order() {
        let cache = QueryCache::new(2);
        cache.put(params(1), document(0));
        cache.put(params(2), document(0));
        cache.put(params(1), document(1));
        cache.put(params(3), document(0));

        assert!(cache.get(&params(2)).is_none());
        assert_eq!(cache.get(&params(1)).unwrap().features.len(), 1);
        assert!(cache.get(&params(3)).is_some());
    }

    #[test]
    fn tag_order_does_not_change_key() {
        let rect = BoundingRectangle::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let a: TagSet = ["private", "permissive"].into_iter().map(String::from).collect();
        let b: TagSet = ["permissive", "private"].into_iter().map(String::from).collect();
        let filters = |tags| Filters {
            table: GeometryKind::Line,
            column: AttributeName::new("highway").unwrap(),
            tags: Some(tags),
            row_cap: 100,
        };

        let cache = QueryCache::new(8);
        cache.put(QueryParameters::new(&filters(a), rect), document(2));
        assert!(cache.get(&QueryParameters::new(&filters(b), rect)).is_some());
    }

    #[test]
    fn entry_records_parameters_and_timestamp() {
        let before = Utc::now();
        let cache = QueryCache::new(2);
        cache.put(params(100), document(0));

        let entry = cache.entry(&params(100)).unwrap();
        assert_eq!(entry.key, params(100));
        assert!(entry.inserted_at >= before);
    }

    #[test]
    fn interleaved_puts_keep_bound_and_order() {
        let cache = QueryCache::new(16);
        std::thread::scope(|scope| {
            for t in 0..4u32 {
                let cache = &cache;
                scope.spawn(move || {
                    for i in 0..50u32 {
                        cache.put(params(t * 1000 + i + 1), document(0));
                        let _ = cache.get(&params(t * 1000 + i + 1));
                    }
                });
            }
        });

        assert_eq!(cache.len(), 16);
    }

    #[test]
    fn clear_empties_cache() {
        let cache = QueryCache::default();
        assert_eq!(cache.capacity(), DEFAULT_CAPACITY);
        cache.put(params(100), document(0));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn debug_shows_capacity_and_len() {
        let cache = QueryCache::new(4);
        cache.put(params(100), document(0));
        let text = format!("{cache:?}");
        assert!(text.starts_with("QueryCache"));
        assert!(text.contains("capacity: 4"));
        assert!(text.contains("len: Some(1)"));
    }
}
