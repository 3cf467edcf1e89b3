//! In-memory cache of derived output schemas, keyed by input schema identity.
//!
//! Records of the same shape share one `Arc<Schema>`, so the pointer is a cheap and
//! exact key. Each entry keeps its input `Arc` alive, which stops the allocation
//! from being reused for a different schema while the entry exists.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use super::SchemaError;
use crate::data::Schema;

#[derive(Debug)]
struct CachedSchema {
    input: Arc<Schema>,
    output: Arc<Schema>,
}

/// Bounded LRU cache of input schema -> output schema.
#[derive(Debug)]
pub struct SchemaCache {
    inner: Mutex<LruCache<usize, CachedSchema>>,
}

impl SchemaCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of cached schemas.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached output schema for `input`, deriving it with `adapt` on a miss.
    ///
    /// The lock is held while `adapt` runs, so a missing entry is derived at most
    /// once even under concurrent lookups.
    ///
    /// # Errors
    ///
    /// Returns the error of `adapt`; failures are not cached.
    pub fn get_or_adapt(
        &self,
        input: &Arc<Schema>,
        adapt: impl FnOnce(&Schema) -> Result<Schema, SchemaError>,
    ) -> Result<Arc<Schema>, SchemaError> {
        let key = Arc::as_ptr(input) as usize;
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.get(&key) {
            if Arc::ptr_eq(&entry.input, input) {
                return Ok(entry.output.clone());
            }
        }
        let output = Arc::new(adapt(input)?);
        inner.put(
            key,
            CachedSchema {
                input: input.clone(),
                output: output.clone(),
            },
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::data::Type;

    fn cache(capacity: usize) -> SchemaCache {
        SchemaCache::new(NonZeroUsize::new(capacity).unwrap())
    }

    fn to_string_schema(_: &Schema) -> Result<Schema, SchemaError> {
        Ok(Schema::structure().with_field("x", Schema::string()))
    }

    #[test]
    fn initially_empty() {
        assert!(cache(4).is_empty());
    }

    #[test]
    fn same_instance_returns_same_output() {
        let cache = cache(4);
        let input = Arc::new(Schema::structure().with_field("x", Schema::of(Type::Int32)));
        let calls = Cell::new(0);
        let adapt = |s: &Schema| {
            calls.set(calls.get() + 1);
            to_string_schema(s)
        };
        let first = cache.get_or_adapt(&input, adapt).unwrap();
        let second = cache.get_or_adapt(&input, adapt).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn equal_but_distinct_instances_are_separate_entries() {
        let cache = cache(4);
        let a = Arc::new(Schema::structure().with_field("x", Schema::of(Type::Int32)));
        let b = Arc::new(Schema::structure().with_field("x", Schema::of(Type::Int32)));
        cache.get_or_adapt(&a, to_string_schema).unwrap();
        cache.get_or_adapt(&b, to_string_schema).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = cache(4);
        let input = Arc::new(Schema::string());
        let err = cache
            .get_or_adapt(&input, |s| Err(SchemaError::NotAStruct(s.ty)))
            .unwrap_err();
        assert_eq!(err, SchemaError::NotAStruct(Type::String));
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_is_bounded() {
        let cache = cache(2);
        let schemas: Vec<_> = (0..3).map(|_| Arc::new(Schema::structure())).collect();
        for s in &schemas {
            cache.get_or_adapt(s, to_string_schema).unwrap();
        }
        assert_eq!(cache.len(), 2);
    }
}
