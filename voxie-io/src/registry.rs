//! Process-wide cache of type descriptors.

use crate::storable::Storable;
use crate::types::TypeDescriptor;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

type DescriptorCache = RwLock<HashMap<TypeId, Arc<TypeDescriptor>>>;

static DESCRIPTORS: OnceLock<DescriptorCache> = OnceLock::new();

/// Hands out one shared descriptor per storable type.
///
/// Datasets created through [`Group::new_dataset`](crate::Group::new_dataset)
/// keep the registry's `Arc`, so every dataset of the same element type
/// shares a single descriptor.
pub struct TypeRegistry;

impl TypeRegistry {
    /// Returns the shared descriptor for `T`, building it on first use.
    ///
    /// Concurrent first calls may both build a descriptor, but only the first
    /// one stored is ever returned.
    #[must_use]
    pub fn describe<T: Storable>() -> Arc<TypeDescriptor> {
        let cache = DESCRIPTORS.get_or_init(DescriptorCache::default);
        let key = TypeId::of::<T>();

        if let Some(ty) = cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(ty);
        }

        let built = Arc::new(T::type_descriptor());
        let mut guard = cache.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(guard.entry(key).or_insert(built))
    }

    /// Number of cached descriptors.
    #[must_use]
    pub fn len() -> usize {
        DESCRIPTORS.get().map_or(0, |cache| {
            cache.read().unwrap_or_else(PoisonError::into_inner).len()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_same_arc_for_same_type() {
        let a = TypeRegistry::describe::<(u16, f64)>();
        let b = TypeRegistry::describe::<(u16, f64)>();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(TypeRegistry::len() >= 1);
    }

    #[test]
    fn test_distinct_types_get_distinct_descriptors() {
        let a = TypeRegistry::describe::<u32>();
        let b = TypeRegistry::describe::<i32>();
        assert_ne!(*a, *b);
    }

    #[test]
    fn test_concurrent_first_use() {
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(TypeRegistry::describe::<[i8; 5]>))
            .collect();
        let descriptors: Vec<Arc<TypeDescriptor>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        for ty in &descriptors[1..] {
            assert!(Arc::ptr_eq(ty, &descriptors[0]));
        }
    }
}
