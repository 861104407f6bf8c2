//! Scratch object pools.
//!
//! Every rule render borrows a byte buffer, and every ruleset execution
//! borrows a template dictionary. Both are recycled through a small
//! thread-safe pool: a borrow hands out a guard that returns the object on
//! drop, so every exit path (including render errors) releases back to
//! the pool.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};

/// Objects that can be wiped for reuse.
pub(crate) trait Reset: Default {
    fn reset(&mut self);
}

impl Reset for String {
    fn reset(&mut self) {
        self.clear();
    }
}

impl<K: Ord, V> Reset for BTreeMap<K, V> {
    fn reset(&mut self) {
        self.clear();
    }
}

/// A thread-safe free list of reusable objects.
pub(crate) struct Pool<T: Reset> {
    items: Mutex<Vec<T>>,
}

impl<T: Reset> Pool<T> {
    pub(crate) fn new() -> Self {
        Pool { items: Mutex::new(Vec::new()) }
    }

    /// Borrow an object; a fresh one is created when the pool is empty.
    pub(crate) fn get(&self) -> PoolGuard<'_, T> {
        let item = self.items.lock().unwrap_or_else(PoisonError::into_inner).pop().unwrap_or_default();
        PoolGuard { pool: self, item: Some(item) }
    }

    fn put(&self, mut item: T) {
        item.reset();
        self.items.lock().unwrap_or_else(PoisonError::into_inner).push(item);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// RAII borrow of a pooled object.
pub(crate) struct PoolGuard<'a, T: Reset> {
    pool: &'a Pool<T>,
    item: Option<T>,
}

impl<T: Reset> Deref for PoolGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item.as_ref().expect("pooled item taken")
    }
}

impl<T: Reset> DerefMut for PoolGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("pooled item taken")
    }
}

impl<T: Reset> Drop for PoolGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.put(item);
        }
    }
}
