//! Per-connection attribute storage.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// Typed lookup key for a slot in an [`AttributeMap`].
pub struct AttributeKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AttributeKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for AttributeKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AttributeKey<T> {}

impl<T> fmt::Debug for AttributeKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttributeKey").field(&self.name).finish()
    }
}

/// Keyed slots a connection carries for its whole lifetime.
///
/// A lookup whose key names a slot holding a different type yields `None`.
#[derive(Default)]
pub struct AttributeMap {
    slots: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &AttributeKey<T>) -> Option<&T> {
        self.slots.get(key.name)?.downcast_ref()
    }

    /// Store `value` under `key`, or clear the slot when `None`.
    ///
    /// Returns what the slot held before.
    pub fn set<T: Any + Send + Sync>(
        &mut self,
        key: &AttributeKey<T>,
        value: Option<T>,
    ) -> Option<T> {
        let previous = match value {
            Some(v) => self.slots.insert(key.name, Box::new(v)),
            None => self.slots.remove(key.name),
        };
        previous
            .and_then(|b| b.downcast::<T>().ok())
            .map(|b| *b)
    }

    pub fn contains<T: Any + Send + Sync>(&self, key: &AttributeKey<T>) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for AttributeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.slots.keys()).finish()
    }
}
