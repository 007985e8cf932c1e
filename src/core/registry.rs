//! First-match factory registry.
//!
//! A [`Registry`] is an ordered list of factories. Each factory inspects a
//! configuration fragment and either builds a value from it or declines.
//! [`Registry::get`] returns the value of the first factory that accepts, so
//! registration order is the tie-break when several factories could match.
//!
//! Event generators, task kinds and execution connections are all selected
//! through a registry.

use std::fmt;

/// A factory: returns `Some(value)` when it recognises the input.
pub type Factory<C, T> = Box<dyn Fn(&C) -> Option<T> + Send + Sync>;

/// Ordered list of factories, queried in registration order.
pub struct Registry<C, T> {
    factories: Vec<Factory<C, T>>,
}

impl<C, T> Registry<C, T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Append a factory. Factories must be free of side effects beyond
    /// constructing their candidate value.
    pub fn register<F>(&mut self, factory: F)
    where
        F: Fn(&C) -> Option<T> + Send + Sync + 'static,
    {
        self.factories.push(Box::new(factory));
    }

    /// Builder: append a factory.
    pub fn with<F>(mut self, factory: F) -> Self
    where
        F: Fn(&C) -> Option<T> + Send + Sync + 'static,
    {
        self.register(factory);
        self
    }

    /// Run the factories in order and return the first match.
    pub fn get(&self, input: &C) -> Option<T> {
        self.factories.iter().find_map(|factory| factory(input))
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true when no factory is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl<C, T> Default for Registry<C, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, T> fmt::Debug for Registry<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("factories", &self.factories.len())
            .finish()
    }
}
