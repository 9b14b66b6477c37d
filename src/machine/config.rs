use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::Machine;

use super::machine_indices::IndexStore;
use super::observer::Observer;
use super::system_calls::system_builtins;

/// What a call to an undefined procedure does.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum UnknownPolicy {
    /// Raise an existence error.
    #[default]
    Error,
    /// Fail quietly.
    Fail,
}

pub(crate) const DEFAULT_INDEX_CACHE_CAPACITY: usize = 32;
pub(crate) const DEFAULT_TABLE_CACHE_CAPACITY: usize = 4096;

#[derive(Clone)]
pub(crate) struct MachineConfig {
    pub(crate) unknown: UnknownPolicy,
    pub(crate) index_cache_capacity: NonZeroUsize,
    pub(crate) table_cache_capacity: NonZeroUsize,
    pub(crate) tail_recursion: bool,
    pub(crate) observer: Option<Arc<dyn Observer>>,
}

impl std::fmt::Debug for MachineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineConfig")
            .field("unknown", &self.unknown)
            .field("index_cache_capacity", &self.index_cache_capacity)
            .field("table_cache_capacity", &self.table_cache_capacity)
            .field("tail_recursion", &self.tail_recursion)
            .field("observer", &self.observer.as_ref().map(|_| "<observer>"))
            .finish()
    }
}

#[inline]
fn capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            unknown: UnknownPolicy::default(),
            index_cache_capacity: capacity(DEFAULT_INDEX_CACHE_CAPACITY),
            table_cache_capacity: capacity(DEFAULT_TABLE_CACHE_CAPACITY),
            tail_recursion: true,
            observer: None,
        }
    }
}

/// Describes how a [`Machine`](crate::Machine) will be configured.
#[derive(Debug, Default)]
pub struct MachineBuilder {
    pub(crate) config: MachineConfig,
}

impl MachineBuilder {
    /// Creates a default configuration.
    pub fn new() -> Self {
        Default::default()
    }

    /// Chooses what calls to undefined procedures do.
    pub fn with_unknown(mut self, unknown: UnknownPolicy) -> Self {
        self.config.unknown = unknown;
        self
    }

    /// Bounds the number of argument indexes kept per predicate. Zero
    /// is treated as one.
    pub fn with_index_cache_capacity(mut self, n: usize) -> Self {
        self.config.index_cache_capacity = capacity(n);
        self
    }

    /// Bounds the number of completed call patterns kept per tabled
    /// predicate. Zero is treated as one.
    pub fn with_table_cache_capacity(mut self, n: usize) -> Self {
        self.config.table_cache_capacity = capacity(n);
        self
    }

    /// Runs eligible two-clause recursions as loops.
    pub fn with_tail_recursion(mut self, enabled: bool) -> Self {
        self.config.tail_recursion = enabled;
        self
    }

    /// Notifies `observer` at the ports of every predicate call.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Builds the [`Machine`](crate::Machine) from this configuration.
    pub fn build(self) -> Machine {
        let indices = IndexStore::new(self.config);

        for (key, builtin) in system_builtins() {
            indices.register_builtin(key, builtin);
        }

        Machine {
            indices: Arc::new(indices),
        }
    }
}
