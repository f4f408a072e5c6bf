//! Declared data-access metadata for registered systems
//!
//! Every system declares up front which component kinds it reads and
//! writes, its priority, and whether it tolerates running alongside other
//! systems at all. The declarations are the sole input to conflict
//! analysis: nothing verifies that a system touches only what it declared.
//! That trust boundary is deliberate and documented; a system declaring a
//! narrower write-set than it uses reintroduces data races.

use ahash::{AHashMap, AHashSet};

use crate::core::error::{Result, SchedError};
use crate::core::types::{ComponentTag, SystemId};

/// Immutable access declaration for one system
#[derive(Debug, Clone)]
pub struct AccessMeta {
    /// Component kinds the system may read during a tick
    pub reads: AHashSet<ComponentTag>,
    /// Component kinds the system may mutate during a tick
    pub writes: AHashSet<ComponentTag>,
    /// Lower runs earlier when ordering is required
    pub priority: i32,
    /// When false, the system never shares a stage with any other system
    pub allows_concurrency: bool,
    /// Free text shown in diagnostic dumps only
    pub description: String,
}

impl AccessMeta {
    pub fn new(priority: i32) -> Self {
        Self {
            reads: AHashSet::new(),
            writes: AHashSet::new(),
            priority,
            allows_concurrency: true,
            description: String::new(),
        }
    }

    pub fn reads(mut self, tags: impl IntoIterator<Item = ComponentTag>) -> Self {
        self.reads.extend(tags);
        self
    }

    pub fn writes(mut self, tags: impl IntoIterator<Item = ComponentTag>) -> Self {
        self.writes.extend(tags);
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.allows_concurrency = false;
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    /// True when this declaration conflicts with `other`: any write/write
    /// overlap, or either side writing what the other reads.
    pub fn conflicts_with(&self, other: &AccessMeta) -> bool {
        !self.writes.is_disjoint(&other.writes)
            || !self.writes.is_disjoint(&other.reads)
            || !other.writes.is_disjoint(&self.reads)
    }
}

/// Registry of per-system access declarations
///
/// Metadata is immutable once registered; registering the same identity
/// twice is an error, never a silent overwrite.
#[derive(Debug, Default)]
pub struct AccessRegistry {
    systems: AHashMap<SystemId, AccessMeta>,
}

impl AccessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system's declaration. Rejects duplicates.
    pub fn register(&mut self, id: SystemId, meta: AccessMeta) -> Result<()> {
        if self.systems.contains_key(&id) {
            return Err(SchedError::DuplicateSystem(id));
        }
        self.systems.insert(id, meta);
        Ok(())
    }

    pub fn get(&self, id: SystemId) -> Option<&AccessMeta> {
        self.systems.get(&id)
    }

    pub fn contains(&self, id: SystemId) -> bool {
        self.systems.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = SystemId> + '_ {
        self.systems.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SystemId, &AccessMeta)> {
        self.systems.iter().map(|(id, meta)| (*id, meta))
    }
}
