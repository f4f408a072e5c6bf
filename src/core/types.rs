//! Core type definitions used throughout the codebase

use serde::Serialize;

/// Stable identity for a registered system
///
/// Wraps an interned static name so diagnostics stay readable and map
/// lookups need no runtime type introspection. Must be unique per system
/// kind for a process run; the registries reject duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SystemId(pub &'static str);

impl SystemId {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for SystemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Tag naming a component kind a system reads or writes
///
/// The scheduler never touches component data itself; tags exist only so
/// declared access sets can be intersected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ComponentTag(pub &'static str);

impl ComponentTag {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }
}

impl std::fmt::Display for ComponentTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Frame tick counter (simulation time unit)
pub type Tick = u64;

/// Execution phase a sample or failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Tick,
    Render,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Tick => f.write_str("tick"),
            Phase::Render => f.write_str("render"),
        }
    }
}
