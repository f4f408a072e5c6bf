//! Conflict analysis and execution-stage planning
//!
//! Given the declared access metadata of every registered system, this
//! module answers the pairwise question "can these two run concurrently"
//! and partitions a system set into ordered stages whose members are
//! certified pairwise non-conflicting.
//!
//! Stage construction is a greedy pass-per-stage heuristic: it produces a
//! correct partition and respects priority for conflicting pairs, but it
//! does not search for the globally widest stages. Accepted trade-off.

use serde::Serialize;
use std::fmt::Write as _;

use crate::access::{AccessMeta, AccessRegistry};
use crate::core::error::Result;
use crate::core::types::{ComponentTag, SystemId};

/// One stage: systems certified safe to execute concurrently, kept in
/// priority order
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Stage {
    pub systems: Vec<SystemId>,
}

/// Ordered stage list computed for a concrete system set
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub stages: Vec<Stage>,
}

impl ExecutionPlan {
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn system_count(&self) -> usize {
        self.stages.iter().map(|s| s.systems.len()).sum()
    }

    /// Index of the stage containing `id`, if planned
    pub fn stage_of(&self, id: SystemId) -> Option<usize> {
        self.stages
            .iter()
            .position(|stage| stage.systems.contains(&id))
    }

    pub fn contains(&self, id: SystemId) -> bool {
        self.stage_of(id).is_some()
    }

    /// Human-readable rendering for operational tooling
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Execution plan: {} stage(s)", self.stages.len());
        for (i, stage) in self.stages.iter().enumerate() {
            let names: Vec<&str> = stage.systems.iter().map(|id| id.as_str()).collect();
            let _ = writeln!(out, "  stage {}: [{}]", i, names.join(", "));
        }
        out
    }

    /// Machine-readable rendering for operational tooling
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Answers pairwise concurrency questions and computes stage plans from
/// registered access metadata
#[derive(Debug, Default)]
pub struct ConflictAnalyzer {
    registry: AccessRegistry,
}

impl ConflictAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system's declaration. Rejects duplicates.
    pub fn register(&mut self, id: SystemId, meta: AccessMeta) -> Result<()> {
        self.registry.register(id, meta)
    }

    pub fn registry(&self) -> &AccessRegistry {
        &self.registry
    }

    /// True when `a` and `b` may share a stage
    ///
    /// False for unregistered identities (stale-reference queries must not
    /// panic), for systems that opt out of concurrency, and for any
    /// write/write or write/read overlap. Symmetric by construction.
    pub fn can_run_concurrently(&self, a: SystemId, b: SystemId) -> bool {
        let (meta_a, meta_b) = match (self.registry.get(a), self.registry.get(b)) {
            (Some(a), Some(b)) => (a, b),
            _ => return false,
        };

        if !meta_a.allows_concurrency || !meta_b.allows_concurrency {
            return false;
        }

        !meta_a.conflicts_with(meta_b)
    }

    /// All registered systems that can run concurrently with `id`
    ///
    /// Empty for an unregistered identity. Returned in no particular order.
    pub fn concurrent_candidates(&self, id: SystemId) -> Vec<SystemId> {
        if !self.registry.contains(id) {
            return Vec::new();
        }
        self.registry
            .ids()
            .filter(|&other| other != id && self.can_run_concurrently(id, other))
            .collect()
    }

    /// Partition `systems` into ordered, internally-concurrent stages
    ///
    /// Unregistered identities are dropped from the input. The remainder is
    /// stably sorted by priority ascending, then each pass over the
    /// not-yet-assigned systems builds one stage. A system is admitted iff
    /// it is compatible with everything already placed in that stage AND
    /// with everything already deferred in this pass: a system it conflicts
    /// with that was deferred earlier has lower (or equal) priority, so
    /// jumping ahead of it would put conflicting work out of priority
    /// order.
    pub fn compute_stages(&self, systems: &[SystemId]) -> ExecutionPlan {
        let mut remaining: Vec<SystemId> = systems
            .iter()
            .copied()
            .filter(|&id| self.registry.contains(id))
            .collect();

        // Stable: equal priorities keep their relative input order
        remaining.sort_by_key(|&id| self.registry.get(id).map(|m| m.priority).unwrap_or(0));

        let mut stages = Vec::new();
        while !remaining.is_empty() {
            let mut stage: Vec<SystemId> = Vec::new();
            let mut deferred: Vec<SystemId> = Vec::new();

            for id in remaining.drain(..) {
                let compatible = stage
                    .iter()
                    .all(|&placed| self.can_run_concurrently(placed, id))
                    && deferred
                        .iter()
                        .all(|&waiting| self.can_run_concurrently(waiting, id));
                if compatible {
                    stage.push(id);
                } else {
                    deferred.push(id);
                }
            }

            if stage.is_empty() {
                // Unreachable by construction (the first scanned system
                // always enters the empty stage), but a degenerate pass must
                // halt rather than loop.
                tracing::error!(
                    deferred = deferred.len(),
                    "stage planning pass placed zero systems; aborting plan"
                );
                break;
            }

            stages.push(Stage { systems: stage });
            remaining = deferred;
        }

        ExecutionPlan { stages }
    }

    /// Human-readable rendering of every registered declaration
    pub fn describe(&self) -> String {
        let mut entries: Vec<(SystemId, &AccessMeta)> = self.registry.iter().collect();
        entries.sort_by_key(|(id, meta)| (meta.priority, id.as_str()));

        let mut out = String::new();
        let _ = writeln!(out, "Registered systems: {}", entries.len());
        for (id, meta) in entries {
            let _ = writeln!(
                out,
                "  {} (priority {}, {}) reads [{}] writes [{}]{}",
                id,
                meta.priority,
                if meta.allows_concurrency {
                    "concurrent"
                } else {
                    "exclusive"
                },
                sorted_tags(&meta.reads),
                sorted_tags(&meta.writes),
                if meta.description.is_empty() {
                    String::new()
                } else {
                    format!(" - {}", meta.description)
                },
            );
        }
        out
    }
}

fn sorted_tags(tags: &ahash::AHashSet<ComponentTag>) -> String {
    let mut names: Vec<&str> = tags.iter().map(|t| t.0).collect();
    names.sort_unstable();
    names.join(", ")
}
