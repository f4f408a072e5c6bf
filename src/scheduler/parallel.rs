//! Stage-parallel frame driver
//!
//! Wraps the sequential scheduler and adds a conflict analyzer fed from
//! each tick system's declared metadata at registration. After the
//! registration phase the host explicitly calls
//! [`ParallelScheduler::rebuild_execution_plan`]; each subsequent tick
//! walks the cached stage list, dispatching every member of a stage across
//! the rayon pool and joining before the next stage begins.
//!
//! Stage-level concurrency exploits inter-system independence; it composes
//! with the entity-level fan-out a system may do internally through
//! [`crate::executor::EntityExecutor`]. Render systems stay sequential:
//! rendering is a single serialized pipeline.

use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;
use rayon::prelude::*;

use crate::access::AccessMeta;
use crate::conflict::{ConflictAnalyzer, ExecutionPlan};
use crate::core::config::SchedulerConfig;
use crate::core::error::Result;
use crate::core::types::{Phase, SystemId};
use crate::metrics::{MetricsSnapshot, PerfTracker};

use super::{
    lock_slot, FrameReport, RenderSystem, SequentialScheduler, SystemFailure, TickEntry,
    TickSystem,
};

/// Parallel scheduler: conflict-planned, stage-concurrent ticking over the
/// sequential baseline
pub struct ParallelScheduler<W> {
    base: SequentialScheduler<W>,
    analyzer: ConflictAnalyzer,
    plan: Option<ExecutionPlan>,
    /// One unplanned-systems warning per rebuild, not per frame
    warned_unplanned: bool,
}

impl<W> ParallelScheduler<W> {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            base: SequentialScheduler::new(config),
            analyzer: ConflictAnalyzer::new(),
            plan: None,
            warned_unplanned: false,
        }
    }

    // === REGISTRATION ===

    /// Register a tick system and capture its declared access metadata
    ///
    /// The metadata is registered with the conflict analyzer first, so a
    /// duplicate identity is rejected before anything is mutated.
    pub fn register_tick_system(&mut self, system: Box<dyn TickSystem<W>>) -> Result<()> {
        let id = system.id();
        let mut meta = AccessMeta::new(system.priority())
            .reads(system.reads_components())
            .writes(system.writes_components())
            .describe(system.description().to_string());
        if !system.allows_concurrent_execution() {
            meta = meta.exclusive();
        }

        self.analyzer.register(id, meta)?;
        self.base.register_tick_system(system)
    }

    /// Render systems take no part in stage planning
    pub fn register_render_system(&mut self, system: Box<dyn RenderSystem<W>>) -> Result<()> {
        self.base.register_render_system(system)
    }

    // === PLAN CONTROL ===

    /// Compute and cache the stage plan for the current tick set
    ///
    /// Never invoked implicitly: call it once after the registration phase
    /// (and again after any late registration).
    pub fn rebuild_execution_plan(&mut self) {
        let plan = self.analyzer.compute_stages(&self.base.tick_ids());
        tracing::debug!(
            stages = plan.stage_count(),
            systems = plan.system_count(),
            "execution plan rebuilt"
        );
        self.plan = Some(plan);
        self.warned_unplanned = false;
    }

    pub fn execution_plan(&self) -> Option<&ExecutionPlan> {
        self.plan.as_ref()
    }

    /// Human-readable plan dump for operational tooling
    pub fn describe_plan(&self) -> String {
        match &self.plan {
            Some(plan) => plan.describe(),
            None => "Execution plan: not built (call rebuild_execution_plan)".to_string(),
        }
    }

    pub fn analyzer(&self) -> &ConflictAnalyzer {
        &self.analyzer
    }

    // === LIFECYCLE ===

    /// One-time setup of every registered system; exactly once, failures
    /// propagate (see the sequential driver).
    pub fn initialize(&mut self, world: &W) -> Result<()> {
        self.base.initialize(world)
    }

    /// Render stays sequential
    pub fn render(&mut self, world: &W) -> FrameReport {
        self.base.render(world)
    }

    // === INTROSPECTION (delegated) ===

    pub fn tick_system_count(&self) -> usize {
        self.base.tick_system_count()
    }

    pub fn render_system_count(&self) -> usize {
        self.base.render_system_count()
    }

    pub fn system_count(&self) -> usize {
        self.base.system_count()
    }

    pub fn is_initialized(&self) -> bool {
        self.base.is_initialized()
    }

    pub fn config(&self) -> &SchedulerConfig {
        self.base.config()
    }

    pub fn get_tick_system_mut<S: TickSystem<W> + 'static>(&mut self) -> Option<&mut S> {
        self.base.get_tick_system_mut::<S>()
    }

    pub fn get_render_system_mut<S: RenderSystem<W> + 'static>(&mut self) -> Option<&mut S> {
        self.base.get_render_system_mut::<S>()
    }

    pub fn metrics(&self) -> Vec<MetricsSnapshot> {
        self.base.metrics()
    }

    pub fn reset_metrics(&self) {
        self.base.reset_metrics()
    }

    pub fn tracker(&self) -> Arc<PerfTracker> {
        self.base.tracker()
    }
}

impl<W: Sync> ParallelScheduler<W> {
    /// Execute one tick stage by stage
    ///
    /// Within a stage every enabled member is dispatched concurrently and
    /// the call joins before the next stage starts (fork/join barrier).
    /// Member failures are isolated exactly as in the sequential driver.
    /// Systems registered after the last rebuild are not in the cached plan
    /// and are skipped until the host rebuilds; with no plan at all the
    /// tick degrades to the sequential path.
    pub fn tick(&mut self, world: &W, dt: f32) -> FrameReport {
        let Some(plan) = self.plan.clone() else {
            tracing::debug!("no execution plan built; ticking sequentially");
            return self.base.tick(world, dt);
        };

        if !self.warned_unplanned {
            let unplanned: Vec<SystemId> = self
                .base
                .tick_ids()
                .into_iter()
                .filter(|&id| !plan.contains(id))
                .collect();
            if !unplanned.is_empty() {
                tracing::warn!(
                    ?unplanned,
                    "tick systems not in the cached plan are skipped; call rebuild_execution_plan()"
                );
            }
            self.warned_unplanned = true;
        }

        let frame = self.base.advance_frame();
        let mut report = FrameReport::new(Phase::Tick);

        // Enabled set is snapshotted once for this call
        let enabled = self.base.enabled_tick_ids();
        let slots: AHashMap<SystemId, &TickEntry<W>> = self
            .base
            .tick_entries()
            .iter()
            .map(|entry| (entry.id, entry))
            .collect();
        let tracker = self.base.tracker();

        for stage in &plan.stages {
            // collect() is the barrier: stage k+1 never starts until every
            // member of stage k has returned.
            let outcomes: Vec<(SystemId, Result<()>)> = stage
                .systems
                .par_iter()
                .filter(|&&id| enabled.contains(&id))
                .filter_map(|&id| {
                    let entry = slots.get(&id)?;
                    let mut system = lock_slot(&entry.system);
                    let start = Instant::now();
                    let result = system.update(world, dt);
                    tracker.record(id, start.elapsed(), frame);
                    Some((id, result))
                })
                .collect();

            for (id, result) in outcomes {
                report.systems_run += 1;
                if let Err(error) = result {
                    tracing::error!(
                        system = %id,
                        phase = %Phase::Tick,
                        %error,
                        "system update failed; sibling stage members unaffected"
                    );
                    report.failures.push(SystemFailure {
                        system: id,
                        phase: Phase::Tick,
                        error,
                    });
                }
            }
        }

        self.base.maybe_log_summary(frame);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::SchedError;
    use crate::core::types::ComponentTag;
    use ahash::AHashSet;
    use std::any::Any;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    const POSITION: ComponentTag = ComponentTag::new("Position");
    const VELOCITY: ComponentTag = ComponentTag::new("Velocity");
    const HEALTH: ComponentTag = ComponentTag::new("Health");

    /// Interior-mutable world shared across worker threads
    #[derive(Default)]
    struct TestWorld {
        journal: Mutex<Vec<&'static str>>,
    }

    impl TestWorld {
        fn log(&self, name: &'static str) {
            self.journal.lock().unwrap().push(name);
        }

        fn entries(&self) -> Vec<&'static str> {
            self.journal.lock().unwrap().clone()
        }
    }

    struct DeclaredSystem {
        name: &'static str,
        priority: i32,
        reads: Vec<ComponentTag>,
        writes: Vec<ComponentTag>,
        enabled: std::sync::Arc<AtomicBool>,
        fail: bool,
    }

    impl DeclaredSystem {
        fn boxed(
            name: &'static str,
            priority: i32,
            reads: &[ComponentTag],
            writes: &[ComponentTag],
        ) -> Box<Self> {
            Box::new(Self {
                name,
                priority,
                reads: reads.to_vec(),
                writes: writes.to_vec(),
                enabled: std::sync::Arc::new(AtomicBool::new(true)),
                fail: false,
            })
        }
    }

    impl TickSystem<TestWorld> for DeclaredSystem {
        fn id(&self) -> SystemId {
            SystemId::new(self.name)
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn is_enabled(&self) -> bool {
            self.enabled.load(Ordering::Relaxed)
        }
        fn reads_components(&self) -> AHashSet<ComponentTag> {
            self.reads.iter().copied().collect()
        }
        fn writes_components(&self) -> AHashSet<ComponentTag> {
            self.writes.iter().copied().collect()
        }
        fn update(&mut self, world: &TestWorld, _dt: f32) -> Result<()> {
            world.log(self.name);
            if self.fail {
                return Err(SchedError::System(format!("{} exploded", self.name)));
            }
            Ok(())
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn scheduler() -> ParallelScheduler<TestWorld> {
        ParallelScheduler::new(SchedulerConfig::default())
    }

    #[test]
    fn test_duplicate_rejected_before_any_mutation() {
        let mut sched = scheduler();
        sched
            .register_tick_system(DeclaredSystem::boxed("movement", 0, &[], &[POSITION]))
            .unwrap();
        let err = sched
            .register_tick_system(DeclaredSystem::boxed("movement", 5, &[], &[]))
            .unwrap_err();
        assert!(matches!(err, SchedError::DuplicateSystem(_)));
        assert_eq!(sched.tick_system_count(), 1);
    }

    #[test]
    fn test_plan_separates_conflicting_systems() {
        let mut sched = scheduler();
        // movement writes Position; physics writes Velocity reads Position;
        // regen writes Health - regen conflicts with nobody.
        sched
            .register_tick_system(DeclaredSystem::boxed("movement", 10, &[VELOCITY], &[POSITION]))
            .unwrap();
        sched
            .register_tick_system(DeclaredSystem::boxed("physics", 20, &[POSITION], &[VELOCITY]))
            .unwrap();
        sched
            .register_tick_system(DeclaredSystem::boxed("regen", 15, &[], &[HEALTH]))
            .unwrap();

        sched.rebuild_execution_plan();
        let plan = sched.execution_plan().unwrap();

        // movement/physics conflict twice over (each writes what the other
        // reads), regen joins the first stage.
        assert_eq!(plan.stage_count(), 2);
        assert_eq!(
            plan.stages[0].systems,
            vec![SystemId::new("movement"), SystemId::new("regen")]
        );
        assert_eq!(plan.stages[1].systems, vec![SystemId::new("physics")]);
    }

    #[test]
    fn test_stage_barrier_ordering() {
        let mut sched = scheduler();
        sched
            .register_tick_system(DeclaredSystem::boxed("writer", 0, &[], &[POSITION]))
            .unwrap();
        sched
            .register_tick_system(DeclaredSystem::boxed("reader_a", 10, &[POSITION], &[]))
            .unwrap();
        sched
            .register_tick_system(DeclaredSystem::boxed("reader_b", 10, &[POSITION], &[]))
            .unwrap();

        sched.rebuild_execution_plan();
        let world = TestWorld::default();
        let report = sched.tick(&world, 0.016);

        assert_eq!(report.systems_run, 3);
        let entries = world.entries();
        // writer finishes before either reader starts: stage 0 = {writer},
        // stage 1 = {reader_a, reader_b} in either internal order.
        assert_eq!(entries[0], "writer");
        assert_eq!(entries.len(), 3);
        assert!(entries[1..].contains(&"reader_a"));
        assert!(entries[1..].contains(&"reader_b"));
    }

    #[test]
    fn test_fallback_without_plan() {
        let mut sched = scheduler();
        sched
            .register_tick_system(DeclaredSystem::boxed("solo", 0, &[], &[POSITION]))
            .unwrap();

        let world = TestWorld::default();
        let report = sched.tick(&world, 0.016);
        assert_eq!(report.systems_run, 1);
        assert_eq!(world.entries(), vec!["solo"]);
    }

    #[test]
    fn test_late_registration_skipped_until_rebuild() {
        let mut sched = scheduler();
        sched
            .register_tick_system(DeclaredSystem::boxed("planned", 0, &[], &[POSITION]))
            .unwrap();
        sched.rebuild_execution_plan();

        sched
            .register_tick_system(DeclaredSystem::boxed("late", 5, &[], &[VELOCITY]))
            .unwrap();

        let world = TestWorld::default();
        let report = sched.tick(&world, 0.016);
        assert_eq!(report.systems_run, 1);
        assert_eq!(world.entries(), vec!["planned"]);

        sched.rebuild_execution_plan();
        let report = sched.tick(&world, 0.016);
        assert_eq!(report.systems_run, 2);
    }

    #[test]
    fn test_failure_isolated_within_stage() {
        let mut sched = scheduler();
        let mut bomb = DeclaredSystem::boxed("bomb", 0, &[], &[POSITION]);
        bomb.fail = true;
        sched.register_tick_system(bomb).unwrap();
        sched
            .register_tick_system(DeclaredSystem::boxed("sibling", 0, &[], &[VELOCITY]))
            .unwrap();
        sched
            .register_tick_system(DeclaredSystem::boxed("follower", 10, &[POSITION], &[]))
            .unwrap();

        sched.rebuild_execution_plan();
        let world = TestWorld::default();
        let report = sched.tick(&world, 0.016);

        assert_eq!(report.systems_run, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].system, SystemId::new("bomb"));
        // Sibling (same stage) and follower (later stage) both ran
        assert!(world.entries().contains(&"sibling"));
        assert!(world.entries().contains(&"follower"));
    }

    #[test]
    fn test_disabled_member_skipped_for_the_call() {
        let mut sched = scheduler();
        let system = DeclaredSystem::boxed("toggling", 0, &[], &[POSITION]);
        let enabled = std::sync::Arc::clone(&system.enabled);
        sched.register_tick_system(system).unwrap();
        sched
            .register_tick_system(DeclaredSystem::boxed("steady", 5, &[], &[VELOCITY]))
            .unwrap();
        sched.rebuild_execution_plan();

        let world = TestWorld::default();
        enabled.store(false, Ordering::Relaxed);
        let report = sched.tick(&world, 0.016);
        assert_eq!(report.systems_run, 1);

        enabled.store(true, Ordering::Relaxed);
        let report = sched.tick(&world, 0.016);
        assert_eq!(report.systems_run, 2);
    }

    #[test]
    fn test_exclusive_system_runs_alone() {
        let mut sched = scheduler();
        let loader = DeclaredSystem::boxed("loader", 0, &[POSITION], &[]);
        // Exclusive despite read-only access
        struct Exclusive(DeclaredSystem);
        impl TickSystem<TestWorld> for Exclusive {
            fn id(&self) -> SystemId {
                self.0.id()
            }
            fn priority(&self) -> i32 {
                self.0.priority()
            }
            fn allows_concurrent_execution(&self) -> bool {
                false
            }
            fn reads_components(&self) -> AHashSet<ComponentTag> {
                self.0.reads_components()
            }
            fn update(&mut self, world: &TestWorld, dt: f32) -> Result<()> {
                self.0.update(world, dt)
            }
            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
        }

        sched
            .register_tick_system(Box::new(Exclusive(*loader)))
            .unwrap();
        sched
            .register_tick_system(DeclaredSystem::boxed("observer", 5, &[POSITION], &[]))
            .unwrap();
        sched.rebuild_execution_plan();

        let plan = sched.execution_plan().unwrap();
        assert_eq!(plan.stage_count(), 2);
        assert_eq!(plan.stages[0].systems, vec![SystemId::new("loader")]);
    }

    #[test]
    fn test_metrics_recorded_from_worker_threads() {
        let mut sched = scheduler();
        sched
            .register_tick_system(DeclaredSystem::boxed("a", 0, &[], &[POSITION]))
            .unwrap();
        sched
            .register_tick_system(DeclaredSystem::boxed("b", 0, &[], &[VELOCITY]))
            .unwrap();
        sched.rebuild_execution_plan();

        let world = TestWorld::default();
        for _ in 0..3 {
            sched.tick(&world, 0.016);
        }

        for name in ["a", "b"] {
            let snap = sched.tracker().snapshot_for(SystemId::new(name)).unwrap();
            assert_eq!(snap.update_count, 3, "samples lost for {}", name);
        }
    }

    #[test]
    fn test_describe_plan_before_and_after_rebuild() {
        let mut sched = scheduler();
        assert!(sched.describe_plan().contains("not built"));

        sched
            .register_tick_system(DeclaredSystem::boxed("solo", 0, &[], &[POSITION]))
            .unwrap();
        sched.rebuild_execution_plan();
        assert!(sched.describe_plan().contains("solo"));
    }
}
