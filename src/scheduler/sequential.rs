//! Baseline frame driver: one system at a time
//!
//! Holds the tick-phase and render-phase collections, keeps them sorted by
//! priority / render order, runs one-time setup exactly once, and executes
//! each frame with per-system timing and failure isolation.

use std::sync::Arc;
use std::time::Instant;

use crate::core::config::SchedulerConfig;
use crate::core::error::{Result, SchedError};
use crate::core::types::{Phase, SystemId, Tick};
use crate::metrics::{MetricsSnapshot, PerfTracker};

use super::{
    lock_slot, slot_mut, FrameReport, RenderEntry, RenderSystem, SystemFailure, TickEntry,
    TickSystem,
};

/// Sequential scheduler: registration, once-only initialization, and
/// ordered per-frame execution with isolation
///
/// Generic over the opaque world type `W`. The scheduler never stores or
/// inspects the world; it is threaded through every call.
pub struct SequentialScheduler<W> {
    tick_systems: Vec<TickEntry<W>>,
    render_systems: Vec<RenderEntry<W>>,
    tracker: Arc<PerfTracker>,
    config: SchedulerConfig,
    initialized: bool,
    frame: Tick,
}

impl<W> SequentialScheduler<W> {
    pub fn new(config: SchedulerConfig) -> Self {
        let tracker = Arc::new(PerfTracker::new(&config));
        Self {
            tick_systems: Vec::new(),
            render_systems: Vec::new(),
            tracker,
            config,
            initialized: false,
            frame: 0,
        }
    }

    // === REGISTRATION ===

    /// Register a tick-phase system; the collection is re-sorted by
    /// priority (stable, so equal priorities keep registration order).
    pub fn register_tick_system(&mut self, system: Box<dyn TickSystem<W>>) -> Result<()> {
        let id = system.id();
        if self.tick_systems.iter().any(|e| e.id == id) {
            return Err(SchedError::DuplicateSystem(id));
        }

        let priority = system.priority();
        self.tick_systems.push(TickEntry {
            id,
            priority,
            system: std::sync::Mutex::new(system),
        });
        self.tick_systems.sort_by_key(|e| e.priority);
        Ok(())
    }

    /// Register a render-phase system; re-sorted by render order.
    pub fn register_render_system(&mut self, system: Box<dyn RenderSystem<W>>) -> Result<()> {
        let id = system.id();
        if self.render_systems.iter().any(|e| e.id == id) {
            return Err(SchedError::DuplicateSystem(id));
        }

        let render_order = system.render_order();
        self.render_systems.push(RenderEntry {
            id,
            render_order,
            system: std::sync::Mutex::new(system),
        });
        self.render_systems.sort_by_key(|e| e.render_order);
        Ok(())
    }

    // === LIFECYCLE ===

    /// Run every system's one-time setup, in priority then render order
    ///
    /// Callable exactly once. A setup failure propagates immediately and
    /// leaves the scheduler uninitialized.
    pub fn initialize(&mut self, world: &W) -> Result<()> {
        if self.initialized {
            return Err(SchedError::AlreadyInitialized);
        }

        for entry in &mut self.tick_systems {
            slot_mut(&mut entry.system)
                .initialize(world)
                .map_err(|e| SchedError::Setup {
                    system: entry.id,
                    source: Box::new(e),
                })?;
        }
        for entry in &mut self.render_systems {
            slot_mut(&mut entry.system)
                .initialize(world)
                .map_err(|e| SchedError::Setup {
                    system: entry.id,
                    source: Box::new(e),
                })?;
        }

        self.initialized = true;
        tracing::debug!(
            tick_systems = self.tick_systems.len(),
            render_systems = self.render_systems.len(),
            "scheduler initialized"
        );
        Ok(())
    }

    /// Execute one tick over the currently-enabled systems
    ///
    /// The enabled set is snapshotted for this call only; disabling a
    /// system skips it without deregistering. A failing system is logged
    /// and recorded in the report; siblings still run, and the system will
    /// be invoked again next frame unless the host disables it.
    pub fn tick(&mut self, world: &W, dt: f32) -> FrameReport {
        let frame = self.advance_frame();
        let mut report = FrameReport::new(Phase::Tick);

        let enabled: Vec<usize> = self.enabled_tick_indices();
        for i in enabled {
            let entry = &mut self.tick_systems[i];
            let start = Instant::now();
            let result = slot_mut(&mut entry.system).update(world, dt);
            let elapsed = start.elapsed();

            self.tracker.record(entry.id, elapsed, frame);
            report.systems_run += 1;

            if let Err(error) = result {
                tracing::error!(
                    system = %entry.id,
                    phase = %Phase::Tick,
                    %error,
                    "system update failed; continuing with remaining systems"
                );
                report.failures.push(SystemFailure {
                    system: entry.id,
                    phase: Phase::Tick,
                    error,
                });
            }
        }

        self.maybe_log_summary(frame);
        report
    }

    /// Execute the render pass with the same isolation and timing policy
    pub fn render(&mut self, world: &W) -> FrameReport {
        let frame = self.frame;
        let mut report = FrameReport::new(Phase::Render);

        let enabled: Vec<usize> = (0..self.render_systems.len())
            .filter(|&i| slot_mut(&mut self.render_systems[i].system).is_enabled())
            .collect();

        for i in enabled {
            let entry = &mut self.render_systems[i];
            let start = Instant::now();
            let result = slot_mut(&mut entry.system).render(world);
            let elapsed = start.elapsed();

            self.tracker.record(entry.id, elapsed, frame);
            report.systems_run += 1;

            if let Err(error) = result {
                tracing::error!(
                    system = %entry.id,
                    phase = %Phase::Render,
                    %error,
                    "system render failed; continuing with remaining systems"
                );
                report.failures.push(SystemFailure {
                    system: entry.id,
                    phase: Phase::Render,
                    error,
                });
            }
        }

        report
    }

    // === INTROSPECTION ===

    pub fn tick_system_count(&self) -> usize {
        self.tick_systems.len()
    }

    pub fn render_system_count(&self) -> usize {
        self.render_systems.len()
    }

    pub fn system_count(&self) -> usize {
        self.tick_systems.len() + self.render_systems.len()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Typed lookup of a registered tick system
    pub fn get_tick_system_mut<S: TickSystem<W> + 'static>(&mut self) -> Option<&mut S> {
        self.tick_systems
            .iter_mut()
            .find_map(|entry| slot_mut(&mut entry.system).as_any_mut().downcast_mut::<S>())
    }

    /// Typed lookup of a registered render system
    pub fn get_render_system_mut<S: RenderSystem<W> + 'static>(&mut self) -> Option<&mut S> {
        self.render_systems
            .iter_mut()
            .find_map(|entry| slot_mut(&mut entry.system).as_any_mut().downcast_mut::<S>())
    }

    pub fn metrics(&self) -> Vec<MetricsSnapshot> {
        self.tracker.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.tracker.reset();
    }

    pub fn tracker(&self) -> Arc<PerfTracker> {
        Arc::clone(&self.tracker)
    }

    // === INTERNALS (shared with the parallel driver) ===

    pub(crate) fn advance_frame(&mut self) -> Tick {
        self.frame += 1;
        self.frame
    }

    pub(crate) fn tick_entries(&self) -> &[TickEntry<W>] {
        &self.tick_systems
    }

    pub(crate) fn tick_ids(&self) -> Vec<SystemId> {
        self.tick_systems.iter().map(|e| e.id).collect()
    }

    pub(crate) fn enabled_tick_indices(&mut self) -> Vec<usize> {
        (0..self.tick_systems.len())
            .filter(|&i| slot_mut(&mut self.tick_systems[i].system).is_enabled())
            .collect()
    }

    /// Enabled-set snapshot usable without `&mut self` (locks each slot once)
    pub(crate) fn enabled_tick_ids(&self) -> ahash::AHashSet<SystemId> {
        self.tick_systems
            .iter()
            .filter(|e| lock_slot(&e.system).is_enabled())
            .map(|e| e.id)
            .collect()
    }

    pub(crate) fn maybe_log_summary(&self, frame: Tick) {
        if frame % self.config.summary_interval_ticks == 0 {
            self.tracker.log_summary();
        }
    }
}
