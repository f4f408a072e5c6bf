//! System scheduling - sequential and stage-parallel frame drivers
//!
//! Systems implement one or both capability traits: [`TickSystem`] for
//! per-frame simulation logic and [`RenderSystem`] for the serialized
//! render pass. The scheduler dispatches by capability presence; there is
//! no combined base class to cast through.
//!
//! Failure isolation is expressed in the types: a system reports failure
//! by returning `Err` from `update`/`render`, and the driver captures every
//! outcome into the [`FrameReport`] it returns instead of letting one
//! failure abort the frame.

pub mod parallel;
pub mod sequential;

pub use parallel::ParallelScheduler;
pub use sequential::SequentialScheduler;

use std::any::Any;
use std::sync::Mutex;

use ahash::AHashSet;

use crate::core::error::{Result, SchedError};
use crate::core::types::{ComponentTag, Phase, SystemId};

/// Tick-phase capability: per-frame simulation logic on the shared world
///
/// The world is passed as a shared reference every call; systems mutate it
/// through whatever interior-mutable storage the host provides. The
/// declared read/write sets are the contract that makes concurrent stage
/// membership safe; nothing verifies the declaration at runtime.
pub trait TickSystem<W>: Send {
    /// Stable identity; duplicate registration is rejected
    fn id(&self) -> SystemId;

    /// Lower runs earlier when ordering is required
    fn priority(&self) -> i32 {
        0
    }

    /// Read fresh every frame; a disabled system is skipped for that call
    /// only, not deregistered
    fn is_enabled(&self) -> bool {
        true
    }

    /// When false, the system never shares a stage with any other system
    fn allows_concurrent_execution(&self) -> bool {
        true
    }

    /// Component kinds this system may read during a tick
    fn reads_components(&self) -> AHashSet<ComponentTag> {
        AHashSet::new()
    }

    /// Component kinds this system may mutate during a tick
    fn writes_components(&self) -> AHashSet<ComponentTag> {
        AHashSet::new()
    }

    /// Diagnostic text for plan dumps
    fn description(&self) -> &str {
        ""
    }

    /// One-time setup; a failure here aborts scheduler initialization
    fn initialize(&mut self, _world: &W) -> Result<()> {
        Ok(())
    }

    /// Per-frame work; `dt` is the delta time in seconds
    fn update(&mut self, world: &W, dt: f32) -> Result<()>;

    /// Downcast hook for typed lookup
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Render-phase capability: serialized draw pass over the shared world
pub trait RenderSystem<W>: Send {
    /// Stable identity; duplicate registration is rejected
    fn id(&self) -> SystemId;

    /// Lower renders earlier
    fn render_order(&self) -> i32 {
        0
    }

    /// Read fresh every frame
    fn is_enabled(&self) -> bool {
        true
    }

    /// One-time setup; a failure here aborts scheduler initialization
    fn initialize(&mut self, _world: &W) -> Result<()> {
        Ok(())
    }

    fn render(&mut self, world: &W) -> Result<()>;

    /// Downcast hook for typed lookup
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// One captured per-system failure
#[derive(Debug)]
pub struct SystemFailure {
    pub system: SystemId,
    pub phase: Phase,
    pub error: SchedError,
}

/// Outcome of one `tick` or `render` call
///
/// The frame never stops because one system misbehaves; everything that
/// went wrong is collected here after being logged.
#[derive(Debug)]
pub struct FrameReport {
    pub phase: Phase,
    pub systems_run: usize,
    pub failures: Vec<SystemFailure>,
}

impl FrameReport {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            systems_run: 0,
            failures: Vec::new(),
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

pub(crate) struct TickEntry<W> {
    pub id: SystemId,
    pub priority: i32,
    pub system: Mutex<Box<dyn TickSystem<W>>>,
}

pub(crate) struct RenderEntry<W> {
    pub id: SystemId,
    pub render_order: i32,
    pub system: Mutex<Box<dyn RenderSystem<W>>>,
}

/// Lock a system slot, recovering the inner value if a worker panicked
/// while holding the lock on an earlier frame.
pub(crate) fn lock_slot<T: ?Sized>(slot: &Mutex<Box<T>>) -> std::sync::MutexGuard<'_, Box<T>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// `get_mut` counterpart of [`lock_slot`] for single-threaded paths.
pub(crate) fn slot_mut<T: ?Sized>(slot: &mut Mutex<Box<T>>) -> &mut Box<T> {
    match slot.get_mut() {
        Ok(inner) => inner,
        Err(poisoned) => poisoned.into_inner(),
    }
}
