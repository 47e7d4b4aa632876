//! The graph handle and everything that coordinates vertices.
//!
//! ## Layout
//!
//! | Module       | Concern                                                 |
//! |--------------|---------------------------------------------------------|
//! | `state`      | graph state lock (mutex + condvar) and its holder type  |
//! | `descriptor` | per-vertex lock descriptor                              |
//! | `lock`       | lock state machine: writable, readonly, inarcs yielding |
//! | `guard`      | scoped vertex locks                                     |
//! | `readonly`   | graph-wide readonly mode                                |
//! | `connect`    | arc write path and reverse-arc coordination             |
//! | `expire`     | removal of arcs past their expiration time              |
//! | `timing`     | timing budgets and access-denial reasons                |
//! | `config`     | [`GraphConfig`]                                         |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use arcgraph::{ArcCreate, Graph, GraphConfig, Predicator, Relationship};
//!
//! # fn main() -> arcgraph::Result<()> {
//! let graph = Graph::new(GraphConfig::default())?;
//! let knows = graph.enumerator().encode_relationship("knows")?;
//! graph.connect("alice", "bob", Predicator::relationship_probe(knows), &ArcCreate::default())?;
//! assert_eq!(graph.vertex("alice").unwrap().outdegree(), 1);
//! # Ok(())
//! # }
//! ```

mod config;
mod connect;
mod descriptor;
mod expire;
mod guard;
mod lock;
mod readonly;
mod state;
mod timing;

pub use config::GraphConfig;
pub use connect::{ArcCreate, ArcWrite, CreateCondition};
pub use descriptor::{InarcsState, LockMode, ThreadId, VertexContext, VertexDescriptor};
pub use expire::ExpireOutcome;
pub use guard::{LockedVertex, ReadonlyVertex, WritableVertex};
pub use timing::{AccessReason, TimingBudget};

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use self::state::{GraphState, StateLock};
use crate::index::Enumerator;
use crate::model::{validate_identifier, Manifestation, Vertex, VertexHandle, VertexId, VertexSpec};
use crate::tx::{CommitHooks, EventScheduler, NoopCommit, NoopScheduler};
use crate::{Error, Result};

// ============================================================================
// Shared state
// ============================================================================

pub(crate) struct GraphInner {
    pub(crate) config: GraphConfig,
    pub(crate) state: Mutex<GraphState>,
    pub(crate) changed: Condvar,
    pub(crate) hooks: Box<dyn CommitHooks>,
    pub(crate) scheduler: Box<dyn EventScheduler>,
    pub(crate) enumerator: Enumerator,
    next_vertex_id: AtomicU64,
    pub(crate) n_arcs_fwd: AtomicI64,
    pub(crate) n_arcs_rev: AtomicI64,
}

impl Drop for GraphInner {
    fn drop(&mut self) {
        // Arcvectors hold handles to each other; break the cycles.
        for v in self.state.get_mut().index.handles() {
            v.clear_arcs();
        }
    }
}

/// Shared handle to one in-memory graph.
#[derive(Clone)]
pub struct Graph {
    pub(crate) inner: Arc<GraphInner>,
}

/// Builder for a [`Graph`] with custom collaborators.
pub struct GraphBuilder {
    config: GraphConfig,
    hooks: Box<dyn CommitHooks>,
    scheduler: Box<dyn EventScheduler>,
}

impl GraphBuilder {
    pub fn new(config: GraphConfig) -> Self {
        Self { config, hooks: Box::new(NoopCommit), scheduler: Box::new(NoopScheduler) }
    }

    pub fn commit_hooks(mut self, hooks: impl CommitHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn scheduler(mut self, scheduler: impl EventScheduler + 'static) -> Self {
        self.scheduler = Box::new(scheduler);
        self
    }

    pub fn build(self) -> Result<Graph> {
        self.config.validate()?;
        debug!(graph = %self.config.name, "graph created");
        Ok(Graph {
            inner: Arc::new(GraphInner {
                config: self.config,
                state: Mutex::new(GraphState::default()),
                changed: Condvar::new(),
                hooks: self.hooks,
                scheduler: self.scheduler,
                enumerator: Enumerator::new(),
                next_vertex_id: AtomicU64::new(1),
                n_arcs_fwd: AtomicI64::new(0),
                n_arcs_rev: AtomicI64::new(0),
            }),
        })
    }
}

/// Current time in whole seconds since the epoch.
pub(crate) fn now_secs() -> u32 {
    u32::try_from(chrono::Utc::now().timestamp()).unwrap_or(u32::MAX - 1)
}

// ============================================================================
// Graph
// ============================================================================

impl Graph {
    pub fn new(config: GraphConfig) -> Result<Self> {
        GraphBuilder::new(config).build()
    }

    pub fn builder(config: GraphConfig) -> GraphBuilder {
        GraphBuilder::new(config)
    }

    pub fn config(&self) -> &GraphConfig {
        &self.inner.config
    }

    pub fn enumerator(&self) -> &Enumerator {
        &self.inner.enumerator
    }

    /// Number of indexed vertices.
    pub fn order(&self) -> usize {
        self.inner.lock_state().index.len()
    }

    /// Number of forward arcs.
    pub fn size(&self) -> i64 {
        self.inner.n_arcs_fwd.load(Ordering::Acquire)
    }

    /// Number of reverse arc entries (forward-only arcs have none).
    pub fn size_reverse(&self) -> i64 {
        self.inner.n_arcs_rev.load(Ordering::Acquire)
    }

    pub fn vertex(&self, identifier: &str) -> Option<VertexHandle> {
        self.inner.lock_state().index.lookup(identifier).map(|s| s.handle.clone())
    }

    pub fn vertex_by_id(&self, id: VertexId) -> Option<VertexHandle> {
        self.inner.lock_state().index.slot(id).map(|s| s.handle.clone())
    }

    /// Snapshot of a vertex's lock descriptor, `None` once unindexed.
    pub fn descriptor(&self, v: &Vertex) -> Option<VertexDescriptor> {
        self.inner.lock_state().descriptor(v.id()).copied()
    }

    pub fn vertices(&self) -> Vec<VertexHandle> {
        self.inner.lock_state().index.handles().cloned().collect()
    }

    /// Create a vertex, or return the existing one with that identifier.
    ///
    /// Fails with [`Error::TypeMismatch`] when an existing vertex has a
    /// different type than `spec` names.
    pub fn create_vertex(&self, identifier: &str, spec: VertexSpec) -> Result<VertexHandle> {
        validate_identifier(identifier)?;
        let mut state = self.inner.lock_state();
        if let Some(existing) = state.index.lookup(identifier).map(|s| s.handle.clone()) {
            self.check_type(&existing, &spec)?;
            return Ok(existing);
        }
        self.create_vertex_locked(&mut state, identifier, &spec, VertexContext::Active)
    }

    fn check_type(&self, v: &Vertex, spec: &VertexSpec) -> Result<()> {
        let Some(name) = &spec.type_name else {
            return Ok(());
        };
        let expected = self.inner.enumerator.encode_vertex_type(name)?;
        let got = v.vertex_type();
        if got != expected {
            let got = self
                .inner
                .enumerator
                .decode(crate::index::EnumSpace::VertexType, u16::from(got))
                .unwrap_or_else(|| format!("#{got}"));
            return Err(Error::TypeMismatch { expected: name.clone(), got });
        }
        Ok(())
    }

    fn create_vertex_locked(
        &self,
        state: &mut StateLock<'_>,
        identifier: &str,
        spec: &VertexSpec,
        context: VertexContext,
    ) -> Result<VertexHandle> {
        if state.index.is_readonly() {
            return Err(Error::ReadonlyGraph);
        }
        let mut attributes = spec.attributes.clone();
        if let Some(name) = &spec.type_name {
            attributes.vertex_type = self.inner.enumerator.encode_vertex_type(name)?;
        }
        if attributes.tmc == 0 {
            attributes.tmc = now_secs();
            attributes.tmm = attributes.tmc;
        }
        let id = VertexId(self.inner.next_vertex_id.fetch_add(1, Ordering::Relaxed));
        let handle = Arc::new(Vertex::new(id, identifier.to_string(), attributes));
        let manifestation = match spec.manifestation {
            Manifestation::Null => Manifestation::Real,
            m => m,
        };
        let mut descriptor = VertexDescriptor::new(manifestation);
        descriptor.context = context;
        state.index.insert(handle.clone(), descriptor)?;
        debug!(vertex = %id, identifier, ?manifestation, "vertex created");
        Ok(handle)
    }

    // ------------------------------------------------------------------------
    // Single-vertex locks
    // ------------------------------------------------------------------------

    pub fn lock_writable(&self, v: &VertexHandle, timeout_ms: u64) -> Result<WritableVertex<'_>> {
        let mut budget = TimingBudget::from_millis(timeout_ms);
        if self.inner.lock_state().lock_writable(v, &mut budget) {
            Ok(WritableVertex::new(self, v.clone()))
        } else {
            Err(Error::access(budget.reason(), format!("cannot lock {} writable", v.identifier())))
        }
    }

    pub fn lock_readonly(&self, v: &VertexHandle, timeout_ms: u64) -> Result<ReadonlyVertex<'_>> {
        let mut budget = TimingBudget::from_millis(timeout_ms);
        if self.inner.lock_state().lock_readonly(v, &mut budget) {
            Ok(ReadonlyVertex::new(self, v.clone()))
        } else {
            Err(Error::access(budget.reason(), format!("cannot lock {} readonly", v.identifier())))
        }
    }

    // ------------------------------------------------------------------------
    // Pair acquisition
    // ------------------------------------------------------------------------

    /// Lock the two endpoints of an arc writable, both or neither.
    ///
    /// A missing initial is created Real. A missing terminal is created
    /// with `terminal_default`, or refused when that is `Null`. A Virtual
    /// initial becomes Real. Each attempt uses a short sub-budget and
    /// releases everything before retrying, so two threads locking the same
    /// pair in opposite order cannot hold each other up indefinitely.
    pub fn acquire_initial_and_terminal_writable(
        &self,
        initial: &str,
        terminal: &str,
        terminal_default: Manifestation,
        timeout_ms: u64,
    ) -> Result<(WritableVertex<'_>, WritableVertex<'_>)> {
        if initial == terminal {
            return Err(Error::VertexArc(format!("initial and terminal are both {initial}")));
        }
        validate_identifier(initial)?;
        validate_identifier(terminal)?;
        let pair_ms = self.inner.config.pair_attempt_timeout_ms;
        let budget = TimingBudget::from_millis(timeout_ms);
        let mut state = self.inner.lock_state();
        loop {
            let found = state.index.lookup(initial).map(|s| s.handle.clone());
            let init = match found {
                Some(handle) => handle,
                None => self.create_vertex_locked(&mut state, initial, &VertexSpec::new(), VertexContext::Suspended)?,
            };
            let found = state.index.lookup(terminal).map(|s| s.handle.clone());
            let term = match found {
                Some(handle) => handle,
                None if terminal_default == Manifestation::Null => {
                    return Err(Error::access(AccessReason::NoExist, format!("terminal {terminal} does not exist")));
                }
                None => {
                    let spec = VertexSpec::new().with_manifestation(terminal_default);
                    self.create_vertex_locked(&mut state, terminal, &spec, VertexContext::Suspended)?
                }
            };

            let mut attempt = budget.sub_budget(pair_ms);
            let reason = if state.lock_writable(&init, &mut attempt) {
                let mut second = budget.sub_budget(pair_ms);
                if state.lock_writable_yielding(&term, Some(&init), &mut second) {
                    if let Some(d) = state.descriptor_mut(init.id()) {
                        if d.manifestation == Manifestation::Virtual {
                            d.manifestation = Manifestation::Real;
                        }
                    }
                    return Ok((WritableVertex::new(self, init), WritableVertex::new(self, term)));
                }
                state.unlock_writable(&init)?;
                second.reason()
            } else {
                attempt.reason()
            };
            state.check_isolation(&term);
            state.check_isolation(&init);

            if !(reason.is_retryable() || reason == AccessReason::NoExist) {
                return Err(Error::access(reason, format!("cannot lock {initial} and {terminal}")));
            }
            if budget.is_expired() {
                let reason = if budget.is_zero() { AccessReason::Locked } else { AccessReason::Timeout };
                return Err(Error::access(reason, format!("cannot lock {initial} and {terminal}")));
            }
            let pause = std::time::Duration::from_millis(self.inner.config.backoff_ms);
            state.suspend(|| std::thread::sleep(pause));
        }
    }

    /// Lock two existing vertices readonly, both or neither.
    pub fn acquire_initial_and_terminal_readonly(
        &self,
        initial: &str,
        terminal: &str,
        timeout_ms: u64,
    ) -> Result<(ReadonlyVertex<'_>, ReadonlyVertex<'_>)> {
        let pair_ms = self.inner.config.pair_attempt_timeout_ms;
        let budget = TimingBudget::from_millis(timeout_ms);
        let mut state = self.inner.lock_state();
        loop {
            let (Some(init), Some(term)) = (
                state.index.lookup(initial).map(|s| s.handle.clone()),
                state.index.lookup(terminal).map(|s| s.handle.clone()),
            ) else {
                return Err(Error::access(
                    AccessReason::NoExist,
                    format!("{initial} and {terminal} must both exist"),
                ));
            };
            let mut attempt = budget.sub_budget(pair_ms);
            let reason = if state.lock_readonly(&init, &mut attempt) {
                let mut second = budget.sub_budget(pair_ms);
                if state.lock_readonly(&term, &mut second) {
                    return Ok((ReadonlyVertex::new(self, init), ReadonlyVertex::new(self, term)));
                }
                state.unlock_readonly(&init)?;
                second.reason()
            } else {
                attempt.reason()
            };
            if !reason.is_retryable() {
                return Err(Error::access(reason, format!("cannot lock {initial} and {terminal}")));
            }
            if budget.is_expired() {
                let reason = if budget.is_zero() { AccessReason::Locked } else { AccessReason::Timeout };
                return Err(Error::access(reason, format!("cannot lock {initial} and {terminal}")));
            }
            let pause = std::time::Duration::from_millis(self.inner.config.backoff_ms);
            state.suspend(|| std::thread::sleep(pause));
        }
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.inner.config.name)
            .field("order", &self.order())
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tx::RecordingScheduler;

    #[test]
    fn test_create_vertex_returns_existing() {
        let g = Graph::new(GraphConfig::default()).unwrap();
        let a = g.create_vertex("a", VertexSpec::new().with_type("person")).unwrap();
        let again = g.create_vertex("a", VertexSpec::new()).unwrap();
        assert_eq!(a.id(), again.id());
        assert_eq!(g.order(), 1);
        assert!(a.attributes().tmc > 0);
    }

    #[test]
    fn test_create_vertex_type_mismatch() {
        let g = Graph::new(GraphConfig::default()).unwrap();
        g.create_vertex("a", VertexSpec::new().with_type("person")).unwrap();
        let err = g.create_vertex("a", VertexSpec::new().with_type("city")).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref expected, ref got } if expected == "city" && got == "person"));
    }

    #[test]
    fn test_create_vertex_rejects_bad_identifier() {
        let g = Graph::new(GraphConfig::default()).unwrap();
        assert!(matches!(g.create_vertex("", VertexSpec::new()), Err(Error::InvalidIdentifier(_))));
    }

    #[test]
    fn test_pair_creates_missing_vertices() {
        let g = Graph::new(GraphConfig::default()).unwrap();
        let (a, b) = g.acquire_initial_and_terminal_writable("a", "b", Manifestation::Virtual, 100).unwrap();
        assert_eq!(g.descriptor(&a).unwrap().manifestation, Manifestation::Real);
        assert_eq!(g.descriptor(&b).unwrap().manifestation, Manifestation::Virtual);
        assert_eq!(g.descriptor(&b).unwrap().context, VertexContext::Suspended);
        assert_eq!(g.n_writable(), 2);
        drop(a);
        drop(b);
        // No arc was written, so the virtual terminal goes away.
        assert!(g.vertex("b").is_none());
        assert!(g.vertex("a").is_some());
    }

    #[test]
    fn test_pair_null_terminal_must_exist() {
        let g = Graph::new(GraphConfig::default()).unwrap();
        let err = g.acquire_initial_and_terminal_writable("a", "b", Manifestation::Null, 100).unwrap_err();
        assert_eq!(err.access_reason(), Some(AccessReason::NoExist));
        assert!(matches!(
            g.acquire_initial_and_terminal_writable("a", "a", Manifestation::Real, 100),
            Err(Error::VertexArc(_))
        ));
    }

    #[test]
    fn test_pair_virtual_initial_becomes_real() {
        let g = Graph::new(GraphConfig::default()).unwrap();
        g.create_vertex("b", VertexSpec::new()).unwrap();
        let v = g.create_vertex("v", VertexSpec::new().with_manifestation(Manifestation::Virtual)).unwrap();
        let (a, _b) = g.acquire_initial_and_terminal_writable("v", "b", Manifestation::Null, 100).unwrap();
        assert_eq!(a.id(), v.id());
        assert_eq!(g.descriptor(&v).unwrap().manifestation, Manifestation::Real);
    }

    #[test]
    fn test_readonly_pair_requires_both() {
        let g = Graph::new(GraphConfig::default()).unwrap();
        g.create_vertex("a", VertexSpec::new()).unwrap();
        assert!(g.acquire_initial_and_terminal_readonly("a", "b", 10).is_err());
        g.create_vertex("b", VertexSpec::new()).unwrap();
        let (a, b) = g.acquire_initial_and_terminal_readonly("a", "b", 10).unwrap();
        assert!(g.descriptor(&a).unwrap().is_readonly());
        assert!(g.descriptor(&b).unwrap().is_readonly());
    }

    #[test]
    fn test_builder_with_scheduler() {
        let scheduler = Arc::new(RecordingScheduler::new());
        let g = Graph::builder(GraphConfig::new("sched")).scheduler(scheduler.clone()).build().unwrap();
        assert_eq!(g.config().name, "sched");
        assert!(scheduler.events().is_empty());
    }
}
