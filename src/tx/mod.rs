//! Commit and scheduling hooks.
//!
//! The graph calls these around lock-mode transitions and when arc
//! expirations change. Durability and timers live outside this crate;
//! the no-op implementations are the defaults.

use parking_lot::Mutex;

use crate::model::{Vertex, VertexId};

/// Outcome reported by a commit hook.
pub type CommitResult = std::result::Result<(), String>;

/// Durability capture driven by vertex lock transitions.
pub trait CommitHooks: Send + Sync {
    /// A vertex was acquired writable. Failure aborts the acquisition.
    fn open_operation(&self, _vertex: &Vertex) -> CommitResult {
        Ok(())
    }

    /// Last writable release of a vertex that was only read.
    fn close_vertex(&self, _vertex: &Vertex) -> CommitResult {
        Ok(())
    }

    /// Last writable release or relax of a vertex.
    fn commit_vertex(&self, _vertex: &Vertex) -> CommitResult {
        Ok(())
    }

    /// Release of inarcs modified on behalf of another vertex's operation.
    fn commit_inarcs(&self, _vertex: &Vertex) -> CommitResult {
        Ok(())
    }
}

/// Commit hooks that accept everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCommit;

impl CommitHooks for NoopCommit {}

/// Timer service for vertex events.
pub trait EventScheduler: Send + Sync {
    /// The earliest arc expiration of `vertex` is now `tmx`.
    fn schedule_expiration(&self, vertex: VertexId, tmx: u32);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

impl EventScheduler for NoopScheduler {
    fn schedule_expiration(&self, _vertex: VertexId, _tmx: u32) {}
}

/// Scheduler that records every request, for inspection.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    events: Mutex<Vec<(VertexId, u32)>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(VertexId, u32)> {
        self.events.lock().clone()
    }
}

impl EventScheduler for RecordingScheduler {
    fn schedule_expiration(&self, vertex: VertexId, tmx: u32) {
        self.events.lock().push((vertex, tmx));
    }
}

impl<T: EventScheduler + ?Sized> EventScheduler for std::sync::Arc<T> {
    fn schedule_expiration(&self, vertex: VertexId, tmx: u32) {
        (**self).schedule_expiration(vertex, tmx)
    }
}

impl<T: CommitHooks + ?Sized> CommitHooks for std::sync::Arc<T> {
    fn open_operation(&self, vertex: &Vertex) -> CommitResult {
        (**self).open_operation(vertex)
    }

    fn close_vertex(&self, vertex: &Vertex) -> CommitResult {
        (**self).close_vertex(vertex)
    }

    fn commit_vertex(&self, vertex: &Vertex) -> CommitResult {
        (**self).commit_vertex(vertex)
    }

    fn commit_inarcs(&self, vertex: &Vertex) -> CommitResult {
        (**self).commit_inarcs(vertex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_scheduler() {
        let s = std::sync::Arc::new(RecordingScheduler::new());
        let dyn_s: Box<dyn EventScheduler> = Box::new(s.clone());
        dyn_s.schedule_expiration(VertexId(3), 100);
        assert_eq!(s.events(), vec![(VertexId(3), 100)]);
    }
}
