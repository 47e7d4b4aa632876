//! Per-vertex lock descriptor.
//!
//! Every field is only read or written under the graph state lock.
//!
//! ## Lock modes
//!
//! | Mode       | Count meaning         |
//! |------------|-----------------------|
//! | `Unlocked` | none                  |
//! | `Writable` | recursion depth, 1..N |
//! | `Readonly` | reader count, 1..N    |
//!
//! While writable, the owner may *yield* its inarcs so another thread can
//! *borrow* them (mark them busy) to remove reverse arcs without taking the
//! whole vertex.

use std::cell::Cell;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::model::Manifestation;

/// Small per-thread identity used as the writer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub u32);

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(1);

thread_local! {
    static CURRENT_THREAD_ID: Cell<u32> = const { Cell::new(0) };
}

impl ThreadId {
    pub fn current() -> Self {
        CURRENT_THREAD_ID.with(|id| {
            if id.get() == 0 {
                id.set(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
            }
            Self(id.get())
        })
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockMode {
    #[default]
    Unlocked,
    Writable {
        owner: ThreadId,
        recursion: u8,
    },
    Readonly {
        readers: u8,
    },
}

/// Newly created and not yet committed, or live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VertexContext {
    Suspended,
    #[default]
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InarcsState {
    pub yielded: bool,
    /// Thread currently borrowing yielded inarcs.
    pub borrower: Option<ThreadId>,
}

impl InarcsState {
    pub fn is_busy(&self) -> bool {
        self.borrower.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VertexDescriptor {
    pub lock: LockMode,
    /// Writers currently waiting on this vertex.
    pub write_requests: u8,
    pub inarcs: InarcsState,
    pub context: VertexContext,
    pub manifestation: Manifestation,
    /// A commit capture is open for this vertex.
    pub operation_open: bool,
}

impl VertexDescriptor {
    pub fn new(manifestation: Manifestation) -> Self {
        Self { manifestation, ..Default::default() }
    }

    pub fn is_locked(&self) -> bool {
        !matches!(self.lock, LockMode::Unlocked)
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.lock, LockMode::Writable { .. })
    }

    pub fn is_readonly(&self) -> bool {
        matches!(self.lock, LockMode::Readonly { .. })
    }

    pub fn is_writable_by(&self, tid: ThreadId) -> bool {
        matches!(self.lock, LockMode::Writable { owner, .. } if owner == tid)
    }

    pub fn write_requested(&self) -> bool {
        self.write_requests > 0
    }

    /// Recursion depth when writable, reader count when readonly.
    pub fn semaphore(&self) -> u8 {
        match self.lock {
            LockMode::Unlocked => 0,
            LockMode::Writable { recursion, .. } => recursion,
            LockMode::Readonly { readers } => readers,
        }
    }

    /// Inarcs can be borrowed by a thread other than the owner right now.
    pub fn inarcs_borrowable(&self) -> bool {
        self.is_writable() && self.inarcs.yielded && !self.inarcs.is_busy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_id_stable_per_thread() {
        let a = ThreadId::current();
        assert_eq!(a, ThreadId::current());
        let b = std::thread::spawn(ThreadId::current).join().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_semaphore_by_mode() {
        let mut d = VertexDescriptor::new(Manifestation::Real);
        assert_eq!(d.semaphore(), 0);
        d.lock = LockMode::Writable { owner: ThreadId(7), recursion: 3 };
        assert_eq!(d.semaphore(), 3);
        assert!(d.is_writable_by(ThreadId(7)));
        assert!(!d.is_writable_by(ThreadId(8)));
        d.lock = LockMode::Readonly { readers: 2 };
        assert_eq!(d.semaphore(), 2);
        assert!(!d.inarcs_borrowable());
    }
}
