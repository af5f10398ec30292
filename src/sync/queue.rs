//! In-memory queue of remote operations that have not been confirmed yet.
//!
//! The queue lives for the process lifetime only; it is not persisted.
//! Operations are replayed in enqueue order and an operation that fails
//! its remote call is appended back for the next drain. There is no
//! deduplication, no backoff and no retry limit; `attempts` exists for
//! logging and observability.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::DiaryEntry;

/// A remote operation awaiting confirmation.
#[derive(Debug, Clone)]
pub enum OpKind {
    /// Entry was created locally and needs a remote record.
    Create { entry: DiaryEntry },
    /// Entry was modified locally; the snapshot carries the merged state.
    Update { entry: DiaryEntry },
    /// Entry was deleted locally. `image` is kept so the uploaded object
    /// can be cleaned up once the remote delete goes through.
    Delete {
        id: Uuid,
        remote_id: Option<Uuid>,
        image: Option<String>,
    },
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Create { .. } => "create",
            OpKind::Update { .. } => "update",
            OpKind::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuedOp {
    pub kind: OpKind,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
}

/// FIFO of pending remote operations.
#[derive(Debug, Default)]
pub struct SyncQueue {
    ops: Vec<QueuedOp>,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, kind: OpKind) {
        self.ops.push(QueuedOp {
            kind,
            enqueued_at: Utc::now(),
            attempts: 0,
        });
    }

    /// Swaps the internal list for an empty one and returns the pending
    /// operations in enqueue order. The swap is a single synchronous step,
    /// which is what keeps overlapping drains from replaying the same
    /// operation twice under a cooperative scheduler.
    pub fn take_all(&mut self) -> Vec<QueuedOp> {
        std::mem::take(&mut self.ops)
    }

    /// Puts a failed operation back at the tail for the next drain.
    pub fn requeue(&mut self, mut op: QueuedOp) {
        op.attempts += 1;
        self.ops.push(op);
    }

    pub fn pending_count(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
