mod queue;
mod service;

pub use queue::{OpKind, QueuedOp, SyncQueue};
pub use service::{
    resolve_conflict, ConflictWinner, DiaryService, SavedEntry, ServiceError,
};
