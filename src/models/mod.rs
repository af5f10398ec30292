mod entry;
mod mood;

pub use entry::{DiaryEntry, EntryDraft, EntryPatch, SyncState};
pub use mood::Mood;
