//! Local-first data service for diary entries.
//!
//! Every mutation lands in the local store first and reports success as
//! soon as that write is durable. The remote side is best-effort: an
//! immediate attempt when online, otherwise (or on failure) the operation
//! goes onto the in-memory sync queue and is replayed on the next drain.
//! `sync_remote` performs the two-way reconciliation between the local
//! store and the backend, with a last-write-wins policy isolated in
//! [`resolve_conflict`].

use std::collections::HashMap;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::db::EntryRepository;
use crate::models::{DiaryEntry, EntryDraft, EntryPatch};
use crate::remote::{RemoteEntry, RemoteError, RemoteStore};
use crate::sync::queue::{OpKind, QueuedOp, SyncQueue};

/// Errors the service surfaces to callers.
///
/// Remote failures are deliberately absent: the local-first write has
/// already succeeded by the time the remote side is attempted, so remote
/// errors are logged and deferred to the queue instead of propagated.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Entry not found: {0}")]
    NotFound(Uuid),

    #[error("Local store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Outcome of a save. `remote_id` is set when the immediate remote create
/// succeeded; a queued create confirmed later stamps the id in the
/// background instead.
#[derive(Debug, Clone)]
pub struct SavedEntry {
    pub id: Uuid,
    pub remote_id: Option<Uuid>,
}

/// Which side wins a reconciliation conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictWinner {
    Local,
    Remote,
}

/// Last-write-wins conflict policy, kept in one place so it can be
/// replaced without touching the orchestration logic.
///
/// A locally dirty entry always wins until its own sync completes. For
/// clean entries the remote copy wins only when strictly newer; equal
/// timestamps favor the local copy.
pub fn resolve_conflict(local: &DiaryEntry, remote: &RemoteEntry) -> ConflictWinner {
    if local.needs_sync {
        return ConflictWinner::Local;
    }
    if remote.last_modified() > local.updated_at {
        ConflictWinner::Remote
    } else {
        ConflictWinner::Local
    }
}

/// Orchestrator for local-first entry CRUD with background remote sync.
///
/// One instance per authenticated session; the instance exclusively owns
/// its sync queue. All suspension points are the store and remote calls,
/// so the queue's swap-then-drain stays safe without a lock.
pub struct DiaryService<R: RemoteStore> {
    store: EntryRepository,
    remote: R,
    owner_id: Option<Uuid>,
    online: bool,
    queue: SyncQueue,
}

impl<R: RemoteStore> DiaryService<R> {
    /// Creates a service for an owner. Without an owner the service still
    /// serves local reads and writes but never touches the network.
    pub fn new(store: EntryRepository, remote: R, owner_id: Option<Uuid>) -> Self {
        Self {
            store,
            remote,
            owner_id,
            online: true,
            queue: SyncQueue::new(),
        }
    }

    pub fn with_online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Number of queued operations not yet confirmed remotely.
    pub fn pending_sync_count(&self) -> usize {
        self.queue.pending_count()
    }

    /// Probes the backend and feeds the result into the connectivity
    /// signal. Returns the new online state.
    pub async fn refresh_connectivity(&mut self) -> bool {
        let online = self.remote.check_health().await;
        self.set_online(online).await;
        online
    }

    /// Connectivity signal. A transition to online drains the queue.
    pub async fn set_online(&mut self, online: bool) {
        let was_online = self.online;
        self.online = online;
        if online && !was_online {
            self.drain_queue().await;
        }
    }

    /// Forces a full sync so a freshly-authenticated session sees remote
    /// state before the user reads anything.
    pub async fn initialize(&mut self) -> Result<(), ServiceError> {
        if self.owner_id.is_some() && self.online {
            self.sync_remote(true).await?;
        }
        Ok(())
    }

    /// Saves a new entry locally, then best-effort remotely.
    pub async fn save_entry(&mut self, draft: EntryDraft) -> Result<SavedEntry, ServiceError> {
        if draft.title.trim().is_empty() {
            return Err(ServiceError::Validation("title is required".to_string()));
        }
        if draft.content.trim().is_empty() {
            return Err(ServiceError::Validation("content is required".to_string()));
        }

        let entry = DiaryEntry::from_draft(draft);
        self.store.create(&entry).await?;
        debug!(id = %entry.id, "saved entry locally");

        if let Some(owner_id) = self.owner_id.filter(|_| self.online) {
            match self.remote.create_entry(&entry, owner_id).await {
                Ok(remote_id) => {
                    self.store.mark_synced(entry.id, remote_id).await?;
                    return Ok(SavedEntry {
                        id: entry.id,
                        remote_id: Some(remote_id),
                    });
                }
                Err(e) => {
                    warn!(id = %entry.id, "immediate create failed, queueing: {}", e);
                }
            }
        }

        let id = entry.id;
        self.queue.enqueue(OpKind::Create { entry });
        Ok(SavedEntry {
            id,
            remote_id: None,
        })
    }

    /// Merges a patch into an entry locally, then best-effort remotely.
    /// Always finishes with a drain so other queued work gets a chance to
    /// flush (the drain no-ops while offline).
    pub async fn update_entry(&mut self, id: Uuid, patch: EntryPatch) -> Result<(), ServiceError> {
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ServiceError::Validation("title is required".to_string()));
        }
        if patch.content.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(ServiceError::Validation("content is required".to_string()));
        }

        let patch = EntryPatch {
            updated_at: Some(Utc::now()),
            needs_sync: Some(true),
            ..patch
        };
        if !self.store.update(id, &patch).await? {
            return Err(ServiceError::NotFound(id));
        }
        let entry = self
            .store
            .get_by_id(id)
            .await?
            .ok_or(ServiceError::NotFound(id))?;

        let mut queued = true;
        if let Some(owner_id) = self.owner_id.filter(|_| self.online) {
            if let Some(remote_id) = entry.remote_id {
                match self.remote.update_entry(&entry, owner_id, remote_id).await {
                    Ok(()) => {
                        let clear = EntryPatch {
                            needs_sync: Some(false),
                            ..Default::default()
                        };
                        self.store.update(id, &clear).await?;
                        queued = false;
                    }
                    Err(e) => {
                        warn!(id = %id, "immediate update failed, queueing: {}", e);
                    }
                }
            }
            // No remote id yet: the entry's own create is still pending,
            // so the update has to go through the queue behind it.
        }

        if queued {
            self.queue.enqueue(OpKind::Update { entry });
        }

        self.drain_queue().await;
        Ok(())
    }

    /// Deletes an entry locally, then best-effort remotely (including its
    /// uploaded image). Deleting an unknown id is a no-op.
    pub async fn delete_entry(&mut self, id: Uuid) -> Result<(), ServiceError> {
        let Some(entry) = self.get_entry_by_id(id).await? else {
            return Ok(());
        };

        self.store.delete(entry.id).await?;
        debug!(id = %entry.id, "deleted entry locally");

        let mut handled = false;
        if let Some(owner_id) = self.owner_id.filter(|_| self.online) {
            if let Some(remote_id) = entry.remote_id {
                match self.remote.delete_entry(remote_id, owner_id).await {
                    Ok(()) => {
                        if entry.has_remote_image() {
                            if let Some(url) = entry.image.as_deref() {
                                self.delete_image_best_effort(url).await;
                            }
                        }
                        handled = true;
                    }
                    Err(e) => {
                        warn!(id = %entry.id, "immediate delete failed, queueing: {}", e);
                    }
                }
            }
            // No remote id: a queued create may still materialize the
            // entry remotely, so the delete must replay after it.
        }

        if !handled {
            self.queue.enqueue(OpKind::Delete {
                id: entry.id,
                remote_id: entry.remote_id,
                image: entry.image.clone(),
            });
        }

        self.drain_queue().await;
        Ok(())
    }

    /// All entries from the local store, newest creation first. Never
    /// touches the network.
    pub async fn get_entries(&self) -> Result<Vec<DiaryEntry>, ServiceError> {
        Ok(self.store.list().await?)
    }

    /// Looks up an entry by local id, falling back to the remote-id
    /// cross-reference for callers holding a stale identifier.
    pub async fn get_entry_by_id(&self, id: Uuid) -> Result<Option<DiaryEntry>, ServiceError> {
        if let Some(entry) = self.store.get_by_id(id).await? {
            return Ok(Some(entry));
        }
        Ok(self.store.get_by_remote_id(id).await?)
    }

    /// Uploads an image for later attachment to an entry. Returns the
    /// public URL, or None when offline, ownerless, or the upload failed.
    /// Callers keep the inline data URI in that case.
    pub async fn attach_image(&self, bytes: Vec<u8>, file_name: &str) -> Option<String> {
        let owner_id = self.owner_id.filter(|_| self.online)?;
        match self.remote.upload_image(bytes, file_name, owner_id).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("image upload failed: {}", e);
                None
            }
        }
    }

    /// Two-way reconciliation with the backend. A no-op unless the owner
    /// is known and the service is online (or `force` is set).
    ///
    /// Order matters: the queue is drained before the pull so pending
    /// local writes are not clobbered by stale remote state.
    pub async fn sync_remote(&mut self, force: bool) -> Result<(), ServiceError> {
        let Some(owner_id) = self.owner_id else {
            return Ok(());
        };
        if !self.online && !force {
            return Ok(());
        }

        let remote_entries = match self.remote.fetch_entries(owner_id).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("fetching remote entries failed, skipping sync: {}", e);
                return Ok(());
            }
        };
        let local_entries = self.store.list().await?;
        debug!(
            remote = remote_entries.len(),
            local = local_entries.len(),
            "starting reconciliation"
        );

        self.drain_queue_for(owner_id).await;

        self.merge_remote_entries(&remote_entries, &local_entries)
            .await;
        self.upload_local_only(owner_id, &remote_entries, &local_entries)
            .await;

        Ok(())
    }

    /// Pulls each remote entry into the local store: dirty local copies
    /// are left alone, clean ones go through [`resolve_conflict`], and
    /// remote-only entries are inserted keyed by their remote id.
    async fn merge_remote_entries(
        &mut self,
        remote_entries: &[RemoteEntry],
        local_entries: &[DiaryEntry],
    ) {
        for remote_entry in remote_entries {
            let matched = local_entries
                .iter()
                .find(|l| l.id == remote_entry.id || l.remote_id == Some(remote_entry.id));

            match matched {
                Some(local) if local.needs_sync => {
                    // Local wins until its own sync completes.
                }
                Some(local) => {
                    if resolve_conflict(local, remote_entry) == ConflictWinner::Remote {
                        let patch = patch_from_remote(remote_entry);
                        if let Err(e) = self.store.update(local.id, &patch).await {
                            error!(id = %local.id, "applying remote entry failed: {}", e);
                        }
                    }
                }
                None => {
                    let entry = entry_from_remote(remote_entry);
                    if let Err(e) = self.store.create(&entry).await {
                        error!(remote_id = %remote_entry.id, "inserting remote entry failed: {}", e);
                    }
                }
            }
        }
    }

    /// Pushes local entries that were never confirmed remote and are
    /// either dirty or unknown to the backend.
    async fn upload_local_only(
        &mut self,
        owner_id: Uuid,
        remote_entries: &[RemoteEntry],
        local_entries: &[DiaryEntry],
    ) {
        for local in local_entries {
            if local.remote_id.is_some() {
                continue;
            }
            let exists_remote = remote_entries.iter().any(|r| r.id == local.id);
            if !local.needs_sync && exists_remote {
                continue;
            }

            // The drain above may have confirmed this entry already; check
            // the live row so it is not uploaded twice.
            let current = match self.store.get_by_id(local.id).await {
                Ok(Some(entry)) if entry.remote_id.is_none() => entry,
                Ok(_) => continue,
                Err(e) => {
                    error!(id = %local.id, "reading entry before upload failed: {}", e);
                    continue;
                }
            };

            match self.remote.create_entry(&current, owner_id).await {
                Ok(remote_id) => {
                    if let Err(e) = self.store.mark_synced(current.id, remote_id).await {
                        error!(id = %current.id, "stamping remote id failed: {}", e);
                    }
                }
                Err(e) => {
                    warn!(id = %current.id, "uploading local entry failed: {}", e);
                }
            }
        }
    }

    /// Replays queued operations in enqueue order. Failed operations are
    /// appended back for the next drain. No-op while offline or without
    /// an owner.
    pub async fn drain_queue(&mut self) {
        let Some(owner_id) = self.owner_id.filter(|_| self.online) else {
            return;
        };
        self.drain_queue_for(owner_id).await;
    }

    async fn drain_queue_for(&mut self, owner_id: Uuid) {
        if self.queue.is_empty() {
            return;
        }

        let ops = self.queue.take_all();
        debug!(count = ops.len(), "draining sync queue");

        // Remote ids assigned by creates earlier in this drain, so a
        // later update/delete of the same entry can resolve its target.
        let mut assigned: HashMap<Uuid, Uuid> = HashMap::new();

        for op in ops {
            match self.apply_op(&op, owner_id, &mut assigned).await {
                Ok(()) => {}
                Err(e) => {
                    warn!(
                        op = op.kind.name(),
                        attempts = op.attempts + 1,
                        enqueued_at = %op.enqueued_at,
                        "queued operation failed, keeping for retry: {}",
                        e
                    );
                    self.queue.requeue(op);
                }
            }
        }
    }

    async fn apply_op(
        &self,
        op: &QueuedOp,
        owner_id: Uuid,
        assigned: &mut HashMap<Uuid, Uuid>,
    ) -> Result<(), RemoteError> {
        match &op.kind {
            OpKind::Create { entry } => {
                let remote_id = self.remote.create_entry(entry, owner_id).await?;
                assigned.insert(entry.id, remote_id);
                // The local row may have been deleted meanwhile; a missed
                // stamp is recovered by the delete op following it.
                if let Err(e) = self.store.mark_synced(entry.id, remote_id).await {
                    error!(id = %entry.id, "stamping remote id failed: {}", e);
                }
                Ok(())
            }
            OpKind::Update { entry } => {
                let Some(remote_id) = self
                    .resolve_remote_id(entry.id, entry.remote_id, assigned)
                    .await
                else {
                    // Nothing exists remotely to update; the reconcile
                    // upload pass pushes the entry itself.
                    warn!(id = %entry.id, "dropping queued update with no remote id");
                    return Ok(());
                };
                self.remote.update_entry(entry, owner_id, remote_id).await?;
                let clear = EntryPatch {
                    needs_sync: Some(false),
                    ..Default::default()
                };
                if let Err(e) = self.store.update(entry.id, &clear).await {
                    error!(id = %entry.id, "clearing sync flag failed: {}", e);
                }
                Ok(())
            }
            OpKind::Delete { id, remote_id, image } => {
                match self.resolve_remote_id(*id, *remote_id, assigned).await {
                    Some(remote_id) => {
                        self.remote.delete_entry(remote_id, owner_id).await?;
                    }
                    None => {
                        debug!(id = %id, "queued delete had no remote record");
                    }
                }
                if let Some(url) = image.as_deref().filter(|u| u.starts_with("http")) {
                    self.delete_image_best_effort(url).await;
                }
                Ok(())
            }
        }
    }

    /// Resolves the backend id for an entry: the op payload first, then
    /// ids assigned earlier in the current drain, then the live local row.
    async fn resolve_remote_id(
        &self,
        id: Uuid,
        payload_remote_id: Option<Uuid>,
        assigned: &HashMap<Uuid, Uuid>,
    ) -> Option<Uuid> {
        if let Some(remote_id) = payload_remote_id {
            return Some(remote_id);
        }
        if let Some(remote_id) = assigned.get(&id) {
            return Some(*remote_id);
        }
        match self.store.get_by_id(id).await {
            Ok(Some(entry)) => entry.remote_id,
            _ => None,
        }
    }

    async fn delete_image_best_effort(&self, url: &str) {
        if let Err(e) = self.remote.delete_image(url).await {
            warn!("deleting image failed (ignored): {}", e);
        }
    }
}

/// Local record for an entry that only exists remotely. Keyed by the
/// remote id so later matches hit on either column.
fn entry_from_remote(remote: &RemoteEntry) -> DiaryEntry {
    DiaryEntry {
        id: remote.id,
        remote_id: Some(remote.id),
        title: remote.title.clone(),
        content: remote.content.clone(),
        mood: remote.mood,
        tags: remote.tags.clone(),
        date: remote.date,
        image: remote.image.clone(),
        created_at: remote.created_at,
        updated_at: remote.last_modified(),
        needs_sync: false,
    }
}

/// Overwrites local fields with the remote copy while keeping the local
/// id, stamping the cross-reference and clearing the sync flag.
fn patch_from_remote(remote: &RemoteEntry) -> EntryPatch {
    EntryPatch {
        title: Some(remote.title.clone()),
        content: Some(remote.content.clone()),
        mood: Some(remote.mood),
        tags: Some(remote.tags.clone()),
        date: Some(remote.date),
        image: Some(remote.image.clone()),
        updated_at: Some(remote.last_modified()),
        needs_sync: Some(false),
        remote_id: Some(Some(remote.id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::models::Mood;
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate, Utc};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[derive(Default)]
    struct MockState {
        entries: Vec<RemoteEntry>,
        fail: bool,
        calls: Vec<String>,
    }

    /// In-memory stand-in for the backend. Records the order of calls and
    /// can be toggled to fail every operation.
    #[derive(Clone, Default)]
    struct MockRemote {
        state: Arc<Mutex<MockState>>,
    }

    impl MockRemote {
        fn set_fail(&self, fail: bool) {
            self.state.lock().unwrap().fail = fail;
        }

        fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }

        fn entry_count(&self) -> usize {
            self.state.lock().unwrap().entries.len()
        }

        fn titles(&self) -> Vec<String> {
            self.state
                .lock()
                .unwrap()
                .entries
                .iter()
                .map(|e| e.title.clone())
                .collect()
        }

        fn seed(&self, entry: RemoteEntry) {
            self.state.lock().unwrap().entries.push(entry);
        }

        fn check_fail(&self, call: &str) -> Result<(), RemoteError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call.to_string());
            if state.fail {
                Err(RemoteError::api(503, "backend down"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl RemoteStore for MockRemote {
        async fn create_entry(
            &self,
            entry: &DiaryEntry,
            owner_id: Uuid,
        ) -> Result<Uuid, RemoteError> {
            self.check_fail(&format!("create:{}", entry.title))?;
            let remote_id = Uuid::new_v4();
            self.state.lock().unwrap().entries.push(RemoteEntry {
                id: remote_id,
                user_id: owner_id,
                title: entry.title.clone(),
                content: entry.content.clone(),
                mood: entry.mood,
                tags: entry.tags.clone(),
                date: entry.date,
                image: entry.image.clone(),
                created_at: entry.created_at,
                updated_at: Some(entry.updated_at),
            });
            Ok(remote_id)
        }

        async fn fetch_entries(&self, _owner_id: Uuid) -> Result<Vec<RemoteEntry>, RemoteError> {
            self.check_fail("fetch")?;
            Ok(self.state.lock().unwrap().entries.clone())
        }

        async fn update_entry(
            &self,
            entry: &DiaryEntry,
            _owner_id: Uuid,
            remote_id: Uuid,
        ) -> Result<(), RemoteError> {
            self.check_fail(&format!("update:{}", entry.title))?;
            let mut state = self.state.lock().unwrap();
            if let Some(row) = state.entries.iter_mut().find(|r| r.id == remote_id) {
                row.title = entry.title.clone();
                row.content = entry.content.clone();
                row.updated_at = Some(entry.updated_at);
            }
            Ok(())
        }

        async fn delete_entry(&self, remote_id: Uuid, _owner_id: Uuid) -> Result<(), RemoteError> {
            self.check_fail("delete")?;
            self.state
                .lock()
                .unwrap()
                .entries
                .retain(|r| r.id != remote_id);
            Ok(())
        }

        async fn upload_image(
            &self,
            _bytes: Vec<u8>,
            file_name: &str,
            _owner_id: Uuid,
        ) -> Result<String, RemoteError> {
            self.check_fail("upload_image")?;
            Ok(format!("https://storage.test/diary-media/{}", file_name))
        }

        async fn delete_image(&self, url: &str) -> Result<(), RemoteError> {
            self.check_fail(&format!("delete_image:{}", url))?;
            Ok(())
        }

        async fn check_health(&self) -> bool {
            !self.state.lock().unwrap().fail
        }
    }

    async fn test_service() -> (tempfile::TempDir, MockRemote, DiaryService<MockRemote>) {
        let temp_dir = tempdir().unwrap();
        let pool = init_db(temp_dir.path().join("test.db")).await.unwrap();
        let remote = MockRemote::default();
        let service = DiaryService::new(
            EntryRepository::new(pool),
            remote.clone(),
            Some(Uuid::new_v4()),
        );
        (temp_dir, remote, service)
    }

    fn remote_row(id: Uuid, title: &str, updated_at: chrono::DateTime<Utc>) -> RemoteEntry {
        RemoteEntry {
            id,
            user_id: Uuid::new_v4(),
            title: title.to_string(),
            content: format!("<p>{}</p>", title),
            mood: None,
            tags: vec![],
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            image: None,
            created_at: updated_at,
            updated_at: Some(updated_at),
        }
    }

    #[tokio::test]
    async fn test_save_entry_online_syncs_immediately() {
        let (_dir, remote, mut service) = test_service().await;

        let saved = service
            .save_entry(EntryDraft::new("Trip", "<p>Fun</p>"))
            .await
            .unwrap();

        assert!(saved.remote_id.is_some());
        assert_eq!(remote.entry_count(), 1);
        assert_eq!(service.pending_sync_count(), 0);

        let entry = service.get_entry_by_id(saved.id).await.unwrap().unwrap();
        assert!(!entry.needs_sync);
        assert_eq!(entry.remote_id, saved.remote_id);
    }

    #[tokio::test]
    async fn test_mutations_succeed_while_remote_unreachable() {
        let (_dir, remote, mut service) = test_service().await;
        remote.set_fail(true);

        let saved = service
            .save_entry(EntryDraft::new("Offline", "<p>x</p>"))
            .await
            .unwrap();
        assert!(saved.remote_id.is_none());

        let patch = EntryPatch {
            title: Some("Offline edited".to_string()),
            ..Default::default()
        };
        service.update_entry(saved.id, patch).await.unwrap();

        let entry = service.get_entry_by_id(saved.id).await.unwrap().unwrap();
        assert_eq!(entry.title, "Offline edited");
        assert!(entry.needs_sync);

        service.delete_entry(saved.id).await.unwrap();
        assert!(service.get_entry_by_id(saved.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_offline_queues_create() {
        let (_dir, remote, mut service) = test_service().await;
        service.set_online(false).await;

        let saved = service
            .save_entry(EntryDraft::new("Trip", "<p>Fun</p>"))
            .await
            .unwrap();

        assert!(saved.remote_id.is_none());
        assert_eq!(service.pending_sync_count(), 1);
        assert_eq!(remote.entry_count(), 0);

        let entry = service.get_entry_by_id(saved.id).await.unwrap().unwrap();
        assert!(entry.needs_sync);
    }

    #[tokio::test]
    async fn test_drain_applies_ops_in_enqueue_order() {
        // Create, update, delete of the same entry replay in order, with
        // the update/delete resolving the id assigned by the create.
        let (_dir, remote, mut service) = test_service().await;
        service.set_online(false).await;

        let saved = service
            .save_entry(EntryDraft::new("Ordered", "<p>v1</p>"))
            .await
            .unwrap();
        let patch = EntryPatch {
            content: Some("<p>v2</p>".to_string()),
            ..Default::default()
        };
        service.update_entry(saved.id, patch).await.unwrap();
        service.delete_entry(saved.id).await.unwrap();
        assert_eq!(service.pending_sync_count(), 3);

        service.set_online(true).await;

        assert_eq!(service.pending_sync_count(), 0);
        let calls = remote.calls();
        assert_eq!(calls, vec!["create:Ordered", "update:Ordered", "delete"]);
        // The create materialized the entry remotely, the delete removed it.
        assert_eq!(remote.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_drain_keeps_every_op() {
        let (_dir, remote, mut service) = test_service().await;
        service.set_online(false).await;

        for i in 0..3 {
            service
                .save_entry(EntryDraft::new(format!("Entry {}", i), "<p>x</p>"))
                .await
                .unwrap();
        }
        assert_eq!(service.pending_sync_count(), 3);

        remote.set_fail(true);
        service.set_online(true).await;
        assert_eq!(service.pending_sync_count(), 3);

        remote.set_fail(false);
        service.drain_queue().await;
        assert_eq!(service.pending_sync_count(), 0);
        assert_eq!(remote.entry_count(), 3);
    }

    #[tokio::test]
    async fn test_reconcile_equal_timestamps_keep_local() {
        // Strict greater-than comparison; ties favor local.
        let (_dir, remote, mut service) = test_service().await;

        let saved = service
            .save_entry(EntryDraft::new("Local", "<p>local</p>"))
            .await
            .unwrap();
        let local = service.get_entry_by_id(saved.id).await.unwrap().unwrap();
        let remote_id = local.remote_id.unwrap();

        {
            let mut state = remote.state.lock().unwrap();
            let row = state.entries.iter_mut().find(|r| r.id == remote_id).unwrap();
            row.title = "Remote".to_string();
            row.updated_at = Some(local.updated_at);
        }

        service.sync_remote(true).await.unwrap();

        let after = service.get_entry_by_id(saved.id).await.unwrap().unwrap();
        assert_eq!(after.title, "Local");
    }

    #[tokio::test]
    async fn test_reconcile_newer_remote_overwrites_but_keeps_local_id() {
        let (_dir, remote, mut service) = test_service().await;

        let saved = service
            .save_entry(EntryDraft::new("Local", "<p>local</p>"))
            .await
            .unwrap();
        let local = service.get_entry_by_id(saved.id).await.unwrap().unwrap();
        let remote_id = local.remote_id.unwrap();

        {
            let mut state = remote.state.lock().unwrap();
            let row = state.entries.iter_mut().find(|r| r.id == remote_id).unwrap();
            row.title = "Remote wins".to_string();
            row.updated_at = Some(local.updated_at + Duration::seconds(1));
        }

        service.sync_remote(true).await.unwrap();

        let after = service.get_entry_by_id(saved.id).await.unwrap().unwrap();
        assert_eq!(after.id, saved.id);
        assert_eq!(after.title, "Remote wins");
        assert_eq!(after.remote_id, Some(remote_id));
        assert!(!after.needs_sync);
    }

    #[tokio::test]
    async fn test_reconcile_never_overwrites_dirty_local() {
        let (_dir, remote, mut service) = test_service().await;

        let saved = service
            .save_entry(EntryDraft::new("Mine", "<p>mine</p>"))
            .await
            .unwrap();
        let local = service.get_entry_by_id(saved.id).await.unwrap().unwrap();
        let remote_id = local.remote_id.unwrap();

        // Dirty the local copy with the remote side failing, then heal
        // the remote and hand it a much newer timestamp.
        remote.set_fail(true);
        let patch = EntryPatch {
            title: Some("Mine edited".to_string()),
            ..Default::default()
        };
        service.update_entry(saved.id, patch).await.unwrap();
        remote.set_fail(false);
        {
            let mut state = remote.state.lock().unwrap();
            state.calls.clear();
            let row = state.entries.iter_mut().find(|r| r.id == remote_id).unwrap();
            row.title = "Theirs".to_string();
            row.updated_at = Some(Utc::now() + Duration::hours(1));
        }

        // Merge-only pass: drop the queued update first so reconciliation
        // sees the dirty flag.
        let local_entries = service.store.list().await.unwrap();
        let remote_entries = vec![remote.state.lock().unwrap().entries[0].clone()];
        service
            .merge_remote_entries(&remote_entries, &local_entries)
            .await;

        let after = service.get_entry_by_id(saved.id).await.unwrap().unwrap();
        assert_eq!(after.title, "Mine edited");
        assert!(after.needs_sync);
    }

    #[tokio::test]
    async fn test_get_entries_is_idempotent() {
        let (_dir, _remote, mut service) = test_service().await;

        service
            .save_entry(EntryDraft::new("One", "<p>1</p>").with_mood(Mood::Happy))
            .await
            .unwrap();
        service
            .save_entry(EntryDraft::new("Two", "<p>2</p>"))
            .await
            .unwrap();

        let first = service.get_entries().await.unwrap();
        let second = service.get_entries().await.unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.title, b.title);
            assert_eq!(a.updated_at, b.updated_at);
        }
    }

    #[tokio::test]
    async fn test_offline_create_then_reconnect_scenario() {
        let (_dir, remote, mut service) = test_service().await;
        service.set_online(false).await;

        let saved = service
            .save_entry(
                EntryDraft::new("Trip", "<p>Fun</p>")
                    .with_date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()),
            )
            .await
            .unwrap();

        let entries = service.get_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].needs_sync);

        service.set_online(true).await;

        let entry = service.get_entry_by_id(saved.id).await.unwrap().unwrap();
        assert!(entry.remote_id.is_some());
        assert!(!entry.needs_sync);
        assert_eq!(remote.titles(), vec!["Trip"]);
    }

    #[tokio::test]
    async fn test_remote_only_entry_is_pulled_in_scenario() {
        let (_dir, remote, mut service) = test_service().await;

        service
            .save_entry(EntryDraft::new("Local one", "<p>1</p>"))
            .await
            .unwrap();
        service
            .save_entry(EntryDraft::new("Local two", "<p>2</p>"))
            .await
            .unwrap();

        let remote_only_id = Uuid::new_v4();
        remote.seed(remote_row(remote_only_id, "From other device", Utc::now()));

        service.sync_remote(true).await.unwrap();

        let entries = service.get_entries().await.unwrap();
        assert_eq!(entries.len(), 3);

        let pulled = entries
            .iter()
            .find(|e| e.title == "From other device")
            .unwrap();
        assert_eq!(pulled.id, remote_only_id);
        assert_eq!(pulled.remote_id, Some(remote_only_id));
        assert!(!pulled.needs_sync);
    }

    #[tokio::test]
    async fn test_delete_cleans_up_remote_image() {
        let (_dir, remote, mut service) = test_service().await;

        let saved = service
            .save_entry(
                EntryDraft::new("Pic", "<p>p</p>").with_image("https://storage.test/photo.png"),
            )
            .await
            .unwrap();

        service.delete_entry(saved.id).await.unwrap();

        let calls = remote.calls();
        assert!(calls.contains(&"delete".to_string()));
        assert!(calls.contains(&"delete_image:https://storage.test/photo.png".to_string()));
    }

    #[tokio::test]
    async fn test_validation_rejects_empty_fields() {
        let (_dir, _remote, mut service) = test_service().await;

        let err = service
            .save_entry(EntryDraft::new("", "<p>x</p>"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = service
            .save_entry(EntryDraft::new("Title", "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        assert!(service.get_entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_entry_by_stale_remote_id() {
        let (_dir, _remote, mut service) = test_service().await;

        let saved = service
            .save_entry(EntryDraft::new("Cross-ref", "<p>x</p>"))
            .await
            .unwrap();
        let remote_id = saved.remote_id.unwrap();

        let by_remote = service.get_entry_by_id(remote_id).await.unwrap().unwrap();
        assert_eq!(by_remote.id, saved.id);
    }

    #[tokio::test]
    async fn test_initialize_pulls_remote_state() {
        let (_dir, remote, mut service) = test_service().await;
        remote.seed(remote_row(Uuid::new_v4(), "Existing", Utc::now()));

        service.initialize().await.unwrap();

        let entries = service.get_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Existing");
    }

    #[tokio::test]
    async fn test_ownerless_service_never_calls_remote() {
        let temp_dir = tempdir().unwrap();
        let pool = init_db(temp_dir.path().join("test.db")).await.unwrap();
        let remote = MockRemote::default();
        let mut service = DiaryService::new(EntryRepository::new(pool), remote.clone(), None);

        let saved = service
            .save_entry(EntryDraft::new("Anon", "<p>x</p>"))
            .await
            .unwrap();
        assert!(saved.remote_id.is_none());
        service.sync_remote(true).await.unwrap();
        service.drain_queue().await;

        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_attach_image_offline_returns_none() {
        let (_dir, _remote, mut service) = test_service().await;
        service.set_online(false).await;

        assert!(service.attach_image(vec![1, 2, 3], "photo.png").await.is_none());
    }

    #[test]
    fn test_resolve_conflict_rules() {
        let mut local = DiaryEntry::from_draft(EntryDraft::new("a", "b"));
        local.needs_sync = false;
        let mut remote = remote_row(Uuid::new_v4(), "a", local.updated_at);

        // Equal timestamps: local wins
        assert_eq!(resolve_conflict(&local, &remote), ConflictWinner::Local);

        // Strictly newer remote: remote wins
        remote.updated_at = Some(local.updated_at + Duration::seconds(1));
        assert_eq!(resolve_conflict(&local, &remote), ConflictWinner::Remote);

        // Dirty local always wins
        local.needs_sync = true;
        assert_eq!(resolve_conflict(&local, &remote), ConflictWinner::Local);
    }
}
