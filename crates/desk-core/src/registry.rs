//! The dat registry.
//!
//! Single owner of the tracked-dat table: it runs metadata extraction,
//! persists every mutation before exposing it, spawns one sync session per
//! dat, folds session stats back into the table, and tells subscribers when
//! anything changed.
//!
//! Mutations (create, import, delete) serialize on one lock. Reads never
//! take it; they see the most recent committed state.

use crate::config::{NotifyConfig, SyncConfig};
use crate::dat::{Dat, DatOrigin, DatStatus, NetworkStats};
use crate::error::{DeskError, Result};
use crate::metadata;
use crate::network::retry::RetryConfig;
use crate::network::{self, NetworkEvent, SyncNetwork};
use crate::session::{StatsUpdate, SyncSession};
use crate::store::{DatRecord, RegistryStore};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Callback invoked after registry changes.
///
/// Delivery is best-effort and coalesced: a burst of changes may arrive as a
/// single invocation. There is no payload; subscribers re-read what they
/// need. Callbacks run on the notifier task and must not block.
pub type ChangeCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// Tuning knobs for a registry instance.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Bound on session teardown during delete and shutdown.
    pub stop_timeout: Duration,
    /// Change bursts inside this window collapse into one notification.
    pub coalesce_window: Duration,
    /// Rejoin backoff for sync sessions.
    pub retry: RetryConfig,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            stop_timeout: SyncConfig::STOP_TIMEOUT,
            coalesce_window: NotifyConfig::COALESCE_WINDOW,
            retry: RetryConfig::default(),
        }
    }
}

/// One row of the registry table.
struct DatEntry {
    dat: Dat,
    /// Taken out for teardown; `None` once stopping has begun.
    session: Option<SyncSession>,
}

/// Registry of all tracked dats.
pub struct DatRegistry {
    data_dir: PathBuf,
    store: RegistryStore,
    network: Arc<dyn SyncNetwork>,
    options: RegistryOptions,
    /// Insertion-ordered table. Registries hold tens of dats, so linear
    /// lookup is fine and keeps rollback trivial.
    dats: Arc<RwLock<Vec<DatEntry>>>,
    /// Serializes create/import/delete against each other.
    write_lock: Mutex<()>,
    /// Mirror of the table length for lock-free reads from sync contexts.
    len: AtomicUsize,
    updates_tx: mpsc::Sender<StatsUpdate>,
    notifier: ChangeNotifier,
    apply_task: JoinHandle<()>,
}

impl DatRegistry {
    /// Open (or initialize) a registry rooted at `data_dir`.
    ///
    /// Loads the persisted snapshot — which never fails, see
    /// [`RegistryStore::load`] — and restores every record as an `Active`
    /// dat with zeroed stats and a freshly `Starting` sync session.
    pub async fn open(
        data_dir: impl Into<PathBuf>,
        network: Arc<dyn SyncNetwork>,
    ) -> Result<Arc<Self>> {
        Self::open_with(data_dir, network, RegistryOptions::default()).await
    }

    /// Open with explicit tuning. See [`DatRegistry::open`].
    pub async fn open_with(
        data_dir: impl Into<PathBuf>,
        network: Arc<dyn SyncNetwork>,
        options: RegistryOptions,
    ) -> Result<Arc<Self>> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(|e| DeskError::io_with_path(e, &data_dir))?;

        let store = RegistryStore::new(&data_dir);
        let records = store.load();

        let (updates_tx, updates_rx) = mpsc::channel(SyncConfig::EVENT_CHANNEL_CAPACITY);
        let dats: Arc<RwLock<Vec<DatEntry>>> = Arc::new(RwLock::new(Vec::new()));
        let notifier = ChangeNotifier::spawn(options.coalesce_window);
        let apply_task = tokio::spawn(apply_stats_loop(
            updates_rx,
            dats.clone(),
            notifier.notify_handle(),
        ));

        let registry = Self {
            data_dir,
            store,
            network,
            options,
            dats,
            write_lock: Mutex::new(()),
            len: AtomicUsize::new(0),
            updates_tx,
            notifier,
            apply_task,
        };

        {
            let mut table = registry.dats.write().await;
            for mut record in records {
                if record.link.is_empty() {
                    // Pre-link snapshot; mint an address so the session has
                    // something to announce
                    record.link = network::new_link();
                    warn!("Dat {} had no share link, minted a new one", record.id);
                }
                let dat = Dat {
                    id: record.id,
                    local_path: record.local_path,
                    link: record.link,
                    title: record.title,
                    author: record.author,
                    size_bytes: record.size_bytes,
                    created_at: record.created_at,
                    origin: record.origin,
                    status: DatStatus::Active,
                    stats: NetworkStats::default(),
                };
                let session = registry.spawn_session(&dat);
                table.push(DatEntry {
                    dat,
                    session: Some(session),
                });
            }
            registry.len.store(table.len(), Ordering::SeqCst);
            if !table.is_empty() {
                info!(
                    "Restored {} dats from {}",
                    table.len(),
                    registry.store.path().display()
                );
            }
        }

        Ok(Arc::new(registry))
    }

    /// Share a local folder as a new dat.
    ///
    /// Blocks on the metadata scan and the store write; by the time it
    /// returns the dat is durable, listed, and its session is hunting for
    /// peers (`stats.peers` starts at 0).
    pub async fn create(&self, path: impl AsRef<Path>, author: &str) -> Result<Dat> {
        self.register(path.as_ref(), author, DatOrigin::Created).await
    }

    /// Track a folder that replicates someone else's dat.
    ///
    /// Same lifecycle as [`DatRegistry::create`]; only the recorded origin
    /// differs.
    pub async fn import(&self, path: impl AsRef<Path>, author: &str) -> Result<Dat> {
        self.register(path.as_ref(), author, DatOrigin::Imported).await
    }

    async fn register(&self, path: &Path, author: &str, origin: DatOrigin) -> Result<Dat> {
        let _guard = self.write_lock.lock().await;

        let canonical = path.canonicalize().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DeskError::FileNotFound(path.to_path_buf()),
            _ => DeskError::Extraction {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })?;

        {
            let table = self.dats.read().await;
            if let Some(existing) = table.iter().find(|e| e.dat.local_path == canonical) {
                debug!(
                    "Rejecting duplicate share of {} (already dat {})",
                    canonical.display(),
                    existing.dat.id
                );
                return Err(DeskError::DuplicatePath(canonical));
            }
        }

        // The folder walk is blocking I/O; run it off the runtime
        let scan_dir = canonical.clone();
        let fallback_author = author.to_string();
        let meta = tokio::task::spawn_blocking(move || {
            metadata::extract(&scan_dir, &fallback_author)
        })
        .await
        .map_err(|e| DeskError::Other(format!("Metadata scan panicked: {}", e)))??;

        let mut dat = Dat {
            id: Uuid::new_v4().to_string(),
            local_path: canonical,
            link: network::new_link(),
            title: meta.title,
            author: meta.author,
            size_bytes: meta.size_bytes,
            created_at: Utc::now(),
            origin,
            status: DatStatus::Initializing,
            stats: NetworkStats::default(),
        };

        // Persist before exposing: a failed save leaves the registry exactly
        // as it was
        let mut records = self.snapshot_records().await;
        records.push(DatRecord::from_dat(&dat));
        self.store.save(&records)?;

        dat.status = DatStatus::Active;
        let session = self.spawn_session(&dat);
        {
            let mut table = self.dats.write().await;
            table.push(DatEntry {
                dat: dat.clone(),
                session: Some(session),
            });
            self.len.store(table.len(), Ordering::SeqCst);
        }
        self.notifier.mark_changed();

        info!(
            "Now sharing {} as dat {} ({} bytes)",
            dat.local_path.display(),
            dat.id,
            dat.size_bytes
        );
        Ok(dat)
    }

    /// Stop syncing and forget a dat. The folder on disk is untouched.
    ///
    /// Session teardown is bounded by the configured stop timeout; a session
    /// that cannot say goodbye in time is force-discarded so an unreachable
    /// swarm can never wedge deletion.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        {
            let mut table = self.dats.write().await;
            match table.iter_mut().find(|e| e.dat.id == id) {
                Some(entry) => entry.dat.status = DatStatus::Closing,
                None => {
                    return Err(DeskError::DatNotFound { id: id.to_string() });
                }
            }
        }
        self.notifier.mark_changed();

        // Persist the post-delete snapshot before touching the session: a
        // failed save must leave the registry as it was
        let records: Vec<DatRecord> = {
            let table = self.dats.read().await;
            table
                .iter()
                .filter(|e| e.dat.id != id)
                .map(|e| DatRecord::from_dat(&e.dat))
                .collect()
        };
        if let Err(e) = self.store.save(&records) {
            let mut table = self.dats.write().await;
            if let Some(entry) = table.iter_mut().find(|e| e.dat.id == id) {
                entry.dat.status = DatStatus::Active;
            }
            drop(table);
            self.notifier.mark_changed();
            return Err(e);
        }

        let session = {
            let mut table = self.dats.write().await;
            table
                .iter_mut()
                .find(|e| e.dat.id == id)
                .and_then(|e| e.session.take())
        };
        if let Some(session) = session {
            if !session.stop(self.options.stop_timeout).await {
                warn!("Force-discarded session for dat {}", id);
            }
        }

        {
            let mut table = self.dats.write().await;
            table.retain(|e| e.dat.id != id);
            self.len.store(table.len(), Ordering::SeqCst);
        }
        self.notifier.mark_changed();

        info!("Deleted dat {}", id);
        Ok(())
    }

    /// Snapshot of every tracked dat, in insertion order.
    pub async fn list(&self) -> Vec<Dat> {
        self.dats.read().await.iter().map(|e| e.dat.clone()).collect()
    }

    /// Snapshot of one dat.
    pub async fn get(&self, id: &str) -> Result<Dat> {
        self.dats
            .read()
            .await
            .iter()
            .find(|e| e.dat.id == id)
            .map(|e| e.dat.clone())
            .ok_or_else(|| DeskError::DatNotFound { id: id.to_string() })
    }

    /// Share link for a dat, for handing to other people.
    pub async fn share_link(&self, id: &str) -> Result<String> {
        self.get(id).await.map(|dat| dat.link)
    }

    /// Number of tracked dats. Lock-free, callable from sync contexts.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Register a change callback. See [`ChangeCallback`] for the delivery
    /// contract.
    pub fn subscribe(&self, callback: ChangeCallback) {
        self.notifier.subscribe(callback);
    }

    /// Stop every sync session, each bounded by the stop timeout, all in
    /// parallel. Idempotent. The table itself is left intact; this is for
    /// process exit, not deletion.
    pub async fn shutdown(&self) {
        let _guard = self.write_lock.lock().await;

        let sessions: Vec<(String, SyncSession)> = {
            let mut table = self.dats.write().await;
            table
                .iter_mut()
                .filter_map(|e| e.session.take().map(|s| (e.dat.id.clone(), s)))
                .collect()
        };
        if sessions.is_empty() {
            return;
        }

        info!("Stopping {} sync sessions", sessions.len());
        let timeout = self.options.stop_timeout;
        let stops = sessions.into_iter().map(|(id, session)| async move {
            if !session.stop(timeout).await {
                warn!("Force-discarded session for dat {}", id);
            }
        });
        futures::future::join_all(stops).await;
    }

    fn spawn_session(&self, dat: &Dat) -> SyncSession {
        SyncSession::spawn(
            dat.id.clone(),
            dat.link.clone(),
            self.network.clone(),
            self.options.retry.clone(),
            self.updates_tx.clone(),
        )
    }

    async fn snapshot_records(&self) -> Vec<DatRecord> {
        self.dats
            .read()
            .await
            .iter()
            .map(|e| DatRecord::from_dat(&e.dat))
            .collect()
    }
}

impl Drop for DatRegistry {
    fn drop(&mut self) {
        self.apply_task.abort();
    }
}

/// Fold session stat events into the table.
///
/// Ends when every session sender and the registry's own handle are gone.
/// Events for dats that are `Closing` or already removed are dropped; stats
/// freeze the moment deletion begins.
async fn apply_stats_loop(
    mut updates_rx: mpsc::Receiver<StatsUpdate>,
    dats: Arc<RwLock<Vec<DatEntry>>>,
    notify: Arc<Notify>,
) {
    while let Some(update) = updates_rx.recv().await {
        let mut table = dats.write().await;
        let entry = match table.iter_mut().find(|e| e.dat.id == update.id) {
            Some(entry) => entry,
            // Late event from a force-discarded session
            None => continue,
        };
        if entry.dat.status != DatStatus::Active {
            continue;
        }

        let stats = &mut entry.dat.stats;
        match update.event {
            NetworkEvent::PeerConnected => {
                stats.peers = stats.peers.saturating_add(1);
            }
            NetworkEvent::PeerDisconnected => {
                if stats.peers == 0 {
                    warn!("Peer disconnect for dat {} with zero peers", update.id);
                }
                stats.peers = stats.peers.saturating_sub(1);
            }
            NetworkEvent::Downloaded { bytes } => {
                stats.downloaded_bytes = stats.downloaded_bytes.saturating_add(bytes);
            }
            NetworkEvent::Uploaded { bytes } => {
                stats.uploaded_bytes = stats.uploaded_bytes.saturating_add(bytes);
            }
        }
        drop(table);
        notify.notify_one();
    }
}

/// Coalescing fan-out of change signals to subscribers.
///
/// `mark_changed` is cheap and sync. The spawned task wakes on the first
/// mark, sleeps out the coalesce window so a burst lands as one round, then
/// invokes every callback.
struct ChangeNotifier {
    callbacks: Arc<std::sync::Mutex<Vec<ChangeCallback>>>,
    notify: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ChangeNotifier {
    fn spawn(window: Duration) -> Self {
        let callbacks: Arc<std::sync::Mutex<Vec<ChangeCallback>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        let notify = Arc::new(Notify::new());

        let task = {
            let callbacks = callbacks.clone();
            let notify = notify.clone();
            tokio::spawn(async move {
                loop {
                    notify.notified().await;
                    tokio::time::sleep(window).await;
                    let callbacks = callbacks.lock().unwrap();
                    for callback in callbacks.iter() {
                        callback();
                    }
                }
            })
        };

        Self {
            callbacks,
            notify,
            task,
        }
    }

    fn subscribe(&self, callback: ChangeCallback) {
        self.callbacks.lock().unwrap().push(callback);
    }

    fn mark_changed(&self) {
        self.notify.notify_one();
    }

    fn notify_handle(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::DisconnectedNetwork;
    use std::fs;
    use std::sync::atomic::AtomicU32;
    use tempfile::TempDir;

    fn fast_options() -> RegistryOptions {
        RegistryOptions {
            stop_timeout: Duration::from_millis(500),
            coalesce_window: Duration::from_millis(10),
            retry: RetryConfig::new()
                .with_base_delay(Duration::from_millis(5))
                .with_max_delay(Duration::from_millis(20))
                .with_jitter(false),
        }
    }

    async fn create_test_registry() -> (Arc<DatRegistry>, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let registry = DatRegistry::open_with(
            temp_dir.path().join("data"),
            Arc::new(DisconnectedNetwork),
            fast_options(),
        )
        .await
        .expect("Failed to open registry");
        (registry, temp_dir)
    }

    fn make_folder(root: &Path, name: &str, bytes: usize) -> PathBuf {
        let folder = root.join(name);
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("content.bin"), vec![0u8; bytes]).unwrap();
        folder
    }

    #[tokio::test]
    async fn test_create_populates_dat() {
        let (registry, dir) = create_test_registry().await;
        let folder = make_folder(dir.path(), "photos", 52);

        let dat = registry.create(&folder, "karissa").await.unwrap();
        assert_eq!(dat.title, "photos");
        assert_eq!(dat.author, "karissa");
        assert_eq!(dat.size_bytes, 52);
        assert_eq!(dat.status, DatStatus::Active);
        assert_eq!(dat.stats.peers, 0);
        assert_eq!(dat.origin, DatOrigin::Created);
        assert!(network::is_valid_link(&dat.link));

        let listed = registry.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, dat.id);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_import_records_origin() {
        let (registry, dir) = create_test_registry().await;
        let folder = make_folder(dir.path(), "their-stuff", 10);

        let dat = registry.import(&folder, "karissa").await.unwrap();
        assert_eq!(dat.origin, DatOrigin::Imported);
    }

    #[tokio::test]
    async fn test_duplicate_path_rejected() {
        let (registry, dir) = create_test_registry().await;
        let folder = make_folder(dir.path(), "photos", 10);

        registry.create(&folder, "karissa").await.unwrap();
        let err = registry.create(&folder, "karissa").await.unwrap_err();
        assert!(matches!(err, DeskError::DuplicatePath(_)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_rejected_for_alternate_spelling() {
        let (registry, dir) = create_test_registry().await;
        let folder = make_folder(dir.path(), "photos", 10);

        registry.create(&folder, "karissa").await.unwrap();

        // Same folder reached through a detour canonicalizes identically
        let detour = dir.path().join("photos").join("..").join("photos");
        let err = registry.create(&detour, "karissa").await.unwrap_err();
        assert!(matches!(err, DeskError::DuplicatePath(_)));
    }

    #[tokio::test]
    async fn test_create_missing_path_fails() {
        let (registry, dir) = create_test_registry().await;
        let err = registry
            .create(dir.path().join("nope"), "karissa")
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::FileNotFound(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_create_persists_before_returning() {
        let (registry, dir) = create_test_registry().await;
        let folder = make_folder(dir.path(), "photos", 10);
        let dat = registry.create(&folder, "karissa").await.unwrap();

        let store = RegistryStore::new(registry.data_dir());
        let records = store.load();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, dat.id);
        assert_eq!(records[0].link, dat.link);
    }

    #[tokio::test]
    async fn test_delete_removes_dat_and_snapshot() {
        let (registry, dir) = create_test_registry().await;
        let folder_a = make_folder(dir.path(), "a", 1);
        let folder_b = make_folder(dir.path(), "b", 2);
        let dat_a = registry.create(&folder_a, "karissa").await.unwrap();
        registry.create(&folder_b, "karissa").await.unwrap();

        registry.delete(&dat_a.id).await.unwrap();

        let ids: Vec<String> = registry.list().await.into_iter().map(|d| d.id).collect();
        assert_eq!(ids.len(), 1);
        assert!(!ids.contains(&dat_a.id));

        let records = RegistryStore::new(registry.data_dir()).load();
        assert_eq!(records.len(), 1);
        assert_ne!(records[0].id, dat_a.id);
    }

    #[tokio::test]
    async fn test_delete_unknown_id_leaves_registry_unchanged() {
        let (registry, dir) = create_test_registry().await;
        let folder = make_folder(dir.path(), "photos", 10);
        registry.create(&folder, "karissa").await.unwrap();

        let before = registry.list().await;
        let err = registry.delete("no-such-id").await.unwrap_err();
        assert!(matches!(err, DeskError::DatNotFound { .. }));

        let after = registry.list().await;
        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].id, after[0].id);
        assert_eq!(after[0].status, DatStatus::Active);
    }

    #[tokio::test]
    async fn test_list_preserves_insertion_order() {
        let (registry, dir) = create_test_registry().await;
        for name in ["one", "two", "three"] {
            let folder = make_folder(dir.path(), name, 1);
            registry.create(&folder, "karissa").await.unwrap();
        }

        let titles: Vec<String> = registry.list().await.into_iter().map(|d| d.title).collect();
        assert_eq!(titles, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_get_and_share_link() {
        let (registry, dir) = create_test_registry().await;
        let folder = make_folder(dir.path(), "photos", 10);
        let dat = registry.create(&folder, "karissa").await.unwrap();

        let fetched = registry.get(&dat.id).await.unwrap();
        assert_eq!(fetched.id, dat.id);

        let link = registry.share_link(&dat.id).await.unwrap();
        assert_eq!(link, dat.link);

        assert!(matches!(
            registry.get("missing").await.unwrap_err(),
            DeskError::DatNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_stats_updates_reach_snapshots() {
        let (registry, dir) = create_test_registry().await;
        let folder = make_folder(dir.path(), "photos", 10);
        let dat = registry.create(&folder, "karissa").await.unwrap();

        // Feed the apply loop directly, standing in for the dat's session
        let tx = registry.updates_tx.clone();
        for event in [
            NetworkEvent::PeerConnected,
            NetworkEvent::PeerConnected,
            NetworkEvent::Downloaded { bytes: 100 },
            NetworkEvent::PeerDisconnected,
            NetworkEvent::Uploaded { bytes: 7 },
        ] {
            tx.send(StatsUpdate {
                id: dat.id.clone(),
                event,
            })
            .await
            .unwrap();
        }

        // Wait for the loop to drain
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let snapshot = registry.get(&dat.id).await.unwrap();
                if snapshot.stats.uploaded_bytes == 7 {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .map(|snapshot| {
            assert_eq!(snapshot.stats.peers, 1);
            assert_eq!(snapshot.stats.downloaded_bytes, 100);
            assert_eq!(snapshot.stats.uploaded_bytes, 7);
        })
        .expect("stats never applied");
    }

    #[tokio::test]
    async fn test_stats_frozen_once_closing() {
        let dats: Arc<RwLock<Vec<DatEntry>>> = Arc::new(RwLock::new(Vec::new()));
        {
            let mut table = dats.write().await;
            table.push(DatEntry {
                dat: Dat {
                    id: "closing".into(),
                    local_path: PathBuf::from("/tmp/x"),
                    link: network::new_link(),
                    title: "x".into(),
                    author: "karissa".into(),
                    size_bytes: 0,
                    created_at: Utc::now(),
                    origin: DatOrigin::Created,
                    status: DatStatus::Closing,
                    stats: NetworkStats {
                        peers: 3,
                        downloaded_bytes: 10,
                        uploaded_bytes: 0,
                    },
                },
                session: None,
            });
        }

        let (tx, rx) = mpsc::channel(8);
        let notify = Arc::new(Notify::new());
        let task = tokio::spawn(apply_stats_loop(rx, dats.clone(), notify));

        tx.send(StatsUpdate {
            id: "closing".into(),
            event: NetworkEvent::PeerConnected,
        })
        .await
        .unwrap();
        tx.send(StatsUpdate {
            id: "gone".into(),
            event: NetworkEvent::PeerConnected,
        })
        .await
        .unwrap();
        drop(tx);
        task.await.unwrap();

        let table = dats.read().await;
        assert_eq!(table[0].dat.stats.peers, 3, "frozen stats must not move");
    }

    #[tokio::test]
    async fn test_peer_count_never_underflows() {
        let dats: Arc<RwLock<Vec<DatEntry>>> = Arc::new(RwLock::new(Vec::new()));
        {
            let mut table = dats.write().await;
            table.push(DatEntry {
                dat: Dat {
                    id: "d".into(),
                    local_path: PathBuf::from("/tmp/x"),
                    link: network::new_link(),
                    title: "x".into(),
                    author: "a".into(),
                    size_bytes: 0,
                    created_at: Utc::now(),
                    origin: DatOrigin::Created,
                    status: DatStatus::Active,
                    stats: NetworkStats::default(),
                },
                session: None,
            });
        }

        let (tx, rx) = mpsc::channel(8);
        let notify = Arc::new(Notify::new());
        let task = tokio::spawn(apply_stats_loop(rx, dats.clone(), notify));

        tx.send(StatsUpdate {
            id: "d".into(),
            event: NetworkEvent::PeerDisconnected,
        })
        .await
        .unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(dats.read().await[0].dat.stats.peers, 0);
    }

    #[tokio::test]
    async fn test_subscribe_coalesces_bursts() {
        let notifier = ChangeNotifier::spawn(Duration::from_millis(50));
        let rounds = Arc::new(AtomicU32::new(0));
        let counter = rounds.clone();
        notifier.subscribe(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        for _ in 0..10 {
            notifier.mark_changed();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let seen = rounds.load(Ordering::SeqCst);
        assert!(seen >= 1, "burst must produce at least one round");
        assert!(seen <= 3, "burst of 10 should coalesce, got {} rounds", seen);
    }

    #[tokio::test]
    async fn test_subscriber_notified_after_create() {
        let (registry, dir) = create_test_registry().await;
        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();
        registry.subscribe(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let folder = make_folder(dir.path(), "photos", 10);
        registry.create(&folder, "karissa").await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while fired.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscriber never notified");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_create_rolls_back_on_persistence_failure() {
        use std::os::unix::fs::PermissionsExt;

        let (registry, dir) = create_test_registry().await;
        let folder = make_folder(dir.path(), "photos", 10);
        registry.create(&folder, "karissa").await.unwrap();

        let data_dir = registry.data_dir().to_path_buf();
        fs::set_permissions(&data_dir, fs::Permissions::from_mode(0o555)).unwrap();

        let second = make_folder(dir.path(), "more", 10);
        let err = registry.create(&second, "karissa").await.unwrap_err();
        assert!(matches!(err, DeskError::Io { .. }));
        assert_eq!(registry.len(), 1);

        fs::set_permissions(&data_dir, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_delete_rolls_back_on_persistence_failure() {
        use std::os::unix::fs::PermissionsExt;

        let (registry, dir) = create_test_registry().await;
        let folder = make_folder(dir.path(), "photos", 10);
        let dat = registry.create(&folder, "karissa").await.unwrap();

        let data_dir = registry.data_dir().to_path_buf();
        fs::set_permissions(&data_dir, fs::Permissions::from_mode(0o555)).unwrap();

        let err = registry.delete(&dat.id).await.unwrap_err();
        assert!(matches!(err, DeskError::Io { .. }));

        let listed = registry.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, DatStatus::Active, "rollback restores status");

        fs::set_permissions(&data_dir, fs::Permissions::from_mode(0o755)).unwrap();
        registry.delete(&dat.id).await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (registry, dir) = create_test_registry().await;
        let folder = make_folder(dir.path(), "photos", 10);
        registry.create(&folder, "karissa").await.unwrap();

        registry.shutdown().await;
        registry.shutdown().await;

        // Dats stay listed; only the sessions are gone
        assert_eq!(registry.len(), 1);
    }
}
