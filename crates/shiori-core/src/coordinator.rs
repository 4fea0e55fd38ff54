use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use shiori_api::{Credential, TrackerService, WatchStatus};

use crate::error::SyncError;
use crate::matcher;
use crate::models::DetectionRecord;
use crate::store::PrefStore;

const MAILBOX_DEPTH: usize = 32;
const EVENT_DEPTH: usize = 16;

/// Notifications pushed to interested observers (the UI).
#[derive(Debug, Clone)]
pub enum Event {
    /// A new detection replaced the current one.
    Detected(DetectionRecord),
    /// An authorization flow completed.
    Authenticated { display_name: String },
}

/// Result of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub anime_id: u64,
    pub status: WatchStatus,
    pub episodes: u32,
}

enum Command {
    Record(DetectionRecord),
    RequestSync(oneshot::Sender<Result<SyncReport, SyncError>>),
    Authenticate(oneshot::Sender<Result<String, SyncError>>),
    Logout(oneshot::Sender<()>),
    GetDetection(oneshot::Sender<Option<DetectionRecord>>),
    SetAutoSync(bool, oneshot::Sender<()>),
    SyncDone {
        result: Result<SyncReport, SyncError>,
        reply: Option<oneshot::Sender<Result<SyncReport, SyncError>>>,
    },
    AuthDone {
        result: Result<Credential, SyncError>,
        reply: oneshot::Sender<Result<String, SyncError>>,
    },
}

/// Cloneable handle to the coordinator mailbox.
///
/// All methods are plain message sends; the coordinator task processes them
/// in receipt order.
#[derive(Clone)]
pub struct Handle {
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<Event>,
}

fn unavailable() -> SyncError {
    SyncError::Remote("sync coordinator unavailable".into())
}

impl Handle {
    /// Subscribe to coordinator notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Replace the current detection. Fire-and-forget: any automatic sync it
    /// triggers reports failures to the log only.
    pub async fn record_detection(&self, record: DetectionRecord) -> Result<(), SyncError> {
        self.tx
            .send(Command::Record(record))
            .await
            .map_err(|_| unavailable())
    }

    /// Explicitly sync the current detection to the remote list.
    pub async fn request_sync(&self) -> Result<SyncReport, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::RequestSync(tx))
            .await
            .map_err(|_| unavailable())?;
        rx.await.map_err(|_| unavailable())?
    }

    /// Run the interactive authorization flow. Returns the display name.
    pub async fn authenticate(&self) -> Result<String, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::Authenticate(tx))
            .await
            .map_err(|_| unavailable())?;
        rx.await.map_err(|_| unavailable())?
    }

    /// Drop the credential and the current detection.
    pub async fn logout(&self) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::Logout(tx))
            .await
            .map_err(|_| unavailable())?;
        rx.await.map_err(|_| unavailable())
    }

    /// Copy of the current detection, if any. Side-effect-free.
    pub async fn get_detection(&self) -> Result<Option<DetectionRecord>, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::GetDetection(tx))
            .await
            .map_err(|_| unavailable())?;
        rx.await.map_err(|_| unavailable())
    }

    /// Update and persist the auto-sync preference.
    pub async fn set_auto_sync(&self, enabled: bool) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::SetAutoSync(enabled, tx))
            .await
            .map_err(|_| unavailable())?;
        rx.await.map_err(|_| unavailable())
    }
}

/// Single source of truth for the current detection and the gatekeeper for
/// remote synchronization.
///
/// Remote work is spawned so the mailbox never blocks; completion comes back
/// as internal commands. At most one sync and one authorization flow are in
/// flight at a time — a second attempt is rejected with [`SyncError::Busy`]
/// (manual) or skipped (automatic).
pub struct SyncCoordinator<S: TrackerService> {
    service: Arc<S>,
    store: PrefStore,
    last_detection: Option<DetectionRecord>,
    credential: Option<Credential>,
    auto_sync: bool,
    sync_in_flight: bool,
    auth_in_flight: bool,
    tx: mpsc::Sender<Command>,
    rx: mpsc::Receiver<Command>,
    events: broadcast::Sender<Event>,
}

impl<S: TrackerService> SyncCoordinator<S> {
    /// Spawn the coordinator task, restoring the credential and the auto-sync
    /// preference from the store.
    pub fn spawn(service: S, store: PrefStore, auto_sync_default: bool) -> Handle {
        let (tx, rx) = mpsc::channel(MAILBOX_DEPTH);
        let (events, _) = broadcast::channel(EVENT_DEPTH);

        let prefs = store.load();
        let coordinator = Self {
            service: Arc::new(service),
            store,
            last_detection: None,
            credential: prefs.credential,
            auto_sync: prefs.auto_sync.unwrap_or(auto_sync_default),
            sync_in_flight: false,
            auth_in_flight: false,
            tx: tx.clone(),
            rx,
            events: events.clone(),
        };
        tokio::spawn(coordinator.run());

        Handle { tx, events }
    }

    async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            self.handle(cmd);
        }
        debug!("coordinator mailbox closed");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Record(record) => self.on_record(record),
            Command::RequestSync(reply) => self.on_request_sync(reply),
            Command::Authenticate(reply) => self.on_authenticate(reply),
            Command::Logout(reply) => self.on_logout(reply),
            Command::GetDetection(reply) => {
                let _ = reply.send(self.last_detection.clone());
            }
            Command::SetAutoSync(enabled, reply) => self.on_set_auto_sync(enabled, reply),
            Command::SyncDone { result, reply } => self.on_sync_done(result, reply),
            Command::AuthDone { result, reply } => self.on_auth_done(result, reply),
        }
    }

    fn on_record(&mut self, record: DetectionRecord) {
        info!(
            source = record.source.as_str(),
            title = %record.title,
            episode = record.episode,
            completed = record.completed,
            "detection recorded"
        );
        self.last_detection = Some(record.clone());
        let _ = self.events.send(Event::Detected(record.clone()));

        if !self.auto_sync {
            return;
        }
        let Some(credential) = self.credential.clone() else {
            debug!("auto-sync skipped: not authenticated");
            return;
        };
        if self.sync_in_flight {
            debug!("auto-sync skipped: another sync in flight");
            return;
        }
        self.start_sync(credential, record, None);
    }

    fn on_request_sync(&mut self, reply: oneshot::Sender<Result<SyncReport, SyncError>>) {
        if self.sync_in_flight {
            let _ = reply.send(Err(SyncError::Busy));
            return;
        }
        let Some(credential) = self.credential.clone() else {
            let _ = reply.send(Err(SyncError::Unauthenticated));
            return;
        };
        let Some(record) = self.last_detection.clone() else {
            let _ = reply.send(Err(SyncError::NoDetection));
            return;
        };
        self.start_sync(credential, record, Some(reply));
    }

    fn start_sync(
        &mut self,
        credential: Credential,
        record: DetectionRecord,
        reply: Option<oneshot::Sender<Result<SyncReport, SyncError>>>,
    ) {
        self.sync_in_flight = true;
        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = sync_once(service.as_ref(), &credential, &record).await;
            let _ = tx.send(Command::SyncDone { result, reply }).await;
        });
    }

    fn on_sync_done(
        &mut self,
        result: Result<SyncReport, SyncError>,
        reply: Option<oneshot::Sender<Result<SyncReport, SyncError>>>,
    ) {
        self.sync_in_flight = false;
        match &result {
            Ok(report) => info!(
                anime_id = report.anime_id,
                status = report.status.as_str(),
                episodes = report.episodes,
                "sync pushed"
            ),
            Err(e) => warn!(error = %e, "sync failed"),
        }
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    fn on_authenticate(&mut self, reply: oneshot::Sender<Result<String, SyncError>>) {
        if self.auth_in_flight {
            let _ = reply.send(Err(SyncError::Busy));
            return;
        }
        self.auth_in_flight = true;
        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = service
                .authenticate()
                .await
                .map_err(|e| SyncError::Remote(e.to_string()));
            let _ = tx.send(Command::AuthDone { result, reply }).await;
        });
    }

    fn on_auth_done(
        &mut self,
        result: Result<Credential, SyncError>,
        reply: oneshot::Sender<Result<String, SyncError>>,
    ) {
        self.auth_in_flight = false;
        match result {
            Ok(credential) => {
                if let Err(e) = self.store.set_credential(&credential) {
                    warn!(error = %e, "failed to persist credential");
                }
                info!(user = %credential.display_name, "authenticated");
                let display_name = credential.display_name.clone();
                self.credential = Some(credential);
                let _ = self.events.send(Event::Authenticated {
                    display_name: display_name.clone(),
                });
                let _ = reply.send(Ok(display_name));
            }
            Err(e) => {
                warn!(error = %e, "authentication failed");
                let _ = reply.send(Err(e));
            }
        }
    }

    fn on_logout(&mut self, reply: oneshot::Sender<()>) {
        self.credential = None;
        self.last_detection = None;
        if let Err(e) = self.store.clear_credential() {
            warn!(error = %e, "failed to clear stored credential");
        }
        info!("logged out");
        let _ = reply.send(());
    }

    fn on_set_auto_sync(&mut self, enabled: bool, reply: oneshot::Sender<()>) {
        self.auto_sync = enabled;
        if let Err(e) = self.store.set_auto_sync(enabled) {
            warn!(error = %e, "failed to persist auto-sync preference");
        }
        let _ = reply.send(());
    }
}

/// Two-step sync: resolve the title against the remote catalog, then push
/// the status update. The update step is never reached when resolution
/// fails.
async fn sync_once<S: TrackerService>(
    service: &S,
    credential: &Credential,
    record: &DetectionRecord,
) -> Result<SyncReport, SyncError> {
    let hits = service
        .search_anime(credential, &record.title)
        .await
        .map_err(|e| SyncError::Remote(e.to_string()))?;

    let anime_id = matcher::resolve(&record.title, &hits)
        .ok_or_else(|| SyncError::NotFound(record.title.clone()))?;

    let status = if record.completed {
        WatchStatus::Completed
    } else {
        WatchStatus::Watching
    };

    service
        .update_status(credential, anime_id, status, record.episode)
        .await
        .map_err(|e| SyncError::Remote(e.to_string()))?;

    Ok(SyncReport {
        anime_id,
        status,
        episodes: record.episode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::Utc;

    use shiori_api::AnimeSearchResult;
    use shiori_detect::Source;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Search(String),
        Update {
            anime_id: u64,
            status: WatchStatus,
            episodes: u32,
        },
    }

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct MockError(String);

    struct MockService {
        results: Vec<AnimeSearchResult>,
        credential: Option<Credential>,
        fail_update: bool,
        search_delay: Option<Duration>,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl MockService {
        fn new(results: Vec<AnimeSearchResult>) -> (Self, Arc<Mutex<Vec<Call>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    results,
                    credential: None,
                    fail_update: false,
                    search_delay: None,
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    impl TrackerService for MockService {
        type Error = MockError;

        async fn authenticate(&self) -> Result<Credential, MockError> {
            self.credential
                .clone()
                .ok_or_else(|| MockError("auth flow failed".into()))
        }

        async fn search_anime(
            &self,
            _credential: &Credential,
            query: &str,
        ) -> Result<Vec<AnimeSearchResult>, MockError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Search(query.to_string()));
            if let Some(delay) = self.search_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.results.clone())
        }

        async fn update_status(
            &self,
            _credential: &Credential,
            anime_id: u64,
            status: WatchStatus,
            episodes: u32,
        ) -> Result<(), MockError> {
            self.calls.lock().unwrap().push(Call::Update {
                anime_id,
                status,
                episodes,
            });
            if self.fail_update {
                return Err(MockError("update rejected".into()));
            }
            Ok(())
        }
    }

    fn demon_slayer_results() -> Vec<AnimeSearchResult> {
        vec![AnimeSearchResult {
            service_id: 42,
            title: "Demon Slayer".into(),
            title_english: None,
            synonyms: vec![],
            episodes: Some(26),
        }]
    }

    fn record(title: &str, episode: u32, completed: bool) -> DetectionRecord {
        DetectionRecord {
            source: Source::Crunchyroll,
            title: title.into(),
            episode,
            completed,
            observed_at: Utc::now(),
        }
    }

    fn credential() -> Credential {
        Credential {
            access_token: "token".into(),
            display_name: "watcher".into(),
        }
    }

    fn temp_store() -> (tempfile::TempDir, PrefStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PrefStore::new(dir.path().join("store.toml"));
        (dir, store)
    }

    fn authed_store() -> (tempfile::TempDir, PrefStore) {
        let (dir, store) = temp_store();
        store.set_credential(&credential()).unwrap();
        (dir, store)
    }

    async fn wait_for_calls(calls: &Arc<Mutex<Vec<Call>>>, count: usize) {
        for _ in 0..200 {
            if calls.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "timed out waiting for {count} calls, got {:?}",
            calls.lock().unwrap()
        );
    }

    #[tokio::test]
    async fn test_request_sync_without_detection() {
        let (service, _calls) = MockService::new(demon_slayer_results());
        let (_dir, store) = authed_store();
        let handle = SyncCoordinator::spawn(service, store, true);

        assert_eq!(handle.request_sync().await, Err(SyncError::NoDetection));
    }

    #[tokio::test]
    async fn test_request_sync_without_credential() {
        let (service, _calls) = MockService::new(demon_slayer_results());
        let (_dir, store) = temp_store();
        let handle = SyncCoordinator::spawn(service, store, false);

        handle.record_detection(record("Demon Slayer", 5, false)).await.unwrap();
        assert_eq!(handle.request_sync().await, Err(SyncError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_request_sync_not_found_skips_update() {
        let (service, calls) = MockService::new(vec![]);
        let (_dir, store) = authed_store();
        let handle = SyncCoordinator::spawn(service, store, false);

        handle.record_detection(record("Demon Slayer", 5, false)).await.unwrap();
        assert_eq!(
            handle.request_sync().await,
            Err(SyncError::NotFound("Demon Slayer".into()))
        );
        assert_eq!(
            *calls.lock().unwrap(),
            vec![Call::Search("Demon Slayer".into())]
        );
    }

    #[tokio::test]
    async fn test_request_sync_watching() {
        let (service, calls) = MockService::new(demon_slayer_results());
        let (_dir, store) = authed_store();
        let handle = SyncCoordinator::spawn(service, store, false);

        handle.record_detection(record("Demon Slayer", 5, false)).await.unwrap();
        let report = handle.request_sync().await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                anime_id: 42,
                status: WatchStatus::Watching,
                episodes: 5,
            }
        );
        assert_eq!(
            calls.lock().unwrap().last().unwrap(),
            &Call::Update {
                anime_id: 42,
                status: WatchStatus::Watching,
                episodes: 5,
            }
        );
    }

    #[tokio::test]
    async fn test_request_sync_completed() {
        let (service, calls) = MockService::new(demon_slayer_results());
        let (_dir, store) = authed_store();
        let handle = SyncCoordinator::spawn(service, store, false);

        handle.record_detection(record("Demon Slayer", 5, true)).await.unwrap();
        let report = handle.request_sync().await.unwrap();
        assert_eq!(report.status, WatchStatus::Completed);
        assert_eq!(
            calls.lock().unwrap().last().unwrap(),
            &Call::Update {
                anime_id: 42,
                status: WatchStatus::Completed,
                episodes: 5,
            }
        );
    }

    #[tokio::test]
    async fn test_request_sync_remote_error() {
        let (mut service, _calls) = MockService::new(demon_slayer_results());
        service.fail_update = true;
        let (_dir, store) = authed_store();
        let handle = SyncCoordinator::spawn(service, store, false);

        handle.record_detection(record("Demon Slayer", 5, false)).await.unwrap();
        assert_eq!(
            handle.request_sync().await,
            Err(SyncError::Remote("update rejected".into()))
        );
    }

    #[tokio::test]
    async fn test_concurrent_sync_rejected_busy() {
        let (mut service, _calls) = MockService::new(demon_slayer_results());
        service.search_delay = Some(Duration::from_millis(50));
        let (_dir, store) = authed_store();
        let handle = SyncCoordinator::spawn(service, store, false);

        handle.record_detection(record("Demon Slayer", 5, false)).await.unwrap();
        let (first, second) = tokio::join!(handle.request_sync(), handle.request_sync());

        let results = [first, second];
        assert_eq!(
            results.iter().filter(|r| r.is_ok()).count(),
            1,
            "exactly one sync should run: {results:?}"
        );
        assert!(results.contains(&Err(SyncError::Busy)));
    }

    #[tokio::test]
    async fn test_auto_sync_on_detection() {
        let (service, calls) = MockService::new(demon_slayer_results());
        let (_dir, store) = authed_store();
        let handle = SyncCoordinator::spawn(service, store, true);

        handle.record_detection(record("Demon Slayer", 5, false)).await.unwrap();
        wait_for_calls(&calls, 2).await;
        assert_eq!(
            calls.lock().unwrap().last().unwrap(),
            &Call::Update {
                anime_id: 42,
                status: WatchStatus::Watching,
                episodes: 5,
            }
        );
    }

    #[tokio::test]
    async fn test_auto_sync_skipped_without_credential() {
        let (service, calls) = MockService::new(demon_slayer_results());
        let (_dir, store) = temp_store();
        let handle = SyncCoordinator::spawn(service, store, true);

        handle.record_detection(record("Demon Slayer", 5, false)).await.unwrap();
        // The detection must still be held and broadcast; only the remote
        // call is skipped.
        assert!(handle.get_detection().await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auto_sync_respects_preference() {
        let (service, calls) = MockService::new(demon_slayer_results());
        let (_dir, store) = authed_store();
        let handle = SyncCoordinator::spawn(service, store, true);

        handle.set_auto_sync(false).await.unwrap();
        handle.record_detection(record("Demon Slayer", 5, false)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_detection_broadcast() {
        let (service, _calls) = MockService::new(demon_slayer_results());
        let (_dir, store) = temp_store();
        let handle = SyncCoordinator::spawn(service, store, false);
        let mut events = handle.subscribe();

        handle.record_detection(record("Demon Slayer", 5, false)).await.unwrap();
        match events.recv().await.unwrap() {
            Event::Detected(r) => assert_eq!(r.title, "Demon Slayer"),
            other => panic!("Expected Detected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_last_detection_replaced_wholesale() {
        let (service, _calls) = MockService::new(demon_slayer_results());
        let (_dir, store) = temp_store();
        let handle = SyncCoordinator::spawn(service, store, false);

        handle.record_detection(record("Demon Slayer", 5, false)).await.unwrap();
        handle.record_detection(record("Frieren", 12, true)).await.unwrap();

        let current = handle.get_detection().await.unwrap().unwrap();
        assert_eq!(current.title, "Frieren");
        assert_eq!(current.episode, 12);
        assert!(current.completed);
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let (mut service, _calls) = MockService::new(demon_slayer_results());
        service.credential = Some(credential());
        let (_dir, store) = temp_store();
        let handle = SyncCoordinator::spawn(service, store.clone(), false);
        let mut events = handle.subscribe();

        let name = handle.authenticate().await.unwrap();
        assert_eq!(name, "watcher");
        match events.recv().await.unwrap() {
            Event::Authenticated { display_name } => assert_eq!(display_name, "watcher"),
            other => panic!("Expected Authenticated, got {other:?}"),
        }
        // The credential must be persisted.
        assert!(store.load().credential.is_some());
    }

    #[tokio::test]
    async fn test_authenticate_failure() {
        let (service, _calls) = MockService::new(demon_slayer_results());
        let (_dir, store) = temp_store();
        let handle = SyncCoordinator::spawn(service, store, false);

        assert_eq!(
            handle.authenticate().await,
            Err(SyncError::Remote("auth flow failed".into()))
        );
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let (service, _calls) = MockService::new(demon_slayer_results());
        let (_dir, store) = authed_store();
        let handle = SyncCoordinator::spawn(service, store.clone(), false);

        handle.record_detection(record("Demon Slayer", 5, false)).await.unwrap();
        handle.logout().await.unwrap();

        assert!(handle.get_detection().await.unwrap().is_none());
        assert_eq!(handle.request_sync().await, Err(SyncError::Unauthenticated));
        assert!(store.load().credential.is_none());
    }
}
