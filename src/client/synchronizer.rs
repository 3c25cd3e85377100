//! Debounced persistence of the local player state.
//!
//! Non-critical mutations go through [`ProgressSynchronizer::schedule_save`]: the
//! first one arms a single timer and later ones ride on it, so a burst of moves
//! produces one save carrying the newest snapshot. Critical changes call
//! [`ProgressSynchronizer::save_now`], which skips the debounce and the server
//! throttle. Failed saves are logged and never roll the local state back; the
//! next mutation carries the latest snapshot anyway.

use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{task::JoinHandle, time::sleep};
use tracing::{debug, warn};
use uuid::Uuid;

use super::GameBackend;
use crate::dao::models::ProgressSnapshot;

/// Delay between the first non-critical mutation and its save.
pub const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_millis(2_000);

/// Owns the local snapshot of one logged-in account and pushes it to the backend.
#[derive(Clone)]
pub struct ProgressSynchronizer {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    backend: Arc<dyn GameBackend>,
    account_id: Uuid,
    state: Mutex<ProgressSnapshot>,
    timer: Mutex<Option<JoinHandle<()>>>,
    in_flight: AtomicUsize,
    debounce: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps the in-flight counter exact even when a save future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ProgressSynchronizer {
    /// Start synchronizing `initial` for the given account with the default debounce.
    pub fn new(backend: Arc<dyn GameBackend>, account_id: Uuid, initial: ProgressSnapshot) -> Self {
        Self::with_debounce(backend, account_id, initial, DEFAULT_SAVE_DEBOUNCE)
    }

    pub fn with_debounce(
        backend: Arc<dyn GameBackend>,
        account_id: Uuid,
        initial: ProgressSnapshot,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                backend,
                account_id,
                state: Mutex::new(initial),
                timer: Mutex::new(None),
                in_flight: AtomicUsize::new(0),
                debounce,
            }),
        }
    }

    pub fn account_id(&self) -> Uuid {
        self.inner.account_id
    }

    /// Copy of the current local state.
    pub fn snapshot(&self) -> ProgressSnapshot {
        lock(&self.inner.state).clone()
    }

    /// Read the local state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&ProgressSnapshot) -> R) -> R {
        f(&lock(&self.inner.state))
    }

    /// Mutate the local state. Persisting the change is up to the caller.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut ProgressSnapshot) -> R) -> R {
        f(&mut lock(&self.inner.state))
    }

    /// Whether a debounced save is waiting for its timer.
    pub fn is_scheduled(&self) -> bool {
        lock(&self.inner.timer)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Number of save requests currently awaiting an answer.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Arm the debounce timer unless one is already pending.
    ///
    /// The pending timer is never reset: it fires `debounce` after the first
    /// mutation of the burst and sends whatever the state is at that moment.
    pub fn schedule_save(&self) {
        let mut timer = lock(&self.inner.timer);
        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let inner = self.inner.clone();
        *timer = Some(tokio::spawn(inner.fire_scheduled()));
        debug!(account_id = %self.inner.account_id, "progress save scheduled");
    }

    /// Save right away, dropping any pending debounced save.
    ///
    /// Runs even while another save is in flight. Returns whether the backend
    /// accepted the write; failures are logged, never raised.
    pub async fn save_now(&self, force: bool) -> bool {
        let pending = lock(&self.inner.timer).take();
        if let Some(handle) = pending {
            handle.abort();
        }
        self.inner.save(force).await
    }

    /// Forced final save before the session goes away.
    pub async fn shutdown(self) -> bool {
        let saved = self.save_now(true).await;
        debug!(account_id = %self.inner.account_id, saved, "synchronizer shut down");
        saved
    }
}

impl SyncInner {
    async fn fire_scheduled(self: Arc<Self>) {
        sleep(self.debounce).await;

        if self.in_flight.load(Ordering::SeqCst) > 0 {
            debug!(account_id = %self.account_id, "save in flight; re-arming scheduled save");
            sleep(self.debounce).await;
            if self.in_flight.load(Ordering::SeqCst) > 0 {
                debug!(account_id = %self.account_id, "save still in flight; scheduled save skipped");
                lock(&self.timer).take();
                return;
            }
        }

        // Free the slot first so mutations made during this save can arm a new timer.
        lock(&self.timer).take();
        self.save(false).await;
    }

    async fn save(&self, force: bool) -> bool {
        let snapshot = lock(&self.state).clone();
        let _in_flight = InFlight::enter(&self.in_flight);

        match self
            .backend
            .save_progress(self.account_id, snapshot, force)
            .await
        {
            Ok(()) => {
                debug!(account_id = %self.account_id, force, "progress saved");
                true
            }
            Err(err) => {
                warn!(account_id = %self.account_id, force, error = %err, "progress save failed; keeping local state");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{client::tests::RecordingBackend, state::levels::Position};

    fn synchronizer(backend: &RecordingBackend) -> ProgressSynchronizer {
        ProgressSynchronizer::new(
            Arc::new(backend.clone()),
            Uuid::nil(),
            ProgressSnapshot::default(),
        )
    }

    fn move_to(sync: &ProgressSynchronizer, x: i32, y: i32) {
        sync.mutate(|state| state.position = Position::new(x, y));
        sync.schedule_save();
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_mutations_sends_one_save_with_latest_state() {
        let backend = RecordingBackend::new(Duration::ZERO);
        let sync = synchronizer(&backend);

        for x in 1..=5 {
            move_to(&sync, x, 1);
            sleep(Duration::from_millis(300)).await;
        }
        assert!(backend.saves().is_empty());

        sleep(Duration::from_millis(1_000)).await;
        let saves = backend.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].snapshot.position, Position::new(5, 1));
        assert!(!saves[0].force);
        assert!(!sync.is_scheduled());

        move_to(&sync, 6, 1);
        sleep(DEFAULT_SAVE_DEBOUNCE + Duration::from_millis(10)).await;
        assert_eq!(backend.saves().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn critical_save_skips_debounce_and_cancels_timer() {
        let backend = RecordingBackend::new(Duration::ZERO);
        let sync = synchronizer(&backend);

        move_to(&sync, 2, 2);
        assert!(sync.is_scheduled());
        sync.mutate(|state| state.score = 100);
        assert!(sync.save_now(true).await);
        assert!(!sync.is_scheduled());

        sleep(DEFAULT_SAVE_DEBOUNCE * 2).await;
        let saves = backend.saves();
        assert_eq!(saves.len(), 1);
        assert!(saves[0].force);
        assert_eq!(saves[0].snapshot.score, 100);
        assert_eq!(saves[0].snapshot.position, Position::new(2, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn timer_firing_during_save_rearms_once() {
        let backend = RecordingBackend::new(Duration::from_secs(3));
        let sync = synchronizer(&backend);

        let critical = sync.clone();
        let forced = tokio::spawn(async move { critical.save_now(true).await });
        sleep(Duration::from_millis(10)).await;
        assert_eq!(sync.in_flight(), 1);

        move_to(&sync, 3, 3);
        assert!(forced.await.unwrap());
        assert_eq!(backend.saves().len(), 1);

        sleep(Duration::from_secs(5)).await;
        let saves = backend.saves();
        assert_eq!(saves.len(), 2);
        assert!(!saves[1].force);
        assert_eq!(saves[1].snapshot.position, Position::new(3, 3));
        assert!(saves[1].finished_at > saves[0].finished_at);
        assert_eq!(sync.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_keeps_local_state() {
        let backend = RecordingBackend::new(Duration::ZERO).failing();
        let sync = synchronizer(&backend);

        sync.mutate(|state| {
            state.inventory.insert("lamp".into());
        });
        assert!(!sync.save_now(false).await);
        assert!(sync.snapshot().inventory.contains("lamp"));
        assert_eq!(sync.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_forces_a_final_save() {
        let backend = RecordingBackend::new(Duration::ZERO);
        let sync = synchronizer(&backend);

        move_to(&sync, 4, 4);
        assert!(sync.clone().shutdown().await);
        sleep(DEFAULT_SAVE_DEBOUNCE * 2).await;

        let saves = backend.saves();
        assert_eq!(saves.len(), 1);
        assert!(saves[0].force);
        assert_eq!(saves[0].snapshot.position, Position::new(4, 4));
    }
}
