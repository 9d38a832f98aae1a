//! Publish scheduler.
//!
//! One actor task owns the sync state. Writes and `sync()` calls reach it
//! over a command channel; the debounce timer, the retry timer and the
//! in-flight publish attempt are branches of its `select!` loop.
//!
//! ```text
//!            write                 timer                ok, nothing pending
//!   Idle ───────────▶ Debouncing ───────▶ Publishing ─────────────────────▶ Idle
//!                         ▲                 │    ▲
//!                         │ write           │    │ retry timer
//!                         └──── (queued) ◀──┤    │
//!                                           └──▶ Retrying
//!                                          failed
//! ```
//!
//! At most one attempt runs at a time. A debounce timer that fires during
//! an attempt sets `queued`, which guarantees a follow-up attempt. One that
//! fires while waiting to retry starts the attempt at once.

use crate::clock::Clock;
use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use crate::store::LocalSnapshotStore;
use parking_lot::Mutex;
use snapsync_protocol::{Addressing, Event, Relay, SnapshotCipher, WriterIdentity, SNAPSHOT_KIND};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Shortest spacing between two attempts. Keeps consecutive events from
/// one writer in distinct `created_at` seconds.
const MIN_PUBLISH_GAP: Duration = Duration::from_millis(1000);

/// Phase of the publish scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Nothing to publish.
    Idle,
    /// Waiting for writes to settle.
    Debouncing,
    /// An attempt is in flight.
    Publishing,
    /// Waiting to retry a failed attempt.
    Retrying,
}

/// Builds, signs and sends one snapshot event.
pub(crate) struct Publisher {
    pub(crate) store: Arc<LocalSnapshotStore>,
    pub(crate) writer: WriterIdentity,
    pub(crate) cipher: Arc<SnapshotCipher>,
    pub(crate) addressing: Addressing,
    pub(crate) relays: Vec<Arc<dyn Relay>>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Publisher {
    /// Publishes the current snapshot. True if at least one relay stored it.
    async fn publish_once(&self) -> bool {
        if self.relays.is_empty() {
            debug!("no relays configured, nothing to publish");
            return true;
        }

        let snapshot = self.store.snapshot();
        let content = match self
            .cipher
            .seal_snapshot(&snapshot, self.addressing.namespace_topic())
        {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "failed to seal snapshot");
                return false;
            }
        };
        let event = match Event::sign(
            &self.writer,
            self.clock.now_secs(),
            SNAPSHOT_KIND,
            self.addressing.tags(),
            content,
        ) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "failed to sign snapshot event");
                return false;
            }
        };

        let mut acknowledged = 0usize;
        for relay in &self.relays {
            match relay.publish(&event).await {
                Ok(()) => acknowledged += 1,
                Err(e) => warn!(relay = relay.url(), error = %e, "publish failed"),
            }
        }

        if acknowledged > 0 {
            info!(
                id = %event.id,
                created_at = event.created_at,
                entries = snapshot.len(),
                acknowledged,
                "snapshot published"
            );
        }
        acknowledged > 0
    }
}

enum Command {
    Schedule,
    Sync(oneshot::Sender<bool>),
}

/// Aborts the attempt task when dropped, so a closed store stops publishing.
struct Attempt(JoinHandle<bool>);

impl Drop for Attempt {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct Scheduler {
    publisher: Arc<Publisher>,
    debounce: Duration,
    retry: RetryConfig,
    phase: SyncPhase,
    phase_tx: watch::Sender<SyncPhase>,
    queued: bool,
    retry_count: u32,
    last_attempt_at: Option<Instant>,
    debounce_at: Option<Instant>,
    retry_at: Option<Instant>,
    attempt: Option<Attempt>,
    waiters: Vec<oneshot::Sender<bool>>,
}

impl Scheduler {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Schedule) => self.on_write(),
                    Some(Command::Sync(waiter)) => self.on_sync(waiter),
                    None => break,
                },
                () = sleep_opt(self.debounce_at) => {
                    self.debounce_at = None;
                    self.on_debounce_elapsed();
                }
                () = sleep_opt(self.retry_at) => {
                    self.retry_at = None;
                    self.begin_attempt();
                }
                ok = join_attempt(&mut self.attempt) => {
                    self.attempt = None;
                    self.on_attempt_done(ok);
                }
            }
        }
    }

    fn set_phase(&mut self, phase: SyncPhase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "sync phase");
            self.phase = phase;
            self.phase_tx.send_replace(phase);
        }
    }

    fn on_write(&mut self) {
        self.debounce_at = Some(Instant::now() + self.debounce);
        if self.phase == SyncPhase::Idle {
            self.set_phase(SyncPhase::Debouncing);
        }
    }

    fn on_sync(&mut self, waiter: oneshot::Sender<bool>) {
        if self.phase == SyncPhase::Idle {
            let _ = waiter.send(true);
        } else {
            self.waiters.push(waiter);
        }
    }

    fn on_debounce_elapsed(&mut self) {
        match self.phase {
            SyncPhase::Publishing => self.queued = true,
            SyncPhase::Retrying => {
                // A fresh write does not wait out the backoff; the retry
                // count carries over.
                self.retry_at = None;
                self.begin_attempt();
            }
            SyncPhase::Idle | SyncPhase::Debouncing => self.begin_attempt(),
        }
    }

    fn begin_attempt(&mut self) {
        let now = Instant::now();
        let gap = self.debounce.max(MIN_PUBLISH_GAP);
        let start_at = match self.last_attempt_at {
            Some(last) if last + gap > now => last + gap,
            _ => now,
        };
        self.last_attempt_at = Some(start_at);

        let publisher = Arc::clone(&self.publisher);
        self.attempt = Some(Attempt(tokio::spawn(async move {
            sleep_until(start_at).await;
            publisher.publish_once().await
        })));
        self.set_phase(SyncPhase::Publishing);
    }

    fn on_attempt_done(&mut self, ok: bool) {
        if ok {
            self.retry_count = 0;
            self.continue_or_settle(true);
            return;
        }

        self.retry_count += 1;
        if self.retry.should_retry(self.retry_count) {
            let delay = self.retry.delay_for_retry(self.retry_count);
            debug!(retry_count = self.retry_count, ?delay, "publish failed, retrying");
            self.retry_at = Some(Instant::now() + delay);
            self.set_phase(SyncPhase::Retrying);
        } else {
            warn!(attempts = self.retry_count, "publish retries exhausted");
            self.retry_count = 0;
            self.resolve_waiters(false);
            self.continue_or_settle(false);
        }
    }

    /// Starts pending work, or goes idle and resolves waiters with `outcome`.
    fn continue_or_settle(&mut self, outcome: bool) {
        if self.queued {
            self.queued = false;
            self.begin_attempt();
        } else if self.debounce_at.is_some() {
            self.set_phase(SyncPhase::Debouncing);
        } else {
            self.set_phase(SyncPhase::Idle);
            self.resolve_waiters(outcome);
        }
    }

    fn resolve_waiters(&mut self, outcome: bool) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(outcome);
        }
    }
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn join_attempt(attempt: &mut Option<Attempt>) -> bool {
    match attempt {
        Some(Attempt(handle)) => match handle.await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(error = %e, "publish attempt aborted");
                false
            }
        },
        None => std::future::pending().await,
    }
}

/// Handle to a running scheduler actor.
pub(crate) struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
    phase: watch::Receiver<SyncPhase>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerHandle {
    pub(crate) fn spawn(publisher: Publisher, debounce: Duration, retry: RetryConfig) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (phase_tx, phase) = watch::channel(SyncPhase::Idle);
        let scheduler = Scheduler {
            publisher: Arc::new(publisher),
            debounce,
            retry,
            phase: SyncPhase::Idle,
            phase_tx,
            queued: false,
            retry_count: 0,
            last_attempt_at: None,
            debounce_at: None,
            retry_at: None,
            attempt: None,
            waiters: Vec::new(),
        };
        let task = tokio::spawn(scheduler.run(receiver));
        Self {
            commands,
            phase,
            task: Mutex::new(Some(task)),
        }
    }

    /// Reports a local write.
    pub(crate) fn schedule(&self) {
        let _ = self.commands.send(Command::Schedule);
    }

    /// Waits for the cycle in flight to finish.
    pub(crate) async fn sync(&self) -> SyncResult<bool> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Sync(tx))
            .map_err(|_| SyncError::Closed)?;
        rx.await.map_err(|_| SyncError::Closed)
    }

    pub(crate) fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    /// Stops the actor without waiting for it.
    pub(crate) fn abort(&self) {
        if let Some(task) = self.task.lock().as_ref() {
            task.abort();
        }
    }

    /// Stops the actor and waits until it is gone. Pending `sync()` calls
    /// resolve with `Closed`.
    pub(crate) async fn shutdown(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }
}
