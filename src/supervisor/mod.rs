//! Process supervisor
//!
//! Starts every registered subsystem as its own task against one shared
//! [`CancellationToken`], waits for all of them to finish, then runs
//! teardown callbacks. The lifecycle is strictly
//! `Idle -> Running -> Draining -> Stopped`:
//!
//! - **Idle**: subsystems and teardown callbacks can be registered
//! - **Running**: subsystems launched, a listener waits for the termination
//!   signal
//! - **Draining**: cancellation triggered, subsystems finishing
//! - **Stopped**: every subsystem joined; teardown may run
//!
//! Cancellation is cooperative. A subsystem must observe the token at its
//! own suspension points and return. A subsystem error is logged where it
//! happens and does not stop its siblings; a subsystem that wants the whole
//! process down cancels the token itself.
//!
//! # Example
//!
//! ```
//! use scratchdata::supervisor::{Lifecycle, Supervisor};
//!
//! # tokio_test::block_on(async {
//! let mut supervisor = Supervisor::new();
//! supervisor.register("ticker", |shutdown| async move {
//!     shutdown.cancelled().await;
//!     Ok(())
//! })?;
//! supervisor.on_stopped(|| async { println!("closing connections") })?;
//! supervisor.start_with_signal(std::future::pending())?;
//!
//! supervisor.shutdown();
//! supervisor.wait().await?;
//! assert_eq!(supervisor.state(), Lifecycle::Stopped);
//! # Ok::<(), scratchdata::ScratchError>(())
//! # }).unwrap();
//! ```

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SupervisorError};

pub mod signal;

pub use signal::shutdown_signal;

/// Supervisor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Idle => write!(f, "idle"),
            Lifecycle::Running => write!(f, "running"),
            Lifecycle::Draining => write!(f, "draining"),
            Lifecycle::Stopped => write!(f, "stopped"),
        }
    }
}

/// A long-running unit of work the supervisor can own
#[async_trait]
pub trait Subsystem: Send + Sync {
    fn name(&self) -> &str;

    /// Run until done or until `shutdown` is cancelled
    async fn run(&self, shutdown: CancellationToken) -> Result<()>;
}

type SubsystemFn = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<()>> + Send>;
type TeardownFn = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Coordinates start and graceful stop of concurrent subsystems
pub struct Supervisor {
    /// Shared cancellation broadcast
    token: CancellationToken,
    /// Current lifecycle state, observable from other tasks
    state: Arc<LifecycleCell>,
    /// Subsystems registered while idle
    pending: Vec<(String, SubsystemFn)>,
    /// Launched subsystem tasks
    tasks: JoinSet<String>,
    /// Termination signal listener
    listener: Option<JoinHandle<()>>,
    /// Callbacks to run once stopped
    teardown: Vec<TeardownFn>,
    /// Subsystems launched by `start`
    launched: usize,
    /// Subsystems that reported completion
    completed: usize,
    /// Abort subsystems still running this long after cancellation
    drain_timeout: Option<Duration>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            state: Arc::new(LifecycleCell::new()),
            pending: Vec::new(),
            tasks: JoinSet::new(),
            listener: None,
            teardown: Vec::new(),
            launched: 0,
            completed: 0,
            drain_timeout: None,
        }
    }

    /// Bound how long `wait` lets subsystems drain after cancellation
    ///
    /// Subsystems still running when the timeout elapses are aborted and
    /// joined before the supervisor reports stopped. Without a timeout, a
    /// subsystem that ignores cancellation stalls `wait` forever.
    pub fn with_drain_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Register a subsystem
    ///
    /// # Arguments
    /// * `name` - Unique name, used in logs
    /// * `subsystem` - Called once with the shared cancellation token
    ///
    /// # Returns
    /// * `Err(SupervisorError)` - Not idle, or the name is taken
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, subsystem: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.expect_state("register", &[Lifecycle::Idle])?;
        let name = name.into();
        if self.pending.iter().any(|(existing, _)| *existing == name) {
            return Err(SupervisorError::DuplicateSubsystem(name).into());
        }
        self.pending
            .push((name, Box::new(move |token| Box::pin(subsystem(token)))));
        Ok(())
    }

    /// Register a trait-object subsystem under its own name
    pub fn register_subsystem(&mut self, subsystem: Arc<dyn Subsystem>) -> Result<()> {
        let name = subsystem.name().to_string();
        self.register(name, move |token| async move { subsystem.run(token).await })
    }

    /// Add a teardown callback
    ///
    /// Callbacks run in registration order, strictly after every subsystem
    /// has been joined.
    pub fn on_stopped<F, Fut>(&mut self, callback: F) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.expect_state(
            "add teardown",
            &[Lifecycle::Idle, Lifecycle::Running, Lifecycle::Draining],
        )?;
        self.teardown.push(Box::new(move || Box::pin(callback())));
        Ok(())
    }

    /// Launch all subsystems, stopping on SIGINT or SIGTERM
    pub fn start(&mut self) -> Result<()> {
        self.start_with_signal(shutdown_signal())
    }

    /// Launch all subsystems, stopping when `signal` completes
    pub fn start_with_signal<S>(&mut self, signal: S) -> Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        self.expect_state("start", &[Lifecycle::Idle])?;
        // Running before anything is spawned, so an early signal can still drain
        self.state.set(Lifecycle::Running);

        for (name, subsystem) in self.pending.drain(..) {
            let token = self.token.clone();
            self.tasks.spawn(async move {
                debug!("Subsystem '{}' started", name);
                match subsystem(token).await {
                    Ok(()) => info!("Subsystem '{}' stopped", name),
                    Err(e) => error!("Subsystem '{}' failed: {}", name, e),
                }
                name
            });
            self.launched += 1;
        }

        let token = self.token.clone();
        let state = self.state.clone();
        self.listener = Some(tokio::spawn(async move {
            tokio::select! {
                _ = signal => {
                    info!("Received termination signal, stopping");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
            state.advance(Lifecycle::Running, Lifecycle::Draining);
        }));

        info!("Supervisor started {} subsystem(s)", self.launched);
        Ok(())
    }

    /// Trigger the shared cancellation; idempotent
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Handle to the shared cancellation token
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> Lifecycle {
        *self.state.sender.borrow()
    }

    /// Observe lifecycle transitions from another task
    ///
    /// Receivers only see the latest state; use [`Supervisor::transitions`]
    /// for the full sequence.
    pub fn subscribe(&self) -> watch::Receiver<Lifecycle> {
        self.state.sender.subscribe()
    }

    /// Every state entered so far, starting with `Idle`
    pub fn transitions(&self) -> Vec<Lifecycle> {
        self.state.history()
    }

    /// Subsystems that have reported completion
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Wait for every subsystem, then run teardown
    ///
    /// Returns once all launched subsystems have reported completion and
    /// every teardown callback has finished. If all subsystems end on their
    /// own, cancellation is triggered anyway so the lifecycle still passes
    /// through draining.
    pub async fn wait(&mut self) -> Result<()> {
        self.expect_state("wait", &[Lifecycle::Running, Lifecycle::Draining])?;

        let token = self.token.clone();
        let drain_timeout = self.drain_timeout;
        let drain_deadline = async move {
            match drain_timeout {
                Some(timeout) => {
                    token.cancelled().await;
                    tokio::time::sleep(timeout).await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(drain_deadline);
        let mut aborted = false;

        loop {
            tokio::select! {
                joined = self.tasks.join_next() => match joined {
                    Some(Ok(name)) => {
                        self.completed += 1;
                        debug!(
                            "Subsystem '{}' joined ({}/{})",
                            name, self.completed, self.launched
                        );
                    }
                    Some(Err(e)) => {
                        self.completed += 1;
                        if e.is_panic() {
                            error!("Subsystem task panicked: {}", e);
                        } else {
                            warn!("Subsystem task aborted: {}", e);
                        }
                    }
                    None => break,
                },
                _ = &mut drain_deadline, if !aborted => {
                    aborted = true;
                    warn!(
                        "Drain timeout elapsed, aborting {} subsystem(s)",
                        self.tasks.len()
                    );
                    self.tasks.abort_all();
                }
            }
        }

        self.token.cancel();
        if let Some(listener) = self.listener.take() {
            if let Err(e) = listener.await {
                warn!("Signal listener ended abnormally: {}", e);
            }
        }
        self.state.advance(Lifecycle::Running, Lifecycle::Draining);
        self.state.set(Lifecycle::Stopped);
        info!("All {} subsystem(s) stopped", self.completed);

        for callback in self.teardown.drain(..) {
            callback().await;
        }
        debug!("Teardown complete");
        Ok(())
    }

    fn expect_state(&self, operation: &'static str, allowed: &[Lifecycle]) -> Result<()> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(SupervisorError::InvalidState { operation, state }.into())
        }
    }
}

/// Lifecycle state shared with the signal listener, plus its history
struct LifecycleCell {
    sender: watch::Sender<Lifecycle>,
    history: Mutex<Vec<Lifecycle>>,
}

impl LifecycleCell {
    fn new() -> Self {
        let (sender, _) = watch::channel(Lifecycle::Idle);
        Self {
            sender,
            history: Mutex::new(vec![Lifecycle::Idle]),
        }
    }

    fn set(&self, to: Lifecycle) {
        self.sender.send_modify(|current| {
            *current = to;
            self.record(to);
        });
    }

    /// Move from `from` to `to`, leaving any other state untouched
    fn advance(&self, from: Lifecycle, to: Lifecycle) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == from {
                *current = to;
                self.record(to);
                true
            } else {
                false
            }
        })
    }

    // Called under the watch lock so history order matches state order
    fn record(&self, state: Lifecycle) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(state);
    }

    fn history(&self) -> Vec<Lifecycle> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use tokio::sync::oneshot;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::error::ScratchError;

    fn no_signal() -> std::future::Pending<()> {
        std::future::pending()
    }

    #[tokio::test]
    async fn test_three_subsystems_complete_once_each() {
        let mut supervisor = Supervisor::new();
        let counts: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();

        for (i, count) in counts.iter().enumerate() {
            let count = count.clone();
            supervisor
                .register(format!("subsystem-{i}"), move |shutdown| async move {
                    // Stagger shutdown so completions interleave
                    shutdown.cancelled().await;
                    tokio::time::sleep(Duration::from_millis(5 * (3 - i as u64))).await;
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }

        supervisor.start_with_signal(no_signal()).unwrap();
        assert_eq!(supervisor.state(), Lifecycle::Running);

        supervisor.shutdown();
        supervisor.wait().await.unwrap();

        assert_eq!(supervisor.state(), Lifecycle::Stopped);
        assert_eq!(supervisor.completed(), 3);
        for count in &counts {
            assert_eq!(count.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_signal_triggers_cancellation() {
        let (tx, rx) = oneshot::channel::<()>();
        let mut supervisor = Supervisor::new();
        supervisor
            .register("waiter", |shutdown| async move {
                shutdown.cancelled().await;
                Ok(())
            })
            .unwrap();
        supervisor
            .start_with_signal(async move {
                let _ = rx.await;
            })
            .unwrap();

        let mut states = supervisor.subscribe();
        tx.send(()).unwrap();
        states
            .wait_for(|s| *s == Lifecycle::Draining)
            .await
            .unwrap();
        assert!(supervisor.cancellation_token().is_cancelled());

        supervisor.wait().await.unwrap();
        assert_eq!(supervisor.state(), Lifecycle::Stopped);
        assert_eq!(
            supervisor.transitions(),
            vec![
                Lifecycle::Idle,
                Lifecycle::Running,
                Lifecycle::Draining,
                Lifecycle::Stopped
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_already_fired_signal_moves_to_draining() {
        for _ in 0..200 {
            let mut supervisor = Supervisor::new();
            supervisor
                .register("waiter", |shutdown| async move {
                    shutdown.cancelled().await;
                    Ok(())
                })
                .unwrap();
            let mut states = supervisor.subscribe();
            supervisor.start_with_signal(async {}).unwrap();

            tokio::time::timeout(
                Duration::from_secs(5),
                states.wait_for(|s| *s == Lifecycle::Draining),
            )
            .await
            .expect("ready signal must reach draining")
            .unwrap();
            assert!(supervisor.cancellation_token().is_cancelled());

            supervisor.wait().await.unwrap();
            assert_eq!(
                supervisor.transitions(),
                vec![
                    Lifecycle::Idle,
                    Lifecycle::Running,
                    Lifecycle::Draining,
                    Lifecycle::Stopped
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_teardown_runs_after_all_subsystems() {
        let running = Arc::new(AtomicUsize::new(0));
        let observed = Arc::new(Mutex::new(None));

        let mut supervisor = Supervisor::new();
        for i in 0..3 {
            let running = running.clone();
            running.fetch_add(1, Ordering::SeqCst);
            supervisor
                .register(format!("worker-{i}"), move |shutdown| async move {
                    shutdown.cancelled().await;
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }

        let (running_at_teardown, observed_state) = (running.clone(), observed.clone());
        let mut states = supervisor.subscribe();
        supervisor
            .on_stopped(move || async move {
                *observed_state.lock().unwrap() = Some(running_at_teardown.load(Ordering::SeqCst));
            })
            .unwrap();

        supervisor.start_with_signal(no_signal()).unwrap();
        supervisor.shutdown();
        supervisor.wait().await.unwrap();

        assert_eq!(*observed.lock().unwrap(), Some(0));
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), Lifecycle::Stopped);
    }

    #[tokio::test]
    async fn test_double_cancellation_is_noop() {
        let teardowns = Arc::new(AtomicUsize::new(0));
        let mut supervisor = Supervisor::new();
        supervisor
            .register("idle", |shutdown| async move {
                shutdown.cancelled().await;
                Ok(())
            })
            .unwrap();
        let counter = teardowns.clone();
        supervisor
            .on_stopped(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        supervisor.start_with_signal(no_signal()).unwrap();

        let a = supervisor.cancellation_token();
        let b = supervisor.cancellation_token();
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.cancel() }),
            tokio::spawn(async move { b.cancel() })
        );
        ra.unwrap();
        rb.unwrap();
        supervisor.shutdown();

        supervisor.wait().await.unwrap();
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.completed(), 1);
    }

    #[tokio::test]
    async fn test_subsystem_error_does_not_stop_siblings() {
        let sibling_saw_cancel_early = Arc::new(AtomicBool::new(false));
        let mut supervisor = Supervisor::new();
        supervisor
            .register("broken", |_shutdown| async move {
                Err(ScratchError::Generic("failed to bind".into()))
            })
            .unwrap();

        let flag = sibling_saw_cancel_early.clone();
        supervisor
            .register("healthy", move |shutdown| async move {
                tokio::select! {
                    _ = shutdown.cancelled() => flag.store(true, Ordering::SeqCst),
                    _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                }
                shutdown.cancelled().await;
                Ok(())
            })
            .unwrap();

        supervisor.start_with_signal(no_signal()).unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(supervisor.state(), Lifecycle::Running);

        supervisor.shutdown();
        supervisor.wait().await.unwrap();
        assert!(!sibling_saw_cancel_early.load(Ordering::SeqCst));
        assert_eq!(supervisor.completed(), 2);
    }

    #[tokio::test]
    async fn test_subsystem_can_request_shutdown() {
        let mut supervisor = Supervisor::new();
        supervisor
            .register("fatal", |shutdown| async move {
                shutdown.cancel();
                Ok(())
            })
            .unwrap();
        supervisor
            .register("follower", |shutdown| async move {
                shutdown.cancelled().await;
                Ok(())
            })
            .unwrap();
        supervisor.start_with_signal(no_signal()).unwrap();
        supervisor.wait().await.unwrap();
        assert_eq!(supervisor.completed(), 2);
    }

    #[tokio::test]
    async fn test_natural_completion_still_cancels() {
        let mut supervisor = Supervisor::new();
        supervisor.register("oneshot", |_| async { Ok(()) }).unwrap();

        supervisor.start_with_signal(no_signal()).unwrap();
        supervisor.wait().await.unwrap();

        assert_eq!(
            supervisor.transitions(),
            vec![
                Lifecycle::Idle,
                Lifecycle::Running,
                Lifecycle::Draining,
                Lifecycle::Stopped
            ]
        );
        assert!(supervisor.cancellation_token().is_cancelled());
        assert_eq!(supervisor.completed(), 1);
    }

    #[tokio::test]
    async fn test_panicking_subsystem_counts_as_completed() {
        let mut supervisor = Supervisor::new();
        supervisor
            .register("panics", |_| async {
                let fail = true;
                if fail {
                    panic!("boom");
                }
                Ok(())
            })
            .unwrap();
        supervisor.start_with_signal(no_signal()).unwrap();
        supervisor.wait().await.unwrap();
        assert_eq!(supervisor.completed(), 1);
    }

    #[tokio::test]
    async fn test_drain_timeout_aborts_stuck_subsystem() {
        let teardown_ran = Arc::new(AtomicBool::new(false));
        let mut supervisor = Supervisor::new().with_drain_timeout(Some(Duration::from_millis(20)));
        supervisor
            .register("stuck", |_shutdown| async move {
                std::future::pending::<()>().await;
                Ok(())
            })
            .unwrap();
        let flag = teardown_ran.clone();
        supervisor
            .on_stopped(move || async move { flag.store(true, Ordering::SeqCst) })
            .unwrap();

        supervisor.start_with_signal(no_signal()).unwrap();
        supervisor.shutdown();
        tokio::time::timeout(Duration::from_secs(5), supervisor.wait())
            .await
            .expect("wait must finish after the drain timeout")
            .unwrap();

        assert!(teardown_ran.load(Ordering::SeqCst));
        assert_eq!(supervisor.completed(), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_misuse() {
        let mut supervisor = Supervisor::new();
        supervisor.register("a", |_| async { Ok(()) }).unwrap();

        let err = supervisor.register("a", |_| async { Ok(()) }).unwrap_err();
        assert!(matches!(
            err,
            ScratchError::Supervisor(SupervisorError::DuplicateSubsystem(_))
        ));

        let err = supervisor.wait().await.unwrap_err();
        assert!(matches!(
            err,
            ScratchError::Supervisor(SupervisorError::InvalidState {
                state: Lifecycle::Idle,
                ..
            })
        ));

        assert_ok!(supervisor.start_with_signal(no_signal()));
        assert_err!(supervisor.start_with_signal(no_signal()));
        assert_err!(supervisor.register("b", |_| async { Ok(()) }));

        assert_ok!(supervisor.wait().await);
        assert_err!(supervisor.on_stopped(|| async {}));
        assert_err!(supervisor.wait().await);
    }

    struct Echo {
        ran: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Subsystem for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn run(&self, shutdown: CancellationToken) -> Result<()> {
            self.ran.store(true, Ordering::SeqCst);
            shutdown.cancelled().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_register_trait_subsystem() {
        let ran = Arc::new(AtomicBool::new(false));
        let mut supervisor = Supervisor::new();
        supervisor
            .register_subsystem(Arc::new(Echo { ran: ran.clone() }))
            .unwrap();
        assert!(supervisor.register("echo", |_| async { Ok(()) }).is_err());

        supervisor.start_with_signal(no_signal()).unwrap();
        tokio::task::yield_now().await;
        supervisor.shutdown();
        supervisor.wait().await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }
}
