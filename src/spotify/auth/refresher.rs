use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::logging::DiagnosticLog;
use crate::spotify::{CredentialSet, CredentialStore, TOKEN_URL};

use super::TokenClient;

/// Read side of the live credential set.
///
/// Handles are cheap to clone and never wait on the network; a read returns
/// either the set before a refresh or the set after it, never a mix.
#[derive(Debug, Clone)]
pub struct CredentialHandle(Arc<RwLock<CredentialSet>>);

impl CredentialHandle {
    fn new(credentials: CredentialSet) -> Self {
        Self(Arc::new(RwLock::new(credentials)))
    }

    pub fn current(&self) -> CredentialSet {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn access_token(&self) -> String {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token
            .clone()
    }

    fn replace(&self, credentials: CredentialSet) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = credentials;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// Loaded but no exchange attempted yet
    Uninitialized,
    Refreshing,
    /// Last exchange succeeded
    Ready,
    /// Last exchange failed; the previous token is still served
    Degraded,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed { persisted: bool },
    Failed,
    /// Another exchange was already in flight, or the refresher is stopping
    Skipped,
}

#[derive(Debug, Clone)]
pub struct RefresherOptions {
    pub token_url: String,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for RefresherOptions {
    fn default() -> Self {
        Self {
            token_url: TOKEN_URL.to_string(),
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(10),
        }
    }
}

struct Inner {
    store: CredentialStore,
    credentials: CredentialHandle,
    client: TokenClient,
    diagnostics: DiagnosticLog,
    state: Mutex<RefreshState>,
    in_flight: tokio::sync::Mutex<()>,
    stopped: AtomicBool,
    interval: Duration,
}

impl Inner {
    fn set_state(&self, state: RefreshState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn record_failure(&self, err: &Error) {
        let body = match err {
            Error::Exchange { body, .. } => body.as_deref(),
            _ => None,
        };
        log::error!(
            "Something went wrong when updating the credentials ({err}). See `{}` for details",
            self.diagnostics.path().display()
        );
        self.diagnostics.record_or_warn(err, body);
    }

    async fn refresh(&self) -> RefreshOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            log::debug!("token exchange already in flight; skipping");
            return RefreshOutcome::Skipped;
        };
        if self.is_stopped() {
            return RefreshOutcome::Skipped;
        }

        self.set_state(RefreshState::Refreshing);
        let current = self.credentials.current();
        let result = self.client.exchange(&current).await;
        // `stop` waits on `in_flight`; nothing commits once it has been called
        if self.is_stopped() {
            log::debug!("refresher stopped during exchange; discarding the result");
            return RefreshOutcome::Skipped;
        }

        match result {
            Ok(token) => {
                let updated = token.apply(&current);
                // Committed even when the write fails
                let persisted = match self.store.persist(&updated) {
                    Ok(()) => true,
                    Err(err) => {
                        log::error!("{err}; the rotated token only lives in memory until the next successful write");
                        self.diagnostics.record_or_warn(&err, None);
                        false
                    }
                };
                self.credentials.replace(updated);
                self.set_state(RefreshState::Ready);
                log::info!("Updated credentials");
                RefreshOutcome::Refreshed { persisted }
            }
            Err(err) => {
                self.record_failure(&err);
                self.set_state(RefreshState::Degraded);
                RefreshOutcome::Failed
            }
        }
    }
}

struct Timer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Keeps the access token fresh by exchanging it on a fixed interval.
///
/// The refresher is the only writer of the credential set. Request handlers
/// read it through a [`CredentialHandle`].
pub struct TokenRefresher {
    inner: Arc<Inner>,
    timer: Mutex<Option<Timer>>,
}

impl TokenRefresher {
    pub fn new(
        store: CredentialStore,
        credentials: CredentialSet,
        diagnostics: DiagnosticLog,
        options: RefresherOptions,
    ) -> Result<Self, Error> {
        let client = TokenClient::new(options.token_url, options.timeout)?;
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                credentials: CredentialHandle::new(credentials),
                client,
                diagnostics,
                state: Mutex::new(RefreshState::Uninitialized),
                in_flight: tokio::sync::Mutex::new(()),
                stopped: AtomicBool::new(false),
                interval: options.interval,
            }),
            timer: Mutex::new(None),
        })
    }

    /// Load the credential set from `store` and build a refresher around it.
    ///
    /// Load errors are fatal and returned as is.
    pub fn load(store: CredentialStore, diagnostics: DiagnosticLog, options: RefresherOptions) -> Result<Self, Error> {
        let credentials = store.load()?;
        Self::new(store, credentials, diagnostics, options)
    }

    pub fn handle(&self) -> CredentialHandle {
        self.inner.credentials.clone()
    }

    pub fn credentials(&self) -> CredentialSet {
        self.inner.credentials.current()
    }

    pub fn state(&self) -> RefreshState {
        *self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|timer| !timer.handle.is_finished())
    }

    /// Run one exchange now. Returns [`RefreshOutcome::Skipped`] when an
    /// exchange is already in flight or the refresher has been stopped.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.inner.refresh().await
    }

    /// Arm the refresh timer. The first exchange runs immediately.
    ///
    /// Returns `false` without doing anything if the timer is already armed.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if timer.as_ref().is_some_and(|timer| !timer.handle.is_finished()) {
            log::warn!("token refresher is already running");
            return false;
        }

        self.inner.stopped.store(false, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(self.inner.clone(), cancel.clone()));
        *timer = Some(Timer { cancel, handle });
        log::debug!("token refresher armed, interval {:?}", self.inner.interval);
        true
    }

    /// Disarm the timer and wait for the loop and any on-demand exchange to
    /// finish. An exchange still in flight is abandoned before it commits
    /// anything, and later calls to [`refresh`](Self::refresh) are skipped
    /// until the timer is armed again.
    ///
    /// Returns `false` if the timer was not armed.
    pub async fn stop(&self) -> bool {
        self.inner.stopped.store(true, Ordering::SeqCst);
        let timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner).take();

        let armed = match timer {
            Some(Timer { cancel, handle }) => {
                cancel.cancel();
                if let Err(err) = handle.await {
                    if !err.is_cancelled() {
                        log::error!("token refresher exited abnormally: {err}");
                    }
                }
                true
            }
            None => false,
        };

        let _guard = self.inner.in_flight.lock().await;
        self.inner.set_state(RefreshState::Stopped);
        if armed {
            log::debug!("token refresher stopped");
        }
        armed
    }
}

impl Drop for TokenRefresher {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            timer.cancel.cancel();
        }
    }
}

async fn run(inner: Arc<Inner>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(inner.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = AssertUnwindSafe(inner.refresh()).catch_unwind() => {
                if result.is_err() && !inner.is_stopped() {
                    inner.record_failure(&Error::exchange("token refresh panicked"));
                    inner.set_state(RefreshState::Degraded);
                }
            }
        }
    }
}
