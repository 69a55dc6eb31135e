use std::future::Future;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::dispatch::EventDispatcher;
use super::events::{ChatEvent, Platform};
use super::state::{ConnectionState, StateCell};

/// A running platform loop and the signal that stops it
pub struct Session {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl Session {
    /// Spawn `body` with its own shutdown notifier
    pub fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(Arc<Notify>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(body(shutdown.clone()));
        Self { shutdown, task }
    }

    /// Wake the loop and wait for it to exit
    pub async fn stop(self) {
        // notify_one stores a permit, so a loop that is not parked yet still sees it
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            log::error!("Chat loop panicked: {}", e);
        }
    }
}

/// Lifecycle bookkeeping shared by the Twitch and YouTube connections.
///
/// Runs in the caller's context, which may be the consumer itself, so its
/// notifications never wait for queue space.
pub struct Lifecycle {
    pub platform: Platform,
    pub state: Arc<StateCell>,
    pub dispatcher: EventDispatcher,
}

impl Lifecycle {
    pub fn new(platform: Platform, dispatcher: EventDispatcher) -> Self {
        Self {
            platform,
            state: Arc::new(StateCell::default()),
            dispatcher,
        }
    }

    pub fn enter(&self, state: ConnectionState) {
        self.state.set(state);
        self.dispatcher.try_state(self.platform, state);
    }

    /// Drop the previous session and enter Connecting. Only a session that is
    /// still live passes through Reconnecting.
    pub async fn begin(&self, session: &mut Option<Session>) {
        if let Some(old) = session.take() {
            if self.state.get().is_active() {
                self.enter(ConnectionState::Reconnecting);
            }
            old.stop().await;
        }
        self.enter(ConnectionState::Connecting);
    }

    /// Connected, plus the user-facing notification
    pub fn connected(&self, message: String) {
        self.enter(ConnectionState::Connected);
        self.dispatcher.try_system(self.platform, message);
    }

    pub fn fail(&self, error: &impl std::fmt::Display) {
        log::error!("{} connection failed: {}", self.platform, error);
        self.enter(ConnectionState::Failed);
    }

    /// User-initiated disconnect. Reports once; a no-op when nothing is running.
    pub async fn end(&self, session: &mut Option<Session>, message: &str) {
        let was_active = [
            ConnectionState::Connected,
            ConnectionState::Connecting,
            ConnectionState::Reconnecting,
        ]
        .into_iter()
        .any(|from| self.state.transition(from, ConnectionState::Disconnected));

        if let Some(old) = session.take() {
            old.stop().await;
        }

        if was_active {
            self.dispatcher.try_system(self.platform, message);
            self.dispatcher
                .try_state(self.platform, ConnectionState::Disconnected);
        } else if self
            .state
            .transition(ConnectionState::Failed, ConnectionState::Disconnected)
        {
            self.dispatcher
                .try_state(self.platform, ConnectionState::Disconnected);
        }
    }
}

/// Owned by a loop task. Every send it makes gives up as soon as the
/// session is asked to stop, so a consumer that is not draining the queue
/// can still call `disconnect`.
pub struct LoopReporter {
    platform: Platform,
    state: Arc<StateCell>,
    dispatcher: EventDispatcher,
    shutdown: Arc<Notify>,
}

impl LoopReporter {
    pub fn new(lifecycle: &Lifecycle, shutdown: Arc<Notify>) -> Self {
        Self {
            platform: lifecycle.platform,
            state: lifecycle.state.clone(),
            dispatcher: lifecycle.dispatcher.clone(),
            shutdown,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.get() == ConnectionState::Connected
    }

    /// Resolves once the session is asked to stop
    pub async fn stopped(&self) {
        self.shutdown.notified().await;
    }

    /// Dispatch a chat event. `false` means the session was stopped while
    /// waiting for queue space.
    pub async fn chat(&self, event: ChatEvent) -> bool {
        tokio::select! {
            _ = self.stopped() => false,
            _ = self.dispatcher.chat(event) => true,
        }
    }

    /// Dispatch a system notification, with the same stop semantics as `chat`
    pub async fn system(&self, message: String) -> bool {
        tokio::select! {
            _ = self.stopped() => false,
            _ = self.dispatcher.system(self.platform, message) => true,
        }
    }

    /// A loop that stopped on its own reports `cause` once. If a concurrent
    /// `disconnect` already moved the state, it stays silent.
    pub async fn finish(&self, cause: Option<String>) {
        let Some(cause) = cause else {
            log::debug!("{} loop stopped", self.platform);
            return;
        };

        log::warn!("{} loop ended: {}", self.platform, cause);
        if !self
            .state
            .transition(ConnectionState::Connected, ConnectionState::Disconnected)
        {
            return;
        }

        let report = async {
            self.dispatcher.system(self.platform, cause).await;
            self.dispatcher
                .state(self.platform, ConnectionState::Disconnected)
                .await;
        };
        tokio::select! {
            _ = self.stopped() => log::debug!("{} end report abandoned", self.platform),
            _ = report => {}
        }
    }
}
