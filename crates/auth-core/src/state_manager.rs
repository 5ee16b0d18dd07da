//! Owner of the current session state
//!
//! The [`StateManager`] holds exactly one [`State`] at a time and is the only
//! component allowed to replace it. Every replacement is published on a
//! broadcast channel, stamped with a generation number, so any number of
//! waiters can observe the same sequence of states.
//!
//! # Waiting for states
//!
//! ```rust
//! use std::sync::Arc;
//! use warden_auth_core::{Context, StateFilter, StateKind, StateManager};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let manager = Arc::new(StateManager::new(16, 8));
//!
//! let waiter = {
//!     let manager = manager.clone();
//!     let mut subscription = manager.subscribe();
//!     tokio::spawn(async move { subscription.next_matching(&StateFilter::stable()).await })
//! };
//!
//! manager.push_authorizing_state(None);
//! manager.push_authorized_state(Context::Anonymous);
//!
//! let state = waiter.await.unwrap().unwrap();
//! assert_eq!(state.kind(), StateKind::Authorized);
//! # }
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::context::Context;
use crate::error::{AuthError, Result};
use crate::permit::Permit;
use crate::state::{State, StateFilter, StateTransition};

struct Current {
    generation: u64,
    state: Arc<State>,
}

/// Holder and publisher of the single current [`State`]
pub struct StateManager {
    current: Arc<RwLock<Current>>,
    tx: broadcast::Sender<StateTransition>,
    history: Mutex<VecDeque<StateTransition>>,
    history_capacity: usize,
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.current.read();
        f.debug_struct("StateManager")
            .field("generation", &current.generation)
            .field("state", &current.state.kind())
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new(64, 16)
    }
}

impl StateManager {
    /// Create a manager starting in `Unauthorized`
    ///
    /// `channel_capacity` bounds how far a slow subscriber may fall behind
    /// before skipping states; `history_capacity` bounds the audit log.
    pub fn new(channel_capacity: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            current: Arc::new(RwLock::new(Current {
                generation: 0,
                state: Arc::new(State::Unauthorized),
            })),
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
        }
    }

    /// Current snapshot
    pub fn state(&self) -> Arc<State> {
        self.current.read().state.clone()
    }

    /// Number of states published so far
    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    /// Committed context, if the current state is `Authorized`
    pub fn context(&self) -> Option<Context> {
        self.current.read().state.context().cloned()
    }

    pub fn push_authorized_state(&self, context: Context) {
        self.publish(State::Authorized { context });
    }

    pub fn push_unauthorized_state(&self) {
        self.publish(State::Unauthorized);
    }

    pub fn push_authorizing_state(&self, transient_permit: Option<Permit>) {
        self.publish(State::Authorizing { transient_permit });
    }

    /// Atomically replace the current state and notify subscribers
    fn publish(&self, state: State) {
        let mut current = self.current.write();
        let previous = current.state.kind();
        let generation = current.generation + 1;
        let state = Arc::new(state);

        current.generation = generation;
        current.state = state.clone();

        let transition = StateTransition {
            generation,
            state,
            at: Utc::now(),
        };

        {
            let mut history = self.history.lock();
            if self.history_capacity > 0 {
                if history.len() == self.history_capacity {
                    history.pop_front();
                }
                history.push_back(transition.clone());
            }
        }

        debug!(
            from = %previous,
            to = %transition.state.kind(),
            generation,
            "Session state changed"
        );

        // Sent under the write lock so subscribers see pushes in generation order.
        // No receivers is fine: nobody is waiting.
        let _ = self.tx.send(transition);
    }

    /// Subscribe to every state published after this call
    pub fn subscribe(&self) -> StateSubscription {
        let current = self.current.read();
        StateSubscription {
            rx: self.tx.subscribe(),
            since: current.generation,
            current: self.current.clone(),
        }
    }

    /// Suspend until a state matching `filter` is published
    ///
    /// Only states pushed after the call count, the current one never does.
    /// The subscription is taken here, not on first poll, so a push between
    /// the call and the first poll is still observed.
    pub fn wait_for_next_state(
        &self,
        filter: &StateFilter,
    ) -> impl Future<Output = Result<Arc<State>>> + Send + 'static {
        let mut subscription = self.subscribe();
        let filter = filter.clone();
        async move { subscription.next_matching(&filter).await }
    }

    /// Most recent transitions, oldest first
    pub fn history(&self) -> Vec<StateTransition> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A position in the state stream
///
/// Created by [`StateManager::subscribe`]; yields every state published
/// after that point. A subscriber that falls behind the channel capacity
/// skips states but never misses the current one.
pub struct StateSubscription {
    rx: broadcast::Receiver<StateTransition>,
    since: u64,
    current: Arc<RwLock<Current>>,
}

impl std::fmt::Debug for StateSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSubscription")
            .field("since", &self.since)
            .finish_non_exhaustive()
    }
}

impl StateSubscription {
    /// Generation that was current when the subscription was taken
    pub fn since(&self) -> u64 {
        self.since
    }

    /// Next published state whose kind matches `filter`
    ///
    /// The stream never ends while its manager is alive, so a closed channel
    /// is reported as an `InternalError`.
    pub async fn next_matching(&mut self, filter: &StateFilter) -> Result<Arc<State>> {
        loop {
            match self.rx.recv().await {
                Ok(transition) => {
                    if transition.generation <= self.since {
                        continue;
                    }
                    self.since = transition.generation;
                    if filter.matches(transition.state.kind()) {
                        return Ok(transition.state);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "State subscriber fell behind, skipping states");
                    // Jump to the current state if it is what we wait for;
                    // buffered transitions up to it are then ignored.
                    let (generation, state) = {
                        let current = self.current.read();
                        (current.generation, current.state.clone())
                    };
                    if generation > self.since && filter.matches(state.kind()) {
                        self.since = generation;
                        return Ok(state);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    error!("State stream terminated while a subscriber was waiting");
                    return Err(AuthError::internal("state stream terminated"));
                }
            }
        }
    }
}
