use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct State {
    refreshing: bool,
    waiters: VecDeque<oneshot::Sender<bool>>,
}

/// Makes sure at most one token refresh is in flight.
///
/// The first caller becomes the leader and performs the refresh, every caller
/// arriving while it runs is queued and receives the leader's outcome, in
/// arrival order.
#[derive(Debug, Clone, Default)]
pub(crate) struct RefreshCoordinator {
    state: Arc<Mutex<State>>,
}

#[derive(Debug)]
pub(crate) enum Role {
    /// do the refresh, then report through the ticket
    Leader(Ticket),
    /// wait the leader; a closed channel means the leader was cancelled
    Waiter(oneshot::Receiver<bool>),
}

impl RefreshCoordinator {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn join(&self) -> Role {
        let mut state = self.lock();
        if state.refreshing {
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            log::trace!("Refresh in flight, queued as waiter {}", state.waiters.len());
            Role::Waiter(rx)
        } else {
            state.refreshing = true;
            log::trace!("No refresh in flight, become leader");
            Role::Leader(Ticket {
                coordinator: self.clone(),
                finished: false,
            })
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }

    pub fn queued(&self) -> usize {
        self.lock().waiters.len()
    }

    fn drain(&self) -> VecDeque<oneshot::Sender<bool>> {
        let mut state = self.lock();
        state.refreshing = false;
        std::mem::take(&mut state.waiters)
    }
}

/// Proof of leadership, must be finished with the refresh outcome.
///
/// Dropping an unfinished ticket releases leadership and closes every waiter
/// channel, so waiters join again and one of them takes over.
#[derive(Debug)]
pub(crate) struct Ticket {
    coordinator: RefreshCoordinator,
    finished: bool,
}

impl Ticket {
    /// Report outcome to every queued waiter in FIFO order, returns how many were woken
    pub fn finish(mut self, refreshed: bool) -> usize {
        self.finished = true;
        let waiters = self.coordinator.drain();
        let count = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(refreshed);
        }
        count
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if !self.finished {
            log::debug!("Refresh leader cancelled, release waiters");
            drop(self.coordinator.drain());
        }
    }
}
