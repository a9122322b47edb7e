use std::{
    fmt::Debug,
    sync::{Arc, Mutex, MutexGuard},
};

type Observer = Box<dyn Fn(bool) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-flight request counter driving the global loading signal.
///
/// `true` is emitted exactly on the 0 -> 1 transition, `false` exactly on 1 -> 0.
/// The observer list lock is held for the whole transition, so notifications
/// never interleave, while the counter lock is released before observers run.
/// Observers may read the counter but must not start requests or subscribe.
#[derive(Clone, Default)]
pub(crate) struct LoadingTracker {
    active: Arc<Mutex<usize>>,
    observers: Arc<Mutex<Vec<Observer>>>,
}

impl Debug for LoadingTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingTracker")
            .field("active", &self.active())
            .finish()
    }
}

impl LoadingTracker {
    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        lock(&self.observers).push(Box::new(observer));
    }

    pub fn active(&self) -> usize {
        *lock(&self.active)
    }

    /// Apply `change` to the counter, then notify observers if it reports an edge
    fn transition<F>(&self, change: F)
    where
        F: FnOnce(&mut usize) -> Option<bool>,
    {
        let observers = lock(&self.observers);

        let edge = {
            let mut active = lock(&self.active);
            change(&mut active)
        };

        if let Some(loading) = edge {
            log::trace!("Loading changed to {}", loading);
            observers.iter().for_each(|observer| observer(loading));
        }
    }

    /// Count a request as started, the returned guard counts it as finished when dropped.
    pub fn begin(&self) -> LoadingGuard {
        self.transition(|active| {
            *active += 1;
            (*active == 1).then_some(true)
        });
        LoadingGuard {
            tracker: self.clone(),
        }
    }

    fn end(&self) {
        self.transition(|active| {
            *active = active.saturating_sub(1);
            (*active == 0).then_some(false)
        });
    }
}

#[derive(Debug)]
pub(crate) struct LoadingGuard {
    tracker: LoadingTracker,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.tracker.end();
    }
}
