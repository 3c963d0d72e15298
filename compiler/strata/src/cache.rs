//! Single-flight cache cells.
//!
//! Each key moves through `NotLoaded -> Loading -> Resolved`. Failures are
//! never stored: the slot is evicted and the next request starts over.
//!
//! While a key is `Loading`:
//! - other threads block on the in-flight computation and share its result
//! - the owning thread (re-entrant access) gets the placeholder the loader
//!   published, or the cycle error when there is none yet
//! - a thread whose wait would close a wait-for cycle across threads is
//!   treated like a re-entrant caller instead of blocking forever

use std::hash::Hash;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

enum FlightState<V, E> {
    Running,
    Done(Result<V, E>),
    /// The loader unwound without finishing.
    Abandoned,
}

struct Flight<V, E> {
    owner: ThreadId,
    placeholder: Mutex<Option<V>>,
    state: Mutex<FlightState<V, E>>,
    done: Condvar,
}

impl<V: Clone, E: Clone> Flight<V, E> {
    fn finish(&self, state: FlightState<V, E>) {
        *self.state.lock() = state;
        self.done.notify_all();
    }

    /// Block until the loader finishes; `None` when it was abandoned.
    fn wait(&self) -> Option<Result<V, E>> {
        let mut state = self.state.lock();
        loop {
            match &*state {
                FlightState::Running => self.done.wait(&mut state),
                FlightState::Done(result) => return Some(result.clone()),
                FlightState::Abandoned => return None,
            }
        }
    }
}

enum Slot<V, E> {
    Loading(Arc<Flight<V, E>>),
    Ready(V),
}

struct Slots<K, V, E> {
    slots: FxHashMap<K, Slot<V, E>>,
    /// Which key each blocked thread is waiting for.
    waiting: FxHashMap<ThreadId, K>,
}

/// Handle given to a loader to publish its in-progress value.
pub struct Pending<'a, V, E> {
    flight: &'a Flight<V, E>,
}

impl<V, E> Pending<'_, V, E> {
    /// Make `value` visible to re-entrant callers before loading finishes.
    pub fn publish(&self, value: V) {
        *self.flight.placeholder.lock() = Some(value);
    }
}

/// A map of single-flight cells.
pub struct SingleFlight<K, V, E> {
    inner: Mutex<Slots<K, V, E>>,
}

impl<K, V, E> Default for SingleFlight<K, V, E> {
    fn default() -> Self {
        SingleFlight {
            inner: Mutex::new(Slots {
                slots: FxHashMap::default(),
                waiting: FxHashMap::default(),
            }),
        }
    }
}

enum Claim<V, E> {
    Hit(V),
    Reentrant(Option<V>),
    Wait(Arc<Flight<V, E>>),
    Load(Arc<Flight<V, E>>),
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Clone + Eq + Hash,
    V: Clone,
    E: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, or run `load` exactly once across
    /// all concurrent callers.
    pub fn get_or_try_init<F>(&self, key: &K, cycle: impl Fn() -> E, load: F) -> Result<V, E>
    where
        F: FnOnce(&Pending<'_, V, E>) -> Result<V, E>,
    {
        let mut load = Some(load);
        loop {
            match self.claim(key) {
                Claim::Hit(value) => return Ok(value),
                Claim::Reentrant(placeholder) => return placeholder.ok_or_else(&cycle),
                Claim::Wait(flight) => {
                    let result = flight.wait();
                    self.inner.lock().waiting.remove(&thread::current().id());
                    if let Some(result) = result {
                        return result;
                    }
                }
                Claim::Load(flight) => {
                    let Some(load) = load.take() else {
                        return Err(cycle());
                    };
                    return self.run(key, &flight, load);
                }
            }
        }
    }

    fn claim(&self, key: &K) -> Claim<V, E> {
        let me = thread::current().id();
        let mut inner = self.inner.lock();
        match inner.slots.get(key) {
            Some(Slot::Ready(value)) => Claim::Hit(value.clone()),
            Some(Slot::Loading(flight)) => {
                if flight.owner == me || inner.would_deadlock(flight.owner, me) {
                    return Claim::Reentrant(flight.placeholder.lock().clone());
                }
                let flight = Arc::clone(flight);
                inner.waiting.insert(me, key.clone());
                Claim::Wait(flight)
            }
            None => {
                let flight = Arc::new(Flight {
                    owner: me,
                    placeholder: Mutex::new(None),
                    state: Mutex::new(FlightState::Running),
                    done: Condvar::new(),
                });
                inner
                    .slots
                    .insert(key.clone(), Slot::Loading(Arc::clone(&flight)));
                Claim::Load(flight)
            }
        }
    }

    fn run<F>(&self, key: &K, flight: &Arc<Flight<V, E>>, load: F) -> Result<V, E>
    where
        F: FnOnce(&Pending<'_, V, E>) -> Result<V, E>,
    {
        let mut guard = AbandonGuard {
            cache: self,
            key,
            flight,
            armed: true,
        };
        let result = load(&Pending { flight: flight.as_ref() });
        guard.armed = false;

        {
            let mut inner = self.inner.lock();
            let ours = matches!(
                inner.slots.get(key),
                Some(Slot::Loading(current)) if Arc::ptr_eq(current, flight)
            );
            if ours {
                match &result {
                    Ok(value) => {
                        inner.slots.insert(key.clone(), Slot::Ready(value.clone()));
                    }
                    Err(_) => {
                        inner.slots.remove(key);
                    }
                }
            }
        }
        flight.finish(FlightState::Done(result.clone()));
        result
    }

    /// The cached value, if resolved.
    pub fn get(&self, key: &K) -> Option<V> {
        match self.inner.lock().slots.get(key) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Evict `key`, returning the resolved value it held.
    ///
    /// Evicting a key that is still loading detaches the in-flight load: its
    /// result is handed to current waiters but not cached.
    pub fn invalidate(&self, key: &K) -> Option<V> {
        match self.inner.lock().slots.remove(key)? {
            Slot::Ready(value) => Some(value),
            Slot::Loading(_) => None,
        }
    }

    pub fn clear(&self) {
        self.inner.lock().slots.clear();
    }

    /// Keys with a resolved value.
    pub fn keys(&self) -> Vec<K> {
        self.inner
            .lock()
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash, V, E> Slots<K, V, E> {
    /// Whether `owner` is, through a chain of waits, blocked on `me`.
    fn would_deadlock(&self, owner: ThreadId, me: ThreadId) -> bool {
        let mut current = owner;
        // Each thread waits on at most one key, so the chain is bounded.
        for _ in 0..=self.waiting.len() {
            let Some(key) = self.waiting.get(&current) else {
                return false;
            };
            let Some(Slot::Loading(flight)) = self.slots.get(key) else {
                return false;
            };
            if flight.owner == me {
                return true;
            }
            current = flight.owner;
        }
        false
    }
}

/// Evicts and releases waiters if the loader unwinds.
struct AbandonGuard<'a, K: Clone + Eq + Hash, V: Clone, E: Clone> {
    cache: &'a SingleFlight<K, V, E>,
    key: &'a K,
    flight: &'a Arc<Flight<V, E>>,
    armed: bool,
}

impl<K: Clone + Eq + Hash, V: Clone, E: Clone> Drop for AbandonGuard<'_, K, V, E> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut inner = self.cache.inner.lock();
            if matches!(
                inner.slots.get(self.key),
                Some(Slot::Loading(current)) if Arc::ptr_eq(current, self.flight)
            ) {
                inner.slots.remove(self.key);
            }
        }
        self.flight.finish(FlightState::Abandoned);
    }
}
