//! LazyCell - per-key single-execution state machine
//!
//! A cell moves `Empty -> Running -> Ready(value)` at most once. Only the
//! caller that claims the `Running` state executes its factory; every other
//! caller parks on the condvar until the cell settles. A failed or panicking
//! factory puts the cell back to `Empty` so a later caller can retry.

use std::convert::Infallible;
use std::fmt;

use parking_lot::{Condvar, Mutex};

enum State<V> {
    Empty,
    Running,
    Ready(V),
}

impl<V> State<V> {
    fn name(&self) -> &'static str {
        match self {
            State::Empty => "Empty",
            State::Running => "Running",
            State::Ready(_) => "Ready",
        }
    }
}

/// Deferred, memoized value shared by every caller of the same cache slot
pub struct LazyCell<V> {
    state: Mutex<State<V>>,
    settled: Condvar,
}

impl<V: Clone> LazyCell<V> {
    /// Create a cell with no value and no computation in flight
    pub fn new() -> Self {
        Self::with_state(State::Empty)
    }

    /// Create a cell that already holds `value`
    pub fn ready(value: V) -> Self {
        Self::with_state(State::Ready(value))
    }

    /// Create a cell already claimed by the caller.
    ///
    /// The caller must follow up with [`LazyCell::run`], otherwise every
    /// other caller of this cell waits forever.
    pub(crate) fn claimed() -> Self {
        Self::with_state(State::Running)
    }

    fn with_state(state: State<V>) -> Self {
        Self {
            state: Mutex::new(state),
            settled: Condvar::new(),
        }
    }

    /// True once a value has been stored
    pub fn is_computed(&self) -> bool {
        matches!(*self.state.lock(), State::Ready(_))
    }

    /// Current value without waiting on an in-flight computation
    pub fn get(&self) -> Option<V> {
        match &*self.state.lock() {
            State::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Wait for an in-flight computation to settle, then return its value.
    ///
    /// Returns `None` if the cell is empty, including when the computation
    /// being waited on failed. Never starts a computation.
    pub fn wait(&self) -> Option<V> {
        let mut state = self.state.lock();
        loop {
            match &*state {
                State::Ready(value) => return Some(value.clone()),
                State::Empty => return None,
                State::Running => {}
            }
            self.settled.wait(&mut state);
        }
    }

    /// Return the stored value, computing it with `factory` if the cell is empty
    pub fn get_or_init(&self, factory: impl FnOnce() -> V) -> V {
        match self.get_or_try_init(|| Ok::<_, Infallible>(factory())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Fallible variant of [`LazyCell::get_or_init`].
    ///
    /// An error is handed to this caller only; the cell returns to `Empty`.
    pub fn get_or_try_init<E>(&self, factory: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        {
            let mut state = self.state.lock();
            loop {
                match &*state {
                    State::Ready(value) => return Ok(value.clone()),
                    State::Empty => break,
                    State::Running => {}
                }
                self.settled.wait(&mut state);
            }
            *state = State::Running;
        }
        self.run(factory)
    }

    /// Execute `factory` on a cell this caller holds in the `Running` state
    pub(crate) fn run<E>(&self, factory: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        let mut guard = SettleGuard { cell: self, value: None };
        let result = factory();
        if let Ok(value) = &result {
            guard.value = Some(value.clone());
        }
        drop(guard);
        result
    }
}

impl<V> LazyCell<V> {
    /// Move an empty cell to `Running`, making the caller its owner.
    ///
    /// Returns false if the cell is already running or holds a value. A
    /// successful claim must be followed by [`LazyCell::run`].
    pub(crate) fn try_claim(&self) -> bool {
        let mut state = self.state.lock();
        if matches!(*state, State::Empty) {
            *state = State::Running;
            true
        } else {
            false
        }
    }

    /// True if the cell holds no value and nobody is computing one
    pub(crate) fn is_idle(&self) -> bool {
        matches!(*self.state.lock(), State::Empty)
    }
}

impl<V: Clone> Default for LazyCell<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for LazyCell<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyCell")
            .field("state", &self.state.lock().name())
            .finish()
    }
}

/// Publishes the outcome of a claimed computation, also on unwind
struct SettleGuard<'a, V> {
    cell: &'a LazyCell<V>,
    value: Option<V>,
}

impl<V> Drop for SettleGuard<'_, V> {
    fn drop(&mut self) {
        let mut state = self.cell.state.lock();
        *state = match self.value.take() {
            Some(value) => State::Ready(value),
            None => State::Empty,
        };
        self.cell.settled.notify_all();
    }
}
