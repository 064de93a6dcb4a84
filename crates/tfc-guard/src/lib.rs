//! Scope-exit guards.
//!
//! A guard owns a zero-argument action and runs it when the guard is dropped,
//! so the action fires on every way out of the enclosing scope: fall-through,
//! early return, `?`, or panic unwinding. The guard's strategy decides whether
//! the action actually runs at that point:
//!
//! - [`Always`] runs it unconditionally ([`on_exit`], [`defer!`]).
//! - [`OnFailure`] runs it only if a panic started propagating inside the
//!   guarded scope ([`on_failure`]).
//! - [`OnSuccess`] runs it only if no panic did ([`on_success`]).
//!
//! Any guard can be cancelled with [`ScopeGuard::dismiss`].
//!
//! ```
//! use std::cell::Cell;
//!
//! let released = Cell::new(false);
//! {
//!     let _guard = tfc_guard::on_exit(|| released.set(true));
//!     assert!(!released.get());
//! }
//! assert!(released.get());
//! ```

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;
use std::thread;

use tracing::warn;

thread_local! {
    static PANICS_STARTED: Cell<usize> = const { Cell::new(0) };
}

static COUNTER_HOOK: Once = Once::new();

/// Chain a panic hook that counts panics started on each thread.
///
/// Guards install it on first use. Call this early if a guard may first be
/// created inside a `Drop` that runs while the thread is unwinding, since the
/// hook cannot be swapped at that point. Installing more than once is a no-op.
pub fn install_panic_counter() {
    if thread::panicking() {
        return;
    }
    COUNTER_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            PANICS_STARTED.with(|count| count.set(count.get().wrapping_add(1)));
            previous(info);
        }));
    });
}

/// Number of panics started on this thread since the counter was installed.
///
/// Guards sample it at construction. A guard dropped while the thread is
/// unwinding and after the count has grown was left by a panic raised inside
/// its own scope, even when an outer panic was already propagating.
pub fn panics_started() -> usize {
    PANICS_STARTED.with(Cell::get)
}

/// Decides whether a guard's action runs when the guard is dropped.
pub trait Strategy {
    /// `failed` is true when a panic raised inside the guarded scope is
    /// propagating through the guard.
    fn should_run(failed: bool) -> bool;
}

/// Run the action on every scope exit.
#[derive(Debug)]
pub enum Always {}

/// Run the action only if a panic started propagating inside the scope.
#[derive(Debug)]
pub enum OnFailure {}

/// Run the action only if the scope exits without a new panic.
#[derive(Debug)]
pub enum OnSuccess {}

impl Strategy for Always {
    fn should_run(_failed: bool) -> bool {
        true
    }
}

impl Strategy for OnFailure {
    fn should_run(failed: bool) -> bool {
        failed
    }
}

impl Strategy for OnSuccess {
    fn should_run(failed: bool) -> bool {
        !failed
    }
}

/// Runs an action when dropped, subject to the strategy `S`.
///
/// The guard is move-only. Moving it hands the action to the new owner; the
/// moved-from binding is gone and cannot run it a second time.
///
/// If the action panics while the thread is already unwinding, the second
/// panic is caught and logged so the first one keeps propagating. During
/// a normal scope exit a panicking action propagates like any other panic.
#[must_use = "a guard that is not bound to a variable is dropped (and runs) immediately"]
pub struct ScopeGuard<F, S = Always>
where
    F: FnOnce(),
    S: Strategy,
{
    action: Option<F>,
    baseline: usize,
    strategy: PhantomData<S>,
}

impl<F, S> ScopeGuard<F, S>
where
    F: FnOnce(),
    S: Strategy,
{
    /// Arm a guard with `action`.
    pub fn new(action: F) -> Self {
        install_panic_counter();
        Self {
            action: Some(action),
            baseline: panics_started(),
            strategy: PhantomData,
        }
    }

    /// Cancel the action. Dropping the guard afterwards does nothing.
    pub fn dismiss(&mut self) {
        self.action = None;
    }

    /// Whether the action is still pending.
    pub fn is_armed(&self) -> bool {
        self.action.is_some()
    }

    /// Disarm the guard and hand the action back to the caller.
    pub fn into_inner(mut self) -> Option<F> {
        self.action.take()
    }
}

impl<F, S> Drop for ScopeGuard<F, S>
where
    F: FnOnce(),
    S: Strategy,
{
    fn drop(&mut self) {
        let Some(action) = self.action.take() else {
            return;
        };

        let unwinding = thread::panicking();
        let failed = unwinding && panics_started() > self.baseline;
        if !S::should_run(failed) {
            return;
        }

        if unwinding {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(action)) {
                warn!(
                    "suppressed panic from scope guard action during unwinding: {}",
                    panic_message(payload.as_ref())
                );
            }
        } else {
            action();
        }
    }
}

impl<F, S> fmt::Debug for ScopeGuard<F, S>
where
    F: FnOnce(),
    S: Strategy,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("armed", &self.is_armed())
            .field("baseline", &self.baseline)
            .field("strategy", &std::any::type_name::<S>())
            .finish()
    }
}

/// Guard that always runs `action` on scope exit.
pub fn on_exit<F: FnOnce()>(action: F) -> ScopeGuard<F, Always> {
    ScopeGuard::new(action)
}

/// Guard that runs `action` only when the scope is left by a panic.
pub fn on_failure<F: FnOnce()>(action: F) -> ScopeGuard<F, OnFailure> {
    ScopeGuard::new(action)
}

/// Guard that runs `action` only when the scope is left without a panic.
pub fn on_success<F: FnOnce()>(action: F) -> ScopeGuard<F, OnSuccess> {
    ScopeGuard::new(action)
}

/// Run the given statements when the enclosing block ends.
///
/// ```
/// use std::cell::Cell;
///
/// let closed = Cell::new(0);
/// {
///     tfc_guard::defer! { closed.set(closed.get() + 1) }
/// }
/// assert_eq!(closed.get(), 1);
/// ```
#[macro_export]
macro_rules! defer {
    ($($body:tt)*) => {
        let _deferred = $crate::on_exit(|| { $($body)* });
    };
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
