//! Panic containment for request handling.
//!
//! [`guarded`] runs a closure under `catch_unwind` and [`catch_panic`] does the
//! same for every poll of a future. A process-wide panic hook, installed on
//! first use, records a backtrace for panics raised inside a guarded section
//! and leaves every other panic to the hook that was there before.

use futures::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::{poll_fn, Future};
use std::panic::{self, AssertUnwindSafe};
use std::pin::pin;
use std::sync::Once;

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARD_DEPTH.with(Cell::get) > 0 {
                let backtrace = Backtrace::force_capture().to_string();
                LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            } else {
                previous(info);
            }
        }));
    });
}

struct GuardScope;

impl GuardScope {
    fn enter() -> Self {
        GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for GuardScope {
    fn drop(&mut self) {
        GUARD_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// A panic caught by [`guarded`] or [`catch_panic`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicReport {
    /// The panic payload rendered as text.
    pub message: String,
    /// Backtrace captured where the panic was raised.
    pub stack_trace: String,
}

impl PanicReport {
    fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "Box<dyn Any>".to_owned());

        let stack_trace = LAST_BACKTRACE
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_default();

        Self {
            message,
            stack_trace,
        }
    }
}

/// Run `f`, turning a panic into a [`PanicReport`].
///
/// # Errors
///
/// Returns the report if `f` panicked.
pub fn guarded<R>(f: impl FnOnce() -> R) -> Result<R, PanicReport> {
    install_hook();
    let _scope = GuardScope::enter();
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| PanicReport::from_payload(&*payload))
}

/// Await `fut`, turning a panic in any of its polls into a [`PanicReport`].
///
/// # Errors
///
/// Returns the report if a poll of `fut` panicked.
pub async fn catch_panic<F: Future>(fut: F) -> Result<F::Output, PanicReport> {
    install_hook();
    let mut fut = pin!(fut);
    let guarded_polls = poll_fn(move |cx| {
        let _scope = GuardScope::enter();
        fut.as_mut().poll(cx)
    });

    AssertUnwindSafe(guarded_polls)
        .catch_unwind()
        .await
        .map_err(|payload| PanicReport::from_payload(&*payload))
}
