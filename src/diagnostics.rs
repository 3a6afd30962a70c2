//! Thin diagnostics layer over the `log` facade.
//!
//! This crate does not own a logging sink — no appenders, no rotation policy,
//! no file layout. It only emits records through `log`; wiring a subscriber is
//! the embedding application's job. In test builds, `dev_trace!` additionally
//! stashes the formatted message in a thread-local sink so property tests can
//! assert on engine-internal events (index resizes, merges) without coupling
//! to a particular log backend.

#[cfg(test)]
use std::cell::RefCell;

#[cfg(test)]
thread_local! {
    static TRACE_SINK: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Enables the thread-local trace sink for the current thread's test.
#[cfg(test)]
pub struct TraceSinkGuard;

#[cfg(test)]
impl Drop for TraceSinkGuard {
    fn drop(&mut self) {
        TRACE_SINK.with(|s| *s.borrow_mut() = None);
    }
}

#[cfg(test)]
#[must_use]
pub fn enable_trace_sink() -> TraceSinkGuard {
    TRACE_SINK.with(|s| *s.borrow_mut() = Some(Vec::new()));
    TraceSinkGuard
}

#[cfg(test)]
pub fn drain_trace() -> Vec<String> {
    TRACE_SINK.with(|s| match s.borrow_mut().as_mut() {
        Some(buf) => std::mem::take(buf),
        None => Vec::new(),
    })
}

#[cfg(test)]
pub fn push_trace(msg: String) {
    TRACE_SINK.with(|s| {
        if let Some(buf) = s.borrow_mut().as_mut() {
            buf.push(msg);
        }
    });
}

/// Emits a trace-level engine event. In non-test builds this is just `log::trace!`.
#[macro_export]
macro_rules! dev_trace {
    ($($arg:tt)*) => {{
        #[cfg(test)]
        {
            $crate::diagnostics::push_trace(format!($($arg)*));
        }
        log::trace!($($arg)*);
    }};
}
