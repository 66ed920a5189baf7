//! Bounded execution for parser work on untrusted files

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::error::SigningError;

/// Run `work` on its own thread, giving up after `limit`.
///
/// A panic inside `work` is reported as `SigningError::Panicked`. When the
/// limit elapses the thread is detached and left to finish on its own.
pub fn run_bounded<T, F>(label: &str, limit: Option<Duration>, work: F) -> Result<T, SigningError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SigningError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(format!("pdf-{}", label))
        .spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(work));
            let _ = tx.send(outcome);
        })
        .map_err(|e| SigningError::Operation(format!("failed to spawn worker: {}", e)))?;

    let outcome = match limit {
        Some(limit) => rx.recv_timeout(limit).map_err(|e| match e {
            RecvTimeoutError::Timeout => SigningError::Timeout(limit.as_millis() as u64),
            RecvTimeoutError::Disconnected => {
                SigningError::Panicked("worker exited without a result".into())
            }
        })?,
        None => rx
            .recv()
            .map_err(|_| SigningError::Panicked("worker exited without a result".into()))?,
    };

    outcome.unwrap_or_else(|payload| Err(SigningError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_result() {
        let value = run_bounded("ok", Some(Duration::from_secs(5)), || Ok(41 + 1)).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_propagates_error() {
        let result: Result<(), _> =
            run_bounded("err", None, || Err(SigningError::MissingPage));
        assert_eq!(result, Err(SigningError::MissingPage));
    }

    #[test]
    fn test_panic_becomes_error() {
        let result: Result<(), _> = run_bounded("panic", None, || panic!("bad xref"));
        assert_eq!(result, Err(SigningError::Panicked("bad xref".to_string())));
    }

    #[test]
    fn test_times_out() {
        let result: Result<(), _> = run_bounded("slow", Some(Duration::from_millis(20)), || {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        });
        assert_eq!(result, Err(SigningError::Timeout(20)));
    }
}
