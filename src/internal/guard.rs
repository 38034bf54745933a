//! Panic containment for destroy actions.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::DestroyCause;

/// Runs one destroy action, turning a panic into [`DestroyCause::Panic`].
///
/// `f` returns `None` when the instance lacks the capability being run.
pub(crate) fn guarded<F>(f: F) -> Option<Result<(), DestroyCause>>
where
    F: FnOnce() -> Option<Result<(), DestroyCause>>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(outcome) => outcome,
        Err(payload) => Some(Err(DestroyCause::Panic(panic_message(payload.as_ref())))),
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
