//! Handler contract shared by every component attached to the bus.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::error::{BusError, Result};

/// Something that consumes messages.
///
/// Handlers are shared across threads (`Send + Sync`); a handler that keeps
/// state must either be wrapped in exactly one [`QueueWorker`] or guard its
/// state itself.
///
/// [`QueueWorker`]: crate::worker::QueueWorker
pub trait Handler<M>: Send + Sync {
    /// Processes one message.
    fn handle(&self, message: M) -> Result<()>;

    /// Name used in logs and metrics.
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

impl<M, H> Handler<M> for Arc<H>
where
    H: Handler<M> + ?Sized,
{
    fn handle(&self, message: M) -> Result<()> {
        (**self).handle(message)
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

impl<M, H> Handler<M> for Box<H>
where
    H: Handler<M> + ?Sized,
{
    fn handle(&self, message: M) -> Result<()> {
        (**self).handle(message)
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

/// Shared, type-erased handler reference as stored in the bus registry.
pub type SharedHandler<M> = Arc<dyn Handler<M>>;

/// Handler backed by a closure.
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<M, F> Handler<M> for FnHandler<F>
where
    F: Fn(M) -> Result<()> + Send + Sync,
{
    fn handle(&self, message: M) -> Result<()> {
        (self.f)(message)
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Wraps a closure into a named handler.
pub fn handler_fn<M, F>(name: impl Into<String>, f: F) -> FnHandler<F>
where
    F: Fn(M) -> Result<()> + Send + Sync,
{
    FnHandler {
        name: name.into(),
        f,
    }
}

/// Returns true if both references point at the same handler instance.
pub(crate) fn same_handler<M>(a: &SharedHandler<M>, b: &SharedHandler<M>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Invokes a handler, turning a panic into [`BusError::Panicked`].
///
/// The handler's own state may be inconsistent after a panic; callers only
/// use this to keep delivering to *other* handlers.
pub(crate) fn invoke<M, H>(handler: &H, message: M) -> Result<()>
where
    H: Handler<M> + ?Sized,
{
    match catch_unwind(AssertUnwindSafe(|| handler.handle(message))) {
        Ok(result) => result,
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(BusError::Panicked {
                handler: handler.name(),
                message,
            })
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_handler_reports_its_name() {
        let h = handler_fn("printer", |_: u32| Ok(()));
        assert_eq!(Handler::<u32>::name(&h), "printer");
        assert!(h.handle(3).is_ok());
    }

    #[test]
    fn same_handler_uses_pointer_identity() {
        let a: SharedHandler<u32> = Arc::new(handler_fn("a", |_: u32| Ok(())));
        let b: SharedHandler<u32> = Arc::new(handler_fn("a", |_: u32| Ok(())));
        assert!(same_handler(&a, &a.clone()));
        assert!(!same_handler(&a, &b));
    }

    #[test]
    fn invoke_converts_panics_into_errors() {
        let result = invoke(&recording::Panicking, 1u32);
        match result {
            Err(BusError::Panicked { message, .. }) => assert_eq!(message, "boom"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
