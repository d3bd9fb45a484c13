//! Request pipeline: requests, handlers, validators and the behavior chain
//! wrapped around every dispatch.
//!
//! A request travels through an ordered list of [`Behavior`]s before reaching
//! its [`Handler`]:
//!
//! ```text
//! Mediator::send ─► ValidationBehavior ─► (extra behaviors) ─► LoggingBehavior ─► Handler
//! ```
//!
//! Each behavior receives a [`Next`] cursor and decides whether to call it.
//! Validation short-circuits on failure; logging always forwards and returns
//! the handler's result untouched.
//!
//! All trait methods return [`BoxFuture`] so the traits stay object safe and
//! every dispatch future is `Send`.

pub mod context;
pub mod logging;
pub mod mediator;
pub mod validation;

pub use context::{CancellationSignal, CorrelationId, RequestContext};
pub use logging::LoggingBehavior;
pub use mediator::{Mediator, MediatorBuilder};
pub use validation::{FnValidator, ValidationBehavior, ValidationFailure};

use crate::error::Result;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

// ============================================================================
// Requests
// ============================================================================

/// A query or command dispatched through the [`Mediator`].
pub trait Request: Send + Sync + 'static {
    type Response: Send + 'static;

    /// Short name used in log lines.
    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }

    /// Fields included in the logged request snapshot.
    ///
    /// Fields built with [`LogField::sensitive`] are left out of the log.
    fn log_fields(&self) -> Vec<LogField> {
        Vec::new()
    }
}

/// One field of a request as seen by the logging behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct LogField {
    name: &'static str,
    value: Option<Value>,
}

impl LogField {
    pub fn new(name: &'static str, value: impl Into<Value>) -> Self {
        LogField {
            name,
            value: Some(value.into()),
        }
    }

    /// A field whose value must never be logged.
    pub fn sensitive(name: &'static str) -> Self {
        LogField { name, value: None }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `None` for sensitive fields.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn is_sensitive(&self) -> bool {
        self.value.is_none()
    }
}

/// Last path segment of a type name, without generic arguments.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

// ============================================================================
// Handlers, validators, behaviors
// ============================================================================

/// Produces the response for exactly one request type.
pub trait Handler: Send + Sync + 'static {
    type Request: Request;

    fn handle<'a>(
        &'a self,
        request: &'a Self::Request,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<<Self::Request as Request>::Response>>;
}

/// Checks a request before it reaches its handler.
///
/// Returns every failure found; an empty list means the request is valid.
pub trait Validator: Send + Sync + 'static {
    type Request: Request;

    fn validate<'a>(
        &'a self,
        request: &'a Self::Request,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Vec<ValidationFailure>>;
}

/// A stage wrapped around the handler.
pub trait Behavior<R: Request>: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        request: &'a R,
        ctx: &'a RequestContext,
        next: Next<'a, R>,
    ) -> BoxFuture<'a, Result<R::Response>>;
}

pub type DynHandler<R> = Arc<dyn Handler<Request = R>>;
pub type DynValidator<R> = Arc<dyn Validator<Request = R>>;
pub type DynBehavior<R> = Arc<dyn Behavior<R>>;

/// Cursor over the remaining stages of a pipeline.
pub struct Next<'a, R: Request> {
    behaviors: &'a [DynBehavior<R>],
    handler: &'a dyn Handler<Request = R>,
}

impl<'a, R: Request> Next<'a, R> {
    /// Run the next behavior, or the handler once the behaviors are exhausted.
    pub fn run(self, request: &'a R, ctx: &'a RequestContext) -> BoxFuture<'a, Result<R::Response>> {
        match self.behaviors.split_first() {
            Some((behavior, rest)) => behavior.handle(
                request,
                ctx,
                Next {
                    behaviors: rest,
                    handler: self.handler,
                },
            ),
            None => self.handler.handle(request, ctx),
        }
    }
}

/// The ordered behavior chain and handler for one request type.
pub struct Pipeline<R: Request> {
    handler: DynHandler<R>,
    behaviors: Vec<DynBehavior<R>>,
}

impl<R: Request> Pipeline<R> {
    pub fn new(handler: DynHandler<R>) -> Self {
        Pipeline {
            handler,
            behaviors: Vec::new(),
        }
    }

    /// Append a behavior; behaviors run in insertion order, outermost first.
    pub fn with_behavior(mut self, behavior: DynBehavior<R>) -> Self {
        self.behaviors.push(behavior);
        self
    }

    pub fn behavior_count(&self) -> usize {
        self.behaviors.len()
    }

    pub fn execute<'a>(
        &'a self,
        request: &'a R,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<R::Response>> {
        Next {
            behaviors: &self.behaviors,
            handler: &*self.handler,
        }
        .run(request, ctx)
    }
}
