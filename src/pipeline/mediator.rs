//! Dispatch of requests to their pipelines.

use super::{
    short_type_name, Behavior, DynBehavior, DynHandler, DynValidator, Handler, LoggingBehavior,
    Pipeline, Request, RequestContext, ValidationBehavior, Validator,
};
use crate::error::{codes, Error, Result};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

type ErasedPipeline = Box<dyn Any + Send + Sync>;

/// Routes each request to the pipeline registered for its type.
///
/// Cheap to clone; clones share the same pipelines.
#[derive(Clone)]
pub struct Mediator {
    pipelines: Arc<HashMap<TypeId, ErasedPipeline>>,
}

impl Mediator {
    pub fn builder() -> MediatorBuilder {
        MediatorBuilder::new()
    }

    /// Dispatch with a fresh [`RequestContext`].
    pub async fn send<R: Request>(&self, request: R) -> Result<R::Response> {
        let ctx = RequestContext::new();
        self.send_with(&ctx, request).await
    }

    /// Dispatch with a caller-supplied context.
    ///
    /// Returns a `Cancellation` error if the context is cancelled before or
    /// while the pipeline runs. Cancelled requests are not retried.
    pub async fn send_with<R: Request>(&self, ctx: &RequestContext, request: R) -> Result<R::Response> {
        let pipeline = self.pipeline::<R>()?;

        if ctx.is_cancelled() {
            return Err(cancelled(&request, ctx));
        }

        tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => Err(cancelled(&request, ctx)),
            result = pipeline.execute(&request, ctx) => result,
        }
    }

    pub fn handles<R: Request>(&self) -> bool {
        self.pipelines.contains_key(&TypeId::of::<R>())
    }

    pub fn registered_count(&self) -> usize {
        self.pipelines.len()
    }

    fn pipeline<R: Request>(&self) -> Result<&Pipeline<R>> {
        self.pipelines
            .get(&TypeId::of::<R>())
            .and_then(|erased| erased.downcast_ref::<Pipeline<R>>())
            .ok_or_else(|| {
                Error::system(
                    codes::HANDLER_NOT_FOUND,
                    format!("No handler registered for {}", short_type_name::<R>()),
                )
                .with_metadata("request", short_type_name::<R>())
            })
    }
}

fn cancelled<R: Request>(request: &R, ctx: &RequestContext) -> Error {
    warn!(
        "⚠ {} [{}] cancelled",
        request.name(),
        ctx.correlation_id()
    );
    Error::cancelled(format!("{} was cancelled", request.name()))
        .with_metadata("correlation_id", ctx.correlation_id().to_string())
}

// ============================================================================
// Builder
// ============================================================================

struct Registration<R: Request> {
    handlers: Vec<DynHandler<R>>,
    validators: Vec<DynValidator<R>>,
    behaviors: Vec<DynBehavior<R>>,
}

impl<R: Request> Registration<R> {
    fn new() -> Self {
        Registration {
            handlers: Vec::new(),
            validators: Vec::new(),
            behaviors: Vec::new(),
        }
    }
}

trait ErasedRegistration: Send + Sync {
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_pipeline(self: Box<Self>, logging: Option<LoggingBehavior>) -> Result<ErasedPipeline>;
}

impl<R: Request> ErasedRegistration for Registration<R> {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_pipeline(self: Box<Self>, logging: Option<LoggingBehavior>) -> Result<ErasedPipeline> {
        let Registration {
            mut handlers,
            validators,
            behaviors,
        } = *self;

        let handler = match handlers.len() {
            1 => handlers.remove(0),
            0 => {
                return Err(Error::system(
                    codes::CONFIG_ERROR,
                    format!(
                        "{} has validators or behaviors but no handler",
                        short_type_name::<R>()
                    ),
                ))
            }
            n => {
                return Err(Error::conflict(
                    codes::CONFLICT,
                    format!("{} has {} handlers registered", short_type_name::<R>(), n),
                ))
            }
        };

        let mut pipeline =
            Pipeline::new(handler).with_behavior(Arc::new(ValidationBehavior::new(validators)));
        for behavior in behaviors {
            pipeline = pipeline.with_behavior(behavior);
        }
        if let Some(logging) = logging {
            pipeline = pipeline.with_behavior(Arc::new(logging));
        }

        Ok(Box::new(pipeline))
    }
}

/// Collects handlers, validators and behaviors per request type.
///
/// Logging is enabled with default thresholds unless replaced with
/// [`with_logging`](Self::with_logging) or turned off with
/// [`without_logging`](Self::without_logging).
pub struct MediatorBuilder {
    registrations: HashMap<TypeId, Box<dyn ErasedRegistration>>,
    logging: Option<LoggingBehavior>,
}

impl Default for MediatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MediatorBuilder {
    pub fn new() -> Self {
        MediatorBuilder {
            registrations: HashMap::new(),
            logging: Some(LoggingBehavior::default()),
        }
    }

    fn registration<R: Request>(mut self, f: impl FnOnce(&mut Registration<R>)) -> Self {
        let entry = self
            .registrations
            .entry(TypeId::of::<R>())
            .or_insert_with(|| Box::new(Registration::<R>::new()) as Box<dyn ErasedRegistration>);
        if let Some(registration) = entry.as_any_mut().downcast_mut::<Registration<R>>() {
            f(registration);
        }
        self
    }

    /// Register the handler for `H::Request`. Exactly one per request type.
    pub fn handler<H: Handler>(self, handler: H) -> Self {
        self.registration::<H::Request>(|r| r.handlers.push(Arc::new(handler)))
    }

    pub fn validator<V: Validator>(self, validator: V) -> Self {
        self.registration::<V::Request>(|r| r.validators.push(Arc::new(validator)))
    }

    /// Add a behavior between validation and logging for `R`.
    pub fn behavior<R: Request, B: Behavior<R>>(self, behavior: B) -> Self {
        self.registration::<R>(|r| r.behaviors.push(Arc::new(behavior)))
    }

    pub fn with_logging(mut self, logging: LoggingBehavior) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn without_logging(mut self) -> Self {
        self.logging = None;
        self
    }

    /// Assemble one pipeline per request type.
    ///
    /// Fails if a request type has no handler or more than one.
    pub fn build(self) -> Result<Mediator> {
        let logging = self.logging;
        let mut pipelines = HashMap::with_capacity(self.registrations.len());

        for (type_id, registration) in self.registrations {
            pipelines.insert(type_id, registration.into_pipeline(logging)?);
        }

        debug!("✓ Mediator built with {} pipeline(s)", pipelines.len());
        Ok(Mediator {
            pipelines: Arc::new(pipelines),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pipeline::{CancellationSignal, FnValidator, Next, ValidationFailure};
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Double(i64);

    impl Request for Double {
        type Response = i64;
    }

    struct Unregistered;

    impl Request for Unregistered {
        type Response = ();
    }

    struct Sleep(Duration);

    impl Request for Sleep {
        type Response = &'static str;
    }

    struct DoubleHandler;

    impl Handler for DoubleHandler {
        type Request = Double;

        fn handle<'a>(
            &'a self,
            request: &'a Double,
            _ctx: &'a RequestContext,
        ) -> BoxFuture<'a, Result<i64>> {
            Box::pin(async move { Ok(request.0 * 2) })
        }
    }

    struct SleepHandler;

    impl Handler for SleepHandler {
        type Request = Sleep;

        fn handle<'a>(
            &'a self,
            request: &'a Sleep,
            _ctx: &'a RequestContext,
        ) -> BoxFuture<'a, Result<&'static str>> {
            Box::pin(async move {
                tokio::time::sleep(request.0).await;
                Ok("done")
            })
        }
    }

    struct CountCalls(Arc<AtomicUsize>);

    impl Behavior<Double> for CountCalls {
        fn handle<'a>(
            &'a self,
            request: &'a Double,
            ctx: &'a RequestContext,
            next: Next<'a, Double>,
        ) -> BoxFuture<'a, Result<i64>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            next.run(request, ctx)
        }
    }

    fn positive() -> FnValidator<Double, impl Fn(&Double) -> Vec<ValidationFailure> + Send + Sync> {
        FnValidator::new(|r: &Double| {
            if r.0 > 0 {
                Vec::new()
            } else {
                vec![ValidationFailure::new("value", "Value must be positive").with_code("INVALID_AMOUNT")]
            }
        })
    }

    #[tokio::test]
    async fn test_send_routes_to_handler() {
        let mediator = Mediator::builder()
            .handler(DoubleHandler)
            .build()
            .expect("Failed to build mediator");

        assert_eq!(mediator.send(Double(21)).await, Ok(42));
        assert!(mediator.handles::<Double>());
        assert!(!mediator.handles::<Unregistered>());
    }

    #[tokio::test]
    async fn test_unregistered_request() {
        let mediator = Mediator::builder()
            .handler(DoubleHandler)
            .build()
            .expect("Failed to build mediator");

        let err = mediator
            .send(Unregistered)
            .await
            .expect_err("no handler");

        assert_eq!(err.kind(), ErrorKind::System);
        assert_eq!(err.code(), codes::HANDLER_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_validation_runs_before_behaviors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mediator = Mediator::builder()
            .handler(DoubleHandler)
            .validator(positive())
            .behavior::<Double, _>(CountCalls(Arc::clone(&calls)))
            .build()
            .expect("Failed to build mediator");

        let err = mediator.send(Double(-1)).await.expect_err("invalid");
        assert_eq!(err.code(), "INVALID_AMOUNT");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(mediator.send(Double(2)).await, Ok(4));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_build_rejects_duplicate_handlers() {
        let err = Mediator::builder()
            .handler(DoubleHandler)
            .handler(DoubleHandler)
            .build()
            .err()
            .expect("duplicate handler rejected");

        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_build_rejects_validator_without_handler() {
        let err = Mediator::builder()
            .validator(positive())
            .build()
            .err()
            .expect("missing handler rejected");

        assert_eq!(err.code(), codes::CONFIG_ERROR);
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch() {
        let mediator = Mediator::builder()
            .handler(DoubleHandler)
            .build()
            .expect("Failed to build mediator");
        let ctx = RequestContext::new();
        ctx.cancellation().cancel();

        let err = mediator
            .send_with(&ctx, Double(1))
            .await
            .expect_err("cancelled");

        assert!(err.is_cancelled());
        assert_eq!(err.code(), codes::OPERATION_CANCELLED);
    }

    #[tokio::test]
    async fn test_cancelled_during_dispatch() {
        let mediator = Mediator::builder()
            .handler(SleepHandler)
            .without_logging()
            .build()
            .expect("Failed to build mediator");
        let signal = CancellationSignal::new();
        let ctx = RequestContext::with_cancellation(signal.clone());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            signal.cancel();
        });

        let err = mediator
            .send_with(&ctx, Sleep(Duration::from_secs(10)))
            .await
            .expect_err("cancelled");
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_mediator_is_shareable_across_tasks() {
        let mediator = Mediator::builder()
            .handler(DoubleHandler)
            .build()
            .expect("Failed to build mediator");

        let mut handles = vec![];
        for i in 1..=5 {
            let mediator = mediator.clone();
            handles.push(tokio::spawn(async move { mediator.send(Double(i)).await }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.expect("task").expect("dispatch");
        }
        assert_eq!(total, 30);
        assert_eq!(mediator.registered_count(), 1);
    }
}
