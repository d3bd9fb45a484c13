//! Validation stage: runs every registered validator and short-circuits on
//! failure.

use super::{Behavior, DynValidator, Next, Request, RequestContext, Validator};
use crate::error::{codes, Error, Result};
use futures::future::{self, BoxFuture};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

/// One rule violation reported by a validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub property: String,
    pub message: String,
    pub code: Option<String>,
}

impl ValidationFailure {
    pub fn new(property: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationFailure {
            property: property.into(),
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.property, self.message)
    }
}

/// Fold a non-empty failure list into a single `Validation` error.
///
/// The code is taken from the first failure; the message joins every failure
/// message with `"; "`; metadata maps each failing property to the list of
/// its messages.
pub fn validation_error(failures: &[ValidationFailure]) -> Error {
    let code = failures
        .first()
        .and_then(|f| f.code.clone())
        .unwrap_or_else(|| codes::VALIDATION_FAILED.to_string());

    let message = failures
        .iter()
        .map(|f| f.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    let mut by_property: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
    for failure in failures {
        by_property
            .entry(failure.property.as_str())
            .or_default()
            .push(Value::String(failure.message.clone()));
    }

    by_property
        .into_iter()
        .fold(Error::validation(code, message), |err, (property, messages)| {
            err.with_metadata(property, Value::Array(messages))
        })
}

/// Validator built from a synchronous closure.
pub struct FnValidator<R, F> {
    rule: F,
    _request: PhantomData<fn(&R)>,
}

impl<R, F> FnValidator<R, F>
where
    R: Request,
    F: Fn(&R) -> Vec<ValidationFailure> + Send + Sync + 'static,
{
    pub fn new(rule: F) -> Self {
        FnValidator {
            rule,
            _request: PhantomData,
        }
    }
}

impl<R, F> Validator for FnValidator<R, F>
where
    R: Request,
    F: Fn(&R) -> Vec<ValidationFailure> + Send + Sync + 'static,
{
    type Request = R;

    fn validate<'a>(
        &'a self,
        request: &'a R,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Vec<ValidationFailure>> {
        Box::pin(future::ready((self.rule)(request)))
    }
}

/// Runs all validators for a request concurrently and collects every
/// failure before deciding.
pub struct ValidationBehavior<R: Request> {
    validators: Vec<DynValidator<R>>,
}

impl<R: Request> ValidationBehavior<R> {
    pub fn new(validators: Vec<DynValidator<R>>) -> Self {
        ValidationBehavior { validators }
    }

    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }
}

impl<R: Request> Behavior<R> for ValidationBehavior<R> {
    fn handle<'a>(
        &'a self,
        request: &'a R,
        ctx: &'a RequestContext,
        next: Next<'a, R>,
    ) -> BoxFuture<'a, Result<R::Response>> {
        Box::pin(async move {
            if self.validators.is_empty() {
                return next.run(request, ctx).await;
            }

            let failures: Vec<ValidationFailure> = future::join_all(
                self.validators
                    .iter()
                    .map(|validator| validator.validate(request, ctx)),
            )
            .await
            .into_iter()
            .flatten()
            .collect();

            if failures.is_empty() {
                return next.run(request, ctx).await;
            }

            let error = validation_error(&failures);
            debug!(
                "⚠ {} [{}] rejected with {} validation failure(s): {}",
                request.name(),
                ctx.correlation_id(),
                failures.len(),
                error.message()
            );
            Err(error)
        })
    }
}
