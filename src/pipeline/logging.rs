//! Logging stage: request snapshot, timing and outcome.

use super::{Behavior, LogField, Next, Request, RequestContext};
use crate::error::Result;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};

/// String field values longer than this are truncated in the snapshot.
pub const MAX_LOGGED_VALUE_LEN: usize = 100;

/// Logs each request around its handler.
///
/// Success is always logged at info. A request slower than `slow_threshold`
/// adds a warn line, one slower than `critical_threshold` an error line.
/// Failures are logged with the elapsed time and returned unchanged.
#[derive(Debug, Clone, Copy)]
pub struct LoggingBehavior {
    slow_threshold: Duration,
    critical_threshold: Duration,
}

impl Default for LoggingBehavior {
    fn default() -> Self {
        LoggingBehavior {
            slow_threshold: Duration::from_secs(1),
            critical_threshold: Duration::from_secs(5),
        }
    }
}

impl LoggingBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    pub fn with_critical_threshold(mut self, threshold: Duration) -> Self {
        self.critical_threshold = threshold;
        self
    }

    pub fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    pub fn critical_threshold(&self) -> Duration {
        self.critical_threshold
    }

    /// Extra level logged after the completion line of a successful request.
    pub fn escalation(&self, elapsed: Duration) -> Option<log::Level> {
        if elapsed > self.critical_threshold {
            Some(log::Level::Error)
        } else if elapsed > self.slow_threshold {
            Some(log::Level::Warn)
        } else {
            None
        }
    }
}

/// JSON object of the loggable request fields.
///
/// Sensitive fields are omitted and long strings truncated.
pub fn request_snapshot(fields: &[LogField]) -> Value {
    let mut snapshot = Map::new();
    for field in fields {
        if let Some(value) = field.value() {
            snapshot.insert(field.name().to_string(), truncate_value(value));
        }
    }
    Value::Object(snapshot)
}

fn truncate_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s.chars().count() > MAX_LOGGED_VALUE_LEN => {
            let head: String = s.chars().take(MAX_LOGGED_VALUE_LEN).collect();
            Value::String(format!("{}...", head))
        }
        other => other.clone(),
    }
}

impl<R: Request> Behavior<R> for LoggingBehavior {
    fn handle<'a>(
        &'a self,
        request: &'a R,
        ctx: &'a RequestContext,
        next: Next<'a, R>,
    ) -> BoxFuture<'a, Result<R::Response>> {
        Box::pin(async move {
            let name = request.name();
            let correlation_id = ctx.correlation_id();

            if log_enabled!(log::Level::Info) {
                info!(
                    "Handling {} [{}] {}",
                    name,
                    correlation_id,
                    request_snapshot(&request.log_fields())
                );
            }

            let started = Instant::now();
            let result = next.run(request, ctx).await;
            let elapsed = started.elapsed();

            match &result {
                Ok(_) => {
                    info!("✓ {} [{}] handled in {:?}", name, correlation_id, elapsed);
                    match self.escalation(elapsed) {
                        Some(log::Level::Error) => error!(
                            "✗ {} [{}] took {:?}, requires investigation",
                            name, correlation_id, elapsed
                        ),
                        Some(_) => warn!(
                            "⚠ {} [{}] slow request: {:?}",
                            name, correlation_id, elapsed
                        ),
                        None => {}
                    }
                }
                Err(e) => error!(
                    "✗ {} [{}] failed after {:?}: {}",
                    name, correlation_id, elapsed, e
                ),
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::pipeline::{Handler, Pipeline};
    use serde_json::json;
    use std::sync::Arc;

    struct Login {
        user: String,
        password: String,
        delay: Duration,
        fail: bool,
    }

    impl Request for Login {
        type Response = String;

        fn log_fields(&self) -> Vec<LogField> {
            vec![
                LogField::new("user", self.user.clone()),
                LogField::sensitive("password"),
            ]
        }
    }

    struct LoginHandler;

    impl Handler for LoginHandler {
        type Request = Login;

        fn handle<'a>(
            &'a self,
            request: &'a Login,
            _ctx: &'a RequestContext,
        ) -> BoxFuture<'a, Result<String>> {
            Box::pin(async move {
                tokio::time::sleep(request.delay).await;
                if request.fail {
                    Err(Error::not_found("NO_USER", "unknown user").with_metadata("user", request.user.clone()))
                } else {
                    Ok(format!("token-{}-{}", request.user, request.password.len()))
                }
            })
        }
    }

    fn login(fail: bool, delay: Duration) -> Login {
        Login {
            user: "ana".to_string(),
            password: "hunter2".to_string(),
            delay,
            fail,
        }
    }

    async fn run_both(behavior: LoggingBehavior, request: &Login) -> (Result<String>, Result<String>) {
        let ctx = RequestContext::new();
        let bare = Pipeline::new(Arc::new(LoginHandler));
        let logged = Pipeline::new(Arc::new(LoginHandler)).with_behavior(Arc::new(behavior));
        (
            bare.execute(request, &ctx).await,
            logged.execute(request, &ctx).await,
        )
    }

    #[test]
    fn test_snapshot_omits_sensitive_fields() {
        let snapshot = request_snapshot(&login(false, Duration::ZERO).log_fields());
        assert_eq!(snapshot, json!({ "user": "ana" }));
    }

    #[test]
    fn test_snapshot_truncates_long_strings() {
        let long = "x".repeat(150);
        let snapshot = request_snapshot(&[
            LogField::new("note", long),
            LogField::new("count", 3),
        ]);

        let note = snapshot["note"].as_str().expect("note is a string");
        assert_eq!(note.len(), MAX_LOGGED_VALUE_LEN + 3);
        assert!(note.ends_with("..."));
        assert_eq!(snapshot["count"], json!(3));
    }

    #[test]
    fn test_escalation_levels() {
        let behavior = LoggingBehavior::default();
        assert_eq!(behavior.escalation(Duration::from_millis(10)), None);
        assert_eq!(behavior.escalation(Duration::from_secs(1)), None);
        assert_eq!(behavior.escalation(Duration::from_secs(2)), Some(log::Level::Warn));
        assert_eq!(behavior.escalation(Duration::from_secs(5)), Some(log::Level::Warn));
        assert_eq!(behavior.escalation(Duration::from_secs(6)), Some(log::Level::Error));
    }

    #[tokio::test]
    async fn test_success_is_unchanged() {
        let request = login(false, Duration::ZERO);
        let (bare, logged) = run_both(LoggingBehavior::default(), &request).await;
        assert_eq!(bare, logged);
        assert_eq!(logged, Ok("token-ana-7".to_string()));
    }

    #[tokio::test]
    async fn test_error_is_unchanged() {
        let request = login(true, Duration::ZERO);
        let (bare, logged) = run_both(LoggingBehavior::default(), &request).await;
        assert_eq!(bare, logged);
        assert!(logged.expect_err("Failed to propagate error").is_not_found());
    }

    #[tokio::test]
    async fn test_slow_request_is_unchanged() {
        let _ = env_logger::builder().is_test(true).try_init();
        let behavior = LoggingBehavior::new()
            .with_slow_threshold(Duration::from_millis(1))
            .with_critical_threshold(Duration::from_millis(5));
        let request = login(false, Duration::from_millis(10));

        let (bare, logged) = run_both(behavior, &request).await;
        assert_eq!(bare, logged);
    }
}
