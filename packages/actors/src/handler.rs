//! Job handler trait and registry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use dispatch_core::{HandlerError, Job, JobResult};

/// Result type for job handlers.
pub type HandlerResult = Result<JobResult, HandlerError>;

/// Future type for async job handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Trait for job handlers.
///
/// Implement this trait to define how jobs of a specific type are processed.
/// The returned future runs on its own task, outside the queue actor.
pub trait JobHandler: Send + Sync + 'static {
    /// The job type this handler processes.
    fn job_type(&self) -> &str;

    /// Process a job and return the result.
    fn handle(&self, job: &Job) -> HandlerFuture;
}

/// Registry for job handlers.
///
/// Shared by the queue (to reject unknown job types at enqueue) and the
/// workers (to dispatch).
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a job type, replacing any previous one.
    pub fn register<H: JobHandler>(&self, handler: H) {
        let job_type = handler.job_type().to_string();
        tracing::debug!(job_type = %job_type, "Registered job handler");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_type, Arc::new(handler));
    }

    /// Get a handler for a job type.
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_type)
            .cloned()
    }

    /// Check if a handler exists for a job type.
    pub fn has_handler(&self, job_type: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(job_type)
    }

    /// List all registered job types.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }
}

/// A simple function-based job handler.
pub struct FnHandler<F>
where
    F: Fn(&Job) -> HandlerFuture + Send + Sync + 'static,
{
    job_type: String,
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Job) -> HandlerFuture + Send + Sync + 'static,
{
    /// Create a new function-based handler.
    pub fn new(job_type: impl Into<String>, handler: F) -> Self {
        Self {
            job_type: job_type.into(),
            handler,
        }
    }
}

impl<F> JobHandler for FnHandler<F>
where
    F: Fn(&Job) -> HandlerFuture + Send + Sync + 'static,
{
    fn job_type(&self) -> &str {
        &self.job_type
    }

    fn handle(&self, job: &Job) -> HandlerFuture {
        (self.handler)(job)
    }
}

/// Helper macro for creating job handlers from async blocks.
///
/// ```ignore
/// pool.register_handler(job_handler!("echo", |job| {
///     Ok(JobResult::with_output("echoed", job.payload))
/// }));
/// ```
#[macro_export]
macro_rules! job_handler {
    ($job_type:expr, |$job:ident| $body:expr) => {
        $crate::FnHandler::new($job_type, |$job: &::dispatch_core::Job| {
            let $job = $job.clone();
            ::std::boxed::Box::pin(async move { $body })
        })
    };
}
