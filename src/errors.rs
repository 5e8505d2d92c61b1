//! Typed error hierarchy for the site generation worker.
//!
//! Every job-terminating failure is a `JobError`. Its `Display` text is what
//! lands in the job record's `error` column and in the final "Failed: ..."
//! log line, so messages never carry stack traces or absolute workspace paths.

use std::time::Duration;

use thiserror::Error;

/// Errors that end a job. None of them are retried inside the pipeline.
#[derive(Debug, Error)]
pub enum JobError {
    /// Bad or missing work-item fields, detected before any external call.
    #[error("{0}")]
    Validation(String),

    /// The model endpoint did not answer within the configured deadline.
    #[error("model request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Empty, undecodable or unparseable model output.
    #[error("{0}")]
    Generation(String),

    /// An external toolchain command failed to start or exited non-zero.
    #[error("{0}")]
    Build(String),

    /// An object-storage write failed.
    #[error("{0}")]
    Publish(String),

    #[error("workspace error: {0}")]
    Workspace(String),

    #[error("failed to write project files: {0}")]
    Materialize(String),

    #[error("job store error: {0}")]
    Store(String),
}

impl JobError {
    /// Stable lowercase tag for structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Timeout(_) => "timeout",
            Self::Generation(_) => "generation",
            Self::Build(_) => "build",
            Self::Publish(_) => "publish",
            Self::Workspace(_) => "workspace",
            Self::Materialize(_) => "materialize",
            Self::Store(_) => "store",
        }
    }

    /// Non-zero exit of an external command.
    pub fn command_failed(command: &str, args: &[String], code: Option<i32>) -> Self {
        let invocation = render_invocation(command, args);
        match code {
            Some(code) => Self::Build(format!("{} failed with code {}", invocation, code)),
            None => Self::Build(format!("{} was terminated by a signal", invocation)),
        }
    }
}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(format!("{:#}", err))
    }
}

pub(crate) fn render_invocation(command: &str, args: &[String]) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        format!("{} {}", command, args.join(" "))
    }
}

pub type JobResult<T> = std::result::Result<T, JobError>;
