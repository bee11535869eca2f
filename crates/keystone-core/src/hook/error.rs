use std::time::Duration;

use thiserror::Error;

use crate::kernel::error::BoxError;

/// Failure raised by [`HookPipeline::invoke`](crate::hook::HookPipeline::invoke)
#[derive(Debug, Error)]
pub enum HookError {
    #[error("Observer #{index} ('{observer}') failed: {source}")]
    ObserverFailed {
        index: usize,
        observer: String,
        #[source]
        source: BoxError,
    },

    #[error("Observer #{index} ('{observer}') panicked: {message}")]
    ObserverPanicked {
        index: usize,
        observer: String,
        message: String,
    },

    #[error("Observer #{index} ('{observer}') timed out after {timeout:?}")]
    ObserverTimedOut {
        index: usize,
        observer: String,
        timeout: Duration,
    },

    /// Every observer of a parallel hook settled and at least one failed.
    #[error("{} of {total} parallel observers failed: {}", .failures.len(), summarize(.failures))]
    ParallelObserversFailed {
        total: usize,
        failures: Vec<HookError>,
        /// `(index, name)` of the observers that completed successfully
        completed: Vec<(usize, String)>,
    },
}

impl HookError {
    /// Registration index of the failing observer, for single-observer failures
    pub fn observer_index(&self) -> Option<usize> {
        match self {
            HookError::ObserverFailed { index, .. }
            | HookError::ObserverPanicked { index, .. }
            | HookError::ObserverTimedOut { index, .. } => Some(*index),
            HookError::ParallelObserversFailed { .. } => None,
        }
    }
}

fn summarize(failures: &[HookError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
