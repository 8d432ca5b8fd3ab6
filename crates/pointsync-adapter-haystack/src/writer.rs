//! History-write submission.
//!
//! Joins source samples to resolved points by name and submits one
//! expression grid. A sample whose point lacks a resolved entity
//! reference is rejected before anything is rendered — the alternative is
//! a malformed-grid error surfacing from the remote store long after the
//! cause is gone.

use crate::client::HaystackClient;
use crate::transport::{HttpTransport, TransportError};
use pointsync_core::{Point, Sample, SampleError, SourceSample};
use pointsync_grid::his_write;
use std::collections::BTreeMap;

/// Errors from history writing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WriteError {
    /// A sample's point is absent from the batch or has no resolved
    /// entity reference
    #[error("point {name:?} has no resolved entity reference for history write")]
    ReferenceResolutionIncomplete {
        /// The point name the sample addressed
        name: String,
    },
    /// A sample's timestamp failed the zone-aware parse
    #[error(transparent)]
    Sample(#[from] SampleError),
    /// Underlying HTTP failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Renders resolved samples into history-write expressions and submits
/// them as a single grid.
pub struct TimeseriesWriter<'a, T: HttpTransport> {
    client: &'a HaystackClient<T>,
}

impl<'a, T: HttpTransport> TimeseriesWriter<'a, T> {
    /// Create a writer over an authenticated client.
    #[must_use]
    pub fn new(client: &'a HaystackClient<T>) -> Self {
        Self { client }
    }

    /// Write all samples against their points' entities.
    ///
    /// Returns the number of samples submitted; an empty sample list is a
    /// no-op and issues no network call.
    ///
    /// # Errors
    ///
    /// [`WriteError::ReferenceResolutionIncomplete`] before any rendering
    /// when a sample's point is missing or unresolved;
    /// [`WriteError::Sample`] on timestamp failures;
    /// [`WriteError::Transport`] on HTTP failure.
    pub fn write(
        &self,
        points: &[Point],
        samples: &[SourceSample],
    ) -> Result<usize, WriteError> {
        if samples.is_empty() {
            tracing::debug!("no samples to write");
            return Ok(0);
        }

        let by_name: BTreeMap<&str, &Point> = points
            .iter()
            .map(|point| (point.name.as_str(), point))
            .collect();

        let mut bound: Vec<Sample> = Vec::with_capacity(samples.len());
        for sample in samples {
            let entity_ref = by_name
                .get(sample.name.as_str())
                .and_then(|point| point.entity_ref())
                .ok_or_else(|| WriteError::ReferenceResolutionIncomplete {
                    name: sample.name.clone(),
                })?;
            bound.push(sample.bind(entity_ref)?);
        }

        let grid = his_write(bound.iter());
        self.client.eval("his-write", &grid)?;
        tracing::info!(count = bound.len(), "history samples submitted");
        Ok(bound.len())
    }
}
