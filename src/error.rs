//! Error types used by the tracking service and its producers.
//!
//! - [`QueryError`]: raised by the query engine (caller errors, missing source).
//! - [`IngestError`]: raised by the ingestion gateway for malformed batches.
//! - [`SinkError`]: raised by an [`EventSink`](crate::EventSink) while delivering a batch.
//!
//! Each type provides `as_label` (stable snake_case for logs/metrics) and
//! `as_message` helpers.
//!
//! Task failures are **not** errors of this crate: they are data
//! ([`ErrorInfo`](crate::ErrorInfo)) recorded on task records.

use thiserror::Error;

use crate::core::Resource;

/// # Errors produced by the query engine.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Filter references a field the resource does not have.
    #[error("unknown field {field:?} for {resource}")]
    UnknownField {
        /// Queried resource.
        resource: Resource,
        /// Offending field name.
        field: String,
    },

    /// Filter expression could not be parsed.
    #[error("invalid filter {expr:?}: expected <field>=<value> or <field>!=<value>")]
    InvalidFilter {
        /// The raw expression.
        expr: String,
    },

    /// The backing registry is gone (service shut down or never attached).
    #[error("data source for {resource} is unavailable")]
    SourceUnavailable {
        /// Queried resource.
        resource: Resource,
    },
}

impl QueryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use tasklineage::{QueryError, Resource};
    ///
    /// let err = QueryError::SourceUnavailable { resource: Resource::Tasks };
    /// assert_eq!(err.as_label(), "query_source_unavailable");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            QueryError::UnknownField { .. } => "query_unknown_field",
            QueryError::InvalidFilter { .. } => "query_invalid_filter",
            QueryError::SourceUnavailable { .. } => "query_source_unavailable",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            QueryError::UnknownField { resource, field } => {
                format!("field={field} resource={resource}")
            }
            QueryError::InvalidFilter { expr } => format!("expr={expr}"),
            QueryError::SourceUnavailable { resource } => format!("resource={resource}"),
        }
    }
}

/// # Errors produced while validating an incoming batch.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// The declared sequence range is inverted.
    #[error("invalid sequence range {first}..={last}")]
    InvalidSequenceRange {
        /// Declared first sequence number.
        first: u64,
        /// Declared last sequence number.
        last: u64,
    },

    /// A batch carrying events declared no sequence range.
    #[error("batch of {events} events has no sequence range")]
    MissingSequenceRange {
        /// Number of events in the batch.
        events: usize,
    },

    /// An event's sequence number lies outside the declared range.
    #[error("event seq {seq} outside declared range {first}..={last}")]
    EventOutOfRange {
        /// Offending sequence number.
        seq: u64,
        /// Declared first sequence number.
        first: u64,
        /// Declared last sequence number.
        last: u64,
    },
}

impl IngestError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            IngestError::InvalidSequenceRange { .. } => "ingest_invalid_range",
            IngestError::MissingSequenceRange { .. } => "ingest_missing_range",
            IngestError::EventOutOfRange { .. } => "ingest_event_out_of_range",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// # Errors produced by an event sink.
///
/// Some errors are retryable (`Unavailable`); a rejected batch is never resent.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The receiving side could not be reached; the batch may be resent.
    #[error("sink unavailable: {error}")]
    Unavailable {
        /// Underlying error message.
        error: String,
    },

    /// The receiving side refused the batch.
    #[error("batch rejected: {error}")]
    Rejected {
        /// Underlying error message.
        error: String,
    },
}

impl SinkError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SinkError::Unavailable { .. } => "sink_unavailable",
            SinkError::Rejected { .. } => "sink_rejected",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            SinkError::Unavailable { error } => format!("unavailable: {error}"),
            SinkError::Rejected { error } => format!("rejected: {error}"),
        }
    }

    /// Indicates whether the batch should be buffered again and resent.
    ///
    /// # Example
    /// ```
    /// use tasklineage::SinkError;
    ///
    /// assert!(SinkError::Unavailable { error: "down".into() }.is_retryable());
    /// assert!(!SinkError::Rejected { error: "bad".into() }.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, SinkError::Unavailable { .. })
    }
}

impl From<IngestError> for SinkError {
    fn from(err: IngestError) -> Self {
        SinkError::Rejected {
            error: err.to_string(),
        }
    }
}
