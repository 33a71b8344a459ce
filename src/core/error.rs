//! Purpose: Define the error taxonomy shared across transport, listing, and export.
//! Exports: `Error`, `ErrorKind`.
//! Role: Single error type carried through every public `Result` in the crate.
//! Invariants: `NotFound` is reserved for HTTP 404; `Transport` for network-level
//! Invariants: failures that never produced an HTTP status. No internal retries.

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Caller misuse: bad base URL, empty API key, unknown category title.
    Usage,
    /// Network-level failure (DNS, refused connection, timeout) with no response.
    Transport,
    /// Non-2xx HTTP response; carries status and body.
    Api,
    /// HTTP 404 for a specific resource.
    NotFound,
    /// Assembly-time export failure (archive write, destination rename).
    Export,
    /// Local filesystem failure outside the export assembly step.
    Io,
    /// Invariant violation: undecodable response body, malformed record.
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    status: Option<u16>,
    body: Option<String>,
    resource: Option<i64>,
    stage: Option<&'static str>,
    path: Option<PathBuf>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            status: None,
            body: None,
            resource: None,
            stage: None,
            path: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// HTTP status for `Api`/`NotFound` errors; absent for local failures.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Raw response body captured with an `Api` error, when one was readable.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn resource(&self) -> Option<i64> {
        self.resource
    }

    /// Export pipeline stage that produced the error, when applicable.
    pub fn stage(&self) -> Option<&'static str> {
        self.stage
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_resource(mut self, resource: i64) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_stage(mut self, stage: &'static str) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(status) = self.status {
            write!(f, " (status: {status})")?;
        }
        if let Some(resource) = self.resource {
            write!(f, " (resource: {resource})")?;
        }
        if let Some(stage) = self.stage {
            write!(f, " (stage: {stage})")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}
