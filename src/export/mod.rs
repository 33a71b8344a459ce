//! Purpose: Export laboratory resources to files: binary formats and ELN archives.
//! Exports: `ExportFormat`, `ExportStage`, `ExportOutcome`, `ExportReport`,
//! Exports: `suggested_filename`.
//! Role: Consumes fetched resources and writes exactly one artifact per job.
//! Invariants: Destination writes are atomic; a failed job leaves no file
//! Invariants: at the destination path.
//! Invariants: Re-running a job with unchanged upstream data overwrites the
//! Invariants: destination deterministically.
#![allow(clippy::result_large_err)]

pub(crate) mod eln;

use crate::api::Transport;
use crate::core::error::{Error, ErrorKind};
use crate::core::record::Record;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Which entity family an export job addresses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum EntityKind {
    Experiments,
    Items,
}

impl EntityKind {
    pub(crate) fn endpoint(self) -> &'static str {
        match self {
            EntityKind::Experiments => "experiments",
            EntityKind::Items => "items",
        }
    }

    pub(crate) fn dir_prefix(self) -> &'static str {
        match self {
            EntityKind::Experiments => "experiment",
            EntityKind::Items => "item",
        }
    }
}

/// Output format of one export call. Binary formats are rendered server-side
/// and written verbatim; `Json` writes the fetched record; `Eln` assembles a
/// zip archive locally.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExportFormat {
    Csv,
    Json,
    Pdf,
    PdfA,
    Eln,
}

impl ExportFormat {
    /// Value of the upstream `format` query parameter.
    pub(crate) fn query_value(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Pdf => "pdf",
            ExportFormat::PdfA => "pdfa",
            ExportFormat::Eln => "eln",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Pdf | ExportFormat::PdfA => "pdf",
            ExportFormat::Eln => "eln",
        }
    }
}

/// Job progression. `Failed` is reachable from every non-terminal state;
/// binary jobs skip the attachment stage entirely.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExportStage {
    Pending,
    FetchingMetadata,
    FetchingAttachments,
    Assembling,
    Done,
    Failed,
}

impl ExportStage {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ExportStage::Pending => "pending",
            ExportStage::FetchingMetadata => "fetching-metadata",
            ExportStage::FetchingAttachments => "fetching-attachments",
            ExportStage::Assembling => "assembling",
            ExportStage::Done => "done",
            ExportStage::Failed => "failed",
        }
    }
}

/// Captured failure for one resource inside a batch. `Error` is not `Clone`,
/// so the report keeps the fields callers need to decide on a retry.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl ExportFailure {
    pub(crate) fn from_error(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.message().unwrap_or("export failed").to_string(),
            status: err.status(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExportOutcome {
    /// Metadata and every attachment made it into the artifact.
    Exported,
    /// The resource record is in the artifact, but one or more attachment
    /// downloads failed; their filenames are listed.
    MetadataOnly { failed_attachments: Vec<String> },
    /// The resource could not be fetched at all.
    Failed(ExportFailure),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExportEntry {
    pub resource_id: i64,
    pub outcome: ExportOutcome,
}

/// Per-job result: one entry per requested resource id, in request order.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportReport {
    pub destination: PathBuf,
    pub format: ExportFormat,
    pub entries: Vec<ExportEntry>,
    pub exported: usize,
    pub metadata_only: usize,
    pub failed: usize,
}

impl ExportReport {
    pub(crate) fn new(destination: &Path, format: ExportFormat) -> Self {
        Self {
            destination: destination.to_path_buf(),
            format,
            entries: Vec::new(),
            exported: 0,
            metadata_only: 0,
            failed: 0,
        }
    }

    pub(crate) fn push(&mut self, resource_id: i64, outcome: ExportOutcome) {
        match &outcome {
            ExportOutcome::Exported => self.exported += 1,
            ExportOutcome::MetadataOnly { .. } => self.metadata_only += 1,
            ExportOutcome::Failed(_) => self.failed += 1,
        }
        self.entries.push(ExportEntry {
            resource_id,
            outcome,
        });
    }

    /// True when every requested resource was exported with all attachments.
    pub fn is_complete(&self) -> bool {
        self.metadata_only == 0 && self.failed == 0
    }
}

/// Single-resource export. Fetch failures propagate immediately (there is no
/// batch to degrade into); `Eln` delegates to the archive pipeline.
pub(crate) fn run_single(
    transport: &Transport,
    kind: EntityKind,
    id: i64,
    format: ExportFormat,
    destination: &Path,
) -> Result<ExportReport, Error> {
    match format {
        ExportFormat::Eln => eln::export_eln(transport, kind, &[id], destination),
        ExportFormat::Json => {
            debug!(id, stage = ExportStage::FetchingMetadata.as_str(), "export");
            let value = transport
                .get_json(&[kind.endpoint(), &id.to_string()], &[])
                .map_err(|err| err.with_resource(id))?;
            let record = Record::from_value(value)?;
            let bytes = serde_json::to_vec_pretty(&record.as_value()).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode record json")
                    .with_source(err)
            })?;
            write_artifact(destination, &bytes, format, id)
        }
        ExportFormat::Csv | ExportFormat::Pdf | ExportFormat::PdfA => {
            debug!(id, stage = ExportStage::FetchingMetadata.as_str(), "export");
            let bytes = transport
                .get_bytes(
                    &[kind.endpoint(), &id.to_string()],
                    &[("format", format.query_value())],
                )
                .map_err(|err| err.with_resource(id))?;
            write_artifact(destination, &bytes, format, id)
        }
    }
}

fn write_artifact(
    destination: &Path,
    bytes: &[u8],
    format: ExportFormat,
    id: i64,
) -> Result<ExportReport, Error> {
    debug!(id, stage = ExportStage::Assembling.as_str(), "export");
    write_atomic(destination, bytes)?;
    let mut report = ExportReport::new(destination, format);
    report.push(id, ExportOutcome::Exported);
    debug!(id, stage = ExportStage::Done.as_str(), "export");
    Ok(report)
}

/// Write `bytes` to `destination` via a temporary file in the same directory
/// plus a rename, so a crash mid-write never leaves a partial artifact.
pub(crate) fn write_atomic(destination: &Path, bytes: &[u8]) -> Result<(), Error> {
    let parent = destination_parent(destination);
    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|err| {
        Error::new(ErrorKind::Export)
            .with_message("failed to create temporary export file")
            .with_stage(ExportStage::Assembling.as_str())
            .with_path(destination)
            .with_source(err)
    })?;
    temp.write_all(bytes).map_err(|err| {
        Error::new(ErrorKind::Export)
            .with_message("failed to write export artifact")
            .with_stage(ExportStage::Assembling.as_str())
            .with_path(destination)
            .with_source(err)
    })?;
    persist_temp(temp, destination)
}

pub(crate) fn destination_parent(destination: &Path) -> &Path {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

pub(crate) fn persist_temp(
    temp: tempfile::NamedTempFile,
    destination: &Path,
) -> Result<(), Error> {
    temp.persist(destination).map(drop).map_err(|err| {
        Error::new(ErrorKind::Export)
            .with_message("failed to move export artifact into place")
            .with_stage(ExportStage::Assembling.as_str())
            .with_path(destination)
            .with_source(err.error)
    })
}

/// Autogenerated output name matching the original client's convention:
/// sanitized title, the id in brackets, then the format extension.
pub fn suggested_filename(title: &str, id: i64, format: ExportFormat) -> String {
    let base = sanitize_filename(title);
    let base = if base.is_empty() {
        format!("[{id}]")
    } else {
        format!("{base} [{id}]")
    };
    format!("{base}.{}", format.extension())
}

/// Strip path separators and characters that are invalid in common
/// filesystems; collapse whitespace runs left behind.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_space = true;
    for ch in name.chars() {
        let keep = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => false,
            _ if ch.is_control() => false,
            _ => true,
        };
        if keep {
            if ch.is_whitespace() {
                if !last_space {
                    out.push(' ');
                }
                last_space = true;
            } else {
                out.push(ch);
                last_space = false;
            }
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim().to_string()
}
