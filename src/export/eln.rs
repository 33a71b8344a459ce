//! Purpose: Assemble ELN interchange archives (zip + JSON-LD manifest).
//! Exports: `export_eln` (crate-internal entry point).
//! Role: The multi-stage export pipeline: fetch metadata, fetch attachments,
//! Role: assemble atomically, report per-resource outcomes.
//! Invariants: Every file listed in the manifest exists in the archive.
//! Invariants: A resource whose attachment download fails degrades to
//! Invariants: metadata-only; only assembly failures abort the whole job.
//! Invariants: Manifests embed no wall-clock time, so unchanged upstream
//! Invariants: data produces byte-identical manifests.
#![allow(clippy::result_large_err)]

use crate::api::Transport;
use crate::core::error::{Error, ErrorKind};
use crate::core::record::Record;
use crate::export::{
    EntityKind, ExportFailure, ExportFormat, ExportOutcome, ExportReport, ExportStage,
    destination_parent, persist_temp, sanitize_filename,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};
use zip::ZipWriter;
use zip::write::FileOptions;

struct ArchiveAttachment {
    name: String,
    bytes: Vec<u8>,
    sha256: String,
}

#[derive(Serialize)]
struct EntityRef {
    #[serde(rename = "@id")]
    id: String,
}

impl EntityRef {
    fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Serialize)]
struct MetadataDescriptor {
    #[serde(rename = "@id")]
    id: &'static str,
    #[serde(rename = "@type")]
    node_type: &'static str,
    about: EntityRef,
    #[serde(rename = "conformsTo")]
    conforms_to: EntityRef,
}

#[derive(Serialize)]
struct DatasetNode {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@type")]
    node_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    identifier: Option<i64>,
    #[serde(rename = "dateCreated", skip_serializing_if = "Option::is_none")]
    date_created: Option<String>,
    #[serde(rename = "creativeWorkStatus", skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(rename = "hasPart")]
    has_part: Vec<EntityRef>,
}

#[derive(Serialize)]
struct FileNode {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@type")]
    node_type: &'static str,
    name: String,
    #[serde(rename = "encodingFormat", skip_serializing_if = "Option::is_none")]
    encoding_format: Option<&'static str>,
    #[serde(rename = "contentSize", skip_serializing_if = "Option::is_none")]
    content_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha256: Option<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum GraphNode {
    Descriptor(MetadataDescriptor),
    Dataset(DatasetNode),
    File(FileNode),
}

#[derive(Serialize)]
struct Manifest {
    #[serde(rename = "@context")]
    context: &'static str,
    #[serde(rename = "@graph")]
    graph: Vec<GraphNode>,
}

struct FetchedResource {
    id: i64,
    record: Record,
    dir: String,
    attachments: Vec<ArchiveAttachment>,
    failed_attachments: Vec<String>,
}

enum ItemState {
    Fetched(FetchedResource),
    Failed(ExportFailure),
}

pub(crate) fn export_eln(
    transport: &Transport,
    kind: EntityKind,
    ids: &[i64],
    destination: &Path,
) -> Result<ExportReport, Error> {
    let ids = dedup_ids(ids);
    let mut states: Vec<(i64, ItemState)> = Vec::with_capacity(ids.len());

    debug!(stage = ExportStage::FetchingMetadata.as_str(), "eln export");
    for id in &ids {
        match fetch_resource(transport, kind, *id) {
            Ok(resource) => states.push((*id, ItemState::Fetched(resource))),
            Err(err) => {
                warn!(resource = id, error = %err, "resource fetch failed, recording per-item");
                states.push((*id, ItemState::Failed(ExportFailure::from_error(&err))));
            }
        }
    }

    debug!(stage = ExportStage::FetchingAttachments.as_str(), "eln export");
    for (_, state) in &mut states {
        if let ItemState::Fetched(resource) = state {
            fetch_attachments(transport, kind, resource);
        }
    }

    debug!(stage = ExportStage::Assembling.as_str(), "eln export");
    let fetched: Vec<&FetchedResource> = states
        .iter()
        .filter_map(|(_, state)| match state {
            ItemState::Fetched(resource) => Some(resource),
            ItemState::Failed(_) => None,
        })
        .collect();
    assemble(destination, &fetched)?;

    let mut report = ExportReport::new(destination, ExportFormat::Eln);
    for (id, state) in states {
        let outcome = match state {
            ItemState::Fetched(resource) if resource.failed_attachments.is_empty() => {
                ExportOutcome::Exported
            }
            ItemState::Fetched(resource) => ExportOutcome::MetadataOnly {
                failed_attachments: resource.failed_attachments,
            },
            ItemState::Failed(failure) => ExportOutcome::Failed(failure),
        };
        report.push(id, outcome);
    }
    debug!(
        stage = ExportStage::Done.as_str(),
        exported = report.exported,
        metadata_only = report.metadata_only,
        failed = report.failed,
        "eln export"
    );
    Ok(report)
}

fn dedup_ids(ids: &[i64]) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn fetch_resource(
    transport: &Transport,
    kind: EntityKind,
    id: i64,
) -> Result<FetchedResource, Error> {
    let value = transport
        .get_json(&[kind.endpoint(), &id.to_string()], &[])
        .map_err(|err| err.with_resource(id).with_stage(ExportStage::FetchingMetadata.as_str()))?;
    let record = Record::from_value(value)?;
    let dir = resource_dir(kind, &record, id);
    Ok(FetchedResource {
        id,
        record,
        dir,
        attachments: Vec::new(),
        failed_attachments: Vec::new(),
    })
}

fn fetch_attachments(transport: &Transport, kind: EntityKind, resource: &mut FetchedResource) {
    let mut used_names = vec!["metadata.json".to_string()];
    for attachment in crate::api::attachments_of(&resource.record) {
        let upload_id = attachment.upload_id.to_string();
        let result = transport.get_bytes(
            &[
                kind.endpoint(),
                &resource.id.to_string(),
                "uploads",
                &upload_id,
            ],
            &[("format", "binary")],
        );
        match result {
            Ok(bytes) => {
                let name = archive_name(&attachment.filename, attachment.upload_id, &used_names);
                used_names.push(name.clone());
                let sha256 = sha256_hex(&bytes);
                resource.attachments.push(ArchiveAttachment {
                    name,
                    bytes,
                    sha256,
                });
            }
            Err(err) => {
                warn!(
                    resource = resource.id,
                    upload = attachment.upload_id,
                    error = %err,
                    "attachment download failed, degrading to metadata-only"
                );
                resource.failed_attachments.push(attachment.filename);
            }
        }
    }
}

/// Archive entry name for an attachment: the sanitized original filename,
/// prefixed with the upload id only when it would collide with an earlier
/// entry in the same resource directory.
fn archive_name(filename: &str, upload_id: i64, used: &[String]) -> String {
    let base = sanitize_filename(filename);
    let base = if base.is_empty() {
        format!("upload-{upload_id}")
    } else {
        base
    };
    if used.iter().any(|name| name == &base) {
        format!("{upload_id}_{base}")
    } else {
        base
    }
}

fn resource_dir(kind: EntityKind, record: &Record, id: i64) -> String {
    match record.text(&["title"]).map(|t| sanitize_filename(&t)) {
        Some(title) if !title.is_empty() => format!("{} - {} - {}", kind.dir_prefix(), title, id),
        _ => format!("{} - {}", kind.dir_prefix(), id),
    }
}

fn assemble(destination: &Path, resources: &[&FetchedResource]) -> Result<(), Error> {
    let parent = destination_parent(destination);
    let temp = tempfile::NamedTempFile::new_in(parent).map_err(|err| {
        Error::new(ErrorKind::Export)
            .with_message("failed to create temporary archive")
            .with_stage(ExportStage::Assembling.as_str())
            .with_path(destination)
            .with_source(err)
    })?;
    let root = archive_root(destination);
    let manifest = build_manifest(resources);
    let manifest_bytes = serde_json::to_vec_pretty(&manifest).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode manifest")
            .with_source(err)
    })?;

    let (file, temp_path) = temp.into_parts();
    let mut zip = ZipWriter::new(file);
    let opts = FileOptions::default();

    zip.add_directory(format!("{root}/"), opts)
        .map_err(|err| zip_error(destination, err))?;
    zip.start_file(format!("{root}/ro-crate-metadata.json"), opts)
        .map_err(|err| zip_error(destination, err))?;
    zip.write_all(&manifest_bytes)
        .map_err(|err| write_error(destination, err))?;

    for resource in resources {
        let metadata = serde_json::to_vec_pretty(&resource.record.as_value()).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode resource metadata")
                .with_source(err)
        })?;
        zip.add_directory(format!("{root}/{}/", resource.dir), opts)
            .map_err(|err| zip_error(destination, err))?;
        zip.start_file(format!("{root}/{}/metadata.json", resource.dir), opts)
            .map_err(|err| zip_error(destination, err))?;
        zip.write_all(&metadata)
            .map_err(|err| write_error(destination, err))?;
        for attachment in &resource.attachments {
            zip.start_file(format!("{root}/{}/{}", resource.dir, attachment.name), opts)
                .map_err(|err| zip_error(destination, err))?;
            zip.write_all(&attachment.bytes)
                .map_err(|err| write_error(destination, err))?;
        }
    }

    let file = zip.finish().map_err(|err| zip_error(destination, err))?;
    persist_temp(tempfile::NamedTempFile::from_parts(file, temp_path), destination)
}

fn zip_error(destination: &Path, err: zip::result::ZipError) -> Error {
    Error::new(ErrorKind::Export)
        .with_message("failed to write archive entry")
        .with_stage(ExportStage::Assembling.as_str())
        .with_path(destination)
        .with_source(err)
}

fn write_error(destination: &Path, err: std::io::Error) -> Error {
    Error::new(ErrorKind::Export)
        .with_message("failed to write archive data")
        .with_stage(ExportStage::Assembling.as_str())
        .with_path(destination)
        .with_source(err)
}

/// Root directory inside the archive, derived from the destination file stem
/// so repeated exports of the same destination produce the same layout.
fn archive_root(destination: &Path) -> String {
    let stem = destination
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(sanitize_filename)
        .unwrap_or_default();
    if stem.is_empty() {
        "export".to_string()
    } else {
        stem
    }
}

/// JSON-LD manifest per the ELN file format: an RO-Crate graph with the
/// metadata descriptor, the root dataset, one dataset per resource, and one
/// file node per archived file. Only server-reported dates appear, so the
/// manifest is deterministic for unchanged upstream data.
fn build_manifest(resources: &[&FetchedResource]) -> Manifest {
    let mut graph: Vec<GraphNode> = Vec::new();
    graph.push(GraphNode::Descriptor(MetadataDescriptor {
        id: "ro-crate-metadata.json",
        node_type: "CreativeWork",
        about: EntityRef::new("./"),
        conforms_to: EntityRef::new("https://w3id.org/ro/crate/1.1"),
    }));

    graph.push(GraphNode::Dataset(DatasetNode {
        id: "./".to_string(),
        node_type: "Dataset",
        name: None,
        identifier: None,
        date_created: None,
        status: None,
        has_part: resources
            .iter()
            .map(|resource| EntityRef::new(format!("./{}/", resource.dir)))
            .collect(),
    }));

    for resource in resources {
        let dir = &resource.dir;
        let mut has_part = vec![EntityRef::new(format!("./{dir}/metadata.json"))];
        for attachment in &resource.attachments {
            has_part.push(EntityRef::new(format!("./{dir}/{}", attachment.name)));
        }

        graph.push(GraphNode::Dataset(DatasetNode {
            id: format!("./{dir}/"),
            node_type: "Dataset",
            name: resource.record.text(&["title"]),
            identifier: Some(resource.id),
            date_created: resource
                .record
                .text(&["created_at"])
                .map(|raw| normalize_datetime(&raw).unwrap_or(raw)),
            status: resource.record.text(&["status_title", "status"]),
            has_part,
        }));

        graph.push(GraphNode::File(FileNode {
            id: format!("./{dir}/metadata.json"),
            node_type: "File",
            name: "metadata.json".to_string(),
            encoding_format: Some("application/json"),
            content_size: None,
            sha256: None,
        }));
        for attachment in &resource.attachments {
            graph.push(GraphNode::File(FileNode {
                id: format!("./{dir}/{}", attachment.name),
                node_type: "File",
                name: attachment.name.clone(),
                encoding_format: None,
                content_size: Some(attachment.bytes.len().to_string()),
                sha256: Some(attachment.sha256.clone()),
            }));
        }
    }

    Manifest {
        context: "https://w3id.org/ro/crate/1.1/context",
        graph,
    }
}

/// Normalize the server's `YYYY-MM-DD HH:MM:SS` datetimes to RFC3339 (UTC
/// assumed). Values already in RFC3339 pass through re-formatted; anything
/// else is left to the caller's fallback.
fn normalize_datetime(raw: &str) -> Option<String> {
    use time::format_description::well_known::Rfc3339;

    if let Ok(parsed) = time::OffsetDateTime::parse(raw, &Rfc3339) {
        return parsed.format(&Rfc3339).ok();
    }
    let description =
        time::format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]").ok()?;
    let parsed = time::PrimitiveDateTime::parse(raw, &description).ok()?;
    parsed.assume_utc().format(&Rfc3339).ok()
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
