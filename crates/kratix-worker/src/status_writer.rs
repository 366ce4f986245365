//! Merges `/work-creator-files/metadata/status.yaml` into the triggering
//! object's `status` subresource. The object's kind is opaque to this crate
//! (it's the Promise's own CRD), so it is addressed dynamically.

use std::path::Path;

use kube::api::{Api, ApiResource, DynamicObject, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::Client;
use thiserror::Error;
use tracing::info;

pub const FIELD_MANAGER: &str = "kratix-worker-status";

#[derive(Debug, Error)]
pub enum StatusWriterError {
    #[error("reading {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing status.yaml as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

pub struct StatusWriteRequest<'a> {
    pub status_file: &'a Path,
    pub group: &'a str,
    pub version: &'a str,
    pub kind: &'a str,
    pub plural: &'a str,
    pub namespace: &'a str,
    pub name: &'a str,
}

/// If `status.yaml` is absent, there is nothing to merge — not an error, the
/// pipeline simply chose not to report status this run.
pub async fn write_status(client: Client, req: StatusWriteRequest<'_>) -> Result<(), StatusWriterError> {
    if !req.status_file.exists() {
        info!(path = ?req.status_file, "no status.yaml produced, skipping status patch");
        return Ok(());
    }

    let raw = std::fs::read_to_string(req.status_file).map_err(|source| StatusWriterError::Io {
        path: req.status_file.to_path_buf(),
        source,
    })?;
    let status: serde_json::Value = serde_yaml::from_str(&raw)?;

    let gvk = GroupVersionKind {
        group: req.group.to_string(),
        version: req.version.to_string(),
        kind: req.kind.to_string(),
    };
    let api_resource = ApiResource::from_gvk_with_plural(&gvk, req.plural);
    let api: Api<DynamicObject> =
        Api::namespaced_with(client, req.namespace, &api_resource);

    let patch = serde_json::json!({ "status": status });
    api.patch_status(
        req.name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Merge(&patch),
    )
    .await?;

    info!(name = %req.name, namespace = %req.namespace, "patched status");
    Ok(())
}
