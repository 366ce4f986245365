//! Builds and upserts a `Work` object against the API server (§4.2 step 6).

use std::collections::BTreeMap;
use std::path::Path;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client};
use kratix_types::{build_work, BuiltWork, Work, WorkBuilderInput, WorkBuilderError, WorkflowType};
use thiserror::Error;
use tracing::info;

pub const FIELD_MANAGER: &str = "kratix-worker";

#[derive(Debug, Error)]
pub enum WorkWriterError {
    #[error(transparent)]
    Build(#[from] WorkBuilderError),
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

pub struct UpsertRequest<'a> {
    pub root_directory: &'a Path,
    pub promise_name: &'a str,
    pub resource_name: Option<&'a str>,
    pub namespace: Option<&'a str>,
    pub system_namespace: &'a str,
}

/// Build the Work for `req` and create-or-overwrite it in-place.
///
/// On conflict, fetches the existing object and overwrites only `spec`,
/// preserving object metadata set by anything other than this builder.
pub async fn upsert_work(client: Client, req: UpsertRequest<'_>) -> Result<(), WorkWriterError> {
    let workflow_type = if req.resource_name.is_some() {
        WorkflowType::Resource
    } else {
        WorkflowType::Promise
    };

    let BuiltWork { name, namespace, spec } = build_work(&WorkBuilderInput {
        root_directory: req.root_directory,
        promise_name: req.promise_name,
        resource_name: req.resource_name,
        namespace: req.namespace,
        workflow_type,
        system_namespace: req.system_namespace,
    })?;

    let mut labels = BTreeMap::new();
    labels.insert(
        kratix_types::constants::labels::PROMISE_NAME.to_string(),
        req.promise_name.to_string(),
    );

    let api: Api<Work> = Api::namespaced(client, &namespace);

    let work = Work {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.clone()),
            labels: Some(labels),
            ..Default::default()
        },
        spec,
    };

    match api.create(&PostParams::default(), &work).await {
        Ok(_) => {
            info!(work = %name, namespace = %namespace, "created Work");
            Ok(())
        }
        Err(kube::Error::Api(err)) if err.code == 409 => {
            info!(work = %name, namespace = %namespace, "Work exists, overwriting spec");
            let patch = serde_json::json!({ "spec": work.spec });
            api.patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(&patch))
                .await?;
            Ok(())
        }
        Err(other) => Err(other.into()),
    }
}
