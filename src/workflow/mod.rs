//! Drives a single configure/delete workflow to completion (§4.3).

pub mod objects;
pub mod pod;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Pod as K8sPod, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;
use kratix_types::PipelineStage;
use thiserror::Error;
use tracing::instrument;

pub use pod::{ObjectYamlSource, PodSpecInput};

pub const FIELD_MANAGER: &str = "kratix-controller";

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("promise has no work-creator image configured")]
    MissingWorkCreatorImage,
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("workflow Job never reached succeeded >= 1")]
    JobNeverSucceeded,
}

/// Promise-level (`Job`) or resource-request-level (`Pod`) workflow.
pub enum WorkflowLevel<'a> {
    Promise,
    Resource { resource_request_id: &'a str },
}

pub fn workflow_object_name(promise_name: &str, level: &WorkflowLevel<'_>) -> String {
    match level {
        WorkflowLevel::Promise => format!("{promise_name}-promise-pipeline"),
        WorkflowLevel::Resource { resource_request_id } => {
            format!("{promise_name}-resource-pipeline-{resource_request_id}")
        }
    }
}

/// Idempotently upsert the ServiceAccount/ClusterRole/ClusterRoleBinding/ConfigMap
/// a workflow needs, via server-side apply.
#[instrument(skip(client, selectors_yaml))]
pub async fn ensure_rbac_and_config(
    client: Client,
    promise_name: &str,
    namespace: &str,
    selectors_yaml: &str,
    delete: bool,
) -> Result<(), WorkflowError> {
    let params = PatchParams::apply(FIELD_MANAGER).force();

    let sa_api: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
    let sa = objects::service_account(promise_name, namespace);
    sa_api
        .patch(&sa.metadata.name.clone().unwrap(), &params, &Patch::Apply(&sa))
        .await?;

    let role_api: Api<ClusterRole> = Api::all(client.clone());
    let role = objects::cluster_role(promise_name, delete);
    role_api
        .patch(&role.metadata.name.clone().unwrap(), &params, &Patch::Apply(&role))
        .await?;

    let binding_api: Api<ClusterRoleBinding> = Api::all(client.clone());
    let binding = objects::cluster_role_binding(promise_name, namespace);
    binding_api
        .patch(&binding.metadata.name.clone().unwrap(), &params, &Patch::Apply(&binding))
        .await?;

    let cm_api: Api<k8s_openapi::api::core::v1::ConfigMap> = Api::namespaced(client, namespace);
    let cm = objects::destination_selectors_configmap(promise_name, namespace, selectors_yaml);
    cm_api
        .patch(&cm.metadata.name.clone().unwrap(), &params, &Patch::Apply(&cm))
        .await?;

    Ok(())
}

/// Idempotently upsert the ClusterRole/ClusterRoleBinding the in-process
/// dynamic resource-request controller needs to manage the Promise's CRD.
#[instrument(skip(client))]
pub async fn ensure_dynamic_controller_rbac(
    client: Client,
    promise_name: &str,
    group: &str,
    plural: &str,
    controller_namespace: &str,
    controller_service_account: &str,
) -> Result<(), WorkflowError> {
    let params = PatchParams::apply(FIELD_MANAGER).force();

    let role_api: Api<ClusterRole> = Api::all(client.clone());
    let role = objects::dynamic_controller_cluster_role(promise_name, group, plural);
    role_api
        .patch(&role.metadata.name.clone().unwrap(), &params, &Patch::Apply(&role))
        .await?;

    let binding_api: Api<ClusterRoleBinding> = Api::all(client);
    let binding = objects::dynamic_controller_cluster_role_binding(promise_name, controller_namespace, controller_service_account);
    binding_api
        .patch(&binding.metadata.name.clone().unwrap(), &params, &Patch::Apply(&binding))
        .await?;

    Ok(())
}

/// Upsert the Job (Promise-level) or Pod (resource-request-level) that runs
/// the pipeline, and report whether it has already finished.
#[instrument(skip(client, pipeline_stages))]
pub async fn ensure_workflow_object(
    client: Client,
    promise_name: &str,
    namespace: &str,
    system_namespace: &str,
    work_creator_image: &str,
    pipeline_stages: &[PipelineStage],
    source: ObjectYamlSource<'_>,
    level: WorkflowLevel<'_>,
) -> Result<bool, WorkflowError> {
    if work_creator_image.is_empty() {
        return Err(WorkflowError::MissingWorkCreatorImage);
    }

    let name = workflow_object_name(promise_name, &level);
    let resource_request_id = match &level {
        WorkflowLevel::Promise => None,
        WorkflowLevel::Resource { resource_request_id } => Some(*resource_request_id),
    };

    let input = PodSpecInput {
        promise_name,
        namespace,
        system_namespace,
        work_creator_image,
        pipeline_stages,
        resource_name: resource_request_id,
        object_yaml_source: source,
    };
    let template = pod::pod_template_spec(&input, resource_request_id);
    let params = PatchParams::apply(FIELD_MANAGER).force();

    match level {
        WorkflowLevel::Promise => {
            let api: Api<Job> = Api::namespaced(client, namespace);
            let job = Job {
                metadata: ObjectMeta {
                    name: Some(name.clone()),
                    namespace: Some(namespace.to_string()),
                    labels: template.metadata.clone().and_then(|m| m.labels),
                    ..Default::default()
                },
                spec: Some(JobSpec { template, ..Default::default() }),
                ..Default::default()
            };
            let applied = api.patch(&name, &params, &Patch::Apply(&job)).await?;
            Ok(job_succeeded(&applied))
        }
        WorkflowLevel::Resource { .. } => {
            if pipeline_has_run(client.clone(), system_namespace, promise_name, resource_request_id.unwrap()).await? {
                return Ok(true);
            }
            let api: Api<K8sPod> = Api::namespaced(client, system_namespace);
            let pod = K8sPod {
                metadata: ObjectMeta {
                    name: Some(name.clone()),
                    namespace: Some(system_namespace.to_string()),
                    labels: template.metadata.clone().and_then(|m| m.labels),
                    ..Default::default()
                },
                spec: template.spec.clone(),
                ..Default::default()
            };
            api.patch(&name, &params, &Patch::Apply(&pod)).await?;
            Ok(false)
        }
    }
}

fn job_succeeded(job: &Job) -> bool {
    job.status.as_ref().and_then(|s| s.succeeded).unwrap_or(0) >= 1
}

/// Pipeline-has-run predicate (§4.3): existence of any Pod in the system
/// namespace carrying the resource-request identifier label. Once true, the
/// configure pipeline for this identifier never runs again.
pub async fn pipeline_has_run(
    client: Client,
    system_namespace: &str,
    promise_name: &str,
    resource_request_id: &str,
) -> Result<bool, WorkflowError> {
    let api: Api<K8sPod> = Api::namespaced(client, system_namespace);
    let selector = format!(
        "{}={},{}={}",
        kratix_types::constants::labels::PROMISE_ID,
        promise_name,
        kratix_types::constants::labels::RESOURCE_REQUEST_ID,
        resource_request_id,
    );
    let pods = api.list(&ListParams::default().labels(&selector)).await?;
    Ok(!pods.items.is_empty())
}

/// Whether a resource-request pod with the given identifier has terminated successfully.
pub fn resource_pod_succeeded(pod: &K8sPod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .map(|phase| phase == "Succeeded")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::batch::v1::JobStatus;

    #[test]
    fn job_with_no_status_has_not_succeeded() {
        let job = Job::default();
        assert!(!job_succeeded(&job));
    }

    #[test]
    fn job_with_succeeded_count_has_succeeded() {
        let job = Job {
            status: Some(JobStatus { succeeded: Some(1), ..Default::default() }),
            ..Default::default()
        };
        assert!(job_succeeded(&job));
    }

    #[test]
    fn pod_phase_succeeded_is_recognised() {
        let mut pod = K8sPod::default();
        pod.status = Some(k8s_openapi::api::core::v1::PodStatus {
            phase: Some("Succeeded".to_string()),
            ..Default::default()
        });
        assert!(resource_pod_succeeded(&pod));
    }
}
