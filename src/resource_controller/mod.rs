//! The dynamically registered controller that reconciles instances of a
//! Promise's API (§4.6). One instance of this reconcile loop runs per live
//! Promise, watching that Promise's GVK as a `DynamicObject`.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::core::{DynamicObject, GroupVersionKind};
use kube::runtime::controller::Action;
use kube::Client;
use kratix_types::constants::resource_finalizers;
use kratix_types::PipelineStage;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::conditions;
use crate::registry::DynamicControllerHandle;
use crate::workflow::{self, ObjectYamlSource, WorkflowError, WorkflowLevel};

pub const PIPELINE_COMPLETED_CONDITION: &str = "PipelineCompleted";
pub const REASON_PIPELINE_NOT_COMPLETED: &str = "PipelineNotCompleted";

#[derive(Debug, Error)]
pub enum ResourceControllerError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}

pub struct ResourceControllerContext {
    pub client: Client,
    pub handle: Arc<DynamicControllerHandle>,
    pub system_namespace: String,
    pub work_creator_image: String,
    pub pipeline_stages: Vec<PipelineStage>,
    pub default_requeue: Duration,
}

/// A 5-character slice of a UUIDv4, overridable for deterministic tests.
pub fn short_uuid() -> String {
    if let Ok(forced) = std::env::var(kratix_types::constants::env::POD_IDENTIFIER_OVERRIDE) {
        return forced;
    }
    uuid::Uuid::new_v4().simple().to_string()[..5].to_string()
}

/// The identifier under which the Work for this resource request was emitted.
pub fn work_name(promise_identifier: &str, namespace: &str, name: &str) -> String {
    format!("{promise_identifier}-{namespace}-{name}")
}

#[instrument(skip(obj, ctx), fields(name = %obj.metadata.name.clone().unwrap_or_default()))]
pub async fn reconcile(
    obj: Arc<DynamicObject>,
    ctx: Arc<ResourceControllerContext>,
) -> Result<Action, ResourceControllerError> {
    if !ctx.handle.enabled.load(Ordering::SeqCst) {
        return Ok(Action::await_change());
    }

    let name = obj.metadata.name.clone().unwrap_or_default();
    let namespace = obj.metadata.namespace.clone().unwrap_or_else(|| ctx.system_namespace.clone());
    let gvk = ctx.handle.gvk.lock().unwrap().clone();
    let api: Api<DynamicObject> = dynamic_api(ctx.client.clone(), &gvk, &namespace);

    if obj.metadata.deletion_timestamp.is_some() {
        return delete_resources(&api, &obj, &ctx, &name, &namespace).await;
    }

    let finalizers = obj.metadata.finalizers.clone().unwrap_or_default();
    let missing: Vec<&str> = [resource_finalizers::WORK_CLEANUP, resource_finalizers::PIPELINE_CLEANUP]
        .into_iter()
        .filter(|f| !finalizers.iter().any(|existing| existing == f))
        .collect();
    if !missing.is_empty() {
        add_finalizers(&api, &name, &finalizers, &missing).await?;
        return Ok(Action::requeue(ctx.default_requeue));
    }

    let resource_request_id = format!("{}-{}", ctx.handle.promise_identifier, name);
    if workflow::pipeline_has_run(ctx.client.clone(), &ctx.system_namespace, &ctx.handle.promise_identifier, &resource_request_id).await? {
        return Ok(Action::await_change());
    }

    set_condition_if_unset(&api, &obj, &name).await?;

    if !ctx.handle.can_create_resources.load(Ordering::SeqCst) {
        info!("requirements not fulfilled yet, deferring pipeline launch");
        return Ok(Action::requeue(ctx.default_requeue));
    }

    let source = ObjectYamlSource { group: &gvk.group, version: &gvk.version, kind: &gvk.kind, plural: &gvk.kind.to_lowercase(), name: &name };
    workflow::ensure_workflow_object(
        ctx.client.clone(),
        &ctx.handle.promise_identifier,
        &namespace,
        &ctx.system_namespace,
        &ctx.work_creator_image,
        &ctx.pipeline_stages,
        source,
        WorkflowLevel::Resource { resource_request_id: &short_uuid() },
    )
    .await?;

    Ok(Action::requeue(ctx.default_requeue))
}

async fn set_condition_if_unset(
    api: &Api<DynamicObject>,
    obj: &DynamicObject,
    name: &str,
) -> Result<(), ResourceControllerError> {
    let mut conditions_value: Vec<k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition> = obj
        .data
        .get("status")
        .and_then(|s| s.get("conditions"))
        .and_then(|c| serde_json::from_value(c.clone()).ok())
        .unwrap_or_default();

    if conditions::get(&conditions_value, PIPELINE_COMPLETED_CONDITION).is_some() {
        return Ok(());
    }
    conditions::upsert(&mut conditions_value, PIPELINE_COMPLETED_CONDITION, "False", REASON_PIPELINE_NOT_COMPLETED, "pipeline has not completed", None);

    let patch = serde_json::json!({ "status": { "conditions": conditions_value } });
    api.patch_status(name, &PatchParams::apply(workflow::FIELD_MANAGER).force(), &Patch::Merge(&patch)).await?;
    Ok(())
}

async fn add_finalizers(
    api: &Api<DynamicObject>,
    name: &str,
    existing: &[String],
    missing: &[&str],
) -> Result<(), ResourceControllerError> {
    let mut finalizers = existing.to_vec();
    finalizers.extend(missing.iter().map(|f| f.to_string()));
    let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    api.patch(name, &PatchParams::apply(workflow::FIELD_MANAGER).force(), &Patch::Merge(&patch)).await?;
    Ok(())
}

async fn remove_finalizer(
    api: &Api<DynamicObject>,
    name: &str,
    existing: &[String],
    to_remove: &str,
) -> Result<(), ResourceControllerError> {
    let finalizers: Vec<String> = existing.iter().filter(|f| f.as_str() != to_remove).cloned().collect();
    let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    api.patch(name, &PatchParams::apply(workflow::FIELD_MANAGER).force(), &Patch::Merge(&patch)).await?;
    Ok(())
}

async fn delete_resources(
    api: &Api<DynamicObject>,
    obj: &DynamicObject,
    ctx: &ResourceControllerContext,
    name: &str,
    namespace: &str,
) -> Result<Action, ResourceControllerError> {
    let finalizers = obj.metadata.finalizers.clone().unwrap_or_default();

    if finalizers.iter().any(|f| f == resource_finalizers::WORK_CLEANUP) {
        let work_api: Api<kratix_types::Work> = Api::namespaced(ctx.client.clone(), &ctx.system_namespace);
        let work_name = work_name(&ctx.handle.promise_identifier, namespace, name);
        match work_api.delete(&work_name, &Default::default()).await {
            Ok(_) => {}
            Err(kube::Error::Api(err)) if err.code == 404 => {}
            Err(other) => return Err(other.into()),
        }
        remove_finalizer(api, name, &finalizers, resource_finalizers::WORK_CLEANUP).await?;
        return Ok(Action::requeue(ctx.default_requeue));
    }

    if finalizers.iter().any(|f| f == resource_finalizers::PIPELINE_CLEANUP) {
        let pod_api: Api<Pod> = Api::namespaced(ctx.client.clone(), &ctx.system_namespace);
        let selector = format!(
            "{}={},{}={}-{}",
            kratix_types::constants::labels::PROMISE_ID,
            ctx.handle.promise_identifier,
            kratix_types::constants::labels::RESOURCE_REQUEST_ID,
            ctx.handle.promise_identifier,
            name,
        );
        let pods = pod_api.list(&ListParams::default().labels(&selector)).await?;
        for pod in &pods.items {
            if let Some(pod_name) = &pod.metadata.name {
                match pod_api.delete(pod_name, &Default::default()).await {
                    Ok(_) => {}
                    Err(kube::Error::Api(err)) if err.code == 404 => {}
                    Err(other) => return Err(other.into()),
                }
            }
        }
        if pods.items.is_empty() {
            remove_finalizer(api, name, &finalizers, resource_finalizers::PIPELINE_CLEANUP).await?;
        }
        return Ok(Action::requeue(ctx.default_requeue));
    }

    warn!("both finalizers already removed, awaiting garbage collection");
    Ok(Action::await_change())
}

fn dynamic_api(client: Client, gvk: &GroupVersionKind, namespace: &str) -> Api<DynamicObject> {
    let plural = format!("{}s", gvk.kind.to_lowercase());
    let api_resource = kube::api::ApiResource::from_gvk_with_plural(gvk, &plural);
    Api::namespaced_with(client, namespace, &api_resource)
}

/// The `Api<DynamicObject>` a freshly spawned resource-request controller
/// should watch for a given Promise's installed CRD kind, across all namespaces.
pub fn watched_api(client: Client, gvk: &GroupVersionKind) -> Api<DynamicObject> {
    let plural = format!("{}s", gvk.kind.to_lowercase());
    let api_resource = kube::api::ApiResource::from_gvk_with_plural(gvk, &plural);
    Api::all_with(client, &api_resource)
}

pub fn error_policy(_obj: Arc<DynamicObject>, error: &ResourceControllerError, ctx: Arc<ResourceControllerContext>) -> Action {
    tracing::error!(error = %error, "resource-request reconcile failed");
    Action::requeue(ctx.default_requeue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_uuid_override_is_honoured() {
        std::env::set_var(kratix_types::constants::env::POD_IDENTIFIER_OVERRIDE, "abcde");
        assert_eq!(short_uuid(), "abcde");
        std::env::remove_var(kratix_types::constants::env::POD_IDENTIFIER_OVERRIDE);
    }

    #[test]
    fn short_uuid_without_override_is_five_chars() {
        std::env::remove_var(kratix_types::constants::env::POD_IDENTIFIER_OVERRIDE);
        assert_eq!(short_uuid().len(), 5);
    }

    #[test]
    fn work_name_matches_promise_namespace_name_convention() {
        assert_eq!(work_name("postgres", "team-a", "my-db"), "postgres-team-a-my-db");
    }
}
