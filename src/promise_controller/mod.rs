//! The top-level Promise reconciler (§4.7). No explicit state enum: every
//! state is a predicate over objects already observable on the cluster, so
//! the reconciler is safe to re-enter after a restart at any point.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apiextensions_k8s1::v1::{CustomResourceDefinition, CustomResourceDefinitionSpec};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use futures::StreamExt;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::Client;
use kratix_types::constants::{promise_finalizers, DEPENDENCY_REPLICAS};
use kratix_types::{Promise, PromiseAvailability, Work, WorkDestinationSelector, WorkSpec, Workload, WorkloadGroup};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::conditions;
use crate::registry::{DynamicControllerRegistry, EnsureOutcome, RegistryError};
use crate::requirements::{self, PromiseSnapshot};
use crate::resource_controller::{self, ResourceControllerContext};
use crate::workflow::{self, objects, ObjectYamlSource, WorkflowError, WorkflowLevel};

#[derive(Debug, Error)]
pub enum PromiseControllerError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("dynamic controller registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("work builder error: {0}")]
    WorkBuilder(#[from] kratix_types::WorkBuilderError),
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}

pub struct PromiseControllerContext {
    pub client: Client,
    pub registry: Arc<DynamicControllerRegistry>,
    pub system_namespace: String,
    pub work_creator_image: String,
    pub default_requeue: Duration,
}

#[instrument(skip(promise, ctx), fields(name = %promise.metadata.name.clone().unwrap_or_default()))]
pub async fn reconcile(promise: Arc<Promise>, ctx: Arc<PromiseControllerContext>) -> Result<Action, PromiseControllerError> {
    if promise.metadata.deletion_timestamp.is_some() {
        return delete(promise, ctx).await;
    }

    let name = promise.metadata.name.clone().unwrap_or_default();
    let api: Api<Promise> = Api::namespaced(ctx.client.clone(), &ctx.system_namespace);

    ensure_finalizer(&api, &promise, &name).await?;

    if let Some(spec_api) = &promise.spec.api {
        if !crd_established(&ctx.client, spec_api).await? {
            apply_crd(&ctx.client, &name, spec_api).await?;
            return Ok(Action::requeue(ctx.default_requeue));
        }
    }

    let promise_uid = promise.metadata.uid.clone().unwrap_or_default();
    let gvk = promise
        .spec
        .api
        .as_ref()
        .map(|api| GroupVersionKind { group: "platform.kratix.io".to_string(), version: api.api_version.clone(), kind: api.kind.clone() })
        .unwrap_or_else(|| GroupVersionKind { group: "platform.kratix.io".to_string(), version: "v1alpha1".to_string(), kind: name.clone() });

    let pipeline_images: Vec<String> = promise.spec.workflows.promise.configure.iter().map(|s| s.image.clone()).collect();
    let outcome = ctx.registry.ensure(&promise_uid, gvk, name.clone(), pipeline_images, BTreeMap::new())?;
    if let EnsureOutcome::Created(handle) = &outcome {
        info!(promise = %name, "started dynamic resource-request controller");
        handle.can_create_resources.store(false, std::sync::atomic::Ordering::SeqCst);
        if let Some(spec_api) = &promise.spec.api {
            workflow::ensure_dynamic_controller_rbac(
                ctx.client.clone(),
                &name,
                "platform.kratix.io",
                &spec_api.names.plural,
                &ctx.system_namespace,
                kratix_types::constants::CONTROLLER_SERVICE_ACCOUNT,
            )
            .await?;
        }
        spawn_resource_controller(&ctx, handle.clone(), &promise);
    }

    let resolution = {
        let other_promises = list_promise_snapshots(&ctx.client, &ctx.system_namespace, &name).await?;
        requirements::resolve(&promise.spec.requirements, |n| other_promises.get(n).cloned())
    };
    ctx.registry.set_can_create_resources(&promise_uid, resolution.fulfilled)?;

    let mut status = promise.status.clone().unwrap_or_default();
    status.requirements = resolution
        .statuses
        .iter()
        .map(|s| kratix_types::RequirementStatus { name: s.name.clone(), version: s.version.clone(), state: s.state })
        .collect();
    conditions::upsert(
        &mut status.conditions,
        requirements::REQUIREMENTS_FULFILLED_CONDITION,
        if resolution.fulfilled { "True" } else { "False" },
        if resolution.fulfilled { "RequirementsInstalled" } else { requirements::REASON_REQUIREMENTS_NOT_INSTALLED },
        if resolution.fulfilled { "requirements fulfilled" } else { requirements::MESSAGE_REQUIREMENTS_NOT_FULFILLED },
        Some(promise.metadata.generation.unwrap_or(0)),
    );
    status.status = if resolution.fulfilled { PromiseAvailability::Available } else { PromiseAvailability::Unavailable };
    patch_status(&api, &name, &status).await?;

    if !resolution.fulfilled {
        return Ok(Action::requeue(ctx.default_requeue));
    }

    if promise.spec.workflows.promise.has_configure() {
        let selectors_yaml = serde_yaml::to_string(&promise.spec.destination_selectors).unwrap_or_default();
        workflow::ensure_rbac_and_config(ctx.client.clone(), &name, &ctx.system_namespace, &selectors_yaml, false).await?;

        let source = ObjectYamlSource { group: "platform.kratix.io", version: "v1alpha1", kind: "Promise", plural: "promises", name: &name };
        let finished = workflow::ensure_workflow_object(
            ctx.client.clone(),
            &name,
            &ctx.system_namespace,
            &ctx.system_namespace,
            &ctx.work_creator_image,
            &promise.spec.workflows.promise.configure,
            source,
            WorkflowLevel::Promise,
        )
        .await?;
        if !finished {
            return Ok(Action::requeue(ctx.default_requeue));
        }
    }

    emit_dependency_work(&ctx, &promise, &name).await?;

    let mut status = promise.status.clone().unwrap_or_default();
    status.status = PromiseAvailability::Available;
    status.observed_generation = promise.metadata.generation.unwrap_or(0);
    patch_status(&api, &name, &status).await?;

    Ok(Action::requeue(ctx.default_requeue))
}

/// Starts the per-Promise resource-request controller (§4.6) as a background
/// task watching every object of the Promise's installed CRD kind. There is
/// no handle kept to this task: it runs for the process's lifetime and is
/// only ever retired by the whole-process restart `registry.restart()` drives.
fn spawn_resource_controller(ctx: &PromiseControllerContext, handle: Arc<crate::registry::DynamicControllerHandle>, promise: &Promise) {
    let pipeline_stages = promise.spec.workflows.resource.configure.clone();
    let resource_ctx = Arc::new(ResourceControllerContext {
        client: ctx.client.clone(),
        handle: handle.clone(),
        system_namespace: ctx.system_namespace.clone(),
        work_creator_image: ctx.work_creator_image.clone(),
        pipeline_stages,
        default_requeue: ctx.default_requeue,
    });

    let gvk = handle.gvk.lock().unwrap().clone();
    let api = resource_controller::watched_api(ctx.client.clone(), &gvk);

    tokio::spawn(async move {
        Controller::new(api, watcher::Config::default())
            .run(resource_controller::reconcile, resource_controller::error_policy, resource_ctx)
            .for_each(|result| async move {
                if let Err(err) = result {
                    error!(error = %err, "resource-request reconcile failed");
                }
            })
            .await;
    });
}

async fn ensure_finalizer(api: &Api<Promise>, promise: &Promise, name: &str) -> Result<(), PromiseControllerError> {
    let existing = promise.metadata.finalizers.clone().unwrap_or_default();
    let wanted = [
        promise_finalizers::API_CRD_CLEANUP,
        promise_finalizers::DEPENDENCIES_CLEANUP,
        promise_finalizers::RESOURCE_REQUEST_CLEANUP,
        promise_finalizers::DYNAMIC_CONTROLLER_DEPENDANT_RESOURCES_CLEANUP,
        promise_finalizers::WORKFLOWS_CLEANUP,
    ];
    let mut finalizers = existing.clone();
    let mut changed = false;
    for f in wanted {
        if !finalizers.iter().any(|e| e == f) {
            finalizers.push(f.to_string());
            changed = true;
        }
    }
    if promise.spec.workflows.promise.has_delete() && !finalizers.iter().any(|f| f == promise_finalizers::DELETE_WORKFLOWS) {
        finalizers.push(promise_finalizers::DELETE_WORKFLOWS.to_string());
        changed = true;
    }
    if changed {
        let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
        api.patch(name, &PatchParams::apply(workflow::FIELD_MANAGER).force(), &Patch::Merge(&patch)).await?;
    }
    Ok(())
}

async fn crd_established(client: &Client, spec_api: &kratix_types::PromiseApi) -> Result<bool, PromiseControllerError> {
    let api: Api<CustomResourceDefinition> = Api::all(client.clone());
    let crd_name = format!("{}.platform.kratix.io", spec_api.names.plural);
    match api.get(&crd_name).await {
        Ok(crd) => Ok(crd
            .status
            .and_then(|s| s.conditions)
            .unwrap_or_default()
            .iter()
            .any(|c| c.type_ == "Established" && c.status == "True")),
        Err(kube::Error::Api(err)) if err.code == 404 => Ok(false),
        Err(other) => Err(other.into()),
    }
}

async fn apply_crd(client: &Client, promise_name: &str, spec_api: &kratix_types::PromiseApi) -> Result<(), PromiseControllerError> {
    let api: Api<CustomResourceDefinition> = Api::all(client.clone());
    let crd_name = format!("{}.platform.kratix.io", spec_api.names.plural);
    let crd = CustomResourceDefinition {
        metadata: ObjectMeta {
            name: Some(crd_name.clone()),
            labels: Some(BTreeMap::from([(kratix_types::constants::labels::PROMISE_ID.to_string(), promise_name.to_string())])),
            ..Default::default()
        },
        spec: CustomResourceDefinitionSpec {
            group: "platform.kratix.io".to_string(),
            names: k8s_openapi::api::apiextensions_k8s1::v1::CustomResourceDefinitionNames {
                kind: spec_api.names.kind.clone(),
                plural: spec_api.names.plural.clone(),
                singular: Some(spec_api.names.singular.clone()),
                ..Default::default()
            },
            scope: "Namespaced".to_string(),
            ..Default::default()
        },
        status: None,
    };
    api.patch(&crd_name, &PatchParams::apply(workflow::FIELD_MANAGER).force(), &Patch::Apply(&crd)).await?;
    Ok(())
}

async fn list_promise_snapshots(client: &Client, namespace: &str, exclude: &str) -> Result<BTreeMap<String, PromiseSnapshot>, PromiseControllerError> {
    let api: Api<Promise> = Api::namespaced(client.clone(), namespace);
    let list = api.list(&ListParams::default()).await?;
    Ok(list
        .items
        .into_iter()
        .filter(|p| p.metadata.name.as_deref() != Some(exclude))
        .filter_map(|p| {
            let name = p.metadata.name?;
            let status = p.status?;
            Some((name, PromiseSnapshot { version: status.version, status: status.status }))
        })
        .collect())
}

async fn patch_status(api: &Api<Promise>, name: &str, status: &kratix_types::PromiseStatus) -> Result<(), PromiseControllerError> {
    let patch = serde_json::json!({ "status": status });
    api.patch_status(name, &PatchParams::apply(workflow::FIELD_MANAGER).force(), &Patch::Merge(&patch)).await?;
    Ok(())
}

/// Build the dependency Work directly from `spec.dependencies`, squashing the
/// Promise's own (`source: promise`) destination selectors into one bucket.
async fn emit_dependency_work(ctx: &PromiseControllerContext, promise: &Promise, name: &str) -> Result<(), PromiseControllerError> {
    if promise.spec.dependencies.is_empty() {
        return Ok(());
    }

    let workloads: Vec<Workload> = promise
        .spec
        .dependencies
        .iter()
        .enumerate()
        .map(|(i, dep)| Workload {
            filepath: format!("dependency-{i}.yaml"),
            content: serde_yaml::to_string(dep).unwrap_or_default(),
        })
        .collect();

    let mut promise_labels = BTreeMap::new();
    for selector in promise.spec.destination_selectors.iter().filter(|s| s.source == kratix_types::SelectorSource::Promise) {
        promise_labels.extend(selector.match_labels.clone());
    }
    let mut destination_selectors = Vec::new();
    if !promise_labels.is_empty() {
        destination_selectors.push(WorkDestinationSelector { match_labels: promise_labels, source: kratix_types::SelectorSource::Promise });
    }

    let work = Work {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(ctx.system_namespace.clone()),
            labels: Some(BTreeMap::from([(kratix_types::constants::labels::PROMISE_NAME.to_string(), name.to_string())])),
            ..Default::default()
        },
        spec: WorkSpec {
            replicas: DEPENDENCY_REPLICAS,
            resource_name: String::new(),
            workload_groups: vec![WorkloadGroup {
                id: kratix_types::hash::group_id("."),
                directory: ".".to_string(),
                workloads,
                destination_selectors,
            }],
        },
    };

    let api: Api<Work> = Api::namespaced(ctx.client.clone(), &ctx.system_namespace);
    api.patch(name, &PatchParams::apply(workflow::FIELD_MANAGER).force(), &Patch::Apply(&work)).await?;
    Ok(())
}

async fn delete(promise: Arc<Promise>, ctx: Arc<PromiseControllerContext>) -> Result<Action, PromiseControllerError> {
    let name = promise.metadata.name.clone().unwrap_or_default();
    let promise_uid = promise.metadata.uid.clone().unwrap_or_default();
    let api: Api<Promise> = Api::namespaced(ctx.client.clone(), &ctx.system_namespace);
    let finalizers = promise.metadata.finalizers.clone().unwrap_or_default();

    let _ = ctx.registry.set_enabled(&promise_uid, false);
    let _ = ctx.registry.set_can_create_resources(&promise_uid, false);

    if finalizers.iter().any(|f| f == promise_finalizers::DELETE_WORKFLOWS) {
        let source = ObjectYamlSource { group: "platform.kratix.io", version: "v1alpha1", kind: "Promise", plural: "promises", name: &name };
        let finished = workflow::ensure_workflow_object(
            ctx.client.clone(),
            &name,
            &ctx.system_namespace,
            &ctx.system_namespace,
            &ctx.work_creator_image,
            &promise.spec.workflows.promise.delete,
            source,
            WorkflowLevel::Promise,
        )
        .await?;
        if !finished {
            return Ok(Action::requeue(ctx.default_requeue));
        }
        remove_finalizer(&api, &name, &finalizers, promise_finalizers::DELETE_WORKFLOWS).await?;
        return Ok(Action::requeue(ctx.default_requeue));
    }

    if finalizers.iter().any(|f| f == promise_finalizers::RESOURCE_REQUEST_CLEANUP) {
        if let Some(spec_api) = &promise.spec.api {
            let gvk = GroupVersionKind { group: "platform.kratix.io".to_string(), version: spec_api.api_version.clone(), kind: spec_api.names.kind.clone() };
            let plural = spec_api.names.plural.clone();
            let api_resource = kube::api::ApiResource::from_gvk_with_plural(&gvk, &plural);
            let dyn_api: Api<DynamicObject> = Api::all_with(ctx.client.clone(), &api_resource);
            let remaining = dyn_api.list(&ListParams::default()).await?;
            for item in &remaining.items {
                if let Some(item_name) = &item.metadata.name {
                    let _ = dyn_api.delete(item_name, &DeleteParams::default()).await;
                }
            }
            if !remaining.items.is_empty() {
                return Ok(Action::requeue(ctx.default_requeue));
            }
        }
        remove_finalizer(&api, &name, &finalizers, promise_finalizers::RESOURCE_REQUEST_CLEANUP).await?;
        return Ok(Action::requeue(ctx.default_requeue));
    }

    if finalizers.iter().any(|f| f == promise_finalizers::WORKFLOWS_CLEANUP) {
        delete_workflow_resources(&ctx.client, &name, &ctx.system_namespace).await?;
        remove_finalizer(&api, &name, &finalizers, promise_finalizers::WORKFLOWS_CLEANUP).await?;
        return Ok(Action::requeue(ctx.default_requeue));
    }

    if finalizers.iter().any(|f| f == promise_finalizers::DYNAMIC_CONTROLLER_DEPENDANT_RESOURCES_CLEANUP) {
        delete_dynamic_controller_rbac(&ctx.client, &name).await?;
        remove_finalizer(&api, &name, &finalizers, promise_finalizers::DYNAMIC_CONTROLLER_DEPENDANT_RESOURCES_CLEANUP).await?;
        return Ok(Action::requeue(ctx.default_requeue));
    }

    if finalizers.iter().any(|f| f == promise_finalizers::DEPENDENCIES_CLEANUP) {
        let work_api: Api<Work> = Api::namespaced(ctx.client.clone(), &ctx.system_namespace);
        match work_api.delete(&name, &DeleteParams::default()).await {
            Ok(_) => {}
            Err(kube::Error::Api(err)) if err.code == 404 => {}
            Err(other) => return Err(other.into()),
        }
        remove_finalizer(&api, &name, &finalizers, promise_finalizers::DEPENDENCIES_CLEANUP).await?;
        return Ok(Action::requeue(ctx.default_requeue));
    }

    if finalizers.iter().any(|f| f == promise_finalizers::API_CRD_CLEANUP) {
        if let Some(spec_api) = &promise.spec.api {
            let crd_api: Api<CustomResourceDefinition> = Api::all(ctx.client.clone());
            let crd_name = format!("{}.platform.kratix.io", spec_api.names.plural);
            match crd_api.delete(&crd_name, &DeleteParams::default()).await {
                Ok(_) => {}
                Err(kube::Error::Api(err)) if err.code == 404 => {}
                Err(other) => return Err(other.into()),
            }
        }
        remove_finalizer(&api, &name, &finalizers, promise_finalizers::API_CRD_CLEANUP).await?;
        return Ok(Action::requeue(ctx.default_requeue));
    }

    ctx.registry.restart();
    Ok(Action::await_change())
}

/// §4.7 step 4: delete the configure/delete workflow's Job, RBAC, and scheduling ConfigMap.
async fn delete_workflow_resources(client: &Client, promise_name: &str, namespace: &str) -> Result<(), PromiseControllerError> {
    let job_name = workflow::workflow_object_name(promise_name, &WorkflowLevel::Promise);
    let job_api: Api<Job> = Api::namespaced(client.clone(), namespace);
    ignore_not_found(job_api.delete(&job_name, &DeleteParams::default()).await)?;

    let sa_name = objects::pipeline_service_account_name(promise_name);
    let sa_api: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
    ignore_not_found(sa_api.delete(&sa_name, &DeleteParams::default()).await)?;

    let role_api: Api<ClusterRole> = Api::all(client.clone());
    ignore_not_found(role_api.delete(&sa_name, &DeleteParams::default()).await)?;

    let binding_api: Api<ClusterRoleBinding> = Api::all(client.clone());
    ignore_not_found(binding_api.delete(&sa_name, &DeleteParams::default()).await)?;

    let cm_name = objects::destination_selectors_configmap_name(promise_name);
    let cm_api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    ignore_not_found(cm_api.delete(&cm_name, &DeleteParams::default()).await)?;

    Ok(())
}

/// §4.7 step 5: delete the dynamic controller's own ClusterRole/ClusterRoleBinding.
async fn delete_dynamic_controller_rbac(client: &Client, promise_name: &str) -> Result<(), PromiseControllerError> {
    let name = objects::dynamic_controller_resource_name(promise_name);

    let role_api: Api<ClusterRole> = Api::all(client.clone());
    ignore_not_found(role_api.delete(&name, &DeleteParams::default()).await)?;

    let binding_api: Api<ClusterRoleBinding> = Api::all(client.clone());
    ignore_not_found(binding_api.delete(&name, &DeleteParams::default()).await)?;

    Ok(())
}

fn ignore_not_found<T>(result: kube::Result<T>) -> Result<(), PromiseControllerError> {
    match result {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
        Err(other) => Err(other.into()),
    }
}

async fn remove_finalizer(api: &Api<Promise>, name: &str, existing: &[String], to_remove: &str) -> Result<(), PromiseControllerError> {
    let finalizers: Vec<String> = existing.iter().filter(|f| f.as_str() != to_remove).cloned().collect();
    let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    api.patch(name, &PatchParams::apply(workflow::FIELD_MANAGER).force(), &Patch::Merge(&patch)).await?;
    Ok(())
}

pub fn error_policy(_promise: Arc<Promise>, error: &PromiseControllerError, ctx: Arc<PromiseControllerContext>) -> Action {
    tracing::error!(error = %error, "promise reconcile failed");
    Action::requeue(ctx.default_requeue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deletion_order_matches_reverse_dependency_order() {
        assert_eq!(
            promise_finalizers::DELETION_ORDER,
            &[
                promise_finalizers::DELETE_WORKFLOWS,
                promise_finalizers::RESOURCE_REQUEST_CLEANUP,
                promise_finalizers::WORKFLOWS_CLEANUP,
                promise_finalizers::DYNAMIC_CONTROLLER_DEPENDANT_RESOURCES_CLEANUP,
                promise_finalizers::DEPENDENCIES_CLEANUP,
                promise_finalizers::API_CRD_CLEANUP,
            ]
        );
    }
}
