//! Admission webhook HTTP server (§4.8): mutating defaulting (no-op) and
//! validating create/update on Promises.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use k8s_openapi::api::apiextensions_k8s1::v1::CustomResourceDefinition;
use kube::api::{Api, DryRun, PatchParams};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::Client;
use kratix_types::Promise;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, instrument};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("decoding AdmissionReview: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("CRD dry-run rejected: {0}")]
    DryRunRejected(String),
    #[error("{0}")]
    ImmutableFieldChanged(String),
}

#[derive(Clone)]
pub struct WebhookState {
    pub client: Client,
}

pub fn router(client: Client) -> Router {
    Router::new()
        .route("/mutate-platform-kratix-io-v1alpha1-promise", post(mutate))
        .route("/validate-platform-kratix-io-v1alpha1-promise", post(validate))
        .route("/healthz", get(healthz))
        .with_state(Arc::new(WebhookState { client }))
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

/// Defaulting is currently a no-op; the patch is always empty.
#[instrument(skip(body))]
async fn mutate(Json(body): Json<AdmissionReview<Promise>>) -> Json<AdmissionReview<Promise>> {
    let req: AdmissionRequest<Promise> = match body.try_into() {
        Ok(req) => req,
        Err(err) => {
            error!(error = %err, "failed to decode AdmissionReview");
            return Json(AdmissionResponse::invalid(err).into_review());
        }
    };
    Json(AdmissionResponse::from(&req).into_review())
}

#[instrument(skip(state, body))]
async fn validate(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<Promise>>,
) -> Json<AdmissionReview<Promise>> {
    let req: AdmissionRequest<Promise> = match body.try_into() {
        Ok(req) => req,
        Err(err) => {
            error!(error = %err, "failed to decode AdmissionReview");
            return Json(AdmissionResponse::invalid(err).into_review());
        }
    };

    let response = AdmissionResponse::from(&req);
    let result = validate_request(&state.client, &req).await;

    match result {
        Ok(()) => Json(response.into_review()),
        Err(err) => {
            // The source system reads the Promise name for the aggregate error
            // message from the incoming object's metadata, not from a struct
            // field that may not yet be populated when the message is built.
            let name = req
                .object
                .as_ref()
                .and_then(|o| o.meta().name.clone())
                .unwrap_or_default();
            let message = format!("promises.platform.kratix.io {name:?} was not valid:\n{err}");
            Json(response.deny(message).into_review())
        }
    }
}

async fn validate_request(client: &Client, req: &AdmissionRequest<Promise>) -> Result<(), WebhookError> {
    let Some(new_obj) = &req.object else { return Ok(()) };

    if let Some(spec_api) = &new_obj.spec.api {
        dry_run_crd(client, spec_api).await?;
    }

    if let Some(old_obj) = &req.old_object {
        diff_immutable_fields(old_obj, new_obj)?;
    }

    Ok(())
}

async fn dry_run_crd(client: &Client, spec_api: &kratix_types::PromiseApi) -> Result<(), WebhookError> {
    let api: Api<CustomResourceDefinition> = Api::all(client.clone());
    let crd_name = format!("{}.platform.kratix.io", spec_api.names.plural);
    let crd = CustomResourceDefinition {
        metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
            name: Some(crd_name.clone()),
            ..Default::default()
        },
        spec: k8s_openapi::api::apiextensions_k8s1::v1::CustomResourceDefinitionSpec {
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

    let params = PatchParams { dry_run: DryRun::All, force: true, field_manager: Some("kratix-webhook".to_string()), ..Default::default() };
    api.patch(&crd_name, &params, &kube::api::Patch::Apply(&crd))
        .await
        .map_err(|err| WebhookError::DryRunRejected(err.to_string()))?;
    Ok(())
}

/// Diff `spec.api.{kind,apiVersion,names}` between old and new, producing one
/// `field is immutable` message per changed field, joined by newlines.
fn diff_immutable_fields(old: &Promise, new: &Promise) -> Result<(), WebhookError> {
    let (old_api, new_api) = match (&old.spec.api, &new.spec.api) {
        (Some(o), Some(n)) => (o, n),
        _ => return Ok(()),
    };

    let mut errors = Vec::new();
    if old_api.kind != new_api.kind {
        errors.push(format!("spec.api.kind: Invalid value: {:?}: field is immutable", new_api.kind));
    }
    if old_api.api_version != new_api.api_version {
        errors.push(format!("spec.api.apiVersion: Invalid value: {:?}: field is immutable", new_api.api_version));
    }
    if old_api.names != new_api.names {
        errors.push(format!("spec.api.names: Invalid value: {:?}: field is immutable", new_api.names));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(WebhookError::ImmutableFieldChanged(errors.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kratix_types::{PromiseApi, PromiseApiNames, PromiseSpec, PromiseWorkflows};

    fn promise_with_api(kind: &str) -> Promise {
        Promise::new(
            "postgres",
            PromiseSpec {
                api: Some(PromiseApi {
                    kind: kind.to_string(),
                    api_version: "v1".to_string(),
                    names: PromiseApiNames { plural: "postgreses".to_string(), singular: "postgres".to_string(), kind: kind.to_string() },
                    versions: vec![],
                }),
                dependencies: vec![],
                requirements: vec![],
                destination_selectors: vec![],
                workflows: PromiseWorkflows::default(),
            },
        )
    }

    #[test]
    fn identical_api_is_not_flagged() {
        let old = promise_with_api("Postgres");
        let new = promise_with_api("Postgres");
        assert!(diff_immutable_fields(&old, &new).is_ok());
    }

    #[test]
    fn changed_kind_is_rejected() {
        let old = promise_with_api("Postgres");
        let new = promise_with_api("PostgresDB");
        let err = diff_immutable_fields(&old, &new).unwrap_err();
        match err {
            WebhookError::ImmutableFieldChanged(message) => {
                assert_eq!(message.lines().count(), 1);
                assert!(message.contains("spec.api.kind"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
