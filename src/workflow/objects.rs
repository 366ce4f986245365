//! Builders for the RBAC and ConfigMap objects a workflow needs before its
//! Job/Pod can run (§4.3).

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kratix_types::constants::labels;

fn promise_labels(promise_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(labels::PROMISE_ID.to_string(), promise_name.to_string())])
}

pub fn pipeline_service_account_name(promise_name: &str) -> String {
    format!("{promise_name}-promise-pipeline")
}

pub fn service_account(promise_name: &str, namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(pipeline_service_account_name(promise_name)),
            namespace: Some(namespace.to_string()),
            labels: Some(promise_labels(promise_name)),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// `delete: true` grants the narrower rule set a delete-workflow pipeline needs.
pub fn cluster_role(promise_name: &str, delete: bool) -> ClusterRole {
    let verbs = if delete {
        vec!["get".into(), "list".into(), "delete".into()]
    } else {
        vec!["get".into(), "list".into(), "update".into(), "create".into(), "patch".into()]
    };

    ClusterRole {
        metadata: ObjectMeta {
            name: Some(pipeline_service_account_name(promise_name)),
            labels: Some(promise_labels(promise_name)),
            ..Default::default()
        },
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["platform.kratix.io".to_string()]),
            resources: Some(vec!["promises".into(), "promises/status".into(), "works".into()]),
            verbs,
            ..Default::default()
        }]),
        ..Default::default()
    }
}

pub fn cluster_role_binding(promise_name: &str, namespace: &str) -> ClusterRoleBinding {
    let name = pipeline_service_account_name(promise_name);
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            labels: Some(promise_labels(promise_name)),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name,
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: pipeline_service_account_name(promise_name),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}

pub fn dynamic_controller_resource_name(promise_name: &str) -> String {
    format!("{promise_name}-promise-controller")
}

/// RBAC for the in-process dynamic resource-request controller: full verbs on
/// the Promise's own CRD kind, `update` on its finalizers, and status access.
pub fn dynamic_controller_cluster_role(promise_name: &str, group: &str, plural: &str) -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(dynamic_controller_resource_name(promise_name)),
            labels: Some(promise_labels(promise_name)),
            ..Default::default()
        },
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(vec![group.to_string()]),
                resources: Some(vec![plural.to_string()]),
                verbs: vec!["*".to_string()],
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec![group.to_string()]),
                resources: Some(vec![format!("{plural}/finalizers")]),
                verbs: vec!["update".to_string()],
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec![group.to_string()]),
                resources: Some(vec![format!("{plural}/status")]),
                verbs: vec!["get".into(), "update".into(), "patch".into()],
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}

pub fn dynamic_controller_cluster_role_binding(promise_name: &str, controller_namespace: &str, controller_service_account: &str) -> ClusterRoleBinding {
    let name = dynamic_controller_resource_name(promise_name);
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            labels: Some(promise_labels(promise_name)),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name,
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: controller_service_account.to_string(),
            namespace: Some(controller_namespace.to_string()),
            ..Default::default()
        }]),
    }
}

pub fn destination_selectors_configmap_name(promise_name: &str) -> String {
    format!("destination-selectors-{promise_name}")
}

/// Serialises the Promise's destination selectors as YAML for the pipeline pod's
/// `promise-scheduling` projected volume.
pub fn destination_selectors_configmap(
    promise_name: &str,
    namespace: &str,
    selectors_yaml: &str,
) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(destination_selectors_configmap_name(promise_name)),
            namespace: Some(namespace.to_string()),
            labels: Some(promise_labels(promise_name)),
            ..Default::default()
        },
        data: Some(BTreeMap::from([("promise-scheduling".to_string(), selectors_yaml.to_string())])),
        ..Default::default()
    }
}
