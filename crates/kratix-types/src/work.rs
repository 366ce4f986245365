//! The `Work` custom resource: the canonical scheduling artifact emitted by
//! the Work builder, consumed by the downstream destination scheduler.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::promise::SelectorSource;

/// `platform.kratix.io/v1alpha1` `Work`.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "platform.kratix.io",
    version = "v1alpha1",
    kind = "Work",
    plural = "works",
    singular = "work",
    namespaced,
    derive = "PartialEq"
)]
pub struct WorkSpec {
    /// `DependencyReplicas` for dependency Works, `ResourceRequestReplicas` otherwise.
    pub replicas: i32,
    #[serde(default, rename = "resourceName")]
    pub resource_name: String,
    #[serde(default, rename = "workloadGroups")]
    pub workload_groups: Vec<WorkloadGroup>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct WorkloadGroup {
    pub id: String,
    pub directory: String,
    #[serde(default)]
    pub workloads: Vec<Workload>,
    #[serde(default, rename = "destinationSelectors")]
    pub destination_selectors: Vec<WorkDestinationSelector>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct Workload {
    pub filepath: String,
    pub content: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct WorkDestinationSelector {
    #[serde(rename = "matchLabels", default)]
    pub match_labels: BTreeMap<String, String>,
    pub source: SelectorSource,
}

impl WorkSpec {
    /// Which mode this Work was assembled for, inferred the same way the builder chose it.
    pub fn is_resource_request(&self) -> bool {
        !self.resource_name.is_empty()
    }
}
