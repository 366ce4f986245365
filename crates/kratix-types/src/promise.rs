//! The `Promise` custom resource: a bundle of a CRD, dependencies, and pipelines.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `platform.kratix.io/v1alpha1` `Promise`.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "platform.kratix.io",
    version = "v1alpha1",
    kind = "Promise",
    plural = "promises",
    singular = "promise",
    namespaced,
    status = "PromiseStatus",
    derive = "PartialEq"
)]
pub struct PromiseSpec {
    /// The embedded CRD this Promise installs. Absent for a pure-dependencies Promise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<PromiseApi>,

    /// Opaque manifests bundled verbatim into the dependency Work.
    #[serde(default)]
    pub dependencies: Vec<serde_json::Value>,

    /// Other Promises that must be installed, at least at the stated version.
    #[serde(default)]
    pub requirements: Vec<PromiseRequirement>,

    /// Label selectors, tagged by provenance, governing where dependencies land.
    #[serde(default, rename = "destinationSelectors")]
    pub destination_selectors: Vec<DestinationSelector>,

    /// Promise-level pipelines.
    #[serde(default)]
    pub workflows: PromiseWorkflows,
}

/// The subset of a CRD this Promise installs. Immutable after creation.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct PromiseApi {
    pub kind: String,
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub names: PromiseApiNames,
    /// Raw CRD versions/schema, passed through to the dry-run apply untouched.
    #[serde(default)]
    pub versions: Vec<serde_json::Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct PromiseApiNames {
    pub plural: String,
    pub singular: String,
    #[serde(default)]
    pub kind: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct PromiseRequirement {
    pub name: String,
    pub version: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct PromiseWorkflows {
    #[serde(default)]
    pub promise: PromiseWorkflowSet,
    /// Pipelines run per resource request instead of once per Promise.
    #[serde(default)]
    pub resource: PromiseWorkflowSet,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct PromiseWorkflowSet {
    #[serde(default)]
    pub configure: Vec<PipelineStage>,
    #[serde(default)]
    pub delete: Vec<PipelineStage>,
}

impl PromiseWorkflowSet {
    pub fn has_configure(&self) -> bool {
        !self.configure.is_empty()
    }

    pub fn has_delete(&self) -> bool {
        !self.delete.is_empty()
    }
}

/// One container run as a pipeline stage; command and args come from the image.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct PipelineStage {
    pub image: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A destination-selector entry as carried on the Promise spec.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct DestinationSelector {
    #[serde(rename = "matchLabels", default)]
    pub match_labels: BTreeMap<String, String>,
    pub source: SelectorSource,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SelectorSource {
    Promise,
    PromiseWorkflow,
    ResourceWorkflow,
}

impl SelectorSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Promise => crate::constants::selector_source::PROMISE,
            Self::PromiseWorkflow => crate::constants::selector_source::PROMISE_WORKFLOW,
            Self::ResourceWorkflow => crate::constants::selector_source::RESOURCE_WORKFLOW,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct PromiseStatus {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default, rename = "apiVersion")]
    pub api_version: String,
    #[serde(default)]
    pub status: PromiseAvailability,
    #[serde(default, rename = "observedGeneration")]
    pub observed_generation: i64,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub requirements: Vec<RequirementStatus>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum PromiseAvailability {
    #[default]
    Unavailable,
    Available,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct RequirementStatus {
    pub name: String,
    pub version: String,
    pub state: RequirementState,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RequirementState {
    NotInstalled,
    NotInstalledAtVersion,
    Installed,
}

impl RequirementState {
    pub fn message(self) -> &'static str {
        match self {
            Self::NotInstalled => "Requirement not installed",
            Self::NotInstalledAtVersion => "Requirement not installed at the specified version",
            Self::Installed => "Requirement installed",
        }
    }
}
