//! CRD types and the pure assembly logic shared by the controller binary and
//! the work-creator/status-writer binary.

pub mod constants;
pub mod error;
pub mod hash;
pub mod promise;
pub mod work;
pub mod work_builder;

pub use error::WorkBuilderError;
pub use promise::{
    DestinationSelector, PipelineStage, Promise, PromiseApi, PromiseApiNames, PromiseAvailability,
    PromiseRequirement, PromiseSpec, PromiseStatus, PromiseWorkflowSet, PromiseWorkflows,
    RequirementState, RequirementStatus, SelectorSource,
};
pub use work::{Work, WorkDestinationSelector, WorkSpec, Workload, WorkloadGroup};
pub use work_builder::{build_work, BuiltWork, WorkBuilderInput, WorkflowType};
