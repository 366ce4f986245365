//! Sentinel strings and finalizer names shared by the controller and the worker.

/// Default platform system namespace, overridable via `KRATIX_SYSTEM_NAMESPACE`.
pub const DEFAULT_SYSTEM_NAMESPACE: &str = "kratix-platform-system";

/// Finalizer prefix used by every finalizer this core manages.
pub const FINALIZER_PREFIX: &str = "kratix.io/";

/// WorkloadGroup directory denoting the pipeline output root.
pub const ROOT_GROUP_DIRECTORY: &str = ".";

/// ServiceAccount the controller binary itself runs as, bound by the
/// dynamic-controller RBAC this core manages on behalf of each installed Promise.
pub const CONTROLLER_SERVICE_ACCOUNT: &str = "kratix-platform-controller-manager";

/// `replicas` sentinel for dependency Works (fan out to every matching destination).
pub const DEPENDENCY_REPLICAS: i32 = -1;

/// `replicas` sentinel for resource-request Works (exactly one destination).
pub const RESOURCE_REQUEST_REPLICAS: i32 = 1;

/// Destination-selector provenance.
pub mod selector_source {
    pub const PROMISE: &str = "promise";
    pub const PROMISE_WORKFLOW: &str = "promise-workflow";
    pub const RESOURCE_WORKFLOW: &str = "resource-workflow";
}

/// Promise finalizers, added idempotently on creation and removed in this order on delete.
pub mod promise_finalizers {
    pub const API_CRD_CLEANUP: &str = "kratix.io/api-crd-cleanup";
    pub const DEPENDENCIES_CLEANUP: &str = "kratix.io/dependencies-cleanup";
    pub const RESOURCE_REQUEST_CLEANUP: &str = "kratix.io/resource-request-cleanup";
    pub const DYNAMIC_CONTROLLER_DEPENDANT_RESOURCES_CLEANUP: &str =
        "kratix.io/dynamic-controller-dependant-resources-cleanup";
    pub const WORKFLOWS_CLEANUP: &str = "kratix.io/workflows-cleanup";
    pub const DELETE_WORKFLOWS: &str = "kratix.io/delete-workflows";

    /// Reverse-dependency removal order used by the Promise deletion sequence.
    pub const DELETION_ORDER: &[&str] = &[
        DELETE_WORKFLOWS,
        RESOURCE_REQUEST_CLEANUP,
        WORKFLOWS_CLEANUP,
        DYNAMIC_CONTROLLER_DEPENDANT_RESOURCES_CLEANUP,
        DEPENDENCIES_CLEANUP,
        API_CRD_CLEANUP,
    ];
}

/// ResourceRequest finalizers managed by the resource-request controller.
pub mod resource_finalizers {
    pub const WORK_CLEANUP: &str = "kratix.io/work-cleanup";
    pub const PIPELINE_CLEANUP: &str = "kratix.io/pipeline-cleanup";
}

/// Label keys attached to objects derived from a Promise.
pub mod labels {
    pub const PROMISE_ID: &str = "kratix-promise-id";
    pub const PROMISE_NAME: &str = "kratix.io/promise-name";
    pub const RESOURCE_REQUEST_ID: &str = "kratix-promise-resource-request-id";
}

/// Environment variable names read at process bootstrap.
pub mod env {
    pub const WORK_CREATOR_IMAGE: &str = "WC_IMG";
    pub const SYSTEM_NAMESPACE: &str = "KRATIX_SYSTEM_NAMESPACE";
    pub const POD_IDENTIFIER_OVERRIDE: &str = "TEST_PROMISE_CONTROLLER_POD_IDENTIFIER_UUID";
}
