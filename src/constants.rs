// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Kubernetes label keys used by the operator
pub mod labels {
    /// When set to "false" as a label or annotation of a workload, it is never instrumented
    pub const AUTO_TRACE: &str = "lumigo.auto-trace";
    /// Stamped on the pod template of every instrumented workload
    pub const INSTRUMENTED: &str = "lumigo.io/instrumented";
}

/// Kubernetes annotation keys used by the operator
pub mod annotations {
    /// JSON-encoded provenance marker on the pod template
    pub const INSTRUMENTATION: &str = "lumigo.io/instrumentation";
}

/// Finalizer guarding removal of instrumentation on deletion
pub const FINALIZER: &str = "operator.lumigo.io/lumigo-finalizer";

/// The operator name used as field manager
pub const OPERATOR_NAME: &str = "lumigo-operator";

/// Names reserved for what the operator injects into pod templates
pub mod injection {
    /// Every injected container, volume and volume mount starts with this
    pub const RESERVED_PREFIX: &str = "lumigo-";

    pub const INJECTOR_CONTAINER: &str = "lumigo-injector";
    pub const PROXY_CONTAINER: &str = "lumigo-telemetry-proxy";
    pub const INJECTOR_VOLUME: &str = "lumigo-injector";
    pub const INJECTOR_VOLUME_SIZE_LIMIT: &str = "200M";

    /// Where the init container copies the injector
    pub const INJECTOR_TARGET_DIR: &str = "/target";
    /// Where application containers see the injector
    pub const INJECTOR_MOUNT_PATH: &str = "/opt/lumigo";
    pub const LD_PRELOAD_PATH: &str = "/opt/lumigo/injector/lumigo_injector.so";

    pub const ENV_LD_PRELOAD: &str = "LD_PRELOAD";
    pub const ENV_TRACER_TOKEN: &str = "LUMIGO_TRACER_TOKEN";
    pub const ENV_ENDPOINT: &str = "LUMIGO_ENDPOINT";
    pub const ENV_TARGET_DIRECTORY: &str = "TARGET_DIRECTORY";

    /// Env vars injected into application containers
    pub const RESERVED_ENV_NAMES: [&str; 3] = [ENV_LD_PRELOAD, ENV_ENDPOINT, ENV_TRACER_TOKEN];

    pub const OTLP_TRACES_PATH: &str = "/v1/traces";
}

/// Condition reasons and messages surfaced on the Lumigo status
pub mod reasons {
    pub const ACTIVE: &str = "Active";
    pub const INVALID_CREDENTIALS: &str = "InvalidCredentials";
    pub const MULTIPLE_INSTANCES: &str = "MultipleLumigoInstances";

    pub const MULTIPLE_INSTANCES_MESSAGE: &str = "other Lumigo instances in this namespace";
}

/// CRD polling configuration
pub mod crd {
    pub const GROUP: &str = "operator.lumigo.io";
    pub const VERSION: &str = "v1alpha1";
    pub const KIND: &str = "Lumigo";
    /// Interval between CRD discovery attempts
    pub const POLL_INTERVAL_SECS: u64 = 10;
}
