//! Label and annotation keys written onto every object this engine applies.

pub const LABEL_MANAGED_BY: &str = "pipecd.dev/managed-by";
pub const LABEL_PIPED: &str = "pipecd.dev/piped";
pub const LABEL_APPLICATION: &str = "pipecd.dev/application";
pub const LABEL_COMMIT_HASH: &str = "pipecd.dev/commit-hash";

pub const ANNOTATION_ORIGINAL_API_VERSION: &str = "pipecd.dev/original-api-version";
pub const ANNOTATION_RESOURCE_KEY: &str = "pipecd.dev/resource-key";
pub const ANNOTATION_CONFIG_HASH: &str = "pipecd.dev/config-hash";
pub const ANNOTATION_ORDER: &str = "pipecd.dev/order";

pub const ANNOTATION_SERVER_SIDE_APPLY: &str = "pipecd.dev/server-side-apply";
pub const USE_SERVER_SIDE_APPLY: &str = "true";

pub const ANNOTATION_SYNC_BY_REPLACE: &str = "pipecd.dev/sync-by-replace";
pub const ANNOTATION_FORCE_SYNC_BY_REPLACE: &str = "pipecd.dev/force-sync-by-replace";
pub const SYNC_BY_REPLACE_ENABLED: &str = "enabled";

/// Value of [`LABEL_MANAGED_BY`] on objects owned by piped.
pub const MANAGED_BY_PIPED: &str = "piped";

pub const DEFAULT_VARIANT_LABEL: &str = "pipecd.dev/variant";
pub const DEFAULT_PRIMARY_VARIANT: &str = "primary";
pub const DEFAULT_CANARY_VARIANT: &str = "canary";
pub const DEFAULT_BASELINE_VARIANT: &str = "baseline";

/// Label selector matching every object piped applied for `application_id`.
#[must_use]
pub fn application_selector(application_id: &str) -> String {
    format!("{LABEL_MANAGED_BY}={MANAGED_BY_PIPED},{LABEL_APPLICATION}={application_id}")
}
