use super::shared::SourceEndpointStatus;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One object per (portal, source-kind), controller-owned (§3). Created and
/// deleted by C2 under C1's direction.
#[derive(Clone, Debug, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "dnsportal.io",
    version = "v1alpha1",
    kind = "SourceRecord",
    status = "SourceRecordStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecordSpec {
    /// One of `service`, `ingress`, `dnsendpoint`, `mesh-gateway`, `mesh-virtualservice`.
    pub source_kind: String,
    pub portal_ref: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecordStatus {
    #[serde(default)]
    pub endpoints: Vec<SourceEndpointStatus>,
    pub last_reconcile_time: Option<Time>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
