use super::shared::Group;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Manually curated entries bound to a portal (§3). Status is continuously
/// recomputed by the aggregation chain (C3).
#[derive(Clone, Debug, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "dnsportal.io",
    version = "v1alpha1",
    kind = "ManualDNS",
    status = "ManualDNSStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ManualDNSSpec {
    pub portal_ref: String,
    #[serde(default)]
    pub groups: Vec<ManualDNSGroup>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManualDNSGroup {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub entries: Vec<ManualDNSGroupEntry>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManualDNSGroupEntry {
    pub fqdn: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManualDNSStatus {
    #[serde(default)]
    pub groups: Vec<Group>,
    pub last_reconcile_time: Option<Time>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
