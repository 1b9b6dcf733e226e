use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Wire form of `core::ResourceRef` (§3.2), carried in `FqdnStatus.originRef`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRefStatus {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl From<&dns_portal_controller_core::ResourceRef> for ResourceRefStatus {
    fn from(r: &dns_portal_controller_core::ResourceRef) -> Self {
        ResourceRefStatus {
            kind: r.kind.clone(),
            namespace: r.namespace.clone(),
            name: r.name.clone(),
        }
    }
}

/// An aggregated FQDN, embedded in `ManualDNS.status.groups` and in the
/// ManualDNS-shaped remote view (§3).
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FqdnStatus {
    pub fqdn: String,
    pub description: Option<String>,
    pub record_type: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    /// One of `"sync"`, `"notavailable"`, `"notsync"`, or `""` (not checked).
    #[serde(default)]
    pub sync_status: String,
    pub last_seen: Time,
    pub origin_ref: Option<ResourceRefStatus>,
}

/// A named collection of [`FqdnStatus`] sharing one provenance (§3, §4.3).
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub name: String,
    pub description: Option<String>,
    /// One of `"external-dns"`, `"manual"`, `"remote"`.
    pub source: String,
    #[serde(default)]
    pub fqdns: Vec<FqdnStatus>,
}

/// A single discovered endpoint as persisted in `SourceRecord.status.endpoints`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceEndpointStatus {
    pub dns_name: String,
    pub record_type: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    pub ttl: Option<i64>,
    #[serde(default)]
    pub labels: std::collections::BTreeMap<String, String>,
    pub last_seen: Time,
    pub resource: ResourceRefStatus,
}
