use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A named view, namespaced (§3). Exactly one Portal in a namespace may
/// carry `main=true`; `remote` set implies `main=false`.
#[derive(Clone, Debug, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "dnsportal.io",
    version = "v1alpha1",
    kind = "Portal",
    status = "PortalStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct PortalSpec {
    pub title: String,
    #[serde(default)]
    pub main: bool,
    /// URL slug; defaults to the Portal's name when unset.
    pub sub_path: Option<String>,
    pub remote: Option<PortalRemote>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortalRemote {
    pub url: String,
    pub peer_portal_name: Option<String>,
    #[serde(default)]
    pub tls: PortalRemoteTls,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortalRemoteTls {
    #[serde(default)]
    pub insecure_skip_verify: bool,
    /// Secret key `ca.crt`, same namespace as the Portal.
    pub ca_secret_ref: Option<String>,
    /// Secret keys `tls.crt`/`tls.key`, same namespace as the Portal.
    pub client_cert_secret_ref: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortalStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub remote_sync: Option<RemoteSync>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSync {
    pub last_sync_time: Option<Time>,
    pub last_sync_error: Option<String>,
    pub peer_title: Option<String>,
    #[serde(default)]
    pub fqdn_count: i64,
}
