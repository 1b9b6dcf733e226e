use super::{list_params, portal_labels, AdapterError, SourceAdapter};
use async_trait::async_trait;
use dns_portal_controller_core::{Endpoint, RecordType, ResourceRef, SourceKind};
use dns_portal_controller_k8s_api::config::SourceConfig;
use dns_portal_controller_k8s_api::{Api, Client};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Read-only mirror of the externally-published `DNSEndpoint` CRD (the
/// shape ExternalDNS-style controllers publish); this adapter never writes
/// to it, only lists it.
#[derive(Clone, Debug, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "externaldns.k8s.io",
    version = "v1alpha1",
    kind = "DNSEndpoint",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct DNSEndpointSpec {
    #[serde(default)]
    pub endpoints: Vec<DnsEndpointEntry>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DnsEndpointEntry {
    pub dns_name: String,
    pub record_type: Option<String>,
    pub record_ttl: Option<i64>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

fn parse_record_type(s: &str) -> Option<RecordType> {
    match s.to_ascii_uppercase().as_str() {
        "A" => Some(RecordType::A),
        "AAAA" => Some(RecordType::Aaaa),
        "CNAME" => Some(RecordType::Cname),
        "TXT" => Some(RecordType::Txt),
        _ => None,
    }
}

pub struct DnsEndpointAdapter {
    client: Client,
    config: SourceConfig,
}

impl DnsEndpointAdapter {
    pub fn new(client: Client, config: SourceConfig) -> Self {
        DnsEndpointAdapter { client, config }
    }
}

#[async_trait]
impl SourceAdapter for DnsEndpointAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::DnsEndpoint
    }

    async fn endpoints(&self, deadline: Duration) -> Result<Vec<Endpoint>, AdapterError> {
        let api: Api<DNSEndpoint> = match &self.config.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        let list = tokio::time::timeout(deadline, api.list(&list_params(&self.config)))
            .await
            .map_err(|_| AdapterError::Timeout { kind: self.kind() })?
            .map_err(|source| AdapterError::List {
                kind: self.kind(),
                source,
            })?;

        let mut endpoints = Vec::new();
        for obj in list {
            let name = obj.metadata.name.clone().unwrap_or_default();
            let namespace = obj.metadata.namespace.clone().unwrap_or_default();
            let annotations = obj.metadata.annotations.clone().unwrap_or_default();
            let resource = ResourceRef {
                kind: "DNSEndpoint".to_string(),
                namespace: namespace.clone(),
                name: name.clone(),
            };
            let base_labels = portal_labels(&annotations);

            for entry in obj.spec.endpoints {
                let mut labels = base_labels.clone();
                labels.extend(entry.labels);
                endpoints.push(Endpoint {
                    dns_name: entry.dns_name,
                    record_type: entry.record_type.as_deref().and_then(parse_record_type),
                    targets: entry.targets,
                    ttl: entry.record_ttl,
                    labels,
                    resource: resource.clone(),
                });
            }
        }

        Ok(endpoints)
    }
}
