use super::{list_params, portal_labels, AdapterError, SourceAdapter};
use async_trait::async_trait;
use dns_portal_controller_core::{Endpoint, RecordType, ResourceRef, SourceKind};
use dns_portal_controller_k8s_api::config::SourceConfig;
use dns_portal_controller_k8s_api::{Api, Client, Service};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Read-only mirror of Istio's `VirtualService` CRD (`networking.istio.io`),
/// narrowed to the fields this adapter needs.
#[derive(Clone, Debug, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "networking.istio.io",
    version = "v1beta1",
    kind = "VirtualService",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceSpec {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub gateways: Vec<String>,
}

/// Lists `VirtualService` objects and publishes one endpoint per host,
/// targeted at the first referenced gateway's fronting `Service` (the
/// convention Istio's own gateway deployments follow: a `Service` named
/// after the `Gateway` resource in the gateway's namespace).
pub struct MeshVirtualServiceAdapter {
    client: Client,
    config: SourceConfig,
}

impl MeshVirtualServiceAdapter {
    pub fn new(client: Client, config: SourceConfig) -> Self {
        MeshVirtualServiceAdapter { client, config }
    }

    async fn gateway_targets(&self, gateway_ref: &str) -> Vec<String> {
        let (namespace, name) = match gateway_ref.split_once('/') {
            Some((ns, n)) => (ns.to_string(), n.to_string()),
            None => ("istio-system".to_string(), gateway_ref.to_string()),
        };

        let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        let Ok(svc) = api.get(&name).await else {
            return Vec::new();
        };
        svc.status
            .and_then(|s| s.load_balancer)
            .and_then(|lb| lb.ingress)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|i| i.ip.or(i.hostname))
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for MeshVirtualServiceAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::MeshVirtualService
    }

    async fn endpoints(&self, deadline: Duration) -> Result<Vec<Endpoint>, AdapterError> {
        let api: Api<VirtualService> = match &self.config.namespace {
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
        for vs in list {
            let name = vs.metadata.name.clone().unwrap_or_default();
            let namespace = vs.metadata.namespace.clone().unwrap_or_default();
            let annotations = vs.metadata.annotations.clone().unwrap_or_default();
            let resource = ResourceRef {
                kind: "VirtualService".to_string(),
                namespace: namespace.clone(),
                name: name.clone(),
            };
            let labels = portal_labels(&annotations);

            let Some(gateway_ref) = vs.spec.gateways.first() else {
                continue;
            };
            let targets = self.gateway_targets(gateway_ref).await;
            if targets.is_empty() {
                continue;
            }

            for host in &vs.spec.hosts {
                endpoints.push(Endpoint {
                    dns_name: host.clone(),
                    record_type: Some(RecordType::A),
                    targets: targets.clone(),
                    ttl: None,
                    labels: labels.clone(),
                    resource: resource.clone(),
                });
            }
        }

        Ok(endpoints)
    }
}
