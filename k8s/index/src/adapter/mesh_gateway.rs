use super::{list_params, portal_labels, AdapterError, SourceAdapter};
use async_trait::async_trait;
use dns_portal_controller_core::{Endpoint, RecordType, ResourceRef, SourceKind};
use dns_portal_controller_k8s_api::config::SourceConfig;
use dns_portal_controller_k8s_api::{Api, Client};
use gateway_api::apis::experimental::gateway::Gateway;
use std::time::Duration;

/// Lists `Gateway` objects (`gateway.networking.k8s.io`) and publishes one
/// endpoint per listener hostname, targeting the gateway's advertised
/// addresses.
pub struct MeshGatewayAdapter {
    client: Client,
    config: SourceConfig,
}

impl MeshGatewayAdapter {
    pub fn new(client: Client, config: SourceConfig) -> Self {
        MeshGatewayAdapter { client, config }
    }
}

#[async_trait]
impl SourceAdapter for MeshGatewayAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::MeshGateway
    }

    async fn endpoints(&self, deadline: Duration) -> Result<Vec<Endpoint>, AdapterError> {
        let api: Api<Gateway> = match &self.config.namespace {
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
        for gw in list {
            let name = gw.metadata.name.clone().unwrap_or_default();
            let namespace = gw.metadata.namespace.clone().unwrap_or_default();
            let annotations = gw.metadata.annotations.clone().unwrap_or_default();
            let resource = ResourceRef {
                kind: "Gateway".to_string(),
                namespace: namespace.clone(),
                name: name.clone(),
            };
            let labels = portal_labels(&annotations);

            let targets: Vec<String> = gw
                .status
                .as_ref()
                .and_then(|s| s.addresses.clone())
                .unwrap_or_default()
                .into_iter()
                .map(|addr| addr.value)
                .collect();
            if targets.is_empty() {
                continue;
            }

            for listener in gw.spec.listeners.iter() {
                let Some(hostname) = listener.hostname.clone() else {
                    continue;
                };
                endpoints.push(Endpoint {
                    dns_name: hostname,
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
