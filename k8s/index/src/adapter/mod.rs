//! Source adapters: one per source kind, each enumerating `Endpoint`s from a
//! Kubernetes-shaped object list (§3.1, §9 "capability set").

mod dns_endpoint;
mod ingress;
mod mesh_gateway;
mod mesh_virtual_service;
mod service;

pub use self::{
    dns_endpoint::DnsEndpointAdapter, ingress::IngressAdapter, mesh_gateway::MeshGatewayAdapter,
    mesh_virtual_service::MeshVirtualServiceAdapter, service::ServiceAdapter,
};

use async_trait::async_trait;
use dns_portal_controller_core::{Endpoint, SourceKind};
use dns_portal_controller_k8s_api::config::SourceConfig;
use kube::Client;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("listing {kind} failed: {source}")]
    List {
        kind: SourceKind,
        #[source]
        source: kube::Error,
    },
    #[error("{kind} adapter timed out")]
    Timeout { kind: SourceKind },
}

/// Enumerates endpoints from a single source kind within a deadline (§9).
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn endpoints(&self, deadline: Duration) -> Result<Vec<Endpoint>, AdapterError>;
}

/// Builds the enabled adapters from configuration, in C1's stable order
/// (§4.1 step 3: `SourceKind::ALL` order).
pub fn build_adapters(
    client: &Client,
    sources: &dns_portal_controller_k8s_api::config::SourcesConfig,
) -> Vec<Box<dyn SourceAdapter>> {
    let mut adapters: Vec<Box<dyn SourceAdapter>> = Vec::new();

    if sources.service_enabled() {
        adapters.push(Box::new(ServiceAdapter::new(
            client.clone(),
            sources.service.clone(),
        )));
    }
    if sources.ingress_enabled() {
        adapters.push(Box::new(IngressAdapter::new(
            client.clone(),
            sources.ingress.clone(),
        )));
    }
    if sources.dns_endpoint_enabled() {
        adapters.push(Box::new(DnsEndpointAdapter::new(
            client.clone(),
            sources.dns_endpoint.clone(),
        )));
    }
    if sources.istio_gateway_enabled() {
        adapters.push(Box::new(MeshGatewayAdapter::new(
            client.clone(),
            sources.istio_gateway.clone(),
        )));
    }
    if sources.istio_virtual_service_enabled() {
        adapters.push(Box::new(MeshVirtualServiceAdapter::new(
            client.clone(),
            sources.istio_virtual_service.clone(),
        )));
    }

    adapters
}

pub(crate) fn list_params(config: &SourceConfig) -> kube::api::ListParams {
    let mut params = kube::api::ListParams::default();
    if let Some(filter) = &config.label_filter {
        params = params.labels(filter);
    }
    params
}

/// Copies the `dnsportal.io/*` annotations an adapter cares about off the
/// originating object (§4.1 step 4 enrichment). Callers that already have
/// per-entry labels (e.g. `DNSEndpoint` entries) should `extend` these into
/// their own map afterwards so the entry's own labels win.
pub(crate) fn portal_labels(
    annotations: &std::collections::BTreeMap<String, String>,
) -> std::collections::BTreeMap<String, String> {
    use dns_portal_controller_k8s_api::annotations::{
        GROUPS_ANNOTATION, IGNORE_ANNOTATION, PORTAL_ANNOTATION,
    };

    [PORTAL_ANNOTATION, GROUPS_ANNOTATION, IGNORE_ANNOTATION]
        .into_iter()
        .filter_map(|key| annotations.get(key).map(|v| (key.to_string(), v.clone())))
        .collect()
}
