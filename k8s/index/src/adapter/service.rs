use super::{list_params, portal_labels, AdapterError, SourceAdapter};
use async_trait::async_trait;
use dns_portal_controller_core::{Endpoint, RecordType, ResourceRef, SourceKind};
use dns_portal_controller_k8s_api::config::SourceConfig;
use dns_portal_controller_k8s_api::{Api, Client, Service};
use std::time::Duration;

/// `hostname` annotation external-dns-style controllers use to publish a
/// service's desired DNS name; this adapter mirrors that convention.
const HOSTNAME_ANNOTATION: &str = "external-dns.alpha.kubernetes.io/hostname";

pub struct ServiceAdapter {
    client: Client,
    config: SourceConfig,
}

impl ServiceAdapter {
    pub fn new(client: Client, config: SourceConfig) -> Self {
        ServiceAdapter { client, config }
    }
}

#[async_trait]
impl SourceAdapter for ServiceAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Service
    }

    async fn endpoints(&self, deadline: Duration) -> Result<Vec<Endpoint>, AdapterError> {
        let api: Api<Service> = match &self.config.namespace {
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
        for svc in list {
            let name = svc.metadata.name.clone().unwrap_or_default();
            let namespace = svc.metadata.namespace.clone().unwrap_or_default();
            let annotations = svc.metadata.annotations.clone().unwrap_or_default();

            let Some(dns_name) = annotations.get(HOSTNAME_ANNOTATION).cloned() else {
                continue;
            };

            let Some(status) = svc.status.as_ref() else {
                continue;
            };
            let Some(lb) = status.load_balancer.as_ref() else {
                continue;
            };
            let ingress = lb.ingress.clone().unwrap_or_default();
            if ingress.is_empty() {
                continue;
            }

            let mut addresses = Vec::new();
            let mut hostnames = Vec::new();
            for ing in &ingress {
                if let Some(ip) = &ing.ip {
                    addresses.push(ip.clone());
                }
                if let Some(hostname) = &ing.hostname {
                    hostnames.push(hostname.clone());
                }
            }

            let resource = ResourceRef {
                kind: "Service".to_string(),
                namespace: namespace.clone(),
                name: name.clone(),
            };
            let labels = portal_labels(&annotations);

            if !addresses.is_empty() {
                endpoints.push(Endpoint {
                    dns_name: dns_name.clone(),
                    record_type: Some(RecordType::A),
                    targets: addresses,
                    ttl: None,
                    labels: labels.clone(),
                    resource: resource.clone(),
                });
            }
            for hostname in hostnames {
                endpoints.push(Endpoint {
                    dns_name: dns_name.clone(),
                    record_type: Some(RecordType::Cname),
                    targets: vec![hostname],
                    ttl: None,
                    labels: labels.clone(),
                    resource: resource.clone(),
                });
            }
        }

        Ok(endpoints)
    }
}
