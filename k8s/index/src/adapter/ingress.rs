use super::{list_params, portal_labels, AdapterError, SourceAdapter};
use async_trait::async_trait;
use dns_portal_controller_core::{Endpoint, ResourceRef, SourceKind};
use dns_portal_controller_k8s_api::config::SourceConfig;
use dns_portal_controller_k8s_api::{Api, Client, Ingress};
use std::time::Duration;

pub struct IngressAdapter {
    client: Client,
    config: SourceConfig,
}

impl IngressAdapter {
    pub fn new(client: Client, config: SourceConfig) -> Self {
        IngressAdapter { client, config }
    }

    fn class_allowed(&self, ingress: &Ingress) -> bool {
        if self.config.ingress_class_names.is_empty() {
            return true;
        }
        let class = ingress
            .spec
            .as_ref()
            .and_then(|s| s.ingress_class_name.as_deref());
        class.is_some_and(|c| self.config.ingress_class_names.iter().any(|n| n == c))
    }
}

#[async_trait]
impl SourceAdapter for IngressAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Ingress
    }

    async fn endpoints(&self, deadline: Duration) -> Result<Vec<Endpoint>, AdapterError> {
        let api: Api<Ingress> = match &self.config.namespace {
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
        for ing in list {
            if !self.class_allowed(&ing) {
                continue;
            }

            let name = ing.metadata.name.clone().unwrap_or_default();
            let namespace = ing.metadata.namespace.clone().unwrap_or_default();
            let annotations = ing.metadata.annotations.clone().unwrap_or_default();
            let resource = ResourceRef {
                kind: "Ingress".to_string(),
                namespace: namespace.clone(),
                name: name.clone(),
            };
            let labels = portal_labels(&annotations);

            let mut targets = Vec::new();
            if let Some(status) = ing.status.as_ref() {
                if let Some(lb) = status.load_balancer.as_ref() {
                    for i in lb.ingress.clone().unwrap_or_default() {
                        if let Some(ip) = i.ip {
                            targets.push(ip);
                        }
                        if let Some(hostname) = i.hostname {
                            targets.push(hostname);
                        }
                    }
                }
            }
            if targets.is_empty() {
                continue;
            }

            let hosts: Vec<String> = ing
                .spec
                .as_ref()
                .and_then(|s| s.rules.clone())
                .unwrap_or_default()
                .into_iter()
                .filter_map(|rule| rule.host)
                .collect();

            for host in hosts {
                endpoints.push(Endpoint {
                    dns_name: host,
                    record_type: None,
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
