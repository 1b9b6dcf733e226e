//! Implements `grpc::PortalDataSource` against a live `kube::Client`, read
//! by this host's own `PortalPeer` server (served for peer syncers and
//! `GetFqdnDetails` lookups, §4.4, §6).

use async_trait::async_trait;
use dns_portal_controller_grpc::pb::PortalSummary;
use dns_portal_controller_grpc::PortalDataSource;
use dns_portal_controller_k8s_api::{Api, Client, GroupStatus, ManualDNS, Portal, ResourceExt};
use tonic::Status;

pub struct KubePortalDataSource {
    client: Client,
    namespace: String,
}

impl KubePortalDataSource {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        KubePortalDataSource {
            client,
            namespace: namespace.into(),
        }
    }

    async fn main_portal_name(&self) -> Result<String, Status> {
        let api: Api<Portal> = Api::namespaced(self.client.clone(), &self.namespace);
        let portals = api.list(&Default::default()).await.map_err(to_status)?;
        portals
            .items
            .into_iter()
            .find(|p| p.spec.remote.is_none() && p.spec.main)
            .map(|p| p.name_any())
            .ok_or_else(|| Status::not_found("no main portal configured in this namespace"))
    }
}

#[async_trait]
impl PortalDataSource for KubePortalDataSource {
    async fn list_portals(&self) -> Result<Vec<PortalSummary>, Status> {
        let api: Api<Portal> = Api::namespaced(self.client.clone(), &self.namespace);
        let portals = api.list(&Default::default()).await.map_err(to_status)?;
        Ok(portals.items.iter().map(to_summary).collect())
    }

    async fn list_groups(&self, portal: &str) -> Result<Vec<GroupStatus>, Status> {
        let name = if portal.is_empty() {
            self.main_portal_name().await?
        } else {
            portal.to_string()
        };

        let api: Api<ManualDNS> = Api::namespaced(self.client.clone(), &self.namespace);
        match api.get(&name).await {
            Ok(view) => Ok(view.status.unwrap_or_default().groups),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(Vec::new()),
            Err(err) => Err(to_status(err)),
        }
    }
}

fn to_summary(portal: &Portal) -> PortalSummary {
    let name = portal.name_any();
    PortalSummary {
        sub_path: portal.spec.sub_path.clone().unwrap_or_else(|| name.clone()),
        name,
        title: portal.spec.title.clone(),
        main: portal.spec.main,
        remote_url: portal.spec.remote.as_ref().map(|r| r.url.clone()),
    }
}

fn to_status(err: kube::Error) -> Status {
    Status::unavailable(err.to_string())
}
