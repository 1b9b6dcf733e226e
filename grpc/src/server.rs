//! The `PortalPeer` service implementation, served by every local portal's
//! controller for peer syncers (C4, §4.4) and `GetFqdnDetails` lookups (§6)
//! to poll or stream from.

use crate::metrics::GrpcServerMetricsFamily;
use crate::pb::{
    portal_peer_server::{PortalPeer, PortalPeerServer},
    Fqdn, GetFqdnDetailsRequest, GetFqdnDetailsResponse, ListFqdnsRequest, ListFqdnsResponse,
    ListPortalsRequest, ListPortalsResponse, PortalSummary,
};
use async_trait::async_trait;
use dns_portal_controller_k8s_api::{FqdnStatus, GroupStatus};
use futures::Stream;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tonic::{Request, Response, Status};

/// How often `StreamFqdns` re-polls the data source and re-emits a snapshot.
const STREAM_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Read-side access to the portals and FQDN groups a [`Server`] exposes.
/// Implemented against the live `kube` client by the `runtime` crate;
/// fakeable in tests.
#[async_trait]
pub trait PortalDataSource: Send + Sync + 'static {
    async fn list_portals(&self) -> Result<Vec<PortalSummary>, Status>;
    /// `portal` empty means the host's main portal.
    async fn list_groups(&self, portal: &str) -> Result<Vec<GroupStatus>, Status>;
}

#[derive(Clone)]
pub struct Server<T> {
    source: Arc<T>,
    metrics: GrpcServerMetricsFamily,
    drain: drain::Watch,
}

impl<T> Server<T>
where
    T: PortalDataSource,
{
    pub fn new(source: Arc<T>, metrics: GrpcServerMetricsFamily, drain: drain::Watch) -> Self {
        Self {
            source,
            metrics,
            drain,
        }
    }

    pub fn into_service(self) -> PortalPeerServer<Self> {
        PortalPeerServer::new(self)
    }
}

type BoxStream = Pin<Box<dyn Stream<Item = Result<ListFqdnsResponse, Status>> + Send>>;

#[async_trait]
impl<T> PortalPeer for Server<T>
where
    T: PortalDataSource,
{
    async fn list_portals(
        &self,
        _req: Request<ListPortalsRequest>,
    ) -> Result<Response<ListPortalsResponse>, Status> {
        let rpc = self.metrics.unary_rpc("PortalPeer", "ListPortals");
        let observer = rpc.start();
        let portals = self.source.list_portals().await?;
        observer.end(tonic::Code::Ok);
        Ok(Response::new(ListPortalsResponse { portals }))
    }

    async fn list_fqdns(
        &self,
        req: Request<ListFqdnsRequest>,
    ) -> Result<Response<ListFqdnsResponse>, Status> {
        let rpc = self.metrics.unary_rpc("PortalPeer", "ListFqdns");
        let observer = rpc.start();
        let groups = self.source.list_groups(&req.into_inner().portal).await?;
        observer.end(tonic::Code::Ok);
        Ok(Response::new(ListFqdnsResponse {
            fqdns: flatten_groups(&groups),
        }))
    }

    type StreamFqdnsStream = BoxStream;

    async fn stream_fqdns(
        &self,
        req: Request<ListFqdnsRequest>,
    ) -> Result<Response<Self::StreamFqdnsStream>, Status> {
        let rpc = self.metrics.server_stream_rpc("PortalPeer", "StreamFqdns");
        let observer = rpc.start();
        let portal = req.into_inner().portal;
        let source = self.source.clone();
        let drain = self.drain.clone();

        let stream = async_stream::try_stream! {
            tokio::pin! {
                let shutdown = drain.signaled();
            }
            let mut interval = tokio::time::interval(STREAM_POLL_INTERVAL);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let groups = source.list_groups(&portal).await?;
                        observer.msg_sent();
                        yield ListFqdnsResponse { fqdns: flatten_groups(&groups) };
                    }
                    _ = &mut shutdown => {
                        return;
                    }
                }
            }
        };

        Ok(Response::new(Box::pin(stream)))
    }

    async fn get_fqdn_details(
        &self,
        req: Request<GetFqdnDetailsRequest>,
    ) -> Result<Response<GetFqdnDetailsResponse>, Status> {
        let rpc = self.metrics.unary_rpc("PortalPeer", "GetFqdnDetails");
        let observer = rpc.start();
        let wanted = normalize(&req.into_inner().fqdn);
        let groups = self.source.list_groups("").await?;
        let found = flatten_groups(&groups)
            .into_iter()
            .find(|f| normalize(&f.name) == wanted);

        observer.end(tonic::Code::Ok);
        Ok(Response::new(match found {
            Some(fqdn) => GetFqdnDetailsResponse {
                found: true,
                fqdn: Some(fqdn),
            },
            None => GetFqdnDetailsResponse {
                found: false,
                fqdn: None,
            },
        }))
    }
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Merges `groups` into the RPC surface's flat, per-name `Fqdn` list (§6):
/// an FQDN assigned to more than one group carries every group name it
/// belongs to rather than being duplicated per group.
fn flatten_groups(groups: &[GroupStatus]) -> Vec<Fqdn> {
    let mut by_name: BTreeMap<String, Fqdn> = BTreeMap::new();
    for group in groups {
        for fqdn in &group.fqdns {
            by_name
                .entry(fqdn.fqdn.clone())
                .and_modify(|existing| existing.groups.push(group.name.clone()))
                .or_insert_with(|| to_pb_fqdn(fqdn, vec![group.name.clone()]));
        }
    }
    by_name.into_values().collect()
}

fn to_pb_fqdn(fqdn: &FqdnStatus, groups: Vec<String>) -> Fqdn {
    Fqdn {
        name: fqdn.fqdn.clone(),
        description: fqdn.description.clone().unwrap_or_default(),
        record_type: fqdn.record_type.clone().unwrap_or_default(),
        targets: fqdn.targets.clone(),
        groups,
        last_seen_unix_seconds: fqdn.last_seen.0.timestamp(),
        sync_status: fqdn.sync_status.clone(),
    }
}
