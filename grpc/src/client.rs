//! Typed client used by C4 (the remote portal syncer) to poll a peer's
//! `PortalPeer` service (§4.4).

use crate::pb::{
    portal_peer_client::PortalPeerClient, ListFqdnsRequest, ListFqdnsResponse, ListPortalsRequest,
};
use backoff::future::retry;
use backoff::{Error as BackoffError, ExponentialBackoffBuilder};
use std::time::Duration;
use tonic::transport::Channel;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connecting to peer failed: {0}")]
    Connect(#[source] tonic::transport::Error),
    #[error("peer RPC failed: {0}")]
    Rpc(#[source] tonic::Status),
}

/// Thin wrapper over the generated client adding the §4.4 retry policy
/// (3 attempts, 500ms base exponential backoff).
#[derive(Clone)]
pub struct PeerClient {
    inner: PortalPeerClient<Channel>,
}

impl PeerClient {
    pub async fn connect(channel: Channel) -> Self {
        PeerClient {
            inner: PortalPeerClient::new(channel),
        }
    }

    pub async fn list_fqdns(&self, portal: &str) -> Result<ListFqdnsResponse, ClientError> {
        let mut client = self.inner.clone();
        retry(retry_policy(), || async {
            client
                .list_fqdns(ListFqdnsRequest {
                    portal: portal.to_string(),
                })
                .await
                .map(tonic::Response::into_inner)
                .map_err(classify)
        })
        .await
        .map_err(ClientError::Rpc)
    }

    /// Unretried: the §4.4 healthcheck step treats any failure as terminal
    /// for this reconcile and requeues after 5 minutes rather than retrying
    /// inline.
    pub async fn list_portals(&self) -> Result<Vec<crate::pb::PortalSummary>, ClientError> {
        let mut client = self.inner.clone();
        let response = client
            .list_portals(ListPortalsRequest {})
            .await
            .map_err(ClientError::Rpc)?;
        Ok(response.into_inner().portals)
    }
}

/// 3 attempts, 500ms base, 2x multiplier (§4.4).
fn retry_policy() -> backoff::ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(500))
        .with_multiplier(2.0)
        .with_max_elapsed_time(Some(Duration::from_millis(500 + 1_000)))
        .build()
}

fn classify(status: tonic::Status) -> BackoffError<tonic::Status> {
    use tonic::Code::*;
    match status.code() {
        Unavailable | DeadlineExceeded | ResourceExhausted => BackoffError::transient(status),
        _ => BackoffError::permanent(status),
    }
}
