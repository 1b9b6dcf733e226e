#![deny(warnings, rust_2018_idioms)]
#![allow(clippy::result_large_err)]
#![forbid(unsafe_code)]

//! The `PortalPeer` gRPC service (§4.4): generated wire types, a server
//! implementation, and a retrying client used by the remote portal syncer.

mod client;
mod metrics;
mod server;

pub mod pb {
    tonic::include_proto!("dnsportal.v1");
}

pub use self::client::{ClientError, PeerClient};
pub use self::metrics::GrpcServerMetricsFamily;
pub use self::server::{PortalDataSource, Server};
