#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod adapter;
pub mod collector;
pub mod lifecycle;
pub mod portal_index;
pub mod router;

pub use self::{
    adapter::{
        build_adapters, AdapterError, DnsEndpointAdapter, IngressAdapter, MeshGatewayAdapter,
        MeshVirtualServiceAdapter, ServiceAdapter, SourceAdapter,
    },
    collector::{Collector, RoutedBucket, RoutedSnapshot, TickError},
    lifecycle::{bootstrap_main_portal, reconcile_local_portal, LifecycleError},
    portal_index::{
        ManualDnsIndex, PortalWake, RecordWatchIndex, SharedRecordWatchIndex, SourceRecordIndex,
    },
    router::{route, PortalLookup},
};
