#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod annotations;
pub mod conditions;
pub mod config;
pub mod crd;
pub mod duration;
pub mod watch;

pub use self::crd::{
    FqdnStatus, Group as GroupStatus, ManualDNS, ManualDNSGroup, ManualDNSGroupEntry,
    ManualDNSSpec, ManualDNSStatus, Portal, PortalRemote, PortalRemoteTls, PortalSpec,
    PortalStatus, RemoteSync, SourceEndpointStatus, SourceRecord, SourceRecordSpec,
    SourceRecordStatus,
};
pub use self::duration::K8sDuration;

pub use k8s_openapi::{
    api::{
        self,
        coordination::v1::Lease,
        core::v1::{Endpoints, Namespace, Node, Pod, Secret, Service, ServiceSpec},
        networking::v1::Ingress,
    },
    apimachinery::{
        self,
        pkg::apis::meta::v1::{Condition, OwnerReference, Time},
    },
    NamespaceResourceScope,
};
pub use kube::{
    api::{Api, ListParams, ObjectMeta, Patch, PatchParams, PostParams, Resource, ResourceExt},
    error::ErrorResponse,
    runtime::watcher::Event as WatchEvent,
    Client, Error,
};
