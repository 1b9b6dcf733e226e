mod manual_dns;
mod portal;
mod shared;
mod source_record;

pub use self::{
    manual_dns::{ManualDNS, ManualDNSGroup, ManualDNSGroupEntry, ManualDNSSpec, ManualDNSStatus},
    portal::{Portal, PortalRemote, PortalRemoteTls, PortalSpec, PortalStatus, RemoteSync},
    shared::{FqdnStatus, Group, ResourceRefStatus, SourceEndpointStatus},
    source_record::{SourceRecord, SourceRecordSpec, SourceRecordStatus},
};
