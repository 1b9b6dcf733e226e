#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod endpoint;
mod grouping;
mod priority;
mod resolver;
mod scratch;

pub use self::{
    endpoint::{Endpoint, RecordType, ResourceRef, SourceKind},
    grouping::{GroupMapping, GroupMappingConfig},
    priority::dedup_by_priority,
    resolver::{classify_sync_status, DnsResolver, HickoryResolver, LookupError, ResolvedAnswer},
    scratch::AggregationScratch,
};

use chrono::{DateTime, Utc};
use std::fmt;

/// A fully-aggregated DNS name as it appears in a [`Group`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FqdnRecord {
    pub fqdn: String,
    pub description: Option<String>,
    pub record_type: Option<RecordType>,
    pub targets: Vec<String>,
    pub sync_status: SyncStatus,
    pub last_seen: DateTime<Utc>,
    pub origin: Option<ResourceRef>,
}

/// A named collection of [`FqdnRecord`]s sharing one provenance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub description: Option<String>,
    pub source: GroupSource,
    pub fqdns: Vec<FqdnRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupSource {
    ExternalDns,
    Manual,
    Remote,
}

impl GroupSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupSource::ExternalDns => "external-dns",
            GroupSource::Manual => "manual",
            GroupSource::Remote => "remote",
        }
    }
}

impl fmt::Display for GroupSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-FQDN classification of live DNS state (§4.3.3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncStatus {
    Sync,
    NotSync,
    NotAvailable,
    #[default]
    Unchecked,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Sync => "sync",
            SyncStatus::NotSync => "notsync",
            SyncStatus::NotAvailable => "notavailable",
            SyncStatus::Unchecked => "",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
