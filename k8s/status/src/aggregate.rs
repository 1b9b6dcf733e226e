//! C3: the four-phase aggregation chain (§4.3).
//!
//! Runs once per local portal: aggregate discovered endpoints (Phase A),
//! collect manually curated entries (Phase B), merge the two (Phase C), then
//! resolve each FQDN's live DNS state and persist the result onto the
//! portal's `ManualDNS` object (Phase D).

use crate::GroupMappingSettings;
use backoff::future::retry;
use backoff::{Error as BackoffError, ExponentialBackoffBuilder};
use chrono::Utc;
use dns_portal_controller_core::{
    classify_sync_status, dedup_by_priority, AggregationScratch, DnsResolver, Endpoint, FqdnRecord,
    Group, GroupMapping, GroupSource, LookupError, ResourceRef, SourceKind, SyncStatus,
};
use dns_portal_controller_k8s_api::crd::ResourceRefStatus;
use dns_portal_controller_k8s_api::{
    conditions, Api, Client, FqdnStatus, GroupStatus, ManualDNS, Patch, PatchParams, SourceRecord,
    Time,
};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const FIELD_MANAGER: &str = "dns-portal-aggregator";

/// Global cap on concurrent live DNS lookups across one aggregation pass
/// (§4.3, §5, §9).
const RESOLVE_CONCURRENCY: usize = 10;

/// Per-lookup deadline; exceeding it classifies the FQDN `notavailable`
/// (§5).
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("listing SourceRecords failed: {0}")]
    ListSourceRecords(#[source] kube::Error),
    #[error("listing ManualDNS objects failed: {0}")]
    ListManualDns(#[source] kube::Error),
    #[error("fetching ManualDNS {0} failed: {1}")]
    GetManualDns(String, #[source] kube::Error),
    #[error("patching ManualDNS {0} status failed: {1}")]
    PatchManualDns(String, #[source] kube::Error),
}

fn backoff_policy() -> backoff::ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(100))
        .with_multiplier(2.0)
        .with_randomization_factor(0.1)
        .with_max_elapsed_time(Some(Duration::from_millis(3_100)))
        .build()
}

fn classify(err: kube::Error) -> BackoffError<kube::Error> {
    match &err {
        kube::Error::Api(resp) if resp.code == 409 || resp.code >= 500 => {
            BackoffError::transient(err)
        }
        _ => BackoffError::permanent(err),
    }
}

/// Runs all four phases for `portal_name` and persists the result.
pub async fn aggregate_portal(
    client: &Client,
    namespace: &str,
    portal_name: &str,
    resolver: &dyn DnsResolver,
    settings: &GroupMappingSettings,
) -> Result<(), AggregateError> {
    let scratch = AggregationScratch::new()
        .with_external_groups(phase_a_aggregate(client, namespace, portal_name, settings).await?)
        .with_manual_groups(phase_b_collect(client, namespace, portal_name).await?);
    let scratch = scratch
        .clone()
        .with_merged_groups(phase_c_merge(&scratch.external_groups, &scratch.manual_groups));
    let scratch = scratch
        .clone()
        .with_resolved_groups(phase_d_resolve(resolver, &scratch.merged_groups).await);

    persist(client, namespace, portal_name, scratch.into_resolved()).await
}

async fn phase_a_aggregate(
    client: &Client,
    namespace: &str,
    portal_name: &str,
    settings: &GroupMappingSettings,
) -> Result<Vec<Group>, AggregateError> {
    let api: Api<SourceRecord> = Api::namespaced(client.clone(), namespace);
    let records = api
        .list(&Default::default())
        .await
        .map_err(AggregateError::ListSourceRecords)?;

    let mut by_kind: BTreeMap<SourceKind, Vec<Endpoint>> = BTreeMap::new();
    for record in records.items {
        if record.spec.portal_ref != portal_name {
            continue;
        }
        let Ok(kind) = SourceKind::from_str(&record.spec.source_kind) else {
            continue;
        };
        let status = record.status.unwrap_or_default();
        let endpoints = by_kind.entry(kind).or_default();
        for ep in status.endpoints {
            endpoints.push(Endpoint {
                dns_name: ep.dns_name,
                record_type: ep.record_type.as_deref().and_then(|s| s.parse().ok()),
                targets: ep.targets,
                ttl: ep.ttl,
                labels: ep.labels,
                resource: ResourceRef {
                    kind: ep.resource.kind,
                    namespace: ep.resource.namespace,
                    name: ep.resource.name,
                },
            });
        }
    }

    let winners = dedup_by_priority(&by_kind, &settings.priority);
    let mapping = GroupMapping::new(settings.group_mapping.clone());
    let now = Utc::now();

    let mut groups: BTreeMap<String, Vec<FqdnRecord>> = BTreeMap::new();
    for endpoint in winners {
        for group_name in mapping.resolve(&endpoint.labels, &endpoint.resource.namespace) {
            groups.entry(group_name).or_default().push(FqdnRecord {
                fqdn: endpoint.dns_name.clone(),
                description: None,
                record_type: endpoint.record_type,
                targets: endpoint.targets.clone(),
                sync_status: SyncStatus::Unchecked,
                last_seen: now,
                origin: Some(endpoint.resource.clone()),
            });
        }
    }

    Ok(groups
        .into_iter()
        .map(|(name, fqdns)| Group {
            name,
            description: None,
            source: GroupSource::ExternalDns,
            fqdns,
        })
        .collect())
}

async fn phase_b_collect(
    client: &Client,
    namespace: &str,
    portal_name: &str,
) -> Result<Vec<Group>, AggregateError> {
    let api: Api<ManualDNS> = Api::namespaced(client.clone(), namespace);
    let objects = api
        .list(&Default::default())
        .await
        .map_err(AggregateError::ListManualDns)?;

    let now = Utc::now();
    let mut groups = Vec::new();
    for object in objects.items {
        if object.spec.portal_ref != portal_name {
            continue;
        }
        for group in object.spec.groups {
            groups.push(Group {
                name: group.name,
                description: group.description,
                source: GroupSource::Manual,
                fqdns: group
                    .entries
                    .into_iter()
                    .map(|entry| FqdnRecord {
                        fqdn: entry.fqdn,
                        description: entry.description,
                        record_type: None,
                        targets: Vec::new(),
                        sync_status: SyncStatus::Unchecked,
                        last_seen: now,
                        origin: None,
                    })
                    .collect(),
            });
        }
    }
    Ok(groups)
}

/// Merges `external` and `manual` groups by name; within a shared group name,
/// a manual FQDN with the same name as an externally-discovered one wins. A
/// group that received no manual contribution keeps source `external-dns`
/// even if a same-named manual group happened to exist elsewhere; only a
/// group a manual entry actually touched is labeled `manual` (§4.3 Phase C).
fn phase_c_merge(external: &[Group], manual: &[Group]) -> Vec<Group> {
    let mut merged: BTreeMap<String, (Option<String>, BTreeMap<String, FqdnRecord>, bool)> =
        BTreeMap::new();

    for group in external {
        let entry = merged
            .entry(group.name.clone())
            .or_insert_with(|| (group.description.clone(), BTreeMap::new(), false));
        for fqdn in &group.fqdns {
            entry.1.insert(fqdn.fqdn.clone(), fqdn.clone());
        }
    }
    for group in manual {
        let entry = merged
            .entry(group.name.clone())
            .or_insert_with(|| (group.description.clone(), BTreeMap::new(), false));
        if group.description.is_some() {
            entry.0 = group.description.clone();
        }
        entry.2 = true;
        for fqdn in &group.fqdns {
            entry.1.insert(fqdn.fqdn.clone(), fqdn.clone());
        }
    }

    merged
        .into_iter()
        .map(|(name, (description, fqdns, has_manual))| Group {
            name,
            description,
            source: if has_manual {
                GroupSource::Manual
            } else {
                GroupSource::ExternalDns
            },
            fqdns: fqdns.into_values().collect(),
        })
        .collect()
}

/// Resolves every FQDN across all groups concurrently, bounded to
/// [`RESOLVE_CONCURRENCY`] in-flight lookups and [`RESOLVE_TIMEOUT`] per
/// lookup (§4.3, §5, §9), then reassembles the per-group structure.
async fn phase_d_resolve(resolver: &dyn DnsResolver, merged: &[Group]) -> Vec<Group> {
    let now = Utc::now();
    let permits = Arc::new(Semaphore::new(RESOLVE_CONCURRENCY));

    let flattened: Vec<(usize, FqdnRecord)> = merged
        .iter()
        .enumerate()
        .flat_map(|(group_idx, group)| {
            group
                .fqdns
                .iter()
                .cloned()
                .map(move |fqdn| (group_idx, fqdn))
        })
        .collect();

    let resolved: Vec<(usize, FqdnRecord)> = stream::iter(flattened)
        .map(|(group_idx, fqdn)| {
            let permits = permits.clone();
            let now = now;
            let resolver = resolver;
            async move {
                let _permit = permits.acquire_owned().await.expect("semaphore not closed");
                let answer = match tokio::time::timeout(RESOLVE_TIMEOUT, resolver.resolve(&fqdn.fqdn))
                    .await
                {
                    Ok(answer) => answer,
                    Err(_) => Err(LookupError::NotFound(fqdn.fqdn.clone())),
                };
                let sync_status = classify_sync_status(&fqdn.targets, &answer);
                (
                    group_idx,
                    FqdnRecord {
                        sync_status,
                        last_seen: now,
                        ..fqdn
                    },
                )
            }
        })
        .buffer_unordered(RESOLVE_CONCURRENCY)
        .collect()
        .await;

    let mut fqdns_by_group: BTreeMap<usize, Vec<FqdnRecord>> = BTreeMap::new();
    for (group_idx, fqdn) in resolved {
        fqdns_by_group.entry(group_idx).or_default().push(fqdn);
    }

    merged
        .iter()
        .enumerate()
        .map(|(group_idx, group)| Group {
            fqdns: fqdns_by_group.remove(&group_idx).unwrap_or_default(),
            ..group.clone()
        })
        .collect()
}

async fn persist(
    client: &Client,
    namespace: &str,
    portal_name: &str,
    groups: Vec<Group>,
) -> Result<(), AggregateError> {
    let api: Api<ManualDNS> = Api::namespaced(client.clone(), namespace);
    let object = api
        .get(portal_name)
        .await
        .map_err(|err| AggregateError::GetManualDns(portal_name.to_string(), err))?;

    let mut status = object.status.unwrap_or_default();
    status.groups = groups.iter().map(wire_group).collect();
    status.last_reconcile_time = Some(Time(Utc::now()));
    conditions::set(
        &mut status.conditions,
        conditions::DNS_SYNCED,
        true,
        "Aggregated",
        format!("{} groups aggregated", status.groups.len()),
    );

    retry(backoff_policy(), || async {
        let patch = Patch::Merge(serde_json::json!({ "status": status }));
        api.patch_status(portal_name, &PatchParams::apply(FIELD_MANAGER), &patch)
            .await
            .map_err(classify)
    })
    .await
    .map_err(|err| AggregateError::PatchManualDns(portal_name.to_string(), err))?;

    Ok(())
}

fn wire_group(group: &Group) -> GroupStatus {
    GroupStatus {
        name: group.name.clone(),
        description: group.description.clone(),
        source: group.source.to_string(),
        fqdns: group.fqdns.iter().map(wire_fqdn).collect(),
    }
}

fn wire_fqdn(fqdn: &FqdnRecord) -> FqdnStatus {
    FqdnStatus {
        fqdn: fqdn.fqdn.clone(),
        description: fqdn.description.clone(),
        record_type: fqdn.record_type.map(|t| t.to_string()),
        targets: fqdn.targets.clone(),
        sync_status: fqdn.sync_status.to_string(),
        last_seen: Time(fqdn.last_seen),
        origin_ref: fqdn.origin.as_ref().map(ResourceRefStatus::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str, source: GroupSource, fqdns: Vec<&str>) -> Group {
        Group {
            name: name.to_string(),
            description: None,
            source,
            fqdns: fqdns
                .into_iter()
                .map(|f| FqdnRecord {
                    fqdn: f.to_string(),
                    description: None,
                    record_type: None,
                    targets: Vec::new(),
                    sync_status: SyncStatus::Unchecked,
                    last_seen: Utc::now(),
                    origin: None,
                })
                .collect(),
        }
    }

    #[test]
    fn manual_fqdn_wins_over_external_with_same_name() {
        let external = vec![group("apps", GroupSource::ExternalDns, vec!["a.example.com"])];
        let manual = vec![group("apps", GroupSource::Manual, vec!["a.example.com", "b.example.com"])];
        let merged = phase_c_merge(&external, &manual);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].fqdns.len(), 2);
        assert_eq!(merged[0].source, GroupSource::Manual);
    }

    #[test]
    fn distinct_groups_both_survive() {
        let external = vec![group("apps", GroupSource::ExternalDns, vec!["a.example.com"])];
        let manual = vec![group("billing", GroupSource::Manual, vec!["b.example.com"])];
        let merged = phase_c_merge(&external, &manual);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn external_only_group_keeps_external_dns_source() {
        let external = vec![group("apps", GroupSource::ExternalDns, vec!["a.example.com"])];
        let merged = phase_c_merge(&external, &[]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source, GroupSource::ExternalDns);
    }
}
