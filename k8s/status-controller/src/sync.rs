//! C4: the remote portal syncer (§4.4).
//!
//! Runs once per portal with `spec.remote` set: healthcheck the peer,
//! fetch its FQDNs, materialize them as a `remote`-sourced view object,
//! and reflect the outcome onto the Portal's status.

use crate::tls;
use backoff::future::retry;
use backoff::{Error as BackoffError, ExponentialBackoffBuilder};
use chrono::{TimeZone, Utc};
use dns_portal_controller_grpc::pb::{Fqdn, PortalSummary};
use dns_portal_controller_grpc::{ClientError, PeerClient};
use dns_portal_controller_k8s_api::{
    conditions, Api, Client, GroupStatus, ManualDNS, ManualDNSSpec, ManualDNSStatus, ObjectMeta,
    Patch, PatchParams, Portal, PostParams, RemoteSync, Resource, ResourceExt, Time,
};
use std::collections::BTreeMap;
use std::time::Duration;

const FIELD_MANAGER: &str = "dns-portal-remote-syncer";

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("portal {0} has no remote configured")]
    NotRemote(String),
    #[error("getting portal {0} failed: {1}")]
    GetPortal(String, #[source] kube::Error),
    #[error("connecting to peer failed: {0}")]
    Connect(#[source] tls::TlsError),
    #[error("peer healthcheck failed: {0}")]
    Healthcheck(#[source] ClientError),
    #[error("fetching FQDNs from peer failed: {0}")]
    Fetch(#[source] ClientError),
    #[error("writing remote view object {0} failed: {1}")]
    ViewWrite(String, #[source] kube::Error),
    #[error("patching portal {0} status failed: {1}")]
    PatchPortalStatus(String, #[source] kube::Error),
}

/// Base 100ms, factor 2, ~10% jitter, bounded to roughly 5 retry steps —
/// matches the store-writer's status-patch policy, distinct from the
/// peer-RPC retry policy inside `dns_portal_controller_grpc::PeerClient`.
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

pub fn view_object_name(portal_name: &str) -> String {
    format!("remote-{portal_name}")
}

/// Runs one full sync pass for `portal_name` (which must have `spec.remote`
/// set). Any failure is first reflected onto the Portal's conditions and
/// `status.remoteSync`, then returned so the caller can log and requeue.
pub async fn sync_portal(client: &Client, namespace: &str, portal_name: &str) -> Result<(), SyncError> {
    let portals: Api<Portal> = Api::namespaced(client.clone(), namespace);
    let portal = portals
        .get(portal_name)
        .await
        .map_err(|source| SyncError::GetPortal(portal_name.to_string(), source))?;
    let remote = portal
        .spec
        .remote
        .clone()
        .ok_or_else(|| SyncError::NotRemote(portal_name.to_string()))?;

    let channel = match tls::build_channel(client, namespace, &remote).await {
        Ok(channel) => channel,
        Err(error) => {
            record_failure(&portals, &portal, "RemoteConnectionFailed", &error.to_string()).await?;
            return Err(SyncError::Connect(error));
        }
    };
    let peer = PeerClient::connect(channel).await;

    // Step 1: healthcheck. Unretried — any failure requeues the whole
    // reconcile after 5 minutes rather than retrying inline.
    if let Err(error) = peer.list_portals().await {
        record_failure(&portals, &portal, "RemoteConnectionFailed", &error.to_string()).await?;
        return Err(SyncError::Healthcheck(error));
    }

    // Step 2: fetch FQDNs (retried inside PeerClient) concurrently with a
    // fresh portal listing used only to resolve the peer's title.
    let peer_portal_name = remote.peer_portal_name.clone().unwrap_or_default();
    let (fqdns_result, title_result) = tokio::join!(
        peer.list_fqdns(&peer_portal_name),
        peer.list_portals(),
    );

    let fqdns = match fqdns_result {
        Ok(response) => response.fqdns,
        Err(error) => {
            record_failure(&portals, &portal, "RemoteFetchFailed", &error.to_string()).await?;
            return Err(SyncError::Fetch(error));
        }
    };
    let peer_title = title_result
        .ok()
        .and_then(|summaries| find_peer_title(&summaries, &peer_portal_name));

    // Step 3 + 4: materialize groups, create-or-update the view object.
    let now = Time(Utc::now());
    let groups = materialize_groups(&fqdns, &now);
    let fqdn_count = groups.iter().map(|g| g.fqdns.len() as i64).sum();
    let view_name = view_object_name(portal_name);
    let view_result = upsert_view(client, namespace, &view_name, portal_name, &portal, groups).await;

    // Step 5: reflect onto the portal's status regardless of view-write outcome.
    update_portal_status(&portals, &portal, peer_title, fqdn_count, view_result.is_ok(), &now).await?;

    view_result.map_err(|source| SyncError::ViewWrite(view_name, source))
}

fn find_peer_title(portals: &[PortalSummary], peer_portal_name: &str) -> Option<String> {
    if peer_portal_name.is_empty() {
        portals.iter().find(|p| p.main).map(|p| p.title.clone())
    } else {
        portals
            .iter()
            .find(|p| p.name == peer_portal_name)
            .map(|p| p.title.clone())
    }
}

/// `groups[]` empty on a fetched FQDN defaults to `"default"`; `syncStatus`
/// is copied through verbatim rather than re-resolved (§4.3.4).
fn materialize_groups(fqdns: &[Fqdn], now: &Time) -> Vec<GroupStatus> {
    let mut by_group: BTreeMap<String, Vec<dns_portal_controller_k8s_api::FqdnStatus>> = BTreeMap::new();
    for fqdn in fqdns {
        let last_seen = if fqdn.last_seen_unix_seconds > 0 {
            Utc.timestamp_opt(fqdn.last_seen_unix_seconds, 0)
                .single()
                .map(Time)
                .unwrap_or_else(|| now.clone())
        } else {
            now.clone()
        };
        let status = dns_portal_controller_k8s_api::FqdnStatus {
            fqdn: fqdn.name.clone(),
            description: (!fqdn.description.is_empty()).then(|| fqdn.description.clone()),
            record_type: (!fqdn.record_type.is_empty()).then(|| fqdn.record_type.clone()),
            targets: fqdn.targets.clone(),
            sync_status: fqdn.sync_status.clone(),
            last_seen,
            origin_ref: None,
        };

        let group_names = if fqdn.groups.is_empty() {
            vec!["default".to_string()]
        } else {
            fqdn.groups.clone()
        };
        for group_name in group_names {
            by_group.entry(group_name).or_default().push(status.clone());
        }
    }

    by_group
        .into_iter()
        .map(|(name, fqdns)| GroupStatus {
            name,
            description: None,
            source: "remote".to_string(),
            fqdns,
        })
        .collect()
}

async fn upsert_view(
    client: &Client,
    namespace: &str,
    view_name: &str,
    portal_name: &str,
    portal: &Portal,
    groups: Vec<GroupStatus>,
) -> Result<(), kube::Error> {
    let api: Api<ManualDNS> = Api::namespaced(client.clone(), namespace);
    ensure_view_exists(&api, view_name, namespace, portal_name, portal).await?;

    let mut status = ManualDNSStatus {
        groups,
        last_reconcile_time: Some(Time(Utc::now())),
        conditions: Vec::new(),
    };
    conditions::set(
        &mut status.conditions,
        conditions::READY,
        true,
        "RemoteSyncSuccess",
        format!("{} groups synced from peer", status.groups.len()),
    );

    retry(backoff_policy(), || async {
        let patch = Patch::Merge(serde_json::json!({ "status": status }));
        api.patch_status(view_name, &PatchParams::apply(FIELD_MANAGER), &patch)
            .await
            .map_err(classify)
    })
    .await
}

async fn ensure_view_exists(
    api: &Api<ManualDNS>,
    view_name: &str,
    namespace: &str,
    portal_name: &str,
    portal: &Portal,
) -> Result<(), kube::Error> {
    retry(backoff_policy(), || async {
        match api.get(view_name).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => {
                let owner = portal
                    .controller_owner_ref(&())
                    .expect("Portal is namespaced with name and uid set");
                let view = ManualDNS {
                    metadata: ObjectMeta {
                        name: Some(view_name.to_string()),
                        namespace: Some(namespace.to_string()),
                        owner_references: Some(vec![owner]),
                        ..Default::default()
                    },
                    spec: ManualDNSSpec {
                        portal_ref: portal_name.to_string(),
                        groups: Vec::new(),
                    },
                    status: Some(ManualDNSStatus::default()),
                };
                match api.create(&PostParams::default(), &view).await {
                    Ok(_) => Ok(()),
                    Err(kube::Error::Api(err)) if err.code == 409 => Ok(()),
                    Err(err) => Err(classify(err)),
                }
            }
            Err(err) => Err(classify(err)),
        }
    })
    .await
}

async fn record_failure(
    api: &Api<Portal>,
    portal: &Portal,
    reason: &str,
    message: &str,
) -> Result<(), SyncError> {
    let mut status = portal.status.clone().unwrap_or_default();
    status.ready = false;
    conditions::set(&mut status.conditions, conditions::READY, false, reason, message);

    let mut remote_sync = status.remote_sync.clone().unwrap_or(RemoteSync {
        last_sync_time: None,
        last_sync_error: None,
        peer_title: None,
        fqdn_count: 0,
    });
    remote_sync.last_sync_error = Some(message.to_string());
    status.remote_sync = Some(remote_sync);

    retry(backoff_policy(), || async {
        let patch = Patch::Merge(serde_json::json!({ "status": status }));
        api.patch_status(&portal.name_any(), &PatchParams::apply(FIELD_MANAGER), &patch)
            .await
            .map_err(classify)
    })
    .await
    .map_err(|source| SyncError::PatchPortalStatus(portal.name_any(), source))
}

async fn update_portal_status(
    api: &Api<Portal>,
    portal: &Portal,
    peer_title: Option<String>,
    fqdn_count: i64,
    view_write_ok: bool,
    now: &Time,
) -> Result<(), SyncError> {
    let mut status = portal.status.clone().unwrap_or_default();
    status.ready = true;
    conditions::set(
        &mut status.conditions,
        conditions::READY,
        true,
        "RemoteSyncSuccess",
        "remote portal synced",
    );
    if view_write_ok {
        conditions::set(
            &mut status.conditions,
            conditions::DNS_SYNCED,
            true,
            "RemoteSyncSuccess",
            "view object written",
        );
    } else {
        conditions::set(
            &mut status.conditions,
            conditions::DNS_SYNCED,
            false,
            "DNSSyncFailed",
            "writing the remote view object failed",
        );
    }
    status.remote_sync = Some(RemoteSync {
        last_sync_time: Some(now.clone()),
        last_sync_error: None,
        peer_title,
        fqdn_count,
    });

    retry(backoff_policy(), || async {
        let patch = Patch::Merge(serde_json::json!({ "status": status }));
        api.patch_status(&portal.name_any(), &PatchParams::apply(FIELD_MANAGER), &patch)
            .await
            .map_err(classify)
    })
    .await
    .map_err(|source| SyncError::PatchPortalStatus(portal.name_any(), source))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fqdn(name: &str, groups: &[&str]) -> Fqdn {
        Fqdn {
            name: name.to_string(),
            description: String::new(),
            record_type: "A".to_string(),
            targets: vec!["10.0.0.1".to_string()],
            groups: groups.iter().map(|g| g.to_string()).collect(),
            last_seen_unix_seconds: 1_700_000_000,
            sync_status: "sync".to_string(),
        }
    }

    #[test]
    fn ungrouped_fqdn_lands_in_default_group() {
        let now = Time(Utc::now());
        let groups = materialize_groups(&[fqdn("api.example.com", &[])], &now);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "default");
        assert_eq!(groups[0].source, "remote");
        assert_eq!(groups[0].fqdns[0].sync_status, "sync");
    }

    #[test]
    fn fqdn_in_multiple_groups_appears_in_each() {
        let now = Time(Utc::now());
        let groups = materialize_groups(&[fqdn("api.example.com", &["infra", "public"])], &now);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.fqdns.len() == 1));
    }

    #[test]
    fn peer_title_falls_back_to_main_when_peer_portal_name_empty() {
        let portals = vec![
            PortalSummary {
                name: "secondary".to_string(),
                title: "Secondary".to_string(),
                main: false,
                sub_path: "secondary".to_string(),
                remote_url: None,
            },
            PortalSummary {
                name: "main".to_string(),
                title: "Main".to_string(),
                main: true,
                sub_path: "".to_string(),
                remote_url: None,
            },
        ];
        assert_eq!(find_peer_title(&portals, ""), Some("Main".to_string()));
        assert_eq!(find_peer_title(&portals, "secondary"), Some("Secondary".to_string()));
    }
}
