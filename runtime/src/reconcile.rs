//! Wires C1's tick output to C2/C3/C5, and drives C4 on its own interval.
//!
//! C1 (`Collector`) ticks on a fixed interval and publishes a
//! [`RoutedSnapshot`] over a watch channel; C2 and C3/C5 each hold their own
//! receiver and react to every new snapshot independently, the same
//! fan-out-over-one-watch-channel shape the teacher uses for
//! `status::Index` driving multiple indexers off one resource watch.

use dns_portal_controller_core::{DnsResolver, HickoryResolver};
use dns_portal_controller_k8s_api::{Api, Client, Portal, ResourceExt};
use dns_portal_controller_k8s_index::{lifecycle, PortalWake, RoutedSnapshot};
use dns_portal_controller_k8s_status::{aggregate_portal, sync_bucket, GroupMappingSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info_span, warn, Instrument};

/// C2: persists every bucket in each new snapshot into its `SourceRecord`.
pub async fn run_store_writer(
    client: Client,
    namespace: String,
    mut snapshot_rx: watch::Receiver<Arc<RoutedSnapshot>>,
    shutdown: drain::Watch,
) {
    let shutdown = shutdown.signaled();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = snapshot_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            release = &mut shutdown => {
                drop(release);
                return;
            }
        }

        let snapshot = snapshot_rx.borrow_and_update().clone();
        for bucket in &snapshot.buckets {
            if let Err(error) = sync_bucket(&client, &namespace, bucket).await {
                warn!(portal = %bucket.portal_name, source_kind = %bucket.source_kind, %error, "store write failed");
            }
        }
    }
}

/// C5 then C3: on each new snapshot, reconciles every local portal's
/// lifecycle state, then re-runs its aggregation chain. Ordering the two
/// this way means a portal freshly marked ready is aggregated in the same
/// pass rather than waiting for the next snapshot.
pub async fn run_portal_reconciler(
    client: Client,
    namespace: String,
    mut snapshot_rx: watch::Receiver<Arc<RoutedSnapshot>>,
    resolver: Arc<dyn DnsResolver>,
    settings: GroupMappingSettings,
    shutdown: drain::Watch,
) {
    let shutdown = shutdown.signaled();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = snapshot_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            release = &mut shutdown => {
                drop(release);
                return;
            }
        }

        let snapshot = snapshot_rx.borrow_and_update().clone();
        for portal_name in &snapshot.local_portals {
            if let Err(error) = lifecycle::reconcile_local_portal(&client, &namespace, portal_name).await {
                warn!(portal = %portal_name, %error, "portal lifecycle reconcile failed");
                continue;
            }
            if let Err(error) =
                aggregate_portal(&client, &namespace, portal_name, resolver.as_ref(), &settings).await
            {
                warn!(portal = %portal_name, %error, "aggregation failed");
            }
        }
    }
}

/// C3 (watch-triggered): re-aggregates a portal as soon as a SourceRecord or
/// ManualDNS that names it changes, rather than waiting for C1's next
/// snapshot (§2 Control flow).
pub async fn run_record_watch_reconciler(
    client: Client,
    namespace: String,
    mut wakes: mpsc::UnboundedReceiver<PortalWake>,
    resolver: Arc<dyn DnsResolver>,
    settings: GroupMappingSettings,
    shutdown: drain::Watch,
) {
    let shutdown = shutdown.signaled();
    tokio::pin!(shutdown);

    loop {
        let (wake_namespace, portal_name) = tokio::select! {
            wake = wakes.recv() => match wake {
                Some(wake) => wake,
                None => return,
            },
            release = &mut shutdown => {
                drop(release);
                return;
            }
        };
        if wake_namespace != namespace {
            continue;
        }
        if let Err(error) =
            aggregate_portal(&client, &namespace, &portal_name, resolver.as_ref(), &settings).await
        {
            warn!(portal = %portal_name, %error, "watch-triggered aggregation failed");
        }
    }
}

/// C4: on a fixed interval, lists every Portal with `spec.remote` set and
/// syncs each against its peer (§4.4). A portal whose healthcheck or fetch
/// fails is simply retried on the next tick; §4.4 requeues after 5 minutes
/// on healthcheck failure, so the interval is clamped to that floor.
pub async fn run_remote_syncer(
    client: Client,
    namespace: String,
    interval: Duration,
    shutdown: drain::Watch,
) {
    const HEALTHCHECK_REQUEUE: Duration = Duration::from_secs(5 * 60);
    let mut ticker = tokio::time::interval(interval.max(HEALTHCHECK_REQUEUE));
    let shutdown = shutdown.signaled();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            release = &mut shutdown => {
                drop(release);
                return;
            }
        }

        let api: Api<Portal> = Api::namespaced(client.clone(), &namespace);
        let portals = match api.list(&Default::default()).await {
            Ok(portals) => portals,
            Err(error) => {
                warn!(%error, "listing remote portals failed");
                continue;
            }
        };

        for portal in portals.items {
            if portal.spec.main || portal.spec.remote.is_none() {
                continue;
            }
            let name = portal.name_any();
            let client = client.clone();
            let namespace = namespace.clone();
            tokio::spawn(
                async move {
                    if let Err(error) =
                        dns_portal_controller_k8s_status_controller::sync_portal(&client, &namespace, &name)
                            .await
                    {
                        warn!(portal = %name, %error, "remote sync failed");
                    }
                }
                .instrument(info_span!("remote_sync")),
            );
        }
    }
}

/// Builds the production `DnsResolver` used by C3 Phase D.
pub fn build_resolver() -> anyhow::Result<Arc<dyn DnsResolver>> {
    Ok(Arc::new(HickoryResolver::from_system_conf()?))
}
