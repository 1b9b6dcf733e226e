//! C1: the periodic source-collection tick (§4.1 steps 1-8).

use crate::adapter::{build_adapters, SourceAdapter};
use crate::router::{route, PortalLookup};
use dns_portal_controller_core::{Endpoint, SourceKind};
use dns_portal_controller_k8s_api::annotations::{IGNORE_ANNOTATION, PORTAL_ANNOTATION};
use dns_portal_controller_k8s_api::conditions;
use dns_portal_controller_k8s_api::config::{Config, SourcesConfig};
use dns_portal_controller_k8s_api::{
    Api, Client, ManualDNS, ManualDNSSpec, ManualDNSStatus, ObjectMeta, Patch, PatchParams,
    Portal, PostParams, ResourceExt, SourceRecord,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Consecutive adapter failures before a portal's `Ready` condition flips
/// to `False`/`SourceUnavailable` (§4.1 step 3).
const MAX_CONSECUTIVE_FAILURES: u32 = 5;
const FIELD_MANAGER: &str = "dns-portal-collector";
const ADAPTER_DEADLINE: Duration = Duration::from_secs(30);

/// One source kind's endpoints, already routed to the portal that owns them.
#[derive(Clone, Debug)]
pub struct RoutedBucket {
    pub portal_name: String,
    pub source_kind: SourceKind,
    pub endpoints: Vec<Endpoint>,
}

/// The output of one tick, handed to C2 over a watch channel.
#[derive(Clone, Debug, Default)]
pub struct RoutedSnapshot {
    pub buckets: Vec<RoutedBucket>,
    pub local_portals: Vec<String>,
    pub enabled_kinds: Vec<SourceKind>,
}

#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error("listing portals failed: {0}")]
    ListPortals(#[source] kube::Error),
}

pub struct Collector {
    client: Client,
    namespace: String,
    adapters: Vec<Box<dyn SourceAdapter>>,
    failures: HashMap<SourceKind, u32>,
    last_sources: SourcesConfig,
}

impl Collector {
    pub fn new(client: Client, namespace: impl Into<String>, config: &Config) -> Self {
        let namespace = namespace.into();
        let adapters = build_adapters(&client, &config.sources);
        Collector {
            client,
            namespace,
            adapters,
            failures: HashMap::new(),
            last_sources: config.sources.clone(),
        }
    }

    fn rebuild_if_changed(&mut self, sources: &SourcesConfig) {
        if sources != &self.last_sources {
            info!("source configuration changed, rebuilding adapters");
            self.adapters = build_adapters(&self.client, sources);
            self.last_sources = sources.clone();
            self.failures.clear();
        }
    }

    /// Runs on a fixed interval, re-reading `config_rx` on every wakeup, until
    /// `shutdown` fires.
    pub async fn run(
        mut self,
        mut config_rx: watch::Receiver<Config>,
        tx: watch::Sender<Arc<RoutedSnapshot>>,
        shutdown: drain::Watch,
    ) {
        let mut interval = tokio::time::interval(config_rx.borrow().reconciliation.interval.into());
        let shutdown = shutdown.signaled();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = config_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let config = config_rx.borrow().clone();
                    interval = tokio::time::interval(config.reconciliation.interval.into());
                    continue;
                }
                release = &mut shutdown => {
                    drop(release);
                    return;
                }
            }

            let config = config_rx.borrow().clone();
            match self.tick(&config).await {
                Ok(snapshot) => {
                    let _ = tx.send(Arc::new(snapshot));
                }
                Err(error) => warn!(%error, "collector tick failed"),
            }
        }
    }

    pub async fn tick(&mut self, config: &Config) -> Result<RoutedSnapshot, TickError> {
        self.rebuild_if_changed(&config.sources);

        let portals_api: Api<Portal> = Api::namespaced(self.client.clone(), &self.namespace);
        let portals = portals_api
            .list(&Default::default())
            .await
            .map_err(TickError::ListPortals)?;

        let mut main_name = None;
        let mut local_names = Vec::new();
        let mut remote_names = Vec::new();
        for portal in &portals.items {
            let name = portal.name_any();
            if portal.spec.remote.is_some() {
                remote_names.push(name);
                continue;
            }
            if portal.spec.main && main_name.is_none() {
                main_name = Some(name.clone());
            }
            local_names.push(name);
        }

        let Some(main_name) = main_name.or_else(|| local_names.first().cloned()) else {
            warn!("no local portal found, skipping collector tick");
            return Ok(RoutedSnapshot::default());
        };

        let mut lookup = PortalLookup::new(main_name);
        for name in &local_names {
            lookup = lookup.with_local(name.clone());
        }
        for name in &remote_names {
            lookup = lookup.with_remote(name.clone());
        }

        let mut enabled_kinds = Vec::with_capacity(self.adapters.len());
        let mut by_kind: BTreeMap<SourceKind, Vec<Endpoint>> = BTreeMap::new();
        for adapter in &self.adapters {
            let kind = adapter.kind();
            enabled_kinds.push(kind);

            match adapter.endpoints(ADAPTER_DEADLINE).await {
                Ok(endpoints) => {
                    self.failures.insert(kind, 0);
                    by_kind.insert(kind, endpoints);
                }
                Err(error) => {
                    let count = self.failures.entry(kind).or_insert(0);
                    *count += 1;
                    warn!(%kind, %error, consecutive_failures = *count, "source adapter failed");
                    if *count == MAX_CONSECUTIVE_FAILURES {
                        self.mark_source_unavailable(&local_names, kind).await;
                    }
                }
            }
        }

        let mut buckets: BTreeMap<(String, SourceKind), Vec<Endpoint>> = BTreeMap::new();
        for (kind, endpoints) in by_kind {
            for endpoint in endpoints {
                if endpoint.is_ignored(IGNORE_ANNOTATION) {
                    continue;
                }
                let portal_label = endpoint.labels.get(PORTAL_ANNOTATION).map(String::as_str);
                let portal_name = route(portal_label, &lookup);
                buckets.entry((portal_name, kind)).or_default().push(endpoint);
            }
        }

        for name in &local_names {
            if let Err(error) = self.ensure_manual_dns(name).await {
                warn!(portal = %name, %error, "failed to ensure ManualDNS exists");
            }
        }

        let present_this_tick: HashSet<(String, SourceKind)> = buckets.keys().cloned().collect();
        if let Err(error) = self
            .sweep_orphans(&local_names, &enabled_kinds, &present_this_tick)
            .await
        {
            warn!(%error, "orphan sweep failed");
        }

        let buckets = buckets
            .into_iter()
            .map(|((portal_name, source_kind), endpoints)| RoutedBucket {
                portal_name,
                source_kind,
                endpoints,
            })
            .collect();

        Ok(RoutedSnapshot {
            buckets,
            local_portals: local_names,
            enabled_kinds,
        })
    }

    async fn mark_source_unavailable(&self, local_names: &[String], kind: SourceKind) {
        let api: Api<Portal> = Api::namespaced(self.client.clone(), &self.namespace);
        for name in local_names {
            let portal = match api.get(name).await {
                Ok(portal) => portal,
                Err(error) => {
                    warn!(portal = %name, %error, "failed to fetch portal for condition update");
                    continue;
                }
            };
            let mut status = portal.status.unwrap_or_default();
            status.ready = false;
            conditions::set(
                &mut status.conditions,
                conditions::READY,
                false,
                "SourceUnavailable",
                format!("source {kind} failed {MAX_CONSECUTIVE_FAILURES} consecutive times"),
            );

            let patch = Patch::Merge(serde_json::json!({ "status": status }));
            if let Err(error) = api
                .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &patch)
                .await
            {
                warn!(portal = %name, %error, "failed to patch portal status");
            }
        }
    }

    async fn ensure_manual_dns(&self, portal_name: &str) -> Result<(), kube::Error> {
        let api: Api<ManualDNS> = Api::namespaced(self.client.clone(), &self.namespace);
        match api.get(portal_name).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => {
                let manual = ManualDNS {
                    metadata: ObjectMeta {
                        name: Some(portal_name.to_string()),
                        namespace: Some(self.namespace.clone()),
                        ..Default::default()
                    },
                    spec: ManualDNSSpec {
                        portal_ref: portal_name.to_string(),
                        groups: Vec::new(),
                    },
                    status: Some(ManualDNSStatus::default()),
                };
                api.create(&PostParams::default(), &manual).await.map(|_| ())
            }
            Err(err) => Err(err),
        }
    }

    /// Deletes SourceRecords owned by a local portal whose kind is either no
    /// longer enabled in config, or produced no bucket this tick — i.e. its
    /// `(portalRef, sourceKind)` pair is absent from `present_this_tick`
    /// (§4.1 step 8, §8).
    async fn sweep_orphans(
        &self,
        local_names: &[String],
        enabled_kinds: &[SourceKind],
        present_this_tick: &HashSet<(String, SourceKind)>,
    ) -> Result<(), kube::Error> {
        let api: Api<SourceRecord> = Api::namespaced(self.client.clone(), &self.namespace);
        let records = api.list(&Default::default()).await?;

        for record in records.items {
            let name = record.name_any();
            if !local_names.contains(&record.spec.portal_ref) {
                continue;
            }
            let still_enabled = enabled_kinds
                .iter()
                .any(|k| k.as_str() == record.spec.source_kind);
            let produced_this_tick = SourceKind::from_str(&record.spec.source_kind)
                .map(|kind| present_this_tick.contains(&(record.spec.portal_ref.clone(), kind)))
                .unwrap_or(false);
            if still_enabled && produced_this_tick {
                continue;
            }
            info!(
                portal = %record.spec.portal_ref,
                source_kind = %record.spec.source_kind,
                "deleting orphaned SourceRecord"
            );
            api.delete(&name, &Default::default()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_key_groups_by_portal_and_kind() {
        let mut buckets: BTreeMap<(String, SourceKind), Vec<Endpoint>> = BTreeMap::new();
        buckets
            .entry(("main".to_string(), SourceKind::Service))
            .or_default()
            .push(dns_portal_controller_core::Endpoint {
                dns_name: "a.example.com".to_string(),
                record_type: None,
                targets: vec!["10.0.0.1".to_string()],
                ttl: None,
                labels: BTreeMap::new(),
                resource: dns_portal_controller_core::ResourceRef {
                    kind: "Service".to_string(),
                    namespace: "default".to_string(),
                    name: "a".to_string(),
                },
            });
        assert_eq!(buckets.len(), 1);
    }
}
