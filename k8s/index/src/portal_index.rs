//! Secondary indices keyed by `portalRef` (§3 "Secondary indices"), built
//! from watch events the same way `kubert::index::IndexNamespacedResource`
//! is used in the teacher's `status::Index`.

use dns_portal_controller_k8s_api::{ManualDNS, ResourceExt, SourceRecord};
use kubert::index::{IndexNamespacedResource, NamespacedRemoved};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// `portalRef -> { (namespace, name) -> sourceKind }`, used by C1's
/// orphan-sweep and by C3's re-queue fan-out when a SourceRecord changes.
#[derive(Clone, Debug, Default)]
pub struct SourceRecordIndex {
    by_portal_ref: BTreeMap<String, BTreeMap<(String, String), String>>,
}

impl SourceRecordIndex {
    pub fn source_kinds_for_portal(&self, portal_ref: &str) -> Vec<String> {
        self.by_portal_ref
            .get(portal_ref)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn portal_refs(&self) -> impl Iterator<Item = &str> {
        self.by_portal_ref.keys().map(String::as_str)
    }

    /// Portal refs that currently list `(namespace, name)`, used to find who
    /// to wake before an entry is removed.
    fn portal_refs_containing(&self, namespace: &str, name: &str) -> Vec<String> {
        let key = (namespace.to_string(), name.to_string());
        self.by_portal_ref
            .iter()
            .filter(|(_, records)| records.contains_key(&key))
            .map(|(portal_ref, _)| portal_ref.clone())
            .collect()
    }

    fn remove_by_name(&mut self, namespace: &str, name: &str) {
        for records in self.by_portal_ref.values_mut() {
            records.remove(&(namespace.to_string(), name.to_string()));
        }
        self.by_portal_ref.retain(|_, records| !records.is_empty());
    }
}

impl IndexNamespacedResource<SourceRecord> for SourceRecordIndex {
    fn apply(&mut self, resource: SourceRecord) {
        let namespace = resource.namespace().unwrap_or_default();
        let name = resource.name_any();
        self.remove_by_name(&namespace, &name);
        self.by_portal_ref
            .entry(resource.spec.portal_ref.clone())
            .or_default()
            .insert((namespace, name), resource.spec.source_kind.clone());
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.remove_by_name(&namespace, &name);
    }

    fn reset(&mut self, resources: Vec<SourceRecord>, _removed: NamespacedRemoved) {
        self.by_portal_ref.clear();
        for resource in resources {
            self.apply(resource);
        }
    }
}

/// `portalRef -> [(namespace, name)]` of `ManualDNS` objects, used by the
/// store-writer fan-out to re-queue ManualDNS when a sibling SourceRecord changes.
#[derive(Clone, Debug, Default)]
pub struct ManualDnsIndex {
    by_portal_ref: BTreeMap<String, BTreeMap<(String, String), ()>>,
}

impl ManualDnsIndex {
    pub fn names_for_portal(&self, portal_ref: &str) -> Vec<(String, String)> {
        self.by_portal_ref
            .get(portal_ref)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Portal refs that currently list `(namespace, name)`, used to find who
    /// to wake before an entry is removed.
    fn portal_refs_containing(&self, namespace: &str, name: &str) -> Vec<String> {
        let key = (namespace.to_string(), name.to_string());
        self.by_portal_ref
            .iter()
            .filter(|(_, records)| records.contains_key(&key))
            .map(|(portal_ref, _)| portal_ref.clone())
            .collect()
    }

    fn remove_by_name(&mut self, namespace: &str, name: &str) {
        for records in self.by_portal_ref.values_mut() {
            records.remove(&(namespace.to_string(), name.to_string()));
        }
        self.by_portal_ref.retain(|_, records| !records.is_empty());
    }
}

impl IndexNamespacedResource<ManualDNS> for ManualDnsIndex {
    fn apply(&mut self, resource: ManualDNS) {
        let namespace = resource.namespace().unwrap_or_default();
        let name = resource.name_any();
        self.remove_by_name(&namespace, &name);
        self.by_portal_ref
            .entry(resource.spec.portal_ref.clone())
            .or_default()
            .insert((namespace, name), ());
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.remove_by_name(&namespace, &name);
    }

    fn reset(&mut self, resources: Vec<ManualDNS>, _removed: NamespacedRemoved) {
        self.by_portal_ref.clear();
        for resource in resources {
            self.apply(resource);
        }
    }
}

/// `(namespace, portalRef)` of a portal whose aggregation should be
/// re-run, emitted every time [`RecordWatchIndex`] observes a SourceRecord
/// or ManualDNS change.
pub type PortalWake = (String, String);

pub type SharedRecordWatchIndex = Arc<RwLock<RecordWatchIndex>>;

/// Wraps [`SourceRecordIndex`] and [`ManualDnsIndex`], sending a
/// [`PortalWake`] on every watched change so C3 re-aggregates the affected
/// portal immediately instead of waiting for C1's next tick (§2 Control
/// flow: "Each change to record objects wakes C3 … via a secondary index on
/// portal reference").
#[derive(Debug)]
pub struct RecordWatchIndex {
    source_records: SourceRecordIndex,
    manual_dns: ManualDnsIndex,
    wake: mpsc::UnboundedSender<PortalWake>,
}

impl RecordWatchIndex {
    /// Builds a shared index plus the receiver its wakes are sent on.
    pub fn shared() -> (SharedRecordWatchIndex, mpsc::UnboundedReceiver<PortalWake>) {
        let (wake, rx) = mpsc::unbounded_channel();
        let index = RecordWatchIndex {
            source_records: SourceRecordIndex::default(),
            manual_dns: ManualDnsIndex::default(),
            wake,
        };
        (Arc::new(RwLock::new(index)), rx)
    }

    fn send_wake(&self, namespace: &str, portal_refs: impl IntoIterator<Item = String>) {
        for portal_ref in portal_refs {
            let _ = self.wake.send((namespace.to_string(), portal_ref));
        }
    }
}

impl IndexNamespacedResource<SourceRecord> for RecordWatchIndex {
    fn apply(&mut self, resource: SourceRecord) {
        let namespace = resource.namespace().unwrap_or_default();
        let portal_ref = resource.spec.portal_ref.clone();
        self.source_records.apply(resource);
        self.send_wake(&namespace, [portal_ref]);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let portal_refs = self.source_records.portal_refs_containing(&namespace, &name);
        self.source_records.delete(namespace.clone(), name);
        self.send_wake(&namespace, portal_refs);
    }

    fn reset(&mut self, resources: Vec<SourceRecord>, removed: NamespacedRemoved) {
        let wakes: Vec<(String, String)> = resources
            .iter()
            .map(|r| (r.namespace().unwrap_or_default(), r.spec.portal_ref.clone()))
            .collect();
        self.source_records.reset(resources, removed);
        for (namespace, portal_ref) in wakes {
            self.send_wake(&namespace, [portal_ref]);
        }
    }
}

impl IndexNamespacedResource<ManualDNS> for RecordWatchIndex {
    fn apply(&mut self, resource: ManualDNS) {
        let namespace = resource.namespace().unwrap_or_default();
        let portal_ref = resource.spec.portal_ref.clone();
        self.manual_dns.apply(resource);
        self.send_wake(&namespace, [portal_ref]);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let portal_refs = self.manual_dns.portal_refs_containing(&namespace, &name);
        self.manual_dns.delete(namespace.clone(), name);
        self.send_wake(&namespace, portal_refs);
    }

    fn reset(&mut self, resources: Vec<ManualDNS>, removed: NamespacedRemoved) {
        let wakes: Vec<(String, String)> = resources
            .iter()
            .map(|r| (r.namespace().unwrap_or_default(), r.spec.portal_ref.clone()))
            .collect();
        self.manual_dns.reset(resources, removed);
        for (namespace, portal_ref) in wakes {
            self.send_wake(&namespace, [portal_ref]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_portal_controller_k8s_api::{ObjectMeta, SourceRecordSpec, SourceRecordStatus};
    use kube::api::Resource;

    fn record(name: &str, portal_ref: &str, kind: &str) -> SourceRecord {
        SourceRecord {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: SourceRecordSpec {
                source_kind: kind.to_string(),
                portal_ref: portal_ref.to_string(),
            },
            status: Some(SourceRecordStatus::default()),
        }
    }

    #[test]
    fn apply_and_lookup() {
        let mut index = SourceRecordIndex::default();
        index.apply(record("main-service", "main", "service"));
        index.apply(record("main-ingress", "main", "ingress"));

        let mut kinds = index.source_kinds_for_portal("main");
        kinds.sort();
        assert_eq!(kinds, vec!["ingress", "service"]);
    }

    #[test]
    fn delete_removes_entry() {
        let mut index = SourceRecordIndex::default();
        index.apply(record("main-service", "main", "service"));
        let meta = record("main-service", "main", "service").meta().clone();
        index.delete(meta.namespace.unwrap(), meta.name.unwrap());
        assert!(index.source_kinds_for_portal("main").is_empty());
    }
}
