use crate::{Endpoint, SourceKind};
use std::collections::BTreeMap;

/// Applies source-priority FQDN-name-level deduplication (§4.3.1).
///
/// `endpoints_by_kind` groups endpoints as collected by the source adapters;
/// `priority` is the ordered list of kinds from `sources.priority`. Returns
/// the winning endpoints, intra-kind target-merged, sorted by
/// `(dnsName, recordType)`.
pub fn dedup_by_priority(
    endpoints_by_kind: &BTreeMap<SourceKind, Vec<Endpoint>>,
    priority: &[SourceKind],
) -> Vec<Endpoint> {
    if priority.is_empty() {
        let mut all: Vec<Endpoint> = endpoints_by_kind
            .values()
            .flat_map(|eps| eps.iter().cloned())
            .collect();
        merge_intra_kind_duplicates(&mut all);
        sort_endpoints(&mut all);
        return all;
    }

    // Kinds not in `priority` sort after every listed kind; ties among
    // unlisted kinds break alphabetically, same as listed kinds.
    let rank = |kind: &SourceKind| -> (usize, &'static str) {
        match priority.iter().position(|k| k == kind) {
            Some(i) => (i, kind.as_str()),
            None => (priority.len(), kind.as_str()),
        }
    };

    let mut winner_by_name: BTreeMap<&str, SourceKind> = BTreeMap::new();
    for (kind, eps) in endpoints_by_kind {
        for ep in eps {
            match winner_by_name.get(ep.dns_name.as_str()) {
                Some(current) if rank(current) <= rank(kind) => {}
                _ => {
                    winner_by_name.insert(ep.dns_name.as_str(), *kind);
                }
            }
        }
    }

    let mut won: Vec<Endpoint> = endpoints_by_kind
        .iter()
        .flat_map(|(kind, eps)| {
            eps.iter()
                .filter(move |ep| winner_by_name.get(ep.dns_name.as_str()) == Some(kind))
                .cloned()
        })
        .collect();

    merge_intra_kind_duplicates(&mut won);
    sort_endpoints(&mut won);
    won
}

/// Merges targets (set-union, sorted) for endpoints sharing `(dnsName, recordType)`.
fn merge_intra_kind_duplicates(endpoints: &mut Vec<Endpoint>) {
    let mut merged: BTreeMap<(String, Option<&'static str>), Endpoint> = BTreeMap::new();
    for ep in endpoints.drain(..) {
        let key = (ep.dns_name.clone(), ep.record_type.map(|t| t.as_str()));
        merged
            .entry(key)
            .and_modify(|existing| {
                for target in &ep.targets {
                    if !existing.targets.contains(target) {
                        existing.targets.push(target.clone());
                    }
                }
                existing.targets.sort();
            })
            .or_insert(ep);
    }
    endpoints.extend(merged.into_values());
}

fn sort_endpoints(endpoints: &mut [Endpoint]) {
    endpoints.sort_by(|a, b| {
        a.dns_name
            .cmp(&b.dns_name)
            .then_with(|| a.record_type.map(|t| t.as_str()).cmp(&b.record_type.map(|t| t.as_str())))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RecordType, ResourceRef};

    fn ep(name: &str, kind_label: &str, rt: RecordType, targets: &[&str]) -> Endpoint {
        Endpoint {
            dns_name: name.to_string(),
            record_type: Some(rt),
            targets: targets.iter().map(|s| s.to_string()).collect(),
            ttl: None,
            labels: Default::default(),
            resource: ResourceRef {
                kind: kind_label.to_string(),
                namespace: "default".to_string(),
                name: "x".to_string(),
            },
        }
    }

    #[test]
    fn empty_priority_concatenates_and_merges_same_type() {
        let mut by_kind = BTreeMap::new();
        by_kind.insert(
            SourceKind::Service,
            vec![ep("api.example.com", "svc", RecordType::A, &["10.0.0.1"])],
        );
        by_kind.insert(
            SourceKind::Ingress,
            vec![ep("api.example.com", "ing", RecordType::A, &["10.0.0.2"])],
        );
        let out = dedup_by_priority(&by_kind, &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].targets, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn priority_winner_takes_all_record_types() {
        let mut by_kind = BTreeMap::new();
        by_kind.insert(
            SourceKind::Service,
            vec![ep("api.example.com", "svc", RecordType::A, &["10.0.0.1"])],
        );
        by_kind.insert(
            SourceKind::Ingress,
            vec![ep(
                "api.example.com",
                "ing",
                RecordType::Cname,
                &["lb.example.com"],
            )],
        );
        let priority = [SourceKind::Service, SourceKind::Ingress];
        let out = dedup_by_priority(&by_kind, &priority);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].record_type, Some(RecordType::A));
        assert_eq!(out[0].targets, vec!["10.0.0.1"]);
    }

    #[test]
    fn unlisted_kind_loses_to_listed_kind() {
        let mut by_kind = BTreeMap::new();
        by_kind.insert(
            SourceKind::MeshGateway,
            vec![ep("api.example.com", "mg", RecordType::A, &["10.0.0.9"])],
        );
        by_kind.insert(
            SourceKind::Service,
            vec![ep("api.example.com", "svc", RecordType::A, &["10.0.0.1"])],
        );
        let priority = [SourceKind::Service];
        let out = dedup_by_priority(&by_kind, &priority);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].targets, vec!["10.0.0.1"]);
    }

    #[test]
    fn distinct_names_all_survive() {
        let mut by_kind = BTreeMap::new();
        by_kind.insert(
            SourceKind::Service,
            vec![
                ep("a.example.com", "svc", RecordType::A, &["10.0.0.1"]),
                ep("b.example.com", "svc", RecordType::A, &["10.0.0.2"]),
            ],
        );
        let out = dedup_by_priority(&by_kind, &[SourceKind::Service]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].dns_name, "a.example.com");
        assert_eq!(out[1].dns_name, "b.example.com");
    }
}
