//! C2: the SourceRecord store writer (§4.2).
//!
//! Given one of C1's routed buckets, ensures the matching `SourceRecord`
//! object exists and carries the bucket's endpoints in its status.

use backoff::future::retry;
use backoff::{Error as BackoffError, ExponentialBackoffBuilder};
use chrono::Utc;
use dns_portal_controller_core::Endpoint;
use dns_portal_controller_k8s_api::crd::ResourceRefStatus;
use dns_portal_controller_k8s_api::{
    conditions, Api, Client, ObjectMeta, Patch, PatchParams, PostParams, SourceEndpointStatus,
    SourceRecord, SourceRecordSpec, SourceRecordStatus, Time,
};
use dns_portal_controller_k8s_index::RoutedBucket;
use std::time::Duration;

const FIELD_MANAGER: &str = "dns-portal-store-writer";

#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    #[error("getting SourceRecord {name} failed: {source}")]
    Get {
        name: String,
        #[source]
        source: kube::Error,
    },
    #[error("creating SourceRecord {name} failed: {source}")]
    Create {
        name: String,
        #[source]
        source: kube::Error,
    },
    #[error("patching SourceRecord {name} status failed: {source}")]
    Patch {
        name: String,
        #[source]
        source: kube::Error,
    },
}

/// Base 100ms, factor 2, ~10% jitter, bounded to roughly 5 retry steps.
fn backoff_policy() -> backoff::ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(100))
        .with_multiplier(2.0)
        .with_randomization_factor(0.1)
        .with_max_elapsed_time(Some(Duration::from_millis(3_100)))
        .build()
}

pub fn source_record_name(bucket: &RoutedBucket) -> String {
    format!("{}-{}", bucket.portal_name, bucket.source_kind.as_str())
}

fn endpoint_status(endpoint: &Endpoint, now: &Time) -> SourceEndpointStatus {
    SourceEndpointStatus {
        dns_name: endpoint.dns_name.clone(),
        record_type: endpoint.record_type.map(|t| t.to_string()),
        targets: endpoint.targets.clone(),
        ttl: endpoint.ttl,
        labels: endpoint.labels.clone(),
        last_seen: now.clone(),
        resource: ResourceRefStatus::from(&endpoint.resource),
    }
}

/// Ensures `bucket`'s SourceRecord exists, creating it on a retryable
/// Conflict/transient error, then patches its status with the collected
/// endpoints.
pub async fn sync_bucket(
    client: &Client,
    namespace: &str,
    bucket: &RoutedBucket,
) -> Result<(), WriterError> {
    let name = source_record_name(bucket);
    let api: Api<SourceRecord> = Api::namespaced(client.clone(), namespace);

    ensure_exists(&api, &name, namespace, bucket).await?;

    let now = Time(Utc::now());
    let mut endpoints: Vec<SourceEndpointStatus> = bucket
        .endpoints
        .iter()
        .map(|ep| endpoint_status(ep, &now))
        .collect();
    endpoints.sort_by(|a, b| (&a.dns_name, &a.record_type).cmp(&(&b.dns_name, &b.record_type)));

    let mut status = SourceRecordStatus {
        endpoints,
        last_reconcile_time: Some(now.clone()),
        conditions: Vec::new(),
    };
    conditions::set(
        &mut status.conditions,
        conditions::READY,
        true,
        "Collected",
        format!(
            "Collected {} endpoints from {} source",
            status.endpoints.len(),
            bucket.source_kind.as_str()
        ),
    );

    retry(backoff_policy(), || async {
        let patch = Patch::Merge(serde_json::json!({ "status": status }));
        api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &patch)
            .await
            .map_err(classify)
    })
    .await
    .map_err(|source| WriterError::Patch {
        name: name.clone(),
        source,
    })?;

    Ok(())
}

async fn ensure_exists(
    api: &Api<SourceRecord>,
    name: &str,
    namespace: &str,
    bucket: &RoutedBucket,
) -> Result<(), WriterError> {
    retry(backoff_policy(), || async {
        match api.get(name).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => {
                let record = SourceRecord {
                    metadata: ObjectMeta {
                        name: Some(name.to_string()),
                        namespace: Some(namespace.to_string()),
                        ..Default::default()
                    },
                    spec: SourceRecordSpec {
                        source_kind: bucket.source_kind.as_str().to_string(),
                        portal_ref: bucket.portal_name.clone(),
                    },
                    status: Some(SourceRecordStatus::default()),
                };
                match api.create(&PostParams::default(), &record).await {
                    Ok(_) => Ok(()),
                    Err(kube::Error::Api(err)) if err.code == 409 => Ok(()),
                    Err(err) => Err(classify(err)),
                }
            }
            Err(err) => Err(classify(err)),
        }
    })
    .await
    .map_err(|source| WriterError::Get {
        name: name.to_string(),
        source,
    })
}

fn classify(err: kube::Error) -> BackoffError<kube::Error> {
    match &err {
        kube::Error::Api(resp) if resp.code == 409 || resp.code >= 500 => {
            BackoffError::transient(err)
        }
        _ => BackoffError::permanent(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_portal_controller_core::{RecordType, ResourceRef, SourceKind};
    use std::collections::BTreeMap;

    fn bucket() -> RoutedBucket {
        RoutedBucket {
            portal_name: "main".to_string(),
            source_kind: SourceKind::Service,
            endpoints: vec![Endpoint {
                dns_name: "api.example.com".to_string(),
                record_type: Some(RecordType::A),
                targets: vec!["10.0.0.1".to_string()],
                ttl: None,
                labels: BTreeMap::new(),
                resource: ResourceRef {
                    kind: "Service".to_string(),
                    namespace: "default".to_string(),
                    name: "api".to_string(),
                },
            }],
        }
    }

    #[test]
    fn name_combines_portal_and_kind() {
        assert_eq!(source_record_name(&bucket()), "main-service");
    }

    #[test]
    fn endpoint_status_carries_record_type_as_string() {
        let now = Time(Utc::now());
        let status = endpoint_status(&bucket().endpoints[0], &now);
        assert_eq!(status.record_type.as_deref(), Some("A"));
        assert_eq!(status.targets, vec!["10.0.0.1".to_string()]);
    }

    #[test]
    fn endpoints_sort_by_dns_name_then_record_type() {
        let now = Time(Utc::now());
        let mut endpoints = vec![
            endpoint_status(
                &Endpoint {
                    dns_name: "b.example.com".to_string(),
                    record_type: Some(RecordType::A),
                    targets: vec![],
                    ttl: None,
                    labels: BTreeMap::new(),
                    resource: ResourceRef {
                        kind: "Service".to_string(),
                        namespace: "default".to_string(),
                        name: "b".to_string(),
                    },
                },
                &now,
            ),
            endpoint_status(
                &Endpoint {
                    dns_name: "a.example.com".to_string(),
                    record_type: Some(RecordType::Cname),
                    targets: vec![],
                    ttl: None,
                    labels: BTreeMap::new(),
                    resource: ResourceRef {
                        kind: "Service".to_string(),
                        namespace: "default".to_string(),
                        name: "a".to_string(),
                    },
                },
                &now,
            ),
        ];
        endpoints.sort_by(|a, b| (&a.dns_name, &a.record_type).cmp(&(&b.dns_name, &b.record_type)));
        assert_eq!(endpoints[0].dns_name, "a.example.com");
        assert_eq!(endpoints[1].dns_name, "b.example.com");
    }
}
