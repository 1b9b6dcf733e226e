use crate::data_source::KubePortalDataSource;
use crate::reconcile::{
    build_resolver, run_portal_reconciler, run_record_watch_reconciler, run_remote_syncer,
    run_store_writer,
};
use anyhow::{bail, Result};
use clap::Parser;
use dns_portal_controller_grpc::{GrpcServerMetricsFamily, PortalDataSource, Server as GrpcServer};
use dns_portal_controller_k8s_api::config::Config;
use dns_portal_controller_k8s_api::{Api, Client, ManualDNS, ObjectMeta, Resource, SourceRecord};
use dns_portal_controller_k8s_index::{
    bootstrap_main_portal, Collector, GroupMappingSettings, RecordWatchIndex,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::coordination::v1 as coordv1;
use kube::api::PatchParams;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tonic::transport::Server;
use tracing::{info, info_span, instrument, Instrument};

const LEASE_DURATION: Duration = Duration::from_secs(30);
const LEASE_NAME: &str = "dns-portal-controller-write";
const RENEW_GRACE_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
#[clap(name = "dns-portal-controller", about = "A DNS portal aggregation controller")]
pub struct Args {
    #[clap(
        long,
        default_value = "info,warn",
        env = "DNS_PORTAL_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Address the `PortalPeer` gRPC service listens on (§4.4, §6).
    #[clap(long, default_value = "0.0.0.0:9090")]
    grpc_addr: SocketAddr,

    /// Namespace this replica manages Portals, SourceRecords and ManualDNS
    /// objects within.
    #[clap(long, env = "POD_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Name of this controller's own Deployment, used as the write Lease's
    /// owner reference.
    #[clap(long, default_value = "dns-portal-controller")]
    deployment_name: String,

    /// Path to the sources/groupMapping/reconciliation config document
    /// (§3.3, §6). Loading it is a one-shot read at startup; watching it
    /// for changes is left to the deployment's restart policy.
    #[clap(long, default_value = "/etc/dns-portal-controller/config.yaml")]
    config_path: PathBuf,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            grpc_addr,
            namespace,
            deployment_name,
            config_path,
        } = self;

        let config = match Config::from_path(&config_path) {
            Ok(config) => config,
            Err(error) => {
                tracing::warn!(%error, path = %config_path.display(), "using default configuration");
                Config::default()
            }
        };

        let mut prom = <Registry>::default();
        let grpc_metrics = GrpcServerMetricsFamily::register(prom.sub_registry_with_prefix("grpc_server"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let hostname =
            std::env::var("HOSTNAME").expect("Failed to fetch `HOSTNAME` environment variable");

        let mut claims = init_lease(&runtime, &namespace, &deployment_name, &hostname).await?;
        wait_for_leadership(&mut claims, &hostname).await;
        info!(%hostname, "acquired write lease");

        let client = runtime.client();
        let shutdown = runtime.shutdown_handle();
        bootstrap_main_portal(&client, &namespace).await?;

        let (snapshot_tx, writer_rx) = watch::channel(Arc::new(Default::default()));
        let reconciler_rx = writer_rx.clone();

        // `config` is loaded once; keeping the sender alive (rather than
        // dropping it) keeps `Collector::run`'s `config_rx.changed()` select
        // arm pending forever instead of erroring out.
        let (_config_tx, config_rx) = watch::channel(config.clone());

        let collector = Collector::new(client.clone(), namespace.clone(), &config);
        tokio::spawn(
            collector
                .run(config_rx, snapshot_tx, shutdown.clone())
                .instrument(info_span!("collector")),
        );

        tokio::spawn(
            run_store_writer(client.clone(), namespace.clone(), writer_rx, shutdown.clone())
                .instrument(info_span!("store_writer")),
        );

        let resolver = build_resolver()?;
        let settings = GroupMappingSettings::from_config(&config);
        tokio::spawn(
            run_portal_reconciler(
                client.clone(),
                namespace.clone(),
                reconciler_rx,
                resolver.clone(),
                settings.clone(),
                shutdown.clone(),
            )
            .instrument(info_span!("portal_reconciler")),
        );

        let (record_watch_index, record_wakes) = RecordWatchIndex::shared();
        let source_records = runtime.watch_all::<SourceRecord>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(record_watch_index.clone(), source_records)
                .instrument(info_span!("source_records")),
        );
        let manual_dns = runtime.watch_all::<ManualDNS>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(record_watch_index, manual_dns).instrument(info_span!("manual_dns")),
        );
        tokio::spawn(
            run_record_watch_reconciler(
                client.clone(),
                namespace.clone(),
                record_wakes,
                resolver,
                settings,
                shutdown.clone(),
            )
            .instrument(info_span!("record_watch_reconciler")),
        );

        tokio::spawn(
            run_remote_syncer(
                client.clone(),
                namespace.clone(),
                config.reconciliation.interval.into(),
                shutdown.clone(),
            )
            .instrument(info_span!("remote_syncer")),
        );

        let source = Arc::new(KubePortalDataSource::new(client, namespace));
        tokio::spawn(grpc(grpc_addr, source, grpc_metrics, shutdown));

        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

#[instrument(skip_all, fields(port = %addr.port()))]
async fn grpc(
    addr: SocketAddr,
    source: Arc<impl PortalDataSource>,
    metrics: GrpcServerMetricsFamily,
    drain: drain::Watch,
) -> Result<()> {
    let svc = GrpcServer::new(source, metrics, drain.clone()).into_service();

    let (close_tx, close_rx) = tokio::sync::oneshot::channel();
    tokio::pin! {
        let srv = Server::builder().add_service(svc).serve_with_shutdown(addr, async move {
            let _ = close_rx.await;
        });
    }

    info!(%addr, "portal peer gRPC server listening");
    tokio::select! {
        res = (&mut srv) => res?,
        handle = drain.signaled() => {
            let _ = close_tx.send(());
            handle.release_after(srv).await?
        }
    }
    Ok(())
}

/// Creates the write Lease if absent (owned by this controller's own
/// Deployment) and claims it, following the same create-only-then-claim
/// shape as the upstream `kubert::lease` idiom.
async fn init_lease<S>(
    runtime: &kubert::Runtime<S>,
    namespace: &str,
    deployment_name: &str,
    hostname: &str,
) -> Result<watch::Receiver<Arc<kubert::lease::Claim>>> {
    let api = Api::<Deployment>::namespaced(runtime.client(), namespace);
    let deployment = api.get(deployment_name).await?;

    let lease = coordv1::Lease {
        metadata: ObjectMeta {
            name: Some(LEASE_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            // A resource version of "0" means the Lease is only created if
            // it doesn't already exist.
            resource_version: Some("0".to_string()),
            owner_references: Some(vec![deployment.controller_owner_ref(&()).unwrap()]),
            labels: Some(
                [
                    (
                        "dnsportal.io/control-plane-component".to_string(),
                        "controller".to_string(),
                    ),
                    ("dnsportal.io/control-plane-ns".to_string(), namespace.to_string()),
                ]
                .into_iter()
                .collect(),
            ),
            ..Default::default()
        },
        spec: None,
    };

    let lease_api = Api::<coordv1::Lease>::namespaced(runtime.client(), namespace);
    match lease_api
        .patch(
            LEASE_NAME,
            &PatchParams {
                field_manager: Some("dns-portal-controller".to_string()),
                ..Default::default()
            },
            &kube::api::Patch::Apply(lease),
        )
        .await
    {
        Ok(lease) => tracing::info!(?lease, "created write lease"),
        Err(kube::Error::Api(_)) => tracing::debug!("write lease already exists"),
        Err(error) => return Err(error.into()),
    };

    let params = kubert::lease::ClaimParams {
        lease_duration: LEASE_DURATION,
        renew_grace_period: RENEW_GRACE_PERIOD,
    };
    let (claims, _task) = kubert::lease::LeaseManager::init(lease_api, LEASE_NAME)
        .await?
        .spawn(hostname, params)
        .await?;
    Ok(claims)
}

/// Blocks until this replica holds the write Lease. Leader election is
/// otherwise left entirely to the scheduler: once claimed, every
/// reconciliation loop in this process runs unconditionally.
async fn wait_for_leadership(
    claims: &mut watch::Receiver<Arc<kubert::lease::Claim>>,
    hostname: &str,
) {
    loop {
        if claims.borrow().is_current_for(hostname) {
            return;
        }
        if claims.changed().await.is_err() {
            return;
        }
    }
}
