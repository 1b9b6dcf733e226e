//! Per-portal peer channel construction (§4.4): plain HTTP for `http://`
//! peers, otherwise a rustls-backed HTTP/2 connector configured from the
//! Portal's `remote.tls` subspec and Secrets in its own namespace.

use dns_portal_controller_k8s_api::{Api, Client, PortalRemote, Secret};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

/// Per-peer-RPC deadline applied to every outgoing `PortalPeer` channel (§5).
const RPC_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("invalid peer URL {0}: {1}")]
    InvalidUrl(String, #[source] tonic::transport::Error),
    #[error("connecting to {0} failed: {1}")]
    Connect(String, #[source] tonic::transport::Error),
    #[error("reading secret {0} failed: {1}")]
    Secret(String, #[source] kube::Error),
    #[error("secret {0} missing key {1}")]
    MissingKey(String, &'static str),
    #[error("parsing PEM material from secret {0} failed: {1}")]
    ParsePem(String, #[source] std::io::Error),
    #[error("building TLS root store failed: {0}")]
    Roots(#[source] rustls::Error),
    #[error("building client TLS config failed: {0}")]
    ClientAuth(#[source] rustls::Error),
}

/// Accepts any server certificate. Used only when `insecureSkipVerify` is
/// set on the Portal's `remote.tls` subspec.
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::aws_lc_rs::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

pub async fn build_channel(
    client: &Client,
    namespace: &str,
    remote: &PortalRemote,
) -> Result<Channel, TlsError> {
    if !remote.url.starts_with("https://") {
        return Endpoint::from_shared(remote.url.clone())
            .map_err(|source| TlsError::InvalidUrl(remote.url.clone(), source))?
            .timeout(RPC_TIMEOUT)
            .connect()
            .await
            .map_err(|source| TlsError::Connect(remote.url.clone(), source));
    }

    let ca_pem = match &remote.tls.ca_secret_ref {
        Some(name) => Some(read_secret_key(client, namespace, name, "ca.crt").await?),
        None => None,
    };
    let identity = match &remote.tls.client_cert_secret_ref {
        Some(name) => {
            let cert_pem = read_secret_key(client, namespace, name, "tls.crt").await?;
            let key_pem = read_secret_key(client, namespace, name, "tls.key").await?;
            Some(parse_identity(name, &cert_pem, &key_pem)?)
        }
        None => None,
    };

    let roots = root_store(ca_pem.as_deref())?;
    let tls_config = client_config(roots, identity, remote.tls.insecure_skip_verify)?;

    let mut http = HttpConnector::new();
    http.enforce_http(false);
    let connector = HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http2()
        .wrap_connector(http);

    Endpoint::from_shared(remote.url.clone())
        .map_err(|source| TlsError::InvalidUrl(remote.url.clone(), source))?
        .timeout(RPC_TIMEOUT)
        .connect_with_connector(connector)
        .await
        .map_err(|source| TlsError::Connect(remote.url.clone(), source))
}

async fn read_secret_key(
    client: &Client,
    namespace: &str,
    secret_name: &str,
    key: &'static str,
) -> Result<Vec<u8>, TlsError> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = api
        .get(secret_name)
        .await
        .map_err(|source| TlsError::Secret(secret_name.to_string(), source))?;
    secret
        .data
        .and_then(|mut data| data.remove(key))
        .map(|value| value.0)
        .ok_or_else(|| TlsError::MissingKey(secret_name.to_string(), key))
}

fn root_store(ca_pem: Option<&[u8]>) -> Result<rustls::RootCertStore, TlsError> {
    let mut store = rustls::RootCertStore::empty();
    match ca_pem {
        Some(pem) => {
            let mut reader = std::io::BufReader::new(pem);
            for cert in rustls_pemfile::certs(&mut reader) {
                let cert = cert.map_err(|source| TlsError::ParsePem("ca bundle".to_string(), source))?;
                store
                    .add(cert)
                    .map_err(TlsError::Roots)?;
            }
        }
        None => store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }
    Ok(store)
}

fn parse_identity(
    secret_name: &str,
    cert_pem: &[u8],
    key_pem: &[u8],
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), TlsError> {
    let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(cert_pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::ParsePem(secret_name.to_string(), source))?;
    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_pem))
        .map_err(|source| TlsError::ParsePem(secret_name.to_string(), source))?
        .ok_or_else(|| TlsError::MissingKey(secret_name.to_string(), "tls.key"))?;
    Ok((certs, key))
}

fn client_config(
    roots: rustls::RootCertStore,
    identity: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
    insecure_skip_verify: bool,
) -> Result<rustls::ClientConfig, TlsError> {
    let mut config = match identity {
        Some((certs, key)) => rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .map_err(TlsError::ClientAuth)?,
        None => rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    };
    if insecure_skip_verify {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoVerifier));
    }
    config.alpn_protocols = vec![b"h2".to_vec()];
    Ok(config)
}
