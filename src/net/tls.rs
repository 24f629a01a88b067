//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::config::schema::{TlsClientConfig, TlsServerConfig};
use crate::error::BridgeError;

/// Build a TLS acceptor from certificate and key files.
pub(crate) fn load_acceptor(config: &TlsServerConfig) -> Result<TlsAcceptor, BridgeError> {
    if !config.cert_path.exists() {
        return Err(BridgeError::Tls(format!(
            "certificate file not found: {}",
            config.cert_path.display()
        )));
    }
    if !config.key_path.exists() {
        return Err(BridgeError::Tls(format!(
            "private key file not found: {}",
            config.key_path.display()
        )));
    }

    let certs = load_certs(&config.cert_path)?;
    let key = load_private_key(&config.key_path)?;

    let server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| BridgeError::Tls(format!("invalid certificate/key pair: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

/// Build a TLS connector. Roots come from `ca_path` when set, otherwise
/// the webpki root set.
pub(crate) fn build_connector(config: &TlsClientConfig) -> Result<TlsConnector, BridgeError> {
    let mut roots = RootCertStore::empty();
    match &config.ca_path {
        Some(path) => {
            for cert in load_certs(path)? {
                roots
                    .add(cert)
                    .map_err(|e| BridgeError::Tls(format!("invalid CA certificate: {e}")))?;
            }
        }
        None => {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
    }

    let client_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(client_config)))
}

/// Server name for SNI: the configured name, or the host portion of the
/// dial address.
pub(crate) fn server_name(
    config: &TlsClientConfig,
    address: &str,
) -> Result<ServerName<'static>, BridgeError> {
    let name = match &config.server_name {
        Some(name) => name.clone(),
        None => address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| address.to_string()),
    };

    ServerName::try_from(name.clone())
        .map_err(|_| BridgeError::Tls(format!("invalid server name '{name}'")))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, BridgeError> {
    let file = File::open(path).map_err(|e| {
        BridgeError::Tls(format!("failed to open certificate file {}: {e}", path.display()))
    })?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| BridgeError::Tls(format!("failed to parse certificates: {e}")))?;

    if certs.is_empty() {
        return Err(BridgeError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, BridgeError> {
    let file = File::open(path).map_err(|e| {
        BridgeError::Tls(format!("failed to open key file {}: {e}", path.display()))
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| BridgeError::Tls(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| BridgeError::Tls(format!("no private key found in {}", path.display())))
}
