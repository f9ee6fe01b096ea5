//! TLS acceptor setup from PEM files.

use crate::config::TlsConfig;
use crate::server::ServerError;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};

/// Builds an acceptor from the certificate chain and private key in `config`.
pub fn acceptor(config: &TlsConfig) -> Result<TlsAcceptor, ServerError> {
    let certs = load_certs(&config.cert_path)?;
    let key = load_key(&config.key_path)?;

    let server_config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(tls_error)?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(tls_error)?;
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn open(path: &Path) -> Result<BufReader<File>, ServerError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| ServerError::Tls { reason: format!("failed to open {}: {e}", path.display()) })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Tls { reason: format!("invalid certificate in {}: {e}", path.display()) })?;
    if certs.is_empty() {
        return Err(ServerError::Tls { reason: format!("no certificate in {}", path.display()) });
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|e| ServerError::Tls { reason: format!("invalid private key in {}: {e}", path.display()) })?
        .ok_or_else(|| ServerError::Tls { reason: format!("no private key in {}", path.display()) })
}

fn tls_error(e: tokio_rustls::rustls::Error) -> ServerError {
    ServerError::Tls { reason: e.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_empty_pem_files() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.pem");
        std::fs::write(&empty, "").unwrap();

        let config = TlsConfig { cert_path: dir.path().join("missing.pem"), key_path: empty.clone() };
        let Err(ServerError::Tls { reason }) = acceptor(&config) else { panic!("expected tls error") };
        assert!(reason.starts_with("failed to open"), "{reason}");

        let config = TlsConfig { cert_path: empty.clone(), key_path: empty };
        let Err(ServerError::Tls { reason }) = acceptor(&config) else { panic!("expected tls error") };
        assert!(reason.starts_with("no certificate"), "{reason}");
    }
}
