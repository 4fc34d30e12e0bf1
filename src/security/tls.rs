//! TLS material loading for the sink listener and the producer channel.

use crate::error::TlsError;
use std::path::Path;
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};

fn read_pem(kind: &'static str, path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Read {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

/// Server TLS settings. Supplying `client_ca` turns on mutual authentication:
/// clients must present a certificate chaining to that CA.
pub fn server_tls_config(
    cert_file: &Path,
    key_file: &Path,
    client_ca: Option<&Path>,
) -> Result<ServerTlsConfig, TlsError> {
    let cert = read_pem("server certificate", cert_file)?;
    let key = read_pem("server private key", key_file)?;
    let mut tls = ServerTlsConfig::new().identity(Identity::from_pem(cert, key));

    if let Some(ca_file) = client_ca {
        let ca = read_pem("CA certificate", ca_file)?;
        tls = tls.client_ca_root(Certificate::from_pem(ca));
    }

    Ok(tls)
}

/// Client TLS settings trusting `ca_file`, optionally presenting a client
/// certificate for mutual authentication.
pub fn client_tls_config(
    ca_file: &Path,
    client_identity: Option<(&Path, &Path)>,
    domain: &str,
) -> Result<ClientTlsConfig, TlsError> {
    let ca = read_pem("CA certificate", ca_file)?;
    let mut tls = ClientTlsConfig::new()
        .domain_name(domain)
        .ca_certificate(Certificate::from_pem(ca));

    if let Some((cert_file, key_file)) = client_identity {
        let cert = read_pem("client certificate", cert_file)?;
        let key = read_pem("client private key", key_file)?;
        tls = tls.identity(Identity::from_pem(cert, key));
    }

    Ok(tls)
}
