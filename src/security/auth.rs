//! # Connection Authenticator
//!
//! Checks the peer identity established by the TLS handshake. Runs once per
//! request, before admission control, so unauthenticated traffic never
//! consumes quota.
//!
//! Chain verification against the configured CA is done by the TLS layer; this
//! check only insists that a verified leaf certificate is present and records
//! who it belongs to.

use crate::error::AuthError;
use log::info;
use tonic::Request;
use x509_parser::prelude::*;

/// Subject and issuer of an authenticated client certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub subject: String,
    pub issuer: String,
}

/// Per-sink authenticator, configured once at startup.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionAuthenticator {
    mutual_tls: bool,
}

impl ConnectionAuthenticator {
    /// `mutual_tls` is true when the listener requires client certificates.
    pub fn new(mutual_tls: bool) -> Self {
        ConnectionAuthenticator { mutual_tls }
    }

    /// Authenticator that admits every peer without an identity.
    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_mutual_tls(&self) -> bool {
        self.mutual_tls
    }

    /// Authenticates from the DER certificates the handshake produced.
    ///
    /// `None` means no handshake information was available at all.
    pub fn authenticate<C: AsRef<[u8]>>(
        &self,
        peer_certs: Option<&[C]>,
    ) -> Result<Option<PeerIdentity>, AuthError> {
        if !self.mutual_tls {
            return Ok(None);
        }

        let certs = peer_certs.ok_or(AuthError::HandshakeUnavailable)?;
        let leaf = certs.first().ok_or(AuthError::NoCertificate)?;

        let (_, cert) = X509Certificate::from_der(leaf.as_ref())
            .map_err(|e| AuthError::MalformedCertificate(e.to_string()))?;

        let identity = PeerIdentity {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
        };

        info!(
            "Client authenticated with certificate: Subject={}, Issuer={}",
            identity.subject, identity.issuer
        );

        Ok(Some(identity))
    }

    /// Authenticates the peer of an inbound gRPC request.
    pub fn authenticate_request<T>(
        &self,
        request: &Request<T>,
    ) -> Result<Option<PeerIdentity>, AuthError> {
        if !self.mutual_tls {
            return Ok(None);
        }

        let certs = request.peer_certs();
        self.authenticate(certs.as_deref().map(|certs| certs.as_slice()))
    }
}
