//! # Error Taxonomy
//!
//! One enum per component. Request-path errors collapse into [`IngestError`],
//! which maps onto a gRPC status at the service boundary. Startup failures
//! collapse into [`ServerError`] and are fatal.

use std::path::PathBuf;
use tonic::{Code, Status};

/// At-rest encryption failures. Never carries key material.
#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("failed to encrypt payload")]
    Seal,

    #[error("envelope failed authentication")]
    AuthenticationFailure,

    #[error("envelope is not valid base64")]
    InvalidEncoding,
}

/// Durable buffer failures.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("failed to open output file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to flush buffer: {0}")]
    Flush(#[source] std::io::Error),

    #[error("buffer is closed")]
    Closed,
}

/// Peer verification failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no TLS handshake information available for peer")]
    HandshakeUnavailable,

    #[error("no client certificate provided")]
    NoCertificate,

    #[error("client certificate is not valid X.509: {0}")]
    MalformedCertificate(String),
}

/// Invalid command-line or environment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("{flag} is required when {when}")]
    Missing { flag: &'static str, when: &'static str },
}

/// TLS material could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {kind} from {path}: {source}")]
    Read {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures on the ingestion path, in pipeline order.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid client certificate: {0}")]
    Unauthenticated(#[from] AuthError),

    #[error("invalid measurement: {0}")]
    InvalidArgument(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("failed to marshal log entry: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to encrypt log data: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("failed to buffer log data: {0}")]
    Buffer(#[from] BufferError),
}

impl IngestError {
    /// gRPC code reported to the producer.
    pub fn code(&self) -> Code {
        match self {
            IngestError::Unauthenticated(_) => Code::Unauthenticated,
            IngestError::InvalidArgument(_) => Code::InvalidArgument,
            IngestError::RateLimited => Code::ResourceExhausted,
            IngestError::Serialization(_) | IngestError::Encryption(_) | IngestError::Buffer(_) => {
                Code::Internal
            }
        }
    }
}

impl From<IngestError> for Status {
    fn from(err: IngestError) -> Self {
        Status::new(err.code(), err.to_string())
    }
}

/// Fatal startup and serve failures of the sink process.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// Producer-side setup failures. Per-measurement failures are reported through
/// `DeliveryReport` instead.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("invalid sink address {addr}: {reason}")]
    InvalidEndpoint { addr: String, reason: String },

    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_error_codes() {
        assert_eq!(
            IngestError::Unauthenticated(AuthError::NoCertificate).code(),
            Code::Unauthenticated
        );
        assert_eq!(IngestError::RateLimited.code(), Code::ResourceExhausted);
        assert_eq!(
            IngestError::InvalidArgument("empty".into()).code(),
            Code::InvalidArgument
        );
        assert_eq!(
            IngestError::Encryption(EncryptionError::Seal).code(),
            Code::Internal
        );
        assert_eq!(IngestError::Buffer(BufferError::Closed).code(), Code::Internal);
    }

    #[test]
    fn test_status_conversion_keeps_message() {
        let status: Status = IngestError::RateLimited.into();
        assert_eq!(status.code(), Code::ResourceExhausted);
        assert_eq!(status.message(), "rate limit exceeded");

        let status: Status = IngestError::Unauthenticated(AuthError::NoCertificate).into();
        assert_eq!(status.code(), Code::Unauthenticated);
        assert!(status.message().contains("no client certificate provided"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Missing {
            flag: "--encryption-key",
            when: "--encrypt is set",
        };
        assert_eq!(err.to_string(), "--encryption-key is required when --encrypt is set");
    }
}
