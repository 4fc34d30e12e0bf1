//! # gRPC Ingestion Server
//!
//! Implements `telemetry.TelemetryService`. Every request runs the same
//! pipeline, and any failure before the append leaves the buffer untouched:
//!
//! 1. Connection authentication (mTLS only)
//! 2. Request validation
//! 3. Admission control on the encoded request size
//! 4. JSON serialization and optional encryption
//! 5. Append to the durable buffer
//!
//! Step 5 takes the buffer's blocking lock on the handler's own task. When
//! the append forces a flush, or a timer flush holds the lock, the file write
//! occupies a tokio worker thread until it completes.
//!
//! [`SinkServer`] owns the process lifecycle: it wires the components from
//! configuration, runs the periodic flush task next to the listener, and on
//! shutdown performs exactly one final flush after the last request.

use crate::config::SinkConfig;
use crate::error::{ConfigError, IngestError, ServerError};
use crate::proto::telemetry_service_server::{TelemetryService, TelemetryServiceServer};
use crate::proto::{SensorData, SensorDataResponse};
use crate::rate_limit::RateLimiter;
use crate::security::{server_tls_config, ConnectionAuthenticator, PayloadEncryptor, RecordSealer};
use crate::telemetry::{DurableBuffer, FlushScheduler, MeasurementRecord};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use prost::Message;
use std::fs::File;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Server, ServerTlsConfig};
use tonic::{Request, Response, Status};

/// Acknowledgement returned for every accepted measurement.
pub const ACK_MESSAGE: &str = "Received successfully";

// ================================================================================================
// INGEST SERVICE
// ================================================================================================

/// gRPC service for measurement ingestion.
pub struct IngestService<W: Write = File> {
    /// Peer verification, configured once at startup
    authenticator: ConnectionAuthenticator,

    /// Byte-rate admission control shared by all handlers
    limiter: Arc<RateLimiter>,

    /// Plain or encrypted line encoding
    sealer: Arc<RecordSealer>,

    /// Output buffer shared with the flush task
    buffer: Arc<DurableBuffer<W>>,
}

impl<W: Write> IngestService<W> {
    pub fn new(
        authenticator: ConnectionAuthenticator,
        limiter: Arc<RateLimiter>,
        sealer: Arc<RecordSealer>,
        buffer: Arc<DurableBuffer<W>>,
    ) -> Self {
        IngestService {
            authenticator,
            limiter,
            sealer,
            buffer,
        }
    }

    /// Runs the ingestion pipeline for one request.
    pub fn ingest(&self, request: Request<SensorData>) -> Result<SensorDataResponse, IngestError> {
        self.authenticator.authenticate_request(&request)?;

        let data = request.into_inner();
        let record = measurement_record(&data, Utc::now())?;

        let size = i64::try_from(data.encoded_len()).unwrap_or(i64::MAX);
        if !self.limiter.allow(size) {
            warn!(
                "Rate limit exceeded for sensor {} ({} bytes)",
                data.sensor_name, size
            );
            return Err(IngestError::RateLimited);
        }

        let line = self.sealer.seal_line(record.to_json()?)?;
        self.buffer.append(&line)?;

        debug!(
            "Received data from {}: value={}",
            record.producer(),
            record.value()
        );
        Ok(SensorDataResponse {
            message: ACK_MESSAGE.to_string(),
        })
    }
}

/// Builds the persisted record, rejecting requests that cannot form one.
pub fn measurement_record(
    data: &SensorData,
    received_at: DateTime<Utc>,
) -> Result<MeasurementRecord, IngestError> {
    if data.sensor_name.is_empty() {
        return Err(IngestError::InvalidArgument(
            "sensor_name must not be empty".to_string(),
        ));
    }

    let timestamp = data
        .timestamp
        .as_ref()
        .ok_or_else(|| IngestError::InvalidArgument("timestamp is required".to_string()))?;

    let captured_at = u32::try_from(timestamp.nanos)
        .ok()
        .filter(|nanos| *nanos < 1_000_000_000)
        .and_then(|nanos| DateTime::from_timestamp(timestamp.seconds, nanos))
        .ok_or_else(|| {
            IngestError::InvalidArgument(format!(
                "timestamp out of range: {}s {}ns",
                timestamp.seconds, timestamp.nanos
            ))
        })?;

    Ok(MeasurementRecord::new(
        data.sensor_name.clone(),
        i64::from(data.sensor_value),
        captured_at,
        received_at,
    ))
}

#[tonic::async_trait]
impl<W: Write + Send + 'static> TelemetryService for IngestService<W> {
    async fn send_sensor_data(
        &self,
        request: Request<SensorData>,
    ) -> Result<Response<SensorDataResponse>, Status> {
        match self.ingest(request) {
            Ok(response) => Ok(Response::new(response)),
            Err(e) => {
                match &e {
                    IngestError::Unauthenticated(_) => warn!("Rejected request: {}", e),
                    IngestError::InvalidArgument(_) | IngestError::RateLimited => {
                        debug!("Rejected request: {}", e)
                    }
                    _ => error!("Failed to persist measurement: {}", e),
                }
                Err(e.into())
            }
        }
    }
}

// ================================================================================================
// SERVER LIFECYCLE
// ================================================================================================

/// Fully wired sink process.
pub struct SinkServer {
    config: SinkConfig,
    service: IngestService,
    buffer: Arc<DurableBuffer>,
    tls: Option<ServerTlsConfig>,
}

impl SinkServer {
    /// Validates `config` and opens every resource. All startup failures are
    /// reported here: bad key material, unreadable TLS files, output path.
    pub fn new(config: SinkConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let sealer = if config.encrypt {
            let key = config
                .encryption_key
                .as_deref()
                .ok_or(ConfigError::Missing {
                    flag: "--encryption-key",
                    when: "--encrypt is set",
                })?;
            info!("Encryption enabled for log data");
            RecordSealer::Encrypted(PayloadEncryptor::from_base64_key(key)?)
        } else {
            RecordSealer::Plain
        };

        let tls = match (config.tls, &config.cert_file, &config.key_file) {
            (true, Some(cert), Some(key)) => {
                let tls = server_tls_config(cert, key, config.ca_file.as_deref())?;
                if config.mutual_tls_enabled() {
                    info!("Mutual TLS enabled, client certificates required");
                } else {
                    info!("TLS enabled");
                }
                Some(tls)
            }
            _ => None,
        };

        let buffer = Arc::new(DurableBuffer::open(&config.log_file, config.buffer_size)?);
        let service = IngestService::new(
            ConnectionAuthenticator::new(config.mutual_tls_enabled()),
            Arc::new(RateLimiter::new(config.rate_limit)),
            Arc::new(sealer),
            Arc::clone(&buffer),
        );

        Ok(SinkServer {
            config,
            service,
            buffer,
            tls,
        })
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    pub fn buffer(&self) -> &Arc<DurableBuffer> {
        &self.buffer
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.config.bind_addr;
        TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })
    }

    /// Serves on `listener` until `shutdown` is cancelled.
    ///
    /// In-flight requests finish before the final flush. The buffer is closed
    /// even when serving fails.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), ServerError> {
        let SinkServer {
            config,
            service,
            buffer,
            tls,
        } = self;

        let local_addr: Option<SocketAddr> = listener.local_addr().ok();
        info!(
            "Telemetry sink listening on {}",
            local_addr.unwrap_or(config.bind_addr)
        );
        info!(
            "Writing to {} (buffer {} bytes, flush every {:?}, rate limit {} B/s)",
            config.log_file.display(),
            config.buffer_size,
            config.flush_interval,
            config.rate_limit
        );

        let scheduler = Arc::new(FlushScheduler::new(
            Arc::clone(&buffer),
            config.scheduler_config(),
            shutdown.clone(),
        ));
        let flush_task = tokio::spawn(scheduler.start());

        let served = serve(service, tls, listener, shutdown.clone()).await;

        shutdown.cancel();
        if let Err(e) = flush_task.await {
            error!("Flush task terminated abnormally: {}", e);
        }

        let closed = buffer.close();
        info!("Telemetry sink stopped");

        served?;
        closed?;
        Ok(())
    }
}

async fn serve(
    service: IngestService,
    tls: Option<ServerTlsConfig>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let mut builder = Server::builder();
    if let Some(tls) = tls {
        builder = builder.tls_config(tls)?;
    }

    builder
        .add_service(TelemetryServiceServer::new(service))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
            shutdown.cancelled().await;
            info!("Shutting down server...");
        })
        .await?;

    Ok(())
}
