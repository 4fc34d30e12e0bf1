//! Transport seam between the delivery agent and the network.

use crate::config::ProducerConfig;
use crate::error::{ConfigError, DeliveryError};
use crate::proto::telemetry_service_client::TelemetryServiceClient;
use crate::proto::SensorData;
use crate::security::client_tls_config;
use async_trait::async_trait;
use log::info;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};

/// One send of one measurement. Returns the sink's acknowledgement message.
#[async_trait]
pub trait MeasurementTransport: Send {
    async fn send(&mut self, measurement: &SensorData) -> Result<String, Status>;
}

/// gRPC client for `TelemetryService`.
#[derive(Debug, Clone)]
pub struct GrpcTransport {
    client: TelemetryServiceClient<Channel>,
}

impl GrpcTransport {
    /// Builds a lazily connecting channel to the configured sink. No network
    /// traffic happens until the first send.
    pub fn connect(config: &ProducerConfig) -> Result<Self, DeliveryError> {
        let uri = config.endpoint_uri();
        let mut endpoint =
            Endpoint::from_shared(uri.clone()).map_err(|e| DeliveryError::InvalidEndpoint {
                addr: uri.clone(),
                reason: e.to_string(),
            })?;

        if config.tls {
            let ca_file = config.cert_file.as_deref().ok_or(ConfigError::Missing {
                flag: "--cert-file",
                when: "--tls is set",
            })?;
            let identity = config
                .client_cert
                .as_deref()
                .zip(config.client_key.as_deref());

            endpoint = endpoint.tls_config(client_tls_config(
                ca_file,
                identity,
                &config.server_name,
            )?)?;

            if identity.is_some() {
                info!("Using mutual TLS towards {}", uri);
            } else {
                info!("Using TLS towards {}", uri);
            }
        } else {
            info!("Using plaintext connection towards {}", uri);
        }

        Ok(Self::from_channel(endpoint.connect_lazy()))
    }

    pub fn from_channel(channel: Channel) -> Self {
        GrpcTransport {
            client: TelemetryServiceClient::new(channel),
        }
    }
}

#[async_trait]
impl MeasurementTransport for GrpcTransport {
    async fn send(&mut self, measurement: &SensorData) -> Result<String, Status> {
        let response = self
            .client
            .send_sensor_data(Request::new(measurement.clone()))
            .await?;
        Ok(response.into_inner().message)
    }
}
