//! # Configuration
//!
//! Command-line parsers for both binaries. Every sink flag also reads an
//! environment variable; the flag wins when both are set.

use crate::delivery::{BackoffConfig, DeliveryConfig};
use crate::error::ConfigError;
use crate::telemetry::SchedulerConfig;
use clap::Parser;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

// ================================================================================================
// SINK
// ================================================================================================

#[derive(Parser, Clone)]
#[command(name = "sink-server")]
#[command(about = "Receives sensor measurements over gRPC and persists them to a log file")]
#[command(version)]
pub struct SinkConfig {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:9090")]
    pub bind_addr: SocketAddr,

    /// Path to output log file
    #[arg(long, env = "LOG_FILE", default_value = "telemetry.log")]
    pub log_file: PathBuf,

    /// Buffer size in bytes
    #[arg(long, env = "BUFFER_SIZE", default_value_t = 5 * 1024)]
    pub buffer_size: usize,

    /// Buffer flush interval (e.g. 30s, 1m)
    #[arg(long, env = "FLUSH_INTERVAL", default_value = "1m", value_parser = humantime::parse_duration)]
    pub flush_interval: Duration,

    /// Rate limit in bytes per second
    #[arg(long, env = "RATE_LIMIT", default_value_t = 1024 * 1024)]
    pub rate_limit: u64,

    /// Enable TLS
    #[arg(long)]
    pub tls: bool,

    /// Path to TLS certificate file
    #[arg(long, env = "TLS_CERT_FILE")]
    pub cert_file: Option<PathBuf>,

    /// Path to TLS private key file
    #[arg(long, env = "TLS_KEY_FILE")]
    pub key_file: Option<PathBuf>,

    /// Path to CA certificate file; enables mutual TLS
    #[arg(long, env = "TLS_CA_FILE")]
    pub ca_file: Option<PathBuf>,

    /// Enable AES-GCM encryption for log data
    #[arg(long)]
    pub encrypt: bool,

    /// Base64 encoded 32-byte encryption key
    #[arg(long, env = "ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: Option<String>,
}

impl SinkConfig {
    /// Checks cross-field rules clap cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "buffer size must be greater than zero".to_string(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "flush interval must be greater than zero".to_string(),
            ));
        }

        if self.tls {
            if self.cert_file.is_none() {
                return Err(ConfigError::Missing {
                    flag: "--cert-file",
                    when: "--tls is set",
                });
            }
            if self.key_file.is_none() {
                return Err(ConfigError::Missing {
                    flag: "--key-file",
                    when: "--tls is set",
                });
            }
        }

        if self.encrypt && self.encryption_key.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Missing {
                flag: "--encryption-key",
                when: "--encrypt is set",
            });
        }

        Ok(())
    }

    /// Client certificates are required when TLS is on and a CA is given.
    pub fn mutual_tls_enabled(&self) -> bool {
        self.tls && self.ca_file.is_some()
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            flush_interval: self.flush_interval,
            enabled: true,
        }
    }
}

impl fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkConfig")
            .field("bind_addr", &self.bind_addr)
            .field("log_file", &self.log_file)
            .field("buffer_size", &self.buffer_size)
            .field("flush_interval", &self.flush_interval)
            .field("rate_limit", &self.rate_limit)
            .field("tls", &self.tls)
            .field("cert_file", &self.cert_file)
            .field("key_file", &self.key_file)
            .field("ca_file", &self.ca_file)
            .field("encrypt", &self.encrypt)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

// ================================================================================================
// PRODUCER
// ================================================================================================

#[derive(Parser, Debug, Clone)]
#[command(name = "sensor-node")]
#[command(about = "Generates sensor measurements and delivers them to a telemetry sink")]
#[command(version)]
pub struct ProducerConfig {
    /// Number of messages per second
    #[arg(long, env = "SENSOR_RATE", default_value_t = 1.0)]
    pub rate: f64,

    /// Name of the sensor
    #[arg(long, env = "SENSOR_NAME", default_value = "default-sensor")]
    pub sensor_name: String,

    /// Address of the telemetry sink
    #[arg(long, env = "SINK_ADDR", default_value = "localhost:9090")]
    pub sink_addr: String,

    /// Use TLS for connection
    #[arg(long)]
    pub tls: bool,

    /// Path to the CA certificate trusted for the sink
    #[arg(long, env = "TLS_CERT_FILE")]
    pub cert_file: Option<PathBuf>,

    /// Path to client certificate file (for mTLS)
    #[arg(long, env = "TLS_CLIENT_CERT")]
    pub client_cert: Option<PathBuf>,

    /// Path to client private key file (for mTLS)
    #[arg(long, env = "TLS_CLIENT_KEY")]
    pub client_key: Option<PathBuf>,

    /// Expected server name in the sink certificate
    #[arg(long, default_value = "localhost")]
    pub server_name: String,

    /// Attempts per measurement before it is dropped
    #[arg(long, default_value_t = 5)]
    pub max_attempts: u32,

    /// Deadline for a single attempt
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    pub attempt_timeout: Duration,
}

impl ProducerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "rate must be a positive number of messages per second, got {}",
                self.rate
            )));
        }
        self.tick_interval()?;
        if self.sensor_name.is_empty() {
            return Err(ConfigError::Invalid("sensor name must not be empty".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max attempts must be at least 1".to_string(),
            ));
        }

        if self.tls && self.cert_file.is_none() {
            return Err(ConfigError::Missing {
                flag: "--cert-file",
                when: "--tls is set",
            });
        }

        match (&self.client_cert, &self.client_key) {
            (Some(_), None) => {
                return Err(ConfigError::Missing {
                    flag: "--client-key",
                    when: "--client-cert is set",
                })
            }
            (None, Some(_)) => {
                return Err(ConfigError::Missing {
                    flag: "--client-cert",
                    when: "--client-key is set",
                })
            }
            (Some(_), Some(_)) if !self.tls => {
                return Err(ConfigError::Missing {
                    flag: "--tls",
                    when: "a client certificate is set",
                })
            }
            _ => {}
        }

        Ok(())
    }

    /// Sink URI with a scheme; `http` or `https` is added from the TLS toggle
    /// when the address has none.
    pub fn endpoint_uri(&self) -> String {
        if self.sink_addr.contains("://") {
            return self.sink_addr.clone();
        }
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}", scheme, self.sink_addr)
    }

    /// Time between generated measurements. Must be at least one nanosecond.
    pub fn tick_interval(&self) -> Result<Duration, ConfigError> {
        let tick = Duration::try_from_secs_f64(1.0 / self.rate).map_err(|e| {
            ConfigError::Invalid(format!("rate {} is out of range: {}", self.rate, e))
        })?;
        if tick.is_zero() {
            return Err(ConfigError::Invalid(format!(
                "rate {} is too high, the tick interval rounds to zero",
                self.rate
            )));
        }
        Ok(tick)
    }

    pub fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            max_attempts: self.max_attempts,
            attempt_timeout: self.attempt_timeout,
            backoff: BackoffConfig::default(),
        }
    }
}
