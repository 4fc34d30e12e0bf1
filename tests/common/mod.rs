//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::SystemTime;
use telemetry_sink::proto::SensorData;

/// In-memory sink whose contents stay readable after the buffer takes it.
#[derive(Clone, Default)]
pub struct SharedSink {
    data: Arc<Mutex<Vec<u8>>>,
    writes: Arc<Mutex<usize>>,
}

impl SharedSink {
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8(self.contents())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Number of `write_all` batches received.
    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        *self.writes.lock() += 1;
        self.data.lock().extend_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink that fails while its switch is on.
#[derive(Clone, Default)]
pub struct FailingSink {
    pub failing: Arc<Mutex<bool>>,
    pub inner: SharedSink,
}

impl FailingSink {
    pub fn broken() -> Self {
        let sink = Self::default();
        *sink.failing.lock() = true;
        sink
    }

    pub fn repair(&self) {
        *self.failing.lock() = false;
    }
}

impl Write for FailingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if *self.failing.lock() {
            return Err(io::Error::new(io::ErrorKind::Other, "device unavailable"));
        }
        self.inner.write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        if *self.failing.lock() {
            return Err(io::Error::new(io::ErrorKind::Other, "device unavailable"));
        }
        self.inner.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn sensor_data(name: &str, value: i32) -> SensorData {
    SensorData {
        sensor_name: name.to_string(),
        sensor_value: value,
        timestamp: Some(prost_types::Timestamp::from(SystemTime::now())),
    }
}

/// Fixed, non-secret test key.
pub fn test_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = i as u8;
    }
    key
}
