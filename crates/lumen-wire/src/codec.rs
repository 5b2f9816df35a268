//! Serializer subsystem
//!
//! The serializer is a process-level subsystem: it must be initialized before
//! model instances can be created or serialized, and deinitialized on teardown.
//! Serialized payloads are owned `Bytes` buffers; the caller releases them by
//! dropping.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use lumen_core::{DeviceId, LumenError, LumenResult};
use tracing::trace;

use crate::TelemetryModel;

/// Serializer subsystem
pub trait Serializer {
    /// Initialize the subsystem
    fn init(&self) -> LumenResult<()>;

    /// Tear the subsystem down
    fn deinit(&self);

    /// Allocate a model instance
    fn create_model(&self, device_id: &DeviceId) -> LumenResult<TelemetryModel>;

    /// Serialize the model's current fields into a payload buffer
    fn serialize(&self, model: &TelemetryModel) -> LumenResult<Bytes>;
}

/// JSON serializer
#[derive(Debug, Default)]
pub struct JsonSerializer {
    initialized: AtomicBool,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn ensure_ready(&self) -> LumenResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(LumenError::Serialization("serializer not initialized".into()))
        }
    }
}

impl Serializer for JsonSerializer {
    fn init(&self) -> LumenResult<()> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return Err(LumenError::SerializerInit("already initialized".into()));
        }
        Ok(())
    }

    fn deinit(&self) {
        self.initialized.store(false, Ordering::Release);
    }

    fn create_model(&self, device_id: &DeviceId) -> LumenResult<TelemetryModel> {
        self.ensure_ready()
            .map_err(|e| LumenError::ModelCreate(e.to_string()))?;
        Ok(TelemetryModel::new(device_id.clone()))
    }

    fn serialize(&self, model: &TelemetryModel) -> LumenResult<Bytes> {
        self.ensure_ready()?;
        let buf = serde_json::to_vec(model).map_err(|e| LumenError::Serialization(e.to_string()))?;
        trace!(len = buf.len(), "telemetry serialized");
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceId {
        DeviceId::new("LightSensorDevice").unwrap()
    }

    #[test]
    fn test_serialize_wire_shape() {
        let serializer = JsonSerializer::new();
        serializer.init().unwrap();

        let mut model = serializer.create_model(&device()).unwrap();
        model.set_sample(&device(), 512);
        let payload = serializer.serialize(&model).unwrap();

        assert_eq!(
            &payload[..],
            br#"{"DeviceId":"LightSensorDevice","LightIntensity":512}"#
        );
    }

    #[test]
    fn test_requires_init() {
        let serializer = JsonSerializer::new();

        assert!(matches!(
            serializer.create_model(&device()),
            Err(LumenError::ModelCreate(_))
        ));
        let model = TelemetryModel::new(device());
        assert!(matches!(
            serializer.serialize(&model),
            Err(LumenError::Serialization(_))
        ));
    }

    #[test]
    fn test_double_init_rejected_until_deinit() {
        let serializer = JsonSerializer::new();
        serializer.init().unwrap();
        assert!(serializer.init().is_err());

        serializer.deinit();
        assert!(!serializer.is_initialized());
        assert!(serializer.init().is_ok());
    }
}
