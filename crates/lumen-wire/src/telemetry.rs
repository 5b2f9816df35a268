//! Telemetry model
//!
//! Wire shape: `{"DeviceId":"<id>","LightIntensity":<int>}`. Capture time is
//! not a field; the transport timestamps messages on arrival.

use lumen_core::DeviceId;
use serde::{Deserialize, Serialize};

/// Model instance for the light sensor.
/// Created once per session and repopulated on every send.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryModel {
    #[serde(rename = "DeviceId")]
    pub device_id: DeviceId,
    #[serde(rename = "LightIntensity")]
    pub light_intensity: i32,
}

impl TelemetryModel {
    pub fn new(device_id: DeviceId) -> Self {
        TelemetryModel {
            device_id,
            light_intensity: 0,
        }
    }

    /// Load one sample into the model
    pub fn set_sample(&mut self, device_id: &DeviceId, value: i32) {
        if self.device_id != *device_id {
            self.device_id = device_id.clone();
        }
        self.light_intensity = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_sample() {
        let mut model = TelemetryModel::new(DeviceId::new("a").unwrap());
        let b = DeviceId::new("b").unwrap();

        model.set_sample(&b, -17);

        assert_eq!(model.device_id, b);
        assert_eq!(model.light_intensity, -17);
    }
}
