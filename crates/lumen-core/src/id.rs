//! Identity types for the Lumen agent

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{LumenError, LumenResult};

/// Device identity as registered with the ingestion endpoint.
/// INVARIANT: never empty.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device id, rejecting empty (or blank) names
    pub fn new(id: impl Into<String>) -> LumenResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(LumenError::InvalidDeviceId);
        }
        Ok(DeviceId(id))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DeviceId {
    type Error = LumenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DeviceId::new(value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device({})", self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation id carried by an outbound message and echoed back by its
/// delivery confirmation.
///
/// Ids start at zero and advance by one per submitted message. The counter
/// wraps at `u32::MAX`, so correlation must tolerate reuse on very long uptimes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CorrelationId(pub u32);

impl CorrelationId {
    pub const ZERO: CorrelationId = CorrelationId(0);

    #[inline]
    pub fn new(id: u32) -> Self {
        CorrelationId(id)
    }

    /// The id that follows this one
    #[inline]
    pub fn next(self) -> Self {
        CorrelationId(self.0.wrapping_add(1))
    }

    #[inline]
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Msg({})", self.0)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_rejects_blank() {
        assert!(DeviceId::new("").is_err());
        assert!(DeviceId::new("   ").is_err());
        assert_eq!(DeviceId::new("sensor-7").unwrap().as_str(), "sensor-7");
    }

    #[test]
    fn test_device_id_try_from_string() {
        let id = DeviceId::try_from("kitchen".to_string()).unwrap();
        assert_eq!(id.to_string(), "kitchen");
        assert!(DeviceId::try_from(String::new()).is_err());
    }

    #[test]
    fn test_correlation_id_wraps() {
        let last = CorrelationId::new(u32::MAX);
        assert_eq!(last.next(), CorrelationId::ZERO);
        assert_eq!(CorrelationId::new(41).next().value(), 42);
    }
}
