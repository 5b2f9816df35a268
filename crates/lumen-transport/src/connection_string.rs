//! Device connection strings
//!
//! Format: `HostName=<hub>;DeviceId=<id>;SharedAccessKey=<key>` with optional
//! `GatewayHostName`. A pre-issued `SharedAccessSignature` may replace the key.

use std::fmt;
use std::str::FromStr;

use lumen_core::{DeviceId, LumenError, LumenResult};

/// Device credential carried by the connection string
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    SharedAccessKey(String),
    SharedAccessSignature(String),
}

/// Parsed device connection string
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub host_name: String,
    pub device_id: DeviceId,
    pub credential: Credential,
    pub gateway_host_name: Option<String>,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> LumenResult<Self> {
        let mut host_name = None;
        let mut device_id = None;
        let mut key = None;
        let mut signature = None;
        let mut gateway_host_name = None;

        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            // Keys may contain '=' padding, split only on the first one
            let (name, value) = part
                .split_once('=')
                .ok_or_else(|| invalid(format!("missing '=' in segment '{}'", part)))?;
            if value.is_empty() {
                return Err(invalid(format!("empty value for {}", name)));
            }

            let slot = match name {
                "HostName" => &mut host_name,
                "DeviceId" => &mut device_id,
                "SharedAccessKey" => &mut key,
                "SharedAccessSignature" => &mut signature,
                "GatewayHostName" => &mut gateway_host_name,
                // Unknown keys (e.g. ModuleId) are ignored
                _ => continue,
            };
            if slot.replace(value.to_string()).is_some() {
                return Err(invalid(format!("duplicate {}", name)));
            }
        }

        let host_name = host_name.ok_or_else(|| invalid("missing HostName".into()))?;
        let device_id = device_id
            .ok_or_else(|| invalid("missing DeviceId".into()))
            .and_then(DeviceId::new)?;
        let credential = match (key, signature) {
            (Some(key), None) => Credential::SharedAccessKey(key),
            (None, Some(sig)) => Credential::SharedAccessSignature(sig),
            (Some(_), Some(_)) => {
                return Err(invalid(
                    "both SharedAccessKey and SharedAccessSignature given".into(),
                ))
            }
            (None, None) => {
                return Err(invalid(
                    "missing SharedAccessKey or SharedAccessSignature".into(),
                ))
            }
        };

        Ok(ConnectionString {
            host_name,
            device_id,
            credential,
            gateway_host_name,
        })
    }

    /// Host the transport connects to: the gateway if one is configured
    pub fn endpoint_host(&self) -> &str {
        self.gateway_host_name.as_deref().unwrap_or(&self.host_name)
    }
}

impl FromStr for ConnectionString {
    type Err = LumenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConnectionString::parse(s)
    }
}

// Never print secrets
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::SharedAccessKey(_) => f.write_str("SharedAccessKey(..)"),
            Credential::SharedAccessSignature(_) => f.write_str("SharedAccessSignature(..)"),
        }
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("host_name", &self.host_name)
            .field("device_id", &self.device_id)
            .field("gateway_host_name", &self.gateway_host_name)
            .finish_non_exhaustive()
    }
}

fn invalid(reason: String) -> LumenError {
    LumenError::InvalidConnectionString(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_key_form() {
        let cs = ConnectionString::parse(
            "HostName=hub.example.net;DeviceId=light-1;SharedAccessKey=YWJjZA==",
        )
        .unwrap();

        assert_eq!(cs.host_name, "hub.example.net");
        assert_eq!(cs.device_id.as_str(), "light-1");
        assert_eq!(cs.credential, Credential::SharedAccessKey("YWJjZA==".into()));
        assert_eq!(cs.endpoint_host(), "hub.example.net");
    }

    #[test]
    fn test_parse_signature_and_gateway() {
        let cs: ConnectionString =
            "HostName=hub;DeviceId=d;SharedAccessSignature=SharedAccessSignature sr=x&sig=y;GatewayHostName=edge.local"
                .parse()
                .unwrap();

        assert!(matches!(cs.credential, Credential::SharedAccessSignature(_)));
        assert_eq!(cs.endpoint_host(), "edge.local");
    }

    #[test]
    fn test_rejects_malformed() {
        for raw in [
            "",
            "<Your device connection string>",
            "HostName=hub;SharedAccessKey=k",
            "DeviceId=d;SharedAccessKey=k",
            "HostName=hub;DeviceId=d",
            "HostName=hub;DeviceId=d;SharedAccessKey=k;SharedAccessSignature=s",
            "HostName=hub;HostName=other;DeviceId=d;SharedAccessKey=k",
            "HostName=;DeviceId=d;SharedAccessKey=k",
        ] {
            assert!(
                matches!(
                    ConnectionString::parse(raw),
                    Err(LumenError::InvalidConnectionString(_))
                ),
                "accepted {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_debug_hides_key() {
        let cs = ConnectionString::parse("HostName=h;DeviceId=d;SharedAccessKey=secret").unwrap();
        assert!(!format!("{:?}", cs).contains("secret"));
    }

    proptest! {
        #[test]
        fn prop_parse_never_panics(raw in ".{0,120}") {
            let _ = ConnectionString::parse(&raw);
        }

        #[test]
        fn prop_parse_roundtrips_fields(
            host in "[a-z][a-z0-9.-]{0,30}",
            device in "[A-Za-z0-9][A-Za-z0-9_-]{0,30}",
            key in "[A-Za-z0-9+/]{4,40}={0,2}",
        ) {
            let raw = format!("HostName={};DeviceId={};SharedAccessKey={}", host, device, key);
            let cs = ConnectionString::parse(&raw).unwrap();
            prop_assert_eq!(cs.host_name, host);
            prop_assert_eq!(cs.device_id.as_str(), device.as_str());
            prop_assert_eq!(cs.credential, Credential::SharedAccessKey(key));
        }
    }
}
