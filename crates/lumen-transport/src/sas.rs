//! Shared access signature tokens
//!
//! Token: `SharedAccessSignature sr=<uri>&sig=<signature>&se=<expiry>` where
//! the signature is base64(HMAC-SHA256(key, "<uri>\n<expiry>")) and `uri` is
//! `<host>/devices/<device id>`, both url-encoded.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use lumen_core::{LumenError, LumenResult};
use sha2::Sha256;

use crate::{ConnectionString, Credential};

/// Default token lifetime
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

type HmacSha256 = Hmac<Sha256>;

/// Password for the connection: the pre-issued signature, or a token signed
/// with the device key that expires `ttl` from now.
pub fn password_for(connection_string: &ConnectionString, ttl: Duration) -> LumenResult<String> {
    match &connection_string.credential {
        Credential::SharedAccessSignature(sig) => Ok(sig.clone()),
        Credential::SharedAccessKey(key) => {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|e| LumenError::ConnectionCreate(e.to_string()))?;
            let resource = format!(
                "{}/devices/{}",
                connection_string.host_name, connection_string.device_id
            );
            generate_token(&resource, key, (now + ttl).as_secs())
        }
    }
}

/// Sign a token for `resource` with the base64 `key`
pub fn generate_token(resource: &str, key: &str, expiry: u64) -> LumenResult<String> {
    let key = STANDARD
        .decode(key)
        .map_err(|e| LumenError::InvalidConnectionString(format!("SharedAccessKey: {}", e)))?;

    let uri = url_encode(resource);
    let to_sign = format!("{}\n{}", uri, expiry);
    let signature = STANDARD.encode(hmac_sha256(&key, to_sign.as_bytes())?);

    Ok(format!(
        "SharedAccessSignature sr={}&sig={}&se={}",
        uri,
        url_encode(&signature),
        expiry
    ))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> LumenResult<[u8; 32]> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| LumenError::InvalidConnectionString(format!("SharedAccessKey: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

fn url_encode(input: &str) -> String {
    url::form_urlencoded::byte_serialize(input.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn test_hmac_sha256_known_answer() {
        // RFC 4231 test case 2
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex(&mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_hmac_sha256_long_key() {
        // RFC 4231 test case 6: key longer than the block size
        let key = [0xaa; 131];
        let mac = hmac_sha256(&key, b"Test Using Larger Than Block-Size Key - Hash Key First").unwrap();
        assert_eq!(
            hex(&mac),
            "60e431591ee0b67f0d8a26aacbf5b77f8e0bc6213728c5140546040f0ee37f54"
        );
    }

    #[test]
    fn test_url_encode() {
        assert_eq!(url_encode("hub.net/devices/a b"), "hub.net%2Fdevices%2Fa+b");
        assert_eq!(url_encode("ab+/="), "ab%2B%2F%3D");
    }

    #[test]
    fn test_token_layout() {
        let token = generate_token("hub.net/devices/dev", "a2V5", 1_700_000_000).unwrap();

        assert!(token.starts_with("SharedAccessSignature sr=hub.net%2Fdevices%2Fdev&sig="));
        assert!(token.ends_with("&se=1700000000"));
        let sig = token.split("&sig=").nth(1).unwrap().split("&se=").next().unwrap();
        assert!(!sig.contains(['+', '/', '=']));
    }

    #[test]
    fn test_rejects_non_base64_key() {
        assert!(matches!(
            generate_token("hub/devices/d", "not base64!", 0),
            Err(LumenError::InvalidConnectionString(_))
        ));
    }

    #[test]
    fn test_signature_passthrough() {
        let cs = ConnectionString::parse(
            "HostName=h;DeviceId=d;SharedAccessSignature=SharedAccessSignature sr=x",
        )
        .unwrap();
        assert_eq!(
            password_for(&cs, DEFAULT_TOKEN_TTL).unwrap(),
            "SharedAccessSignature sr=x"
        );
    }
}
