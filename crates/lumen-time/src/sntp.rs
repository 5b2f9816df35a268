//! Time sources: SNTP client and host clock
//!
//! Implements the client side of SNTP (RFC 4330) for fetching the current
//! epoch time from public NTP servers.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lumen_core::{EpochSeconds, LumenError, LumenResult};
use tracing::debug;

use crate::TimeSource;

/// NTP port
const NTP_PORT: u16 = 123;

/// NTP packet size (no extension fields)
const NTP_PACKET_SIZE: usize = 48;

/// LI = 0, VN = 3, Mode = 3 (client)
const NTP_CLIENT_HEADER: u8 = 0x1B;

/// Mode = 4 (server)
const NTP_MODE_SERVER: u8 = 4;

/// Seconds between 1900-01-01 (NTP era 0) and 1970-01-01
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// Timestamp field offsets
const ORIGINATE_OFFSET: usize = 24;
const TRANSMIT_OFFSET: usize = 40;

/// SNTP client time source
pub struct SntpTimeSource {
    /// Servers queried in order
    servers: Vec<String>,
    /// Timeout per request
    timeout: Duration,
    /// Attempts per server
    retries: u32,
}

impl SntpTimeSource {
    /// Create a new SNTP source with default settings
    pub fn new() -> Self {
        Self {
            servers: Vec::new(),
            timeout: Duration::from_secs(3),
            retries: 2,
        }
    }

    /// Create with custom timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::new()
        }
    }

    /// Query a single server
    pub fn query(&self, server: &str) -> LumenResult<EpochSeconds> {
        let server_addr = resolve(server)?;

        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_read_timeout(Some(self.timeout))?;

        for attempt in 0..self.retries {
            let request = build_request(SystemTime::now());
            socket.send_to(&request, server_addr)?;

            let mut buf = [0u8; 512];
            match socket.recv_from(&mut buf) {
                Ok((len, from)) if from == server_addr => {
                    if let Some(epoch) = parse_response(&buf[..len], &request) {
                        return Ok(epoch);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    if attempt == self.retries - 1 {
                        return Err(LumenError::TimeSync(format!("{}: {}", server, e)));
                    }
                }
            }
        }

        Err(LumenError::TimeSync(format!(
            "{}: no valid reply after retries",
            server
        )))
    }
}

impl Default for SntpTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SntpTimeSource {
    fn configure(&mut self, servers: &[String]) {
        self.servers = servers.to_vec();
    }

    fn now_epoch(&mut self) -> LumenResult<EpochSeconds> {
        for server in &self.servers {
            match self.query(server) {
                Ok(epoch) => return Ok(epoch),
                Err(e) => debug!(server = %server, error = %e, "SNTP query failed"),
            }
        }

        Err(LumenError::TimeSync("all NTP servers failed".to_string()))
    }
}

/// Host clock time source, for hosts where the OS keeps time in sync.
/// Before the OS clock is set this reads close to zero and the sync gate
/// keeps waiting.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn configure(&mut self, _servers: &[String]) {}

    fn now_epoch(&mut self) -> LumenResult<EpochSeconds> {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok(EpochSeconds::new(secs))
    }
}

fn resolve(server: &str) -> LumenResult<SocketAddr> {
    let mut addrs = if server.contains(':') {
        server.to_socket_addrs()
    } else {
        (server, NTP_PORT).to_socket_addrs()
    }
    .map_err(|e| LumenError::TimeSync(format!("Invalid NTP server {}: {}", server, e)))?;

    addrs
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| LumenError::TimeSync(format!("No IPv4 address for {}", server)))
}

/// Build an SNTP client request. The transmit timestamp doubles as a nonce
/// that the server echoes in the originate field.
fn build_request(now: SystemTime) -> [u8; NTP_PACKET_SIZE] {
    let mut request = [0u8; NTP_PACKET_SIZE];
    request[0] = NTP_CLIENT_HEADER;

    let since_unix = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = (since_unix.as_secs() + NTP_UNIX_OFFSET) as u32;
    let frac = ((since_unix.subsec_nanos() as u64) << 32) / 1_000_000_000;
    request[TRANSMIT_OFFSET..TRANSMIT_OFFSET + 4].copy_from_slice(&secs.to_be_bytes());
    request[TRANSMIT_OFFSET + 4..TRANSMIT_OFFSET + 8].copy_from_slice(&(frac as u32).to_be_bytes());

    request
}

/// Parse an SNTP reply into unix seconds
fn parse_response(data: &[u8], request: &[u8; NTP_PACKET_SIZE]) -> Option<EpochSeconds> {
    if data.len() < NTP_PACKET_SIZE {
        return None;
    }

    // Check mode
    if data[0] & 0x07 != NTP_MODE_SERVER {
        return None;
    }

    // Stratum 0 is a kiss-o'-death packet
    if data[1] == 0 {
        return None;
    }

    // Originate must echo our transmit timestamp
    if data[ORIGINATE_OFFSET..ORIGINATE_OFFSET + 8] != request[TRANSMIT_OFFSET..TRANSMIT_OFFSET + 8] {
        return None;
    }

    let ntp_secs = u32::from_be_bytes([
        data[TRANSMIT_OFFSET],
        data[TRANSMIT_OFFSET + 1],
        data[TRANSMIT_OFFSET + 2],
        data[TRANSMIT_OFFSET + 3],
    ]) as u64;

    ntp_secs
        .checked_sub(NTP_UNIX_OFFSET)
        .map(EpochSeconds::new)
}
