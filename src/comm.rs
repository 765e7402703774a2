/// Notification transport helpers: NDJSON serial output and BLE GATT
/// notifications (Nordic UART service layout).
///
/// Records leave the detector as plain data. This module turns them into
/// NDJSON lines and, for BLE, into fixed-size notification chunks. Commands
/// arrive as NDJSON lines over either transport.
use crate::detector::{Detector, DetectorConfig};
use crate::protocol::{DeviceMessage, HostCommand, MsgBuffer, RawCommand, MAX_MSG_LEN};

/// Nordic UART service UUID, advertised in the scan response so
/// companions can filter on it. The GATT attribute macros in the firmware
/// take their own literals.
pub const UART_SERVICE_UUID: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";

/// BLE advertising name
pub const BLE_ADV_NAME: &str = "FlockDetector";

/// Maximum BLE notification payload (default ATT MTU - 3)
pub const BLE_MAX_NOTIFY: usize = 20;

/// Delay between consecutive BLE notification chunks (ms)
pub const BLE_CHUNK_DELAY_MS: u64 = 10;

/// Anything that can deliver a serialized record to the companion.
pub trait NotificationSink {
    /// Deliver one complete NDJSON line. Returns `false` if it was dropped.
    fn send_line(&mut self, line: &[u8]) -> bool;

    fn send(&mut self, msg: &DeviceMessage) -> bool {
        match encode_message(msg) {
            Some(line) => self.send_line(&line),
            None => false,
        }
    }
}

// ── Serialization helpers ──────────────────────────────────────────────

/// Serialize a message into `buf` followed by a newline.
/// Returns the number of bytes written, or `None` if it did not fit.
pub fn serialize_message(msg: &DeviceMessage, buf: &mut [u8]) -> Option<usize> {
    let len = serde_json_core::to_slice(msg, buf).ok()?;
    let newline = buf.get_mut(len)?;
    *newline = b'\n';
    Some(len + 1)
}

/// Serialize a message into an owned NDJSON line.
pub fn encode_message(msg: &DeviceMessage) -> Option<MsgBuffer> {
    let mut buf = [0u8; MAX_MSG_LEN];
    let Some(len) = serialize_message(msg, &mut buf) else {
        log::warn!("message dropped: exceeds {} bytes", MAX_MSG_LEN);
        return None;
    };
    MsgBuffer::from_slice(&buf[..len]).ok()
}

/// Split a line into BLE notification payloads. The last chunk is padded
/// with `\n`, which the companion treats as a line terminator.
pub fn notify_chunks(data: &[u8]) -> impl Iterator<Item = [u8; BLE_MAX_NOTIFY]> + '_ {
    data.chunks(BLE_MAX_NOTIFY).map(|chunk| {
        let mut out = [b'\n'; BLE_MAX_NOTIFY];
        out[..chunk.len()].copy_from_slice(chunk);
        out
    })
}

/// Parse a textual 128-bit UUID into over-the-air (little-endian) order.
pub fn uuid128_le(uuid: &str) -> Option<[u8; 16]> {
    let mut out = [0u8; 16];
    let mut digits = uuid.bytes().filter(|&b| b != b'-');
    for slot in out.iter_mut().rev() {
        let hi = (digits.next()? as char).to_digit(16)?;
        let lo = (digits.next()? as char).to_digit(16)?;
        *slot = (hi << 4 | lo) as u8;
    }
    if digits.next().is_some() {
        return None;
    }
    Some(out)
}

// ── Commands ───────────────────────────────────────────────────────────

/// Parse one command line, e.g. `{"cmd":"set_rssi","min_rssi":-75}`.
/// Unknown commands and malformed JSON yield `None`.
pub fn parse_command(data: &[u8]) -> Option<HostCommand> {
    let trimmed = data.trim_ascii();
    if trimmed.is_empty() {
        return None;
    }
    let (raw, _) = serde_json_core::from_slice::<RawCommand>(trimmed).ok()?;
    raw.into_command()
}

/// Apply a host command. Returns `true` when the caller should send a
/// status snapshot.
pub fn handle_command(cmd: HostCommand, detector: &mut Detector, scanning: &mut bool) -> bool {
    match cmd {
        HostCommand::Start => {
            *scanning = true;
            log::info!("scanning started by host command");
            false
        }
        HostCommand::Stop => {
            *scanning = false;
            log::info!("scanning stopped by host command");
            false
        }
        HostCommand::GetStatus => true,
        HostCommand::SetRssi { min_rssi } => {
            detector.set_min_rssi(min_rssi);
            log::info!("RSSI threshold set to {}", min_rssi);
            false
        }
        HostCommand::Reset => {
            detector.reset_session();
            false
        }
        HostCommand::SetProtocols { wifi, ble } => {
            let mut filter = detector.filter_config();
            filter.wifi_enabled = wifi.unwrap_or(filter.wifi_enabled);
            filter.ble_enabled = ble.unwrap_or(filter.ble_enabled);
            detector.set_filter_config(filter);
            log::info!(
                "matching: wifi={} ble={}",
                filter.wifi_enabled,
                filter.ble_enabled
            );
            false
        }
        HostCommand::SetTiming {
            debounce_ms,
            timeout_ms,
            heartbeat_ms,
        } => {
            let current = detector.config();
            let config = DetectorConfig {
                debounce_window_ms: debounce_ms.map_or(current.debounce_window_ms, u64::from),
                session_timeout_ms: timeout_ms.map_or(current.session_timeout_ms, u64::from),
                heartbeat_interval_ms: heartbeat_ms
                    .map_or(current.heartbeat_interval_ms, u64::from),
            };
            detector.set_config(config);
            log::info!(
                "timing: debounce={}ms timeout={}ms heartbeat={}ms",
                config.debounce_window_ms,
                config.session_timeout_ms,
                config.heartbeat_interval_ms
            );
            false
        }
    }
}

// ── Line reader ────────────────────────────────────────────────────────

/// Accumulates bytes from serial or BLE writes until a newline, then
/// yields the line.
pub struct LineReader {
    buf: [u8; MAX_MSG_LEN],
    pos: usize,
    overflowed: bool,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_MSG_LEN],
            pos: 0,
            overflowed: false,
        }
    }

    /// Feed one byte. Returns the complete line (without the terminator)
    /// when one ends. An overlong line is discarded up to its newline.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            let len = core::mem::take(&mut self.pos);
            if core::mem::take(&mut self.overflowed) || len == 0 {
                return None;
            }
            return Some(&self.buf[..len]);
        }
        if self.overflowed {
            return None;
        }
        match self.buf.get_mut(self.pos) {
            Some(slot) => {
                *slot = byte;
                self.pos += 1;
            }
            None => self.overflowed = true,
        }
        None
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}
