/// JSON message protocol between the detector and companion apps.
///
/// All messages are newline-delimited JSON (NDJSON) tagged by `type`.
/// Uses `heapless` types for no_std/no-alloc operation, so every record is
/// self-contained and carries no reference to transport buffers.
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

/// Milliseconds since boot.
pub type Timestamp = u64;

/// Maximum length for MAC address strings ("aa:bb:cc:dd:ee:ff")
pub type MacString = String<18>;

/// Maximum length for SSID / device name strings (32 bytes + slack)
pub type NameString = String<33>;

/// Maximum length for UUID strings
pub type UuidString = String<37>;

/// Matched pattern: keyword, OUI ("00:25:df") or a full service UUID
pub type PatternString = String<37>;

/// Service UUIDs retained per advertisement
pub const MAX_SERVICE_UUIDS: usize = 8;

/// Advertised service UUIDs, lowercase canonical form
pub type UuidList = Vec<UuidString, MAX_SERVICE_UUIDS>;

/// Vendor category a sighting resolves to.
///
/// Declaration order carries no meaning. Escalation uses the explicit
/// table in [`crate::lifecycle::ESCALATION_ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VendorCategory {
    None,
    FlockSafety,
    Axon,
    Raven,
    Ring,
    Cradlepoint,
    Drone,
    NestGoogle,
    Arlo,
    Eufy,
    Wyze,
    Blink,
    Aruba,
}

impl VendorCategory {
    /// Human-readable category name
    pub fn as_str(&self) -> &'static str {
        match self {
            VendorCategory::None => "None",
            VendorCategory::FlockSafety => "Flock Safety",
            VendorCategory::Axon => "Axon",
            VendorCategory::Raven => "Raven",
            VendorCategory::Ring => "Ring",
            VendorCategory::Cradlepoint => "Cradlepoint",
            VendorCategory::Drone => "Drone",
            VendorCategory::NestGoogle => "Nest/Google",
            VendorCategory::Arlo => "Arlo",
            VendorCategory::Eufy => "Eufy",
            VendorCategory::Wyze => "Wyze",
            VendorCategory::Blink => "Blink",
            VendorCategory::Aruba => "Aruba",
        }
    }

    pub fn is_none(&self) -> bool {
        *self == VendorCategory::None
    }
}

/// Radio the observation arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Protocol {
    #[serde(rename = "wifi")]
    WiFi,
    #[serde(rename = "bluetooth_le")]
    Ble,
}

/// Kind of frame an observation was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    ProbeRequest,
    Beacon,
    Advertisement,
}

/// Coarse trust label: how many independent signals agreed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    Highest,
    High,
    Medium,
}

/// RSSI band reported alongside the raw value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStrength {
    Strong,
    Medium,
    Weak,
}

impl SignalStrength {
    pub fn from_rssi(rssi: i32) -> Self {
        if rssi >= -50 {
            SignalStrength::Strong
        } else if rssi >= -70 {
            SignalStrength::Medium
        } else {
            SignalStrength::Weak
        }
    }
}

/// Which signature sources produced the detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    SsidAndMac,
    SsidPattern,
    NameAndMac,
    DeviceName,
    MacPrefix,
    RavenServiceUuid,
    /// Synthetic sighting from the board test button
    TestButton,
}

/// A single detection, handed to the notification collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionEvent {
    pub timestamp: Timestamp,
    pub protocol: Protocol,
    pub detection_method: DetectionMethod,
    pub device_category: VendorCategory,
    pub manufacturer: &'static str,
    pub mac_address: MacString,
    pub rssi: i32,
    pub signal_strength: SignalStrength,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_pattern: Option<PatternString>,
    pub confidence: Confidence,
    pub threat_score: u8,
    // WiFi
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssid: Option<NameString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_type: Option<FrameKind>,
    // BLE
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<NameString>,
    #[serde(skip_serializing_if = "is_empty_list")]
    pub service_uuids: UuidList,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raven_service: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raven_firmware: Option<&'static str>,
}

fn is_empty_list(list: &UuidList) -> bool {
    list.is_empty()
}

/// Per-kind counters exposed in the status snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DetectionCounts {
    /// Observations that reached the matcher
    pub observed: u32,
    /// WiFi detections emitted
    pub wifi: u32,
    /// BLE detections emitted
    pub ble: u32,
    /// Raven detections emitted (subset of `ble`)
    pub raven: u32,
    /// Sightings held back by the debounce cache
    pub suppressed: u32,
    /// Sessions started since boot
    pub sessions: u32,
}

/// On-demand status snapshot for the console / companion
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// Uptime in seconds
    pub uptime: u32,
    pub channel: u8,
    pub scanning: bool,
    pub active: bool,
    pub category: VendorCategory,
    pub last_rssi: i32,
    pub cache_size: u16,
    pub counts: DetectionCounts,
    pub board: &'static str,
    pub version: &'static str,
}

/// Messages sent from the device to the companion app
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DeviceMessage<'a> {
    #[serde(rename = "detection")]
    Detection(&'a DetectionEvent),
    /// Periodic "still detected" pulse while a session is active
    #[serde(rename = "heartbeat")]
    Heartbeat {
        message: &'static str,
        category: VendorCategory,
        rssi: i32,
        timestamp: Timestamp,
    },
    /// Session ended by timeout
    #[serde(rename = "out_of_range")]
    OutOfRange {
        message: &'static str,
        category: VendorCategory,
        timestamp: Timestamp,
    },
    #[serde(rename = "status")]
    Status(&'a StatusSnapshot),
}

/// Commands sent from the companion app or console to the device.
///
/// Deserialized via [`RawCommand`] in `comm::parse_command()` because
/// `serde_json_core` does not support internally tagged enums.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostCommand {
    /// Resume scanning
    Start,
    /// Pause scanning
    Stop,
    /// Request a status snapshot
    GetStatus,
    /// Update minimum RSSI threshold
    SetRssi { min_rssi: i8 },
    /// Drop the active session without waiting for the timeout
    Reset,
    /// Enable or disable matching per protocol. `None` keeps the current value.
    SetProtocols {
        wifi: Option<bool>,
        ble: Option<bool>,
    },
    /// Change engine timing (ms). `None` keeps the current value.
    SetTiming {
        debounce_ms: Option<u32>,
        timeout_ms: Option<u32>,
        heartbeat_ms: Option<u32>,
    },
}

/// Wire format for host commands, converted to [`HostCommand`] in
/// `comm::parse_command()`.
#[derive(Deserialize)]
pub(crate) struct RawCommand {
    pub cmd: String<16>,
    #[serde(default)]
    pub min_rssi: Option<i8>,
    #[serde(default)]
    pub wifi: Option<bool>,
    #[serde(default)]
    pub ble: Option<bool>,
    #[serde(default)]
    pub debounce_ms: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<u32>,
    #[serde(default)]
    pub heartbeat_ms: Option<u32>,
}

impl RawCommand {
    pub(crate) fn into_command(self) -> Option<HostCommand> {
        match self.cmd.as_str() {
            "start" => Some(HostCommand::Start),
            "stop" => Some(HostCommand::Stop),
            "status" => Some(HostCommand::GetStatus),
            "set_rssi" => self.min_rssi.map(|min_rssi| HostCommand::SetRssi { min_rssi }),
            "reset" => Some(HostCommand::Reset),
            "set_protocols" => {
                if self.wifi.is_none() && self.ble.is_none() {
                    return None;
                }
                Some(HostCommand::SetProtocols {
                    wifi: self.wifi,
                    ble: self.ble,
                })
            }
            "set_timing" => {
                let values = [self.debounce_ms, self.timeout_ms, self.heartbeat_ms];
                // At least one value, and zero is never a valid interval
                if values.iter().all(Option::is_none) || values.contains(&Some(0)) {
                    return None;
                }
                Some(HostCommand::SetTiming {
                    debounce_ms: self.debounce_ms,
                    timeout_ms: self.timeout_ms,
                    heartbeat_ms: self.heartbeat_ms,
                })
            }
            _ => None,
        }
    }
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 1024;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;

/// Copy `s` into a fixed-capacity string, dropping whole characters that
/// do not fit.
pub fn truncated<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Decode bytes as UTF-8, replacing each invalid sequence with U+FFFD,
/// and truncate to the capacity.
pub fn truncated_lossy<const N: usize>(bytes: &[u8]) -> String<N> {
    let mut out = String::new();
    for chunk in bytes.utf8_chunks() {
        let valid = chunk.valid().chars();
        let replacement = (!chunk.invalid().is_empty()).then_some(char::REPLACEMENT_CHARACTER);
        for c in valid.chain(replacement) {
            if out.push(c).is_err() {
                return out;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_json<'b>(msg: &DeviceMessage, buf: &'b mut [u8]) -> &'b str {
        let len = serde_json_core::to_slice(msg, buf).unwrap();
        core::str::from_utf8(&buf[..len]).unwrap()
    }

    fn sample_event() -> DetectionEvent {
        DetectionEvent {
            timestamp: 1234,
            protocol: Protocol::WiFi,
            detection_method: DetectionMethod::SsidPattern,
            device_category: VendorCategory::FlockSafety,
            manufacturer: "Unknown",
            mac_address: MacString::try_from("b4:1e:52:ab:cd:ef").unwrap(),
            rssi: -45,
            signal_strength: SignalStrength::from_rssi(-45),
            matched_pattern: Some(PatternString::try_from("flock").unwrap()),
            confidence: Confidence::Medium,
            threat_score: 75,
            ssid: Some(NameString::try_from("Flock-A1B2C3").unwrap()),
            channel: Some(6),
            frame_type: Some(FrameKind::Beacon),
            device_name: None,
            service_uuids: UuidList::new(),
            raven_service: None,
            raven_firmware: None,
        }
    }

    #[test]
    fn signal_strength_bands() {
        assert_eq!(SignalStrength::from_rssi(-30), SignalStrength::Strong);
        assert_eq!(SignalStrength::from_rssi(-50), SignalStrength::Strong);
        assert_eq!(SignalStrength::from_rssi(-51), SignalStrength::Medium);
        assert_eq!(SignalStrength::from_rssi(-70), SignalStrength::Medium);
        assert_eq!(SignalStrength::from_rssi(-71), SignalStrength::Weak);
    }

    #[test]
    fn serialize_wifi_detection() {
        let event = sample_event();
        let mut buf = [0u8; MAX_MSG_LEN];
        let json = to_json(&DeviceMessage::Detection(&event), &mut buf);
        assert!(json.starts_with(r#"{"type":"detection""#));
        assert!(json.contains(r#""protocol":"wifi""#));
        assert!(json.contains(r#""device_category":"FLOCK_SAFETY""#));
        assert!(json.contains(r#""signal_strength":"STRONG""#));
        assert!(json.contains(r#""ssid":"Flock-A1B2C3""#));
        assert!(json.contains(r#""frame_type":"beacon""#));
        assert!(json.contains(r#""confidence":"MEDIUM""#));
        assert!(json.contains(r#""threat_score":75"#));
        // BLE-only fields are omitted
        assert!(!json.contains("device_name"));
        assert!(!json.contains("service_uuids"));
        assert!(!json.contains("raven"));
    }

    #[test]
    fn serialize_ble_detection_with_uuids() {
        let mut event = sample_event();
        event.protocol = Protocol::Ble;
        event.detection_method = DetectionMethod::RavenServiceUuid;
        event.device_category = VendorCategory::Raven;
        event.ssid = None;
        event.channel = None;
        event.frame_type = None;
        let _ = event
            .service_uuids
            .push(UuidString::try_from("00003100-0000-1000-8000-00805f9b34fb").unwrap());
        event.raven_firmware = Some("1.2.x");

        let mut buf = [0u8; MAX_MSG_LEN];
        let json = to_json(&DeviceMessage::Detection(&event), &mut buf);
        assert!(json.contains(r#""protocol":"bluetooth_le""#));
        assert!(json.contains(r#""detection_method":"raven_service_uuid""#));
        assert!(json.contains(r#""service_uuids":["00003100-0000-1000-8000-00805f9b34fb"]"#));
        assert!(json.contains(r#""raven_firmware":"1.2.x""#));
        assert!(!json.contains("ssid"));
    }

    #[test]
    fn serialize_heartbeat() {
        let msg = DeviceMessage::Heartbeat {
            message: "Still Detected",
            category: VendorCategory::Axon,
            rssi: -62,
            timestamp: 40_000,
        };
        let mut buf = [0u8; 256];
        let json = to_json(&msg, &mut buf);
        assert!(json.contains(r#""type":"heartbeat""#));
        assert!(json.contains(r#""rssi":-62"#));
        assert!(json.contains(r#""category":"AXON""#));
    }

    #[test]
    fn serialize_status() {
        let snapshot = StatusSnapshot {
            uptime: 120,
            channel: 6,
            scanning: true,
            active: false,
            category: VendorCategory::None,
            last_rssi: -100,
            cache_size: 3,
            counts: DetectionCounts::default(),
            board: "test_board",
            version: "0.1.0",
        };
        let mut buf = [0u8; 512];
        let json = to_json(&DeviceMessage::Status(&snapshot), &mut buf);
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""uptime":120"#));
        assert!(json.contains(r#""category":"NONE""#));
        assert!(json.contains(r#""cache_size":3"#));
        assert!(json.contains(r#""suppressed":0"#));
    }

    #[test]
    fn truncated_respects_capacity_and_char_boundaries() {
        let s: String<4> = truncated("abcdef");
        assert_eq!(s.as_str(), "abcd");
        // 'é' is two bytes; the third char would overflow
        let s: String<4> = truncated("éée");
        assert_eq!(s.as_str(), "éé");
    }

    #[test]
    fn truncated_lossy_replaces_invalid_bytes() {
        let s: NameString = truncated_lossy(b"Flock-\xff1");
        assert_eq!(s.as_str(), "Flock-\u{FFFD}1");
        // Truncated sequence at the end
        let s: NameString = truncated_lossy(b"ab\xc3");
        assert_eq!(s.as_str(), "ab\u{FFFD}");
        let s: String<4> = truncated_lossy(b"abc\xff");
        assert_eq!(s.as_str(), "abc");
    }

    #[test]
    fn version_is_semver() {
        let parts: heapless::Vec<&str, 4> = VERSION.split('.').collect();
        assert_eq!(parts.len(), 3, "VERSION should be semver (major.minor.patch)");
        for part in &parts {
            assert!(part.parse::<u32>().is_ok(), "'{part}' is not a number");
        }
    }
}
