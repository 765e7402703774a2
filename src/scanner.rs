/// Frame field extraction and scan scheduling.
///
/// WiFi: raw 802.11 management frames (probe requests, beacons) are reduced
/// to transmitter address + SSID. BLE: advertisements are reduced to address,
/// RSSI, local name and service UUIDs, either from a stack that already
/// decoded them or from raw AD bytes via [`BleAdvParser`].
///
/// Everything here is pure and allocation-free so it can run inside the
/// radio driver's receive callback.
use core::fmt::Write;

use ieee80211::match_frames;
use ieee80211::mgmt_frame::{BeaconFrame, ProbeRequestFrame};

use crate::protocol::{
    truncated_lossy, FrameKind, NameString, Protocol, Timestamp, UuidList, UuidString,
};

/// WiFi channels to scan (2.4 GHz only)
pub const WIFI_CHANNELS: &[u8] = &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13];

/// Dwell time per channel before hopping
pub const CHANNEL_HOP_INTERVAL_MS: u64 = 500;

/// Time between BLE scan cycle starts
pub const BLE_SCAN_INTERVAL_MS: u64 = 5_000;

/// Length of one BLE scan cycle
pub const BLE_SCAN_DURATION_MS: u64 = 1_000;

/// Longest SSID the standard allows
pub const MAX_SSID_LEN: usize = 32;

const ELEMENT_ID_SSID: u8 = 0;

/// A single parsed sighting, consumed immediately by the detector.
#[derive(Debug, Clone)]
pub struct Observation {
    pub protocol: Protocol,
    pub mac: [u8; 6],
    pub rssi: i32,
    /// SSID (WiFi) or local name (BLE)
    pub name: Option<NameString>,
    /// Advertised service UUIDs (BLE only, empty if none)
    pub service_uuids: UuidList,
    pub frame_kind: FrameKind,
    /// WiFi channel the frame was heard on, 0 for BLE
    pub channel: u8,
}

/// Parse a raw 802.11 frame into an [`Observation`].
///
/// Returns `None` for anything other than a probe request or beacon, and for
/// frames shorter than the header plus the subtype's fixed fields. A frame
/// that passes those checks always yields its transmitter address, even when
/// the SSID element is missing or malformed.
pub fn parse_wifi_frame(frame: &[u8], rssi: i32, channel: u8) -> Option<Observation> {
    let result = match_frames! { frame,
        beacon = BeaconFrame<'_> => {
            (
                beacon.header.transmitter_address.0,
                parse_ssid_element(beacon.body.elements.bytes),
                FrameKind::Beacon,
            )
        }
        probe_req = ProbeRequestFrame<'_> => {
            (
                probe_req.header.transmitter_address.0,
                parse_ssid_element(probe_req.body.elements.bytes),
                FrameKind::ProbeRequest,
            )
        }
    };

    let (mac, name, frame_kind) = result.ok()?;
    Some(Observation {
        protocol: Protocol::WiFi,
        mac,
        rssi,
        name,
        service_uuids: UuidList::new(),
        frame_kind,
        channel,
    })
}

/// Extract the SSID from the first information element.
///
/// `elements` is the tagged-parameter region of the frame. The first element
/// must be the SSID (tag 0) with a declared length of at most 32 that fits
/// in the remaining bytes; anything else yields `None`. A zero-length SSID
/// (hidden network) yields an empty string. Bytes that are not valid UTF-8
/// become U+FFFD so the readable part of the SSID still reaches matching.
pub fn parse_ssid_element(elements: &[u8]) -> Option<NameString> {
    let (&tag, rest) = elements.split_first()?;
    let (&len, body) = rest.split_first()?;
    let len = len as usize;
    if tag != ELEMENT_ID_SSID || len > MAX_SSID_LEN || len > body.len() {
        return None;
    }
    Some(truncated_lossy(&body[..len]))
}

/// A BLE advertisement as delivered by the BLE stack.
#[derive(Debug, Clone)]
pub struct BleAdvertisement {
    pub mac: [u8; 6],
    pub rssi: i32,
    pub name: Option<NameString>,
    pub service_uuids: UuidList,
}

impl BleAdvertisement {
    pub fn into_observation(self) -> Observation {
        Observation {
            protocol: Protocol::Ble,
            mac: self.mac,
            rssi: self.rssi,
            name: self.name,
            service_uuids: self.service_uuids,
            frame_kind: FrameKind::Advertisement,
            channel: 0,
        }
    }
}

/// Parse BLE advertisement data (AD structures) into a [`BleAdvertisement`].
///
/// AD structure format: [length] [type] [data...]
/// Types we care about:
///   0x02/0x03 = Incomplete/Complete list of 16-bit service UUIDs
///   0x06/0x07 = Incomplete/Complete list of 128-bit service UUIDs
///   0x08/0x09 = Shortened/Complete local name
///
/// Parsing stops at the first structure whose declared length overruns the
/// buffer. UUIDs beyond the list capacity are dropped.
pub struct BleAdvParser;

impl BleAdvParser {
    pub fn parse(addr: &[u8; 6], rssi: i32, ad_data: &[u8]) -> BleAdvertisement {
        let mut adv = BleAdvertisement {
            mac: *addr,
            rssi,
            name: None,
            service_uuids: UuidList::new(),
        };

        let mut pos = 0;
        while pos < ad_data.len() {
            let len = ad_data[pos] as usize;
            if len == 0 || pos + 1 + len > ad_data.len() {
                break;
            }

            let ad_type = ad_data[pos + 1];
            let data = &ad_data[pos + 2..pos + 1 + len];

            match ad_type {
                0x02 | 0x03 => {
                    for pair in data.chunks_exact(2) {
                        let short = u16::from_le_bytes([pair[0], pair[1]]);
                        let _ = adv.service_uuids.push(format_uuid16(short));
                    }
                }
                0x06 | 0x07 => {
                    for raw in data.chunks_exact(16) {
                        if let Ok(bytes) = <&[u8; 16]>::try_from(raw) {
                            let _ = adv.service_uuids.push(format_uuid128_le(bytes));
                        }
                    }
                }
                0x08 | 0x09 => {
                    // Complete name wins over a shortened one seen earlier
                    if adv.name.is_none() || ad_type == 0x09 {
                        adv.name = Some(truncated_lossy(data));
                    }
                }
                _ => {}
            }

            pos += 1 + len;
        }

        adv
    }
}

/// Expand a 16-bit UUID onto the Bluetooth base UUID.
pub fn format_uuid16(short: u16) -> UuidString {
    let mut s = UuidString::new();
    let _ = write!(s, "0000{:04x}-0000-1000-8000-00805f9b34fb", short);
    s
}

/// Format a 128-bit UUID given in over-the-air (little-endian) byte order.
pub fn format_uuid128_le(le: &[u8; 16]) -> UuidString {
    let mut be = *le;
    be.reverse();
    let mut s = UuidString::new();
    for (i, b) in be.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            let _ = s.push('-');
        }
        let _ = write!(s, "{:02x}", b);
    }
    s
}

/// Round-robin WiFi channel hopper, polled from the main loop.
#[derive(Debug, Clone)]
pub struct ChannelHopper {
    index: usize,
    last_hop: Timestamp,
    interval_ms: u64,
}

impl ChannelHopper {
    pub const fn new(interval_ms: u64) -> Self {
        Self {
            index: 0,
            last_hop: 0,
            interval_ms,
        }
    }

    /// Channel the radio should currently be tuned to
    pub fn current(&self) -> u8 {
        WIFI_CHANNELS[self.index]
    }

    /// Advance to the next channel if the dwell time has elapsed.
    /// Returns the new channel when a hop is due.
    pub fn poll(&mut self, now: Timestamp) -> Option<u8> {
        if now.saturating_sub(self.last_hop) < self.interval_ms {
            return None;
        }
        self.index = (self.index + 1) % WIFI_CHANNELS.len();
        self.last_hop = now;
        Some(self.current())
    }
}

impl Default for ChannelHopper {
    fn default() -> Self {
        Self::new(CHANNEL_HOP_INTERVAL_MS)
    }
}

/// Periodic BLE scan cycles. A new cycle never starts while one is running.
#[derive(Debug, Clone)]
pub struct BleScanScheduler {
    interval_ms: u64,
    last_start: Option<Timestamp>,
    running: bool,
}

impl BleScanScheduler {
    pub const fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_start: None,
            running: false,
        }
    }

    /// Claim the next scan cycle. Returns `true` if the caller should start
    /// scanning now; the caller must call [`finish`](Self::finish) when the
    /// cycle ends.
    pub fn try_start(&mut self, now: Timestamp) -> bool {
        if self.running {
            return false;
        }
        let due = match self.last_start {
            Some(last) => now.saturating_sub(last) >= self.interval_ms,
            None => true,
        };
        if due {
            self.running = true;
            self.last_start = Some(now);
        }
        due
    }

    pub fn finish(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl Default for BleScanScheduler {
    fn default() -> Self {
        Self::new(BLE_SCAN_INTERVAL_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TX: [u8; 6] = [0x00, 0x25, 0xDF, 0x11, 0x22, 0x33];
    const MAC_HEADER_LEN: usize = 24;
    /// Timestamp (8) + interval (2) + capability (2)
    const BEACON_FIXED_LEN: usize = 12;

    /// Build a management frame with the given frame-control byte,
    /// fixed-field length and tagged parameters.
    fn frame(fc: u8, fixed: usize, elements: &[u8]) -> heapless::Vec<u8, 256> {
        let mut f = heapless::Vec::new();
        let mut header = [0u8; MAC_HEADER_LEN];
        header[0] = fc;
        header[4..10].copy_from_slice(&[0xFF; 6]);
        header[10..16].copy_from_slice(&TX);
        f.extend_from_slice(&header).unwrap();
        for _ in 0..fixed {
            f.push(0).unwrap();
        }
        f.extend_from_slice(elements).unwrap();
        f
    }

    fn ssid_element(ssid: &[u8]) -> heapless::Vec<u8, 64> {
        let mut e = heapless::Vec::new();
        e.push(0).unwrap();
        e.push(ssid.len() as u8).unwrap();
        e.extend_from_slice(ssid).unwrap();
        e
    }

    #[test]
    fn probe_request_with_ssid() {
        let f = frame(0x40, 0, &ssid_element(b"Flock-A1B2C3"));
        let obs = parse_wifi_frame(&f, -60, 6).unwrap();
        assert_eq!(obs.protocol, Protocol::WiFi);
        assert_eq!(obs.frame_kind, FrameKind::ProbeRequest);
        assert_eq!(obs.mac, TX);
        assert_eq!(obs.name.as_deref(), Some("Flock-A1B2C3"));
        assert_eq!(obs.rssi, -60);
        assert_eq!(obs.channel, 6);
        assert!(obs.service_uuids.is_empty());
    }

    #[test]
    fn beacon_skips_fixed_fields() {
        let f = frame(0x80, BEACON_FIXED_LEN, &ssid_element(b"Penguin-1234567890"));
        let obs = parse_wifi_frame(&f, -70, 11).unwrap();
        assert_eq!(obs.frame_kind, FrameKind::Beacon);
        assert_eq!(obs.name.as_deref(), Some("Penguin-1234567890"));
    }

    #[test]
    fn hidden_ssid_is_empty_not_absent() {
        let f = frame(0x80, BEACON_FIXED_LEN, &[0, 0]);
        let obs = parse_wifi_frame(&f, -70, 1).unwrap();
        assert_eq!(obs.name.as_deref(), Some(""));
    }

    #[test]
    fn other_subtypes_are_not_applicable() {
        // Probe response (0x50), data frame (0x08), ACK (0xD4)
        for fc in [0x50u8, 0x08, 0xD4] {
            let f = frame(fc, BEACON_FIXED_LEN, &ssid_element(b"flock"));
            assert!(parse_wifi_frame(&f, -50, 1).is_none(), "fc {fc:#x}");
        }
    }

    #[test]
    fn short_frames_are_rejected() {
        assert!(parse_wifi_frame(&[], -50, 1).is_none());
        let f = frame(0x40, 0, &[]);
        assert!(parse_wifi_frame(&f[..MAC_HEADER_LEN - 1], -50, 1).is_none());
        // Beacon needs header + 12 fixed bytes
        let f = frame(0x80, BEACON_FIXED_LEN, &[]);
        assert!(parse_wifi_frame(&f[..MAC_HEADER_LEN + 11], -50, 1).is_none());
        // Exactly header + fixed: valid frame, no SSID
        let obs = parse_wifi_frame(&f, -50, 1).unwrap();
        assert!(obs.name.is_none());
        assert_eq!(obs.mac, TX);
    }

    #[test]
    fn oversized_declared_length_yields_no_ssid() {
        // 40-byte probe request whose SSID element claims 200 bytes
        let mut elements = [0x41u8; 16];
        elements[0] = 0;
        elements[1] = 200;
        let f = frame(0x40, 0, &elements);
        assert_eq!(f.len(), 40);
        let obs = parse_wifi_frame(&f, -50, 1).unwrap();
        assert!(obs.name.is_none());
        assert_eq!(obs.mac, TX);
    }

    #[test]
    fn declared_length_past_buffer_yields_no_ssid() {
        // Length 20 is legal for an SSID but only 5 bytes follow
        assert!(parse_ssid_element(&[0, 20, b'f', b'l', b'o', b'c', b'k']).is_none());
        // Exactly fitting is fine
        assert_eq!(
            parse_ssid_element(&[0, 5, b'f', b'l', b'o', b'c', b'k']).as_deref(),
            Some("flock")
        );
    }

    #[test]
    fn ssid_element_edge_cases() {
        assert!(parse_ssid_element(&[]).is_none());
        assert!(parse_ssid_element(&[0]).is_none());
        // First element is not the SSID
        assert!(parse_ssid_element(&[1, 2, 0x82, 0x84]).is_none());
        // 33 bytes declared, 33 present: still over the SSID limit
        let mut long = [b'a'; 35];
        long[0] = 0;
        long[1] = 33;
        assert!(parse_ssid_element(&long).is_none());
        // Invalid UTF-8 is replaced, not rejected
        assert_eq!(
            parse_ssid_element(&[0, 2, 0xFF, 0xFE]).as_deref(),
            Some("\u{FFFD}\u{FFFD}")
        );
        // Max length
        let mut max = [b'z'; 34];
        max[0] = 0;
        max[1] = 32;
        assert_eq!(parse_ssid_element(&max).unwrap().len(), 32);
    }

    #[test]
    fn ssid_with_stray_byte_keeps_readable_text() {
        let f = frame(0x40, 0, &ssid_element(b"Flock-\xff1"));
        let obs = parse_wifi_frame(&f, -60, 3).unwrap();
        let name = obs.name.unwrap();
        assert!(name.starts_with("Flock-"));
        assert!(name.ends_with('1'));
    }

    #[test]
    fn ble_name_with_invalid_utf8_is_kept() {
        let ad = [0x06, 0x09, b'R', b'a', b'v', 0xC3, b'n'];
        let adv = BleAdvParser::parse(&[0; 6], -40, &ad);
        assert_eq!(adv.name.as_deref(), Some("Rav\u{FFFD}n"));
    }

    #[test]
    fn ble_parser_extracts_name_and_uuids() {
        let addr = [0x58, 0x8E, 0x81, 0xAA, 0xBB, 0xCC];
        #[rustfmt::skip]
        let ad = [
            0x02, 0x01, 0x06,                   // Flags
            0x05, 0x03, 0x0A, 0x18, 0x00, 0x31, // Complete 16-bit UUIDs: 180a, 3100
            0x0F, 0x09, b'F', b'S', b' ', b'E', b'x', b't', b' ',
                        b'B', b'a', b't', b't', b'e', b'r', b'y',
        ];
        let adv = BleAdvParser::parse(&addr, -60, &ad);
        assert_eq!(adv.mac, addr);
        assert_eq!(adv.name.as_deref(), Some("FS Ext Battery"));
        assert_eq!(adv.service_uuids.len(), 2);
        assert_eq!(adv.service_uuids[0].as_str(), "0000180a-0000-1000-8000-00805f9b34fb");
        assert_eq!(adv.service_uuids[1].as_str(), "00003100-0000-1000-8000-00805f9b34fb");
    }

    #[test]
    fn ble_parser_128_bit_uuid_little_endian() {
        // 6e400001-b5a3-f393-e0a9-e50e24dcca9e over the air
        let mut ad = [0u8; 18];
        ad[0] = 17;
        ad[1] = 0x07;
        let be: [u8; 16] = [
            0x6E, 0x40, 0x00, 0x01, 0xB5, 0xA3, 0xF3, 0x93, 0xE0, 0xA9, 0xE5, 0x0E, 0x24, 0xDC,
            0xCA, 0x9E,
        ];
        for (i, b) in be.iter().rev().enumerate() {
            ad[2 + i] = *b;
        }
        let adv = BleAdvParser::parse(&[0; 6], -40, &ad);
        assert_eq!(adv.service_uuids[0].as_str(), "6e400001-b5a3-f393-e0a9-e50e24dcca9e");
    }

    #[test]
    fn ble_parser_stops_on_overrun() {
        // Second structure claims 10 bytes, only 2 remain
        let ad = [0x03, 0x03, 0x09, 0x18, 0x0A, 0x09, b'x', b'y'];
        let adv = BleAdvParser::parse(&[0; 6], -40, &ad);
        assert_eq!(adv.service_uuids.len(), 1);
        assert!(adv.name.is_none());
    }

    #[test]
    fn ble_parser_caps_uuid_list() {
        let mut ad = [0u8; 2 + 2 * 12];
        ad[0] = 1 + 2 * 12;
        ad[1] = 0x02;
        let adv = BleAdvParser::parse(&[0; 6], -40, &ad);
        assert_eq!(adv.service_uuids.len(), crate::protocol::MAX_SERVICE_UUIDS);
    }

    #[test]
    fn advertisement_into_observation() {
        let adv = BleAdvParser::parse(&[1, 2, 3, 4, 5, 6], -55, &[]);
        let obs = adv.into_observation();
        assert_eq!(obs.protocol, Protocol::Ble);
        assert_eq!(obs.frame_kind, FrameKind::Advertisement);
        assert_eq!(obs.channel, 0);
        assert!(obs.name.is_none());
    }

    #[test]
    fn channel_hopper_cycles_all_channels() {
        let mut hopper = ChannelHopper::new(500);
        assert_eq!(hopper.current(), 1);
        assert_eq!(hopper.poll(499), None);
        assert_eq!(hopper.poll(500), Some(2));
        assert_eq!(hopper.poll(700), None);
        let mut now = 500;
        for _ in 0..11 {
            now += 500;
            hopper.poll(now);
        }
        assert_eq!(hopper.current(), 13);
        now += 500;
        assert_eq!(hopper.poll(now), Some(1));
    }

    #[test]
    fn ble_scan_never_overlaps() {
        let mut sched = BleScanScheduler::new(5_000);
        assert!(sched.try_start(0));
        assert!(sched.is_running());
        // Still running long after the interval: no second cycle
        assert!(!sched.try_start(10_000));
        sched.finish();
        assert!(sched.try_start(10_000));
        sched.finish();
        assert!(!sched.try_start(14_999));
        assert!(sched.try_start(15_000));
    }
}
