/// The detection engine: matcher, debounce cache and session lifecycle
/// behind one owner.
///
/// Radio callbacks and the polling loop all go through [`SharedDetector`],
/// so cache lookup, cache update and session transition for one
/// observation happen inside a single critical section. The returned
/// records are plain data; callers send them after the lock is released.
use core::cell::RefCell;

use critical_section::Mutex;

use crate::board::BOARD_NAME;
use crate::debounce::{DebounceCache, DEBOUNCE_CAPACITY, DEFAULT_DEBOUNCE_WINDOW_MS};
use crate::filter::{categorize, format_mac, FilterConfig, MatchResult};
use crate::lifecycle::{
    DetectionLifecycle, LifecycleSignal, LifecycleState, SessionUpdate,
    DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_SESSION_TIMEOUT_MS,
};
use crate::protocol::{
    truncated, DetectionCounts, DetectionEvent, DetectionMethod, FrameKind, Protocol,
    SignalStrength, StatusSnapshot, Timestamp, UuidList, VendorCategory, VERSION,
};
use crate::scanner::Observation;

/// Address used for the simulated test-button sighting (Axon OUI)
pub const TEST_DEVICE_MAC: [u8; 6] = [0x00, 0x25, 0xDF, 0xAA, 0xBB, 0xCC];
pub const TEST_DEVICE_NAME: &str = "Axon Body 3";
pub const TEST_DEVICE_RSSI: i32 = -55;

/// Timing parameters for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorConfig {
    pub debounce_window_ms: u64,
    pub session_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl DetectorConfig {
    pub const fn new() -> Self {
        Self {
            debounce_window_ms: DEFAULT_DEBOUNCE_WINDOW_MS,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Detector {
    config: DetectorConfig,
    filter: FilterConfig,
    cache: DebounceCache<DEBOUNCE_CAPACITY>,
    lifecycle: DetectionLifecycle,
    counts: DetectionCounts,
}

impl Detector {
    pub const fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            filter: FilterConfig::new(),
            cache: DebounceCache::new(config.debounce_window_ms),
            lifecycle: DetectionLifecycle::new(
                config.session_timeout_ms,
                config.heartbeat_interval_ms,
            ),
            counts: DetectionCounts {
                observed: 0,
                wifi: 0,
                ble: 0,
                raven: 0,
                suppressed: 0,
                sessions: 0,
            },
        }
    }

    /// Run one observation through filter, matcher, debounce and lifecycle.
    ///
    /// Returns the detection record when the sighting is a new alert.
    pub fn process(&mut self, obs: &Observation, now: Timestamp) -> Option<DetectionEvent> {
        if !self.filter.admits(obs) {
            return None;
        }
        self.counts.observed = self.counts.observed.wrapping_add(1);

        let result = categorize(obs);
        if !result.is_detection() {
            return None;
        }

        if !self.cache.should_alert(&obs.mac, now) {
            self.counts.suppressed = self.counts.suppressed.wrapping_add(1);
            self.lifecycle.refresh(result.category, obs.rssi, now);
            log::debug!(
                "suppressed {} from {}",
                result.category.as_str(),
                format_mac(&obs.mac)
            );
            return None;
        }

        let method = result.method(obs.protocol);
        Some(self.emit(obs, &result, method, now))
    }

    /// Simulate an Axon body-camera sighting. Skips the debounce cache so
    /// every press is reported.
    pub fn inject_test_detection(&mut self, now: Timestamp) -> DetectionEvent {
        let obs = Observation {
            protocol: Protocol::Ble,
            mac: TEST_DEVICE_MAC,
            rssi: TEST_DEVICE_RSSI,
            name: Some(truncated(TEST_DEVICE_NAME)),
            service_uuids: UuidList::new(),
            frame_kind: FrameKind::Advertisement,
            channel: 0,
        };
        let result = categorize(&obs);
        log::info!("test button: simulating {}", result.category.as_str());
        self.emit(&obs, &result, DetectionMethod::TestButton, now)
    }

    fn emit(
        &mut self,
        obs: &Observation,
        result: &MatchResult,
        method: DetectionMethod,
        now: Timestamp,
    ) -> DetectionEvent {
        match self.lifecycle.record(result.category, obs.rssi, now) {
            SessionUpdate::Started => {
                self.counts.sessions = self.counts.sessions.wrapping_add(1);
                log::info!(
                    "session started: {} ({})",
                    result.category.as_str(),
                    result.manufacturer
                );
            }
            SessionUpdate::Upgraded { from, to } => {
                log::info!("session upgraded: {} -> {}", from.as_str(), to.as_str());
            }
            SessionUpdate::Refreshed | SessionUpdate::Ignored => {}
        }

        match obs.protocol {
            Protocol::WiFi => self.counts.wifi = self.counts.wifi.wrapping_add(1),
            Protocol::Ble => self.counts.ble = self.counts.ble.wrapping_add(1),
        }
        if result.raven.is_some() {
            self.counts.raven = self.counts.raven.wrapping_add(1);
        }

        build_event(obs, result, method, now)
    }

    /// Drive heartbeat and timeout.
    pub fn poll(&mut self, now: Timestamp) -> Option<LifecycleSignal> {
        self.lifecycle.poll(now)
    }

    pub fn status(&self, now: Timestamp, channel: u8, scanning: bool) -> StatusSnapshot {
        let (active, category) = match self.lifecycle.state() {
            LifecycleState::Active(c) => (true, c),
            LifecycleState::Idle => (false, VendorCategory::None),
        };
        StatusSnapshot {
            uptime: (now / 1000).min(u32::MAX as u64) as u32,
            channel,
            scanning,
            active,
            category,
            last_rssi: self.lifecycle.last_rssi(),
            cache_size: self.cache.len() as u16,
            counts: self.counts,
            board: BOARD_NAME,
            version: VERSION,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn counts(&self) -> DetectionCounts {
        self.counts
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn filter_config(&self) -> FilterConfig {
        self.filter
    }

    pub fn set_filter_config(&mut self, filter: FilterConfig) {
        self.filter = filter;
    }

    pub fn set_min_rssi(&mut self, min_rssi: i8) {
        self.filter.min_rssi = min_rssi;
    }

    pub fn config(&self) -> DetectorConfig {
        self.config
    }

    /// Apply new timing. Cache entries and the active session are kept and
    /// judged against the new values from the next observation or poll on.
    pub fn set_config(&mut self, config: DetectorConfig) {
        self.config = config;
        self.cache.set_window(config.debounce_window_ms);
        self.lifecycle
            .set_timing(config.session_timeout_ms, config.heartbeat_interval_ms);
    }

    /// Force the session back to idle. The debounce cache is kept.
    pub fn reset_session(&mut self) {
        if self.lifecycle.is_active() {
            log::info!("session reset");
        }
        self.lifecycle.reset();
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(DetectorConfig::new())
    }
}

/// Assemble the record for one detection. Protocol-specific fields are only
/// set for their protocol.
fn build_event(
    obs: &Observation,
    result: &MatchResult,
    method: DetectionMethod,
    now: Timestamp,
) -> DetectionEvent {
    let (ssid, channel, frame_type, device_name, service_uuids) = match obs.protocol {
        Protocol::WiFi => (
            obs.name.clone(),
            Some(obs.channel),
            Some(obs.frame_kind),
            None,
            UuidList::new(),
        ),
        Protocol::Ble => (
            None,
            None,
            None,
            obs.name.clone(),
            obs.service_uuids.clone(),
        ),
    };

    DetectionEvent {
        timestamp: now,
        protocol: obs.protocol,
        detection_method: method,
        device_category: result.category,
        manufacturer: result.manufacturer,
        mac_address: format_mac(&obs.mac),
        rssi: obs.rssi,
        signal_strength: SignalStrength::from_rssi(obs.rssi),
        matched_pattern: result.matched_pattern.clone(),
        confidence: result.confidence,
        threat_score: result.threat_score,
        ssid,
        channel,
        frame_type,
        device_name,
        service_uuids,
        raven_service: result.raven.as_ref().map(|r| r.description),
        raven_firmware: result.raven.as_ref().map(|r| r.firmware.as_str()),
    }
}

/// The detector behind a critical-section mutex, safe to reach from the
/// WiFi sniffer callback, the BLE scan task and the polling loop.
pub struct SharedDetector {
    inner: Mutex<RefCell<Detector>>,
}

impl SharedDetector {
    pub const fn new(config: DetectorConfig) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Detector::new(config))),
        }
    }

    /// Run `f` with exclusive access to the detector.
    pub fn with<R>(&self, f: impl FnOnce(&mut Detector) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }

    pub fn process(&self, obs: &Observation, now: Timestamp) -> Option<DetectionEvent> {
        self.with(|d| d.process(obs, now))
    }

    pub fn poll(&self, now: Timestamp) -> Option<LifecycleSignal> {
        self.with(|d| d.poll(now))
    }
}
