/// Detection session state machine.
///
/// `Idle` until the first admitted detection, then `Active(category)` until
/// no qualifying sighting has arrived for the timeout. The category only
/// escalates while active. Escalation uses [`ESCALATION_ORDER`], which is
/// independent of the match precedence in `defaults` and of the declaration
/// order of [`VendorCategory`].
use crate::protocol::{DeviceMessage, Timestamp, VendorCategory};

pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 10_000;

/// RSSI reported before any sighting has been recorded
pub const NO_SIGNAL_RSSI: i32 = -100;

/// Severity ranking, lowest first.
pub const ESCALATION_ORDER: [VendorCategory; 13] = [
    VendorCategory::None,
    VendorCategory::Blink,
    VendorCategory::Wyze,
    VendorCategory::Eufy,
    VendorCategory::Arlo,
    VendorCategory::NestGoogle,
    VendorCategory::Aruba,
    VendorCategory::Drone,
    VendorCategory::Cradlepoint,
    VendorCategory::Ring,
    VendorCategory::FlockSafety,
    VendorCategory::Axon,
    VendorCategory::Raven,
];

/// Position of `category` in [`ESCALATION_ORDER`]
pub fn rank(category: VendorCategory) -> usize {
    ESCALATION_ORDER
        .iter()
        .position(|c| *c == category)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Active(VendorCategory),
}

/// Outcome of recording a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionUpdate {
    Started,
    Upgraded {
        from: VendorCategory,
        to: VendorCategory,
    },
    /// Same or lower rank; timestamps refreshed only
    Refreshed,
    /// `None` category, nothing recorded
    Ignored,
}

/// Time-driven output of [`DetectionLifecycle::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    Heartbeat {
        rssi: i32,
        category: VendorCategory,
        timestamp: Timestamp,
    },
    OutOfRange {
        category: VendorCategory,
        timestamp: Timestamp,
    },
}

impl LifecycleSignal {
    pub fn to_message(&self) -> DeviceMessage<'static> {
        match *self {
            LifecycleSignal::Heartbeat {
                rssi,
                category,
                timestamp,
            } => DeviceMessage::Heartbeat {
                message: "Device still in range",
                category,
                rssi,
                timestamp,
            },
            LifecycleSignal::OutOfRange {
                category,
                timestamp,
            } => DeviceMessage::OutOfRange {
                message: "Device out of range - stopping heartbeat",
                category,
                timestamp,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionSession {
    pub category: VendorCategory,
    pub started: Timestamp,
    pub last_detection: Timestamp,
    pub last_heartbeat: Timestamp,
    pub last_rssi: i32,
}

pub struct DetectionLifecycle {
    session: Option<DetectionSession>,
    /// Kept after the session ends for the status snapshot
    last_rssi: i32,
    timeout_ms: u64,
    heartbeat_ms: u64,
}

impl DetectionLifecycle {
    pub const fn new(timeout_ms: u64, heartbeat_ms: u64) -> Self {
        Self {
            session: None,
            last_rssi: NO_SIGNAL_RSSI,
            timeout_ms,
            heartbeat_ms,
        }
    }

    pub fn state(&self) -> LifecycleState {
        match &self.session {
            Some(s) => LifecycleState::Active(s.category),
            None => LifecycleState::Idle,
        }
    }

    pub fn session(&self) -> Option<&DetectionSession> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn last_rssi(&self) -> i32 {
        self.last_rssi
    }

    /// Record an admitted detection.
    pub fn record(&mut self, category: VendorCategory, rssi: i32, now: Timestamp) -> SessionUpdate {
        if category.is_none() {
            return SessionUpdate::Ignored;
        }
        self.last_rssi = rssi;

        let Some(session) = self.session.as_mut() else {
            self.session = Some(DetectionSession {
                category,
                started: now,
                last_detection: now,
                last_heartbeat: now,
                last_rssi: rssi,
            });
            return SessionUpdate::Started;
        };

        session.last_detection = now;
        session.last_rssi = rssi;
        if rank(category) > rank(session.category) {
            let from = session.category;
            session.category = category;
            SessionUpdate::Upgraded { from, to: category }
        } else {
            SessionUpdate::Refreshed
        }
    }

    /// Keep an active session alive on a debounced sighting.
    ///
    /// Never starts or upgrades a session. Returns whether a session was
    /// refreshed.
    pub fn refresh(&mut self, category: VendorCategory, rssi: i32, now: Timestamp) -> bool {
        if category.is_none() {
            return false;
        }
        match self.session.as_mut() {
            Some(session) => {
                session.last_detection = now;
                session.last_rssi = rssi;
                self.last_rssi = rssi;
                true
            }
            None => false,
        }
    }

    /// Advance time. Timeout is checked before heartbeat so an expired
    /// session never sends a final heartbeat.
    pub fn poll(&mut self, now: Timestamp) -> Option<LifecycleSignal> {
        let session = self.session.as_mut()?;

        if now.saturating_sub(session.last_detection) >= self.timeout_ms {
            let category = session.category;
            self.session = None;
            log::info!("{} out of range", category.as_str());
            return Some(LifecycleSignal::OutOfRange {
                category,
                timestamp: now,
            });
        }

        if now.saturating_sub(session.last_heartbeat) >= self.heartbeat_ms {
            session.last_heartbeat = now;
            return Some(LifecycleSignal::Heartbeat {
                rssi: session.last_rssi,
                category: session.category,
                timestamp: now,
            });
        }

        None
    }

    /// Drop any active session without emitting a signal.
    pub fn reset(&mut self) {
        self.session = None;
    }

    pub fn set_timing(&mut self, timeout_ms: u64, heartbeat_ms: u64) {
        self.timeout_ms = timeout_ms;
        self.heartbeat_ms = heartbeat_ms;
    }
}

impl Default for DetectionLifecycle {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TIMEOUT_MS, DEFAULT_HEARTBEAT_INTERVAL_MS)
    }
}
