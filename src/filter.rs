/// Signature matcher for WiFi and BLE observations.
///
/// One table-driven categorizer serves both protocols: OUI lookup, then a
/// name keyword pass that overrides the OUI category, then (BLE only) the
/// Raven UUID analyzer which overrides both. Confidence and threat score
/// depend on which sources fired, not on which category won.
use core::fmt::Write;

use crate::defaults::{OuiSignature, KEYWORD_SIGNATURES, OUI_SIGNATURES};
use crate::protocol::{
    truncated, Confidence, DetectionMethod, MacString, PatternString, Protocol, VendorCategory,
};
use crate::raven::{self, RavenMatch};
use crate::scanner::Observation;

/// Manufacturer reported when no OUI table matches
pub const UNKNOWN_MANUFACTURER: &str = "Unknown";

/// Runtime filter configuration. Allows the companion app to adjust
/// filtering without reflashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterConfig {
    /// Minimum RSSI threshold (dBm). Signals weaker than this are ignored.
    pub min_rssi: i8,
    /// Whether WiFi scanning is enabled
    pub wifi_enabled: bool,
    /// Whether BLE scanning is enabled
    pub ble_enabled: bool,
}

impl FilterConfig {
    pub const fn new() -> Self {
        Self {
            min_rssi: -100,
            wifi_enabled: true,
            ble_enabled: true,
        }
    }

    /// Whether an observation should reach the matcher at all
    pub fn admits(&self, obs: &Observation) -> bool {
        let enabled = match obs.protocol {
            Protocol::WiFi => self.wifi_enabled,
            Protocol::Ble => self.ble_enabled,
        };
        enabled && obs.rssi >= self.min_rssi as i32
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Classification of one observation
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub category: VendorCategory,
    pub manufacturer: &'static str,
    pub confidence: Confidence,
    pub threat_score: u8,
    pub matched_pattern: Option<PatternString>,
    /// The address prefix hit an OUI table
    pub oui_matched: bool,
    /// The SSID or name hit a keyword table
    pub text_matched: bool,
    pub raven: Option<RavenMatch>,
}

impl MatchResult {
    /// Whether this result should be treated as a detection
    pub fn is_detection(&self) -> bool {
        !self.category.is_none()
    }

    /// Which sources produced the detection, named per protocol
    pub fn method(&self, protocol: Protocol) -> DetectionMethod {
        if self.raven.is_some() {
            return DetectionMethod::RavenServiceUuid;
        }
        match (protocol, self.text_matched, self.oui_matched) {
            (Protocol::WiFi, true, true) => DetectionMethod::SsidAndMac,
            (Protocol::WiFi, true, false) => DetectionMethod::SsidPattern,
            (Protocol::Ble, true, true) => DetectionMethod::NameAndMac,
            (Protocol::Ble, true, false) => DetectionMethod::DeviceName,
            (_, false, _) => DetectionMethod::MacPrefix,
        }
    }
}

/// Classify one observation against the signature tables.
pub fn categorize(obs: &Observation) -> MatchResult {
    let oui = lookup_oui(&obs.mac);
    let text = obs.name.as_deref().and_then(lookup_keyword);

    let manufacturer = oui.map_or(UNKNOWN_MANUFACTURER, |sig| sig.manufacturer);

    // Text overrides the address prefix when both fire
    let category = match (text, oui) {
        (Some((category, _)), _) => category,
        (None, Some(sig)) => sig.category,
        (None, None) => VendorCategory::None,
    };

    let (confidence, mut threat_score) = match (oui.is_some(), text.is_some(), obs.protocol) {
        (true, true, _) => (Confidence::Highest, 100),
        (true, false, _) => (Confidence::High, 90),
        (false, true, Protocol::WiFi) => (Confidence::Medium, 75),
        (false, true, Protocol::Ble) => (Confidence::High, 85),
        (false, false, _) => (Confidence::Medium, 70),
    };
    if category == VendorCategory::Raven {
        threat_score = 100;
    }

    let matched_pattern = match (text, oui) {
        (Some((_, keyword)), _) => Some(truncated(keyword)),
        (None, Some(_)) => Some(format_oui(&obs.mac)),
        (None, None) => None,
    };

    let mut result = MatchResult {
        category,
        manufacturer,
        confidence,
        threat_score,
        matched_pattern,
        oui_matched: oui.is_some(),
        text_matched: text.is_some(),
        raven: None,
    };

    if obs.protocol == Protocol::Ble && !obs.service_uuids.is_empty() {
        if let Some(raven) = raven::analyze(&obs.service_uuids) {
            result.category = VendorCategory::Raven;
            result.confidence = Confidence::Highest;
            result.threat_score = 100;
            result.matched_pattern = Some(truncated(&raven.service_uuid));
            result.raven = Some(raven);
        }
    }

    result
}

/// First OUI table (in precedence order) containing the address prefix.
pub fn lookup_oui(mac: &[u8; 6]) -> Option<&'static OuiSignature> {
    let oui = [mac[0], mac[1], mac[2]];
    OUI_SIGNATURES
        .iter()
        .find(|sig| sig.prefixes.contains(&oui))
}

/// First keyword table (in precedence order) with a keyword contained in
/// `text`. Returns the category and the keyword that hit.
pub fn lookup_keyword(text: &str) -> Option<(VendorCategory, &'static str)> {
    if text.is_empty() {
        return None;
    }
    KEYWORD_SIGNATURES.iter().find_map(|sig| {
        sig.keywords
            .iter()
            .find(|kw| {
                if sig.word_start {
                    contains_word_ignore_ascii_case(text, kw)
                } else {
                    contains_ignore_ascii_case(text, kw)
                }
            })
            .map(|kw| (sig.category, *kw))
    })
}

/// ASCII case-insensitive substring test without allocating.
pub fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    let (h, n) = (haystack.as_bytes(), needle.as_bytes());
    if n.is_empty() {
        return true;
    }
    h.windows(n.len()).any(|w| w.eq_ignore_ascii_case(n))
}

/// Like [`contains_ignore_ascii_case`], but the match must start the
/// haystack or follow a non-alphanumeric byte.
pub fn contains_word_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    let (h, n) = (haystack.as_bytes(), needle.as_bytes());
    if n.is_empty() {
        return true;
    }
    h.windows(n.len()).enumerate().any(|(i, w)| {
        w.eq_ignore_ascii_case(n) && (i == 0 || !h[i - 1].is_ascii_alphanumeric())
    })
}

/// Format a 6-byte MAC address as "aa:bb:cc:dd:ee:ff"
pub fn format_mac(mac: &[u8; 6]) -> MacString {
    let mut buf = MacString::new();
    let _ = write!(
        buf,
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
    buf
}

/// Format the OUI of a MAC address as "aa:bb:cc"
pub fn format_oui(mac: &[u8; 6]) -> PatternString {
    let mut buf = PatternString::new();
    let _ = write!(buf, "{:02x}:{:02x}:{:02x}", mac[0], mac[1], mac[2]);
    buf
}
