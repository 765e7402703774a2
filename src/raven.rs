/// Raven acoustic sensor detection from advertised BLE service UUIDs.
///
/// Matching is exact (case-insensitive) against [`RAVEN_SERVICES`]. The
/// firmware estimate is a heuristic over which service generations are
/// present; it has not been verified against the devices' protocol.
use crate::defaults::{
    RavenService, RAVEN_GPS_SERVICE, RAVEN_OLD_LOCATION_SERVICE, RAVEN_POWER_SERVICE,
    RAVEN_SERVICES,
};
use crate::protocol::UuidString;

/// Estimated firmware generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareEstimate {
    Legacy,
    V1_2,
    Latest,
    Unknown,
}

impl FirmwareEstimate {
    pub fn as_str(&self) -> &'static str {
        match self {
            FirmwareEstimate::Legacy => "1.1.x (legacy)",
            FirmwareEstimate::V1_2 => "1.2.x",
            FirmwareEstimate::Latest => "1.3.x (latest)",
            FirmwareEstimate::Unknown => "unknown version",
        }
    }
}

/// Result of a positive Raven match
#[derive(Debug, Clone)]
pub struct RavenMatch {
    /// First advertised UUID that matched, lowercase
    pub service_uuid: UuidString,
    pub description: &'static str,
    pub firmware: FirmwareEstimate,
}

/// Look up a single UUID in the Raven service table.
pub fn lookup_service(uuid: &str) -> Option<&'static RavenService> {
    RAVEN_SERVICES
        .iter()
        .find(|svc| svc.uuid.eq_ignore_ascii_case(uuid))
}

/// Check advertised UUIDs for any known Raven service.
pub fn analyze(uuids: &[UuidString]) -> Option<RavenMatch> {
    let (uuid, svc) = uuids
        .iter()
        .find_map(|u| lookup_service(u).map(|svc| (u, svc)))?;

    let mut service_uuid = UuidString::new();
    for c in uuid.chars() {
        let _ = service_uuid.push(c.to_ascii_lowercase());
    }

    Some(RavenMatch {
        service_uuid,
        description: svc.description,
        firmware: estimate_firmware(uuids),
    })
}

/// Guess the firmware generation from service presence.
pub fn estimate_firmware(uuids: &[UuidString]) -> FirmwareEstimate {
    let has = |target: &str| uuids.iter().any(|u| u.eq_ignore_ascii_case(target));
    let new_gps = has(RAVEN_GPS_SERVICE);
    let old_location = has(RAVEN_OLD_LOCATION_SERVICE);
    let power = has(RAVEN_POWER_SERVICE);

    match (old_location, new_gps, power) {
        (true, false, _) => FirmwareEstimate::Legacy,
        (_, true, false) => FirmwareEstimate::V1_2,
        (_, true, true) => FirmwareEstimate::Latest,
        _ => FirmwareEstimate::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::{RAVEN_DEVICE_INFO_SERVICE, RAVEN_OLD_HEALTH_SERVICE};

    fn uuids(list: &[&str]) -> heapless::Vec<UuidString, 8> {
        list.iter()
            .map(|s| UuidString::try_from(*s).unwrap())
            .collect()
    }

    #[test]
    fn device_info_plus_gps_is_1_2() {
        let set = uuids(&[RAVEN_DEVICE_INFO_SERVICE, RAVEN_GPS_SERVICE]);
        assert_eq!(estimate_firmware(&set), FirmwareEstimate::V1_2);
        let m = analyze(&set).unwrap();
        assert_eq!(m.firmware.as_str(), "1.2.x");
        assert_eq!(m.service_uuid.as_str(), RAVEN_DEVICE_INFO_SERVICE);
    }

    #[test]
    fn gps_and_power_is_latest() {
        let set = uuids(&[RAVEN_GPS_SERVICE, RAVEN_POWER_SERVICE]);
        assert_eq!(estimate_firmware(&set), FirmwareEstimate::Latest);
    }

    #[test]
    fn old_location_without_gps_is_legacy() {
        let set = uuids(&[RAVEN_OLD_HEALTH_SERVICE, RAVEN_OLD_LOCATION_SERVICE]);
        assert_eq!(estimate_firmware(&set), FirmwareEstimate::Legacy);
        assert_eq!(analyze(&set).unwrap().description, "Health/Temperature Service (Legacy)");
    }

    #[test]
    fn old_location_with_gps_follows_gps_rules() {
        let set = uuids(&[RAVEN_OLD_LOCATION_SERVICE, RAVEN_GPS_SERVICE]);
        assert_eq!(estimate_firmware(&set), FirmwareEstimate::V1_2);
    }

    #[test]
    fn device_info_alone_is_unknown_version() {
        let set = uuids(&[RAVEN_DEVICE_INFO_SERVICE]);
        assert!(analyze(&set).is_some());
        assert_eq!(estimate_firmware(&set).as_str(), "unknown version");
    }

    #[test]
    fn match_is_case_insensitive_and_reported_lowercase() {
        let set = uuids(&["00003100-0000-1000-8000-00805F9B34FB"]);
        let m = analyze(&set).unwrap();
        assert_eq!(m.service_uuid.as_str(), RAVEN_GPS_SERVICE);
        assert_eq!(m.description, "GPS Location Service (Lat/Lon/Alt)");
    }

    #[test]
    fn partial_or_unknown_uuids_do_not_match() {
        let set = uuids(&[
            "00003100-0000-1000-8000-00805f9b34f",
            "0000feaa-0000-1000-8000-00805f9b34fb",
            "3100",
        ]);
        assert!(analyze(&set).is_none());
        assert!(analyze(&[]).is_none());
    }
}
