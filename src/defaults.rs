/// Signature database for surveillance device detection.
///
/// Three table families, each tagged with a [`VendorCategory`]:
/// - OUI prefixes (first three address bytes), searched in table order
/// - SSID / BLE name keywords (lowercase, case-insensitive substring)
/// - Raven acoustic sensor BLE service UUIDs
///
/// Table order is match precedence. It is independent of escalation rank,
/// which lives in `lifecycle`.
use crate::protocol::VendorCategory;

/// OUI prefixes belonging to one manufacturer.
#[derive(Debug)]
pub struct OuiSignature {
    pub category: VendorCategory,
    pub manufacturer: &'static str,
    pub prefixes: &'static [[u8; 3]],
}

/// Name keywords that identify one category.
#[derive(Debug)]
pub struct KeywordSignature {
    pub category: VendorCategory,
    /// Lowercase substrings
    pub keywords: &'static [&'static str],
    /// Keywords only match at the start of a word ("ring-" must not hit
    /// "MyString-5G")
    pub word_start: bool,
}

/// A known Raven BLE service.
#[derive(Debug)]
pub struct RavenService {
    /// Full 128-bit UUID, lowercase
    pub uuid: &'static str,
    pub description: &'static str,
}

/// OUI tables in match precedence order. First match wins.
///
/// Sources: flock-you firmware prefix list, DeFlock companion app category
/// tables, IEEE registry entries for the listed vendors.
pub static OUI_SIGNATURES: &[OuiSignature] = &[
    OuiSignature {
        category: VendorCategory::Axon,
        manufacturer: "Axon Enterprise",
        prefixes: &[[0x00, 0x25, 0xDF], [0x00, 0x13, 0x03]],
    },
    // Checked before Flock Safety: Cradlepoint modems ship inside camera cabinets
    OuiSignature {
        category: VendorCategory::Cradlepoint,
        manufacturer: "Cradlepoint",
        prefixes: &[[0x00, 0x30, 0x44], [0x00, 0xE0, 0x1C]],
    },
    OuiSignature {
        category: VendorCategory::Aruba,
        manufacturer: "Aruba Networks",
        prefixes: &[
            [0x00, 0x0B, 0x86],
            [0x00, 0x1A, 0x1E],
            [0x00, 0x24, 0x6C],
            [0x04, 0xBD, 0x88],
            [0x18, 0x64, 0x72],
            [0x20, 0x4C, 0x03],
            [0x24, 0xDE, 0xC6],
            [0x40, 0xE3, 0xD6],
            [0x6C, 0xF3, 0x7F],
            [0x70, 0x3A, 0x0E],
            [0x94, 0xB4, 0x0F],
            [0x9C, 0x1C, 0x12],
            [0xAC, 0xA3, 0x1E],
            [0xD8, 0xC7, 0xC8],
        ],
    },
    OuiSignature {
        category: VendorCategory::FlockSafety,
        manufacturer: "Flock Safety",
        prefixes: &[
            // FS Ext Battery devices
            [0x58, 0x8E, 0x81],
            [0xCC, 0xCC, 0xCC],
            [0xEC, 0x1B, 0xBD],
            [0x90, 0x35, 0xEA],
            [0x04, 0x0D, 0x84],
            [0xF0, 0x82, 0xC0],
            [0x1C, 0x34, 0xF1],
            [0x38, 0x5B, 0x44],
            [0x94, 0x34, 0x69],
            [0xB4, 0xE3, 0xF9],
            // Flock WiFi devices
            [0x70, 0xC9, 0x4E],
            [0x3C, 0x91, 0x80],
            [0xD8, 0xF3, 0xBC],
            [0x80, 0x30, 0x49],
            [0x14, 0x5A, 0xFC],
            [0x74, 0x4C, 0xA1],
            [0x08, 0x3A, 0x88],
            [0x9C, 0x2F, 0x9D],
            [0x94, 0x08, 0x53],
            [0xE4, 0xAA, 0xEA],
            [0xB4, 0x1E, 0x52],
        ],
    },
    OuiSignature {
        category: VendorCategory::Ring,
        manufacturer: "Ring",
        prefixes: &[
            [0x44, 0x61, 0x32],
            [0x74, 0xC6, 0x3B],
            [0x08, 0x62, 0x66],
            [0x18, 0xB7, 0x11],
            [0x34, 0xD2, 0x70],
            [0xB0, 0x4E, 0x26],
            [0x70, 0x56, 0x81],
            [0x50, 0xF5, 0xDA],
            [0xF0, 0xD7, 0xAA],
            [0x04, 0xD9, 0xF5],
            [0xD0, 0x52, 0xA8],
            [0x18, 0x7F, 0x88],
            [0x24, 0x2B, 0xD6],
            [0x34, 0x3E, 0xA4],
            [0x54, 0xE0, 0x19],
            [0x5C, 0x47, 0x5E],
            [0x64, 0x9A, 0x63],
            [0x90, 0x48, 0x6C],
            [0x9C, 0x76, 0x13],
            [0xAC, 0x9F, 0xC3],
            [0xC4, 0xDB, 0xAD],
            [0xCC, 0x3B, 0xFB],
        ],
    },
    OuiSignature {
        category: VendorCategory::Drone,
        manufacturer: "DJI",
        prefixes: &[
            [0x0C, 0x9A, 0xE6],
            [0x8C, 0x58, 0x23],
            [0x04, 0xA8, 0x5A],
            [0x58, 0xB8, 0x58],
            [0xE4, 0x7A, 0x2C],
            [0x60, 0x60, 0x1F],
            [0x48, 0x1C, 0xB9],
            [0x34, 0xD2, 0x62],
        ],
    },
    OuiSignature {
        category: VendorCategory::Drone,
        manufacturer: "Parrot",
        prefixes: &[
            [0x00, 0x12, 0x1C],
            [0x00, 0x26, 0x7E],
            [0x90, 0x03, 0xB7],
            [0x90, 0x3A, 0xE6],
            [0xA0, 0x14, 0x3D],
        ],
    },
    OuiSignature {
        category: VendorCategory::Drone,
        manufacturer: "Skydio",
        prefixes: &[[0x38, 0x1D, 0x14]],
    },
    OuiSignature {
        category: VendorCategory::NestGoogle,
        manufacturer: "Nest/Google",
        prefixes: &[
            [0x18, 0xB4, 0x30],
            [0x1C, 0xF2, 0x9A],
            [0x44, 0x07, 0x0B],
            [0x54, 0x60, 0x09],
            [0x64, 0x16, 0x66],
            [0x94, 0x94, 0x26],
            [0x98, 0xD2, 0x93],
            [0xAC, 0x0D, 0x1A],
            [0xD4, 0xA9, 0x28],
            [0xE8, 0xEB, 0x11],
            [0xF4, 0xF5, 0xD8],
            [0xF4, 0xF5, 0xE8],
        ],
    },
    OuiSignature {
        category: VendorCategory::Arlo,
        manufacturer: "Arlo",
        prefixes: &[
            [0x00, 0x1A, 0x3A],
            [0x20, 0xDF, 0xB9],
            [0x28, 0xB4, 0x66],
            [0x3C, 0x37, 0x86],
            [0x44, 0x6C, 0x24],
            [0x6C, 0xB0, 0xCE],
            [0x84, 0xD6, 0xD0],
            [0x9C, 0x53, 0x22],
            [0xA0, 0xC5, 0x89],
            [0xC4, 0x04, 0x15],
            [0xC4, 0x41, 0x1E],
        ],
    },
    OuiSignature {
        category: VendorCategory::Eufy,
        manufacturer: "Eufy (Anker)",
        prefixes: &[
            [0x10, 0xD7, 0xB0],
            [0x18, 0x3A, 0x2D],
            [0x1C, 0x1B, 0x68],
            [0x48, 0xA9, 0xD2],
            [0x60, 0xFD, 0xA8],
            [0x74, 0xFE, 0xCE],
            [0x78, 0x02, 0xB1],
            [0xA4, 0x3B, 0xFA],
            [0xAC, 0xC1, 0xEE],
            [0xD4, 0xA6, 0x51],
        ],
    },
    OuiSignature {
        category: VendorCategory::Wyze,
        manufacturer: "Wyze",
        prefixes: &[
            [0x2C, 0xAA, 0x8E],
            [0xD0, 0x3F, 0x27],
            [0x7C, 0x78, 0xB2],
            [0x8C, 0x4B, 0x14],
        ],
    },
    OuiSignature {
        category: VendorCategory::Blink,
        manufacturer: "Blink (Amazon)",
        prefixes: &[
            [0x18, 0xE7, 0x4A],
            [0x24, 0x62, 0xAB],
            [0x34, 0x4B, 0x50],
            [0x44, 0x91, 0x60],
            [0x68, 0x9C, 0x70],
            [0x74, 0x6F, 0xF7],
            [0xB4, 0x7C, 0x9C],
        ],
    },
];

/// Keyword tables in override precedence order. First match wins and
/// replaces the OUI category.
pub static KEYWORD_SIGNATURES: &[KeywordSignature] = &[
    KeywordSignature {
        category: VendorCategory::Raven,
        keywords: &["raven", "shotspotter", "soundthinking"],
        word_start: false,
    },
    KeywordSignature {
        category: VendorCategory::Axon,
        keywords: &["axon"],
        word_start: false,
    },
    KeywordSignature {
        category: VendorCategory::Ring,
        keywords: &["ring-", "ring setup", "ring doorbell", "ring cam"],
        word_start: true,
    },
    KeywordSignature {
        category: VendorCategory::Cradlepoint,
        keywords: &["cradlepoint", "ibr900", "ibr1700"],
        word_start: false,
    },
    KeywordSignature {
        category: VendorCategory::Aruba,
        keywords: &["aruba"],
        word_start: false,
    },
    KeywordSignature {
        category: VendorCategory::Drone,
        keywords: &["dji", "mavic", "phantom", "parrot", "anafi", "skydio", "tello"],
        word_start: false,
    },
    KeywordSignature {
        category: VendorCategory::NestGoogle,
        keywords: &["google nest", "nest cam", "nestcam", "nest doorbell"],
        word_start: true,
    },
    KeywordSignature {
        category: VendorCategory::Arlo,
        keywords: &["arlo"],
        word_start: false,
    },
    KeywordSignature {
        category: VendorCategory::Eufy,
        keywords: &["eufy"],
        word_start: false,
    },
    KeywordSignature {
        category: VendorCategory::Wyze,
        keywords: &["wyze"],
        word_start: false,
    },
    KeywordSignature {
        category: VendorCategory::Blink,
        keywords: &["blink"],
        word_start: false,
    },
    KeywordSignature {
        category: VendorCategory::FlockSafety,
        keywords: &["flock", "fs ext battery", "penguin", "pigvision", "falcon"],
        word_start: false,
    },
];

/// Device Information (all firmware generations)
pub const RAVEN_DEVICE_INFO_SERVICE: &str = "0000180a-0000-1000-8000-00805f9b34fb";
/// GPS location (1.2.0+)
pub const RAVEN_GPS_SERVICE: &str = "00003100-0000-1000-8000-00805f9b34fb";
/// Battery / solar (1.2.0+)
pub const RAVEN_POWER_SERVICE: &str = "00003200-0000-1000-8000-00805f9b34fb";
/// LTE / WiFi status (1.2.0+)
pub const RAVEN_NETWORK_SERVICE: &str = "00003300-0000-1000-8000-00805f9b34fb";
/// Upload statistics (1.2.0+)
pub const RAVEN_UPLOAD_SERVICE: &str = "00003400-0000-1000-8000-00805f9b34fb";
/// Error tracking (1.2.0+)
pub const RAVEN_ERROR_SERVICE: &str = "00003500-0000-1000-8000-00805f9b34fb";
/// Health thermometer (1.1.7)
pub const RAVEN_OLD_HEALTH_SERVICE: &str = "00001809-0000-1000-8000-00805f9b34fb";
/// Location and navigation (1.1.7)
pub const RAVEN_OLD_LOCATION_SERVICE: &str = "00001819-0000-1000-8000-00805f9b34fb";

/// Raven service UUIDs spanning firmware 1.1.7, 1.2.0 and 1.3.1.
pub static RAVEN_SERVICES: &[RavenService] = &[
    RavenService {
        uuid: RAVEN_DEVICE_INFO_SERVICE,
        description: "Device Information (Serial, Model, Firmware)",
    },
    RavenService {
        uuid: RAVEN_GPS_SERVICE,
        description: "GPS Location Service (Lat/Lon/Alt)",
    },
    RavenService {
        uuid: RAVEN_POWER_SERVICE,
        description: "Power Management (Battery/Solar)",
    },
    RavenService {
        uuid: RAVEN_NETWORK_SERVICE,
        description: "Network Status (LTE/WiFi)",
    },
    RavenService {
        uuid: RAVEN_UPLOAD_SERVICE,
        description: "Upload Statistics Service",
    },
    RavenService {
        uuid: RAVEN_ERROR_SERVICE,
        description: "Error/Failure Tracking Service",
    },
    RavenService {
        uuid: RAVEN_OLD_HEALTH_SERVICE,
        description: "Health/Temperature Service (Legacy)",
    },
    RavenService {
        uuid: RAVEN_OLD_LOCATION_SERVICE,
        description: "Location Service (Legacy)",
    },
];

/// Total OUI prefixes across all tables
pub fn oui_prefix_count() -> usize {
    OUI_SIGNATURES.iter().map(|s| s.prefixes.len()).sum()
}

/// Total keywords across all tables
pub fn keyword_count() -> usize {
    KEYWORD_SIGNATURES.iter().map(|s| s.keywords.len()).sum()
}
