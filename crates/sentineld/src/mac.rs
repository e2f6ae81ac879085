//! MAC address normalization and validation for neighbor table entries.
//!
//! Neighbor tables print MACs in several shapes (`0:11:22:3:44:55` on BSD,
//! `00-11-22-33-44-55` elsewhere). Everything entering the device store is
//! rewritten to the canonical `xx:xx:xx:xx:xx:xx` form first.

/// Length of a canonical MAC string
pub const CANONICAL_MAC_LEN: usize = 17;

/// All-zero MAC (unresolved entries)
pub const ZERO_MAC: &str = "00:00:00:00:00:00";

/// Broadcast MAC
pub const BROADCAST_MAC: &str = "ff:ff:ff:ff:ff:ff";

/// First-octet prefixes of multicast MACs (IPv4 `01:00:5e`, IPv6 `33:33`)
const MULTICAST_PREFIXES: [&str; 2] = ["01:", "33:"];

/// Converts a MAC to lowercase, colon-separated, zero-padded form.
///
/// Inputs that do not split into six groups are only lowercased and have
/// their hyphens replaced; [`is_invalid_mac`] rejects them afterwards.
///
/// ```
/// use sentineld::mac::normalize_mac;
///
/// assert_eq!(normalize_mac("0:1B:2c:3:44:5"), "00:1b:2c:03:44:05");
/// assert_eq!(normalize_mac("AA-BB-CC-DD-EE-FF"), "aa:bb:cc:dd:ee:ff");
/// ```
pub fn normalize_mac(raw: &str) -> String {
    let lowered = raw.to_ascii_lowercase().replace('-', ":");

    let parts: Vec<&str> = lowered.split(':').collect();
    if parts.len() != 6 {
        return lowered;
    }

    parts
        .iter()
        .map(|part| {
            if part.len() == 1 {
                format!("0{}", part)
            } else {
                (*part).to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(":")
}

/// Returns true if a normalized MAC must not enter the device store.
///
/// Rejects anything that is not six two-digit hex octets, the all-zero and
/// broadcast addresses, and the `01:`/`33:` multicast classes.
pub fn is_invalid_mac(mac: &str) -> bool {
    if mac.len() != CANONICAL_MAC_LEN || !is_canonical_shape(mac) {
        return true;
    }

    if mac == ZERO_MAC || mac == BROADCAST_MAC {
        return true;
    }

    MULTICAST_PREFIXES
        .iter()
        .any(|prefix| mac.starts_with(prefix))
}

/// Normalizes and validates in one step.
pub fn parse_mac(raw: &str) -> Option<String> {
    let mac = normalize_mac(raw);
    if is_invalid_mac(&mac) { None } else { Some(mac) }
}

fn is_canonical_shape(mac: &str) -> bool {
    let octets: Vec<&str> = mac.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.bytes().all(|b| b.is_ascii_hexdigit()))
}
