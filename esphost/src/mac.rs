//! MAC address conversion between the co-processor's textual form
//! (`"aa:bb:cc:dd:ee:ff"`) and the six raw bytes the host stack uses.

use heapless::String;

use crate::config::HWADDR_SIZE;

/// Length of a colon-separated MAC string
pub const MAC_STR_LEN: usize = 17;

/// MAC address as reported by the control service
pub type MacString = String<MAC_STR_LEN>;

/// Raw hardware address
pub type MacAddress = [u8; HWADDR_SIZE];

/// Parse a colon-separated MAC string.
///
/// Trailing NUL padding from fixed-size firmware fields is ignored.
/// Returns `None` unless the string holds exactly six hex octets.
pub fn parse_mac(text: &str) -> Option<MacAddress> {
    let text = text.trim_end_matches('\0').trim();
    let mut mac = [0u8; HWADDR_SIZE];
    let mut parts = text.split(':');

    for octet in mac.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        *octet = u8::from_str_radix(part, 16).ok()?;
    }

    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        assert_eq!(
            parse_mac("24:6f:28:0A:bc:01"),
            Some([0x24, 0x6f, 0x28, 0x0a, 0xbc, 0x01])
        );
    }

    #[test]
    fn test_parse_single_digit_octets() {
        assert_eq!(parse_mac("0:1:2:3:4:f"), Some([0, 1, 2, 3, 4, 0xf]));
    }

    #[test]
    fn test_parse_ignores_nul_padding() {
        assert_eq!(
            parse_mac("aa:bb:cc:dd:ee:ff\0\0"),
            Some([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff])
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(parse_mac(""), None);
        assert_eq!(parse_mac("aa:bb:cc:dd:ee"), None);
        assert_eq!(parse_mac("aa:bb:cc:dd:ee:ff:00"), None);
        assert_eq!(parse_mac("aa:bb:cc:dd:ee:gg"), None);
        assert_eq!(parse_mac("aa:bb::dd:ee:ff"), None);
        assert_eq!(parse_mac("aaa:bb:cc:dd:ee:ff"), None);
    }

    #[test]
    fn test_parse_rejects_sign_prefix() {
        assert_eq!(parse_mac("+a:bb:cc:dd:ee:ff"), None);
        assert_eq!(parse_mac("aa:bb:cc:dd:ee:-f"), None);
    }
}
