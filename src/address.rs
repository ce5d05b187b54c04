use core::fmt;

use crate::av::AvError;

/// A remote device address (`BD_ADDR`).
///
/// The all-zero value doubles as the "no peer" sentinel: events without an
/// address carry it, and the active-peer protocol uses it to mean "no
/// active peer". [`PeerAddress::EMPTY`] never names a real device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, defmt::Format)]
pub struct PeerAddress(pub [u8; 6]);

impl PeerAddress {
    /// The "no peer" sentinel.
    pub const EMPTY: PeerAddress = PeerAddress([0u8; 6]);

    /// Wrap raw address bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// The raw address bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Whether this is the "no peer" sentinel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// The address as an owned `XX:XX:XX:XX:XX:XX` string, for snapshots
    /// and other places that need a value rather than a [`fmt::Display`].
    #[must_use]
    pub fn format_hex(&self) -> heapless::String<17> {
        let mut out = heapless::String::new();
        fmt::write(&mut out, format_args!("{self}")).ok();
        out
    }

    /// Parse a `XX:XX:XX:XX:XX:XX` string (case-insensitive).
    ///
    /// # Errors
    /// `AvError::InvalidParam` unless the string is exactly six
    /// colon-separated two-digit hex groups.
    pub fn from_hex(hex: &str) -> Result<Self, AvError> {
        let mut bytes = [0u8; 6];
        let mut groups = hex.split(':');
        for slot in &mut bytes {
            let group = groups.next().ok_or(AvError::InvalidParam)?;
            if group.len() != 2 {
                return Err(AvError::InvalidParam);
            }
            *slot = u8::from_str_radix(group, 16).map_err(|_| AvError::InvalidParam)?;
        }
        if groups.next().is_some() {
            return Err(AvError::InvalidParam);
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl From<[u8; 6]> for PeerAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&str> for PeerAddress {
    type Error = AvError;

    fn try_from(hex: &str) -> Result<Self, Self::Error> {
        PeerAddress::from_hex(hex)
    }
}

impl From<PeerAddress> for bt_hci::param::BdAddr {
    fn from(address: PeerAddress) -> Self {
        bt_hci::param::BdAddr::new(address.0)
    }
}

impl TryFrom<bt_hci::param::BdAddr> for PeerAddress {
    type Error = AvError;

    fn try_from(bd_addr: bt_hci::param::BdAddr) -> Result<Self, Self::Error> {
        let bytes: [u8; 6] = bd_addr
            .raw()
            .try_into()
            .map_err(|_| AvError::InvalidParam)?;
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: PeerAddress = PeerAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);

    #[test]
    fn test_empty_sentinel_is_all_zero() {
        assert!(PeerAddress::EMPTY.is_empty());
        assert_eq!(PeerAddress::EMPTY.as_bytes(), &[0u8; 6]);
        assert!(!A.is_empty());
        // The sentinel still formats like any address.
        assert_eq!(
            PeerAddress::EMPTY.format_hex().as_str(),
            "00:00:00:00:00:00"
        );
    }

    #[test]
    fn test_format_parse_round_trip() {
        let formatted = A.format_hex();
        assert_eq!(formatted.as_str(), "00:11:22:33:44:55");
        assert_eq!(PeerAddress::from_hex(formatted.as_str()).unwrap(), A);

        // Parsing is case-insensitive, formatting is upper-case.
        let mixed = PeerAddress::from_hex("ab:cD:Ef:01:23:45").unwrap();
        assert_eq!(mixed.format_hex().as_str(), "AB:CD:EF:01:23:45");
    }

    #[test]
    fn test_from_hex_rejects_malformed_strings() {
        // Too few groups, oversized group, bad digit, trailing group.
        assert!(PeerAddress::from_hex("00:11:22:33:44").is_err());
        assert!(PeerAddress::from_hex("001:1:22:33:44:55").is_err());
        assert!(PeerAddress::from_hex("00:11:22:33:44:5Z").is_err());
        assert!(PeerAddress::from_hex("00:11:22:33:44:55:66").is_err());
        assert!(PeerAddress::from_hex("").is_err());
    }

    #[test]
    fn test_str_conversion_matches_from_hex() {
        let parsed: PeerAddress = "00:11:22:33:44:55".try_into().unwrap();
        assert_eq!(parsed, A);
        assert!(PeerAddress::try_from("not an address").is_err());
    }

    #[test]
    fn test_bd_addr_round_trip() {
        let bd_addr: bt_hci::param::BdAddr = A.into();
        let back = PeerAddress::try_from(bd_addr).unwrap();
        assert_eq!(back, A);
    }
}
