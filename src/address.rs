use crate::BapStatus;

/// LE address type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, defmt::Format)]
#[repr(u8)]
pub enum AddressType {
    /// Public device address
    Public = 0x00,
    /// Random device address
    Random = 0x01,
}

/// A typed LE device address (`BD_ADDR` plus address type)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, defmt::Format)]
pub struct LeAddress {
    /// Raw 48-bit device address, little-endian byte order
    pub addr: [u8; 6],
    /// Public or random
    pub addr_type: AddressType,
}

impl LeAddress {
    /// Create a new typed LE address from raw bytes
    #[must_use]
    pub const fn new(addr: [u8; 6], addr_type: AddressType) -> Self {
        Self { addr, addr_type }
    }

    /// Create a public-typed address
    #[must_use]
    pub const fn public(addr: [u8; 6]) -> Self {
        Self::new(addr, AddressType::Public)
    }

    /// Get the raw address bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.addr
    }

    /// Format the address as a colon-separated hex string
    #[must_use]
    pub fn format_hex(&self) -> heapless::String<17> {
        let mut result = heapless::String::new();
        for (i, byte) in self.addr.iter().enumerate() {
            if i > 0 {
                result.push(':').ok();
            }
            let hex_chars = [
                '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F',
            ];
            result.push(hex_chars[(byte >> 4) as usize]).ok();
            result.push(hex_chars[(byte & 0x0F) as usize]).ok();
        }
        result
    }
}

impl From<LeAddress> for bt_hci::param::BdAddr {
    fn from(addr: LeAddress) -> Self {
        bt_hci::param::BdAddr::new(addr.addr)
    }
}

impl TryFrom<&[u8]> for LeAddress {
    type Error = BapStatus;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() == 6 {
            let mut addr = [0u8; 6];
            addr.copy_from_slice(bytes);
            Ok(LeAddress::public(addr))
        } else {
            Err(BapStatus::InvalidParameter)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_le_address_creation() {
        let addr = LeAddress::new([0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC], AddressType::Random);
        assert_eq!(addr.as_bytes(), &[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]);
        assert_eq!(addr.addr_type, AddressType::Random);
    }

    #[test]
    fn test_le_address_format_hex() {
        let addr = LeAddress::public([0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]);
        assert_eq!(addr.format_hex().as_str(), "12:34:56:78:9A:BC");

        let addr_zero = LeAddress::public([0x00; 6]);
        assert_eq!(addr_zero.format_hex().as_str(), "00:00:00:00:00:00");
    }

    #[test]
    fn test_le_address_conversions() {
        let bytes = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC];
        let addr = LeAddress::public(bytes);

        let bd_addr: bt_hci::param::BdAddr = addr.into();
        assert_eq!(bd_addr.raw(), bytes);

        let from_slice = LeAddress::try_from(&bytes[..]).unwrap();
        assert_eq!(from_slice.addr, bytes);
        assert_eq!(from_slice.addr_type, AddressType::Public);

        assert!(LeAddress::try_from(&bytes[..3]).is_err());
    }
}
