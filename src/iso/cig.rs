//! CIG/CIS manager parameter types and local validation
//!
//! The ISO controller itself is an external collaborator; this module
//! defines the parameter records passed to it and the validation applied
//! before any command leaves the client.

use heapless::Vec;

use crate::address::LeAddress;
use crate::constants::{MAX_CIG_ID, MAX_CIS};

/// Per-CIS parameters within a CIG configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CisParams {
    /// CIS id within the CIG
    pub cis_id: u8,
    /// Maximum SDU size, central to peripheral
    pub max_sdu_m_to_s: u16,
    /// Maximum SDU size, peripheral to central
    pub max_sdu_s_to_m: u16,
    /// PHY bitmask, central to peripheral
    pub phy_m_to_s: u8,
    /// PHY bitmask, peripheral to central
    pub phy_s_to_m: u8,
    /// Retransmission number, central to peripheral
    pub rtn_m_to_s: u8,
    /// Retransmission number, peripheral to central
    pub rtn_s_to_m: u8,
}

/// CIG configuration parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CigParams {
    /// CIG id; `0` configures a new CIG, values below `0xFF` reconfigure
    pub cig_id: u8,
    /// SDU interval in microseconds, central to peripheral
    pub sdu_interval_m_to_s: u32,
    /// SDU interval in microseconds, peripheral to central
    pub sdu_interval_s_to_m: u32,
    /// Maximum transport latency in milliseconds, central to peripheral
    pub max_transport_latency_m_to_s: u16,
    /// Maximum transport latency in milliseconds, peripheral to central
    pub max_transport_latency_s_to_m: u16,
    /// Worst-case sleep clock accuracy of the peripherals
    pub sca: u8,
    /// Sequential (0x00) or interleaved (0x01) CIS packing
    pub packing: u8,
    /// Unframed (0x00) or framed (0x01) SDUs
    pub framing: u8,
    /// One record per CIS in the CIG
    pub cis: Vec<CisParams, MAX_CIS>,
}

/// Per-CIS parameters within a CIG test configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CisTestParams {
    /// CIS id within the CIG
    pub cis_id: u8,
    /// Number of subevents
    pub nse: u8,
    /// Maximum SDU size, central to peripheral
    pub max_sdu_m_to_s: u16,
    /// Maximum SDU size, peripheral to central
    pub max_sdu_s_to_m: u16,
    /// Maximum PDU size, central to peripheral
    pub max_pdu_m_to_s: u16,
    /// Maximum PDU size, peripheral to central
    pub max_pdu_s_to_m: u16,
    /// PHY bitmask, central to peripheral
    pub phy_m_to_s: u8,
    /// PHY bitmask, peripheral to central
    pub phy_s_to_m: u8,
    /// Burst number, central to peripheral
    pub bn_m_to_s: u8,
    /// Burst number, peripheral to central
    pub bn_s_to_m: u8,
}

/// CIG test-mode configuration parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CigTestParams {
    /// CIG id; `0` configures a new CIG, values below `0xFF` reconfigure
    pub cig_id: u8,
    /// SDU interval in microseconds, central to peripheral
    pub sdu_interval_m_to_s: u32,
    /// SDU interval in microseconds, peripheral to central
    pub sdu_interval_s_to_m: u32,
    /// ISO interval in 1.25 ms units
    pub iso_interval: u16,
    /// Flush timeout, central to peripheral
    pub ft_m_to_s: u8,
    /// Flush timeout, peripheral to central
    pub ft_s_to_m: u8,
    /// Worst-case sleep clock accuracy of the peripherals
    pub sca: u8,
    /// Sequential (0x00) or interleaved (0x01) CIS packing
    pub packing: u8,
    /// Unframed (0x00) or framed (0x01) SDUs
    pub framing: u8,
    /// One record per CIS in the CIG
    pub cis: Vec<CisTestParams, MAX_CIS>,
}

/// Parameters for establishing one CIS at the link layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CisConnection {
    /// CIS id within the stream group's CIG
    pub cis_id: u8,
    /// CIS handle returned by the CIG configuration
    pub cis_handle: u16,
    /// Peer device the CIS connects to
    pub addr: LeAddress,
}

/// Whether a CIG configure/configure-test request may proceed: id `0`
/// creates a new CIG and any id below `0xFF` reconfigures an existing one;
/// everything else is rejected locally.
#[must_use]
pub const fn configure_cig_id_accepted(cig_id: u8) -> bool {
    cig_id == 0 || cig_id < 0xFF
}

/// Whether a CIG id may be passed to removal
#[must_use]
pub const fn remove_cig_id_accepted(cig_id: u8) -> bool {
    cig_id <= MAX_CIG_ID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_cig_id_bounds() {
        assert!(configure_cig_id_accepted(0x00));
        assert!(configure_cig_id_accepted(0x01));
        assert!(configure_cig_id_accepted(0xFE));
        assert!(!configure_cig_id_accepted(0xFF));
    }

    #[test]
    fn test_remove_cig_id_bounds() {
        assert!(remove_cig_id_accepted(0x00));
        assert!(remove_cig_id_accepted(0xEF));
        assert!(!remove_cig_id_accepted(0xF0));
        assert!(!remove_cig_id_accepted(0xFF));
    }
}
