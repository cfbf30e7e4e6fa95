//! Audio Stream Endpoint and Connected Isochronous Stream records
//!
//! An [`Ase`] is the per-direction stream endpoint exposed by the remote
//! ASCS server. A [`Cis`] is the link-layer transport a sink ASE and/or a
//! source ASE is bound to. The two sides of a bidirectional CIS share one
//! record; the ASE refers to it by `(cig_id, cis_id)` key, never by
//! reference, so tearing a CIS down only ever means resetting the handle
//! on the record itself.

use crate::constants::INVALID_CIS_HANDLE;
use crate::iso::data_path::CodecId;

/// Stream direction from the server's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AseDirection {
    /// Server is audio sink (client transmits)
    Sink = 0x01,
    /// Server is audio source (client receives)
    Source = 0x02,
}

/// Remote ASE state as reported through ASCS notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AseState {
    /// No configuration applied
    Idle = 0x00,
    /// Codec configured
    CodecConfigured = 0x01,
    /// QoS configured
    QosConfigured = 0x02,
    /// Enabling, waiting for receiver ready
    Enabling = 0x03,
    /// Audio streaming
    Streaming = 0x04,
    /// Disabling, waiting for receiver stop
    Disabling = 0x05,
    /// Releasing resources
    Releasing = 0x06,
}

/// Isochronous parameters applied to an ASE at QoS configuration.
///
/// Stored verbatim so a later CIS connect can read them back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IsoConfig {
    /// SDU interval in microseconds
    pub sdu_interval: u32,
    /// Framed (0x01) or unframed (0x00) SDUs
    pub framing: u8,
    /// PHY preference bitmask
    pub phy: u8,
    /// Maximum SDU size in octets
    pub sdu_size: u16,
    /// Retransmission number
    pub retransmission_number: u8,
    /// Maximum transport latency in milliseconds
    pub transport_latency: u16,
    /// Presentation delay in microseconds
    pub presentation_delay: u32,
}

/// A single Audio Stream Endpoint on a connection
#[derive(Debug, Clone)]
pub struct Ase {
    /// ASE id assigned by the remote server
    pub id: u8,
    /// Server-side direction of this endpoint
    pub direction: AseDirection,
    /// Last state reported by the server
    pub state: AseState,
    /// Codec applied by the latest codec configuration
    pub codec_id: Option<CodecId>,
    /// Isochronous configuration written at QoS configure time
    pub iso: IsoConfig,
    /// Key of the CIS this ASE is bound to, if any
    pub cis: Option<(u8, u8)>,
}

impl Ase {
    /// Create an idle ASE
    #[must_use]
    pub const fn new(id: u8, direction: AseDirection) -> Self {
        Self {
            id,
            direction,
            state: AseState::Idle,
            codec_id: None,
            iso: IsoConfig {
                sdu_interval: 0,
                framing: 0,
                phy: 0,
                sdu_size: 0,
                retransmission_number: 0,
                transport_latency: 0,
                presentation_delay: 0,
            },
            cis: None,
        }
    }
}

/// A Connected Isochronous Stream record, shared between the sink-side and
/// source-side ASE of a bidirectional CIS
#[derive(Debug, Clone)]
pub struct Cis {
    /// CIG this CIS belongs to
    pub cig_id: u8,
    /// CIS id within the CIG
    pub cis_id: u8,
    /// Link-layer handle, `INVALID_CIS_HANDLE` until connect completes
    pub handle: u16,
    /// Id of the sink-side ASE bound to this CIS
    pub sink_ase: Option<u8>,
    /// Id of the source-side ASE bound to this CIS
    pub source_ase: Option<u8>,
}

impl Cis {
    /// Create an unconnected CIS record
    #[must_use]
    pub const fn new(cig_id: u8, cis_id: u8) -> Self {
        Self {
            cig_id,
            cis_id,
            handle: INVALID_CIS_HANDLE,
            sink_ase: None,
            source_ase: None,
        }
    }

    /// True once the link layer has assigned a handle
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.handle != INVALID_CIS_HANDLE
    }

    /// Record the ASE bound to this CIS for the given direction
    pub fn bind(&mut self, direction: AseDirection, ase_id: u8) {
        match direction {
            AseDirection::Sink => self.sink_ase = Some(ase_id),
            AseDirection::Source => self.source_ase = Some(ase_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ase_starts_idle_and_unbound() {
        let ase = Ase::new(1, AseDirection::Sink);
        assert_eq!(ase.state, AseState::Idle);
        assert_eq!(ase.cis, None);
        assert_eq!(ase.iso, IsoConfig::default());
    }

    #[test]
    fn test_cis_starts_unconnected() {
        let cis = Cis::new(1, 2);
        assert!(!cis.is_connected());
        assert_eq!(cis.handle, INVALID_CIS_HANDLE);
        assert_eq!(cis.sink_ase, None);
        assert_eq!(cis.source_ase, None);
    }

    #[test]
    fn test_cis_bidirectional_binding() {
        let mut cis = Cis::new(1, 2);
        cis.bind(AseDirection::Sink, 3);
        cis.bind(AseDirection::Source, 4);
        assert_eq!(cis.sink_ase, Some(3));
        assert_eq!(cis.source_ase, Some(4));

        // rebinding the same direction replaces the previous ASE
        cis.bind(AseDirection::Sink, 5);
        assert_eq!(cis.sink_ase, Some(5));
        assert_eq!(cis.source_ase, Some(4));
    }
}
