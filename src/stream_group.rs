//! Stream-group state machine
//!
//! One stream group per connection (its id equals the connection's cid)
//! orchestrates the ASCS control-point procedure across the group's ASEs:
//! codec configure, QoS configure, enable, receiver ready, disable,
//! release, metadata update. A procedure is begun when the request's
//! control-point operation is issued and completes when every targeted ASE
//! has reported back through an ASCS notification; confirmations for the
//! same group arrive in issuance order, so one pending procedure at a time
//! is sufficient.

use heapless::Vec;

use crate::ase::{AseDirection, IsoConfig};
use crate::constants::{MAX_ASES, MAX_METADATA};
use crate::iso::data_path::{CodecConfiguration, CodecId};

/// Codec configuration request for a single ASE
#[derive(Debug, Clone)]
pub struct AseCodecParams {
    /// Target ASE id
    pub ase_id: u8,
    /// Server-side direction of the ASE
    pub direction: AseDirection,
    /// CIS the ASE will be carried on
    pub cis_id: u8,
    /// Target latency preference
    pub target_latency: u8,
    /// Target PHY preference
    pub target_phy: u8,
    /// Codec to configure
    pub codec_id: CodecId,
    /// Codec-specific configuration
    pub codec_config: CodecConfiguration,
}

/// QoS configuration request for a single ASE
#[derive(Debug, Clone, Copy)]
pub struct AseQosParams {
    /// Target ASE id
    pub ase_id: u8,
    /// CIG carrying the ASE's CIS
    pub cig_id: u8,
    /// CIS the ASE is bound to
    pub cis_id: u8,
    /// Isochronous parameters to apply
    pub iso: IsoConfig,
}

/// Enable request for a single ASE
#[derive(Debug, Clone)]
pub struct AseEnableParams {
    /// Target ASE id
    pub ase_id: u8,
    /// Streaming audio contexts bitmask
    pub streaming_context: u16,
    /// Additional LTV metadata, owned by the request
    pub metadata: Vec<u8, MAX_METADATA>,
}

/// Metadata update request for a single ASE
#[derive(Debug, Clone)]
pub struct AseMetadataParams {
    /// Target ASE id
    pub ase_id: u8,
    /// Streaming audio contexts bitmask
    pub streaming_context: u16,
    /// Additional LTV metadata, owned by the request
    pub metadata: Vec<u8, MAX_METADATA>,
}

/// Aggregate state of a stream group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamGroupState {
    /// No configuration applied
    Idle,
    /// Codec configured on the group's ASEs
    Configured,
    /// QoS configured
    QosConfigured,
    /// Enable issued, waiting for the ASEs
    Enabling,
    /// All ASEs enabled
    Enabled,
    /// Receiver start-ready handshake completed
    ReceiverReady,
    /// Disable issued, waiting for the ASEs
    Disabling,
    /// All ASEs disabled
    Disabled,
    /// Release issued, waiting for the ASEs
    Releasing,
}

/// The ASCS procedures a stream group runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Procedure {
    /// Codec configure
    CodecConfigure,
    /// QoS configure
    QosConfigure,
    /// Enable
    Enable,
    /// Receiver start ready
    ReceiverStartReady,
    /// Receiver stop ready
    ReceiverStopReady,
    /// Metadata update
    UpdateMetadata,
    /// Disable
    Disable,
    /// Release
    Release,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    procedure: Procedure,
    remaining: u8,
    prev_state: StreamGroupState,
}

/// Orchestrates the ASCS procedures for the ASEs of one CIG
#[derive(Debug)]
pub struct StreamGroup {
    /// Group id; equals the owning connection's cid
    pub id: u32,
    /// CIG id assigned at QoS/CIG configuration
    pub cig_id: u8,
    /// Aggregate state
    pub state: StreamGroupState,
    ase_ids: Vec<u8, MAX_ASES>,
    pending: Option<Pending>,
}

impl StreamGroup {
    /// Create an idle stream group
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self {
            id,
            cig_id: 0,
            state: StreamGroupState::Idle,
            ase_ids: Vec::new(),
            pending: None,
        }
    }

    /// Record an ASE as belonging to this group; reconfiguration of an
    /// already-tracked ASE leaves the set unchanged
    pub fn track_ase(&mut self, ase_id: u8) {
        if !self.ase_ids.contains(&ase_id) {
            self.ase_ids.push(ase_id).ok();
        }
    }

    /// True when the ASE belongs to this group
    #[must_use]
    pub fn contains_ase(&self, ase_id: u8) -> bool {
        self.ase_ids.contains(&ase_id)
    }

    /// The ASE ids configured into this group
    #[must_use]
    pub fn ase_ids(&self) -> &[u8] {
        &self.ase_ids
    }

    /// Begin a procedure covering `count` ASEs. A procedure begun while
    /// another is pending replaces it, matching the external layer's
    /// in-order confirmation guarantee.
    pub fn begin_procedure(&mut self, procedure: Procedure, count: u8) {
        let prev_state = self.state;
        if let Some(state) = Self::transitional_state(procedure) {
            self.state = state;
        }
        self.pending = Some(Pending {
            procedure,
            remaining: count,
            prev_state,
        });
    }

    /// Note an ASCS notification for one of the group's ASEs. Returns the
    /// finished procedure once the last targeted ASE has reported.
    pub fn note_ase_notification(&mut self, ase_id: u8) -> Option<Procedure> {
        if !self.contains_ase(ase_id) {
            return None;
        }
        let mut pending = self.pending.take()?;
        pending.remaining = pending.remaining.saturating_sub(1);
        if pending.remaining == 0 {
            self.state = Self::final_state(pending.procedure, pending.prev_state);
            Some(pending.procedure)
        } else {
            self.pending = Some(pending);
            None
        }
    }

    /// Abort the pending procedure and restore the previous group state.
    /// Returns the failed procedure, if one was pending.
    pub fn fail_procedure(&mut self) -> Option<Procedure> {
        let pending = self.pending.take()?;
        self.state = pending.prev_state;
        Some(pending.procedure)
    }

    /// The procedure currently awaiting ASE notifications
    #[must_use]
    pub fn pending_procedure(&self) -> Option<Procedure> {
        self.pending.map(|p| p.procedure)
    }

    const fn transitional_state(procedure: Procedure) -> Option<StreamGroupState> {
        match procedure {
            Procedure::Enable => Some(StreamGroupState::Enabling),
            Procedure::Disable => Some(StreamGroupState::Disabling),
            Procedure::Release => Some(StreamGroupState::Releasing),
            _ => None,
        }
    }

    const fn final_state(procedure: Procedure, prev: StreamGroupState) -> StreamGroupState {
        match procedure {
            Procedure::CodecConfigure => StreamGroupState::Configured,
            Procedure::QosConfigure => StreamGroupState::QosConfigured,
            Procedure::Enable => StreamGroupState::Enabled,
            Procedure::ReceiverStartReady => StreamGroupState::ReceiverReady,
            Procedure::ReceiverStopReady | Procedure::Disable => StreamGroupState::Disabled,
            Procedure::Release => StreamGroupState::Idle,
            Procedure::UpdateMetadata => prev,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_with_ases(ids: &[u8]) -> StreamGroup {
        let mut group = StreamGroup::new(5);
        for &id in ids {
            group.track_ase(id);
        }
        group
    }

    #[test]
    fn test_track_ase_deduplicates() {
        let mut group = group_with_ases(&[1, 2]);
        group.track_ase(1);
        assert_eq!(group.ase_ids(), &[1, 2]);
    }

    #[test]
    fn test_procedure_completes_after_all_ases() {
        let mut group = group_with_ases(&[1, 2]);
        group.begin_procedure(Procedure::CodecConfigure, 2);
        assert_eq!(group.note_ase_notification(1), None);
        assert_eq!(
            group.note_ase_notification(2),
            Some(Procedure::CodecConfigure)
        );
        assert_eq!(group.state, StreamGroupState::Configured);
        assert_eq!(group.pending_procedure(), None);
    }

    #[test]
    fn test_enable_walks_transitional_state() {
        let mut group = group_with_ases(&[1]);
        group.state = StreamGroupState::QosConfigured;
        group.begin_procedure(Procedure::Enable, 1);
        assert_eq!(group.state, StreamGroupState::Enabling);
        group.note_ase_notification(1);
        assert_eq!(group.state, StreamGroupState::Enabled);
    }

    #[test]
    fn test_failed_procedure_restores_state() {
        let mut group = group_with_ases(&[1]);
        group.state = StreamGroupState::QosConfigured;
        group.begin_procedure(Procedure::Enable, 1);
        assert_eq!(group.fail_procedure(), Some(Procedure::Enable));
        assert_eq!(group.state, StreamGroupState::QosConfigured);
    }

    #[test]
    fn test_release_returns_to_idle() {
        let mut group = group_with_ases(&[1, 2]);
        group.state = StreamGroupState::Disabled;
        group.begin_procedure(Procedure::Release, 2);
        assert_eq!(group.state, StreamGroupState::Releasing);
        group.note_ase_notification(1);
        group.note_ase_notification(2);
        assert_eq!(group.state, StreamGroupState::Idle);
    }

    #[test]
    fn test_metadata_update_keeps_state() {
        let mut group = group_with_ases(&[1]);
        group.state = StreamGroupState::Enabled;
        group.begin_procedure(Procedure::UpdateMetadata, 1);
        group.note_ase_notification(1);
        assert_eq!(group.state, StreamGroupState::Enabled);
    }

    #[test]
    fn test_foreign_ase_notification_is_ignored() {
        let mut group = group_with_ases(&[1]);
        group.begin_procedure(Procedure::Enable, 1);
        assert_eq!(group.note_ase_notification(9), None);
        assert_eq!(group.pending_procedure(), Some(Procedure::Enable));
    }
}
