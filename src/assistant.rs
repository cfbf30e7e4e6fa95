//! Broadcast-assistant state for remote scan-delegator interaction
//!
//! Tracks one broadcast source per connection: the control-point procedure
//! in flight, the server-assigned source id, periodic-sync bookkeeping and
//! the per-subgroup BIS-sync state with its owned metadata buffers.
//! Metadata is copied out of requests into buffers owned here; replacing a
//! subgroup set drops the previous buffers by value.

use heapless::Vec;

use crate::address::LeAddress;
use crate::constants::{BIS_SYNC_NO_PREFERENCE, MAX_METADATA, MAX_SUBGROUPS};
use crate::{BapStatus, PaSyncMode};

/// Control-point procedure currently in flight at the scan delegator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantState {
    /// No procedure in flight
    Idle,
    /// Add source written, waiting for the control-point response
    AddingSource,
    /// Modify source written, waiting for the control-point response
    ModifyingSource,
    /// Remove source written, waiting for the control-point response
    RemovingSource,
    /// Synchronizing to the source's periodic train
    SyncingToSource,
}

/// BIS synchronization request and metadata for one subgroup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubgroupSync {
    /// BIS index bitmask to synchronize to, or `BIS_SYNC_NO_PREFERENCE`
    pub bis_sync: u32,
    /// LTV metadata for the subgroup, owned by this record
    pub metadata: Vec<u8, MAX_METADATA>,
}

/// Add-source request parameters
#[derive(Debug, Clone)]
pub struct AddSourceParams {
    /// Broadcast source device address
    pub source_addr: LeAddress,
    /// Address the source advertises from
    pub advertiser_addr: LeAddress,
    /// Advertising SID of the source's periodic train
    pub source_adv_sid: u8,
    /// Requested PA synchronization mode
    pub pa_sync: PaSyncMode,
    /// Periodic advertising interval in 1.25 ms units
    pub pa_interval: u16,
    /// Broadcast id of the source
    pub broadcast_id: u32,
    /// Established periodic sync handle for a standalone source
    pub sync_handle: u16,
    /// Local advertising set handle for a collocated source
    pub adv_handle: u8,
    /// True when the source is this device (collocated)
    pub collocated: bool,
    /// Per-subgroup BIS sync and metadata
    pub subgroups: Vec<SubgroupSync, MAX_SUBGROUPS>,
}

/// Modify-source request parameters
#[derive(Debug, Clone)]
pub struct ModifySourceParams {
    /// Source id assigned by the scan delegator
    pub source_id: u8,
    /// Advertising SID of the source's periodic train
    pub source_adv_sid: u8,
    /// Requested PA synchronization mode
    pub pa_sync: PaSyncMode,
    /// Periodic advertising interval in 1.25 ms units
    pub pa_interval: u16,
    /// Established periodic sync handle for a standalone source
    pub sync_handle: u16,
    /// Local advertising set handle for a collocated source
    pub adv_handle: u8,
    /// True when the source is this device (collocated)
    pub collocated: bool,
    /// Per-subgroup BIS sync and metadata
    pub subgroups: Vec<SubgroupSync, MAX_SUBGROUPS>,
}

/// Per-connection broadcast-assistant state
#[derive(Debug)]
pub struct BroadcastAssistant {
    /// Control-point procedure in flight
    pub state: AssistantState,
    /// Sync handle of the source's periodic train, 0 when not synced
    pub sync_handle: u16,
    /// Advertising SID of the tracked source
    pub adv_sid: u8,
    /// Address of the tracked source
    pub source_addr: Option<LeAddress>,
    /// Tracked source is collocated with this device
    pub collocated: bool,
    /// Server responds to control point operations
    pub response_op: bool,
    /// Server supports long control-point writes
    pub long_write: bool,
    source_id: u8,
    source_id_pending: bool,
    subgroups: Vec<SubgroupSync, MAX_SUBGROUPS>,
}

impl BroadcastAssistant {
    /// Fresh assistant state with no source tracked
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AssistantState::Idle,
            sync_handle: 0,
            adv_sid: 0,
            source_addr: None,
            collocated: false,
            response_op: false,
            long_write: false,
            source_id: 0,
            source_id_pending: true,
            subgroups: Vec::new(),
        }
    }

    /// True between add-source (or remove-source) and the broadcast
    /// receive state carrying the server-assigned id. Kept as an explicit
    /// flag so an assigned id of zero is not mistaken for "no source".
    #[must_use]
    pub const fn is_source_id_pending(&self) -> bool {
        self.source_id_pending
    }

    /// The assigned source id, absent while it is pending
    #[must_use]
    pub const fn source_id(&self) -> Option<u8> {
        if self.source_id_pending {
            None
        } else {
            Some(self.source_id)
        }
    }

    /// Record the id the server assigned
    pub fn set_source_id(&mut self, source_id: u8) {
        self.source_id = source_id;
        self.source_id_pending = false;
    }

    /// Mark the id unknown again (after add or remove source)
    pub fn mark_source_id_pending(&mut self) {
        self.source_id_pending = true;
    }

    /// Validate an add-source request: a concrete BIS sync preference
    /// requires a PA sync mode that actually synchronizes.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` when the rule is violated.
    pub fn validate_add(params: &AddSourceParams) -> Result<(), BapStatus> {
        for subgroup in &params.subgroups {
            if subgroup.bis_sync != BIS_SYNC_NO_PREFERENCE && !params.pa_sync.synchronizes() {
                return Err(BapStatus::InvalidParameter);
            }
        }
        Ok(())
    }

    /// Store the source described by an add-source request, replacing any
    /// previously tracked source and its metadata
    pub fn store_source(&mut self, params: &AddSourceParams) {
        self.source_addr = Some(params.source_addr);
        self.adv_sid = params.source_adv_sid;
        self.collocated = params.collocated;
        self.sync_handle = params.sync_handle;
        self.subgroups = params.subgroups.clone();
    }

    /// Replace the tracked subgroup state from a modify-source request
    pub fn update_source(&mut self, params: &ModifySourceParams) {
        self.adv_sid = params.source_adv_sid;
        self.collocated = params.collocated;
        self.sync_handle = params.sync_handle;
        self.subgroups = params.subgroups.clone();
    }

    /// Drop the tracked source and its metadata buffers
    pub fn clear_source(&mut self) {
        self.source_addr = None;
        self.subgroups.clear();
        self.mark_source_id_pending();
    }

    /// The tracked subgroup records
    #[must_use]
    pub fn subgroups(&self) -> &[SubgroupSync] {
        &self.subgroups
    }
}

impl Default for BroadcastAssistant {
    fn default() -> Self {
        Self::new()
    }
}

/// Service data for a periodic advertising sync transfer, identifying the
/// source to the scan delegator.
///
/// The low byte carries the assigned source id. The flag bits encode the
/// address matching rules: for a standalone source, bit 0 is set when the
/// advertiser address differs from the source address and bit 1 when the
/// address types differ; a collocated source transfers its own advertising
/// set, so both flags stay clear.
#[must_use]
pub fn past_service_data(
    source_id: u8,
    collocated: bool,
    advertiser: &LeAddress,
    source: &LeAddress,
) -> u16 {
    let mut flags = 0u8;
    if !collocated {
        if advertiser.addr != source.addr {
            flags |= 0x01;
        }
        if advertiser.addr_type != source.addr_type {
            flags |= 0x02;
        }
    }
    u16::from_le_bytes([source_id, flags])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AddressType;

    fn params(pa_sync: PaSyncMode, bis_sync: u32) -> AddSourceParams {
        let mut subgroups = Vec::new();
        subgroups
            .push(SubgroupSync {
                bis_sync,
                metadata: Vec::new(),
            })
            .unwrap();
        AddSourceParams {
            source_addr: LeAddress::public([1, 2, 3, 4, 5, 6]),
            advertiser_addr: LeAddress::public([1, 2, 3, 4, 5, 6]),
            source_adv_sid: 3,
            pa_sync,
            pa_interval: 0x100,
            broadcast_id: 0x00AB_CDEF,
            sync_handle: 0x20,
            adv_handle: 1,
            collocated: false,
            subgroups,
        }
    }

    #[test]
    fn test_source_id_pending_is_explicit() {
        let mut assistant = BroadcastAssistant::new();
        assert!(assistant.is_source_id_pending());
        assert_eq!(assistant.source_id(), None);

        // an assigned id of zero is a valid id, not "no source"
        assistant.set_source_id(0);
        assert!(!assistant.is_source_id_pending());
        assert_eq!(assistant.source_id(), Some(0));

        assistant.mark_source_id_pending();
        assert_eq!(assistant.source_id(), None);
    }

    #[test]
    fn test_bis_sync_requires_synchronizing_pa_mode() {
        let bad = params(PaSyncMode::NoSync, 0x0000_0001);
        assert_eq!(
            BroadcastAssistant::validate_add(&bad),
            Err(BapStatus::InvalidParameter)
        );

        let past = params(PaSyncMode::SynchronizePast, 0x0000_0001);
        assert_eq!(BroadcastAssistant::validate_add(&past), Ok(()));

        let no_preference = params(PaSyncMode::NoSync, BIS_SYNC_NO_PREFERENCE);
        assert_eq!(BroadcastAssistant::validate_add(&no_preference), Ok(()));
    }

    #[test]
    fn test_store_source_replaces_metadata() {
        let mut assistant = BroadcastAssistant::new();
        let mut first = params(PaSyncMode::SynchronizePast, BIS_SYNC_NO_PREFERENCE);
        first.subgroups[0]
            .metadata
            .extend_from_slice(&[0x03, 0x02, 0x04, 0x00])
            .unwrap();
        assistant.store_source(&first);
        assert_eq!(assistant.subgroups()[0].metadata.len(), 4);

        let second = params(PaSyncMode::SynchronizePast, 0x0000_0003);
        assistant.store_source(&second);
        assert_eq!(assistant.subgroups().len(), 1);
        assert!(assistant.subgroups()[0].metadata.is_empty());
        assert_eq!(assistant.subgroups()[0].bis_sync, 0x0000_0003);
    }

    #[test]
    fn test_clear_source_drops_state() {
        let mut assistant = BroadcastAssistant::new();
        assistant.store_source(&params(PaSyncMode::SynchronizePast, 1));
        assistant.set_source_id(4);
        assistant.clear_source();
        assert!(assistant.subgroups().is_empty());
        assert!(assistant.source_addr.is_none());
        assert!(assistant.is_source_id_pending());
    }

    #[test]
    fn test_past_service_data_flags() {
        let source = LeAddress::public([1, 2, 3, 4, 5, 6]);
        let matching = source;
        let different = LeAddress::public([9, 9, 9, 9, 9, 9]);
        let random = LeAddress::new([1, 2, 3, 4, 5, 6], AddressType::Random);

        assert_eq!(past_service_data(5, false, &matching, &source), 0x0005);
        assert_eq!(past_service_data(5, false, &different, &source), 0x0105);
        assert_eq!(past_service_data(5, false, &random, &source), 0x0205);
        // collocated sources always transfer their own advertising set
        assert_eq!(past_service_data(5, true, &different, &source), 0x0005);
    }
}
