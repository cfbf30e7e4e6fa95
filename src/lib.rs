#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![allow(dead_code, clippy::unused_async, clippy::too_many_lines)]

mod address;
pub mod api;
mod ase;
mod assistant;
mod client;
mod connection;
pub mod constants;
pub mod dispatcher;
pub mod iso;
mod registry;
mod stream_group;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;

use crate::constants::{MAX_ASES, MAX_CHANNELS, MAX_CIS, MAX_PAC_RECORD_DATA};

pub use address::{AddressType, LeAddress};
pub use ase::{Ase, AseDirection, AseState, Cis, IsoConfig};
pub use assistant::{
    AddSourceParams, AssistantState, BroadcastAssistant, ModifySourceParams, SubgroupSync,
};
pub use client::BapClient;
pub use connection::{Connection, ConnectionPhase, ServiceBarrier};
pub use dispatcher::{AscsOp, Command, Event};
pub use iso::cig::{CigParams, CigTestParams, CisConnection, CisParams, CisTestParams};
pub use iso::data_path::{
    CodecConfiguration, CodecId, DataPathParams, FrameDuration, SamplingFrequency,
};
pub use registry::Registry;
pub use stream_group::{
    AseCodecParams, AseEnableParams, AseMetadataParams, AseQosParams, Procedure, StreamGroup,
    StreamGroupState,
};

pub(crate) static REQUEST_CHANNEL: Channel<CriticalSectionRawMutex, Request, MAX_CHANNELS> =
    Channel::new();

pub(crate) static CONFIRM_CHANNEL: Channel<CriticalSectionRawMutex, Confirm, MAX_CHANNELS> =
    Channel::new();

pub(crate) static COMMAND_CHANNEL: Channel<CriticalSectionRawMutex, Command, MAX_CHANNELS> =
    Channel::new();

pub(crate) static EVENT_CHANNEL: Channel<CriticalSectionRawMutex, Event, MAX_CHANNELS> =
    Channel::new();

/// Result taxonomy for every confirmation surfaced to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BapStatus {
    /// Operation completed
    Success,
    /// Generic failure, including failures reported by the external layer
    Error,
    /// Unknown or invalid connection, stream group or ASE id
    ArgError,
    /// Out-of-range handle or malformed request
    InvalidParameter,
    /// A capacity limit was reached
    InsufficientResources,
    /// The requested role or operation is not supported
    NotSupported,
}

impl BapStatus {
    /// True for `Success`
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Translate an external-layer result code (0x00 = success) into the
    /// confirmation taxonomy
    #[must_use]
    pub const fn from_external(code: u8) -> Self {
        if code == 0 { Self::Success } else { Self::Error }
    }
}

/// Roles a connection may be initialized with, as a bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleMask(pub u8);

impl RoleMask {
    /// Unicast client (ASCS + PACS)
    pub const UNICAST_CLIENT: Self = Self(0x01);
    /// Broadcast source (not supported by this crate)
    pub const BROADCAST_SOURCE: Self = Self(0x02);
    /// Broadcast assistant (BASS)
    pub const BROADCAST_ASSISTANT: Self = Self(0x04);

    /// True if every role in `other` is present in `self`
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if no role bit is set
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl core::ops::BitOr for RoleMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Handle of an initialized GATT sub-service client instance
pub type ServiceHandle = u16;

/// The GATT sub-services this client drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// Audio Stream Control Service
    Ascs,
    /// Published Audio Capabilities Service
    Pacs,
    /// Broadcast Audio Scan Service
    Bass,
}

/// Attribute handle range of a discovered service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceRange {
    /// First attribute handle of the service
    pub start: u16,
    /// Last attribute handle of the service
    pub end: u16,
}

/// Cached service handle ranges supplied at init time. Sub-services whose
/// range is absent are discovered before being initialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceRanges {
    /// ASCS range, if cached
    pub ascs: Option<ServiceRange>,
    /// PACS range, if cached
    pub pacs: Option<ServiceRange>,
    /// BASS range, if cached
    pub bass: Option<ServiceRange>,
}

/// PAC record direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacDirection {
    /// Sink capability record
    Sink,
    /// Source capability record
    Source,
}

/// Which audio context characteristic to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioContextKind {
    /// Currently available contexts
    Available,
    /// Supported contexts
    Supported,
}

/// PACS characteristic classes notifications can be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacsNotificationType {
    /// Sink/source PAC records
    PacRecords,
    /// Audio location
    AudioLocation,
    /// Available/supported audio context
    AudioContext,
}

/// Receiver-ready direction of travel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyKind {
    /// Receiver start ready (after enable)
    Start,
    /// Receiver stop ready (after disable)
    Stop,
}

/// Requested periodic-advertising synchronization mode for a broadcast
/// source entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PaSyncMode {
    /// Do not synchronize to the periodic train
    NoSync = 0x00,
    /// Synchronize using periodic advertising sync transfer
    SynchronizePast = 0x01,
    /// Synchronize without sync transfer
    SynchronizeNoPast = 0x02,
}

impl PaSyncMode {
    /// True for the modes that request synchronization
    #[must_use]
    pub const fn synchronizes(self) -> bool {
        matches!(self, Self::SynchronizePast | Self::SynchronizeNoPast)
    }
}

/// A locally registered published audio capability record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacRecord {
    /// Identifier assigned when the record is added
    pub id: u16,
    /// Capability direction
    pub direction: PacDirection,
    /// Codec this record advertises
    pub codec_id: CodecId,
}

/// API requests sent to the dispatcher task.
///
/// Every request yields exactly one [`Confirm`]; requests that fail local
/// validation are confirmed immediately without contacting the external
/// layer.
#[derive(Debug, Clone)]
pub enum Request {
    /// Create a connection context and bring up its sub-service clients
    Init {
        /// Connection id of the underlying GATT connection
        cid: u32,
        /// Peer device address
        addr: LeAddress,
        /// Roles to initialize
        role: RoleMask,
        /// Cached service ranges, if any
        handles: Option<ServiceRanges>,
    },
    /// Tear the connection down once every sub-service has terminated
    Deinit {
        /// Connection id
        cid: u32,
        /// Roles to tear down
        role: RoleMask,
    },
    /// Register a local PAC record
    AddPacRecord {
        /// Capability direction
        direction: PacDirection,
        /// Codec advertised by the record
        codec_id: CodecId,
    },
    /// Remove a previously registered PAC record
    RemovePacRecord {
        /// Record id returned by the add confirmation
        record_id: u16,
    },
    /// Discover whether the remote exposes sink or source PAC records
    DiscoverAudioRole {
        /// Connection id
        cid: u32,
        /// Record direction to probe
        direction: PacDirection,
    },
    /// Read the remote PAC records for one direction
    DiscoverRemoteAudioCapability {
        /// Connection id
        cid: u32,
        /// Record direction to read
        direction: PacDirection,
    },
    /// Enable or disable PACS notifications
    RegisterPacsNotification {
        /// Connection id
        cid: u32,
        /// Characteristic class
        notify_type: PacsNotificationType,
        /// Enable or disable
        enable: bool,
    },
    /// Read the remote audio location for one direction
    GetRemoteAudioLocation {
        /// Connection id
        cid: u32,
        /// Direction to read
        direction: PacDirection,
    },
    /// Write the remote audio location for one direction
    SetRemoteAudioLocation {
        /// Connection id
        cid: u32,
        /// Direction to write
        direction: PacDirection,
        /// Audio location bitmask
        location: u32,
    },
    /// Read the remote available or supported audio contexts
    DiscoverAudioContext {
        /// Connection id
        cid: u32,
        /// Which context characteristic to read
        context: AudioContextKind,
    },
    /// Codec-configure a set of ASEs; creates the stream group on first use
    /// and updates it in place on reconfiguration
    CodecConfigure {
        /// Stream group id (the owning connection's cid)
        id: u32,
        /// Per-ASE codec configurations
        ases: Vec<AseCodecParams, MAX_ASES>,
    },
    /// Configure a CIG at the ISO controller
    CigConfigure {
        /// Stream group id the confirmation is routed back to
        id: u32,
        /// CIG parameters
        params: CigParams,
    },
    /// Configure a CIG with test parameters
    CigTestConfigure {
        /// Stream group id the confirmation is routed back to
        id: u32,
        /// CIG test parameters
        params: CigTestParams,
    },
    /// Remove a CIG from the ISO controller
    CigRemove {
        /// Stream group id the confirmation is routed back to
        id: u32,
        /// CIG to remove; ids above `MAX_CIG_ID` are rejected locally
        cig_id: u8,
    },
    /// QoS-configure a set of ASEs
    QosConfigure {
        /// Stream group id
        id: u32,
        /// Per-ASE QoS configurations
        ases: Vec<AseQosParams, MAX_ASES>,
    },
    /// Enable a set of ASEs
    Enable {
        /// Stream group id
        id: u32,
        /// Per-ASE enable parameters
        ases: Vec<AseEnableParams, MAX_ASES>,
    },
    /// Disable a set of ASEs
    Disable {
        /// Stream group id
        id: u32,
        /// ASEs to disable
        ase_ids: Vec<u8, MAX_ASES>,
    },
    /// Release a set of ASEs back to idle
    Release {
        /// Stream group id
        id: u32,
        /// ASEs to release
        ase_ids: Vec<u8, MAX_ASES>,
    },
    /// Update metadata on a set of enabled ASEs
    UpdateMetadata {
        /// Stream group id
        id: u32,
        /// Per-ASE metadata parameters
        ases: Vec<AseMetadataParams, MAX_ASES>,
    },
    /// Signal receiver start/stop ready for a set of ASEs
    ReceiverReady {
        /// Stream group id
        id: u32,
        /// Start or stop
        ready: ReadyKind,
        /// ASEs the handshake applies to
        ase_ids: Vec<u8, MAX_ASES>,
    },
    /// Establish the CISes of a stream group at the link layer
    CisConnect {
        /// Stream group id
        id: u32,
        /// CIS connection parameters
        cises: Vec<CisConnection, MAX_CIS>,
    },
    /// Disconnect one CIS
    CisDisconnect {
        /// Stream group id
        id: u32,
        /// Handle of the CIS to disconnect
        cis_handle: u16,
    },
    /// Set up an ISO data path for a CIS
    SetupDataPath {
        /// Connection id the confirmation is routed back to
        cid: u32,
        /// Data path parameters, including the codec configuration
        params: DataPathParams,
    },
    /// Remove an ISO data path
    RemoveDataPath {
        /// Connection id the confirmation is routed back to
        cid: u32,
        /// ISO handle; values above `MAX_ISO_HANDLE` are rejected locally
        iso_handle: u16,
        /// Data path direction being removed
        direction: u8,
    },
    /// Cache control-point response-mode flags for a connection
    SetControlPointOp {
        /// Connection id
        cid: u32,
        /// Server responds to control point operations
        response_op: bool,
        /// Server supports long writes
        long_write: bool,
    },
    /// Add a broadcast source to the remote scan delegator
    AddSource {
        /// Connection id
        cid: u32,
        /// Source parameters
        params: AddSourceParams,
    },
    /// Modify a broadcast source on the remote scan delegator
    ModifySource {
        /// Connection id
        cid: u32,
        /// Modified source parameters
        params: ModifySourceParams,
    },
    /// Remove a broadcast source from the remote scan delegator
    RemoveSource {
        /// Connection id
        cid: u32,
        /// Source id to remove
        source_id: u8,
    },
    /// Start synchronizing to a broadcast source's periodic train
    SyncToSourceStart {
        /// Connection id
        cid: u32,
        /// Source advertiser address
        addr: LeAddress,
        /// Advertising SID of the periodic train
        adv_sid: u8,
    },
    /// Cancel an in-progress synchronization attempt
    SyncToSourceCancel {
        /// Connection id
        cid: u32,
    },
    /// Terminate an established periodic sync
    SyncToSourceTerminate {
        /// Connection id
        cid: u32,
        /// Sync handle to terminate
        sync_handle: u16,
    },
}

/// Confirmations and indications surfaced to the application
#[derive(Debug, Clone)]
pub enum Confirm {
    /// Init completed for all requested sub-services
    Init {
        /// Connection id
        cid: u32,
        /// Roles initialized
        role: RoleMask,
        /// First non-success sub-service status, or success
        status: BapStatus,
    },
    /// The connection was destroyed; emitted exactly once per deinit
    Destroyed {
        /// Connection id
        cid: u32,
        /// Roles torn down
        role: RoleMask,
        /// First non-success termination status, or success
        status: BapStatus,
    },
    /// PAC record registered
    PacRecordAdded {
        /// Assigned record id
        record_id: u16,
        /// Outcome
        status: BapStatus,
    },
    /// PAC record removed
    PacRecordRemoved {
        /// Record id
        record_id: u16,
        /// Outcome
        status: BapStatus,
    },
    /// Audio role discovery outcome
    AudioRole {
        /// Connection id
        cid: u32,
        /// Direction probed
        direction: PacDirection,
        /// Outcome
        status: BapStatus,
    },
    /// Remote PAC record read outcome; record payloads arrive as
    /// [`Confirm::PacRecordInd`] indications
    RemoteAudioCapability {
        /// Connection id
        cid: u32,
        /// Direction read
        direction: PacDirection,
        /// Outcome
        status: BapStatus,
    },
    /// PACS notification registration outcome
    PacsNotificationRegistered {
        /// Connection id
        cid: u32,
        /// Outcome
        status: BapStatus,
    },
    /// Remote audio location read outcome
    RemoteAudioLocation {
        /// Connection id
        cid: u32,
        /// Direction read
        direction: PacDirection,
        /// Audio location bitmask
        location: u32,
        /// Outcome
        status: BapStatus,
    },
    /// Remote audio location write outcome
    RemoteAudioLocationSet {
        /// Connection id
        cid: u32,
        /// Outcome
        status: BapStatus,
    },
    /// Audio context read outcome
    AudioContext {
        /// Connection id
        cid: u32,
        /// Which characteristic was read
        context: AudioContextKind,
        /// Context bitmask
        value: u32,
        /// Outcome
        status: BapStatus,
    },
    /// Codec configure procedure finished
    CodecConfigured {
        /// Stream group id
        id: u32,
        /// Outcome
        status: BapStatus,
    },
    /// CIG configured at the controller
    CigConfigured {
        /// Stream group id
        id: u32,
        /// CIG id
        cig_id: u8,
        /// CIS handles in configuration order
        cis_handles: Vec<u16, MAX_CIS>,
        /// Outcome
        status: BapStatus,
    },
    /// CIG test-configured at the controller
    CigTestConfigured {
        /// Stream group id
        id: u32,
        /// CIG id
        cig_id: u8,
        /// CIS handles in configuration order
        cis_handles: Vec<u16, MAX_CIS>,
        /// Outcome
        status: BapStatus,
    },
    /// CIG removed
    CigRemoved {
        /// Stream group id
        id: u32,
        /// CIG id
        cig_id: u8,
        /// Outcome
        status: BapStatus,
    },
    /// QoS configure procedure finished
    QosConfigured {
        /// Stream group id
        id: u32,
        /// Outcome
        status: BapStatus,
    },
    /// Enable procedure finished
    Enabled {
        /// Stream group id
        id: u32,
        /// Outcome
        status: BapStatus,
    },
    /// Disable procedure finished
    Disabled {
        /// Stream group id
        id: u32,
        /// Outcome
        status: BapStatus,
    },
    /// Release procedure finished
    Released {
        /// Stream group id
        id: u32,
        /// Outcome
        status: BapStatus,
    },
    /// Metadata update procedure finished
    MetadataUpdated {
        /// Stream group id
        id: u32,
        /// Outcome
        status: BapStatus,
    },
    /// Receiver ready handshake finished
    ReceiverReady {
        /// Stream group id
        id: u32,
        /// Start or stop
        ready: ReadyKind,
        /// Outcome
        status: BapStatus,
    },
    /// CIS established
    CisConnected {
        /// Stream group id
        id: u32,
        /// CIS handle
        cis_handle: u16,
        /// Outcome
        status: BapStatus,
    },
    /// CIS disconnect requested by us completed
    CisDisconnected {
        /// Stream group id
        id: u32,
        /// CIS handle
        cis_handle: u16,
        /// Outcome
        status: BapStatus,
    },
    /// CIS dropped by the peer or the controller
    CisDisconnectInd {
        /// Stream group id
        id: u32,
        /// CIS handle
        cis_handle: u16,
        /// Link-layer reason code
        reason: u8,
    },
    /// ISO data path set up
    DataPathSetup {
        /// ISO handle
        iso_handle: u16,
        /// Owning stream group id, or 0 when the handle is unknown
        id: u32,
        /// Outcome
        status: BapStatus,
    },
    /// ISO data path removed
    DataPathRemoved {
        /// ISO handle
        iso_handle: u16,
        /// Outcome
        status: BapStatus,
    },
    /// Control point response-mode flags cached
    ControlPointOpSet {
        /// Connection id
        cid: u32,
        /// Outcome
        status: BapStatus,
    },
    /// Add source procedure finished
    SourceAdded {
        /// Connection id
        cid: u32,
        /// Outcome
        status: BapStatus,
    },
    /// Modify source procedure finished
    SourceModified {
        /// Connection id
        cid: u32,
        /// Outcome
        status: BapStatus,
    },
    /// Remove source procedure finished
    SourceRemoved {
        /// Connection id
        cid: u32,
        /// Outcome
        status: BapStatus,
    },
    /// Periodic sync established (or failed)
    SyncToSourceStarted {
        /// Connection id
        cid: u32,
        /// Established sync handle
        sync_handle: u16,
        /// Outcome
        status: BapStatus,
    },
    /// Sync attempt cancelled
    SyncToSourceCancelled {
        /// Connection id
        cid: u32,
        /// Outcome
        status: BapStatus,
    },
    /// Established sync terminated
    SyncToSourceTerminated {
        /// Connection id
        cid: u32,
        /// Terminated sync handle
        sync_handle: u16,
        /// Outcome
        status: BapStatus,
    },
    /// A remote PAC record, from a read or a notification
    PacRecordInd {
        /// Connection id
        cid: u32,
        /// Record direction
        direction: PacDirection,
        /// Raw LTV record payload
        record: Vec<u8, MAX_PAC_RECORD_DATA>,
    },
    /// Remote audio location changed
    AudioLocationInd {
        /// Connection id
        cid: u32,
        /// Direction the location applies to
        direction: PacDirection,
        /// Audio location bitmask
        location: u32,
    },
    /// Remote audio context changed
    AudioContextInd {
        /// Connection id
        cid: u32,
        /// Context bitmask
        value: u32,
    },
    /// Broadcast receive state reported by the scan delegator
    BroadcastReceiveStateInd {
        /// Connection id
        cid: u32,
        /// Server-assigned source id
        source_id: u8,
        /// PA sync state
        pa_sync_state: u8,
        /// BIG encryption state
        big_encryption: u8,
    },
}

/// No-op defmt logger so host-side `cargo test` binaries link
#[cfg(test)]
mod test_logger {
    #[defmt::global_logger]
    struct Logger;

    unsafe impl defmt::Logger for Logger {
        fn acquire() {}
        unsafe fn flush() {}
        unsafe fn release() {}
        unsafe fn write(_bytes: &[u8]) {}
    }

    defmt::timestamp!("{=u64}", 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_taxonomy() {
        assert!(BapStatus::Success.is_success());
        assert!(!BapStatus::ArgError.is_success());
        assert_eq!(BapStatus::from_external(0), BapStatus::Success);
        assert_eq!(BapStatus::from_external(0x42), BapStatus::Error);
    }

    #[test]
    fn test_role_mask_bits() {
        let role = RoleMask::UNICAST_CLIENT | RoleMask::BROADCAST_ASSISTANT;
        assert!(role.contains(RoleMask::UNICAST_CLIENT));
        assert!(role.contains(RoleMask::BROADCAST_ASSISTANT));
        assert!(!role.contains(RoleMask::BROADCAST_SOURCE));
        assert!(!role.is_empty());
        assert!(RoleMask(0).is_empty());
    }

    #[test]
    fn test_pa_sync_mode_synchronizes() {
        assert!(!PaSyncMode::NoSync.synchronizes());
        assert!(PaSyncMode::SynchronizePast.synchronizes());
        assert!(PaSyncMode::SynchronizeNoPast.synchronizes());
    }
}
