//! Dispatcher: downstream commands, inbound events and the task that
//! multiplexes them
//!
//! # Architecture
//!
//! * Application requests arrive on the request channel and are processed
//!   by [`crate::BapClient::process_request`]
//! * External-layer results arrive on the event channel and are processed
//!   by [`crate::BapClient::process_event`]
//! * Both paths emit [`Command`]s for the platform integration to deliver
//!   and [`crate::Confirm`]s for the application
//!
//! One inbound item is fully dispatched, including every command it
//! triggers, before the next is considered. Events that match no live
//! entity are a normal case and are dropped silently at debug level.

use bt_hci::param::{ConnHandle, DisconnectReason};
use embassy_futures::select::{select, Either};
use heapless::Vec;

use crate::assistant::AssistantState;
use crate::ase::AseState;
use crate::connection::ConnectionPhase;
use crate::constants::{
    MAX_ASES, MAX_CIS, MAX_CODEC_CONFIG, MAX_CONFIRMS, MAX_PAC_RECORD_DATA,
};
use crate::stream_group::Procedure;
use crate::{
    AddSourceParams, AseCodecParams, AseEnableParams, AseMetadataParams, AseQosParams, BapClient,
    BapStatus, CigParams, CigTestParams, CisConnection, Confirm, LeAddress, ModifySourceParams,
    PacDirection, PacsNotificationType, ReadyKind, ServiceHandle, ServiceKind, ServiceRange,
    AudioContextKind, COMMAND_CHANNEL, CONFIRM_CHANNEL, EVENT_CHANNEL, REQUEST_CHANNEL,
};

/// ASCS control-point operations, carried structured; the GATT layer owns
/// the wire encoding
#[derive(Debug, Clone)]
pub enum AscsOp {
    /// Config codec operation
    ConfigCodec(Vec<AseCodecParams, MAX_ASES>),
    /// Config QoS operation
    ConfigQos(Vec<AseQosParams, MAX_ASES>),
    /// Enable operation
    Enable(Vec<AseEnableParams, MAX_ASES>),
    /// Receiver start ready operation
    ReceiverStartReady(Vec<u8, MAX_ASES>),
    /// Disable operation
    Disable(Vec<u8, MAX_ASES>),
    /// Receiver stop ready operation
    ReceiverStopReady(Vec<u8, MAX_ASES>),
    /// Update metadata operation
    UpdateMetadata(Vec<AseMetadataParams, MAX_ASES>),
    /// Release operation
    Release(Vec<u8, MAX_ASES>),
}

/// Fire-and-forget commands to the external GATT/ISO layer. Every command
/// that has a result produces a matching [`Event`] later.
#[derive(Debug, Clone)]
pub enum Command {
    /// Discover the handle ranges of the named services
    DiscoverServices {
        /// Connection to discover on
        cid: u32,
        /// Services whose ranges are not cached
        services: Vec<ServiceKind, 3>,
    },
    /// Initialize an ASCS client against a handle range
    AscsInit {
        /// Connection id
        cid: u32,
        /// Service handle range
        range: ServiceRange,
    },
    /// Terminate an ASCS client
    AscsTerminate {
        /// Client handle
        handle: ServiceHandle,
    },
    /// Write an ASE control-point operation
    AscsWrite {
        /// Client handle
        handle: ServiceHandle,
        /// Operation to write
        op: AscsOp,
    },
    /// Initialize a PACS client against a handle range
    PacsInit {
        /// Connection id
        cid: u32,
        /// Service handle range
        range: ServiceRange,
    },
    /// Terminate a PACS client
    PacsTerminate {
        /// Client handle
        handle: ServiceHandle,
    },
    /// Probe for sink or source PAC records
    PacsFindAudioRole {
        /// Client handle
        handle: ServiceHandle,
        /// Direction to probe
        direction: PacDirection,
    },
    /// Read the PAC records of one direction
    PacsReadRecords {
        /// Client handle
        handle: ServiceHandle,
        /// Direction to read
        direction: PacDirection,
    },
    /// Read the audio location of one direction
    PacsReadLocation {
        /// Client handle
        handle: ServiceHandle,
        /// Direction to read
        direction: PacDirection,
    },
    /// Write the audio location of one direction
    PacsWriteLocation {
        /// Client handle
        handle: ServiceHandle,
        /// Direction to write
        direction: PacDirection,
        /// Audio location bitmask
        location: u32,
    },
    /// Read the available or supported audio context
    PacsReadContext {
        /// Client handle
        handle: ServiceHandle,
        /// Which characteristic to read
        context: AudioContextKind,
    },
    /// Enable or disable PACS notifications
    PacsRegisterNotification {
        /// Client handle
        handle: ServiceHandle,
        /// Characteristic class
        notify_type: PacsNotificationType,
        /// Enable or disable
        enable: bool,
    },
    /// Initialize a BASS client against a handle range
    BassInit {
        /// Connection id
        cid: u32,
        /// Service handle range
        range: ServiceRange,
    },
    /// Terminate a BASS client
    BassTerminate {
        /// Client handle
        handle: ServiceHandle,
    },
    /// Write an add-source control-point operation
    BassAddSource {
        /// Client handle
        handle: ServiceHandle,
        /// Source parameters
        params: AddSourceParams,
        /// Write without response
        no_response: bool,
        /// Use a long write
        long_write: bool,
    },
    /// Write a modify-source control-point operation
    BassModifySource {
        /// Client handle
        handle: ServiceHandle,
        /// Source parameters
        params: ModifySourceParams,
        /// Write without response
        no_response: bool,
    },
    /// Write a remove-source control-point operation
    BassRemoveSource {
        /// Client handle
        handle: ServiceHandle,
        /// Source to remove
        source_id: u8,
        /// Write without response
        no_response: bool,
    },
    /// Configure a CIG
    ConfigureCig {
        /// CIG parameters
        params: CigParams,
    },
    /// Configure a CIG with test parameters
    ConfigureCigTest {
        /// CIG test parameters
        params: CigTestParams,
    },
    /// Remove a CIG
    RemoveCig {
        /// CIG id
        cig_id: u8,
    },
    /// Establish the given CISes
    ConnectCis {
        /// CIS connection parameters
        cises: Vec<CisConnection, MAX_CIS>,
    },
    /// Disconnect one CIS
    DisconnectCis {
        /// CIS handle
        handle: ConnHandle,
        /// Disconnect reason
        reason: DisconnectReason,
    },
    /// Set up an ISO data path
    SetupIsoDataPath {
        /// CIS or BIS handle
        handle: ConnHandle,
        /// Path direction
        direction: u8,
        /// Data path id
        path_id: u8,
        /// Codec id wire form
        codec_id: [u8; 5],
        /// Controller delay in microseconds
        controller_delay: u32,
        /// LTV codec configuration
        config: Vec<u8, MAX_CODEC_CONFIG>,
    },
    /// Remove an ISO data path
    RemoveIsoDataPath {
        /// CIS or BIS handle
        handle: ConnHandle,
        /// Path direction
        direction: u8,
    },
    /// Synchronize to a periodic advertising train
    PeriodicScanSyncToTrain {
        /// Advertiser address
        addr: LeAddress,
        /// Advertising SID
        adv_sid: u8,
    },
    /// Cancel the in-progress train synchronization
    PeriodicScanSyncCancel,
    /// Terminate an established periodic sync
    PeriodicScanSyncTerminate {
        /// Sync handle
        sync_handle: u16,
    },
    /// Transfer a local advertising set's sync info to the peer
    PeriodicAdvSetTransfer {
        /// Connection to transfer over
        cid: u32,
        /// BASS service data identifying the source
        service_data: u16,
        /// Local advertising set handle
        adv_handle: u8,
    },
    /// Transfer an established scan sync to the peer
    PeriodicScanSyncTransfer {
        /// Connection to transfer over
        cid: u32,
        /// BASS service data identifying the source
        service_data: u16,
        /// Established sync handle
        sync_handle: u16,
    },
}

/// Service discovery results
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// Handle ranges found for a connection
    ServicesFound {
        /// Connection id
        cid: u32,
        /// External result code, 0 on success
        status: u8,
        /// Discovered (service, range) pairs
        services: Vec<(ServiceKind, ServiceRange), 3>,
    },
}

/// ASCS client confirmations and indications
#[derive(Debug, Clone)]
pub enum AscsEvent {
    /// Client initialized
    InitCfm {
        /// Connection id
        cid: u32,
        /// Assigned client handle
        handle: ServiceHandle,
        /// External result code
        status: u8,
    },
    /// Control-point write acknowledged
    WriteCfm {
        /// Client handle
        handle: ServiceHandle,
        /// External result code
        status: u8,
    },
    /// ASE state notification
    AseNotification {
        /// Client handle
        handle: ServiceHandle,
        /// ASE the notification is for
        ase_id: u8,
        /// Reported ASE state
        state: AseState,
    },
    /// Client terminated
    TerminateCfm {
        /// Client handle
        handle: ServiceHandle,
        /// External result code
        status: u8,
    },
}

/// PACS client confirmations, indications and notifications
#[derive(Debug, Clone)]
pub enum PacsEvent {
    /// Client initialized
    InitCfm {
        /// Connection id
        cid: u32,
        /// Assigned client handle
        handle: ServiceHandle,
        /// External result code
        status: u8,
    },
    /// Audio role probe finished
    AudioRoleCfm {
        /// Client handle
        handle: ServiceHandle,
        /// Probed direction
        direction: PacDirection,
        /// External result code
        status: u8,
    },
    /// PAC record read finished
    PacRecordCfm {
        /// Client handle
        handle: ServiceHandle,
        /// Record direction
        direction: PacDirection,
        /// Raw LTV record payload
        record: Vec<u8, MAX_PAC_RECORD_DATA>,
        /// External result code
        status: u8,
    },
    /// Audio location read finished
    AudioLocationCfm {
        /// Client handle
        handle: ServiceHandle,
        /// Read direction
        direction: PacDirection,
        /// Audio location bitmask
        location: u32,
        /// External result code
        status: u8,
    },
    /// Audio location write finished
    AudioLocationWriteCfm {
        /// Client handle
        handle: ServiceHandle,
        /// External result code
        status: u8,
    },
    /// Audio context read finished
    AudioContextCfm {
        /// Client handle
        handle: ServiceHandle,
        /// Which characteristic was read
        context: AudioContextKind,
        /// Context bitmask
        value: u32,
        /// External result code
        status: u8,
    },
    /// Notification registration finished
    NotificationCfm {
        /// Client handle
        handle: ServiceHandle,
        /// External result code
        status: u8,
    },
    /// Unsolicited PAC record notification
    PacRecordInd {
        /// Client handle
        handle: ServiceHandle,
        /// Record direction
        direction: PacDirection,
        /// Raw LTV record payload
        record: Vec<u8, MAX_PAC_RECORD_DATA>,
    },
    /// Unsolicited audio location notification
    AudioLocationInd {
        /// Client handle
        handle: ServiceHandle,
        /// Direction the location applies to
        direction: PacDirection,
        /// Audio location bitmask
        location: u32,
    },
    /// Unsolicited audio context notification
    AudioContextInd {
        /// Client handle
        handle: ServiceHandle,
        /// Context bitmask
        value: u32,
    },
    /// Client terminated
    TerminateCfm {
        /// Client handle
        handle: ServiceHandle,
        /// External result code
        status: u8,
    },
}

/// BASS client confirmations and indications
#[derive(Debug, Clone)]
pub enum BassEvent {
    /// Client initialized
    InitCfm {
        /// Connection id
        cid: u32,
        /// Assigned client handle
        handle: ServiceHandle,
        /// External result code
        status: u8,
    },
    /// Add-source control-point write acknowledged
    AddSourceCfm {
        /// Client handle
        handle: ServiceHandle,
        /// External result code
        status: u8,
    },
    /// Modify-source control-point write acknowledged
    ModifySourceCfm {
        /// Client handle
        handle: ServiceHandle,
        /// External result code
        status: u8,
    },
    /// Remove-source control-point write acknowledged
    RemoveSourceCfm {
        /// Client handle
        handle: ServiceHandle,
        /// External result code
        status: u8,
    },
    /// Broadcast receive state indication
    ReceiveStateInd {
        /// Client handle
        handle: ServiceHandle,
        /// Server-assigned source id
        source_id: u8,
        /// PA sync state
        pa_sync_state: u8,
        /// BIG encryption state
        big_encryption: u8,
    },
    /// Client terminated
    TerminateCfm {
        /// Client handle
        handle: ServiceHandle,
        /// External result code
        status: u8,
    },
}

/// ISO controller confirmations and indications
#[derive(Debug, Clone)]
pub enum IsoEvent {
    /// CIG configured
    CigConfigureCfm {
        /// CIG id
        cig_id: u8,
        /// CIS handles in configuration order
        cis_handles: Vec<u16, MAX_CIS>,
        /// External result code
        status: u8,
    },
    /// CIG test-configured
    CigTestConfigureCfm {
        /// CIG id
        cig_id: u8,
        /// CIS handles in configuration order
        cis_handles: Vec<u16, MAX_CIS>,
        /// External result code
        status: u8,
    },
    /// CIG removed
    RemoveCigCfm {
        /// CIG id
        cig_id: u8,
        /// External result code
        status: u8,
    },
    /// CIS establishment finished
    CisConnectCfm {
        /// CIS handle
        cis_handle: u16,
        /// External result code
        status: u8,
    },
    /// Requested CIS disconnect finished
    CisDisconnectCfm {
        /// CIS handle
        cis_handle: u16,
        /// External result code
        status: u8,
    },
    /// CIS dropped by the peer or controller
    CisDisconnectInd {
        /// CIS handle
        cis_handle: u16,
        /// Link-layer reason
        reason: u8,
    },
    /// Data path setup finished
    SetupDataPathCfm {
        /// ISO handle
        iso_handle: u16,
        /// External result code
        status: u8,
    },
    /// Data path removal finished
    RemoveDataPathCfm {
        /// ISO handle
        iso_handle: u16,
        /// External result code
        status: u8,
    },
}

/// Connection-manager events: periodic scan and sync transfer
#[derive(Debug, Clone)]
pub enum CmEvent {
    /// Periodic train synchronization finished
    PeriodicSyncToTrainCfm {
        /// Established sync handle
        sync_handle: u16,
        /// Advertising SID
        adv_sid: u8,
        /// Advertiser address
        addr: LeAddress,
        /// External result code
        status: u8,
    },
    /// Synchronization cancel finished
    PeriodicSyncToTrainCancelCfm {
        /// External result code
        status: u8,
    },
    /// Periodic sync terminated
    PeriodicSyncTerminateCfm {
        /// Terminated sync handle
        sync_handle: u16,
        /// External result code
        status: u8,
    },
    /// Periodic advertising set transfer finished
    PeriodicAdvSetTransferCfm {
        /// External result code
        status: u8,
    },
    /// Periodic scan sync transfer finished
    PeriodicScanSyncTransferCfm {
        /// External result code
        status: u8,
    },
    /// An established periodic sync was lost
    PeriodicSyncLostInd {
        /// Lost sync handle
        sync_handle: u16,
    },
}

/// Inbound events from the external layer, demultiplexed by category
#[derive(Debug, Clone)]
pub enum Event {
    /// Service discovery results
    Discovery(DiscoveryEvent),
    /// ASCS client events
    Ascs(AscsEvent),
    /// PACS client events
    Pacs(PacsEvent),
    /// BASS client events
    Bass(BassEvent),
    /// ISO controller events
    Iso(IsoEvent),
    /// Connection-manager events
    Cm(CmEvent),
}

impl BapClient {
    /// Process one inbound event: route it to the owning connection or
    /// stream group and produce any resulting confirmations. Events that
    /// match no live entity are dropped.
    pub fn process_event(&mut self, event: Event) -> Vec<Confirm, MAX_CONFIRMS> {
        let mut confirms = Vec::new();
        match event {
            Event::Discovery(event) => self.on_discovery(event, &mut confirms),
            Event::Ascs(event) => self.on_ascs(event, &mut confirms),
            Event::Pacs(event) => self.on_pacs(event, &mut confirms),
            Event::Bass(event) => self.on_bass(event, &mut confirms),
            Event::Iso(event) => self.on_iso(event, &mut confirms),
            Event::Cm(event) => self.on_cm(event, &mut confirms),
        }
        confirms
    }

    fn on_discovery(&mut self, event: DiscoveryEvent, confirms: &mut Vec<Confirm, MAX_CONFIRMS>) {
        let DiscoveryEvent::ServicesFound {
            cid,
            status,
            services,
        } = event;
        let Some(connection) = self.registry.find_connection_by_cid_mut(cid) else {
            defmt::debug!("discovery result for unknown cid {}", cid);
            return;
        };
        connection.awaiting_discovery = false;
        let role = connection.role;

        if status != 0 {
            connection.phase = ConnectionPhase::Ready;
            confirms
                .push(Confirm::Init {
                    cid,
                    role,
                    status: BapStatus::Error,
                })
                .ok();
            return;
        }

        let unicast = role.contains(crate::RoleMask::UNICAST_CLIENT);
        let assistant = role.contains(crate::RoleMask::BROADCAST_ASSISTANT);
        let mut outbox: Vec<Command, 3> = Vec::new();
        for (kind, range) in services {
            let wanted = match kind {
                ServiceKind::Ascs => unicast && connection.ascs.is_none(),
                ServiceKind::Pacs => unicast && connection.pacs.is_none(),
                ServiceKind::Bass => assistant && connection.bass.is_none(),
            };
            if !wanted {
                continue;
            }
            connection.barrier.arm();
            outbox
                .push(match kind {
                    ServiceKind::Ascs => Command::AscsInit { cid, range },
                    ServiceKind::Pacs => Command::PacsInit { cid, range },
                    ServiceKind::Bass => Command::BassInit { cid, range },
                })
                .ok();
        }

        if connection.barrier.is_idle() {
            // the required services were not on the peer
            connection.phase = ConnectionPhase::Ready;
            confirms
                .push(Confirm::Init {
                    cid,
                    role,
                    status: BapStatus::Error,
                })
                .ok();
            return;
        }
        for command in outbox {
            Self::send(&mut self.outbox, command);
        }
    }

    fn on_ascs(&mut self, event: AscsEvent, confirms: &mut Vec<Confirm, MAX_CONFIRMS>) {
        match event {
            AscsEvent::InitCfm {
                cid,
                handle,
                status,
            } => self.service_init_cfm(ServiceKind::Ascs, cid, handle, status, confirms),
            AscsEvent::WriteCfm { handle, status } => {
                let Some(cid) = self
                    .registry
                    .find_connection_by_ascs_handle(handle)
                    .map(|c| c.cid)
                else {
                    defmt::debug!("ASCS write cfm for unknown handle {}", handle);
                    return;
                };
                if status != 0 {
                    if let Some(group) = self.registry.find_stream_group_by_id_mut(cid) {
                        if let Some(procedure) = group.fail_procedure() {
                            confirms
                                .push(procedure_confirm(cid, procedure, BapStatus::Error))
                                .ok();
                        }
                    }
                }
            }
            AscsEvent::AseNotification {
                handle,
                ase_id,
                state,
            } => {
                let Some(connection) = self.registry.find_connection_by_ascs_handle(handle) else {
                    defmt::debug!("ASE notification for unknown handle {}", handle);
                    return;
                };
                let cid = connection.cid;
                if let Some(ase) = connection.find_ase_mut(ase_id) {
                    ase.state = state;
                }
                if let Some(group) = self.registry.find_stream_group_by_id_mut(cid) {
                    if let Some(procedure) = group.note_ase_notification(ase_id) {
                        confirms
                            .push(procedure_confirm(cid, procedure, BapStatus::Success))
                            .ok();
                    }
                }
            }
            AscsEvent::TerminateCfm { handle, status } => {
                self.service_terminate_cfm(ServiceKind::Ascs, handle, status, confirms);
            }
        }
    }

    fn on_pacs(&mut self, event: PacsEvent, confirms: &mut Vec<Confirm, MAX_CONFIRMS>) {
        match event {
            PacsEvent::InitCfm {
                cid,
                handle,
                status,
            } => self.service_init_cfm(ServiceKind::Pacs, cid, handle, status, confirms),
            PacsEvent::TerminateCfm { handle, status } => {
                self.service_terminate_cfm(ServiceKind::Pacs, handle, status, confirms);
            }
            PacsEvent::AudioRoleCfm {
                handle,
                direction,
                status,
            } => {
                let Some(cid) = self.pacs_cid(handle) else { return };
                confirms
                    .push(Confirm::AudioRole {
                        cid,
                        direction,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
            PacsEvent::PacRecordCfm {
                handle,
                direction,
                record,
                status,
            } => {
                let Some(cid) = self.pacs_cid(handle) else { return };
                if !record.is_empty() {
                    confirms
                        .push(Confirm::PacRecordInd {
                            cid,
                            direction,
                            record,
                        })
                        .ok();
                }
                confirms
                    .push(Confirm::RemoteAudioCapability {
                        cid,
                        direction,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
            PacsEvent::AudioLocationCfm {
                handle,
                direction,
                location,
                status,
            } => {
                let Some(cid) = self.pacs_cid(handle) else { return };
                confirms
                    .push(Confirm::RemoteAudioLocation {
                        cid,
                        direction,
                        location,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
            PacsEvent::AudioLocationWriteCfm { handle, status } => {
                let Some(cid) = self.pacs_cid(handle) else { return };
                confirms
                    .push(Confirm::RemoteAudioLocationSet {
                        cid,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
            PacsEvent::AudioContextCfm {
                handle,
                context,
                value,
                status,
            } => {
                let Some(cid) = self.pacs_cid(handle) else { return };
                confirms
                    .push(Confirm::AudioContext {
                        cid,
                        context,
                        value,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
            PacsEvent::NotificationCfm { handle, status } => {
                let Some(cid) = self.pacs_cid(handle) else { return };
                confirms
                    .push(Confirm::PacsNotificationRegistered {
                        cid,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
            PacsEvent::PacRecordInd {
                handle,
                direction,
                record,
            } => {
                let Some(cid) = self.pacs_cid(handle) else { return };
                confirms
                    .push(Confirm::PacRecordInd {
                        cid,
                        direction,
                        record,
                    })
                    .ok();
            }
            PacsEvent::AudioLocationInd {
                handle,
                direction,
                location,
            } => {
                let Some(cid) = self.pacs_cid(handle) else { return };
                confirms
                    .push(Confirm::AudioLocationInd {
                        cid,
                        direction,
                        location,
                    })
                    .ok();
            }
            PacsEvent::AudioContextInd { handle, value } => {
                let Some(cid) = self.pacs_cid(handle) else { return };
                confirms.push(Confirm::AudioContextInd { cid, value }).ok();
            }
        }
    }

    fn pacs_cid(&mut self, handle: ServiceHandle) -> Option<u32> {
        let cid = self
            .registry
            .find_connection_by_pacs_handle(handle)
            .map(|c| c.cid);
        if cid.is_none() {
            defmt::debug!("PACS event for unknown handle {}", handle);
        }
        cid
    }

    fn on_bass(&mut self, event: BassEvent, confirms: &mut Vec<Confirm, MAX_CONFIRMS>) {
        match event {
            BassEvent::InitCfm {
                cid,
                handle,
                status,
            } => self.service_init_cfm(ServiceKind::Bass, cid, handle, status, confirms),
            BassEvent::AddSourceCfm { handle, status } => {
                let Some(connection) = self.registry.find_connection_by_bass_handle(handle) else {
                    defmt::debug!("BASS event for unknown handle {}", handle);
                    return;
                };
                let cid = connection.cid;
                if let Some(assistant) = connection.assistant.as_mut() {
                    assistant.state = AssistantState::Idle;
                    // the id arrives with the broadcast receive state
                    assistant.mark_source_id_pending();
                }
                confirms
                    .push(Confirm::SourceAdded {
                        cid,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
            BassEvent::ModifySourceCfm { handle, status } => {
                let Some(connection) = self.registry.find_connection_by_bass_handle(handle) else {
                    defmt::debug!("BASS event for unknown handle {}", handle);
                    return;
                };
                let cid = connection.cid;
                if let Some(assistant) = connection.assistant.as_mut() {
                    assistant.state = AssistantState::Idle;
                }
                confirms
                    .push(Confirm::SourceModified {
                        cid,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
            BassEvent::RemoveSourceCfm { handle, status } => {
                let Some(connection) = self.registry.find_connection_by_bass_handle(handle) else {
                    defmt::debug!("BASS event for unknown handle {}", handle);
                    return;
                };
                let cid = connection.cid;
                if let Some(assistant) = connection.assistant.as_mut() {
                    assistant.state = AssistantState::Idle;
                    assistant.clear_source();
                }
                confirms
                    .push(Confirm::SourceRemoved {
                        cid,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
            BassEvent::ReceiveStateInd {
                handle,
                source_id,
                pa_sync_state,
                big_encryption,
            } => {
                let Some(connection) = self.registry.find_connection_by_bass_handle(handle) else {
                    defmt::debug!("BASS event for unknown handle {}", handle);
                    return;
                };
                let cid = connection.cid;
                if let Some(assistant) = connection.assistant.as_mut() {
                    if assistant.is_source_id_pending() {
                        assistant.set_source_id(source_id);
                    }
                }
                confirms
                    .push(Confirm::BroadcastReceiveStateInd {
                        cid,
                        source_id,
                        pa_sync_state,
                        big_encryption,
                    })
                    .ok();
            }
            BassEvent::TerminateCfm { handle, status } => {
                self.service_terminate_cfm(ServiceKind::Bass, handle, status, confirms);
            }
        }
    }

    fn on_iso(&mut self, event: IsoEvent, confirms: &mut Vec<Confirm, MAX_CONFIRMS>) {
        match event {
            IsoEvent::CigConfigureCfm {
                cig_id,
                cis_handles,
                status,
            } => {
                let Some(id) = self.cig_requester.take() else {
                    defmt::debug!("CIG configure cfm with no requester");
                    return;
                };
                if status == 0 {
                    if let Some(group) = self.registry.find_stream_group_by_id_mut(id) {
                        group.cig_id = cig_id;
                    }
                }
                confirms
                    .push(Confirm::CigConfigured {
                        id,
                        cig_id,
                        cis_handles,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
            IsoEvent::CigTestConfigureCfm {
                cig_id,
                cis_handles,
                status,
            } => {
                let Some(id) = self.cig_requester.take() else {
                    defmt::debug!("CIG test configure cfm with no requester");
                    return;
                };
                if status == 0 {
                    if let Some(group) = self.registry.find_stream_group_by_id_mut(id) {
                        group.cig_id = cig_id;
                    }
                }
                confirms
                    .push(Confirm::CigTestConfigured {
                        id,
                        cig_id,
                        cis_handles,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
            IsoEvent::RemoveCigCfm { cig_id, status } => {
                let Some(id) = self.cig_requester.take() else {
                    defmt::debug!("CIG remove cfm with no requester");
                    return;
                };
                confirms
                    .push(Confirm::CigRemoved {
                        id,
                        cig_id,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
            IsoEvent::CisConnectCfm { cis_handle, status } => {
                let Some(id) = self.registry.stream_group_id_by_cis_handle(cis_handle) else {
                    defmt::debug!("CIS connect cfm for unknown handle {}", cis_handle);
                    return;
                };
                if status != 0 {
                    if let Some(connection) = self.registry.find_connection_by_cid_mut(id) {
                        connection.reset_cis_handle(cis_handle);
                    }
                }
                confirms
                    .push(Confirm::CisConnected {
                        id,
                        cis_handle,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
            IsoEvent::CisDisconnectCfm { cis_handle, status } => {
                let Some(id) = self.registry.stream_group_id_by_cis_handle(cis_handle) else {
                    defmt::debug!("CIS disconnect cfm for unknown handle {}", cis_handle);
                    return;
                };
                // both paired ASEs observe the reset before the
                // application is notified
                if let Some(connection) = self.registry.find_connection_by_cid_mut(id) {
                    connection.reset_cis_handle(cis_handle);
                }
                confirms
                    .push(Confirm::CisDisconnected {
                        id,
                        cis_handle,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
            IsoEvent::CisDisconnectInd { cis_handle, reason } => {
                let Some(id) = self.registry.stream_group_id_by_cis_handle(cis_handle) else {
                    defmt::debug!("CIS disconnect ind for unknown handle {}", cis_handle);
                    return;
                };
                if let Some(connection) = self.registry.find_connection_by_cid_mut(id) {
                    connection.reset_cis_handle(cis_handle);
                }
                confirms
                    .push(Confirm::CisDisconnectInd {
                        id,
                        cis_handle,
                        reason,
                    })
                    .ok();
            }
            IsoEvent::SetupDataPathCfm { iso_handle, status } => {
                let id = self
                    .registry
                    .stream_group_id_by_cis_handle(iso_handle)
                    .unwrap_or(0);
                confirms
                    .push(Confirm::DataPathSetup {
                        iso_handle,
                        id,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
            IsoEvent::RemoveDataPathCfm { iso_handle, status } => {
                confirms
                    .push(Confirm::DataPathRemoved {
                        iso_handle,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
        }
    }

    fn on_cm(&mut self, event: CmEvent, confirms: &mut Vec<Confirm, MAX_CONFIRMS>) {
        match event {
            CmEvent::PeriodicSyncToTrainCfm {
                sync_handle,
                adv_sid: _,
                addr: _,
                status,
            } => {
                let Some(connection) =
                    self.connection_with_assistant_state(AssistantState::SyncingToSource)
                else {
                    defmt::debug!("sync-to-train cfm with no sync in progress");
                    return;
                };
                let cid = connection.cid;
                if let Some(assistant) = connection.assistant.as_mut() {
                    assistant.state = AssistantState::Idle;
                    if status == 0 {
                        assistant.sync_handle = sync_handle;
                    }
                }
                confirms
                    .push(Confirm::SyncToSourceStarted {
                        cid,
                        sync_handle,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
            CmEvent::PeriodicSyncToTrainCancelCfm { status } => {
                let Some(connection) =
                    self.connection_with_assistant_state(AssistantState::SyncingToSource)
                else {
                    defmt::debug!("sync cancel cfm with no sync in progress");
                    return;
                };
                let cid = connection.cid;
                if let Some(assistant) = connection.assistant.as_mut() {
                    assistant.state = AssistantState::Idle;
                }
                confirms
                    .push(Confirm::SyncToSourceCancelled {
                        cid,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
            CmEvent::PeriodicSyncTerminateCfm {
                sync_handle,
                status,
            } => {
                let Some(connection) = self.registry.connections_mut().find(|c| {
                    c.assistant
                        .as_ref()
                        .is_some_and(|a| a.sync_handle == sync_handle)
                }) else {
                    defmt::debug!("sync terminate cfm for unknown handle {}", sync_handle);
                    return;
                };
                let cid = connection.cid;
                if let Some(assistant) = connection.assistant.as_mut() {
                    if status == 0 {
                        assistant.sync_handle = 0;
                    }
                }
                confirms
                    .push(Confirm::SyncToSourceTerminated {
                        cid,
                        sync_handle,
                        status: BapStatus::from_external(status),
                    })
                    .ok();
            }
            CmEvent::PeriodicAdvSetTransferCfm { status } => {
                defmt::debug!("periodic adv set transfer cfm, status {}", status);
            }
            CmEvent::PeriodicScanSyncTransferCfm { status } => {
                defmt::debug!("periodic scan sync transfer cfm, status {}", status);
            }
            CmEvent::PeriodicSyncLostInd { sync_handle } => {
                if let Some(connection) = self.registry.connections_mut().find(|c| {
                    c.assistant
                        .as_ref()
                        .is_some_and(|a| a.sync_handle == sync_handle)
                }) {
                    if let Some(assistant) = connection.assistant.as_mut() {
                        assistant.sync_handle = 0;
                    }
                }
            }
        }
    }

    fn service_init_cfm(
        &mut self,
        kind: ServiceKind,
        cid: u32,
        handle: ServiceHandle,
        status: u8,
        confirms: &mut Vec<Confirm, MAX_CONFIRMS>,
    ) {
        let mut finish: Option<(crate::RoleMask, BapStatus, bool)> = None;
        {
            let Some(connection) = self.registry.find_connection_by_cid_mut(cid) else {
                defmt::debug!("service init cfm for unknown cid {}", cid);
                return;
            };
            let status = BapStatus::from_external(status);
            if status.is_success() {
                connection.set_service_handle(kind, handle);
            }
            let done = connection.barrier.complete(status);
            if done
                && !connection.awaiting_discovery
                && connection.phase == ConnectionPhase::Initializing
            {
                connection.phase = ConnectionPhase::Ready;
                finish = Some((
                    connection.role,
                    connection.barrier.status(),
                    connection.deinit_pending,
                ));
            }
        }
        if let Some((role, status, deinit_pending)) = finish {
            confirms.push(Confirm::Init { cid, role, status }).ok();
            if deinit_pending {
                if let Some(confirm) = self.begin_teardown(cid) {
                    confirms.push(confirm).ok();
                }
            }
        }
    }

    fn service_terminate_cfm(
        &mut self,
        kind: ServiceKind,
        handle: ServiceHandle,
        status: u8,
        confirms: &mut Vec<Confirm, MAX_CONFIRMS>,
    ) {
        let mut destroy: Option<(u32, crate::RoleMask, BapStatus)> = None;
        {
            let connection = match kind {
                ServiceKind::Ascs => self.registry.find_connection_by_ascs_handle(handle),
                ServiceKind::Pacs => self.registry.find_connection_by_pacs_handle(handle),
                ServiceKind::Bass => self.registry.find_connection_by_bass_handle(handle),
            };
            let Some(connection) = connection else {
                defmt::debug!("terminate cfm for unknown handle {}", handle);
                return;
            };
            // decremented on every termination, success or not
            let done = connection.barrier.complete(BapStatus::from_external(status));
            if done && connection.phase == ConnectionPhase::Deinitializing {
                destroy = Some((
                    connection.cid,
                    connection.role,
                    connection.barrier.status(),
                ));
            }
        }
        if let Some((cid, role, status)) = destroy {
            self.registry.remove_stream_group_by_id(cid);
            self.registry.remove_connection_by_cid(cid);
            confirms.push(Confirm::Destroyed { cid, role, status }).ok();
        }
    }

    fn connection_with_assistant_state(
        &mut self,
        state: AssistantState,
    ) -> Option<&mut crate::Connection> {
        self.registry
            .connections_mut()
            .find(|c| c.assistant.as_ref().is_some_and(|a| a.state == state))
    }
}

fn procedure_confirm(id: u32, procedure: Procedure, status: BapStatus) -> Confirm {
    match procedure {
        Procedure::CodecConfigure => Confirm::CodecConfigured { id, status },
        Procedure::QosConfigure => Confirm::QosConfigured { id, status },
        Procedure::Enable => Confirm::Enabled { id, status },
        Procedure::ReceiverStartReady => Confirm::ReceiverReady {
            id,
            ready: ReadyKind::Start,
            status,
        },
        Procedure::ReceiverStopReady => Confirm::ReceiverReady {
            id,
            ready: ReadyKind::Stop,
            status,
        },
        Procedure::UpdateMetadata => Confirm::MetadataUpdated { id, status },
        Procedure::Disable => Confirm::Disabled { id, status },
        Procedure::Release => Confirm::Released { id, status },
    }
}

/// Feed one external-layer event into the dispatcher
pub async fn submit_event(event: Event) {
    EVENT_CHANNEL.sender().send(event).await;
}

/// Receive the next command for the platform integration to deliver
pub async fn next_command() -> Command {
    COMMAND_CHANNEL.receiver().receive().await
}

/// Run the dispatcher: owns the client context and multiplexes requests
/// and events, processing each to completion before the next
pub async fn run() -> ! {
    let mut client = BapClient::new();
    let request_receiver = REQUEST_CHANNEL.receiver();
    let event_receiver = EVENT_CHANNEL.receiver();
    let confirm_sender = CONFIRM_CHANNEL.sender();
    let command_sender = COMMAND_CHANNEL.sender();

    loop {
        match select(request_receiver.receive(), event_receiver.receive()).await {
            Either::First(request) => {
                defmt::debug!("[DISPATCHER] request: {:?}", defmt::Debug2Format(&request));
                let confirm = client.process_request(request);
                for command in client.take_commands() {
                    command_sender.send(command).await;
                }
                if let Some(confirm) = confirm {
                    confirm_sender.send(confirm).await;
                }
            }
            Either::Second(event) => {
                defmt::debug!("[DISPATCHER] event: {:?}", defmt::Debug2Format(&event));
                let confirms = client.process_event(event);
                for command in client.take_commands() {
                    command_sender.send(command).await;
                }
                for confirm in confirms {
                    confirm_sender.send(confirm).await;
                }
            }
        }
    }
}
