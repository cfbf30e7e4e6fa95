//! `BapClient` request processing
//!
//! One context object owns the entity registry and a command outbox. Every
//! application request is processed to completion: local validation
//! failures return their confirmation immediately and leave the outbox
//! untouched, everything else emits fire-and-forget commands whose results
//! re-enter as events and produce the confirmation there.

use bt_hci::param::{ConnHandle, DisconnectReason};
use heapless::Vec;

use crate::assistant::{past_service_data, AssistantState};
use crate::connection::{Connection, ConnectionPhase};
use crate::constants::{MAX_ASES, MAX_CIS, MAX_OUTBOX, MAX_PAC_RECORDS};
use crate::dispatcher::{AscsOp, Command};
use crate::iso::cig::{configure_cig_id_accepted, remove_cig_id_accepted, CisConnection};
use crate::iso::data_path::{build_codec_config, iso_handle_valid, DataPathParams};
use crate::registry::Registry;
use crate::stream_group::{Procedure, StreamGroup};
use crate::{
    AddSourceParams, AseCodecParams, AseEnableParams, AseMetadataParams, AseQosParams, BapStatus,
    BroadcastAssistant, Confirm, LeAddress, ModifySourceParams, PacDirection, PacRecord, PaSyncMode,
    ReadyKind, Request, RoleMask, ServiceKind, ServiceRanges,
};

/// The BAP client context: entity registry, local PAC records and the
/// command outbox drained by the dispatcher task
#[derive(Debug, Default)]
pub struct BapClient {
    pub(crate) registry: Registry,
    pac_records: Vec<PacRecord, MAX_PAC_RECORDS>,
    next_pac_record_id: u16,
    /// Stream group id awaiting the outstanding CIG confirmation
    pub(crate) cig_requester: Option<u32>,
    pub(crate) outbox: Vec<Command, MAX_OUTBOX>,
}

impl BapClient {
    /// Create an empty client context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read access to the entity registry
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Take the commands emitted by the last processed request or event
    pub fn take_commands(&mut self) -> Vec<Command, MAX_OUTBOX> {
        core::mem::take(&mut self.outbox)
    }

    pub(crate) fn send(outbox: &mut Vec<Command, MAX_OUTBOX>, command: Command) {
        if outbox.push(command).is_err() {
            defmt::error!("command outbox overflow, command dropped");
        }
    }

    /// Process one application request. Returns the confirmation when it
    /// is available synchronously; otherwise the confirmation is produced
    /// by a later event.
    pub fn process_request(&mut self, request: Request) -> Option<Confirm> {
        match request {
            Request::Init {
                cid,
                addr,
                role,
                handles,
            } => self.handle_init(cid, addr, role, handles),
            Request::Deinit { cid, role } => self.handle_deinit(cid, role),
            Request::AddPacRecord {
                direction,
                codec_id,
            } => Some(self.handle_add_pac_record(direction, codec_id)),
            Request::RemovePacRecord { record_id } => {
                Some(self.handle_remove_pac_record(record_id))
            }
            Request::DiscoverAudioRole { cid, direction } => self
                .pacs_request(cid, |handle| Command::PacsFindAudioRole { handle, direction })
                .map(|status| Confirm::AudioRole {
                    cid,
                    direction,
                    status,
                }),
            Request::DiscoverRemoteAudioCapability { cid, direction } => self
                .pacs_request(cid, |handle| Command::PacsReadRecords { handle, direction })
                .map(|status| Confirm::RemoteAudioCapability {
                    cid,
                    direction,
                    status,
                }),
            Request::RegisterPacsNotification {
                cid,
                notify_type,
                enable,
            } => self
                .pacs_request(cid, |handle| Command::PacsRegisterNotification {
                    handle,
                    notify_type,
                    enable,
                })
                .map(|status| Confirm::PacsNotificationRegistered { cid, status }),
            Request::GetRemoteAudioLocation { cid, direction } => self
                .pacs_request(cid, |handle| Command::PacsReadLocation { handle, direction })
                .map(|status| Confirm::RemoteAudioLocation {
                    cid,
                    direction,
                    location: 0,
                    status,
                }),
            Request::SetRemoteAudioLocation {
                cid,
                direction,
                location,
            } => self
                .pacs_request(cid, |handle| Command::PacsWriteLocation {
                    handle,
                    direction,
                    location,
                })
                .map(|status| Confirm::RemoteAudioLocationSet { cid, status }),
            Request::DiscoverAudioContext { cid, context } => self
                .pacs_request(cid, |handle| Command::PacsReadContext { handle, context })
                .map(|status| Confirm::AudioContext {
                    cid,
                    context,
                    value: 0,
                    status,
                }),
            Request::CodecConfigure { id, ases } => self.handle_codec_configure(id, ases),
            Request::CigConfigure { id, params } => {
                if !configure_cig_id_accepted(params.cig_id) {
                    return Some(Confirm::CigConfigured {
                        id,
                        cig_id: params.cig_id,
                        cis_handles: Vec::new(),
                        status: BapStatus::InvalidParameter,
                    });
                }
                self.cig_requester = Some(id);
                Self::send(&mut self.outbox, Command::ConfigureCig { params });
                None
            }
            Request::CigTestConfigure { id, params } => {
                if !configure_cig_id_accepted(params.cig_id) {
                    return Some(Confirm::CigTestConfigured {
                        id,
                        cig_id: params.cig_id,
                        cis_handles: Vec::new(),
                        status: BapStatus::InvalidParameter,
                    });
                }
                self.cig_requester = Some(id);
                Self::send(&mut self.outbox, Command::ConfigureCigTest { params });
                None
            }
            Request::CigRemove { id, cig_id } => {
                if !remove_cig_id_accepted(cig_id) {
                    return Some(Confirm::CigRemoved {
                        id,
                        cig_id,
                        status: BapStatus::InvalidParameter,
                    });
                }
                self.cig_requester = Some(id);
                Self::send(&mut self.outbox, Command::RemoveCig { cig_id });
                None
            }
            Request::QosConfigure { id, ases } => self.handle_qos_configure(id, ases),
            Request::Enable { id, ases } => self.handle_enable(id, ases),
            Request::Disable { id, ase_ids } => self.handle_ase_id_procedure(
                id,
                ase_ids,
                Procedure::Disable,
                AscsOp::Disable,
                |status| Confirm::Disabled { id, status },
            ),
            Request::Release { id, ase_ids } => self.handle_ase_id_procedure(
                id,
                ase_ids,
                Procedure::Release,
                AscsOp::Release,
                |status| Confirm::Released { id, status },
            ),
            Request::UpdateMetadata { id, ases } => self.handle_update_metadata(id, ases),
            Request::ReceiverReady { id, ready, ase_ids } => {
                let (procedure, op): (Procedure, fn(Vec<u8, MAX_ASES>) -> AscsOp) = match ready {
                    ReadyKind::Start => (Procedure::ReceiverStartReady, AscsOp::ReceiverStartReady),
                    ReadyKind::Stop => (Procedure::ReceiverStopReady, AscsOp::ReceiverStopReady),
                };
                self.handle_ase_id_procedure(id, ase_ids, procedure, op, |status| {
                    Confirm::ReceiverReady { id, ready, status }
                })
            }
            Request::CisConnect { id, cises } => self.handle_cis_connect(id, cises),
            Request::CisDisconnect { id, cis_handle } => {
                self.handle_cis_disconnect(id, cis_handle)
            }
            Request::SetupDataPath { cid, params } => self.handle_setup_data_path(cid, params),
            Request::RemoveDataPath {
                cid: _,
                iso_handle,
                direction,
            } => {
                if !iso_handle_valid(iso_handle) {
                    return Some(Confirm::DataPathRemoved {
                        iso_handle,
                        status: BapStatus::InvalidParameter,
                    });
                }
                Self::send(
                    &mut self.outbox,
                    Command::RemoveIsoDataPath {
                        handle: ConnHandle::new(iso_handle),
                        direction,
                    },
                );
                None
            }
            Request::SetControlPointOp {
                cid,
                response_op,
                long_write,
            } => Some(self.handle_set_control_point_op(cid, response_op, long_write)),
            Request::AddSource { cid, params } => self.handle_add_source(cid, params),
            Request::ModifySource { cid, params } => self.handle_modify_source(cid, params),
            Request::RemoveSource { cid, source_id } => self.handle_remove_source(cid, source_id),
            Request::SyncToSourceStart { cid, addr, adv_sid } => {
                self.handle_sync_start(cid, addr, adv_sid)
            }
            Request::SyncToSourceCancel { cid } => self.handle_sync_cancel(cid),
            Request::SyncToSourceTerminate { cid, sync_handle } => {
                self.handle_sync_terminate(cid, sync_handle)
            }
        }
    }

    fn handle_init(
        &mut self,
        cid: u32,
        addr: LeAddress,
        role: RoleMask,
        handles: Option<ServiceRanges>,
    ) -> Option<Confirm> {
        let unicast = role.contains(RoleMask::UNICAST_CLIENT);
        let assistant = role.contains(RoleMask::BROADCAST_ASSISTANT);
        if !unicast && !assistant {
            return Some(Confirm::Init {
                cid,
                role,
                status: BapStatus::NotSupported,
            });
        }

        if let Err(status) = self.registry.add_connection(Connection::new(cid, addr, role)) {
            return Some(Confirm::Init { cid, role, status });
        }
        let Some(connection) = self.registry.find_connection_by_cid_mut(cid) else {
            return Some(Confirm::Init {
                cid,
                role,
                status: BapStatus::Error,
            });
        };

        let ranges = handles.unwrap_or_default();
        let mut missing: Vec<ServiceKind, 3> = Vec::new();
        if unicast {
            match ranges.ascs {
                Some(range) => {
                    connection.barrier.arm();
                    Self::send(&mut self.outbox, Command::AscsInit { cid, range });
                }
                None => {
                    missing.push(ServiceKind::Ascs).ok();
                }
            }
            match ranges.pacs {
                Some(range) => {
                    connection.barrier.arm();
                    Self::send(&mut self.outbox, Command::PacsInit { cid, range });
                }
                None => {
                    missing.push(ServiceKind::Pacs).ok();
                }
            }
        }
        if assistant {
            match ranges.bass {
                Some(range) => {
                    connection.barrier.arm();
                    Self::send(&mut self.outbox, Command::BassInit { cid, range });
                }
                None => {
                    missing.push(ServiceKind::Bass).ok();
                }
            }
        }

        if !missing.is_empty() {
            connection.awaiting_discovery = true;
            Self::send(
                &mut self.outbox,
                Command::DiscoverServices {
                    cid,
                    services: missing,
                },
            );
        }
        None
    }

    fn handle_deinit(&mut self, cid: u32, role: RoleMask) -> Option<Confirm> {
        let Some(connection) = self.registry.find_connection_by_cid_mut(cid) else {
            return Some(Confirm::Destroyed {
                cid,
                role,
                status: BapStatus::ArgError,
            });
        };
        if connection.phase == ConnectionPhase::Initializing
            && (!connection.barrier.is_idle() || connection.awaiting_discovery)
        {
            // satisfied by the natural init completions, then torn down
            connection.deinit_pending = true;
            return None;
        }
        self.begin_teardown(cid)
    }

    /// Issue the sub-service terminations and arm the completion barrier.
    /// Destroys the connection immediately when nothing is outstanding.
    pub(crate) fn begin_teardown(&mut self, cid: u32) -> Option<Confirm> {
        let Some(connection) = self.registry.find_connection_by_cid_mut(cid) else {
            return None;
        };
        connection.phase = ConnectionPhase::Deinitializing;
        connection.deinit_pending = false;
        connection.barrier.reset();
        let role = connection.role;

        if role.contains(RoleMask::UNICAST_CLIENT) {
            if let Some(handle) = connection.ascs {
                connection.barrier.arm();
                Self::send(&mut self.outbox, Command::AscsTerminate { handle });
            }
            if let Some(handle) = connection.pacs {
                connection.barrier.arm();
                Self::send(&mut self.outbox, Command::PacsTerminate { handle });
            }
        }
        if role.contains(RoleMask::BROADCAST_ASSISTANT) {
            if let Some(handle) = connection.bass {
                connection.barrier.arm();
                Self::send(&mut self.outbox, Command::BassTerminate { handle });
            }
        }

        if connection.barrier.is_idle() {
            self.registry.remove_stream_group_by_id(cid);
            self.registry.remove_connection_by_cid(cid);
            return Some(Confirm::Destroyed {
                cid,
                role,
                status: BapStatus::Success,
            });
        }
        None
    }

    fn handle_add_pac_record(
        &mut self,
        direction: PacDirection,
        codec_id: crate::CodecId,
    ) -> Confirm {
        self.next_pac_record_id += 1;
        let record = PacRecord {
            id: self.next_pac_record_id,
            direction,
            codec_id,
        };
        match self.pac_records.push(record) {
            Ok(()) => Confirm::PacRecordAdded {
                record_id: record.id,
                status: BapStatus::Success,
            },
            Err(_) => Confirm::PacRecordAdded {
                record_id: 0,
                status: BapStatus::InsufficientResources,
            },
        }
    }

    fn handle_remove_pac_record(&mut self, record_id: u16) -> Confirm {
        let status = match self.pac_records.iter().position(|r| r.id == record_id) {
            Some(index) => {
                self.pac_records.swap_remove(index);
                BapStatus::Success
            }
            None => BapStatus::Error,
        };
        Confirm::PacRecordRemoved { record_id, status }
    }

    /// Resolve a connection's PACS client and emit one command against it.
    /// Returns the failure status for the caller's confirmation, or `None`
    /// when the command was issued and the confirmation is asynchronous.
    fn pacs_request(
        &mut self,
        cid: u32,
        command: impl FnOnce(crate::ServiceHandle) -> Command,
    ) -> Option<BapStatus> {
        let Some(connection) = self.registry.find_connection_by_cid(cid) else {
            return Some(BapStatus::ArgError);
        };
        let Some(handle) = connection.pacs else {
            return Some(BapStatus::Error);
        };
        Self::send(&mut self.outbox, command(handle));
        None
    }

    fn handle_codec_configure(
        &mut self,
        id: u32,
        ases: Vec<AseCodecParams, MAX_ASES>,
    ) -> Option<Confirm> {
        if ases.is_empty() {
            return Some(Confirm::CodecConfigured {
                id,
                status: BapStatus::ArgError,
            });
        }
        let Some(connection) = self.registry.find_connection_by_cid_mut(id) else {
            return Some(Confirm::CodecConfigured {
                id,
                status: BapStatus::ArgError,
            });
        };
        let Some(ascs) = connection.ascs else {
            return Some(Confirm::CodecConfigured {
                id,
                status: BapStatus::Error,
            });
        };
        for params in &ases {
            let created = connection
                .ensure_ase(params.ase_id, params.direction)
                .map(|ase| ase.codec_id = Some(params.codec_id));
            if let Err(status) = created {
                return Some(Confirm::CodecConfigured { id, status });
            }
            if let Err(status) =
                connection.bind_ase_to_cis(params.ase_id, params.direction, params.cis_id)
            {
                return Some(Confirm::CodecConfigured { id, status });
            }
        }

        // one stream group per connection: created on first configure,
        // updated in place afterwards
        if self.registry.find_stream_group_by_id(id).is_none() {
            if let Err(status) = self.registry.add_stream_group(StreamGroup::new(id)) {
                return Some(Confirm::CodecConfigured { id, status });
            }
        }
        let Some(group) = self.registry.find_stream_group_by_id_mut(id) else {
            return Some(Confirm::CodecConfigured {
                id,
                status: BapStatus::Error,
            });
        };
        for params in &ases {
            group.track_ase(params.ase_id);
        }
        group.begin_procedure(Procedure::CodecConfigure, ases.len() as u8);

        Self::send(
            &mut self.outbox,
            Command::AscsWrite {
                handle: ascs,
                op: AscsOp::ConfigCodec(ases),
            },
        );
        None
    }

    fn handle_qos_configure(
        &mut self,
        id: u32,
        ases: Vec<AseQosParams, MAX_ASES>,
    ) -> Option<Confirm> {
        let reject = |status| {
            Some(Confirm::QosConfigured { id, status })
        };
        if ases.is_empty() || self.registry.find_stream_group_by_id(id).is_none() {
            return reject(BapStatus::ArgError);
        }
        let Some(connection) = self.registry.find_connection_by_cid_mut(id) else {
            return reject(BapStatus::ArgError);
        };
        let Some(ascs) = connection.ascs else {
            return reject(BapStatus::Error);
        };
        if ases.iter().any(|p| connection.find_ase(p.ase_id).is_none()) {
            return reject(BapStatus::ArgError);
        }

        // apply the parameters onto the ASEs first, so a later CIS connect
        // reads them back from the model
        for params in &ases {
            if let Some(ase) = connection.find_ase_mut(params.ase_id) {
                ase.iso = params.iso;
            }
            connection.set_cis_cig_id(params.cis_id, params.cig_id);
        }

        let cig_id = ases.first().map_or(0, |p| p.cig_id);
        if let Some(group) = self.registry.find_stream_group_by_id_mut(id) {
            group.cig_id = cig_id;
            group.begin_procedure(Procedure::QosConfigure, ases.len() as u8);
        }
        Self::send(
            &mut self.outbox,
            Command::AscsWrite {
                handle: ascs,
                op: AscsOp::ConfigQos(ases),
            },
        );
        None
    }

    fn handle_enable(&mut self, id: u32, ases: Vec<AseEnableParams, MAX_ASES>) -> Option<Confirm> {
        let reject = |status| Some(Confirm::Enabled { id, status });
        let count = ases.len() as u8;
        if ases.is_empty() {
            return reject(BapStatus::ArgError);
        }
        let Some(group) = self.registry.find_stream_group_by_id(id) else {
            return reject(BapStatus::ArgError);
        };
        if ases.iter().any(|p| !group.contains_ase(p.ase_id)) {
            return reject(BapStatus::ArgError);
        }
        let Some(ascs) = self.ascs_handle(id) else {
            return reject(BapStatus::Error);
        };
        if let Some(group) = self.registry.find_stream_group_by_id_mut(id) {
            group.begin_procedure(Procedure::Enable, count);
        }
        Self::send(
            &mut self.outbox,
            Command::AscsWrite {
                handle: ascs,
                op: AscsOp::Enable(ases),
            },
        );
        None
    }

    fn handle_update_metadata(
        &mut self,
        id: u32,
        ases: Vec<AseMetadataParams, MAX_ASES>,
    ) -> Option<Confirm> {
        let reject = |status| Some(Confirm::MetadataUpdated { id, status });
        let count = ases.len() as u8;
        if ases.is_empty() {
            return reject(BapStatus::ArgError);
        }
        let Some(group) = self.registry.find_stream_group_by_id(id) else {
            return reject(BapStatus::ArgError);
        };
        if ases.iter().any(|p| !group.contains_ase(p.ase_id)) {
            return reject(BapStatus::ArgError);
        }
        let Some(ascs) = self.ascs_handle(id) else {
            return reject(BapStatus::Error);
        };
        if let Some(group) = self.registry.find_stream_group_by_id_mut(id) {
            group.begin_procedure(Procedure::UpdateMetadata, count);
        }
        Self::send(
            &mut self.outbox,
            Command::AscsWrite {
                handle: ascs,
                op: AscsOp::UpdateMetadata(ases),
            },
        );
        None
    }

    /// Shared shape of disable/release/receiver-ready: resolve the group,
    /// check the ASE ids, begin the procedure and write the operation.
    fn handle_ase_id_procedure(
        &mut self,
        id: u32,
        ase_ids: Vec<u8, MAX_ASES>,
        procedure: Procedure,
        op: fn(Vec<u8, MAX_ASES>) -> AscsOp,
        confirm: impl FnOnce(BapStatus) -> Confirm,
    ) -> Option<Confirm> {
        let count = ase_ids.len() as u8;
        if ase_ids.is_empty() {
            return Some(confirm(BapStatus::ArgError));
        }
        let Some(group) = self.registry.find_stream_group_by_id(id) else {
            return Some(confirm(BapStatus::ArgError));
        };
        if ase_ids.iter().any(|ase_id| !group.contains_ase(*ase_id)) {
            return Some(confirm(BapStatus::ArgError));
        }
        let Some(ascs) = self.ascs_handle(id) else {
            return Some(confirm(BapStatus::Error));
        };
        if let Some(group) = self.registry.find_stream_group_by_id_mut(id) {
            group.begin_procedure(procedure, count);
        }
        Self::send(
            &mut self.outbox,
            Command::AscsWrite {
                handle: ascs,
                op: op(ase_ids),
            },
        );
        None
    }

    fn handle_cis_connect(
        &mut self,
        id: u32,
        cises: Vec<CisConnection, MAX_CIS>,
    ) -> Option<Confirm> {
        let reject = |status| {
            Some(Confirm::CisConnected {
                id,
                cis_handle: 0,
                status,
            })
        };
        if cises.is_empty() || self.registry.find_stream_group_by_id(id).is_none() {
            return reject(BapStatus::ArgError);
        }
        let Some(connection) = self.registry.find_connection_by_cid_mut(id) else {
            return reject(BapStatus::ArgError);
        };
        if cises.iter().any(|c| connection.find_cis(c.cis_id).is_none()) {
            return reject(BapStatus::ArgError);
        }
        for cis in &cises {
            connection.set_cis_handle(cis.cis_id, cis.cis_handle);
        }
        Self::send(&mut self.outbox, Command::ConnectCis { cises });
        None
    }

    fn handle_cis_disconnect(&mut self, id: u32, cis_handle: u16) -> Option<Confirm> {
        let reject = |status| {
            Some(Confirm::CisDisconnected {
                id,
                cis_handle,
                status,
            })
        };
        if self.registry.find_stream_group_by_id(id).is_none() {
            return reject(BapStatus::ArgError);
        }
        let Some(connection) = self.registry.find_connection_by_cid(id) else {
            return reject(BapStatus::ArgError);
        };
        if connection.find_cis_by_handle(cis_handle).is_none() {
            return reject(BapStatus::ArgError);
        }
        Self::send(
            &mut self.outbox,
            Command::DisconnectCis {
                handle: ConnHandle::new(cis_handle),
                reason: DisconnectReason::RemoteUserTerminatedConn,
            },
        );
        None
    }

    fn handle_setup_data_path(&mut self, cid: u32, params: DataPathParams) -> Option<Confirm> {
        if !iso_handle_valid(params.iso_handle) {
            return Some(Confirm::DataPathSetup {
                iso_handle: params.iso_handle,
                id: cid,
                status: BapStatus::InvalidParameter,
            });
        }
        let config = build_codec_config(&params.codec_id, &params.codec_config, &params.vendor_data);
        Self::send(
            &mut self.outbox,
            Command::SetupIsoDataPath {
                handle: ConnHandle::new(params.iso_handle),
                direction: params.direction,
                path_id: params.path_id,
                codec_id: params.codec_id.to_bytes(),
                controller_delay: params.controller_delay,
                config,
            },
        );
        None
    }

    fn handle_set_control_point_op(
        &mut self,
        cid: u32,
        response_op: bool,
        long_write: bool,
    ) -> Confirm {
        let Some(connection) = self.registry.find_connection_by_cid_mut(cid) else {
            return Confirm::ControlPointOpSet {
                cid,
                status: BapStatus::ArgError,
            };
        };
        if let Some(assistant) = connection.assistant.as_mut() {
            assistant.response_op = response_op;
            assistant.long_write = long_write;
        }
        Confirm::ControlPointOpSet {
            cid,
            status: BapStatus::Success,
        }
    }

    fn handle_add_source(&mut self, cid: u32, params: AddSourceParams) -> Option<Confirm> {
        let reject = |status| Some(Confirm::SourceAdded { cid, status });
        let Some(connection) = self.registry.find_connection_by_cid_mut(cid) else {
            return reject(BapStatus::ArgError);
        };
        let Some(handle) = connection.bass else {
            return reject(BapStatus::Error);
        };
        let Some(assistant) = connection.assistant.as_mut() else {
            return reject(BapStatus::NotSupported);
        };
        if assistant.state != AssistantState::Idle {
            return reject(BapStatus::Error);
        }
        if let Err(status) = BroadcastAssistant::validate_add(&params) {
            return reject(status);
        }

        assistant.store_source(&params);
        assistant.state = AssistantState::AddingSource;
        let no_response = !assistant.response_op;
        let long_write = assistant.long_write;

        if params.pa_sync == PaSyncMode::SynchronizePast {
            // the id is still unassigned at add time
            let service_data = past_service_data(
                0,
                params.collocated,
                &params.advertiser_addr,
                &params.source_addr,
            );
            let transfer = if params.collocated {
                Command::PeriodicAdvSetTransfer {
                    cid,
                    service_data,
                    adv_handle: params.adv_handle,
                }
            } else {
                Command::PeriodicScanSyncTransfer {
                    cid,
                    service_data,
                    sync_handle: params.sync_handle,
                }
            };
            Self::send(&mut self.outbox, transfer);
        }

        Self::send(
            &mut self.outbox,
            Command::BassAddSource {
                handle,
                params,
                no_response,
                long_write,
            },
        );
        None
    }

    fn handle_modify_source(&mut self, cid: u32, params: ModifySourceParams) -> Option<Confirm> {
        let reject = |status| Some(Confirm::SourceModified { cid, status });
        let Some(connection) = self.registry.find_connection_by_cid_mut(cid) else {
            return reject(BapStatus::ArgError);
        };
        let Some(handle) = connection.bass else {
            return reject(BapStatus::Error);
        };
        let Some(assistant) = connection.assistant.as_mut() else {
            return reject(BapStatus::NotSupported);
        };
        if assistant.state != AssistantState::Idle {
            return reject(BapStatus::Error);
        }

        assistant.update_source(&params);
        assistant.state = AssistantState::ModifyingSource;
        let no_response = !assistant.response_op;
        let source_addr = assistant.source_addr;

        if params.pa_sync == PaSyncMode::SynchronizePast {
            let addr = source_addr.unwrap_or(LeAddress::public([0; 6]));
            let service_data =
                past_service_data(params.source_id, params.collocated, &addr, &addr);
            let transfer = if params.collocated {
                Command::PeriodicAdvSetTransfer {
                    cid,
                    service_data,
                    adv_handle: params.adv_handle,
                }
            } else {
                Command::PeriodicScanSyncTransfer {
                    cid,
                    service_data,
                    sync_handle: params.sync_handle,
                }
            };
            Self::send(&mut self.outbox, transfer);
        }

        Self::send(
            &mut self.outbox,
            Command::BassModifySource {
                handle,
                params,
                no_response,
            },
        );
        None
    }

    fn handle_remove_source(&mut self, cid: u32, source_id: u8) -> Option<Confirm> {
        let reject = |status| Some(Confirm::SourceRemoved { cid, status });
        let Some(connection) = self.registry.find_connection_by_cid_mut(cid) else {
            return reject(BapStatus::ArgError);
        };
        let Some(handle) = connection.bass else {
            return reject(BapStatus::Error);
        };
        let Some(assistant) = connection.assistant.as_mut() else {
            return reject(BapStatus::NotSupported);
        };
        if assistant.state != AssistantState::Idle {
            return reject(BapStatus::Error);
        }
        assistant.state = AssistantState::RemovingSource;
        let no_response = !assistant.response_op;
        Self::send(
            &mut self.outbox,
            Command::BassRemoveSource {
                handle,
                source_id,
                no_response,
            },
        );
        None
    }

    fn handle_sync_start(&mut self, cid: u32, addr: LeAddress, adv_sid: u8) -> Option<Confirm> {
        let reject = |status| {
            Some(Confirm::SyncToSourceStarted {
                cid,
                sync_handle: 0,
                status,
            })
        };
        let Some(connection) = self.registry.find_connection_by_cid_mut(cid) else {
            return reject(BapStatus::ArgError);
        };
        let Some(assistant) = connection.assistant.as_mut() else {
            return reject(BapStatus::NotSupported);
        };
        if assistant.state != AssistantState::Idle {
            return reject(BapStatus::Error);
        }
        assistant.state = AssistantState::SyncingToSource;
        assistant.source_addr = Some(addr);
        assistant.adv_sid = adv_sid;
        Self::send(
            &mut self.outbox,
            Command::PeriodicScanSyncToTrain { addr, adv_sid },
        );
        None
    }

    fn handle_sync_cancel(&mut self, cid: u32) -> Option<Confirm> {
        let reject = |status| Some(Confirm::SyncToSourceCancelled { cid, status });
        let Some(connection) = self.registry.find_connection_by_cid_mut(cid) else {
            return reject(BapStatus::ArgError);
        };
        let Some(assistant) = connection.assistant.as_mut() else {
            return reject(BapStatus::NotSupported);
        };
        if assistant.state != AssistantState::SyncingToSource {
            return reject(BapStatus::Error);
        }
        Self::send(&mut self.outbox, Command::PeriodicScanSyncCancel);
        None
    }

    fn handle_sync_terminate(&mut self, cid: u32, sync_handle: u16) -> Option<Confirm> {
        let reject = |status| {
            Some(Confirm::SyncToSourceTerminated {
                cid,
                sync_handle,
                status,
            })
        };
        let Some(connection) = self.registry.find_connection_by_cid_mut(cid) else {
            return reject(BapStatus::ArgError);
        };
        let Some(assistant) = connection.assistant.as_ref() else {
            return reject(BapStatus::NotSupported);
        };
        if assistant.state != AssistantState::Idle {
            return reject(BapStatus::Error);
        }
        Self::send(
            &mut self.outbox,
            Command::PeriodicScanSyncTerminate { sync_handle },
        );
        None
    }

    fn ascs_handle(&self, id: u32) -> Option<crate::ServiceHandle> {
        self.registry.find_connection_by_cid(id).and_then(|c| c.ascs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ase::AseDirection;
    use crate::iso::cig::CigParams;
    use crate::iso::data_path::{
        CodecConfiguration, CodecId, FrameDuration, SamplingFrequency, DATAPATH_DIRECTION_OUTPUT,
        DATAPATH_ID_HCI,
    };
    use crate::ServiceRange;

    fn addr() -> LeAddress {
        LeAddress::public([0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC])
    }

    fn ranges() -> ServiceRanges {
        ServiceRanges {
            ascs: Some(ServiceRange { start: 0x10, end: 0x20 }),
            pacs: Some(ServiceRange { start: 0x30, end: 0x40 }),
            bass: Some(ServiceRange { start: 0x50, end: 0x60 }),
        }
    }

    /// A client with one ready unicast+assistant connection
    fn ready_client(cid: u32) -> BapClient {
        let mut client = BapClient::new();
        let confirm = client.process_request(Request::Init {
            cid,
            addr: addr(),
            role: RoleMask::UNICAST_CLIENT | RoleMask::BROADCAST_ASSISTANT,
            handles: Some(ranges()),
        });
        assert!(confirm.is_none());
        client.take_commands();
        {
            let conn = client.registry.find_connection_by_cid_mut(cid).unwrap();
            conn.set_service_handle(ServiceKind::Ascs, 0x1111);
            conn.set_service_handle(ServiceKind::Pacs, 0x2222);
            conn.set_service_handle(ServiceKind::Bass, 0x3333);
            conn.barrier.reset();
            conn.phase = ConnectionPhase::Ready;
        }
        client
    }

    fn codec_params(ase_id: u8, cis_id: u8, octets: u16) -> AseCodecParams {
        AseCodecParams {
            ase_id,
            direction: AseDirection::Sink,
            cis_id,
            target_latency: 0x02,
            target_phy: 0x02,
            codec_id: CodecId::lc3(),
            codec_config: CodecConfiguration {
                sampling_frequency: SamplingFrequency::Hz48000,
                frame_duration: FrameDuration::Ms10,
                audio_channel_allocation: 0x0000_0001,
                octets_per_frame: octets,
            },
        }
    }

    fn configure(client: &mut BapClient, id: u32, params: AseCodecParams) {
        let mut ases = Vec::new();
        ases.push(params).unwrap();
        let confirm = client.process_request(Request::CodecConfigure { id, ases });
        assert!(confirm.is_none());
        client.take_commands();
    }

    #[test]
    fn test_init_with_cached_handles_issues_service_inits() {
        let mut client = BapClient::new();
        let confirm = client.process_request(Request::Init {
            cid: 1,
            addr: addr(),
            role: RoleMask::UNICAST_CLIENT,
            handles: Some(ranges()),
        });
        assert!(confirm.is_none());
        let commands = client.take_commands();
        assert_eq!(commands.len(), 2);
        assert!(matches!(commands[0], Command::AscsInit { cid: 1, .. }));
        assert!(matches!(commands[1], Command::PacsInit { cid: 1, .. }));
    }

    #[test]
    fn test_init_without_handles_discovers_services() {
        let mut client = BapClient::new();
        client.process_request(Request::Init {
            cid: 1,
            addr: addr(),
            role: RoleMask::UNICAST_CLIENT | RoleMask::BROADCAST_ASSISTANT,
            handles: None,
        });
        let commands = client.take_commands();
        assert_eq!(commands.len(), 1);
        match &commands[0] {
            Command::DiscoverServices { cid, services } => {
                assert_eq!(*cid, 1);
                assert_eq!(
                    services.as_slice(),
                    &[ServiceKind::Ascs, ServiceKind::Pacs, ServiceKind::Bass]
                );
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_init_source_only_role_not_supported() {
        let mut client = BapClient::new();
        let confirm = client.process_request(Request::Init {
            cid: 1,
            addr: addr(),
            role: RoleMask::BROADCAST_SOURCE,
            handles: None,
        });
        assert!(matches!(
            confirm,
            Some(Confirm::Init {
                status: BapStatus::NotSupported,
                ..
            })
        ));
        assert!(client.take_commands().is_empty());
    }

    #[test]
    fn test_duplicate_init_rejected() {
        let mut client = ready_client(1);
        let confirm = client.process_request(Request::Init {
            cid: 1,
            addr: addr(),
            role: RoleMask::UNICAST_CLIENT,
            handles: Some(ranges()),
        });
        assert!(matches!(
            confirm,
            Some(Confirm::Init {
                status: BapStatus::ArgError,
                ..
            })
        ));
    }

    #[test]
    fn test_codec_configure_twice_updates_single_group() {
        let mut client = ready_client(5);
        configure(&mut client, 5, codec_params(1, 2, 40));
        configure(&mut client, 5, codec_params(1, 2, 80));

        let mut group_ids: Vec<u32, 8> = Vec::new();
        for id in 0u32..10 {
            if client.registry.find_stream_group_by_id(id).is_some() {
                group_ids.push(id).unwrap();
            }
        }
        assert_eq!(group_ids.as_slice(), &[5]);

        let conn = client.registry.find_connection_by_cid(5).unwrap();
        assert_eq!(conn.ases().count(), 1);
        assert_eq!(conn.find_ase(1).unwrap().codec_id, Some(CodecId::lc3()));
    }

    #[test]
    fn test_codec_configure_unknown_connection_is_arg_error() {
        let mut client = BapClient::new();
        let mut ases = Vec::new();
        ases.push(codec_params(1, 2, 40)).unwrap();
        let confirm = client.process_request(Request::CodecConfigure { id: 9, ases });
        assert!(matches!(
            confirm,
            Some(Confirm::CodecConfigured {
                status: BapStatus::ArgError,
                ..
            })
        ));
        assert!(client.take_commands().is_empty());
    }

    #[test]
    fn test_qos_configure_writes_parameters_onto_ases() {
        let mut client = ready_client(5);
        configure(&mut client, 5, codec_params(1, 2, 40));

        let iso = crate::IsoConfig {
            sdu_interval: 10_000,
            framing: 0,
            phy: 0x02,
            sdu_size: 40,
            retransmission_number: 2,
            transport_latency: 20,
            presentation_delay: 40_000,
        };
        let mut ases = Vec::new();
        ases.push(AseQosParams {
            ase_id: 1,
            cig_id: 3,
            cis_id: 2,
            iso,
        })
        .unwrap();
        let confirm = client.process_request(Request::QosConfigure { id: 5, ases });
        assert!(confirm.is_none());

        let conn = client.registry.find_connection_by_cid(5).unwrap();
        assert_eq!(conn.find_ase(1).unwrap().iso, iso);
        assert_eq!(conn.find_cis(2).unwrap().cig_id, 3);
        assert_eq!(client.registry.find_stream_group_by_id(5).unwrap().cig_id, 3);
        let commands = client.take_commands();
        assert!(matches!(
            commands[0],
            Command::AscsWrite {
                handle: 0x1111,
                op: AscsOp::ConfigQos(_),
            }
        ));
    }

    #[test]
    fn test_qos_configure_unknown_ase_short_circuits() {
        let mut client = ready_client(5);
        configure(&mut client, 5, codec_params(1, 2, 40));
        let mut ases = Vec::new();
        ases.push(AseQosParams {
            ase_id: 9,
            cig_id: 3,
            cis_id: 2,
            iso: crate::IsoConfig::default(),
        })
        .unwrap();
        let confirm = client.process_request(Request::QosConfigure { id: 5, ases });
        assert!(matches!(
            confirm,
            Some(Confirm::QosConfigured {
                status: BapStatus::ArgError,
                ..
            })
        ));
        assert!(client.take_commands().is_empty());
    }

    #[test]
    fn test_enable_unknown_group_fails_fast() {
        let mut client = ready_client(5);
        let mut ases = Vec::new();
        ases.push(AseEnableParams {
            ase_id: 1,
            streaming_context: 0x0002,
            metadata: Vec::new(),
        })
        .unwrap();
        let confirm = client.process_request(Request::Enable { id: 42, ases });
        assert!(matches!(
            confirm,
            Some(Confirm::Enabled {
                status: BapStatus::ArgError,
                ..
            })
        ));
        assert!(client.take_commands().is_empty());
    }

    #[test]
    fn test_cig_configure_invalid_id_rejected_locally() {
        let mut client = ready_client(5);
        let params = CigParams {
            cig_id: 0xFF,
            sdu_interval_m_to_s: 10_000,
            sdu_interval_s_to_m: 10_000,
            max_transport_latency_m_to_s: 20,
            max_transport_latency_s_to_m: 20,
            sca: 0,
            packing: 0,
            framing: 0,
            cis: Vec::new(),
        };
        let confirm = client.process_request(Request::CigConfigure { id: 5, params });
        assert!(matches!(
            confirm,
            Some(Confirm::CigConfigured {
                status: BapStatus::InvalidParameter,
                ..
            })
        ));
        assert!(client.take_commands().is_empty());
        assert_eq!(client.cig_requester, None);
    }

    #[test]
    fn test_cig_remove_boundary() {
        let mut client = ready_client(5);
        let confirm = client.process_request(Request::CigRemove { id: 5, cig_id: 0xF0 });
        assert!(matches!(
            confirm,
            Some(Confirm::CigRemoved {
                status: BapStatus::InvalidParameter,
                ..
            })
        ));
        assert!(client.take_commands().is_empty());

        let confirm = client.process_request(Request::CigRemove { id: 5, cig_id: 0xEF });
        assert!(confirm.is_none());
        let commands = client.take_commands();
        assert!(matches!(commands[0], Command::RemoveCig { cig_id: 0xEF }));
    }

    #[test]
    fn test_data_path_invalid_handle_rejected_without_command() {
        let mut client = ready_client(5);
        let params = DataPathParams {
            iso_handle: 0x0F00,
            direction: DATAPATH_DIRECTION_OUTPUT,
            path_id: DATAPATH_ID_HCI,
            codec_id: CodecId::lc3(),
            controller_delay: 0,
            codec_config: CodecConfiguration {
                sampling_frequency: SamplingFrequency::Hz16000,
                frame_duration: FrameDuration::Ms10,
                audio_channel_allocation: 0,
                octets_per_frame: 40,
            },
            vendor_data: Vec::new(),
        };
        let confirm = client.process_request(Request::SetupDataPath { cid: 5, params });
        assert!(matches!(
            confirm,
            Some(Confirm::DataPathSetup {
                status: BapStatus::InvalidParameter,
                ..
            })
        ));
        assert!(client.take_commands().is_empty());

        let confirm = client.process_request(Request::RemoveDataPath {
            cid: 5,
            iso_handle: 0x0F00,
            direction: DATAPATH_DIRECTION_OUTPUT,
        });
        assert!(matches!(
            confirm,
            Some(Confirm::DataPathRemoved {
                status: BapStatus::InvalidParameter,
                ..
            })
        ));
        assert!(client.take_commands().is_empty());
    }

    fn add_source_params(collocated: bool, pa_sync: PaSyncMode) -> AddSourceParams {
        AddSourceParams {
            source_addr: LeAddress::public([1, 2, 3, 4, 5, 6]),
            advertiser_addr: LeAddress::public([1, 2, 3, 4, 5, 6]),
            source_adv_sid: 2,
            pa_sync,
            pa_interval: 0x200,
            broadcast_id: 0x0012_3456,
            sync_handle: 0x0040,
            adv_handle: 7,
            collocated,
            subgroups: Vec::new(),
        }
    }

    #[test]
    fn test_add_source_collocated_uses_adv_set_transfer() {
        let mut client = ready_client(1);
        let confirm = client.process_request(Request::AddSource {
            cid: 1,
            params: add_source_params(true, PaSyncMode::SynchronizePast),
        });
        assert!(confirm.is_none());
        let commands = client.take_commands();
        assert!(matches!(
            commands[0],
            Command::PeriodicAdvSetTransfer { adv_handle: 7, .. }
        ));
        assert!(matches!(commands[1], Command::BassAddSource { handle: 0x3333, .. }));
    }

    #[test]
    fn test_add_source_standalone_uses_scan_sync_transfer() {
        let mut client = ready_client(1);
        client.process_request(Request::AddSource {
            cid: 1,
            params: add_source_params(false, PaSyncMode::SynchronizePast),
        });
        let commands = client.take_commands();
        assert!(matches!(
            commands[0],
            Command::PeriodicScanSyncTransfer {
                sync_handle: 0x0040,
                ..
            }
        ));
    }

    #[test]
    fn test_add_source_without_past_skips_transfer() {
        let mut client = ready_client(1);
        client.process_request(Request::AddSource {
            cid: 1,
            params: add_source_params(false, PaSyncMode::SynchronizeNoPast),
        });
        let commands = client.take_commands();
        assert_eq!(commands.len(), 1);
        assert!(matches!(commands[0], Command::BassAddSource { .. }));
    }

    #[test]
    fn test_add_source_busy_assistant_rejected() {
        let mut client = ready_client(1);
        client.process_request(Request::AddSource {
            cid: 1,
            params: add_source_params(false, PaSyncMode::SynchronizeNoPast),
        });
        client.take_commands();
        // still waiting for the add-source confirmation
        let confirm = client.process_request(Request::RemoveSource { cid: 1, source_id: 0 });
        assert!(matches!(
            confirm,
            Some(Confirm::SourceRemoved {
                status: BapStatus::Error,
                ..
            })
        ));
        assert!(client.take_commands().is_empty());
    }

    #[test]
    fn test_pac_record_lifecycle() {
        let mut client = BapClient::new();
        let confirm = client.process_request(Request::AddPacRecord {
            direction: PacDirection::Sink,
            codec_id: CodecId::lc3(),
        });
        let Some(Confirm::PacRecordAdded { record_id, status }) = confirm else {
            panic!("unexpected confirm");
        };
        assert_eq!(status, BapStatus::Success);

        let confirm = client.process_request(Request::RemovePacRecord { record_id });
        assert!(matches!(
            confirm,
            Some(Confirm::PacRecordRemoved {
                status: BapStatus::Success,
                ..
            })
        ));

        let confirm = client.process_request(Request::RemovePacRecord { record_id });
        assert!(matches!(
            confirm,
            Some(Confirm::PacRecordRemoved {
                status: BapStatus::Error,
                ..
            })
        ));
    }
}
