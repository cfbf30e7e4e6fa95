//! `Lyrebird` API Functions
//!
//! This module provides the public API functions for interacting with the
//! dispatcher task. Each function sends one request over the static request
//! channel and waits for its confirmation on the confirm channel. Requests
//! are processed strictly in order, so confirmations arrive in request
//! order; an unexpected confirmation variant is reported as an error.
//!
//! # Usage
//!
//! ```rust,no_run
//! use lyrebird::{api, LeAddress, RoleMask};
//!
//! # async fn example() -> Result<(), lyrebird::BapStatus> {
//! let addr = LeAddress::public([0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]);
//! api::init(1, addr, RoleMask::UNICAST_CLIENT, None).await?;
//! # Ok(())
//! # }
//! ```

use heapless::Vec;

use crate::constants::{MAX_ASES, MAX_CIS};
use crate::{
    AddSourceParams, AseCodecParams, AseEnableParams, AseMetadataParams, AseQosParams,
    AudioContextKind, BapStatus, CigParams, CigTestParams, CisConnection, Confirm, DataPathParams,
    LeAddress, ModifySourceParams, PacDirection, PacsNotificationType, ReadyKind, Request,
    RoleMask, ServiceRanges, CONFIRM_CHANNEL, REQUEST_CHANNEL,
};

async fn transact(request: Request) -> Confirm {
    REQUEST_CHANNEL.sender().send(request).await;
    CONFIRM_CHANNEL.receiver().receive().await
}

fn done(status: BapStatus) -> Result<(), BapStatus> {
    if status.is_success() {
        Ok(())
    } else {
        Err(status)
    }
}

/// Initialize a connection for the given roles, optionally with cached
/// service handle ranges.
///
/// # Errors
///
/// Returns the failing status when a sub-service cannot be brought up or
/// the connection already exists.
pub async fn init(
    cid: u32,
    addr: LeAddress,
    role: RoleMask,
    handles: Option<ServiceRanges>,
) -> Result<(), BapStatus> {
    match transact(Request::Init {
        cid,
        addr,
        role,
        handles,
    })
    .await
    {
        Confirm::Init { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Tear down a connection; resolves once every sub-service has terminated
/// and the connection is destroyed.
///
/// # Errors
///
/// Returns the first failing termination status.
pub async fn deinit(cid: u32, role: RoleMask) -> Result<(), BapStatus> {
    match transact(Request::Deinit { cid, role }).await {
        Confirm::Destroyed { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Register a local PAC record and get its id.
///
/// # Errors
///
/// Returns `InsufficientResources` when the record store is full.
pub async fn add_pac_record(
    direction: PacDirection,
    codec_id: crate::CodecId,
) -> Result<u16, BapStatus> {
    match transact(Request::AddPacRecord {
        direction,
        codec_id,
    })
    .await
    {
        Confirm::PacRecordAdded { record_id, status } => done(status).map(|()| record_id),
        _ => Err(BapStatus::Error),
    }
}

/// Remove a previously registered PAC record.
///
/// # Errors
///
/// Returns an error when the record id is unknown.
pub async fn remove_pac_record(record_id: u16) -> Result<(), BapStatus> {
    match transact(Request::RemovePacRecord { record_id }).await {
        Confirm::PacRecordRemoved { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Probe whether the remote exposes PAC records for a direction.
///
/// # Errors
///
/// Returns an error for an unknown connection or a failed read.
pub async fn discover_audio_role(cid: u32, direction: PacDirection) -> Result<(), BapStatus> {
    match transact(Request::DiscoverAudioRole { cid, direction }).await {
        Confirm::AudioRole { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Read the remote PAC records for a direction; the records themselves
/// arrive as indications.
///
/// # Errors
///
/// Returns an error for an unknown connection or a failed read.
pub async fn discover_remote_audio_capability(
    cid: u32,
    direction: PacDirection,
) -> Result<(), BapStatus> {
    match transact(Request::DiscoverRemoteAudioCapability { cid, direction }).await {
        Confirm::RemoteAudioCapability { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Enable or disable PACS notifications for a characteristic class.
///
/// # Errors
///
/// Returns an error for an unknown connection or a failed write.
pub async fn register_pacs_notification(
    cid: u32,
    notify_type: PacsNotificationType,
    enable: bool,
) -> Result<(), BapStatus> {
    match transact(Request::RegisterPacsNotification {
        cid,
        notify_type,
        enable,
    })
    .await
    {
        Confirm::PacsNotificationRegistered { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Read the remote audio location bitmask for a direction.
///
/// # Errors
///
/// Returns an error for an unknown connection or a failed read.
pub async fn get_remote_audio_location(
    cid: u32,
    direction: PacDirection,
) -> Result<u32, BapStatus> {
    match transact(Request::GetRemoteAudioLocation { cid, direction }).await {
        Confirm::RemoteAudioLocation {
            location, status, ..
        } => done(status).map(|()| location),
        _ => Err(BapStatus::Error),
    }
}

/// Write the remote audio location bitmask for a direction.
///
/// # Errors
///
/// Returns an error for an unknown connection or a failed write.
pub async fn set_remote_audio_location(
    cid: u32,
    direction: PacDirection,
    location: u32,
) -> Result<(), BapStatus> {
    match transact(Request::SetRemoteAudioLocation {
        cid,
        direction,
        location,
    })
    .await
    {
        Confirm::RemoteAudioLocationSet { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Read the remote available or supported audio context bitmask.
///
/// # Errors
///
/// Returns an error for an unknown connection or a failed read.
pub async fn discover_audio_context(
    cid: u32,
    context: AudioContextKind,
) -> Result<u32, BapStatus> {
    match transact(Request::DiscoverAudioContext { cid, context }).await {
        Confirm::AudioContext { value, status, .. } => done(status).map(|()| value),
        _ => Err(BapStatus::Error),
    }
}

/// Codec-configure a set of ASEs, creating or updating the stream group.
///
/// # Errors
///
/// Returns `ArgError` for an unknown connection or empty ASE set.
pub async fn codec_configure(
    id: u32,
    ases: Vec<AseCodecParams, MAX_ASES>,
) -> Result<(), BapStatus> {
    match transact(Request::CodecConfigure { id, ases }).await {
        Confirm::CodecConfigured { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Configure a CIG and get the assigned CIS handles.
///
/// # Errors
///
/// Returns `InvalidParameter` for an out-of-range CIG id.
pub async fn cig_configure(id: u32, params: CigParams) -> Result<Vec<u16, MAX_CIS>, BapStatus> {
    match transact(Request::CigConfigure { id, params }).await {
        Confirm::CigConfigured {
            cis_handles,
            status,
            ..
        } => done(status).map(|()| cis_handles),
        _ => Err(BapStatus::Error),
    }
}

/// Configure a CIG with test parameters and get the assigned CIS handles.
///
/// # Errors
///
/// Returns `InvalidParameter` for an out-of-range CIG id.
pub async fn cig_test_configure(
    id: u32,
    params: CigTestParams,
) -> Result<Vec<u16, MAX_CIS>, BapStatus> {
    match transact(Request::CigTestConfigure { id, params }).await {
        Confirm::CigTestConfigured {
            cis_handles,
            status,
            ..
        } => done(status).map(|()| cis_handles),
        _ => Err(BapStatus::Error),
    }
}

/// Remove a CIG.
///
/// # Errors
///
/// Returns `InvalidParameter` for a CIG id above the valid range.
pub async fn cig_remove(id: u32, cig_id: u8) -> Result<(), BapStatus> {
    match transact(Request::CigRemove { id, cig_id }).await {
        Confirm::CigRemoved { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// QoS-configure a set of ASEs.
///
/// # Errors
///
/// Returns `ArgError` for an unknown stream group or ASE id.
pub async fn qos_configure(id: u32, ases: Vec<AseQosParams, MAX_ASES>) -> Result<(), BapStatus> {
    match transact(Request::QosConfigure { id, ases }).await {
        Confirm::QosConfigured { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Enable a set of ASEs.
///
/// # Errors
///
/// Returns `ArgError` for an unknown stream group or ASE id.
pub async fn enable(id: u32, ases: Vec<AseEnableParams, MAX_ASES>) -> Result<(), BapStatus> {
    match transact(Request::Enable { id, ases }).await {
        Confirm::Enabled { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Disable a set of ASEs.
///
/// # Errors
///
/// Returns `ArgError` for an unknown stream group or ASE id.
pub async fn disable(id: u32, ase_ids: Vec<u8, MAX_ASES>) -> Result<(), BapStatus> {
    match transact(Request::Disable { id, ase_ids }).await {
        Confirm::Disabled { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Release a set of ASEs back to idle.
///
/// # Errors
///
/// Returns `ArgError` for an unknown stream group or ASE id.
pub async fn release(id: u32, ase_ids: Vec<u8, MAX_ASES>) -> Result<(), BapStatus> {
    match transact(Request::Release { id, ase_ids }).await {
        Confirm::Released { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Update metadata on a set of enabled ASEs.
///
/// # Errors
///
/// Returns `ArgError` for an unknown stream group or ASE id.
pub async fn update_metadata(
    id: u32,
    ases: Vec<AseMetadataParams, MAX_ASES>,
) -> Result<(), BapStatus> {
    match transact(Request::UpdateMetadata { id, ases }).await {
        Confirm::MetadataUpdated { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Signal receiver start or stop ready for a set of ASEs.
///
/// # Errors
///
/// Returns `ArgError` for an unknown stream group or ASE id.
pub async fn receiver_ready(
    id: u32,
    ready: ReadyKind,
    ase_ids: Vec<u8, MAX_ASES>,
) -> Result<(), BapStatus> {
    match transact(Request::ReceiverReady { id, ready, ase_ids }).await {
        Confirm::ReceiverReady { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Establish the CISes of a stream group at the link layer.
///
/// # Errors
///
/// Returns `ArgError` for an unknown stream group or CIS id.
pub async fn cis_connect(id: u32, cises: Vec<CisConnection, MAX_CIS>) -> Result<(), BapStatus> {
    match transact(Request::CisConnect { id, cises }).await {
        Confirm::CisConnected { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Disconnect one CIS.
///
/// # Errors
///
/// Returns `ArgError` when the handle matches no live CIS.
pub async fn cis_disconnect(id: u32, cis_handle: u16) -> Result<(), BapStatus> {
    match transact(Request::CisDisconnect { id, cis_handle }).await {
        Confirm::CisDisconnected { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Set up an ISO data path.
///
/// # Errors
///
/// Returns `InvalidParameter` for an out-of-range ISO handle.
pub async fn setup_data_path(cid: u32, params: DataPathParams) -> Result<(), BapStatus> {
    match transact(Request::SetupDataPath { cid, params }).await {
        Confirm::DataPathSetup { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Remove an ISO data path.
///
/// # Errors
///
/// Returns `InvalidParameter` for an out-of-range ISO handle.
pub async fn remove_data_path(cid: u32, iso_handle: u16, direction: u8) -> Result<(), BapStatus> {
    match transact(Request::RemoveDataPath {
        cid,
        iso_handle,
        direction,
    })
    .await
    {
        Confirm::DataPathRemoved { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Cache the control-point response-mode flags for a connection.
///
/// # Errors
///
/// Returns `ArgError` for an unknown connection.
pub async fn set_control_point_op(
    cid: u32,
    response_op: bool,
    long_write: bool,
) -> Result<(), BapStatus> {
    match transact(Request::SetControlPointOp {
        cid,
        response_op,
        long_write,
    })
    .await
    {
        Confirm::ControlPointOpSet { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Add a broadcast source to the remote scan delegator.
///
/// # Errors
///
/// Returns an error when the assistant is busy or parameters are invalid.
pub async fn add_source(cid: u32, params: AddSourceParams) -> Result<(), BapStatus> {
    match transact(Request::AddSource { cid, params }).await {
        Confirm::SourceAdded { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Modify a broadcast source on the remote scan delegator.
///
/// # Errors
///
/// Returns an error when the assistant is busy.
pub async fn modify_source(cid: u32, params: ModifySourceParams) -> Result<(), BapStatus> {
    match transact(Request::ModifySource { cid, params }).await {
        Confirm::SourceModified { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Remove a broadcast source from the remote scan delegator.
///
/// # Errors
///
/// Returns an error when the assistant is busy.
pub async fn remove_source(cid: u32, source_id: u8) -> Result<(), BapStatus> {
    match transact(Request::RemoveSource { cid, source_id }).await {
        Confirm::SourceRemoved { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Synchronize to a broadcast source's periodic train and get the sync
/// handle.
///
/// # Errors
///
/// Returns an error when the assistant is busy or the sync fails.
pub async fn sync_to_source_start(
    cid: u32,
    addr: LeAddress,
    adv_sid: u8,
) -> Result<u16, BapStatus> {
    match transact(Request::SyncToSourceStart { cid, addr, adv_sid }).await {
        Confirm::SyncToSourceStarted {
            sync_handle,
            status,
            ..
        } => done(status).map(|()| sync_handle),
        _ => Err(BapStatus::Error),
    }
}

/// Cancel an in-progress synchronization attempt.
///
/// # Errors
///
/// Returns an error when no synchronization is in progress.
pub async fn sync_to_source_cancel(cid: u32) -> Result<(), BapStatus> {
    match transact(Request::SyncToSourceCancel { cid }).await {
        Confirm::SyncToSourceCancelled { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}

/// Terminate an established periodic sync.
///
/// # Errors
///
/// Returns an error for an unknown connection or sync handle.
pub async fn sync_to_source_terminate(cid: u32, sync_handle: u16) -> Result<(), BapStatus> {
    match transact(Request::SyncToSourceTerminate { cid, sync_handle }).await {
        Confirm::SyncToSourceTerminated { status, .. } => done(status),
        _ => Err(BapStatus::Error),
    }
}
