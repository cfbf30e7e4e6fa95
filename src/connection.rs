//! Connection entity: sub-service handles, ASE/CIS ownership and the
//! init/teardown completion barrier

use heapless::Vec;

use crate::ase::{Ase, AseDirection, Cis};
use crate::constants::{INVALID_CIS_HANDLE, MAX_ASES, MAX_CIS};
use crate::{BapStatus, LeAddress, RoleMask, ServiceHandle, ServiceKind};

/// Lifecycle phase of a connection context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Sub-service clients are being brought up
    Initializing,
    /// All requested sub-services are up
    Ready,
    /// Sub-service clients are being terminated
    Deinitializing,
}

/// Join counter for outstanding sub-service operations.
///
/// Armed once per issued operation and completed once per confirmation,
/// regardless of the confirmation's status; the first non-success status is
/// kept for the final aggregate report. [`ServiceBarrier::complete`]
/// returns `true` exactly once, when the count reaches zero.
#[derive(Debug, Clone, Copy)]
pub struct ServiceBarrier {
    outstanding: u8,
    first_error: BapStatus,
}

impl ServiceBarrier {
    /// Create an idle barrier
    #[must_use]
    pub const fn new() -> Self {
        Self {
            outstanding: 0,
            first_error: BapStatus::Success,
        }
    }

    /// Register one more outstanding sub-operation
    pub fn arm(&mut self) {
        self.outstanding += 1;
    }

    /// Record one confirmation. Returns `true` when this confirmation was
    /// the last outstanding one.
    pub fn complete(&mut self, status: BapStatus) -> bool {
        if self.outstanding == 0 {
            defmt::warn!("barrier completion with nothing outstanding");
            return false;
        }
        if self.first_error.is_success() && !status.is_success() {
            self.first_error = status;
        }
        self.outstanding -= 1;
        self.outstanding == 0
    }

    /// True while no sub-operation is outstanding
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.outstanding == 0
    }

    /// Aggregate status: the first non-success confirmation, or success
    #[must_use]
    pub const fn status(&self) -> BapStatus {
        self.first_error
    }

    /// Forget all recorded state
    pub fn reset(&mut self) {
        self.outstanding = 0;
        self.first_error = BapStatus::Success;
    }
}

impl Default for ServiceBarrier {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-connection state: roles, sub-service client handles and the owned
/// ASE and CIS lists
#[derive(Debug)]
pub struct Connection {
    /// Connection id, unique across the registry
    pub cid: u32,
    /// Peer device address
    pub addr: LeAddress,
    /// Roles this connection was initialized with
    pub role: RoleMask,
    /// ASCS client handle once initialized
    pub ascs: Option<ServiceHandle>,
    /// PACS client handle once initialized
    pub pacs: Option<ServiceHandle>,
    /// BASS client handle once initialized
    pub bass: Option<ServiceHandle>,
    /// Lifecycle phase
    pub phase: ConnectionPhase,
    /// Deinit arrived while init was still outstanding
    pub deinit_pending: bool,
    /// Service discovery has been issued and not yet answered
    pub awaiting_discovery: bool,
    /// Outstanding sub-service init/terminate operations
    pub barrier: ServiceBarrier,
    /// Broadcast assistant state, present when the role is active
    pub assistant: Option<crate::assistant::BroadcastAssistant>,
    ases: Vec<Ase, MAX_ASES>,
    cis_list: Vec<Cis, MAX_CIS>,
}

impl Connection {
    /// Create a connection context with no sub-services initialized
    #[must_use]
    pub fn new(cid: u32, addr: LeAddress, role: RoleMask) -> Self {
        Self {
            cid,
            addr,
            role,
            ascs: None,
            pacs: None,
            bass: None,
            phase: ConnectionPhase::Initializing,
            deinit_pending: false,
            awaiting_discovery: false,
            barrier: ServiceBarrier::new(),
            assistant: if role.contains(RoleMask::BROADCAST_ASSISTANT) {
                Some(crate::assistant::BroadcastAssistant::new())
            } else {
                None
            },
            ases: Vec::new(),
            cis_list: Vec::new(),
        }
    }

    /// Stored handle of one sub-service client
    #[must_use]
    pub fn service_handle(&self, kind: ServiceKind) -> Option<ServiceHandle> {
        match kind {
            ServiceKind::Ascs => self.ascs,
            ServiceKind::Pacs => self.pacs,
            ServiceKind::Bass => self.bass,
        }
    }

    /// Record the handle assigned to a sub-service client
    pub fn set_service_handle(&mut self, kind: ServiceKind, handle: ServiceHandle) {
        match kind {
            ServiceKind::Ascs => self.ascs = Some(handle),
            ServiceKind::Pacs => self.pacs = Some(handle),
            ServiceKind::Bass => self.bass = Some(handle),
        }
    }

    /// Find an ASE by its server-assigned id
    #[must_use]
    pub fn find_ase(&self, ase_id: u8) -> Option<&Ase> {
        self.ases.iter().find(|a| a.id == ase_id)
    }

    /// Mutable lookup of an ASE by id
    pub fn find_ase_mut(&mut self, ase_id: u8) -> Option<&mut Ase> {
        self.ases.iter_mut().find(|a| a.id == ase_id)
    }

    /// Find or create an ASE, updating the direction of an existing one
    ///
    /// # Errors
    ///
    /// Returns `InsufficientResources` when the ASE list is full.
    pub fn ensure_ase(
        &mut self,
        ase_id: u8,
        direction: AseDirection,
    ) -> Result<&mut Ase, BapStatus> {
        if let Some(index) = self.ases.iter().position(|a| a.id == ase_id) {
            let ase = &mut self.ases[index];
            ase.direction = direction;
            return Ok(ase);
        }
        self.ases
            .push(Ase::new(ase_id, direction))
            .map_err(|_| BapStatus::InsufficientResources)?;
        let last = self.ases.len() - 1;
        Ok(&mut self.ases[last])
    }

    /// Find or create the CIS record for a CIS id and bind an ASE to it
    ///
    /// # Errors
    ///
    /// Returns `InsufficientResources` when the CIS list is full.
    pub fn bind_ase_to_cis(
        &mut self,
        ase_id: u8,
        direction: AseDirection,
        cis_id: u8,
    ) -> Result<(), BapStatus> {
        let index = match self.cis_list.iter().position(|c| c.cis_id == cis_id) {
            Some(index) => index,
            None => {
                self.cis_list
                    .push(Cis::new(0, cis_id))
                    .map_err(|_| BapStatus::InsufficientResources)?;
                self.cis_list.len() - 1
            }
        };
        self.cis_list[index].bind(direction, ase_id);
        let cig_id = self.cis_list[index].cig_id;
        if let Some(ase) = self.find_ase_mut(ase_id) {
            ase.cis = Some((cig_id, cis_id));
        }
        Ok(())
    }

    /// Update the CIG id carried by a CIS record and its bound ASEs
    pub fn set_cis_cig_id(&mut self, cis_id: u8, cig_id: u8) {
        let mut bound: Vec<u8, 2> = Vec::new();
        if let Some(cis) = self.cis_list.iter_mut().find(|c| c.cis_id == cis_id) {
            cis.cig_id = cig_id;
            if let Some(id) = cis.sink_ase {
                bound.push(id).ok();
            }
            if let Some(id) = cis.source_ase {
                bound.push(id).ok();
            }
        }
        for ase_id in bound {
            if let Some(ase) = self.find_ase_mut(ase_id) {
                ase.cis = Some((cig_id, cis_id));
            }
        }
    }

    /// CIS record lookup by CIS id
    #[must_use]
    pub fn find_cis(&self, cis_id: u8) -> Option<&Cis> {
        self.cis_list.iter().find(|c| c.cis_id == cis_id)
    }

    /// CIS record lookup by link-layer handle
    #[must_use]
    pub fn find_cis_by_handle(&self, handle: u16) -> Option<&Cis> {
        if handle == INVALID_CIS_HANDLE {
            return None;
        }
        self.cis_list.iter().find(|c| c.handle == handle)
    }

    /// Find the ASE bound to the CIS with the given handle. For a
    /// bidirectional CIS the sink-side ASE is returned.
    #[must_use]
    pub fn find_ase_by_cis_handle(&self, handle: u16) -> Option<&Ase> {
        let cis = self.find_cis_by_handle(handle)?;
        cis.sink_ase
            .or(cis.source_ase)
            .and_then(|id| self.find_ase(id))
    }

    /// Ids of every ASE bound to the CIS with the given handle
    #[must_use]
    pub fn ases_on_cis_handle(&self, handle: u16) -> Vec<u8, 2> {
        let mut ids = Vec::new();
        if let Some(cis) = self.find_cis_by_handle(handle) {
            if let Some(id) = cis.sink_ase {
                ids.push(id).ok();
            }
            if let Some(id) = cis.source_ase {
                ids.push(id).ok();
            }
        }
        ids
    }

    /// Record the link-layer handle assigned to a CIS
    pub fn set_cis_handle(&mut self, cis_id: u8, handle: u16) {
        if let Some(cis) = self.cis_list.iter_mut().find(|c| c.cis_id == cis_id) {
            cis.handle = handle;
        }
    }

    /// Reset the handle of every CIS record carrying `handle` back to
    /// `INVALID_CIS_HANDLE`, so the sink-side and source-side ASE of a
    /// bidirectional CIS both observe the disconnect. Returns the number
    /// of records reset.
    pub fn reset_cis_handle(&mut self, handle: u16) -> usize {
        if handle == INVALID_CIS_HANDLE {
            return 0;
        }
        let mut count = 0;
        for cis in self.cis_list.iter_mut().filter(|c| c.handle == handle) {
            cis.handle = INVALID_CIS_HANDLE;
            count += 1;
        }
        count
    }

    /// Iterate over the ASE list
    pub fn ases(&self) -> impl Iterator<Item = &Ase> {
        self.ases.iter()
    }

    /// Iterate over the CIS list
    pub fn cis_list(&self) -> impl Iterator<Item = &Cis> {
        self.cis_list.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Connection {
        Connection::new(
            5,
            LeAddress::public([0x10, 0x20, 0x30, 0x40, 0x50, 0x60]),
            RoleMask::UNICAST_CLIENT,
        )
    }

    #[test]
    fn test_barrier_fires_exactly_once() {
        let mut barrier = ServiceBarrier::new();
        barrier.arm();
        barrier.arm();
        barrier.arm();

        assert!(!barrier.complete(BapStatus::Success));
        assert!(!barrier.complete(BapStatus::Error));
        assert!(barrier.complete(BapStatus::Success));
        assert_eq!(barrier.status(), BapStatus::Error);

        // a stray confirmation never re-fires the barrier
        assert!(!barrier.complete(BapStatus::Success));
    }

    #[test]
    fn test_barrier_keeps_first_error() {
        let mut barrier = ServiceBarrier::new();
        barrier.arm();
        barrier.arm();
        barrier.complete(BapStatus::InsufficientResources);
        barrier.complete(BapStatus::Error);
        assert_eq!(barrier.status(), BapStatus::InsufficientResources);
    }

    #[test]
    fn test_assistant_created_with_role() {
        let conn = Connection::new(
            1,
            LeAddress::public([0; 6]),
            RoleMask::UNICAST_CLIENT | RoleMask::BROADCAST_ASSISTANT,
        );
        assert!(conn.assistant.is_some());
        assert!(connection().assistant.is_none());
    }

    #[test]
    fn test_ensure_ase_is_idempotent() {
        let mut conn = connection();
        conn.ensure_ase(1, AseDirection::Sink).unwrap();
        conn.ensure_ase(1, AseDirection::Sink).unwrap();
        assert_eq!(conn.ases().count(), 1);
    }

    #[test]
    fn test_bidirectional_cis_dual_reset() {
        let mut conn = connection();
        conn.ensure_ase(1, AseDirection::Sink).unwrap();
        conn.ensure_ase(2, AseDirection::Source).unwrap();
        conn.bind_ase_to_cis(1, AseDirection::Sink, 7).unwrap();
        conn.bind_ase_to_cis(2, AseDirection::Source, 7).unwrap();
        conn.set_cis_handle(7, 0x0042);

        let cis = conn.find_cis_by_handle(0x0042).unwrap();
        assert_eq!(cis.sink_ase, Some(1));
        assert_eq!(cis.source_ase, Some(2));

        let ases = conn.ases_on_cis_handle(0x0042);
        assert_eq!(ases.as_slice(), &[1, 2]);

        assert_eq!(conn.reset_cis_handle(0x0042), 1);
        assert!(conn.find_cis_by_handle(0x0042).is_none());
        assert!(!conn.find_cis(7).unwrap().is_connected());
    }

    #[test]
    fn test_reset_ignores_invalid_handle() {
        let mut conn = connection();
        conn.ensure_ase(1, AseDirection::Sink).unwrap();
        conn.bind_ase_to_cis(1, AseDirection::Sink, 3).unwrap();
        // handle never assigned; resetting the sentinel must not match
        assert_eq!(conn.reset_cis_handle(INVALID_CIS_HANDLE), 0);
    }

    #[test]
    fn test_set_cis_cig_id_updates_bound_ases() {
        let mut conn = connection();
        conn.ensure_ase(1, AseDirection::Sink).unwrap();
        conn.bind_ase_to_cis(1, AseDirection::Sink, 2).unwrap();
        conn.set_cis_cig_id(2, 9);
        assert_eq!(conn.find_cis(2).unwrap().cig_id, 9);
        assert_eq!(conn.find_ase(1).unwrap().cis, Some((9, 2)));
    }
}
