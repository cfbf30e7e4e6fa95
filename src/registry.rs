//! Entity Registry: unordered collections of connections and stream groups
//!
//! Connections are keyed by connection id and stream groups by their id,
//! which by construction equals the owning connection's cid. Secondary
//! lookups (by address, by sub-service handle, by CIS handle) scan the
//! collections; none of the `find_*` operations mutate the registry.

use heapless::FnvIndexMap;

use crate::connection::Connection;
use crate::constants::{MAX_CONNECTIONS, MAX_STREAM_GROUPS};
use crate::stream_group::StreamGroup;
use crate::{BapStatus, LeAddress, ServiceHandle};

/// The collections every request and event handler resolves entities from
#[derive(Debug, Default)]
pub struct Registry {
    connections: FnvIndexMap<u32, Connection, MAX_CONNECTIONS>,
    stream_groups: FnvIndexMap<u32, StreamGroup, MAX_STREAM_GROUPS>,
}

impl Registry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection
    ///
    /// # Errors
    ///
    /// `ArgError` when a connection with the same cid already exists,
    /// `InsufficientResources` when the registry is full.
    pub fn add_connection(&mut self, connection: Connection) -> Result<(), BapStatus> {
        if self.connections.contains_key(&connection.cid) {
            return Err(BapStatus::ArgError);
        }
        self.connections
            .insert(connection.cid, connection)
            .map(|_| ())
            .map_err(|_| BapStatus::InsufficientResources)
    }

    /// Connection lookup by cid
    #[must_use]
    pub fn find_connection_by_cid(&self, cid: u32) -> Option<&Connection> {
        self.connections.get(&cid)
    }

    /// Mutable connection lookup by cid
    pub fn find_connection_by_cid_mut(&mut self, cid: u32) -> Option<&mut Connection> {
        self.connections.get_mut(&cid)
    }

    /// Connection lookup by peer address
    #[must_use]
    pub fn find_connection_by_address(&self, addr: &LeAddress) -> Option<&Connection> {
        self.connections.values().find(|c| c.addr == *addr)
    }

    /// Connection lookup by ASCS client handle
    pub fn find_connection_by_ascs_handle(
        &mut self,
        handle: ServiceHandle,
    ) -> Option<&mut Connection> {
        self.connections
            .values_mut()
            .find(|c| c.ascs == Some(handle))
    }

    /// Connection lookup by PACS client handle
    pub fn find_connection_by_pacs_handle(
        &mut self,
        handle: ServiceHandle,
    ) -> Option<&mut Connection> {
        self.connections
            .values_mut()
            .find(|c| c.pacs == Some(handle))
    }

    /// Connection lookup by BASS client handle
    pub fn find_connection_by_bass_handle(
        &mut self,
        handle: ServiceHandle,
    ) -> Option<&mut Connection> {
        self.connections
            .values_mut()
            .find(|c| c.bass == Some(handle))
    }

    /// Remove a connection and everything it owns (ASE and CIS lists go
    /// with it). Returns `true` when an entry was removed.
    pub fn remove_connection_by_cid(&mut self, cid: u32) -> bool {
        self.connections.remove(&cid).is_some()
    }

    /// Insert a stream group
    ///
    /// # Errors
    ///
    /// `ArgError` for a duplicate id, `InsufficientResources` when full.
    pub fn add_stream_group(&mut self, group: StreamGroup) -> Result<(), BapStatus> {
        if self.stream_groups.contains_key(&group.id) {
            return Err(BapStatus::ArgError);
        }
        self.stream_groups
            .insert(group.id, group)
            .map(|_| ())
            .map_err(|_| BapStatus::InsufficientResources)
    }

    /// Stream group lookup by id
    #[must_use]
    pub fn find_stream_group_by_id(&self, id: u32) -> Option<&StreamGroup> {
        self.stream_groups.get(&id)
    }

    /// Mutable stream group lookup by id
    pub fn find_stream_group_by_id_mut(&mut self, id: u32) -> Option<&mut StreamGroup> {
        self.stream_groups.get_mut(&id)
    }

    /// Stream group lookup by CIG id
    #[must_use]
    pub fn find_stream_group_by_cig_id(&self, cig_id: u8) -> Option<&StreamGroup> {
        self.stream_groups.values().find(|g| g.cig_id == cig_id)
    }

    /// Find the stream group whose connection owns a CIS with the given
    /// link-layer handle.
    ///
    /// CIS handles are assumed unique across all CIGs; if more than one
    /// live group carries a CIS with this handle, the first match is
    /// returned.
    #[must_use]
    pub fn find_stream_group_by_cis_handle(&self, cis_handle: u16) -> Option<&StreamGroup> {
        self.stream_groups.values().find(|group| {
            self.connections
                .get(&group.id)
                .and_then(|c| c.find_cis_by_handle(cis_handle))
                .is_some()
        })
    }

    /// Id of the stream group owning a CIS handle, avoiding a borrow of
    /// the group itself
    #[must_use]
    pub fn stream_group_id_by_cis_handle(&self, cis_handle: u16) -> Option<u32> {
        self.find_stream_group_by_cis_handle(cis_handle)
            .map(|g| g.id)
    }

    /// Remove a stream group. Returns `true` when an entry was removed.
    pub fn remove_stream_group_by_id(&mut self, id: u32) -> bool {
        self.stream_groups.remove(&id).is_some()
    }

    /// Iterate over connections
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Iterate mutably over connections
    pub fn connections_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ase::AseDirection;
    use crate::{RoleMask, ServiceKind};

    fn addr(last: u8) -> LeAddress {
        LeAddress::public([0x10, 0x20, 0x30, 0x40, 0x50, last])
    }

    fn with_connection(registry: &mut Registry, cid: u32) {
        registry
            .add_connection(Connection::new(
                cid,
                addr(cid as u8),
                RoleMask::UNICAST_CLIENT,
            ))
            .unwrap();
    }

    #[test]
    fn test_cids_are_unique() {
        let mut registry = Registry::new();
        with_connection(&mut registry, 1);
        let duplicate = Connection::new(1, addr(9), RoleMask::UNICAST_CLIENT);
        assert_eq!(registry.add_connection(duplicate), Err(BapStatus::ArgError));
        assert_eq!(registry.connections().count(), 1);
    }

    #[test]
    fn test_lookups_resolve_to_same_entity() {
        let mut registry = Registry::new();
        with_connection(&mut registry, 3);
        registry
            .find_connection_by_cid_mut(3)
            .unwrap()
            .set_service_handle(ServiceKind::Ascs, 0x1234);
        registry
            .find_connection_by_cid_mut(3)
            .unwrap()
            .set_service_handle(ServiceKind::Pacs, 0x5678);

        let by_cid = registry.find_connection_by_cid(3).unwrap().cid;
        let by_addr = registry.find_connection_by_address(&addr(3)).unwrap().cid;
        assert_eq!(by_cid, by_addr);
        assert_eq!(
            registry.find_connection_by_ascs_handle(0x1234).unwrap().cid,
            3
        );
        assert_eq!(
            registry.find_connection_by_pacs_handle(0x5678).unwrap().cid,
            3
        );
    }

    #[test]
    fn test_remove_connection_then_lookup_fails() {
        let mut registry = Registry::new();
        with_connection(&mut registry, 7);
        assert!(registry.remove_connection_by_cid(7));
        assert!(registry.find_connection_by_cid(7).is_none());
        assert!(!registry.remove_connection_by_cid(7));
    }

    #[test]
    fn test_registry_capacity() {
        let mut registry = Registry::new();
        for cid in 0..MAX_CONNECTIONS as u32 {
            with_connection(&mut registry, cid);
        }
        let overflow = Connection::new(99, addr(99), RoleMask::UNICAST_CLIENT);
        assert_eq!(
            registry.add_connection(overflow),
            Err(BapStatus::InsufficientResources)
        );
    }

    #[test]
    fn test_stream_group_lookup_by_cis_handle() {
        let mut registry = Registry::new();
        with_connection(&mut registry, 4);
        registry.add_stream_group(StreamGroup::new(4)).unwrap();
        registry.find_stream_group_by_id_mut(4).unwrap().cig_id = 2;

        {
            let conn = registry.find_connection_by_cid_mut(4).unwrap();
            conn.ensure_ase(1, AseDirection::Sink).unwrap();
            conn.bind_ase_to_cis(1, AseDirection::Sink, 6).unwrap();
            conn.set_cis_handle(6, 0x0099);
        }

        assert_eq!(
            registry.find_stream_group_by_cis_handle(0x0099).unwrap().id,
            4
        );
        assert_eq!(registry.find_stream_group_by_cig_id(2).unwrap().id, 4);
        assert!(registry.find_stream_group_by_cis_handle(0x0011).is_none());
    }

    #[test]
    fn test_stream_group_removal() {
        let mut registry = Registry::new();
        registry.add_stream_group(StreamGroup::new(8)).unwrap();
        assert!(registry.remove_stream_group_by_id(8));
        assert!(registry.find_stream_group_by_id(8).is_none());
    }
}
