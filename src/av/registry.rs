//! Per-role peer collection with admission control and active-peer
//! bookkeeping.

use heapless::{FnvIndexMap, Vec};

use crate::address::PeerAddress;
use crate::av::peer::{Peer, PeerState};
use crate::av::{AvError, Role, StreamHandle, STREAM_HANDLE_UNKNOWN};
use crate::constants::{DEFAULT_MAX_CONNECTED_PEERS, MAX_AV_PEERS};

/// All peers of one local role.
///
/// Two instances live in the service, one per role; both roles use the
/// identical registry type. Only the control task touches a registry.
#[derive(Debug)]
pub struct PeerRegistry {
    local_role: Role,
    peers: FnvIndexMap<PeerAddress, Peer, MAX_AV_PEERS>,
    handle_by_id: [Option<StreamHandle>; MAX_AV_PEERS],
    active_peer: PeerAddress,
    max_connected_peers: usize,
    enabled: bool,
    offload_enabled: bool,
}

impl PeerRegistry {
    /// Create a disabled registry for `local_role`.
    #[must_use]
    pub fn new(local_role: Role) -> Self {
        Self {
            local_role,
            peers: FnvIndexMap::new(),
            handle_by_id: [None; MAX_AV_PEERS],
            active_peer: PeerAddress::EMPTY,
            max_connected_peers: DEFAULT_MAX_CONNECTED_PEERS,
            enabled: false,
            offload_enabled: false,
        }
    }

    /// The local role this registry serves.
    #[must_use]
    pub const fn local_role(&self) -> Role {
        self.local_role
    }

    /// Whether the role is initialised.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the offload path is enabled for this role.
    #[must_use]
    pub const fn offload_enabled(&self) -> bool {
        self.offload_enabled
    }

    pub(crate) fn set_offload_enabled(&mut self, enabled: bool) {
        self.offload_enabled = enabled;
    }

    pub(crate) fn enable(&mut self, max_connected_peers: usize) {
        self.max_connected_peers = max_connected_peers;
        self.enabled = true;
    }

    pub(crate) fn disable(&mut self) {
        self.enabled = false;
    }

    /// Configured connection limit.
    #[must_use]
    pub const fn max_connected_peers(&self) -> usize {
        self.max_connected_peers
    }

    /// Address of the active peer; empty if none.
    #[must_use]
    pub const fn active_peer(&self) -> PeerAddress {
        self.active_peer
    }

    pub(crate) fn set_active_peer(&mut self, address: PeerAddress) {
        self.active_peer = address;
    }

    /// Find a peer by address.
    #[must_use]
    pub fn find(&self, address: PeerAddress) -> Option<&Peer> {
        self.peers.get(&address)
    }

    /// Find a peer by address, mutably.
    pub fn find_mut(&mut self, address: PeerAddress) -> Option<&mut Peer> {
        self.peers.get_mut(&address)
    }

    /// Find a peer by its bound lower-transport handle.
    #[must_use]
    pub fn find_by_handle(&self, handle: StreamHandle) -> Option<&Peer> {
        self.peers.values().find(|peer| peer.handle() == handle)
    }

    /// Find a peer by its bound lower-transport handle, mutably.
    pub fn find_by_handle_mut(&mut self, handle: StreamHandle) -> Option<&mut Peer> {
        self.peers
            .values_mut()
            .find(|peer| peer.handle() == handle)
    }

    /// Find a peer by its peer id.
    #[must_use]
    pub fn find_by_id(&self, peer_id: u8) -> Option<&Peer> {
        self.peers.values().find(|peer| peer.id() == peer_id)
    }

    fn find_by_id_mut(&mut self, peer_id: u8) -> Option<&mut Peer> {
        self.peers.values_mut().find(|peer| peer.id() == peer_id)
    }

    /// Return the existing peer for `address`, or create one.
    ///
    /// A new peer gets the smallest unused peer id. When `handle` is
    /// [`STREAM_HANDLE_UNKNOWN`] it is resolved through the id-to-handle
    /// bindings recorded from transport registration.
    ///
    /// # Errors
    /// [`AvError::NoFreePeerId`] when every peer id is taken,
    /// [`AvError::HandleUnbound`] when the allocated id has no handle bound,
    /// [`AvError::TooManyPeers`] when the peer table is full.
    pub fn find_or_create(
        &mut self,
        address: PeerAddress,
        handle: StreamHandle,
    ) -> Result<&mut Peer, AvError> {
        if self.peers.contains_key(&address) {
            return self.find_mut(address).ok_or(AvError::PeerNotFound);
        }

        let mut peer_id = None;
        for id in 0..MAX_AV_PEERS as u8 {
            if self.find_by_id(id).is_none() {
                peer_id = Some(id);
                break;
            }
        }
        let peer_id = peer_id.ok_or(AvError::NoFreePeerId)?;

        let handle = if handle == STREAM_HANDLE_UNKNOWN {
            self.handle_by_id[peer_id as usize].ok_or(AvError::HandleUnbound)?
        } else {
            handle
        };

        log::info!(
            "create peer {} handle=0x{:02x} peer_id={}",
            address,
            handle,
            peer_id
        );
        let peer = Peer::new(address, self.local_role.complement(), handle, peer_id);
        self.peers
            .insert(address, peer)
            .map_err(|_| AvError::TooManyPeers)?;

        // A Sink has no host-side device manager picking the active device;
        // the first created peer becomes active.
        if self.local_role == Role::Sink && self.active_peer.is_empty() {
            self.active_peer = address;
        }

        self.find_mut(address).ok_or(AvError::PeerNotFound)
    }

    /// Resolve the peer an event addresses: by address when one is given
    /// (creating on demand), by handle otherwise.
    ///
    /// # Errors
    /// Propagates [`Self::find_or_create`] errors, or
    /// [`AvError::PeerNotFound`] when only an unknown handle is given.
    pub fn resolve(
        &mut self,
        address: PeerAddress,
        handle: StreamHandle,
    ) -> Result<&mut Peer, AvError> {
        if !address.is_empty() {
            self.find_or_create(address, handle)
        } else if handle != STREAM_HANDLE_UNKNOWN {
            self.find_by_handle_mut(handle).ok_or(AvError::PeerNotFound)
        } else {
            Err(AvError::PeerNotFound)
        }
    }

    /// Admission check for a connection to `address`.
    ///
    /// Counts peers that are connecting or connected; a peer already
    /// counted at the same address is always admitted (idempotent retry).
    #[must_use]
    pub fn allowed_to_connect(&self, address: PeerAddress) -> bool {
        let mut connected = 0;
        for peer in self.peers.values() {
            match peer.state() {
                PeerState::Opening | PeerState::Opened | PeerState::Started => {
                    if peer.address() == address {
                        return true;
                    }
                    connected += 1;
                }
                _ => {}
            }
        }
        connected < self.max_connected_peers
    }

    /// Record a transport handle registration for `peer_id`, and perform
    /// the one-time handle assignment (or correction) on an existing peer.
    pub fn handle_registered(&mut self, peer_id: u8, handle: StreamHandle) {
        if (peer_id as usize) < MAX_AV_PEERS {
            self.handle_by_id[peer_id as usize] = Some(handle);
        }
        if let Some(peer) = self.find_by_id_mut(peer_id) {
            if peer.handle() != handle {
                if peer.handle() == STREAM_HANDLE_UNKNOWN {
                    log::info!(
                        "assign peer {} handle=0x{:02x} peer_id={}",
                        peer.address(),
                        handle,
                        peer_id
                    );
                } else {
                    log::warn!(
                        "correct peer {} handle=0x{:02x}->0x{:02x} peer_id={}",
                        peer.address(),
                        peer.handle(),
                        handle,
                        peer_id
                    );
                }
                peer.set_handle(handle);
            }
        }
    }

    /// Handles currently bound to peer ids.
    #[must_use]
    pub fn bound_handles(&self) -> Vec<StreamHandle, MAX_AV_PEERS> {
        self.handle_by_id.iter().flatten().copied().collect()
    }

    /// Drop every id-to-handle binding.
    pub fn clear_handle_bindings(&mut self) {
        self.handle_by_id = [None; MAX_AV_PEERS];
    }

    /// Remove one peer. Returns `false` if it did not exist.
    pub fn delete_peer(&mut self, address: PeerAddress) -> bool {
        self.peers.remove(&address).is_some()
    }

    /// Remove every peer that re-entered Idle and can be reclaimed.
    pub fn delete_idle_peers(&mut self) {
        let deletable: Vec<PeerAddress, MAX_AV_PEERS> = self
            .peers
            .values()
            .filter(|peer| peer.can_be_deleted())
            .map(Peer::address)
            .collect();
        for address in deletable {
            log::info!("delete idle peer {}", address);
            self.peers.remove(&address);
        }
    }

    /// Remove every peer unconditionally.
    pub fn cleanup_all(&mut self) {
        self.peers.clear();
    }

    /// Iterate over the peers of the role.
    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    /// Number of peers currently known.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: PeerAddress = PeerAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    const B: PeerAddress = PeerAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x66]);
    const C: PeerAddress = PeerAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x77]);

    fn registry() -> PeerRegistry {
        let mut registry = PeerRegistry::new(Role::Source);
        registry.enable(1);
        for id in 0..MAX_AV_PEERS as u8 {
            registry.handle_registered(id, 0x40 + id);
        }
        registry
    }

    #[test]
    fn test_find_or_create_allocates_smallest_free_id() {
        let mut registry = registry();
        assert_eq!(registry.find_or_create(A, STREAM_HANDLE_UNKNOWN).unwrap().id(), 0);
        assert_eq!(registry.find_or_create(B, STREAM_HANDLE_UNKNOWN).unwrap().id(), 1);

        // Existing peers are returned as-is.
        assert_eq!(registry.find_or_create(A, STREAM_HANDLE_UNKNOWN).unwrap().id(), 0);
        assert_eq!(registry.peer_count(), 2);

        // Deleting the first peer frees the smallest id again.
        assert!(registry.delete_peer(A));
        assert_eq!(registry.find_or_create(C, STREAM_HANDLE_UNKNOWN).unwrap().id(), 0);
    }

    #[test]
    fn test_find_or_create_resolves_handle_from_bindings() {
        let mut registry = registry();
        let peer = registry.find_or_create(A, STREAM_HANDLE_UNKNOWN).unwrap();
        assert_eq!(peer.handle(), 0x40);

        let peer = registry.find_or_create(B, 0x77).unwrap();
        assert_eq!(peer.handle(), 0x77);
    }

    #[test]
    fn test_find_or_create_fails_without_handle_binding() {
        let mut registry = PeerRegistry::new(Role::Source);
        registry.enable(1);
        assert_eq!(
            registry.find_or_create(A, STREAM_HANDLE_UNKNOWN).unwrap_err(),
            AvError::HandleUnbound
        );
        // An explicit handle works without bindings.
        assert!(registry.find_or_create(A, 0x41).is_ok());
    }

    #[test]
    fn test_remote_endpoint_is_role_complement() {
        let mut source = registry();
        assert_eq!(
            source.find_or_create(A, STREAM_HANDLE_UNKNOWN).unwrap().endpoint(),
            Role::Sink
        );

        let mut sink = PeerRegistry::new(Role::Sink);
        sink.enable(1);
        assert_eq!(sink.find_or_create(A, 0x41).unwrap().endpoint(), Role::Source);
    }

    #[test]
    fn test_sink_role_auto_activates_first_peer() {
        let mut sink = PeerRegistry::new(Role::Sink);
        sink.enable(2);
        assert!(sink.active_peer().is_empty());
        sink.find_or_create(A, 0x41).unwrap();
        assert_eq!(sink.active_peer(), A);
        sink.find_or_create(B, 0x42).unwrap();
        assert_eq!(sink.active_peer(), A);

        // The Source role never auto-activates.
        let mut source = registry();
        source.find_or_create(A, STREAM_HANDLE_UNKNOWN).unwrap();
        assert!(source.active_peer().is_empty());
    }

    #[test]
    fn test_admission_counts_connecting_and_connected() {
        let mut registry = registry();
        registry.find_or_create(A, STREAM_HANDLE_UNKNOWN).unwrap();
        // An idle peer does not count against the limit.
        assert!(registry.allowed_to_connect(B));

        registry.find_mut(A).unwrap().enter_state(PeerState::Opening);
        assert!(!registry.allowed_to_connect(B));
        // The same address is an idempotent retry.
        assert!(registry.allowed_to_connect(A));

        registry.find_mut(A).unwrap().enter_state(PeerState::Opened);
        assert!(!registry.allowed_to_connect(B));

        registry.find_mut(A).unwrap().enter_state(PeerState::Idle);
        assert!(registry.allowed_to_connect(B));
    }

    #[test]
    fn test_resolve_by_handle_does_not_create() {
        let mut registry = registry();
        assert_eq!(
            registry.resolve(PeerAddress::EMPTY, 0x40).unwrap_err(),
            AvError::PeerNotFound
        );
        registry.find_or_create(A, STREAM_HANDLE_UNKNOWN).unwrap();
        assert_eq!(registry.resolve(PeerAddress::EMPTY, 0x40).unwrap().address(), A);
        assert_eq!(
            registry
                .resolve(PeerAddress::EMPTY, STREAM_HANDLE_UNKNOWN)
                .unwrap_err(),
            AvError::PeerNotFound
        );
    }

    #[test]
    fn test_handle_registration_assigns_and_corrects() {
        let mut registry = PeerRegistry::new(Role::Source);
        registry.enable(1);
        registry.handle_registered(0, 0x41);
        let peer_handle = registry.find_or_create(A, STREAM_HANDLE_UNKNOWN).unwrap().handle();
        assert_eq!(peer_handle, 0x41);

        // A re-registration corrects the bound handle.
        registry.handle_registered(0, 0x51);
        assert_eq!(registry.find(A).unwrap().handle(), 0x51);
        assert!(registry.find_by_handle(0x51).is_some());
        assert!(registry.find_by_handle(0x41).is_none());
    }

    #[test]
    fn test_delete_idle_peers_spares_fresh_and_busy_peers() {
        let mut registry = registry();
        registry.find_or_create(A, STREAM_HANDLE_UNKNOWN).unwrap();
        registry.find_or_create(B, STREAM_HANDLE_UNKNOWN).unwrap();
        registry.find_or_create(C, STREAM_HANDLE_UNKNOWN).unwrap();

        // A is fresh (never transitioned) and C is connected, so both are
        // kept; B re-entered Idle and is deleted.
        {
            let peer = registry.find_mut(B).unwrap();
            peer.enter_state(PeerState::Opening);
            peer.enter_state(PeerState::Idle);
        }
        registry.find_mut(C).unwrap().enter_state(PeerState::Opened);

        registry.delete_idle_peers();
        assert!(registry.find(A).is_some());
        assert!(registry.find(B).is_none());
        assert!(registry.find(C).is_some());
    }

    #[test]
    fn test_bound_handles_and_cleanup() {
        let mut registry = registry();
        assert_eq!(registry.bound_handles().len(), MAX_AV_PEERS);
        registry.clear_handle_bindings();
        assert!(registry.bound_handles().is_empty());

        registry.find_or_create(A, 0x41).unwrap();
        registry.cleanup_all();
        assert_eq!(registry.peer_count(), 0);
    }

    #[test]
    fn test_peer_id_exhaustion() {
        let mut registry = registry();
        for i in 0..MAX_AV_PEERS as u8 {
            let address = PeerAddress::new([0, 0, 0, 0, 0, i + 1]);
            registry.find_or_create(address, STREAM_HANDLE_UNKNOWN).unwrap();
        }
        assert_eq!(
            registry
                .find_or_create(PeerAddress::new([1, 0, 0, 0, 0, 0]), STREAM_HANDLE_UNKNOWN)
                .unwrap_err(),
            AvError::NoFreePeerId
        );
    }
}
