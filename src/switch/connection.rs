//! Per-controller-connection state: role, negotiated formats,
//! asynchronous-message masks, the outbound message queue, and the
//! packet buffer that backs buffer ids.
//!
//! The transport itself (sockets, TLS, reconnection) lives outside the
//! core: it feeds complete inbound messages to the dispatcher and drains
//! each connection's outbox.

use std::collections::{HashMap, VecDeque};

use {Error, Result};
use wire::error_msg::{BadRequestCode, OfError};
use wire::flow_mod::RemovedReason;
use wire::openflow::Version;
use wire::packet_io::PacketInReason;
use wire::port_msg::PortReason;
use wire::vendor::{FlowFormat, NxRole, PacketInFormat};

/// Opaque connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u32);

/// The two controller-connection classes. Service connections are exempt
/// from slave-role restrictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnKind {
    Primary,
    Service,
}

/// Default miss-send-len, in bytes.
pub const DEFAULT_MISS_SEND_LEN: u16 = 128;

/// Per-role masks gating asynchronous messages: index 0 applies to
/// master/other, index 1 to slaves. Each mask is a bitmap over the
/// message's reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncConfig {
    pub packet_in_mask: [u32; 2],
    pub port_status_mask: [u32; 2],
    pub flow_removed_mask: [u32; 2],
}

impl Default for AsyncConfig {
    fn default() -> Self {
        // Masters and equals hear everything; slaves only port status.
        AsyncConfig {
            packet_in_mask: [0x3, 0x0],
            port_status_mask: [0x7, 0x7],
            flow_removed_mask: [0x7, 0x0],
        }
    }
}

/// One controller connection as the dispatcher sees it.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnId,
    pub kind: ConnKind,
    pub role: NxRole,
    /// Negotiated protocol version; fixed after the hello exchange.
    pub version: Version,
    pub flow_format: FlowFormat,
    pub packet_in_format: PacketInFormat,
    pub miss_send_len: u16,
    pub controller_id: u16,
    /// Nicira extension: carry a table id in flow-mod commands.
    pub flow_mod_table_id: bool,
    pub async_config: AsyncConfig,
    pub buffers: PacketBuffer,
    outbox: VecDeque<Vec<u8>>,
}

impl Connection {
    fn new(id: ConnId, kind: ConnKind) -> Connection {
        Connection {
            id,
            kind,
            role: NxRole::Other,
            version: Version::OpenFlow1Dot0,
            flow_format: FlowFormat::OpenFlow10,
            packet_in_format: PacketInFormat::OpenFlow10,
            miss_send_len: DEFAULT_MISS_SEND_LEN,
            controller_id: 0,
            flow_mod_table_id: false,
            async_config: AsyncConfig::default(),
            buffers: PacketBuffer::new(),
            outbox: VecDeque::new(),
        }
    }

    /// Queue an outbound message for the transport to drain.
    pub fn send(&mut self, message: Vec<u8>) {
        self.outbox.push_back(message);
    }

    /// Drain everything queued since the last call.
    pub fn take_output(&mut self) -> Vec<Vec<u8>> {
        self.outbox.drain(..).collect()
    }

    fn mask_index(&self) -> usize {
        if self.role == NxRole::Slave {
            1
        } else {
            0
        }
    }

    pub fn wants_packet_in(&self, reason: PacketInReason, controller_id: u16) -> bool {
        if controller_id != self.controller_id {
            return false;
        }
        let bit = 1u32 << u8::from(reason);
        self.async_config.packet_in_mask[self.mask_index()] & bit != 0
    }

    pub fn wants_port_status(&self, reason: PortReason) -> bool {
        let bit = 1u32 << u8::from(reason);
        self.async_config.port_status_mask[self.mask_index()] & bit != 0
    }

    pub fn wants_flow_removed(&self, reason: RemovedReason) -> bool {
        let bit = 1u32 << u8::from(reason);
        self.async_config.flow_removed_mask[self.mask_index()] & bit != 0
    }
}

/// All connections of one switch.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    conns: HashMap<ConnId, Connection>,
    next_id: u32,
}

impl ConnectionManager {
    pub fn new() -> ConnectionManager {
        ConnectionManager::default()
    }

    pub fn connect(&mut self, kind: ConnKind) -> ConnId {
        let id = ConnId(self.next_id);
        self.next_id += 1;
        self.conns.insert(id, Connection::new(id, kind));
        id
    }

    pub fn disconnect(&mut self, id: ConnId) {
        self.conns.remove(&id);
    }

    pub fn get(&self, id: ConnId) -> Option<&Connection> {
        self.conns.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut Connection> {
        self.conns.get_mut(&id)
    }

    /// Connection ids in creation order.
    pub fn ids(&self) -> Vec<ConnId> {
        let mut ids: Vec<ConnId> = self.conns.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.conns.values_mut()
    }

    /// Change a connection's role. Promoting one connection to master
    /// demotes any previous master to slave.
    pub fn set_role(&mut self, id: ConnId, role: NxRole) {
        if role == NxRole::Master {
            for conn in self.conns.values_mut() {
                if conn.role == NxRole::Master {
                    conn.role = NxRole::Slave;
                }
            }
        }
        if let Some(conn) = self.conns.get_mut(&id) {
            conn.role = role;
        }
    }
}

// ----------------------------------------------------------------------

const PKTBUF_BITS: u32 = 8;
const PKTBUF_CNT: usize = 1 << PKTBUF_BITS;

#[derive(Debug, Clone)]
pub struct BufferedPacket {
    pub data: Vec<u8>,
    pub in_port: u16,
}

/// A small ring of punted packets, addressed by the buffer ids stamped
/// into packet-in messages. A slot's cookie is baked into the id so a
/// stale id is detected instead of returning the wrong packet.
#[derive(Debug)]
pub struct PacketBuffer {
    slots: Vec<Option<BufferedPacket>>,
    cookies: Vec<u32>,
    next: usize,
}

impl PacketBuffer {
    pub fn new() -> PacketBuffer {
        PacketBuffer {
            slots: (0..PKTBUF_CNT).map(|_| None).collect(),
            cookies: vec![0; PKTBUF_CNT],
            next: 0,
        }
    }

    /// Store a packet, returning its buffer id. The oldest packet is
    /// overwritten once the ring wraps.
    pub fn insert(&mut self, data: Vec<u8>, in_port: u16) -> u32 {
        let slot = self.next;
        self.next = (self.next + 1) % PKTBUF_CNT;
        self.cookies[slot] = self.cookies[slot].wrapping_add(1) & (!0u32 >> PKTBUF_BITS);
        self.slots[slot] = Some(BufferedPacket { data, in_port });
        (self.cookies[slot] << PKTBUF_BITS) | slot as u32
    }

    /// Take the packet a buffer id refers to.
    pub fn retrieve(&mut self, id: u32) -> Result<BufferedPacket> {
        let slot = (id & (PKTBUF_CNT as u32 - 1)) as usize;
        let cookie = id >> PKTBUF_BITS;
        if self.cookies[slot] != cookie {
            return Err(Error::Of(OfError::BadRequest(BadRequestCode::BufferUnknown)));
        }
        self.slots[slot]
            .take()
            .ok_or(Error::Of(OfError::BadRequest(BadRequestCode::BufferEmpty)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_buffer_roundtrip() {
        let mut buffers = PacketBuffer::new();
        let id = buffers.insert(vec![1, 2, 3], 5);
        let packet = buffers.retrieve(id).unwrap();
        assert_eq!(packet.data, vec![1, 2, 3]);
        assert_eq!(packet.in_port, 5);
        // second take of the same id: empty
        assert_eq!(
            buffers.retrieve(id).unwrap_err(),
            Error::Of(OfError::BadRequest(BadRequestCode::BufferEmpty))
        );
    }

    #[test]
    fn test_stale_buffer_id_detected() {
        let mut buffers = PacketBuffer::new();
        let first = buffers.insert(vec![1], 1);
        for _ in 0..PKTBUF_CNT {
            buffers.insert(vec![2], 2);
        }
        assert_eq!(
            buffers.retrieve(first).unwrap_err(),
            Error::Of(OfError::BadRequest(BadRequestCode::BufferUnknown))
        );
    }

    #[test]
    fn test_master_promotion_demotes_previous() {
        let mut manager = ConnectionManager::new();
        let a = manager.connect(ConnKind::Primary);
        let b = manager.connect(ConnKind::Primary);
        manager.set_role(a, NxRole::Master);
        manager.set_role(b, NxRole::Master);
        assert_eq!(manager.get(a).unwrap().role, NxRole::Slave);
        assert_eq!(manager.get(b).unwrap().role, NxRole::Master);
    }

    #[test]
    fn test_slave_async_defaults() {
        let mut manager = ConnectionManager::new();
        let id = manager.connect(ConnKind::Primary);
        manager.set_role(id, NxRole::Slave);
        let conn = manager.get(id).unwrap();
        assert!(!conn.wants_packet_in(PacketInReason::NoMatch, 0));
        assert!(conn.wants_port_status(PortReason::Add));
        assert!(!conn.wants_flow_removed(RemovedReason::HardTimeout));
    }
}
