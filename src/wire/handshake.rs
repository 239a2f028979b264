//! Handshake and switch-configuration messages: features request/reply
//! and get/set config. Hello and echo carry no structure beyond the
//! header (echo payloads are opaque bytes mirrored back).

use {Error, Repr, Result};
use byteorder::{ByteOrder, NetworkEndian};

use wire::port_msg::PhyPortRepr;

bitflags! {
    /// Datapath capabilities advertised in a features reply.
    pub struct Capabilities: u32 {
        const FLOW_STATS = 1 << 0;
        const TABLE_STATS = 1 << 1;
        const PORT_STATS = 1 << 2;
        const STP = 1 << 3;
        const IP_REASM = 1 << 5;
        const QUEUE_STATS = 1 << 6;
        const ARP_MATCH_IP = 1 << 7;
    }
}

bitflags! {
    /// Bitmap of supported OF1.0 action types (one bit per OFPAT code).
    pub struct ActionCaps: u32 {
        const OUTPUT = 1 << 0;
        const SET_VLAN_VID = 1 << 1;
        const SET_VLAN_PCP = 1 << 2;
        const STRIP_VLAN = 1 << 3;
        const SET_DL_SRC = 1 << 4;
        const SET_DL_DST = 1 << 5;
        const SET_NW_SRC = 1 << 6;
        const SET_NW_DST = 1 << 7;
        const SET_NW_TOS = 1 << 8;
        const SET_TP_SRC = 1 << 9;
        const SET_TP_DST = 1 << 10;
        const ENQUEUE = 1 << 11;
    }
}

mod field {
    use field::*;

    pub const DATAPATH_ID: Field = 0..8;
    pub const N_BUFFERS: Field = 8..12;
    pub const N_TABLES: usize = 12;
    // pad 13..16
    pub const CAPABILITIES: Field = 16..20;
    pub const ACTIONS: Field = 20..24;
    pub const PORTS: Rest = 24..;
}

/// High-level representation of an OF1.0 features reply.
#[derive(Debug, PartialEq, Clone)]
pub struct FeaturesReplyRepr {
    pub datapath_id: u64,
    pub n_buffers: u32,
    pub n_tables: u8,
    pub capabilities: Capabilities,
    pub actions: ActionCaps,
    pub ports: Vec<PhyPortRepr>,
}

impl Repr for FeaturesReplyRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < field::PORTS.start {
            return Err(Error::Truncated);
        }
        let ports_buf = &buffer[field::PORTS];
        if ports_buf.len() % PhyPortRepr::WIRE_LEN != 0 {
            return Err(Error::Malformed);
        }
        let mut ports = Vec::new();
        for chunk in ports_buf.chunks(PhyPortRepr::WIRE_LEN) {
            ports.push(PhyPortRepr::parse(chunk)?);
        }
        Ok(FeaturesReplyRepr {
            datapath_id: NetworkEndian::read_u64(&buffer[field::DATAPATH_ID]),
            n_buffers: NetworkEndian::read_u32(&buffer[field::N_BUFFERS]),
            n_tables: buffer[field::N_TABLES],
            capabilities: Capabilities::from_bits_truncate(NetworkEndian::read_u32(
                &buffer[field::CAPABILITIES],
            )),
            actions: ActionCaps::from_bits_truncate(NetworkEndian::read_u32(
                &buffer[field::ACTIONS],
            )),
            ports,
        })
    }

    fn buffer_len(&self) -> usize {
        field::PORTS.start + self.ports.len() * PhyPortRepr::WIRE_LEN
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < self.buffer_len() {
            return Err(Error::Exhausted);
        }
        for byte in buffer[..field::PORTS.start].iter_mut() {
            *byte = 0;
        }
        NetworkEndian::write_u64(&mut buffer[field::DATAPATH_ID], self.datapath_id);
        NetworkEndian::write_u32(&mut buffer[field::N_BUFFERS], self.n_buffers);
        buffer[field::N_TABLES] = self.n_tables;
        NetworkEndian::write_u32(&mut buffer[field::CAPABILITIES], self.capabilities.bits());
        NetworkEndian::write_u32(&mut buffer[field::ACTIONS], self.actions.bits());
        let mut offset = field::PORTS.start;
        for port in &self.ports {
            port.emit(&mut buffer[offset..offset + PhyPortRepr::WIRE_LEN])?;
            offset += PhyPortRepr::WIRE_LEN;
        }
        Ok(())
    }
}

/// IP fragment handling policy, the low bits of the config flags.
enum_with_unknown! {
    pub doc enum FragPolicy(u16) {
        /// No special handling.
        Normal = 0,
        /// Drop fragments.
        Drop = 1,
        /// Reassemble (only if supported).
        Reassemble = 2
    }
}

pub const FRAG_MASK: u16 = 3;

/// Body of get-config-reply and set-config.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SwitchConfigRepr {
    pub flags: u16,
    pub miss_send_len: u16,
}

impl SwitchConfigRepr {
    pub fn frag_policy(&self) -> FragPolicy {
        FragPolicy::from(self.flags & FRAG_MASK)
    }
}

mod config_field {
    use field::*;

    pub const FLAGS: Field = 0..2;
    pub const MISS_SEND_LEN: Field = 2..4;
}

impl Repr for SwitchConfigRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < config_field::MISS_SEND_LEN.end {
            return Err(Error::Truncated);
        }
        Ok(SwitchConfigRepr {
            flags: NetworkEndian::read_u16(&buffer[config_field::FLAGS]),
            miss_send_len: NetworkEndian::read_u16(&buffer[config_field::MISS_SEND_LEN]),
        })
    }

    fn buffer_len(&self) -> usize {
        config_field::MISS_SEND_LEN.end
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < self.buffer_len() {
            return Err(Error::Exhausted);
        }
        NetworkEndian::write_u16(&mut buffer[config_field::FLAGS], self.flags);
        NetworkEndian::write_u16(
            &mut buffer[config_field::MISS_SEND_LEN],
            self.miss_send_len,
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_config_roundtrip() {
        let repr = SwitchConfigRepr {
            flags: FragPolicy::Drop.into(),
            miss_send_len: 128,
        };
        let mut bytes = [0; 4];
        repr.emit(&mut bytes).unwrap();
        assert_eq!(bytes, [0x00, 0x01, 0x00, 0x80]);
        assert_eq!(SwitchConfigRepr::parse(&bytes).unwrap(), repr);
        assert_eq!(repr.frag_policy(), FragPolicy::Drop);
    }
}
