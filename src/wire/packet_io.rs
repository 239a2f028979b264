//! Packet-in and packet-out messages (OF1.0 forms).

use {Error, Repr, Result};
use byteorder::{ByteOrder, NetworkEndian};

use actions::{self, Action};

enum_with_unknown! {
    /// Why a packet was punted to the controller.
    pub doc enum PacketInReason(u8) {
        /// No matching flow.
        NoMatch = 0,
        /// Action explicitly output to controller.
        Action = 1
    }
}

/// Packet-in message body. `total_len` is the length of the frame as seen
/// by the datapath; `data` may be truncated to the connection's
/// miss-send-len.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PacketInRepr {
    pub buffer_id: u32,
    pub total_len: u16,
    pub in_port: u16,
    pub reason: PacketInReason,
    pub data: Vec<u8>,
}

mod field {
    use field::*;

    pub const BUFFER_ID: Field = 0..4;
    pub const TOTAL_LEN: Field = 4..6;
    pub const IN_PORT: Field = 6..8;
    pub const REASON: usize = 8;
    // pad 9
    pub const DATA: Rest = 10..;
}

impl Repr for PacketInRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < field::DATA.start {
            return Err(Error::Truncated);
        }
        Ok(PacketInRepr {
            buffer_id: NetworkEndian::read_u32(&buffer[field::BUFFER_ID]),
            total_len: NetworkEndian::read_u16(&buffer[field::TOTAL_LEN]),
            in_port: NetworkEndian::read_u16(&buffer[field::IN_PORT]),
            reason: PacketInReason::from(buffer[field::REASON]),
            data: buffer[field::DATA].to_vec(),
        })
    }

    fn buffer_len(&self) -> usize {
        field::DATA.start + self.data.len()
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < self.buffer_len() {
            return Err(Error::Exhausted);
        }
        NetworkEndian::write_u32(&mut buffer[field::BUFFER_ID], self.buffer_id);
        NetworkEndian::write_u16(&mut buffer[field::TOTAL_LEN], self.total_len);
        NetworkEndian::write_u16(&mut buffer[field::IN_PORT], self.in_port);
        buffer[field::REASON] = self.reason.into();
        buffer[field::REASON + 1] = 0;
        buffer[field::DATA.start..field::DATA.start + self.data.len()]
            .copy_from_slice(&self.data);
        Ok(())
    }
}

/// Packet-out message body. `data` is empty when `buffer_id` names a
/// buffered packet.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PacketOutRepr {
    pub buffer_id: u32,
    pub in_port: u16,
    pub actions: Vec<Action>,
    pub data: Vec<u8>,
}

mod out_field {
    use field::*;

    pub const BUFFER_ID: Field = 0..4;
    pub const IN_PORT: Field = 4..6;
    pub const ACTIONS_LEN: Field = 6..8;
    pub const ACTIONS: Rest = 8..;
}

impl Repr for PacketOutRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < out_field::ACTIONS.start {
            return Err(Error::Truncated);
        }
        let actions_len = NetworkEndian::read_u16(&buffer[out_field::ACTIONS_LEN]) as usize;
        let rest = &buffer[out_field::ACTIONS.start..];
        if actions_len > rest.len() {
            return Err(Error::Truncated);
        }
        Ok(PacketOutRepr {
            buffer_id: NetworkEndian::read_u32(&buffer[out_field::BUFFER_ID]),
            in_port: NetworkEndian::read_u16(&buffer[out_field::IN_PORT]),
            actions: actions::parse_of10(&rest[..actions_len])?,
            data: rest[actions_len..].to_vec(),
        })
    }

    fn buffer_len(&self) -> usize {
        out_field::ACTIONS.start + actions::of10_len(&self.actions) + self.data.len()
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < self.buffer_len() {
            return Err(Error::Exhausted);
        }
        let encoded = actions::emit_of10(&self.actions);
        NetworkEndian::write_u32(&mut buffer[out_field::BUFFER_ID], self.buffer_id);
        NetworkEndian::write_u16(&mut buffer[out_field::IN_PORT], self.in_port);
        NetworkEndian::write_u16(&mut buffer[out_field::ACTIONS_LEN], encoded.len() as u16);
        let actions_end = out_field::ACTIONS.start + encoded.len();
        buffer[out_field::ACTIONS.start..actions_end].copy_from_slice(&encoded);
        buffer[actions_end..actions_end + self.data.len()].copy_from_slice(&self.data);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use wire::flow_mod::NO_BUFFER;

    #[test]
    fn test_packet_in_roundtrip() {
        let repr = PacketInRepr {
            buffer_id: 200,
            total_len: 1000,
            in_port: 7,
            reason: PacketInReason::NoMatch,
            data: vec![0x68, 0x6f, 0x67, 0x65],
        };
        let mut bytes = vec![0; repr.buffer_len()];
        repr.emit(&mut bytes).unwrap();
        assert_eq!(PacketInRepr::parse(&bytes).unwrap(), repr);
    }

    #[test]
    fn test_packet_out_roundtrip() {
        let repr = PacketOutRepr {
            buffer_id: NO_BUFFER,
            in_port: 1,
            actions: vec![Action::Output {
                port: 2,
                max_len: 0,
            }],
            data: vec![0xde, 0xad, 0xbe, 0xef],
        };
        let mut bytes = vec![0; repr.buffer_len()];
        repr.emit(&mut bytes).unwrap();
        assert_eq!(PacketOutRepr::parse(&bytes).unwrap(), repr);
    }
}
