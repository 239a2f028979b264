//! Physical-port description, port-status and port-mod messages.

use {Error, Repr, Result};
use byteorder::{ByteOrder, NetworkEndian};
use smoltcp::wire::EthernetAddress;

/// Highest usable regular port number; everything above is reserved.
pub const OFPP_MAX: u16 = 0xff00;
/// Send the packet out the input port.
pub const OFPP_IN_PORT: u16 = 0xfff8;
/// Submit to the flow table (packet-out only).
pub const OFPP_TABLE: u16 = 0xfff9;
/// Forward using the non-OpenFlow pipeline.
pub const OFPP_NORMAL: u16 = 0xfffa;
/// Flood through all standard ports except the input port.
pub const OFPP_FLOOD: u16 = 0xfffb;
/// All ports except the input port.
pub const OFPP_ALL: u16 = 0xfffc;
/// Send to controller.
pub const OFPP_CONTROLLER: u16 = 0xfffd;
/// The local OpenFlow "port".
pub const OFPP_LOCAL: u16 = 0xfffe;
/// Wildcard used in requests when no port is meant.
pub const OFPP_NONE: u16 = 0xffff;

/// Longest printable port name, terminator included.
pub const MAX_PORT_NAME_LEN: usize = 16;

bitflags! {
    /// Controller-managed port behavior bits plus the administrative
    /// PORT_DOWN bit.
    pub struct PortConfig: u32 {
        const PORT_DOWN = 1 << 0;
        const NO_STP = 1 << 1;
        const NO_RECV = 1 << 2;
        const NO_RECV_STP = 1 << 3;
        const NO_FLOOD = 1 << 4;
        const NO_FWD = 1 << 5;
        const NO_PACKET_IN = 1 << 6;
    }
}

bitflags! {
    /// Link and STP state reported by the switch. The two STP bits form a
    /// small sub-field, see the `stp_*` helpers.
    pub struct PortState: u32 {
        const LINK_DOWN = 1 << 0;
        // STP_LISTEN is the all-zero sub-state.
        const STP_LEARN = 1 << 8;
        const STP_FORWARD = 2 << 8;
        const STP_BLOCK = 3 << 8;
        const STP_MASK = 3 << 8;
    }
}

impl PortState {
    pub fn stp_state(&self) -> PortState {
        *self & PortState::STP_MASK
    }
}

bitflags! {
    /// Link features, used for the current/advertised/supported/peer sets.
    pub struct PortFeatures: u32 {
        const F_10MB_HD = 1 << 0;
        const F_10MB_FD = 1 << 1;
        const F_100MB_HD = 1 << 2;
        const F_100MB_FD = 1 << 3;
        const F_1GB_HD = 1 << 4;
        const F_1GB_FD = 1 << 5;
        const F_10GB_FD = 1 << 6;
        const COPPER = 1 << 7;
        const FIBER = 1 << 8;
        const AUTONEG = 1 << 9;
        const PAUSE = 1 << 10;
        const PAUSE_ASYM = 1 << 11;
    }
}

mod field {
    use field::*;

    pub const PORT_NO: Field = 0..2;
    pub const HW_ADDR: Field = 2..8;
    pub const NAME: Field = 8..24;
    pub const CONFIG: Field = 24..28;
    pub const STATE: Field = 28..32;
    pub const CURR: Field = 32..36;
    pub const ADVERTISED: Field = 36..40;
    pub const SUPPORTED: Field = 40..44;
    pub const PEER: Field = 44..48;
}

/// The OF1.0 `ofp_phy_port` structure.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PhyPortRepr {
    pub port_no: u16,
    pub hw_addr: EthernetAddress,
    pub name: String,
    pub config: PortConfig,
    pub state: PortState,
    pub curr: PortFeatures,
    pub advertised: PortFeatures,
    pub supported: PortFeatures,
    pub peer: PortFeatures,
}

impl PhyPortRepr {
    pub const WIRE_LEN: usize = 48;
}

impl Repr for PhyPortRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < Self::WIRE_LEN {
            return Err(Error::Truncated);
        }
        let name_bytes = &buffer[field::NAME];
        let name_len = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        let name = String::from_utf8_lossy(&name_bytes[..name_len]).into_owned();
        Ok(PhyPortRepr {
            port_no: NetworkEndian::read_u16(&buffer[field::PORT_NO]),
            hw_addr: EthernetAddress::from_bytes(&buffer[field::HW_ADDR]),
            name,
            config: PortConfig::from_bits_truncate(NetworkEndian::read_u32(
                &buffer[field::CONFIG],
            )),
            state: PortState::from_bits_truncate(NetworkEndian::read_u32(&buffer[field::STATE])),
            curr: PortFeatures::from_bits_truncate(NetworkEndian::read_u32(&buffer[field::CURR])),
            advertised: PortFeatures::from_bits_truncate(NetworkEndian::read_u32(
                &buffer[field::ADVERTISED],
            )),
            supported: PortFeatures::from_bits_truncate(NetworkEndian::read_u32(
                &buffer[field::SUPPORTED],
            )),
            peer: PortFeatures::from_bits_truncate(NetworkEndian::read_u32(&buffer[field::PEER])),
        })
    }

    fn buffer_len(&self) -> usize {
        Self::WIRE_LEN
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < Self::WIRE_LEN {
            return Err(Error::Exhausted);
        }
        NetworkEndian::write_u16(&mut buffer[field::PORT_NO], self.port_no);
        buffer[field::HW_ADDR].copy_from_slice(self.hw_addr.as_bytes());
        let name = self.name.as_bytes();
        let copy = name.len().min(MAX_PORT_NAME_LEN - 1);
        for (i, byte) in buffer[field::NAME].iter_mut().enumerate() {
            *byte = if i < copy { name[i] } else { 0 };
        }
        NetworkEndian::write_u32(&mut buffer[field::CONFIG], self.config.bits());
        NetworkEndian::write_u32(&mut buffer[field::STATE], self.state.bits());
        NetworkEndian::write_u32(&mut buffer[field::CURR], self.curr.bits());
        NetworkEndian::write_u32(&mut buffer[field::ADVERTISED], self.advertised.bits());
        NetworkEndian::write_u32(&mut buffer[field::SUPPORTED], self.supported.bits());
        NetworkEndian::write_u32(&mut buffer[field::PEER], self.peer.bits());
        Ok(())
    }
}

enum_with_unknown! {
    /// Reason field of a port-status message.
    pub doc enum PortReason(u8) {
        /// The port was added.
        Add = 0,
        /// The port was removed.
        Delete = 1,
        /// An attribute of the port changed.
        Modify = 2
    }
}

/// Port-status message body: a reason plus the port description.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PortStatusRepr {
    pub reason: PortReason,
    pub desc: PhyPortRepr,
}

mod status_field {
    pub const REASON: usize = 0;
    pub const DESC: usize = 8;
}

impl Repr for PortStatusRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < status_field::DESC + PhyPortRepr::WIRE_LEN {
            return Err(Error::Truncated);
        }
        Ok(PortStatusRepr {
            reason: PortReason::from(buffer[status_field::REASON]),
            desc: PhyPortRepr::parse(&buffer[status_field::DESC..])?,
        })
    }

    fn buffer_len(&self) -> usize {
        status_field::DESC + PhyPortRepr::WIRE_LEN
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < self.buffer_len() {
            return Err(Error::Exhausted);
        }
        for byte in buffer[..status_field::DESC].iter_mut() {
            *byte = 0;
        }
        buffer[status_field::REASON] = self.reason.into();
        self.desc.emit(&mut buffer[status_field::DESC..])
    }
}

/// Port-mod message body.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PortModRepr {
    pub port_no: u16,
    pub hw_addr: EthernetAddress,
    pub config: PortConfig,
    pub mask: PortConfig,
    pub advertise: PortFeatures,
}

mod mod_field {
    use field::*;

    pub const PORT_NO: Field = 0..2;
    pub const HW_ADDR: Field = 2..8;
    pub const CONFIG: Field = 8..12;
    pub const MASK: Field = 12..16;
    pub const ADVERTISE: Field = 16..20;
    pub const END: usize = 24;
}

impl Repr for PortModRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < mod_field::END {
            return Err(Error::Truncated);
        }
        Ok(PortModRepr {
            port_no: NetworkEndian::read_u16(&buffer[mod_field::PORT_NO]),
            hw_addr: EthernetAddress::from_bytes(&buffer[mod_field::HW_ADDR]),
            config: PortConfig::from_bits_truncate(NetworkEndian::read_u32(
                &buffer[mod_field::CONFIG],
            )),
            mask: PortConfig::from_bits_truncate(NetworkEndian::read_u32(
                &buffer[mod_field::MASK],
            )),
            advertise: PortFeatures::from_bits_truncate(NetworkEndian::read_u32(
                &buffer[mod_field::ADVERTISE],
            )),
        })
    }

    fn buffer_len(&self) -> usize {
        mod_field::END
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < self.buffer_len() {
            return Err(Error::Exhausted);
        }
        for byte in buffer[..mod_field::END].iter_mut() {
            *byte = 0;
        }
        NetworkEndian::write_u16(&mut buffer[mod_field::PORT_NO], self.port_no);
        buffer[mod_field::HW_ADDR].copy_from_slice(self.hw_addr.as_bytes());
        NetworkEndian::write_u32(&mut buffer[mod_field::CONFIG], self.config.bits());
        NetworkEndian::write_u32(&mut buffer[mod_field::MASK], self.mask.bits());
        NetworkEndian::write_u32(&mut buffer[mod_field::ADVERTISE], self.advertise.bits());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_port() -> PhyPortRepr {
        PhyPortRepr {
            port_no: 5,
            hw_addr: EthernetAddress::from_bytes(&[0x52, 0x54, 0x00, 0x01, 0x02, 0x03]),
            name: "eth0".to_string(),
            config: PortConfig::empty(),
            state: PortState::LINK_DOWN,
            curr: PortFeatures::F_1GB_FD | PortFeatures::COPPER,
            advertised: PortFeatures::empty(),
            supported: PortFeatures::F_1GB_FD | PortFeatures::F_100MB_FD | PortFeatures::COPPER,
            peer: PortFeatures::empty(),
        }
    }

    #[test]
    fn test_phy_port_roundtrip() {
        let repr = sample_port();
        let mut bytes = [0xaa; 48];
        repr.emit(&mut bytes).unwrap();
        assert_eq!(PhyPortRepr::parse(&bytes).unwrap(), repr);
        // name is NUL padded
        assert_eq!(&bytes[8..13], b"eth0\0");
    }

    #[test]
    fn test_port_status_roundtrip() {
        let repr = PortStatusRepr {
            reason: PortReason::Add,
            desc: sample_port(),
        };
        let mut bytes = vec![0; repr.buffer_len()];
        repr.emit(&mut bytes).unwrap();
        assert_eq!(PortStatusRepr::parse(&bytes).unwrap(), repr);
    }

    #[test]
    fn test_long_name_truncated() {
        let mut repr = sample_port();
        repr.name = "a-very-long-interface-name".to_string();
        let mut bytes = [0; 48];
        repr.emit(&mut bytes).unwrap();
        let parsed = PhyPortRepr::parse(&bytes).unwrap();
        assert_eq!(parsed.name.len(), MAX_PORT_NAME_LEN - 1);
    }
}
