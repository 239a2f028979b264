//! The OpenFlow 1.0 fixed-layout flow match (`ofp_match`).
//!
//! ```no_rust
//! +-------------------------------+
//! |           wildcards           |
//! +---------------+---------------+
//! |    in_port    |    dl_src     |
//! +---------------+ - - - - - - - +
//! |            dl_src             |
//! + - - - - - - - +---------------+
//! |    dl_src     |    dl_dst     |
//! +---------------+ - - - - - - - +
//! |            dl_dst             |
//! +---------------+-------+-------+
//! |    dl_vlan    |  pcp  |  pad  |
//! +---------------+-------+-------+
//! |    dl_type    |  tos  | proto |
//! +---------------+-------+-------+
//! |      pad      |    nw_src     |
//! +---------------+ - - - - - - - +
//! |    nw_src     |    nw_dst     |
//! +---------------+ - - - - - - - +
//! |    nw_dst     |    tp_src     |
//! +---------------+---------------+
//! |    tp_dst     |
//! +---------------+
//! ```
//!
//! The `wildcards` bitmap marks fields as don't-care; the IPv4 addresses
//! use a 6-bit count of wildcarded low bits instead of single flags, which
//! gives CIDR-style prefixes. VLAN id and priority are translated to and
//! from the single TCI field used internally.

use {Error, Repr, Result};
use byteorder::{ByteOrder, NetworkEndian};
use smoltcp::wire::{EthernetAddress, Ipv4Address};

use flow::{self, Match};

/// Size of the OF1.0 match structure on the wire.
pub const MATCH_LEN: usize = 40;

/// Value of `dl_vlan` that matches packets without an 802.1Q header.
pub const OFP_VLAN_NONE: u16 = 0xffff;

pub const OFPFW_IN_PORT: u32 = 1 << 0;
pub const OFPFW_DL_VLAN: u32 = 1 << 1;
pub const OFPFW_DL_SRC: u32 = 1 << 2;
pub const OFPFW_DL_DST: u32 = 1 << 3;
pub const OFPFW_DL_TYPE: u32 = 1 << 4;
pub const OFPFW_NW_PROTO: u32 = 1 << 5;
pub const OFPFW_TP_SRC: u32 = 1 << 6;
pub const OFPFW_TP_DST: u32 = 1 << 7;
pub const OFPFW_NW_SRC_SHIFT: u32 = 8;
pub const OFPFW_NW_SRC_MASK: u32 = 0x3f << OFPFW_NW_SRC_SHIFT;
pub const OFPFW_NW_DST_SHIFT: u32 = 14;
pub const OFPFW_NW_DST_MASK: u32 = 0x3f << OFPFW_NW_DST_SHIFT;
pub const OFPFW_DL_VLAN_PCP: u32 = 1 << 20;
pub const OFPFW_NW_TOS: u32 = 1 << 21;
pub const OFPFW_ALL: u32 = (1 << 22) - 1;

mod field {
    use field::*;

    pub const WILDCARDS: Field = 0..4;
    pub const IN_PORT: Field = 4..6;
    pub const DL_SRC: Field = 6..12;
    pub const DL_DST: Field = 12..18;
    pub const DL_VLAN: Field = 18..20;
    pub const DL_VLAN_PCP: usize = 20;
    pub const DL_TYPE: Field = 22..24;
    pub const NW_TOS: usize = 24;
    pub const NW_PROTO: usize = 25;
    pub const NW_SRC: Field = 28..32;
    pub const NW_DST: Field = 32..36;
    pub const TP_SRC: Field = 36..38;
    pub const TP_DST: Field = 38..40;
}

/// A wrapper to read and write a buffer holding an OF1.0 match.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T> {
    inner: T,
}

impl<T: AsRef<[u8]>> Packet<T> {
    pub fn new(buf: T) -> Self {
        Packet { inner: buf }
    }

    pub fn new_checked(buf: T) -> Result<Self> {
        let packet = Packet { inner: buf };
        packet.check_len()?;
        Ok(packet)
    }

    pub fn check_len(&self) -> Result<()> {
        if self.inner.as_ref().len() < MATCH_LEN {
            return Err(Error::Truncated);
        }
        Ok(())
    }

    pub fn wildcards(&self) -> u32 {
        NetworkEndian::read_u32(&self.inner.as_ref()[field::WILDCARDS])
    }

    pub fn in_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.inner.as_ref()[field::IN_PORT])
    }

    pub fn dl_src(&self) -> EthernetAddress {
        EthernetAddress::from_bytes(&self.inner.as_ref()[field::DL_SRC])
    }

    pub fn dl_dst(&self) -> EthernetAddress {
        EthernetAddress::from_bytes(&self.inner.as_ref()[field::DL_DST])
    }

    pub fn dl_vlan(&self) -> u16 {
        NetworkEndian::read_u16(&self.inner.as_ref()[field::DL_VLAN])
    }

    pub fn dl_vlan_pcp(&self) -> u8 {
        self.inner.as_ref()[field::DL_VLAN_PCP]
    }

    pub fn dl_type(&self) -> u16 {
        NetworkEndian::read_u16(&self.inner.as_ref()[field::DL_TYPE])
    }

    pub fn nw_tos(&self) -> u8 {
        self.inner.as_ref()[field::NW_TOS]
    }

    pub fn nw_proto(&self) -> u8 {
        self.inner.as_ref()[field::NW_PROTO]
    }

    pub fn nw_src(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.inner.as_ref()[field::NW_SRC])
    }

    pub fn nw_dst(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.inner.as_ref()[field::NW_DST])
    }

    pub fn tp_src(&self) -> u16 {
        NetworkEndian::read_u16(&self.inner.as_ref()[field::TP_SRC])
    }

    pub fn tp_dst(&self) -> u16 {
        NetworkEndian::read_u16(&self.inner.as_ref()[field::TP_DST])
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_wildcards(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.inner.as_mut()[field::WILDCARDS], value);
    }

    pub fn set_in_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.inner.as_mut()[field::IN_PORT], value);
    }

    pub fn set_dl_src(&mut self, value: EthernetAddress) {
        self.inner.as_mut()[field::DL_SRC].copy_from_slice(value.as_bytes());
    }

    pub fn set_dl_dst(&mut self, value: EthernetAddress) {
        self.inner.as_mut()[field::DL_DST].copy_from_slice(value.as_bytes());
    }

    pub fn set_dl_vlan(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.inner.as_mut()[field::DL_VLAN], value);
    }

    pub fn set_dl_vlan_pcp(&mut self, value: u8) {
        self.inner.as_mut()[field::DL_VLAN_PCP] = value;
    }

    pub fn set_dl_type(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.inner.as_mut()[field::DL_TYPE], value);
    }

    pub fn set_nw_tos(&mut self, value: u8) {
        self.inner.as_mut()[field::NW_TOS] = value;
    }

    pub fn set_nw_proto(&mut self, value: u8) {
        self.inner.as_mut()[field::NW_PROTO] = value;
    }

    pub fn set_nw_src(&mut self, value: Ipv4Address) {
        self.inner.as_mut()[field::NW_SRC].copy_from_slice(value.as_bytes());
    }

    pub fn set_nw_dst(&mut self, value: Ipv4Address) {
        self.inner.as_mut()[field::NW_DST].copy_from_slice(value.as_bytes());
    }

    pub fn set_tp_src(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.inner.as_mut()[field::TP_SRC], value);
    }

    pub fn set_tp_dst(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.inner.as_mut()[field::TP_DST], value);
    }
}

fn nw_bits_to_mask(wildcards: u32, shift: u32) -> u32 {
    let bits = (wildcards >> shift) & 0x3f;
    if bits >= 32 {
        0
    } else {
        !0u32 << bits
    }
}

fn nw_mask_to_bits(mask: u32) -> u32 {
    // Only prefix masks are representable; anything else is widened to the
    // nearest prefix that still covers the unmasked bits.
    let mut bits = 0;
    while bits < 32 && mask & (1 << bits) == 0 {
        bits += 1;
    }
    bits
}

/// High-level form of an OF1.0 match: just the internal
/// [`Match`](../../flow/struct.Match.html), normalized per the OF1.0
/// prerequisite rules on parse.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct MatchRepr(pub Match);

impl Repr for MatchRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        let packet = Packet::new_checked(buffer)?;
        let wc = packet.wildcards() & OFPFW_ALL;
        let mut m = Match::catch_all();

        if wc & OFPFW_IN_PORT == 0 {
            m.set_in_port(packet.in_port());
        }
        if wc & OFPFW_DL_SRC == 0 {
            m.set_dl_src(packet.dl_src(), [0xff; 6]);
        }
        if wc & OFPFW_DL_DST == 0 {
            m.set_dl_dst(packet.dl_dst(), [0xff; 6]);
        }

        // VLAN id and priority fold into the single TCI field.
        let vlan_wc = wc & OFPFW_DL_VLAN != 0;
        let pcp_wc = wc & OFPFW_DL_VLAN_PCP != 0;
        if !vlan_wc && packet.dl_vlan() == OFP_VLAN_NONE {
            m.set_vlan_tci(0, !0);
        } else if !vlan_wc || !pcp_wc {
            let mut value = 0;
            let mut mask = 0;
            if !vlan_wc {
                value |= flow::VLAN_CFI | (packet.dl_vlan() & 0x0fff);
                mask |= flow::VLAN_VID_MASK;
            }
            if !pcp_wc {
                value |= u16::from(packet.dl_vlan_pcp() & 0x07) << 13;
                mask |= flow::VLAN_PCP_MASK;
            }
            m.set_vlan_tci(value, mask);
        }

        if wc & OFPFW_DL_TYPE == 0 {
            m.set_dl_type(packet.dl_type());
        }

        // The L3/L4 fields are only meaningful with the right dl_type and
        // nw_proto; an OF1.0 match carries garbage there otherwise and the
        // fields stay wildcarded (normalization, as the protocol requires).
        let dl_type = if wc & OFPFW_DL_TYPE == 0 {
            Some(packet.dl_type())
        } else {
            None
        };
        let l3 = dl_type == Some(flow::ETH_TYPE_IP) || dl_type == Some(flow::ETH_TYPE_ARP);
        if l3 {
            if wc & OFPFW_NW_PROTO == 0 {
                m.set_nw_proto(packet.nw_proto());
            }
            let src_mask = nw_bits_to_mask(wc, OFPFW_NW_SRC_SHIFT);
            if src_mask != 0 {
                m.set_nw_src(packet.nw_src(), src_mask);
            }
            let dst_mask = nw_bits_to_mask(wc, OFPFW_NW_DST_SHIFT);
            if dst_mask != 0 {
                m.set_nw_dst(packet.nw_dst(), dst_mask);
            }
        }
        if dl_type == Some(flow::ETH_TYPE_IP) {
            if wc & OFPFW_NW_TOS == 0 {
                m.set_nw_tos(packet.nw_tos());
            }
            let proto = if wc & OFPFW_NW_PROTO == 0 {
                Some(packet.nw_proto())
            } else {
                None
            };
            let l4 = proto == Some(flow::IP_PROTO_TCP)
                || proto == Some(flow::IP_PROTO_UDP)
                || proto == Some(flow::IP_PROTO_ICMP);
            if l4 {
                if wc & OFPFW_TP_SRC == 0 {
                    m.set_tp_src(packet.tp_src());
                }
                if wc & OFPFW_TP_DST == 0 {
                    m.set_tp_dst(packet.tp_dst());
                }
            }
        }
        Ok(MatchRepr(m))
    }

    fn buffer_len(&self) -> usize {
        MATCH_LEN
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < MATCH_LEN {
            return Err(Error::Exhausted);
        }
        for byte in buffer[..MATCH_LEN].iter_mut() {
            *byte = 0;
        }
        let m = &self.0;
        let flow = m.flow();
        let wc = m.wildcards();
        let mut bits = OFPFW_ALL;
        let mut packet = Packet::new(buffer);

        if wc.in_port != 0 {
            bits &= !OFPFW_IN_PORT;
            packet.set_in_port(flow.in_port);
        }
        if wc.dl_src != [0; 6] {
            bits &= !OFPFW_DL_SRC;
            packet.set_dl_src(flow.dl_src);
        }
        if wc.dl_dst != [0; 6] {
            bits &= !OFPFW_DL_DST;
            packet.set_dl_dst(flow.dl_dst);
        }

        if wc.vlan_tci != 0 {
            if flow.vlan_tci == 0 {
                // exact match on "no VLAN header"
                bits &= !OFPFW_DL_VLAN;
                packet.set_dl_vlan(OFP_VLAN_NONE);
            } else {
                if wc.vlan_tci & flow::VLAN_VID_MASK != 0 {
                    bits &= !OFPFW_DL_VLAN;
                    packet.set_dl_vlan(flow.vlan_tci & 0x0fff);
                }
                if wc.vlan_tci & flow::VLAN_PCP_MASK != 0 {
                    bits &= !OFPFW_DL_VLAN_PCP;
                    packet.set_dl_vlan_pcp((flow.vlan_tci >> 13) as u8);
                }
            }
        }

        if wc.dl_type != 0 {
            bits &= !OFPFW_DL_TYPE;
            packet.set_dl_type(flow.dl_type);
        }
        if wc.nw_proto != 0 {
            bits &= !OFPFW_NW_PROTO;
            packet.set_nw_proto(flow.nw_proto);
        }
        if wc.nw_tos != 0 {
            bits &= !OFPFW_NW_TOS;
            packet.set_nw_tos(flow.nw_tos);
        }

        let src_bits = nw_mask_to_bits(wc.nw_src);
        bits = (bits & !OFPFW_NW_SRC_MASK) | (src_bits << OFPFW_NW_SRC_SHIFT);
        packet.set_nw_src(flow.nw_src);
        let dst_bits = nw_mask_to_bits(wc.nw_dst);
        bits = (bits & !OFPFW_NW_DST_MASK) | (dst_bits << OFPFW_NW_DST_SHIFT);
        packet.set_nw_dst(flow.nw_dst);

        if wc.tp_src != 0 {
            bits &= !OFPFW_TP_SRC;
            packet.set_tp_src(flow.tp_src);
        }
        if wc.tp_dst != 0 {
            bits &= !OFPFW_TP_DST;
            packet.set_tp_dst(flow.tp_dst);
        }

        packet.set_wildcards(bits);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[cfg_attr(rustfmt, rustfmt_skip)]
    static BYTES: [u8; 40] = [
        0x00, 0x38, 0x08, 0xef, // wildcards: all but dl_type + nw_src/24
        0x00, 0x00,             // in_port (wildcarded)
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // dl_src
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // dl_dst
        0x00, 0x00,             // dl_vlan
        0x00, 0x00,             // pcp + pad
        0x08, 0x00,             // dl_type = ip
        0x00, 0x00,             // tos + proto
        0x00, 0x00,             // pad
        0x0a, 0x00, 0x00, 0x00, // nw_src = 10.0.0.0
        0x00, 0x00, 0x00, 0x00, // nw_dst
        0x00, 0x00,             // tp_src
        0x00, 0x00,             // tp_dst
    ];

    fn cidr24() -> MatchRepr {
        let mut m = Match::catch_all();
        m.set_dl_type(flow::ETH_TYPE_IP);
        m.set_nw_src(Ipv4Address::from_bytes(&[10, 0, 0, 0]), 0xffff_ff00);
        MatchRepr(m)
    }

    #[test]
    fn test_parse() {
        assert_eq!(MatchRepr::parse(&BYTES).unwrap(), cidr24());
    }

    #[test]
    fn test_emit() {
        let repr = cidr24();
        let mut bytes = [0xff; 40];
        repr.emit(&mut bytes).unwrap();
        assert_eq!(&bytes[..], &BYTES[..]);
    }

    #[test]
    fn test_l4_garbage_is_normalized_away() {
        // tp_src claimed exact but dl_type is wildcarded: the field is
        // meaningless and must come back wildcarded.
        let mut bytes = BYTES;
        let wc = (OFPFW_ALL & !OFPFW_TP_SRC) | OFPFW_DL_TYPE;
        NetworkEndian::write_u32(&mut bytes[0..4], wc);
        bytes[36] = 0x12;
        bytes[37] = 0x34;
        let parsed = MatchRepr::parse(&bytes).unwrap();
        assert_eq!(parsed.0.wildcards().tp_src, 0);
        assert_eq!(parsed.0.wildcards().dl_type, 0);
    }

    #[test]
    fn test_vlan_none_roundtrip() {
        let mut m = Match::catch_all();
        m.set_vlan_tci(0, !0);
        let repr = MatchRepr(m);
        let mut bytes = [0; 40];
        repr.emit(&mut bytes).unwrap();
        let parsed = MatchRepr::parse(&bytes).unwrap();
        assert_eq!(parsed, repr);
    }
}
