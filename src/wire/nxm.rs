//! The TLV-based wildcarded match encodings (NXM and OXM).
//!
//! Each entry is a 32-bit header followed by a value and, when the
//! has-mask bit is set, a mask of the same length:
//!
//! ```no_rust
//! 0                       16             23  24             32
//! +------------------------+-------------+----+-------------+
//! |         class          |    field    | HM |   length    |
//! +------------------------+-------------+----+-------------+
//! |                     value and/or mask                   |
//! |                      (variable size)                    |
//! +---------------------------------------------------------+
//! ```
//!
//! The Nicira match (NXM) uses classes 0x0000/0x0001; the OpenFlow 1.2
//! extensible match (OXM) adds class 0x8000 for the standard fields.
//! Decoding accepts any known class so that Nicira extension fields can
//! ride inside an OXM match; encoding picks the class preferred by the
//! requested dialect.
//!
//! Iteration stops when `match_len` is exhausted. A partial header, a zero
//! payload length, or a payload overrunning the region are length errors.
//! Unknown fields are skipped in loose mode and rejected in strict mode;
//! duplicated fields, failed prerequisites, bad masks and bad values are
//! always rejected.

use {Error, Result};
use byteorder::{ByteOrder, NetworkEndian};
use smoltcp::wire::{EthernetAddress, Ipv4Address};

use flow::{self, Match};
use wire::error_msg::{BadMatchCode, OfError};

pub const CLASS_NXM0: u16 = 0x0000;
pub const CLASS_NXM1: u16 = 0x0001;
pub const CLASS_OXM_BASIC: u16 = 0x8000;

const HEADER_LEN: usize = 4;

/// NXM class 0x0000 field numbers.
pub mod nxm0 {
    pub const IN_PORT: u8 = 0;
    pub const ETH_DST: u8 = 1;
    pub const ETH_SRC: u8 = 2;
    pub const ETH_TYPE: u8 = 3;
    pub const VLAN_TCI: u8 = 4;
    pub const IP_TOS: u8 = 5;
    pub const IP_PROTO: u8 = 6;
    pub const IP_SRC: u8 = 7;
    pub const IP_DST: u8 = 8;
    pub const TCP_SRC: u8 = 9;
    pub const TCP_DST: u8 = 10;
    pub const UDP_SRC: u8 = 11;
    pub const UDP_DST: u8 = 12;
    pub const ICMP_TYPE: u8 = 13;
    pub const ICMP_CODE: u8 = 14;
    pub const ARP_OP: u8 = 15;
    pub const ARP_SPA: u8 = 16;
    pub const ARP_TPA: u8 = 17;
}

/// NXM class 0x0001 (Nicira extension) field numbers.
pub mod nxm1 {
    pub const REG0: u8 = 0;
    pub const REG1: u8 = 1;
    pub const REG2: u8 = 2;
    pub const REG3: u8 = 3;
    pub const TUN_ID: u8 = 16;
    pub const ARP_SHA: u8 = 17;
    pub const ARP_THA: u8 = 18;
    pub const IPV6_SRC: u8 = 19;
    pub const IPV6_DST: u8 = 20;
    pub const ICMPV6_TYPE: u8 = 21;
    pub const ICMPV6_CODE: u8 = 22;
    pub const ND_TARGET: u8 = 23;
    pub const ND_SLL: u8 = 24;
    pub const ND_TLL: u8 = 25;
    pub const IP_FRAG: u8 = 26;
    pub const IPV6_LABEL: u8 = 27;
    pub const IP_ECN: u8 = 28;
    pub const IP_TTL: u8 = 29;
    pub const COOKIE: u8 = 30;
    pub const MPLS_LABEL: u8 = 33;
    pub const MPLS_TC: u8 = 34;
    pub const MPLS_BOS: u8 = 35;
}

/// OXM basic (class 0x8000) field numbers.
pub mod oxm {
    pub const IN_PORT: u8 = 0;
    pub const ETH_DST: u8 = 3;
    pub const ETH_SRC: u8 = 4;
    pub const ETH_TYPE: u8 = 5;
    pub const VLAN_VID: u8 = 6;
    pub const VLAN_PCP: u8 = 7;
    pub const IP_DSCP: u8 = 8;
    pub const IP_ECN: u8 = 9;
    pub const IP_PROTO: u8 = 10;
    pub const IPV4_SRC: u8 = 11;
    pub const IPV4_DST: u8 = 12;
    pub const TCP_SRC: u8 = 13;
    pub const TCP_DST: u8 = 14;
    pub const UDP_SRC: u8 = 15;
    pub const UDP_DST: u8 = 16;
    pub const ICMP_TYPE: u8 = 19;
    pub const ICMP_CODE: u8 = 20;
    pub const ARP_OP: u8 = 21;
    pub const ARP_SPA: u8 = 22;
    pub const ARP_TPA: u8 = 23;
    pub const ARP_SHA: u8 = 24;
    pub const ARP_THA: u8 = 25;
    pub const IPV6_SRC: u8 = 26;
    pub const IPV6_DST: u8 = 27;
    pub const IPV6_FLABEL: u8 = 28;
    pub const ICMPV6_TYPE: u8 = 29;
    pub const ICMPV6_CODE: u8 = 30;
    pub const ND_TARGET: u8 = 31;
    pub const ND_SLL: u8 = 32;
    pub const ND_TLL: u8 = 33;
}

/// The VLAN id bit OXM sets on packets that carry an 802.1Q header.
pub const OFPVID_PRESENT: u16 = 0x1000;

/// Which dialect [`emit`](fn.emit.html) should prefer for fields that
/// exist in both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Nxm,
    Oxm,
}

/// A wrapper to read and write one TLV entry.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T> {
    inner: T,
}

mod field {
    use field::*;
    pub const CLASS: Field = 0..2;
    pub const FIELD: usize = 2;
    pub const MASK: usize = 2;
    pub const LENGTH: usize = 3;
    pub const VALUE: Rest = 4..;
}

impl<T: AsRef<[u8]>> Packet<T> {
    pub fn new(buf: T) -> Self {
        Packet { inner: buf }
    }

    pub fn class(&self) -> u16 {
        NetworkEndian::read_u16(&self.inner.as_ref()[field::CLASS])
    }

    pub fn field(&self) -> u8 {
        (self.inner.as_ref()[field::FIELD] & 0xfe) >> 1
    }

    pub fn has_mask(&self) -> bool {
        self.inner.as_ref()[field::MASK] & 0x01 == 1
    }

    pub fn length(&self) -> u8 {
        self.inner.as_ref()[field::LENGTH]
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    /// The payload: the value, followed by the mask when `HM` is set.
    pub fn payload(&self) -> &'a [u8] {
        let len = self.length() as usize;
        &self.inner.as_ref()[field::VALUE][..len]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_class(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.inner.as_mut()[field::CLASS], value);
    }

    pub fn set_field(&mut self, value: u8) {
        self.inner.as_mut()[field::FIELD] =
            value << 1 | (self.inner.as_ref()[field::FIELD] & 1);
    }

    pub fn set_mask_flag(&mut self, value: bool) {
        if value {
            self.inner.as_mut()[field::MASK] |= 1;
        } else {
            self.inner.as_mut()[field::MASK] &= 0xfe;
        }
    }

    pub fn set_length(&mut self, value: u8) {
        self.inner.as_mut()[field::LENGTH] = value;
    }
}

/// Round a match length up to the 8-byte boundary the protocol pads to.
pub fn padded_len(match_len: usize) -> usize {
    (match_len + 7) / 8 * 8
}

fn bad(code: BadMatchCode) -> Error {
    Error::Of(OfError::BadMatch(code))
}

fn read_u16(buf: &[u8]) -> u16 {
    NetworkEndian::read_u16(buf)
}

fn read_u32(buf: &[u8]) -> u32 {
    NetworkEndian::read_u32(buf)
}

fn read_u64(buf: &[u8]) -> u64 {
    NetworkEndian::read_u64(buf)
}

fn read_6(buf: &[u8]) -> [u8; 6] {
    let mut bytes = [0; 6];
    bytes.copy_from_slice(&buf[..6]);
    bytes
}

fn read_16b(buf: &[u8]) -> [u8; 16] {
    let mut bytes = [0; 16];
    bytes.copy_from_slice(&buf[..16]);
    bytes
}

// Prerequisite predicates, evaluated against the partially decoded match.
// Fields must come after their prerequisites on the wire.

fn prereq_ip(m: &Match) -> bool {
    m.wildcards().dl_type == !0 && m.flow().dl_type == flow::ETH_TYPE_IP
}

fn prereq_ipv6(m: &Match) -> bool {
    m.wildcards().dl_type == !0 && m.flow().dl_type == flow::ETH_TYPE_IPV6
}

fn prereq_ip_any(m: &Match) -> bool {
    prereq_ip(m) || prereq_ipv6(m)
}

fn prereq_arp(m: &Match) -> bool {
    m.wildcards().dl_type == !0 && m.flow().dl_type == flow::ETH_TYPE_ARP
}

fn prereq_mpls(m: &Match) -> bool {
    m.wildcards().dl_type == !0
        && (m.flow().dl_type == flow::ETH_TYPE_MPLS
            || m.flow().dl_type == flow::ETH_TYPE_MPLS_MCAST)
}

fn prereq_proto(m: &Match, proto: u8) -> bool {
    m.wildcards().nw_proto == !0 && m.flow().nw_proto == proto
}

fn prereq_nd(m: &Match, icmp_type: Option<u16>) -> bool {
    // ICMPv6 type lives in tp_src.
    if !(prereq_ipv6(m) && prereq_proto(m, flow::IP_PROTO_ICMPV6)) {
        return false;
    }
    if m.wildcards().tp_src != !0 {
        return false;
    }
    match icmp_type {
        Some(t) => m.flow().tp_src == t,
        None => m.flow().tp_src == 135 || m.flow().tp_src == 136,
    }
}

struct Tlv<'a> {
    class: u16,
    field: u8,
    value: &'a [u8],
    mask: Option<&'a [u8]>,
}

impl<'a> Tlv<'a> {
    fn expect_len(&self, len: usize) -> Result<()> {
        if self.value.len() != len {
            return Err(bad(BadMatchCode::BadLen));
        }
        Ok(())
    }

    fn no_mask(&self) -> Result<()> {
        if self.mask.is_some() {
            return Err(bad(BadMatchCode::BadMask));
        }
        Ok(())
    }

    fn mask_u16(&self) -> u16 {
        self.mask.map_or(!0, read_u16)
    }

    fn mask_u32(&self) -> u32 {
        self.mask.map_or(!0, read_u32)
    }

    fn mask_u64(&self) -> u64 {
        self.mask.map_or(!0, read_u64)
    }

    fn mask_6(&self) -> [u8; 6] {
        self.mask.map_or([0xff; 6], read_6)
    }

    fn mask_16b(&self) -> [u8; 16] {
        self.mask.map_or([0xff; 16], read_16b)
    }
}

fn apply(tlv: &Tlv, m: &mut Match) -> Result<bool> {
    match (tlv.class, tlv.field) {
        (CLASS_NXM0, nxm0::IN_PORT) => {
            tlv.expect_len(2)?;
            tlv.no_mask()?;
            m.set_in_port(read_u16(tlv.value));
        }
        // OXM carries the port in 32 bits; only the 16-bit range is
        // meaningful to this switch.
        (CLASS_OXM_BASIC, oxm::IN_PORT) => {
            tlv.expect_len(4)?;
            tlv.no_mask()?;
            let port = read_u32(tlv.value);
            if port > 0xffff {
                return Err(bad(BadMatchCode::BadValue));
            }
            m.set_in_port(port as u16);
        }
        (CLASS_NXM0, nxm0::ETH_DST) | (CLASS_OXM_BASIC, oxm::ETH_DST) => {
            tlv.expect_len(6)?;
            m.set_dl_dst(EthernetAddress::from_bytes(&tlv.value[..6]), tlv.mask_6());
        }
        (CLASS_NXM0, nxm0::ETH_SRC) | (CLASS_OXM_BASIC, oxm::ETH_SRC) => {
            tlv.expect_len(6)?;
            m.set_dl_src(EthernetAddress::from_bytes(&tlv.value[..6]), tlv.mask_6());
        }
        (CLASS_NXM0, nxm0::ETH_TYPE) | (CLASS_OXM_BASIC, oxm::ETH_TYPE) => {
            tlv.expect_len(2)?;
            tlv.no_mask()?;
            m.set_dl_type(read_u16(tlv.value));
        }
        (CLASS_NXM0, nxm0::VLAN_TCI) => {
            tlv.expect_len(2)?;
            m.set_vlan_tci(read_u16(tlv.value), tlv.mask_u16());
        }
        (CLASS_OXM_BASIC, oxm::VLAN_VID) => {
            tlv.expect_len(2)?;
            let value = read_u16(tlv.value);
            let mask = tlv.mask_u16();
            if value & !(OFPVID_PRESENT | 0x0fff) != 0 {
                return Err(bad(BadMatchCode::BadValue));
            }
            if tlv.mask.is_none() && value == 0 {
                // Exact OFPVID_NONE: no 802.1Q header at all, which pins
                // the whole TCI.
                m.set_vlan_tci(0, !0);
            } else {
                // OFPVID_PRESENT is the same bit as the internal CFI.
                let old = m.wildcards().vlan_tci & flow::VLAN_PCP_MASK;
                let old_value = m.flow().vlan_tci & flow::VLAN_PCP_MASK;
                m.set_vlan_tci(
                    old_value | (value & flow::VLAN_VID_MASK),
                    old | (mask & flow::VLAN_VID_MASK),
                );
            }
        }
        (CLASS_OXM_BASIC, oxm::VLAN_PCP) => {
            tlv.expect_len(1)?;
            tlv.no_mask()?;
            if m.wildcards().vlan_tci & flow::VLAN_CFI == 0
                || m.flow().vlan_tci & flow::VLAN_CFI == 0
            {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            if tlv.value[0] > 7 {
                return Err(bad(BadMatchCode::BadValue));
            }
            let old_mask = m.wildcards().vlan_tci;
            let old_value = m.flow().vlan_tci;
            m.set_vlan_tci(
                old_value | (u16::from(tlv.value[0]) << 13),
                old_mask | flow::VLAN_PCP_MASK,
            );
        }
        (CLASS_NXM0, nxm0::IP_TOS) => {
            tlv.expect_len(1)?;
            tlv.no_mask()?;
            if !prereq_ip_any(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            if tlv.value[0] & 0x03 != 0 {
                return Err(bad(BadMatchCode::BadValue));
            }
            m.set_nw_tos(tlv.value[0]);
        }
        (CLASS_OXM_BASIC, oxm::IP_DSCP) => {
            tlv.expect_len(1)?;
            tlv.no_mask()?;
            if !prereq_ip_any(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            if tlv.value[0] > 0x3f {
                return Err(bad(BadMatchCode::BadValue));
            }
            m.set_nw_tos(tlv.value[0] << 2);
        }
        (CLASS_NXM1, nxm1::IP_ECN) | (CLASS_OXM_BASIC, oxm::IP_ECN) => {
            tlv.expect_len(1)?;
            tlv.no_mask()?;
            if !prereq_ip_any(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            if tlv.value[0] > 3 {
                return Err(bad(BadMatchCode::BadValue));
            }
            m.set_nw_ecn(tlv.value[0]);
        }
        (CLASS_NXM1, nxm1::IP_TTL) => {
            tlv.expect_len(1)?;
            tlv.no_mask()?;
            if !prereq_ip_any(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_nw_ttl(tlv.value[0]);
        }
        (CLASS_NXM0, nxm0::IP_PROTO) | (CLASS_OXM_BASIC, oxm::IP_PROTO) => {
            tlv.expect_len(1)?;
            tlv.no_mask()?;
            if !prereq_ip_any(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_nw_proto(tlv.value[0]);
        }
        (CLASS_NXM0, nxm0::IP_SRC) | (CLASS_OXM_BASIC, oxm::IPV4_SRC) => {
            tlv.expect_len(4)?;
            if !prereq_ip(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_nw_src(Ipv4Address::from_bytes(&tlv.value[..4]), tlv.mask_u32());
        }
        (CLASS_NXM0, nxm0::IP_DST) | (CLASS_OXM_BASIC, oxm::IPV4_DST) => {
            tlv.expect_len(4)?;
            if !prereq_ip(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_nw_dst(Ipv4Address::from_bytes(&tlv.value[..4]), tlv.mask_u32());
        }
        (CLASS_NXM0, nxm0::TCP_SRC) | (CLASS_OXM_BASIC, oxm::TCP_SRC) => {
            tlv.expect_len(2)?;
            tlv.no_mask()?;
            if !(prereq_ip_any(m) && prereq_proto(m, flow::IP_PROTO_TCP)) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_tp_src(read_u16(tlv.value));
        }
        (CLASS_NXM0, nxm0::TCP_DST) | (CLASS_OXM_BASIC, oxm::TCP_DST) => {
            tlv.expect_len(2)?;
            tlv.no_mask()?;
            if !(prereq_ip_any(m) && prereq_proto(m, flow::IP_PROTO_TCP)) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_tp_dst(read_u16(tlv.value));
        }
        (CLASS_NXM0, nxm0::UDP_SRC) | (CLASS_OXM_BASIC, oxm::UDP_SRC) => {
            tlv.expect_len(2)?;
            tlv.no_mask()?;
            if !(prereq_ip_any(m) && prereq_proto(m, flow::IP_PROTO_UDP)) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_tp_src(read_u16(tlv.value));
        }
        (CLASS_NXM0, nxm0::UDP_DST) | (CLASS_OXM_BASIC, oxm::UDP_DST) => {
            tlv.expect_len(2)?;
            tlv.no_mask()?;
            if !(prereq_ip_any(m) && prereq_proto(m, flow::IP_PROTO_UDP)) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_tp_dst(read_u16(tlv.value));
        }
        (CLASS_NXM0, nxm0::ICMP_TYPE) | (CLASS_OXM_BASIC, oxm::ICMP_TYPE) => {
            tlv.expect_len(1)?;
            tlv.no_mask()?;
            if !(prereq_ip(m) && prereq_proto(m, flow::IP_PROTO_ICMP)) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_tp_src(u16::from(tlv.value[0]));
        }
        (CLASS_NXM0, nxm0::ICMP_CODE) | (CLASS_OXM_BASIC, oxm::ICMP_CODE) => {
            tlv.expect_len(1)?;
            tlv.no_mask()?;
            if !(prereq_ip(m) && prereq_proto(m, flow::IP_PROTO_ICMP)) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_tp_dst(u16::from(tlv.value[0]));
        }
        (CLASS_NXM1, nxm1::ICMPV6_TYPE) | (CLASS_OXM_BASIC, oxm::ICMPV6_TYPE) => {
            tlv.expect_len(1)?;
            tlv.no_mask()?;
            if !(prereq_ipv6(m) && prereq_proto(m, flow::IP_PROTO_ICMPV6)) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_tp_src(u16::from(tlv.value[0]));
        }
        (CLASS_NXM1, nxm1::ICMPV6_CODE) | (CLASS_OXM_BASIC, oxm::ICMPV6_CODE) => {
            tlv.expect_len(1)?;
            tlv.no_mask()?;
            if !(prereq_ipv6(m) && prereq_proto(m, flow::IP_PROTO_ICMPV6)) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_tp_dst(u16::from(tlv.value[0]));
        }
        (CLASS_NXM0, nxm0::ARP_OP) | (CLASS_OXM_BASIC, oxm::ARP_OP) => {
            tlv.expect_len(2)?;
            tlv.no_mask()?;
            if !prereq_arp(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            let op = read_u16(tlv.value);
            if op > 0xff {
                return Err(bad(BadMatchCode::BadValue));
            }
            m.set_nw_proto(op as u8);
        }
        (CLASS_NXM0, nxm0::ARP_SPA) | (CLASS_OXM_BASIC, oxm::ARP_SPA) => {
            tlv.expect_len(4)?;
            if !prereq_arp(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_nw_src(Ipv4Address::from_bytes(&tlv.value[..4]), tlv.mask_u32());
        }
        (CLASS_NXM0, nxm0::ARP_TPA) | (CLASS_OXM_BASIC, oxm::ARP_TPA) => {
            tlv.expect_len(4)?;
            if !prereq_arp(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_nw_dst(Ipv4Address::from_bytes(&tlv.value[..4]), tlv.mask_u32());
        }
        (CLASS_NXM1, nxm1::ARP_SHA) | (CLASS_OXM_BASIC, oxm::ARP_SHA) => {
            tlv.expect_len(6)?;
            tlv.no_mask()?;
            if !prereq_arp(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_arp_sha(EthernetAddress::from_bytes(&tlv.value[..6]));
        }
        (CLASS_NXM1, nxm1::ARP_THA) | (CLASS_OXM_BASIC, oxm::ARP_THA) => {
            tlv.expect_len(6)?;
            tlv.no_mask()?;
            if !prereq_arp(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_arp_tha(EthernetAddress::from_bytes(&tlv.value[..6]));
        }
        (CLASS_NXM1, nxm1::IPV6_SRC) | (CLASS_OXM_BASIC, oxm::IPV6_SRC) => {
            tlv.expect_len(16)?;
            if !prereq_ipv6(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_ipv6_src(read_16b(tlv.value), tlv.mask_16b());
        }
        (CLASS_NXM1, nxm1::IPV6_DST) | (CLASS_OXM_BASIC, oxm::IPV6_DST) => {
            tlv.expect_len(16)?;
            if !prereq_ipv6(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_ipv6_dst(read_16b(tlv.value), tlv.mask_16b());
        }
        (CLASS_NXM1, nxm1::IPV6_LABEL) | (CLASS_OXM_BASIC, oxm::IPV6_FLABEL) => {
            tlv.expect_len(4)?;
            tlv.no_mask()?;
            if !prereq_ipv6(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            let label = read_u32(tlv.value);
            if label > 0x000f_ffff {
                return Err(bad(BadMatchCode::BadValue));
            }
            m.set_ipv6_label(label);
        }
        (CLASS_NXM1, nxm1::ND_TARGET) | (CLASS_OXM_BASIC, oxm::ND_TARGET) => {
            tlv.expect_len(16)?;
            tlv.no_mask()?;
            if !prereq_nd(m, None) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_nd_target(read_16b(tlv.value));
        }
        // The ND link-layer addresses share storage with the ARP hardware
        // addresses; the prerequisites keep the two uses apart.
        (CLASS_NXM1, nxm1::ND_SLL) | (CLASS_OXM_BASIC, oxm::ND_SLL) => {
            tlv.expect_len(6)?;
            tlv.no_mask()?;
            if !prereq_nd(m, Some(135)) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_arp_sha(EthernetAddress::from_bytes(&tlv.value[..6]));
        }
        (CLASS_NXM1, nxm1::ND_TLL) | (CLASS_OXM_BASIC, oxm::ND_TLL) => {
            tlv.expect_len(6)?;
            tlv.no_mask()?;
            if !prereq_nd(m, Some(136)) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            m.set_arp_tha(EthernetAddress::from_bytes(&tlv.value[..6]));
        }
        (CLASS_NXM1, nxm1::IP_FRAG) => {
            tlv.expect_len(1)?;
            if !prereq_ip_any(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            // only the two fragment bits exist, so "no mask" means both
            let mask = tlv.mask.map_or(flow::FRAG_MASK, |mask| mask[0]);
            if mask & !flow::FRAG_MASK != 0 || tlv.value[0] & !flow::FRAG_MASK != 0 {
                return Err(bad(BadMatchCode::BadValue));
            }
            m.set_nw_frag(tlv.value[0], mask);
        }
        (CLASS_NXM1, nxm1::REG0) => {
            tlv.expect_len(4)?;
            m.set_reg(0, read_u32(tlv.value), tlv.mask_u32());
        }
        (CLASS_NXM1, nxm1::REG1) => {
            tlv.expect_len(4)?;
            m.set_reg(1, read_u32(tlv.value), tlv.mask_u32());
        }
        (CLASS_NXM1, nxm1::REG2) => {
            tlv.expect_len(4)?;
            m.set_reg(2, read_u32(tlv.value), tlv.mask_u32());
        }
        (CLASS_NXM1, nxm1::REG3) => {
            tlv.expect_len(4)?;
            m.set_reg(3, read_u32(tlv.value), tlv.mask_u32());
        }
        (CLASS_NXM1, nxm1::TUN_ID) => {
            tlv.expect_len(8)?;
            m.set_tun_id(read_u64(tlv.value), tlv.mask_u64());
        }
        (CLASS_NXM1, nxm1::COOKIE) => {
            tlv.expect_len(8)?;
            m.set_cookie(read_u64(tlv.value), tlv.mask_u64());
        }
        (CLASS_NXM1, nxm1::MPLS_LABEL) => {
            tlv.expect_len(4)?;
            tlv.no_mask()?;
            if !prereq_mpls(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            let label = read_u32(tlv.value);
            if label > 0x000f_ffff {
                return Err(bad(BadMatchCode::BadValue));
            }
            m.set_mpls_label(label);
        }
        (CLASS_NXM1, nxm1::MPLS_TC) => {
            tlv.expect_len(1)?;
            tlv.no_mask()?;
            if !prereq_mpls(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            if tlv.value[0] > 7 {
                return Err(bad(BadMatchCode::BadValue));
            }
            m.set_mpls_tc(tlv.value[0]);
        }
        (CLASS_NXM1, nxm1::MPLS_BOS) => {
            tlv.expect_len(1)?;
            tlv.no_mask()?;
            if !prereq_mpls(m) {
                return Err(bad(BadMatchCode::BadPrereq));
            }
            if tlv.value[0] > 1 {
                return Err(bad(BadMatchCode::BadValue));
            }
            m.set_mpls_bos(tlv.value[0]);
        }
        _ => return Ok(false),
    }
    Ok(true)
}

/// Decode a TLV match region of exactly `match_len` bytes.
///
/// In strict mode an unknown field is an error; in loose mode it is
/// skipped. Padding that follows the region is not this function's
/// business.
pub fn parse(buffer: &[u8], match_len: usize, strict: bool) -> Result<Match> {
    use std::collections::HashSet;

    if buffer.len() < match_len {
        return Err(bad(BadMatchCode::BadLen));
    }
    let mut m = Match::catch_all();
    let mut seen: HashSet<(u16, u8)> = HashSet::new();
    let mut offset = 0;
    while offset < match_len {
        if match_len - offset < HEADER_LEN {
            return Err(bad(BadMatchCode::BadLen));
        }
        let packet = Packet::new(&buffer[offset..]);
        let payload_len = packet.length() as usize;
        if payload_len == 0 || offset + HEADER_LEN + payload_len > match_len {
            return Err(bad(BadMatchCode::BadLen));
        }
        let class = packet.class();
        let fld = packet.field();
        let payload = &buffer[offset + HEADER_LEN..offset + HEADER_LEN + payload_len];
        let (value, mask) = if packet.has_mask() {
            if payload_len % 2 != 0 {
                return Err(bad(BadMatchCode::BadLen));
            }
            let half = payload_len / 2;
            (&payload[..half], Some(&payload[half..]))
        } else {
            (payload, None)
        };
        let tlv = Tlv {
            class,
            field: fld,
            value,
            mask,
        };
        if !seen.insert((class, fld)) {
            return Err(bad(BadMatchCode::DupField));
        }
        let known = apply(&tlv, &mut m)?;
        if !known && strict {
            return Err(bad(BadMatchCode::BadField));
        }
        offset += HEADER_LEN + payload_len;
    }
    Ok(m)
}

fn push_tlv(out: &mut Vec<u8>, class: u16, fld: u8, value: &[u8], mask: Option<&[u8]>) {
    let payload_len = value.len() + mask.map_or(0, <[u8]>::len);
    let mut header = [0; HEADER_LEN];
    {
        let mut packet = Packet::new(&mut header[..]);
        packet.set_class(class);
        packet.set_field(fld);
        packet.set_mask_flag(mask.is_some());
        packet.set_length(payload_len as u8);
    }
    out.extend_from_slice(&header);
    out.extend_from_slice(value);
    if let Some(mask) = mask {
        out.extend_from_slice(mask);
    }
}

fn push_u16(out: &mut Vec<u8>, class: u16, fld: u8, value: u16, mask: Option<u16>) {
    let mut v = [0; 2];
    NetworkEndian::write_u16(&mut v, value);
    match mask {
        Some(mask) => {
            let mut mk = [0; 2];
            NetworkEndian::write_u16(&mut mk, mask);
            push_tlv(out, class, fld, &v, Some(&mk));
        }
        None => push_tlv(out, class, fld, &v, None),
    }
}

fn push_u32(out: &mut Vec<u8>, class: u16, fld: u8, value: u32, mask: Option<u32>) {
    let mut v = [0; 4];
    NetworkEndian::write_u32(&mut v, value);
    match mask {
        Some(mask) => {
            let mut mk = [0; 4];
            NetworkEndian::write_u32(&mut mk, mask);
            push_tlv(out, class, fld, &v, Some(&mk));
        }
        None => push_tlv(out, class, fld, &v, None),
    }
}

fn push_u64(out: &mut Vec<u8>, class: u16, fld: u8, value: u64, mask: Option<u64>) {
    let mut v = [0; 8];
    NetworkEndian::write_u64(&mut v, value);
    match mask {
        Some(mask) => {
            let mut mk = [0; 8];
            NetworkEndian::write_u64(&mut mk, mask);
            push_tlv(out, class, fld, &v, Some(&mk));
        }
        None => push_tlv(out, class, fld, &v, None),
    }
}

/// Encode a match as a TLV region (unpadded; the caller appends the
/// zero padding its message format requires).
pub fn emit(m: &Match, dialect: Dialect) -> Vec<u8> {
    let flow = m.flow();
    let wc = m.wildcards();
    let oxm_pref = dialect == Dialect::Oxm;
    let mut out = Vec::new();

    if wc.in_port != 0 {
        if oxm_pref {
            push_u32(&mut out, CLASS_OXM_BASIC, oxm::IN_PORT, u32::from(flow.in_port), None);
        } else {
            push_u16(&mut out, CLASS_NXM0, nxm0::IN_PORT, flow.in_port, None);
        }
    }
    if wc.dl_dst != [0; 6] {
        let (class, fld) = if oxm_pref {
            (CLASS_OXM_BASIC, oxm::ETH_DST)
        } else {
            (CLASS_NXM0, nxm0::ETH_DST)
        };
        let mask = if wc.dl_dst == [0xff; 6] { None } else { Some(&wc.dl_dst[..]) };
        push_tlv(&mut out, class, fld, flow.dl_dst.as_bytes(), mask);
    }
    if wc.dl_src != [0; 6] {
        let (class, fld) = if oxm_pref {
            (CLASS_OXM_BASIC, oxm::ETH_SRC)
        } else {
            (CLASS_NXM0, nxm0::ETH_SRC)
        };
        let mask = if wc.dl_src == [0xff; 6] { None } else { Some(&wc.dl_src[..]) };
        push_tlv(&mut out, class, fld, flow.dl_src.as_bytes(), mask);
    }
    if wc.dl_type != 0 {
        let (class, fld) = if oxm_pref {
            (CLASS_OXM_BASIC, oxm::ETH_TYPE)
        } else {
            (CLASS_NXM0, nxm0::ETH_TYPE)
        };
        push_u16(&mut out, class, fld, flow.dl_type, None);
    }
    if wc.vlan_tci != 0 {
        if oxm_pref {
            let vid_mask = wc.vlan_tci & flow::VLAN_VID_MASK;
            if vid_mask != 0 {
                let value = flow.vlan_tci & flow::VLAN_VID_MASK;
                let mask = if vid_mask == flow::VLAN_VID_MASK { None } else { Some(vid_mask) };
                push_u16(&mut out, CLASS_OXM_BASIC, oxm::VLAN_VID, value, mask);
            }
            if wc.vlan_tci & flow::VLAN_PCP_MASK != 0 && flow.vlan_tci & flow::VLAN_CFI != 0 {
                push_tlv(
                    &mut out,
                    CLASS_OXM_BASIC,
                    oxm::VLAN_PCP,
                    &[(flow.vlan_tci >> 13) as u8],
                    None,
                );
            }
        } else {
            let mask = if wc.vlan_tci == !0 { None } else { Some(wc.vlan_tci) };
            push_u16(&mut out, CLASS_NXM0, nxm0::VLAN_TCI, flow.vlan_tci, mask);
        }
    }
    let is_ip = wc.dl_type != 0 && flow.dl_type == flow::ETH_TYPE_IP;
    let is_ipv6 = wc.dl_type != 0 && flow.dl_type == flow::ETH_TYPE_IPV6;
    let is_arp = wc.dl_type != 0 && flow.dl_type == flow::ETH_TYPE_ARP;
    let is_mpls = wc.dl_type != 0
        && (flow.dl_type == flow::ETH_TYPE_MPLS || flow.dl_type == flow::ETH_TYPE_MPLS_MCAST);

    if (is_ip || is_ipv6) && wc.nw_tos != 0 {
        if oxm_pref {
            push_tlv(&mut out, CLASS_OXM_BASIC, oxm::IP_DSCP, &[flow.nw_tos >> 2], None);
        } else {
            push_tlv(&mut out, CLASS_NXM0, nxm0::IP_TOS, &[flow.nw_tos], None);
        }
    }
    if (is_ip || is_ipv6) && wc.nw_ecn != 0 {
        let (class, fld) = if oxm_pref {
            (CLASS_OXM_BASIC, oxm::IP_ECN)
        } else {
            (CLASS_NXM1, nxm1::IP_ECN)
        };
        push_tlv(&mut out, class, fld, &[flow.nw_ecn], None);
    }
    if (is_ip || is_ipv6) && wc.nw_ttl != 0 {
        push_tlv(&mut out, CLASS_NXM1, nxm1::IP_TTL, &[flow.nw_ttl], None);
    }
    if (is_ip || is_ipv6) && wc.nw_proto != 0 {
        let (class, fld) = if oxm_pref {
            (CLASS_OXM_BASIC, oxm::IP_PROTO)
        } else {
            (CLASS_NXM0, nxm0::IP_PROTO)
        };
        push_tlv(&mut out, class, fld, &[flow.nw_proto], None);
    }
    if (is_ip || is_ipv6) && wc.nw_frag != 0 {
        let mask = if wc.nw_frag == flow::FRAG_MASK { None } else { Some(&[wc.nw_frag][..]) };
        push_tlv(&mut out, CLASS_NXM1, nxm1::IP_FRAG, &[flow.nw_frag], mask);
    }
    if is_ip {
        if wc.nw_src != 0 {
            let (class, fld) = if oxm_pref {
                (CLASS_OXM_BASIC, oxm::IPV4_SRC)
            } else {
                (CLASS_NXM0, nxm0::IP_SRC)
            };
            let mask = if wc.nw_src == !0 { None } else { Some(wc.nw_src) };
            push_u32(&mut out, class, fld, ipv4_bits(&flow.nw_src), mask);
        }
        if wc.nw_dst != 0 {
            let (class, fld) = if oxm_pref {
                (CLASS_OXM_BASIC, oxm::IPV4_DST)
            } else {
                (CLASS_NXM0, nxm0::IP_DST)
            };
            let mask = if wc.nw_dst == !0 { None } else { Some(wc.nw_dst) };
            push_u32(&mut out, class, fld, ipv4_bits(&flow.nw_dst), mask);
        }
    }
    if is_ipv6 {
        if wc.ipv6_src != [0; 16] {
            let (class, fld) = if oxm_pref {
                (CLASS_OXM_BASIC, oxm::IPV6_SRC)
            } else {
                (CLASS_NXM1, nxm1::IPV6_SRC)
            };
            let mask = if wc.ipv6_src == [0xff; 16] { None } else { Some(&wc.ipv6_src[..]) };
            push_tlv(&mut out, class, fld, &flow.ipv6_src, mask);
        }
        if wc.ipv6_dst != [0; 16] {
            let (class, fld) = if oxm_pref {
                (CLASS_OXM_BASIC, oxm::IPV6_DST)
            } else {
                (CLASS_NXM1, nxm1::IPV6_DST)
            };
            let mask = if wc.ipv6_dst == [0xff; 16] { None } else { Some(&wc.ipv6_dst[..]) };
            push_tlv(&mut out, class, fld, &flow.ipv6_dst, mask);
        }
        if wc.ipv6_label != 0 {
            let (class, fld) = if oxm_pref {
                (CLASS_OXM_BASIC, oxm::IPV6_FLABEL)
            } else {
                (CLASS_NXM1, nxm1::IPV6_LABEL)
            };
            push_u32(&mut out, class, fld, flow.ipv6_label, None);
        }
    }
    let proto_known = wc.nw_proto != 0;
    if (is_ip || is_ipv6) && proto_known {
        match flow.nw_proto {
            flow::IP_PROTO_TCP => {
                if wc.tp_src != 0 {
                    let (class, fld) = if oxm_pref {
                        (CLASS_OXM_BASIC, oxm::TCP_SRC)
                    } else {
                        (CLASS_NXM0, nxm0::TCP_SRC)
                    };
                    push_u16(&mut out, class, fld, flow.tp_src, None);
                }
                if wc.tp_dst != 0 {
                    let (class, fld) = if oxm_pref {
                        (CLASS_OXM_BASIC, oxm::TCP_DST)
                    } else {
                        (CLASS_NXM0, nxm0::TCP_DST)
                    };
                    push_u16(&mut out, class, fld, flow.tp_dst, None);
                }
            }
            flow::IP_PROTO_UDP => {
                if wc.tp_src != 0 {
                    let (class, fld) = if oxm_pref {
                        (CLASS_OXM_BASIC, oxm::UDP_SRC)
                    } else {
                        (CLASS_NXM0, nxm0::UDP_SRC)
                    };
                    push_u16(&mut out, class, fld, flow.tp_src, None);
                }
                if wc.tp_dst != 0 {
                    let (class, fld) = if oxm_pref {
                        (CLASS_OXM_BASIC, oxm::UDP_DST)
                    } else {
                        (CLASS_NXM0, nxm0::UDP_DST)
                    };
                    push_u16(&mut out, class, fld, flow.tp_dst, None);
                }
            }
            flow::IP_PROTO_ICMP if is_ip => {
                if wc.tp_src != 0 {
                    let (class, fld) = if oxm_pref {
                        (CLASS_OXM_BASIC, oxm::ICMP_TYPE)
                    } else {
                        (CLASS_NXM0, nxm0::ICMP_TYPE)
                    };
                    push_tlv(&mut out, class, fld, &[flow.tp_src as u8], None);
                }
                if wc.tp_dst != 0 {
                    let (class, fld) = if oxm_pref {
                        (CLASS_OXM_BASIC, oxm::ICMP_CODE)
                    } else {
                        (CLASS_NXM0, nxm0::ICMP_CODE)
                    };
                    push_tlv(&mut out, class, fld, &[flow.tp_dst as u8], None);
                }
            }
            flow::IP_PROTO_ICMPV6 if is_ipv6 => {
                if wc.tp_src != 0 {
                    let (class, fld) = if oxm_pref {
                        (CLASS_OXM_BASIC, oxm::ICMPV6_TYPE)
                    } else {
                        (CLASS_NXM1, nxm1::ICMPV6_TYPE)
                    };
                    push_tlv(&mut out, class, fld, &[flow.tp_src as u8], None);
                }
                if wc.tp_dst != 0 {
                    let (class, fld) = if oxm_pref {
                        (CLASS_OXM_BASIC, oxm::ICMPV6_CODE)
                    } else {
                        (CLASS_NXM1, nxm1::ICMPV6_CODE)
                    };
                    push_tlv(&mut out, class, fld, &[flow.tp_dst as u8], None);
                }
                if wc.nd_target != [0; 16] {
                    let (class, fld) = if oxm_pref {
                        (CLASS_OXM_BASIC, oxm::ND_TARGET)
                    } else {
                        (CLASS_NXM1, nxm1::ND_TARGET)
                    };
                    push_tlv(&mut out, class, fld, &flow.nd_target, None);
                }
                if wc.arp_sha != [0; 6] && flow.tp_src == 135 && wc.tp_src != 0 {
                    let (class, fld) = if oxm_pref {
                        (CLASS_OXM_BASIC, oxm::ND_SLL)
                    } else {
                        (CLASS_NXM1, nxm1::ND_SLL)
                    };
                    push_tlv(&mut out, class, fld, flow.arp_sha.as_bytes(), None);
                }
                if wc.arp_tha != [0; 6] && flow.tp_src == 136 && wc.tp_src != 0 {
                    let (class, fld) = if oxm_pref {
                        (CLASS_OXM_BASIC, oxm::ND_TLL)
                    } else {
                        (CLASS_NXM1, nxm1::ND_TLL)
                    };
                    push_tlv(&mut out, class, fld, flow.arp_tha.as_bytes(), None);
                }
            }
            _ => {}
        }
    }
    if is_arp {
        if wc.nw_proto != 0 {
            let (class, fld) = if oxm_pref {
                (CLASS_OXM_BASIC, oxm::ARP_OP)
            } else {
                (CLASS_NXM0, nxm0::ARP_OP)
            };
            push_u16(&mut out, class, fld, u16::from(flow.nw_proto), None);
        }
        if wc.nw_src != 0 {
            let (class, fld) = if oxm_pref {
                (CLASS_OXM_BASIC, oxm::ARP_SPA)
            } else {
                (CLASS_NXM0, nxm0::ARP_SPA)
            };
            let mask = if wc.nw_src == !0 { None } else { Some(wc.nw_src) };
            push_u32(&mut out, class, fld, ipv4_bits(&flow.nw_src), mask);
        }
        if wc.nw_dst != 0 {
            let (class, fld) = if oxm_pref {
                (CLASS_OXM_BASIC, oxm::ARP_TPA)
            } else {
                (CLASS_NXM0, nxm0::ARP_TPA)
            };
            let mask = if wc.nw_dst == !0 { None } else { Some(wc.nw_dst) };
            push_u32(&mut out, class, fld, ipv4_bits(&flow.nw_dst), mask);
        }
        if wc.arp_sha != [0; 6] {
            let (class, fld) = if oxm_pref {
                (CLASS_OXM_BASIC, oxm::ARP_SHA)
            } else {
                (CLASS_NXM1, nxm1::ARP_SHA)
            };
            push_tlv(&mut out, class, fld, flow.arp_sha.as_bytes(), None);
        }
        if wc.arp_tha != [0; 6] {
            let (class, fld) = if oxm_pref {
                (CLASS_OXM_BASIC, oxm::ARP_THA)
            } else {
                (CLASS_NXM1, nxm1::ARP_THA)
            };
            push_tlv(&mut out, class, fld, flow.arp_tha.as_bytes(), None);
        }
    }
    if is_mpls {
        if wc.mpls_label != 0 {
            push_u32(&mut out, CLASS_NXM1, nxm1::MPLS_LABEL, flow.mpls_label, None);
        }
        if wc.mpls_tc != 0 {
            push_tlv(&mut out, CLASS_NXM1, nxm1::MPLS_TC, &[flow.mpls_tc], None);
        }
        if wc.mpls_bos != 0 {
            push_tlv(&mut out, CLASS_NXM1, nxm1::MPLS_BOS, &[flow.mpls_bos], None);
        }
    }
    for i in 0..flow::NUM_REGS {
        if wc.regs[i] != 0 {
            let mask = if wc.regs[i] == !0 { None } else { Some(wc.regs[i]) };
            push_u32(&mut out, CLASS_NXM1, nxm1::REG0 + i as u8, flow.regs[i], mask);
        }
    }
    if wc.tun_id != 0 {
        let mask = if wc.tun_id == !0 { None } else { Some(wc.tun_id) };
        push_u64(&mut out, CLASS_NXM1, nxm1::TUN_ID, flow.tun_id, mask);
    }
    if wc.cookie != 0 {
        let mask = if wc.cookie == !0 { None } else { Some(wc.cookie) };
        push_u64(&mut out, CLASS_NXM1, nxm1::COOKIE, flow.cookie, mask);
    }
    out
}

fn ipv4_bits(addr: &Ipv4Address) -> u32 {
    let b = addr.as_bytes();
    (u32::from(b[0]) << 24) | (u32::from(b[1]) << 16) | (u32::from(b[2]) << 8) | u32::from(b[3])
}

#[cfg(test)]
mod test {
    use super::*;

    #[cfg_attr(rustfmt, rustfmt_skip)]
    static BYTES: [u8; 18] = [
        // eth_type = ip
        0x00, 0x00, 3 << 1, 0x02,
        0x08, 0x00,
        // ip_src = 10.0.0.0/24 (masked)
        0x00, 0x00, (7 << 1) | 1, 0x08,
        0x0a, 0x00, 0x00, 0x00,
        0xff, 0xff, 0xff, 0x00,
    ];

    fn sample_match() -> Match {
        let mut m = Match::catch_all();
        m.set_dl_type(flow::ETH_TYPE_IP);
        m.set_nw_src(Ipv4Address::from_bytes(&[10, 0, 0, 0]), 0xffff_ff00);
        m
    }

    #[test]
    fn test_parse_masked() {
        let parsed = parse(&BYTES, BYTES.len(), true).unwrap();
        assert_eq!(parsed, sample_match());
    }

    #[test]
    fn test_roundtrip_nxm() {
        let m = sample_match();
        let bytes = emit(&m, Dialect::Nxm);
        let parsed = parse(&bytes, bytes.len(), true).unwrap();
        assert_eq!(parsed, m);
    }

    #[test]
    fn test_roundtrip_oxm() {
        let mut m = sample_match();
        m.set_nw_proto(flow::IP_PROTO_TCP);
        m.set_tp_dst(80);
        let bytes = emit(&m, Dialect::Oxm);
        let parsed = parse(&bytes, bytes.len(), true).unwrap();
        assert_eq!(parsed, m);
    }

    #[test]
    fn test_prereq_enforced() {
        // ip_src without a preceding eth_type
        #[cfg_attr(rustfmt, rustfmt_skip)]
        let bytes = [
            0x00, 0x00, 7 << 1, 0x04,
            0x0a, 0x00, 0x00, 0x01,
        ];
        assert_eq!(
            parse(&bytes, bytes.len(), true).unwrap_err(),
            Error::Of(OfError::BadMatch(BadMatchCode::BadPrereq))
        );
    }

    #[test]
    fn test_empty_match_is_catch_all() {
        assert_eq!(parse(&[], 0, true).unwrap(), Match::catch_all());
    }

    #[test]
    fn test_zero_length_rejected() {
        let bytes = [0x00, 0x00, 0x00, 0x00];
        assert_eq!(
            parse(&bytes, bytes.len(), true).unwrap_err(),
            Error::Of(OfError::BadMatch(BadMatchCode::BadLen))
        );
    }

    #[test]
    fn test_partial_header_rejected() {
        #[cfg_attr(rustfmt, rustfmt_skip)]
        let bytes = [
            0x00, 0x00, 3 << 1, 0x02,
            0x08, 0x00,
            0x00, 0x00, // half a header
        ];
        assert_eq!(
            parse(&bytes, bytes.len(), true).unwrap_err(),
            Error::Of(OfError::BadMatch(BadMatchCode::BadLen))
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        #[cfg_attr(rustfmt, rustfmt_skip)]
        let bytes = [
            0x00, 0x00, 3 << 1, 0x02,
            0x08, 0x00,
            0x00, 0x00, 3 << 1, 0x02,
            0x86, 0xdd,
        ];
        assert_eq!(
            parse(&bytes, bytes.len(), true).unwrap_err(),
            Error::Of(OfError::BadMatch(BadMatchCode::DupField))
        );
    }

    #[test]
    fn test_unknown_field_loose_vs_strict() {
        #[cfg_attr(rustfmt, rustfmt_skip)]
        let bytes = [
            0x00, 0x01, 99 << 1, 0x02, // unknown nicira field
            0xab, 0xcd,
            0x00, 0x00, 3 << 1, 0x02,
            0x08, 0x00,
        ];
        assert_eq!(
            parse(&bytes, bytes.len(), true).unwrap_err(),
            Error::Of(OfError::BadMatch(BadMatchCode::BadField))
        );
        let mut expected = Match::catch_all();
        expected.set_dl_type(flow::ETH_TYPE_IP);
        assert_eq!(parse(&bytes, bytes.len(), false).unwrap(), expected);
    }

    #[test]
    fn test_oxm_in_port_out_of_range() {
        #[cfg_attr(rustfmt, rustfmt_skip)]
        let bytes = [
            0x80, 0x00, 0x00, 0x04,
            0x00, 0x01, 0x00, 0x00, // 0x10000 > 0xffff
        ];
        assert_eq!(
            parse(&bytes, bytes.len(), true).unwrap_err(),
            Error::Of(OfError::BadMatch(BadMatchCode::BadValue))
        );
    }
}
