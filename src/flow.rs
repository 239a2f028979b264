//! Flow keys, wildcards, and the match algebra used by the classifier.
//!
//! A [`FlowKey`](struct.FlowKey.html) is the concrete header tuple extracted
//! from one packet. A [`Match`](struct.Match.html) pairs a flow key with a
//! mask per field; a zero mask wildcards the field entirely, an all-ones
//! mask requires an exact value, and anything in between matches the key
//! bit-wise. All classifier queries (`lookup`, `overlaps`, subsumption for
//! loose operations) reduce to the three bit-level predicates implemented
//! at the bottom of this module.

use core::hash::{Hash, Hasher};

use smoltcp::wire::{EthernetAddress, Ipv4Address};

/// Number of Nicira extension registers carried in a flow.
pub const NUM_REGS: usize = 4;

pub const ETH_TYPE_IP: u16 = 0x0800;
pub const ETH_TYPE_ARP: u16 = 0x0806;
pub const ETH_TYPE_VLAN: u16 = 0x8100;
pub const ETH_TYPE_IPV6: u16 = 0x86dd;
pub const ETH_TYPE_MPLS: u16 = 0x8847;
pub const ETH_TYPE_MPLS_MCAST: u16 = 0x8848;

pub const IP_PROTO_ICMP: u8 = 1;
pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;
pub const IP_PROTO_ICMPV6: u8 = 58;

/// The CFI bit of a VLAN TCI; set on every packet that carries an 802.1Q
/// header in the Nicira encoding.
pub const VLAN_CFI: u16 = 0x1000;
/// Mask covering the VID and CFI bits of a TCI.
pub const VLAN_VID_MASK: u16 = 0x1fff;
/// Mask covering the PCP bits of a TCI.
pub const VLAN_PCP_MASK: u16 = 0xe000;

/// IP fragment bits: the packet is a fragment.
pub const FRAG_ANY: u8 = 1;
/// IP fragment bits: the packet is a fragment with a nonzero offset.
pub const FRAG_LATER: u8 = 2;
pub const FRAG_MASK: u8 = FRAG_ANY | FRAG_LATER;

/// The concrete header tuple of one packet, as far as the control plane
/// cares about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowKey {
    pub regs: [u32; NUM_REGS],
    pub tun_id: u64,
    pub cookie: u64,
    pub in_port: u16,
    pub dl_src: EthernetAddress,
    pub dl_dst: EthernetAddress,
    /// Full 802.1Q TCI in the Nicira encoding (CFI forced to 1 when a VLAN
    /// header is present, the whole field 0 otherwise).
    pub vlan_tci: u16,
    pub dl_type: u16,
    pub nw_src: Ipv4Address,
    pub nw_dst: Ipv4Address,
    pub nw_proto: u8,
    /// DSCP bits, low two bits always zero.
    pub nw_tos: u8,
    pub nw_ecn: u8,
    pub nw_ttl: u8,
    pub nw_frag: u8,
    pub tp_src: u16,
    pub tp_dst: u16,
    pub arp_sha: EthernetAddress,
    pub arp_tha: EthernetAddress,
    pub ipv6_src: [u8; 16],
    pub ipv6_dst: [u8; 16],
    pub ipv6_label: u32,
    pub nd_target: [u8; 16],
    pub mpls_label: u32,
    pub mpls_tc: u8,
    pub mpls_bos: u8,
}

impl Default for FlowKey {
    fn default() -> FlowKey {
        FlowKey {
            regs: [0; NUM_REGS],
            tun_id: 0,
            cookie: 0,
            in_port: 0,
            dl_src: EthernetAddress::from_bytes(&[0; 6]),
            dl_dst: EthernetAddress::from_bytes(&[0; 6]),
            vlan_tci: 0,
            dl_type: 0,
            nw_src: Ipv4Address::from_bytes(&[0; 4]),
            nw_dst: Ipv4Address::from_bytes(&[0; 4]),
            nw_proto: 0,
            nw_tos: 0,
            nw_ecn: 0,
            nw_ttl: 0,
            nw_frag: 0,
            tp_src: 0,
            tp_dst: 0,
            arp_sha: EthernetAddress::from_bytes(&[0; 6]),
            arp_tha: EthernetAddress::from_bytes(&[0; 6]),
            ipv6_src: [0; 16],
            ipv6_dst: [0; 16],
            ipv6_label: 0,
            nd_target: [0; 16],
            mpls_label: 0,
            mpls_tc: 0,
            mpls_bos: 0,
        }
    }
}

impl Hash for FlowKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for reg in &self.regs {
            reg.hash(state);
        }
        self.tun_id.hash(state);
        self.cookie.hash(state);
        self.in_port.hash(state);
        self.dl_src.as_bytes().hash(state);
        self.dl_dst.as_bytes().hash(state);
        self.vlan_tci.hash(state);
        self.dl_type.hash(state);
        self.nw_src.as_bytes().hash(state);
        self.nw_dst.as_bytes().hash(state);
        self.nw_proto.hash(state);
        self.nw_tos.hash(state);
        self.nw_ecn.hash(state);
        self.nw_ttl.hash(state);
        self.nw_frag.hash(state);
        self.tp_src.hash(state);
        self.tp_dst.hash(state);
        self.arp_sha.as_bytes().hash(state);
        self.arp_tha.as_bytes().hash(state);
        self.ipv6_src.hash(state);
        self.ipv6_dst.hash(state);
        self.ipv6_label.hash(state);
        self.nd_target.hash(state);
        self.mpls_label.hash(state);
        self.mpls_tc.hash(state);
        self.mpls_bos.hash(state);
    }
}

/// One mask per [`FlowKey`](struct.FlowKey.html) field. A zero mask means
/// the field is fully wildcarded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlowWildcards {
    pub regs: [u32; NUM_REGS],
    pub tun_id: u64,
    pub cookie: u64,
    pub in_port: u16,
    pub dl_src: [u8; 6],
    pub dl_dst: [u8; 6],
    pub vlan_tci: u16,
    pub dl_type: u16,
    pub nw_src: u32,
    pub nw_dst: u32,
    pub nw_proto: u8,
    pub nw_tos: u8,
    pub nw_ecn: u8,
    pub nw_ttl: u8,
    pub nw_frag: u8,
    pub tp_src: u16,
    pub tp_dst: u16,
    pub arp_sha: [u8; 6],
    pub arp_tha: [u8; 6],
    pub ipv6_src: [u8; 16],
    pub ipv6_dst: [u8; 16],
    pub ipv6_label: u32,
    pub nd_target: [u8; 16],
    pub mpls_label: u32,
    pub mpls_tc: u8,
    pub mpls_bos: u8,
}

impl Hash for FlowWildcards {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for reg in &self.regs {
            reg.hash(state);
        }
        self.tun_id.hash(state);
        self.cookie.hash(state);
        self.in_port.hash(state);
        self.dl_src.hash(state);
        self.dl_dst.hash(state);
        self.vlan_tci.hash(state);
        self.dl_type.hash(state);
        self.nw_src.hash(state);
        self.nw_dst.hash(state);
        self.nw_proto.hash(state);
        self.nw_tos.hash(state);
        self.nw_ecn.hash(state);
        self.nw_ttl.hash(state);
        self.nw_frag.hash(state);
        self.tp_src.hash(state);
        self.tp_dst.hash(state);
        self.arp_sha.hash(state);
        self.arp_tha.hash(state);
        self.ipv6_src.hash(state);
        self.ipv6_dst.hash(state);
        self.ipv6_label.hash(state);
        self.nd_target.hash(state);
        self.mpls_label.hash(state);
        self.mpls_tc.hash(state);
        self.mpls_bos.hash(state);
    }
}

impl FlowWildcards {
    /// Wildcard everything: the resulting match is a catch-all.
    pub fn none() -> Self {
        FlowWildcards::default()
    }

    /// Match every field exactly.
    pub fn exact() -> Self {
        FlowWildcards {
            regs: [!0; NUM_REGS],
            tun_id: !0,
            cookie: !0,
            in_port: !0,
            dl_src: [0xff; 6],
            dl_dst: [0xff; 6],
            vlan_tci: !0,
            dl_type: !0,
            nw_src: !0,
            nw_dst: !0,
            nw_proto: !0,
            nw_tos: !0,
            nw_ecn: !0,
            nw_ttl: !0,
            nw_frag: FRAG_MASK,
            tp_src: !0,
            tp_dst: !0,
            arp_sha: [0xff; 6],
            arp_tha: [0xff; 6],
            ipv6_src: [0xff; 16],
            ipv6_dst: [0xff; 16],
            ipv6_label: !0,
            nd_target: [0xff; 16],
            mpls_label: !0,
            mpls_tc: !0,
            mpls_bos: !0,
        }
    }
}

/// A wildcarded flow match: a value and a mask per field, kept normalized
/// so that value bits outside the mask are always zero. Normalization makes
/// structural equality coincide with match equality, which the classifier
/// relies on for its exact index.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    flow: FlowKey,
    wc: FlowWildcards,
}

impl Hash for Match {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.flow.hash(state);
        self.wc.hash(state);
    }
}

fn eth(addr: &EthernetAddress) -> [u8; 6] {
    let mut bytes = [0; 6];
    bytes.copy_from_slice(addr.as_bytes());
    bytes
}

fn ipv4(addr: &Ipv4Address) -> u32 {
    let b = addr.as_bytes();
    (u32::from(b[0]) << 24) | (u32::from(b[1]) << 16) | (u32::from(b[2]) << 8) | u32::from(b[3])
}

pub fn ipv4_from_u32(value: u32) -> Ipv4Address {
    Ipv4Address::from_bytes(&[
        (value >> 24) as u8,
        (value >> 16) as u8,
        (value >> 8) as u8,
        value as u8,
    ])
}

fn and6(a: [u8; 6], b: [u8; 6]) -> [u8; 6] {
    let mut r = [0; 6];
    for i in 0..6 {
        r[i] = a[i] & b[i];
    }
    r
}

fn and16(a: [u8; 16], b: [u8; 16]) -> [u8; 16] {
    let mut r = [0; 16];
    for i in 0..16 {
        r[i] = a[i] & b[i];
    }
    r
}

// The three bit-level predicates everything else is built from.

fn fits64(value: u64, mask: u64, key: u64) -> bool {
    (value ^ key) & mask == 0
}

fn fits6(value: [u8; 6], mask: [u8; 6], key: [u8; 6]) -> bool {
    (0..6).all(|i| (value[i] ^ key[i]) & mask[i] == 0)
}

fn fits16b(value: [u8; 16], mask: [u8; 16], key: [u8; 16]) -> bool {
    (0..16).all(|i| (value[i] ^ key[i]) & mask[i] == 0)
}

fn covers64(outer: u64, inner: u64) -> bool {
    outer & inner == outer
}

fn covers6(outer: [u8; 6], inner: [u8; 6]) -> bool {
    (0..6).all(|i| outer[i] & inner[i] == outer[i])
}

fn covers16b(outer: [u8; 16], inner: [u8; 16]) -> bool {
    (0..16).all(|i| outer[i] & inner[i] == outer[i])
}

fn meet64(av: u64, am: u64, bv: u64, bm: u64) -> bool {
    (av ^ bv) & (am & bm) == 0
}

fn meet6(av: [u8; 6], am: [u8; 6], bv: [u8; 6], bm: [u8; 6]) -> bool {
    (0..6).all(|i| (av[i] ^ bv[i]) & am[i] & bm[i] == 0)
}

fn meet16b(av: [u8; 16], am: [u8; 16], bv: [u8; 16], bm: [u8; 16]) -> bool {
    (0..16).all(|i| (av[i] ^ bv[i]) & am[i] & bm[i] == 0)
}

impl Match {
    /// Build a match from a key and wildcards; value bits outside the masks
    /// are cleared.
    pub fn new(flow: FlowKey, wc: FlowWildcards) -> Self {
        let mut m = Match { flow, wc };
        m.normalize();
        m
    }

    /// The all-wildcard match.
    pub fn catch_all() -> Self {
        Match::default()
    }

    /// An exact match on the given key.
    pub fn exact(flow: FlowKey) -> Self {
        Match::new(flow, FlowWildcards::exact())
    }

    pub fn flow(&self) -> &FlowKey {
        &self.flow
    }

    pub fn wildcards(&self) -> &FlowWildcards {
        &self.wc
    }

    /// A concrete flow matched by this match; used as a probe for the
    /// classifier invariants.
    pub fn exemplar(&self) -> FlowKey {
        self.flow
    }

    fn normalize(&mut self) {
        for i in 0..NUM_REGS {
            self.flow.regs[i] &= self.wc.regs[i];
        }
        self.flow.tun_id &= self.wc.tun_id;
        self.flow.cookie &= self.wc.cookie;
        self.flow.in_port &= self.wc.in_port;
        self.flow.dl_src = EthernetAddress::from_bytes(&and6(eth(&self.flow.dl_src), self.wc.dl_src));
        self.flow.dl_dst = EthernetAddress::from_bytes(&and6(eth(&self.flow.dl_dst), self.wc.dl_dst));
        self.flow.vlan_tci &= self.wc.vlan_tci;
        self.flow.dl_type &= self.wc.dl_type;
        self.flow.nw_src = ipv4_from_u32(ipv4(&self.flow.nw_src) & self.wc.nw_src);
        self.flow.nw_dst = ipv4_from_u32(ipv4(&self.flow.nw_dst) & self.wc.nw_dst);
        self.flow.nw_proto &= self.wc.nw_proto;
        self.flow.nw_tos &= self.wc.nw_tos;
        self.flow.nw_ecn &= self.wc.nw_ecn;
        self.flow.nw_ttl &= self.wc.nw_ttl;
        self.flow.nw_frag &= self.wc.nw_frag;
        self.flow.tp_src &= self.wc.tp_src;
        self.flow.tp_dst &= self.wc.tp_dst;
        self.flow.arp_sha = EthernetAddress::from_bytes(&and6(eth(&self.flow.arp_sha), self.wc.arp_sha));
        self.flow.arp_tha = EthernetAddress::from_bytes(&and6(eth(&self.flow.arp_tha), self.wc.arp_tha));
        self.flow.ipv6_src = and16(self.flow.ipv6_src, self.wc.ipv6_src);
        self.flow.ipv6_dst = and16(self.flow.ipv6_dst, self.wc.ipv6_dst);
        self.flow.ipv6_label &= self.wc.ipv6_label;
        self.flow.nd_target = and16(self.flow.nd_target, self.wc.nd_target);
        self.flow.mpls_label &= self.wc.mpls_label;
        self.flow.mpls_tc &= self.wc.mpls_tc;
        self.flow.mpls_bos &= self.wc.mpls_bos;
    }

    /// Does this match accept the concrete flow `key`?
    pub fn matches(&self, key: &FlowKey) -> bool {
        (0..NUM_REGS).all(|i| {
            fits64(
                u64::from(self.flow.regs[i]),
                u64::from(self.wc.regs[i]),
                u64::from(key.regs[i]),
            )
        }) && fits64(self.flow.tun_id, self.wc.tun_id, key.tun_id)
            && fits64(self.flow.cookie, self.wc.cookie, key.cookie)
            && fits64(
                u64::from(self.flow.in_port),
                u64::from(self.wc.in_port),
                u64::from(key.in_port),
            )
            && fits6(eth(&self.flow.dl_src), self.wc.dl_src, eth(&key.dl_src))
            && fits6(eth(&self.flow.dl_dst), self.wc.dl_dst, eth(&key.dl_dst))
            && fits64(
                u64::from(self.flow.vlan_tci),
                u64::from(self.wc.vlan_tci),
                u64::from(key.vlan_tci),
            )
            && fits64(
                u64::from(self.flow.dl_type),
                u64::from(self.wc.dl_type),
                u64::from(key.dl_type),
            )
            && fits64(
                u64::from(ipv4(&self.flow.nw_src)),
                u64::from(self.wc.nw_src),
                u64::from(ipv4(&key.nw_src)),
            )
            && fits64(
                u64::from(ipv4(&self.flow.nw_dst)),
                u64::from(self.wc.nw_dst),
                u64::from(ipv4(&key.nw_dst)),
            )
            && fits64(
                u64::from(self.flow.nw_proto),
                u64::from(self.wc.nw_proto),
                u64::from(key.nw_proto),
            )
            && fits64(
                u64::from(self.flow.nw_tos),
                u64::from(self.wc.nw_tos),
                u64::from(key.nw_tos),
            )
            && fits64(
                u64::from(self.flow.nw_ecn),
                u64::from(self.wc.nw_ecn),
                u64::from(key.nw_ecn),
            )
            && fits64(
                u64::from(self.flow.nw_ttl),
                u64::from(self.wc.nw_ttl),
                u64::from(key.nw_ttl),
            )
            && fits64(
                u64::from(self.flow.nw_frag),
                u64::from(self.wc.nw_frag),
                u64::from(key.nw_frag),
            )
            && fits64(
                u64::from(self.flow.tp_src),
                u64::from(self.wc.tp_src),
                u64::from(key.tp_src),
            )
            && fits64(
                u64::from(self.flow.tp_dst),
                u64::from(self.wc.tp_dst),
                u64::from(key.tp_dst),
            )
            && fits6(eth(&self.flow.arp_sha), self.wc.arp_sha, eth(&key.arp_sha))
            && fits6(eth(&self.flow.arp_tha), self.wc.arp_tha, eth(&key.arp_tha))
            && fits16b(self.flow.ipv6_src, self.wc.ipv6_src, key.ipv6_src)
            && fits16b(self.flow.ipv6_dst, self.wc.ipv6_dst, key.ipv6_dst)
            && fits64(
                u64::from(self.flow.ipv6_label),
                u64::from(self.wc.ipv6_label),
                u64::from(key.ipv6_label),
            )
            && fits16b(self.flow.nd_target, self.wc.nd_target, key.nd_target)
            && fits64(
                u64::from(self.flow.mpls_label),
                u64::from(self.wc.mpls_label),
                u64::from(key.mpls_label),
            )
            && fits64(
                u64::from(self.flow.mpls_tc),
                u64::from(self.wc.mpls_tc),
                u64::from(key.mpls_tc),
            )
            && fits64(
                u64::from(self.flow.mpls_bos),
                u64::from(self.wc.mpls_bos),
                u64::from(key.mpls_bos),
            )
    }

    /// Does this match accept every flow that `other` accepts?
    ///
    /// True iff every bit constrained here is also constrained by `other`,
    /// with agreeing values.
    pub fn subsumes(&self, other: &Match) -> bool {
        let a = &self.flow;
        let am = &self.wc;
        let b = &other.flow;
        let bm = &other.wc;
        (0..NUM_REGS).all(|i| {
            covers64(u64::from(am.regs[i]), u64::from(bm.regs[i]))
                && fits64(u64::from(a.regs[i]), u64::from(am.regs[i]), u64::from(b.regs[i]))
        }) && covers64(am.tun_id, bm.tun_id)
            && fits64(a.tun_id, am.tun_id, b.tun_id)
            && covers64(am.cookie, bm.cookie)
            && fits64(a.cookie, am.cookie, b.cookie)
            && covers64(u64::from(am.in_port), u64::from(bm.in_port))
            && fits64(u64::from(a.in_port), u64::from(am.in_port), u64::from(b.in_port))
            && covers6(am.dl_src, bm.dl_src)
            && fits6(eth(&a.dl_src), am.dl_src, eth(&b.dl_src))
            && covers6(am.dl_dst, bm.dl_dst)
            && fits6(eth(&a.dl_dst), am.dl_dst, eth(&b.dl_dst))
            && covers64(u64::from(am.vlan_tci), u64::from(bm.vlan_tci))
            && fits64(u64::from(a.vlan_tci), u64::from(am.vlan_tci), u64::from(b.vlan_tci))
            && covers64(u64::from(am.dl_type), u64::from(bm.dl_type))
            && fits64(u64::from(a.dl_type), u64::from(am.dl_type), u64::from(b.dl_type))
            && covers64(u64::from(am.nw_src), u64::from(bm.nw_src))
            && fits64(u64::from(ipv4(&a.nw_src)), u64::from(am.nw_src), u64::from(ipv4(&b.nw_src)))
            && covers64(u64::from(am.nw_dst), u64::from(bm.nw_dst))
            && fits64(u64::from(ipv4(&a.nw_dst)), u64::from(am.nw_dst), u64::from(ipv4(&b.nw_dst)))
            && covers64(u64::from(am.nw_proto), u64::from(bm.nw_proto))
            && fits64(u64::from(a.nw_proto), u64::from(am.nw_proto), u64::from(b.nw_proto))
            && covers64(u64::from(am.nw_tos), u64::from(bm.nw_tos))
            && fits64(u64::from(a.nw_tos), u64::from(am.nw_tos), u64::from(b.nw_tos))
            && covers64(u64::from(am.nw_ecn), u64::from(bm.nw_ecn))
            && fits64(u64::from(a.nw_ecn), u64::from(am.nw_ecn), u64::from(b.nw_ecn))
            && covers64(u64::from(am.nw_ttl), u64::from(bm.nw_ttl))
            && fits64(u64::from(a.nw_ttl), u64::from(am.nw_ttl), u64::from(b.nw_ttl))
            && covers64(u64::from(am.nw_frag), u64::from(bm.nw_frag))
            && fits64(u64::from(a.nw_frag), u64::from(am.nw_frag), u64::from(b.nw_frag))
            && covers64(u64::from(am.tp_src), u64::from(bm.tp_src))
            && fits64(u64::from(a.tp_src), u64::from(am.tp_src), u64::from(b.tp_src))
            && covers64(u64::from(am.tp_dst), u64::from(bm.tp_dst))
            && fits64(u64::from(a.tp_dst), u64::from(am.tp_dst), u64::from(b.tp_dst))
            && covers6(am.arp_sha, bm.arp_sha)
            && fits6(eth(&a.arp_sha), am.arp_sha, eth(&b.arp_sha))
            && covers6(am.arp_tha, bm.arp_tha)
            && fits6(eth(&a.arp_tha), am.arp_tha, eth(&b.arp_tha))
            && covers16b(am.ipv6_src, bm.ipv6_src)
            && fits16b(a.ipv6_src, am.ipv6_src, b.ipv6_src)
            && covers16b(am.ipv6_dst, bm.ipv6_dst)
            && fits16b(a.ipv6_dst, am.ipv6_dst, b.ipv6_dst)
            && covers64(u64::from(am.ipv6_label), u64::from(bm.ipv6_label))
            && fits64(u64::from(a.ipv6_label), u64::from(am.ipv6_label), u64::from(b.ipv6_label))
            && covers16b(am.nd_target, bm.nd_target)
            && fits16b(a.nd_target, am.nd_target, b.nd_target)
            && covers64(u64::from(am.mpls_label), u64::from(bm.mpls_label))
            && fits64(u64::from(a.mpls_label), u64::from(am.mpls_label), u64::from(b.mpls_label))
            && covers64(u64::from(am.mpls_tc), u64::from(bm.mpls_tc))
            && fits64(u64::from(a.mpls_tc), u64::from(am.mpls_tc), u64::from(b.mpls_tc))
            && covers64(u64::from(am.mpls_bos), u64::from(bm.mpls_bos))
            && fits64(u64::from(a.mpls_bos), u64::from(am.mpls_bos), u64::from(b.mpls_bos))
    }

    /// Is there at least one concrete flow accepted by both matches?
    ///
    /// Two matches intersect unless some bit is constrained by both with
    /// disagreeing values.
    pub fn overlaps(&self, other: &Match) -> bool {
        let a = &self.flow;
        let am = &self.wc;
        let b = &other.flow;
        let bm = &other.wc;
        (0..NUM_REGS).all(|i| {
            meet64(
                u64::from(a.regs[i]),
                u64::from(am.regs[i]),
                u64::from(b.regs[i]),
                u64::from(bm.regs[i]),
            )
        }) && meet64(a.tun_id, am.tun_id, b.tun_id, bm.tun_id)
            && meet64(a.cookie, am.cookie, b.cookie, bm.cookie)
            && meet64(
                u64::from(a.in_port),
                u64::from(am.in_port),
                u64::from(b.in_port),
                u64::from(bm.in_port),
            )
            && meet6(eth(&a.dl_src), am.dl_src, eth(&b.dl_src), bm.dl_src)
            && meet6(eth(&a.dl_dst), am.dl_dst, eth(&b.dl_dst), bm.dl_dst)
            && meet64(
                u64::from(a.vlan_tci),
                u64::from(am.vlan_tci),
                u64::from(b.vlan_tci),
                u64::from(bm.vlan_tci),
            )
            && meet64(
                u64::from(a.dl_type),
                u64::from(am.dl_type),
                u64::from(b.dl_type),
                u64::from(bm.dl_type),
            )
            && meet64(
                u64::from(ipv4(&a.nw_src)),
                u64::from(am.nw_src),
                u64::from(ipv4(&b.nw_src)),
                u64::from(bm.nw_src),
            )
            && meet64(
                u64::from(ipv4(&a.nw_dst)),
                u64::from(am.nw_dst),
                u64::from(ipv4(&b.nw_dst)),
                u64::from(bm.nw_dst),
            )
            && meet64(
                u64::from(a.nw_proto),
                u64::from(am.nw_proto),
                u64::from(b.nw_proto),
                u64::from(bm.nw_proto),
            )
            && meet64(
                u64::from(a.nw_tos),
                u64::from(am.nw_tos),
                u64::from(b.nw_tos),
                u64::from(bm.nw_tos),
            )
            && meet64(
                u64::from(a.nw_ecn),
                u64::from(am.nw_ecn),
                u64::from(b.nw_ecn),
                u64::from(bm.nw_ecn),
            )
            && meet64(
                u64::from(a.nw_ttl),
                u64::from(am.nw_ttl),
                u64::from(b.nw_ttl),
                u64::from(bm.nw_ttl),
            )
            && meet64(
                u64::from(a.nw_frag),
                u64::from(am.nw_frag),
                u64::from(b.nw_frag),
                u64::from(bm.nw_frag),
            )
            && meet64(
                u64::from(a.tp_src),
                u64::from(am.tp_src),
                u64::from(b.tp_src),
                u64::from(bm.tp_src),
            )
            && meet64(
                u64::from(a.tp_dst),
                u64::from(am.tp_dst),
                u64::from(b.tp_dst),
                u64::from(bm.tp_dst),
            )
            && meet6(eth(&a.arp_sha), am.arp_sha, eth(&b.arp_sha), bm.arp_sha)
            && meet6(eth(&a.arp_tha), am.arp_tha, eth(&b.arp_tha), bm.arp_tha)
            && meet16b(a.ipv6_src, am.ipv6_src, b.ipv6_src, bm.ipv6_src)
            && meet16b(a.ipv6_dst, am.ipv6_dst, b.ipv6_dst, bm.ipv6_dst)
            && meet64(
                u64::from(a.ipv6_label),
                u64::from(am.ipv6_label),
                u64::from(b.ipv6_label),
                u64::from(bm.ipv6_label),
            )
            && meet16b(a.nd_target, am.nd_target, b.nd_target, bm.nd_target)
            && meet64(
                u64::from(a.mpls_label),
                u64::from(am.mpls_label),
                u64::from(b.mpls_label),
                u64::from(bm.mpls_label),
            )
            && meet64(
                u64::from(a.mpls_tc),
                u64::from(am.mpls_tc),
                u64::from(b.mpls_tc),
                u64::from(bm.mpls_tc),
            )
            && meet64(
                u64::from(a.mpls_bos),
                u64::from(am.mpls_bos),
                u64::from(b.mpls_bos),
                u64::from(bm.mpls_bos),
            )
    }
}

// Setter surface used by the wire codecs when they reconstruct a match
// field by field.
impl Match {
    pub fn set_reg(&mut self, idx: usize, value: u32, mask: u32) {
        self.flow.regs[idx] = value & mask;
        self.wc.regs[idx] = mask;
    }

    pub fn set_tun_id(&mut self, value: u64, mask: u64) {
        self.flow.tun_id = value & mask;
        self.wc.tun_id = mask;
    }

    pub fn set_cookie(&mut self, value: u64, mask: u64) {
        self.flow.cookie = value & mask;
        self.wc.cookie = mask;
    }

    pub fn set_in_port(&mut self, value: u16) {
        self.flow.in_port = value;
        self.wc.in_port = !0;
    }

    pub fn set_dl_src(&mut self, value: EthernetAddress, mask: [u8; 6]) {
        self.flow.dl_src = EthernetAddress::from_bytes(&and6(eth(&value), mask));
        self.wc.dl_src = mask;
    }

    pub fn set_dl_dst(&mut self, value: EthernetAddress, mask: [u8; 6]) {
        self.flow.dl_dst = EthernetAddress::from_bytes(&and6(eth(&value), mask));
        self.wc.dl_dst = mask;
    }

    pub fn set_vlan_tci(&mut self, value: u16, mask: u16) {
        self.flow.vlan_tci = value & mask;
        self.wc.vlan_tci = mask;
    }

    pub fn set_dl_type(&mut self, value: u16) {
        self.flow.dl_type = value;
        self.wc.dl_type = !0;
    }

    pub fn set_nw_src(&mut self, value: Ipv4Address, mask: u32) {
        self.flow.nw_src = ipv4_from_u32(ipv4(&value) & mask);
        self.wc.nw_src = mask;
    }

    pub fn set_nw_dst(&mut self, value: Ipv4Address, mask: u32) {
        self.flow.nw_dst = ipv4_from_u32(ipv4(&value) & mask);
        self.wc.nw_dst = mask;
    }

    pub fn set_nw_proto(&mut self, value: u8) {
        self.flow.nw_proto = value;
        self.wc.nw_proto = !0;
    }

    pub fn set_nw_tos(&mut self, value: u8) {
        self.flow.nw_tos = value & 0xfc;
        self.wc.nw_tos = !0;
    }

    pub fn set_nw_ecn(&mut self, value: u8) {
        self.flow.nw_ecn = value & 0x03;
        self.wc.nw_ecn = !0;
    }

    pub fn set_nw_ttl(&mut self, value: u8) {
        self.flow.nw_ttl = value;
        self.wc.nw_ttl = !0;
    }

    pub fn set_nw_frag(&mut self, value: u8, mask: u8) {
        self.flow.nw_frag = value & mask & FRAG_MASK;
        self.wc.nw_frag = mask & FRAG_MASK;
    }

    pub fn set_tp_src(&mut self, value: u16) {
        self.flow.tp_src = value;
        self.wc.tp_src = !0;
    }

    pub fn set_tp_dst(&mut self, value: u16) {
        self.flow.tp_dst = value;
        self.wc.tp_dst = !0;
    }

    pub fn set_arp_sha(&mut self, value: EthernetAddress) {
        self.flow.arp_sha = value;
        self.wc.arp_sha = [0xff; 6];
    }

    pub fn set_arp_tha(&mut self, value: EthernetAddress) {
        self.flow.arp_tha = value;
        self.wc.arp_tha = [0xff; 6];
    }

    pub fn set_ipv6_src(&mut self, value: [u8; 16], mask: [u8; 16]) {
        self.flow.ipv6_src = and16(value, mask);
        self.wc.ipv6_src = mask;
    }

    pub fn set_ipv6_dst(&mut self, value: [u8; 16], mask: [u8; 16]) {
        self.flow.ipv6_dst = and16(value, mask);
        self.wc.ipv6_dst = mask;
    }

    pub fn set_ipv6_label(&mut self, value: u32) {
        self.flow.ipv6_label = value & 0x000f_ffff;
        self.wc.ipv6_label = !0;
    }

    pub fn set_nd_target(&mut self, value: [u8; 16]) {
        self.flow.nd_target = value;
        self.wc.nd_target = [0xff; 16];
    }

    pub fn set_mpls_label(&mut self, value: u32) {
        self.flow.mpls_label = value & 0x000f_ffff;
        self.wc.mpls_label = !0;
    }

    pub fn set_mpls_tc(&mut self, value: u8) {
        self.flow.mpls_tc = value & 0x07;
        self.wc.mpls_tc = !0;
    }

    pub fn set_mpls_bos(&mut self, value: u8) {
        self.flow.mpls_bos = value & 0x01;
        self.wc.mpls_bos = !0;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ip(s: [u8; 4]) -> Ipv4Address {
        Ipv4Address::from_bytes(&s)
    }

    fn cidr24() -> Match {
        let mut m = Match::catch_all();
        m.set_dl_type(ETH_TYPE_IP);
        m.set_nw_src(ip([10, 0, 0, 0]), 0xffff_ff00);
        m
    }

    fn host1() -> Match {
        let mut m = Match::catch_all();
        m.set_dl_type(ETH_TYPE_IP);
        m.set_nw_src(ip([10, 0, 0, 1]), 0xffff_ffff);
        m
    }

    fn flow(src: [u8; 4]) -> FlowKey {
        let mut key = FlowKey::default();
        key.dl_type = ETH_TYPE_IP;
        key.nw_src = ip(src);
        key
    }

    #[test]
    fn test_catch_all() {
        let m = Match::catch_all();
        assert!(m.matches(&flow([10, 0, 0, 1])));
        assert!(m.matches(&FlowKey::default()));
    }

    #[test]
    fn test_masked_match() {
        let m = cidr24();
        assert!(m.matches(&flow([10, 0, 0, 1])));
        assert!(m.matches(&flow([10, 0, 0, 200])));
        assert!(!m.matches(&flow([10, 0, 1, 1])));
    }

    #[test]
    fn test_subsumes() {
        assert!(cidr24().subsumes(&host1()));
        assert!(!host1().subsumes(&cidr24()));
        assert!(Match::catch_all().subsumes(&host1()));
        assert!(cidr24().subsumes(&cidr24()));
    }

    #[test]
    fn test_overlaps() {
        assert!(cidr24().overlaps(&host1()));
        assert!(host1().overlaps(&cidr24()));

        let mut other = Match::catch_all();
        other.set_dl_type(ETH_TYPE_IP);
        other.set_nw_src(ip([10, 0, 1, 0]), 0xffff_ff00);
        assert!(!cidr24().overlaps(&other));
    }

    #[test]
    fn test_normalization() {
        let mut a = Match::catch_all();
        a.set_nw_src(ip([10, 0, 0, 77]), 0xffff_ff00);
        let mut b = Match::catch_all();
        b.set_nw_src(ip([10, 0, 0, 99]), 0xffff_ff00);
        assert_eq!(a, b);
    }
}
