//! Decode-then-encode fidelity for the wire codecs, enforced as
//! properties over generated matches, actions and messages. The
//! strategies only generate inputs the canonical encoder can produce
//! itself (prerequisites respected, reserved bits clear), which is
//! exactly the round-trip contract: anything the codec emits must come
//! back identical.

#[macro_use]
extern crate proptest;
extern crate ofswitch;
extern crate smoltcp;

use proptest::prelude::*;
use smoltcp::wire::{EthernetAddress, Ipv4Address};

use ofswitch::actions::{self, Action, ActionList};
use ofswitch::flow::{self, Match};
use ofswitch::wire::flow_mod::{FlowModCommand, FlowModFlags, FlowModRepr, NO_BUFFER};
use ofswitch::wire::match10::MatchRepr;
use ofswitch::wire::nxm::{self, Dialect};
use ofswitch::wire::openflow::{Kind, Packet, Version};
use ofswitch::wire::port_msg::OFPP_NONE;
use ofswitch::wire::vendor;
use ofswitch::wire::compose;
use ofswitch::Repr;

fn eth() -> impl Strategy<Value = EthernetAddress> {
    proptest::array::uniform6(any::<u8>()).prop_map(|b| EthernetAddress::from_bytes(&b))
}

fn ipv4() -> impl Strategy<Value = Ipv4Address> {
    proptest::array::uniform4(any::<u8>()).prop_map(|b| Ipv4Address::from_bytes(&b))
}

// A VLAN TCI constraint the codecs can express in every dialect: either
// "no 802.1Q header" or a present tag with VID and optionally PCP pinned.
fn vlan() -> impl Strategy<Value = (u16, u16)> {
    prop_oneof![
        Just((0, 0xffff)),
        (0u16..0x1000).prop_map(|vid| (flow::VLAN_CFI | vid, flow::VLAN_VID_MASK)),
        (0u16..0x1000, 0u16..8)
            .prop_map(|(vid, pcp)| (flow::VLAN_CFI | vid | pcp << 13, 0xffff)),
    ]
}

prop_compose! {
    // Fields meaningful on any packet.
    fn base_match()(
        in_port in proptest::option::of(0u16..0xff00),
        dl_src in proptest::option::of((eth(), proptest::array::uniform6(any::<u8>()))),
        dl_dst in proptest::option::of((eth(), proptest::array::uniform6(any::<u8>()))),
        vlan in proptest::option::of(vlan()),
        tun in proptest::option::of((any::<u64>(), any::<u64>())),
        reg0 in proptest::option::of((any::<u32>(), any::<u32>())),
        cookie in proptest::option::of((any::<u64>(), any::<u64>())),
    ) -> Match {
        let mut m = Match::catch_all();
        if let Some(port) = in_port {
            m.set_in_port(port);
        }
        if let Some((value, mask)) = dl_src {
            m.set_dl_src(value, mask);
        }
        if let Some((value, mask)) = dl_dst {
            m.set_dl_dst(value, mask);
        }
        if let Some((value, mask)) = vlan {
            m.set_vlan_tci(value, mask);
        }
        if let Some((value, mask)) = tun {
            m.set_tun_id(value, mask);
        }
        if let Some((value, mask)) = reg0 {
            m.set_reg(0, value, mask);
        }
        if let Some((value, mask)) = cookie {
            m.set_cookie(value, mask);
        }
        m
    }
}

prop_compose! {
    // IPv4 constraints on top of the base; transport fields only appear
    // with the protocol that gives them meaning.
    fn ip_match()(
        base in base_match(),
        src in proptest::option::of((ipv4(), any::<u32>())),
        dst in proptest::option::of((ipv4(), any::<u32>())),
        tos in proptest::option::of(0u8..64),
        ecn in proptest::option::of(0u8..4),
        ttl in proptest::option::of(any::<u8>()),
        frag in proptest::option::of((0u8..4, 0u8..4)),
        l4 in proptest::option::of((
            prop_oneof![
                Just(flow::IP_PROTO_TCP),
                Just(flow::IP_PROTO_UDP),
                Just(flow::IP_PROTO_ICMP)
            ],
            proptest::option::of(any::<u16>()),
            proptest::option::of(any::<u16>()),
        )),
    ) -> Match {
        let mut m = base;
        m.set_dl_type(flow::ETH_TYPE_IP);
        if let Some((value, mask)) = src {
            m.set_nw_src(value, mask);
        }
        if let Some((value, mask)) = dst {
            m.set_nw_dst(value, mask);
        }
        if let Some(dscp) = tos {
            m.set_nw_tos(dscp << 2);
        }
        if let Some(value) = ecn {
            m.set_nw_ecn(value);
        }
        if let Some(value) = ttl {
            m.set_nw_ttl(value);
        }
        if let Some((value, mask)) = frag {
            m.set_nw_frag(value & mask, mask);
        }
        if let Some((proto, tp_src, tp_dst)) = l4 {
            m.set_nw_proto(proto);
            let limit = if proto == flow::IP_PROTO_ICMP { 0xff } else { 0xffff };
            if let Some(value) = tp_src {
                m.set_tp_src(value & limit);
            }
            if let Some(value) = tp_dst {
                m.set_tp_dst(value & limit);
            }
        }
        m
    }
}

prop_compose! {
    fn arp_match()(
        base in base_match(),
        op in proptest::option::of(0u8..26),
        spa in proptest::option::of((ipv4(), any::<u32>())),
        tpa in proptest::option::of((ipv4(), any::<u32>())),
        sha in proptest::option::of(eth()),
        tha in proptest::option::of(eth()),
    ) -> Match {
        let mut m = base;
        m.set_dl_type(flow::ETH_TYPE_ARP);
        if let Some(op) = op {
            m.set_nw_proto(op);
        }
        if let Some((value, mask)) = spa {
            m.set_nw_src(value, mask);
        }
        if let Some((value, mask)) = tpa {
            m.set_nw_dst(value, mask);
        }
        if let Some(addr) = sha {
            m.set_arp_sha(addr);
        }
        if let Some(addr) = tha {
            m.set_arp_tha(addr);
        }
        m
    }
}

fn any_match() -> impl Strategy<Value = Match> {
    prop_oneof![base_match(), ip_match(), arp_match()]
}

// Matches the OF1.0 fixed structure can carry: exact Ethernet addresses,
// prefix IPv4 masks, no registers/tunnel/cookie constraints.
prop_compose! {
    fn of10_match()(
        in_port in proptest::option::of(0u16..0xff00),
        dl_src in proptest::option::of(eth()),
        dl_dst in proptest::option::of(eth()),
        vlan in proptest::option::of(vlan()),
        ip in proptest::option::of((
            proptest::option::of((ipv4(), 0u32..33)),
            proptest::option::of((ipv4(), 0u32..33)),
            proptest::option::of(0u8..64),
            proptest::option::of((
                prop_oneof![
                    Just(flow::IP_PROTO_TCP),
                    Just(flow::IP_PROTO_UDP),
                    Just(flow::IP_PROTO_ICMP)
                ],
                proptest::option::of(any::<u16>()),
                proptest::option::of(any::<u16>()),
            )),
        )),
    ) -> Match {
        let mut m = Match::catch_all();
        if let Some(port) = in_port {
            m.set_in_port(port);
        }
        if let Some(addr) = dl_src {
            m.set_dl_src(addr, [0xff; 6]);
        }
        if let Some(addr) = dl_dst {
            m.set_dl_dst(addr, [0xff; 6]);
        }
        if let Some((value, mask)) = vlan {
            m.set_vlan_tci(value, mask);
        }
        if let Some((src, dst, tos, l4)) = ip {
            m.set_dl_type(flow::ETH_TYPE_IP);
            if let Some((value, bits)) = src {
                if bits > 0 {
                    m.set_nw_src(value, !0u32 << (32 - bits));
                }
            }
            if let Some((value, bits)) = dst {
                if bits > 0 {
                    m.set_nw_dst(value, !0u32 << (32 - bits));
                }
            }
            if let Some(dscp) = tos {
                m.set_nw_tos(dscp << 2);
            }
            if let Some((proto, tp_src, tp_dst)) = l4 {
                m.set_nw_proto(proto);
                let limit = if proto == flow::IP_PROTO_ICMP { 0xff } else { 0xffff };
                if let Some(value) = tp_src {
                    m.set_tp_src(value & limit);
                }
                if let Some(value) = tp_dst {
                    m.set_tp_dst(value & limit);
                }
            }
        }
        m
    }
}

fn action() -> impl Strategy<Value = Action> {
    use proptest::strategy::{BoxedStrategy, Union};

    let arms: Vec<BoxedStrategy<Action>> = vec![
        (any::<u16>(), any::<u16>())
            .prop_map(|(port, max_len)| Action::Output { port, max_len })
            .boxed(),
        (0u16..0x1000).prop_map(Action::SetVlanVid).boxed(),
        (0u8..8).prop_map(Action::SetVlanPcp).boxed(),
        Just(Action::StripVlan).boxed(),
        eth().prop_map(Action::SetDlSrc).boxed(),
        eth().prop_map(Action::SetDlDst).boxed(),
        ipv4().prop_map(Action::SetNwSrc).boxed(),
        ipv4().prop_map(Action::SetNwDst).boxed(),
        (0u8..64).prop_map(|dscp| Action::SetNwTos(dscp << 2)).boxed(),
        any::<u16>().prop_map(Action::SetTpSrc).boxed(),
        any::<u16>().prop_map(Action::SetTpDst).boxed(),
        (any::<u16>(), any::<u32>())
            .prop_map(|(port, queue_id)| Action::Enqueue { port, queue_id })
            .boxed(),
        any::<u16>()
            .prop_map(|in_port| Action::Resubmit { in_port })
            .boxed(),
        (any::<u16>(), any::<u8>())
            .prop_map(|(in_port, table)| Action::ResubmitTable { in_port, table })
            .boxed(),
        any::<u32>().prop_map(Action::SetTunnel).boxed(),
        any::<u64>().prop_map(Action::SetTunnel64).boxed(),
        any::<u32>().prop_map(Action::SetQueue).boxed(),
        Just(Action::PopQueue).boxed(),
        (any::<u16>(), any::<u16>(), any::<u16>(), any::<u32>(), any::<u32>())
            .prop_map(|(n_bits, src_ofs, dst_ofs, src, dst)| Action::RegMove {
                n_bits,
                src_ofs,
                dst_ofs,
                src,
                dst,
            })
            .boxed(),
        (any::<u16>(), any::<u32>(), any::<u64>())
            .prop_map(|(ofs_nbits, dst, value)| Action::RegLoad {
                ofs_nbits,
                dst,
                value,
            })
            .boxed(),
        // note payloads sized so the 8-byte alignment needs no padding
        proptest::collection::vec(any::<u8>(), 6..7)
            .prop_map(Action::Note)
            .boxed(),
        (any::<u16>(), any::<u32>(), any::<u32>())
            .prop_map(|(ofs_nbits, dst, id)| Action::Autopath { ofs_nbits, dst, id })
            .boxed(),
        (any::<u16>(), any::<u32>(), any::<u16>())
            .prop_map(|(ofs_nbits, src, max_len)| Action::OutputReg {
                ofs_nbits,
                src,
                max_len,
            })
            .boxed(),
        Just(Action::Exit).boxed(),
        Just(Action::DecTtl).boxed(),
        (any::<u16>(), any::<u16>())
            .prop_map(|(fin_idle_timeout, fin_hard_timeout)| Action::FinTimeout {
                fin_idle_timeout,
                fin_hard_timeout,
            })
            .boxed(),
        (any::<u16>(), any::<u16>(), 0u8..3)
            .prop_map(|(max_len, controller_id, reason)| Action::Controller {
                max_len,
                controller_id,
                reason,
            })
            .boxed(),
        (0u32..0x10_0000).prop_map(Action::SetMplsLabel).boxed(),
        (0u8..8).prop_map(Action::SetMplsTc).boxed(),
        any::<u8>().prop_map(Action::SetMplsTtl).boxed(),
        Just(Action::DecMplsTtl).boxed(),
        prop_oneof![Just(flow::ETH_TYPE_MPLS), Just(flow::ETH_TYPE_MPLS_MCAST)]
            .prop_map(Action::PushMpls)
            .boxed(),
        any::<u16>().prop_map(Action::PopMpls).boxed(),
        Just(Action::PushVlan(flow::ETH_TYPE_VLAN)).boxed(),
    ];
    Union::new(arms)
}

proptest! {
    #[test]
    fn nxm_match_roundtrip(m in any_match()) {
        let bytes = nxm::emit(&m, Dialect::Nxm);
        let parsed = nxm::parse(&bytes, bytes.len(), true).unwrap();
        prop_assert_eq!(parsed, m);
    }

    #[test]
    fn oxm_match_roundtrip(m in any_match()) {
        let bytes = nxm::emit(&m, Dialect::Oxm);
        let parsed = nxm::parse(&bytes, bytes.len(), true).unwrap();
        prop_assert_eq!(parsed, m);
    }

    #[test]
    fn of10_match_roundtrip(m in of10_match()) {
        let repr = MatchRepr(m);
        let mut bytes = [0; 40];
        repr.emit(&mut bytes).unwrap();
        prop_assert_eq!(MatchRepr::parse(&bytes).unwrap(), repr);
    }

    #[test]
    fn of10_match_emit_is_canonical(m in of10_match()) {
        let repr = MatchRepr(m);
        let mut first = [0; 40];
        repr.emit(&mut first).unwrap();
        let reparsed = MatchRepr::parse(&first).unwrap();
        let mut second = [0; 40];
        reparsed.emit(&mut second).unwrap();
        prop_assert_eq!(&first[..], &second[..]);
    }

    #[test]
    fn actions_roundtrip(actions in proptest::collection::vec(action(), 0..6)) {
        let bytes = actions::emit_of10(&actions);
        prop_assert_eq!(bytes.len(), actions::of10_len(&actions));
        prop_assert_eq!(actions::parse_of10(&bytes).unwrap(), actions);
    }

    #[test]
    fn of10_flow_mod_roundtrip(
        m in of10_match(),
        acts in proptest::collection::vec(action(), 0..4),
        cookie in any::<u64>(),
        priority in any::<u16>(),
        idle in any::<u16>(),
        hard in any::<u16>(),
    ) {
        let repr = FlowModRepr {
            match_: m,
            cookie,
            command: FlowModCommand::Add,
            idle_timeout: idle,
            hard_timeout: hard,
            priority,
            buffer_id: NO_BUFFER,
            out_port: OFPP_NONE,
            flags: FlowModFlags::SEND_FLOW_REM,
            actions: ActionList::apply(acts),
        };
        let mut bytes = vec![0; repr.buffer_len()];
        repr.emit(&mut bytes).unwrap();
        prop_assert_eq!(FlowModRepr::parse(&bytes).unwrap(), repr);
    }

    #[test]
    fn nx_flow_mod_roundtrip(
        m in any_match(),
        acts in proptest::collection::vec(action(), 0..4),
        cookie in any::<u64>(),
        priority in any::<u16>(),
        table_id in any::<u8>(),
    ) {
        let repr = FlowModRepr {
            match_: m,
            cookie,
            command: FlowModCommand::Add,
            idle_timeout: 0,
            hard_timeout: 0,
            priority,
            buffer_id: NO_BUFFER,
            out_port: OFPP_NONE,
            flags: FlowModFlags::empty(),
            actions: ActionList::apply(acts),
        };
        let body = vendor::emit_nx_flow_mod(&repr, table_id, Dialect::Nxm).unwrap();
        let (parsed, parsed_table) = vendor::parse_nx_flow_mod(&body).unwrap();
        prop_assert_eq!(parsed, repr);
        prop_assert_eq!(parsed_table, table_id);
    }

    #[test]
    fn header_roundtrip(xid in any::<u32>(), payload in proptest::collection::vec(any::<u8>(), 0..32)) {
        for &version in &[
            Version::OpenFlow1Dot0,
            Version::OpenFlow1Dot1,
            Version::OpenFlow1Dot2,
        ] {
            for &kind in &[
                Kind::EchoRequest,
                Kind::EchoReply,
                Kind::FeaturesRequest,
                Kind::BarrierRequest,
                Kind::BarrierReply,
                Kind::PortMod,
                Kind::StatsRequest,
            ] {
                let message = compose(version, kind, xid, &payload).unwrap();
                let packet = Packet::new_checked(&message[..]).unwrap();
                prop_assert_eq!(packet.version(), version);
                prop_assert_eq!(packet.kind().unwrap(), kind);
                prop_assert_eq!(packet.xid(), xid);
                prop_assert_eq!(packet.payload(), &payload[..]);
            }
        }
    }
}
