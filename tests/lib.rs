extern crate ofswitch;
extern crate smoltcp;

use smoltcp::wire::{EthernetAddress, Ipv4Address};

use ofswitch::actions::{Action, ActionList};
use ofswitch::flow::{self, FlowKey, Match};
use ofswitch::provider::{DatapathProvider, SharedProvider, UpcallReason};
use ofswitch::port::PortInfo;
use ofswitch::switch::{admin_list, ConnId, ConnKind, Switch};
use ofswitch::wire::error_msg::{
    BadRequestCode, ErrorMsgRepr, FlowModFailedCode, OfError, PortModFailedCode,
};
use ofswitch::wire::flow_mod::{
    FlowModCommand, FlowModFlags, FlowModRepr, FlowRemovedRepr, RemovedReason, NO_BUFFER,
};
use ofswitch::wire::openflow::{Kind, Packet, Version};
use ofswitch::wire::packet_io::{PacketInRepr, PacketOutRepr};
use ofswitch::wire::port_msg::{
    PortConfig, PortFeatures, PortModRepr, PortReason, PortStatusRepr, OFPP_NONE,
};
use ofswitch::wire::stats::{self, FlowStatsEntryRepr, StatsKind};
use ofswitch::wire::vendor::{NxRole, RoleRepr, NXT_ROLE_REQUEST};
use ofswitch::wire::{compose, compose_repr, compose_vendor};
use ofswitch::{Repr, Error};

const V10: Version = Version::OpenFlow1Dot0;

fn port_info(port_no: u16, name: &str) -> PortInfo {
    PortInfo {
        port_no,
        name: name.to_string(),
        hw_addr: EthernetAddress::from_bytes(&[0x52, 0x54, 0, 0, 0, port_no as u8]),
        port_down: false,
        link_down: false,
        curr: PortFeatures::F_1GB_FD | PortFeatures::COPPER,
        advertised: PortFeatures::empty(),
        supported: PortFeatures::F_1GB_FD,
        peer: PortFeatures::empty(),
        netdev_generation: 1,
    }
}

/// A switch over a shared in-memory datapath with three ports and one
/// primary controller connection.
fn setup(name: &str) -> (Switch, SharedProvider, ConnId) {
    let provider = SharedProvider::new();
    for port_no in 1..4 {
        provider
            .0
            .borrow_mut()
            .seed_port(port_info(port_no, &format!("eth{}", port_no - 1)));
    }
    let mut switch = Switch::new(name, "test", Box::new(provider.clone())).unwrap();
    let conn = switch.connect_controller(ConnKind::Primary);
    (switch, provider, conn)
}

fn ip_match(src: [u8; 4], mask: u32) -> Match {
    let mut m = Match::catch_all();
    m.set_dl_type(flow::ETH_TYPE_IP);
    m.set_nw_src(Ipv4Address::from_bytes(&src), mask);
    m
}

fn ip_flow(src: [u8; 4]) -> FlowKey {
    let mut key = FlowKey::default();
    key.dl_type = flow::ETH_TYPE_IP;
    key.nw_src = Ipv4Address::from_bytes(&src);
    key
}

fn flow_mod(command: FlowModCommand, match_: Match, priority: u16, actions: Vec<Action>) -> FlowModRepr {
    FlowModRepr {
        match_,
        cookie: 0,
        command,
        idle_timeout: 0,
        hard_timeout: 0,
        priority,
        buffer_id: NO_BUFFER,
        out_port: OFPP_NONE,
        flags: FlowModFlags::empty(),
        actions: ActionList::apply(actions),
    }
}

fn send<R: Repr>(switch: &mut Switch, conn: ConnId, xid: u32, kind: Kind, repr: &R, now_ms: u64) {
    let message = compose_repr(V10, kind, xid, repr).unwrap();
    switch.handle_message(conn, &message, now_ms);
}

fn decode(message: &[u8]) -> (Kind, u32, Vec<u8>) {
    let packet = Packet::new_checked(message).unwrap();
    (
        packet.kind().unwrap(),
        packet.xid(),
        packet.payload().to_vec(),
    )
}

fn expect_error(switch: &mut Switch, conn: ConnId) -> OfError {
    let output = switch.take_output(conn);
    assert_eq!(output.len(), 1, "expected exactly one reply");
    let (kind, _xid, payload) = decode(&output[0]);
    assert_eq!(kind, Kind::Error);
    ErrorMsgRepr::parse(V10, &payload).unwrap().error
}

#[test]
fn install_then_lookup() {
    let (mut switch, _provider, conn) = setup("it-install-br");
    let repr = flow_mod(
        FlowModCommand::Add,
        ip_match([10, 0, 0, 1], !0),
        100,
        vec![Action::Output { port: 2, max_len: 0 }],
    );
    send(&mut switch, conn, 1, Kind::FlowMod, &repr, 0);
    assert!(switch.take_output(conn).is_empty());
    assert_eq!(switch.classifier().len(), 1);

    let hit = switch.classifier().lookup(&ip_flow([10, 0, 0, 1])).unwrap();
    let rule = switch.classifier().get(hit).unwrap();
    assert_eq!(
        rule.actions.applied,
        vec![Action::Output { port: 2, max_len: 0 }]
    );

    let mut arp = FlowKey::default();
    arp.dl_type = flow::ETH_TYPE_ARP;
    assert!(switch.classifier().lookup(&arp).is_none());
}

#[test]
fn overlap_rejected_only_with_flag() {
    let (mut switch, _provider, conn) = setup("it-overlap-br");
    let wide = flow_mod(
        FlowModCommand::Add,
        ip_match([10, 0, 0, 0], 0xffff_ff00),
        100,
        vec![Action::Output { port: 2, max_len: 0 }],
    );
    send(&mut switch, conn, 1, Kind::FlowMod, &wide, 0);
    assert!(switch.take_output(conn).is_empty());

    let mut narrow = flow_mod(
        FlowModCommand::Add,
        ip_match([10, 0, 0, 1], !0),
        100,
        vec![Action::Output { port: 3, max_len: 0 }],
    );
    narrow.flags = FlowModFlags::CHECK_OVERLAP;
    send(&mut switch, conn, 2, Kind::FlowMod, &narrow, 0);
    assert_eq!(
        expect_error(&mut switch, conn),
        OfError::FlowModFailed(FlowModFailedCode::Overlap)
    );
    assert_eq!(switch.classifier().len(), 1);

    narrow.flags = FlowModFlags::empty();
    send(&mut switch, conn, 3, Kind::FlowMod, &narrow, 0);
    assert!(switch.take_output(conn).is_empty());
    assert_eq!(switch.classifier().len(), 2);
}

#[test]
fn higher_priority_wins() {
    let (mut switch, _provider, conn) = setup("it-priority-br");
    let wide = flow_mod(
        FlowModCommand::Add,
        ip_match([10, 0, 0, 0], 0xffff_ff00),
        100,
        vec![Action::Output { port: 2, max_len: 0 }],
    );
    let narrow = flow_mod(
        FlowModCommand::Add,
        ip_match([10, 0, 0, 1], !0),
        200,
        vec![Action::Output { port: 3, max_len: 0 }],
    );
    send(&mut switch, conn, 1, Kind::FlowMod, &wide, 0);
    send(&mut switch, conn, 2, Kind::FlowMod, &narrow, 0);

    let narrow_hit = switch.classifier().lookup(&ip_flow([10, 0, 0, 1])).unwrap();
    assert_eq!(
        switch.classifier().get(narrow_hit).unwrap().actions.applied,
        vec![Action::Output { port: 3, max_len: 0 }]
    );
    let wide_hit = switch.classifier().lookup(&ip_flow([10, 0, 0, 2])).unwrap();
    assert_eq!(
        switch.classifier().get(wide_hit).unwrap().actions.applied,
        vec![Action::Output { port: 2, max_len: 0 }]
    );
}

#[test]
fn hard_timeout_expiry() {
    let (mut switch, _provider, conn) = setup("it-expiry-br");
    let mut repr = flow_mod(
        FlowModCommand::Add,
        ip_match([10, 0, 0, 1], !0),
        100,
        vec![Action::Output { port: 2, max_len: 0 }],
    );
    repr.hard_timeout = 1;
    repr.flags = FlowModFlags::SEND_FLOW_REM;
    send(&mut switch, conn, 1, Kind::FlowMod, &repr, 0);
    assert_eq!(switch.classifier().len(), 1);

    // not yet due
    switch.run(900).unwrap();
    assert_eq!(switch.classifier().len(), 1);
    assert!(switch.take_output(conn).is_empty());

    switch.run(1200).unwrap();
    assert_eq!(switch.classifier().len(), 0);
    let output = switch.take_output(conn);
    assert_eq!(output.len(), 1);
    let (kind, _xid, payload) = decode(&output[0]);
    assert_eq!(kind, Kind::FlowRemoved);
    let removed = FlowRemovedRepr::parse(&payload).unwrap();
    assert_eq!(removed.reason, RemovedReason::HardTimeout);
    assert_eq!(removed.duration_sec, 1);
    assert_eq!(removed.duration_nsec, 200_000_000);
    assert!(switch.classifier().lookup(&ip_flow([10, 0, 0, 1])).is_none());
}

#[test]
fn slave_rejected_master_allowed() {
    let (mut switch, _provider, conn) = setup("it-role-br");

    let role = RoleRepr(NxRole::Slave);
    let mut body = vec![0; role.buffer_len()];
    role.emit(&mut body).unwrap();
    let message = compose_vendor(V10, 1, NXT_ROLE_REQUEST, &body).unwrap();
    switch.handle_message(conn, &message, 0);
    let _role_reply = switch.take_output(conn);

    let repr = flow_mod(
        FlowModCommand::Add,
        ip_match([10, 0, 0, 1], !0),
        100,
        vec![Action::Output { port: 2, max_len: 0 }],
    );
    send(&mut switch, conn, 2, Kind::FlowMod, &repr, 0);
    assert_eq!(
        expect_error(&mut switch, conn),
        OfError::BadRequest(BadRequestCode::Eperm)
    );
    assert_eq!(switch.classifier().len(), 0);

    let role = RoleRepr(NxRole::Master);
    let mut body = vec![0; role.buffer_len()];
    role.emit(&mut body).unwrap();
    let message = compose_vendor(V10, 3, NXT_ROLE_REQUEST, &body).unwrap();
    switch.handle_message(conn, &message, 0);
    let _role_reply = switch.take_output(conn);

    send(&mut switch, conn, 4, Kind::FlowMod, &repr, 0);
    assert!(switch.take_output(conn).is_empty());
    assert_eq!(switch.classifier().len(), 1);
}

#[test]
fn port_reconciliation_and_renumbering() {
    let (mut switch, provider, conn) = setup("it-ports-br");
    let other = switch.connect_controller(ConnKind::Primary);

    provider.0.borrow_mut().set_port(port_info(5, "dp0"));
    switch.run(0).unwrap();

    for id in &[conn, other] {
        let output = switch.take_output(*id);
        assert_eq!(output.len(), 1);
        let (kind, _xid, payload) = decode(&output[0]);
        assert_eq!(kind, Kind::PortStatus);
        let status = PortStatusRepr::parse(&payload).unwrap();
        assert_eq!(status.reason, PortReason::Add);
        assert_eq!(status.desc.port_no, 5);
    }
    let by_no = switch.ports().get(5).unwrap().to_phy();
    let by_name = switch.ports().get_by_name("dp0").unwrap().to_phy();
    assert_eq!(by_no, by_name);

    // the datapath renumbers the device
    provider.0.borrow_mut().renumber_port(5, 6);
    switch.run(100).unwrap();

    let output = switch.take_output(conn);
    assert_eq!(output.len(), 2);
    let (_, _, first) = decode(&output[0]);
    let (_, _, second) = decode(&output[1]);
    let first = PortStatusRepr::parse(&first).unwrap();
    let second = PortStatusRepr::parse(&second).unwrap();
    assert_eq!(first.reason, PortReason::Delete);
    assert_eq!(first.desc.port_no, 5);
    assert_eq!(second.reason, PortReason::Add);
    assert_eq!(second.desc.port_no, 6);

    assert!(switch.ports().get(5).is_none());
    assert_eq!(switch.ports().get_by_name("dp0").unwrap().ofp_port, 6);
}

// --- laws ---------------------------------------------------------------

#[test]
fn add_then_add_replaces() {
    let (mut switch, provider, conn) = setup("it-replace-br");
    let repr = flow_mod(
        FlowModCommand::Add,
        ip_match([10, 0, 0, 1], !0),
        100,
        vec![Action::Output { port: 2, max_len: 0 }],
    );
    send(&mut switch, conn, 1, Kind::FlowMod, &repr, 0);
    let first = switch.classifier().lookup(&ip_flow([10, 0, 0, 1])).unwrap();
    provider.0.borrow_mut().record_traffic(first, 10, 1000);

    send(&mut switch, conn, 2, Kind::FlowMod, &repr, 50);
    assert_eq!(switch.classifier().len(), 1);
    assert_eq!(provider.0.borrow().mirrored_rules(), 1);
    let second = switch.classifier().lookup(&ip_flow([10, 0, 0, 1])).unwrap();
    assert_ne!(first, second);
    // the replacement starts from zero: the predecessor's counters are lost
    assert_eq!(provider.0.borrow().rule_get_stats(second).unwrap(), (0, 0));
}

#[test]
fn delete_after_delete_is_noop() {
    let (mut switch, _provider, conn) = setup("it-deldel-br");
    let add = flow_mod(
        FlowModCommand::Add,
        ip_match([10, 0, 0, 1], !0),
        100,
        vec![Action::Output { port: 2, max_len: 0 }],
    );
    send(&mut switch, conn, 1, Kind::FlowMod, &add, 0);

    let delete = flow_mod(FlowModCommand::Delete, ip_match([10, 0, 0, 1], !0), 0, vec![]);
    send(&mut switch, conn, 2, Kind::FlowMod, &delete, 0);
    assert_eq!(switch.classifier().len(), 0);
    assert!(switch.take_output(conn).is_empty());

    send(&mut switch, conn, 3, Kind::FlowMod, &delete, 0);
    assert_eq!(switch.classifier().len(), 0);
    assert!(switch.take_output(conn).is_empty());
}

#[test]
fn modify_with_no_match_behaves_as_add() {
    let (mut switch, _provider, conn) = setup("it-modadd-br");
    let modify = flow_mod(
        FlowModCommand::Modify,
        ip_match([10, 0, 0, 1], !0),
        100,
        vec![Action::Output { port: 2, max_len: 0 }],
    );
    send(&mut switch, conn, 1, Kind::FlowMod, &modify, 0);
    assert!(switch.take_output(conn).is_empty());
    assert_eq!(switch.classifier().len(), 1);
    let id = switch.classifier().lookup(&ip_flow([10, 0, 0, 1])).unwrap();
    assert_eq!(switch.classifier().get(id).unwrap().priority, 100);
}

#[test]
fn modify_loose_replaces_actions() {
    let (mut switch, _provider, conn) = setup("it-modify-br");
    let add = flow_mod(
        FlowModCommand::Add,
        ip_match([10, 0, 0, 1], !0),
        100,
        vec![Action::Output { port: 2, max_len: 0 }],
    );
    send(&mut switch, conn, 1, Kind::FlowMod, &add, 0);

    let mut modify = flow_mod(
        FlowModCommand::Modify,
        ip_match([10, 0, 0, 0], 0xffff_ff00),
        0,
        vec![Action::Output { port: 3, max_len: 0 }],
    );
    modify.cookie = 7;
    send(&mut switch, conn, 2, Kind::FlowMod, &modify, 0);
    assert_eq!(switch.classifier().len(), 1);
    let id = switch.classifier().lookup(&ip_flow([10, 0, 0, 1])).unwrap();
    let rule = switch.classifier().get(id).unwrap();
    assert_eq!(rule.actions.applied, vec![Action::Output { port: 3, max_len: 0 }]);
    assert_eq!(rule.cookie, 7);
    // priority untouched by a loose modify
    assert_eq!(rule.priority, 100);
}

// --- boundaries ---------------------------------------------------------

#[test]
fn reserved_port_rejected_on_port_mod() {
    let (mut switch, _provider, conn) = setup("it-portmod-br");
    let repr = PortModRepr {
        port_no: 0xff05,
        hw_addr: EthernetAddress::from_bytes(&[0, 0, 0, 0, 0, 0]),
        config: PortConfig::empty(),
        mask: PortConfig::empty(),
        advertise: PortFeatures::empty(),
    };
    send(&mut switch, conn, 1, Kind::PortMod, &repr, 0);
    assert_eq!(
        expect_error(&mut switch, conn),
        OfError::PortModFailed(PortModFailedCode::BadPort)
    );
}

#[test]
fn stats_on_unknown_table_id_is_empty_not_error() {
    let (mut switch, _provider, conn) = setup("it-tableid-br");
    let add = flow_mod(
        FlowModCommand::Add,
        ip_match([10, 0, 0, 1], !0),
        100,
        vec![Action::Output { port: 2, max_len: 0 }],
    );
    send(&mut switch, conn, 1, Kind::FlowMod, &add, 0);

    for &(table_id, expect_entries) in &[(0u8, true), (0xff, true), (5, false)] {
        let request = stats::FlowStatsRequestRepr {
            match_: Match::catch_all(),
            table_id,
            out_port: OFPP_NONE,
        };
        let mut body = vec![0; stats::STATS_HEADER_LEN + request.buffer_len()];
        stats::emit_header(&mut body, StatsKind::Flow, 0);
        request.emit(&mut body[stats::STATS_HEADER_LEN..]).unwrap();
        let message = compose(V10, Kind::StatsRequest, 9, &body).unwrap();
        switch.handle_message(conn, &message, 0);

        let output = switch.take_output(conn);
        assert_eq!(output.len(), 1);
        let (kind, xid, payload) = decode(&output[0]);
        assert_eq!(kind, Kind::StatsReply);
        assert_eq!(xid, 9);
        let (stats_kind, flags, entries) = stats::parse_header(&payload).unwrap();
        assert_eq!(stats_kind, StatsKind::Flow);
        assert_eq!(flags, 0);
        if expect_entries {
            let (entry, len) = FlowStatsEntryRepr::parse_entry(entries).unwrap();
            assert_eq!(len, entries.len());
            assert_eq!(entry.priority, 100);
        } else {
            assert!(entries.is_empty());
        }
    }
}

#[test]
fn hidden_rules_stay_hidden() {
    let (mut switch, _provider, conn) = setup("it-hidden-br");
    switch
        .install_hidden_flow(
            ip_match([10, 0, 0, 1], !0),
            0x10000,
            ActionList::apply(vec![Action::Output { port: 1, max_len: 0 }]),
            0,
        )
        .unwrap();
    assert_eq!(switch.classifier().len(), 1);

    // loose delete-everything from a controller leaves it alone
    let delete = flow_mod(FlowModCommand::Delete, Match::catch_all(), 0, vec![]);
    send(&mut switch, conn, 1, Kind::FlowMod, &delete, 0);
    assert_eq!(switch.classifier().len(), 1);

    // flow stats do not show it
    let request = stats::FlowStatsRequestRepr {
        match_: Match::catch_all(),
        table_id: 0xff,
        out_port: OFPP_NONE,
    };
    let mut body = vec![0; stats::STATS_HEADER_LEN + request.buffer_len()];
    stats::emit_header(&mut body, StatsKind::Flow, 0);
    request.emit(&mut body[stats::STATS_HEADER_LEN..]).unwrap();
    let message = compose(V10, Kind::StatsRequest, 2, &body).unwrap();
    switch.handle_message(conn, &message, 0);
    let output = switch.take_output(conn);
    let (_, _, payload) = decode(&output[0]);
    let (_, _, entries) = stats::parse_header(&payload).unwrap();
    assert!(entries.is_empty());

    // but it is looked up like any other rule
    assert!(switch.classifier().lookup(&ip_flow([10, 0, 0, 1])).is_some());
}

// --- dispatcher plumbing -------------------------------------------------

#[test]
fn echo_mirrors_payload() {
    let (mut switch, _provider, conn) = setup("it-echo-br");
    let message = compose(V10, Kind::EchoRequest, 77, &[1, 2, 3, 4]).unwrap();
    switch.handle_message(conn, &message, 0);
    let output = switch.take_output(conn);
    assert_eq!(output.len(), 1);
    let (kind, xid, payload) = decode(&output[0]);
    assert_eq!(kind, Kind::EchoReply);
    assert_eq!(xid, 77);
    assert_eq!(payload, vec![1, 2, 3, 4]);
}

#[test]
fn barrier_replies_immediately() {
    let (mut switch, _provider, conn) = setup("it-barrier-br");
    let message = compose(V10, Kind::BarrierRequest, 5, &[]).unwrap();
    switch.handle_message(conn, &message, 0);
    let output = switch.take_output(conn);
    assert_eq!(output.len(), 1);
    let (kind, xid, _) = decode(&output[0]);
    assert_eq!(kind, Kind::BarrierReply);
    assert_eq!(xid, 5);
}

#[test]
fn packet_in_then_buffered_packet_out() {
    let (mut switch, provider, conn) = setup("it-pktio-br");
    let frame = vec![0xaa; 300];
    provider
        .0
        .borrow_mut()
        .punt_packet(1, UpcallReason::NoMatch, frame.clone());
    switch.run(0).unwrap();

    let output = switch.take_output(conn);
    assert_eq!(output.len(), 1);
    let (kind, _, payload) = decode(&output[0]);
    assert_eq!(kind, Kind::PacketIn);
    let packet_in = PacketInRepr::parse(&payload).unwrap();
    assert_eq!(packet_in.total_len, 300);
    assert_eq!(packet_in.in_port, 1);
    // truncated to the default miss_send_len
    assert_eq!(packet_in.data.len(), 128);
    assert_ne!(packet_in.buffer_id, NO_BUFFER);

    // release the buffered packet through the flow table
    let out = PacketOutRepr {
        buffer_id: packet_in.buffer_id,
        in_port: 1,
        actions: vec![Action::Output { port: 2, max_len: 0 }],
        data: vec![],
    };
    send(&mut switch, conn, 3, Kind::PacketOut, &out, 0);
    assert!(switch.take_output(conn).is_empty());
    let provider_ref = provider.0.borrow();
    assert_eq!(provider_ref.executed.len(), 1);
    assert_eq!(provider_ref.executed[0].1, frame);
}

#[test]
fn malformed_flow_mod_affects_nothing_else() {
    let (mut switch, _provider, conn) = setup("it-malformed-br");
    // flow-mod truncated in the middle of the match
    let message = compose(V10, Kind::FlowMod, 9, &[0u8; 20]).unwrap();
    switch.handle_message(conn, &message, 0);
    assert_eq!(
        expect_error(&mut switch, conn),
        OfError::BadRequest(BadRequestCode::BadLen)
    );
    assert_eq!(switch.classifier().len(), 0);

    // the connection still works
    let message = compose(V10, Kind::BarrierRequest, 10, &[]).unwrap();
    switch.handle_message(conn, &message, 0);
    assert_eq!(switch.take_output(conn).len(), 1);
}

#[test]
fn device_gone_is_fatal() {
    let (mut switch, provider, _conn) = setup("it-gone-br");
    provider.0.borrow_mut().set_device_gone();
    match switch.run(0) {
        Err(Error::Io(ofswitch::IoKind::DeviceGone)) => {}
        other => panic!("expected device-gone, got {:?}", other),
    }
}

#[test]
fn admin_list_has_status_200() {
    let (switch, _provider, _conn) = setup("it-admin-br");
    let (status, body) = admin_list();
    assert_eq!(status, 200);
    assert!(body.lines().any(|line| line == "it-admin-br"));
    drop(switch);
}
