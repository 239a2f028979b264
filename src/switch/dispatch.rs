//! The message dispatcher: decode one controller message, authorize it,
//! route it to a handler, and frame the replies.
//!
//! Handlers are synchronous; every message is fully handled (including
//! its replies being queued) before the next one is looked at, which is
//! what makes the immediate barrier reply correct. A handler failure
//! turns into exactly one error reply to the offending connection,
//! carrying the xid and the first 64 bytes of the offending message;
//! other connections and the flow table are unaffected.

use byteorder::{ByteOrder, NetworkEndian};

use {Error, IoKind, Repr, Result};
use actions::{Action, ActionList};
use classifier::RuleId;
use port::PortEvent;
use provider::UpcallReason;
use rule::Rule;
use wire::{compose, compose_repr, compose_vendor};
use wire::error_msg::{
    self, BadActionCode, BadRequestCode, ErrorMsgRepr, FlowModFailedCode, HelloFailedCode,
    OfError, PortModFailedCode, QueueOpFailedCode,
};
use wire::flow_mod::{
    FlowModCommand, FlowModFlags, FlowModRepr, FlowRemovedRepr, RemovedReason, NO_BUFFER,
};
use wire::handshake::{ActionCaps, Capabilities, FeaturesReplyRepr, FragPolicy, SwitchConfigRepr};
use wire::openflow::{Kind, Packet, Version};
use wire::packet_io::{PacketInReason, PacketInRepr, PacketOutRepr};
use wire::port_msg::{
    PhyPortRepr, PortModRepr, PortReason, PortStatusRepr, OFPP_LOCAL, OFPP_MAX, OFPP_NONE,
};
use wire::stats::{
    self, AggregateStatsRepr, FlowStatsEntryRepr, FlowStatsRequestRepr, PortStatsEntryRepr,
    PortStatsRequestRepr, ReplyChunker, StatsKind, TableStatsEntryRepr,
};
use wire::vendor::{
    self, FlowFormat, FlowModTableIdRepr, NxFlowStatsEntryRepr, NxPacketInRepr, NxRole,
    PacketInFormat, RoleRepr, SetAsyncConfigRepr, SetControllerIdRepr, SetFlowFormatRepr,
    SetPacketInFormatRepr,
};

use super::connection;
use super::{ConnId, ConnKind, Switch};

/// How many bytes of the offending message an error reply carries.
const ERROR_DATA_LEN: usize = 64;

/// Buffers advertised in the features reply.
const N_BUFFERS: u32 = 256;

impl Switch {
    /// Handle one complete inbound message from a controller connection.
    /// Never fails outward: handler errors become error replies on the
    /// same connection.
    pub fn handle_message(&mut self, conn_id: ConnId, buffer: &[u8], now_ms: u64) {
        if self.conns.get(conn_id).is_none() {
            rl_warn!(self.rl_flow_mod, "message for unknown connection");
            return;
        }
        if let Err(err) = self.dispatch(conn_id, buffer, now_ms) {
            self.send_error_reply(conn_id, buffer, err);
        }
    }

    fn dispatch(&mut self, conn_id: ConnId, buffer: &[u8], now_ms: u64) -> Result<()> {
        let packet = Packet::new_checked(buffer)?;
        let version = packet.version();
        let raw_kind = packet.raw_kind();
        let xid = packet.xid();

        // HELLO is the one message read before the version gate: it is
        // what picks the version.
        if raw_kind == 0 {
            return self.handle_hello(conn_id, version);
        }
        if !self.enabled_versions.contains(&version) {
            return Err(Error::of(OfError::BadRequest(BadRequestCode::BadVersion)));
        }
        let kind = Kind::from_wire(version, raw_kind)?;
        let payload = packet.payload();

        match kind {
            Kind::FlowMod | Kind::PortMod | Kind::PacketOut | Kind::SetConfig => {
                self.check_writable(conn_id)?;
            }
            _ => {}
        }

        match kind {
            Kind::Hello => Ok(()),
            Kind::Error => {
                // Controllers may report errors back; they are logged and
                // otherwise ignored.
                debug!("error message from controller (xid {})", xid);
                Ok(())
            }
            Kind::EchoRequest => self.reply(conn_id, version, Kind::EchoReply, xid, payload),
            Kind::EchoReply => Ok(()),
            Kind::FeaturesRequest => self.handle_features_request(conn_id, version, xid),
            Kind::GetConfigRequest => self.handle_get_config_request(conn_id, version, xid),
            Kind::SetConfig => self.handle_set_config(conn_id, payload),
            Kind::PacketOut => self.handle_packet_out(conn_id, payload),
            Kind::FlowMod => self.handle_of10_flow_mod(conn_id, payload, now_ms),
            Kind::PortMod => self.handle_port_mod(payload),
            Kind::StatsRequest => self.handle_stats_request(conn_id, version, xid, payload, now_ms),
            Kind::BarrierRequest => self.reply(conn_id, version, Kind::BarrierReply, xid, &[]),
            Kind::QueueGetConfigRequest => {
                self.handle_queue_get_config(conn_id, version, xid, payload)
            }
            Kind::RoleRequest => self.handle_role_request(conn_id, version, xid, payload),
            Kind::Vendor => self.handle_vendor(conn_id, version, xid, payload, now_ms),
            // Replies and asynchronous messages have no business arriving
            // at a switch, and OF1.1-only table/group machinery is not
            // supported on this datapath.
            Kind::FeaturesReply
            | Kind::GetConfigReply
            | Kind::PacketIn
            | Kind::FlowRemoved
            | Kind::PortStatus
            | Kind::StatsReply
            | Kind::BarrierReply
            | Kind::QueueGetConfigReply
            | Kind::RoleReply
            | Kind::GroupMod
            | Kind::TableMod => {
                Err(Error::of(OfError::BadRequest(BadRequestCode::BadType)))
            }
        }
    }

    fn reply(
        &mut self,
        conn_id: ConnId,
        version: Version,
        kind: Kind,
        xid: u32,
        body: &[u8],
    ) -> Result<()> {
        let message = compose(version, kind, xid, body)?;
        self.send_to(conn_id, message);
        Ok(())
    }

    fn send_to(&mut self, conn_id: ConnId, message: Vec<u8>) {
        if let Some(conn) = self.conns.get_mut(conn_id) {
            conn.send(message);
        }
    }

    fn check_writable(&self, conn_id: ConnId) -> Result<()> {
        let conn = self
            .conns
            .get(conn_id)
            .ok_or(Error::Io(IoKind::Other))?;
        if conn.kind == ConnKind::Primary && conn.role == NxRole::Slave {
            return Err(Error::of(OfError::BadRequest(BadRequestCode::Eperm)));
        }
        Ok(())
    }

    fn send_error_reply(&mut self, conn_id: ConnId, offending: &[u8], err: Error) {
        let version = self
            .conns
            .get(conn_id)
            .map(|conn| conn.version)
            .unwrap_or(Version::OpenFlow1Dot0);
        let xid = if offending.len() >= 8 {
            NetworkEndian::read_u32(&offending[4..8])
        } else {
            0
        };
        let data_len = offending.len().min(ERROR_DATA_LEN);
        let repr = ErrorMsgRepr {
            error: error_msg::normalize(err),
            data: offending[..data_len].to_vec(),
        };
        let mut body = vec![0; repr.buffer_len()];
        if repr.emit(version, &mut body).is_err() {
            return;
        }
        if let Ok(message) = compose(version, Kind::Error, xid, &body) {
            self.send_to(conn_id, message);
        }
    }

    // --- handshake ------------------------------------------------------

    fn handle_hello(&mut self, conn_id: ConnId, peer: Version) -> Result<()> {
        let highest = self
            .enabled_versions
            .iter()
            .cloned()
            .max_by_key(|v| u8::from(*v))
            .unwrap_or(Version::OpenFlow1Dot0);
        let negotiated = if u8::from(peer) < u8::from(highest) {
            peer
        } else {
            highest
        };
        if !self.enabled_versions.contains(&negotiated) {
            return Err(Error::of(OfError::HelloFailed(
                HelloFailedCode::Incompatible,
            )));
        }
        if let Some(conn) = self.conns.get_mut(conn_id) {
            conn.version = negotiated;
        }
        Ok(())
    }

    fn handle_features_request(
        &mut self,
        conn_id: ConnId,
        version: Version,
        xid: u32,
    ) -> Result<()> {
        let repr = FeaturesReplyRepr {
            datapath_id: self.datapath_id(),
            n_buffers: N_BUFFERS,
            n_tables: 1,
            capabilities: Capabilities::FLOW_STATS
                | Capabilities::TABLE_STATS
                | Capabilities::PORT_STATS
                | Capabilities::ARP_MATCH_IP,
            actions: ActionCaps::all(),
            ports: self.ports.iter_sorted().iter().map(|p| p.to_phy()).collect(),
        };
        let message = compose_repr(version, Kind::FeaturesReply, xid, &repr)?;
        self.send_to(conn_id, message);
        Ok(())
    }

    fn handle_get_config_request(
        &mut self,
        conn_id: ConnId,
        version: Version,
        xid: u32,
    ) -> Result<()> {
        let flags = if self.provider.get_drop_frags() {
            FragPolicy::Drop.into()
        } else {
            FragPolicy::Normal.into()
        };
        let miss_send_len = self
            .conns
            .get(conn_id)
            .map(|conn| conn.miss_send_len)
            .unwrap_or(connection::DEFAULT_MISS_SEND_LEN);
        let repr = SwitchConfigRepr {
            flags,
            miss_send_len,
        };
        let message = compose_repr(version, Kind::GetConfigReply, xid, &repr)?;
        self.send_to(conn_id, message);
        Ok(())
    }

    fn handle_set_config(&mut self, conn_id: ConnId, payload: &[u8]) -> Result<()> {
        let repr = SwitchConfigRepr::parse(payload)?;
        match repr.frag_policy() {
            FragPolicy::Normal => self.provider.set_drop_frags(false),
            FragPolicy::Drop => self.provider.set_drop_frags(true),
            FragPolicy::Reassemble | FragPolicy::_Unknown(_) => {
                rl_warn!(
                    self.rl_flow_mod,
                    "unsupported fragment handling policy {:?} ignored",
                    repr.frag_policy()
                );
            }
        }
        if let Some(conn) = self.conns.get_mut(conn_id) {
            conn.miss_send_len = repr.miss_send_len;
        }
        Ok(())
    }

    // --- flow mods ------------------------------------------------------

    fn handle_of10_flow_mod(
        &mut self,
        conn_id: ConnId,
        payload: &[u8],
        now_ms: u64,
    ) -> Result<()> {
        let mut repr = FlowModRepr::parse(payload)?;
        let flow_format = self
            .conns
            .get(conn_id)
            .map(|conn| conn.flow_format)
            .unwrap_or(FlowFormat::OpenFlow10);
        if flow_format == FlowFormat::TunIdFromCookie {
            let tun_id = repr.cookie >> 32;
            repr.match_.set_tun_id(tun_id, !0);
            repr.cookie &= 0xffff_ffff;
        }
        self.apply_flow_mod(conn_id, repr, 0, now_ms)
    }

    fn apply_flow_mod(
        &mut self,
        conn_id: ConnId,
        repr: FlowModRepr,
        table_id: u8,
        now_ms: u64,
    ) -> Result<()> {
        if repr.flags.contains(FlowModFlags::EMERG) {
            rl_warn!(
                self.rl_flow_mod,
                "emergency flow table is not implemented; flag ignored"
            );
        }
        if table_id != 0 && table_id != 0xff {
            return Err(Error::of(OfError::FlowModFailed(
                FlowModFailedCode::BadTableId,
            )));
        }
        match repr.command {
            FlowModCommand::Add => self.flow_add(conn_id, repr, now_ms),
            FlowModCommand::Modify => self.flow_modify(conn_id, repr, now_ms, false),
            FlowModCommand::ModifyStrict => self.flow_modify(conn_id, repr, now_ms, true),
            FlowModCommand::Delete => self.flow_delete(repr, now_ms, false),
            FlowModCommand::DeleteStrict => self.flow_delete(repr, now_ms, true),
            FlowModCommand::_Unknown(_) => Err(Error::of(OfError::FlowModFailed(
                FlowModFailedCode::BadCommand,
            ))),
        }
    }

    fn validate_out_actions(&self, actions: &ActionList) -> Result<()> {
        for action in actions.applied.iter().chain(actions.written.iter()) {
            let port = match *action {
                Action::Output { port, .. } => port,
                Action::Enqueue { port, .. } => port,
                _ => continue,
            };
            if port < OFPP_MAX && self.ports.get(port).is_none() {
                return Err(Error::of(OfError::BadAction(BadActionCode::BadOutPort)));
            }
        }
        Ok(())
    }

    fn map_provider_error(err: Error) -> Error {
        match err {
            Error::Io(IoKind::Unsupported) => {
                Error::of(OfError::FlowModFailed(FlowModFailedCode::Unsupported))
            }
            Error::Io(_) => Error::of(OfError::FlowModFailed(FlowModFailedCode::Eperm)),
            other => other,
        }
    }

    fn flow_add(&mut self, conn_id: ConnId, repr: FlowModRepr, now_ms: u64) -> Result<()> {
        self.validate_out_actions(&repr.actions)?;
        let priority = u32::from(repr.priority);
        if repr.flags.contains(FlowModFlags::CHECK_OVERLAP)
            && self.classifier.overlaps(&repr.match_, priority)
        {
            return Err(Error::of(OfError::FlowModFailed(FlowModFailedCode::Overlap)));
        }
        let mut rule = Rule::new(repr.match_, priority, now_ms);
        rule.cookie = repr.cookie;
        rule.idle_timeout = repr.idle_timeout;
        rule.hard_timeout = repr.hard_timeout;
        rule.send_flow_removed = repr.flags.contains(FlowModFlags::SEND_FLOW_REM);
        rule.actions = repr.actions.clone();
        let id = self
            .install_flow(rule, now_ms)
            .map_err(Self::map_provider_error)?;
        self.execute_buffered(conn_id, repr.buffer_id, id)
    }

    fn execute_buffered(&mut self, conn_id: ConnId, buffer_id: u32, rule: RuleId) -> Result<()> {
        if buffer_id == NO_BUFFER {
            return Ok(());
        }
        let buffered = match self.conns.get_mut(conn_id) {
            Some(conn) => conn.buffers.retrieve(buffer_id)?,
            None => return Ok(()),
        };
        self.provider
            .rule_execute(rule, buffered.in_port, &buffered.data)
            .map_err(Self::map_provider_error)
    }

    /// Non-hidden rules subsumed by the request match (loose) or exactly
    /// matching it (strict), with the delete-style out_port filter.
    fn collect_flow_mod_targets(
        &self,
        repr: &FlowModRepr,
        strict: bool,
        out_port: u16,
    ) -> Vec<RuleId> {
        let candidates = if strict {
            self.classifier
                .find_exactly(&repr.match_, u32::from(repr.priority))
                .into_iter()
                .collect()
        } else {
            self.classifier.cursor(&repr.match_)
        };
        candidates
            .into_iter()
            .filter(|id| match self.classifier.get(*id) {
                Some(rule) => {
                    !rule.is_hidden()
                        && (out_port == OFPP_NONE || rule_outputs_to(rule, out_port))
                }
                None => false,
            })
            .collect()
    }

    fn flow_modify(
        &mut self,
        conn_id: ConnId,
        repr: FlowModRepr,
        now_ms: u64,
        strict: bool,
    ) -> Result<()> {
        self.validate_out_actions(&repr.actions)?;
        let targets = self.collect_flow_mod_targets(&repr, strict, OFPP_NONE);
        if targets.is_empty() {
            // modifying nothing is an add at the request's priority
            return self.flow_add(conn_id, repr, now_ms);
        }
        for id in &targets {
            let changed = match self.classifier.get(*id) {
                Some(rule) => rule.actions != repr.actions,
                None => continue,
            };
            if changed {
                self.provider
                    .rule_modify_actions(*id, &repr.actions)
                    .map_err(Self::map_provider_error)?;
            }
            if let Some(rule) = self.classifier.get_mut(*id) {
                if changed {
                    rule.actions = repr.actions.clone();
                }
                rule.cookie = repr.cookie;
            }
        }
        self.execute_buffered(conn_id, repr.buffer_id, targets[0])
    }

    fn flow_delete(&mut self, repr: FlowModRepr, now_ms: u64, strict: bool) -> Result<()> {
        let targets = self.collect_flow_mod_targets(&repr, strict, repr.out_port);
        for id in targets {
            self.remove_rule(id, RemovedReason::Delete, now_ms);
        }
        Ok(())
    }

    // --- packet out / port mod / queues --------------------------------

    fn handle_packet_out(&mut self, conn_id: ConnId, payload: &[u8]) -> Result<()> {
        let repr = PacketOutRepr::parse(payload)?;
        let actions = ActionList::apply(repr.actions.clone());
        self.validate_out_actions(&actions)?;
        let (data, in_port) = if repr.buffer_id != NO_BUFFER {
            let buffered = match self.conns.get_mut(conn_id) {
                Some(conn) => conn.buffers.retrieve(repr.buffer_id)?,
                None => return Ok(()),
            };
            (buffered.data, repr.in_port)
        } else {
            (repr.data.clone(), repr.in_port)
        };
        self.provider
            .packet_out(&data, in_port, &actions)
            .map_err(Self::map_provider_error)
    }

    fn handle_port_mod(&mut self, payload: &[u8]) -> Result<()> {
        let repr = PortModRepr::parse(payload)?;
        if repr.port_no >= OFPP_MAX && repr.port_no != OFPP_LOCAL {
            return Err(Error::of(OfError::PortModFailed(PortModFailedCode::BadPort)));
        }
        let port = match self.ports.get_mut(repr.port_no) {
            Some(port) => port,
            None => {
                return Err(Error::of(OfError::PortModFailed(
                    PortModFailedCode::BadPort,
                )))
            }
        };
        if port.hw_addr != repr.hw_addr {
            return Err(Error::of(OfError::PortModFailed(
                PortModFailedCode::BadHwAddr,
            )));
        }
        port.config = (port.config & !repr.mask) | (repr.config & repr.mask);
        Ok(())
    }

    fn handle_queue_get_config(
        &mut self,
        conn_id: ConnId,
        version: Version,
        xid: u32,
        payload: &[u8],
    ) -> Result<()> {
        if payload.len() < 2 {
            return Err(Error::Truncated);
        }
        let port = NetworkEndian::read_u16(&payload[0..2]);
        if port >= OFPP_MAX && port != OFPP_LOCAL {
            return Err(Error::of(OfError::QueueOpFailed(QueueOpFailedCode::BadPort)));
        }
        if port != OFPP_LOCAL && self.ports.get(port).is_none() {
            return Err(Error::of(OfError::QueueOpFailed(QueueOpFailedCode::BadPort)));
        }
        // no queue configuration on this datapath: empty queue list
        let mut body = vec![0; 8];
        NetworkEndian::write_u16(&mut body[0..2], port);
        self.reply(conn_id, version, Kind::QueueGetConfigReply, xid, &body)
    }

    // --- roles ----------------------------------------------------------

    fn handle_role_request(
        &mut self,
        conn_id: ConnId,
        version: Version,
        xid: u32,
        payload: &[u8],
    ) -> Result<()> {
        // OF1.2 role request: role (u32), pad, generation id (u64).
        if payload.len() < 16 {
            return Err(Error::Truncated);
        }
        let requested = NetworkEndian::read_u32(&payload[0..4]);
        let generation = NetworkEndian::read_u64(&payload[8..16]);
        let new_role = match requested {
            0 => None, // NOCHANGE
            1 => Some(NxRole::Other),
            2 => Some(NxRole::Master),
            3 => Some(NxRole::Slave),
            _ => {
                return Err(Error::of(OfError::BadRequest(BadRequestCode::Eperm)));
            }
        };
        if let Some(role) = new_role {
            self.conns.set_role(conn_id, role);
        }
        let current = self
            .conns
            .get(conn_id)
            .map(|conn| conn.role)
            .unwrap_or(NxRole::Other);
        let wire_role = match current {
            NxRole::Other => 1,
            NxRole::Master => 2,
            NxRole::Slave => 3,
            NxRole::_Unknown(_) => 1,
        };
        let mut body = vec![0; 16];
        NetworkEndian::write_u32(&mut body[0..4], wire_role);
        NetworkEndian::write_u64(&mut body[8..16], generation);
        self.reply(conn_id, version, Kind::RoleReply, xid, &body)
    }

    // --- vendor extensions ----------------------------------------------

    fn handle_vendor(
        &mut self,
        conn_id: ConnId,
        version: Version,
        xid: u32,
        payload: &[u8],
        now_ms: u64,
    ) -> Result<()> {
        let (subtype, body) = vendor::parse_header(payload)?;
        match subtype {
            vendor::NXT_ROLE_REQUEST => {
                let repr = RoleRepr::parse(body)?;
                if let NxRole::_Unknown(_) = repr.0 {
                    return Err(Error::of(OfError::BadRequest(BadRequestCode::Eperm)));
                }
                self.conns.set_role(conn_id, repr.0);
                let reply = RoleRepr(
                    self.conns
                        .get(conn_id)
                        .map(|conn| conn.role)
                        .unwrap_or(NxRole::Other),
                );
                let mut reply_body = vec![0; reply.buffer_len()];
                reply.emit(&mut reply_body)?;
                let message =
                    compose_vendor(version, xid, vendor::NXT_ROLE_REPLY, &reply_body)?;
                self.send_to(conn_id, message);
                Ok(())
            }
            vendor::NXT_SET_FLOW_FORMAT => {
                let repr = SetFlowFormatRepr::parse(body)?;
                if let FlowFormat::_Unknown(_) = repr.0 {
                    return Err(Error::of(OfError::BadRequest(BadRequestCode::Eperm)));
                }
                if let Some(conn) = self.conns.get_mut(conn_id) {
                    conn.flow_format = repr.0;
                }
                Ok(())
            }
            vendor::NXT_SET_PACKET_IN_FORMAT => {
                let repr = SetPacketInFormatRepr::parse(body)?;
                if let PacketInFormat::_Unknown(_) = repr.0 {
                    return Err(Error::of(OfError::BadRequest(BadRequestCode::Eperm)));
                }
                if let Some(conn) = self.conns.get_mut(conn_id) {
                    conn.packet_in_format = repr.0;
                }
                Ok(())
            }
            vendor::NXT_FLOW_MOD_TABLE_ID => {
                let repr = FlowModTableIdRepr::parse(body)?;
                if let Some(conn) = self.conns.get_mut(conn_id) {
                    conn.flow_mod_table_id = repr.0;
                }
                Ok(())
            }
            vendor::NXT_SET_CONTROLLER_ID => {
                let repr = SetControllerIdRepr::parse(body)?;
                if let Some(conn) = self.conns.get_mut(conn_id) {
                    conn.controller_id = repr.0;
                }
                Ok(())
            }
            vendor::NXT_SET_ASYNC_CONFIG => {
                let repr = SetAsyncConfigRepr::parse(body)?;
                if let Some(conn) = self.conns.get_mut(conn_id) {
                    conn.async_config.packet_in_mask = repr.packet_in_mask;
                    conn.async_config.port_status_mask = repr.port_status_mask;
                    conn.async_config.flow_removed_mask = repr.flow_removed_mask;
                }
                Ok(())
            }
            vendor::NXT_FLOW_AGE => Ok(()),
            vendor::NXT_FLOW_MOD => {
                self.check_writable(conn_id)?;
                let (repr, wire_table_id) = vendor::parse_nx_flow_mod(body)?;
                let table_id = match self.conns.get(conn_id) {
                    Some(conn) if conn.flow_mod_table_id => wire_table_id,
                    _ => 0,
                };
                self.apply_flow_mod(conn_id, repr, table_id, now_ms)
            }
            _ => Err(Error::of(OfError::BadRequest(BadRequestCode::BadSubtype))),
        }
    }

    // --- statistics -----------------------------------------------------

    fn handle_stats_request(
        &mut self,
        conn_id: ConnId,
        version: Version,
        xid: u32,
        payload: &[u8],
        now_ms: u64,
    ) -> Result<()> {
        let (kind, _flags, body) = stats::parse_header(payload)?;
        match kind {
            StatsKind::Desc => {
                let desc = self.descriptions.clone();
                self.send_single_stats_reply(conn_id, version, xid, StatsKind::Desc, &desc)
            }
            StatsKind::Flow => self.handle_flow_stats(conn_id, version, xid, body, now_ms),
            StatsKind::Aggregate => {
                self.handle_aggregate_stats(conn_id, version, xid, body, None)
            }
            StatsKind::Table => self.handle_table_stats(conn_id, version, xid),
            StatsKind::Port => self.handle_port_stats(conn_id, version, xid, body),
            StatsKind::Vendor => self.handle_vendor_stats(conn_id, version, xid, body, now_ms),
            StatsKind::Queue | StatsKind::_Unknown(_) => {
                Err(Error::of(OfError::BadRequest(BadRequestCode::BadStat)))
            }
        }
    }

    fn send_single_stats_reply<R: Repr>(
        &mut self,
        conn_id: ConnId,
        version: Version,
        xid: u32,
        kind: StatsKind,
        body: &R,
    ) -> Result<()> {
        let mut payload = vec![0; stats::STATS_HEADER_LEN + body.buffer_len()];
        stats::emit_header(&mut payload, kind, 0);
        body.emit(&mut payload[stats::STATS_HEADER_LEN..])?;
        self.reply(conn_id, version, Kind::StatsReply, xid, &payload)
    }

    /// Stats requests address tables by id; only 0 ("the" classifier) and
    /// 0xff ("all tables") select anything. Other ids produce an empty
    /// result, not an error, because controllers probe freely.
    fn table_selects_flows(&mut self, table_id: u8) -> bool {
        if table_id == 0 || table_id == 0xff {
            true
        } else {
            rl_warn!(self.rl_table_id, "unknown table id {} in stats request", table_id);
            false
        }
    }

    fn collect_stats_targets(
        &mut self,
        match_: &::flow::Match,
        table_id: u8,
        out_port: u16,
    ) -> Vec<RuleId> {
        if !self.table_selects_flows(table_id) {
            return Vec::new();
        }
        let ids: Vec<RuleId> = self
            .classifier
            .cursor(match_)
            .into_iter()
            .filter(|id| match self.classifier.get(*id) {
                Some(rule) => {
                    !rule.is_hidden()
                        && (out_port == OFPP_NONE || rule_outputs_to(rule, out_port))
                }
                None => false,
            })
            .collect();
        for id in &ids {
            self.refresh_rule_stats(*id);
        }
        ids
    }

    fn present_cookie(&self, conn_id: ConnId, rule: &Rule) -> u64 {
        let tun_from_cookie = self
            .conns
            .get(conn_id)
            .map(|conn| conn.flow_format == FlowFormat::TunIdFromCookie)
            .unwrap_or(false);
        if tun_from_cookie && rule.match_.wildcards().tun_id == !0 {
            rule.cookie | rule.match_.flow().tun_id << 32
        } else {
            rule.cookie
        }
    }

    fn handle_flow_stats(
        &mut self,
        conn_id: ConnId,
        version: Version,
        xid: u32,
        body: &[u8],
        now_ms: u64,
    ) -> Result<()> {
        let request = FlowStatsRequestRepr::parse(body)?;
        let targets = self.collect_stats_targets(&request.match_, request.table_id, request.out_port);
        let mut chunker = ReplyChunker::new(version, xid, StatsKind::Flow);
        for id in targets {
            let entry = {
                let rule = match self.classifier.get(id) {
                    Some(rule) => rule,
                    None => continue,
                };
                let (duration_sec, duration_nsec) = rule.duration(now_ms);
                FlowStatsEntryRepr {
                    table_id: 0,
                    match_: rule.match_,
                    duration_sec,
                    duration_nsec,
                    priority: rule.priority as u16,
                    idle_timeout: rule.idle_timeout,
                    hard_timeout: rule.hard_timeout,
                    cookie: self.present_cookie(conn_id, rule),
                    packet_count: rule.packet_count,
                    byte_count: rule.byte_count,
                    actions: rule.actions.clone(),
                }
            };
            let mut bytes = vec![0; entry.entry_len()];
            entry.emit_entry(&mut bytes)?;
            chunker.push(&bytes)?;
        }
        for message in chunker.finish()? {
            self.send_to(conn_id, message);
        }
        Ok(())
    }

    fn handle_aggregate_stats(
        &mut self,
        conn_id: ConnId,
        version: Version,
        xid: u32,
        body: &[u8],
        nx_sub_header: Option<Vec<u8>>,
    ) -> Result<()> {
        let (match_, table_id, out_port) = if nx_sub_header.is_some() {
            let request = vendor::parse_nx_flow_stats_request(body)?;
            (request.match_, request.table_id, request.out_port)
        } else {
            let request = FlowStatsRequestRepr::parse(body)?;
            (request.match_, request.table_id, request.out_port)
        };
        let targets = self.collect_stats_targets(&match_, table_id, out_port);
        let mut totals = AggregateStatsRepr::default();
        for id in targets {
            if let Some(rule) = self.classifier.get(id) {
                totals.packet_count += rule.packet_count;
                totals.byte_count += rule.byte_count;
                totals.flow_count += 1;
            }
        }
        match nx_sub_header {
            Some(sub) => {
                let mut chunker =
                    ReplyChunker::with_sub_header(version, xid, StatsKind::Vendor, sub);
                let mut bytes = vec![0; totals.buffer_len()];
                totals.emit(&mut bytes)?;
                chunker.push(&bytes)?;
                for message in chunker.finish()? {
                    self.send_to(conn_id, message);
                }
                Ok(())
            }
            None => {
                self.send_single_stats_reply(conn_id, version, xid, StatsKind::Aggregate, &totals)
            }
        }
    }

    fn handle_table_stats(&mut self, conn_id: ConnId, version: Version, xid: u32) -> Result<()> {
        let (lookups, matches) = self.provider.table_counters();
        let active = self
            .classifier
            .ids()
            .into_iter()
            .filter(|id| {
                self.classifier
                    .get(*id)
                    .map(|rule| !rule.is_hidden())
                    .unwrap_or(false)
            })
            .count() as u32;
        let entry = TableStatsEntryRepr {
            table_id: 0,
            name: "classifier".to_string(),
            wildcards: ::wire::match10::OFPFW_ALL,
            max_entries: 1_000_000,
            active_count: active,
            lookup_count: lookups,
            matched_count: matches,
        };
        self.send_single_stats_reply(conn_id, version, xid, StatsKind::Table, &entry)
    }

    fn handle_port_stats(
        &mut self,
        conn_id: ConnId,
        version: Version,
        xid: u32,
        body: &[u8],
    ) -> Result<()> {
        let request = PortStatsRequestRepr::parse(body)?;
        let ports: Vec<u16> = if request.port_no == OFPP_NONE {
            self.ports.iter_sorted().iter().map(|p| p.ofp_port).collect()
        } else {
            vec![request.port_no]
        };
        let mut chunker = ReplyChunker::new(version, xid, StatsKind::Port);
        for port_no in ports {
            let counters = self.provider.port_stats(port_no).unwrap_or([!0u64; 12]);
            let entry = PortStatsEntryRepr {
                port_no,
                rx_packets: counters[0],
                tx_packets: counters[1],
                rx_bytes: counters[2],
                tx_bytes: counters[3],
                rx_dropped: counters[4],
                tx_dropped: counters[5],
                rx_errors: counters[6],
                tx_errors: counters[7],
                rx_frame_err: counters[8],
                rx_over_err: counters[9],
                rx_crc_err: counters[10],
                collisions: counters[11],
            };
            let mut bytes = vec![0; entry.buffer_len()];
            entry.emit(&mut bytes)?;
            chunker.push(&bytes)?;
        }
        for message in chunker.finish()? {
            self.send_to(conn_id, message);
        }
        Ok(())
    }

    fn handle_vendor_stats(
        &mut self,
        conn_id: ConnId,
        version: Version,
        xid: u32,
        body: &[u8],
        now_ms: u64,
    ) -> Result<()> {
        if body.len() < 8 {
            return Err(Error::Truncated);
        }
        let vendor_id = NetworkEndian::read_u32(&body[0..4]);
        if vendor_id != ::actions::NX_VENDOR_ID {
            return Err(Error::of(OfError::BadRequest(BadRequestCode::BadVendor)));
        }
        let subtype = NetworkEndian::read_u32(&body[4..8]);
        let sub_header = body[0..8].to_vec();
        let rest = &body[8..];
        match subtype {
            vendor::NXST_FLOW => {
                self.handle_nx_flow_stats(conn_id, version, xid, rest, sub_header, now_ms)
            }
            vendor::NXST_AGGREGATE => {
                self.handle_aggregate_stats(conn_id, version, xid, rest, Some(sub_header))
            }
            _ => Err(Error::of(OfError::BadRequest(BadRequestCode::BadSubtype))),
        }
    }

    fn handle_nx_flow_stats(
        &mut self,
        conn_id: ConnId,
        version: Version,
        xid: u32,
        body: &[u8],
        sub_header: Vec<u8>,
        now_ms: u64,
    ) -> Result<()> {
        let request = vendor::parse_nx_flow_stats_request(body)?;
        let targets = self.collect_stats_targets(&request.match_, request.table_id, request.out_port);
        let dialect = self
            .conns
            .get(conn_id)
            .map(|conn| conn.flow_format.dialect())
            .unwrap_or(::wire::nxm::Dialect::Nxm);
        let mut chunker = ReplyChunker::with_sub_header(version, xid, StatsKind::Vendor, sub_header);
        for id in targets {
            let entry = {
                let rule = match self.classifier.get(id) {
                    Some(rule) => rule,
                    None => continue,
                };
                let (duration_sec, duration_nsec) = rule.duration(now_ms);
                NxFlowStatsEntryRepr {
                    table_id: 0,
                    duration_sec,
                    duration_nsec,
                    priority: rule.priority as u16,
                    idle_timeout: rule.idle_timeout,
                    hard_timeout: rule.hard_timeout,
                    cookie: rule.cookie,
                    packet_count: rule.packet_count,
                    byte_count: rule.byte_count,
                    match_: rule.match_,
                    actions: rule.actions.clone(),
                }
            };
            let bytes = entry.emit_entry(dialect)?;
            chunker.push(&bytes)?;
        }
        for message in chunker.finish()? {
            self.send_to(conn_id, message);
        }
        Ok(())
    }

    // --- asynchronous messages to controllers ---------------------------

    pub(super) fn broadcast_port_events(&mut self, events: &[PortEvent]) {
        for event in events {
            let (reason, desc) = match *event {
                PortEvent::Added(ref phy) => (PortReason::Add, phy.clone()),
                PortEvent::Deleted(ref phy) => (PortReason::Delete, phy.clone()),
                PortEvent::Modified(ref phy) => (PortReason::Modify, phy.clone()),
            };
            self.broadcast_port_status(reason, desc);
        }
    }

    fn broadcast_port_status(&mut self, reason: PortReason, desc: PhyPortRepr) {
        let repr = PortStatusRepr { reason, desc };
        for conn_id in self.conns.ids() {
            let (wants, version) = match self.conns.get(conn_id) {
                Some(conn) => (conn.wants_port_status(reason), conn.version),
                None => continue,
            };
            if !wants {
                continue;
            }
            if let Ok(message) = compose_repr(version, Kind::PortStatus, 0, &repr) {
                self.send_to(conn_id, message);
            }
        }
    }

    pub(super) fn broadcast_flow_removed(
        &mut self,
        rule: &Rule,
        reason: RemovedReason,
        now_ms: u64,
    ) {
        let (duration_sec, duration_nsec) = rule.duration(now_ms);
        for conn_id in self.conns.ids() {
            let (wants, version, flow_format) = match self.conns.get(conn_id) {
                Some(conn) => (
                    conn.wants_flow_removed(reason),
                    conn.version,
                    conn.flow_format,
                ),
                None => continue,
            };
            if !wants {
                continue;
            }
            let repr = FlowRemovedRepr {
                match_: rule.match_,
                cookie: self.present_cookie(conn_id, rule),
                priority: rule.priority as u16,
                reason,
                duration_sec,
                duration_nsec,
                idle_timeout: rule.idle_timeout,
                packet_count: rule.packet_count,
                byte_count: rule.byte_count,
            };
            let message = match flow_format {
                FlowFormat::Nxm | FlowFormat::Oxm => {
                    let body = vendor::emit_nx_flow_removed(&repr, flow_format.dialect());
                    compose_vendor(version, 0, vendor::NXT_FLOW_REMOVED, &body)
                }
                _ => compose_repr(version, Kind::FlowRemoved, 0, &repr),
            };
            if let Ok(message) = message {
                self.send_to(conn_id, message);
            }
        }
    }

    pub(super) fn deliver_packet_in(
        &mut self,
        in_port: u16,
        reason: UpcallReason,
        data: Vec<u8>,
    ) {
        let wire_reason = match reason {
            UpcallReason::NoMatch => PacketInReason::NoMatch,
            UpcallReason::Action => PacketInReason::Action,
        };
        let total_len = data.len() as u16;
        for conn_id in self.conns.ids() {
            let message = {
                let conn = match self.conns.get_mut(conn_id) {
                    Some(conn) => conn,
                    None => continue,
                };
                if !conn.wants_packet_in(wire_reason, 0) {
                    continue;
                }
                let buffer_id = conn.buffers.insert(data.clone(), in_port);
                let mut payload = data.clone();
                if wire_reason == PacketInReason::NoMatch {
                    payload.truncate(conn.miss_send_len as usize);
                }
                match conn.packet_in_format {
                    PacketInFormat::OpenFlow10 | PacketInFormat::_Unknown(_) => {
                        let repr = PacketInRepr {
                            buffer_id,
                            total_len,
                            in_port,
                            reason: wire_reason,
                            data: payload,
                        };
                        compose_repr(conn.version, Kind::PacketIn, 0, &repr)
                    }
                    PacketInFormat::Nxm => {
                        let mut match_ = ::flow::Match::catch_all();
                        match_.set_in_port(in_port);
                        let repr = NxPacketInRepr {
                            buffer_id,
                            total_len,
                            reason: wire_reason,
                            table_id: 0,
                            cookie: 0,
                            match_,
                            data: payload,
                        };
                        let body =
                            vendor::emit_nx_packet_in(&repr, conn.flow_format.dialect());
                        compose_vendor(conn.version, 0, vendor::NXT_PACKET_IN, &body)
                    }
                }
            };
            if let Ok(message) = message {
                self.send_to(conn_id, message);
            }
        }
    }
}

fn rule_outputs_to(rule: &Rule, port: u16) -> bool {
    rule.actions
        .applied
        .iter()
        .chain(rule.actions.written.iter())
        .any(|action| match *action {
            Action::Output { port: p, .. } => p == port,
            Action::Enqueue { port: p, .. } => p == port,
            _ => false,
        })
}
