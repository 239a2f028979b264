//! Nicira vendor-extension messages (vendor id 0x00002320).
//!
//! A vendor message is the standard header followed by the 32-bit vendor
//! id and a 32-bit subtype. The extensions this switch speaks are the
//! role handshake, the flow-format and packet-in-format negotiation, the
//! NXM forms of flow-mod / flow-removed / packet-in, the table-id and
//! controller-id knobs, asynchronous-message masks, flow aging, and the
//! NXST statistics family.

use {Error, Repr, Result};
use byteorder::{ByteOrder, NetworkEndian};

use actions::{self, ActionList, NX_VENDOR_ID};
use flow::Match;
use wire::error_msg::{BadRequestCode, OfError};
use wire::flow_mod::{FlowModCommand, FlowModFlags, FlowModRepr, FlowRemovedRepr, RemovedReason};
use wire::nxm::{self, Dialect};
use wire::packet_io::PacketInReason;

pub const NXT_ROLE_REQUEST: u32 = 10;
pub const NXT_ROLE_REPLY: u32 = 11;
pub const NXT_SET_FLOW_FORMAT: u32 = 12;
pub const NXT_FLOW_MOD: u32 = 13;
pub const NXT_FLOW_REMOVED: u32 = 14;
pub const NXT_FLOW_MOD_TABLE_ID: u32 = 15;
pub const NXT_SET_PACKET_IN_FORMAT: u32 = 16;
pub const NXT_PACKET_IN: u32 = 17;
pub const NXT_FLOW_AGE: u32 = 18;
pub const NXT_SET_ASYNC_CONFIG: u32 = 19;
pub const NXT_SET_CONTROLLER_ID: u32 = 20;

pub const NXST_FLOW: u32 = 0;
pub const NXST_AGGREGATE: u32 = 1;

enum_with_unknown! {
    /// Per-connection controller role (Nicira handshake).
    pub doc enum NxRole(u32) {
        /// Default: full access, shared with other controllers.
        Other = 0,
        /// Full access; demotes any other master to slave.
        Master = 1,
        /// Read-only access to switch state.
        Slave = 2
    }
}

enum_with_unknown! {
    /// Negotiated flow (match) serialization.
    pub doc enum FlowFormat(u32) {
        /// The OF1.0 fixed-layout match.
        OpenFlow10 = 0,
        /// OF1.0 match, tunnel id carried in the cookie's top 32 bits.
        TunIdFromCookie = 1,
        /// The Nicira TLV match.
        Nxm = 2,
        /// The OF1.2 TLV match.
        Oxm = 3
    }
}

impl FlowFormat {
    pub fn dialect(&self) -> Dialect {
        match *self {
            FlowFormat::Oxm => Dialect::Oxm,
            _ => Dialect::Nxm,
        }
    }
}

enum_with_unknown! {
    /// Negotiated packet-in serialization.
    pub doc enum PacketInFormat(u32) {
        /// The OF1.0 packet-in body.
        OpenFlow10 = 0,
        /// The Nicira packet-in body with a full TLV match.
        Nxm = 1
    }
}

mod field {
    use field::*;

    pub const VENDOR: Field = 0..4;
    pub const SUBTYPE: Field = 4..8;
    pub const BODY: Rest = 8..;
}

/// Split a vendor-message payload into its subtype and body. Non-Nicira
/// vendor ids are rejected.
pub fn parse_header(payload: &[u8]) -> Result<(u32, &[u8])> {
    if payload.len() < field::SUBTYPE.end {
        return Err(Error::Truncated);
    }
    let vendor = NetworkEndian::read_u32(&payload[field::VENDOR]);
    if vendor != NX_VENDOR_ID {
        return Err(Error::Of(OfError::BadRequest(BadRequestCode::BadVendor)));
    }
    let subtype = NetworkEndian::read_u32(&payload[field::SUBTYPE]);
    Ok((subtype, &payload[field::BODY]))
}

/// Emit the `(vendor, subtype)` pair at the start of `buffer`.
pub fn emit_header(buffer: &mut [u8], subtype: u32) {
    NetworkEndian::write_u32(&mut buffer[field::VENDOR], NX_VENDOR_ID);
    NetworkEndian::write_u32(&mut buffer[field::SUBTYPE], subtype);
}

pub const HEADER_LEN: usize = 8;

/// Body of NXT_ROLE_REQUEST / NXT_ROLE_REPLY.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct RoleRepr(pub NxRole);

impl Repr for RoleRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < 4 {
            return Err(Error::Truncated);
        }
        Ok(RoleRepr(NxRole::from(NetworkEndian::read_u32(&buffer[0..4]))))
    }

    fn buffer_len(&self) -> usize {
        4
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < 4 {
            return Err(Error::Exhausted);
        }
        NetworkEndian::write_u32(&mut buffer[0..4], self.0.into());
        Ok(())
    }
}

/// Body of NXT_SET_FLOW_FORMAT.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SetFlowFormatRepr(pub FlowFormat);

impl Repr for SetFlowFormatRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < 4 {
            return Err(Error::Truncated);
        }
        Ok(SetFlowFormatRepr(FlowFormat::from(NetworkEndian::read_u32(
            &buffer[0..4],
        ))))
    }

    fn buffer_len(&self) -> usize {
        4
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < 4 {
            return Err(Error::Exhausted);
        }
        NetworkEndian::write_u32(&mut buffer[0..4], self.0.into());
        Ok(())
    }
}

/// Body of NXT_SET_PACKET_IN_FORMAT.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SetPacketInFormatRepr(pub PacketInFormat);

impl Repr for SetPacketInFormatRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < 4 {
            return Err(Error::Truncated);
        }
        Ok(SetPacketInFormatRepr(PacketInFormat::from(
            NetworkEndian::read_u32(&buffer[0..4]),
        )))
    }

    fn buffer_len(&self) -> usize {
        4
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < 4 {
            return Err(Error::Exhausted);
        }
        NetworkEndian::write_u32(&mut buffer[0..4], self.0.into());
        Ok(())
    }
}

/// Body of NXT_FLOW_MOD_TABLE_ID.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct FlowModTableIdRepr(pub bool);

impl Repr for FlowModTableIdRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.is_empty() {
            return Err(Error::Truncated);
        }
        Ok(FlowModTableIdRepr(buffer[0] != 0))
    }

    fn buffer_len(&self) -> usize {
        8
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < 8 {
            return Err(Error::Exhausted);
        }
        for byte in buffer[..8].iter_mut() {
            *byte = 0;
        }
        buffer[0] = self.0 as u8;
        Ok(())
    }
}

/// Body of NXT_SET_CONTROLLER_ID.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SetControllerIdRepr(pub u16);

impl Repr for SetControllerIdRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < 8 {
            return Err(Error::Truncated);
        }
        Ok(SetControllerIdRepr(NetworkEndian::read_u16(&buffer[6..8])))
    }

    fn buffer_len(&self) -> usize {
        8
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < 8 {
            return Err(Error::Exhausted);
        }
        for byte in buffer[..6].iter_mut() {
            *byte = 0;
        }
        NetworkEndian::write_u16(&mut buffer[6..8], self.0);
        Ok(())
    }
}

/// Body of NXT_SET_ASYNC_CONFIG: `[master-or-other, slave]` mask pairs
/// for packet-in, port-status, and flow-removed.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SetAsyncConfigRepr {
    pub packet_in_mask: [u32; 2],
    pub port_status_mask: [u32; 2],
    pub flow_removed_mask: [u32; 2],
}

impl Repr for SetAsyncConfigRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < 24 {
            return Err(Error::Truncated);
        }
        let word = |i: usize| NetworkEndian::read_u32(&buffer[i * 4..i * 4 + 4]);
        Ok(SetAsyncConfigRepr {
            packet_in_mask: [word(0), word(1)],
            port_status_mask: [word(2), word(3)],
            flow_removed_mask: [word(4), word(5)],
        })
    }

    fn buffer_len(&self) -> usize {
        24
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < 24 {
            return Err(Error::Exhausted);
        }
        let words = [
            self.packet_in_mask[0],
            self.packet_in_mask[1],
            self.port_status_mask[0],
            self.port_status_mask[1],
            self.flow_removed_mask[0],
            self.flow_removed_mask[1],
        ];
        for (i, word) in words.iter().enumerate() {
            NetworkEndian::write_u32(&mut buffer[i * 4..i * 4 + 4], *word);
        }
        Ok(())
    }
}

// --- NXT_FLOW_MOD -------------------------------------------------------

mod fm_field {
    use field::*;

    pub const COOKIE: Field = 0..8;
    pub const COMMAND: Field = 8..10;
    pub const IDLE_TIMEOUT: Field = 10..12;
    pub const HARD_TIMEOUT: Field = 12..14;
    pub const PRIORITY: Field = 14..16;
    pub const BUFFER_ID: Field = 16..20;
    pub const OUT_PORT: Field = 20..22;
    pub const FLAGS: Field = 22..24;
    pub const MATCH_LEN: Field = 24..26;
    // pad 26..32
    pub const MATCH: usize = 32;
}

/// Decode the NXM form of a flow-mod. The upper byte of the command
/// carries a table id when the table-id extension has been enabled;
/// it is returned alongside the message.
pub fn parse_nx_flow_mod(body: &[u8]) -> Result<(FlowModRepr, u8)> {
    if body.len() < fm_field::MATCH {
        return Err(Error::Truncated);
    }
    let match_len = NetworkEndian::read_u16(&body[fm_field::MATCH_LEN]) as usize;
    let match_end = fm_field::MATCH + nxm::padded_len(match_len);
    if body.len() < match_end {
        return Err(Error::Truncated);
    }
    let match_ = nxm::parse(&body[fm_field::MATCH..], match_len, false)?;
    let applied = actions::parse_of10(&body[match_end..])?;
    let raw_command = NetworkEndian::read_u16(&body[fm_field::COMMAND]);
    let repr = FlowModRepr {
        match_,
        cookie: NetworkEndian::read_u64(&body[fm_field::COOKIE]),
        command: FlowModCommand::from(raw_command & 0xff),
        idle_timeout: NetworkEndian::read_u16(&body[fm_field::IDLE_TIMEOUT]),
        hard_timeout: NetworkEndian::read_u16(&body[fm_field::HARD_TIMEOUT]),
        priority: NetworkEndian::read_u16(&body[fm_field::PRIORITY]),
        buffer_id: NetworkEndian::read_u32(&body[fm_field::BUFFER_ID]),
        out_port: NetworkEndian::read_u16(&body[fm_field::OUT_PORT]),
        flags: FlowModFlags::from_bits_truncate(NetworkEndian::read_u16(&body[fm_field::FLAGS])),
        actions: ActionList::apply(applied),
    };
    Ok((repr, (raw_command >> 8) as u8))
}

/// Encode a flow-mod in the NXM form (body only, after the vendor
/// header).
pub fn emit_nx_flow_mod(repr: &FlowModRepr, table_id: u8, dialect: Dialect) -> Result<Vec<u8>> {
    if !repr.actions.is_of10_expressible() {
        return Err(Error::Unrecognized);
    }
    let match_bytes = nxm::emit(&repr.match_, dialect);
    let padded = nxm::padded_len(match_bytes.len());
    let mut body = vec![0; fm_field::MATCH + padded];
    NetworkEndian::write_u64(&mut body[fm_field::COOKIE], repr.cookie);
    let raw_command = u16::from(table_id) << 8 | u16::from(repr.command) & 0xff;
    NetworkEndian::write_u16(&mut body[fm_field::COMMAND], raw_command);
    NetworkEndian::write_u16(&mut body[fm_field::IDLE_TIMEOUT], repr.idle_timeout);
    NetworkEndian::write_u16(&mut body[fm_field::HARD_TIMEOUT], repr.hard_timeout);
    NetworkEndian::write_u16(&mut body[fm_field::PRIORITY], repr.priority);
    NetworkEndian::write_u32(&mut body[fm_field::BUFFER_ID], repr.buffer_id);
    NetworkEndian::write_u16(&mut body[fm_field::OUT_PORT], repr.out_port);
    NetworkEndian::write_u16(&mut body[fm_field::FLAGS], repr.flags.bits());
    NetworkEndian::write_u16(&mut body[fm_field::MATCH_LEN], match_bytes.len() as u16);
    body[fm_field::MATCH..fm_field::MATCH + match_bytes.len()].copy_from_slice(&match_bytes);
    body.extend_from_slice(&actions::emit_of10(&repr.actions.applied));
    Ok(body)
}

// --- NXT_FLOW_REMOVED ---------------------------------------------------

mod fr_field {
    use field::*;

    pub const COOKIE: Field = 0..8;
    pub const PRIORITY: Field = 8..10;
    pub const REASON: usize = 10;
    // pad 11
    pub const DURATION_SEC: Field = 12..16;
    pub const DURATION_NSEC: Field = 16..20;
    pub const IDLE_TIMEOUT: Field = 20..22;
    pub const MATCH_LEN: Field = 22..24;
    pub const PACKET_COUNT: Field = 24..32;
    pub const BYTE_COUNT: Field = 32..40;
    pub const MATCH: usize = 40;
}

pub fn parse_nx_flow_removed(body: &[u8]) -> Result<FlowRemovedRepr> {
    if body.len() < fr_field::MATCH {
        return Err(Error::Truncated);
    }
    let match_len = NetworkEndian::read_u16(&body[fr_field::MATCH_LEN]) as usize;
    if body.len() < fr_field::MATCH + nxm::padded_len(match_len) {
        return Err(Error::Truncated);
    }
    Ok(FlowRemovedRepr {
        match_: nxm::parse(&body[fr_field::MATCH..], match_len, false)?,
        cookie: NetworkEndian::read_u64(&body[fr_field::COOKIE]),
        priority: NetworkEndian::read_u16(&body[fr_field::PRIORITY]),
        reason: RemovedReason::from(body[fr_field::REASON]),
        duration_sec: NetworkEndian::read_u32(&body[fr_field::DURATION_SEC]),
        duration_nsec: NetworkEndian::read_u32(&body[fr_field::DURATION_NSEC]),
        idle_timeout: NetworkEndian::read_u16(&body[fr_field::IDLE_TIMEOUT]),
        packet_count: NetworkEndian::read_u64(&body[fr_field::PACKET_COUNT]),
        byte_count: NetworkEndian::read_u64(&body[fr_field::BYTE_COUNT]),
    })
}

pub fn emit_nx_flow_removed(repr: &FlowRemovedRepr, dialect: Dialect) -> Vec<u8> {
    let match_bytes = nxm::emit(&repr.match_, dialect);
    let padded = nxm::padded_len(match_bytes.len());
    let mut body = vec![0; fr_field::MATCH + padded];
    NetworkEndian::write_u64(&mut body[fr_field::COOKIE], repr.cookie);
    NetworkEndian::write_u16(&mut body[fr_field::PRIORITY], repr.priority);
    body[fr_field::REASON] = repr.reason.into();
    NetworkEndian::write_u32(&mut body[fr_field::DURATION_SEC], repr.duration_sec);
    NetworkEndian::write_u32(&mut body[fr_field::DURATION_NSEC], repr.duration_nsec);
    NetworkEndian::write_u16(&mut body[fr_field::IDLE_TIMEOUT], repr.idle_timeout);
    NetworkEndian::write_u16(&mut body[fr_field::MATCH_LEN], match_bytes.len() as u16);
    NetworkEndian::write_u64(&mut body[fr_field::PACKET_COUNT], repr.packet_count);
    NetworkEndian::write_u64(&mut body[fr_field::BYTE_COUNT], repr.byte_count);
    body[fr_field::MATCH..fr_field::MATCH + match_bytes.len()].copy_from_slice(&match_bytes);
    body
}

// --- NXT_PACKET_IN ------------------------------------------------------

/// The Nicira packet-in body: the OF1.0 fields plus the full match and
/// the originating table and cookie.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NxPacketInRepr {
    pub buffer_id: u32,
    pub total_len: u16,
    pub reason: PacketInReason,
    pub table_id: u8,
    pub cookie: u64,
    pub match_: Match,
    pub data: Vec<u8>,
}

mod pi_field {
    use field::*;

    pub const BUFFER_ID: Field = 0..4;
    pub const TOTAL_LEN: Field = 4..6;
    pub const REASON: usize = 6;
    pub const TABLE_ID: usize = 7;
    pub const COOKIE: Field = 8..16;
    pub const MATCH_LEN: Field = 16..18;
    // pad 18..24
    pub const MATCH: usize = 24;
}

pub fn parse_nx_packet_in(body: &[u8]) -> Result<NxPacketInRepr> {
    if body.len() < pi_field::MATCH {
        return Err(Error::Truncated);
    }
    let match_len = NetworkEndian::read_u16(&body[pi_field::MATCH_LEN]) as usize;
    let match_end = pi_field::MATCH + nxm::padded_len(match_len);
    // two alignment bytes separate the match from the frame
    if body.len() < match_end + 2 {
        return Err(Error::Truncated);
    }
    Ok(NxPacketInRepr {
        buffer_id: NetworkEndian::read_u32(&body[pi_field::BUFFER_ID]),
        total_len: NetworkEndian::read_u16(&body[pi_field::TOTAL_LEN]),
        reason: PacketInReason::from(body[pi_field::REASON]),
        table_id: body[pi_field::TABLE_ID],
        cookie: NetworkEndian::read_u64(&body[pi_field::COOKIE]),
        match_: nxm::parse(&body[pi_field::MATCH..], match_len, false)?,
        data: body[match_end + 2..].to_vec(),
    })
}

pub fn emit_nx_packet_in(repr: &NxPacketInRepr, dialect: Dialect) -> Vec<u8> {
    let match_bytes = nxm::emit(&repr.match_, dialect);
    let padded = nxm::padded_len(match_bytes.len());
    let mut body = vec![0; pi_field::MATCH + padded + 2];
    NetworkEndian::write_u32(&mut body[pi_field::BUFFER_ID], repr.buffer_id);
    NetworkEndian::write_u16(&mut body[pi_field::TOTAL_LEN], repr.total_len);
    body[pi_field::REASON] = repr.reason.into();
    body[pi_field::TABLE_ID] = repr.table_id;
    NetworkEndian::write_u64(&mut body[pi_field::COOKIE], repr.cookie);
    NetworkEndian::write_u16(&mut body[pi_field::MATCH_LEN], match_bytes.len() as u16);
    body[pi_field::MATCH..pi_field::MATCH + match_bytes.len()].copy_from_slice(&match_bytes);
    body.extend_from_slice(&repr.data);
    body
}

// --- NXST ---------------------------------------------------------------

/// NXST_FLOW / NXST_AGGREGATE request body.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct NxFlowStatsRequestRepr {
    pub out_port: u16,
    pub table_id: u8,
    pub match_: Match,
}

mod nxst_field {
    use field::*;

    pub const OUT_PORT: Field = 0..2;
    pub const MATCH_LEN: Field = 2..4;
    pub const TABLE_ID: usize = 4;
    // pad 5..8
    pub const MATCH: usize = 8;
}

pub fn parse_nx_flow_stats_request(body: &[u8]) -> Result<NxFlowStatsRequestRepr> {
    if body.len() < nxst_field::MATCH {
        return Err(Error::Truncated);
    }
    let match_len = NetworkEndian::read_u16(&body[nxst_field::MATCH_LEN]) as usize;
    if body.len() < nxst_field::MATCH + nxm::padded_len(match_len) {
        return Err(Error::Truncated);
    }
    Ok(NxFlowStatsRequestRepr {
        out_port: NetworkEndian::read_u16(&body[nxst_field::OUT_PORT]),
        table_id: body[nxst_field::TABLE_ID],
        match_: nxm::parse(&body[nxst_field::MATCH..], match_len, false)?,
    })
}

pub fn emit_nx_flow_stats_request(repr: &NxFlowStatsRequestRepr, dialect: Dialect) -> Vec<u8> {
    let match_bytes = nxm::emit(&repr.match_, dialect);
    let padded = nxm::padded_len(match_bytes.len());
    let mut body = vec![0; nxst_field::MATCH + padded];
    NetworkEndian::write_u16(&mut body[nxst_field::OUT_PORT], repr.out_port);
    NetworkEndian::write_u16(&mut body[nxst_field::MATCH_LEN], match_bytes.len() as u16);
    body[nxst_field::TABLE_ID] = repr.table_id;
    body[nxst_field::MATCH..nxst_field::MATCH + match_bytes.len()].copy_from_slice(&match_bytes);
    body
}

/// One entry of an NXST_FLOW reply.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NxFlowStatsEntryRepr {
    pub table_id: u8,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub cookie: u64,
    pub packet_count: u64,
    pub byte_count: u64,
    pub match_: Match,
    pub actions: ActionList,
}

mod nfs_field {
    use field::*;

    pub const LENGTH: Field = 0..2;
    pub const TABLE_ID: usize = 2;
    // pad 3
    pub const DURATION_SEC: Field = 4..8;
    pub const DURATION_NSEC: Field = 8..12;
    pub const PRIORITY: Field = 12..14;
    pub const IDLE_TIMEOUT: Field = 14..16;
    pub const HARD_TIMEOUT: Field = 16..18;
    pub const MATCH_LEN: Field = 18..20;
    // pad 20..24
    pub const COOKIE: Field = 24..32;
    pub const PACKET_COUNT: Field = 32..40;
    pub const BYTE_COUNT: Field = 40..48;
    pub const MATCH: usize = 48;
}

impl NxFlowStatsEntryRepr {
    pub fn parse_entry(buffer: &[u8]) -> Result<(Self, usize)> {
        if buffer.len() < nfs_field::MATCH {
            return Err(Error::Truncated);
        }
        let length = NetworkEndian::read_u16(&buffer[nfs_field::LENGTH]) as usize;
        let match_len = NetworkEndian::read_u16(&buffer[nfs_field::MATCH_LEN]) as usize;
        let match_end = nfs_field::MATCH + nxm::padded_len(match_len);
        if length < match_end || length > buffer.len() {
            return Err(Error::Truncated);
        }
        let applied = actions::parse_of10(&buffer[match_end..length])?;
        let entry = NxFlowStatsEntryRepr {
            table_id: buffer[nfs_field::TABLE_ID],
            duration_sec: NetworkEndian::read_u32(&buffer[nfs_field::DURATION_SEC]),
            duration_nsec: NetworkEndian::read_u32(&buffer[nfs_field::DURATION_NSEC]),
            priority: NetworkEndian::read_u16(&buffer[nfs_field::PRIORITY]),
            idle_timeout: NetworkEndian::read_u16(&buffer[nfs_field::IDLE_TIMEOUT]),
            hard_timeout: NetworkEndian::read_u16(&buffer[nfs_field::HARD_TIMEOUT]),
            cookie: NetworkEndian::read_u64(&buffer[nfs_field::COOKIE]),
            packet_count: NetworkEndian::read_u64(&buffer[nfs_field::PACKET_COUNT]),
            byte_count: NetworkEndian::read_u64(&buffer[nfs_field::BYTE_COUNT]),
            match_: nxm::parse(&buffer[nfs_field::MATCH..], match_len, false)?,
            actions: ActionList::apply(applied),
        };
        Ok((entry, length))
    }

    pub fn emit_entry(&self, dialect: Dialect) -> Result<Vec<u8>> {
        if !self.actions.is_of10_expressible() {
            return Err(Error::Unrecognized);
        }
        let match_bytes = nxm::emit(&self.match_, dialect);
        let padded = nxm::padded_len(match_bytes.len());
        let action_bytes = actions::emit_of10(&self.actions.applied);
        let total = nfs_field::MATCH + padded + action_bytes.len();
        let mut out = vec![0; nfs_field::MATCH + padded];
        NetworkEndian::write_u16(&mut out[nfs_field::LENGTH], total as u16);
        out[nfs_field::TABLE_ID] = self.table_id;
        NetworkEndian::write_u32(&mut out[nfs_field::DURATION_SEC], self.duration_sec);
        NetworkEndian::write_u32(&mut out[nfs_field::DURATION_NSEC], self.duration_nsec);
        NetworkEndian::write_u16(&mut out[nfs_field::PRIORITY], self.priority);
        NetworkEndian::write_u16(&mut out[nfs_field::IDLE_TIMEOUT], self.idle_timeout);
        NetworkEndian::write_u16(&mut out[nfs_field::HARD_TIMEOUT], self.hard_timeout);
        NetworkEndian::write_u16(&mut out[nfs_field::MATCH_LEN], match_bytes.len() as u16);
        NetworkEndian::write_u64(&mut out[nfs_field::COOKIE], self.cookie);
        NetworkEndian::write_u64(&mut out[nfs_field::PACKET_COUNT], self.packet_count);
        NetworkEndian::write_u64(&mut out[nfs_field::BYTE_COUNT], self.byte_count);
        out[nfs_field::MATCH..nfs_field::MATCH + match_bytes.len()]
            .copy_from_slice(&match_bytes);
        out.extend_from_slice(&action_bytes);
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use actions::Action;
    use flow;
    use smoltcp::wire::Ipv4Address;
    use wire::flow_mod::NO_BUFFER;
    use wire::port_msg::OFPP_NONE;

    fn sample_match() -> Match {
        let mut m = Match::catch_all();
        m.set_dl_type(flow::ETH_TYPE_IP);
        m.set_nw_src(Ipv4Address::from_bytes(&[10, 0, 0, 0]), 0xffff_ff00);
        m
    }

    #[test]
    fn test_nx_flow_mod_roundtrip() {
        let repr = FlowModRepr {
            match_: sample_match(),
            cookie: 99,
            command: FlowModCommand::Add,
            idle_timeout: 5,
            hard_timeout: 0,
            priority: 1000,
            buffer_id: NO_BUFFER,
            out_port: OFPP_NONE,
            flags: FlowModFlags::CHECK_OVERLAP,
            actions: ActionList::apply(vec![Action::Output {
                port: 1,
                max_len: 0,
            }]),
        };
        let body = emit_nx_flow_mod(&repr, 3, Dialect::Nxm).unwrap();
        let (parsed, table_id) = parse_nx_flow_mod(&body).unwrap();
        assert_eq!(parsed, repr);
        assert_eq!(table_id, 3);
    }

    #[test]
    fn test_nx_flow_removed_roundtrip() {
        let repr = FlowRemovedRepr {
            match_: sample_match(),
            cookie: 1,
            priority: 77,
            reason: RemovedReason::IdleTimeout,
            duration_sec: 10,
            duration_nsec: 500,
            idle_timeout: 5,
            packet_count: 3,
            byte_count: 180,
        };
        let body = emit_nx_flow_removed(&repr, Dialect::Nxm);
        assert_eq!(parse_nx_flow_removed(&body).unwrap(), repr);
    }

    #[test]
    fn test_nx_packet_in_roundtrip() {
        let mut match_ = Match::catch_all();
        match_.set_in_port(7);
        let repr = NxPacketInRepr {
            buffer_id: 12,
            total_len: 64,
            reason: PacketInReason::NoMatch,
            table_id: 0,
            cookie: 0,
            match_,
            data: vec![1, 2, 3, 4],
        };
        let body = emit_nx_packet_in(&repr, Dialect::Nxm);
        assert_eq!(parse_nx_packet_in(&body).unwrap(), repr);
    }

    #[test]
    fn test_nxst_flow_roundtrip() {
        let entry = NxFlowStatsEntryRepr {
            table_id: 0,
            duration_sec: 2,
            duration_nsec: 0,
            priority: 10,
            idle_timeout: 0,
            hard_timeout: 30,
            cookie: 5,
            packet_count: 100,
            byte_count: 6400,
            match_: sample_match(),
            actions: ActionList::apply(vec![Action::DecTtl]),
        };
        let bytes = entry.emit_entry(Dialect::Nxm).unwrap();
        let (parsed, len) = NxFlowStatsEntryRepr::parse_entry(&bytes).unwrap();
        assert_eq!(len, bytes.len());
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_foreign_vendor_rejected() {
        let mut payload = vec![0; 16];
        NetworkEndian::write_u32(&mut payload[0..4], 0x1234);
        assert!(parse_header(&payload).is_err());
    }
}
