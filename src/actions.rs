//! Action lists and their wire encodings.
//!
//! Actions are a flat sequence both on the wire and internally; there is
//! no nesting. OpenFlow 1.0 writes them directly after the flow-mod body,
//! each entry headed by `(type, len)`; Nicira vendor actions use type
//! 0xffff with the vendor id and a subtype. OpenFlow 1.1 wrapped action
//! sequences in instructions; the decoder flattens `APPLY_ACTIONS` and
//! `WRITE_ACTIONS` into the two buckets of [`ActionList`] and records the
//! remaining instructions (`GOTO_TABLE`, `WRITE_METADATA`,
//! `CLEAR_ACTIONS`) alongside, so the wrapper choice survives a
//! round-trip.
//!
//! Unknown vendor actions are rejected, never dropped.

use {Error, Result};
use byteorder::{ByteOrder, NetworkEndian};
use smoltcp::wire::{EthernetAddress, Ipv4Address};

use wire::error_msg::{BadActionCode, OfError};

/// The Nicira vendor id.
pub const NX_VENDOR_ID: u32 = 0x0000_2320;

// OpenFlow 1.0 action types.
const OFPAT_OUTPUT: u16 = 0;
const OFPAT_SET_VLAN_VID: u16 = 1;
const OFPAT_SET_VLAN_PCP: u16 = 2;
const OFPAT_STRIP_VLAN: u16 = 3;
const OFPAT_SET_DL_SRC: u16 = 4;
const OFPAT_SET_DL_DST: u16 = 5;
const OFPAT_SET_NW_SRC: u16 = 6;
const OFPAT_SET_NW_DST: u16 = 7;
const OFPAT_SET_NW_TOS: u16 = 8;
const OFPAT_SET_TP_SRC: u16 = 9;
const OFPAT_SET_TP_DST: u16 = 10;
const OFPAT_ENQUEUE: u16 = 11;
const OFPAT_VENDOR: u16 = 0xffff;

// Nicira action subtypes.
const NXAST_RESUBMIT: u16 = 1;
const NXAST_SET_TUNNEL: u16 = 2;
const NXAST_SET_QUEUE: u16 = 4;
const NXAST_POP_QUEUE: u16 = 5;
const NXAST_REG_MOVE: u16 = 6;
const NXAST_REG_LOAD: u16 = 7;
const NXAST_NOTE: u16 = 8;
const NXAST_SET_TUNNEL64: u16 = 9;
const NXAST_MULTIPATH: u16 = 10;
const NXAST_AUTOPATH: u16 = 11;
const NXAST_BUNDLE: u16 = 12;
const NXAST_BUNDLE_LOAD: u16 = 13;
const NXAST_RESUBMIT_TABLE: u16 = 14;
const NXAST_OUTPUT_REG: u16 = 15;
const NXAST_LEARN: u16 = 16;
const NXAST_EXIT: u16 = 17;
const NXAST_DEC_TTL: u16 = 18;
const NXAST_FIN_TIMEOUT: u16 = 19;
const NXAST_CONTROLLER: u16 = 20;
const NXAST_SET_MPLS_LABEL: u16 = 21;
const NXAST_SET_MPLS_TC: u16 = 22;
const NXAST_SET_MPLS_TTL: u16 = 23;
const NXAST_DEC_MPLS_TTL: u16 = 24;
const NXAST_PUSH_MPLS: u16 = 25;
const NXAST_POP_MPLS: u16 = 26;
const NXAST_PUSH_VLAN: u16 = 27;

// OpenFlow 1.1 instruction types.
const OFPIT_GOTO_TABLE: u16 = 1;
const OFPIT_WRITE_METADATA: u16 = 2;
const OFPIT_WRITE_ACTIONS: u16 = 3;
const OFPIT_APPLY_ACTIONS: u16 = 4;
const OFPIT_CLEAR_ACTIONS: u16 = 5;

// OpenFlow 1.1 action types (the subset this switch understands).
const OFPAT11_OUTPUT: u16 = 0;
const OFPAT11_SET_VLAN_VID: u16 = 1;
const OFPAT11_SET_VLAN_PCP: u16 = 2;
const OFPAT11_SET_DL_SRC: u16 = 3;
const OFPAT11_SET_DL_DST: u16 = 4;
const OFPAT11_SET_NW_SRC: u16 = 5;
const OFPAT11_SET_NW_DST: u16 = 6;
const OFPAT11_SET_NW_TOS: u16 = 7;
const OFPAT11_SET_TP_SRC: u16 = 9;
const OFPAT11_SET_TP_DST: u16 = 10;
const OFPAT11_SET_MPLS_LABEL: u16 = 13;
const OFPAT11_SET_MPLS_TC: u16 = 14;
const OFPAT11_SET_MPLS_TTL: u16 = 15;
const OFPAT11_DEC_MPLS_TTL: u16 = 16;
const OFPAT11_PUSH_VLAN: u16 = 17;
const OFPAT11_POP_VLAN: u16 = 18;
const OFPAT11_PUSH_MPLS: u16 = 19;
const OFPAT11_POP_MPLS: u16 = 20;
const OFPAT11_SET_QUEUE: u16 = 21;
const OFPAT11_DEC_NW_TTL: u16 = 24;

fn bad(code: BadActionCode) -> Error {
    Error::Of(OfError::BadAction(code))
}

/// One action. The numeric payloads mirror the wire formats; register
/// references (`src`/`dst` in the move/load/output-reg family) are raw
/// NXM field headers.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Action {
    Output { port: u16, max_len: u16 },
    SetVlanVid(u16),
    SetVlanPcp(u8),
    StripVlan,
    SetDlSrc(EthernetAddress),
    SetDlDst(EthernetAddress),
    SetNwSrc(Ipv4Address),
    SetNwDst(Ipv4Address),
    SetNwTos(u8),
    SetTpSrc(u16),
    SetTpDst(u16),
    Enqueue { port: u16, queue_id: u32 },
    Resubmit { in_port: u16 },
    ResubmitTable { in_port: u16, table: u8 },
    SetTunnel(u32),
    SetTunnel64(u64),
    SetQueue(u32),
    PopQueue,
    RegMove {
        n_bits: u16,
        src_ofs: u16,
        dst_ofs: u16,
        src: u32,
        dst: u32,
    },
    RegLoad {
        ofs_nbits: u16,
        dst: u32,
        value: u64,
    },
    Note(Vec<u8>),
    Multipath {
        fields: u16,
        basis: u16,
        algorithm: u16,
        max_link: u16,
        arg: u32,
        ofs_nbits: u16,
        dst: u32,
    },
    Autopath {
        ofs_nbits: u16,
        dst: u32,
        id: u32,
    },
    Bundle {
        load: bool,
        algorithm: u16,
        fields: u16,
        basis: u16,
        slave_type: u32,
        ofs_nbits: u16,
        dst: u32,
        slaves: Vec<u16>,
    },
    Learn {
        idle_timeout: u16,
        hard_timeout: u16,
        priority: u16,
        cookie: u64,
        flags: u16,
        table_id: u8,
        fin_idle_timeout: u16,
        fin_hard_timeout: u16,
        specs: Vec<u8>,
    },
    Exit,
    DecTtl,
    FinTimeout { fin_idle_timeout: u16, fin_hard_timeout: u16 },
    Controller {
        max_len: u16,
        controller_id: u16,
        reason: u8,
    },
    OutputReg {
        ofs_nbits: u16,
        src: u32,
        max_len: u16,
    },
    SetMplsLabel(u32),
    SetMplsTc(u8),
    SetMplsTtl(u8),
    DecMplsTtl,
    PushMpls(u16),
    PopMpls(u16),
    PushVlan(u16),
}

fn pad8(len: usize) -> usize {
    (len + 7) / 8 * 8
}

impl Action {
    /// Wire length of this action in the OF1.0/Nicira encoding.
    pub fn wire_len(&self) -> usize {
        match *self {
            Action::Output { .. }
            | Action::SetVlanVid(_)
            | Action::SetVlanPcp(_)
            | Action::StripVlan
            | Action::SetNwSrc(_)
            | Action::SetNwDst(_)
            | Action::SetNwTos(_)
            | Action::SetTpSrc(_)
            | Action::SetTpDst(_) => 8,
            Action::SetDlSrc(_) | Action::SetDlDst(_) | Action::Enqueue { .. } => 16,
            Action::Resubmit { .. }
            | Action::ResubmitTable { .. }
            | Action::SetTunnel(_)
            | Action::SetQueue(_)
            | Action::PopQueue
            | Action::Exit
            | Action::DecTtl
            | Action::FinTimeout { .. }
            | Action::Controller { .. }
            | Action::SetMplsLabel(_)
            | Action::SetMplsTc(_)
            | Action::SetMplsTtl(_)
            | Action::DecMplsTtl
            | Action::PushMpls(_)
            | Action::PopMpls(_)
            | Action::PushVlan(_) => 16,
            Action::SetTunnel64(_)
            | Action::RegMove { .. }
            | Action::RegLoad { .. }
            | Action::Autopath { .. }
            | Action::OutputReg { .. } => 24,
            Action::Multipath { .. } => 32,
            Action::Note(ref bytes) => pad8(10 + bytes.len()),
            Action::Bundle { ref slaves, .. } => pad8(32 + slaves.len() * 2),
            Action::Learn { ref specs, .. } => pad8(32 + specs.len()),
        }
    }
}

/// A flattened action list plus the OF1.1 instruction metadata that has no
/// OF1.0 equivalent. Rules written through OF1.0 or the Nicira extensions
/// only ever populate `applied`.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct ActionList {
    pub applied: Vec<Action>,
    pub written: Vec<Action>,
    pub clear: bool,
    pub goto_table: Option<u8>,
    pub metadata: Option<(u64, u64)>,
}

impl ActionList {
    pub fn apply(actions: Vec<Action>) -> Self {
        ActionList {
            applied: actions,
            ..ActionList::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
            && self.written.is_empty()
            && !self.clear
            && self.goto_table.is_none()
            && self.metadata.is_none()
    }

    /// True when the list can be written in the OF1.0 encoding.
    pub fn is_of10_expressible(&self) -> bool {
        self.written.is_empty() && !self.clear && self.goto_table.is_none()
            && self.metadata.is_none()
    }
}

fn parse_one_of10(buffer: &[u8]) -> Result<(Action, usize)> {
    if buffer.len() < 4 {
        return Err(bad(BadActionCode::BadLen));
    }
    let ty = NetworkEndian::read_u16(&buffer[0..2]);
    let len = NetworkEndian::read_u16(&buffer[2..4]) as usize;
    if len < 8 || len % 8 != 0 || len > buffer.len() {
        return Err(bad(BadActionCode::BadLen));
    }
    let body = &buffer[4..len];
    let action = match ty {
        OFPAT_OUTPUT => {
            expect(len, 8)?;
            Action::Output {
                port: NetworkEndian::read_u16(&body[0..2]),
                max_len: NetworkEndian::read_u16(&body[2..4]),
            }
        }
        OFPAT_SET_VLAN_VID => {
            expect(len, 8)?;
            let vid = NetworkEndian::read_u16(&body[0..2]);
            if vid > 0x0fff {
                return Err(bad(BadActionCode::BadArgument));
            }
            Action::SetVlanVid(vid)
        }
        OFPAT_SET_VLAN_PCP => {
            expect(len, 8)?;
            if body[0] > 7 {
                return Err(bad(BadActionCode::BadArgument));
            }
            Action::SetVlanPcp(body[0])
        }
        OFPAT_STRIP_VLAN => {
            expect(len, 8)?;
            Action::StripVlan
        }
        OFPAT_SET_DL_SRC => {
            expect(len, 16)?;
            Action::SetDlSrc(EthernetAddress::from_bytes(&body[0..6]))
        }
        OFPAT_SET_DL_DST => {
            expect(len, 16)?;
            Action::SetDlDst(EthernetAddress::from_bytes(&body[0..6]))
        }
        OFPAT_SET_NW_SRC => {
            expect(len, 8)?;
            Action::SetNwSrc(Ipv4Address::from_bytes(&body[0..4]))
        }
        OFPAT_SET_NW_DST => {
            expect(len, 8)?;
            Action::SetNwDst(Ipv4Address::from_bytes(&body[0..4]))
        }
        OFPAT_SET_NW_TOS => {
            expect(len, 8)?;
            if body[0] & 0x03 != 0 {
                return Err(bad(BadActionCode::BadArgument));
            }
            Action::SetNwTos(body[0])
        }
        OFPAT_SET_TP_SRC => {
            expect(len, 8)?;
            Action::SetTpSrc(NetworkEndian::read_u16(&body[0..2]))
        }
        OFPAT_SET_TP_DST => {
            expect(len, 8)?;
            Action::SetTpDst(NetworkEndian::read_u16(&body[0..2]))
        }
        OFPAT_ENQUEUE => {
            expect(len, 16)?;
            Action::Enqueue {
                port: NetworkEndian::read_u16(&body[0..2]),
                queue_id: NetworkEndian::read_u32(&body[8..12]),
            }
        }
        OFPAT_VENDOR => parse_vendor(body, len)?,
        _ => return Err(bad(BadActionCode::BadType)),
    };
    Ok((action, len))
}

fn expect(len: usize, want: usize) -> Result<()> {
    if len != want {
        return Err(bad(BadActionCode::BadLen));
    }
    Ok(())
}

// `body` is everything after (type, len); a vendor action begins with the
// 32-bit vendor id, then the Nicira subtype.
fn parse_vendor(body: &[u8], len: usize) -> Result<Action> {
    if body.len() < 6 {
        return Err(bad(BadActionCode::BadLen));
    }
    let vendor = NetworkEndian::read_u32(&body[0..4]);
    if vendor != NX_VENDOR_ID {
        return Err(bad(BadActionCode::BadVendor));
    }
    let subtype = NetworkEndian::read_u16(&body[4..6]);
    let rest = &body[6..];
    let action = match subtype {
        NXAST_RESUBMIT => {
            expect(len, 16)?;
            Action::Resubmit {
                in_port: NetworkEndian::read_u16(&rest[0..2]),
            }
        }
        NXAST_RESUBMIT_TABLE => {
            expect(len, 16)?;
            Action::ResubmitTable {
                in_port: NetworkEndian::read_u16(&rest[0..2]),
                table: rest[2],
            }
        }
        NXAST_SET_TUNNEL => {
            expect(len, 16)?;
            Action::SetTunnel(NetworkEndian::read_u32(&rest[2..6]))
        }
        NXAST_SET_TUNNEL64 => {
            expect(len, 24)?;
            Action::SetTunnel64(NetworkEndian::read_u64(&rest[6..14]))
        }
        NXAST_SET_QUEUE => {
            expect(len, 16)?;
            Action::SetQueue(NetworkEndian::read_u32(&rest[2..6]))
        }
        NXAST_POP_QUEUE => {
            expect(len, 16)?;
            Action::PopQueue
        }
        NXAST_REG_MOVE => {
            expect(len, 24)?;
            Action::RegMove {
                n_bits: NetworkEndian::read_u16(&rest[0..2]),
                src_ofs: NetworkEndian::read_u16(&rest[2..4]),
                dst_ofs: NetworkEndian::read_u16(&rest[4..6]),
                src: NetworkEndian::read_u32(&rest[6..10]),
                dst: NetworkEndian::read_u32(&rest[10..14]),
            }
        }
        NXAST_REG_LOAD => {
            expect(len, 24)?;
            Action::RegLoad {
                ofs_nbits: NetworkEndian::read_u16(&rest[0..2]),
                dst: NetworkEndian::read_u32(&rest[2..6]),
                value: NetworkEndian::read_u64(&rest[6..14]),
            }
        }
        NXAST_NOTE => Action::Note(rest.to_vec()),
        NXAST_MULTIPATH => {
            expect(len, 32)?;
            Action::Multipath {
                fields: NetworkEndian::read_u16(&rest[0..2]),
                basis: NetworkEndian::read_u16(&rest[2..4]),
                algorithm: NetworkEndian::read_u16(&rest[6..8]),
                max_link: NetworkEndian::read_u16(&rest[8..10]),
                arg: NetworkEndian::read_u32(&rest[10..14]),
                ofs_nbits: NetworkEndian::read_u16(&rest[16..18]),
                dst: NetworkEndian::read_u32(&rest[18..22]),
            }
        }
        NXAST_AUTOPATH => {
            expect(len, 24)?;
            Action::Autopath {
                ofs_nbits: NetworkEndian::read_u16(&rest[0..2]),
                dst: NetworkEndian::read_u32(&rest[2..6]),
                id: NetworkEndian::read_u32(&rest[6..10]),
            }
        }
        NXAST_BUNDLE | NXAST_BUNDLE_LOAD => {
            if len < 32 {
                return Err(bad(BadActionCode::BadLen));
            }
            let n_slaves = NetworkEndian::read_u16(&rest[10..12]) as usize;
            if len < pad8(32 + n_slaves * 2) {
                return Err(bad(BadActionCode::BadLen));
            }
            let mut slaves = Vec::with_capacity(n_slaves);
            for i in 0..n_slaves {
                slaves.push(NetworkEndian::read_u16(&rest[22 + i * 2..24 + i * 2]));
            }
            Action::Bundle {
                load: subtype == NXAST_BUNDLE_LOAD,
                algorithm: NetworkEndian::read_u16(&rest[0..2]),
                fields: NetworkEndian::read_u16(&rest[2..4]),
                basis: NetworkEndian::read_u16(&rest[4..6]),
                slave_type: NetworkEndian::read_u32(&rest[6..10]),
                ofs_nbits: NetworkEndian::read_u16(&rest[12..14]),
                dst: NetworkEndian::read_u32(&rest[14..18]),
                slaves,
            }
        }
        NXAST_LEARN => {
            if len < 32 {
                return Err(bad(BadActionCode::BadLen));
            }
            Action::Learn {
                idle_timeout: NetworkEndian::read_u16(&rest[0..2]),
                hard_timeout: NetworkEndian::read_u16(&rest[2..4]),
                priority: NetworkEndian::read_u16(&rest[4..6]),
                cookie: NetworkEndian::read_u64(&rest[6..14]),
                flags: NetworkEndian::read_u16(&rest[14..16]),
                table_id: rest[16],
                fin_idle_timeout: NetworkEndian::read_u16(&rest[18..20]),
                fin_hard_timeout: NetworkEndian::read_u16(&rest[20..22]),
                specs: rest[22..].to_vec(),
            }
        }
        NXAST_EXIT => {
            expect(len, 16)?;
            Action::Exit
        }
        NXAST_DEC_TTL => {
            expect(len, 16)?;
            Action::DecTtl
        }
        NXAST_FIN_TIMEOUT => {
            expect(len, 16)?;
            Action::FinTimeout {
                fin_idle_timeout: NetworkEndian::read_u16(&rest[0..2]),
                fin_hard_timeout: NetworkEndian::read_u16(&rest[2..4]),
            }
        }
        NXAST_CONTROLLER => {
            expect(len, 16)?;
            Action::Controller {
                max_len: NetworkEndian::read_u16(&rest[0..2]),
                controller_id: NetworkEndian::read_u16(&rest[2..4]),
                reason: rest[4],
            }
        }
        NXAST_OUTPUT_REG => {
            expect(len, 24)?;
            Action::OutputReg {
                ofs_nbits: NetworkEndian::read_u16(&rest[0..2]),
                src: NetworkEndian::read_u32(&rest[2..6]),
                max_len: NetworkEndian::read_u16(&rest[6..8]),
            }
        }
        NXAST_SET_MPLS_LABEL => {
            expect(len, 16)?;
            let label = NetworkEndian::read_u32(&rest[0..4]);
            if label > 0x000f_ffff {
                return Err(bad(BadActionCode::BadArgument));
            }
            Action::SetMplsLabel(label)
        }
        NXAST_SET_MPLS_TC => {
            expect(len, 16)?;
            if rest[0] > 7 {
                return Err(bad(BadActionCode::BadArgument));
            }
            Action::SetMplsTc(rest[0])
        }
        NXAST_SET_MPLS_TTL => {
            expect(len, 16)?;
            Action::SetMplsTtl(rest[0])
        }
        NXAST_DEC_MPLS_TTL => {
            expect(len, 16)?;
            Action::DecMplsTtl
        }
        NXAST_PUSH_MPLS => {
            expect(len, 16)?;
            let ethertype = NetworkEndian::read_u16(&rest[0..2]);
            if ethertype != ::flow::ETH_TYPE_MPLS && ethertype != ::flow::ETH_TYPE_MPLS_MCAST {
                return Err(bad(BadActionCode::BadArgument));
            }
            Action::PushMpls(ethertype)
        }
        NXAST_POP_MPLS => {
            expect(len, 16)?;
            Action::PopMpls(NetworkEndian::read_u16(&rest[0..2]))
        }
        NXAST_PUSH_VLAN => {
            expect(len, 16)?;
            let ethertype = NetworkEndian::read_u16(&rest[0..2]);
            if ethertype != ::flow::ETH_TYPE_VLAN {
                return Err(bad(BadActionCode::BadArgument));
            }
            Action::PushVlan(ethertype)
        }
        _ => return Err(bad(BadActionCode::BadVendorType)),
    };
    Ok(action)
}

/// Parse an OF1.0-encoded action region covering the whole of `buffer`.
pub fn parse_of10(buffer: &[u8]) -> Result<Vec<Action>> {
    let mut actions = Vec::new();
    let mut offset = 0;
    while offset < buffer.len() {
        let (action, len) = parse_one_of10(&buffer[offset..])?;
        actions.push(action);
        offset += len;
    }
    Ok(actions)
}

fn emit_header(out: &mut Vec<u8>, ty: u16, len: usize) {
    let mut head = [0; 4];
    NetworkEndian::write_u16(&mut head[0..2], ty);
    NetworkEndian::write_u16(&mut head[2..4], len as u16);
    out.extend_from_slice(&head);
}

fn emit_nx_header(out: &mut Vec<u8>, subtype: u16, len: usize) {
    emit_header(out, OFPAT_VENDOR, len);
    let mut vendor = [0; 6];
    NetworkEndian::write_u32(&mut vendor[0..4], NX_VENDOR_ID);
    NetworkEndian::write_u16(&mut vendor[4..6], subtype);
    out.extend_from_slice(&vendor);
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    let mut buf = [0; 2];
    NetworkEndian::write_u16(&mut buf, value);
    out.extend_from_slice(&buf);
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    let mut buf = [0; 4];
    NetworkEndian::write_u32(&mut buf, value);
    out.extend_from_slice(&buf);
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    let mut buf = [0; 8];
    NetworkEndian::write_u64(&mut buf, value);
    out.extend_from_slice(&buf);
}

fn put_zeros(out: &mut Vec<u8>, n: usize) {
    out.extend(::std::iter::repeat(0).take(n));
}

fn emit_one_of10(action: &Action, out: &mut Vec<u8>) {
    let len = action.wire_len();
    match *action {
        Action::Output { port, max_len } => {
            emit_header(out, OFPAT_OUTPUT, len);
            put_u16(out, port);
            put_u16(out, max_len);
        }
        Action::SetVlanVid(vid) => {
            emit_header(out, OFPAT_SET_VLAN_VID, len);
            put_u16(out, vid);
            put_zeros(out, 2);
        }
        Action::SetVlanPcp(pcp) => {
            emit_header(out, OFPAT_SET_VLAN_PCP, len);
            out.push(pcp);
            put_zeros(out, 3);
        }
        Action::StripVlan => {
            emit_header(out, OFPAT_STRIP_VLAN, len);
            put_zeros(out, 4);
        }
        Action::SetDlSrc(addr) => {
            emit_header(out, OFPAT_SET_DL_SRC, len);
            out.extend_from_slice(addr.as_bytes());
            put_zeros(out, 6);
        }
        Action::SetDlDst(addr) => {
            emit_header(out, OFPAT_SET_DL_DST, len);
            out.extend_from_slice(addr.as_bytes());
            put_zeros(out, 6);
        }
        Action::SetNwSrc(addr) => {
            emit_header(out, OFPAT_SET_NW_SRC, len);
            out.extend_from_slice(addr.as_bytes());
        }
        Action::SetNwDst(addr) => {
            emit_header(out, OFPAT_SET_NW_DST, len);
            out.extend_from_slice(addr.as_bytes());
        }
        Action::SetNwTos(tos) => {
            emit_header(out, OFPAT_SET_NW_TOS, len);
            out.push(tos);
            put_zeros(out, 3);
        }
        Action::SetTpSrc(port) => {
            emit_header(out, OFPAT_SET_TP_SRC, len);
            put_u16(out, port);
            put_zeros(out, 2);
        }
        Action::SetTpDst(port) => {
            emit_header(out, OFPAT_SET_TP_DST, len);
            put_u16(out, port);
            put_zeros(out, 2);
        }
        Action::Enqueue { port, queue_id } => {
            emit_header(out, OFPAT_ENQUEUE, len);
            put_u16(out, port);
            put_zeros(out, 6);
            put_u32(out, queue_id);
        }
        Action::Resubmit { in_port } => {
            emit_nx_header(out, NXAST_RESUBMIT, len);
            put_u16(out, in_port);
            put_zeros(out, 4);
        }
        Action::ResubmitTable { in_port, table } => {
            emit_nx_header(out, NXAST_RESUBMIT_TABLE, len);
            put_u16(out, in_port);
            out.push(table);
            put_zeros(out, 3);
        }
        Action::SetTunnel(tun_id) => {
            emit_nx_header(out, NXAST_SET_TUNNEL, len);
            put_zeros(out, 2);
            put_u32(out, tun_id);
        }
        Action::SetTunnel64(tun_id) => {
            emit_nx_header(out, NXAST_SET_TUNNEL64, len);
            put_zeros(out, 6);
            put_u64(out, tun_id);
        }
        Action::SetQueue(queue_id) => {
            emit_nx_header(out, NXAST_SET_QUEUE, len);
            put_zeros(out, 2);
            put_u32(out, queue_id);
        }
        Action::PopQueue => {
            emit_nx_header(out, NXAST_POP_QUEUE, len);
            put_zeros(out, 6);
        }
        Action::RegMove {
            n_bits,
            src_ofs,
            dst_ofs,
            src,
            dst,
        } => {
            emit_nx_header(out, NXAST_REG_MOVE, len);
            put_u16(out, n_bits);
            put_u16(out, src_ofs);
            put_u16(out, dst_ofs);
            put_u32(out, src);
            put_u32(out, dst);
        }
        Action::RegLoad {
            ofs_nbits,
            dst,
            value,
        } => {
            emit_nx_header(out, NXAST_REG_LOAD, len);
            put_u16(out, ofs_nbits);
            put_u32(out, dst);
            put_u64(out, value);
        }
        Action::Note(ref bytes) => {
            emit_nx_header(out, NXAST_NOTE, len);
            out.extend_from_slice(bytes);
            put_zeros(out, len - 10 - bytes.len());
        }
        Action::Multipath {
            fields,
            basis,
            algorithm,
            max_link,
            arg,
            ofs_nbits,
            dst,
        } => {
            emit_nx_header(out, NXAST_MULTIPATH, len);
            put_u16(out, fields);
            put_u16(out, basis);
            put_zeros(out, 2);
            put_u16(out, algorithm);
            put_u16(out, max_link);
            put_u32(out, arg);
            put_zeros(out, 2);
            put_u16(out, ofs_nbits);
            put_u32(out, dst);
        }
        Action::Autopath { ofs_nbits, dst, id } => {
            emit_nx_header(out, NXAST_AUTOPATH, len);
            put_u16(out, ofs_nbits);
            put_u32(out, dst);
            put_u32(out, id);
            put_zeros(out, 4);
        }
        Action::Bundle {
            load,
            algorithm,
            fields,
            basis,
            slave_type,
            ofs_nbits,
            dst,
            ref slaves,
        } => {
            let subtype = if load { NXAST_BUNDLE_LOAD } else { NXAST_BUNDLE };
            emit_nx_header(out, subtype, len);
            put_u16(out, algorithm);
            put_u16(out, fields);
            put_u16(out, basis);
            put_u32(out, slave_type);
            put_u16(out, slaves.len() as u16);
            put_u16(out, ofs_nbits);
            put_u32(out, dst);
            put_zeros(out, 4);
            for slave in slaves {
                put_u16(out, *slave);
            }
            put_zeros(out, len - 32 - slaves.len() * 2);
        }
        Action::Learn {
            idle_timeout,
            hard_timeout,
            priority,
            cookie,
            flags,
            table_id,
            fin_idle_timeout,
            fin_hard_timeout,
            ref specs,
        } => {
            emit_nx_header(out, NXAST_LEARN, len);
            put_u16(out, idle_timeout);
            put_u16(out, hard_timeout);
            put_u16(out, priority);
            put_u64(out, cookie);
            put_u16(out, flags);
            out.push(table_id);
            put_zeros(out, 1);
            put_u16(out, fin_idle_timeout);
            put_u16(out, fin_hard_timeout);
            out.extend_from_slice(specs);
            put_zeros(out, len - 32 - specs.len());
        }
        Action::Exit => {
            emit_nx_header(out, NXAST_EXIT, len);
            put_zeros(out, 6);
        }
        Action::DecTtl => {
            emit_nx_header(out, NXAST_DEC_TTL, len);
            put_zeros(out, 6);
        }
        Action::FinTimeout {
            fin_idle_timeout,
            fin_hard_timeout,
        } => {
            emit_nx_header(out, NXAST_FIN_TIMEOUT, len);
            put_u16(out, fin_idle_timeout);
            put_u16(out, fin_hard_timeout);
            put_zeros(out, 2);
        }
        Action::Controller {
            max_len,
            controller_id,
            reason,
        } => {
            emit_nx_header(out, NXAST_CONTROLLER, len);
            put_u16(out, max_len);
            put_u16(out, controller_id);
            out.push(reason);
            put_zeros(out, 1);
        }
        Action::OutputReg {
            ofs_nbits,
            src,
            max_len,
        } => {
            emit_nx_header(out, NXAST_OUTPUT_REG, len);
            put_u16(out, ofs_nbits);
            put_u32(out, src);
            put_u16(out, max_len);
            put_zeros(out, 6);
        }
        Action::SetMplsLabel(label) => {
            emit_nx_header(out, NXAST_SET_MPLS_LABEL, len);
            put_u32(out, label);
            put_zeros(out, 2);
        }
        Action::SetMplsTc(tc) => {
            emit_nx_header(out, NXAST_SET_MPLS_TC, len);
            out.push(tc);
            put_zeros(out, 5);
        }
        Action::SetMplsTtl(ttl) => {
            emit_nx_header(out, NXAST_SET_MPLS_TTL, len);
            out.push(ttl);
            put_zeros(out, 5);
        }
        Action::DecMplsTtl => {
            emit_nx_header(out, NXAST_DEC_MPLS_TTL, len);
            put_zeros(out, 6);
        }
        Action::PushMpls(ethertype) => {
            emit_nx_header(out, NXAST_PUSH_MPLS, len);
            put_u16(out, ethertype);
            put_zeros(out, 4);
        }
        Action::PopMpls(ethertype) => {
            emit_nx_header(out, NXAST_POP_MPLS, len);
            put_u16(out, ethertype);
            put_zeros(out, 4);
        }
        Action::PushVlan(ethertype) => {
            emit_nx_header(out, NXAST_PUSH_VLAN, len);
            put_u16(out, ethertype);
            put_zeros(out, 4);
        }
    }
}

/// Encode a sequence of actions in the OF1.0/Nicira form.
pub fn emit_of10(actions: &[Action]) -> Vec<u8> {
    let mut out = Vec::new();
    for action in actions {
        emit_one_of10(action, &mut out);
    }
    out
}

/// Total wire length of a sequence in the OF1.0/Nicira form.
pub fn of10_len(actions: &[Action]) -> usize {
    actions.iter().map(Action::wire_len).sum()
}

// --- OpenFlow 1.1 instructions ----------------------------------------

fn parse_one_of11_action(buffer: &[u8]) -> Result<(Action, usize)> {
    if buffer.len() < 4 {
        return Err(bad(BadActionCode::BadLen));
    }
    let ty = NetworkEndian::read_u16(&buffer[0..2]);
    let len = NetworkEndian::read_u16(&buffer[2..4]) as usize;
    if len < 8 || len % 8 != 0 || len > buffer.len() {
        return Err(bad(BadActionCode::BadLen));
    }
    let body = &buffer[4..len];
    let action = match ty {
        OFPAT11_OUTPUT => {
            expect(len, 16)?;
            let port = NetworkEndian::read_u32(&body[0..4]);
            if port > 0xffff && port < 0xffff_ff00 {
                return Err(bad(BadActionCode::BadOutPort));
            }
            Action::Output {
                // reserved ports keep their 16-bit aliases
                port: (port & 0xffff) as u16,
                max_len: NetworkEndian::read_u16(&body[4..6]),
            }
        }
        OFPAT11_SET_VLAN_VID => {
            expect(len, 8)?;
            Action::SetVlanVid(NetworkEndian::read_u16(&body[0..2]) & 0x0fff)
        }
        OFPAT11_SET_VLAN_PCP => {
            expect(len, 8)?;
            Action::SetVlanPcp(body[0] & 0x07)
        }
        OFPAT11_SET_DL_SRC => {
            expect(len, 16)?;
            Action::SetDlSrc(EthernetAddress::from_bytes(&body[0..6]))
        }
        OFPAT11_SET_DL_DST => {
            expect(len, 16)?;
            Action::SetDlDst(EthernetAddress::from_bytes(&body[0..6]))
        }
        OFPAT11_SET_NW_SRC => {
            expect(len, 8)?;
            Action::SetNwSrc(Ipv4Address::from_bytes(&body[0..4]))
        }
        OFPAT11_SET_NW_DST => {
            expect(len, 8)?;
            Action::SetNwDst(Ipv4Address::from_bytes(&body[0..4]))
        }
        OFPAT11_SET_NW_TOS => {
            expect(len, 8)?;
            Action::SetNwTos(body[0] & 0xfc)
        }
        OFPAT11_SET_TP_SRC => {
            expect(len, 8)?;
            Action::SetTpSrc(NetworkEndian::read_u16(&body[0..2]))
        }
        OFPAT11_SET_TP_DST => {
            expect(len, 8)?;
            Action::SetTpDst(NetworkEndian::read_u16(&body[0..2]))
        }
        OFPAT11_SET_MPLS_LABEL => {
            expect(len, 8)?;
            Action::SetMplsLabel(NetworkEndian::read_u32(&body[0..4]) & 0x000f_ffff)
        }
        OFPAT11_SET_MPLS_TC => {
            expect(len, 8)?;
            Action::SetMplsTc(body[0] & 0x07)
        }
        OFPAT11_SET_MPLS_TTL => {
            expect(len, 8)?;
            Action::SetMplsTtl(body[0])
        }
        OFPAT11_DEC_MPLS_TTL => {
            expect(len, 8)?;
            Action::DecMplsTtl
        }
        OFPAT11_PUSH_VLAN => {
            expect(len, 8)?;
            Action::PushVlan(NetworkEndian::read_u16(&body[0..2]))
        }
        OFPAT11_POP_VLAN => {
            expect(len, 8)?;
            Action::StripVlan
        }
        OFPAT11_PUSH_MPLS => {
            expect(len, 8)?;
            Action::PushMpls(NetworkEndian::read_u16(&body[0..2]))
        }
        OFPAT11_POP_MPLS => {
            expect(len, 8)?;
            Action::PopMpls(NetworkEndian::read_u16(&body[0..2]))
        }
        OFPAT11_SET_QUEUE => {
            expect(len, 8)?;
            Action::SetQueue(NetworkEndian::read_u32(&body[0..4]))
        }
        OFPAT11_DEC_NW_TTL => {
            expect(len, 8)?;
            Action::DecTtl
        }
        _ => return Err(bad(BadActionCode::BadType)),
    };
    Ok((action, len))
}

fn parse_of11_actions(buffer: &[u8]) -> Result<Vec<Action>> {
    let mut actions = Vec::new();
    let mut offset = 0;
    while offset < buffer.len() {
        let (action, len) = parse_one_of11_action(&buffer[offset..])?;
        actions.push(action);
        offset += len;
    }
    Ok(actions)
}

/// Parse an OF1.1 instruction region into a flattened
/// [`ActionList`](struct.ActionList.html).
pub fn parse_instructions(buffer: &[u8]) -> Result<ActionList> {
    let mut list = ActionList::default();
    let mut offset = 0;
    while offset < buffer.len() {
        if buffer.len() - offset < 8 {
            return Err(bad(BadActionCode::BadLen));
        }
        let ty = NetworkEndian::read_u16(&buffer[offset..offset + 2]);
        let len = NetworkEndian::read_u16(&buffer[offset + 2..offset + 4]) as usize;
        if len < 8 || len % 8 != 0 || offset + len > buffer.len() {
            return Err(bad(BadActionCode::BadLen));
        }
        let body = &buffer[offset + 4..offset + len];
        match ty {
            OFPIT_GOTO_TABLE => {
                list.goto_table = Some(body[0]);
            }
            OFPIT_WRITE_METADATA => {
                if len != 24 {
                    return Err(bad(BadActionCode::BadLen));
                }
                let metadata = NetworkEndian::read_u64(&body[4..12]);
                let mask = NetworkEndian::read_u64(&body[12..20]);
                list.metadata = Some((metadata, mask));
            }
            OFPIT_WRITE_ACTIONS => {
                list.written = parse_of11_actions(&body[4..])?;
            }
            OFPIT_APPLY_ACTIONS => {
                list.applied = parse_of11_actions(&body[4..])?;
            }
            OFPIT_CLEAR_ACTIONS => {
                list.clear = true;
            }
            _ => return Err(bad(BadActionCode::BadType)),
        }
        offset += len;
    }
    Ok(list)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_output_roundtrip() {
        let actions = vec![Action::Output {
            port: 2,
            max_len: 0,
        }];
        let bytes = emit_of10(&actions);
        assert_eq!(
            bytes,
            vec![0x00, 0x00, 0x00, 0x08, 0x00, 0x02, 0x00, 0x00]
        );
        assert_eq!(parse_of10(&bytes).unwrap(), actions);
    }

    #[test]
    fn test_vendor_roundtrip() {
        let actions = vec![
            Action::SetTunnel(42),
            Action::Resubmit { in_port: 1 },
            Action::Controller {
                max_len: 128,
                controller_id: 0,
                reason: 1,
            },
            Action::RegLoad {
                ofs_nbits: (5 << 6) | 11,
                dst: 0x0001_0204,
                value: 0xdead,
            },
            Action::Note(vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66]),
        ];
        let bytes = emit_of10(&actions);
        assert_eq!(bytes.len(), of10_len(&actions));
        assert_eq!(parse_of10(&bytes).unwrap(), actions);
    }

    #[test]
    fn test_unknown_vendor_rejected() {
        let mut bytes = emit_of10(&[Action::Exit]);
        // clobber the vendor id
        bytes[4] = 0xde;
        bytes[5] = 0xad;
        assert_eq!(
            parse_of10(&bytes).unwrap_err(),
            Error::Of(OfError::BadAction(BadActionCode::BadVendor))
        );
    }

    #[test]
    fn test_unknown_subtype_rejected() {
        let mut bytes = emit_of10(&[Action::Exit]);
        bytes[9] = 0xfe; // subtype
        assert_eq!(
            parse_of10(&bytes).unwrap_err(),
            Error::Of(OfError::BadAction(BadActionCode::BadVendorType))
        );
    }

    #[test]
    fn test_truncated_action_rejected() {
        let bytes = emit_of10(&[Action::StripVlan]);
        assert_eq!(
            parse_of10(&bytes[..6]).unwrap_err(),
            Error::Of(OfError::BadAction(BadActionCode::BadLen))
        );
    }

    #[test]
    fn test_bad_vlan_vid_rejected() {
        #[cfg_attr(rustfmt, rustfmt_skip)]
        let bytes = [
            0x00, 0x01, 0x00, 0x08,
            0x1f, 0xff, 0x00, 0x00,
        ];
        assert_eq!(
            parse_of10(&bytes).unwrap_err(),
            Error::Of(OfError::BadAction(BadActionCode::BadArgument))
        );
    }

    #[test]
    fn test_instruction_flattening() {
        // apply-actions [output:2] + goto table 1
        #[cfg_attr(rustfmt, rustfmt_skip)]
        let bytes = [
            // apply_actions instruction
            0x00, 0x04, 0x00, 0x18, 0x00, 0x00, 0x00, 0x00,
            // of1.1 output action, port 2, max_len 0
            0x00, 0x00, 0x00, 0x10,
            0x00, 0x00, 0x00, 0x02, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            // goto_table 1
            0x00, 0x01, 0x00, 0x08, 0x01, 0x00, 0x00, 0x00,
        ];
        let list = parse_instructions(&bytes).unwrap();
        assert_eq!(
            list.applied,
            vec![Action::Output { port: 2, max_len: 0 }]
        );
        assert!(list.written.is_empty());
        assert_eq!(list.goto_table, Some(1));
        assert!(!list.is_of10_expressible());
    }
}
