//! Statistics request/reply framing and the OF1.0 stats bodies.
//!
//! A stats message body starts with `(type, flags)`; replies whose bodies
//! would overflow the 16-bit message length are split into several
//! messages, all but the last carrying the `MORE` flag and every part
//! sharing the request's xid and stats type. The splitting is done by
//! [`ReplyChunker`](struct.ReplyChunker.html).

use {Error, Repr, Result};
use byteorder::{ByteOrder, NetworkEndian};

use actions::{self, ActionList};
use flow::Match;
use wire::match10::{MatchRepr, MATCH_LEN};
use wire::openflow::{self, Kind, Version};

enum_with_unknown! {
    /// Statistics classes.
    pub doc enum StatsKind(u16) {
        /// Switch description strings.
        Desc = 0,
        /// Per-flow statistics.
        Flow = 1,
        /// Aggregate statistics over matching flows.
        Aggregate = 2,
        /// Per-table statistics.
        Table = 3,
        /// Per-port counters.
        Port = 4,
        /// Per-queue counters.
        Queue = 5,
        /// Vendor extension statistics.
        Vendor = 0xffff
    }
}

/// Reply flag: more replies to follow.
pub const STATS_REPLY_MORE: u16 = 1;

/// Length of the `(type, flags)` stats header.
pub const STATS_HEADER_LEN: usize = 4;

/// Fixed widths of the description strings.
pub const DESC_STR_LEN: usize = 256;
pub const SERIAL_NUM_LEN: usize = 32;

mod field {
    use field::*;

    pub const KIND: Field = 0..2;
    pub const FLAGS: Field = 2..4;
    pub const BODY: Rest = 4..;
}

/// Split the `(type, flags)` header off a stats message payload.
pub fn parse_header(buffer: &[u8]) -> Result<(StatsKind, u16, &[u8])> {
    if buffer.len() < STATS_HEADER_LEN {
        return Err(Error::Truncated);
    }
    Ok((
        StatsKind::from(NetworkEndian::read_u16(&buffer[field::KIND])),
        NetworkEndian::read_u16(&buffer[field::FLAGS]),
        &buffer[field::BODY],
    ))
}

pub fn emit_header(buffer: &mut [u8], kind: StatsKind, flags: u16) {
    NetworkEndian::write_u16(&mut buffer[field::KIND], kind.into());
    NetworkEndian::write_u16(&mut buffer[field::FLAGS], flags);
}

fn put_padded_str(buffer: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    let copy = bytes.len().min(buffer.len() - 1);
    for (i, byte) in buffer.iter_mut().enumerate() {
        *byte = if i < copy { bytes[i] } else { 0 };
    }
}

fn read_padded_str(buffer: &[u8]) -> String {
    let len = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
    String::from_utf8_lossy(&buffer[..len]).into_owned()
}

/// Switch description strings; each is silently truncated to its fixed
/// wire width on emit.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct DescStatsRepr {
    pub mfr_desc: String,
    pub hw_desc: String,
    pub sw_desc: String,
    pub serial_num: String,
    pub dp_desc: String,
}

impl Repr for DescStatsRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < 4 * DESC_STR_LEN + SERIAL_NUM_LEN {
            return Err(Error::Truncated);
        }
        Ok(DescStatsRepr {
            mfr_desc: read_padded_str(&buffer[0..DESC_STR_LEN]),
            hw_desc: read_padded_str(&buffer[DESC_STR_LEN..2 * DESC_STR_LEN]),
            sw_desc: read_padded_str(&buffer[2 * DESC_STR_LEN..3 * DESC_STR_LEN]),
            serial_num: read_padded_str(
                &buffer[3 * DESC_STR_LEN..3 * DESC_STR_LEN + SERIAL_NUM_LEN],
            ),
            dp_desc: read_padded_str(
                &buffer[3 * DESC_STR_LEN + SERIAL_NUM_LEN..4 * DESC_STR_LEN + SERIAL_NUM_LEN],
            ),
        })
    }

    fn buffer_len(&self) -> usize {
        4 * DESC_STR_LEN + SERIAL_NUM_LEN
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < self.buffer_len() {
            return Err(Error::Exhausted);
        }
        put_padded_str(&mut buffer[0..DESC_STR_LEN], &self.mfr_desc);
        put_padded_str(&mut buffer[DESC_STR_LEN..2 * DESC_STR_LEN], &self.hw_desc);
        put_padded_str(&mut buffer[2 * DESC_STR_LEN..3 * DESC_STR_LEN], &self.sw_desc);
        put_padded_str(
            &mut buffer[3 * DESC_STR_LEN..3 * DESC_STR_LEN + SERIAL_NUM_LEN],
            &self.serial_num,
        );
        put_padded_str(
            &mut buffer[3 * DESC_STR_LEN + SERIAL_NUM_LEN..4 * DESC_STR_LEN + SERIAL_NUM_LEN],
            &self.dp_desc,
        );
        Ok(())
    }
}

/// Flow or aggregate stats request body (they share the layout).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct FlowStatsRequestRepr {
    pub match_: Match,
    pub table_id: u8,
    pub out_port: u16,
}

impl Repr for FlowStatsRequestRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < MATCH_LEN + 4 {
            return Err(Error::Truncated);
        }
        Ok(FlowStatsRequestRepr {
            match_: MatchRepr::parse(&buffer[..MATCH_LEN])?.0,
            table_id: buffer[MATCH_LEN],
            out_port: NetworkEndian::read_u16(&buffer[MATCH_LEN + 2..MATCH_LEN + 4]),
        })
    }

    fn buffer_len(&self) -> usize {
        MATCH_LEN + 4
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < self.buffer_len() {
            return Err(Error::Exhausted);
        }
        MatchRepr(self.match_).emit(&mut buffer[..MATCH_LEN])?;
        buffer[MATCH_LEN] = self.table_id;
        buffer[MATCH_LEN + 1] = 0;
        NetworkEndian::write_u16(&mut buffer[MATCH_LEN + 2..MATCH_LEN + 4], self.out_port);
        Ok(())
    }
}

/// One entry of a flow stats reply.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FlowStatsEntryRepr {
    pub table_id: u8,
    pub match_: Match,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub cookie: u64,
    pub packet_count: u64,
    pub byte_count: u64,
    pub actions: ActionList,
}

mod entry_field {
    use field::*;
    use wire::match10::MATCH_LEN;

    pub const LENGTH: Field = 0..2;
    pub const TABLE_ID: usize = 2;
    pub const MATCH: Field = 4..4 + MATCH_LEN;
    pub const DURATION_SEC: Field = MATCH_LEN + 4..MATCH_LEN + 8;
    pub const DURATION_NSEC: Field = MATCH_LEN + 8..MATCH_LEN + 12;
    pub const PRIORITY: Field = MATCH_LEN + 12..MATCH_LEN + 14;
    pub const IDLE_TIMEOUT: Field = MATCH_LEN + 14..MATCH_LEN + 16;
    pub const HARD_TIMEOUT: Field = MATCH_LEN + 16..MATCH_LEN + 18;
    // pad 6
    pub const COOKIE: Field = MATCH_LEN + 24..MATCH_LEN + 32;
    pub const PACKET_COUNT: Field = MATCH_LEN + 32..MATCH_LEN + 40;
    pub const BYTE_COUNT: Field = MATCH_LEN + 40..MATCH_LEN + 48;
    pub const ACTIONS: usize = MATCH_LEN + 48;
}

impl FlowStatsEntryRepr {
    /// Parse one entry; returns the entry and its wire length.
    pub fn parse_entry(buffer: &[u8]) -> Result<(Self, usize)> {
        if buffer.len() < entry_field::ACTIONS {
            return Err(Error::Truncated);
        }
        let length = NetworkEndian::read_u16(&buffer[entry_field::LENGTH]) as usize;
        if length < entry_field::ACTIONS || length > buffer.len() {
            return Err(Error::Truncated);
        }
        let applied = actions::parse_of10(&buffer[entry_field::ACTIONS..length])?;
        let entry = FlowStatsEntryRepr {
            table_id: buffer[entry_field::TABLE_ID],
            match_: MatchRepr::parse(&buffer[entry_field::MATCH])?.0,
            duration_sec: NetworkEndian::read_u32(&buffer[entry_field::DURATION_SEC]),
            duration_nsec: NetworkEndian::read_u32(&buffer[entry_field::DURATION_NSEC]),
            priority: NetworkEndian::read_u16(&buffer[entry_field::PRIORITY]),
            idle_timeout: NetworkEndian::read_u16(&buffer[entry_field::IDLE_TIMEOUT]),
            hard_timeout: NetworkEndian::read_u16(&buffer[entry_field::HARD_TIMEOUT]),
            cookie: NetworkEndian::read_u64(&buffer[entry_field::COOKIE]),
            packet_count: NetworkEndian::read_u64(&buffer[entry_field::PACKET_COUNT]),
            byte_count: NetworkEndian::read_u64(&buffer[entry_field::BYTE_COUNT]),
            actions: ActionList::apply(applied),
        };
        Ok((entry, length))
    }

    pub fn entry_len(&self) -> usize {
        entry_field::ACTIONS + actions::of10_len(&self.actions.applied)
    }

    pub fn emit_entry(&self, buffer: &mut [u8]) -> Result<()> {
        let len = self.entry_len();
        if buffer.len() < len {
            return Err(Error::Exhausted);
        }
        for byte in buffer[..len].iter_mut() {
            *byte = 0;
        }
        NetworkEndian::write_u16(&mut buffer[entry_field::LENGTH], len as u16);
        buffer[entry_field::TABLE_ID] = self.table_id;
        MatchRepr(self.match_).emit(&mut buffer[entry_field::MATCH])?;
        NetworkEndian::write_u32(&mut buffer[entry_field::DURATION_SEC], self.duration_sec);
        NetworkEndian::write_u32(&mut buffer[entry_field::DURATION_NSEC], self.duration_nsec);
        NetworkEndian::write_u16(&mut buffer[entry_field::PRIORITY], self.priority);
        NetworkEndian::write_u16(&mut buffer[entry_field::IDLE_TIMEOUT], self.idle_timeout);
        NetworkEndian::write_u16(&mut buffer[entry_field::HARD_TIMEOUT], self.hard_timeout);
        NetworkEndian::write_u64(&mut buffer[entry_field::COOKIE], self.cookie);
        NetworkEndian::write_u64(&mut buffer[entry_field::PACKET_COUNT], self.packet_count);
        NetworkEndian::write_u64(&mut buffer[entry_field::BYTE_COUNT], self.byte_count);
        let encoded = actions::emit_of10(&self.actions.applied);
        buffer[entry_field::ACTIONS..entry_field::ACTIONS + encoded.len()]
            .copy_from_slice(&encoded);
        Ok(())
    }
}

/// Aggregate stats reply body.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct AggregateStatsRepr {
    pub packet_count: u64,
    pub byte_count: u64,
    pub flow_count: u32,
}

impl Repr for AggregateStatsRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < 24 {
            return Err(Error::Truncated);
        }
        Ok(AggregateStatsRepr {
            packet_count: NetworkEndian::read_u64(&buffer[0..8]),
            byte_count: NetworkEndian::read_u64(&buffer[8..16]),
            flow_count: NetworkEndian::read_u32(&buffer[16..20]),
        })
    }

    fn buffer_len(&self) -> usize {
        24
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < 24 {
            return Err(Error::Exhausted);
        }
        for byte in buffer[..24].iter_mut() {
            *byte = 0;
        }
        NetworkEndian::write_u64(&mut buffer[0..8], self.packet_count);
        NetworkEndian::write_u64(&mut buffer[8..16], self.byte_count);
        NetworkEndian::write_u32(&mut buffer[16..20], self.flow_count);
        Ok(())
    }
}

/// One entry of a table stats reply.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TableStatsEntryRepr {
    pub table_id: u8,
    pub name: String,
    pub wildcards: u32,
    pub max_entries: u32,
    pub active_count: u32,
    pub lookup_count: u64,
    pub matched_count: u64,
}

const TABLE_NAME_LEN: usize = 32;
const TABLE_ENTRY_LEN: usize = 64;

impl Repr for TableStatsEntryRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < TABLE_ENTRY_LEN {
            return Err(Error::Truncated);
        }
        Ok(TableStatsEntryRepr {
            table_id: buffer[0],
            name: read_padded_str(&buffer[4..4 + TABLE_NAME_LEN]),
            wildcards: NetworkEndian::read_u32(&buffer[36..40]),
            max_entries: NetworkEndian::read_u32(&buffer[40..44]),
            active_count: NetworkEndian::read_u32(&buffer[44..48]),
            lookup_count: NetworkEndian::read_u64(&buffer[48..56]),
            matched_count: NetworkEndian::read_u64(&buffer[56..64]),
        })
    }

    fn buffer_len(&self) -> usize {
        TABLE_ENTRY_LEN
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < TABLE_ENTRY_LEN {
            return Err(Error::Exhausted);
        }
        for byte in buffer[..TABLE_ENTRY_LEN].iter_mut() {
            *byte = 0;
        }
        buffer[0] = self.table_id;
        put_padded_str(&mut buffer[4..4 + TABLE_NAME_LEN], &self.name);
        NetworkEndian::write_u32(&mut buffer[36..40], self.wildcards);
        NetworkEndian::write_u32(&mut buffer[40..44], self.max_entries);
        NetworkEndian::write_u32(&mut buffer[44..48], self.active_count);
        NetworkEndian::write_u64(&mut buffer[48..56], self.lookup_count);
        NetworkEndian::write_u64(&mut buffer[56..64], self.matched_count);
        Ok(())
    }
}

/// Port stats request body.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct PortStatsRequestRepr {
    pub port_no: u16,
}

impl Repr for PortStatsRequestRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < 8 {
            return Err(Error::Truncated);
        }
        Ok(PortStatsRequestRepr {
            port_no: NetworkEndian::read_u16(&buffer[0..2]),
        })
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
        NetworkEndian::write_u16(&mut buffer[0..2], self.port_no);
        Ok(())
    }
}

/// Per-port counters. A counter the provider cannot supply is encoded as
/// all-ones, as the protocol prescribes.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct PortStatsEntryRepr {
    pub port_no: u16,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_frame_err: u64,
    pub rx_over_err: u64,
    pub rx_crc_err: u64,
    pub collisions: u64,
}

const PORT_ENTRY_LEN: usize = 104;

impl Repr for PortStatsEntryRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < PORT_ENTRY_LEN {
            return Err(Error::Truncated);
        }
        let c = |i: usize| NetworkEndian::read_u64(&buffer[8 + i * 8..16 + i * 8]);
        Ok(PortStatsEntryRepr {
            port_no: NetworkEndian::read_u16(&buffer[0..2]),
            rx_packets: c(0),
            tx_packets: c(1),
            rx_bytes: c(2),
            tx_bytes: c(3),
            rx_dropped: c(4),
            tx_dropped: c(5),
            rx_errors: c(6),
            tx_errors: c(7),
            rx_frame_err: c(8),
            rx_over_err: c(9),
            rx_crc_err: c(10),
            collisions: c(11),
        })
    }

    fn buffer_len(&self) -> usize {
        PORT_ENTRY_LEN
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < PORT_ENTRY_LEN {
            return Err(Error::Exhausted);
        }
        for byte in buffer[..PORT_ENTRY_LEN].iter_mut() {
            *byte = 0;
        }
        NetworkEndian::write_u16(&mut buffer[0..2], self.port_no);
        let values = [
            self.rx_packets,
            self.tx_packets,
            self.rx_bytes,
            self.tx_bytes,
            self.rx_dropped,
            self.tx_dropped,
            self.rx_errors,
            self.tx_errors,
            self.rx_frame_err,
            self.rx_over_err,
            self.rx_crc_err,
            self.collisions,
        ];
        for (i, value) in values.iter().enumerate() {
            NetworkEndian::write_u64(&mut buffer[8 + i * 8..16 + i * 8], *value);
        }
        Ok(())
    }
}

/// Builds a sequence of stats replies, splitting whenever the pending
/// reply would overflow the 16-bit message length. Every emitted message
/// shares the request's xid and stats type; all but the last carry
/// [`STATS_REPLY_MORE`](constant.STATS_REPLY_MORE.html).
pub struct ReplyChunker {
    version: Version,
    xid: u32,
    kind: StatsKind,
    /// Extra header bytes after (type, flags) repeated in every part;
    /// vendor stats put their (vendor, subtype) pair here.
    sub_header: Vec<u8>,
    done: Vec<Vec<u8>>,
    current: Vec<u8>,
}

impl ReplyChunker {
    pub fn new(version: Version, xid: u32, kind: StatsKind) -> Self {
        ReplyChunker::with_sub_header(version, xid, kind, Vec::new())
    }

    pub fn with_sub_header(
        version: Version,
        xid: u32,
        kind: StatsKind,
        sub_header: Vec<u8>,
    ) -> Self {
        let mut chunker = ReplyChunker {
            version,
            xid,
            kind,
            sub_header,
            done: Vec::new(),
            current: Vec::new(),
        };
        chunker.start();
        chunker
    }

    fn start(&mut self) {
        self.current = vec![0; openflow::HEADER_LEN + STATS_HEADER_LEN];
        emit_header(
            &mut self.current[openflow::HEADER_LEN..],
            self.kind,
            0,
        );
        let sub = self.sub_header.clone();
        self.current.extend_from_slice(&sub);
    }

    fn seal(&mut self, more: bool) -> Result<()> {
        let flags = if more { STATS_REPLY_MORE } else { 0 };
        emit_header(&mut self.current[openflow::HEADER_LEN..], self.kind, flags);
        let mut message = ::std::mem::replace(&mut self.current, Vec::new());
        openflow::emit_header(
            &mut message,
            self.version,
            Kind::StatsReply,
            self.xid,
        )?;
        self.done.push(message);
        Ok(())
    }

    /// Append one reply entry, splitting first if it would not fit.
    pub fn push(&mut self, entry: &[u8]) -> Result<()> {
        if self.current.len() + entry.len() > openflow::MAX_LENGTH {
            self.seal(true)?;
            self.start();
        }
        self.current.extend_from_slice(entry);
        Ok(())
    }

    /// Seal the pending reply and return the full message sequence.
    pub fn finish(mut self) -> Result<Vec<Vec<u8>>> {
        self.seal(false)?;
        Ok(self.done)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_desc_roundtrip() {
        let repr = DescStatsRepr {
            mfr_desc: "Nicira Networks, Inc.".to_string(),
            hw_desc: "Open vSwitch".to_string(),
            sw_desc: "1.0".to_string(),
            serial_num: "None".to_string(),
            dp_desc: "br0".to_string(),
        };
        let mut bytes = vec![0xff; repr.buffer_len()];
        repr.emit(&mut bytes).unwrap();
        assert_eq!(DescStatsRepr::parse(&bytes).unwrap(), repr);
    }

    #[test]
    fn test_port_stats_roundtrip() {
        let repr = PortStatsEntryRepr {
            port_no: 3,
            rx_packets: 1,
            tx_packets: 2,
            rx_bytes: 3,
            tx_bytes: 4,
            ..PortStatsEntryRepr::default()
        };
        let mut bytes = vec![0; repr.buffer_len()];
        repr.emit(&mut bytes).unwrap();
        assert_eq!(PortStatsEntryRepr::parse(&bytes).unwrap(), repr);
    }

    #[test]
    fn test_chunker_splits_on_overflow() {
        let mut chunker = ReplyChunker::new(Version::OpenFlow1Dot0, 42, StatsKind::Flow);
        // Each entry is 1 KiB; 80 of them cannot fit one 64 KiB message.
        let entry = vec![0xab; 1024];
        for _ in 0..80 {
            chunker.push(&entry).unwrap();
        }
        let messages = chunker.finish().unwrap();
        assert_eq!(messages.len(), 2);
        for (i, message) in messages.iter().enumerate() {
            assert!(message.len() <= openflow::MAX_LENGTH);
            let packet = openflow::Packet::new_checked(&message[..]).unwrap();
            assert_eq!(packet.xid(), 42);
            assert_eq!(packet.kind().unwrap(), Kind::StatsReply);
            let (kind, flags, _) = parse_header(packet.payload()).unwrap();
            assert_eq!(kind, StatsKind::Flow);
            let last = i == messages.len() - 1;
            assert_eq!(flags & STATS_REPLY_MORE != 0, !last);
        }
    }
}
