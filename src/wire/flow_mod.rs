//! Flow-mod and flow-removed messages in their OF1.0 forms. The Nicira
//! (NXM) forms of the same messages live in
//! [`wire::vendor`](../vendor/index.html); both decode to the same
//! high-level representations.

use {Error, Repr, Result};
use byteorder::{ByteOrder, NetworkEndian};

use actions::{self, ActionList};
use flow::Match;
use wire::match10::{self, MatchRepr};

/// Buffer id meaning "no buffered packet".
pub const NO_BUFFER: u32 = 0xffff_ffff;

enum_with_unknown! {
    /// Flow-mod commands.
    pub doc enum FlowModCommand(u16) {
        /// Install a new rule, replacing any exact (match, priority) twin.
        Add = 0,
        /// Replace the actions of every rule the match subsumes.
        Modify = 1,
        /// Replace the actions of the exactly matching rule.
        ModifyStrict = 2,
        /// Remove every rule the match subsumes.
        Delete = 3,
        /// Remove the exactly matching rule.
        DeleteStrict = 4
    }
}

bitflags! {
    pub struct FlowModFlags: u16 {
        const SEND_FLOW_REM = 1 << 0;
        const CHECK_OVERLAP = 1 << 1;
        const EMERG = 1 << 2;
    }
}

/// A decoded flow-mod, independent of which wire form carried it.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FlowModRepr {
    pub match_: Match,
    pub cookie: u64,
    pub command: FlowModCommand,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub priority: u16,
    pub buffer_id: u32,
    pub out_port: u16,
    pub flags: FlowModFlags,
    pub actions: ActionList,
}

mod field {
    use field::*;
    use wire::match10::MATCH_LEN;

    pub const MATCH: Field = 0..MATCH_LEN;
    pub const COOKIE: Field = MATCH_LEN..MATCH_LEN + 8;
    pub const COMMAND: Field = MATCH_LEN + 8..MATCH_LEN + 10;
    pub const IDLE_TIMEOUT: Field = MATCH_LEN + 10..MATCH_LEN + 12;
    pub const HARD_TIMEOUT: Field = MATCH_LEN + 12..MATCH_LEN + 14;
    pub const PRIORITY: Field = MATCH_LEN + 14..MATCH_LEN + 16;
    pub const BUFFER_ID: Field = MATCH_LEN + 16..MATCH_LEN + 20;
    pub const OUT_PORT: Field = MATCH_LEN + 20..MATCH_LEN + 22;
    pub const FLAGS: Field = MATCH_LEN + 22..MATCH_LEN + 24;
    pub const ACTIONS: Rest = MATCH_LEN + 24..;
}

impl Repr for FlowModRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < field::ACTIONS.start {
            return Err(Error::Truncated);
        }
        let match_ = MatchRepr::parse(&buffer[field::MATCH])?.0;
        let applied = actions::parse_of10(&buffer[field::ACTIONS.start..])?;
        Ok(FlowModRepr {
            match_,
            cookie: NetworkEndian::read_u64(&buffer[field::COOKIE]),
            command: FlowModCommand::from(NetworkEndian::read_u16(&buffer[field::COMMAND])),
            idle_timeout: NetworkEndian::read_u16(&buffer[field::IDLE_TIMEOUT]),
            hard_timeout: NetworkEndian::read_u16(&buffer[field::HARD_TIMEOUT]),
            priority: NetworkEndian::read_u16(&buffer[field::PRIORITY]),
            buffer_id: NetworkEndian::read_u32(&buffer[field::BUFFER_ID]),
            out_port: NetworkEndian::read_u16(&buffer[field::OUT_PORT]),
            flags: FlowModFlags::from_bits_truncate(NetworkEndian::read_u16(
                &buffer[field::FLAGS],
            )),
            actions: ActionList::apply(applied),
        })
    }

    fn buffer_len(&self) -> usize {
        field::ACTIONS.start + actions::of10_len(&self.actions.applied)
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < self.buffer_len() {
            return Err(Error::Exhausted);
        }
        if !self.actions.is_of10_expressible() {
            return Err(Error::Unrecognized);
        }
        MatchRepr(self.match_).emit(&mut buffer[field::MATCH])?;
        NetworkEndian::write_u64(&mut buffer[field::COOKIE], self.cookie);
        NetworkEndian::write_u16(&mut buffer[field::COMMAND], self.command.into());
        NetworkEndian::write_u16(&mut buffer[field::IDLE_TIMEOUT], self.idle_timeout);
        NetworkEndian::write_u16(&mut buffer[field::HARD_TIMEOUT], self.hard_timeout);
        NetworkEndian::write_u16(&mut buffer[field::PRIORITY], self.priority);
        NetworkEndian::write_u32(&mut buffer[field::BUFFER_ID], self.buffer_id);
        NetworkEndian::write_u16(&mut buffer[field::OUT_PORT], self.out_port);
        NetworkEndian::write_u16(&mut buffer[field::FLAGS], self.flags.bits());
        let encoded = actions::emit_of10(&self.actions.applied);
        buffer[field::ACTIONS.start..field::ACTIONS.start + encoded.len()]
            .copy_from_slice(&encoded);
        Ok(())
    }
}

enum_with_unknown! {
    /// Why a rule was removed.
    pub doc enum RemovedReason(u8) {
        /// The idle timeout fired.
        IdleTimeout = 0,
        /// The hard timeout fired.
        HardTimeout = 1,
        /// A delete flow-mod removed the rule.
        Delete = 2
    }
}

/// A decoded flow-removed notification.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FlowRemovedRepr {
    pub match_: Match,
    pub cookie: u64,
    pub priority: u16,
    pub reason: RemovedReason,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub idle_timeout: u16,
    pub packet_count: u64,
    pub byte_count: u64,
}

mod removed_field {
    use field::*;
    use wire::match10::MATCH_LEN;

    pub const MATCH: Field = 0..MATCH_LEN;
    pub const COOKIE: Field = MATCH_LEN..MATCH_LEN + 8;
    pub const PRIORITY: Field = MATCH_LEN + 8..MATCH_LEN + 10;
    pub const REASON: usize = MATCH_LEN + 10;
    pub const DURATION_SEC: Field = MATCH_LEN + 12..MATCH_LEN + 16;
    pub const DURATION_NSEC: Field = MATCH_LEN + 16..MATCH_LEN + 20;
    pub const IDLE_TIMEOUT: Field = MATCH_LEN + 20..MATCH_LEN + 22;
    pub const PACKET_COUNT: Field = MATCH_LEN + 24..MATCH_LEN + 32;
    pub const BYTE_COUNT: Field = MATCH_LEN + 32..MATCH_LEN + 40;
    pub const END: usize = MATCH_LEN + 40;
}

impl Repr for FlowRemovedRepr {
    fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < removed_field::END {
            return Err(Error::Truncated);
        }
        Ok(FlowRemovedRepr {
            match_: MatchRepr::parse(&buffer[removed_field::MATCH])?.0,
            cookie: NetworkEndian::read_u64(&buffer[removed_field::COOKIE]),
            priority: NetworkEndian::read_u16(&buffer[removed_field::PRIORITY]),
            reason: RemovedReason::from(buffer[removed_field::REASON]),
            duration_sec: NetworkEndian::read_u32(&buffer[removed_field::DURATION_SEC]),
            duration_nsec: NetworkEndian::read_u32(&buffer[removed_field::DURATION_NSEC]),
            idle_timeout: NetworkEndian::read_u16(&buffer[removed_field::IDLE_TIMEOUT]),
            packet_count: NetworkEndian::read_u64(&buffer[removed_field::PACKET_COUNT]),
            byte_count: NetworkEndian::read_u64(&buffer[removed_field::BYTE_COUNT]),
        })
    }

    fn buffer_len(&self) -> usize {
        removed_field::END
    }

    fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < self.buffer_len() {
            return Err(Error::Exhausted);
        }
        for byte in buffer[..removed_field::END].iter_mut() {
            *byte = 0;
        }
        MatchRepr(self.match_).emit(&mut buffer[removed_field::MATCH])?;
        NetworkEndian::write_u64(&mut buffer[removed_field::COOKIE], self.cookie);
        NetworkEndian::write_u16(&mut buffer[removed_field::PRIORITY], self.priority);
        buffer[removed_field::REASON] = self.reason.into();
        NetworkEndian::write_u32(&mut buffer[removed_field::DURATION_SEC], self.duration_sec);
        NetworkEndian::write_u32(
            &mut buffer[removed_field::DURATION_NSEC],
            self.duration_nsec,
        );
        NetworkEndian::write_u16(&mut buffer[removed_field::IDLE_TIMEOUT], self.idle_timeout);
        NetworkEndian::write_u64(
            &mut buffer[removed_field::PACKET_COUNT],
            self.packet_count,
        );
        NetworkEndian::write_u64(&mut buffer[removed_field::BYTE_COUNT], self.byte_count);
        Ok(())
    }
}

// Re-exported so callers do not need to reach into match10 for the only
// constant they share.
pub use wire::match10::MATCH_LEN;

#[cfg(test)]
mod test {
    use super::*;
    use actions::Action;
    use flow;
    use smoltcp::wire::Ipv4Address;

    fn sample_flow_mod() -> FlowModRepr {
        let mut m = Match::catch_all();
        m.set_dl_type(flow::ETH_TYPE_IP);
        m.set_nw_src(Ipv4Address::from_bytes(&[10, 0, 0, 1]), !0);
        FlowModRepr {
            match_: m,
            cookie: 0x1234_5678_9abc_def0,
            command: FlowModCommand::Add,
            idle_timeout: 0,
            hard_timeout: 60,
            priority: 100,
            buffer_id: NO_BUFFER,
            out_port: super::super::port_msg::OFPP_NONE,
            flags: FlowModFlags::SEND_FLOW_REM,
            actions: ActionList::apply(vec![Action::Output {
                port: 2,
                max_len: 0,
            }]),
        }
    }

    #[test]
    fn test_flow_mod_roundtrip() {
        let repr = sample_flow_mod();
        let mut bytes = vec![0; repr.buffer_len()];
        repr.emit(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 72);
        assert_eq!(FlowModRepr::parse(&bytes).unwrap(), repr);
    }

    #[test]
    fn test_flow_removed_roundtrip() {
        let repr = FlowRemovedRepr {
            match_: sample_flow_mod().match_,
            cookie: 7,
            priority: 100,
            reason: RemovedReason::HardTimeout,
            duration_sec: 1,
            duration_nsec: 200_000_000,
            idle_timeout: 0,
            packet_count: 42,
            byte_count: 4200,
        };
        let mut bytes = vec![0; repr.buffer_len()];
        repr.emit(&mut bytes).unwrap();
        assert_eq!(FlowRemovedRepr::parse(&bytes).unwrap(), repr);
    }
}
