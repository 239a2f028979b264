//! A read/write wrapper around an OpenFlow message buffer.
//!
//! ```no_rust
//! +--------+--------+--------+--------+
//! |version |  type  |     length      |
//! +--------+--------+--------+--------+
//! |                xid                |
//! +--------+--------+--------+--------+
//! |              payload              |
//! +--------+--------+--------+--------+
//! ```
//!
//! - The version field indicates the version of OpenFlow which this message belongs
//! - The length field gives the message length, including the header itself.
//! - The xid, or transaction identifier, is a unique value used to match requests to responses.
//!
//! The numeric `type` space changed between protocol versions, so raw type
//! bytes are never used directly: [`Kind::from_wire`] maps a
//! `(version, type)` pair to a version-independent message code and
//! [`Kind::to_wire`] maps it back.

use {Error, Result};
use byteorder::{ByteOrder, NetworkEndian};
use wire::error_msg::{BadRequestCode, OfError};

/// Largest message the protocol can frame: the length field is 16 bits.
pub const MAX_LENGTH: usize = 65_535;

/// Length of the fixed header.
pub const HEADER_LEN: usize = 8;

enum_with_unknown! {
    /// OpenFlow version
    pub doc enum Version(u8) {
        /// OpenFlow 1.0
        OpenFlow1Dot0 = 1,
        /// OpenFlow 1.1
        OpenFlow1Dot1 = 2,
        /// OpenFlow 1.2
        OpenFlow1Dot2 = 3
    }
}

/// Version-independent message codes.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Kind {
    Hello,
    Error,
    EchoRequest,
    EchoReply,
    Vendor,
    FeaturesRequest,
    FeaturesReply,
    GetConfigRequest,
    GetConfigReply,
    SetConfig,
    PacketIn,
    FlowRemoved,
    PortStatus,
    PacketOut,
    FlowMod,
    GroupMod,
    PortMod,
    TableMod,
    StatsRequest,
    StatsReply,
    BarrierRequest,
    BarrierReply,
    QueueGetConfigRequest,
    QueueGetConfigReply,
    RoleRequest,
    RoleReply,
}

// (kind, of10, of11+). Codes 0 through 9 are identical in every version;
// the numbering diverges at PACKET_IN only in OF1.1 where GROUP_MOD was
// inserted after PACKET_OUT/FLOW_MOD.
const KIND_TABLE: &[(Kind, Option<u8>, Option<u8>)] = &[
    (Kind::Hello, Some(0), Some(0)),
    (Kind::Error, Some(1), Some(1)),
    (Kind::EchoRequest, Some(2), Some(2)),
    (Kind::EchoReply, Some(3), Some(3)),
    (Kind::Vendor, Some(4), Some(4)),
    (Kind::FeaturesRequest, Some(5), Some(5)),
    (Kind::FeaturesReply, Some(6), Some(6)),
    (Kind::GetConfigRequest, Some(7), Some(7)),
    (Kind::GetConfigReply, Some(8), Some(8)),
    (Kind::SetConfig, Some(9), Some(9)),
    (Kind::PacketIn, Some(10), Some(10)),
    (Kind::FlowRemoved, Some(11), Some(11)),
    (Kind::PortStatus, Some(12), Some(12)),
    (Kind::PacketOut, Some(13), Some(13)),
    (Kind::FlowMod, Some(14), Some(14)),
    (Kind::GroupMod, None, Some(15)),
    (Kind::PortMod, Some(15), Some(16)),
    (Kind::TableMod, None, Some(17)),
    (Kind::StatsRequest, Some(16), Some(18)),
    (Kind::StatsReply, Some(17), Some(19)),
    (Kind::BarrierRequest, Some(18), Some(20)),
    (Kind::BarrierReply, Some(19), Some(21)),
    (Kind::QueueGetConfigRequest, Some(20), Some(22)),
    (Kind::QueueGetConfigReply, Some(21), Some(23)),
    (Kind::RoleRequest, None, Some(24)),
    (Kind::RoleReply, None, Some(25)),
];

impl Kind {
    /// Map a `(version, type)` pair to a message code.
    pub fn from_wire(version: Version, ty: u8) -> Result<Kind> {
        for &(kind, of10, of11) in KIND_TABLE {
            let wire = match version {
                Version::OpenFlow1Dot0 => of10,
                Version::OpenFlow1Dot1 => of11,
                Version::OpenFlow1Dot2 => of11,
                Version::_Unknown(_) => None,
            };
            if wire == Some(ty) {
                // ROLE_REQUEST/ROLE_REPLY only exist from OF1.2 on.
                if (kind == Kind::RoleRequest || kind == Kind::RoleReply)
                    && version == Version::OpenFlow1Dot1
                {
                    continue;
                }
                return Ok(kind);
            }
        }
        Err(Error::Of(OfError::BadRequest(BadRequestCode::BadType)))
    }

    /// Map a message code back to the numeric type of `version`.
    pub fn to_wire(&self, version: Version) -> Result<u8> {
        for &(kind, of10, of11) in KIND_TABLE {
            if kind != *self {
                continue;
            }
            let wire = match version {
                Version::OpenFlow1Dot0 => of10,
                Version::OpenFlow1Dot1 => {
                    if kind == Kind::RoleRequest || kind == Kind::RoleReply {
                        None
                    } else {
                        of11
                    }
                }
                Version::OpenFlow1Dot2 => of11,
                Version::_Unknown(_) => None,
            };
            return wire.ok_or(Error::Unrecognized);
        }
        Err(Error::Unrecognized)
    }
}

/// A wrapper around a buffer that represents an OpenFlow message. `Packet`
/// provides getters and setters for each of the OpenFlow header fields.
#[derive(Debug)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

mod field {
    use field::*;

    pub const VERSION: usize = 0;
    pub const KIND: usize = 1;
    pub const LENGTH: Field = 2..4;
    pub const XID: Field = 4..8;
}

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with OpenFlow message structure.
    pub fn new(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    /// Shorthand for a combination of [new] and [check_len].
    ///
    /// [new]: #method.new
    /// [check_len]: #method.check_len
    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that no accessor method will panic if called, and that the
    /// buffer holds exactly the bytes announced by the length field.
    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < HEADER_LEN {
            return Err(Error::Truncated);
        }
        let announced = self.length() as usize;
        if announced < HEADER_LEN || len < announced {
            return Err(Error::Truncated);
        }
        if len > announced {
            return Err(Error::Malformed);
        }
        Ok(())
    }

    /// Consume the packet, returning the underlying buffer.
    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Return the version field.
    #[inline]
    pub fn version(&self) -> Version {
        let data = self.buffer.as_ref();
        Version::from(data[field::VERSION])
    }

    /// Return the raw type byte. Interpretation depends on the version; see
    /// [Kind::from_wire](enum.Kind.html#method.from_wire).
    #[inline]
    pub fn raw_kind(&self) -> u8 {
        let data = self.buffer.as_ref();
        data[field::KIND]
    }

    /// Return the type field mapped to a version-independent message code.
    #[inline]
    pub fn kind(&self) -> Result<Kind> {
        Kind::from_wire(self.version(), self.raw_kind())
    }

    /// Return the length field. The length covers the whole message,
    /// header included.
    #[inline]
    pub fn length(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::LENGTH])
    }

    /// Return the xid field. The xid, or transaction identifier, is a unique value used to match
    /// requests to responses
    #[inline]
    pub fn xid(&self) -> u32 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u32(&data[field::XID])
    }

    /// Return the header length.
    pub fn header_len(&self) -> usize {
        field::XID.end
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    /// Return a pointer to the payload.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let range = HEADER_LEN..self.length() as usize;
        let data = self.buffer.as_ref();
        &data[range]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Set the version field.
    #[inline]
    pub fn set_version(&mut self, value: Version) {
        let data = self.buffer.as_mut();
        data[field::VERSION] = value.into()
    }

    /// Set the type field from a raw byte.
    #[inline]
    pub fn set_raw_kind(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[field::KIND] = value
    }

    /// Set the length.
    #[inline]
    pub fn set_length(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::LENGTH], value)
    }

    /// Set the xid field.
    #[inline]
    pub fn set_xid(&mut self, value: u32) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u32(&mut data[field::XID], value)
    }
}

impl<'a, T: AsRef<[u8]> + AsMut<[u8]> + ?Sized> Packet<&'a mut T> {
    /// Return a mutable pointer to the payload.
    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let range = HEADER_LEN..self.length() as usize;
        let data = self.buffer.as_mut();
        &mut data[range]
    }
}

/// Write a complete header in one call; every reply composer uses this.
pub fn emit_header(buffer: &mut [u8], version: Version, kind: Kind, xid: u32) -> Result<()> {
    if buffer.len() < HEADER_LEN || buffer.len() > MAX_LENGTH {
        return Err(Error::Exhausted);
    }
    let raw = kind.to_wire(version)?;
    let len = buffer.len() as u16;
    let mut packet = Packet::new(buffer);
    packet.set_version(version);
    packet.set_raw_kind(raw);
    packet.set_length(len);
    packet.set_xid(xid);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_kind_mapping_diverges() {
        // PORT_MOD moved from 15 to 16 when GROUP_MOD was inserted.
        assert_eq!(Kind::from_wire(Version::OpenFlow1Dot0, 15).unwrap(), Kind::PortMod);
        assert_eq!(Kind::from_wire(Version::OpenFlow1Dot2, 16).unwrap(), Kind::PortMod);
        assert_eq!(Kind::PortMod.to_wire(Version::OpenFlow1Dot0).unwrap(), 15);
        assert_eq!(Kind::PortMod.to_wire(Version::OpenFlow1Dot2).unwrap(), 16);
    }

    #[test]
    fn test_kind_unknown_rejected() {
        assert!(Kind::from_wire(Version::OpenFlow1Dot0, 24).is_err());
        assert!(Kind::from_wire(Version::OpenFlow1Dot1, 24).is_err());
        assert!(Kind::from_wire(Version::OpenFlow1Dot2, 24).is_ok());
    }

    #[test]
    fn test_length_must_cover_buffer() {
        let mut bytes = [0u8; 12];
        bytes[0] = 1; // version
        bytes[3] = 12; // length
        assert!(Packet::new_checked(&bytes[..]).is_ok());
        bytes[3] = 10; // trailing garbage
        assert_eq!(Packet::new_checked(&bytes[..]).unwrap_err(), Error::Malformed);
        bytes[3] = 16; // announced more than received
        assert_eq!(Packet::new_checked(&bytes[..]).unwrap_err(), Error::Truncated);
    }
}
