//! Types representing OpenFlow error messages.
//!
//! ```no_rust
//! +--------+--------+--------+--------+
//! |       type      |      code       |
//! +--------+--------+--------+--------+
//! |               data                |
//! +--------+--------+--------+--------+
//! ```
//!
//! The error taxonomy is held in version-independent enums; the numeric
//! `(type, code)` pairs differ between OpenFlow 1.0 and 1.1+ (1.0 has no
//! BAD_MATCH class, so match errors travel as Nicira extension codes in
//! the BAD_REQUEST space), and the translation lives in
//! [`OfError::wire_pair`](enum.OfError.html#method.wire_pair).

use {Error, Result};
use byteorder::{ByteOrder, NetworkEndian};
use wire::openflow::Version;

enum_with_unknown! {
    /// The code associated to a `HelloFailed` error
    pub doc enum HelloFailedCode(u16) {
        /// No compatible version.
        Incompatible = 0,
        /// Permissions error.
        Eperm = 1
    }
}

enum_with_unknown! {
    /// The code associated to a `BadRequest` error
    pub doc enum BadRequestCode(u16) {
        /// ofp_header.version not supported.
        BadVersion = 0,
        /// ofp_header.type not supported.
        BadType = 1,
        /// Stats request type not supported.
        BadStat = 2,
        /// Vendor id not supported.
        BadVendor = 3,
        /// Vendor subtype not supported.
        BadSubtype = 4,
        /// Permissions error.
        Eperm = 5,
        /// Wrong request length for type.
        BadLen = 6,
        /// Specified buffer has already been used.
        BufferEmpty = 7,
        /// Specified buffer does not exist.
        BufferUnknown = 8,
        /// Specified table id is invalid or does not exist.
        BadTableId = 9
    }
}

enum_with_unknown! {
    /// The code associated to a `BadAction` error
    pub doc enum BadActionCode(u16) {
        /// Unknown or unsupported action type.
        BadType = 0,
        /// Length problem in actions.
        BadLen = 1,
        /// Unknown vendor id specified.
        BadVendor = 2,
        /// Unknown action for vendor id.
        BadVendorType = 3,
        /// Problem validating output port.
        BadOutPort = 4,
        /// Bad action argument.
        BadArgument = 5,
        /// Permissions error.
        Eperm = 6,
        /// Can't handle this many actions.
        TooMany = 7,
        /// Problem validating output queue.
        BadQueue = 8
    }
}

enum_with_unknown! {
    /// The code associated to a `BadMatch` error
    pub doc enum BadMatchCode(u16) {
        /// Unsupported match type or general match problem.
        BadType = 0,
        /// Length problem in match.
        BadLen = 1,
        /// Unsupported field type in the match.
        BadField = 6,
        /// Unsupported value in a match field.
        BadValue = 7,
        /// Unsupported mask specified in the match.
        BadMask = 8,
        /// A prerequisite was not met.
        BadPrereq = 9,
        /// A field type was duplicated.
        DupField = 10
    }
}

enum_with_unknown! {
    /// The code associated to a `FlowModFailed` error
    pub doc enum FlowModFailedCode(u16) {
        /// Flow not added because all tables are full.
        AllTablesFull = 0,
        /// Attempted to add overlapping flow with CHECK_OVERLAP flag set.
        Overlap = 1,
        /// Permissions error.
        Eperm = 2,
        /// Flow not added because of unsupported idle/hard timeout.
        BadTimeout = 3,
        /// Unsupported or unknown command.
        BadCommand = 4,
        /// Unsupported action list or flag combination.
        Unsupported = 5,
        /// Table does not exist.
        BadTableId = 6
    }
}

enum_with_unknown! {
    /// The code associated to a `PortModFailed` error
    pub doc enum PortModFailedCode(u16) {
        /// Specified port number does not exist.
        BadPort = 0,
        /// Specified hardware address does not match the port number.
        BadHwAddr = 1
    }
}

enum_with_unknown! {
    /// The code associated to a `QueueOpFailed` error
    pub doc enum QueueOpFailedCode(u16) {
        /// Invalid port (or port does not exist).
        BadPort = 0,
        /// Queue does not exist.
        BadQueue = 1,
        /// Permissions error.
        Eperm = 2
    }
}

// Nicira extension codes carried in the OF1.0 BAD_REQUEST space, because
// OF1.0 has no BAD_MATCH error class.
const NXBRC_NXM_INVALID: u16 = 0x100;
const NXBRC_NXM_BAD_TYPE: u16 = 0x101;
const NXBRC_NXM_BAD_VALUE: u16 = 0x102;
const NXBRC_NXM_BAD_MASK: u16 = 0x103;
const NXBRC_NXM_BAD_PREREQ: u16 = 0x104;
const NXBRC_NXM_DUP_TYPE: u16 = 0x105;

/// A version-independent OpenFlow error: class plus code.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum OfError {
    HelloFailed(HelloFailedCode),
    BadRequest(BadRequestCode),
    BadAction(BadActionCode),
    BadMatch(BadMatchCode),
    FlowModFailed(FlowModFailedCode),
    PortModFailed(PortModFailedCode),
    QueueOpFailed(QueueOpFailedCode),
}

// OF1.0 error classes.
const OFPET10_HELLO_FAILED: u16 = 0;
const OFPET10_BAD_REQUEST: u16 = 1;
const OFPET10_BAD_ACTION: u16 = 2;
const OFPET10_FLOW_MOD_FAILED: u16 = 3;
const OFPET10_PORT_MOD_FAILED: u16 = 4;
const OFPET10_QUEUE_OP_FAILED: u16 = 5;

// OF1.1+ error classes.
const OFPET11_HELLO_FAILED: u16 = 0;
const OFPET11_BAD_REQUEST: u16 = 1;
const OFPET11_BAD_ACTION: u16 = 2;
const OFPET11_BAD_MATCH: u16 = 4;
const OFPET11_FLOW_MOD_FAILED: u16 = 5;
const OFPET11_PORT_MOD_FAILED: u16 = 7;
const OFPET11_QUEUE_OP_FAILED: u16 = 9;

// OF1.1 renumbered the FLOW_MOD_FAILED codes.
fn flow_mod_code_to11(code: FlowModFailedCode) -> u16 {
    match code {
        FlowModFailedCode::AllTablesFull => 1,
        FlowModFailedCode::BadTableId => 2,
        FlowModFailedCode::Overlap => 3,
        FlowModFailedCode::Eperm => 4,
        FlowModFailedCode::BadTimeout => 5,
        FlowModFailedCode::BadCommand => 6,
        FlowModFailedCode::Unsupported => 0,
        FlowModFailedCode::_Unknown(code) => code,
    }
}

fn flow_mod_code_from11(code: u16) -> FlowModFailedCode {
    match code {
        1 => FlowModFailedCode::AllTablesFull,
        2 => FlowModFailedCode::BadTableId,
        3 => FlowModFailedCode::Overlap,
        4 => FlowModFailedCode::Eperm,
        5 => FlowModFailedCode::BadTimeout,
        6 => FlowModFailedCode::BadCommand,
        0 => FlowModFailedCode::Unsupported,
        other => FlowModFailedCode::_Unknown(other),
    }
}

fn bad_match_code_to10(code: BadMatchCode) -> u16 {
    match code {
        BadMatchCode::BadType => NXBRC_NXM_BAD_TYPE,
        BadMatchCode::BadLen => NXBRC_NXM_INVALID,
        BadMatchCode::BadField => NXBRC_NXM_BAD_TYPE,
        BadMatchCode::BadValue => NXBRC_NXM_BAD_VALUE,
        BadMatchCode::BadMask => NXBRC_NXM_BAD_MASK,
        BadMatchCode::BadPrereq => NXBRC_NXM_BAD_PREREQ,
        BadMatchCode::DupField => NXBRC_NXM_DUP_TYPE,
        BadMatchCode::_Unknown(_) => NXBRC_NXM_INVALID,
    }
}

fn bad_match_code_from_nxbrc(code: u16) -> Option<BadMatchCode> {
    match code {
        NXBRC_NXM_INVALID => Some(BadMatchCode::BadLen),
        NXBRC_NXM_BAD_TYPE => Some(BadMatchCode::BadField),
        NXBRC_NXM_BAD_VALUE => Some(BadMatchCode::BadValue),
        NXBRC_NXM_BAD_MASK => Some(BadMatchCode::BadMask),
        NXBRC_NXM_BAD_PREREQ => Some(BadMatchCode::BadPrereq),
        NXBRC_NXM_DUP_TYPE => Some(BadMatchCode::DupField),
        _ => None,
    }
}

impl OfError {
    /// The numeric `(type, code)` pair for this error in `version`.
    pub fn wire_pair(&self, version: Version) -> (u16, u16) {
        let of10 = version == Version::OpenFlow1Dot0;
        match *self {
            OfError::HelloFailed(code) => (
                if of10 { OFPET10_HELLO_FAILED } else { OFPET11_HELLO_FAILED },
                code.into(),
            ),
            OfError::BadRequest(code) => (
                if of10 { OFPET10_BAD_REQUEST } else { OFPET11_BAD_REQUEST },
                code.into(),
            ),
            OfError::BadAction(code) => (
                if of10 { OFPET10_BAD_ACTION } else { OFPET11_BAD_ACTION },
                code.into(),
            ),
            OfError::BadMatch(code) => {
                if of10 {
                    (OFPET10_BAD_REQUEST, bad_match_code_to10(code))
                } else {
                    (OFPET11_BAD_MATCH, code.into())
                }
            }
            OfError::FlowModFailed(code) => {
                if of10 {
                    (OFPET10_FLOW_MOD_FAILED, code.into())
                } else {
                    (OFPET11_FLOW_MOD_FAILED, flow_mod_code_to11(code))
                }
            }
            OfError::PortModFailed(code) => (
                if of10 { OFPET10_PORT_MOD_FAILED } else { OFPET11_PORT_MOD_FAILED },
                code.into(),
            ),
            OfError::QueueOpFailed(code) => (
                if of10 { OFPET10_QUEUE_OP_FAILED } else { OFPET11_QUEUE_OP_FAILED },
                code.into(),
            ),
        }
    }

    /// Interpret a numeric `(type, code)` pair received in `version`.
    pub fn from_wire_pair(version: Version, kind: u16, code: u16) -> Result<OfError> {
        let of10 = version == Version::OpenFlow1Dot0;
        let err = if of10 {
            match kind {
                OFPET10_HELLO_FAILED => OfError::HelloFailed(code.into()),
                OFPET10_BAD_REQUEST => match bad_match_code_from_nxbrc(code) {
                    Some(match_code) => OfError::BadMatch(match_code),
                    None => OfError::BadRequest(code.into()),
                },
                OFPET10_BAD_ACTION => OfError::BadAction(code.into()),
                OFPET10_FLOW_MOD_FAILED => OfError::FlowModFailed(code.into()),
                OFPET10_PORT_MOD_FAILED => OfError::PortModFailed(code.into()),
                OFPET10_QUEUE_OP_FAILED => OfError::QueueOpFailed(code.into()),
                _ => return Err(Error::Malformed),
            }
        } else {
            match kind {
                OFPET11_HELLO_FAILED => OfError::HelloFailed(code.into()),
                OFPET11_BAD_REQUEST => OfError::BadRequest(code.into()),
                OFPET11_BAD_ACTION => OfError::BadAction(code.into()),
                OFPET11_BAD_MATCH => OfError::BadMatch(code.into()),
                OFPET11_FLOW_MOD_FAILED => {
                    OfError::FlowModFailed(flow_mod_code_from11(code))
                }
                OFPET11_PORT_MOD_FAILED => OfError::PortModFailed(code.into()),
                OFPET11_QUEUE_OP_FAILED => OfError::QueueOpFailed(code.into()),
                _ => return Err(Error::Malformed),
            }
        };
        Ok(err)
    }
}

/// Reduce any internal failure to the OpenFlow error that should be sent
/// back to the controller.
pub fn normalize(err: Error) -> OfError {
    match err {
        Error::Of(of) => of,
        Error::Truncated | Error::Exhausted | Error::Malformed => {
            OfError::BadRequest(BadRequestCode::BadLen)
        }
        Error::Unrecognized => OfError::BadRequest(BadRequestCode::BadType),
        Error::Io(_) => OfError::BadRequest(BadRequestCode::Eperm),
        Error::__Nonexhaustive => unreachable!(),
    }
}

mod field {
    use field::*;

    pub const KIND: Field = 0..2;
    pub const CODE: Field = 2..4;
    pub const DATA: Rest = 4..;
}

/// High-level representation of an error message body: the error plus up
/// to 64 bytes of the offending message.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ErrorMsgRepr {
    pub error: OfError,
    pub data: Vec<u8>,
}

impl ErrorMsgRepr {
    pub fn parse(version: Version, buffer: &[u8]) -> Result<Self> {
        if buffer.len() < field::CODE.end {
            return Err(Error::Truncated);
        }
        let kind = NetworkEndian::read_u16(&buffer[field::KIND]);
        let code = NetworkEndian::read_u16(&buffer[field::CODE]);
        Ok(ErrorMsgRepr {
            error: OfError::from_wire_pair(version, kind, code)?,
            data: buffer[field::DATA].to_vec(),
        })
    }

    pub fn buffer_len(&self) -> usize {
        field::CODE.end + self.data.len()
    }

    pub fn emit(&self, version: Version, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < self.buffer_len() {
            return Err(Error::Exhausted);
        }
        let (kind, code) = self.error.wire_pair(version);
        NetworkEndian::write_u16(&mut buffer[field::KIND], kind);
        NetworkEndian::write_u16(&mut buffer[field::CODE], code);
        buffer[field::DATA].copy_from_slice(self.data.as_slice());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_flow_mod_failed_renumbering() {
        let err = OfError::FlowModFailed(FlowModFailedCode::Overlap);
        assert_eq!(err.wire_pair(Version::OpenFlow1Dot0), (3, 1));
        assert_eq!(err.wire_pair(Version::OpenFlow1Dot2), (5, 3));
        assert_eq!(
            OfError::from_wire_pair(Version::OpenFlow1Dot0, 3, 1).unwrap(),
            err
        );
        assert_eq!(
            OfError::from_wire_pair(Version::OpenFlow1Dot2, 5, 3).unwrap(),
            err
        );
    }

    #[test]
    fn test_bad_match_travels_as_nxbrc_on_of10() {
        let err = OfError::BadMatch(BadMatchCode::BadPrereq);
        assert_eq!(err.wire_pair(Version::OpenFlow1Dot0), (1, 0x104));
        assert_eq!(err.wire_pair(Version::OpenFlow1Dot2), (4, 9));
        assert_eq!(
            OfError::from_wire_pair(Version::OpenFlow1Dot0, 1, 0x104).unwrap(),
            err
        );
    }

    #[test]
    fn test_error_msg_roundtrip() {
        let repr = ErrorMsgRepr {
            error: OfError::BadRequest(BadRequestCode::Eperm),
            data: vec![0x01, 0x0e, 0x00, 0x08, 0x00, 0x00, 0x00, 0x07],
        };
        let mut bytes = vec![0; repr.buffer_len()];
        repr.emit(Version::OpenFlow1Dot0, &mut bytes).unwrap();
        assert_eq!(&bytes[..4], &[0x00, 0x01, 0x00, 0x05]);
        let parsed = ErrorMsgRepr::parse(Version::OpenFlow1Dot0, &bytes).unwrap();
        assert_eq!(parsed, repr);
    }
}
