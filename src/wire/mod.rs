//! Wire codecs for the OpenFlow control channel.
//!
//! `openflow` frames messages (header, version, message codes); the other
//! modules hold one message family each. High-level `*Repr` types follow
//! the crate-wide [`Repr`](../trait.Repr.html) contract where a body is
//! version-independent, and take an explicit version or dialect argument
//! where it is not.

pub mod error_msg;
pub mod flow_mod;
pub mod handshake;
pub mod match10;
pub mod nxm;
pub mod openflow;
pub mod packet_io;
pub mod port_msg;
pub mod stats;
pub mod vendor;

pub use self::openflow::{Kind, Packet, Version};

use {Repr, Result};

/// Compose a complete message: header plus an already-encoded body.
pub fn compose(version: Version, kind: Kind, xid: u32, body: &[u8]) -> Result<Vec<u8>> {
    let mut message = vec![0; openflow::HEADER_LEN + body.len()];
    message[openflow::HEADER_LEN..].copy_from_slice(body);
    openflow::emit_header(&mut message, version, kind, xid)?;
    Ok(message)
}

/// Compose a complete message from a body `Repr`.
pub fn compose_repr<R: Repr>(version: Version, kind: Kind, xid: u32, body: &R) -> Result<Vec<u8>> {
    let mut message = vec![0; openflow::HEADER_LEN + body.buffer_len()];
    body.emit(&mut message[openflow::HEADER_LEN..])?;
    openflow::emit_header(&mut message, version, kind, xid)?;
    Ok(message)
}

/// Compose a Nicira vendor message from its subtype and body bytes.
pub fn compose_vendor(version: Version, xid: u32, subtype: u32, body: &[u8]) -> Result<Vec<u8>> {
    let mut message = vec![0; openflow::HEADER_LEN + vendor::HEADER_LEN + body.len()];
    vendor::emit_header(&mut message[openflow::HEADER_LEN..], subtype);
    message[openflow::HEADER_LEN + vendor::HEADER_LEN..].copy_from_slice(body);
    openflow::emit_header(&mut message, version, Kind::Vendor, xid)?;
    Ok(message)
}
