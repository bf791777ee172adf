//! The ahoi packet format: a 6-byte header, a variable-length payload, and
//! an optional 6-byte footer (present only for over-the-air data/ACK
//! packets, i.e. `type < 0x80`).

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use nom::{number::complete::be_u8, sequence::tuple, IResult};

use crate::constants::*;
use crate::error::{Error, Result};

/// An 8-bit modem address. `255` is the broadcast address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Address(pub u8);

impl Address {
    pub const BROADCAST: Address = Address(ADDR_BROADCAST);

    pub fn is_broadcast(&self) -> bool {
        self.0 == ADDR_BROADCAST
    }
}

impl From<u8> for Address {
    fn from(b: u8) -> Self {
        Address(b)
    }
}

impl From<Address> for u8 {
    fn from(a: Address) -> Self {
        a.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Low bits of [Header::status]: what kind of acknowledgement, if any, is
/// requested for this packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckKind {
    None,
    Plain,
    Ranging,
}

impl From<u8> for AckKind {
    fn from(b: u8) -> Self {
        match b & 0b11 {
            ACK_PLAIN => AckKind::Plain,
            ACK_RANGE => AckKind::Ranging,
            _ => AckKind::None,
        }
    }
}

impl From<AckKind> for u8 {
    fn from(k: AckKind) -> Self {
        match k {
            AckKind::None => ACK_NONE,
            AckKind::Plain => ACK_PLAIN,
            AckKind::Ranging => ACK_RANGE,
        }
    }
}

/// The 6-byte packet header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub src: Address,
    pub dst: Address,
    pub ty: u8,
    pub status: u8,
    pub dsn: u8,
    pub len: u8,
}

impl Header {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        [
            self.src.0,
            self.dst.0,
            self.ty,
            self.status,
            self.dsn,
            self.len,
        ]
    }

    pub fn ack_kind(&self) -> AckKind {
        AckKind::from(self.status)
    }
}

fn parse_header(input: &[u8]) -> IResult<&[u8], Header> {
    let (rest, (src, dst, ty, status, dsn, len)) =
        tuple((be_u8, be_u8, be_u8, be_u8, be_u8, be_u8))(input)?;
    Ok((
        rest,
        Header {
            src: Address(src),
            dst: Address(dst),
            ty,
            status,
            dsn,
            len,
        },
    ))
}

/// Footer appended to over-the-air data/ACK packets (`type < 0x80`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Footer {
    pub power: u8,
    pub rssi: u8,
    pub biterrors: u8,
    pub agc_mean: u8,
    pub agc_min: u8,
    pub agc_max: u8,
}

impl Footer {
    pub fn to_bytes(&self) -> [u8; FOOTER_LEN] {
        [
            self.power,
            self.rssi,
            self.biterrors,
            self.agc_mean,
            self.agc_min,
            self.agc_max,
        ]
    }
}

fn parse_footer(input: &[u8]) -> IResult<&[u8], Footer> {
    let (rest, (power, rssi, biterrors, agc_mean, agc_min, agc_max)) =
        tuple((be_u8, be_u8, be_u8, be_u8, be_u8, be_u8))(input)?;
    Ok((
        rest,
        Footer {
            power,
            rssi,
            biterrors,
            agc_mean,
            agc_min,
            agc_max,
        },
    ))
}

/// A full ahoi packet: header, payload, and optional footer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Bytes,
    pub footer: Option<Footer>,
}

impl Packet {
    /// Returns true if `type >= 0x80`, i.e. this is a host<->modem command
    /// packet rather than an over-the-air application packet.
    pub fn is_cmd_type(&self) -> bool {
        self.header.ty >= TYPE_CMD_BASE
    }

    pub fn has_footer(&self) -> bool {
        self.footer.is_some()
    }

    /// Serializes header + payload + optional footer, in that order.
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len() + FOOTER_LEN);
        buf.put_slice(&self.header.to_bytes());
        buf.put_slice(&self.payload);
        if let Some(footer) = &self.footer {
            buf.put_slice(&footer.to_bytes());
        }
        buf
    }

    /// Parses a full unstuffed frame. The footer is present iff
    /// `header.type < 0x80` AND exactly 6 bytes remain after the payload;
    /// any other trailing residue is a malformed frame.
    pub fn from_bytes(src: &[u8]) -> Result<Packet> {
        let (rest, header) = parse_header(src).map_err(|_| Error::Parse)?;
        let len = header.len as usize;
        if rest.len() < len {
            return Err(Error::Parse);
        }
        let (payload, rest) = rest.split_at(len);
        let footer = if header.ty < TYPE_CMD_BASE && rest.len() == FOOTER_LEN {
            let (_, footer) = parse_footer(rest).map_err(|_| Error::Parse)?;
            Some(footer)
        } else if rest.is_empty() {
            None
        } else {
            return Err(Error::Parse);
        };

        Ok(Packet {
            header,
            payload: Bytes::copy_from_slice(payload),
            footer,
        })
    }

    /// Renders the packet as a space-separated hex string, the way the log
    /// and TX/RX echo lines do.
    pub fn to_hex_string(&self) -> String {
        self.to_bytes()
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Fills in all header fields and sets `len` to the payload's byte count.
pub fn make_packet(
    src: Address,
    dst: Address,
    ty: u8,
    status: u8,
    dsn: u8,
    payload: Bytes,
) -> Packet {
    let header = Header {
        src,
        dst,
        ty,
        status,
        dsn,
        len: payload.len() as u8,
    };
    Packet {
        header,
        payload,
        footer: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_command_packet() {
        let pkt = make_packet(
            Address(1),
            Address::BROADCAST,
            0x80,
            0,
            7,
            Bytes::new(),
        );
        assert_eq!(pkt.to_bytes().as_ref(), &[0x01, 0xFF, 0x80, 0x00, 0x07, 0x00]);
    }

    #[test]
    fn roundtrip_without_footer() {
        let pkt = make_packet(
            Address(1),
            Address(2),
            0x7A,
            1,
            42,
            Bytes::from_static(&[0xAA, 0xBB]),
        );
        let bytes = pkt.to_bytes();
        let decoded = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, pkt);
        assert!(!decoded.has_footer());
    }

    #[test]
    fn roundtrip_with_footer() {
        let header = [0x05u8, 0x01, 0x7B, 0x01, 0x2A, 0x04];
        let payload = [0xAAu8, 0xBB, 0xCC, 0xDD];
        let footer = [0x11u8, 0x22, 0x33, 0x44, 0x55, 0x66];
        let mut raw = Vec::new();
        raw.extend_from_slice(&header);
        raw.extend_from_slice(&payload);
        raw.extend_from_slice(&footer);

        let pkt = Packet::from_bytes(&raw).unwrap();
        assert!(pkt.has_footer());
        let f = pkt.footer.unwrap();
        assert_eq!(
            (f.power, f.rssi, f.biterrors, f.agc_mean, f.agc_min, f.agc_max),
            (0x11, 0x22, 0x33, 0x44, 0x55, 0x66)
        );
    }

    #[test]
    fn cmd_type_has_no_footer_even_with_trailing_bytes() {
        // type 0x80 is a command type; footer detection must not trigger.
        let mut raw = vec![0x00u8, 0xFF, 0x80, 0x00, 0x00, 0x00];
        raw.extend_from_slice(&[0u8; 6]);
        assert!(Packet::from_bytes(&raw).is_err());
    }

    #[test]
    fn malformed_residue_is_rejected() {
        // type < 0x80 (air packet) with 3 trailing bytes: neither 0 nor 6.
        let mut raw = vec![0x00u8, 0xFF, 0x01, 0x00, 0x00, 0x00];
        raw.extend_from_slice(&[0u8; 3]);
        assert!(matches!(Packet::from_bytes(&raw), Err(Error::Parse)));
    }

    #[test]
    fn cmd_type_query() {
        let pkt = make_packet(Address(0), Address(0), 0x7B, 0, 0, Bytes::new());
        assert!(!pkt.is_cmd_type());
        let pkt = make_packet(Address(0), Address(0), 0x80, 0, 0, Bytes::new());
        assert!(pkt.is_cmd_type());
    }

    #[test]
    fn serialized_length_matches_footer_presence() {
        let air_pkt = make_packet(Address(0), Address(0), 0x7B, 0, 0, Bytes::from_static(b"xy"));
        assert_eq!(air_pkt.to_bytes().len(), HEADER_LEN + 2);

        let mut with_footer = air_pkt.clone();
        with_footer.footer = Some(Footer::default());
        assert_eq!(with_footer.to_bytes().len(), HEADER_LEN + 2 + FOOTER_LEN);

        let cmd_pkt = make_packet(Address(0), Address(0), 0x80, 0, 0, Bytes::from_static(b"xy"));
        assert_eq!(cmd_pkt.to_bytes().len(), HEADER_LEN + 2);
    }
}
