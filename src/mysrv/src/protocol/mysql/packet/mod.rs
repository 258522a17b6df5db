pub mod packet_reader;
pub mod packet_writer;
pub mod writers;

use crate::protocol::mysql::constants;
use std::ops::Deref;
use winnow::error::{ErrMode, InputError};
use winnow::token::take;
use winnow::Parser;

/// `Packet` is one logical payload of the MySQL wire protocol.
/// Payloads of 16M or more arrive split into frames of `MAX_PAYLOAD_LEN`; they are joined
/// here. See [MySQL Packet](https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_basic_packets.html)
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Packet(Vec<u8>);

impl Packet {
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Packet {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}

#[inline]
fn one_frame(i: &[u8]) -> winnow::IResult<&[u8], (u8, &[u8])> {
    let (i, length) = winnow::binary::le_u24.parse_peek(i)?;
    let (i, seq) = winnow::binary::le_u8.parse_peek(i)?;
    let (i, bytes) = take(length).parse_peek(i)?;
    Ok((i, (seq, bytes)))
}

/// Parses one logical packet, returning the sequence id of its last frame.
///
/// Input that ends inside a frame backtracks so the reader can fetch more bytes;
/// frames of a split payload with non consecutive sequence ids are a hard failure.
pub fn packet(i: &[u8]) -> winnow::IResult<&[u8], (u8, Packet)> {
    let mut input = i;
    let mut payload = Vec::new();
    let mut prev_seq: Option<u8> = None;
    loop {
        let (rest, (seq, bytes)) = one_frame(input)?;
        if let Some(prev) = prev_seq {
            if seq != prev.wrapping_add(1) {
                return Err(ErrMode::Cut(InputError::new(
                    input,
                    winnow::error::ErrorKind::Verify,
                )));
            }
        }
        payload.extend_from_slice(bytes);
        input = rest;
        prev_seq = Some(seq);
        if bytes.len() < constants::MAX_PAYLOAD_LEN {
            return Ok((input, (seq, Packet(payload))));
        }
    }
}
