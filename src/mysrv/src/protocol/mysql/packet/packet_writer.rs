use crate::protocol::mysql::constants;
use byteorder::{ByteOrder, LittleEndian};

use std::io;
use std::io::prelude::*;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// [PacketWriter] collects one payload through [`std::io::Write`] and frames it on
/// [`PacketWriter::end_packet`].
pub struct PacketWriter<W> {
    buf: Vec<u8>,
    seq: u8,
    pub inner_writer: W,
}

impl<W> PacketWriter<W> {
    pub fn new(write: W) -> Self {
        Self {
            buf: Vec::new(),
            seq: 0,
            inner_writer: write,
        }
    }

    pub fn set_seq(&mut self, seq: u8) {
        self.seq = seq;
    }

    fn increase_seq(&mut self) {
        self.seq = self.seq.wrapping_add(1);
    }

    pub fn reset_seq(&mut self) {
        self.seq = 0;
    }

    pub fn seq(&self) -> u8 {
        self.seq
    }
}

impl<W> Write for PacketWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: AsyncWrite + Unpin> PacketWriter<W> {
    /// Frames the buffered payload and writes it to the inner writer.
    ///
    /// A payload of exactly `MAX_PAYLOAD_LEN` (or a multiple of it) is followed by an empty
    /// frame so the peer knows the packet ended.
    pub async fn end_packet(&mut self) -> io::Result<()> {
        let raw_packet = std::mem::take(&mut self.buf);
        let mut frame = Vec::with_capacity(
            constants::PACKET_HEADER_LEN + raw_packet.len().min(constants::MAX_PAYLOAD_LEN),
        );
        let mut offset = 0;
        loop {
            let end = raw_packet.len().min(offset + constants::MAX_PAYLOAD_LEN);
            let chunk = &raw_packet[offset..end];
            let mut header = [0; constants::PACKET_HEADER_LEN];
            LittleEndian::write_u24(&mut header, chunk.len() as u32);
            header[3] = self.seq();
            self.increase_seq();

            frame.clear();
            frame.extend_from_slice(&header);
            frame.extend_from_slice(chunk);
            self.inner_writer.write_all(&frame).await?;

            offset = end;
            if chunk.len() < constants::MAX_PAYLOAD_LEN {
                return Ok(());
            }
        }
    }

    pub async fn flush_all(&mut self) -> io::Result<()> {
        self.inner_writer.flush().await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.buf.clear();
        self.inner_writer.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::PacketWriter;
    use std::io::Write;

    #[tokio::test]
    async fn test_write_one_packet() {
        let mut out = Vec::new();
        let mut writer = PacketWriter::new(&mut out);
        writer.set_seq(1);
        writer.write_all(&[0x00, 0x00, 0x00]).unwrap();
        writer.end_packet().await.unwrap();
        assert_eq!(writer.seq(), 2);
        writer.flush_all().await.unwrap();
        assert_eq!(out, vec![0x03, 0, 0, 1, 0x00, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn test_empty_payload() {
        let mut out = Vec::new();
        let mut writer = PacketWriter::new(&mut out);
        writer.end_packet().await.unwrap();
        assert_eq!(out, vec![0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_exact_max_payload_gets_trailing_empty_frame() {
        let mut out = Vec::new();
        let mut writer = PacketWriter::new(&mut out);
        writer
            .write_all(&vec![0x01; crate::protocol::mysql::constants::MAX_PAYLOAD_LEN])
            .unwrap();
        writer.end_packet().await.unwrap();
        let len = out.len();
        assert_eq!(&out[..4], &[0xff, 0xff, 0xff, 0]);
        assert_eq!(&out[len - 4..], &[0, 0, 0, 1]);
    }
}
