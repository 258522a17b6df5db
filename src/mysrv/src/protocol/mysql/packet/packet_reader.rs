use crate::protocol::mysql::constants::{DEFAULT_MAX_PACKET_LEN, MAX_PAYLOAD_LEN, PACKET_HEADER_LEN};
use crate::protocol::mysql::packet::{packet, Packet};

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use winnow::error::ErrMode;

const PACKET_BUFFER_SIZE: usize = 4096;
const PACKET_LARGE_BUFFER_SIZE: usize = 1048576;

/// Reads the next packet and turns a clean EOF into `ConnectionAborted`.
#[macro_export]
macro_rules! async_packet_read {
    ($reader: expr) => {{
        use tracing::warn;
        let rs = $reader.next_async().await;
        if rs.is_err() {
            warn!("MySrv read pkg err = {:?}", rs);
        }
        rs?.ok_or_else(|| {
            warn!("MySrv pkg is none");
            std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "connection disconnect.",
            )
        })?
    }};
}

/// [PacketReader] reads bytes from an [`AsyncRead`] and assembles MySQL [`Packet`]s.
pub struct PacketReader<R> {
    bytes: Vec<u8>,
    max_packet_len: usize,
    pub r: R,
}

impl<R> PacketReader<R> {
    pub fn new(r: R) -> Self {
        PacketReader {
            bytes: Vec::new(),
            max_packet_len: DEFAULT_MAX_PACKET_LEN,
            r,
        }
    }

    /// Caps the joined payload of one packet. Larger packets fail with `InvalidData`.
    pub fn with_max_packet_len(mut self, max_packet_len: usize) -> Self {
        self.max_packet_len = max_packet_len;
        self
    }

    /// Frame headers included, the most bytes one packet within the cap can occupy.
    fn max_raw_len(&self) -> usize {
        let frames = self.max_packet_len / MAX_PAYLOAD_LEN + 1;
        self.max_packet_len + frames * PACKET_HEADER_LEN
    }

    fn too_large(&self, len: usize) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "packet of {len} bytes exceeds max packet length {}",
                self.max_packet_len
            ),
        )
    }

    /// Bytes received but not yet returned as a packet.
    pub fn buffered(&self) -> usize {
        self.bytes.len()
    }
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    /// Returns the next packet with the sequence id of its last frame, or `None` when the
    /// peer closed the stream on a packet boundary.
    pub async fn next_async(&mut self) -> io::Result<Option<(u8, Packet)>> {
        let mut buffer_size = PACKET_BUFFER_SIZE;
        loop {
            if !self.bytes.is_empty() {
                let parsed = match packet(&self.bytes) {
                    Ok((rest, (seq, pkt))) => Some((self.bytes.len() - rest.len(), seq, pkt)),
                    Err(ErrMode::Incomplete(_)) | Err(ErrMode::Backtrack(_)) => None,
                    Err(ErrMode::Cut(ctx)) => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("malformed packet framing: {:?}", ctx.kind),
                        ));
                    }
                };
                if let Some((consumed, seq, pkt)) = parsed {
                    if pkt.len() > self.max_packet_len {
                        return Err(self.too_large(pkt.len()));
                    }
                    self.bytes.drain(..consumed);
                    return Ok(Some((seq, pkt)));
                }
                // only the unfinished first packet is buffered here.
                if self.bytes.len() > self.max_raw_len() {
                    return Err(self.too_large(self.bytes.len()));
                }
            }

            // we need to read some more
            let end = self.bytes.len();
            self.bytes.resize(end + buffer_size, 0);
            let read = self.r.read(&mut self.bytes[end..]).await;
            let read = match read {
                Ok(read) => read,
                Err(e) => {
                    self.bytes.truncate(end);
                    return Err(e);
                }
            };
            self.bytes.truncate(end + read);
            // use a larger buffer size to reduce bytes resize times.
            buffer_size = PACKET_LARGE_BUFFER_SIZE;
            if read == 0 {
                return if self.bytes.is_empty() {
                    Ok(None)
                } else {
                    Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("{} unhandled bytes", self.bytes.len()),
                    ))
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PacketReader;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_read_two_packets_then_eof() {
        let bytes = [0x01, 0, 0, 0, 0x0e, 0x02, 0, 0, 0, 0x02, b'd'];
        let mut reader = PacketReader::new(Cursor::new(&bytes[..]));
        let (seq, ping) = reader.next_async().await.unwrap().unwrap();
        assert_eq!(seq, 0);
        assert_eq!(&*ping, &[0x0e]);
        let (_, init_db) = reader.next_async().await.unwrap().unwrap();
        assert_eq!(&*init_db, &[0x02, b'd']);
        assert!(reader.next_async().await.unwrap().is_none());
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_truncated_stream_is_unexpected_eof() {
        let bytes = [0x05, 0, 0, 0, 0x03];
        let mut reader = PacketReader::new(Cursor::new(&bytes[..]));
        let err = reader.next_async().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_complete_packet_over_cap() {
        let mut bytes = vec![0x0a, 0, 0, 0];
        bytes.extend([b'x'; 10]);
        let mut reader = PacketReader::new(Cursor::new(bytes)).with_max_packet_len(8);
        let err = reader.next_async().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert_eq!(err.to_string(), "packet of 10 bytes exceeds max packet length 8");
    }

    #[tokio::test]
    async fn test_unfinished_packet_over_cap() {
        // a full sized first frame is announced, the reader gives up before it arrives.
        let mut bytes = vec![0xff, 0xff, 0xff, 0];
        bytes.extend([0u8; 64]);
        let mut reader = PacketReader::new(Cursor::new(bytes)).with_max_packet_len(16);
        let err = reader.next_async().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert_eq!(err.to_string(), "packet of 68 bytes exceeds max packet length 16");
    }

    #[tokio::test]
    async fn test_packet_at_cap_is_read() {
        let mut bytes = vec![0x08, 0, 0, 0];
        bytes.extend([b'x'; 8]);
        let mut reader = PacketReader::new(Cursor::new(bytes)).with_max_packet_len(8);
        let (_, pkt) = reader.next_async().await.unwrap().unwrap();
        assert_eq!(pkt.len(), 8);
    }

    #[tokio::test]
    async fn test_packet_split_across_reads() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut reader = PacketReader::new(server);
        let handle = tokio::spawn(async move { reader.next_async().await });
        use tokio::io::AsyncWriteExt;
        client.write_all(&[0x04, 0, 0]).await.unwrap();
        client.write_all(&[0, 0x03, b'a', b'b']).await.unwrap();
        client.write_all(&[b'c']).await.unwrap();
        let (_, query) = handle.await.unwrap().unwrap().unwrap();
        assert_eq!(&*query, b"\x03abc");
    }
}
