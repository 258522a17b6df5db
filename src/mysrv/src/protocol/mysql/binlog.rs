use crate::error::CmdError;
use crate::protocol::mysql::constants::CommandCode;
use futures::Stream;
use itertools::Itertools;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use winnow::binary::{le_u16, le_u32, le_u64};
use winnow::token::take;
use winnow::Parser;

/// Start position of a file based binlog dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinlogPosition {
    pub name: String,
    pub pos: u32,
}

/// One source id and its transaction intervals, `[start, end)` each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sid {
    pub uuid: [u8; 16],
    pub intervals: Vec<(u64, u64)>,
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let u = hex::encode(self.uuid);
        write!(
            f,
            "{}-{}-{}-{}-{}",
            &u[0..8],
            &u[8..12],
            &u[12..16],
            &u[16..20],
            &u[20..32]
        )?;
        for (start, end) in &self.intervals {
            if end.saturating_sub(*start) <= 1 {
                write!(f, ":{start}")?;
            } else {
                write!(f, ":{}-{}", start, end - 1)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GtidSet {
    pub sids: Vec<Sid>,
}

impl fmt::Display for GtidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sids.iter().join(","))
    }
}

/// Raw bytes of one binlog event, without the leading OK marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinlogEvent(pub Vec<u8>);

pub type BinlogItem = Result<BinlogEvent, CmdError>;

/// The producer side handed to whoever generates events.
pub type BinlogEventSender = mpsc::Sender<BinlogItem>;

/// Streaming handle returned by the replication dump operations.
///
/// The connection drains it until every sender is dropped or an error arrives.
#[derive(Debug)]
pub struct BinlogStreamer {
    rx: mpsc::Receiver<BinlogItem>,
}

impl BinlogStreamer {
    pub fn channel(capacity: usize) -> (BinlogEventSender, BinlogStreamer) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, BinlogStreamer { rx })
    }

    pub async fn next_event(&mut self) -> Option<BinlogItem> {
        self.rx.recv().await
    }
}

impl Stream for BinlogStreamer {
    type Item = BinlogItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

fn dump_pos(i: &[u8]) -> winnow::IResult<&[u8], BinlogPosition> {
    let (i, pos) = le_u32.parse_peek(i)?;
    // flags and server id
    let (i, _) = le_u16.parse_peek(i)?;
    let (i, _) = le_u32.parse_peek(i)?;
    let name = String::from_utf8_lossy(i).to_string();
    Ok((&i[i.len()..], BinlogPosition { name, pos }))
}

/// Decodes a COM_BINLOG_DUMP payload.
pub fn parse_binlog_dump(data: &[u8]) -> Result<BinlogPosition, CmdError> {
    dump_pos(data)
        .map(|(_, pos)| pos)
        .map_err(|_| CmdError::malformed(CommandCode::ComBinlogDump, "truncated dump position"))
}

fn sid(i: &[u8]) -> winnow::IResult<&[u8], Sid> {
    let (i, uuid) = take(16usize).parse_peek(i)?;
    let (mut i, n_intervals) = le_u64.parse_peek(i)?;
    let mut intervals = Vec::new();
    for _ in 0..n_intervals {
        let (rest, start) = le_u64.parse_peek(i)?;
        let (rest, end) = le_u64.parse_peek(rest)?;
        intervals.push((start, end));
        i = rest;
    }
    let mut raw = [0u8; 16];
    raw.copy_from_slice(uuid);
    Ok((i, Sid { uuid: raw, intervals }))
}

fn gtid_set(i: &[u8]) -> winnow::IResult<&[u8], GtidSet> {
    let (mut i, n_sids) = le_u64.parse_peek(i)?;
    let mut sids = Vec::new();
    for _ in 0..n_sids {
        let (rest, s) = sid(i)?;
        sids.push(s);
        i = rest;
    }
    Ok((i, GtidSet { sids }))
}

fn dump_gtid(i: &[u8]) -> winnow::IResult<&[u8], &[u8]> {
    // flags and server id
    let (i, _) = le_u16.parse_peek(i)?;
    let (i, _) = le_u32.parse_peek(i)?;
    let (i, name_len) = le_u32.parse_peek(i)?;
    let (i, _name) = take(name_len).parse_peek(i)?;
    let (i, _pos) = le_u64.parse_peek(i)?;
    let (i, data_len) = le_u32.parse_peek(i)?;
    take(data_len).parse_peek(i)
}

/// Decodes a COM_BINLOG_DUMP_GTID payload into the requested GTID set.
pub fn parse_binlog_dump_gtid(data: &[u8]) -> Result<GtidSet, CmdError> {
    let malformed = |reason: &str| CmdError::malformed(CommandCode::ComBinlogDumpGtid, reason);
    let (_, set_data) = dump_gtid(data).map_err(|_| malformed("truncated dump header"))?;
    let (rest, set) = gtid_set(set_data).map_err(|_| malformed("truncated gtid set"))?;
    if !rest.is_empty() {
        return Err(malformed("trailing bytes after gtid set"));
    }
    if set
        .sids
        .iter()
        .flat_map(|s| s.intervals.iter())
        .any(|(start, end)| start >= end)
    {
        return Err(malformed("empty gtid interval"));
    }
    Ok(set)
}
