//! Line-by-line relay of the downstream response.

use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Longest line accepted from downstream, terminator included.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Counters for a relay that ran to the end of the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    /// Lines forwarded.
    pub units: usize,
    /// Bytes written, including the newline after each line.
    pub bytes: usize,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to read completion stream after {units} lines: {source}")]
    Read {
        units: usize,
        #[source]
        source: io::Error,
    },
    #[error("failed to write to client after {units} lines: {source}")]
    Write {
        units: usize,
        #[source]
        source: io::Error,
    },
}

/// Copy `reader` to `writer` one line at a time.
///
/// Each line is stripped of its `\n` (and a preceding `\r`), written back with
/// a single `\n`, and flushed before the next line is read. A line missing its
/// terminator at end of stream is still forwarded. Nothing is buffered beyond
/// the current line, so a failure mid-stream leaves the client with every line
/// relayed before it. A line longer than [`MAX_LINE_BYTES`] is a read error.
pub async fn relay_lines<R, W>(reader: &mut R, writer: &mut W) -> Result<RelaySummary, RelayError>
where
    R: AsyncBufRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut summary = RelaySummary::default();
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = (&mut *reader)
            .take(MAX_LINE_BYTES as u64 + 1)
            .read_until(b'\n', &mut line)
            .await
            .map_err(|source| RelayError::Read {
                units: summary.units,
                source,
            })?;
        if read == 0 {
            return Ok(summary);
        }
        if read > MAX_LINE_BYTES {
            return Err(RelayError::Read {
                units: summary.units,
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line exceeds {MAX_LINE_BYTES} bytes"),
                ),
            });
        }
        let unit = strip_line_ending(&line);
        let write_err = |source| RelayError::Write {
            units: summary.units,
            source,
        };
        writer.write_all(unit).await.map_err(write_err)?;
        writer.write_all(b"\n").await.map_err(write_err)?;
        writer.flush().await.map_err(write_err)?;
        summary.units += 1;
        summary.bytes += unit.len() + 1;
    }
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
