//! Record framing shared by the WAL and the manifest.
//!
//! ```text
//! +-----------+-----------+-----------+---------------+
//! | crc (u32) | len (u32) | hcrc (u32)| payload       |
//! +-----------+-----------+-----------+---------------+
//! ```
//!
//! `crc` covers `len` and the payload, `hcrc` covers `len` alone. A bad
//! length is caught by `hcrc` before it can be trusted to find the end of
//! the frame.

use std::io::{self, Read, Write};

/// Frame header size: CRC (4) + Len (4) + header CRC (4)
pub const HEADER_SIZE: usize = 12;

/// Upper bound on a single frame payload (64 MB)
pub(crate) const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Distinguishes the header checksum from a payload checksum over the
/// same bytes
const HEADER_CRC_SEED: u32 = 0x5354_524b;

fn frame_crc(len_bytes: &[u8; 4], payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(len_bytes);
    hasher.update(payload);
    hasher.finalize()
}

fn header_crc(len_bytes: &[u8; 4]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(HEADER_CRC_SEED);
    hasher.update(len_bytes);
    hasher.finalize()
}

/// Write one framed record
pub(crate) fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<usize> {
    let len_bytes = (payload.len() as u32).to_le_bytes();

    let mut header = [0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(&frame_crc(&len_bytes, payload).to_le_bytes());
    header[4..8].copy_from_slice(&len_bytes);
    header[8..12].copy_from_slice(&header_crc(&len_bytes).to_le_bytes());

    writer.write_all(&header)?;
    writer.write_all(payload)?;

    Ok(HEADER_SIZE + payload.len())
}

/// Outcome of reading one frame
#[derive(Debug)]
pub(crate) enum Frame {
    /// A complete, checksummed payload
    Record(Vec<u8>),

    /// Clean end of file
    End,

    /// The file ends inside this frame, or the final frame fails its
    /// checksum: a write interrupted by a crash
    TornTail { offset: u64 },

    /// Damage that more data follows, so it cannot be a crashed append
    Corrupt { offset: u64, reason: &'static str },
}

/// Sequential frame reader over any byte source of known length
pub(crate) struct FrameReader<R> {
    reader: R,
    offset: u64,
    len: u64,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R, start: u64, len: u64) -> Self {
        Self {
            reader,
            offset: start,
            len,
        }
    }

    /// Offset of the first byte after the last good frame
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn next_frame(&mut self) -> io::Result<Frame> {
        let offset = self.offset;
        let remaining = self.len.saturating_sub(offset);
        if remaining == 0 {
            return Ok(Frame::End);
        }
        if remaining < HEADER_SIZE as u64 {
            return Ok(Frame::TornTail { offset });
        }

        let mut header = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header)?;

        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&header[0..4]);
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&header[4..8]);
        let mut hcrc_bytes = [0u8; 4];
        hcrc_bytes.copy_from_slice(&header[8..12]);

        // The header is written in one piece, so a bad one is only a torn
        // append when nothing follows it
        if header_crc(&len_bytes) != u32::from_le_bytes(hcrc_bytes) {
            if remaining == HEADER_SIZE as u64 {
                return Ok(Frame::TornTail { offset });
            }
            return Ok(Frame::Corrupt {
                offset,
                reason: "record header checksum mismatch",
            });
        }

        let payload_len = u32::from_le_bytes(len_bytes);
        if payload_len > MAX_FRAME_SIZE {
            return Ok(Frame::Corrupt {
                offset,
                reason: "record length exceeds limit",
            });
        }

        // The length is trusted from here on
        let frame_end = offset + HEADER_SIZE as u64 + payload_len as u64;
        if frame_end > self.len {
            return Ok(Frame::TornTail { offset });
        }

        let mut payload = vec![0u8; payload_len as usize];
        self.reader.read_exact(&mut payload)?;

        if frame_crc(&len_bytes, &payload) != u32::from_le_bytes(crc_bytes) {
            if frame_end == self.len {
                return Ok(Frame::TornTail { offset });
            }
            return Ok(Frame::Corrupt {
                offset,
                reason: "record checksum mismatch",
            });
        }

        self.offset = frame_end;
        Ok(Frame::Record(payload))
    }
}
