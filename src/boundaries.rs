//! Split a corpus into byte ranges that end right after a split marker.

use std::io::{Read, Seek, SeekFrom};

use memchr::memmem;

use crate::corpus::stream_len;
use crate::error::{Result, TrainError};

/// Size of each forward read while hunting for the split marker.
const SCAN_BLOCK: usize = 4096;

/// Compute up to `num_chunks + 1` sorted, distinct byte offsets starting at 0
/// and ending at the corpus length.
///
/// Each interior offset starts at its equal-size position and is moved to
/// just past the first `split_token` found at or after it, or to the end of
/// the corpus when no marker follows. Offsets that collapse onto the same
/// position are deduplicated, so fewer chunks than requested may come back.
/// An empty `split_token` is rejected: unaligned cuts would split words.
pub fn find_chunk_boundaries<R: Read + Seek>(
    reader: &mut R,
    num_chunks: usize,
    split_token: &[u8],
) -> Result<Vec<u64>> {
    if split_token.is_empty() {
        return Err(TrainError::InvalidConfig(
            "split_token must not be empty".into(),
        ));
    }
    let num_chunks = num_chunks.max(1) as u64;
    let file_size = stream_len(reader)?;
    let chunk_size = file_size / num_chunks;

    let mut boundaries: Vec<u64> = (0..=num_chunks).map(|i| i * chunk_size).collect();
    if let Some(last) = boundaries.last_mut() {
        *last = file_size;
    }

    let n = boundaries.len();
    for boundary in &mut boundaries[1..n - 1] {
        *boundary = snap_to_marker(reader, *boundary, file_size, split_token)?;
    }

    boundaries.sort_unstable();
    boundaries.dedup();
    Ok(boundaries)
}

/// Offset just past the first `marker` at or after `pos`, or `file_size`.
fn snap_to_marker<R: Read + Seek>(
    reader: &mut R,
    pos: u64,
    file_size: u64,
    marker: &[u8],
) -> Result<u64> {
    let finder = memmem::Finder::new(marker);
    // Consecutive reads overlap so a marker straddling two blocks is seen.
    let overlap = marker.len() - 1;
    let mut block = vec![0u8; SCAN_BLOCK + overlap];
    let mut window_start = pos;
    let mut carried = 0usize;

    reader.seek(SeekFrom::Start(pos))?;
    loop {
        let read = read_up_to(reader, &mut block[carried..carried + SCAN_BLOCK])?;
        if read == 0 {
            return Ok(file_size);
        }
        let filled = carried + read;
        if let Some(found) = finder.find(&block[..filled]) {
            return Ok(window_start + (found + marker.len()) as u64);
        }

        let keep = overlap.min(filled);
        block.copy_within(filled - keep..filled, 0);
        window_start += (filled - keep) as u64;
        carried = keep;
    }
}

/// Fill `buf` as far as the stream allows; 0 only at end of stream.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(total)
}
