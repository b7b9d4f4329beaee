//! PNG chunk-stream verifier with per-chunk CRC-32 and APNG detection.
//!
//! The 8-byte signature has already been matched by the caller; parsing
//! starts at the IHDR chunk and terminates at IEND. Carved output gets an
//! extra decode pass through the `image` crate before it is accepted.

use std::collections::BTreeSet;
use std::io::BufReader;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use tracing::debug;

use carvel_core::{
    ByteCursor, CarvedFile, Extraction, ParseError, ParseResult, Tag, carve_range, open_input,
};

/// Signature (8) + IHDR (25) + IDAT (12) + IEND (12).
const MIN_PNG_LEN: u64 = 57;

/// Verify a PNG image at `base_offset`.
pub fn parse_png(path: &Path, base_offset: u64, out_dir: &Path, _tmp_dir: &Path) -> ParseResult {
    let (file, file_size) = open_input(path)?;
    let mut cursor = ByteCursor::new(BufReader::new(file), base_offset, file_size)?;

    if cursor.remaining() < MIN_PNG_LEN {
        return Err(ParseError::new(base_offset, "less than 57 bytes"));
    }

    // Signature already matched by the caller.
    cursor.skip(8)?;

    // The first chunk has to be IHDR with exactly 13 data bytes, so it
    // occupies a fixed 25 bytes.
    let ihdr_pos = cursor.position();
    let mut ihdr = [0u8; 25];
    cursor.read_exact(&mut ihdr)?;
    if ihdr[0..4] != [0, 0, 0, 0x0d] {
        return Err(ParseError::new(ihdr_pos, "no valid chunk length"));
    }
    if &ihdr[4..8] != b"IHDR" {
        return Err(ParseError::new(ihdr_pos, "no IHDR header"));
    }
    if crc32fast::hash(&ihdr[4..21]) != BigEndian::read_u32(&ihdr[21..25]) {
        return Err(ParseError::new(ihdr_pos, "Wrong CRC"));
    }

    let mut idat_seen = false;
    let mut chunk_names: BTreeSet<[u8; 4]> = BTreeSet::new();
    chunk_names.insert(*b"IHDR");

    loop {
        let size_pos = cursor.position();
        if cursor.remaining() < 4 {
            return Err(ParseError::new(size_pos, "No IEND found"));
        }
        let chunk_size = u64::from(cursor.u32_be()?);
        if chunk_size > file_size - cursor.position() {
            return Err(ParseError::new(size_pos, "PNG data bigger than file"));
        }

        let body_len = 4 + chunk_size;
        if cursor.remaining() < body_len {
            return Err(ParseError::new(cursor.position(), "Could not read chunk type"));
        }
        let mut body = vec![0u8; body_len as usize];
        cursor.read_exact(&mut body)?;
        let mut chunk_type = [0u8; 4];
        chunk_type.copy_from_slice(&body[0..4]);

        if cursor.remaining() < 4 {
            return Err(ParseError::new(cursor.position(), "Wrong CRC"));
        }
        let stored_crc = cursor.u32_be()?;
        if crc32fast::hash(&body) != stored_crc {
            return Err(ParseError::new(cursor.position() - 4, "Wrong CRC"));
        }

        chunk_names.insert(chunk_type);
        if &chunk_type == b"IEND" {
            break;
        }
        if &chunk_type == b"IDAT" {
            idat_seen = true;
        }
    }

    if !idat_seen {
        return Err(ParseError::new(base_offset, "No IDAT found"));
    }

    let animated = chunk_names.contains(b"acTL")
        && chunk_names.contains(b"fcTL")
        && chunk_names.contains(b"fdAT");

    let consumed = cursor.consumed();
    debug!(consumed, animated, "validated PNG chunk stream");

    let mut tags = vec![Tag::Png, Tag::Graphics];
    if animated {
        tags.push(Tag::Animated);
        tags.push(Tag::Apng);
    }

    if base_offset == 0 && consumed == file_size {
        return Ok(Extraction::whole_file(consumed, tags));
    }

    let dest = out_dir.join("unpacked.png");
    carve_range(path, base_offset, consumed, &dest)?;

    // Extra sanity pass: the chunk structure can be valid while the image
    // data is not decodable.
    let decodable = image::ImageReader::open(&dest)
        .ok()
        .and_then(|reader| reader.with_guessed_format().ok())
        .and_then(|reader| reader.decode().ok())
        .is_some();
    if !decodable {
        let _ = std::fs::remove_file(&dest);
        return Err(ParseError::new(base_offset, "invalid PNG data"));
    }

    tags.push(Tag::Unpacked);
    Ok(Extraction::embedded(
        consumed,
        vec![CarvedFile::new(dest, tags)],
    ))
}
