//! BMP adapter: header pre-validation here, bit-level verdict from
//! `bmptopnm`.

use std::io::{BufReader, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use carvel_core::{
    ByteCursor, CarvedFile, Extraction, ParseError, ParseResult, Tag, create_carve_file,
    open_input,
};

use crate::external::find_program;

/// The DIB header sizes that exist in the wild.
const DIB_HEADER_SIZES: [u64; 8] = [12, 16, 40, 52, 56, 64, 108, 124];

/// Verify a BMP image at `base_offset`.
///
/// The `"BM"` magic has already been matched by the caller. The 14-byte file
/// header and the leading DIB header size are checked here; the pixel data
/// is piped into `bmptopnm`, whose exit status is the verdict.
pub fn parse_bmp(path: &Path, base_offset: u64, out_dir: &Path, _tmp_dir: &Path) -> ParseResult {
    let (file, file_size) = open_input(path)?;
    let mut cursor = ByteCursor::new(BufReader::new(file), base_offset, file_size)?;

    if cursor.remaining() < 26 {
        return Err(ParseError::new(base_offset, "less than 26 bytes"));
    }

    cursor.skip(2)?;
    let bmp_size = u64::from(cursor.u32_le()?);
    if bmp_size > file_size - base_offset {
        return Err(ParseError::new(base_offset, "not enough data for BMP file"));
    }

    cursor.skip(4)?; // reserved
    let pixel_offset = u64::from(cursor.u32_le()?);
    if pixel_offset > file_size - base_offset {
        return Err(ParseError::new(base_offset, "not enough data for BMP data offset"));
    }

    let dib_header_size = u64::from(cursor.u16_le()?);
    if !DIB_HEADER_SIZES.contains(&dib_header_size) {
        return Err(ParseError::new(base_offset, "invalid DIB header"));
    }
    if 14 + dib_header_size > file_size - base_offset {
        return Err(ParseError::new(base_offset, "not enough data for DIB header"));
    }
    if pixel_offset < 14 + dib_header_size {
        return Err(ParseError::new(base_offset, "invalid BMP data offset"));
    }

    if find_program("bmptopnm").is_none() {
        return Err(ParseError::new(cursor.position(), "bmptopnm program not found"));
    }

    cursor.seek_to(base_offset)?;
    let mut data = vec![0u8; bmp_size as usize];
    cursor.read_exact(&mut data)?;

    let mut child = Command::new("bmptopnm")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ParseError::io(base_offset, e))?;
    if let Some(mut stdin) = child.stdin.take() {
        // A broken pipe just means the tool already rejected the data.
        let _ = stdin.write_all(&data);
    }
    let status = child.wait().map_err(|e| ParseError::io(base_offset, e))?;
    if !status.success() {
        return Err(ParseError::new(base_offset, "invalid BMP"));
    }

    debug!(bmp_size, "bmptopnm accepted candidate");

    if base_offset == 0 && bmp_size == file_size {
        return Ok(Extraction::whole_file(file_size, [Tag::Bmp, Tag::Graphics]));
    }

    // The bytes were already read for the pipe; write them out directly.
    let dest = out_dir.join("unpacked.bmp");
    let mut output = create_carve_file(&dest)?;
    if let Err(e) = output.write_all(&data) {
        drop(output);
        let _ = std::fs::remove_file(&dest);
        return Err(ParseError::io(base_offset, e));
    }
    Ok(Extraction::embedded(
        bmp_size,
        vec![CarvedFile::new(dest, [Tag::Bmp, Tag::Graphics, Tag::Unpacked])],
    ))
}
