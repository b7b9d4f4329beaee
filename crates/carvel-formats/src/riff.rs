//! Generic RIFF chunk-tree walker driving the WebP, WAV and ANI carvers.
//!
//! The container grammar is `"RIFF" <u32_le length> <application tag>`
//! followed by chunks of `<FourCC> <u32_le size> <size bytes>`; odd-sized
//! chunks are followed by exactly one zero padding byte. Total consumption
//! is `length + 8`.

use std::io::BufReader;
use std::path::Path;

use tracing::debug;

use carvel_core::{
    ByteCursor, CarvedFile, Extraction, ParseError, ParseResult, Tag, carve_range, open_input,
};

/// Chunk FourCCs accepted inside a WebP container, including the deprecated
/// FRGM.
const WEBP_CHUNKS: &[[u8; 4]] = &[
    *b"ALPH", *b"ANIM", *b"ANMF", *b"EXIF", *b"FRGM", *b"ICCP", *b"VP8 ", *b"VP8L", *b"VP8X",
    *b"XMP ",
];

const WAV_CHUNKS: &[[u8; 4]] = &[
    *b"LGWV", *b"bext", *b"cue ", *b"data", *b"fact", *b"fmt ", *b"inst", *b"labl", *b"list",
    *b"ltxt", *b"note", *b"plst", *b"smpl",
];

const ANI_CHUNKS: &[[u8; 4]] = &[
    *b"IART", *b"ICON", *b"INAM", *b"LIST", *b"anih", *b"rate", *b"seq ",
];

struct RiffApplication {
    /// Display name used in error text; lowercased for the carve name.
    name: &'static str,
    /// FourCC expected right after the RIFF length field.
    tag: [u8; 4],
    valid_chunks: &'static [[u8; 4]],
    format_tag: Tag,
    class_tag: Tag,
}

/// Verify a WebP image at `base_offset`.
pub fn parse_webp(path: &Path, base_offset: u64, out_dir: &Path, _tmp_dir: &Path) -> ParseResult {
    let app = RiffApplication {
        name: "WebP",
        tag: *b"WEBP",
        valid_chunks: WEBP_CHUNKS,
        format_tag: Tag::Webp,
        class_tag: Tag::Graphics,
    };
    parse_riff(path, base_offset, out_dir, &app)
}

/// Verify a WAV audio file at `base_offset`.
pub fn parse_wav(path: &Path, base_offset: u64, out_dir: &Path, _tmp_dir: &Path) -> ParseResult {
    let app = RiffApplication {
        name: "WAV",
        tag: *b"WAVE",
        valid_chunks: WAV_CHUNKS,
        format_tag: Tag::Wav,
        class_tag: Tag::Audio,
    };
    parse_riff(path, base_offset, out_dir, &app)
}

/// Verify a Windows animated cursor at `base_offset`.
pub fn parse_ani(path: &Path, base_offset: u64, out_dir: &Path, _tmp_dir: &Path) -> ParseResult {
    let app = RiffApplication {
        name: "ANI",
        tag: *b"ACON",
        valid_chunks: ANI_CHUNKS,
        format_tag: Tag::Ani,
        class_tag: Tag::Graphics,
    };
    parse_riff(path, base_offset, out_dir, &app)
}

fn parse_riff(
    path: &Path,
    base_offset: u64,
    out_dir: &Path,
    app: &RiffApplication,
) -> ParseResult {
    let (file, file_size) = open_input(path)?;
    let mut cursor = ByteCursor::new(BufReader::new(file), base_offset, file_size)?;

    if cursor.remaining() < 12 {
        return Err(ParseError::new(base_offset, "less than 12 bytes"));
    }

    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic)?;
    if &magic != b"RIFF" {
        return Err(ParseError::new(base_offset, "no valid RIFF header"));
    }

    let length_pos = cursor.position();
    let riff_length = u64::from(cursor.u32_le()?);
    if riff_length + 8 > file_size - base_offset {
        return Err(ParseError::new(length_pos, "wrong length"));
    }

    let tag_pos = cursor.position();
    let mut tag = [0u8; 4];
    cursor.read_exact(&mut tag)?;
    if tag != app.tag {
        return Err(ParseError::new(
            tag_pos,
            format!("no valid {} header", app.name),
        ));
    }

    let end = base_offset + riff_length + 8;
    while cursor.position() < end {
        let fourcc_pos = cursor.position();
        if cursor.remaining() < 4 {
            return Err(ParseError::new(fourcc_pos, "no valid chunk header"));
        }
        let mut fourcc = [0u8; 4];
        cursor.read_exact(&mut fourcc)?;
        if !app.valid_chunks.contains(&fourcc) {
            return Err(ParseError::new(
                fourcc_pos,
                format!("no valid chunk FourCC {}", String::from_utf8_lossy(&fourcc)),
            ));
        }

        let mut chunk_size = u64::from(cursor.u32_le()?);
        let has_padding = chunk_size % 2 != 0;
        if has_padding {
            chunk_size += 1;
        }
        if chunk_size > cursor.remaining() {
            return Err(ParseError::new(fourcc_pos + 4, "wrong chunk length"));
        }

        if has_padding {
            cursor.skip(chunk_size - 1)?;
            let pad = cursor.u8()?;
            if pad != 0 {
                return Err(ParseError::new(
                    cursor.position() - 1,
                    "wrong value for padding byte",
                ));
            }
        } else {
            cursor.skip(chunk_size)?;
        }
    }

    let consumed = cursor.consumed();
    if consumed != riff_length + 8 {
        return Err(ParseError::new(
            base_offset,
            "unpacked size does not match declared size",
        ));
    }

    debug!(format = app.name, consumed, "validated RIFF container");

    if base_offset == 0 && consumed == file_size {
        return Ok(Extraction::whole_file(
            consumed,
            [app.format_tag, app.class_tag, Tag::Riff],
        ));
    }

    let dest = out_dir.join(format!("unpacked-{}", app.name.to_ascii_lowercase()));
    carve_range(path, base_offset, consumed, &dest)?;
    Ok(Extraction::embedded(
        consumed,
        vec![CarvedFile::new(
            dest,
            [app.format_tag, app.class_tag, Tag::Unpacked],
        )],
    ))
}
