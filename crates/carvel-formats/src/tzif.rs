//! TZif timezone file verifier, versions 0, 2 and 3.
//!
//! Version 0 is a single header plus a data block of 32-bit records.
//! Versions 2 and 3 repeat the header and data block in 64-bit form and end
//! with a newline-delimited POSIX-TZ string. See tzfile(5).

use std::io::{BufReader, Read, Seek};
use std::path::Path;

use tracing::debug;

use carvel_core::{
    ByteCursor, CarvedFile, Extraction, ParseError, ParseResult, Tag, carve_range, open_input,
};

struct Counts {
    isutcnt: u64,
    isstdcnt: u64,
    leapcnt: u64,
    timecnt: u64,
    typecnt: u64,
    charcnt: u64,
}

/// Verify a compiled timezone file at `base_offset`.
///
/// The `"TZif"` magic of the first header has already been matched by the
/// caller; the second header's magic is checked here.
pub fn parse_timezone(path: &Path, base_offset: u64, out_dir: &Path, _tmp_dir: &Path) -> ParseResult {
    let (file, file_size) = open_input(path)?;
    let mut cursor = ByteCursor::new(BufReader::new(file), base_offset, file_size)?;

    if cursor.remaining() < 44 {
        return Err(ParseError::new(base_offset, "not enough bytes"));
    }

    cursor.skip(4)?;
    let version_pos = cursor.position();
    let version = match cursor.u8()? {
        0x00 => 0u8,
        b'2' => 2,
        b'3' => 3,
        _ => return Err(ParseError::new(version_pos, "invalid version")),
    };

    check_reserved(&mut cursor)?;
    let counts = read_counts(&mut cursor)?;
    walk_data_block(&mut cursor, &counts, 4)?;

    if version == 0 {
        let consumed = cursor.consumed();
        debug!(version, consumed, "validated timezone file");
        return finish(path, base_offset, out_dir, consumed, file_size);
    }

    // Versions 2 and 3 repeat the whole layout with 64-bit records.
    if cursor.remaining() < 44 {
        return Err(ParseError::new(
            cursor.position(),
            "not enough data for version 2 timezone header",
        ));
    }

    let magic_pos = cursor.position();
    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic)?;
    if &magic != b"TZif" {
        return Err(ParseError::new(magic_pos, "invalid magic for version 2 header"));
    }

    let version_pos = cursor.position();
    let second_version = match cursor.u8()? {
        b'2' => 2u8,
        b'3' => 3,
        _ => return Err(ParseError::new(version_pos, "invalid version")),
    };
    if second_version != version {
        return Err(ParseError::new(version_pos, "versions in headers don't match"));
    }

    check_reserved(&mut cursor)?;
    let counts = read_counts(&mut cursor)?;
    walk_data_block(&mut cursor, &counts, 8)?;
    read_posix_tz(&mut cursor)?;

    let consumed = cursor.consumed();
    debug!(version, consumed, "validated timezone file");
    finish(path, base_offset, out_dir, consumed, file_size)
}

fn check_reserved<R: Read + Seek>(cursor: &mut ByteCursor<R>) -> Result<(), ParseError> {
    let pos = cursor.position();
    let mut reserved = [0u8; 15];
    cursor.read_exact(&mut reserved)?;
    if reserved != [0u8; 15] {
        return Err(ParseError::new(pos, "reserved bytes not 0"));
    }
    Ok(())
}

fn read_counts<R: Read + Seek>(cursor: &mut ByteCursor<R>) -> Result<Counts, ParseError> {
    let isutcnt = u64::from(cursor.u32_be()?);
    let isstdcnt = u64::from(cursor.u32_be()?);
    let leapcnt = u64::from(cursor.u32_be()?);
    let timecnt = u64::from(cursor.u32_be()?);
    let typecnt_pos = cursor.position();
    let typecnt = u64::from(cursor.u32_be()?);
    if typecnt == 0 {
        return Err(ParseError::new(typecnt_pos, "number of local time types is 0"));
    }
    let charcnt = u64::from(cursor.u32_be()?);
    Ok(Counts {
        isutcnt,
        isstdcnt,
        leapcnt,
        timecnt,
        typecnt,
        charcnt,
    })
}

fn skip_or<R: Read + Seek>(
    cursor: &mut ByteCursor<R>,
    n: u64,
    reason: &str,
) -> Result<(), ParseError> {
    if cursor.remaining() < n {
        return Err(ParseError::new(cursor.position(), reason));
    }
    cursor.skip(n)
}

/// Walk one data block; `time_width` is 4 below a version-0 header and 8
/// below a version-2/3 header.
fn walk_data_block<R: Read + Seek>(
    cursor: &mut ByteCursor<R>,
    counts: &Counts,
    time_width: u64,
) -> Result<(), ParseError> {
    skip_or(
        cursor,
        counts.timecnt * time_width,
        "not enough data for transition time",
    )?;

    // One index per transition, each naming a local time type.
    if cursor.remaining() < counts.timecnt {
        return Err(ParseError::new(
            cursor.position(),
            "not enough data for transition time",
        ));
    }
    for _ in 0..counts.timecnt {
        let index = cursor.u8()?;
        if u64::from(index) >= counts.typecnt {
            return Err(ParseError::new(
                cursor.position() - 1,
                "invalid index for transition time",
            ));
        }
    }

    for _ in 0..counts.typecnt {
        skip_or(cursor, 4, "not enough data for ttinfo GMT offset")?;
        if cursor.remaining() < 1 {
            return Err(ParseError::new(
                cursor.position(),
                "not enough data for ttinfo DST flag",
            ));
        }
        let isdst = cursor.u8()?;
        if isdst > 1 {
            return Err(ParseError::new(
                cursor.position() - 1,
                "invalid value for ttinfo DST flag",
            ));
        }
        if cursor.remaining() < 1 {
            return Err(ParseError::new(
                cursor.position(),
                "not enough data for ttinfo abbreviation index",
            ));
        }
        let abbrind = cursor.u8()?;
        if u64::from(abbrind) > counts.charcnt {
            return Err(ParseError::new(
                cursor.position() - 1,
                "invalid value for ttinfo abbreviation index",
            ));
        }
    }

    skip_or(cursor, counts.charcnt, "not enough data for abbreviation bytes")?;
    skip_or(
        cursor,
        counts.leapcnt * (time_width + 4),
        "not enough data for leap seconds",
    )?;
    skip_or(cursor, counts.isstdcnt, "not enough data for standard indicator")?;
    skip_or(cursor, counts.isutcnt, "not enough data for UT indicator")?;
    Ok(())
}

/// The newline-enclosed POSIX-TZ string; its characters are restricted to
/// printable non-whitespace (tzset(3)).
fn read_posix_tz<R: Read + Seek>(cursor: &mut ByteCursor<R>) -> Result<(), ParseError> {
    if cursor.remaining() == 0 {
        return Err(ParseError::new(
            cursor.position(),
            "not enough data for POSIX TZ string",
        ));
    }
    let opening = cursor.u8()?;
    if opening != b'\n' {
        return Err(ParseError::new(
            cursor.position() - 1,
            "wrong value for POSIX TZ string",
        ));
    }
    loop {
        if cursor.remaining() == 0 {
            return Err(ParseError::new(
                cursor.position(),
                "enclosing newline for POSIX TZ string not found",
            ));
        }
        let byte = cursor.u8()?;
        if byte == b'\n' {
            return Ok(());
        }
        if !byte.is_ascii_graphic() {
            return Err(ParseError::new(
                cursor.position() - 1,
                "invalid character in POSIX TZ string",
            ));
        }
    }
}

fn finish(
    path: &Path,
    base_offset: u64,
    out_dir: &Path,
    consumed: u64,
    file_size: u64,
) -> ParseResult {
    if base_offset == 0 && consumed == file_size {
        return Ok(Extraction::whole_file(consumed, [Tag::Resource, Tag::Timezone]));
    }
    let dest = out_dir.join("unpacked-from-timezone");
    carve_range(path, base_offset, consumed, &dest)?;
    Ok(Extraction::embedded(
        consumed,
        vec![CarvedFile::new(
            dest,
            [Tag::Timezone, Tag::Resource, Tag::Unpacked],
        )],
    ))
}
