//! RFC 1952 gzip carver with streaming DEFLATE framing detection.
//!
//! The decoder's residual-byte accounting locates the end of the compressed
//! body without a prior length: the body spans exactly `total_in()` bytes of
//! the raw DEFLATE decoder once it reports end-of-stream. The trailer CRC-32
//! and ISIZE are both validated against the decoded payload.

use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::{Path, PathBuf};

use flate2::{Decompress, FlushDecompress, Status};
use tracing::debug;

use carvel_core::{
    ByteCursor, CarvedFile, Extraction, ParseError, ParseResult, Tag, create_carve_file,
    open_input,
};

/// Input window for the streaming DEFLATE decode.
const BODY_WINDOW: usize = 10 * 1024 * 1024;

// FLG bits, RFC 1952 section 2.3.1.
const FLAG_FHCRC: u8 = 1 << 1;
const FLAG_FEXTRA: u8 = 1 << 2;
const FLAG_FNAME: u8 = 1 << 3;
const FLAG_FCOMMENT: u8 = 1 << 4;
const FLAG_ENCRYPTED: u8 = 1 << 5;
const FLAG_RESERVED: u8 = 0b1100_0000;

/// Verify and unpack a gzip member at `base_offset`.
///
/// The two magic bytes and the `0x08` compression method have already been
/// matched by the caller.
pub fn parse_gzip(path: &Path, base_offset: u64, out_dir: &Path, _tmp_dir: &Path) -> ParseResult {
    let (file, file_size) = open_input(path)?;
    let mut cursor = ByteCursor::new(BufReader::new(file), base_offset, file_size)?;

    cursor.skip(3)?;
    let flags_pos = cursor.position();
    let flags = cursor.u8()?;
    if flags & FLAG_ENCRYPTED != 0 {
        return Err(ParseError::new(flags_pos, "unsupported encrypted"));
    }
    if flags & FLAG_RESERVED != 0 {
        return Err(ParseError::new(flags_pos, "not a valid gzip file"));
    }

    // MTIME, XFL and OS carry no structure worth validating.
    cursor.skip(6)?;

    if flags & FLAG_FEXTRA != 0 {
        let xlen = u64::from(cursor.u16_le()?);
        if xlen > cursor.remaining() {
            return Err(ParseError::new(cursor.position(), "extra data outside of file"));
        }
        cursor.skip(xlen)?;
    }

    let mut original_name = Vec::new();
    if flags & FLAG_FNAME != 0 {
        read_zero_terminated(&mut cursor, Some(&mut original_name), "file name data outside of file")?;
    }
    if flags & FLAG_FCOMMENT != 0 {
        read_zero_terminated(&mut cursor, None, "comment data outside of file")?;
    }
    if flags & FLAG_FHCRC != 0 {
        // Present but not validated.
        cursor.skip(2)?;
    }

    // BTYPE 0b11 is reserved, so the first body byte gives a cheap reject.
    let body_start = cursor.position();
    let first_body_byte = cursor.u8()?;
    if first_body_byte & 0b0000_0110 == 0b0000_0110 {
        return Err(ParseError::new(body_start, "wrong DEFLATE header"));
    }
    cursor.seek_to(body_start)?;

    let source_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let out_name = source_name
        .strip_suffix(".gz")
        .filter(|stem| !stem.is_empty())
        .map_or_else(|| "unpacked-from-gz".to_string(), str::to_owned);
    let dest = out_dir.join(out_name);

    let mut output = create_carve_file(&dest)?;
    let mut crc = crc32fast::Hasher::new();
    let decoded = inflate_body(&mut cursor, &mut output, &mut crc, body_start);
    drop(output);
    let uncompressed_size = match decoded {
        Ok(n) => n,
        Err(e) => {
            let _ = std::fs::remove_file(&dest);
            return Err(e);
        }
    };

    if let Err(e) = check_trailer(&mut cursor, crc, uncompressed_size) {
        let _ = std::fs::remove_file(&dest);
        return Err(e);
    }

    let final_dest = rename_from_member_name(out_dir, dest, &original_name);
    let consumed = cursor.consumed();
    debug!(consumed, uncompressed_size, "unpacked gzip member");

    let mut extraction = Extraction::embedded(consumed, vec![CarvedFile::new(final_dest, [])]);
    if base_offset == 0 && consumed == file_size {
        extraction.stream_tags = [Tag::Gzip, Tag::Compressed].into_iter().collect();
    }
    Ok(extraction)
}

fn read_zero_terminated<R: Read + Seek>(
    cursor: &mut ByteCursor<R>,
    mut capture: Option<&mut Vec<u8>>,
    short_reason: &str,
) -> Result<(), ParseError> {
    loop {
        if cursor.remaining() == 0 {
            return Err(ParseError::new(cursor.position(), short_reason));
        }
        let byte = cursor.u8()?;
        if byte == 0 {
            return Ok(());
        }
        if let Some(buf) = capture.as_mut() {
            buf.push(byte);
        }
    }
}

/// Decode the raw DEFLATE body, writing the payload to `output` and folding
/// it into `crc`. On success the cursor is left at the first trailer byte
/// and the decoded length is returned.
fn inflate_body<R: Read + Seek>(
    cursor: &mut ByteCursor<R>,
    output: &mut File,
    crc: &mut crc32fast::Hasher,
    body_start: u64,
) -> Result<u64, ParseError> {
    let mut inflater = Decompress::new(false);
    let mut inbuf = vec![0u8; BODY_WINDOW];
    let mut outbuf = vec![0u8; 128 * 1024];

    loop {
        let filled = cursor.read_up_to(&mut inbuf)?;
        if filled == 0 {
            return Err(ParseError::new(cursor.position(), "File not a valid gzip file"));
        }

        let mut fed = 0;
        while fed < filled {
            let before_in = inflater.total_in();
            let before_out = inflater.total_out();
            let status = inflater
                .decompress(&inbuf[fed..filled], &mut outbuf, FlushDecompress::None)
                .map_err(|_| {
                    ParseError::new(body_start + inflater.total_in(), "File not a valid gzip file")
                })?;
            let took = (inflater.total_in() - before_in) as usize;
            let made = (inflater.total_out() - before_out) as usize;
            if made > 0 {
                output
                    .write_all(&outbuf[..made])
                    .map_err(|e| ParseError::io(cursor.position(), e))?;
                crc.update(&outbuf[..made]);
            }
            fed += took;

            match status {
                Status::StreamEnd => {
                    // The window may overlap into whatever follows the
                    // member; rewind to just past the DEFLATE stream.
                    cursor.seek_to(body_start + inflater.total_in())?;
                    return Ok(inflater.total_out());
                }
                Status::Ok | Status::BufError => {
                    if took == 0 && made == 0 {
                        if fed < filled {
                            return Err(ParseError::new(
                                body_start + inflater.total_in(),
                                "File not a valid gzip file",
                            ));
                        }
                        break;
                    }
                }
            }
        }
    }
}

fn check_trailer<R: Read + Seek>(
    cursor: &mut ByteCursor<R>,
    crc: crc32fast::Hasher,
    uncompressed_size: u64,
) -> Result<(), ParseError> {
    if cursor.remaining() < 8 {
        return Err(ParseError::new(cursor.position(), "no CRC and ISIZE"));
    }
    let crc_pos = cursor.position();
    let stored_crc = cursor.u32_le()?;
    let stored_isize = cursor.u32_le()?;
    if crc.finalize() != stored_crc {
        return Err(ParseError::new(crc_pos, "wrong value for CRC"));
    }
    if uncompressed_size as u32 != stored_isize {
        return Err(ParseError::new(crc_pos + 4, "wrong value for ISIZE"));
    }
    Ok(())
}

/// Rename the provisional output to the member's recorded original name, if
/// one was present and sane. Failures keep the provisional name, matching
/// what gunzip-style tools do with untrustworthy metadata.
fn rename_from_member_name(out_dir: &Path, dest: PathBuf, original_name: &[u8]) -> PathBuf {
    if original_name.is_empty() {
        return dest;
    }
    let Ok(name) = std::str::from_utf8(original_name) else {
        return dest;
    };
    let Some(base) = Path::new(name).file_name() else {
        return dest;
    };
    let renamed = out_dir.join(base);
    if renamed != dest && std::fs::rename(&dest, &renamed).is_ok() {
        return renamed;
    }
    dest
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, GzBuilder};
    use pretty_assertions::assert_eq;

    fn gzip_bytes(payload: &[u8], member_name: Option<&str>) -> Vec<u8> {
        let mut builder = GzBuilder::new();
        if let Some(name) = member_name {
            builder = builder.filename(name);
        }
        let mut encoder = builder.write(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    fn write_input(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::File::create(&path).unwrap().write_all(data).unwrap();
        path
    }

    #[test]
    fn member_name_wins_over_source_name() {
        let dir = tempfile::tempdir().unwrap();
        let payload = vec![0u8; 64 * 1024];
        let data = gzip_bytes(&payload, Some("blob.bin"));
        let input = write_input(dir.path(), "archive.gz", &data);
        let out = tempfile::tempdir().unwrap();

        let extraction = parse_gzip(&input, 0, out.path(), dir.path()).unwrap();
        assert_eq!(extraction.consumed, data.len() as u64);
        let tags: Vec<_> = extraction.stream_tags.iter().map(|t| t.as_str()).collect();
        assert_eq!(tags, ["gzip", "compressed"]);
        assert_eq!(extraction.carved.len(), 1);
        let carved = &extraction.carved[0];
        assert_eq!(carved.path, out.path().join("blob.bin"));
        assert!(carved.tags.is_empty());
        assert_eq!(std::fs::read(&carved.path).unwrap(), payload);
    }

    #[test]
    fn gz_suffix_is_stripped_for_anonymous_members() {
        let dir = tempfile::tempdir().unwrap();
        let data = gzip_bytes(b"hello", None);
        let input = write_input(dir.path(), "data.gz", &data);
        let out = tempfile::tempdir().unwrap();

        let extraction = parse_gzip(&input, 0, out.path(), dir.path()).unwrap();
        assert_eq!(extraction.carved[0].path, out.path().join("data"));
    }

    #[test]
    fn default_name_without_gz_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let data = gzip_bytes(b"hello", None);
        let input = write_input(dir.path(), "blob", &data);
        let out = tempfile::tempdir().unwrap();

        let extraction = parse_gzip(&input, 0, out.path(), dir.path()).unwrap();
        assert_eq!(extraction.carved[0].path, out.path().join("unpacked-from-gz"));
    }

    #[test]
    fn trailing_data_bounds_the_member() {
        let dir = tempfile::tempdir().unwrap();
        let member = gzip_bytes(b"payload payload payload", None);
        let mut data = member.clone();
        data.extend_from_slice(b"unrelated trailing bytes");
        let input = write_input(dir.path(), "mixed", &data);
        let out = tempfile::tempdir().unwrap();

        let extraction = parse_gzip(&input, 0, out.path(), dir.path()).unwrap();
        assert_eq!(extraction.consumed, member.len() as u64);
        assert!(extraction.stream_tags.is_empty());
    }

    #[test]
    fn concatenated_members_parse_one_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let first = gzip_bytes(b"first member", None);
        let second = gzip_bytes(b"second member", None);
        let mut data = first.clone();
        data.extend_from_slice(&second);
        let input = write_input(dir.path(), "concat", &data);

        let out_a = tempfile::tempdir().unwrap();
        let a = parse_gzip(&input, 0, out_a.path(), dir.path()).unwrap();
        assert_eq!(a.consumed, first.len() as u64);

        let out_b = tempfile::tempdir().unwrap();
        let b = parse_gzip(&input, a.consumed, out_b.path(), dir.path()).unwrap();
        assert_eq!(b.consumed, second.len() as u64);
        assert_eq!(
            std::fs::read(&b.carved[0].path).unwrap(),
            b"second member"
        );
    }

    #[test]
    fn reserved_flag_bits_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = gzip_bytes(b"x", None);
        data[3] |= 0x40;
        let input = write_input(dir.path(), "bad.gz", &data);
        let out = tempfile::tempdir().unwrap();

        let err = parse_gzip(&input, 0, out.path(), dir.path()).unwrap_err();
        assert_eq!(err.reason, "not a valid gzip file");
        assert_eq!(err.offset, 3);
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn encrypted_flag_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = gzip_bytes(b"x", None);
        data[3] |= 0x20;
        let input = write_input(dir.path(), "bad.gz", &data);
        let out = tempfile::tempdir().unwrap();

        let err = parse_gzip(&input, 0, out.path(), dir.path()).unwrap_err();
        assert_eq!(err.reason, "unsupported encrypted");
    }

    // RFC 1952 assigns flag bit 2 to FEXTRA; some older tooling treated it
    // as multi-part continuation. The RFC reading is pinned here.
    #[test]
    fn fextra_member_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let plain = gzip_bytes(b"extra field test", None);
        let mut data = vec![0x1f, 0x8b, 0x08, 0x04, 0, 0, 0, 0, 0, 0xff];
        data.extend_from_slice(&[0x04, 0x00]);
        data.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd]);
        data.extend_from_slice(&plain[10..]);
        let input = write_input(dir.path(), "extra.gz", &data);
        let out = tempfile::tempdir().unwrap();

        let extraction = parse_gzip(&input, 0, out.path(), dir.path()).unwrap();
        assert_eq!(extraction.consumed, data.len() as u64);
        assert_eq!(
            std::fs::read(&extraction.carved[0].path).unwrap(),
            b"extra field test"
        );
    }

    #[test]
    fn unterminated_member_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = vec![0x1f, 0x8b, 0x08, 0x08, 0, 0, 0, 0, 0, 0xff];
        data.extend_from_slice(b"name-with-no-terminator");
        let input = write_input(dir.path(), "bad.gz", &data);
        let out = tempfile::tempdir().unwrap();

        let err = parse_gzip(&input, 0, out.path(), dir.path()).unwrap_err();
        assert_eq!(err.reason, "file name data outside of file");
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn corrupted_trailer_crc_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = gzip_bytes(b"check me", None);
        let crc_at = data.len() - 8;
        data[crc_at] ^= 0xff;
        let input = write_input(dir.path(), "bad.gz", &data);
        let out = tempfile::tempdir().unwrap();

        let err = parse_gzip(&input, 0, out.path(), dir.path()).unwrap_err();
        assert_eq!(err.reason, "wrong value for CRC");
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn corrupted_isize_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = gzip_bytes(b"check me", None);
        let isize_at = data.len() - 4;
        data[isize_at] ^= 0xff;
        let input = write_input(dir.path(), "bad.gz", &data);
        let out = tempfile::tempdir().unwrap();

        let err = parse_gzip(&input, 0, out.path(), dir.path()).unwrap_err();
        assert_eq!(err.reason, "wrong value for ISIZE");
    }

    #[test]
    fn truncated_trailer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = gzip_bytes(b"check me", None);
        data.truncate(data.len() - 5);
        let input = write_input(dir.path(), "bad.gz", &data);
        let out = tempfile::tempdir().unwrap();

        let err = parse_gzip(&input, 0, out.path(), dir.path()).unwrap_err();
        assert_eq!(err.reason, "no CRC and ISIZE");
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn truncated_body_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let full = gzip_bytes(&vec![7u8; 4096], None);
        let data = &full[..full.len() / 2];
        let input = write_input(dir.path(), "bad.gz", data);
        let out = tempfile::tempdir().unwrap();

        let err = parse_gzip(&input, 0, out.path(), dir.path()).unwrap_err();
        assert_eq!(err.reason, "File not a valid gzip file");
        assert!(!err.fatal);
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }
}
