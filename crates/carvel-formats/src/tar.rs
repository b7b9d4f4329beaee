//! Iterative POSIX ustar / GNU tar walker with byte-accurate consumption.
//!
//! Entries are read 512-byte block by block and extracted as they are
//! encountered. A tar cut off halfway still yields the entries before the
//! cut: iteration failure after at least one extracted entry accepts what
//! was unpacked and reports consumption up to the last complete entry.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::io::{BufReader, Read, Seek, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, trace};

use carvel_core::{
    ByteCursor, CarvedFile, Extraction, ParseError, ParseResult, Tag, open_input,
};

const BLOCK: u64 = 512;

// Header field offsets inside a 512-byte block.
const NAME: std::ops::Range<usize> = 0..100;
const SIZE: std::ops::Range<usize> = 124..136;
const CHKSUM: std::ops::Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const LINKNAME: std::ops::Range<usize> = 157..257;
const PREFIX: std::ops::Range<usize> = 345..500;

/// What one header block describes.
struct Entry {
    name: Vec<u8>,
    link: Vec<u8>,
    size: u64,
    typeflag: u8,
}

/// Verify a tar archive at `base_offset`, extracting its entries under
/// `out_dir`.
pub fn parse_tar(path: &Path, base_offset: u64, out_dir: &Path, _tmp_dir: &Path) -> ParseResult {
    let (file, file_size) = open_input(path)?;
    let mut cursor = ByteCursor::new(BufReader::new(file), base_offset, file_size)?;

    let mut carved: Vec<CarvedFile> = Vec::new();
    let mut written: HashSet<PathBuf> = HashSet::new();
    let mut extracted_any = false;
    let mut consumed: u64 = 0;
    let mut long_name: Option<Vec<u8>> = None;
    let mut long_link: Option<Vec<u8>> = None;
    let mut pax_path: Option<Vec<u8>> = None;
    let mut pax_link: Option<Vec<u8>> = None;

    loop {
        if cursor.remaining() < BLOCK {
            break;
        }
        let mut block = [0u8; BLOCK as usize];
        cursor.read_exact(&mut block)?;

        if block.iter().all(|&b| b == 0) {
            // End-of-archive marker; the zero-block sweep below picks up the
            // rest of the terminator and any GNU padding.
            consumed = cursor.consumed();
            break;
        }

        let header = match decode_header(&block) {
            Some(header) => header,
            None => {
                if extracted_any {
                    break;
                }
                return Err(ParseError::new(base_offset, "Not a valid tar file"));
            }
        };

        let padded = header.size.div_ceil(BLOCK) * BLOCK;
        if padded > cursor.remaining() {
            if extracted_any {
                break;
            }
            return Err(ParseError::new(base_offset, "Not a valid tar file"));
        }

        match header.typeflag {
            // GNU long name / long link apply to the following entry.
            b'L' | b'K' => {
                let data = read_entry_data(&mut cursor, header.size, padded)?;
                let trimmed = trim_nul(&data).to_vec();
                if header.typeflag == b'L' {
                    long_name = Some(trimmed);
                } else {
                    long_link = Some(trimmed);
                }
                continue;
            }
            // PAX records; only path overrides matter for extraction.
            b'x' => {
                let data = read_entry_data(&mut cursor, header.size, padded)?;
                let (path_override, link_override) = parse_pax_records(&data);
                pax_path = path_override;
                pax_link = link_override;
                continue;
            }
            // PAX global header; consumed and ignored.
            b'g' => {
                read_entry_data(&mut cursor, header.size, padded)?;
                continue;
            }
            _ => {}
        }

        let raw_name = pax_path
            .take()
            .or_else(|| long_name.take())
            .unwrap_or(header.name);
        let raw_link = pax_link
            .take()
            .or_else(|| long_link.take())
            .unwrap_or(header.link);

        let outcome = extract_entry(
            &mut cursor,
            out_dir,
            header.typeflag,
            header.size,
            padded,
            &raw_name,
            &raw_link,
            &mut written,
        );
        match outcome {
            Ok(Outcome::Carved(file)) => {
                carved.push(file);
                extracted_any = true;
                consumed = cursor.consumed();
            }
            Ok(Outcome::Extracted) => {
                extracted_any = true;
                consumed = cursor.consumed();
            }
            Ok(Outcome::Skipped) => {
                consumed = cursor.consumed();
            }
            Err(e) if e.fatal => return Err(e),
            Err(e) => {
                trace!(reason = %e.reason, "tar entry failed, stopping iteration");
                if extracted_any {
                    break;
                }
                return Err(ParseError::new(base_offset, "Not a valid tar file"));
            }
        }
    }

    if !extracted_any {
        return Err(ParseError::new(base_offset, "Not a valid tar file"));
    }

    // GNU tar pads archives with up to 20 zero-filled blocks; they belong to
    // the archive, so sweep them into the consumed count.
    if consumed % BLOCK == 0 {
        cursor.seek_to(base_offset + consumed)?;
        while cursor.remaining() >= BLOCK {
            let before = cursor.position();
            let mut block = [0u8; BLOCK as usize];
            cursor.read_exact(&mut block)?;
            if block.iter().any(|&b| b != 0) {
                cursor.seek_to(before)?;
                break;
            }
            consumed += BLOCK;
        }
    }

    debug!(consumed, entries = carved.len(), "unpacked tar archive");

    let mut extraction = Extraction::embedded(consumed, carved);
    if base_offset == 0 && consumed == file_size {
        extraction.stream_tags = [Tag::Tar, Tag::Archive].into_iter().collect();
    }
    Ok(extraction)
}

enum Outcome {
    /// Extracted and reported to the caller.
    Carved(CarvedFile),
    /// Extracted but not listed (directories, hard links).
    Extracted,
    /// Consumed without extraction (devices, FIFOs, unsafe paths).
    Skipped,
}

fn decode_header(block: &[u8; BLOCK as usize]) -> Option<Entry> {
    let stored = parse_octal(&block[CHKSUM])?;
    let mut sum: u64 = 0;
    for (i, &byte) in block.iter().enumerate() {
        sum += if CHKSUM.contains(&i) {
            u64::from(b' ')
        } else {
            u64::from(byte)
        };
    }
    if sum != stored {
        return None;
    }

    let size = parse_octal(&block[SIZE])?;
    let mut name = Vec::new();
    let prefix = trim_nul(&block[PREFIX]);
    if !prefix.is_empty() {
        name.extend_from_slice(prefix);
        name.push(b'/');
    }
    name.extend_from_slice(trim_nul(&block[NAME]));

    Some(Entry {
        name,
        link: trim_nul(&block[LINKNAME]).to_vec(),
        size,
        typeflag: block[TYPEFLAG],
    })
}

fn trim_nul(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

/// Numeric header fields are ASCII octal; GNU tar stores huge values in
/// base-256 with the top bit of the first byte set.
fn parse_octal(field: &[u8]) -> Option<u64> {
    if field.first().is_some_and(|&b| b & 0x80 != 0) {
        let mut value = u64::from(field[0] & 0x7f);
        for &byte in &field[1..] {
            value = value.checked_mul(256)?.checked_add(u64::from(byte))?;
        }
        return Some(value);
    }

    let mut value: u64 = 0;
    let mut seen_digit = false;
    for &byte in field {
        match byte {
            b'0'..=b'7' => {
                value = value.checked_mul(8)?.checked_add(u64::from(byte - b'0'))?;
                seen_digit = true;
            }
            b' ' if !seen_digit => {}
            b' ' | 0 => break,
            _ => return None,
        }
    }
    Some(value)
}

fn read_entry_data<R: Read + Seek>(
    cursor: &mut ByteCursor<R>,
    size: u64,
    padded: u64,
) -> Result<Vec<u8>, ParseError> {
    let mut data = vec![0u8; size as usize];
    cursor.read_exact(&mut data)?;
    cursor.skip(padded - size)?;
    Ok(data)
}

/// Pull `path` and `linkpath` overrides out of a PAX extended header.
/// Records are `"<len> <key>=<value>\n"`; unknown keys are ignored.
fn parse_pax_records(data: &[u8]) -> (Option<Vec<u8>>, Option<Vec<u8>>) {
    let mut path = None;
    let mut link = None;
    let mut rest = data;
    while !rest.is_empty() {
        let Some(space) = rest.iter().position(|&b| b == b' ') else {
            break;
        };
        let Ok(len_str) = std::str::from_utf8(&rest[..space]) else {
            break;
        };
        let Ok(record_len) = len_str.parse::<usize>() else {
            break;
        };
        if record_len <= space + 1 || record_len > rest.len() {
            break;
        }
        let record = &rest[space + 1..record_len];
        if let Some(eq) = record.iter().position(|&b| b == b'=') {
            let key = &record[..eq];
            // The record ends with a newline that is not part of the value.
            let value = record[eq + 1..].strip_suffix(b"\n").unwrap_or(&record[eq + 1..]);
            match key {
                b"path" => path = Some(value.to_vec()),
                b"linkpath" => link = Some(value.to_vec()),
                _ => {}
            }
        }
        rest = &rest[record_len..];
    }
    (path, link)
}

/// Strip leading roots and reject path traversal; `None` means the entry
/// must not be written at all.
fn sanitize(raw: &[u8]) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(OsStr::from_bytes(raw)).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

/// Archives are concatenations and may carry the same path twice; duplicate
/// names get a deterministic numeric suffix.
fn unique_path(written: &mut HashSet<PathBuf>, rel: PathBuf) -> PathBuf {
    if written.insert(rel.clone()) {
        return rel;
    }
    let mut n = 1u32;
    loop {
        let mut name = rel.file_name().unwrap_or_default().to_os_string();
        name.push(format!("-{n}"));
        let candidate = rel.with_file_name(name);
        if written.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Refuse to write through a symlinked ancestor inside `out_dir`.
fn ancestors_are_real(out_dir: &Path, rel: &Path) -> bool {
    let mut current = out_dir.to_path_buf();
    if let Some(parent) = rel.parent() {
        for component in parent.components() {
            current.push(component);
            if let Ok(meta) = fs::symlink_metadata(&current) {
                if meta.file_type().is_symlink() {
                    return false;
                }
            }
        }
    }
    true
}

#[allow(clippy::too_many_arguments)]
fn extract_entry<R: Read + Seek>(
    cursor: &mut ByteCursor<R>,
    out_dir: &Path,
    typeflag: u8,
    size: u64,
    padded: u64,
    raw_name: &[u8],
    raw_link: &[u8],
    written: &mut HashSet<PathBuf>,
) -> Result<Outcome, ParseError> {
    // Character devices, block devices and FIFOs are consumed, never
    // extracted.
    if matches!(typeflag, b'3' | b'4' | b'6') {
        cursor.skip(padded)?;
        return Ok(Outcome::Skipped);
    }

    let Some(rel) = sanitize(raw_name) else {
        cursor.skip(padded)?;
        return Ok(Outcome::Skipped);
    };
    if !ancestors_are_real(out_dir, &rel) {
        cursor.skip(padded)?;
        return Ok(Outcome::Skipped);
    }

    match typeflag {
        b'5' => {
            let dest = out_dir.join(&rel);
            fs::create_dir_all(&dest).map_err(|e| ParseError::io(cursor.position(), e))?;
            set_mode_0700(&dest, cursor.position())?;
            cursor.skip(padded)?;
            Ok(Outcome::Extracted)
        }
        b'2' => {
            let dest = out_dir.join(unique_path(written, rel));
            ensure_parent(&dest, cursor.position())?;
            let target = Path::new(OsStr::from_bytes(raw_link));
            if std::os::unix::fs::symlink(target, &dest).is_err() {
                return Err(ParseError::new(cursor.position(), "cannot create symbolic link"));
            }
            cursor.skip(padded)?;
            Ok(Outcome::Carved(CarvedFile::new(dest, [Tag::SymbolicLink])))
        }
        b'1' => {
            let Some(link_rel) = sanitize(raw_link) else {
                cursor.skip(padded)?;
                return Ok(Outcome::Skipped);
            };
            let dest = out_dir.join(unique_path(written, rel));
            ensure_parent(&dest, cursor.position())?;
            if fs::hard_link(out_dir.join(link_rel), &dest).is_err() {
                return Err(ParseError::new(cursor.position(), "cannot create hard link"));
            }
            cursor.skip(padded)?;
            Ok(Outcome::Extracted)
        }
        // '0', NUL and old-style contiguous entries are regular files.
        _ => {
            let dest = out_dir.join(unique_path(written, rel));
            ensure_parent(&dest, cursor.position())?;
            write_regular(cursor, &dest, size, padded)?;
            set_mode_0700(&dest, cursor.position())?;
            Ok(Outcome::Carved(CarvedFile::new(dest, [])))
        }
    }
}

fn ensure_parent(dest: &Path, offset: u64) -> Result<(), ParseError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| ParseError::io(offset, e))?;
    }
    Ok(())
}

fn set_mode_0700(dest: &Path, offset: u64) -> Result<(), ParseError> {
    fs::set_permissions(dest, fs::Permissions::from_mode(0o700))
        .map_err(|e| ParseError::io(offset, e))
}

fn write_regular<R: Read + Seek>(
    cursor: &mut ByteCursor<R>,
    dest: &Path,
    size: u64,
    padded: u64,
) -> Result<(), ParseError> {
    let result = (|| {
        let mut output = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dest)
            .map_err(|e| ParseError::io(cursor.position(), e))?;
        let mut left = size;
        let mut buf = [0u8; 64 * 1024];
        while left > 0 {
            let take = (buf.len() as u64).min(left) as usize;
            cursor.read_exact(&mut buf[..take])?;
            output
                .write_all(&buf[..take])
                .map_err(|e| ParseError::io(cursor.position(), e))?;
            left -= take as u64;
        }
        cursor.skip(padded - size)
    })();
    if result.is_err() {
        let _ = fs::remove_file(dest);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn header_block(name: &str, size: u64, typeflag: u8, link: &str) -> Vec<u8> {
        let mut block = vec![0u8; 512];
        block[NAME][..name.len()].copy_from_slice(name.as_bytes());
        block[100..108].copy_from_slice(b"0000644\0");
        block[108..116].copy_from_slice(b"0000000\0");
        block[116..124].copy_from_slice(b"0000000\0");
        block[SIZE].copy_from_slice(format!("{size:011o}\0").as_bytes());
        block[136..148].copy_from_slice(b"00000000000\0");
        block[TYPEFLAG] = typeflag;
        block[LINKNAME][..link.len()].copy_from_slice(link.as_bytes());
        block[257..263].copy_from_slice(b"ustar\0");
        block[263..265].copy_from_slice(b"00");

        let mut sum: u64 = 0;
        for (i, &b) in block.iter().enumerate() {
            sum += if CHKSUM.contains(&i) {
                u64::from(b' ')
            } else {
                u64::from(b)
            };
        }
        block[CHKSUM].copy_from_slice(format!("{sum:06o}\0 ").as_bytes());
        block
    }

    fn entry(name: &str, content: &[u8]) -> Vec<u8> {
        let mut out = header_block(name, content.len() as u64, b'0', "");
        out.extend_from_slice(content);
        let padding = content.len().div_ceil(512) * 512 - content.len();
        out.extend_from_slice(&vec![0u8; padding]);
        out
    }

    fn terminator() -> Vec<u8> {
        vec![0u8; 1024]
    }

    fn write_input(dir: &Path, data: &[u8]) -> PathBuf {
        let path = dir.join("archive.tar");
        fs::File::create(&path).unwrap().write_all(data).unwrap();
        path
    }

    #[test]
    fn single_entry_archive() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = entry("hello.txt", b"A");
        data.extend_from_slice(&terminator());
        let input = write_input(dir.path(), &data);
        let out = tempfile::tempdir().unwrap();

        let extraction = parse_tar(&input, 0, out.path(), dir.path()).unwrap();
        assert_eq!(extraction.consumed, data.len() as u64);
        let tags: Vec<_> = extraction.stream_tags.iter().map(|t| t.as_str()).collect();
        assert_eq!(tags, ["tar", "archive"]);
        assert_eq!(extraction.carved.len(), 1);
        let carved = &extraction.carved[0];
        assert_eq!(fs::read(&carved.path).unwrap(), b"A");
        let mode = fs::metadata(&carved.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn concatenated_archives_parse_one_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = entry("a.txt", b"A");
        first.extend_from_slice(&terminator());
        let mut second = entry("b.txt", b"B");
        second.extend_from_slice(&terminator());
        let mut data = first.clone();
        data.extend_from_slice(&second);
        let input = write_input(dir.path(), &data);

        let out_a = tempfile::tempdir().unwrap();
        let a = parse_tar(&input, 0, out_a.path(), dir.path()).unwrap();
        assert_eq!(a.consumed, first.len() as u64);
        assert_eq!(fs::read(&a.carved[0].path).unwrap(), b"A");

        let out_b = tempfile::tempdir().unwrap();
        let b = parse_tar(&input, a.consumed, out_b.path(), dir.path()).unwrap();
        assert_eq!(b.consumed, second.len() as u64);
        assert_eq!(fs::read(&b.carved[0].path).unwrap(), b"B");
    }

    #[test]
    fn garbage_after_entry_is_not_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let good = entry("file.bin", b"payload");
        let mut data = good.clone();
        data.extend_from_slice(&[0xffu8; 512]);
        let input = write_input(dir.path(), &data);
        let out = tempfile::tempdir().unwrap();

        let extraction = parse_tar(&input, 0, out.path(), dir.path()).unwrap();
        assert_eq!(extraction.consumed, good.len() as u64);
        assert!(extraction.stream_tags.is_empty());
        assert_eq!(extraction.carved.len(), 1);
    }

    #[test]
    fn truncated_second_entry_keeps_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let good = entry("keep.txt", b"kept");
        let mut data = good.clone();
        // Header promising 4096 data bytes that are not there.
        data.extend_from_slice(&header_block("lost.txt", 4096, b'0', ""));
        data.extend_from_slice(&[0u8; 512]);
        let input = write_input(dir.path(), &data);
        let out = tempfile::tempdir().unwrap();

        let extraction = parse_tar(&input, 0, out.path(), dir.path()).unwrap();
        assert_eq!(extraction.consumed, good.len() as u64);
        assert_eq!(extraction.carved.len(), 1);
        assert!(!out.path().join("lost.txt").exists());
    }

    #[test]
    fn symlinks_are_recorded_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = header_block("link", 0, b'2', "target-elsewhere");
        data.extend_from_slice(&entry("plain.txt", b"x"));
        data.extend_from_slice(&terminator());
        let input = write_input(dir.path(), &data);
        let out = tempfile::tempdir().unwrap();

        let extraction = parse_tar(&input, 0, out.path(), dir.path()).unwrap();
        let link = extraction
            .carved
            .iter()
            .find(|c| c.tags.contains(&Tag::SymbolicLink))
            .unwrap();
        assert_eq!(
            fs::read_link(&link.path).unwrap(),
            PathBuf::from("target-elsewhere")
        );
    }

    #[test]
    fn duplicate_names_get_deterministic_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = entry("dup", b"one");
        data.extend_from_slice(&entry("dup", b"two"));
        data.extend_from_slice(&terminator());
        let input = write_input(dir.path(), &data);
        let out = tempfile::tempdir().unwrap();

        let extraction = parse_tar(&input, 0, out.path(), dir.path()).unwrap();
        assert_eq!(fs::read(out.path().join("dup")).unwrap(), b"one");
        assert_eq!(fs::read(out.path().join("dup-1")).unwrap(), b"two");
        assert_eq!(extraction.carved.len(), 2);
    }

    #[test]
    fn gnu_long_names_are_honored() {
        let dir = tempfile::tempdir().unwrap();
        let long = "deeply/nested/".repeat(10) + "file-with-a-very-long-name.txt";
        let mut meta = header_block("././@LongLink", long.len() as u64 + 1, b'L', "");
        meta.extend_from_slice(long.as_bytes());
        meta.push(0);
        let padding = (long.len() + 1).div_ceil(512) * 512 - (long.len() + 1);
        meta.extend_from_slice(&vec![0u8; padding]);

        let mut data = meta;
        data.extend_from_slice(&entry("short-name", b"content"));
        data.extend_from_slice(&terminator());
        let input = write_input(dir.path(), &data);
        let out = tempfile::tempdir().unwrap();

        let extraction = parse_tar(&input, 0, out.path(), dir.path()).unwrap();
        assert_eq!(extraction.carved.len(), 1);
        assert!(extraction.carved[0].path.ends_with(Path::new(&long)));
        assert_eq!(fs::read(&extraction.carved[0].path).unwrap(), b"content");
    }

    #[test]
    fn pax_path_override_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        let pax_record = "27 path=renamed/by-pax.txt\n";
        let mut meta = header_block("pax-header", pax_record.len() as u64, b'x', "");
        meta.extend_from_slice(pax_record.as_bytes());
        let padding = pax_record.len().div_ceil(512) * 512 - pax_record.len();
        meta.extend_from_slice(&vec![0u8; padding]);

        let mut data = meta;
        data.extend_from_slice(&entry("original-name", b"pax content"));
        data.extend_from_slice(&terminator());
        let input = write_input(dir.path(), &data);
        let out = tempfile::tempdir().unwrap();

        let extraction = parse_tar(&input, 0, out.path(), dir.path()).unwrap();
        assert_eq!(
            fs::read(out.path().join("renamed/by-pax.txt")).unwrap(),
            b"pax content"
        );
        assert_eq!(extraction.carved.len(), 1);
    }

    #[test]
    fn traversal_entries_are_skipped_but_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = entry("../escape.txt", b"nope");
        data.extend_from_slice(&entry("safe.txt", b"fine"));
        data.extend_from_slice(&terminator());
        let input = write_input(dir.path(), &data);
        let out = tempfile::tempdir().unwrap();

        let extraction = parse_tar(&input, 0, out.path(), dir.path()).unwrap();
        assert_eq!(extraction.consumed, data.len() as u64);
        assert_eq!(extraction.carved.len(), 1);
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn random_block_is_not_a_tar() {
        let dir = tempfile::tempdir().unwrap();
        let data = vec![0xabu8; 512];
        let input = write_input(dir.path(), &data);
        let out = tempfile::tempdir().unwrap();

        let err = parse_tar(&input, 0, out.path(), dir.path()).unwrap_err();
        assert_eq!(err.reason, "Not a valid tar file");
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn device_only_archive_is_not_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = header_block("dev/null", 0, b'3', "");
        data.extend_from_slice(&terminator());
        let input = write_input(dir.path(), &data);
        let out = tempfile::tempdir().unwrap();

        let err = parse_tar(&input, 0, out.path(), dir.path()).unwrap_err();
        assert_eq!(err.reason, "Not a valid tar file");
    }

    #[test]
    fn directories_are_extracted_but_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = header_block("subdir/", 0, b'5', "");
        data.extend_from_slice(&entry("subdir/file.txt", b"inside"));
        data.extend_from_slice(&terminator());
        let input = write_input(dir.path(), &data);
        let out = tempfile::tempdir().unwrap();

        let extraction = parse_tar(&input, 0, out.path(), dir.path()).unwrap();
        assert_eq!(extraction.carved.len(), 1);
        assert!(out.path().join("subdir").is_dir());
        let mode = fs::metadata(out.path().join("subdir")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
