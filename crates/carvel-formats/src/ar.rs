//! Unix `ar` archive adapter, delegating to binutils `ar` for both
//! validation and extraction.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use carvel_core::{CarvedFile, Extraction, ParseError, ParseResult, Tag, TagSet, open_input};

use crate::external::find_program;

/// Verify an `ar` archive. Only whole files are supported: `ar` has no way
/// to start reading at an inner offset.
pub fn parse_ar(path: &Path, base_offset: u64, out_dir: &Path, _tmp_dir: &Path) -> ParseResult {
    if base_offset != 0 {
        return Err(ParseError::new(base_offset, "ar only works on whole files"));
    }

    let (_file, file_size) = open_input(path)?;

    if find_program("ar").is_none() {
        return Err(ParseError::new(0, "ar program not found"));
    }

    // `ar x` runs with cwd below, so the archive path has to be absolute.
    let archive = path.canonicalize().map_err(|e| ParseError::io(0, e))?;

    let listed = Command::new("ar")
        .arg("t")
        .arg(&archive)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| ParseError::io(0, e))?;
    if !listed.success() {
        return Err(ParseError::new(0, "Not a valid ar file"));
    }

    let before = list_dir(out_dir)?;
    let extracted = Command::new("ar")
        .arg("x")
        .arg(&archive)
        .current_dir(out_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| ParseError::io(0, e))?;
    if !extracted.success() {
        // Remove whatever a half-finished extraction left behind.
        for entry in list_dir(out_dir)? {
            if !before.contains(&entry) {
                remove_any(&entry);
            }
        }
        return Err(ParseError::new(0, "Not a valid ar file"));
    }

    let mut members: Vec<PathBuf> = list_dir(out_dir)?
        .into_iter()
        .filter(|entry| !before.contains(entry))
        .collect();
    members.sort();

    let mut stream_tags: TagSet = [Tag::Archive, Tag::Ar].into_iter().collect();
    let lower_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let is_deb_name = lower_name.ends_with(".deb") || lower_name.ends_with(".udeb");
    if is_deb_name
        && members
            .iter()
            .any(|m| m.file_name() == Some(std::ffi::OsStr::new("debian-binary")))
    {
        stream_tags.insert(Tag::Debian);
        stream_tags.insert(Tag::Deb);
    }

    debug!(members = members.len(), "ar extraction complete");

    let carved = members
        .into_iter()
        .map(|path| CarvedFile::new(path, []))
        .collect();
    Ok(Extraction {
        consumed: file_size,
        carved,
        stream_tags,
    })
}

fn list_dir(dir: &Path) -> Result<HashSet<PathBuf>, ParseError> {
    let mut entries = HashSet::new();
    let iter = std::fs::read_dir(dir).map_err(|e| ParseError::io(0, e))?;
    for entry in iter {
        let entry = entry.map_err(|e| ParseError::io(0, e))?;
        entries.insert(entry.path());
    }
    Ok(entries)
}

fn remove_any(path: &Path) {
    let is_real_dir = std::fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_dir())
        .unwrap_or(false);
    if is_real_dir {
        let _ = std::fs::remove_dir_all(path);
    } else {
        let _ = std::fs::remove_file(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn inner_offsets_are_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.a");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"!<arch>\n")
            .unwrap();
        let out = tempfile::tempdir().unwrap();

        let err = parse_ar(&path, 8, out.path(), dir.path()).unwrap_err();
        assert_eq!(err.reason, "ar only works on whole files");
        assert_eq!(err.offset, 8);
        assert!(!err.fatal);
    }
}
