//! Squashfs adapter: superblock pre-validation here, extraction via
//! `unsquashfs`.
//!
//! `unsquashfs` only accepts whole files, so an embedded file system is
//! first staged into a temp file under `tmp_dir` with the kernel copy path.

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;
use walkdir::WalkDir;

use carvel_core::{
    ByteCursor, CarvedFile, Extraction, ParseError, ParseResult, TagSet, carve_range, open_input,
};

use crate::external::find_program;

/// Verify a squashfs file system at `base_offset` and unpack it under
/// `out_dir`.
pub fn parse_squashfs(path: &Path, base_offset: u64, out_dir: &Path, tmp_dir: &Path) -> ParseResult {
    let (file, file_size) = open_input(path)?;
    let mut cursor = ByteCursor::new(BufReader::new(file), base_offset, file_size)?;

    if cursor.remaining() < 30 {
        return Err(ParseError::new(base_offset, "not enough data"));
    }

    // "hsqs" is the little-endian magic; anything else the caller matched
    // is a big-endian variant.
    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic)?;
    let little_endian = &magic == b"hsqs";

    cursor.seek_to(base_offset + 28)?;
    let version_pos = cursor.position();
    let major_version = if little_endian {
        cursor.u16_le()?
    } else {
        cursor.u16_be()?
    };
    if major_version == 0 || major_version > 4 {
        return Err(ParseError::new(version_pos, "invalid squashfs version"));
    }

    // The on-disk size moved around between versions; see squashfs_fs.h and
    // squashfs_compat.h in squashfs-tools.
    let image_size = match major_version {
        4 => read_size(&mut cursor, base_offset + 40, 8, little_endian)?,
        3 => read_size(&mut cursor, base_offset + 63, 8, little_endian)?,
        2 => read_size(&mut cursor, base_offset + 8, 4, little_endian)?,
        _ => {
            return Err(ParseError::new(
                version_pos,
                "cannot determine size for squashfs version 1",
            ));
        }
    };
    if image_size > file_size - base_offset {
        return Err(ParseError::new(
            cursor.position(),
            "file system cannot extend past file",
        ));
    }

    if find_program("unsquashfs").is_none() {
        return Err(ParseError::new(base_offset, "unsquashfs program not found"));
    }

    // Stage the tail of the host file when the file system is embedded.
    let staged = if base_offset == 0 {
        None
    } else {
        let tmp = tempfile::NamedTempFile::new_in(tmp_dir)
            .map_err(|e| ParseError::io(base_offset, e))?;
        carve_range(path, base_offset, file_size - base_offset, tmp.path())?;
        Some(tmp)
    };
    let target = staged.as_ref().map_or(path, |tmp| tmp.path());
    let target = target.canonicalize().map_err(|e| ParseError::io(base_offset, e))?;

    // unsquashfs creates squashfs-root inside its cwd; give it a scratch
    // directory so a failed run leaves out_dir untouched.
    let scratch = tempfile::tempdir_in(tmp_dir).map_err(|e| ParseError::io(base_offset, e))?;
    let status = Command::new("unsquashfs")
        .arg(&target)
        .current_dir(scratch.path())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| ParseError::io(base_offset, e))?;
    if !status.success() {
        return Err(ParseError::new(base_offset, "Not a valid squashfs file"));
    }

    let root = scratch.path().join("squashfs-root");
    let source_root = if root.is_dir() {
        root
    } else {
        scratch.path().to_path_buf()
    };
    let children = std::fs::read_dir(&source_root).map_err(|e| ParseError::io(base_offset, e))?;
    for child in children {
        let child = child.map_err(|e| ParseError::io(base_offset, e))?;
        move_entry(&child.path(), &out_dir.join(child.file_name()))
            .map_err(|e| ParseError::io(base_offset, e))?;
    }

    // Everything extracted must be traversable; inventory the tree while
    // fixing directory modes. Symlinks are preserved, never followed.
    let mut carved = Vec::new();
    for entry in WalkDir::new(out_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        if entry.file_type().is_dir() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(entry.path(), std::fs::Permissions::from_mode(0o700))
                .map_err(|e| ParseError::io(base_offset, e))?;
        } else {
            carved.push(CarvedFile::new(entry.into_path(), []));
        }
    }

    debug!(major_version, image_size, files = carved.len(), "unpacked squashfs");

    // The tag vocabulary has no label for squashfs itself, so the stream
    // carries none even when it spans the whole file.
    Ok(Extraction {
        consumed: image_size,
        carved,
        stream_tags: TagSet::new(),
    })
}

fn read_size<R: std::io::Read + std::io::Seek>(
    cursor: &mut ByteCursor<R>,
    at: u64,
    width: u64,
    little_endian: bool,
) -> Result<u64, ParseError> {
    if at + width > cursor.file_size() {
        return Err(ParseError::new(cursor.position(), "not enough data to read size"));
    }
    cursor.seek_to(at)?;
    match (width, little_endian) {
        (8, true) => cursor.u64_le(),
        (8, false) => cursor.u64_be(),
        (4, true) => cursor.u32_le().map(u64::from),
        _ => cursor.u32_be().map(u64::from),
    }
}

/// Move one extracted entry into `out_dir`, falling back to a
/// symlink-preserving copy when `rename` crosses file systems.
fn move_entry(src: &Path, dest: &Path) -> std::io::Result<()> {
    if std::fs::rename(src, dest).is_ok() {
        return Ok(());
    }
    copy_tree(src, dest)?;
    let meta = std::fs::symlink_metadata(src)?;
    if meta.file_type().is_dir() {
        std::fs::remove_dir_all(src)
    } else {
        std::fs::remove_file(src)
    }
}

fn copy_tree(src: &Path, dest: &Path) -> std::io::Result<()> {
    let file_type = std::fs::symlink_metadata(src)?.file_type();
    if file_type.is_symlink() {
        let target = std::fs::read_link(src)?;
        std::os::unix::fs::symlink(target, dest)
    } else if file_type.is_dir() {
        std::fs::create_dir_all(dest)?;
        for child in std::fs::read_dir(src)? {
            let child = child?;
            copy_tree(&child.path(), &dest.join(child.file_name()))?;
        }
        Ok(())
    } else {
        std::fs::copy(src, dest).map(|_| ())
    }
}
