//! Copying recognised byte ranges out of the host file.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use tracing::debug;

use crate::contract::ParseError;

/// Create an output file with permissions `0600`, truncating any previous
/// content. Used both by the range carver below and by parsers that write
/// decoded payloads themselves (gzip, LZMA/XZ).
pub fn create_carve_file(dest: &Path) -> Result<File, ParseError> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(dest)
        .map_err(|e| ParseError::io(0, e))
}

/// Copy `[base_offset, base_offset + length)` of `src` into `dest`.
///
/// `std::io::copy` between file handles takes the kernel copy path
/// (`copy_file_range` on Linux) so the range never round-trips through
/// userspace; on failure the partial output is unlinked and the error is
/// fatal.
pub fn carve_range(src: &Path, base_offset: u64, length: u64, dest: &Path) -> Result<(), ParseError> {
    let mut input = File::open(src).map_err(|e| ParseError::io(base_offset, e))?;
    input
        .seek(SeekFrom::Start(base_offset))
        .map_err(|e| ParseError::io(base_offset, e))?;

    let mut output = create_carve_file(dest)?;
    let copied = match io::copy(&mut input.take(length), &mut output) {
        Ok(copied) => copied,
        Err(e) => {
            let _ = std::fs::remove_file(dest);
            return Err(ParseError::io(base_offset, e));
        }
    };
    if copied != length {
        let _ = std::fs::remove_file(dest);
        return Err(ParseError::io(
            base_offset + copied,
            io::Error::new(io::ErrorKind::UnexpectedEof, "input truncated during carve"),
        ));
    }

    debug!(length, base_offset, dest = %dest.display(), "carved byte range");
    Ok(())
}
