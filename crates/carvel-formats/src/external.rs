//! Locating the external verifier programs on the search path.

use std::path::{Path, PathBuf};

/// Locate `program` on the process's `PATH`, like `which(1)`.
///
/// Subprocess-backed parsers call this before doing any work so a missing
/// tool surfaces as a non-fatal error naming the program instead of a spawn
/// failure.
pub(crate) fn find_program(program: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_a_shell() {
        // /bin/sh is a safe bet on any unix test machine.
        assert!(find_program("sh").is_some());
    }

    #[test]
    fn rejects_nonsense() {
        assert!(find_program("definitely-not-a-real-program-name").is_none());
    }
}
