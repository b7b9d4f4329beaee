//! Format carvers and verifiers.
//!
//! Each module recognises one binary format starting at an arbitrary offset
//! inside a host file, validates its structure against untrusted input,
//! reports the exact byte length the stream spans and, when the stream is
//! embedded rather than the whole file, extracts it below `out_dir`.
//!
//! # Supported formats
//!
//! - **RIFF** containers: WebP, WAV and ANI share one chunk-tree walker
//! - **PNG** with CRC-32 chunk validation and APNG detection
//! - **gzip** (RFC 1952) with streaming DEFLATE framing detection
//! - **LZMA / XZ** with decoder-residual framing detection
//! - **TZif** timezone records, versions 0/2/3
//! - **tar** POSIX ustar / GNU archives, extracted entry by entry
//! - **BMP / ar / squashfs**, pre-validated here and delegated to
//!   `bmptopnm`, `ar` and `unsquashfs` for the bit-level verdict
//!
//! All parsers share the `carvel-core` contract: errors are values, never
//! panics, and a failed parse leaves nothing behind under `out_dir`.

pub mod ar;
pub mod bmp;
mod external;
pub mod gzip;
pub mod lzma;
pub mod png;
pub mod riff;
pub mod squashfs;
pub mod tar;
pub mod tzif;

use carvel_core::FormatParser;

static REGISTRY: &[FormatParser] = &[
    FormatParser {
        name: "webp",
        parse: riff::parse_webp,
    },
    FormatParser {
        name: "wav",
        parse: riff::parse_wav,
    },
    FormatParser {
        name: "ani",
        parse: riff::parse_ani,
    },
    FormatParser {
        name: "png",
        parse: png::parse_png,
    },
    FormatParser {
        name: "gzip",
        parse: gzip::parse_gzip,
    },
    FormatParser {
        name: "lzma",
        parse: lzma::parse_lzma,
    },
    FormatParser {
        name: "xz",
        parse: lzma::parse_xz,
    },
    FormatParser {
        name: "timezone",
        parse: tzif::parse_timezone,
    },
    FormatParser {
        name: "tar",
        parse: tar::parse_tar,
    },
    FormatParser {
        name: "bmp",
        parse: bmp::parse_bmp,
    },
    FormatParser {
        name: "ar",
        parse: ar::parse_ar,
    },
    FormatParser {
        name: "squashfs",
        parse: squashfs::parse_squashfs,
    },
];

/// The dispatch table over every supported format, in probe order.
///
/// Scheduling which offsets to probe is the caller's concern; each entry is
/// independent and safe to invoke from separate threads as long as the
/// target `out_dir`s and `tmp_dir`s are disjoint.
pub fn registry() -> &'static [FormatParser] {
    REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_names_are_unique() {
        let mut names: Vec<_> = registry().iter().map(|p| p.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), registry().len());
    }
}
