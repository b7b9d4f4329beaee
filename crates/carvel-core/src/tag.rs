//! Closed tag vocabulary applied to recognised streams and carved files.

use std::collections::BTreeSet;
use std::fmt;

/// A label attached to a recognised stream or an extracted file.
///
/// The vocabulary is closed: downstream consumers match on these variants
/// and no parser may invent labels outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tag {
    Riff,
    Webp,
    Wav,
    Ani,
    Png,
    Apng,
    Animated,
    Graphics,
    Audio,
    Bmp,
    Gzip,
    Compressed,
    Lzma,
    Xz,
    Timezone,
    Resource,
    Tar,
    Archive,
    Ar,
    Deb,
    Debian,
    Unpacked,
    SymbolicLink,
}

/// Tags form a set per file; `BTreeSet` keeps reporting order stable.
pub type TagSet = BTreeSet<Tag>;

impl Tag {
    /// The wire form of the tag, as consumed by reporting tools.
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Riff => "riff",
            Tag::Webp => "webp",
            Tag::Wav => "wav",
            Tag::Ani => "ani",
            Tag::Png => "png",
            Tag::Apng => "apng",
            Tag::Animated => "animated",
            Tag::Graphics => "graphics",
            Tag::Audio => "audio",
            Tag::Bmp => "bmp",
            Tag::Gzip => "gzip",
            Tag::Compressed => "compressed",
            Tag::Lzma => "lzma",
            Tag::Xz => "xz",
            Tag::Timezone => "timezone",
            Tag::Resource => "resource",
            Tag::Tar => "tar",
            Tag::Archive => "archive",
            Tag::Ar => "ar",
            Tag::Deb => "deb",
            Tag::Debian => "debian",
            Tag::Unpacked => "unpacked",
            Tag::SymbolicLink => "symbolic link",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_forms_are_lowercase() {
        let all = [
            Tag::Riff,
            Tag::Webp,
            Tag::Wav,
            Tag::Ani,
            Tag::Png,
            Tag::Apng,
            Tag::Animated,
            Tag::Graphics,
            Tag::Audio,
            Tag::Bmp,
            Tag::Gzip,
            Tag::Compressed,
            Tag::Lzma,
            Tag::Xz,
            Tag::Timezone,
            Tag::Resource,
            Tag::Tar,
            Tag::Archive,
            Tag::Ar,
            Tag::Deb,
            Tag::Debian,
            Tag::Unpacked,
            Tag::SymbolicLink,
        ];
        for tag in all {
            assert!(!tag.as_str().is_empty());
            assert_eq!(tag.as_str(), tag.as_str().to_lowercase());
        }
    }

    #[test]
    fn sets_deduplicate() {
        let set: TagSet = [Tag::Png, Tag::Graphics, Tag::Png].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
