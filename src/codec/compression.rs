//! Stream compression for text codecs, selected by a trailing file suffix.
//!
//! `part.csv.gz` is a gzip-compressed CSV file: the suffix is stripped before codec
//! dispatch and the bytes are (de)compressed around the codec. Each algorithm sits
//! behind its own feature flag:
//!
//! - **Gzip** (`.gz`, `.gzip`) - `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`, `.zstd`) - `zstd` (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`, `.bzip2`) - `bzip2` (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) - `xz2` (feature: `compression-xz`)
//!
//! A recognized suffix whose feature is disabled still resolves to its variant, so
//! the registry can report a missing dependency rather than an unknown format.

use std::io::{self, Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    Gzip,
    Zstd,
    Bzip2,
    Xz,
}

impl Compression {
    pub const ALL: [Self; 4] = [Self::Gzip, Self::Zstd, Self::Bzip2, Self::Xz];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
        }
    }

    /// Suffixes with their leading dot, lowercase.
    #[must_use]
    pub const fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Gzip => &[".gz", ".gzip"],
            Self::Zstd => &[".zst", ".zstd"],
            Self::Bzip2 => &[".bz2", ".bzip2"],
            Self::Xz => &[".xz"],
        }
    }

    /// Cargo feature that compiles this algorithm in.
    #[must_use]
    pub const fn feature(self) -> &'static str {
        match self {
            Self::Gzip => "compression-gzip",
            Self::Zstd => "compression-zstd",
            Self::Bzip2 => "compression-bzip2",
            Self::Xz => "compression-xz",
        }
    }

    #[must_use]
    pub const fn is_available(self) -> bool {
        match self {
            Self::Gzip => cfg!(feature = "compression-gzip"),
            Self::Zstd => cfg!(feature = "compression-zstd"),
            Self::Bzip2 => cfg!(feature = "compression-bzip2"),
            Self::Xz => cfg!(feature = "compression-xz"),
        }
    }

    /// Algorithm for a suffix such as `.gz`; matching is case-insensitive.
    #[must_use]
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        let suffix = suffix.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.extensions().contains(&suffix.as_str()))
    }

    fn unavailable(self) -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{} support requires the `{}` feature", self.name(), self.feature()),
        )
    }

    /// Decompress a whole buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not valid for this algorithm or the
    /// algorithm is compiled out
    pub fn decompress(self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => {
                flate2::read::MultiGzDecoder::new(data).read_to_end(&mut out)?;
            }
            #[cfg(feature = "compression-zstd")]
            Self::Zstd => {
                zstd::stream::read::Decoder::new(data)?.read_to_end(&mut out)?;
            }
            #[cfg(feature = "compression-bzip2")]
            Self::Bzip2 => {
                bzip2::read::BzDecoder::new(data).read_to_end(&mut out)?;
            }
            #[cfg(feature = "compression-xz")]
            Self::Xz => {
                xz2::read::XzDecoder::new(data).read_to_end(&mut out)?;
            }
            #[allow(unreachable_patterns)]
            other => return Err(other.unavailable()),
        }
        Ok(out)
    }

    /// Compress a whole buffer, finishing the stream explicitly.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoder fails or the algorithm is compiled out
    pub fn compress(self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            #[cfg(feature = "compression-gzip")]
            Self::Gzip => {
                let mut enc =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                enc.write_all(data)?;
                enc.finish()
            }
            #[cfg(feature = "compression-zstd")]
            Self::Zstd => {
                let mut enc = zstd::stream::write::Encoder::new(Vec::new(), 3)?;
                enc.write_all(data)?;
                enc.finish()
            }
            #[cfg(feature = "compression-bzip2")]
            Self::Bzip2 => {
                let mut enc =
                    bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
                enc.write_all(data)?;
                enc.finish()
            }
            #[cfg(feature = "compression-xz")]
            Self::Xz => {
                let mut enc = xz2::write::XzEncoder::new(Vec::new(), 6);
                enc.write_all(data)?;
                enc.finish()
            }
            #[allow(unreachable_patterns)]
            other => Err(other.unavailable()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_lookup() {
        assert_eq!(Compression::from_suffix(".gz"), Some(Compression::Gzip));
        assert_eq!(Compression::from_suffix(".ZST"), Some(Compression::Zstd));
        assert_eq!(Compression::from_suffix(".bz2"), Some(Compression::Bzip2));
        assert_eq!(Compression::from_suffix(".xz"), Some(Compression::Xz));
        assert_eq!(Compression::from_suffix(".csv"), None);
    }

    #[test]
    fn available_codecs_roundtrip() -> io::Result<()> {
        let payload = b"key,f0\nkey00,0.25\nkey01,1.25\n".repeat(50);
        for codec in Compression::ALL.into_iter().filter(|c| c.is_available()) {
            let packed = codec.compress(&payload)?;
            assert_ne!(packed, payload, "{} did not transform the data", codec.name());
            assert_eq!(codec.decompress(&packed)?, payload);
        }
        Ok(())
    }
}
