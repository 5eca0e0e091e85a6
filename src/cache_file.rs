//! Binary cache file format
//!
//! All integers are little-endian `i32`:
//!
//! ```text
//! version
//! checksum                    (only read when the version matches)
//! bucket_count
//! repeat bucket_count:
//!   sprite_width, sprite_height
//!   sprite_count
//!   page_count
//!   repeat page_count:
//!     byte_length, PNG bytes
//! ```

use crate::bucket::SpriteSizeBucket;
use crate::raster::{decode_png, encode_png, Size};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use image::{ImageError, RgbaImage};
use std::io::{self, Cursor, Read, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Current cache format version.
pub const FORMAT_VERSION: i32 = 1;

/// Error reading or writing the cache.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("image error: {0}")]
    Image(#[from] ImageError),
    #[error("cache file not found: {}", .0.display())]
    Missing(PathBuf),
    #[error("cache format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: i32, found: i32 },
    #[error("content checksum mismatch: content is {expected:#010x}, cache has {found:#010x}")]
    ChecksumMismatch { expected: i32, found: i32 },
    #[error("cache file is truncated")]
    Truncated,
    #[error("invalid cache entry: {0}")]
    Invalid(String),
    #[error("cache can only be loaded into an empty database")]
    NotEmpty,
}

impl CacheError {
    /// True when the cache is simply out of date and should be rebuilt.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            CacheError::Missing(_)
                | CacheError::VersionMismatch { .. }
                | CacheError::ChecksumMismatch { .. }
        )
    }
}

/// Leading fields of a cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheHeader {
    pub version: i32,
    pub checksum: i32,
}

/// One bucket as stored on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedBucket {
    pub sprite_size: Size,
    pub sprite_count: usize,
    pub pages: Vec<RgbaImage>,
}

/// Serialize buckets into a complete cache file image.
pub fn encode<'a>(
    checksum: i32,
    buckets: impl IntoIterator<Item = &'a SpriteSizeBucket>,
) -> Result<Vec<u8>, CacheError> {
    let buckets: Vec<&SpriteSizeBucket> = buckets.into_iter().collect();
    let mut out = Vec::new();

    out.write_i32::<LittleEndian>(FORMAT_VERSION)?;
    out.write_i32::<LittleEndian>(checksum)?;
    out.write_i32::<LittleEndian>(to_i32(buckets.len(), "bucket count")?)?;

    for bucket in buckets {
        let size = bucket.sprite_size();
        out.write_i32::<LittleEndian>(to_i32(size.width as usize, "sprite width")?)?;
        out.write_i32::<LittleEndian>(to_i32(size.height as usize, "sprite height")?)?;
        out.write_i32::<LittleEndian>(to_i32(bucket.sprite_count(), "sprite count")?)?;
        out.write_i32::<LittleEndian>(to_i32(bucket.page_count(), "page count")?)?;

        for page in bucket.pages() {
            let png = encode_png(page.image())?;
            out.write_i32::<LittleEndian>(to_i32(png.len(), "page length")?)?;
            out.write_all(&png)?;
        }
    }

    Ok(out)
}

/// Read the version and checksum.
///
/// Stops with [`CacheError::VersionMismatch`] before reading the checksum
/// when the version is not [`FORMAT_VERSION`].
pub fn read_header(reader: &mut impl Read) -> Result<CacheHeader, CacheError> {
    let version = read_i32(reader)?;
    if version != FORMAT_VERSION {
        return Err(CacheError::VersionMismatch { expected: FORMAT_VERSION, found: version });
    }
    let checksum = read_i32(reader)?;
    Ok(CacheHeader { version, checksum })
}

/// Decode a cache file.
///
/// With `expected_checksum`, the stored checksum must match before any page
/// data is decoded.
pub fn decode(
    bytes: &[u8],
    expected_checksum: Option<i32>,
) -> Result<(CacheHeader, Vec<CachedBucket>), CacheError> {
    let mut reader = Cursor::new(bytes);
    let header = read_header(&mut reader)?;

    if let Some(expected) = expected_checksum {
        if header.checksum != expected {
            return Err(CacheError::ChecksumMismatch { expected, found: header.checksum });
        }
    }

    let bucket_count = read_count(&mut reader, "bucket count")?;
    let mut buckets = Vec::new();
    for _ in 0..bucket_count {
        buckets.push(read_bucket(&mut reader)?);
    }

    if (reader.position() as usize) != bytes.len() {
        return Err(CacheError::Invalid(format!(
            "{} trailing bytes after last bucket",
            bytes.len() - reader.position() as usize
        )));
    }

    Ok((header, buckets))
}

fn read_bucket(reader: &mut Cursor<&[u8]>) -> Result<CachedBucket, CacheError> {
    let width = read_count(reader, "sprite width")? as u32;
    let height = read_count(reader, "sprite height")? as u32;
    let sprite_size = Size::new(width, height);
    if sprite_size.is_empty() {
        return Err(CacheError::Invalid(format!("empty sprite size {}", sprite_size)));
    }

    let sprite_count = read_count(reader, "sprite count")?;
    let page_count = read_count(reader, "page count")?;

    let mut pages = Vec::new();
    for _ in 0..page_count {
        let length = read_count(reader, "page length")?;
        let remaining = reader.get_ref().len() - reader.position() as usize;
        if length > remaining {
            return Err(CacheError::Truncated);
        }
        let mut png = vec![0u8; length];
        reader.read_exact(&mut png)?;
        pages.push(decode_png(&png)?);
    }

    Ok(CachedBucket { sprite_size, sprite_count, pages })
}

fn read_i32(reader: &mut impl Read) -> Result<i32, CacheError> {
    reader.read_i32::<LittleEndian>().map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => CacheError::Truncated,
        _ => CacheError::Io(e),
    })
}

fn read_count(reader: &mut impl Read, what: &str) -> Result<usize, CacheError> {
    let value = read_i32(reader)?;
    usize::try_from(value).map_err(|_| CacheError::Invalid(format!("negative {}: {}", what, value)))
}

fn to_i32(value: usize, what: &str) -> Result<i32, CacheError> {
    i32::try_from(value).map_err(|_| CacheError::Invalid(format!("{} {} exceeds i32", what, value)))
}
