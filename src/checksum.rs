//! Content checksum guarding the sprite cache
//!
//! Every regular file under the checksum roots contributes
//! `hash(lowercased name) ^ hash(modification ticks)`, and the contributions
//! are XOR-folded together. Folding makes the result independent of
//! enumeration order, while renaming, touching, adding, or removing a file
//! changes it.

use crate::fs::{FileStamp, FileSystem};
use std::io;
use std::path::Path;

/// Compute the checksum of the named roots below `content_dir`.
///
/// Roots that do not exist contribute nothing.
pub fn content_checksum<F: FileSystem>(
    fs: &F,
    content_dir: &Path,
    roots: &[String],
) -> io::Result<i32> {
    let mut checksum = 0u64;
    for root in roots {
        let dir = content_dir.join(root);
        if !fs.exists(&dir) {
            log::debug!("checksum root {} does not exist", dir.display());
            continue;
        }
        for file in fs.enumerate_files(&dir)? {
            checksum ^= file_hash(root, &file);
        }
    }
    Ok(fold(checksum))
}

/// Contribution of one file; the name includes its root so identical names
/// under different roots do not cancel out.
fn file_hash(root: &str, file: &FileStamp) -> u64 {
    let name = format!("{}/{}", root, file.name).to_lowercase();
    fnv1a_hash(name.as_bytes()) ^ fnv1a_hash(&file.modified.to_le_bytes())
}

/// Fold a 64-bit hash into the 32-bit value stored in the cache header.
fn fold(hash: u64) -> i32 {
    ((hash >> 32) ^ (hash & 0xFFFF_FFFF)) as u32 as i32
}

/// FNV-1a hash algorithm.
fn fnv1a_hash(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
