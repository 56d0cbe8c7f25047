//! File fingerprinting

use anyhow::{Context, Result};
use blake3::Hasher;
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::types::Fingerprint;
use crate::utils::config::HashingConsts;

use super::tools::mtime_ns;

/// Hash a file with blake3. Uses memory-mapped I/O for files above threshold, chunked reading otherwise.
pub fn hash_file(path: &Path, size: u64) -> Result<Fingerprint> {
    let file = File::open(path).with_context(|| format!("open {} for hashing", path.display()))?;
    let mut hasher = Hasher::new();

    if size > HashingConsts::HASH_MMAP_THRESHOLD {
        // Safety: the mapping is read-only and dropped before returning. A concurrent writer can
        // only produce a wrong hash, which the next modify event corrects.
        let mmap = unsafe { Mmap::map(&file)? };
        hasher.update(&mmap);
    } else {
        let mut reader =
            std::io::BufReader::with_capacity(HashingConsts::HASH_READ_CHUNK_SIZE, file);
        let mut buffer = vec![0u8; HashingConsts::HASH_READ_CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
    }

    Ok(Fingerprint(*hasher.finalize().as_bytes()))
}

/// Fingerprint a file either by content or by mtime+size.
/// Files smaller than [`HashingConsts::SMALL_FILE_THRESHOLD`] are always content-hashed: it costs
/// about as much as the stat and survives touch-only edits.
pub fn fingerprint_file(path: &Path, with_hash: bool) -> Result<Fingerprint> {
    let meta = std::fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
    let size = meta.len();
    if with_hash || size < HashingConsts::SMALL_FILE_THRESHOLD {
        hash_file(path, size)
    } else {
        Ok(Fingerprint::of_metadata(mtime_ns(&meta), size))
    }
}
