use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hash computation failed: {message}")]
    ComputationFailed { message: String },
}

const READ_BUFFER_SIZE: usize = 8192;

/// Incremental SHA-256 state for callers that receive bytes in chunks
pub struct ContentDigest {
    hasher: Sha256,
    bytes_seen: u64,
}

impl ContentDigest {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            bytes_seen: 0,
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.bytes_seen += chunk.len() as u64;
    }

    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    /// Lowercase hex digest, 64 characters
    pub fn finalize(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

impl Default for ContentDigest {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the exact-duplicate key for photo content
pub struct ContentHasher;

impl ContentHasher {
    pub fn new() -> Self {
        Self
    }

    pub fn hash_bytes(&self, bytes: &[u8]) -> String {
        let mut digest = ContentDigest::new();
        digest.update(bytes);
        digest.finalize()
    }

    /// Stream a reader through the digest in fixed-size chunks
    pub fn hash_reader<R: Read>(&self, reader: R) -> Result<String, HashError> {
        let mut reader = BufReader::new(reader);
        let mut digest = ContentDigest::new();
        let mut buffer = [0; READ_BUFFER_SIZE];

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            digest.update(&buffer[..bytes_read]);
        }

        Ok(digest.finalize())
    }

    /// Hash a file without loading it into memory
    pub fn hash_file(&self, file_path: &Path) -> Result<String, HashError> {
        let file = File::open(file_path)?;
        self.hash_reader(file)
    }

    /// Compute content hashes for multiple files in parallel
    pub fn hash_files_batch(&self, file_paths: &[PathBuf]) -> Vec<(PathBuf, Result<String, HashError>)> {
        use rayon::prelude::*;

        file_paths
            .par_iter()
            .map(|path| (path.clone(), self.hash_file(path)))
            .collect()
    }

    /// Check a stored hash against the file's current content
    pub fn verify(&self, file_path: &Path, expected: &str) -> Result<bool, HashError> {
        let current = self.hash_file(file_path)?;
        Ok(current.eq_ignore_ascii_case(expected))
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}
