use std::hash::Hasher;
use std::io;

use crate::{Document, DocumentError};

/// A deterministic FNV-1a 64-bit hasher.
///
/// Checksums are compared across peers, so the randomized `DefaultHasher`
/// cannot be used.
#[derive(Debug)]
pub struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self {
            state: Self::OFFSET_BASIS,
        }
    }
}

impl Default for FnvHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= byte as u64;
            self.state = self.state.wrapping_mul(Self::PRIME);
        }
    }
}

impl io::Write for FnvHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Hasher::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Digest the canonical binary encoding of a document.
pub fn digest_document(doc: &Document) -> Result<u64, DocumentError> {
    let mut hasher = FnvHasher::new();
    bincode::serialize_into(&mut hasher, doc)?;
    Ok(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv_matches_reference_vector() {
        let mut hasher = FnvHasher::new();
        Hasher::write(&mut hasher, b"a");
        assert_eq!(hasher.finish(), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn equal_documents_share_a_digest() {
        let a = Document::new().with("type", "Spearman").with("hitpoints", 36);
        let b = Document::new().with("hitpoints", 36).with("type", "Spearman");
        let c = Document::new().with("type", "Spearman").with("hitpoints", 35);

        assert_eq!(digest_document(&a).unwrap(), digest_document(&b).unwrap());
        assert_ne!(digest_document(&a).unwrap(), digest_document(&c).unwrap());
    }
}
