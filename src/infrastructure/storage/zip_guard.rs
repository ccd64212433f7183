// Decompression-bomb guard for the bulk archive
use crate::domain::error::{RegistryError, ZipBombStage};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, warn};

const CHUNK: usize = 64 * 1024;
/// Largest buffer reserved up front from a size the archive or server claims.
pub const PREALLOC_LIMIT: usize = 1 << 20;

/// Initial capacity for a stream that claims `declared` bytes. The claim is
/// untrusted, so the buffer grows past this only as real bytes arrive.
pub fn initial_capacity(declared: u64) -> usize {
    declared.min(PREALLOC_LIMIT as u64) as usize
}

/// Caps both the declared and the actually produced size of an archive.
#[derive(Debug, Clone, Copy)]
pub struct ZipGuard {
    cap: u64,
}

impl ZipGuard {
    pub fn new(cap: u64) -> Self {
        Self { cap }
    }

    pub fn cap(&self) -> u64 {
        self.cap
    }

    /// Rejects a declared size above the cap. Absent declarations pass and
    /// rely on the streamed check.
    pub fn check_declared(&self, declared: Option<u64>) -> Result<(), RegistryError> {
        match declared {
            Some(size) if size > self.cap => Err(RegistryError::ZipBomb {
                stage: ZipBombStage::Declared,
                size,
                cap: self.cap,
            }),
            _ => Ok(()),
        }
    }

    /// Declared check first, then a streamed copy that aborts as soon as the
    /// produced bytes pass the cap. On error the partial output is dropped.
    pub fn validate<R: Read>(
        &self,
        declared: Option<u64>,
        source: R,
    ) -> Result<Vec<u8>, RegistryError> {
        self.check_declared(declared)?;
        let mut budget = self.budget(ZipBombStage::Extracted);
        let mut out = Vec::with_capacity(initial_capacity(declared.unwrap_or(0)));
        budget.copy(source, &mut out)?;
        Ok(out)
    }

    pub fn budget(&self, stage: ZipBombStage) -> ExtractionBudget {
        ExtractionBudget {
            cap: self.cap,
            used: 0,
            stage,
        }
    }

    /// Extracts the wanted members (matched by file name, case-insensitive)
    /// from an in-memory zip.
    ///
    /// The sum of all declared member sizes is checked before anything is
    /// inflated; the extracted total is checked while inflating.
    pub fn extract_archive(
        &self,
        bytes: &[u8],
        wanted: &[&str],
    ) -> Result<HashMap<String, Vec<u8>>, RegistryError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

        let mut declared: u64 = 0;
        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i)?;
            declared = declared.saturating_add(entry.size());
        }
        self.check_declared(Some(declared))?;
        debug!(
            "Archive declares {} bytes in {} members",
            declared,
            archive.len()
        );

        let wanted: Vec<String> = wanted.iter().map(|w| w.to_lowercase()).collect();
        let mut budget = self.budget(ZipBombStage::Extracted);
        let mut extracted = HashMap::new();

        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let file_name = Path::new(entry.name())
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if !wanted.contains(&file_name) {
                continue;
            }
            if extracted.contains_key(&file_name) {
                warn!("Archive member {} appears twice, keeping the first", file_name);
                continue;
            }
            let mut out = Vec::with_capacity(initial_capacity(entry.size()));
            budget.copy(entry, &mut out)?;
            extracted.insert(file_name, out);
        }

        Ok(extracted)
    }
}

/// Running byte budget shared across every stream of one load attempt.
#[derive(Debug)]
pub struct ExtractionBudget {
    cap: u64,
    used: u64,
    stage: ZipBombStage,
}

impl ExtractionBudget {
    /// Accounts for `n` more bytes.
    pub fn consume(&mut self, n: u64) -> Result<(), RegistryError> {
        self.used = self.used.saturating_add(n);
        if self.used > self.cap {
            return Err(RegistryError::ZipBomb {
                stage: self.stage,
                size: self.used,
                cap: self.cap,
            });
        }
        Ok(())
    }

    pub fn copy<R: Read>(&mut self, mut source: R, out: &mut Vec<u8>) -> Result<(), RegistryError> {
        let mut buf = vec![0u8; CHUNK];
        loop {
            let n = source.read(&mut buf)?;
            if n == 0 {
                return Ok(());
            }
            self.consume(n as u64)?;
            out.extend_from_slice(&buf[..n]);
        }
    }
}

/// Rewrites the uncompressed size a zip declares for `name`, in both the
/// local and the central directory header.
#[cfg(test)]
pub(crate) fn forge_declared_size(bytes: &mut [u8], name: &str, size: u32) {
    let u16_at = |b: &[u8], at: usize| u16::from_le_bytes([b[at], b[at + 1]]) as usize;
    // (signature, offset of the size field, offset of the name length, offset of the name)
    let headers: [(&[u8], usize, usize, usize); 2] = [
        (b"PK\x03\x04", 22, 26, 30),
        (b"PK\x01\x02", 24, 28, 46),
    ];
    let mut patched = 0;
    for i in 0..bytes.len() {
        for (signature, size_at, len_at, name_at) in headers {
            if !bytes[i..].starts_with(signature) || i + name_at > bytes.len() {
                continue;
            }
            let len = u16_at(&bytes[..], i + len_at);
            if bytes.get(i + name_at..i + name_at + len) == Some(name.as_bytes()) {
                bytes[i + size_at..i + size_at + 4].copy_from_slice(&size.to_le_bytes());
                patched += 1;
            }
        }
    }
    assert_eq!(patched, 2, "member {} not found in both headers", name);
}
