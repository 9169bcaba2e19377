//! Uploaded audio clip and pre-decode validation

use std::path::Path;

use crate::error::PredictError;

/// Accepted filename extensions (compared case-insensitively)
pub const ALLOWED_EXTENSIONS: [&str; 6] = ["wav", "mp3", "m4a", "flac", "ogg", "aac"];

/// Raw encoded audio plus the filename the client declared
///
/// Owned by a single request. Decoding consumes the clip, so the bytes are
/// released as soon as the waveform exists.
#[derive(Debug, Clone)]
pub struct AudioClip {
    bytes: Vec<u8>,
    filename: String,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            bytes,
            filename: filename.into(),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Size of the encoded payload in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercased extension of the declared filename
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    /// Check extension and size before any decoding happens
    ///
    /// Extension is checked first, so an oversized `.txt` upload reports
    /// `InvalidFormat`.
    pub fn validate(&self, max_bytes: usize) -> Result<(), PredictError> {
        let allowed = self
            .extension()
            .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false);

        if !allowed {
            return Err(PredictError::InvalidFormat {
                filename: self.filename.clone(),
            });
        }

        if self.bytes.len() > max_bytes {
            return Err(PredictError::FileTooLarge {
                size: self.bytes.len(),
                limit: max_bytes,
            });
        }

        Ok(())
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
