//! Owned byte stream carried between passes

use std::fmt;

/// Bytes produced by a pass: UTF-8 text for textual targets, little-endian
/// words for binary targets.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteStream {
    bytes: Vec<u8>,
}

impl ByteStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn from_words(words: &[u32]) -> Self {
        let mut bytes = Vec::with_capacity(words.len() * 4);
        for word in words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        Self { bytes }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            bytes: text.into().into_bytes(),
        }
    }

    /// Interprets the stream as words; `None` if the length is not a multiple of 4
    pub fn words(&self) -> Option<Vec<u32>> {
        if self.bytes.len() % 4 != 0 {
            return None;
        }
        Some(
            self.bytes
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }

    pub fn word_count(&self) -> usize {
        self.bytes.len() / 4
    }

    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) if !text.contains('\0') => write!(f, "ByteStream({:?})", text),
            _ => write!(f, "ByteStream({} bytes)", self.bytes.len()),
        }
    }
}
