//! Model persistence: header, per-layer blocks, checksum.
//!
//! File layout:
//! ```text
//! [4-byte magic: "CDL1"]
//! [4-byte metadata_len: u32 little-endian]
//! [JSON metadata: format version, table geometry, loss, stack descriptor]
//! [Per-layer opaque blocks, written in stack order]
//! [4-byte CRC32: checksum of all preceding bytes]
//! ```
//!
//! The per-layer byte format is each layer's own business; what this module
//! fixes is the ordering contract: blocks appear in stack order, and a
//! reload must reconstruct the identical stack or byte offsets misalign.
//! That precondition is documented, not validated.

use serde::{Deserialize, Serialize};

use crate::error::{CaudalError, Result};
use crate::learner::Learner;
use crate::workspace::Workspace;

/// Magic bytes for the caudal model format.
pub const MODEL_MAGIC: [u8; 4] = [b'C', b'D', b'L', b'1'];

/// Current model format version.
pub const MODEL_VERSION: u32 = 1;

/// Header metadata, serialized as JSON after the magic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Format version.
    pub version: u32,
    /// log2 of the number of logical weight addresses.
    pub num_bits: u32,
    /// log2 of the per-address slot count.
    pub stride_shift: u32,
    /// Loss function name.
    pub loss: String,
    /// Minimum label observed during training; restored so reloaded
    /// models clamp predictions identically.
    pub min_label: f32,
    /// Maximum label observed during training.
    pub max_label: f32,
    /// Human-readable stack descriptor, e.g. `"oaa [scorer [gd]]"`.
    /// Informational only; stack order on reload is the caller's problem.
    pub stack: String,
}

/// Direction-agnostic serialization cursor handed down the stack.
///
/// Each primitive operation either writes the referenced value or reads
/// into it, depending on the direction fixed at construction, so a layer's
/// `save_load` is one body instead of parallel read and write paths.
pub struct ModelIo {
    read: bool,
    text: bool,
    buf: Vec<u8>,
    pos: usize,
    tokens: Vec<String>,
    token_pos: usize,
}

impl ModelIo {
    /// A writing cursor; binary unless `text`.
    #[must_use]
    pub fn writer(text: bool) -> Self {
        Self {
            read: false,
            text,
            buf: Vec::new(),
            pos: 0,
            tokens: Vec::new(),
            token_pos: 0,
        }
    }

    /// A reading cursor over a layer-block payload.
    #[must_use]
    pub fn reader(buf: Vec<u8>, text: bool) -> Self {
        let tokens = if text {
            String::from_utf8_lossy(&buf)
                .split_whitespace()
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };
        Self {
            read: true,
            text,
            buf,
            pos: 0,
            tokens,
            token_pos: 0,
        }
    }

    /// True when the cursor reads instead of writes.
    #[must_use]
    pub fn is_read(&self) -> bool {
        self.read
    }

    /// True when the cursor works in text mode.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.text
    }

    /// Consumes a writing cursor, yielding the accumulated payload.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        if self.pos + n > self.buf.len() {
            return Err(CaudalError::FormatError {
                message: format!(
                    "model payload truncated: wanted {n} bytes at offset {}",
                    self.pos
                ),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn next_token(&mut self) -> Result<&str> {
        let tok = self.tokens.get(self.token_pos).ok_or_else(|| CaudalError::FormatError {
            message: "model payload truncated: out of text tokens".to_string(),
        })?;
        self.token_pos += 1;
        Ok(tok)
    }

    /// Reads or writes one u32.
    pub fn u32_field(&mut self, v: &mut u32) -> Result<()> {
        if self.read {
            if self.text {
                *v = self.next_token()?.parse().map_err(|e| CaudalError::FormatError {
                    message: format!("bad u32 in text model: {e}"),
                })?;
            } else {
                let bytes = self.take(4)?;
                *v = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
        } else if self.text {
            self.buf.extend_from_slice(format!("{v} ").as_bytes());
        } else {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        Ok(())
    }

    /// Reads or writes one u64.
    pub fn u64_field(&mut self, v: &mut u64) -> Result<()> {
        if self.read {
            if self.text {
                *v = self.next_token()?.parse().map_err(|e| CaudalError::FormatError {
                    message: format!("bad u64 in text model: {e}"),
                })?;
            } else {
                let bytes = self.take(8)?;
                let mut arr = [0u8; 8];
                arr.copy_from_slice(bytes);
                *v = u64::from_le_bytes(arr);
            }
        } else if self.text {
            self.buf.extend_from_slice(format!("{v} ").as_bytes());
        } else {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        Ok(())
    }

    /// Reads or writes one f32.
    pub fn f32_field(&mut self, v: &mut f32) -> Result<()> {
        if self.read {
            if self.text {
                *v = self.next_token()?.parse().map_err(|e| CaudalError::FormatError {
                    message: format!("bad f32 in text model: {e}"),
                })?;
            } else {
                let bytes = self.take(4)?;
                *v = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
        } else if self.text {
            self.buf.extend_from_slice(format!("{v} ").as_bytes());
        } else {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        Ok(())
    }

    /// Reads or writes one f64.
    pub fn f64_field(&mut self, v: &mut f64) -> Result<()> {
        if self.read {
            if self.text {
                *v = self.next_token()?.parse().map_err(|e| CaudalError::FormatError {
                    message: format!("bad f64 in text model: {e}"),
                })?;
            } else {
                let bytes = self.take(8)?;
                let mut arr = [0u8; 8];
                arr.copy_from_slice(bytes);
                *v = f64::from_le_bytes(arr);
            }
        } else if self.text {
            self.buf.extend_from_slice(format!("{v} ").as_bytes());
        } else {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        Ok(())
    }
}

/// CRC32 (IEEE) over a byte slice.
#[must_use]
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

/// Serializes the workspace geometry plus every layer's state, in stack
/// order, into the model byte format.
///
/// # Errors
///
/// Propagates layer serialization failures.
pub fn save_model_bytes(
    ws: &mut Workspace,
    stack: &mut dyn Learner,
    text: bool,
) -> Result<Vec<u8>> {
    let metadata = ModelMetadata {
        version: MODEL_VERSION,
        num_bits: ws.weights.num_bits(),
        stride_shift: ws.weights.stride_shift(),
        loss: ws.loss.name().to_string(),
        min_label: ws.sd.min_label,
        max_label: ws.sd.max_label,
        stack: stack.describe(),
    };
    let meta_json = serde_json::to_vec(&metadata)
        .map_err(|e| CaudalError::Serialization(e.to_string()))?;

    let mut io = ModelIo::writer(text);
    stack.save_load(ws, &mut io)?;
    let payload = io.into_bytes();

    let mut out = Vec::with_capacity(12 + meta_json.len() + payload.len());
    out.extend_from_slice(&MODEL_MAGIC);
    out.extend_from_slice(&(meta_json.len() as u32).to_le_bytes());
    out.extend_from_slice(&meta_json);
    out.push(u8::from(text));
    out.extend_from_slice(&payload);
    let checksum = crc32(&out);
    out.extend_from_slice(&checksum.to_le_bytes());
    Ok(out)
}

/// Restores every layer's state from model bytes produced by
/// [`save_model_bytes`].
///
/// The stack must be reconstructed in the identical order used when the
/// model was written; this function verifies magic, version, checksum, and
/// table geometry, but deliberately not stack order.
///
/// # Errors
///
/// Fails on a bad magic/version/checksum, on geometry mismatch, or when a
/// layer block is truncated.
pub fn load_model_bytes(bytes: &[u8], ws: &mut Workspace, stack: &mut dyn Learner) -> Result<()> {
    if bytes.len() < 13 {
        return Err(CaudalError::FormatError {
            message: "model file too short".to_string(),
        });
    }
    if bytes[0..4] != MODEL_MAGIC {
        return Err(CaudalError::FormatError {
            message: format!("bad magic: {:?}", &bytes[0..4]),
        });
    }
    let body = &bytes[..bytes.len() - 4];
    let stored = u32::from_le_bytes([
        bytes[bytes.len() - 4],
        bytes[bytes.len() - 3],
        bytes[bytes.len() - 2],
        bytes[bytes.len() - 1],
    ]);
    let actual = crc32(body);
    if stored != actual {
        return Err(CaudalError::ChecksumMismatch {
            expected: stored,
            actual,
        });
    }

    let meta_len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let meta_end = 8 + meta_len;
    if meta_end + 1 > body.len() {
        return Err(CaudalError::FormatError {
            message: "metadata length exceeds file".to_string(),
        });
    }
    let metadata: ModelMetadata = serde_json::from_slice(&bytes[8..meta_end])
        .map_err(|e| CaudalError::Serialization(e.to_string()))?;

    if metadata.version > MODEL_VERSION {
        return Err(CaudalError::UnsupportedVersion {
            found: metadata.version,
            supported: MODEL_VERSION,
        });
    }
    if metadata.num_bits != ws.weights.num_bits() {
        return Err(CaudalError::GeometryMismatch {
            field: "num_bits".to_string(),
            model: metadata.num_bits,
            current: ws.weights.num_bits(),
        });
    }
    if metadata.stride_shift != ws.weights.stride_shift() {
        return Err(CaudalError::GeometryMismatch {
            field: "stride_shift".to_string(),
            model: metadata.stride_shift,
            current: ws.weights.stride_shift(),
        });
    }

    ws.sd.set_minmax(metadata.min_label);
    ws.sd.set_minmax(metadata.max_label);

    let text = body[meta_end] != 0;
    let payload = body[meta_end + 1..].to_vec();
    let mut io = ModelIo::reader(payload, text);
    stack.save_load(ws, &mut io)
}

/// Saves a model to a file.
///
/// # Errors
///
/// Propagates serialization and I/O failures.
pub fn save_model<P: AsRef<std::path::Path>>(
    path: P,
    ws: &mut Workspace,
    stack: &mut dyn Learner,
    text: bool,
) -> Result<()> {
    let bytes = save_model_bytes(ws, stack, text)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Loads a model from a file into an identically constructed stack.
///
/// # Errors
///
/// Propagates format and I/O failures.
pub fn load_model<P: AsRef<std::path::Path>>(
    path: P,
    ws: &mut Workspace,
    stack: &mut dyn Learner,
) -> Result<()> {
    let bytes = std::fs::read(path)?;
    load_model_bytes(&bytes, ws, stack)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_known_vector() {
        // CRC32("123456789") is the classic check value.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_binary_field_roundtrip() {
        let mut io = ModelIo::writer(false);
        let mut a = 7u32;
        let mut b = 2.5f32;
        let mut c = u64::MAX;
        io.u32_field(&mut a).unwrap();
        io.f32_field(&mut b).unwrap();
        io.u64_field(&mut c).unwrap();

        let mut io = ModelIo::reader(io.into_bytes(), false);
        let (mut a2, mut b2, mut c2) = (0u32, 0f32, 0u64);
        io.u32_field(&mut a2).unwrap();
        io.f32_field(&mut b2).unwrap();
        io.u64_field(&mut c2).unwrap();
        assert_eq!((a2, b2, c2), (7, 2.5, u64::MAX));
    }

    #[test]
    fn test_text_field_roundtrip() {
        let mut io = ModelIo::writer(true);
        let mut a = 42u32;
        let mut b = -0.125f32;
        io.u32_field(&mut a).unwrap();
        io.f32_field(&mut b).unwrap();
        let bytes = io.into_bytes();
        assert_eq!(String::from_utf8_lossy(&bytes), "42 -0.125 ");

        let mut io = ModelIo::reader(bytes, true);
        let (mut a2, mut b2) = (0u32, 0f32);
        io.u32_field(&mut a2).unwrap();
        io.f32_field(&mut b2).unwrap();
        assert_eq!((a2, b2), (42, -0.125));
    }

    #[test]
    fn test_truncated_read_is_an_error() {
        let mut io = ModelIo::reader(vec![1, 2], false);
        let mut v = 0u32;
        assert!(io.u32_field(&mut v).is_err());
    }
}
