// crates/moorage-core/src/codec.rs
// ============================================================================
// Module: Chunked Attribute Codec
// Description: Binary payload chunking into attribute-store item attributes.
// Purpose: Map byte strings to fixed-size attribute slots and back.
// Dependencies: base64, thiserror
// ============================================================================

//! ## Overview
//! The attribute store limits each attribute value to a small fixed size,
//! so binary payloads are split into fixed-size slices, base64-encoded, and
//! stored under indexed chunk attributes (`chunk0`, `chunk1`, ...). A
//! `numChunks` attribute records how many chunks follow so a reader knows
//! when to stop without trial-and-error. A zero-length payload still
//! occupies exactly one empty chunk, distinguishing "empty content" from
//! "no content".

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

/// Attribute name/value pairs of one attribute-store item.
pub type AttributeMap = BTreeMap<String, String>;

/// Maximum number of attributes per attribute-store item.
pub const MAX_ITEM_ATTRIBUTES: usize = 256;

/// Maximum size of one attribute value in bytes.
pub const MAX_ATTRIBUTE_VALUE: usize = 1024;

/// Raw payload bytes per chunk; base64 expansion keeps the encoded value
/// within [`MAX_ATTRIBUTE_VALUE`].
pub const CHUNK_PAYLOAD: usize = MAX_ATTRIBUTE_VALUE / 4 * 3;

/// Non-chunk attributes reserved on every item using this codec: the five
/// file metadata fields (ownerID, encrypted, version, generation, checksum)
/// plus the chunk-count attribute itself.
pub const RESERVED_ATTRIBUTES: usize = 6;

/// Attribute recording the number of content chunks on an item.
pub const NUM_CHUNKS_ATTRIBUTE: &str = "numChunks";

/// Codec errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload does not fit the chunk budget of one item.
    #[error("payload of {size} bytes exceeds the chunk budget of {max} bytes")]
    PayloadTooLarge {
        /// Payload size in bytes.
        size: usize,
        /// Maximum payload size for the item.
        max: usize,
    },
    /// The chunk-count attribute is not a valid integer.
    #[error("invalid chunk count attribute: {0}")]
    InvalidChunkCount(String),
    /// A chunk attribute named by the chunk count is absent.
    #[error("chunk attribute '{0}' is missing")]
    MissingChunk(String),
    /// A chunk attribute holds invalid base64.
    #[error("chunk attribute '{name}' is not valid base64: {message}")]
    InvalidEncoding {
        /// Name of the offending chunk attribute.
        name: String,
        /// Decoder error message.
        message: String,
    },
}

/// Returns the attribute name of the chunk at `index`.
#[must_use]
pub fn chunk_name(index: usize) -> String {
    format!("chunk{index}")
}

/// Maximum payload size that still fits one item after reserving
/// [`RESERVED_ATTRIBUTES`] plus `extra_reserved_chunks` attributes.
///
/// Callers MUST consult this before deciding to inline a payload versus
/// falling back to the file store.
#[must_use]
pub const fn max_binary_size(extra_reserved_chunks: usize) -> usize {
    (MAX_ITEM_ATTRIBUTES - RESERVED_ATTRIBUTES - extra_reserved_chunks) * CHUNK_PAYLOAD
}

/// Encodes a binary payload into chunk attributes.
///
/// `None` maps to zero chunks; an empty payload occupies one empty chunk.
/// Returns the attribute map (including `numChunks`) and the chunk count.
///
/// # Errors
///
/// Returns [`CodecError::PayloadTooLarge`] when the payload exceeds
/// [`max_binary_size`] with no extra reservations.
pub fn binary_to_attributes(payload: Option<&[u8]>) -> Result<(AttributeMap, usize), CodecError> {
    let mut attributes = AttributeMap::new();
    let Some(payload) = payload else {
        attributes.insert(NUM_CHUNKS_ATTRIBUTE.to_string(), "0".to_string());
        return Ok((attributes, 0));
    };
    if payload.len() > max_binary_size(0) {
        return Err(CodecError::PayloadTooLarge {
            size: payload.len(),
            max: max_binary_size(0),
        });
    }
    let mut num_chunks = 0;
    if payload.is_empty() {
        attributes.insert(chunk_name(0), String::new());
        num_chunks = 1;
    } else {
        for (index, slice) in payload.chunks(CHUNK_PAYLOAD).enumerate() {
            attributes.insert(chunk_name(index), BASE64.encode(slice));
            num_chunks = index + 1;
        }
    }
    attributes.insert(NUM_CHUNKS_ATTRIBUTE.to_string(), num_chunks.to_string());
    Ok((attributes, num_chunks))
}

/// Decodes chunk attributes back into the binary payload.
///
/// Returns `(None, 0)` when the item carries no chunks.
///
/// # Errors
///
/// Returns [`CodecError`] when the chunk count is malformed, a chunk named
/// by the count is missing, or a chunk value is not valid base64.
pub fn attributes_to_binary(
    attributes: &AttributeMap,
) -> Result<(Option<Vec<u8>>, usize), CodecError> {
    let Some(raw_count) = attributes.get(NUM_CHUNKS_ATTRIBUTE) else {
        return Ok((None, 0));
    };
    let num_chunks: usize = raw_count
        .parse()
        .map_err(|_| CodecError::InvalidChunkCount(raw_count.clone()))?;
    if num_chunks == 0 {
        return Ok((None, 0));
    }
    let mut payload = Vec::with_capacity(num_chunks * CHUNK_PAYLOAD);
    for index in 0 .. num_chunks {
        let name = chunk_name(index);
        let value = attributes.get(&name).ok_or_else(|| CodecError::MissingChunk(name.clone()))?;
        let decoded = BASE64.decode(value).map_err(|err| CodecError::InvalidEncoding {
            name,
            message: err.to_string(),
        })?;
        payload.extend_from_slice(&decoded);
    }
    Ok((Some(payload), num_chunks))
}
