//! Existence filter wire shape and decoding.
//!
//! When a target is resumed, the backend may answer with an existence filter
//! instead of a full snapshot: a document count plus an optional bloom filter
//! over the names of documents that are still unchanged. The probe only needs
//! the encoded bit length of that bloom filter, for diagnostics.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Largest valid number of unused trailing bits in a bitmap.
pub const MAX_PADDING: i32 = 7;

/// Existence filter as delivered on a resumed target.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistenceFilter {
    /// Number of documents the backend says currently match the target.
    #[serde(default)]
    pub count: u32,

    /// Bloom filter over the names of unchanged documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unchanged_names: Option<BloomFilterPayload>,
}

/// Encoded bloom filter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloomFilterPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bits: Option<BitSequence>,

    #[serde(default)]
    pub hash_count: u32,
}

/// A bitmap whose final byte may carry unused trailing bits.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitSequence {
    #[serde(default)]
    pub bitmap: Vec<u8>,

    /// Unused bits at the end of the bitmap, valid in `0..=7`.
    #[serde(default)]
    pub padding: i32,
}

impl BitSequence {
    /// Number of meaningful bits, or `None` if the padding is out of range.
    pub fn bit_length(&self) -> Option<u32> {
        if !(0..=MAX_PADDING).contains(&self.padding) {
            return None;
        }
        let total = u32::try_from(self.bitmap.len()).ok()?.checked_mul(8)?;
        total.checked_sub(u32::try_from(self.padding).ok()?)
    }

    /// Hex rendering of the bitmap, for logs.
    pub fn bitmap_hex(&self) -> String {
        hex::encode(&self.bitmap)
    }
}

impl ExistenceFilter {
    /// Parse a filter from its JSON wire form.
    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Encode this filter in its JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Encoded bit length of the bloom filter, or `None` when the filter
    /// carries no bitmap or the bitmap is malformed.
    pub fn bit_length(&self) -> Option<u32> {
        self.unchanged_names.as_ref()?.bits.as_ref()?.bit_length()
    }

    /// Number of hash functions the bloom filter was built with, if present.
    pub fn hash_count(&self) -> Option<u32> {
        self.unchanged_names.as_ref().map(|p| p.hash_count)
    }
}

/// Bit length of an optional filter. A missing filter has no bit length.
pub fn bit_length(filter: Option<&ExistenceFilter>) -> Option<u32> {
    filter.and_then(ExistenceFilter::bit_length)
}
