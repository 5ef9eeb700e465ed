//! Cache Entry Envelope
//!
//! Values travel to and from nodes as byte strings. A [`CacheEntry`] wraps
//! the raw value with its optional expiry and knows how to encode itself
//! into a small binary envelope.
//!
//! # Wire Format
//!
//! ```text
//! ┌───────┬─────────┬───────┬──────────────────────┬─────────────┐
//! │ magic │ version │ flags │ expires_at (i64, ms) │ value ...   │
//! │ 4 B   │ 1 B     │ 1 B   │ 8 B if flags & 0x01  │ rest        │
//! └───────┴─────────┴───────┴──────────────────────┴─────────────┘
//! ```
//!
//! Anything that is not a well-formed envelope decodes as a raw value, so
//! nodes populated by other writers still read back as entries.
//!
//! The magic is `0xC0 "RCE"`. `0xC0` never occurs in UTF-8, so text values
//! can not be mistaken for an envelope. A binary value from another writer
//! that starts with a complete, well-formed header is still decoded as one.

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, TimeZone, Utc};

/// Envelope magic prefix
const MAGIC: &[u8; 4] = b"\xC0RCE";

/// Current envelope version
const VERSION: u8 = 1;

/// Flag bit: an expiry timestamp follows the header
const FLAG_EXPIRES: u8 = 0x01;

/// Header length without the optional expiry
const HEADER_LEN: usize = MAGIC.len() + 2;

/// Cache entry containing a value and its expiry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    value: Bytes,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Create an entry that never expires
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    /// Create an entry expiring `ttl` from now
    pub fn with_ttl(value: impl Into<Bytes>, ttl: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Create an entry with an explicit expiry timestamp
    pub fn with_expiry(value: impl Into<Bytes>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Get the value (zero-copy)
    #[inline]
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Consume the entry and return its value
    #[inline]
    pub fn into_value(self) -> Bytes {
        self.value
    }

    /// Expiry timestamp, if any
    #[inline]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    /// Time left before expiry, `None` for entries without one.
    ///
    /// Already expired entries report zero.
    pub fn remaining_ttl(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    /// Encode into the envelope wire format
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + 8 + self.value.len());
        buf.put_slice(MAGIC);
        buf.put_u8(VERSION);
        match self.expires_at {
            Some(at) => {
                buf.put_u8(FLAG_EXPIRES);
                buf.put_i64(at.timestamp_millis());
            }
            None => buf.put_u8(0),
        }
        buf.put_slice(&self.value);
        buf.freeze()
    }

    /// Normalize whatever a node returned into an entry
    pub fn decode(raw: Bytes) -> Self {
        Self::decode_envelope(&raw).unwrap_or_else(|| Self::new(raw))
    }

    fn decode_envelope(raw: &Bytes) -> Option<Self> {
        if raw.len() < HEADER_LEN || &raw[..MAGIC.len()] != MAGIC {
            return None;
        }

        let mut cursor = raw.slice(MAGIC.len()..);
        if cursor.get_u8() != VERSION {
            return None;
        }
        let flags = cursor.get_u8();
        if flags & !FLAG_EXPIRES != 0 {
            return None;
        }

        let expires_at = if flags & FLAG_EXPIRES != 0 {
            if cursor.remaining() < 8 {
                return None;
            }
            let millis = cursor.get_i64();
            Some(Utc.timestamp_millis_opt(millis).single()?)
        } else {
            None
        };

        Some(Self {
            value: cursor,
            expires_at,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
