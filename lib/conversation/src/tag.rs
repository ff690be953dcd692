//! Tags binding server-held values to client-visible callback payloads.
//!
//! A payload is the hex encoding of either a bare 16-byte tag or a tag
//! followed by a little-endian `u32` index into the tagged list (20 bytes).

use crate::error::TagError;
use std::fmt;

const TAG_LEN: usize = 16;
const INDEXED_LEN: usize = TAG_LEN + 4;

/// A random 128-bit reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag([u8; TAG_LEN]);

impl Tag {
    /// The zero tag; never issued by [`Tag::generate`].
    pub const NIL: Self = Self([0; TAG_LEN]);

    /// Draws a fresh tag from the thread-local CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        loop {
            let tag = Self(rand::random());
            if tag != Self::NIL {
                return tag;
            }
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; TAG_LEN] {
        &self.0
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.to_hex())
    }
}

impl From<[u8; TAG_LEN]> for Tag {
    fn from(bytes: [u8; TAG_LEN]) -> Self {
        Self(bytes)
    }
}

/// A decoded callback payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// A reference to a whole tagged value.
    Tag(Tag),
    /// A reference to one element of a tagged list.
    Indexed { tag: Tag, index: usize },
}

/// Encodes a bare tag payload.
#[must_use]
pub fn encode_tag(tag: Tag) -> String {
    tag.to_hex()
}

/// Encodes a tag plus list index payload.
#[must_use]
pub fn encode_indexed(tag: Tag, index: u32) -> String {
    let mut bytes = [0u8; INDEXED_LEN];
    bytes[..TAG_LEN].copy_from_slice(tag.as_bytes());
    bytes[TAG_LEN..].copy_from_slice(&index.to_le_bytes());
    hex::encode(bytes)
}

fn decode_bytes(payload: &str) -> Result<Vec<u8>, TagError> {
    hex::decode(payload).map_err(|e| TagError::InvalidPayload {
        reason: e.to_string(),
    })
}

fn wrong_length(len: usize) -> TagError {
    TagError::InvalidPayload {
        reason: format!("unexpected payload length {len}"),
    }
}

fn split_tag(bytes: &[u8]) -> Tag {
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&bytes[..TAG_LEN]);
    Tag(tag)
}

/// Decodes a payload of either shape.
pub fn decode_selection(payload: &str) -> Result<Selection, TagError> {
    let bytes = decode_bytes(payload)?;
    match bytes.len() {
        TAG_LEN => Ok(Selection::Tag(split_tag(&bytes))),
        INDEXED_LEN => {
            let mut index = [0u8; 4];
            index.copy_from_slice(&bytes[TAG_LEN..]);
            Ok(Selection::Indexed {
                tag: split_tag(&bytes),
                index: u32::from_le_bytes(index) as usize,
            })
        }
        len => Err(wrong_length(len)),
    }
}

/// Decodes a payload that must be a bare tag.
pub fn decode_tag(payload: &str) -> Result<Tag, TagError> {
    match decode_selection(payload)? {
        Selection::Tag(tag) => Ok(tag),
        Selection::Indexed { .. } => Err(wrong_length(INDEXED_LEN)),
    }
}

/// Decodes a payload that must carry a list index.
pub fn decode_indexed(payload: &str) -> Result<(Tag, usize), TagError> {
    match decode_selection(payload)? {
        Selection::Indexed { tag, index } => Ok((tag, index)),
        Selection::Tag(_) => Err(wrong_length(TAG_LEN)),
    }
}

/// Single-slot store resolving a tag back to the value it was issued for.
///
/// Publishing a new value invalidates the previous tag.
#[derive(Debug)]
pub struct TaggedVar<T> {
    slot: Option<(Tag, T)>,
}

impl<T> TaggedVar<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { slot: None }
    }

    /// Stores `value` under a fresh tag and returns the tag.
    pub fn set(&mut self, value: T) -> Tag {
        let tag = Tag::generate();
        self.slot = Some((tag, value));
        tag
    }

    /// Returns the value if `tag` is the current one.
    pub fn get(&self, tag: Tag) -> Result<&T, TagError> {
        match &self.slot {
            Some((current, value)) if *current == tag => Ok(value),
            _ => Err(TagError::InvalidTag),
        }
    }

    /// Returns the tag currently issued, if any.
    #[must_use]
    pub fn current_tag(&self) -> Option<Tag> {
        self.slot.as_ref().map(|(tag, _)| *tag)
    }

    /// Drops the value; every tag becomes invalid.
    pub fn clear(&mut self) {
        self.slot = None;
    }
}

impl<T> Default for TaggedVar<T> {
    fn default() -> Self {
        Self::new()
    }
}
