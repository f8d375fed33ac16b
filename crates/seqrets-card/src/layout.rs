//! Multi-item card layout
//!
//! The applet stores one opaque blob. Several items share it as
//!
//! ```text
//! "SQC1" ‖ ( kind:u8 ‖ label_len:u8 ‖ label ‖ payload_len:u16 BE ‖ payload )*
//! ```
//!
//! Blobs without the magic were written by the single-item flow and are
//! read as one item typed by the applet's type byte.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::CardError;

pub const LAYOUT_MAGIC: &[u8; 4] = b"SQC1";

/// Total item payload bytes a card holds
pub const ITEM_CAPACITY: usize = 8192;

pub const MAX_ITEMS: usize = 16;

pub const MAX_LABEL_LEN: usize = 64;

/// Largest possible encoded blob
pub const MAX_BLOB_LEN: usize =
    LAYOUT_MAGIC.len() + MAX_ITEMS * (RECORD_HEADER_LEN + MAX_LABEL_LEN) + ITEM_CAPACITY;

/// kind + label_len + payload_len
const RECORD_HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Share,
    Vault,
    Keyfile,
    Instruction,
}

impl ItemKind {
    pub fn to_byte(self) -> u8 {
        match self {
            ItemKind::Share => 0x01,
            ItemKind::Vault => 0x02,
            ItemKind::Keyfile => 0x03,
            ItemKind::Instruction => 0x04,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(ItemKind::Share),
            0x02 => Some(ItemKind::Vault),
            0x03 => Some(ItemKind::Keyfile),
            0x04 => Some(ItemKind::Instruction),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Share => "share",
            ItemKind::Vault => "vault",
            ItemKind::Keyfile => "keyfile",
            ItemKind::Instruction => "instruction",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemKind {
    type Err = CardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "share" => Ok(ItemKind::Share),
            "vault" => Ok(ItemKind::Vault),
            "keyfile" => Ok(ItemKind::Keyfile),
            "instruction" => Ok(ItemKind::Instruction),
            other => Err(CardError::Format(format!("unknown item kind {:?}", other))),
        }
    }
}

/// One stored item. The payload is wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct CardItem {
    pub kind: ItemKind,
    pub label: String,
    pub payload: Vec<u8>,
}

impl CardItem {
    /// Build an item; the label is cut to 64 bytes on a character boundary.
    pub fn new(kind: ItemKind, label: &str, payload: Vec<u8>) -> Self {
        Self {
            kind,
            label: truncate_label(label).to_owned(),
            payload,
        }
    }

    /// Payload as text (shares and vault JSON are always UTF-8).
    pub fn payload_str(&self) -> Result<&str, CardError> {
        std::str::from_utf8(&self.payload)
            .map_err(|_| CardError::Format(format!("{} payload is not UTF-8", self.kind)))
    }
}

impl fmt::Debug for CardItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardItem")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl Drop for CardItem {
    fn drop(&mut self) {
        self.payload.zeroize();
    }
}

/// Longest prefix of `label` that fits in 64 bytes without splitting a character.
pub fn truncate_label(label: &str) -> &str {
    if label.len() <= MAX_LABEL_LEN {
        return label;
    }
    let mut end = MAX_LABEL_LEN;
    while !label.is_char_boundary(end) {
        end -= 1;
    }
    &label[..end]
}

/// Sum of payload sizes
pub fn used_capacity(items: &[CardItem]) -> usize {
    items.iter().map(|i| i.payload.len()).sum()
}

/// Check that `items` fit on a card.
pub fn check_capacity(items: &[CardItem]) -> Result<(), CardError> {
    if items.len() > MAX_ITEMS {
        return Err(CardError::CapacityExceeded(format!(
            "{} items, at most {} fit",
            items.len(),
            MAX_ITEMS
        )));
    }
    let used = used_capacity(items);
    if used > ITEM_CAPACITY {
        return Err(CardError::CapacityExceeded(format!(
            "{} bytes of items, at most {} fit",
            used, ITEM_CAPACITY
        )));
    }
    Ok(())
}

pub fn encode_items(items: &[CardItem]) -> Result<Vec<u8>, CardError> {
    check_capacity(items)?;

    let mut out = Vec::with_capacity(
        LAYOUT_MAGIC.len()
            + items
                .iter()
                .map(|i| RECORD_HEADER_LEN + i.label.len() + i.payload.len())
                .sum::<usize>(),
    );
    out.extend_from_slice(LAYOUT_MAGIC);
    for item in items {
        if item.payload.is_empty() {
            return Err(CardError::Format(format!("empty {} item", item.kind)));
        }
        let label = truncate_label(&item.label).as_bytes();
        out.push(item.kind.to_byte());
        out.push(label.len() as u8);
        out.extend_from_slice(label);
        // check_capacity bounds every payload by ITEM_CAPACITY < u16::MAX
        out.extend_from_slice(&(item.payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&item.payload);
    }
    Ok(out)
}

/// Decode a stored blob.
///
/// `legacy_type` and `legacy_label` come from the applet status and are
/// used only for blobs without the layout magic.
pub fn decode_items(
    blob: &[u8],
    legacy_type: u8,
    legacy_label: &str,
) -> Result<Vec<CardItem>, CardError> {
    if blob.is_empty() {
        return Ok(Vec::new());
    }

    let Some(mut rest) = blob.strip_prefix(LAYOUT_MAGIC.as_slice()) else {
        let kind = ItemKind::from_byte(legacy_type).ok_or_else(|| {
            CardError::Format(format!("unknown legacy data type 0x{:02X}", legacy_type))
        })?;
        log::debug!("reading legacy single-item card ({})", kind);
        return Ok(vec![CardItem::new(kind, legacy_label, blob.to_vec())]);
    };

    let mut items = Vec::new();
    while !rest.is_empty() {
        let (&kind_byte, after) = rest
            .split_first()
            .ok_or_else(|| truncated("record header"))?;
        let kind = ItemKind::from_byte(kind_byte)
            .ok_or_else(|| CardError::Format(format!("unknown item kind 0x{:02X}", kind_byte)))?;

        let (&label_len, after) = after.split_first().ok_or_else(|| truncated("label length"))?;
        let label_len = label_len as usize;
        if after.len() < label_len {
            return Err(truncated("label"));
        }
        let (label, after) = after.split_at(label_len);
        let label = std::str::from_utf8(label)
            .map_err(|_| CardError::Format("item label is not UTF-8".into()))?;

        if after.len() < 2 {
            return Err(truncated("payload length"));
        }
        let (len_bytes, after) = after.split_at(2);
        let payload_len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        if after.len() < payload_len {
            return Err(truncated("payload"));
        }
        let (payload, after) = after.split_at(payload_len);

        items.push(CardItem::new(kind, label, payload.to_vec()));
        rest = after;
    }
    Ok(items)
}

fn truncated(what: &str) -> CardError {
    CardError::Format(format!("card data truncated in {}", what))
}
