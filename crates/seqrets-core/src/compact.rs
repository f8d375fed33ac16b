//! Mnemonic compaction
//!
//! A 12-word phrase is ~75 characters of text but only 16 bytes of entropy;
//! a 24-word phrase is ~150 characters for 32 bytes. Storing the entropy
//! instead of the words is the dominant size win for QR-sized shares.
//!
//! # Framing
//!
//! A secret is split on `'\n'` and every line becomes one segment:
//!
//! ```text
//! tag:u8 ‖ len:u32 BE ‖ bytes
//!
//! 0x01  mnemonic entropy, words rendered lowercase
//! 0x02  freeform UTF-8
//! 0x03  mnemonic entropy, words rendered uppercase
//! ```
//!
//! A line is only compacted when it is exactly the canonical rendering of a
//! valid phrase, so `expand(compact(s)) == s` for every input.

use bip39::{Language, Mnemonic};
use zeroize::{Zeroize, Zeroizing};

use crate::error::CoreError;

const TAG_MNEMONIC: u8 = 0x01;
const TAG_FREEFORM: u8 = 0x02;
const TAG_MNEMONIC_UPPER: u8 = 0x03;

/// tag + u32 length
const SEGMENT_HEADER_LEN: usize = 5;

/// Word counts that are compacted; everything else stays freeform.
pub const SUPPORTED_WORD_COUNTS: [usize; 2] = [12, 24];

/// How the words of a compacted phrase were written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordCase {
    Lower,
    Upper,
}

/// One line of the original secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A valid BIP-39 phrase reduced to its entropy (16 or 32 bytes)
    Mnemonic { entropy: Vec<u8>, case: WordCase },
    /// Anything else, kept verbatim
    Freeform(String),
}

impl Drop for Segment {
    fn drop(&mut self) {
        match self {
            Segment::Mnemonic { entropy, .. } => entropy.zeroize(),
            Segment::Freeform(text) => text.zeroize(),
        }
    }
}

/// A compacted secret: one segment per input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    segments: Vec<Segment>,
}

impl Payload {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// True when every line was recognised as a mnemonic.
    pub fn is_mnemonic(&self) -> bool {
        !self.segments.is_empty()
            && self
                .segments
                .iter()
                .all(|s| matches!(s, Segment::Mnemonic { .. }))
    }

    /// Serialize to the length-prefixed segment framing.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::new());
        for segment in &self.segments {
            let (tag, body) = match segment {
                Segment::Mnemonic {
                    entropy,
                    case: WordCase::Lower,
                } => (TAG_MNEMONIC, entropy.as_slice()),
                Segment::Mnemonic {
                    entropy,
                    case: WordCase::Upper,
                } => (TAG_MNEMONIC_UPPER, entropy.as_slice()),
                Segment::Freeform(text) => (TAG_FREEFORM, text.as_bytes()),
            };
            out.push(tag);
            out.extend_from_slice(&(body.len() as u32).to_be_bytes());
            out.extend_from_slice(body);
        }
        out
    }

    /// Parse the segment framing. Any truncation or unknown tag is an error;
    /// nothing is ever silently dropped.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        let mut segments = Vec::new();
        let mut rest = bytes;

        while !rest.is_empty() {
            if rest.len() < SEGMENT_HEADER_LEN {
                return Err(CoreError::Format("truncated segment header".into()));
            }
            let tag = rest[0];
            let len = u32::from_be_bytes([rest[1], rest[2], rest[3], rest[4]]) as usize;
            let body_end = SEGMENT_HEADER_LEN
                .checked_add(len)
                .filter(|end| *end <= rest.len())
                .ok_or_else(|| {
                    CoreError::Format(format!(
                        "segment declares {} bytes, {} available",
                        len,
                        rest.len() - SEGMENT_HEADER_LEN
                    ))
                })?;
            let body = &rest[SEGMENT_HEADER_LEN..body_end];

            let segment = match tag {
                TAG_MNEMONIC | TAG_MNEMONIC_UPPER => {
                    if !matches!(body.len(), 16 | 32) {
                        return Err(CoreError::Format(format!(
                            "mnemonic entropy must be 16 or 32 bytes, got {}",
                            body.len()
                        )));
                    }
                    let case = if tag == TAG_MNEMONIC {
                        WordCase::Lower
                    } else {
                        WordCase::Upper
                    };
                    Segment::Mnemonic {
                        entropy: body.to_vec(),
                        case,
                    }
                }
                TAG_FREEFORM => {
                    let text = std::str::from_utf8(body)
                        .map_err(|e| CoreError::Format(format!("freeform segment: {}", e)))?;
                    Segment::Freeform(text.to_owned())
                }
                other => {
                    return Err(CoreError::Format(format!(
                        "unknown segment tag 0x{:02x}",
                        other
                    )))
                }
            };
            segments.push(segment);
            rest = &rest[body_end..];
        }

        Ok(Self { segments })
    }
}

/// Compact a secret, reducing each mnemonic line to its entropy.
pub fn compact(secret: &str) -> Payload {
    let segments = secret.split('\n').map(compact_line).collect();
    Payload { segments }
}

fn compact_line(line: &str) -> Segment {
    match detect_mnemonic(line) {
        Some((entropy, case)) => Segment::Mnemonic { entropy, case },
        None => Segment::Freeform(line.to_owned()),
    }
}

/// Returns the entropy when `line` is exactly a canonical 12/24-word phrase.
fn detect_mnemonic(line: &str) -> Option<(Vec<u8>, WordCase)> {
    let word_count = line.split(' ').count();
    if !SUPPORTED_WORD_COUNTS.contains(&word_count) {
        return None;
    }

    let lowered = Zeroizing::new(line.to_lowercase());
    let mnemonic = Mnemonic::parse_in(Language::English, lowered.as_str()).ok()?;
    let canonical = Zeroizing::new(mnemonic.to_string());

    let case = if canonical.as_str() == line {
        WordCase::Lower
    } else if canonical.to_uppercase() == line {
        WordCase::Upper
    } else {
        return None;
    };

    Some((mnemonic.to_entropy(), case))
}

/// Reverse [`compact`]: re-encode entropy into words and rejoin the lines.
pub fn expand(payload: &Payload) -> Result<Zeroizing<String>, CoreError> {
    let mut out = Zeroizing::new(String::new());

    for (i, segment) in payload.segments.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        match segment {
            Segment::Mnemonic { entropy, case } => {
                let mnemonic = Mnemonic::from_entropy_in(Language::English, entropy)
                    .map_err(|e| CoreError::Format(format!("mnemonic entropy: {}", e)))?;
                let words = Zeroizing::new(mnemonic.to_string());
                match case {
                    WordCase::Lower => out.push_str(&words),
                    WordCase::Upper => out.push_str(&Zeroizing::new(words.to_uppercase())),
                }
            }
            Segment::Freeform(text) => out.push_str(text),
        }
    }

    Ok(out)
}

/// Generate a fresh English BIP-39 phrase of 12 or 24 words.
pub fn generate_mnemonic(word_count: usize) -> Result<Mnemonic, CoreError> {
    if !SUPPORTED_WORD_COUNTS.contains(&word_count) {
        return Err(CoreError::InvalidMnemonic(format!(
            "word count must be 12 or 24, got {}",
            word_count
        )));
    }
    Mnemonic::generate_in(Language::English, word_count)
        .map_err(|e| CoreError::InvalidMnemonic(e.to_string()))
}
