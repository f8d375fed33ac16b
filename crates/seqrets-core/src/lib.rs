//! seQRets Core
//!
//! The cryptographic half of the secure path:
//!
//! ```text
//! secret ─▶ compact ─▶ compress ─▶ Argon2id ─▶ XChaCha20-Poly1305 ─▶ EncryptedBlob
//! ```
//!
//! Splitting the blob into Qards lives in `seqrets-shamir`; bundling shares
//! into vault files lives in `seqrets-vault`.
//!
//! # Example
//!
//! ```no_run
//! use seqrets_core::{compact, decrypt_bytes, encrypt_bytes, expand, Payload};
//!
//! let payload = compact("hello world");
//! let blob = encrypt_bytes(&payload.to_bytes(), b"correct horse", None).unwrap();
//!
//! let plaintext = decrypt_bytes(&blob, b"correct horse", None).unwrap();
//! let restored = expand(&Payload::from_bytes(&plaintext).unwrap()).unwrap();
//! assert_eq!(restored.as_str(), "hello world");
//! ```

pub mod backend;
pub mod cipher;
pub mod codec;
pub mod compact;
pub mod crypto;
pub mod error;
pub mod kdf;
pub mod payload;

pub use compact::{compact, expand, generate_mnemonic, Payload, Segment, WordCase};
pub use crypto::{decrypt_bytes, decrypt_parts, encrypt_bytes, EncryptedBlob};
pub use error::CoreError;
pub use kdf::{generate_keyfile, SALT_LEN};
pub use payload::{FileRecord, SecretPayload};
