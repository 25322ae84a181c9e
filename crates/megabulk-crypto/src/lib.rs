//! Cryptographic primitives for encrypted folder shares.
//!
//! Every item in a shared folder carries a key blob wrapped with the folder's master key.
//! This crate unwraps those blobs, decrypts item metadata and content, and authenticates
//! decrypted content against the tag embedded in the key.
//!
//! # Key Features
//!
//! - **Seekable**: [`StreamCipher::seek`] positions AES-128-CTR at any byte offset, so a
//!   partially downloaded file resumes without touching the bytes already on disk
//! - **Incremental**: [`ChunkMac`] authenticates a stream fed in arbitrary slices, never
//!   buffering more than one block
//! - **Extensible**: the minimal [`Hasher`] trait lets [`VerifiedReader`] drive any digest
//!
//! # Example
//!
//! ```
//! use megabulk_crypto::{ChunkMac, StreamCipher};
//!
//! let key = [7u8; 16];
//! let nonce = [9u8; 8];
//! let mut iv = [0u8; 16];
//! iv[..8].copy_from_slice(&nonce);
//!
//! let mut data = b"hello world".to_vec();
//! StreamCipher::new(&key, &iv).apply(&mut data);
//! StreamCipher::new(&key, &iv).apply(&mut data);
//! assert_eq!(data, b"hello world");
//!
//! let mut mac = ChunkMac::new(&key, &nonce);
//! mac.update(&data);
//! let tag = mac.finish();
//! assert_eq!(tag.len(), 8);
//! ```

pub use self::attr::{Attributes, decrypt_attributes};
pub use self::error::{Error, Result};
pub use self::keys::{CryptoParams, ItemKey, KEY_LEN, decode_b64url, derive_item_key, fold_word, root_id};
pub use self::mac::{CHUNK_UNIT, ChunkMac, Hasher, chunk_size};
pub use self::reader::{VerifiedReader, verify_file};
pub use self::stream::{StreamCipher, counter_at};

mod attr;
mod error;
mod keys;
mod mac;
mod reader;
mod stream;
