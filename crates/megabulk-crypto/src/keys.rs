use std::fmt;

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, KeyInit};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::{Error, Result};

pub const KEY_LEN: usize = 16;

const BLOCK: usize = 16;

/// Parameters needed to decrypt and authenticate one file.
///
/// Derived once from the item's key blob and never mutated afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct CryptoParams {
    /// AES-128 content key.
    pub key: [u8; KEY_LEN],
    /// Initial CTR counter block: `nonce || 0x00 * 8`.
    pub iv: [u8; 16],
    /// CTR nonce, also the seed of every MAC chunk.
    pub nonce: [u8; 8],
    /// Expected integrity tag.
    pub tag: [u8; 8],
}

impl fmt::Debug for CryptoParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoParams")
            .field("key", &"<redacted>")
            .field("nonce", &hex::encode(self.nonce))
            .field("tag", &hex::encode(self.tag))
            .finish()
    }
}

impl CryptoParams {
    fn from_unwrapped(k: &[u8]) -> Self {
        let word = |i: usize| u32::from_be_bytes([k[i * 4], k[i * 4 + 1], k[i * 4 + 2], k[i * 4 + 3]]);

        let mut key = [0u8; KEY_LEN];
        for i in 0..4 {
            key[i * 4..i * 4 + 4].copy_from_slice(&fold_word(word(i), word(i + 4)).to_be_bytes());
        }

        let mut nonce = [0u8; 8];
        nonce.copy_from_slice(&k[16..24]);
        let mut tag = [0u8; 8];
        tag.copy_from_slice(&k[24..32]);

        let mut iv = [0u8; 16];
        iv[..8].copy_from_slice(&nonce);

        Self { key, iv, nonce, tag }
    }
}

/// An unwrapped item key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKey {
    /// Containers carry a bare 16-byte key used only for their attributes.
    Container([u8; KEY_LEN]),
    /// Files carry the folded content key plus nonce and tag.
    File(CryptoParams),
}

impl ItemKey {
    /// Key that decrypts the item's attribute blob.
    pub fn attribute_key(&self) -> &[u8; KEY_LEN] {
        match self {
            ItemKey::Container(key) => key,
            ItemKey::File(params) => &params.key,
        }
    }

    pub fn into_params(self) -> Option<CryptoParams> {
        match self {
            ItemKey::File(params) => Some(params),
            ItemKey::Container(_) => None,
        }
    }
}

/// Pairwise 32-bit XOR used to fold the 256-bit file key down to 128 bits.
pub fn fold_word(a: u32, b: u32) -> u32 {
    a ^ b
}

/// Decode base64url, accepting both padded and unpadded input.
pub fn decode_b64url(input: &str) -> Result<Vec<u8>> {
    Ok(URL_SAFE_NO_PAD.decode(input.trim().trim_end_matches('='))?)
}

/// The `<rootId>` prefix of a `"<rootId>:<keyBlob>"` key field.
pub fn root_id(key_field: &str) -> Option<&str> {
    key_field.split_once(':').map(|(root, _)| root)
}

/// Unwrap an item's key blob with the folder master key.
///
/// The key field has the form `"<rootId>:<base64url blob>"`; only the last segment is used.
/// The blob is decrypted with AES-128-ECB and no padding.
pub fn derive_item_key(key_field: &str, master: &[u8; KEY_LEN]) -> Result<ItemKey> {
    let blob = key_field.rsplit(':').next().unwrap_or(key_field);
    let mut k = decode_b64url(blob)?;

    if k.is_empty() || k.len() % BLOCK != 0 {
        return Err(Error::MalformedKey(format!(
            "wrapped key is {} bytes, expected a multiple of {BLOCK}",
            k.len()
        )));
    }

    let cipher = Aes128::new(master.into());
    for block in k.chunks_exact_mut(BLOCK) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }

    match k.len() {
        KEY_LEN => {
            let mut key = [0u8; KEY_LEN];
            key.copy_from_slice(&k);
            Ok(ItemKey::Container(key))
        }
        n if n >= 32 => Ok(ItemKey::File(CryptoParams::from_unwrapped(&k[..32]))),
        n => Err(Error::MalformedKey(format!("unwrapped key is {n} bytes"))),
    }
}
