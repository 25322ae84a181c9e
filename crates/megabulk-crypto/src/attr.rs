use aes::Aes128;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, KeyIvInit};
use serde::Deserialize;

use crate::keys::decode_b64url;
use crate::{Error, Result};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

const MARKER: &str = "MEGA";

/// Decrypted item metadata.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Attributes {
    #[serde(rename = "n")]
    pub name: String,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Decrypt an item's base64url attribute blob.
///
/// AES-128-CBC with a zero IV and no padding; the plaintext is NUL padded and starts with a
/// literal marker before the JSON body.
pub fn decrypt_attributes(blob: &str, key: &[u8]) -> Result<Attributes> {
    let mut buf = decode_b64url(blob)?;

    let decryptor = Aes128CbcDec::new_from_slices(key, &[0u8; 16])
        .map_err(|_| Error::AttributeDecrypt(format!("key is {} bytes", key.len())))?;
    let plain = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| Error::AttributeDecrypt("blob is not block aligned".into()))?;

    let text = std::str::from_utf8(plain)
        .map_err(|e| Error::AttributeDecrypt(e.to_string()))?
        .trim_end_matches('\0');
    let body = text.strip_prefix(MARKER).unwrap_or(text);

    serde_json::from_str(body).map_err(|e| Error::AttributeDecrypt(e.to_string()))
}
