use std::fmt;
use std::str::FromStr;

use megabulk_crypto::{KEY_LEN, decode_b64url};

use crate::error::{Error, Result};

/// Folder identifier and master key carried by a share link.
#[derive(Clone, PartialEq, Eq)]
pub struct ShareCredential {
    folder_id: String,
    master_key: [u8; KEY_LEN],
}

impl fmt::Debug for ShareCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareCredential")
            .field("folder_id", &self.folder_id)
            .field("master_key", &"<redacted>")
            .finish()
    }
}

impl ShareCredential {
    pub fn new(folder_id: impl Into<String>, master_key: [u8; KEY_LEN]) -> Self {
        Self {
            folder_id: folder_id.into(),
            master_key,
        }
    }

    /// Parse `https://mega.nz/folder/<id>#<key>` or the legacy `https://mega.nz/#F!<id>!<key>`.
    ///
    /// A trailing `/folder/<sub>` or `/file/<sub>` after the key is ignored.
    pub fn parse(link: &str) -> Result<Self> {
        let link = link.trim();
        let (path, fragment) = link
            .split_once('#')
            .ok_or_else(|| Error::InvalidLink("missing '#<key>' fragment".into()))?;

        let (folder_id, key) = match fragment.strip_prefix("F!") {
            Some(legacy) => legacy
                .split_once('!')
                .ok_or_else(|| Error::InvalidLink("legacy link lacks a key".into()))?,
            None => {
                let (_, id) = path
                    .split_once("/folder/")
                    .ok_or_else(|| Error::InvalidLink("not a folder link".into()))?;
                let id = id.trim_end_matches('/');
                let key = fragment.split('/').next().unwrap_or_default();
                (id, key)
            }
        };

        if folder_id.is_empty() || folder_id.contains(':') {
            return Err(Error::InvalidLink(format!("bad folder id in {link:?}")));
        }

        let raw = decode_b64url(key).map_err(|e| Error::InvalidLink(e.to_string()))?;
        let master_key: [u8; KEY_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| Error::InvalidLink(format!("key is {} bytes, expected {KEY_LEN}", raw.len())))?;

        Ok(Self::new(folder_id, master_key))
    }

    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }

    pub fn master_key(&self) -> &[u8; KEY_LEN] {
        &self.master_key
    }
}

impl FromStr for ShareCredential {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 16 bytes 0x00..0x0f in unpadded base64url
    const KEY: &str = "AAECAwQFBgcICQoLDA0ODw";

    fn expected_key() -> [u8; 16] {
        std::array::from_fn(|i| i as u8)
    }

    #[test]
    fn test_parse_folder_link() {
        let cred = ShareCredential::parse(&format!("https://mega.nz/folder/AbCd1234#{KEY}")).unwrap();
        assert_eq!(cred.folder_id(), "AbCd1234");
        assert_eq!(cred.master_key(), &expected_key());
    }

    #[test]
    fn test_parse_sub_folder_link() {
        let cred = ShareCredential::parse(&format!("https://mega.nz/folder/AbCd1234#{KEY}/folder/Zz9")).unwrap();
        assert_eq!(cred.folder_id(), "AbCd1234");
    }

    #[test]
    fn test_parse_legacy_link() {
        let cred: ShareCredential = format!("https://mega.nz/#F!XyZ987!{KEY}").parse().unwrap();
        assert_eq!(cred.folder_id(), "XyZ987");
        assert_eq!(cred.master_key(), &expected_key());
    }

    #[test]
    fn test_parse_padded_key() {
        let cred = ShareCredential::parse(&format!("https://mega.nz/folder/a#{KEY}==")).unwrap();
        assert_eq!(cred.master_key(), &expected_key());
    }

    #[test]
    fn test_parse_rejects() {
        for link in [
            "https://mega.nz/folder/abc",
            "https://mega.nz/folder/abc#AAEC",
            "https://mega.nz/folder/abc#!!!",
            "https://mega.nz/#F!abc",
            &format!("https://mega.nz/#{KEY}"),
        ] {
            assert!(
                matches!(ShareCredential::parse(link), Err(Error::InvalidLink(_))),
                "{link}"
            );
        }
    }

    #[test]
    fn test_debug_redacts_key() {
        let cred = ShareCredential::new("id", [7; 16]);
        assert!(!format!("{cred:?}").contains('7'));
    }
}
