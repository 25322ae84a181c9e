use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use megabulk_crypto::{KEY_LEN, decrypt_attributes, derive_item_key, root_id};

use crate::data::Item;
use crate::error::Result;

/// A leaf item resolved to a display name and a directory relative to the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub item: Item,
    pub name: String,
    pub dir: PathBuf,
}

impl PlannedFile {
    pub fn relative_path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }
}

/// Leaves that could be planned, and `(item id, reason)` for those that could not.
#[derive(Debug, Default)]
pub struct Plan {
    pub files: Vec<PlannedFile>,
    pub skipped: Vec<(String, String)>,
}

/// Resolve every leaf of the listing to a sanitised relative path.
///
/// Names come from each item's decrypted attributes. Directories come from walking parent
/// links up to and including the share root; the walk stops early at a missing or undecodable
/// ancestor. Two leaves resolving to the same path are disambiguated with the item id.
pub fn plan(items: &[Item], master: &[u8; KEY_LEN]) -> Plan {
    let index: HashMap<&str, &Item> = items.iter().map(|item| (item.id.as_str(), item)).collect();
    let mut plan = Plan::default();
    let mut taken = HashSet::new();

    for item in items.iter().filter(|item| item.is_leaf()) {
        let name = match item_name(item, master) {
            Ok(name) => sanitize(&name),
            Err(e) => {
                plan.skipped.push((item.id.clone(), e.to_string()));
                continue;
            }
        };
        let dir = directory_of(item, &index, master);

        let mut file = PlannedFile {
            item: item.clone(),
            name,
            dir,
        };
        if !taken.insert(file.relative_path()) {
            file.name = format!("{} ({})", file.name, item.id);
            taken.insert(file.relative_path());
        }
        plan.files.push(file);
    }

    plan
}

/// Decrypt the display name of one item.
pub fn item_name(item: &Item, master: &[u8; KEY_LEN]) -> Result<String> {
    let key = derive_item_key(&item.key, master)?;
    Ok(decrypt_attributes(&item.attributes, key.attribute_key())?.name)
}

fn directory_of(item: &Item, index: &HashMap<&str, &Item>, master: &[u8; KEY_LEN]) -> PathBuf {
    let root = root_id(&item.key);
    let mut components = Vec::new();
    let mut current = item.parent.as_str();

    while !current.is_empty() {
        let Some(parent) = index.get(current) else {
            break;
        };
        let Ok(name) = item_name(parent, master) else {
            break;
        };
        components.push(sanitize(&name));
        if Some(current) == root {
            break;
        }
        // guard against a cycle in a malformed listing
        if components.len() > index.len() {
            break;
        }
        current = parent.parent.as_str();
    }

    components.iter().rev().collect()
}

/// Make a name safe to use as a single path component.
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim();

    match cleaned {
        "" | "." | ".." => "_".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ItemKind;
    use aes::Aes128;
    use aes::cipher::block_padding::NoPadding;
    use aes::cipher::generic_array::GenericArray;
    use aes::cipher::{BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    const MASTER: [u8; 16] = [0x11; 16];

    fn wrap(raw: &[u8]) -> String {
        let cipher = Aes128::new((&MASTER).into());
        let mut buf = raw.to_vec();
        for block in buf.chunks_exact_mut(16) {
            cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
        URL_SAFE_NO_PAD.encode(buf)
    }

    fn seal(name: &str, key: &[u8; 16]) -> String {
        let mut plain = format!("MEGA{{\"n\":{}}}", serde_json::to_string(name).unwrap()).into_bytes();
        plain.resize(plain.len().div_ceil(16) * 16, 0);
        let len = plain.len();
        let ct = cbc::Encryptor::<Aes128>::new(key.into(), &[0u8; 16].into())
            .encrypt_padded_mut::<NoPadding>(&mut plain, len)
            .unwrap()
            .to_vec();
        URL_SAFE_NO_PAD.encode(ct)
    }

    fn folder(id: &str, parent: &str, name: &str, root: &str) -> Item {
        let key = [id.len() as u8; 16];
        Item {
            id: id.into(),
            parent: parent.into(),
            kind: ItemKind::Container,
            attributes: seal(name, &key),
            key: format!("{root}:{}", wrap(&key)),
            size: 0,
            timestamp: 0,
        }
    }

    fn file(id: &str, parent: &str, name: &str, root: &str) -> Item {
        // content key folds to zero: the halves are equal
        let raw = [0x5au8; 32];
        Item {
            id: id.into(),
            parent: parent.into(),
            kind: ItemKind::Leaf,
            attributes: seal(name, &[0u8; 16]),
            key: format!("{root}:{}", wrap(&raw)),
            size: 10,
            timestamp: 0,
        }
    }

    #[test]
    fn test_plan_reconstructs_directories() {
        let items = vec![
            folder("outer", "", "Outside", "root"),
            folder("root", "outer", "Share", "root"),
            folder("sub", "root", "Season 1", "root"),
            file("f1", "sub", "ep1.mkv", "root"),
            file("f2", "root", "notes.txt", "root"),
        ];
        let plan = plan(&items, &MASTER);
        assert!(plan.skipped.is_empty());

        let paths: Vec<_> = plan.files.iter().map(PlannedFile::relative_path).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("Share/Season 1/ep1.mkv"),
                PathBuf::from("Share/notes.txt")
            ]
        );
    }

    #[test]
    fn test_plan_skips_undecodable_leaf() {
        let mut broken = file("f1", "", "a", "root");
        broken.key = "root:AAAA".into();
        let plan = plan(&[broken, file("f2", "", "b", "root")], &MASTER);
        assert_eq!(plan.files.len(), 1);
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].0, "f1");
    }

    #[test]
    fn test_plan_stops_at_missing_parent() {
        let plan = plan(&[file("f1", "gone", "a.bin", "root")], &MASTER);
        assert_eq!(plan.files[0].relative_path(), PathBuf::from("a.bin"));
    }

    #[test]
    fn test_plan_disambiguates_duplicates() {
        let items = vec![file("f1", "", "same", "r"), file("f2", "", "same", "r")];
        let plan = plan(&items, &MASTER);
        assert_eq!(plan.files[0].name, "same");
        assert_eq!(plan.files[1].name, "same (f2)");
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("a/b\\c"), "a_b_c");
        assert_eq!(sanitize(".."), "_");
        assert_eq!(sanitize("  "), "_");
        assert_eq!(sanitize("tab\there"), "tab_here");
        assert_eq!(sanitize("ok name.txt"), "ok name.txt");
    }
}
