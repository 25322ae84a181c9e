use serde::{Deserialize, Serialize};

/// Node type as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ItemKind {
    Leaf,
    Container,
    Other(u8),
}

impl From<u8> for ItemKind {
    fn from(value: u8) -> Self {
        match value {
            0 => ItemKind::Leaf,
            1 => ItemKind::Container,
            n => ItemKind::Other(n),
        }
    }
}

impl From<ItemKind> for u8 {
    fn from(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Leaf => 0,
            ItemKind::Container => 1,
            ItemKind::Other(n) => n,
        }
    }
}

/// One node of the shared folder tree, exactly as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "h")]
    pub id: String,

    #[serde(rename = "p", default)]
    pub parent: String,

    #[serde(rename = "t")]
    pub kind: ItemKind,

    /// Encrypted attribute blob (base64url).
    #[serde(rename = "a", default)]
    pub attributes: String,

    /// `"<rootId>:<base64url wrapped key>"`.
    #[serde(rename = "k", default)]
    pub key: String,

    #[serde(rename = "s", default)]
    pub size: u64,

    #[serde(rename = "ts", default)]
    pub timestamp: i64,
}

impl Item {
    pub fn is_leaf(&self) -> bool {
        self.kind == ItemKind::Leaf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_listing_entry() {
        let item: Item = serde_json::from_str(
            r#"{"h":"abc","p":"root","u":"user","t":0,"a":"blob","k":"root:key","s":200000,"ts":1700000000}"#,
        )
        .unwrap();
        assert_eq!(item.id, "abc");
        assert_eq!(item.parent, "root");
        assert!(item.is_leaf());
        assert_eq!(item.size, 200_000);
    }

    #[test]
    fn test_deserialize_folder_without_size() {
        let item: Item = serde_json::from_str(r#"{"h":"d","p":"","t":1,"a":"x","k":"d:y","ts":1}"#).unwrap();
        assert_eq!(item.kind, ItemKind::Container);
        assert_eq!(item.size, 0);
        assert!(!item.is_leaf());
    }

    #[test]
    fn test_kind_round_trips_as_integer() {
        assert_eq!(serde_json::to_string(&ItemKind::Other(4)).unwrap(), "4");
        assert_eq!(serde_json::from_str::<ItemKind>("2").unwrap(), ItemKind::Other(2));
    }
}
