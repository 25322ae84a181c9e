#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aes::Aes128;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use megabulk_crypto::{ChunkMac, CryptoParams, StreamCipher};
use megabulk_fetch::{
    ByteStream, Connector, HttpClient, Item, ItemKind, ProxyAddress, ProxySource, RunOptions, ShareCredential,
    TransportError,
};
use serde_json::{Value, json};

pub const MASTER: [u8; 16] = [0x42; 16];
pub const ROOT: &str = "ROOT";
pub const STORAGE: &str = "http://n1.userstorage.mega.co.nz/dl";

/// Size of the chunks the mock transport delivers; deliberately not block aligned.
pub const CHUNK: usize = 10_000;

pub fn credential() -> ShareCredential {
    ShareCredential::new("FOLDER", MASTER)
}

pub fn options() -> RunOptions {
    RunOptions::default()
        .api_url("https://api.test")
        .workers(4)
        .max_probing(4)
        .max_transferring(2)
}

pub fn proxies(n: usize) -> Vec<ProxyAddress> {
    (0..n)
        .map(|i| format!("socks5://10.0.0.{}:1080", i + 1).parse().unwrap())
        .collect()
}

fn wrap(raw: &[u8]) -> String {
    let cipher = Aes128::new((&MASTER).into());
    let mut buf = raw.to_vec();
    for block in buf.chunks_exact_mut(16) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    URL_SAFE_NO_PAD.encode(buf)
}

fn seal(name: &str, key: &[u8; 16]) -> String {
    let mut plain = format!("MEGA{}", json!({ "n": name })).into_bytes();
    plain.resize(plain.len().div_ceil(16) * 16, 0);
    let len = plain.len();
    let ct = cbc::Encryptor::<Aes128>::new(key.into(), &[0u8; 16].into())
        .encrypt_padded_mut::<NoPadding>(&mut plain, len)
        .unwrap()
        .to_vec();
    URL_SAFE_NO_PAD.encode(ct)
}

/// Deterministic, non-repeating test content.
pub fn content(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u32).wrapping_mul(2_654_435_761).to_le_bytes()[1] ^ seed).collect()
}

/// A file as the provider stores it.
pub struct SharedFile {
    pub item: Item,
    pub params: CryptoParams,
    pub plaintext: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Encrypt `plaintext` the way the provider would and build its listing entry.
pub fn shared_file(id: &str, parent: &str, name: &str, plaintext: Vec<u8>) -> SharedFile {
    let key: [u8; 16] = std::array::from_fn(|i| i as u8 * 7 + id.len() as u8);
    let nonce: [u8; 8] = std::array::from_fn(|i| 0xa0 + i as u8);

    let mut mac = ChunkMac::new(&key, &nonce);
    mac.update(&plaintext);
    let tag = mac.finish();

    let mut raw = [0u8; 32];
    raw[16..24].copy_from_slice(&nonce);
    raw[24..32].copy_from_slice(&tag);
    for i in 0..16 {
        raw[i] = key[i] ^ raw[16 + i];
    }

    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&nonce);
    let mut ciphertext = plaintext.clone();
    StreamCipher::new(&key, &iv).apply(&mut ciphertext);

    SharedFile {
        item: Item {
            id: id.into(),
            parent: parent.into(),
            kind: ItemKind::Leaf,
            attributes: seal(name, &key),
            key: format!("{ROOT}:{}", wrap(&raw)),
            size: plaintext.len() as u64,
            timestamp: 1_700_000_000,
        },
        params: CryptoParams { key, iv, nonce, tag },
        plaintext,
        ciphertext,
    }
}

pub fn root_folder(name: &str) -> Item {
    let key = [0x33u8; 16];
    Item {
        id: ROOT.into(),
        parent: String::new(),
        kind: ItemKind::Container,
        attributes: seal(name, &key),
        key: format!("{ROOT}:{}", wrap(&key)),
        size: 0,
        timestamp: 1_700_000_000,
    }
}

/// One recorded content request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub proxy: Option<String>,
    pub item: String,
    pub start: u64,
    pub end: u64,
}

/// A fake provider plus storage reachable through any proxy.
#[derive(Default)]
pub struct World {
    pub items: Vec<Item>,
    pub ciphertext: HashMap<String, Vec<u8>>,
    pub streams: Mutex<Vec<StreamRequest>>,
    pub url_requests: AtomicUsize,
    /// Content streams still to be cut off early, and after how many bytes.
    pub cut_after: Mutex<Vec<usize>>,
    /// Proxies whose provider calls are rate limited.
    pub throttled: Mutex<Vec<String>>,
}

impl World {
    pub fn new(root: Item, files: &[SharedFile]) -> Arc<Self> {
        let mut items = vec![root];
        items.extend(files.iter().map(|f| f.item.clone()));
        Arc::new(Self {
            items,
            ciphertext: files.iter().map(|f| (f.item.id.clone(), f.ciphertext.clone())).collect(),
            ..Self::default()
        })
    }

    pub fn streams(&self) -> Vec<StreamRequest> {
        self.streams.lock().unwrap().clone()
    }
}

#[derive(Clone)]
pub struct MockConnector(pub Arc<World>);

impl Connector for MockConnector {
    type Client = MockClient;

    fn direct(&self) -> Result<MockClient, TransportError> {
        Ok(MockClient {
            world: Arc::clone(&self.0),
            proxy: None,
        })
    }

    fn via_proxy(&self, proxy: &ProxyAddress) -> Result<MockClient, TransportError> {
        Ok(MockClient {
            world: Arc::clone(&self.0),
            proxy: Some(proxy.to_string()),
        })
    }
}

pub struct MockClient {
    world: Arc<World>,
    proxy: Option<String>,
}

impl HttpClient for MockClient {
    async fn post_json(&self, _url: &str, body: &Value, _timeout: Duration) -> Result<Value, TransportError> {
        if let Some(proxy) = &self.proxy {
            if self.world.throttled.lock().unwrap().contains(proxy) {
                return Err(TransportError::Status(509));
            }
        }

        let request = &body[0];
        match request["a"].as_str() {
            Some("f") => Ok(json!([{ "f": self.world.items }])),
            Some("g") => {
                self.world.url_requests.fetch_add(1, Ordering::SeqCst);
                let id = request["n"].as_str().unwrap_or_default();
                match self.world.ciphertext.get(id) {
                    Some(data) => Ok(json!([{ "g": format!("{STORAGE}/{id}"), "s": data.len() }])),
                    None => Ok(json!([-9])),
                }
            }
            _ => Ok(json!(-2)),
        }
    }

    async fn get_text(&self, _url: &str) -> Result<String, TransportError> {
        Err(TransportError::Status(404))
    }

    async fn stream(&self, url: &str, _headers: &[(String, String)]) -> Result<ByteStream, TransportError> {
        let rest = url
            .strip_prefix(STORAGE)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or(TransportError::Status(404))?;
        let (id, range) = rest.split_once('/').ok_or(TransportError::Status(400))?;
        let (start, end) = range.split_once('-').ok_or(TransportError::Status(400))?;
        let start: u64 = start.parse().map_err(|_| TransportError::Status(400))?;
        let end: u64 = end.parse().map_err(|_| TransportError::Status(400))?;
        let data = self.world.ciphertext.get(id).ok_or(TransportError::Status(404))?;

        self.world.streams.lock().unwrap().push(StreamRequest {
            proxy: self.proxy.clone(),
            item: id.to_string(),
            start,
            end,
        });

        let body = data[start as usize..=end as usize].to_vec();
        let cut = {
            let mut cuts = self.world.cut_after.lock().unwrap();
            if cuts.is_empty() { None } else { Some(cuts.remove(0)) }
        };

        let mut chunks: Vec<Result<Bytes, TransportError>> = Vec::new();
        let limit = cut.unwrap_or(body.len()).min(body.len());
        for piece in body[..limit].chunks(CHUNK) {
            chunks.push(Ok(Bytes::copy_from_slice(piece)));
        }
        if cut.is_some() {
            chunks.push(Err(TransportError::Body("connection reset".into())));
        }
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }
}

/// A fixed proxy list that counts how often it is fetched.
#[derive(Clone, Default)]
pub struct StaticSource {
    pub proxies: Vec<ProxyAddress>,
    pub fetches: Arc<AtomicUsize>,
}

impl StaticSource {
    pub fn new(proxies: Vec<ProxyAddress>) -> Self {
        Self {
            proxies,
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ProxySource for StaticSource {
    async fn fetch(&self) -> Vec<ProxyAddress> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.proxies.clone()
    }
}
