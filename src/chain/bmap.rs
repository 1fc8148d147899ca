use super::{get_found, ChainSource, Payload, TxPayload};
use crate::error::Result;
use crate::interpreter::{IdentityRecord, MetadataRecord, ParsedPost};
use crate::protocol::{KEY_APP, KEY_CONTEXT, KEY_SUBCONTEXT};
use async_trait::async_trait;
use bitcoin::base64::engine::general_purpose::STANDARD;
use bitcoin::base64::Engine;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};

pub const DEFAULT_URL: &str = "https://b.map.sv";

#[derive(Deserialize, Debug, Default)]
pub struct Block {
    pub t: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
pub struct BRecord {
    pub content: Option<String>,
    #[serde(rename = "content-type")]
    pub content_type: Option<String>,
    pub encoding: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct AipRecord {
    pub algorithm: Option<String>,
    pub address: Option<String>,
    /// Base64
    pub signature: Option<String>,
}

/// A transaction as the BMAP API returns it: protocol segments already split into fields.
#[derive(Deserialize, Debug, Default)]
pub struct BmapTx {
    #[serde(default)]
    pub blk: Option<Block>,
    #[serde(rename = "B", default)]
    pub b: Vec<BRecord>,
    #[serde(rename = "MAP", default)]
    pub map: Vec<Map<String, Value>>,
    #[serde(rename = "AIP", default)]
    pub aip: Vec<AipRecord>,
}

impl BmapTx {
    pub fn timestamp(&self) -> Option<u64> {
        self.blk.as_ref()?.t
    }

    /// `None` when the transaction has none of the three segments.
    pub fn into_post(self) -> Option<ParsedPost> {
        if self.b.is_empty() && self.map.is_empty() && self.aip.is_empty() {
            return None;
        }
        let mut post = ParsedPost::default();

        if let Some(b) = self.b.into_iter().last() {
            post.content = b.content;
            post.media_type = b.content_type;
            post.encoding = b.encoding;
        }

        if let Some(map) = self.map.into_iter().last() {
            let record = metadata(map);
            post.app = record.get(KEY_APP).map(str::to_owned);
            post.metadata = Some(record);
        }

        if let Some(aip) = self.aip.into_iter().last() {
            post.author = aip.address.clone();
            if let (Some(scheme), Some(address), Some(signature)) =
                (aip.algorithm, aip.address, aip.signature)
            {
                let signature = STANDARD.decode(&signature).unwrap_or_else(|e| {
                    debug!("bmap: bad AIP signature {signature:?}: {e}");
                    Vec::new()
                });
                post.identity = Some(IdentityRecord {
                    scheme,
                    address,
                    signature,
                });
            }
        }

        Some(post)
    }
}

/// Rebuilds a MAP record from its object form. `context`/`subcontext` name the key holding their
/// value, so they go back into the token stream as `<name> <key> <value>`.
fn metadata(map: Map<String, Value>) -> MetadataRecord {
    let mut record = MetadataRecord::default();
    let mut fields = Vec::new();
    for (key, value) in map {
        let Value::String(value) = value else {
            continue;
        };
        if key == "cmd" {
            record.operation = Some(value);
        } else {
            fields.push((key, value));
        }
    }

    let lookup = |key: &str| {
        fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };
    let mut referenced = Vec::new();
    for name in [KEY_CONTEXT, KEY_SUBCONTEXT] {
        let Some(key) = lookup(name) else {
            continue;
        };
        let value = lookup(&key).unwrap_or_default();
        record.tokens.extend([name.to_owned(), key.clone(), value]);
        referenced.extend([name.to_owned(), key]);
    }
    for (key, value) in &fields {
        if !referenced.contains(key) {
            record.tokens.extend([key.clone(), value.clone()]);
        }
    }

    record.pairs = fields;
    record
}

/// A BMAP indexer API. Posts come back decoded; no search, no raw scripts.
pub struct BmapApi {
    client: Client,
    base_url: String,
}

impl BmapApi {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChainSource for BmapApi {
    fn name(&self) -> &'static str {
        "bmap"
    }

    async fn fetch_payload(&self, txid: &str) -> Result<Option<TxPayload>> {
        let url = format!("{}/tx/{txid}", self.base_url);
        let Some(response) = get_found(&self.client, &url).await? else {
            return Ok(None);
        };
        let tx: BmapTx = response.json().await?;
        let timestamp = tx.timestamp();
        Ok(tx.into_post().map(|post| TxPayload {
            payload: Payload::Parsed(post),
            timestamp,
        }))
    }
}
