//! Looking posts up on chain through public indexer APIs.
//!
//! Each backend implements [`ChainSource`]; a [`PostIndexer`] tries them in preference order.

pub mod bitails;
pub mod bmap;
pub mod whatsonchain;

use crate::error::{Error, Result};
use crate::interpreter::{interpret, ParsedPost};
use crate::protocol::TYPE_POST;
use crate::tokenizer::tokenize;
use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

pub use bitails::Bitails;
pub use bmap::BmapApi;
pub use whatsonchain::WhatsOnChain;

pub const DEFAULT_PROBE_OUTPUTS: u32 = 6;
pub const DEFAULT_SEARCH_LIMIT: usize = 25;

/// What a backend hands back for a transaction.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Payload {
    /// Raw output script bytes
    Script(Vec<u8>),
    /// Already decoded by the backend
    Parsed(ParsedPost),
}

impl Payload {
    pub fn into_post(self) -> Option<ParsedPost> {
        match self {
            Payload::Script(script) => interpret(&tokenize(&script)),
            Payload::Parsed(post) => Some(post),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TxPayload {
    pub payload: Payload,
    /// Unix time, when the backend reports one
    pub timestamp: Option<u64>,
}

impl TxPayload {
    pub fn script(script: Vec<u8>, timestamp: Option<u64>) -> Self {
        Self {
            payload: Payload::Script(script),
            timestamp,
        }
    }
}

/// Whether `script` is an `OP_RETURN` output with at least one data push. Says nothing about
/// whether the pushes form a post.
pub fn carries_data(script: &[u8]) -> bool {
    !tokenize(script).is_empty()
}

#[async_trait]
pub trait ChainSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Full-text search over data outputs. Returns txids.
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<String>> {
        Err(Error::Unsupported {
            backend: self.name(),
            operation: "search",
        })
    }

    /// Hex of output `vout`'s script. `None` if the output doesn't exist.
    async fn fetch_script_hex(&self, _txid: &str, _vout: u32) -> Result<Option<String>> {
        Err(Error::Unsupported {
            backend: self.name(),
            operation: "output script lookup",
        })
    }

    /// How many leading outputs [`ChainSource::fetch_payload`] probes by default.
    fn probe_outputs(&self) -> u32 {
        DEFAULT_PROBE_OUTPUTS
    }

    /// Finds the data-carrying output of `txid`.
    ///
    /// The default probes outputs `0..probe_outputs()` and stops at the first missing one.
    async fn fetch_payload(&self, txid: &str) -> Result<Option<TxPayload>> {
        for vout in 0..self.probe_outputs() {
            let Some(script_hex) = self.fetch_script_hex(txid, vout).await? else {
                break;
            };
            let script = match hex::decode(script_hex.trim()) {
                Ok(x) => x,
                Err(e) => {
                    debug!("{}: {txid}:{vout}: bad script hex: {e}", self.name());
                    continue;
                }
            };
            if carries_data(&script) {
                return Ok(Some(TxPayload::script(script, None)));
            }
        }
        Ok(None)
    }
}

/// A post as listed by the indexer.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct BmapPost {
    pub txid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(flatten)]
    pub post: ParsedPost,
}

pub struct PostIndexer {
    sources: Vec<Box<dyn ChainSource>>,
}

impl PostIndexer {
    /// `sources` in preference order.
    pub fn new(sources: Vec<Box<dyn ChainSource>>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|x| x.name())
    }

    pub fn search_query(app: &str) -> String {
        format!("MAP SET app {app} type {TYPE_POST}")
    }

    /// Txids of posts published under `app`. The first backend that can search and succeeds wins.
    pub async fn search_posts(&self, app: &str, limit: usize) -> Result<Vec<String>> {
        let query = Self::search_query(app);
        let mut last_error = None;
        for source in &self.sources {
            match source.search(&query, limit).await {
                Ok(txids) => {
                    debug!("{}: {} results for {query:?}", source.name(), txids.len());
                    return Ok(txids);
                }
                Err(e @ Error::Unsupported { .. }) => debug!("{e}"),
                Err(e) => {
                    warn!("{}: search failed: {e}", source.name());
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(Error::Unsupported {
            backend: "configured backends",
            operation: "search",
        }))
    }

    /// Backends are tried in order; failures and misses fall through to the next one.
    pub async fn fetch_post(&self, txid: &str) -> Option<BmapPost> {
        for source in &self.sources {
            match source.fetch_payload(txid).await {
                Ok(Some(tx)) => {
                    let timestamp = tx.timestamp;
                    if let Some(post) = tx.payload.into_post() {
                        return Some(BmapPost {
                            txid: txid.to_owned(),
                            timestamp,
                            post,
                        });
                    }
                    debug!("{}: {txid}: payload has no post", source.name());
                }
                Ok(None) => debug!("{}: {txid}: no post output", source.name()),
                Err(e) => warn!("{}: {txid}: {e}", source.name()),
            }
        }
        debug!("{txid}: not found on any backend");
        None
    }

    /// Fetches concurrently. Misses are dropped; the rest keep the order of `txids`.
    pub async fn fetch_posts<T: AsRef<str>>(&self, txids: &[T]) -> Vec<BmapPost> {
        join_all(txids.iter().map(|x| self.fetch_post(x.as_ref())))
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}

/// `Ok(None)` for a 404, the response otherwise. Other error statuses fail.
pub(crate) async fn get_found(
    client: &reqwest::Client,
    url: &str,
) -> Result<Option<reqwest::Response>> {
    debug!("GET {url}");
    let response = client.get(url).send().await?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    Ok(Some(response.error_for_status()?))
}
