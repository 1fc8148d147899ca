use super::{get_found, ChainSource, DEFAULT_PROBE_OUTPUTS};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

pub const DEFAULT_URL: &str = "https://api.bitails.io";

#[derive(Deserialize, Debug, Default)]
pub struct SearchReply {
    #[serde(default)]
    pub ops: OpsResults,
}

#[derive(Deserialize, Debug, Default)]
pub struct OpsResults {
    #[serde(default)]
    pub results: Vec<OpsResult>,
}

#[derive(Deserialize, Debug)]
pub struct OpsResult {
    pub txid: String,
}

impl SearchReply {
    pub fn into_txids(self) -> Vec<String> {
        self.ops.results.into_iter().map(|x| x.txid).collect()
    }
}

/// Bitails: data search, and per-output script downloads.
pub struct Bitails {
    client: Client,
    base_url: String,
    probe_outputs: u32,
}

impl Bitails {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            probe_outputs: DEFAULT_PROBE_OUTPUTS,
        }
    }

    pub fn with_probe_outputs(mut self, n: u32) -> Self {
        self.probe_outputs = n;
        self
    }
}

#[async_trait]
impl ChainSource for Bitails {
    fn name(&self) -> &'static str {
        "bitails"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let url = format!("{}/search", self.base_url);
        let limit = limit.to_string();
        let reply: SearchReply = self
            .client
            .get(&url)
            .query(&[("q", query), ("type", "ops"), ("limit", limit.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(reply.into_txids())
    }

    async fn fetch_script_hex(&self, txid: &str, vout: u32) -> Result<Option<String>> {
        let url = format!("{}/download/tx/{txid}/output/{vout}/hex", self.base_url);
        let Some(response) = get_found(&self.client, &url).await? else {
            return Ok(None);
        };
        let text = response.text().await?;
        let text = text.trim().trim_matches('"');
        Ok((!text.is_empty()).then(|| text.to_owned()))
    }

    fn probe_outputs(&self) -> u32 {
        self.probe_outputs
    }
}
