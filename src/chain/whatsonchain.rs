use super::{carries_data, get_found, ChainSource, TxPayload};
use crate::error::Result;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;

pub const DEFAULT_URL: &str = "https://api.whatsonchain.com/v1/bsv/main";

#[derive(Deserialize, Debug, Default)]
pub struct Tx {
    #[serde(default)]
    pub txid: String,
    /// Block time; absent for unconfirmed transactions
    pub time: Option<u64>,
    #[serde(default)]
    pub vout: Vec<Output>,
}

#[derive(Deserialize, Debug, Default)]
pub struct Output {
    pub n: Option<u32>,
    #[serde(rename = "scriptPubKey", default)]
    pub script_pub_key: ScriptPubKey,
}

#[derive(Deserialize, Debug, Default)]
pub struct ScriptPubKey {
    #[serde(default)]
    pub hex: String,
    #[serde(default)]
    pub asm: String,
}

impl ScriptPubKey {
    pub fn is_data_carrying(&self) -> bool {
        self.asm.starts_with("OP_FALSE OP_RETURN")
            || self.asm.starts_with("OP_RETURN")
            || self.asm.starts_with("0 OP_RETURN")
            || self.hex.starts_with("006a")
            || self.hex.starts_with("6a")
    }
}

impl Tx {
    /// The first data-carrying output with a script.
    pub fn data_output(&self) -> Option<&ScriptPubKey> {
        self.vout
            .iter()
            .map(|x| &x.script_pub_key)
            .find(|x| x.is_data_carrying() && !x.hex.is_empty())
    }
}

/// WhatsOnChain returns whole decoded transactions, so one request covers every output. It has no
/// data search.
pub struct WhatsOnChain {
    client: Client,
    base_url: String,
}

impl WhatsOnChain {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn fetch_tx(&self, txid: &str) -> Result<Option<Tx>> {
        let url = format!("{}/tx/hash/{txid}", self.base_url);
        match get_found(&self.client, &url).await? {
            Some(response) => Ok(Some(response.json().await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ChainSource for WhatsOnChain {
    fn name(&self) -> &'static str {
        "whatsonchain"
    }

    async fn fetch_script_hex(&self, txid: &str, vout: u32) -> Result<Option<String>> {
        let Some(tx) = self.fetch_tx(txid).await? else {
            return Ok(None);
        };
        Ok(tx
            .vout
            .into_iter()
            .enumerate()
            .find(|(i, x)| x.n.unwrap_or(*i as u32) == vout)
            .map(|(_, x)| x.script_pub_key.hex))
    }

    async fn fetch_payload(&self, txid: &str) -> Result<Option<TxPayload>> {
        let Some(tx) = self.fetch_tx(txid).await? else {
            return Ok(None);
        };
        let Some(output) = tx.data_output() else {
            debug!("whatsonchain: {txid} has no data output");
            return Ok(None);
        };
        let script = hex::decode(&output.hex)?;
        if !carries_data(&script) {
            return Ok(None);
        }
        Ok(Some(TxPayload::script(script, tx.time)))
    }
}
