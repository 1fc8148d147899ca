//! Tool configuration: an optional JSON file, then `BITCOIN_SCHEMA_*` environment overrides.

use crate::chain::{
    bitails, bmap, whatsonchain, Bitails, BmapApi, ChainSource, PostIndexer, WhatsOnChain,
    DEFAULT_PROBE_OUTPUTS, DEFAULT_SEARCH_LIMIT,
};
use crate::error::{Error, Result};
use crate::protocol::DEFAULT_APP;
use crate::wallet::{WalletSlot, DEFAULT_WALLET_URL};
use log::debug;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

pub const ENV_PREFIX: &str = "BITCOIN_SCHEMA_";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    WhatsOnChain,
    Bitails,
    Bmap,
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whatsonchain" | "woc" => Ok(Backend::WhatsOnChain),
            "bitails" => Ok(Backend::Bitails),
            "bmap" => Ok(Backend::Bmap),
            x => Err(Error::Config(format!("Unknown backend: {x:?}"))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub app: String,
    /// Preference order
    pub backends: Vec<Backend>,
    pub whatsonchain_url: String,
    pub bitails_url: String,
    pub bmap_url: String,
    pub wallet_url: String,
    pub probe_outputs: u32,
    pub search_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: DEFAULT_APP.into(),
            backends: vec![Backend::WhatsOnChain, Backend::Bitails],
            whatsonchain_url: whatsonchain::DEFAULT_URL.into(),
            bitails_url: bitails::DEFAULT_URL.into(),
            bmap_url: bmap::DEFAULT_URL.into(),
            wallet_url: DEFAULT_WALLET_URL.into(),
            probe_outputs: DEFAULT_PROBE_OUTPUTS,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{ENV_PREFIX}{name}={value:?}: {e}")))
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                let reader = BufReader::new(File::open(path)?);
                serde_json::from_reader(reader)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|name| env::var(format!("{ENV_PREFIX}{name}")).ok())?;
        Ok(config)
    }

    /// `var` maps a variable name without the prefix (`APP`, `BACKENDS`, ...) to its value.
    pub fn apply_overrides<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(x) = var("APP") {
            self.app = x;
        }
        if let Some(x) = var("BACKENDS") {
            self.backends = x
                .split(',')
                .filter(|x| !x.trim().is_empty())
                .map(Backend::from_str)
                .collect::<Result<_>>()?;
        }
        if let Some(x) = var("WHATSONCHAIN_URL") {
            self.whatsonchain_url = x;
        }
        if let Some(x) = var("BITAILS_URL") {
            self.bitails_url = x;
        }
        if let Some(x) = var("BMAP_URL") {
            self.bmap_url = x;
        }
        if let Some(x) = var("WALLET_URL") {
            self.wallet_url = x;
        }
        if let Some(x) = var("PROBE_OUTPUTS") {
            self.probe_outputs = parse("PROBE_OUTPUTS", &x)?;
        }
        if let Some(x) = var("SEARCH_LIMIT") {
            self.search_limit = parse("SEARCH_LIMIT", &x)?;
        }
        Ok(())
    }

    /// One shared HTTP client for every configured backend.
    pub fn indexer(&self) -> PostIndexer {
        let client = reqwest::Client::new();
        let sources = self
            .backends
            .iter()
            .map(|backend| -> Box<dyn ChainSource> {
                match backend {
                    Backend::WhatsOnChain => {
                        Box::new(WhatsOnChain::new(client.clone(), &self.whatsonchain_url))
                    }
                    Backend::Bitails => Box::new(
                        Bitails::new(client.clone(), &self.bitails_url)
                            .with_probe_outputs(self.probe_outputs),
                    ),
                    Backend::Bmap => Box::new(BmapApi::new(client.clone(), &self.bmap_url)),
                }
            })
            .collect();
        PostIndexer::new(sources)
    }

    pub fn wallet(&self) -> WalletSlot {
        WalletSlot::new(&self.wallet_url, reqwest::Client::new())
    }
}
