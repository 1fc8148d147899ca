//! Builds a post output script and prints its hex.
//!
//! Signs with `--wif` when given, otherwise with the wallet at `wallet-url`. With `--publish` the
//! wallet also funds and broadcasts it, and the txid is printed instead.

use bitcoin::NetworkKind;
use bitcoin_schema::builder::{build_post_script, KeyValue, PostOptions};
use bitcoin_schema::config::Config;
use bitcoin_schema::signer::{LocalSigner, Signer};
use bitcoin_schema::wallet::publish_post;
use bitcoin_schema::{set_up_logging, EncodeHex};
use clap::Parser;
use log::{info, LevelFilter};
use std::io::{stdin, Read};
use std::path::PathBuf;

#[derive(Parser)]
struct Args {
    /// Post content. Read from stdin if omitted.
    content: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Defaults to the configured app
    #[arg(long)]
    app: Option<String>,
    #[arg(long, default_value = bitcoin_schema::protocol::DEFAULT_MEDIA_TYPE)]
    media_type: String,
    #[arg(long, default_value = bitcoin_schema::protocol::DEFAULT_ENCODING)]
    encoding: String,
    /// `<key>=<value>`, e.g. `tx=<txid>` for a reply
    #[arg(long, value_parser = parse_key_value)]
    context: Option<KeyValue>,
    #[arg(long, value_parser = parse_key_value)]
    subcontext: Option<KeyValue>,
    /// Sign with this key instead of the wallet
    #[arg(long)]
    wif: Option<String>,
    /// Broadcast the post through the wallet
    #[arg(long, conflicts_with = "wif")]
    publish: bool,
    /// Write the AIP address in testnet form
    #[arg(long)]
    testnet: bool,
    #[arg(short, long)]
    verbose: bool,
}

fn parse_key_value(arg: &str) -> Result<KeyValue, String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected <key>=<value>, got {arg:?}"))?;
    Ok(KeyValue::new(key, value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    set_up_logging(
        if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        },
        None,
    )?;
    let config = Config::load(args.config.as_deref())?;

    let content = match args.content {
        Some(x) => x,
        None => {
            let mut buf = String::new();
            stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let options = PostOptions {
        media_type: args.media_type,
        encoding: args.encoding,
        app: args.app.unwrap_or(config.app.clone()),
        context: args.context,
        subcontext: args.subcontext,
        network: if args.testnet {
            NetworkKind::Test
        } else {
            NetworkKind::Main
        },
        ..Default::default()
    };

    if args.publish {
        let slot = config.wallet();
        let wallet = slot.connect_or_reuse().await?;
        info!("Publishing through wallet at {}", config.wallet_url);
        let published = publish_post(wallet, &content, &options).await?;
        println!("{}", published.txid);
        return Ok(());
    }

    let signer: Box<dyn Signer> = match &args.wif {
        Some(wif) => Box::new(LocalSigner::from_wif(wif)?),
        None => {
            info!("Signing with wallet at {}", config.wallet_url);
            Box::new(config.wallet())
        }
    };

    let script = build_post_script(signer.as_ref(), &content, &options).await?;
    info!("Script size: {} bytes", script.len());
    println!("{}", script.as_bytes().hex());
    Ok(())
}
