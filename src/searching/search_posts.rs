//! Searches posts published under an app and fetches them.
//!
//! Prints them as text, or as CSV with `--csv`.

use bitcoin_schema::chain::BmapPost;
use bitcoin_schema::config::Config;
use bitcoin_schema::set_up_logging;
use chrono::{TimeZone, Utc};
use clap::Parser;
use log::{info, LevelFilter};
use std::io::stdout;
use std::path::PathBuf;

#[derive(Parser)]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Defaults to the configured app
    #[arg(long)]
    app: Option<String>,
    /// Defaults to the configured search limit
    #[arg(short, long)]
    limit: Option<usize>,
    /// Fetch these txids instead of searching
    #[arg(long, num_args = 1..)]
    txid: Vec<String>,
    /// Write CSV to this file (`-` for stdout)
    #[arg(long)]
    csv: Option<PathBuf>,
    #[arg(long)]
    log_file: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
}

fn format_time(timestamp: Option<u64>) -> String {
    timestamp
        .and_then(|x| Utc.timestamp_opt(x as i64, 0).single())
        .map(|x| x.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unconfirmed".into())
}

fn write_csv<W: std::io::Write>(writer: W, posts: &[BmapPost]) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["txid", "time", "app", "type", "author", "media_type", "content"])?;
    for p in posts {
        let time = format_time(p.timestamp);
        csv.write_record([
            p.txid.as_str(),
            time.as_str(),
            p.post.app.as_deref().unwrap_or_default(),
            p.post.post_type().unwrap_or_default(),
            p.post.author.as_deref().unwrap_or_default(),
            p.post.media_type.as_deref().unwrap_or_default(),
            p.post.content.as_deref().unwrap_or_default(),
        ])?;
    }
    csv.flush()?;
    Ok(())
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
        args.log_file.as_deref(),
    )?;
    let config = Config::load(args.config.as_deref())?;
    let indexer = config.indexer();
    info!(
        "Backends: {}",
        indexer.sources().collect::<Vec<_>>().join(", ")
    );

    let txids = if args.txid.is_empty() {
        let app = args.app.as_deref().unwrap_or(&config.app);
        let limit = args.limit.unwrap_or(config.search_limit);
        let txids = indexer.search_posts(app, limit).await?;
        info!("Found {} posts for {app}", txids.len());
        txids
    } else {
        args.txid
    };

    let posts = indexer.fetch_posts(&txids).await;
    info!("Fetched {}/{}", posts.len(), txids.len());

    match args.csv {
        Some(path) if path.as_os_str() == "-" => write_csv(stdout(), &posts)?,
        Some(path) => write_csv(std::fs::File::create(path)?, &posts)?,
        None => {
            for p in &posts {
                println!(
                    "{} [{}] {}",
                    format_time(p.timestamp),
                    p.post.author.as_deref().unwrap_or("anonymous"),
                    p.txid
                );
                println!("{}\n", p.post.content.as_deref().unwrap_or_default());
            }
        }
    }
    Ok(())
}
