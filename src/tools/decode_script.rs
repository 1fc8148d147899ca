//! Decodes a post output script: lists its pushes, then prints the post as JSON.

use bitcoin_schema::interpreter::interpret;
use bitcoin_schema::set_up_logging;
use bitcoin_schema::tokenizer::tokenize_detailed;
use clap::Parser;
use log::LevelFilter;
use pretty_hex::PrettyHex;
use std::io::{stdin, Read};

#[derive(Parser)]
struct Args {
    /// Script hex. Read from stdin if omitted.
    script: Option<String>,
    /// Print only the JSON
    #[arg(long)]
    json: bool,
    #[arg(short, long)]
    verbose: bool,
}

fn printable(push: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(push).ok()?;
    (!text.chars().any(|c| c.is_control() && c != '\n')).then_some(text)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    set_up_logging(
        if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        },
        None,
    )?;

    let script_hex = match args.script {
        Some(x) => x,
        None => {
            let mut buf = String::new();
            stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let script_hex = script_hex.trim();
    let script = hex::decode(script_hex.strip_prefix("0x").unwrap_or(script_hex))?;

    let tokenized = tokenize_detailed(&script);
    if !args.json {
        for (i, push) in tokenized.pushes.iter().enumerate() {
            match printable(push) {
                Some(text) => println!("#{i} ({} bytes): {text}", push.len()),
                None => println!("#{i} ({} bytes):\n{:?}", push.len(), push.hex_dump()),
            }
        }
        if tokenized.truncated {
            println!("(truncated)");
        }
        if let Some(reason) = tokenized.stopped_at {
            println!("Stopped: {reason:?}");
        }
        println!();
    }

    match interpret(&tokenized.pushes) {
        Some(post) => println!("{}", serde_json::to_string_pretty(&post)?),
        None => println!("null"),
    }
    Ok(())
}
