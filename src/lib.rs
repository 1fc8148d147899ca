//! Build and read social posts carried in Bitcoin `OP_FALSE OP_RETURN` outputs, using the
//! B (content), MAP (metadata) and AIP (author identity) protocols.

pub mod builder;
pub mod chain;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod protocol;
pub mod signer;
pub mod tokenizer;
pub mod wallet;

#[cfg(test)]
mod test_server;

use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;

pub use builder::{build_post_script, build_post_script_hex, KeyValue, PostOptions};
pub use error::{Error, Result};
pub use interpreter::{interpret, ParsedPost};
pub use signer::{KeyDerivation, LocalSigner, Signer, SignerError};
pub use tokenizer::{tokenize, tokenize_hex};

#[inline]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub trait EncodeHex {
    fn hex(&self) -> String;
}

impl<A> EncodeHex for A
where
    A: AsRef<[u8]>,
{
    fn hex(&self) -> String {
        hex::encode(self)
    }
}

/// Logs to stderr, and also to `file` if given. Stdout is left for tool output.
pub fn set_up_logging(level: log::LevelFilter, file: Option<&Path>) -> anyhow::Result<()> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(io::stderr());
    if let Some(file) = file {
        dispatch = dispatch.chain(fern::log_file(file)?);
    }
    dispatch.apply()?;
    Ok(())
}
