//! Builds the `OP_FALSE OP_RETURN` post output script.

use crate::error::{Error, Result};
use crate::protocol::*;
use crate::signer::{aip_address, KeyDerivation, Signer};
use crate::EncodeHex;
use bitcoin::opcodes::all::OP_RETURN;
use bitcoin::opcodes::OP_FALSE;
use bitcoin::script::PushBytes;
use bitcoin::{NetworkKind, ScriptBuf};
use log::debug;

/// Largest push `OP_PUSHDATA4` can describe.
pub const MAX_PUSH_LEN: u64 = u32::MAX as u64;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostOptions {
    pub media_type: String,
    pub encoding: String,
    pub app: String,
    pub context: Option<KeyValue>,
    pub subcontext: Option<KeyValue>,
    /// Network of the AIP address
    pub network: NetworkKind,
    pub derivation: KeyDerivation,
}

impl Default for PostOptions {
    fn default() -> Self {
        Self {
            media_type: DEFAULT_MEDIA_TYPE.into(),
            encoding: DEFAULT_ENCODING.into(),
            app: DEFAULT_APP.into(),
            context: None,
            subcontext: None,
            network: NetworkKind::Main,
            derivation: KeyDerivation::schema(),
        }
    }
}

pub fn check_push_len(len: usize) -> Result<()> {
    if len as u64 > MAX_PUSH_LEN {
        return Err(Error::PushTooLarge { len });
    }
    Ok(())
}

pub trait PushSliceExt {
    /// Pushes `data` with the shortest push opcode, failing on chunks `OP_PUSHDATA4` can't hold.
    fn push_slice_checked(&mut self, data: &[u8]) -> Result<()>;
}

impl PushSliceExt for ScriptBuf {
    fn push_slice_checked(&mut self, data: &[u8]) -> Result<()> {
        check_push_len(data.len())?;
        let push = <&PushBytes>::try_from(data).map_err(|_| Error::PushTooLarge { len: data.len() })?;
        self.push_slice(push);
        Ok(())
    }
}

/// Builds a B + MAP + AIP post script.
///
/// The AIP signature covers every byte written before the AIP segment, opcodes included.
pub async fn build_post_script<S>(
    signer: &S,
    content: &str,
    options: &PostOptions,
) -> Result<ScriptBuf>
where
    S: Signer + ?Sized,
{
    let mut script = ScriptBuf::new();
    script.push_opcode(OP_FALSE);
    script.push_opcode(OP_RETURN);

    for x in [
        B_PREFIX,
        content,
        options.media_type.as_str(),
        options.encoding.as_str(),
    ] {
        script.push_slice_checked(x.as_bytes())?;
    }

    let mut map = vec![
        MAP_PREFIX,
        MAP_SET,
        KEY_APP,
        options.app.as_str(),
        KEY_TYPE,
        TYPE_POST,
    ];
    if let Some(c) = &options.context {
        map.extend([KEY_CONTEXT, c.key.as_str(), c.value.as_str()]);
    }
    if let Some(c) = &options.subcontext {
        map.extend([KEY_SUBCONTEXT, c.key.as_str(), c.value.as_str()]);
    }
    for x in map {
        script.push_slice_checked(x.as_bytes())?;
    }

    let preimage = script.as_bytes().to_vec();
    debug!(
        "Post preimage: {} bytes (content {} bytes)",
        preimage.len(),
        content.len()
    );

    let public_key = signer.public_key(&options.derivation).await?;
    let address = aip_address(&public_key, options.network).to_string();
    let signature = signer.sign(&preimage, &options.derivation).await?;
    debug!("AIP address: {address}, signature: {}", signature.hex());

    for x in [
        AIP_PREFIX.as_bytes(),
        AIP_SCHEME_ECDSA.as_bytes(),
        address.as_bytes(),
        &signature,
    ] {
        script.push_slice_checked(x)?;
    }

    Ok(script)
}

pub async fn build_post_script_hex<S>(
    signer: &S,
    content: &str,
    options: &PostOptions,
) -> Result<String>
where
    S: Signer + ?Sized,
{
    Ok(build_post_script(signer, content, options)
        .await?
        .as_bytes()
        .hex())
}
