//! The signing capability the builder asks for an author identity.

use crate::protocol::{SIGNING_KEY_ID, SIGNING_PROTOCOL, SIGNING_SECURITY_LEVEL};
use crate::sha256;
use async_trait::async_trait;
use bitcoin::hashes::{hmac, sha256 as sha256_hash, Hash, HashEngine};
use bitcoin::secp256k1::{All, Message, Scalar, Secp256k1, SecretKey};
use bitcoin::{Address, NetworkKind, PrivateKey, PublicKey};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Signer unavailable: {0}")]
    Unavailable(String),
    #[error("Signer rejected the request: {0}")]
    Rejected(String),
    #[error("Malformed signer reply: {0}")]
    MalformedReply(String),
    #[error("Key error: {0}")]
    Key(#[from] bitcoin::secp256k1::Error),
}

/// Which key to use. Must be the same for [`Signer::public_key`] and [`Signer::sign`].
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct KeyDerivation {
    pub security_level: u8,
    pub protocol: String,
    pub key_id: String,
}

impl KeyDerivation {
    /// `(1, "schema")`, key `"1"`: what AIP signatures in posts are made with.
    pub fn schema() -> Self {
        Self {
            security_level: SIGNING_SECURITY_LEVEL,
            protocol: SIGNING_PROTOCOL.into(),
            key_id: SIGNING_KEY_ID.into(),
        }
    }

    /// `<level>-<protocol>-<key id>`
    pub fn invoice_number(&self) -> String {
        format!("{}-{}-{}", self.security_level, self.protocol, self.key_id)
    }
}

#[async_trait]
pub trait Signer: Send + Sync {
    async fn public_key(&self, derivation: &KeyDerivation) -> Result<PublicKey, SignerError>;

    /// Returns a DER-encoded signature over `preimage`.
    async fn sign(
        &self,
        preimage: &[u8],
        derivation: &KeyDerivation,
    ) -> Result<Vec<u8>, SignerError>;
}

/// P2PKH address of `public_key`, as written into the AIP segment.
pub fn aip_address(public_key: &PublicKey, network: NetworkKind) -> Address {
    Address::p2pkh(public_key.pubkey_hash(), network)
}

/// Signs with a key held in-process.
///
/// Keys are derived the way wallets do for "self" counterparties:
/// `child = root + HMAC-SHA256(compressed(root * rootPub), invoice)`.
pub struct LocalSigner {
    secp: Secp256k1<All>,
    root: SecretKey,
}

impl LocalSigner {
    pub fn new(root: SecretKey) -> Self {
        Self {
            secp: Secp256k1::new(),
            root,
        }
    }

    pub fn from_wif(wif: &str) -> Result<Self, SignerError> {
        let key = PrivateKey::from_wif(wif).map_err(|e| SignerError::Rejected(e.to_string()))?;
        Ok(Self::new(key.inner))
    }

    pub fn derive(&self, derivation: &KeyDerivation) -> Result<SecretKey, SignerError> {
        let root_public = self.root.public_key(&self.secp);
        let shared = root_public.mul_tweak(&self.secp, &Scalar::from(self.root))?;

        let mut engine = hmac::HmacEngine::<sha256_hash::Hash>::new(&shared.serialize());
        engine.input(derivation.invoice_number().as_bytes());
        let tweak = hmac::Hmac::<sha256_hash::Hash>::from_engine(engine).to_byte_array();

        let tweak = Scalar::from_be_bytes(tweak)
            .map_err(|_| SignerError::Rejected("derivation tweak out of range".into()))?;
        Ok(self.root.add_tweak(&tweak)?)
    }
}

#[async_trait]
impl Signer for LocalSigner {
    async fn public_key(&self, derivation: &KeyDerivation) -> Result<PublicKey, SignerError> {
        let child = self.derive(derivation)?;
        Ok(PublicKey::new(child.public_key(&self.secp)))
    }

    async fn sign(
        &self,
        preimage: &[u8],
        derivation: &KeyDerivation,
    ) -> Result<Vec<u8>, SignerError> {
        let child = self.derive(derivation)?;
        let message = Message::from_digest(sha256(preimage));
        Ok(self
            .secp
            .sign_ecdsa(&message, &child)
            .serialize_der()
            .to_vec())
    }
}

#[cfg(test)]
pub(crate) fn test_signer() -> LocalSigner {
    let secret = hex_literal::hex!("0000000000110011000000000000110000001100000110001111110000000011");
    LocalSigner::new(SecretKey::from_slice(&secret).unwrap())
}
