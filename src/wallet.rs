//! [`Signer`] backed by a wallet speaking the JSON-over-HTTP wallet interface, and publishing
//! posts through the same wallet.

use crate::builder::{build_post_script, PostOptions};
use crate::signer::{KeyDerivation, Signer, SignerError};
use crate::EncodeHex;
use async_trait::async_trait;
use bitcoin::{consensus, PublicKey, Script, Transaction, Txid};
use log::{debug, info};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tokio::sync::OnceCell;

pub const DEFAULT_WALLET_URL: &str = "http://localhost:3321";
/// Value of the post output
pub const POST_SATOSHIS: u64 = 1;
pub const POST_ACTION_DESCRIPTION: &str = "Post to BitcoinSchema";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct KeyArgs<'a> {
    #[serde(rename = "protocolID")]
    protocol_id: (u8, &'a str),
    #[serde(rename = "keyID")]
    key_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a [u8]>,
}

impl<'a> KeyArgs<'a> {
    fn new(derivation: &'a KeyDerivation, data: Option<&'a [u8]>) -> Self {
        Self {
            protocol_id: (derivation.security_level, &derivation.protocol),
            key_id: &derivation.key_id,
            data,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct VersionReply {
    pub version: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyReply {
    /// Hex-encoded compressed key
    pub public_key: String,
}

/// Wallets disagree on how a signature comes back.
#[derive(Deserialize, Debug, Eq, PartialEq)]
#[serde(untagged)]
pub enum SignatureReply {
    Bytes(Vec<u8>),
    Wrapped { signature: Vec<u8> },
    Hex(String),
}

impl SignatureReply {
    pub fn into_bytes(self) -> Result<Vec<u8>, SignerError> {
        match self {
            SignatureReply::Bytes(x) | SignatureReply::Wrapped { signature: x } => Ok(x),
            SignatureReply::Hex(x) => {
                hex::decode(x).map_err(|e| SignerError::MalformedReply(e.to_string()))
            }
        }
    }
}

#[derive(Serialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutput {
    pub satoshis: u64,
    /// Script hex
    pub locking_script: String,
    pub output_description: String,
}

/// `createAction` arguments: a transaction the wallet funds and signs.
#[derive(Serialize, Debug, Clone, Eq, PartialEq)]
pub struct ActionArgs {
    pub description: String,
    pub outputs: Vec<ActionOutput>,
}

impl ActionArgs {
    /// One output carrying `script`.
    pub fn post(script: &Script) -> Self {
        Self {
            description: POST_ACTION_DESCRIPTION.into(),
            outputs: vec![ActionOutput {
                satoshis: POST_SATOSHIS,
                locking_script: script.as_bytes().hex(),
                output_description: "Output".into(),
            }],
        }
    }
}

#[derive(Deserialize, Debug, Eq, PartialEq)]
#[serde(untagged)]
pub enum TxBytes {
    Bytes(Vec<u8>),
    Hex(String),
}

#[derive(Deserialize, Debug, Default)]
pub struct CreateActionReply {
    pub txid: Option<String>,
    #[serde(alias = "rawTx")]
    pub tx: Option<TxBytes>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Published {
    pub txid: Txid,
    /// Serialized transaction, when the wallet returned it
    pub raw_tx: Option<Vec<u8>>,
}

impl CreateActionReply {
    /// The txid is taken as given, or computed from the returned transaction.
    pub fn into_published(self) -> Result<Published, SignerError> {
        let malformed = |e: String| SignerError::MalformedReply(format!("createAction: {e}"));
        let raw_tx = match self.tx {
            Some(TxBytes::Bytes(x)) => Some(x),
            Some(TxBytes::Hex(x)) => Some(hex::decode(x).map_err(|e| malformed(e.to_string()))?),
            None => None,
        };
        let txid = match (self.txid, &raw_tx) {
            (Some(txid), _) => Txid::from_str(&txid).map_err(|e| malformed(e.to_string()))?,
            (None, Some(raw)) => consensus::deserialize::<Transaction>(raw)
                .map_err(|e| malformed(e.to_string()))?
                .compute_txid(),
            (None, None) => return Err(malformed("no txid".into())),
        };
        Ok(Published { txid, raw_tx })
    }
}

#[derive(Debug, Clone)]
pub struct WalletClient {
    client: Client,
    base_url: String,
    version: String,
}

impl WalletClient {
    /// Connects to the wallet at `base_url` and checks it answers.
    pub async fn connect(base_url: impl Into<String>, client: Client) -> Result<Self, SignerError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let mut wallet = Self {
            client,
            base_url,
            version: String::new(),
        };
        let reply: VersionReply = wallet.call("getVersion", &serde_json::json!({})).await?;
        info!("Connected to wallet {} ({})", wallet.base_url, reply.version);
        wallet.version = reply.version;
        Ok(wallet)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub async fn create_action(&self, args: &ActionArgs) -> Result<Published, SignerError> {
        let reply: CreateActionReply = self.call("createAction", args).await?;
        reply.into_published()
    }

    async fn call<A, R>(&self, method: &str, args: &A) -> Result<R, SignerError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, method);
        debug!("Wallet call: {url}");
        let response = self
            .client
            .post(&url)
            .json(args)
            .send()
            .await
            .map_err(|e| SignerError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SignerError::Unavailable(e.to_string()))?;
        if !status.is_success() {
            return Err(SignerError::Rejected(format!("{method}: {status}: {body}")));
        }
        serde_json::from_str(&body).map_err(|e| SignerError::MalformedReply(format!("{method}: {e}")))
    }
}

#[async_trait]
impl Signer for WalletClient {
    async fn public_key(&self, derivation: &KeyDerivation) -> Result<PublicKey, SignerError> {
        let reply: PublicKeyReply = self
            .call("getPublicKey", &KeyArgs::new(derivation, None))
            .await?;
        PublicKey::from_str(&reply.public_key)
            .map_err(|e| SignerError::MalformedReply(format!("public key: {e}")))
    }

    async fn sign(
        &self,
        preimage: &[u8],
        derivation: &KeyDerivation,
    ) -> Result<Vec<u8>, SignerError> {
        let reply: SignatureReply = self
            .call("createSignature", &KeyArgs::new(derivation, Some(preimage)))
            .await?;
        reply.into_bytes()
    }
}

/// Builds a post signed by `wallet` and has the wallet broadcast it in a
/// [`POST_SATOSHIS`]-valued output.
pub async fn publish_post(
    wallet: &WalletClient,
    content: &str,
    options: &PostOptions,
) -> crate::Result<Published> {
    let script = build_post_script(wallet, content, options).await?;
    let published = wallet.create_action(&ActionArgs::post(&script)).await?;
    info!("Published post {}", published.txid);
    Ok(published)
}

/// Lazily connected wallet. A failed connection leaves the slot empty, so the next call retries.
#[derive(Debug)]
pub struct WalletSlot {
    client: Client,
    base_url: String,
    wallet: OnceCell<WalletClient>,
}

impl WalletSlot {
    pub fn new(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            wallet: OnceCell::new(),
        }
    }

    pub async fn connect_or_reuse(&self) -> Result<&WalletClient, SignerError> {
        self.wallet
            .get_or_try_init(|| WalletClient::connect(self.base_url.clone(), self.client.clone()))
            .await
    }

    pub fn is_connected(&self) -> bool {
        self.wallet.initialized()
    }
}

#[async_trait]
impl Signer for WalletSlot {
    async fn public_key(&self, derivation: &KeyDerivation) -> Result<PublicKey, SignerError> {
        self.connect_or_reuse().await?.public_key(derivation).await
    }

    async fn sign(
        &self,
        preimage: &[u8],
        derivation: &KeyDerivation,
    ) -> Result<Vec<u8>, SignerError> {
        self.connect_or_reuse().await?.sign(preimage, derivation).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::interpreter::interpret;
    use crate::signer::{aip_address, test_signer};
    use crate::test_server::{client, serve, TestServer};
    use crate::tokenizer::tokenize_hex;
    use bitcoin::secp256k1::Secp256k1;
    use bitcoin::transaction::Version;
    use bitcoin::{absolute, Amount, NetworkKind, ScriptBuf, TxIn, TxOut};
    use serde_json::json;

    const TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

    fn signer_public_key() -> PublicKey {
        let child = test_signer().derive(&KeyDerivation::schema()).unwrap();
        PublicKey::new(child.public_key(&Secp256k1::new()))
    }

    /// Answers every wallet call; `getPublicKey` fails with 500 when `reject_keys`.
    async fn stub_wallet(reject_keys: bool) -> TestServer {
        let public_key = signer_public_key().to_string();
        serve(move |r| match r.path.as_str() {
            "/getVersion" => (200, r#"{"version": "stub-1.0"}"#.into()),
            "/getPublicKey" if reject_keys => (500, r#"{"message": "denied"}"#.into()),
            "/getPublicKey" => (200, json!({ "publicKey": public_key }).to_string()),
            "/createSignature" => (200, "[48, 6, 2, 1, 1, 2, 1, 1]".into()),
            "/createAction" => (200, json!({ "txid": TXID }).to_string()),
            _ => (404, "{}".into()),
        })
        .await
    }

    #[test]
    fn signature_reply_shapes() {
        let parse = |json: &str| {
            serde_json::from_str::<SignatureReply>(json)
                .unwrap()
                .into_bytes()
                .unwrap()
        };
        assert_eq!(parse("[48, 69, 2]"), vec![48, 69, 2]);
        assert_eq!(parse(r#"{"signature": [48, 69, 2]}"#), vec![48, 69, 2]);
        assert_eq!(parse(r#""304502""#), vec![48, 69, 2]);

        let bad = serde_json::from_str::<SignatureReply>(r#""3045zz""#).unwrap();
        assert!(matches!(bad.into_bytes(), Err(SignerError::MalformedReply(_))));
        assert!(serde_json::from_str::<SignatureReply>(r#"{"sig": 1}"#).is_err());
    }

    #[test]
    fn public_key_reply() {
        let reply: PublicKeyReply = serde_json::from_str(
            r#"{"publicKey": "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"}"#,
        )
        .unwrap();
        assert!(PublicKey::from_str(&reply.public_key).unwrap().compressed);
    }

    #[test]
    fn request_body() {
        let derivation = KeyDerivation::schema();
        let body = serde_json::to_value(KeyArgs::new(&derivation, None)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "protocolID": [1, "schema"], "keyID": "1" })
        );

        let body = serde_json::to_value(KeyArgs::new(&derivation, Some(&[1, 2]))).unwrap();
        assert_eq!(body["data"], serde_json::json!([1, 2]));
    }

    #[tokio::test]
    async fn unreachable_wallet() {
        // nothing listens on port 1
        let slot = WalletSlot::new("http://127.0.0.1:1", client());
        let result = slot.public_key(&KeyDerivation::schema()).await;
        assert!(matches!(result, Err(SignerError::Unavailable(_))));
        assert!(!slot.is_connected());
    }

    #[tokio::test]
    async fn slot_connects_once() {
        let server = stub_wallet(false).await;
        let slot = WalletSlot::new(&server.url, client());
        let a = slot.connect_or_reuse().await.unwrap();
        let b = slot.connect_or_reuse().await.unwrap();
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.version(), "stub-1.0");
        assert!(slot.is_connected());

        let derivation = KeyDerivation::schema();
        assert_eq!(slot.public_key(&derivation).await.unwrap(), signer_public_key());
        assert_eq!(
            slot.sign(b"preimage", &derivation).await.unwrap(),
            [48, 6, 2, 1, 1, 2, 1, 1]
        );
        assert_eq!(server.count("/getVersion"), 1);

        let requests = server.requests();
        let sign = requests
            .iter()
            .find(|x| x.path == "/createSignature")
            .unwrap();
        assert_eq!(sign.method, "POST");
        let body = sign.json();
        assert_eq!(body["data"], json!(b"preimage".to_vec()));
        assert_eq!(body["protocolID"], json!([1, "schema"]));
        assert_eq!(body["keyID"], "1");
    }

    #[tokio::test]
    async fn error_status_is_rejected() {
        let server = stub_wallet(true).await;
        let wallet = WalletClient::connect(&server.url, client()).await.unwrap();
        let result = wallet.public_key(&KeyDerivation::schema()).await;
        assert!(matches!(result, Err(SignerError::Rejected(_))));

        // a 404 from a wallet without the call is a rejection too
        let result = wallet.call::<_, VersionReply>("listOutputs", &json!({})).await;
        assert!(matches!(result, Err(SignerError::Rejected(_))));
    }

    #[test]
    fn action_request_body() {
        let script = ScriptBuf::from_bytes(vec![0x00, 0x6a, 0x01, 0x61]);
        let body = serde_json::to_value(ActionArgs::post(&script)).unwrap();
        assert_eq!(
            body,
            json!({
                "description": "Post to BitcoinSchema",
                "outputs": [{
                    "satoshis": 1,
                    "lockingScript": "006a0161",
                    "outputDescription": "Output"
                }]
            })
        );
    }

    #[test]
    fn action_reply_shapes() {
        let parse = |json: &str| {
            serde_json::from_str::<CreateActionReply>(json)
                .unwrap()
                .into_published()
        };
        let published = parse(&json!({ "txid": TXID }).to_string()).unwrap();
        assert_eq!(published.txid.to_string(), TXID);
        assert_eq!(published.raw_tx, None);

        let tx = Transaction {
            version: Version::ONE,
            lock_time: absolute::LockTime::ZERO,
            input: vec![TxIn::default()],
            output: vec![TxOut {
                value: Amount::from_sat(1),
                script_pubkey: ScriptBuf::from_bytes(vec![0x00, 0x6a, 0x01, 0x61]),
            }],
        };
        let raw = consensus::serialize(&tx);
        let published = parse(&json!({ "rawTx": hex::encode(&raw) }).to_string()).unwrap();
        assert_eq!(published.txid, tx.compute_txid());
        assert_eq!(published.raw_tx.as_ref(), Some(&raw));
        let published = parse(&json!({ "tx": raw }).to_string()).unwrap();
        assert_eq!(published.txid, tx.compute_txid());

        assert!(matches!(parse("{}"), Err(SignerError::MalformedReply(_))));
        assert!(matches!(
            parse(r#"{"txid": "xyz"}"#),
            Err(SignerError::MalformedReply(_))
        ));
        assert!(matches!(
            parse(r#"{"tx": "0011"}"#),
            Err(SignerError::MalformedReply(_))
        ));
    }

    #[tokio::test]
    async fn publish() {
        let server = stub_wallet(false).await;
        let wallet = WalletClient::connect(&server.url, client()).await.unwrap();
        let published = publish_post(&wallet, "hello", &PostOptions::default())
            .await
            .unwrap();
        assert_eq!(published.txid.to_string(), TXID);

        let requests = server.requests();
        let action = requests
            .iter()
            .find(|x| x.path == "/createAction")
            .unwrap()
            .json();
        assert_eq!(action["description"], "Post to BitcoinSchema");
        assert_eq!(action["outputs"][0]["satoshis"], 1);
        let script = action["outputs"][0]["lockingScript"].as_str().unwrap();
        assert!(script.starts_with("006a22"));

        let post = interpret(&tokenize_hex(script)).unwrap();
        assert_eq!(post.content.as_deref(), Some("hello"));
        assert_eq!(
            post.author,
            Some(aip_address(&signer_public_key(), NetworkKind::Main).to_string())
        );
        assert_eq!(post.identity.unwrap().signature, [48, 6, 2, 1, 1, 2, 1, 1]);
    }
}
