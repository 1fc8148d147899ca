//! Reads B / MAP / AIP records out of a push sequence.
//!
//! This is a single left-to-right pass. The three segments share one flat token stream, so each
//! one is recognized by its marker and then consumes its own number of following tokens. Missing
//! or malformed segments only leave fields empty.
//!
//! When a segment shows up more than once, the last occurrence wins.

use crate::protocol::{
    is_marker, Segment, KEY_APP, KEY_CONTEXT, KEY_SUBCONTEXT, KEY_TYPE, MAP_SET,
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub content: String,
    pub media_type: String,
    pub encoding: String,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// `SET` for everything this crate writes
    pub operation: Option<String>,
    pub pairs: Vec<(String, String)>,
    /// Every token of the segment after the operation, in order, including a dangling last key.
    pub tokens: Vec<String>,
}

impl MetadataRecord {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `context` and `subcontext` are written as `<name> <key> <value>`, everything else as
    /// `<key> <value>`. Walks the flat tokens with that layout so a value that happens to read
    /// `context` is never taken for the name.
    fn triple(&self, name: &str) -> Option<(&str, &str)> {
        let mut i = 0;
        while let Some(token) = self.tokens.get(i) {
            if token != KEY_CONTEXT && token != KEY_SUBCONTEXT {
                i += 2;
                continue;
            }
            if token == name {
                let key = self.tokens.get(i + 1)?;
                let value = self.tokens.get(i + 2)?;
                return Some((key.as_str(), value.as_str()));
            }
            i += 3;
        }
        None
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub scheme: String,
    pub address: String,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

/// Decoded post. Every field is optional; it's absent when its segment was.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedPost {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityRecord>,
}

impl ParsedPost {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(key)
    }

    pub fn post_type(&self) -> Option<&str> {
        self.get(KEY_TYPE)
    }

    pub fn context(&self) -> Option<(&str, &str)> {
        self.metadata.as_ref()?.triple(KEY_CONTEXT)
    }

    pub fn subcontext(&self) -> Option<(&str, &str)> {
        self.metadata.as_ref()?.triple(KEY_SUBCONTEXT)
    }

    pub fn content_record(&self) -> Option<ContentRecord> {
        Some(ContentRecord {
            content: self.content.clone()?,
            media_type: self.media_type.clone().unwrap_or_default(),
            encoding: self.encoding.clone().unwrap_or_default(),
        })
    }
}

/// Strict UTF-8 view used for markers, keys and short fields. Undecodable pushes read as `""`.
fn text(push: &[u8]) -> &str {
    std::str::from_utf8(push).unwrap_or_default()
}

fn lossy(push: &[u8]) -> Cow<str> {
    String::from_utf8_lossy(push)
}

/// Returns `None` only for an empty push sequence.
pub fn interpret<P: AsRef<[u8]>>(pushes: &[P]) -> Option<ParsedPost> {
    if pushes.is_empty() {
        return None;
    }
    let s = pushes.iter().map(AsRef::as_ref).collect::<Vec<&[u8]>>();
    let at = |i: usize| s.get(i).copied();

    let mut post = ParsedPost::default();
    let mut i = 0_usize;
    while i < s.len() {
        match Segment::from_marker(s[i]) {
            Some(Segment::B) => {
                // B <content> <media-type> <encoding>
                post.content = at(i + 1).map(|x| lossy(x).into_owned());
                post.media_type = at(i + 2).map(|x| text(x).to_owned());
                post.encoding = at(i + 3).map(|x| text(x).to_owned());
                i += 4;
            }
            Some(Segment::Map) => {
                let (record, next) = read_map(&s, i + 1);
                post.app = record.get(KEY_APP).map(str::to_owned);
                post.metadata = Some(record);
                // the walk always consumes at least the marker
                i = next;
            }
            Some(Segment::Aip) => {
                // AIP <scheme> <address> <signature>
                post.author = at(i + 2).map(|x| text(x).to_owned());
                post.identity = match (at(i + 1), at(i + 2), at(i + 3)) {
                    (Some(scheme), Some(address), Some(signature)) => Some(IdentityRecord {
                        scheme: text(scheme).into(),
                        address: text(address).into(),
                        signature: signature.to_vec(),
                    }),
                    _ => None,
                };
                i += 4;
            }
            None => i += 1,
        }
    }

    Some(post)
}

/// MAP `[SET] <key> <value> <key> <value> ...`, starting right after the marker.
///
/// Returns the record and the index the outer pass resumes at.
fn read_map(s: &[&[u8]], start: usize) -> (MetadataRecord, usize) {
    let mut record = MetadataRecord::default();
    let mut j = start;
    if s.get(j).map(|x| text(x)) == Some(MAP_SET) {
        record.operation = Some(MAP_SET.into());
        j += 1;
    }

    while let Some(&key) = s.get(j) {
        if is_marker(key) {
            break;
        }
        // a marker in the value slot belongs to the next segment
        let Some(value) = s.get(j + 1).copied().filter(|x| !is_marker(x)) else {
            record.tokens.push(text(key).to_owned());
            break;
        };
        let (key, value) = (text(key).to_owned(), text(value).to_owned());
        record.tokens.push(key.clone());
        record.tokens.push(value.clone());
        record.pairs.push((key, value));
        j += 2;
    }

    (record, j)
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
