//! Splits an `[OP_FALSE] OP_RETURN <push>*` script into its data pushes.
//!
//! On-chain scripts are arbitrary input, so nothing here fails: anything unexpected just ends the
//! recognized region early.

use bitcoin::opcodes::all::{OP_PUSHBYTES_75, OP_PUSHDATA1, OP_PUSHDATA2, OP_PUSHDATA4, OP_RETURN};
use bitcoin::opcodes::OP_FALSE;
use byteorder::{ByteOrder, LittleEndian};
use log::debug;

/// Why tokenizing ended before the end of the script.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StopReason {
    /// No `OP_RETURN` (optionally after `OP_FALSE`) at the start.
    NotDataCarrying,
    /// A non-push opcode was met at `offset`.
    NonPushOpcode { offset: usize, opcode: u8 },
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Tokenized<'a> {
    pub pushes: Vec<&'a [u8]>,
    /// A declared push length ran past the end of the script, and the last push was clamped.
    pub truncated: bool,
    pub stopped_at: Option<StopReason>,
}

pub fn tokenize(script: &[u8]) -> Vec<&[u8]> {
    tokenize_detailed(script).pushes
}

pub fn tokenize_detailed(script: &[u8]) -> Tokenized<'_> {
    let mut result = Tokenized::default();

    let mut pos = 0_usize;
    // OP_FALSE prefix is optional
    if script.first() == Some(&OP_FALSE.to_u8()) {
        pos += 1;
    }
    if script.get(pos) != Some(&OP_RETURN.to_u8()) {
        result.stopped_at = Some(StopReason::NotDataCarrying);
        return result;
    }
    pos += 1;

    while pos < script.len() {
        let offset = pos;
        let opcode = script[pos];
        pos += 1;

        let len = match opcode {
            // OP_PUSHBYTES_0..=OP_PUSHBYTES_75
            x if x <= OP_PUSHBYTES_75.to_u8() => x as usize,
            x if x == OP_PUSHDATA1.to_u8() => read_length(script, &mut pos, 1, &mut result),
            x if x == OP_PUSHDATA2.to_u8() => read_length(script, &mut pos, 2, &mut result),
            x if x == OP_PUSHDATA4.to_u8() => read_length(script, &mut pos, 4, &mut result),
            _ => {
                debug!("Non-push opcode 0x{opcode:02x} at {offset}, stop");
                result.stopped_at = Some(StopReason::NonPushOpcode { offset, opcode });
                break;
            }
        };

        let mut end = pos.saturating_add(len);
        if end > script.len() {
            debug!(
                "Push at {offset} declares {len} bytes, only {} left",
                script.len() - pos
            );
            result.truncated = true;
            end = script.len();
        }
        result.pushes.push(&script[pos..end]);
        pos = end;
    }

    result
}

/// Reads a `width`-byte little-endian push length. Missing bytes read as zero.
fn read_length(script: &[u8], pos: &mut usize, width: usize, result: &mut Tokenized) -> usize {
    let available = &script[*pos..script.len().min(*pos + width)];
    if available.len() < width {
        result.truncated = true;
    }
    let mut buf = [0_u8; 4];
    buf[..available.len()].copy_from_slice(available);
    *pos += available.len();
    LittleEndian::read_u32(&buf) as usize
}

/// Hex variant of [`tokenize`]. Invalid hex yields no pushes.
pub fn tokenize_hex(script_hex: &str) -> Vec<Vec<u8>> {
    let script_hex = script_hex.trim();
    let script_hex = script_hex.strip_prefix("0x").unwrap_or(script_hex);
    match hex::decode(script_hex) {
        Ok(bytes) => tokenize(&bytes).into_iter().map(Vec::from).collect(),
        Err(e) => {
            debug!("Invalid script hex: {e}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn empty_input() {
        assert!(tokenize(&[]).is_empty());
        assert_eq!(
            tokenize_detailed(&[]).stopped_at,
            Some(StopReason::NotDataCarrying)
        );
        assert!(tokenize_hex("").is_empty());
    }

    #[test]
    fn not_data_carrying() {
        // p2pkh
        let script = hex!("76a914726ba1c09c5a72a64a64c42ae2160d4c201398d888ac");
        assert!(tokenize(&script).is_empty());
        // two OP_FALSEs
        assert!(tokenize(&hex!("00006a0161")).is_empty());
    }

    #[test]
    fn optional_op_false() {
        let with = hex!("006a0568656c6c6f00024869");
        let without = hex!("6a0568656c6c6f00024869");
        let expected: Vec<&[u8]> = vec![b"hello", b"", b"Hi"];
        assert_eq!(tokenize(&with), expected);
        assert_eq!(tokenize(&without), expected);
    }

    #[test]
    fn pushdata_lengths() {
        let data = [0x61_u8; 300];

        let mut script = vec![0x6a, 0x4c, 76];
        script.extend_from_slice(&data[..76]);
        script.extend_from_slice(&[0x4d, 0x2c, 0x01]);
        script.extend_from_slice(&data[..300]);
        script.extend_from_slice(&[0x4e, 0x03, 0x00, 0x00, 0x00]);
        script.extend_from_slice(&data[..3]);

        let t = tokenize_detailed(&script);
        assert_eq!(t.pushes.len(), 3);
        assert_eq!(t.pushes[0], &data[..76]);
        assert_eq!(t.pushes[1], &data[..300]);
        assert_eq!(t.pushes[2], &data[..3]);
        assert!(!t.truncated);
        assert_eq!(t.stopped_at, None);
    }

    #[test]
    fn non_push_opcode_ends() {
        // ... OP_PUSHBYTES_2 "Hi" OP_DUP OP_PUSHBYTES_1 "a"
        let script = hex!("006a0248697601 61");
        let t = tokenize_detailed(&script);
        assert_eq!(t.pushes, vec![b"Hi".as_slice()]);
        assert_eq!(
            t.stopped_at,
            Some(StopReason::NonPushOpcode {
                offset: 5,
                opcode: 0x76
            })
        );

        // last byte is OP_CHECKSIG
        let t = tokenize_detailed(&hex!("6a0161ac"));
        assert_eq!(t.pushes, vec![b"a".as_slice()]);
        assert!(!t.truncated);
    }

    #[test]
    fn truncated_push_is_clamped() {
        // declares 5 bytes, has 3
        let t = tokenize_detailed(&hex!("006a05616263"));
        assert_eq!(t.pushes, vec![b"abc".as_slice()]);
        assert!(t.truncated);

        // OP_PUSHDATA2 with a single length byte
        let t = tokenize_detailed(&hex!("6a01614d05"));
        assert_eq!(t.pushes, vec![b"a".as_slice(), b"".as_slice()]);
        assert!(t.truncated);

        // OP_PUSHDATA4 claiming 4 GiB
        let t = tokenize_detailed(&hex!("6a4effffffff6162"));
        assert_eq!(t.pushes, vec![b"ab".as_slice()]);
        assert!(t.truncated);
    }

    #[test]
    fn hex_input() {
        assert_eq!(tokenize_hex("0x6a0161"), vec![b"a".to_vec()]);
        assert_eq!(tokenize_hex("6A0161\n"), vec![b"a".to_vec()]);
        assert!(tokenize_hex("6a016").is_empty());
        assert!(tokenize_hex("zz").is_empty());
    }
}
