//! # ABI Encoding
//!
//! The subset of the contract ABI encoding the orchestrator needs to build
//! call payloads: addresses, small unsigned integers, `bytes4`, dynamic
//! `bytes`, dynamic arrays and tuples. Head/tail layout follows the standard
//! encoding so payloads are accepted by any compliant contract.

use crate::error::TransportError;
use crate::primitives::{Address, Selector};

/// One ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(u128),
    /// Fixed-size byte string (`bytesN`), right-padded to a word.
    FixedBytes(Vec<u8>),
    /// Dynamic `bytes`.
    Bytes(Vec<u8>),
    /// Dynamic array `T[]`.
    Array(Vec<Token>),
    Tuple(Vec<Token>),
}

impl Token {
    /// A `bytes4` selector token.
    #[must_use]
    pub fn selector(selector: Selector) -> Self {
        Self::FixedBytes(selector.0.to_vec())
    }

    fn is_dynamic(&self) -> bool {
        match self {
            Self::Bytes(_) | Self::Array(_) => true,
            Self::Tuple(items) => items.iter().any(Token::is_dynamic),
            Self::Address(_) | Self::Uint(_) | Self::FixedBytes(_) => false,
        }
    }

    /// Size of this token in the head of its enclosing sequence.
    fn head_len(&self) -> usize {
        match self {
            Self::Tuple(items) if !self.is_dynamic() => items.iter().map(Token::head_len).sum(),
            _ => 32,
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            Self::Address(address) => {
                let mut word = [0u8; 32];
                word[12..].copy_from_slice(address.as_bytes());
                word.to_vec()
            }
            Self::Uint(value) => uint_word(*value).to_vec(),
            Self::FixedBytes(bytes) => pad_right(bytes),
            Self::Bytes(bytes) => {
                let mut out = usize_word(bytes.len()).to_vec();
                out.extend(pad_right(bytes));
                out
            }
            Self::Array(items) => {
                let mut out = usize_word(items.len()).to_vec();
                out.extend(encode(items));
                out
            }
            Self::Tuple(items) => encode(items),
        }
    }
}

fn uint_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn usize_word(value: usize) -> [u8; 32] {
    uint_word(value as u128)
}

fn pad_right(bytes: &[u8]) -> Vec<u8> {
    let padded = bytes.len().div_ceil(32) * 32;
    let mut out = bytes.to_vec();
    out.resize(padded, 0);
    out
}

/// Encode a sequence of tokens (function arguments or tuple members).
#[must_use]
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len: usize = tokens.iter().map(Token::head_len).sum();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&usize_word(head_len + tail.len()));
            tail.extend(token.encode());
        } else {
            head.extend(token.encode());
        }
    }

    head.extend(tail);
    head
}

/// Encode a full call: selector of `signature` followed by the arguments.
#[must_use]
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut out = Selector::from_signature(signature).0.to_vec();
    out.extend(encode(args));
    out
}

// =============================================================================
// DECODING (return values of read calls)
// =============================================================================

fn word_at(data: &[u8], offset: usize) -> Result<[u8; 32], TransportError> {
    data.get(offset..offset + 32)
        .and_then(|slice| <[u8; 32]>::try_from(slice).ok())
        .ok_or_else(|| {
            TransportError::Malformed(format!(
                "return data too short: need word at {offset}, have {} bytes",
                data.len()
            ))
        })
}

fn word_to_usize(word: &[u8; 32]) -> Result<usize, TransportError> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(TransportError::Malformed("length word out of range".into()));
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&word[24..]);
    usize::try_from(u64::from_be_bytes(low))
        .map_err(|_| TransportError::Malformed("length word out of range".into()))
}

/// Decode a single `address` return value.
pub fn decode_address(data: &[u8]) -> Result<Address, TransportError> {
    Ok(Address::from_word(&word_at(data, 0)?))
}

/// Decode a single `bytes4[]` return value.
pub fn decode_selectors(data: &[u8]) -> Result<Vec<Selector>, TransportError> {
    let offset = word_to_usize(&word_at(data, 0)?)?;
    let len = word_to_usize(&word_at(data, offset)?)?;
    (0..len)
        .map(|i| {
            let word = word_at(data, offset + 32 * (i + 1))?;
            Ok(Selector([word[0], word[1], word[2], word[3]]))
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = last;
        Address(bytes)
    }

    #[test]
    fn initialize_payload_layout() {
        let payload = encode_call("initialize(address)", &[Token::Address(addr(0x42))]);
        assert_eq!(payload.len(), 4 + 32);
        assert_eq!(&payload[..4], &[0xc4, 0xd6, 0x6d, 0xe8]);
        assert_eq!(payload[35], 0x42);
        assert!(payload[4..35].iter().all(|b| *b == 0));
    }

    #[test]
    fn dynamic_bytes_are_offset_and_padded() {
        // (address, bytes) where bytes = 0x01
        let encoded = encode(&[Token::Address(addr(1)), Token::Bytes(vec![0x01])]);
        assert_eq!(encoded.len(), 32 * 4);
        // offset to tail = 64
        assert_eq!(encoded[63], 64);
        // length = 1
        assert_eq!(encoded[95], 1);
        assert_eq!(encoded[96], 0x01);
    }

    #[test]
    fn empty_bytes_encode_length_only() {
        let encoded = encode(&[Token::Bytes(Vec::new())]);
        assert_eq!(encoded.len(), 64);
        assert_eq!(encoded[31], 32);
        assert!(encoded[32..].iter().all(|b| *b == 0));
    }

    #[test]
    fn cut_tuple_array_layout() {
        // ((address,uint8,bytes4[])[], address, bytes)
        let facet = Token::Tuple(vec![
            Token::Address(addr(7)),
            Token::Uint(0),
            Token::Array(vec![Token::selector(Selector([0xde, 0xad, 0xbe, 0xef]))]),
        ]);
        let encoded = encode(&[
            Token::Array(vec![facet]),
            Token::Address(Address::ZERO),
            Token::Bytes(Vec::new()),
        ]);

        // head: offset(array), address, offset(bytes)
        assert_eq!(encoded[31], 96);
        let array_start = 96;
        // array length 1
        assert_eq!(encoded[array_start + 31], 1);
        // element offset relative to array body = 32
        assert_eq!(encoded[array_start + 63], 32);
        let tuple_start = array_start + 64;
        assert_eq!(encoded[tuple_start + 31], 7);
        // offset of selector array within tuple = 96
        assert_eq!(encoded[tuple_start + 95], 96);
        let selectors_start = tuple_start + 96;
        assert_eq!(encoded[selectors_start + 31], 1);
        assert_eq!(
            &encoded[selectors_start + 32..selectors_start + 36],
            &[0xde, 0xad, 0xbe, 0xef]
        );
        // whole payload is word aligned
        assert_eq!(encoded.len() % 32, 0);
    }

    #[test]
    fn decode_selector_array() {
        let encoded = encode(&[Token::Array(vec![
            Token::selector(Selector([1, 2, 3, 4])),
            Token::selector(Selector([5, 6, 7, 8])),
        ])]);
        let decoded = decode_selectors(&encoded).unwrap();
        assert_eq!(decoded, vec![Selector([1, 2, 3, 4]), Selector([5, 6, 7, 8])]);
    }

    #[test]
    fn decode_short_data_is_malformed() {
        assert!(matches!(
            decode_address(&[0u8; 10]),
            Err(TransportError::Malformed(_))
        ));
    }
}
