//! Contract ABI codec
//!
//! Covers the subset of the Solidity ABI the agent contract uses:
//! - `uint<N>` (held as `U256`) and `address` words
//! - `string` and `uint256[]` dynamic values
//! - tuples, static or dynamic, encoded head/tail
//!
//! Decoding is bounds-checked throughout; a short or inconsistent buffer is an
//! [`AbiError`], never a panic.

use alloy_primitives::{keccak256, Address, U256};
use evmauth_core::amount::narrow_u64;
use evmauth_core::CoreError;

/// Size of one ABI word
pub const WORD: usize = 32;

/// Selector of `Error(string)`, the standard revert payload
pub const REVERT_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// ABI decoding failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbiError {
    /// Read past the end of the buffer
    #[error("read of {len} bytes at offset {offset} exceeds buffer of {available}")]
    OutOfBounds {
        /// Start of the read
        offset: usize,
        /// Bytes requested
        len: usize,
        /// Buffer size
        available: usize,
    },

    /// Offset or length word too large to address
    #[error("offset or length {0} does not fit the buffer")]
    BadOffset(U256),

    /// String bytes were not UTF-8
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,

    /// Token of the wrong type
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        /// Type the caller asked for
        expected: &'static str,
        /// Type actually present
        found: &'static str,
    },

    /// Wrong number of decoded values
    #[error("expected {expected} values, decoded {found}")]
    Arity {
        /// Values the signature declares
        expected: usize,
        /// Values decoded
        found: usize,
    },
}

impl From<AbiError> for CoreError {
    fn from(value: AbiError) -> Self {
        CoreError::malformed(value.to_string())
    }
}

/// Parameter type descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    /// `uint256` and narrower unsigned integers
    Uint,
    /// `address`
    Address,
    /// `string`
    String,
    /// `uint256[]`
    UintArray,
    /// Positional tuple
    Tuple(Vec<ParamType>),
}

impl ParamType {
    /// Whether values of this type live in the tail
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        match self {
            ParamType::Uint | ParamType::Address => false,
            ParamType::String | ParamType::UintArray => true,
            ParamType::Tuple(members) => members.iter().any(ParamType::is_dynamic),
        }
    }

    fn head_size(&self) -> usize {
        match self {
            ParamType::Tuple(members) if !self.is_dynamic() => {
                members.iter().map(ParamType::head_size).sum()
            }
            _ => WORD,
        }
    }
}

/// Decoded or to-be-encoded value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Unsigned integer word
    Uint(U256),
    /// Account address
    Address(Address),
    /// UTF-8 string
    String(String),
    /// Dynamic array of words
    UintArray(Vec<U256>),
    /// Positional tuple
    Tuple(Vec<Token>),
}

impl Token {
    fn type_name(&self) -> &'static str {
        match self {
            Token::Uint(_) => "uint",
            Token::Address(_) => "address",
            Token::String(_) => "string",
            Token::UintArray(_) => "uint[]",
            Token::Tuple(_) => "tuple",
        }
    }

    fn is_dynamic(&self) -> bool {
        match self {
            Token::Uint(_) | Token::Address(_) => false,
            Token::String(_) | Token::UintArray(_) => true,
            Token::Tuple(members) => members.iter().any(Token::is_dynamic),
        }
    }

    fn mismatch(&self, expected: &'static str) -> AbiError {
        AbiError::UnexpectedToken {
            expected,
            found: self.type_name(),
        }
    }

    /// # Errors
    /// `UnexpectedToken` for any other variant.
    pub fn into_uint(self) -> Result<U256, AbiError> {
        match self {
            Token::Uint(v) => Ok(v),
            other => Err(other.mismatch("uint")),
        }
    }

    /// # Errors
    /// `UnexpectedToken` for any other variant.
    pub fn into_address(self) -> Result<Address, AbiError> {
        match self {
            Token::Address(v) => Ok(v),
            other => Err(other.mismatch("address")),
        }
    }

    /// # Errors
    /// `UnexpectedToken` for any other variant.
    pub fn into_string(self) -> Result<String, AbiError> {
        match self {
            Token::String(v) => Ok(v),
            other => Err(other.mismatch("string")),
        }
    }

    /// # Errors
    /// `UnexpectedToken` for any other variant.
    pub fn into_uint_array(self) -> Result<Vec<U256>, AbiError> {
        match self {
            Token::UintArray(v) => Ok(v),
            other => Err(other.mismatch("uint[]")),
        }
    }

    /// # Errors
    /// `UnexpectedToken` for any other variant.
    pub fn into_tuple(self) -> Result<Vec<Token>, AbiError> {
        match self {
            Token::Tuple(v) => Ok(v),
            other => Err(other.mismatch("tuple")),
        }
    }
}

/// First four bytes of `keccak256(signature)`
#[must_use]
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

/// Selector followed by the encoded arguments
#[must_use]
pub fn encode_call(selector: [u8; 4], args: &[Token]) -> Vec<u8> {
    let mut out = selector.to_vec();
    out.extend(encode(args));
    out
}

/// Encode a parameter list head/tail
#[must_use]
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len: usize = tokens
        .iter()
        .map(|t| match t {
            Token::Tuple(members) if !t.is_dynamic() => encode(members).len(),
            _ => WORD,
        })
        .sum();

    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&U256::from(head_len + tail.len()).to_be_bytes::<WORD>());
            tail.extend(encode_value(token));
        } else {
            head.extend(encode_value(token));
        }
    }
    head.extend(tail);
    head
}

fn encode_value(token: &Token) -> Vec<u8> {
    match token {
        Token::Uint(v) => v.to_be_bytes::<WORD>().to_vec(),
        Token::Address(a) => a.into_word().to_vec(),
        Token::String(s) => {
            let mut out = U256::from(s.len()).to_be_bytes::<WORD>().to_vec();
            out.extend_from_slice(s.as_bytes());
            out.resize(WORD + s.len().div_ceil(WORD) * WORD, 0);
            out
        }
        Token::UintArray(items) => {
            let mut out = U256::from(items.len()).to_be_bytes::<WORD>().to_vec();
            for item in items {
                out.extend_from_slice(&item.to_be_bytes::<WORD>());
            }
            out
        }
        Token::Tuple(members) => encode(members),
    }
}

/// Decode a parameter list
///
/// # Errors
/// Any out-of-bounds read or invalid payload.
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, AbiError> {
    decode_params(types, data, 0)
}

/// Decode a list expected to hold exactly one value
///
/// # Errors
/// As [`decode`], plus `Arity` if the list is empty.
pub fn decode_single(ty: ParamType, data: &[u8]) -> Result<Token, AbiError> {
    decode(std::slice::from_ref(&ty), data)?
        .pop()
        .ok_or(AbiError::Arity {
            expected: 1,
            found: 0,
        })
}

fn decode_params(types: &[ParamType], data: &[u8], base: usize) -> Result<Vec<Token>, AbiError> {
    let mut cursor = base;
    let mut out = Vec::with_capacity(types.len());
    for ty in types {
        if ty.is_dynamic() {
            let offset = read_len(data, cursor)?;
            let at = base.checked_add(offset).ok_or(AbiError::BadOffset(U256::from(offset)))?;
            out.push(decode_dynamic(ty, data, at)?);
        } else {
            out.push(decode_static(ty, data, cursor)?);
        }
        cursor += ty.head_size();
    }
    Ok(out)
}

fn decode_static(ty: &ParamType, data: &[u8], at: usize) -> Result<Token, AbiError> {
    match ty {
        ParamType::Uint => Ok(Token::Uint(U256::from_be_slice(read(data, at, WORD)?))),
        ParamType::Address => Ok(Token::Address(Address::from_slice(
            &read(data, at, WORD)?[12..],
        ))),
        ParamType::Tuple(members) => decode_params(members, data, at).map(Token::Tuple),
        ParamType::String | ParamType::UintArray => decode_dynamic(ty, data, at),
    }
}

fn decode_dynamic(ty: &ParamType, data: &[u8], at: usize) -> Result<Token, AbiError> {
    match ty {
        ParamType::String => {
            let len = read_len(data, at)?;
            let bytes = read(data, at + WORD, len)?;
            String::from_utf8(bytes.to_vec())
                .map(Token::String)
                .map_err(|_| AbiError::InvalidUtf8)
        }
        ParamType::UintArray => {
            let len = read_len(data, at)?;
            (0..len)
                .map(|i| read(data, at + WORD * (i + 1), WORD).map(U256::from_be_slice))
                .collect::<Result<Vec<_>, _>>()
                .map(Token::UintArray)
        }
        ParamType::Tuple(members) => decode_params(members, data, at).map(Token::Tuple),
        ParamType::Uint | ParamType::Address => decode_static(ty, data, at),
    }
}

fn read(data: &[u8], offset: usize, len: usize) -> Result<&[u8], AbiError> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or(AbiError::OutOfBounds {
            offset,
            len,
            available: data.len(),
        })
}

fn read_len(data: &[u8], at: usize) -> Result<usize, AbiError> {
    let word = U256::from_be_slice(read(data, at, WORD)?);
    narrow_u64(word)
        .and_then(|v| usize::try_from(v).ok())
        .filter(|v| *v <= data.len())
        .ok_or(AbiError::BadOffset(word))
}

/// Extract the message of an `Error(string)` revert payload
#[must_use]
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let payload = data.strip_prefix(&REVERT_SELECTOR)?;
    decode_single(ParamType::String, payload)
        .ok()?
        .into_string()
        .ok()
}

/// `Error(string)` revert payload for `reason`
#[must_use]
pub fn encode_revert_reason(reason: &str) -> Vec<u8> {
    encode_call(REVERT_SELECTOR, &[Token::String(reason.to_string())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn word(v: u64) -> [u8; 32] {
        U256::from(v).to_be_bytes::<32>()
    }

    #[test]
    fn revert_selector_matches_error_signature() {
        assert_eq!(selector("Error(string)"), REVERT_SELECTOR);
    }

    #[test]
    fn string_is_length_prefixed_and_padded() {
        let encoded = encode(&[Token::String("hi".into())]);
        assert_eq!(encoded.len(), 3 * WORD);
        assert_eq!(&encoded[..32], &word(32));
        assert_eq!(&encoded[32..64], &word(2));
        assert_eq!(&encoded[64..66], b"hi");
        assert!(encoded[66..].iter().all(|b| *b == 0));
    }

    #[test]
    fn mixed_static_and_dynamic_arguments() {
        let args = vec![
            Token::String("Alpha Trader".into()),
            Token::Uint(U256::from(0u8)),
            Token::String("did:ethr:0xabc".into()),
            Token::Uint(U256::from(5u64) * U256::from(10u64).pow(U256::from(17u64))),
        ];
        let encoded = encode(&args);
        // Heads: two offsets and two words.
        assert_eq!(&encoded[..32], &word(4 * 32));
        let types = [
            ParamType::String,
            ParamType::Uint,
            ParamType::String,
            ParamType::Uint,
        ];
        assert_eq!(decode(&types, &encoded).unwrap(), args);
    }

    #[test]
    fn dynamic_tuple_return_value() {
        let tuple = Token::Tuple(vec![
            Token::Uint(U256::from(7u64)),
            Token::Address(Address::repeat_byte(0xde)),
            Token::String(String::new()),
        ]);
        let encoded = encode(std::slice::from_ref(&tuple));
        assert_eq!(&encoded[..32], &word(32));

        let ty = ParamType::Tuple(vec![ParamType::Uint, ParamType::Address, ParamType::String]);
        assert_eq!(decode_single(ty, &encoded).unwrap(), tuple);
    }

    #[test]
    fn uint_array() {
        let ids = vec![U256::from(1u8), U256::from(2u8), U256::from(9u8)];
        let encoded = encode(&[Token::UintArray(ids.clone())]);
        let decoded = decode_single(ParamType::UintArray, &encoded)
            .unwrap()
            .into_uint_array()
            .unwrap();
        assert_eq!(decoded, ids);
    }

    #[test]
    fn truncated_buffer_is_an_error() {
        let encoded = encode(&[Token::String("truncated".into())]);
        let err = decode(&[ParamType::String], &encoded[..40]).unwrap_err();
        assert!(matches!(err, AbiError::OutOfBounds { .. } | AbiError::BadOffset(_)));
        assert!(decode(&[ParamType::Uint], &[]).is_err());
    }

    #[test]
    fn absurd_offset_is_rejected() {
        let mut data = vec![0xffu8; 32];
        data.extend_from_slice(&[0u8; 32]);
        assert!(matches!(
            decode(&[ParamType::String], &data),
            Err(AbiError::BadOffset(_))
        ));
    }

    #[test]
    fn revert_reason_round_trip() {
        let payload = encode_revert_reason("Exceeds daily limit");
        assert_eq!(decode_revert_reason(&payload).as_deref(), Some("Exceeds daily limit"));
        assert_eq!(decode_revert_reason(&[0, 1, 2, 3]), None);
    }

    #[test]
    fn token_accessors_report_mismatch() {
        let err = Token::Uint(U256::ZERO).into_string().unwrap_err();
        assert_eq!(err.to_string(), "expected string, found uint");
        let core: CoreError = err.into();
        assert_eq!(core.kind(), "malformed_record");
    }
}
