//! Minimal Solidity ABI codec for the voting contract's six methods.

use crate::error::ChainError;

pub const WORD: usize = 32;

pub const GET_PROPOSALS_COUNT: [u8; 4] = [0x98, 0xe5, 0x27, 0xd3];
pub const GET_PROPOSAL: [u8; 4] = [0xc7, 0xf7, 0x58, 0xa8];
pub const HAS_VOTED: [u8; 4] = [0x43, 0x85, 0x96, 0x32];
pub const CREATE_PROPOSAL: [u8; 4] = [0x0c, 0xe0, 0xeb, 0xf4];
pub const VOTE: [u8; 4] = [0xc9, 0xd2, 0x7a, 0xfe];
pub const CLOSE_PROPOSAL: [u8; 4] = [0x03, 0x86, 0xa0, 0x16];

#[derive(Debug, Clone, Copy)]
pub enum Token<'a> {
    Uint(u64),
    Bool(bool),
    Address(&'a [u8; 20]),
    String(&'a str),
}

pub fn encode_call(selector: [u8; 4], args: &[Token<'_>]) -> Vec<u8> {
    let head_len = args.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for arg in args {
        match arg {
            Token::Uint(value) => head.extend_from_slice(&uint_word(*value)),
            Token::Bool(value) => head.extend_from_slice(&uint_word(u64::from(*value))),
            Token::Address(bytes) => {
                let mut word = [0u8; WORD];
                word[WORD - 20..].copy_from_slice(&bytes[..]);
                head.extend_from_slice(&word);
            }
            Token::String(text) => {
                let offset = (head_len + tail.len()) as u64;
                head.extend_from_slice(&uint_word(offset));
                tail.extend_from_slice(&uint_word(text.len() as u64));
                tail.extend_from_slice(text.as_bytes());
                let padding = (WORD - text.len() % WORD) % WORD;
                tail.resize(tail.len() + padding, 0);
            }
        }
    }

    assert_eq!(head.len(), head_len, "ABI head must be one word per argument");
    let mut encoded = Vec::with_capacity(4 + head.len() + tail.len());
    encoded.extend_from_slice(&selector);
    encoded.extend_from_slice(&head);
    encoded.extend_from_slice(&tail);
    encoded
}

pub fn to_hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn from_hex_data(value: &str) -> Result<Vec<u8>, ChainError> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits).map_err(|err| ChainError::decode("call result", err.to_string()))
}

/// Parses an `0x`-prefixed hex quantity such as a chain id or block number.
pub fn parse_quantity(value: &str) -> Option<u64> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))?;
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Bounds-checked reader over ABI-encoded return data.
pub struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn word(&self, offset: usize) -> Result<&'a [u8], ChainError> {
        let end = offset
            .checked_add(WORD)
            .ok_or_else(|| ChainError::decode("abi word", "offset overflow"))?;
        self.data.get(offset..end).ok_or_else(|| {
            ChainError::decode(
                "abi word",
                format!("need {end} bytes, got {}", self.data.len()),
            )
        })
    }

    pub fn uint_at(&self, offset: usize) -> Result<u64, ChainError> {
        let word = self.word(offset)?;
        if word[..WORD - 8].iter().any(|byte| *byte != 0) {
            return Err(ChainError::decode(
                "uint256",
                format!("value at offset {offset} exceeds 64 bits"),
            ));
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&word[WORD - 8..]);
        Ok(u64::from_be_bytes(bytes))
    }

    pub fn offset_at(&self, offset: usize) -> Result<usize, ChainError> {
        let value = self.uint_at(offset)?;
        usize::try_from(value)
            .map_err(|_| ChainError::decode("abi offset", format!("{value} exceeds usize")))
    }

    pub fn bool_at(&self, offset: usize) -> Result<bool, ChainError> {
        match self.uint_at(offset)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ChainError::decode(
                "bool",
                format!("invalid boolean word {other}"),
            )),
        }
    }

    /// Reads a dynamic `string` whose head sits at `head` and whose offset is
    /// relative to `base`, the start of the enclosing tuple.
    pub fn string_at(&self, base: usize, head: usize) -> Result<String, ChainError> {
        let start = base
            .checked_add(self.offset_at(head)?)
            .ok_or_else(|| ChainError::decode("string", "offset overflow"))?;
        let len = self.offset_at(start)?;
        let body_start = start + WORD;
        let body_end = body_start
            .checked_add(len)
            .ok_or_else(|| ChainError::decode("string", "length overflow"))?;
        let bytes = self.data.get(body_start..body_end).ok_or_else(|| {
            ChainError::decode(
                "string",
                format!("need {body_end} bytes, got {}", self.data.len()),
            )
        })?;
        String::from_utf8(bytes.to_vec()).map_err(|err| ChainError::decode("string", err.to_string()))
    }
}
