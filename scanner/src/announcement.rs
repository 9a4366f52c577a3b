//! Announcement records and the log decoder
//!
//! Event: `Announcement(uint256 indexed schemeId, address indexed stealthAddress,
//! address indexed caller, bytes ephemeralPubKey, bytes metadata)`
//!
//! Topics are `[signature, schemeId, stealthAddress, caller]`; the data is the
//! ABI tuple `(bytes, bytes)`.

use alloy_primitives::{keccak256, Address, B256};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::rpc::{parse_bytes, parse_quantity, RawLog};

pub const ANNOUNCEMENT_EVENT: &str = "Announcement(uint256,address,address,bytes,bytes)";

const WORD: usize = 32;

/// `topics[0]` filter for announcement logs
pub fn announcement_topic() -> B256 {
    keccak256(ANNOUNCEMENT_EVENT.as_bytes())
}

/// A decoded on-chain announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: Option<u64>,
    pub stealth_address: Address,
    /// The encoded ephemeral key region, view tag byte included
    pub ephemeral_pub_key: Vec<u8>,
    pub view_tag: u8,
    pub metadata: Vec<u8>,
}

impl Announcement {
    /// Decode a raw `eth_getLogs` entry
    pub fn from_log(log: &RawLog) -> Result<Self, DecodeError> {
        if log.topics.len() < 3 {
            return Err(DecodeError::MissingTopics(log.topics.len()));
        }

        let block_number = parse_quantity("blockNumber", &log.block_number)?;
        let tx_hash = parse_b256("transactionHash", &log.transaction_hash)?;
        let log_index = log
            .log_index
            .as_deref()
            .map(|idx| parse_quantity("logIndex", idx))
            .transpose()?;

        // Indexed address: low 20 bytes of the topic word
        let topic = parse_b256("topics[2]", &log.topics[2])?;
        let stealth_address = Address::from_slice(&topic[12..]);

        let data = parse_bytes("data", &log.data)?;
        let ephemeral_pub_key = read_dynamic_bytes(&data, 0, "ephemeral offset")?;
        let view_tag = *ephemeral_pub_key
            .first()
            .ok_or(DecodeError::EmptyEphemeralKey)?;

        // Metadata is optional; a short or inconsistent tail leaves it empty
        let metadata = read_dynamic_bytes(&data, WORD, "metadata offset").unwrap_or_default();

        Ok(Self {
            block_number,
            tx_hash,
            log_index,
            stealth_address,
            ephemeral_pub_key,
            view_tag,
            metadata,
        })
    }
}

fn parse_b256(field: &'static str, s: &str) -> Result<B256, DecodeError> {
    let bytes = parse_bytes(field, s)?;
    if bytes.len() != WORD {
        return Err(DecodeError::Hex {
            field,
            reason: format!("expected 32 bytes, got {}", bytes.len()),
        });
    }
    Ok(B256::from_slice(&bytes))
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8], DecodeError> {
    let end = offset.checked_add(WORD).ok_or(DecodeError::WordOverflow("offset"))?;
    data.get(offset..end).ok_or(DecodeError::Truncated {
        offset,
        needed: WORD,
        available: data.len(),
    })
}

fn word_as_usize(word: &[u8], what: &'static str) -> Result<usize, DecodeError> {
    // Anything above 8 bytes of magnitude cannot index a real payload
    if word[..WORD - 8].iter().any(|&b| b != 0) {
        return Err(DecodeError::WordOverflow(what));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(buf)).map_err(|_| DecodeError::WordOverflow(what))
}

/// Read a dynamic `bytes` value whose offset lives in the head word at `head`
fn read_dynamic_bytes(data: &[u8], head: usize, what: &'static str) -> Result<Vec<u8>, DecodeError> {
    let offset = word_as_usize(word_at(data, head)?, what)?;
    let len = word_as_usize(word_at(data, offset)?, "length")?;
    let start = offset + WORD;
    let end = start.checked_add(len).ok_or(DecodeError::WordOverflow("length"))?;
    data.get(start..end)
        .map(<[u8]>::to_vec)
        .ok_or(DecodeError::Truncated {
            offset: start,
            needed: len,
            available: data.len().saturating_sub(start),
        })
}

/// ABI-encode `(bytes, bytes)` the way the announcer emits it
pub fn encode_announcement_data(ephemeral_pub_key: &[u8], metadata: &[u8]) -> Vec<u8> {
    fn padded_len(len: usize) -> usize {
        len.div_ceil(WORD) * WORD
    }
    fn word(value: usize) -> [u8; WORD] {
        let mut w = [0u8; WORD];
        w[WORD - 8..].copy_from_slice(&(value as u64).to_be_bytes());
        w
    }

    let first = 2 * WORD;
    let second = first + WORD + padded_len(ephemeral_pub_key.len());

    let mut out = Vec::with_capacity(second + WORD + padded_len(metadata.len()));
    out.extend_from_slice(&word(first));
    out.extend_from_slice(&word(second));
    for value in [ephemeral_pub_key, metadata] {
        out.extend_from_slice(&word(value.len()));
        out.extend_from_slice(value);
        out.resize(out.len() + padded_len(value.len()) - value.len(), 0);
    }
    out
}

/// Build the raw log an announcer would emit; used by tests and tooling
pub fn encode_announcement_log(
    block_number: u64,
    tx_hash: B256,
    stealth_address: Address,
    ephemeral_pub_key: &[u8],
    metadata: &[u8],
) -> RawLog {
    let scheme_id = B256::with_last_byte(1);
    RawLog {
        block_number: format!("0x{block_number:x}"),
        transaction_hash: tx_hash.to_string(),
        topics: vec![
            announcement_topic().to_string(),
            scheme_id.to_string(),
            stealth_address.into_word().to_string(),
            B256::ZERO.to_string(),
        ],
        data: format!(
            "0x{}",
            hex::encode(encode_announcement_data(ephemeral_pub_key, metadata))
        ),
        log_index: None,
    }
}
