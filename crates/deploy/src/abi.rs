//! Minimal ABI encoding for the static argument types used by templates.
//!
//! Every supported argument (address, uint256, bool, bytes32) occupies exactly
//! one 32-byte word, so calls and constructor arguments are plain word
//! concatenations.

use std::str::FromStr;

use alloy_core::primitives::{Address, B256, Bytes, U256, keccak256};

/// Selector of `Error(string)`, the standard revert payload.
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// First four bytes of the keccak256 hash of a function signature.
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Left-pad an address into an ABI word.
pub fn address_word(address: Address) -> B256 {
    address.into_word()
}

/// Encode a uint256 given as a decimal or 0x-prefixed string.
pub fn uint_word(value: &str) -> Result<B256, String> {
    U256::from_str(value)
        .map(B256::from)
        .map_err(|e| format!("invalid uint256 '{value}': {e}"))
}

pub fn bool_word(value: bool) -> B256 {
    B256::from(U256::from(value as u8))
}

/// Permission identifier of a permission name.
///
/// A 0x-prefixed 32-byte hex value is taken verbatim, anything else is hashed
/// with keccak256 (the `keccak256("EXECUTE_ROLE")` convention).
pub fn permission_id(permission: &str) -> B256 {
    if permission.starts_with("0x") && permission.len() == 66 {
        if let Ok(id) = B256::from_str(permission) {
            return id;
        }
    }
    keccak256(permission.as_bytes())
}

/// Encode a call to `signature` with static word arguments.
pub fn encode_call(signature: &str, args: &[B256]) -> Bytes {
    let mut data = Vec::with_capacity(4 + 32 * args.len());
    data.extend_from_slice(&function_selector(signature));
    for arg in args {
        data.extend_from_slice(arg.as_slice());
    }
    data.into()
}

/// Append ABI-encoded constructor arguments to contract creation code.
pub fn encode_constructor(bytecode: &Bytes, args: &[B256]) -> Bytes {
    let mut data = Vec::with_capacity(bytecode.len() + 32 * args.len());
    data.extend_from_slice(bytecode);
    for arg in args {
        data.extend_from_slice(arg.as_slice());
    }
    data.into()
}

/// Decode the message of an `Error(string)` revert payload.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let payload = data.strip_prefix(&ERROR_SELECTOR)?;
    // Head: offset word, then length word, then the string bytes.
    let len_word = payload.get(32..64)?;
    let len = U256::from_be_slice(len_word);
    let len = usize::try_from(len).ok()?;
    let bytes = payload.get(64..64usize.checked_add(len)?)?;
    String::from_utf8(bytes.to_vec()).ok()
}
