//! Token contract calldata.
//!
//! The distributor drives two token entry points, both taking
//! `(address,uint256)`: `transfer` moves existing balance from the sender,
//! `addToken` issues new supply to the recipient. Calldata is a 4-byte
//! selector followed by two 32-byte big-endian words.

use crate::config::{TOKEN_MINT_SELECTOR, TOKEN_TRANSFER_SELECTOR};
use crate::crypto::Address;

/// Length of encoded token calldata: selector plus two words.
pub const TOKEN_CALL_LENGTH: usize = 4 + 32 + 32;

/// A token entry point the distributor knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCall {
    /// `transfer(address,uint256)`
    Transfer,
    /// `addToken(address,uint256)`
    Mint,
}

impl TokenCall {
    pub fn selector(self) -> [u8; 4] {
        match self {
            Self::Transfer => TOKEN_TRANSFER_SELECTOR,
            Self::Mint => TOKEN_MINT_SELECTOR,
        }
    }

    fn from_selector(selector: &[u8]) -> Option<Self> {
        if selector == TOKEN_TRANSFER_SELECTOR {
            Some(Self::Transfer)
        } else if selector == TOKEN_MINT_SELECTOR {
            Some(Self::Mint)
        } else {
            None
        }
    }
}

/// Encodes `call(to, amount)`.
pub fn encode_token_call(call: TokenCall, to: &Address, amount: u128) -> Vec<u8> {
    let mut data = Vec::with_capacity(TOKEN_CALL_LENGTH);
    data.extend_from_slice(&call.selector());
    data.extend_from_slice(&to.to_word());
    data.extend_from_slice(&[0u8; 16]);
    data.extend_from_slice(&amount.to_be_bytes());
    data
}

/// Decodes token calldata into the entry point and its arguments.
///
/// Returns `None` for an unknown selector, a wrong length, non-zero
/// address padding, or an amount that does not fit in 128 bits.
pub fn decode_token_call(data: &[u8]) -> Option<(TokenCall, Address, u128)> {
    if data.len() != TOKEN_CALL_LENGTH {
        return None;
    }
    let call = TokenCall::from_selector(&data[..4])?;
    let address_word = &data[4..36];
    let amount_word = &data[36..68];
    if address_word[..12].iter().any(|b| *b != 0) || amount_word[..16].iter().any(|b| *b != 0) {
        return None;
    }

    let mut address = [0u8; 20];
    address.copy_from_slice(&address_word[12..]);
    let mut amount = [0u8; 16];
    amount.copy_from_slice(&amount_word[16..]);
    Some((call, Address::from_bytes(address), u128::from_be_bytes(amount)))
}
