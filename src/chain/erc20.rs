use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

use super::provider::LogEntry;

sol! {
    function balanceOf(address owner) external view returns (uint256);
    function allowance(address owner, address spender) external view returns (uint256);
    function approve(address spender, uint256 value) external returns (bool);
    function decimals() external view returns (uint8);
}

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: B256 = B256::new([
    0xdd, 0xf2, 0x52, 0xad, 0x1b, 0xe2, 0xc8, 0x9b, 0x69, 0xc2, 0xb0, 0x68, 0xfc, 0x37, 0x8d,
    0xaa, 0x95, 0x2b, 0xa7, 0xf1, 0x63, 0xc4, 0xa1, 0x16, 0x28, 0xf5, 0x5a, 0x4d, 0xf5, 0x23,
    0xb3, 0xef,
]);

pub fn balance_of_call(owner: Address) -> Bytes {
    balanceOfCall { owner }.abi_encode().into()
}

pub fn allowance_call(owner: Address, spender: Address) -> Bytes {
    allowanceCall { owner, spender }.abi_encode().into()
}

pub fn approve_call(spender: Address, value: U256) -> Bytes {
    approveCall { spender, value }.abi_encode().into()
}

pub fn decimals_call() -> Bytes {
    decimalsCall {}.abi_encode().into()
}

/// Decode a single uint256 return word.
pub fn decode_uint(ret: &Bytes) -> Option<U256> {
    if ret.len() < 32 {
        return None;
    }
    Some(U256::from_be_slice(&ret[..32]))
}

pub fn decode_u8(ret: &Bytes) -> Option<u8> {
    decode_uint(ret).map(|u| u.to::<u8>())
}

/// Sum ERC-20 Transfer amounts sent to `recipient` from `token` in a
/// receipt's logs. Used to estimate the filled amount of a swap.
pub fn sum_transfers_to(logs: &[LogEntry], token: Address, recipient: Address) -> U256 {
    let mut total = U256::ZERO;
    for log in logs {
        if log.address != token || log.topics.len() < 3 || log.topics[0] != TRANSFER_TOPIC {
            continue;
        }
        // Indexed addresses are left-padded to 32 bytes.
        let to = Address::from_slice(&log.topics[2][12..]);
        if to != recipient {
            continue;
        }
        if let Some(amount) = decode_uint(&log.data) {
            total = total.saturating_add(amount);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::keccak256;

    fn transfer_log(token: Address, to: Address, amount: U256) -> LogEntry {
        let mut to_topic = [0u8; 32];
        to_topic[12..].copy_from_slice(to.as_slice());
        LogEntry {
            address: token,
            topics: vec![TRANSFER_TOPIC, B256::from([0u8; 32]), B256::from(to_topic)],
            data: Bytes::from(amount.to_be_bytes::<32>().to_vec()),
        }
    }

    #[test]
    fn test_transfer_topic_matches_signature() {
        assert_eq!(
            TRANSFER_TOPIC,
            keccak256("Transfer(address,address,uint256)".as_bytes())
        );
    }

    #[test]
    fn test_selector_stability() {
        // Canonical ERC-20 selectors.
        assert_eq!(&balance_of_call(Address::ZERO)[..4], [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(
            &allowance_call(Address::ZERO, Address::ZERO)[..4],
            [0xdd, 0x62, 0xed, 0x3e]
        );
        assert_eq!(
            &approve_call(Address::ZERO, U256::MAX)[..4],
            [0x09, 0x5e, 0xa7, 0xb3]
        );
        assert_eq!(&decimals_call()[..4], [0x31, 0x3c, 0xe5, 0x67]);
    }

    #[test]
    fn test_sum_transfers_filters_token_and_recipient() {
        let token = Address::from([0x11; 20]);
        let other_token = Address::from([0x22; 20]);
        let me = Address::from([0xAA; 20]);
        let someone = Address::from([0xBB; 20]);

        let logs = vec![
            transfer_log(token, me, U256::from(100u64)),
            transfer_log(token, someone, U256::from(40u64)),
            transfer_log(other_token, me, U256::from(7u64)),
            transfer_log(token, me, U256::from(25u64)),
        ];

        assert_eq!(sum_transfers_to(&logs, token, me), U256::from(125u64));
        assert_eq!(sum_transfers_to(&logs, other_token, me), U256::from(7u64));
        assert_eq!(sum_transfers_to(&logs, token, Address::ZERO), U256::ZERO);
    }

    #[test]
    fn test_decode_uint() {
        let word = Bytes::from(U256::from(42u64).to_be_bytes::<32>().to_vec());
        assert_eq!(decode_uint(&word), Some(U256::from(42u64)));
        assert_eq!(decode_uint(&Bytes::from(vec![0u8; 8])), None);
    }
}
