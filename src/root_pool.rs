//! Deterministic pool address derivation.
//!
//! Pool factories deploy pools with CREATE2, so a pool's address is a pure
//! function of the factory, the ordered token pair, the pool kind and the init
//! code hash registered for the factory. Leaf chains use this to point each
//! local pool at its canonical root-chain counterpart without any RPC call.

use ethers::abi::{self, Token as AbiToken};
use ethers::types::{Address, H256, I256};
use ethers::utils::{get_create2_address_from_hash, keccak256};

use crate::types::PoolKind;

/// Sorts a token pair the way pool factories do.
pub fn sort_tokens(token_a: Address, token_b: Address) -> (Address, Address) {
    if token_a < token_b {
        (token_a, token_b)
    } else {
        (token_b, token_a)
    }
}

/// CREATE2 salt of a pool.
///
/// Basic pools hash `abi.encodePacked(token0, token1, stable)`; concentrated
/// pools hash `abi.encode(token0, token1, tick_spacing)`.
pub fn pool_salt(token_a: Address, token_b: Address, kind: PoolKind) -> H256 {
    let (token0, token1) = sort_tokens(token_a, token_b);
    let preimage = match kind {
        PoolKind::Volatile | PoolKind::Stable => {
            let mut packed = Vec::with_capacity(41);
            packed.extend_from_slice(token0.as_bytes());
            packed.extend_from_slice(token1.as_bytes());
            packed.push(u8::from(kind == PoolKind::Stable));
            packed
        }
        PoolKind::Concentrated { tick_spacing } => abi::encode(&[
            AbiToken::Address(token0),
            AbiToken::Address(token1),
            AbiToken::Int(I256::from(tick_spacing).into_raw()),
        ]),
    };
    H256::from(keccak256(preimage))
}

/// CREATE2 address for `deployer`, `salt` and `init_code_hash`.
pub fn create2_address(deployer: Address, salt: H256, init_code_hash: H256) -> Address {
    get_create2_address_from_hash(deployer, salt.as_bytes(), init_code_hash.as_bytes())
}

/// Address of the pool `factory` deploys for the pair and kind.
///
/// Returns `None` when the factory has no registered init code hash, in which
/// case callers report the zero address.
pub fn root_pool_address(
    factory: Address,
    init_code_hash: H256,
    token_a: Address,
    token_b: Address,
    kind: PoolKind,
) -> Option<Address> {
    if init_code_hash.is_zero() || factory.is_zero() {
        return None;
    }
    let salt = pool_salt(token_a, token_b, kind);
    Some(create2_address(factory, salt, init_code_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn addr(s: &str) -> Address {
        Address::from_str(s).unwrap()
    }

    #[test]
    fn test_create2_matches_uniswap_v2_pair() {
        // USDC/WETH pair on Ethereum mainnet.
        let factory = addr("0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f");
        let init_hash = H256::from_str("0x96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f").unwrap();
        let usdc = addr("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
        let weth = addr("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");

        let mut packed = Vec::new();
        packed.extend_from_slice(usdc.as_bytes());
        packed.extend_from_slice(weth.as_bytes());
        let salt = H256::from(keccak256(packed));

        assert_eq!(
            create2_address(factory, salt, init_hash),
            addr("0xB4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc")
        );
    }

    #[test]
    fn test_token_order_does_not_matter() {
        let factory = addr("0x1111111111111111111111111111111111111111");
        let hash = H256::repeat_byte(0xab);
        let a = addr("0x00000000000000000000000000000000000000aa");
        let b = addr("0x00000000000000000000000000000000000000bb");
        for kind in [PoolKind::Volatile, PoolKind::Stable, PoolKind::Concentrated { tick_spacing: 100 }] {
            assert_eq!(
                root_pool_address(factory, hash, a, b, kind),
                root_pool_address(factory, hash, b, a, kind)
            );
        }
    }

    #[test]
    fn test_kind_changes_address() {
        let factory = addr("0x1111111111111111111111111111111111111111");
        let hash = H256::repeat_byte(0xab);
        let a = addr("0x00000000000000000000000000000000000000aa");
        let b = addr("0x00000000000000000000000000000000000000bb");
        let volatile = root_pool_address(factory, hash, a, b, PoolKind::Volatile);
        let stable = root_pool_address(factory, hash, a, b, PoolKind::Stable);
        let cl1 = root_pool_address(factory, hash, a, b, PoolKind::Concentrated { tick_spacing: 1 });
        let cl200 = root_pool_address(factory, hash, a, b, PoolKind::Concentrated { tick_spacing: 200 });
        assert_ne!(volatile, stable);
        assert_ne!(cl1, cl200);
        assert_ne!(volatile, cl1);
    }

    #[test]
    fn test_concentrated_salt_layout() {
        let a = addr("0x00000000000000000000000000000000000000aa");
        let b = addr("0x00000000000000000000000000000000000000bb");
        let mut preimage = vec![0u8; 96];
        preimage[31] = 0xaa;
        preimage[63] = 0xbb;
        // int24 -1 sign-extended to 32 bytes
        for byte in preimage[64..].iter_mut() {
            *byte = 0xff;
        }
        assert_eq!(
            pool_salt(a, b, PoolKind::Concentrated { tick_spacing: -1 }),
            H256::from(keccak256(preimage))
        );
    }

    #[test]
    fn test_missing_init_hash_yields_none() {
        let factory = addr("0x1111111111111111111111111111111111111111");
        let a = addr("0x00000000000000000000000000000000000000aa");
        let b = addr("0x00000000000000000000000000000000000000bb");
        assert_eq!(root_pool_address(factory, H256::zero(), a, b, PoolKind::Stable), None);
    }
}
