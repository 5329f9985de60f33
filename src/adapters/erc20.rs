use async_trait::async_trait;
use ethers::abi::{ParamType, Token as AbiToken};
use ethers::types::{Address, U256};

use super::{first, RpcClient};
use crate::error::SourceError;
use crate::sources::{SourceResult, TokenSource};

/// ERC-20 metadata straight from the token contracts.
#[derive(Clone)]
pub struct Erc20Source {
    rpc: RpcClient,
}

impl Erc20Source {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl TokenSource for Erc20Source {
    async fn exists(&self, token: Address) -> SourceResult<bool> {
        self.rpc.has_code(token).await
    }

    async fn symbol(&self, token: Address) -> SourceResult<String> {
        let raw = self.rpc.call(token, "symbol()", &[]).await?;
        decode_symbol(&raw)
    }

    async fn decimals(&self, token: Address) -> SourceResult<U256> {
        self.rpc.uint(token, "decimals()", &[]).await
    }

    async fn balance_of(&self, token: Address, account: Address) -> SourceResult<U256> {
        self.rpc
            .uint(token, "balanceOf(address)", &[AbiToken::Address(account)])
            .await
    }
}

/// Decodes a `symbol()` return: ABI `string`, or a right-padded `bytes32` for
/// legacy tokens.
pub fn decode_symbol(raw: &[u8]) -> SourceResult<String> {
    if raw.is_empty() {
        return Err(SourceError::Reverted("symbol() returned no data".to_string()));
    }
    if let Ok(tokens) = ethers::abi::decode(&[ParamType::String], raw) {
        if let Some(symbol) = first(tokens, "symbol()")?.into_string() {
            return Ok(symbol);
        }
    }
    if raw.len() == 32 {
        let end = raw.iter().position(|b| *b == 0).unwrap_or(32);
        return String::from_utf8(raw[..end].to_vec())
            .map_err(|e| SourceError::Malformed(format!("symbol(): {}", e)));
    }
    Err(SourceError::Malformed("symbol(): undecodable return".to_string()))
}
