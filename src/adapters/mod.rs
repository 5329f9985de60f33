// On-chain source adapters
// Raw-selector `eth_call`s over an ethers HTTP provider, one timeout per call.

pub mod erc20;
pub mod factory_registry;
pub mod pool_factory;
pub mod voter;

pub use erc20::Erc20Source;
pub use factory_registry::RegistryContract;
pub use pool_factory::PoolFactorySource;
pub use voter::VoterContract;

use anyhow::{Context, Result};
use ethers::abi::{self, ParamType, Token as AbiToken};
use ethers::middleware::Middleware;
use ethers::prelude::{Http, Provider};
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use ethers::utils::keccak256;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::warn;

use crate::error::SourceError;
use crate::settings::RpcSettings;
use crate::sources::SourceResult;

/// Thin `eth_call` wrapper shared by the adapters.
#[derive(Clone)]
pub struct RpcClient {
    provider: Arc<Provider<Http>>,
    call_timeout: Duration,
}

impl RpcClient {
    pub fn new(provider: Arc<Provider<Http>>, call_timeout: Duration) -> Self {
        Self {
            provider,
            call_timeout,
        }
    }

    pub fn connect(settings: &RpcSettings) -> Result<Self> {
        let provider = Provider::<Http>::try_from(settings.http_url.as_str())
            .with_context(|| format!("invalid RPC url {}", settings.http_url))?;
        Ok(Self::new(
            Arc::new(provider),
            Duration::from_millis(settings.call_timeout_ms),
        ))
    }

    /// Calls `signature` (e.g. `"balanceOf(address)"`) on `to`.
    pub async fn call(&self, to: Address, signature: &str, args: &[AbiToken]) -> SourceResult<Bytes> {
        let mut data = keccak256(signature.as_bytes())[..4].to_vec();
        data.extend(abi::encode(args));
        let call = TransactionRequest::new().to(to).data(Bytes::from(data));

        match timeout(self.call_timeout, self.provider.call(&call.into(), None)).await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) => {
                let msg = e.to_string();
                if msg.contains("revert") {
                    Err(SourceError::Reverted(format!("{} on {:?}: {}", signature, to, msg)))
                } else {
                    warn!("{} failed for {:?}: {}", signature, to, msg);
                    Err(SourceError::Unavailable(format!("{}: {}", signature, msg)))
                }
            }
            Err(_) => {
                warn!("{} timeout for {:?}", signature, to);
                Err(SourceError::Unavailable(format!("{} timed out", signature)))
            }
        }
    }

    /// Calls and ABI-decodes the return data.
    pub async fn call_decode(
        &self,
        to: Address,
        signature: &str,
        args: &[AbiToken],
        outputs: &[ParamType],
    ) -> SourceResult<Vec<AbiToken>> {
        let bytes = self.call(to, signature, args).await?;
        // Calls to accounts without code succeed with empty data.
        if bytes.is_empty() {
            return Err(SourceError::Reverted(format!("{} returned no data", signature)));
        }
        abi::decode(outputs, &bytes).map_err(|e| SourceError::Malformed(format!("{}: {}", signature, e)))
    }

    pub async fn address(&self, to: Address, signature: &str, args: &[AbiToken]) -> SourceResult<Address> {
        let out = self.call_decode(to, signature, args, &[ParamType::Address]).await?;
        first(out, signature)?
            .into_address()
            .ok_or_else(|| SourceError::Malformed(format!("{}: expected address", signature)))
    }

    pub async fn uint(&self, to: Address, signature: &str, args: &[AbiToken]) -> SourceResult<U256> {
        let out = self.call_decode(to, signature, args, &[ParamType::Uint(256)]).await?;
        first(out, signature)?
            .into_uint()
            .ok_or_else(|| SourceError::Malformed(format!("{}: expected uint", signature)))
    }

    pub async fn int(&self, to: Address, signature: &str) -> SourceResult<i32> {
        let out = self.call_decode(to, signature, &[], &[ParamType::Int(256)]).await?;
        first(out, signature)?
            .into_int()
            .map(as_i32)
            .ok_or_else(|| SourceError::Malformed(format!("{}: expected int", signature)))
    }

    pub async fn boolean(&self, to: Address, signature: &str, args: &[AbiToken]) -> SourceResult<bool> {
        let out = self.call_decode(to, signature, args, &[ParamType::Bool]).await?;
        first(out, signature)?
            .into_bool()
            .ok_or_else(|| SourceError::Malformed(format!("{}: expected bool", signature)))
    }

    pub async fn has_code(&self, at: Address) -> SourceResult<bool> {
        match timeout(self.call_timeout, self.provider.get_code(at, None)).await {
            Ok(Ok(code)) => Ok(!code.is_empty()),
            Ok(Err(e)) => Err(SourceError::Unavailable(format!("eth_getCode: {}", e))),
            Err(_) => {
                warn!("eth_getCode timeout for {:?}", at);
                Err(SourceError::Unavailable("eth_getCode timed out".to_string()))
            }
        }
    }
}

pub(crate) fn first(tokens: Vec<AbiToken>, signature: &str) -> SourceResult<AbiToken> {
    tokens
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::Malformed(format!("{}: empty return", signature)))
}

/// Reads a sign-extended ABI `int` word as `i32`, truncating to the low 32 bits.
pub(crate) fn as_i32(raw: U256) -> i32 {
    raw.low_u32() as i32
}
