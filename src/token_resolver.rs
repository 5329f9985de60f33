use crate::error::Degradation;
use crate::sources::{TokenSource, VoterSource};
use crate::types::{Resolution, Token};
use ethers::types::{Address, U256};
use futures::stream::{self, StreamExt};
use log::debug;
use std::collections::HashSet;
use std::sync::Arc;

/// Symbol reported for tokens whose metadata cannot be read.
pub const PLACEHOLDER_SYMBOL: &str = "-???-";
/// Longest symbol accepted verbatim, in bytes.
pub const MAX_SYMBOL_BYTES: usize = 32;

/// Validates a raw `symbol()` result.
///
/// Returns the reason for rejection when the symbol must be replaced by the
/// placeholder.
pub fn check_symbol(raw: &str) -> Result<&str, &'static str> {
    if raw.is_empty() {
        return Err("empty symbol");
    }
    if raw.len() > MAX_SYMBOL_BYTES {
        return Err("symbol exceeds byte budget");
    }
    Ok(raw)
}

/// Converts a raw `decimals()` word, rejecting values that do not fit a `u8`.
pub fn check_decimals(raw: U256) -> Result<u8, &'static str> {
    if raw > U256::from(u8::MAX) {
        return Err("decimals out of range");
    }
    Ok(raw.low_u32() as u8)
}

/// Resolves ERC-20 metadata without ever failing.
///
/// Every lookup is isolated: a revert, a timeout or junk data replaces the
/// affected field by its sentinel and records a [`Degradation`] on the returned
/// token, so one broken token never aborts the resolution of a batch.
#[derive(Clone)]
pub struct TokenResolver {
    tokens: Arc<dyn TokenSource>,
    voter: Arc<dyn VoterSource>,
    concurrency: usize,
}

impl TokenResolver {
    pub fn new(tokens: Arc<dyn TokenSource>, voter: Arc<dyn VoterSource>, concurrency: usize) -> Self {
        Self {
            tokens,
            voter,
            concurrency: concurrency.max(1),
        }
    }

    /// Symbol, decimals and existence of `token`.
    pub async fn resolve(&self, token: Address) -> Token {
        let mut degraded = Vec::new();
        let (symbol, decimals) = self.metadata(token, &mut degraded).await;
        finish(token, symbol, decimals, U256::zero(), false, degraded)
    }

    /// Like [`resolve`](Self::resolve), plus the account balance and the voter
    /// whitelist flag.
    pub async fn resolve_for(&self, token: Address, account: Address) -> Token {
        let mut degraded = Vec::new();
        let (symbol, decimals) = self.metadata(token, &mut degraded).await;

        let account_balance = if account.is_zero() || token.is_zero() {
            U256::zero()
        } else {
            match self.tokens.balance_of(token, account).await {
                Ok(balance) => balance,
                Err(e) => {
                    degraded.push(Degradation::new("account_balance", e));
                    U256::zero()
                }
            }
        };

        let listed = if token.is_zero() {
            false
        } else {
            match self.voter.is_whitelisted_token(token).await {
                Ok(listed) => listed,
                Err(e) => {
                    degraded.push(Degradation::new("listed", e));
                    false
                }
            }
        };

        finish(token, symbol, decimals, account_balance, listed, degraded)
    }

    /// Resolves every address not in `exclusions`, keeping input order.
    pub async fn resolve_many(&self, addresses: &[Address], exclusions: &[Address]) -> Vec<Token> {
        self.resolve_many_for(addresses, exclusions, Address::zero()).await
    }

    pub async fn resolve_many_for(
        &self,
        addresses: &[Address],
        exclusions: &[Address],
        account: Address,
    ) -> Vec<Token> {
        let excluded: HashSet<Address> = exclusions.iter().copied().collect();
        let wanted: Vec<Address> = addresses
            .iter()
            .copied()
            .filter(|a| !excluded.contains(a))
            .collect();

        // `buffered` yields in input order regardless of completion order.
        stream::iter(wanted)
            .map(|token| self.resolve_for(token, account))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn metadata(&self, token: Address, degraded: &mut Vec<Degradation>) -> (Option<String>, Option<u8>) {
        if token.is_zero() {
            degraded.push(Degradation::new("token", "zero address"));
            return (None, None);
        }

        match self.tokens.exists(token).await {
            Ok(true) => {}
            Ok(false) => {
                degraded.push(Degradation::new("token", "no code at address"));
                return (None, None);
            }
            Err(e) => degraded.push(Degradation::new("token", e)),
        }

        let (symbol, decimals) = futures::join!(self.tokens.symbol(token), self.tokens.decimals(token));

        let symbol = match symbol {
            Ok(raw) => match check_symbol(&raw) {
                Ok(s) => Some(s.to_string()),
                Err(reason) => {
                    degraded.push(Degradation::new("symbol", reason));
                    None
                }
            },
            Err(e) => {
                degraded.push(Degradation::new("symbol", e));
                None
            }
        };

        let decimals = match decimals {
            Ok(raw) => match check_decimals(raw) {
                Ok(d) => Some(d),
                Err(reason) => {
                    degraded.push(Degradation::new("decimals", reason));
                    None
                }
            },
            Err(e) => {
                degraded.push(Degradation::new("decimals", e));
                None
            }
        };

        (symbol, decimals)
    }
}

fn finish(
    token: Address,
    symbol: Option<String>,
    decimals: Option<u8>,
    account_balance: U256,
    listed: bool,
    degraded: Vec<Degradation>,
) -> Token {
    let status = if degraded.is_empty() {
        Resolution::Resolved
    } else {
        debug!("Token {:?} resolved with fallbacks: {:?}", token, degraded);
        Resolution::Degraded(degraded)
    };
    Token {
        token_address: token,
        symbol: symbol.unwrap_or_else(|| PLACEHOLDER_SYMBOL.to_string()),
        decimals: decimals.unwrap_or(0),
        account_balance,
        listed,
        status,
    }
}
