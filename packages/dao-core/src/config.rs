use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use ledger_client::{ContractAddresses, HttpLedger, Identity, RetryPolicy, TokenId};
use std::env;
use std::time::Duration;

/// Contract addresses and gateway settings loaded from environment variables
#[derive(Debug, Clone)]
pub struct DaoConfig {
    pub drop_address: String,
    pub token_address: String,
    pub vote_address: String,
    pub gateway_url: String,
    pub access_token: Option<String>,
    pub chain: String,
    pub gating_token: TokenId,
    pub call_timeout: Duration,
    pub confirmation_timeout: Duration,
    pub max_retries: u32,
    pub wallet_address: Option<Identity>,
}

impl DaoConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            let value = lookup(key).with_context(|| format!("{key} must be set"))?;
            if value.trim().is_empty() {
                bail!("{key} must not be empty");
            }
            Ok(value.trim().to_string())
        };
        let seconds = |key: &str, default: u64| -> Result<Duration> {
            let secs = match lookup(key) {
                Some(raw) => raw
                    .parse()
                    .with_context(|| format!("{key} must be a whole number of seconds"))?,
                None => default,
            };
            Ok(Duration::from_secs(secs))
        };

        let config = Self {
            drop_address: required("BUNDLE_DROP_ADDRESS")?,
            token_address: required("TOKEN_MODULE_ADDRESS")?,
            vote_address: required("VOTING_MODULE_ADDRESS")?,
            gateway_url: required("LEDGER_GATEWAY_URL")?,
            access_token: lookup("LEDGER_ACCESS_TOKEN").filter(|t| !t.is_empty()),
            chain: lookup("LEDGER_CHAIN").unwrap_or_else(|| "rinkeby".to_string()),
            gating_token: TokenId::new(lookup("GATING_TOKEN_ID").unwrap_or_else(|| "0".to_string())),
            call_timeout: seconds("LEDGER_CALL_TIMEOUT_SECS", 15)?,
            confirmation_timeout: seconds("LEDGER_CONFIRM_TIMEOUT_SECS", 120)?,
            max_retries: match lookup("LEDGER_MAX_RETRIES") {
                Some(raw) => raw
                    .parse()
                    .context("LEDGER_MAX_RETRIES must be a valid number")?,
                None => 2,
            },
            wallet_address: lookup("WALLET_ADDRESS")
                .filter(|a| !a.trim().is_empty())
                .map(Identity::new),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.call_timeout.is_zero() {
            bail!("LEDGER_CALL_TIMEOUT_SECS must be greater than zero");
        }
        if self.confirmation_timeout.is_zero() {
            bail!("LEDGER_CONFIRM_TIMEOUT_SECS must be greater than zero");
        }
        if !self.gateway_url.starts_with("http://") && !self.gateway_url.starts_with("https://") {
            bail!("LEDGER_GATEWAY_URL must be an http(s) URL");
        }
        Ok(())
    }

    pub fn contracts(&self) -> ContractAddresses {
        ContractAddresses {
            drop: self.drop_address.clone(),
            token: self.token_address.clone(),
            vote: self.vote_address.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_call_timeout(self.call_timeout)
            .with_confirmation_timeout(self.confirmation_timeout)
            .with_max_retries(self.max_retries)
    }

    /// Gateway client for the configured chain and contracts.
    pub fn http_ledger(&self) -> HttpLedger {
        let ledger = HttpLedger::new(&self.gateway_url, &self.chain, self.contracts());
        match &self.access_token {
            Some(token) => ledger.with_access_token(token),
            None => ledger,
        }
    }
}
