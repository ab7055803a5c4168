//! Domain types shared by every ledger implementation.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Number of decimals of the governance token.
pub const TOKEN_DECIMALS: u32 = 18;

/// An account address as handed over by the wallet connection.
///
/// Treated as opaque: no checksum or format validation happens here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Token id inside the membership drop (the gating NFT is `"0"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::new("0")
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Governance token amount in base units (18 decimals).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenAmount(u128);

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(0);

    pub fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    /// Whole tokens, e.g. `from_tokens(10)` is `10.0`.
    pub fn from_tokens(tokens: u64) -> Self {
        Self((tokens as u128).saturating_mul(10u128.pow(TOKEN_DECIMALS)))
    }

    pub fn base_units(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn saturating_add(self, other: TokenAmount) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

/// Formats with the token's decimals, keeping at least one fractional digit.
impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = 10u128.pow(TOKEN_DECIMALS);
        let whole = self.0 / unit;
        let frac = self.0 % unit;
        if frac == 0 {
            return write!(f, "{}.0", whole);
        }
        let digits = format!("{:0width$}", frac, width = TOKEN_DECIMALS as usize);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

/// Parses a base-unit integer string, as the gateway sends them.
impl FromStr for TokenAmount {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u128>().map(Self)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Raw::Number(n) => Ok(Self(n as u128)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(String);

impl ProposalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProposalId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One named option of a proposal. `kind` is the contract's vote type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub kind: u8,
    pub label: String,
}

impl Choice {
    pub fn new(kind: u8, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
        }
    }
}

/// A governance proposal as fetched from the vote contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub description: String,
    /// Options in contract order.
    pub choices: Vec<Choice>,
    /// Accumulated weight per choice label.
    pub vote_counts: HashMap<String, TokenAmount>,
}

impl Proposal {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: ProposalId::new(id),
            description: description.into(),
            choices: Vec::new(),
            vote_counts: HashMap::new(),
        }
    }

    /// Add a choice with zero votes (builder pattern).
    pub fn with_choice(mut self, kind: u8, label: impl Into<String>) -> Self {
        let label = label.into();
        self.vote_counts.insert(label.clone(), TokenAmount::ZERO);
        self.choices.push(Choice::new(kind, label));
        self
    }

    /// The usual against/for/abstain triple.
    pub fn with_standard_choices(self) -> Self {
        self.with_choice(0, "Against")
            .with_choice(1, "For")
            .with_choice(2, "Abstain")
    }

    /// Look up a choice by label, ignoring case.
    pub fn choice(&self, label: &str) -> Option<&Choice> {
        self.choices
            .iter()
            .find(|c| c.label.eq_ignore_ascii_case(label))
    }

    pub fn votes_for(&self, label: &str) -> TokenAmount {
        self.vote_counts.get(label).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A submitted, not yet confirmed, transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTx {
    pub hash: TxHash,
    pub signer: Identity,
}

/// Signer binding for write calls.
///
/// Sessions are immutable snapshots: rebinding the signer creates a new
/// session with a higher epoch, so calls already holding the old one keep
/// targeting the old signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    signer: Identity,
    epoch: u64,
}

impl Session {
    pub fn new(signer: Identity, epoch: u64) -> Self {
        Self { signer, epoch }
    }

    pub fn signer(&self) -> &Identity {
        &self.signer
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Addresses of the three contracts the client talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddresses {
    pub drop: String,
    pub token: String,
    pub vote: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_formats_like_token_units() {
        assert_eq!(TokenAmount::from_tokens(10).to_string(), "10.0");
        assert_eq!(TokenAmount::ZERO.to_string(), "0.0");
        assert_eq!(
            TokenAmount::from_base_units(1_500_000_000_000_000_000).to_string(),
            "1.5"
        );
        assert_eq!(TokenAmount::from_base_units(1).to_string(), "0.000000000000000001");
    }

    #[test]
    fn test_amount_deserializes_from_string_or_number() {
        let from_text: TokenAmount = serde_json::from_str("\"1000000000000000000000\"").unwrap();
        assert_eq!(from_text, TokenAmount::from_tokens(1000));

        let from_number: TokenAmount = serde_json::from_str("42").unwrap();
        assert_eq!(from_number.base_units(), 42);

        assert!(serde_json::from_str::<TokenAmount>("\"ten\"").is_err());
    }

    #[test]
    fn test_choice_lookup_ignores_case() {
        let proposal = Proposal::new("1", "Mint more tokens").with_standard_choices();
        assert_eq!(proposal.choice("for").map(|c| c.kind), Some(1));
        assert_eq!(proposal.choice("ABSTAIN").map(|c| c.kind), Some(2));
        assert!(proposal.choice("maybe").is_none());
        assert!(proposal.votes_for("For").is_zero());
    }
}
