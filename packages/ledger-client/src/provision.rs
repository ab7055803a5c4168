//! One-shot contract provisioning.
//!
//! Deploying the membership drop, creating its NFT and deploying the
//! governance token happen once, before any member connects. The DAO core
//! never calls these; only operator tooling does.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Metadata for a new membership drop collection.
#[derive(Debug, Clone)]
pub struct DropMetadata {
    pub name: String,
    pub description: String,
    pub image: Vec<u8>,
    /// Receiver of primary sale proceeds. The zero address for free drops.
    pub primary_sale_recipient: String,
}

/// Metadata for one NFT inside a drop.
#[derive(Debug, Clone)]
pub struct NftMetadata {
    pub name: String,
    pub description: String,
    pub image: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
}

/// Result of a provisioning call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub address: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn deploy_drop(&self, metadata: DropMetadata) -> Result<Deployment>;

    /// Lazily mint a batch of NFTs into an existing drop.
    async fn create_batch(&self, drop_address: &str, nfts: Vec<NftMetadata>)
        -> Result<Deployment>;

    async fn deploy_token(&self, metadata: TokenMetadata) -> Result<Deployment>;
}

/// The address used as sale recipient when a drop is free.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

impl DropMetadata {
    /// A free drop: proceeds go to the zero address.
    pub fn free(name: impl Into<String>, description: impl Into<String>, image: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            image,
            primary_sale_recipient: ZERO_ADDRESS.to_string(),
        }
    }
}
