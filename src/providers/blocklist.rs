//! Known-rugger lookup
//!
//! Consulted in phase 1 of every scan, for each scored counterparty, and as
//! the only source of truth when a scan has to fall back.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::models::errors::AppResult;
use crate::models::types::{RugInvolvement, RugRole, RugType};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlocklistEntry {
    pub reasons: Vec<String>,
    /// Confirmed malicious activity beyond being listed
    pub malicious: bool,
    pub lp_rugger: bool,
    pub honeypot_creator: bool,
    pub rug_involvements: Vec<RugInvolvement>,
}

impl BlocklistEntry {
    pub fn listed(reason: impl Into<String>) -> Self {
        Self {
            reasons: vec![reason.into()],
            ..Default::default()
        }
    }

    pub fn malicious(mut self) -> Self {
        self.malicious = true;
        self
    }

    pub fn with_involvement(mut self, mint: &str, rug_type: RugType, role: RugRole) -> Self {
        match rug_type {
            RugType::LpPull => self.lp_rugger = true,
            RugType::Honeypot => self.honeypot_creator = true,
            _ => {}
        }
        self.rug_involvements.push(RugInvolvement {
            mint: mint.to_string(),
            rug_type,
            role,
        });
        self
    }

    /// Rugs this address deployed itself
    pub fn deployed_rugs(&self) -> usize {
        self.rug_involvements
            .iter()
            .filter(|r| r.role == RugRole::Deployer)
            .count()
    }
}

#[async_trait]
pub trait Blocklist: Send + Sync {
    /// `Ok(None)` when the address is not listed
    async fn lookup(&self, address: &str) -> AppResult<Option<BlocklistEntry>>;
}

/// Process-local blocklist
#[derive(Default)]
pub struct InMemoryBlocklist {
    entries: DashMap<String, BlocklistEntry>,
}

impl InMemoryBlocklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, address: &str, entry: BlocklistEntry) {
        self.entries.insert(address.to_string(), entry);
    }

    pub fn remove(&self, address: &str) -> Option<BlocklistEntry> {
        self.entries.remove(address).map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Blocklist for InMemoryBlocklist {
    async fn lookup(&self, address: &str) -> AppResult<Option<BlocklistEntry>> {
        Ok(self.entries.get(address).map(|e| e.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup() {
        let list = InMemoryBlocklist::new();
        list.insert(
            "Rugger",
            BlocklistEntry::listed("Pulled LP on MOON")
                .with_involvement("Mint1", RugType::LpPull, RugRole::LpRemover)
                .with_involvement("Mint2", RugType::Honeypot, RugRole::Deployer),
        );

        let entry = list.lookup("Rugger").await.unwrap().unwrap();
        assert!(entry.lp_rugger);
        assert!(entry.honeypot_creator);
        assert_eq!(entry.deployed_rugs(), 1);
        assert!(list.lookup("Clean").await.unwrap().is_none());
    }
}
