// Per-client limit on uploaded analyses

use crate::error::{Error, Result};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct AnalysisQuota {
    limit: u32,
    used: HashMap<String, u32>,
}

impl AnalysisQuota {
    /// A limit of 0 disables the quota
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            used: HashMap::new(),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit == 0
    }

    pub fn used(&self, client: &str) -> u32 {
        self.used.get(client).copied().unwrap_or(0)
    }

    /// Remaining analyses, `None` when unlimited
    pub fn remaining(&self, client: &str) -> Option<u32> {
        if self.is_unlimited() {
            None
        } else {
            Some(self.limit.saturating_sub(self.used(client)))
        }
    }

    /// Claim one analysis up front; fails without counting when the limit is reached
    pub fn reserve(&mut self, client: &str) -> Result<Option<u32>> {
        if !self.is_unlimited() && self.used(client) >= self.limit {
            return Err(Error::QuotaExceeded {
                client: client.to_string(),
                limit: self.limit,
            });
        }
        *self.used.entry(client.to_string()).or_insert(0) += 1;
        Ok(self.remaining(client))
    }

    /// Give back a reservation whose analysis did not complete
    pub fn release(&mut self, client: &str) {
        if let Some(used) = self.used.get_mut(client) {
            *used = used.saturating_sub(1);
            if *used == 0 {
                self.used.remove(client);
            }
        }
    }
}
