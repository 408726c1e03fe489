//! Scope governor - blacklist/whitelist target checks
//!
//! Matching is case-insensitive substring containment, not structured address
//! parsing. That means "127.0.0.1.evil.com" is rejected because it contains
//! "127.0.0.1" - a known limitation of the containment model, kept deliberate
//! and pinned by tests rather than silently hardened.

use thiserror::Error;

/// Errors from scope checks
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("target '{target}' is in the blacklist (matches '{pattern}')")]
    Blacklisted { target: String, pattern: String },

    #[error("target '{target}' is not in the whitelist")]
    NotWhitelisted { target: String },
}

/// Blacklist/whitelist scope policy.
///
/// A blacklist hit rejects regardless of whitelist state. When the whitelist
/// is non-empty, a target must match at least one whitelist entry.
#[derive(Debug, Clone)]
pub struct ScopePolicy {
    blacklist: Vec<String>,
    whitelist: Vec<String>,
}

impl Default for ScopePolicy {
    fn default() -> Self {
        Self {
            blacklist: [".gov", ".mil", "localhost", "127.0.0.1"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            whitelist: Vec::new(),
        }
    }
}

impl ScopePolicy {
    pub fn new(blacklist: Vec<String>, whitelist: Vec<String>) -> Self {
        Self {
            blacklist: blacklist.into_iter().map(|s| s.to_lowercase()).collect(),
            whitelist: whitelist.into_iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    /// Replace the default blacklist.
    pub fn with_blacklist(mut self, list: Vec<String>) -> Self {
        self.blacklist = list.into_iter().map(|s| s.to_lowercase()).collect();
        self
    }

    /// Set a strict whitelist. Empty means everything not blacklisted passes.
    pub fn with_whitelist(mut self, list: Vec<String>) -> Self {
        self.whitelist = list.into_iter().map(|s| s.to_lowercase()).collect();
        self
    }

    /// Check whether a target is within the allowed scope.
    pub fn check(&self, target: &str) -> Result<(), ScopeError> {
        let target = target.trim().to_lowercase();

        for pattern in &self.blacklist {
            if target.contains(pattern.as_str()) {
                return Err(ScopeError::Blacklisted {
                    target,
                    pattern: pattern.clone(),
                });
            }
        }

        if !self.whitelist.is_empty()
            && !self.whitelist.iter().any(|w| target.contains(w.as_str()))
        {
            return Err(ScopeError::NotWhitelisted { target });
        }

        Ok(())
    }
}
