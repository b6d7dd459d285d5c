//! Client-side spending policy enforcement
//!
//! A [`BudgetManager`] guards every payment with a domain allow-list, a
//! per-request ceiling, and a cumulative cap, and keeps a history of
//! completed payments. Crossing 80% of the cumulative cap fires the
//! warning callback once per crossing.

use std::sync::Arc;

use ethereum_types::U256;

use crate::price::{parse_price, to_u256};
use crate::types::PaymentRecord;
use crate::{Result, X402Error};

/// Declarative spending limits for an agent
#[derive(Debug, Clone, Default)]
pub struct SpendingPolicy {
    /// Upper bound per single payment, human-readable (e.g. `"1.00"`)
    pub max_per_request: Option<String>,
    /// Cumulative lifetime cap, human-readable
    pub max_total: Option<String>,
    /// Domains payments may be sent to; empty or absent means no restriction
    pub allowed_domains: Option<Vec<String>>,
}

impl SpendingPolicy {
    /// Policy with no limits
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Set the per-request ceiling
    pub fn with_max_per_request(mut self, amount: impl Into<String>) -> Self {
        self.max_per_request = Some(amount.into());
        self
    }

    /// Set the cumulative cap
    pub fn with_max_total(mut self, amount: impl Into<String>) -> Self {
        self.max_total = Some(amount.into());
        self
    }

    /// Restrict payments to the given domains
    pub fn with_allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = Some(domains);
        self
    }
}

/// Why a spend was denied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpendDenial {
    /// Target domain is not on the allow-list
    DomainNotAllowed { domain: String },
    /// Single payment exceeds the per-request ceiling
    PerRequestLimit { price: String, limit: String },
    /// Payment would push the total past the cumulative cap
    TotalCap { price: String, cap: String },
}

/// Result of a policy check
#[derive(Debug, Clone)]
pub struct SpendCheck {
    /// Whether the spend is within policy
    pub allowed: bool,
    /// Denial reason when not allowed
    pub reason: Option<SpendDenial>,
}

/// Details handed to the budget warning callback
#[derive(Debug, Clone)]
pub struct BudgetWarning {
    /// Total spent so far, smallest units
    pub total_spent: String,
    /// Configured cumulative cap, smallest units
    pub max_total: String,
}

type WarningCallback = Arc<dyn Fn(&BudgetWarning) + Send + Sync>;

/// Tracks spending against a [`SpendingPolicy`]
#[derive(Clone)]
pub struct BudgetManager {
    policy: SpendingPolicy,
    total_spent: U256,
    history: Vec<PaymentRecord>,
    warned: bool,
    warning: Option<WarningCallback>,
}

impl std::fmt::Debug for BudgetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetManager")
            .field("policy", &self.policy)
            .field("total_spent", &self.total_spent)
            .field("history", &self.history.len())
            .field("warned", &self.warned)
            .finish()
    }
}

impl BudgetManager {
    /// Create a manager enforcing `policy`
    pub fn new(policy: SpendingPolicy) -> Self {
        Self {
            policy,
            total_spent: U256::zero(),
            history: Vec::new(),
            warned: false,
            warning: None,
        }
    }

    /// Register a callback fired when spending crosses 80% of the cap
    pub fn with_warning_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&BudgetWarning) + Send + Sync + 'static,
    {
        self.warning = Some(Arc::new(callback));
        self
    }

    /// Check a prospective spend against the policy without recording it.
    ///
    /// Checks run in order: domain allow-list, per-request ceiling,
    /// cumulative cap; the first violation wins.
    pub fn check_spend(&self, price: &str, domain: Option<&str>) -> Result<SpendCheck> {
        if let (Some(allowed), Some(domain)) = (self.policy.allowed_domains.as_ref(), domain) {
            if !allowed.is_empty() && !allowed.iter().any(|d| d == domain) {
                return Ok(denied(SpendDenial::DomainNotAllowed {
                    domain: domain.to_string(),
                }));
            }
        }

        let amount = to_u256(&parse_price(price)?)?;

        if let Some(limit) = &self.policy.max_per_request {
            let limit_units = to_u256(&parse_price(limit)?)?;
            if amount > limit_units {
                return Ok(denied(SpendDenial::PerRequestLimit {
                    price: price.to_string(),
                    limit: limit.clone(),
                }));
            }
        }

        if let Some(cap) = &self.policy.max_total {
            let cap_units = to_u256(&parse_price(cap)?)?;
            let prospective = self
                .total_spent
                .checked_add(amount)
                .unwrap_or(U256::max_value());
            if prospective > cap_units {
                return Ok(denied(SpendDenial::TotalCap {
                    price: price.to_string(),
                    cap: cap.clone(),
                }));
            }
        }

        Ok(SpendCheck {
            allowed: true,
            reason: None,
        })
    }

    /// Check a spend and convert any denial into its typed error
    pub fn assert_spend(&self, price: &str, domain: Option<&str>) -> Result<()> {
        match self.check_spend(price, domain)?.reason {
            None => Ok(()),
            Some(SpendDenial::DomainNotAllowed { domain }) => {
                Err(X402Error::DomainNotAllowed { domain })
            }
            Some(SpendDenial::PerRequestLimit { price, limit }) => {
                Err(X402Error::PerRequestLimit {
                    message: format!("{price} exceeds per-request limit {limit}"),
                })
            }
            Some(SpendDenial::TotalCap { price, cap }) => Err(X402Error::BudgetExceeded {
                message: format!("{price} would exceed total budget {cap}"),
            }),
        }
    }

    /// Record a completed payment of `amount` smallest units
    pub fn record_spend(
        &mut self,
        amount: &str,
        content_id: impl Into<String>,
        domain: Option<String>,
    ) -> Result<()> {
        let units = to_u256(amount)?;
        self.total_spent = self
            .total_spent
            .checked_add(units)
            .unwrap_or(U256::max_value());
        self.history.push(PaymentRecord {
            content_id: content_id.into(),
            amount: amount.to_string(),
            domain,
            timestamp: chrono::Utc::now().timestamp() as u64,
        });
        self.maybe_warn()?;
        Ok(())
    }

    /// Total spent so far, smallest units
    pub fn total_spent(&self) -> String {
        self.total_spent.to_string()
    }

    /// Remaining budget under the cumulative cap, smallest units
    pub fn remaining(&self) -> Result<Option<String>> {
        match &self.policy.max_total {
            None => Ok(None),
            Some(cap) => {
                let cap_units = to_u256(&parse_price(cap)?)?;
                Ok(Some(cap_units.saturating_sub(self.total_spent).to_string()))
            }
        }
    }

    /// Completed payment history, oldest first
    pub fn history(&self) -> &[PaymentRecord] {
        &self.history
    }

    /// The active policy
    pub fn policy(&self) -> &SpendingPolicy {
        &self.policy
    }

    // Fires once per upward crossing of 80% of the cap.
    fn maybe_warn(&mut self) -> Result<()> {
        let Some(cap) = &self.policy.max_total else {
            return Ok(());
        };
        let cap_units = to_u256(&parse_price(cap)?)?;
        let threshold = cap_units
            .checked_mul(U256::from(8u8))
            .map(|v| v / U256::from(10u8))
            .unwrap_or(U256::max_value());

        if self.total_spent >= threshold {
            if !self.warned {
                self.warned = true;
                if let Some(callback) = &self.warning {
                    callback(&BudgetWarning {
                        total_spent: self.total_spent.to_string(),
                        max_total: cap_units.to_string(),
                    });
                }
            }
        } else {
            self.warned = false;
        }
        Ok(())
    }
}

fn denied(reason: SpendDenial) -> SpendCheck {
    SpendCheck {
        allowed: false,
        reason: Some(reason),
    }
}
