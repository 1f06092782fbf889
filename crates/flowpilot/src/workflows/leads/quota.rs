use std::fmt;

use serde::{Serialize, Serializer};

use super::domain::{Company, CompanyId, ResourceKind};
use super::repository::{LeadRepository, RepositoryError};

/// Resource cap resolved from a subscription plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Finite(u64),
    Unlimited,
}

impl Limit {
    pub const fn allows(self, current: u64) -> bool {
        match self {
            Limit::Finite(cap) => current < cap,
            Limit::Unlimited => true,
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Finite(cap) => write!(f, "{cap}"),
            Limit::Unlimited => f.write_str("unlimited"),
        }
    }
}

impl Serialize for Limit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Limit::Finite(cap) => serializer.serialize_u64(*cap),
            Limit::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub leads: Limit,
    pub forms: Limit,
}

impl PlanLimits {
    pub const fn for_resource(&self, resource: ResourceKind) -> Limit {
        match resource {
            ResourceKind::Leads => self.leads,
            ResourceKind::Forms => self.forms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Starter,
    Pro,
    Enterprise,
}

impl PlanTier {
    pub fn from_id(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "starter" => Some(PlanTier::Starter),
            "pro" => Some(PlanTier::Pro),
            "enterprise" => Some(PlanTier::Enterprise),
            _ => None,
        }
    }

    /// Unknown or missing subscription state lands on the lowest tier.
    pub fn resolve(company: Option<&Company>) -> Self {
        company
            .and_then(|company| company.plan.as_deref())
            .and_then(Self::from_id)
            .unwrap_or(PlanTier::Starter)
    }
}

/// Caps per plan tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanCatalog {
    pub starter: PlanLimits,
    pub pro: PlanLimits,
    pub enterprise: PlanLimits,
}

impl PlanCatalog {
    pub const fn limits(&self, tier: PlanTier) -> PlanLimits {
        match tier {
            PlanTier::Starter => self.starter,
            PlanTier::Pro => self.pro,
            PlanTier::Enterprise => self.enterprise,
        }
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self {
            starter: PlanLimits {
                leads: Limit::Finite(100),
                forms: Limit::Finite(2),
            },
            pro: PlanLimits {
                leads: Limit::Finite(500),
                forms: Limit::Finite(20),
            },
            enterprise: PlanLimits {
                leads: Limit::Unlimited,
                forms: Limit::Unlimited,
            },
        }
    }
}

/// Answer to "may this tenant create one more resource?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitCheck {
    pub resource: ResourceKind,
    pub plan: PlanTier,
    pub current: u64,
    pub limit: Limit,
    pub can_create: bool,
}

/// Plan-limit gate. The count is read separately from the later insert, so concurrent
/// creations near the cap may overshoot by the number of requests in flight.
#[derive(Debug, Clone, Default)]
pub struct QuotaGuard {
    catalog: PlanCatalog,
}

impl QuotaGuard {
    pub fn with_catalog(catalog: PlanCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    /// Resolve the cap for `company` and compare it with the lazily fetched count.
    /// Unlimited plans never run `count`.
    pub fn evaluate<E>(
        &self,
        company: Option<&Company>,
        resource: ResourceKind,
        count: impl FnOnce() -> Result<u64, E>,
    ) -> Result<LimitCheck, E> {
        let plan = PlanTier::resolve(company);
        let limit = self.catalog.limits(plan).for_resource(resource);

        let current = match limit {
            Limit::Unlimited => 0,
            Limit::Finite(_) => count()?,
        };

        Ok(LimitCheck {
            resource,
            plan,
            current,
            limit,
            can_create: limit.allows(current),
        })
    }

    pub fn check<R>(
        &self,
        repository: &R,
        company_id: &CompanyId,
        resource: ResourceKind,
    ) -> Result<LimitCheck, RepositoryError>
    where
        R: LeadRepository + ?Sized,
    {
        let company = repository.company(company_id)?;
        self.evaluate(company.as_ref(), resource, || {
            repository.count(company_id, resource)
        })
    }
}
