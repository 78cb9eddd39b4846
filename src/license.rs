//! Licensing service boundary.
//!
//! The engine asks the remote service one question, "may this plan hold
//! another wildcard certificate", and tells it which machine ran `init`. No
//! key material or certificate content is ever sent.
//!
//! When the service cannot be reached the wildcard check degrades to a local
//! decision that allows issuance, and the reason is returned so the caller can
//! warn about it.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::configs::LicenseConfig;
use crate::error::{CaError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FREE_PLAN: &str = "free";
pub const MAX_WILDCARD_CERTS_LIMIT: &str = "max_wildcard_certs";

/// Plan and limits as reported by `GET /v1/license`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct License {
    pub plan: String,
    #[serde(default)]
    pub limits: HashMap<String, i64>,
}

impl License {
    /// A positive limit, or `None` when the limit is absent or unlimited (`-1`).
    pub fn max_wildcard_certs(&self) -> Option<usize> {
        self.limits
            .get(MAX_WILDCARD_CERTS_LIMIT)
            .copied()
            .filter(|max| *max > 0)
            .and_then(|max| usize::try_from(max).ok())
    }
}

/// Body of `POST /v1/machines/ping`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MachineInfo {
    pub hostname: String,
    pub os: String,
    pub arch: String,
}

impl MachineInfo {
    pub fn current() -> Self {
        Self {
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string()),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// Source of plan entitlements.
pub trait LicenseSource {
    fn license(&self) -> Result<License>;
    fn machine_ping(&self, machine: &MachineInfo) -> Result<()>;
}

/// HTTP client for the licensing service.
pub struct LicenseClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::blocking::Client,
}

impl LicenseClient {
    pub fn new(config: &LicenseConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CaError::LicenseUnavailable(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.is_empty()),
            http,
        })
    }

    fn authorize(&self, request: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<reqwest::blocking::Response> {
        let response = self
            .authorize(request)
            .send()
            .map_err(|e| CaError::LicenseUnavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CaError::LicenseUnavailable(format!(
                "API error ({}): {}",
                status.as_u16(),
                body.trim()
            )));
        }
        Ok(response)
    }
}

impl LicenseSource for LicenseClient {
    fn license(&self) -> Result<License> {
        let url = format!("{}/v1/license", self.base_url);
        self.send(self.http.get(&url))?
            .json::<License>()
            .map_err(|e| CaError::LicenseUnavailable(format!("failed to decode license: {}", e)))
    }

    fn machine_ping(&self, machine: &MachineInfo) -> Result<()> {
        let url = format!("{}/v1/machines/ping", self.base_url);
        self.send(self.http.post(&url).json(machine))?;
        Ok(())
    }
}

/// Outcome of the wildcard entitlement check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WildcardDecision {
    Allowed,
    /// The service was unreachable; issuance proceeds on the local check.
    AllowedLocally { reason: String },
    Denied { current: usize, max: usize },
}

/// Wildcard entitlement for the configured plan.
pub struct WildcardPolicy<'a> {
    plan: &'a str,
    source: &'a dyn LicenseSource,
}

impl<'a> WildcardPolicy<'a> {
    pub fn new(plan: &'a str, source: &'a dyn LicenseSource) -> Self {
        Self { plan, source }
    }

    /// Decide whether one more wildcard certificate may be issued given
    /// `existing` wildcard certificates. Only the free plan is limited.
    pub fn check(&self, existing: usize) -> WildcardDecision {
        if self.plan != FREE_PLAN {
            debug!(plan = self.plan, "plan has no wildcard limit");
            return WildcardDecision::Allowed;
        }

        match self.source.license() {
            Ok(license) => match license.max_wildcard_certs() {
                Some(max) if existing >= max => WildcardDecision::Denied {
                    current: existing,
                    max,
                },
                _ => WildcardDecision::Allowed,
            },
            Err(e) => {
                warn!(error = %e, "could not verify license, proceeding with local check");
                WildcardDecision::AllowedLocally {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// `check`, with a denial turned into `CaError::Permission`.
    pub fn enforce(&self, existing: usize) -> Result<WildcardDecision> {
        match self.check(existing) {
            WildcardDecision::Denied { current, max } => Err(CaError::Permission {
                message: format!(
                    "Free plan limit reached ({}/{} wildcard certs). Upgrade your plan for unlimited wildcard certificates.",
                    current, max
                ),
                manual_command: None,
            }),
            decision => Ok(decision),
        }
    }
}

/// Wildcard quota check against the configured licensing service.
///
/// A client that cannot even be built is treated like an unreachable
/// service: issuance proceeds on the local check.
pub fn enforce_wildcard_quota(config: &LicenseConfig, existing: usize) -> Result<WildcardDecision> {
    enforce_with_source(&config.plan, LicenseClient::new(config), existing)
}

fn enforce_with_source<S: LicenseSource>(
    plan: &str,
    source: Result<S>,
    existing: usize,
) -> Result<WildcardDecision> {
    match source {
        Ok(source) => WildcardPolicy::new(plan, &source).enforce(existing),
        Err(_) if plan != FREE_PLAN => Ok(WildcardDecision::Allowed),
        Err(e) => {
            warn!(error = %e, "license client unavailable, proceeding with local check");
            Ok(WildcardDecision::AllowedLocally {
                reason: e.to_string(),
            })
        }
    }
}
