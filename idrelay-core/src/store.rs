//! # Request Store
//!
//! Holds every identity request for the lifetime of the process and drives
//! its lifecycle:
//!
//! ```text
//! InProgress ──resolve──▶ Complete | Rejected
//!     │
//!     └──────sweep──────▶ Expired
//!
//! any status ──sweep (delete_after)──▶ evicted
//! ```
//!
//! Records live in a [`DashMap`], so `create`, `resolve`, `state` and `sweep`
//! only ever lock the shard holding the record they touch. Status and
//! principal are written under the same entry guard and are never observed
//! half-updated. Callers only receive owned snapshots.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::config::{RequestConfig, ResolvePolicy};

pub type RequestId = String;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    InProgress,
    Complete,
    Rejected,
    Expired,
}

impl RequestStatus {
    /// Whether the request has left `InProgress` for good.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::InProgress)
    }
}

/// The outcomes an external actor may resolve a request with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Complete,
    Rejected,
}

impl From<Resolution> for RequestStatus {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Complete => RequestStatus::Complete,
            Resolution::Rejected => RequestStatus::Rejected,
        }
    }
}

/// A tracked identity verification request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IdentityRequest {
    pub id: RequestId,
    #[serde(rename = "created")]
    pub created_at: DateTime<Utc>,
    pub status: RequestStatus,
    #[serde(rename = "upn")]
    pub principal: Option<String>,
}

impl IdentityRequest {
    fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at,
            status: RequestStatus::InProgress,
            principal: None,
        }
    }

    fn snapshot(&self) -> RequestState {
        RequestState {
            id: self.id.clone(),
            status: self.status,
            principal: self.principal.clone(),
        }
    }
}

/// Immutable projection of a request handed to callers and observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RequestState {
    pub id: RequestId,
    pub status: RequestStatus,
    #[serde(rename = "upn")]
    pub principal: Option<String>,
}

/// Counts of records touched by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub evicted: usize,
}

pub struct RequestStore {
    requests: DashMap<RequestId, IdentityRequest>,
    expires_after: TimeDelta,
    delete_after: TimeDelta,
    resolve_policy: ResolvePolicy,
}

impl Default for RequestStore {
    fn default() -> Self {
        Self::new(&RequestConfig::default())
    }
}

impl RequestStore {
    pub fn new(config: &RequestConfig) -> Self {
        Self {
            requests: DashMap::new(),
            expires_after: to_delta(config.expires_after),
            delete_after: to_delta(config.delete_after),
            resolve_policy: config.resolve_policy,
        }
    }

    /// Registers a new in-progress request and returns a copy of it.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn create(&self) -> IdentityRequest {
        let request = IdentityRequest::new(Utc::now());
        self.requests.insert(request.id.clone(), request.clone());
        debug!("Identity request {} created", request.id);
        request
    }

    /// Sets status and principal of an existing request.
    ///
    /// With [`ResolvePolicy::Overwrite`] a request that is already complete,
    /// rejected or expired is silently resolved again. With
    /// [`ResolvePolicy::FirstWins`] it is left untouched and
    /// [`StoreError::AlreadyResolved`] is returned.
    #[tracing::instrument(skip(self, principal), level = "debug")]
    pub fn resolve(
        &self,
        id: &str,
        resolution: Resolution,
        principal: impl Into<String>,
    ) -> StoreResult<RequestState> {
        let mut request = self.requests.get_mut(id).ok_or_else(|| StoreError::NotFound {
            request_id: id.to_string(),
        })?;

        if self.resolve_policy == ResolvePolicy::FirstWins && request.status.is_terminal() {
            return Err(StoreError::AlreadyResolved {
                request_id: id.to_string(),
                status: request.status,
            });
        }

        request.status = resolution.into();
        request.principal = Some(principal.into());
        info!("Identity request {} resolved as {}", id, request.status);
        Ok(request.snapshot())
    }

    pub fn complete(&self, id: &str, principal: impl Into<String>) -> StoreResult<RequestState> {
        self.resolve(id, Resolution::Complete, principal)
    }

    pub fn reject(&self, id: &str, principal: impl Into<String>) -> StoreResult<RequestState> {
        self.resolve(id, Resolution::Rejected, principal)
    }

    pub fn state(&self, id: &str) -> StoreResult<RequestState> {
        self.requests
            .get(id)
            .map(|request| request.snapshot())
            .ok_or_else(|| StoreError::NotFound {
                request_id: id.to_string(),
            })
    }

    pub fn request(&self, id: &str) -> StoreResult<IdentityRequest> {
        self.requests
            .get(id)
            .map(|request| request.value().clone())
            .ok_or_else(|| StoreError::NotFound {
                request_id: id.to_string(),
            })
    }

    /// Expires stale in-progress requests and evicts old ones.
    ///
    /// `retain` visits one shard at a time, so concurrent callers only wait
    /// on the shard currently being swept.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        self.requests.retain(|id, request| {
            if request.status == RequestStatus::InProgress
                && is_past(request.created_at, self.expires_after, now)
            {
                request.status = RequestStatus::Expired;
                report.expired += 1;
                debug!("Identity request {} expired", id);
            }
            if is_past(request.created_at, self.delete_after, now) {
                report.evicted += 1;
                debug!("Identity request {} evicted", id);
                return false;
            }
            true
        });
        if report.expired > 0 || report.evicted > 0 {
            info!(
                "Sweep finished: {} expired, {} evicted, {} remaining",
                report.expired,
                report.evicted,
                self.requests.len()
            );
        }
        report
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

fn to_delta(duration: std::time::Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

fn is_past(created_at: DateTime<Utc>, ttl: TimeDelta, now: DateTime<Utc>) -> bool {
    created_at
        .checked_add_signed(ttl)
        .is_some_and(|deadline| deadline < now)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Identity request not found: {request_id}")]
    NotFound { request_id: RequestId },
    #[error("Identity request {request_id} already resolved as {status}")]
    AlreadyResolved {
        request_id: RequestId,
        status: RequestStatus,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;
