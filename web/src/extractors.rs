//! Custom Axum extractors.
//!
//! - [`Identity`]: the caller as asserted by the upstream auth layer
//! - [`CorrelationId`]: the request's correlation id
//!
//! Authentication happens upstream (API gateway or session layer). By the time a
//! request reaches this service the identity headers are trusted; requests without
//! them are rejected with 401.
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(identity: Identity, correlation_id: CorrelationId) -> String {
//!     format!("{} ({}) in {}", identity.subject_id, identity.role, correlation_id)
//! }
//! ```

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use gatepass_core::{SubjectId, TenantId};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Header carrying the authenticated subject id.
pub const SUBJECT_ID_HEADER: &str = "X-Subject-Id";
/// Header carrying the subject's role.
pub const SUBJECT_ROLE_HEADER: &str = "X-Subject-Role";
/// Header carrying the tenant the subject is acting in.
pub const TENANT_ID_HEADER: &str = "X-Tenant-Id";

/// Role of the calling subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Regular attendee
    Member,
    /// Runs events for a tenant
    Organizer,
    /// Tenant administrator
    Admin,
}

impl Role {
    /// Whether this role may scan tickets and see event registrations.
    #[must_use]
    pub const fn is_staff(self) -> bool {
        matches!(self, Self::Organizer | Self::Admin)
    }

    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Organizer => "organizer",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "member" => Ok(Self::Member),
            "organizer" => Ok(Self::Organizer),
            "admin" => Ok(Self::Admin),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    /// Who is calling
    pub subject_id: SubjectId,
    /// In what capacity
    pub role: Role,
    /// Tenant the caller belongs to
    pub tenant_id: TenantId,
}

impl Identity {
    /// Reject callers that are not organizers or admins.
    ///
    /// # Errors
    ///
    /// Returns a 403 [`AppError`] for members.
    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(AppError::forbidden("Organizer or admin role required"))
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::unauthorized(format!("Missing {name} header")))
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let subject_id = header(&parts.headers, SUBJECT_ID_HEADER)?
            .parse::<SubjectId>()
            .map_err(|_| AppError::unauthorized(format!("Invalid {SUBJECT_ID_HEADER} header")))?;
        let role = header(&parts.headers, SUBJECT_ROLE_HEADER)?
            .parse::<Role>()
            .map_err(|()| AppError::unauthorized(format!("Invalid {SUBJECT_ROLE_HEADER} header")))?;
        let tenant_id = header(&parts.headers, TENANT_ID_HEADER)?
            .parse::<TenantId>()
            .map_err(|_| AppError::unauthorized(format!("Invalid {TENANT_ID_HEADER} header")))?;

        Ok(Self {
            subject_id,
            role,
            tenant_id,
        })
    }
}

/// Correlation ID for request tracing.
///
/// Prefers the id assigned by [`correlation_id_layer`](crate::middleware::correlation_id_layer),
/// then the `X-Correlation-ID` header, and generates a new UUID v4 otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    /// Read the id from an incoming header map, if present and well formed.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(Self)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Self>()
            .copied()
            .or_else(|| Self::from_headers(&parts.headers))
            .unwrap_or_else(|| Self(Uuid::new_v4())))
    }
}
