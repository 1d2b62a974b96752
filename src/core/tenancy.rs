//! The single tenant access predicate.
//!
//! Every read or write against documents, chunks, users or chat sessions is
//! intersected with a [`TenantScope`] derived here. Only `super_admin`
//! principals ever obtain [`TenantScope::Global`].

use crate::core::errors::ApiError;
use crate::core::security::{Principal, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantScope {
    Global,
    Tenant(i64),
}

impl TenantScope {
    pub fn for_principal(principal: &Principal) -> Result<Self, ApiError> {
        if principal.is_super_admin() {
            return Ok(TenantScope::Global);
        }
        principal
            .domain_id
            .map(TenantScope::Tenant)
            .ok_or_else(|| ApiError::Access("Caller is not assigned to a domain".to_string()))
    }

    pub fn domain_id(&self) -> Option<i64> {
        match self {
            TenantScope::Global => None,
            TenantScope::Tenant(id) => Some(*id),
        }
    }

    pub fn permits(&self, domain_id: Option<i64>) -> bool {
        match self {
            TenantScope::Global => true,
            TenantScope::Tenant(id) => domain_id == Some(*id),
        }
    }
}

/// Scope for a retrieval request. Non-super callers may only name their own domain.
pub fn search_scope(
    principal: &Principal,
    requested_domain: Option<i64>,
) -> Result<TenantScope, ApiError> {
    let own = TenantScope::for_principal(principal)?;
    match (own, requested_domain) {
        (TenantScope::Global, Some(domain_id)) => Ok(TenantScope::Tenant(domain_id)),
        (TenantScope::Global, None) => Ok(TenantScope::Global),
        (TenantScope::Tenant(own_id), Some(domain_id)) if domain_id != own_id => Err(
            ApiError::Access("Cannot query another domain".to_string()),
        ),
        (scope, _) => Ok(scope),
    }
}

pub fn ensure_domain_access(principal: &Principal, domain_id: i64) -> Result<(), ApiError> {
    if TenantScope::for_principal(principal)?.permits(Some(domain_id)) {
        return Ok(());
    }
    Err(ApiError::Access(format!(
        "Domain {} is outside the caller's scope",
        domain_id
    )))
}

pub fn require_role(principal: &Principal, roles: &[Role]) -> Result<(), ApiError> {
    if roles.contains(&principal.role) {
        return Ok(());
    }
    Err(ApiError::Access(format!(
        "Role '{}' is not permitted for this operation",
        principal.role
    )))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn user(user_id: i64, domain_id: i64) -> Principal {
        Principal {
            user_id: Some(user_id),
            username: format!("user{}", user_id),
            role: Role::User,
            domain_id: Some(domain_id),
        }
    }

    pub fn admin(user_id: i64, domain_id: i64) -> Principal {
        Principal {
            user_id: Some(user_id),
            username: format!("admin{}", user_id),
            role: Role::Admin,
            domain_id: Some(domain_id),
        }
    }

    pub fn super_admin(user_id: Option<i64>) -> Principal {
        Principal {
            user_id,
            username: "root".to_string(),
            role: Role::SuperAdmin,
            domain_id: None,
        }
    }
}
