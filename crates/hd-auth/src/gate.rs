//! Request gate
//!
//! The single enforcement point every protected route passes through:
//! bearer extraction, token verification, a live user re-check, and role
//! materialization. Framework-agnostic; `hd-api` adapts it into an axum
//! extractor.
//!
//! Per request: `Unauthenticated → TokenExtracted → TokenVerified →
//! UserLoaded → Authorized`, rejecting at any stage.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::jwt::{extract_bearer_token, AccessTokenService};
use crate::permissions::CurrentUser;
use crate::store::{CredentialStore, StoreError};
use crate::AuthError;

/// Request headers relevant for authentication
#[derive(Debug, Default, Clone)]
pub struct RequestHeaders {
    pub authorization: Option<String>,
    pub user_agent: Option<String>,
    pub forwarded_for: Option<String>,
}

impl RequestHeaders {
    /// Create from a list of header key-value pairs
    pub fn from_pairs(pairs: &[(impl AsRef<str>, impl AsRef<str>)]) -> Self {
        let mut headers = Self::default();

        for (name, value) in pairs {
            let value = value.as_ref().to_string();
            match name.as_ref().to_lowercase().as_str() {
                "authorization" => headers.authorization = Some(value),
                "user-agent" => headers.user_agent = Some(value),
                "x-forwarded-for" => headers.forwarded_for = Some(value),
                _ => {}
            }
        }

        headers
    }

    /// Client address: first entry of `X-Forwarded-For`, if present
    pub fn client_ip(&self) -> Option<&str> {
        self.forwarded_for
            .as_deref()
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Authenticates requests against the live credential store.
pub struct RequestGate {
    access: AccessTokenService,
    credentials: Arc<dyn CredentialStore>,
    store_timeout: Duration,
}

impl RequestGate {
    pub fn new(access: AccessTokenService, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            access,
            credentials,
            store_timeout: Duration::from_secs(5),
        }
    }

    /// Override the per-call store timeout
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Resolve the current user from request headers, or reject.
    ///
    /// The user record is re-loaded on every request: claims can outlive a
    /// deactivation within the access-token window, and this is the
    /// mitigation. The role is re-loaded too, so permission changes take
    /// effect immediately; a dangling role materializes as an empty grant.
    pub async fn authenticate(&self, headers: &RequestHeaders) -> Result<CurrentUser, AuthError> {
        let authorization = headers
            .authorization
            .as_deref()
            .ok_or(AuthError::Unauthenticated)?;
        let token = extract_bearer_token(authorization).ok_or(AuthError::Unauthenticated)?;

        let claims = self.access.verify(token).map_err(|_| AuthError::Unauthenticated)?;
        let user_id = claims.user_id().ok_or(AuthError::Unauthenticated)?;

        let user = self
            .bounded(self.credentials.find_user_by_id(user_id))
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        if !user.active {
            tracing::debug!(user_id, "request from deactivated user");
            return Err(AuthError::Unauthenticated);
        }

        let role = self
            .bounded(self.credentials.find_role_by_id(user.role_id))
            .await?;

        Ok(CurrentUser::from_parts(&user, role.as_ref()))
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, AuthError> {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result.map_err(AuthError::from),
            Err(_) => Err(AuthError::Unavailable("store call timed out".into())),
        }
    }
}

/// Reject unless the user holds the named permission
pub fn require_permission(user: &CurrentUser, permission: &str) -> Result<(), AuthError> {
    if user.has_permission(permission) {
        Ok(())
    } else {
        tracing::debug!(user_id = user.id, permission, "permission denied");
        Err(AuthError::Forbidden)
    }
}

/// Reject unless the user holds an admin role
pub fn require_admin(user: &CurrentUser) -> Result<(), AuthError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

/// Sliding-window throttle for failed login attempts, keyed by
/// (login, client ip). Sits in front of the login endpoint; independent of
/// token logic.
pub struct LoginRateLimiter {
    max_attempts: u32,
    window: Duration,
    failures: DashMap<String, Vec<Instant>>,
}

impl LoginRateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            failures: DashMap::new(),
        }
    }

    fn key(login: &str, ip: Option<&str>) -> String {
        format!("{}|{}", login.to_lowercase(), ip.unwrap_or("unknown"))
    }

    fn window_start(&self) -> Option<Instant> {
        Instant::now().checked_sub(self.window)
    }

    /// Whether another attempt is allowed right now
    pub fn check(&self, login: &str, ip: Option<&str>) -> bool {
        match self.failures.get(&Self::key(login, ip)) {
            Some(entry) => {
                let cutoff = self.window_start();
                let recent = entry
                    .iter()
                    .filter(|t| cutoff.map_or(true, |c| **t > c))
                    .count();
                recent < self.max_attempts as usize
            }
            None => true,
        }
    }

    /// Record a failed attempt
    pub fn record_failure(&self, login: &str, ip: Option<&str>) {
        let cutoff = self.window_start();
        let mut entry = self.failures.entry(Self::key(login, ip)).or_default();
        entry.retain(|t| cutoff.map_or(true, |c| *t > c));
        entry.push(Instant::now());
    }

    /// Clear the window after a successful login
    pub fn record_success(&self, login: &str, ip: Option<&str>) {
        self.failures.remove(&Self::key(login, ip));
    }

    /// Seconds a throttled client should wait before retrying
    pub fn retry_after_seconds(&self) -> u64 {
        self.window.as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryCredentialStore, RoleRecord, UserRecord};
    use std::collections::HashSet;

    fn seeded_gate() -> (RequestGate, Arc<MemoryCredentialStore>, AccessTokenService) {
        let access = AccessTokenService::new(b"test-secret-key-at-least-32-bytes");
        let credentials = Arc::new(MemoryCredentialStore::new());

        credentials.insert_role(RoleRecord {
            id: 2,
            name: "Agent".into(),
            admin: false,
            system: false,
            permissions: HashSet::from(["view_tickets".to_string()]),
        });
        credentials.insert_user(UserRecord {
            id: 5,
            login: "agent".into(),
            mail: "agent@example.com".into(),
            hashed_password: None,
            role_id: 2,
            active: true,
            last_login_at: None,
        });

        let gate = RequestGate::new(access.clone(), credentials.clone());
        (gate, credentials, access)
    }

    fn bearer(token: &str) -> RequestHeaders {
        RequestHeaders {
            authorization: Some(format!("Bearer {token}")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_authenticate_happy_path() {
        let (gate, _credentials, access) = seeded_gate();
        let token = access.issue(5, "agent", 2, false).unwrap();

        let user = gate.authenticate(&bearer(&token)).await.unwrap();
        assert_eq!(user.id, 5);
        assert!(user.has_permission("view_tickets"));
        assert!(!user.is_admin());
    }

    #[tokio::test]
    async fn test_missing_and_malformed_headers_rejected() {
        let (gate, _, access) = seeded_gate();
        let token = access.issue(5, "agent", 2, false).unwrap();

        let no_header = RequestHeaders::default();
        assert!(matches!(
            gate.authenticate(&no_header).await,
            Err(AuthError::Unauthenticated)
        ));

        // Wrong scheme, even with a valid token behind it.
        let basic = RequestHeaders {
            authorization: Some(format!("Basic {token}")),
            ..Default::default()
        };
        assert!(matches!(
            gate.authenticate(&basic).await,
            Err(AuthError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let (gate, ..) = seeded_gate();
        assert!(matches!(
            gate.authenticate(&bearer("garbage")).await,
            Err(AuthError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_deactivated_user_rejected_with_live_token() {
        let (gate, credentials, access) = seeded_gate();
        let token = access.issue(5, "agent", 2, false).unwrap();

        assert!(gate.authenticate(&bearer(&token)).await.is_ok());

        // Deactivation bites on the very next request, inside the token window.
        credentials.set_active(5, false);
        assert!(matches!(
            gate.authenticate(&bearer(&token)).await,
            Err(AuthError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_vanished_user_rejected() {
        let (gate, _, access) = seeded_gate();
        let token = access.issue(99, "ghost", 2, false).unwrap();

        assert!(matches!(
            gate.authenticate(&bearer(&token)).await,
            Err(AuthError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_dangling_role_yields_empty_grant() {
        let (gate, credentials, access) = seeded_gate();
        credentials.insert_user(UserRecord {
            id: 6,
            login: "orphan".into(),
            mail: "orphan@example.com".into(),
            hashed_password: None,
            role_id: 999,
            active: true,
            last_login_at: None,
        });
        let token = access.issue(6, "orphan", 999, false).unwrap();

        let user = gate.authenticate(&bearer(&token)).await.unwrap();
        assert!(!user.is_admin());
        assert!(!user.has_permission("view_tickets"));
    }

    #[test]
    fn test_require_permission_and_admin() {
        let admin_role = RoleRecord {
            id: 1,
            name: "Administrator".into(),
            admin: true,
            system: true,
            permissions: HashSet::new(),
        };
        let user_record = UserRecord {
            id: 1,
            login: "admin".into(),
            mail: "admin@example.com".into(),
            hashed_password: None,
            role_id: 1,
            active: true,
            last_login_at: None,
        };
        let admin = CurrentUser::from_parts(&user_record, Some(&admin_role));
        let nobody = CurrentUser::from_parts(&user_record, None);

        assert!(require_permission(&admin, "anything").is_ok());
        assert!(require_admin(&admin).is_ok());
        assert!(matches!(
            require_permission(&nobody, "anything"),
            Err(AuthError::Forbidden)
        ));
        assert!(matches!(require_admin(&nobody), Err(AuthError::Forbidden)));
    }

    #[test]
    fn test_rate_limiter_window() {
        let limiter = LoginRateLimiter::new(3, Duration::from_secs(60));

        assert!(limiter.check("admin", Some("10.0.0.1")));
        for _ in 0..3 {
            limiter.record_failure("admin", Some("10.0.0.1"));
        }
        assert!(!limiter.check("admin", Some("10.0.0.1")));

        // Different ip and different login are independent buckets.
        assert!(limiter.check("admin", Some("10.0.0.2")));
        assert!(limiter.check("other", Some("10.0.0.1")));

        // Success clears the window.
        limiter.record_success("admin", Some("10.0.0.1"));
        assert!(limiter.check("admin", Some("10.0.0.1")));
    }

    #[test]
    fn test_rate_limiter_key_is_case_insensitive_on_login() {
        let limiter = LoginRateLimiter::new(1, Duration::from_secs(60));
        limiter.record_failure("Admin", Some("10.0.0.1"));
        assert!(!limiter.check("admin", Some("10.0.0.1")));
    }

    #[test]
    fn test_client_ip_takes_first_forwarded_entry() {
        let headers = RequestHeaders::from_pairs(&[
            ("X-Forwarded-For", "203.0.113.7, 10.0.0.1"),
            ("User-Agent", "cli/1.0"),
        ]);
        assert_eq!(headers.client_ip(), Some("203.0.113.7"));
        assert_eq!(headers.user_agent.as_deref(), Some("cli/1.0"));
        assert_eq!(RequestHeaders::default().client_ip(), None);
    }
}
