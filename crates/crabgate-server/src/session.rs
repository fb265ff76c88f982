//! Session signing and login rate limiting.
//!
//! A session is a deterministic signature over the configured control
//! token, not a server-side record: verification recomputes the signature,
//! so no session table exists. The token itself is the credential; when
//! none is configured the deployment is local-only and the guard is open.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard};

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crabgate_schema::{Error, Result};

use crate::state::AppState;

pub const SESSION_COOKIE: &str = "crabgate_session";

const SIGN_CONTEXT: &[u8] = b"crabgate.session.v1";
const MAX_FAILURES: u32 = 5;
const FAILURE_WINDOW_SECS: i64 = 60;

/// Signature a valid login hands back as the session cookie value.
pub fn sign(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(SIGN_CONTEXT);
    hasher.update(b":");
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify(candidate: &str, token: &str) -> bool {
    constant_time_eq(candidate.as_bytes(), sign(token).as_bytes())
}

/// Length-independent constant-time comparison: both sides are hashed so
/// a length mismatch cannot short-circuit.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let a = Sha256::digest(a);
    let b = Sha256::digest(b);
    a.as_slice().ct_eq(b.as_slice()).into()
}

#[derive(Debug)]
struct FailureWindow {
    count: u32,
    since: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SessionAuth {
    token: Option<String>,
    window: chrono::Duration,
    failures: Mutex<HashMap<IpAddr, FailureWindow>>,
}

impl SessionAuth {
    pub fn new(token: Option<String>) -> Self {
        Self::with_window(token, chrono::Duration::seconds(FAILURE_WINDOW_SECS))
    }

    pub fn with_window(token: Option<String>, window: chrono::Duration) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
            window,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the control plane requires a session at all.
    pub fn required(&self) -> bool {
        self.token.is_some()
    }

    /// Exchange the control token for a session value. A locked-out client
    /// is rejected before the token is even looked at.
    pub fn login(&self, provided: &str, client: IpAddr) -> Result<String> {
        let Some(token) = &self.token else {
            return Err(Error::Validation("no control token is configured".into()));
        };
        if self.locked_out(client) {
            return Err(Error::RateLimited);
        }
        if constant_time_eq(provided.as_bytes(), token.as_bytes()) {
            self.lock().remove(&client);
            Ok(sign(token))
        } else {
            self.record_failure(client);
            Err(Error::Auth)
        }
    }

    /// Structural check of a presented cookie value. Open when no token is
    /// configured.
    pub fn verify_session(&self, candidate: &str) -> bool {
        match &self.token {
            Some(token) => verify(candidate, token),
            None => true,
        }
    }

    fn locked_out(&self, client: IpAddr) -> bool {
        let now = Utc::now();
        let mut failures = self.lock();
        match failures.get(&client) {
            Some(window) if now - window.since >= self.window => {
                failures.remove(&client);
                false
            }
            Some(window) => window.count >= MAX_FAILURES,
            None => false,
        }
    }

    fn record_failure(&self, client: IpAddr) {
        let now = Utc::now();
        let mut failures = self.lock();
        let window = failures.entry(client).or_insert(FailureWindow {
            count: 0,
            since: now,
        });
        if now - window.since >= self.window {
            window.count = 0;
            window.since = now;
        }
        window.count += 1;
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, FailureWindow>> {
        match self.failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Middleware over every control-plane route except the login endpoint
/// (and the root page, which is mounted outside the guard).
pub async fn require_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.auth.required() {
        return next.run(request).await;
    }

    let verified = request
        .headers()
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| cookie_value(raw, SESSION_COOKIE))
        .map(|candidate| state.auth.verify_session(candidate))
        .unwrap_or(false);

    if verified {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "unauthorized"})),
        )
            .into_response()
    }
}

fn cookie_value<'a>(raw: &'a str, name: &str) -> Option<&'a str> {
    raw.split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const TOKEN: &str = "correct-horse";

    fn client() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7))
    }

    #[test]
    fn sign_verify_round_trips_only_for_the_same_token() {
        let session = sign(TOKEN);
        assert!(verify(&session, TOKEN));
        assert!(!verify(&session, "other-token"));
        assert!(!verify("garbage", TOKEN));
    }

    #[test]
    fn login_with_correct_token_returns_session() {
        let auth = SessionAuth::new(Some(TOKEN.into()));
        let session = auth.login(TOKEN, client()).unwrap();
        assert!(auth.verify_session(&session));
    }

    #[test]
    fn login_with_wrong_token_is_unauthorized() {
        let auth = SessionAuth::new(Some(TOKEN.into()));
        assert!(matches!(
            auth.login("wrong", client()).unwrap_err(),
            Error::Auth
        ));
    }

    #[test]
    fn lockout_rejects_even_the_correct_token() {
        let auth = SessionAuth::new(Some(TOKEN.into()));
        for _ in 0..5 {
            let _ = auth.login("wrong", client());
        }
        assert!(matches!(
            auth.login(TOKEN, client()).unwrap_err(),
            Error::RateLimited
        ));
    }

    #[test]
    fn lockout_expires_with_the_window() {
        let auth = SessionAuth::with_window(
            Some(TOKEN.into()),
            chrono::Duration::milliseconds(30),
        );
        for _ in 0..5 {
            let _ = auth.login("wrong", client());
        }
        assert!(matches!(
            auth.login(TOKEN, client()).unwrap_err(),
            Error::RateLimited
        ));

        std::thread::sleep(std::time::Duration::from_millis(60));
        assert!(auth.login(TOKEN, client()).is_ok());
    }

    #[test]
    fn failures_from_one_client_do_not_lock_another() {
        let auth = SessionAuth::new(Some(TOKEN.into()));
        for _ in 0..5 {
            let _ = auth.login("wrong", client());
        }
        let other = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 8));
        assert!(auth.login(TOKEN, other).is_ok());
    }

    #[test]
    fn success_clears_the_failure_counter() {
        let auth = SessionAuth::new(Some(TOKEN.into()));
        for _ in 0..4 {
            let _ = auth.login("wrong", client());
        }
        assert!(auth.login(TOKEN, client()).is_ok());
        // Counter reset: four more failures stay under the threshold.
        for _ in 0..4 {
            let _ = auth.login("wrong", client());
        }
        assert!(auth.login(TOKEN, client()).is_ok());
    }

    #[test]
    fn unconfigured_token_admits_every_session() {
        let auth = SessionAuth::new(None);
        assert!(!auth.required());
        assert!(auth.verify_session("anything"));
    }

    #[test]
    fn cookie_header_parsing_finds_the_session_pair() {
        let raw = "theme=dark; crabgate_session=abc123; lang=en";
        assert_eq!(cookie_value(raw, SESSION_COOKIE), Some("abc123"));
        assert_eq!(cookie_value("theme=dark", SESSION_COOKIE), None);
    }
}
