//! One-time handoff tickets between a prepare POST and its streaming GET.
//!
//! Redemption is a single remove-and-return under one lock acquisition, so
//! a ticket can never start two pipelines. The periodic sweep is memory
//! hygiene only; expiry is enforced at redemption time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crabgate_gateway::{ConnectRequest, SetupRequest};
use crabgate_schema::{Error, Result};

const TICKET_TTL_SECS: i64 = 60;
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// The submitted parameters a streaming call picks back up.
#[derive(Debug, Clone)]
pub enum TicketPayload {
    Setup(SetupRequest),
    Connect(ConnectRequest),
}

#[derive(Debug)]
struct Ticket {
    payload: TicketPayload,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct TicketStore {
    ttl: chrono::Duration,
    entries: Mutex<HashMap<String, Ticket>>,
}

impl Default for TicketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketStore {
    pub fn new() -> Self {
        Self::with_ttl(chrono::Duration::seconds(TICKET_TTL_SECS))
    }

    pub fn with_ttl(ttl: chrono::Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn put(&self, payload: TicketPayload) -> String {
        let id = Uuid::new_v4().simple().to_string();
        self.lock().insert(
            id.clone(),
            Ticket {
                payload,
                expires_at: Utc::now() + self.ttl,
            },
        );
        id
    }

    /// Atomic remove-and-return. A second redemption of the same id always
    /// fails, and an expired ticket fails even on its first redemption.
    pub fn redeem(&self, id: &str) -> Result<TicketPayload> {
        let ticket = self
            .lock()
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("ticket {id}")))?;
        if ticket.expires_at < Utc::now() {
            return Err(Error::TicketExpired);
        }
        Ok(ticket.payload)
    }

    /// Drop expired, unredeemed entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, ticket| ticket.expires_at >= now);
        before - entries.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Ticket>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

pub fn spawn_sweeper(store: Arc<TicketStore>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = store.sweep();
            if removed > 0 {
                tracing::debug!(removed, "swept expired tickets");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crabgate_schema::ProfileName;

    fn payload() -> TicketPayload {
        TicketPayload::Setup(SetupRequest {
            profile: ProfileName::parse("work").unwrap(),
            api_key: Some("sk-ant-test".into()),
            model_id: "claude-sonnet-4-5-20250929".into(),
            channel: None,
        })
    }

    #[test]
    fn redeem_returns_payload_exactly_once() {
        let store = TicketStore::new();
        let id = store.put(payload());

        let first = store.redeem(&id).unwrap();
        assert!(matches!(first, TicketPayload::Setup(_)));

        let second = store.redeem(&id).unwrap_err();
        assert!(matches!(second, Error::NotFound(_)));
    }

    #[test]
    fn unknown_ticket_is_not_found() {
        let store = TicketStore::new();
        assert!(matches!(
            store.redeem("nope").unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn expired_ticket_fails_even_on_first_redemption() {
        let store = TicketStore::with_ttl(chrono::Duration::milliseconds(5));
        let id = store.put(payload());
        std::thread::sleep(Duration::from_millis(20));
        assert!(matches!(
            store.redeem(&id).unwrap_err(),
            Error::TicketExpired
        ));
    }

    #[test]
    fn sweep_drops_only_expired_entries() {
        let store = TicketStore::with_ttl(chrono::Duration::milliseconds(5));
        store.put(payload());
        std::thread::sleep(Duration::from_millis(20));

        let long_lived = TicketStore::new();
        let kept = long_lived.put(payload());

        assert_eq!(store.sweep(), 1);
        assert_eq!(long_lived.sweep(), 0);
        assert!(long_lived.redeem(&kept).is_ok());
    }
}
