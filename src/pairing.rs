//! Device pairing: 6-digit codes binding a desktop session to a mobile one.
//!
//! Records live in a concurrent map keyed by code; dashmap's per-entry
//! locking serializes all transitions on one record while independent codes
//! proceed in parallel. A periodic sweeper removes expired, unpaired codes.

use crate::error::{GatewayError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How many times `create` retries on a code collision.
const CREATE_RETRIES: usize = 10;

/// Lifecycle of a pairing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    Pending,
    Paired,
    Expired,
    Closed,
}

/// One pairing attempt between a desktop and a mobile device.
#[derive(Debug, Clone)]
pub struct PairingRecord {
    /// Zero-padded 6-digit decimal code.
    pub code: String,
    /// `"pair-" + code`.
    pub channel_id: String,
    pub desktop_session_id: String,
    /// Set on claim.
    pub mobile_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: PairingState,
}

/// In-memory pairing store.
pub struct PairingStore {
    records: DashMap<String, PairingRecord>,
    ttl: ChronoDuration,
}

impl PairingStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: DashMap::new(),
            ttl: ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::minutes(5)),
        }
    }

    /// Create a fresh pairing record for a desktop session.
    ///
    /// # Errors
    ///
    /// Returns an internal error when ten random codes in a row collide
    /// with live records.
    pub fn create(&self, desktop_session_id: &str) -> Result<PairingRecord> {
        let now = Utc::now();
        for _ in 0..CREATE_RETRIES {
            let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
            match self.records.entry(code.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let record = PairingRecord {
                        channel_id: format!("pair-{code}"),
                        code,
                        desktop_session_id: desktop_session_id.to_string(),
                        mobile_session_id: None,
                        created_at: now,
                        expires_at: now + self.ttl,
                        state: PairingState::Pending,
                    };
                    slot.insert(record.clone());
                    info!(code = %record.code, "pairing code created");
                    return Ok(record);
                }
            }
        }
        Err(GatewayError::Internal(
            "pairing code space exhausted".to_string(),
        ))
    }

    /// Claim a pending code for a mobile session.
    pub fn claim(&self, code: &str, mobile_session_id: &str) -> Result<PairingRecord> {
        self.claim_at(code, mobile_session_id, Utc::now())
    }

    fn claim_at(
        &self,
        code: &str,
        mobile_session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PairingRecord> {
        match self.records.entry(code.to_string()) {
            Entry::Vacant(_) => Err(GatewayError::InvalidCode),
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                if now > record.expires_at && record.state != PairingState::Paired {
                    slot.remove();
                    return Err(GatewayError::CodeExpired);
                }
                match record.state {
                    PairingState::Pending => {
                        record.state = PairingState::Paired;
                        record.mobile_session_id = Some(mobile_session_id.to_string());
                        info!(code, "pairing claimed");
                        Ok(record.clone())
                    }
                    PairingState::Paired => Err(GatewayError::AlreadyPaired),
                    PairingState::Expired => Err(GatewayError::CodeExpired),
                    PairingState::Closed => Err(GatewayError::InvalidCode),
                }
            }
        }
    }

    /// Look up the live record behind a channel id.
    pub fn lookup(&self, channel_id: &str) -> Option<PairingRecord> {
        let code = channel_id.strip_prefix("pair-")?;
        let record = self.records.get(code)?;
        if Utc::now() > record.expires_at && record.state != PairingState::Paired {
            return None;
        }
        Some(record.clone())
    }

    /// Roll a claim back to pending (mobile joined the store but failed to
    /// join the channel).
    pub fn release(&self, code: &str) {
        if let Some(mut record) = self.records.get_mut(code) {
            if record.state == PairingState::Paired {
                record.state = PairingState::Pending;
                record.mobile_session_id = None;
                debug!(code, "pairing claim released");
            }
        }
    }

    /// Close and drop the record once both peers are gone.
    pub fn close(&self, channel_id: &str) {
        let Some(code) = channel_id.strip_prefix("pair-") else {
            return;
        };
        if self.records.remove(code).is_some() {
            debug!(code, "pairing closed");
        }
    }

    /// Remove expired, unpaired records. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, r| !(now > r.expires_at && r.state != PairingState::Paired));
        before - self.records.len()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Periodic sweep task.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let store = self;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let dropped = store.sweep();
                if dropped > 0 {
                    debug!(dropped, "pairing sweep removed expired codes");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PairingStore {
        PairingStore::new(Duration::from_secs(300))
    }

    #[test]
    fn create_and_claim() {
        let s = store();
        let rec = s.create("desk-1").expect("create");
        assert_eq!(rec.code.len(), 6);
        assert_eq!(rec.channel_id, format!("pair-{}", rec.code));
        assert_eq!(rec.state, PairingState::Pending);

        let claimed = s.claim(&rec.code, "mob-1").expect("claim");
        assert_eq!(claimed.state, PairingState::Paired);
        assert_eq!(claimed.mobile_session_id.as_deref(), Some("mob-1"));
    }

    #[test]
    fn claim_unknown_code_is_invalid() {
        let err = store().claim("000000", "mob-1").unwrap_err();
        assert_eq!(err.wire_code(), "INVALID_CODE");
    }

    #[test]
    fn double_claim_is_already_paired() {
        let s = store();
        let rec = s.create("desk-1").expect("create");
        s.claim(&rec.code, "mob-1").expect("claim");
        let err = s.claim(&rec.code, "mob-2").unwrap_err();
        assert_eq!(err.wire_code(), "ALREADY_PAIRED");
    }

    #[test]
    fn claim_after_expiry_is_expired_and_removes() {
        let s = store();
        let rec = s.create("desk-1").expect("create");
        let late = rec.expires_at + ChronoDuration::seconds(1);
        let err = s.claim_at(&rec.code, "mob-1", late).unwrap_err();
        assert_eq!(err.wire_code(), "CODE_EXPIRED");
        // record is gone; a second claim sees an invalid code
        let err = s.claim_at(&rec.code, "mob-1", late).unwrap_err();
        assert_eq!(err.wire_code(), "INVALID_CODE");
    }

    #[test]
    fn codes_are_unique_while_live() {
        let s = store();
        let mut codes = std::collections::HashSet::new();
        for _ in 0..50 {
            let rec = s.create("desk").expect("create");
            assert!(codes.insert(rec.code.clone()), "duplicate live code");
        }
        assert_eq!(s.len(), 50);
    }

    #[test]
    fn sweep_removes_expired_pending_only() {
        let s = store();
        let pending = s.create("desk-1").expect("create");
        let paired = s.create("desk-2").expect("create");
        s.claim(&paired.code, "mob").expect("claim");

        let late = pending.expires_at + ChronoDuration::seconds(1);
        let dropped = s.sweep_at(late);
        assert_eq!(dropped, 1);
        assert!(s.lookup(&pending.channel_id).is_none());
        assert!(s.lookup(&paired.channel_id).is_some());
    }

    #[test]
    fn release_rolls_back_to_pending() {
        let s = store();
        let rec = s.create("desk-1").expect("create");
        s.claim(&rec.code, "mob-1").expect("claim");
        s.release(&rec.code);
        let again = s.claim(&rec.code, "mob-2").expect("reclaim");
        assert_eq!(again.mobile_session_id.as_deref(), Some("mob-2"));
    }

    #[test]
    fn close_drops_the_record() {
        let s = store();
        let rec = s.create("desk-1").expect("create");
        s.close(&rec.channel_id);
        assert!(s.lookup(&rec.channel_id).is_none());
        assert!(s.is_empty());
    }
}
