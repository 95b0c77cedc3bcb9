//! Session registry (C2, §4.2): token issuance, token→identity resolution,
//! endpoint binding, activity tracking, expiry, and the ban list.
//!
//! A single `std::sync::Mutex` guards all three indexes (by email, by
//! token, by endpoint) plus the ban set; every public method takes it for
//! the entirety of its work and releases it before returning, so no caller
//! ever observes a torn update. No method here blocks on I/O, so a
//! synchronous mutex is the right tool — unlike [`crate::room::RoomRegistry`],
//! which has to hold its lock across the occasional `.await`.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::token::Token;

/// Token validity before a client presents it on the UDP channel.
pub const PENDING_WINDOW: Duration = Duration::from_secs(300);
/// Inactivity timeout once a session is bound and `Active`.
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Active,
    Expired,
}

/// Per-session hidden flags (e.g. admin-granted god mode) that never appear
/// in a client-facing snapshot field by the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HiddenFlag {
    GodMode,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub email: String,
    pub display_name: String,
    pub token: Token,
    pub created_at: Instant,
    pub last_activity: Instant,
    pub status: SessionStatus,
    pub udp_endpoint: Option<SocketAddr>,
    pub player_id: Option<u8>,
    pub room_code: Option<String>,
    pub hidden_flags: HashSet<HiddenFlag>,
}

#[derive(Debug, Clone)]
pub struct BannedUser {
    pub email: String,
    pub display_name: String,
}

pub struct CreateSessionResult {
    pub token: Token,
    pub display_name: String,
}

pub struct ValidateResult {
    pub email: String,
    pub display_name: String,
}

/// One session torn down by [`SessionRegistry::cleanup_expired_sessions`].
pub struct ExpiredSession {
    pub email: String,
    pub room_code: Option<String>,
    pub player_id: Option<u8>,
}

#[derive(Default)]
struct Indexes {
    by_email: HashMap<String, Session>,
    by_token: HashMap<Token, String>,
    by_endpoint: HashMap<SocketAddr, String>,
    banned: HashMap<String, BannedUser>,
}

/// C2. See module docs for the locking discipline.
pub struct SessionRegistry {
    inner: Mutex<Indexes>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry { inner: Mutex::new(Indexes::default()) }
    }

    /// Rejects if a non-Expired session already exists for `email`, or if
    /// `email` is banned.
    pub fn create_session(&self, email: &str, display_name: &str) -> Option<CreateSessionResult> {
        let mut indexes = self.inner.lock().unwrap();
        if indexes.banned.contains_key(email) {
            return None;
        }
        if indexes.by_email.get(email).is_some_and(|s| s.status != SessionStatus::Expired) {
            return None;
        }

        let token = loop {
            let candidate = Token::generate();
            if !indexes.by_token.contains_key(&candidate) {
                break candidate;
            }
        };

        let now = Instant::now();
        let session = Session {
            email: email.to_string(),
            display_name: display_name.to_string(),
            token,
            created_at: now,
            last_activity: now,
            status: SessionStatus::Pending,
            udp_endpoint: None,
            player_id: None,
            room_code: None,
            hidden_flags: HashSet::new(),
        };
        indexes.by_token.insert(token, email.to_string());
        indexes.by_email.insert(email.to_string(), session);

        Some(CreateSessionResult { token, display_name: display_name.to_string() })
    }

    /// Fails if the token is unknown, the pending window has elapsed, or the
    /// session is already bound to a different endpoint. On success, binds
    /// `endpoint`, transitions `Pending` → `Active`, and stamps activity.
    pub fn validate_and_bind_udp(&self, token: &Token, endpoint: SocketAddr) -> Option<ValidateResult> {
        let mut indexes = self.inner.lock().unwrap();
        let email = indexes.by_token.get(token)?.clone();
        let now = Instant::now();

        let session = indexes.by_email.get_mut(&email)?;
        if session.status == SessionStatus::Expired {
            return None;
        }
        if session.status == SessionStatus::Pending && now.duration_since(session.created_at) > PENDING_WINDOW {
            session.status = SessionStatus::Expired;
            return None;
        }
        if let Some(bound) = session.udp_endpoint {
            if bound != endpoint {
                return None;
            }
        }

        session.udp_endpoint = Some(endpoint);
        session.status = SessionStatus::Active;
        session.last_activity = now;
        let display_name = session.display_name.clone();

        indexes.by_endpoint.insert(endpoint, email.clone());
        Some(ValidateResult { email, display_name })
    }

    pub fn assign_player_id(&self, endpoint: SocketAddr, player_id: u8) {
        let mut indexes = self.inner.lock().unwrap();
        if let Some(email) = indexes.by_endpoint.get(&endpoint).cloned() {
            if let Some(session) = indexes.by_email.get_mut(&email) {
                session.player_id = Some(player_id);
            }
        }
    }

    pub fn set_room_code(&self, email: &str, room_code: Option<String>) {
        let mut indexes = self.inner.lock().unwrap();
        if let Some(session) = indexes.by_email.get_mut(email) {
            session.room_code = room_code;
        }
    }

    /// Sets or clears an admin-granted hidden flag (§4.2). Returns `false`
    /// if `email` has no live session, so the caller (the admin RPC) can
    /// tell the operator the target wasn't found.
    pub fn set_hidden_flag(&self, email: &str, flag: HiddenFlag, enabled: bool) -> bool {
        let mut indexes = self.inner.lock().unwrap();
        let Some(session) = indexes.by_email.get_mut(email) else { return false };
        if enabled {
            session.hidden_flags.insert(flag);
        } else {
            session.hidden_flags.remove(&flag);
        }
        true
    }

    pub fn has_hidden_flag(&self, email: &str, flag: HiddenFlag) -> bool {
        let indexes = self.inner.lock().unwrap();
        indexes.by_email.get(email).is_some_and(|s| s.hidden_flags.contains(&flag))
    }

    pub fn get_player_id_by_endpoint(&self, endpoint: SocketAddr) -> Option<u8> {
        let indexes = self.inner.lock().unwrap();
        let email = indexes.by_endpoint.get(&endpoint)?;
        indexes.by_email.get(email)?.player_id
    }

    pub fn get_room_code_by_endpoint(&self, endpoint: SocketAddr) -> Option<String> {
        let indexes = self.inner.lock().unwrap();
        let email = indexes.by_endpoint.get(&endpoint)?;
        indexes.by_email.get(email)?.room_code.clone()
    }

    /// Every UDP endpoint currently bound to a session in `room_code` —
    /// the datagram server's fan-out list for that instance's broadcasts.
    pub fn endpoints_for_room(&self, room_code: &str) -> Vec<SocketAddr> {
        let indexes = self.inner.lock().unwrap();
        indexes
            .by_email
            .values()
            .filter(|s| s.room_code.as_deref() == Some(room_code))
            .filter_map(|s| s.udp_endpoint)
            .collect()
    }

    pub fn get_session_by_endpoint(&self, endpoint: SocketAddr) -> Option<Session> {
        let indexes = self.inner.lock().unwrap();
        let email = indexes.by_endpoint.get(&endpoint)?;
        indexes.by_email.get(email).cloned()
    }

    pub fn get_session_by_email(&self, email: &str) -> Option<Session> {
        let indexes = self.inner.lock().unwrap();
        indexes.by_email.get(email).cloned()
    }

    pub fn is_token_valid(&self, token: &Token) -> bool {
        let indexes = self.inner.lock().unwrap();
        indexes
            .by_token
            .get(token)
            .and_then(|email| indexes.by_email.get(email))
            .is_some_and(|s| s.status != SessionStatus::Expired)
    }

    /// Stamps `lastActivity`; called on every datagram received from a
    /// bound endpoint.
    pub fn update_activity(&self, endpoint: SocketAddr) {
        let mut indexes = self.inner.lock().unwrap();
        if let Some(email) = indexes.by_endpoint.get(&endpoint).cloned() {
            if let Some(session) = indexes.by_email.get_mut(&email) {
                session.last_activity = Instant::now();
            }
        }
    }

    /// Drops the UDP binding but leaves the session (and its room) intact —
    /// used when a player leaves a room without logging out.
    pub fn clear_udp_binding(&self, endpoint: SocketAddr) {
        let mut indexes = self.inner.lock().unwrap();
        if let Some(email) = indexes.by_endpoint.remove(&endpoint) {
            if let Some(session) = indexes.by_email.get_mut(&email) {
                session.udp_endpoint = None;
                session.player_id = None;
            }
        }
    }

    /// Fully removes a session from all indexes (logout / stream close).
    /// Returns the player id that was assigned, if any, so the caller can
    /// post a player-removal task to the owning instance.
    pub fn remove_session(&self, email: &str) -> Option<u8> {
        let mut indexes = self.inner.lock().unwrap();
        let session = indexes.by_email.remove(email)?;
        indexes.by_token.remove(&session.token);
        if let Some(endpoint) = session.udp_endpoint {
            indexes.by_endpoint.remove(&endpoint);
        }
        session.player_id
    }

    /// Scans for Pending-past-window or Active-past-timeout sessions, marks
    /// them Expired, removes them from every index, and returns enough
    /// identity to let the caller notify the owning room/instance.
    pub fn cleanup_expired_sessions(&self) -> Vec<ExpiredSession> {
        let mut indexes = self.inner.lock().unwrap();
        let now = Instant::now();

        let expired_emails: Vec<String> = indexes
            .by_email
            .values()
            .filter(|s| match s.status {
                SessionStatus::Pending => now.duration_since(s.created_at) > PENDING_WINDOW,
                SessionStatus::Active => now.duration_since(s.last_activity) > INACTIVITY_TIMEOUT,
                SessionStatus::Expired => false,
            })
            .map(|s| s.email.clone())
            .collect();

        let mut expired = Vec::new();
        for email in expired_emails {
            if let Some(session) = indexes.by_email.remove(&email) {
                indexes.by_token.remove(&session.token);
                if let Some(endpoint) = session.udp_endpoint {
                    indexes.by_endpoint.remove(&endpoint);
                }
                expired.push(ExpiredSession { email, room_code: session.room_code, player_id: session.player_id });
            }
        }
        expired
    }

    /// Bans `email`: denies future session creation and tears down any live
    /// session for that identity.
    pub fn ban_user(&self, email: &str) {
        let mut indexes = self.inner.lock().unwrap();
        let display_name = indexes.by_email.get(email).map(|s| s.display_name.clone()).unwrap_or_default();
        indexes.banned.insert(email.to_string(), BannedUser { email: email.to_string(), display_name });

        if let Some(session) = indexes.by_email.remove(email) {
            indexes.by_token.remove(&session.token);
            if let Some(endpoint) = session.udp_endpoint {
                indexes.by_endpoint.remove(&endpoint);
            }
        }
    }

    pub fn unban_user(&self, email: &str) {
        let mut indexes = self.inner.lock().unwrap();
        indexes.banned.remove(email);
    }

    pub fn is_banned(&self, email: &str) -> bool {
        let indexes = self.inner.lock().unwrap();
        indexes.banned.contains_key(email)
    }

    pub fn banned_users(&self) -> Vec<BannedUser> {
        let indexes = self.inner.lock().unwrap();
        indexes.banned.values().cloned().collect()
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().unwrap().by_email.len()
    }

    pub fn all_sessions(&self) -> Vec<Session> {
        self.inner.lock().unwrap().by_email.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn double_login_is_refused() {
        let registry = SessionRegistry::new();
        assert!(registry.create_session("alice@example.com", "alice").is_some());
        assert!(registry.create_session("alice@example.com", "alice").is_none());
    }

    #[test]
    fn create_remove_create_yields_different_tokens() {
        let registry = SessionRegistry::new();
        let first = registry.create_session("alice@example.com", "alice").unwrap();
        registry.remove_session("alice@example.com");
        let second = registry.create_session("alice@example.com", "alice").unwrap();
        assert_ne!(first.token.as_bytes(), second.token.as_bytes());
    }

    #[test]
    fn bind_then_lookup_by_endpoint_resolves_session() {
        let registry = SessionRegistry::new();
        let created = registry.create_session("alice@example.com", "alice").unwrap();
        let bound = registry.validate_and_bind_udp(&created.token, addr(4000)).unwrap();
        assert_eq!(bound.email, "alice@example.com");
        assert_eq!(registry.get_session_by_endpoint(addr(4000)).unwrap().email, "alice@example.com");
    }

    #[test]
    fn rebinding_a_different_endpoint_to_the_same_token_is_refused() {
        let registry = SessionRegistry::new();
        let created = registry.create_session("alice@example.com", "alice").unwrap();
        assert!(registry.validate_and_bind_udp(&created.token, addr(4000)).is_some());
        assert!(registry.validate_and_bind_udp(&created.token, addr(4001)).is_none());
    }

    #[test]
    fn ban_tears_down_live_session() {
        let registry = SessionRegistry::new();
        let created = registry.create_session("alice@example.com", "alice").unwrap();
        registry.validate_and_bind_udp(&created.token, addr(4000)).unwrap();
        registry.ban_user("alice@example.com");
        assert!(registry.is_banned("alice@example.com"));
        assert!(registry.get_session_by_endpoint(addr(4000)).is_none());
        assert!(registry.create_session("alice@example.com", "alice").is_none());
    }

    #[test]
    fn clear_udp_binding_keeps_session_alive() {
        let registry = SessionRegistry::new();
        let created = registry.create_session("alice@example.com", "alice").unwrap();
        registry.validate_and_bind_udp(&created.token, addr(4000)).unwrap();
        registry.clear_udp_binding(addr(4000));
        assert!(registry.get_session_by_endpoint(addr(4000)).is_none());
        assert!(registry.get_session_by_email("alice@example.com").is_some());
    }

    #[test]
    fn a_pending_session_within_the_window_is_not_cleaned_up() {
        let registry = SessionRegistry::new();
        registry.create_session("alice@example.com", "alice").unwrap();
        assert!(registry.cleanup_expired_sessions().is_empty());
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn hidden_flag_round_trips_and_reports_missing_sessions() {
        let registry = SessionRegistry::new();
        registry.create_session("alice@example.com", "alice").unwrap();
        assert!(!registry.has_hidden_flag("alice@example.com", HiddenFlag::GodMode));
        assert!(registry.set_hidden_flag("alice@example.com", HiddenFlag::GodMode, true));
        assert!(registry.has_hidden_flag("alice@example.com", HiddenFlag::GodMode));
        assert!(registry.set_hidden_flag("alice@example.com", HiddenFlag::GodMode, false));
        assert!(!registry.has_hidden_flag("alice@example.com", HiddenFlag::GodMode));
        assert!(!registry.set_hidden_flag("nobody@example.com", HiddenFlag::GodMode, true));
    }

    #[test]
    fn endpoints_for_room_only_returns_bound_occupants_of_that_room() {
        let registry = SessionRegistry::new();
        let alice = registry.create_session("alice@example.com", "alice").unwrap();
        let bob = registry.create_session("bob@example.com", "bob").unwrap();
        registry.validate_and_bind_udp(&alice.token, addr(4000)).unwrap();
        registry.validate_and_bind_udp(&bob.token, addr(4001)).unwrap();
        registry.set_room_code("alice@example.com", Some("ABCDEF".to_string()));
        registry.set_room_code("bob@example.com", Some("ZZZZZZ".to_string()));

        let endpoints = registry.endpoints_for_room("ABCDEF");
        assert_eq!(endpoints, vec![addr(4000)]);
    }
}
