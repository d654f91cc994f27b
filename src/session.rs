//! Server-side sessions and the per-request identity that rides on them.
//!
//! The browser only ever holds an opaque token in the `listings.sid` cookie.
//! The token names a `session:{token}` document carrying the logged-in user id
//! (if any) and pending flash messages. Each handled request pushes the expiry
//! forward, so the configured max age is an inactivity window.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::config::{Config, SESSION_COOKIE};
use crate::core::db::KvStore;
use crate::core::errors::StoreError;
use crate::core::helpers::{new_id, now_iso};
use crate::core::reply::Reply;
use crate::models::models::{Flash, FlashKind, SessionData, User};
use crate::router::Verb;
use crate::store::Gateway;
use crate::views::Chrome;

#[derive(Clone, Debug)]
pub struct Session {
    pub token: String,
    pub data: SessionData,
}

impl Session {
    fn fresh(user_id: Option<String>, flashes: Vec<Flash>, now: i64) -> Self {
        Self {
            token: new_id(),
            data: SessionData {
                user_id,
                flashes,
                created_at: now_iso(),
                expires_at: now,
            },
        }
    }
}

/// Everything a handler knows about the request it serves, identity included.
#[derive(Debug)]
pub struct Visit {
    pub verb: Verb,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Value,
    pub user: Option<User>,
    pub now: i64,
    session: Option<Session>,
    retired: Vec<String>,
    ended: bool,
}

impl Visit {
    pub fn new(verb: Verb, path: &str, query: HashMap<String, String>, body: Value, now: i64) -> Self {
        Self {
            verb,
            path: path.to_string(),
            query,
            body,
            user: None,
            now,
            session: None,
            retired: Vec::new(),
            ended: false,
        }
    }

    /// Attach whatever `resolve_session` found for this request's cookie.
    pub fn with_session(mut self, session: Option<Session>, user: Option<User>) -> Self {
        self.session = session;
        self.user = user;
        self
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.token.as_str())
    }

    /// Queue a message for the next rendered page, opening an anonymous session if needed.
    pub fn flash(&mut self, kind: FlashKind, message: &str) {
        let now = self.now;
        let session = self
            .session
            .get_or_insert_with(|| Session::fresh(None, Vec::new(), now));
        session.data.flashes.push(Flash {
            kind,
            message: message.to_string(),
        });
    }

    pub fn take_flashes(&mut self) -> Vec<Flash> {
        self.session
            .as_mut()
            .map(|s| std::mem::take(&mut s.data.flashes))
            .unwrap_or_default()
    }

    /// Page furniture for a render: who is logged in, plus the consumed flashes.
    pub fn chrome(&mut self) -> Chrome {
        Chrome {
            username: self.user.as_ref().map(|u| u.username.clone()),
            flashes: self.take_flashes(),
        }
    }
}

pub fn token_from_cookies(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// Load the session named by `token`, dropping it if expired, along with its user.
///
/// A session whose user has disappeared stays alive as an anonymous session so
/// its flash messages are not lost.
pub fn resolve_session<S: KvStore>(
    store: &Gateway<S>,
    token: Option<&str>,
    now: i64,
) -> Result<(Option<Session>, Option<User>), StoreError> {
    let Some(token) = token else {
        return Ok((None, None));
    };
    let Some(mut data) = store.find_session(token)? else {
        return Ok((None, None));
    };

    if data.expires_at <= now {
        debug!("session expired, discarding");
        store.delete_session(token)?;
        return Ok((None, None));
    }

    let user = match data.user_id.as_deref() {
        Some(user_id) => store.find_user_by_id(user_id)?,
        None => None,
    };
    if user.is_none() {
        data.user_id = None;
    }

    let session = Session {
        token: token.to_string(),
        data,
    };
    Ok((Some(session), user))
}

/// The user behind a session token, if the session is live.
pub fn resolve_user<S: KvStore>(
    store: &Gateway<S>,
    token: Option<&str>,
    now: i64,
) -> Result<Option<User>, StoreError> {
    Ok(resolve_session(store, token, now)?.1)
}

/// Bind `user` to the visit under a brand-new token; the old token is retired.
pub fn establish_session(visit: &mut Visit, user: &User) -> String {
    let flashes = match visit.session.take() {
        Some(old) => {
            visit.retired.push(old.token);
            old.data.flashes
        }
        None => Vec::new(),
    };

    let session = Session::fresh(Some(user.id.clone()), flashes, visit.now);
    let token = session.token.clone();
    visit.session = Some(session);
    visit.user = Some(user.clone());
    visit.ended = false;
    token
}

/// Gate for protected pages: the logged-in user, or a redirect to the login form.
pub fn require_session(visit: &Visit) -> Result<&User, Reply> {
    visit.user.as_ref().ok_or_else(|| Reply::redirect("/login"))
}

pub fn end_session(visit: &mut Visit) {
    if let Some(old) = visit.session.take() {
        visit.retired.push(old.token);
    }
    visit.user = None;
    visit.ended = true;
}

/// Persist the visit's session and return the `Set-Cookie` value to send, if any.
///
/// Every save also sweeps sessions that expired without coming back.
pub fn commit<S: KvStore>(
    store: &Gateway<S>,
    visit: &mut Visit,
    config: &Config,
) -> Result<Option<String>, StoreError> {
    for token in visit.retired.drain(..) {
        store.delete_session(&token)?;
    }

    match visit.session.as_mut() {
        Some(session) => {
            store.reclaim_expired_sessions(visit.now)?;
            session.data.expires_at = visit.now + config.session_max_age_secs;
            store.save_session(&session.token, &session.data)?;
            Ok(Some(session_cookie(
                &session.token,
                config.session_max_age_secs,
                config.cookie_secure,
            )))
        }
        None if visit.ended => Ok(Some(session_cookie("", 0, config.cookie_secure))),
        None => Ok(None),
    }
}

fn session_cookie(token: &str, max_age: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        max_age.max(0)
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::MemoryKv;
    use crate::core::helpers::now_ts;

    fn visit() -> Visit {
        Visit::new(Verb::Get, "/", HashMap::new(), Value::Null, now_ts())
    }

    fn saved_user(store: &Gateway<MemoryKv>) -> User {
        store.save_user(User::new("ana", "", "hash".into())).unwrap()
    }

    #[test]
    fn cookie_header_parsing() {
        assert_eq!(
            token_from_cookies("theme=dark; listings.sid=abc; other=1"),
            Some("abc".to_string())
        );
        assert_eq!(token_from_cookies("listings.sid="), None);
        assert_eq!(token_from_cookies("sid=abc"), None);
    }

    #[test]
    fn established_sessions_resolve_to_their_user() {
        let store = Gateway::new(MemoryKv::new());
        let config = Config::default();
        let user = saved_user(&store);

        let mut v = visit();
        let token = establish_session(&mut v, &user);
        let cookie = commit(&store, &mut v, &config).unwrap().unwrap();
        assert!(cookie.starts_with(&format!("listings.sid={}", token)));
        assert!(cookie.contains("HttpOnly"));

        let found = resolve_user(&store, Some(&token), now_ts()).unwrap();
        assert_eq!(found, Some(user));
    }

    #[test]
    fn expired_sessions_resolve_to_nobody_and_are_removed() {
        let store = Gateway::new(MemoryKv::new());
        let config = Config {
            session_max_age_secs: 60,
            ..Config::default()
        };
        let user = saved_user(&store);

        let mut v = visit();
        let token = establish_session(&mut v, &user);
        commit(&store, &mut v, &config).unwrap();

        let later = v.now + 61;
        assert_eq!(resolve_user(&store, Some(&token), later).unwrap(), None);
        assert!(store.find_session(&token).unwrap().is_none());
    }

    #[test]
    fn login_rotates_the_token_and_keeps_flashes() {
        let store = Gateway::new(MemoryKv::new());
        let config = Config::default();
        let user = saved_user(&store);

        let mut v = visit();
        v.flash(FlashKind::Success, "Account created successfully");
        let anonymous = v.session_token().unwrap().to_string();
        commit(&store, &mut v, &config).unwrap();

        let (session, _) = resolve_session(&store, Some(&anonymous), now_ts()).unwrap();
        let mut v = visit().with_session(session, None);
        let token = establish_session(&mut v, &user);
        commit(&store, &mut v, &config).unwrap();

        assert_ne!(token, anonymous);
        assert!(store.find_session(&anonymous).unwrap().is_none());
        let (session, _) = resolve_session(&store, Some(&token), now_ts()).unwrap();
        let mut v = visit().with_session(session, None);
        assert_eq!(v.take_flashes().len(), 1);
    }

    #[test]
    fn sessions_of_deleted_users_are_anonymous() {
        let store = Gateway::new(MemoryKv::new());
        let ghost = User::new("ghost", "", "hash".into());

        let mut v = visit();
        let token = establish_session(&mut v, &ghost);
        commit(&store, &mut v, &Config::default()).unwrap();

        let (session, user) = resolve_session(&store, Some(&token), now_ts()).unwrap();
        assert!(user.is_none());
        assert_eq!(session.unwrap().data.user_id, None);
    }

    #[test]
    fn require_session_redirects_anonymous_visits() {
        let v = visit();
        assert_eq!(require_session(&v).unwrap_err(), Reply::redirect("/login"));
    }

    #[test]
    fn ending_a_session_clears_the_cookie() {
        let store = Gateway::new(MemoryKv::new());
        let user = saved_user(&store);
        let mut v = visit();
        let token = establish_session(&mut v, &user);
        commit(&store, &mut v, &Config::default()).unwrap();

        let (session, user) = resolve_session(&store, Some(&token), now_ts()).unwrap();
        let mut v = visit().with_session(session, user);
        end_session(&mut v);
        let cookie = commit(&store, &mut v, &Config::default()).unwrap().unwrap();
        assert!(cookie.contains("Max-Age=0"));
        assert!(store.find_session(&token).unwrap().is_none());
    }

    #[test]
    fn abandoned_anonymous_sessions_are_swept_by_later_saves() {
        let store = Gateway::new(MemoryKv::new());
        let config = Config {
            session_max_age_secs: 60,
            ..Config::default()
        };

        let abandoned: Vec<String> = (0..5)
            .map(|_| {
                let mut v = visit();
                v.flash(FlashKind::Error, "Invalid username or password");
                let token = v.session_token().unwrap().to_string();
                commit(&store, &mut v, &config).unwrap();
                token
            })
            .collect();

        let mut later = visit();
        later.now += 61;
        later.flash(FlashKind::Error, "Invalid username or password");
        commit(&store, &mut later, &config).unwrap();

        for token in &abandoned {
            assert!(store.find_session(token).unwrap().is_none());
        }
        assert!(store.find_session(later.session_token().unwrap()).unwrap().is_some());
    }

    #[test]
    fn visits_without_flashes_or_login_set_no_cookie() {
        let store = Gateway::new(MemoryKv::new());
        let mut v = visit();
        assert!(v.take_flashes().is_empty());
        assert_eq!(commit(&store, &mut v, &Config::default()).unwrap(), None);
    }
}
