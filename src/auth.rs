use tracing::{info, warn};

use crate::core::db::KvStore;
use crate::core::errors::{AuthError, INVALID_CREDENTIALS};
use crate::core::forms::str_field;
use crate::core::helpers::verify_password;
use crate::core::reply::Reply;
use crate::models::models::{FlashKind, User, UserFilter};
use crate::router::AppState;
use crate::session::{end_session, establish_session, require_session, Visit};
use crate::store::Gateway;
use crate::views;

/// Look up `username` and check `password` against its stored hash.
pub fn authenticate<S: KvStore>(
    store: &Gateway<S>,
    username: &str,
    password: &str,
) -> Result<User, AuthError> {
    if username.is_empty() || password.is_empty() {
        return Err(AuthError::InvalidCredentials);
    }
    match store.find_user(&UserFilter::username(username))? {
        Some(user) if verify_password(password, &user.password) => Ok(user),
        _ => Err(AuthError::InvalidCredentials),
    }
}

pub fn login_form<S: KvStore>(_app: &AppState<S>, visit: &mut Visit) -> anyhow::Result<Reply> {
    Ok(Reply::html(views::login(&visit.chrome())))
}

pub fn login_user<S: KvStore>(app: &AppState<S>, visit: &mut Visit) -> anyhow::Result<Reply> {
    // Signup stores usernames trimmed, so look them up the same way.
    let username = str_field(&visit.body, "username").trim().to_string();
    let password = str_field(&visit.body, "password");

    match authenticate(&app.store, &username, password) {
        Ok(user) => {
            establish_session(visit, &user);
            info!(user_id = %user.id, "user logged in");
            Ok(Reply::redirect("/dashboard"))
        }
        Err(err) => {
            if let AuthError::Store(e) = &err {
                warn!("login lookup failed: {}", e);
            } else {
                info!(%username, "rejected login");
            }
            visit.flash(FlashKind::Error, INVALID_CREDENTIALS);
            Ok(Reply::redirect("/login"))
        }
    }
}

pub fn logout_user<S: KvStore>(_app: &AppState<S>, visit: &mut Visit) -> anyhow::Result<Reply> {
    if let Some(user) = visit.user.as_ref() {
        info!(user_id = %user.id, "user logged out");
    }
    end_session(visit);
    visit.flash(FlashKind::Success, "Logged out");
    Ok(Reply::redirect("/login"))
}

pub fn dashboard<S: KvStore>(_app: &AppState<S>, visit: &mut Visit) -> anyhow::Result<Reply> {
    let user = match require_session(visit) {
        Ok(user) => user.clone(),
        Err(redirect) => return Ok(redirect),
    };
    Ok(Reply::html(views::dashboard(&visit.chrome(), &user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::MemoryKv;
    use crate::core::helpers::hash_password;

    fn store_with_ana() -> Gateway<MemoryKv> {
        let store = Gateway::new(MemoryKv::new());
        store
            .save_user(User::new("ana", "ana@example.com", hash_password("secret").unwrap()))
            .unwrap();
        store
    }

    #[test]
    fn matching_credentials_authenticate() {
        let store = store_with_ana();
        let user = authenticate(&store, "ana", "secret").unwrap();
        assert_eq!(user.username, "ana");
    }

    #[test]
    fn wrong_password_or_unknown_user_fail_alike() {
        let store = store_with_ana();
        for (username, password) in [("ana", "wrong"), ("bob", "secret"), ("", ""), ("ana", "")] {
            let err = authenticate(&store, username, password).unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
            assert_eq!(err.to_string(), INVALID_CREDENTIALS);
        }
    }
}
