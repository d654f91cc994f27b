use tracing::{error, info};

use crate::config::{MAX_EMAIL_LENGTH, MAX_USERNAME_LENGTH};
use crate::core::db::KvStore;
use crate::core::errors::SignupError;
use crate::core::forms::str_field;
use crate::core::helpers::hash_password;
use crate::core::reply::Reply;
use crate::models::models::{FlashKind, User, UserFilter};
use crate::router::AppState;
use crate::session::Visit;
use crate::store::Gateway;
use crate::views;

/// Create a user unless the username is taken.
///
/// The existence check and the insert are separate store calls, so two
/// concurrent signups for one name can both succeed.
pub fn register<S: KvStore>(
    store: &Gateway<S>,
    username: &str,
    email: &str,
    password: &str,
) -> Result<User, SignupError> {
    if store.find_user(&UserFilter::username(username))?.is_some() {
        return Err(SignupError::DuplicateUsername);
    }
    let password_hash = hash_password(password).map_err(|e| SignupError::Hash(e.to_string()))?;
    Ok(store.save_user(User::new(username, email, password_hash))?)
}

pub fn signup_form<S: KvStore>(_app: &AppState<S>, visit: &mut Visit) -> anyhow::Result<Reply> {
    Ok(Reply::html(views::signup(&visit.chrome())))
}

pub fn create_user<S: KvStore>(app: &AppState<S>, visit: &mut Visit) -> anyhow::Result<Reply> {
    let username = str_field(&visit.body, "username").trim().to_string();
    let email = str_field(&visit.body, "email").trim().to_string();
    let password = str_field(&visit.body, "password").to_string();

    if username.is_empty() || password.is_empty() {
        visit.flash(FlashKind::Error, "Username and password are required");
        return Ok(Reply::redirect("/signup"));
    }
    if username.len() > MAX_USERNAME_LENGTH || email.len() > MAX_EMAIL_LENGTH {
        visit.flash(FlashKind::Error, "Username or email is too long");
        return Ok(Reply::redirect("/signup"));
    }

    match register(&app.store, &username, &email, &password) {
        Ok(user) => {
            info!(user_id = %user.id, %username, "user signed up");
            visit.flash(FlashKind::Success, "Account created successfully");
            Ok(Reply::redirect("/login"))
        }
        Err(SignupError::DuplicateUsername) => {
            info!(%username, "signup rejected, username taken");
            visit.flash(FlashKind::Error, "Username already taken");
            Ok(Reply::redirect("/signup"))
        }
        Err(e) => {
            error!("Signup error: {}", e);
            visit.flash(FlashKind::Error, "Internal server error");
            Ok(Reply::redirect("/signup"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::MemoryKv;
    use crate::core::helpers::verify_password;

    #[test]
    fn registered_users_have_hashed_passwords() {
        let store = Gateway::new(MemoryKv::new());
        let user = register(&store, "ana", "ana@example.com", "secret").unwrap();
        assert_ne!(user.password, "secret");
        assert!(verify_password("secret", &user.password));
    }

    #[test]
    fn taken_usernames_are_refused_without_a_new_record() {
        let store = Gateway::new(MemoryKv::new());
        register(&store, "ana", "", "secret").unwrap();
        let err = register(&store, "ana", "other@example.com", "x").unwrap_err();
        assert!(matches!(err, SignupError::DuplicateUsername));

        let ids: Vec<String> = store
            .kv()
            .get_json(crate::config::USERS_LIST_KEY)
            .unwrap()
            .unwrap();
        assert_eq!(ids.len(), 1);
    }
}
