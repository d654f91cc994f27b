use spin_sdk::http::{Method, Request, Response};
use tracing::{error, warn};

use crate::config::Config;
use crate::core::db::KvStore;
use crate::core::errors::ApiError;
use crate::core::forms::{method_override, parse_body, parse_query_params};
use crate::core::helpers::now_ts;
use crate::core::reply::Reply;
use crate::session::{commit, resolve_session, token_from_cookies, Visit};
use crate::store::Gateway;
use crate::{auth, listings, users};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Other,
}

impl Verb {
    fn from_method(method: &Method) -> Self {
        match method {
            Method::Get | Method::Head => Verb::Get,
            Method::Post => Verb::Post,
            Method::Put => Verb::Put,
            Method::Patch => Verb::Patch,
            Method::Delete => Verb::Delete,
            _ => Verb::Other,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "PUT" => Some(Verb::Put),
            "PATCH" => Some(Verb::Patch),
            "DELETE" => Some(Verb::Delete),
            _ => None,
        }
    }
}

/// Everything a handler needs besides the request: the gateway and the config.
pub struct AppState<S> {
    pub store: Gateway<S>,
    pub config: Config,
}

impl<S: KvStore> AppState<S> {
    pub fn new(kv: S, config: Config) -> Self {
        Self {
            store: Gateway::new(kv),
            config,
        }
    }
}

/// Serve one HTTP request end to end: decode, resolve the session, route, persist.
pub fn dispatch<S: KvStore>(app: &AppState<S>, req: &Request) -> Response {
    let mut visit = match read_visit(app, req) {
        Ok(visit) => visit,
        Err(e) => return Reply::from(e).into_response(None),
    };

    let reply = match route(app, &mut visit) {
        Ok(reply) => reply,
        Err(e) => {
            error!(path = %visit.path, "request failed: {:#}", e);
            ApiError::from(e).into()
        }
    };

    let cookie = match commit(&app.store, &mut visit, &app.config) {
        Ok(cookie) => cookie,
        Err(e) => {
            warn!("failed to persist session: {}", e);
            None
        }
    };
    reply.into_response(cookie.as_deref())
}

fn read_visit<S: KvStore>(app: &AppState<S>, req: &Request) -> Result<Visit, ApiError> {
    let query = parse_query_params(&req.uri());
    let content_type = req.header("content-type").and_then(|h| h.as_str());
    let body = parse_body(content_type, req.body())?;

    let mut verb = Verb::from_method(req.method());
    if verb == Verb::Post {
        if let Some(overridden) = method_override(&body, &query).as_deref().and_then(Verb::from_name) {
            verb = overridden;
        }
    }

    let now = now_ts();
    let token = req
        .header("cookie")
        .and_then(|h| h.as_str())
        .and_then(token_from_cookies);
    let (session, user) = match resolve_session(&app.store, token.as_deref(), now) {
        Ok(found) => found,
        Err(e) => {
            // An unreadable session is treated as no session at all.
            warn!("failed to resolve session: {}", e);
            (None, None)
        }
    };

    Ok(Visit::new(verb, req.path(), query, body, now).with_session(session, user))
}

/// Map the visit's verb and path to its handler.
pub fn route<S: KvStore>(app: &AppState<S>, visit: &mut Visit) -> anyhow::Result<Reply> {
    let path = visit.path.clone();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (visit.verb, segments.as_slice()) {
        (Verb::Get, []) => Ok(Reply::redirect("/listings")),

        (Verb::Get, ["login"]) => auth::login_form(app, visit),
        (Verb::Post, ["login"]) => auth::login_user(app, visit),
        (Verb::Get | Verb::Post, ["logout"]) => auth::logout_user(app, visit),
        (Verb::Get, ["signup"]) => users::signup_form(app, visit),
        (Verb::Post, ["signup"]) => users::create_user(app, visit),
        (Verb::Get, ["dashboard"]) => auth::dashboard(app, visit),

        (Verb::Get, ["listings"]) => listings::list_listings(app, visit),
        (Verb::Post, ["listings"]) => listings::create_listing(app, visit),
        (Verb::Get, ["listings", "new"]) => listings::new_listing_form(app, visit),
        (Verb::Get, ["listings", id]) => listings::show_listing(app, visit, id),
        (Verb::Get, ["listings", id, "edit"]) => listings::edit_listing_form(app, visit, id),
        (Verb::Put | Verb::Patch, ["listings", id]) => listings::update_listing(app, visit, id),
        (Verb::Delete, ["listings", id]) => listings::delete_listing(app, visit, id),

        _ => Ok(ApiError::NotFound("No route found".to_string()).into()),
    }
}
