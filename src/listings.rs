use tracing::info;

use crate::core::db::KvStore;
use crate::core::errors::ApiError;
use crate::core::reply::Reply;
use crate::models::models::{Listing, ListingFields, ListingUpdate};
use crate::router::AppState;
use crate::session::Visit;
use crate::views;

/// Listings made by a logged-in user can only be changed from that user's session.
fn ensure_owner(visit: &Visit, listing: &Listing) -> Result<(), ApiError> {
    match listing.owner_id.as_deref() {
        None => Ok(()),
        Some(owner) if visit.user.as_ref().is_some_and(|u| u.id == owner) => Ok(()),
        Some(_) => Err(ApiError::Forbidden),
    }
}

fn not_found() -> Reply {
    ApiError::NotFound("Listing not found".to_string()).into()
}

pub fn list_listings<S: KvStore>(app: &AppState<S>, visit: &mut Visit) -> anyhow::Result<Reply> {
    let all_listings = app.store.find_listings()?;
    Ok(Reply::html(views::index(&visit.chrome(), &all_listings)))
}

pub fn new_listing_form<S: KvStore>(
    _app: &AppState<S>,
    visit: &mut Visit,
) -> anyhow::Result<Reply> {
    Ok(Reply::html(views::new_listing(&visit.chrome())))
}

pub fn show_listing<S: KvStore>(
    app: &AppState<S>,
    visit: &mut Visit,
    id: &str,
) -> anyhow::Result<Reply> {
    match app.store.find_listing_by_id(id)? {
        Some(listing) => Ok(Reply::html(views::show(&visit.chrome(), &listing))),
        None => Ok(not_found()),
    }
}

pub fn create_listing<S: KvStore>(app: &AppState<S>, visit: &mut Visit) -> anyhow::Result<Reply> {
    let fields = match ListingFields::from_body(&visit.body) {
        Ok(fields) => fields,
        Err(e) => return Ok(e.into()),
    };
    let owner_id = visit.user.as_ref().map(|u| u.id.clone());

    let listing = app.store.save_listing(Listing::new(fields, owner_id))?;
    info!(listing_id = %listing.id, "listing created");
    Ok(Reply::redirect("/listings"))
}

pub fn edit_listing_form<S: KvStore>(
    app: &AppState<S>,
    visit: &mut Visit,
    id: &str,
) -> anyhow::Result<Reply> {
    let Some(listing) = app.store.find_listing_by_id(id)? else {
        return Ok(not_found());
    };
    if let Err(e) = ensure_owner(visit, &listing) {
        return Ok(e.into());
    }
    Ok(Reply::html(views::edit_listing(&visit.chrome(), &listing)))
}

pub fn update_listing<S: KvStore>(
    app: &AppState<S>,
    visit: &mut Visit,
    id: &str,
) -> anyhow::Result<Reply> {
    let Some(listing) = app.store.find_listing_by_id(id)? else {
        return Ok(not_found());
    };
    if let Err(e) = ensure_owner(visit, &listing) {
        return Ok(e.into());
    }
    let update = match ListingUpdate::from_body(&visit.body) {
        Ok(update) => update,
        Err(e) => return Ok(e.into()),
    };

    match app.store.update_listing(id, &update)? {
        Some(updated) => {
            info!(listing_id = %updated.id, "listing updated");
            Ok(Reply::redirect("/listings"))
        }
        None => Ok(not_found()),
    }
}

pub fn delete_listing<S: KvStore>(
    app: &AppState<S>,
    visit: &mut Visit,
    id: &str,
) -> anyhow::Result<Reply> {
    let Some(listing) = app.store.find_listing_by_id(id)? else {
        return Ok(not_found());
    };
    if let Err(e) = ensure_owner(visit, &listing) {
        return Ok(e.into());
    }

    if let Some(deleted) = app.store.delete_listing(id)? {
        info!(listing_id = %deleted.id, title = deleted.fields.title(), "listing deleted");
    }
    Ok(Reply::redirect("/listings"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::models::User;
    use crate::router::Verb;
    use std::collections::HashMap;

    fn visit_as(user: Option<User>) -> Visit {
        Visit::new(Verb::Put, "/", HashMap::new(), serde_json::json!({}), 0)
            .with_session(None, user)
    }

    #[test]
    fn ownerless_listings_are_open_to_anyone() {
        let listing = Listing::new(ListingFields::default(), None);
        assert!(ensure_owner(&visit_as(None), &listing).is_ok());
    }

    #[test]
    fn owned_listings_are_closed_to_others() {
        let owner = User::new("ana", "", "hash".into());
        let other = User::new("bob", "", "hash".into());
        let listing = Listing::new(ListingFields::default(), Some(owner.id.clone()));

        assert!(ensure_owner(&visit_as(Some(owner)), &listing).is_ok());
        assert!(matches!(
            ensure_owner(&visit_as(Some(other)), &listing),
            Err(ApiError::Forbidden)
        ));
        assert!(matches!(
            ensure_owner(&visit_as(None), &listing),
            Err(ApiError::Forbidden)
        ));
    }
}
