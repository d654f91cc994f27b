use std::collections::BTreeMap;

use tracing::debug;

use crate::config::{
    listing_key, session_key, user_key, LISTINGS_LIST_KEY, SESSIONS_INDEX_KEY, USERS_LIST_KEY,
};
use crate::core::db::KvStore;
use crate::core::errors::StoreError;
use crate::core::helpers::{now_iso, validate_uuid};
use crate::models::models::{Listing, ListingUpdate, SessionData, User, UserFilter};

/// Document-level access to the `users`, `listings` and `sessions` collections.
///
/// Each document lives under `user:{id}` / `listing:{id}` / `session:{token}`;
/// the id lists kept at `users_list` / `listings_list` stand in for collection
/// scans, and `sessions_index` maps every live token to its expiry. Nothing here
/// is transactional: concurrent writers race and the last write wins.
pub struct Gateway<S> {
    kv: S,
}

impl<S: KvStore> Gateway<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &S {
        &self.kv
    }

    // === Users ===

    pub fn find_user(&self, filter: &UserFilter) -> Result<Option<User>, StoreError> {
        for id in self.ids(USERS_LIST_KEY)? {
            if let Some(user) = self.kv.get_json::<User>(&user_key(&id))? {
                if filter.matches(&user) {
                    return Ok(Some(user));
                }
            }
        }
        Ok(None)
    }

    pub fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        check_id(id)?;
        self.kv.get_json(&user_key(id))
    }

    pub fn save_user(&self, user: User) -> Result<User, StoreError> {
        check_id(&user.id)?;
        self.kv.set_json(&user_key(&user.id), &user)?;

        let mut users = self.ids(USERS_LIST_KEY)?;
        if !users.contains(&user.id) {
            users.push(user.id.clone());
            self.kv.set_json(USERS_LIST_KEY, &users)?;
        }
        Ok(user)
    }

    // === Listings ===

    /// Every listing, newest first.
    pub fn find_listings(&self) -> Result<Vec<Listing>, StoreError> {
        let mut listings = Vec::new();
        for id in self.ids(LISTINGS_LIST_KEY)? {
            if let Some(listing) = self.kv.get_json::<Listing>(&listing_key(&id))? {
                listings.push(listing);
            }
        }
        Ok(listings)
    }

    pub fn find_listing_by_id(&self, id: &str) -> Result<Option<Listing>, StoreError> {
        check_id(id)?;
        self.kv.get_json(&listing_key(id))
    }

    pub fn save_listing(&self, listing: Listing) -> Result<Listing, StoreError> {
        check_id(&listing.id)?;
        self.kv.set_json(&listing_key(&listing.id), &listing)?;

        let mut listings = self.ids(LISTINGS_LIST_KEY)?;
        if !listings.contains(&listing.id) {
            listings.insert(0, listing.id.clone()); // prepend newest
            self.kv.set_json(LISTINGS_LIST_KEY, &listings)?;
        }
        Ok(listing)
    }

    /// Apply the supplied fields over the stored ones; `None` if the listing is gone.
    pub fn update_listing(
        &self,
        id: &str,
        update: &ListingUpdate,
    ) -> Result<Option<Listing>, StoreError> {
        let Some(mut listing) = self.find_listing_by_id(id)? else {
            return Ok(None);
        };
        listing.fields.merge(update);
        listing.updated_at = Some(now_iso());
        self.kv.set_json(&listing_key(id), &listing)?;
        Ok(Some(listing))
    }

    /// Remove a listing and return what was deleted.
    pub fn delete_listing(&self, id: &str) -> Result<Option<Listing>, StoreError> {
        let Some(listing) = self.find_listing_by_id(id)? else {
            return Ok(None);
        };
        self.kv.delete(&listing_key(id))?;

        let mut listings = self.ids(LISTINGS_LIST_KEY)?;
        listings.retain(|lid| lid != id);
        self.kv.set_json(LISTINGS_LIST_KEY, &listings)?;
        Ok(Some(listing))
    }

    // === Sessions ===

    pub fn find_session(&self, token: &str) -> Result<Option<SessionData>, StoreError> {
        if !validate_uuid(token) {
            // Forged or stale cookie formats simply have no session.
            return Ok(None);
        }
        self.kv.get_json(&session_key(token))
    }

    pub fn save_session(&self, token: &str, data: &SessionData) -> Result<(), StoreError> {
        check_id(token)?;
        self.kv.set_json(&session_key(token), data)?;

        let mut index = self.session_index()?;
        index.insert(token.to_string(), data.expires_at);
        self.kv.set_json(SESSIONS_INDEX_KEY, &index)
    }

    pub fn delete_session(&self, token: &str) -> Result<(), StoreError> {
        if !validate_uuid(token) {
            return Ok(());
        }
        self.kv.delete(&session_key(token))?;

        let mut index = self.session_index()?;
        if index.remove(token).is_some() {
            self.kv.set_json(SESSIONS_INDEX_KEY, &index)?;
        }
        Ok(())
    }

    /// Delete every session whose expiry is at or before `now`; returns how many went.
    ///
    /// The key-value store has no TTL, so sessions that are never presented
    /// again are only ever removed here.
    pub fn reclaim_expired_sessions(&self, now: i64) -> Result<usize, StoreError> {
        let mut index = self.session_index()?;
        let expired: Vec<String> = index
            .iter()
            .filter(|(_, expires_at)| **expires_at <= now)
            .map(|(token, _)| token.clone())
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        for token in &expired {
            self.kv.delete(&session_key(token))?;
            index.remove(token);
        }
        self.kv.set_json(SESSIONS_INDEX_KEY, &index)?;
        debug!(count = expired.len(), "reclaimed expired sessions");
        Ok(expired.len())
    }

    fn session_index(&self) -> Result<BTreeMap<String, i64>, StoreError> {
        Ok(self.kv.get_json(SESSIONS_INDEX_KEY)?.unwrap_or_default())
    }

    fn ids(&self, list_key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.kv.get_json(list_key)?.unwrap_or_default())
    }
}

fn check_id(id: &str) -> Result<(), StoreError> {
    if validate_uuid(id) {
        Ok(())
    } else {
        Err(StoreError::MalformedId(id.to_string()))
    }
}
