use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::MAX_FIELD_LENGTH;
use crate::core::errors::ApiError;
use crate::core::helpers::{new_id, now_iso};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string, never the plain password.
    pub password: String,
}

impl User {
    pub fn new(username: &str, email: &str, password_hash: String) -> Self {
        Self {
            id: new_id(),
            username: username.to_string(),
            email: email.to_string(),
            password: password_hash,
        }
    }
}

/// Lookup criteria for `find_user`; every present field must match.
#[derive(Clone, Debug, Default)]
pub struct UserFilter {
    pub username: Option<String>,
    pub email: Option<String>,
}

impl UserFilter {
    pub fn username(username: &str) -> Self {
        Self {
            username: Some(username.to_string()),
            ..Self::default()
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        self.username.as_ref().map_or(true, |u| *u == user.username)
            && self.email.as_ref().map_or(true, |e| *e == user.email)
    }
}

/// The attributes a client may set on a listing. Anything else is rejected.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ListingFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(
        default,
        deserialize_with = "de_price",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl ListingFields {
    pub const NAMES: [&'static str; 6] = ["title", "description", "image", "price", "location", "country"];

    /// Extract the nested `listing` object of a decoded request body.
    pub fn from_body(body: &Value) -> Result<Self, ApiError> {
        let fields = match body.get("listing") {
            None | Some(Value::Null) => Self::default(),
            Some(Value::Object(map)) => {
                if let Some(unknown) = map.keys().find(|k| !Self::NAMES.contains(&k.as_str())) {
                    return Err(ApiError::BadRequest(format!(
                        "Invalid listing: unknown field `{}`",
                        unknown
                    )));
                }
                serde_json::from_value(Value::Object(map.clone()))
                    .map_err(|e| ApiError::BadRequest(format!("Invalid listing: {}", e)))?
            }
            Some(_) => {
                return Err(ApiError::BadRequest(
                    "Invalid listing: expected an object".to_string(),
                ))
            }
        };
        fields.check_lengths()?;
        Ok(fields)
    }

    /// Overwrite every field the update carries, keeping the rest.
    pub fn merge(&mut self, update: &ListingUpdate) {
        fn take<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
            if let Some(value) = incoming {
                *slot = Some(value.clone());
            }
        }
        let other = &update.fields;
        take(&mut self.title, &other.title);
        take(&mut self.description, &other.description);
        take(&mut self.image, &other.image);
        take(&mut self.price, &other.price);
        take(&mut self.location, &other.location);
        take(&mut self.country, &other.country);
        if update.clear_price {
            self.price = None;
        }
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled listing")
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref().filter(|s| !s.is_empty())
    }

    pub fn price(&self) -> Option<u64> {
        self.price
    }

    pub fn location(&self) -> &str {
        self.location.as_deref().unwrap_or_default()
    }

    pub fn country(&self) -> &str {
        self.country.as_deref().unwrap_or_default()
    }

    fn check_lengths(&self) -> Result<(), ApiError> {
        let texts = [
            &self.title,
            &self.description,
            &self.image,
            &self.location,
            &self.country,
        ];
        if texts
            .iter()
            .filter_map(|t| t.as_deref())
            .any(|t| t.len() > MAX_FIELD_LENGTH)
        {
            return Err(ApiError::BadRequest("Listing field too long".to_string()));
        }
        Ok(())
    }
}

/// The body of an edit.
///
/// Text fields sent empty are stored as `Some("")`, but a blank price parses to
/// `None`, which alone would read as "not sent". `clear_price` keeps the two apart.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListingUpdate {
    pub fields: ListingFields,
    pub clear_price: bool,
}

impl ListingUpdate {
    pub fn from_body(body: &Value) -> Result<Self, ApiError> {
        let fields = ListingFields::from_body(body)?;
        let price_sent = body
            .get("listing")
            .and_then(|listing| listing.get("price"))
            .is_some();
        Ok(Self {
            clear_price: price_sent && fields.price.is_none(),
            fields,
        })
    }
}

impl From<ListingFields> for ListingUpdate {
    fn from(fields: ListingFields) -> Self {
        Self {
            fields,
            clear_price: false,
        }
    }
}

// Forms send every value as text, JSON clients send numbers.
fn de_price<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| D::Error::custom("price must be a whole, non-negative number")),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| D::Error::custom("price must be a whole, non-negative number")),
        Some(_) => Err(D::Error::custom("price must be a number")),
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Listing {
    pub id: String,
    #[serde(flatten)]
    pub fields: ListingFields,
    /// Creator's user id when the listing was made from a logged-in session.
    pub owner_id: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl Listing {
    pub fn new(fields: ListingFields, owner_id: Option<String>) -> Self {
        Self {
            id: new_id(),
            fields,
            owner_id,
            created_at: now_iso(),
            updated_at: None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Error,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SessionData {
    pub user_id: Option<String>,
    #[serde(default)]
    pub flashes: Vec<Flash>,
    pub created_at: String,
    /// Unix timestamp after which the session is gone.
    pub expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn form_prices_are_parsed_as_numbers() {
        let fields =
            ListingFields::from_body(&json!({"listing": {"title": "A", "price": "100"}})).unwrap();
        assert_eq!(fields.title(), "A");
        assert_eq!(fields.price(), Some(100));

        let fields = ListingFields::from_body(&json!({"listing": {"price": 250}})).unwrap();
        assert_eq!(fields.price(), Some(250));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = ListingFields::from_body(&json!({"listing": {"title": "A", "owner_id": "me"}}))
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn bad_prices_are_rejected() {
        for price in [json!("cheap"), json!(-5), json!(1.5), json!(true)] {
            let err = ListingFields::from_body(&json!({"listing": {"price": price}})).unwrap_err();
            assert_eq!(err.status(), 400);
        }
    }

    #[test]
    fn missing_listing_is_empty() {
        assert_eq!(ListingFields::from_body(&json!({})).unwrap(), ListingFields::default());
        assert!(ListingFields::from_body(&json!({"listing": "A"})).is_err());
    }

    #[test]
    fn merge_keeps_fields_the_update_omits() {
        let mut stored = ListingFields {
            title: Some("A".into()),
            price: Some(100),
            ..Default::default()
        };
        stored.merge(
            &ListingFields {
                title: Some("B".into()),
                ..Default::default()
            }
            .into(),
        );
        assert_eq!(stored.title.as_deref(), Some("B"));
        assert_eq!(stored.price, Some(100));
    }

    #[test]
    fn blank_prices_clear_but_absent_prices_keep() {
        let mut stored = ListingFields {
            title: Some("A".into()),
            price: Some(100),
            ..Default::default()
        };

        let untouched = ListingUpdate::from_body(&json!({"listing": {"title": "B"}})).unwrap();
        assert!(!untouched.clear_price);
        stored.merge(&untouched);
        assert_eq!(stored.price, Some(100));

        for blank in [json!(""), json!("  "), Value::Null] {
            let mut copy = stored.clone();
            let update = ListingUpdate::from_body(&json!({"listing": {"price": blank}})).unwrap();
            assert!(update.clear_price);
            copy.merge(&update);
            assert_eq!(copy.price, None);
            assert_eq!(copy.title.as_deref(), Some("B"));
        }
    }

    #[test]
    fn listing_documents_are_flat() {
        let listing = Listing::new(
            ListingFields {
                title: Some("A".into()),
                price: Some(100),
                ..Default::default()
            },
            None,
        );
        let doc = serde_json::to_value(&listing).unwrap();
        assert_eq!(doc["title"], "A");
        assert_eq!(doc["price"], 100);
        let back: Listing = serde_json::from_value(doc).unwrap();
        assert_eq!(back, listing);
    }

    #[test]
    fn user_filters_match_every_given_field() {
        let user = User::new("ana", "ana@example.com", "hash".into());
        assert!(UserFilter::username("ana").matches(&user));
        assert!(!UserFilter::username("bob").matches(&user));
        let filter = UserFilter {
            username: Some("ana".into()),
            email: Some("other@example.com".into()),
        };
        assert!(!filter.matches(&user));
        assert!(UserFilter::default().matches(&user));
    }
}
