//! Plain HTML for each page. Every interpolated value goes through `html_escape`.

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use crate::models::models::{Flash, FlashKind, Listing, ListingFields, User};

/// Shared page furniture: the logged-in username and the flashes to show once.
#[derive(Debug, Default)]
pub struct Chrome {
    pub username: Option<String>,
    pub flashes: Vec<Flash>,
}

fn layout(title: &str, chrome: &Chrome, body: &str) -> String {
    let nav_user = match &chrome.username {
        Some(name) => format!(
            r#"<span class="who">{}</span>
      <form method="POST" action="/logout" class="inline"><button>Log out</button></form>"#,
            text(name)
        ),
        None => r#"<a href="/login">Log in</a> <a href="/signup">Sign up</a>"#.to_string(),
    };

    let flashes: String = chrome
        .flashes
        .iter()
        .map(|flash| {
            let class = match flash.kind {
                FlashKind::Success => "flash flash-success",
                FlashKind::Error => "flash flash-error",
            };
            format!(r#"<div class="{}">{}</div>"#, class, text(&flash.message))
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>{title}</title>
</head>
<body>
  <nav>
    <a href="/listings">All listings</a>
    <a href="/listings/new">New listing</a>
    {nav_user}
  </nav>
  {flashes}
  <main>
{body}
  </main>
</body>
</html>
"#,
        title = text(title),
        nav_user = nav_user,
        flashes = flashes,
        body = body,
    )
}

pub fn login(chrome: &Chrome) -> String {
    layout(
        "Log in",
        chrome,
        r#"<h1>Log in</h1>
<form method="POST" action="/login">
  <label>Username <input name="username" required></label>
  <label>Password <input name="password" type="password" required></label>
  <button>Log in</button>
</form>"#,
    )
}

pub fn signup(chrome: &Chrome) -> String {
    layout(
        "Sign up",
        chrome,
        r#"<h1>Sign up</h1>
<form method="POST" action="/signup">
  <label>Username <input name="username" required></label>
  <label>Email <input name="email" type="email"></label>
  <label>Password <input name="password" type="password" required></label>
  <button>Create account</button>
</form>"#,
    )
}

pub fn dashboard(chrome: &Chrome, user: &User) -> String {
    let body = format!(
        r#"<h1>Dashboard</h1>
<p>Welcome back, {}.</p>
<p><a href="/listings/new">Create a listing</a></p>"#,
        text(&user.username)
    );
    layout("Dashboard", chrome, &body)
}

fn price_label(fields: &ListingFields) -> String {
    fields
        .price()
        .map(|p| format!("&#8377; {}", p))
        .unwrap_or_else(|| "Price on request".to_string())
}

pub fn index(chrome: &Chrome, listings: &[Listing]) -> String {
    let mut body = String::from("<h1>All listings</h1>\n");
    if listings.is_empty() {
        body.push_str("<p>No listings yet.</p>\n");
    } else {
        body.push_str("<ul class=\"listings\">\n");
        for listing in listings {
            body.push_str(&format!(
                "  <li><a href=\"/listings/{}\">{}</a> <span class=\"price\">{}</span></li>\n",
                attr(&listing.id),
                text(listing.fields.title()),
                price_label(&listing.fields),
            ));
        }
        body.push_str("</ul>\n");
    }
    layout("All listings", chrome, &body)
}

pub fn show(chrome: &Chrome, listing: &Listing) -> String {
    let fields = &listing.fields;
    let image = fields
        .image()
        .map(|src| format!(r#"<img src="{}" alt="listing image">"#, attr(src)))
        .unwrap_or_default();
    let body = format!(
        r#"<h1>{title}</h1>
{image}
<p>{description}</p>
<p class="price">{price}</p>
<p class="where">{location} {country}</p>
<a href="/listings/{id}/edit">Edit</a>
<form method="POST" action="/listings/{id}?_method=DELETE" class="inline">
  <button>Delete</button>
</form>"#,
        title = text(fields.title()),
        image = image,
        description = text(fields.description()),
        price = price_label(fields),
        location = text(fields.location()),
        country = text(fields.country()),
        id = attr(&listing.id),
    );
    layout(fields.title(), chrome, &body)
}

fn listing_form(action: &str, method: Option<&str>, fields: &ListingFields, submit: &str) -> String {
    let override_field = method
        .map(|m| format!(r#"<input type="hidden" name="_method" value="{}">"#, attr(m)))
        .unwrap_or_default();
    let price = fields.price().map(|p| p.to_string()).unwrap_or_default();
    format!(
        r#"<form method="POST" action="{action}">
  {override_field}
  <label>Title <input name="listing[title]" value="{title}"></label>
  <label>Description <textarea name="listing[description]">{description}</textarea></label>
  <label>Image URL <input name="listing[image]" value="{image}"></label>
  <label>Price <input name="listing[price]" type="number" min="0" value="{price}"></label>
  <label>Location <input name="listing[location]" value="{location}"></label>
  <label>Country <input name="listing[country]" value="{country}"></label>
  <button>{submit}</button>
</form>"#,
        action = attr(action),
        override_field = override_field,
        title = attr(fields.title.as_deref().unwrap_or_default()),
        description = text(fields.description()),
        image = attr(fields.image.as_deref().unwrap_or_default()),
        price = attr(&price),
        location = attr(fields.location()),
        country = attr(fields.country()),
        submit = text(submit),
    )
}

pub fn new_listing(chrome: &Chrome) -> String {
    let body = format!(
        "<h1>New listing</h1>\n{}",
        listing_form("/listings", None, &ListingFields::default(), "Add")
    );
    layout("New listing", chrome, &body)
}

pub fn edit_listing(chrome: &Chrome, listing: &Listing) -> String {
    let action = format!("/listings/{}", listing.id);
    let body = format!(
        "<h1>Edit listing</h1>\n{}",
        listing_form(&action, Some("PUT"), &listing.fields, "Save")
    );
    layout("Edit listing", chrome, &body)
}

pub fn error_page(status: u16, message: &str) -> String {
    let body = format!(
        "<h1>{}</h1>\n<p>{}</p>\n<p><a href=\"/listings\">Back to listings</a></p>",
        status,
        text(message)
    );
    layout("Something went wrong", &Chrome::default(), &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_content_is_escaped() {
        let listing = Listing::new(
            ListingFields {
                title: Some("<script>alert(1)</script>".into()),
                image: Some("\" onerror=\"x".into()),
                ..Default::default()
            },
            None,
        );
        let html = show(&Chrome::default(), &listing);
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("\" onerror=\"x"));
    }

    #[test]
    fn flashes_are_rendered() {
        let chrome = Chrome {
            username: Some("ana".into()),
            flashes: vec![Flash {
                kind: FlashKind::Error,
                message: "Username already taken".into(),
            }],
        };
        let html = signup(&chrome);
        assert!(html.contains("flash-error"));
        assert!(html.contains("Username already taken"));
        assert!(html.contains("Log out"));
    }

    #[test]
    fn edit_form_overrides_to_put() {
        let listing = Listing::new(
            ListingFields {
                title: Some("A".into()),
                price: Some(100),
                ..Default::default()
            },
            None,
        );
        let html = edit_listing(&Chrome::default(), &listing);
        assert!(html.contains(r#"name="_method" value="PUT""#));
        assert!(html.contains(r#"value="100""#));
        assert!(html.contains(&format!("/listings/{}", listing.id)));
    }
}
