use spin_sdk::http::Response;

/// The single response action a handler performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Page { status: u16, html: String },
    Redirect(String),
}

impl Reply {
    pub fn html(html: String) -> Self {
        Reply::Page { status: 200, html }
    }

    pub fn redirect(location: &str) -> Self {
        Reply::Redirect(location.to_string())
    }

    pub fn status(&self) -> u16 {
        match self {
            Reply::Page { status, .. } => *status,
            Reply::Redirect(_) => 302,
        }
    }

    /// Builds the wire response, attaching the session cookie when one was issued.
    pub fn into_response(self, set_cookie: Option<&str>) -> Response {
        let mut builder = Response::builder();
        builder.status(self.status());
        if let Some(cookie) = set_cookie {
            builder.header("Set-Cookie", cookie);
        }
        match self {
            Reply::Page { html, .. } => builder
                .header("Content-Type", "text/html; charset=utf-8")
                .body(html.into_bytes())
                .build(),
            Reply::Redirect(location) => builder
                .header("Location", location.as_str())
                .body(Vec::new())
                .build(),
        }
    }
}
