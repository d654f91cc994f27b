//! Native `actix-web` host for the router, backed by the in-memory store.

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use tracing::{error, info};

use crate::config::Config;
use crate::core::db::MemoryKv;
use crate::router::{dispatch, AppState};

pub type NativeState = AppState<MemoryKv>;

mod adapter {
    use actix_web::HttpRequest;
    use spin_sdk::http::{Method, Request, Response};

    pub fn actix_to_spin_request(req: &HttpRequest, body: actix_web::web::Bytes) -> Request {
        let method = match req.method().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "PATCH" => Method::Patch,
            _ => Method::Get,
        };

        let uri = req.uri().to_string();

        let mut builder = Request::builder();
        builder.method(method).uri(&uri);

        // Copy headers
        for (name, value) in req.headers() {
            if let Ok(val_str) = value.to_str() {
                builder.header(name.as_str(), val_str);
            }
        }

        builder.body(body.to_vec()).build()
    }

    pub fn spin_to_actix_response(spin_resp: Response) -> actix_web::HttpResponse {
        let status = *spin_resp.status();

        let mut response = actix_web::HttpResponse::build(
            actix_web::http::StatusCode::from_u16(status)
                .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
        );
        for (name, value) in spin_resp.headers() {
            if let Some(val_str) = value.as_str() {
                response.append_header((name, val_str));
            }
        }

        response.body(spin_resp.body().to_vec())
    }
}

/// Catch-all actix handler: every route is resolved by the shared router.
///
/// The router runs on the blocking pool since signup and login hash with argon2.
pub async fn handle_all(
    state: web::Data<NativeState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let spin_req = adapter::actix_to_spin_request(&req, body);
    match web::block(move || dispatch(state.get_ref(), &spin_req)).await {
        Ok(spin_resp) => adapter::spin_to_actix_response(spin_resp),
        Err(e) => {
            error!("request handler did not complete: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

pub fn state(config: Config) -> web::Data<NativeState> {
    web::Data::new(AppState::new(MemoryKv::new(), config))
}

pub async fn run(config: Config) -> std::io::Result<()> {
    let addr = config.bind_addr();
    let state = state(config);
    info!("App is listening on http://{}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .default_service(web::route().to(handle_all))
    })
    .bind(addr)?
    .run()
    .await
}
