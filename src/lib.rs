pub mod auth;
pub mod config;
pub mod core;
pub mod listings;
pub mod models;
#[cfg(not(target_arch = "wasm32"))]
pub mod native;
pub mod router;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod users;
pub mod views;

#[cfg(target_arch = "wasm32")]
use spin_sdk::{
    http::{IntoResponse, Request},
    http_component,
};

// === Component entrypoint ===
#[cfg(target_arch = "wasm32")]
#[http_component]
fn handle(req: Request) -> anyhow::Result<impl IntoResponse> {
    crate::telemetry::init();
    let config = crate::config::Config::from_env();
    let kv = crate::core::db::SpinKv::open(&config.kv_store)?;
    let app = crate::router::AppState::new(kv, config);
    Ok(crate::router::dispatch(&app, &req))
}
