#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    listings::telemetry::init();
    let config = listings::config::Config::from_env();
    listings::native::run(config).await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
