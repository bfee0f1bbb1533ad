#![forbid(unsafe_code)]

use anyhow::Result;
use log::info;
use poem::listener::TcpListener;
use poem::{get, EndpointExt, Route};
use poem_openapi::OpenApiService;

use crate::utils::config::{ctx, init_log, init_runtime_context, set_ctx};

mod auth;
mod availability;
mod background;
mod events;
mod reservations;
mod utils;
mod v1;
mod waitlist;
mod webhooks;

const SERVER_NAME: &str = "reservo";

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    println!("Starting reservo!");

    init_log();
    set_ctx(init_runtime_context().await);
    print_version_info();

    let base_url = format!("{}:{}{}", ctx().parms.config.http_addr, ctx().parms.config.http_port, "/v1");
    let api_service = OpenApiService::new(v1::apis(), "Reservo", "0.1.0").server(base_url);
    let spec = api_service.spec_endpoint();
    let spec_yaml = api_service.spec_endpoint_yaml();
    let ui = api_service.swagger_ui();

    let _background = background::spawn_all(ctx().store.clone(), &ctx().bus, &ctx().parms.config);

    let addr = format!("0.0.0.0:{}", ctx().parms.config.http_port);
    let app = Route::new()
        .nest("/v1", api_service)
        .nest("/", ui)
        .at("/spec", spec)
        .at("/spec_yaml", spec_yaml)
        .at("/ws", get(v1::ws::ws_handler))
        .data(ctx());

    poem::Server::new(TcpListener::bind(addr)).name(SERVER_NAME).run(app).await
}

fn print_version_info() {
    info!(
        "{}.",
        format!(
            "\n*** Running reservo={}, BRANCH={}, COMMIT={}, DIRTY={}, SRC_TS={}, RUSTC={}",
            option_env!("CARGO_PKG_VERSION").unwrap_or("unknown"),
            env!("GIT_BRANCH"),
            env!("GIT_COMMIT_SHORT"),
            env!("GIT_DIRTY"),
            env!("SOURCE_TIMESTAMP"),
            env!("RUSTC_VERSION"),
        ),
    );
}
