use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use clap::Parser;
use parlor::api::middleware::ApiKeyAuth;
use parlor::app::AppState;
use parlor::cli::{commands::{Cli, Commands}, run_cli};
use parlor::config::AppConfig;
use tracing::{error, info};

async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({"status": "healthy"}))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Serve) {
        if let Err(e) = run_cli(cli.command, cli.config).await {
            error!("{}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    info!("Starting Parlor server...");

    let config = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let state = match AppState::build(&config) {
        Ok(state) => state,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let host = config.server.host.clone();
    let port = config.server.port;

    info!("Server listening on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(state.clone()))
            .route("/health", web::get().to(health))
            .wrap(ApiKeyAuth)
            .configure(parlor::api::routes::configure)
            .configure(parlor::api::websocket::configure)
    })
    .bind((host, port))?
    .run()
    .await
}
