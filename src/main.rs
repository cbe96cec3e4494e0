use clap::Parser;
use microblog::cli::{Args, build_config, init_logging, load_jwt_secrets, open_database};
use microblog::{init_cleanup, run_server};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(secrets) = load_jwt_secrets(
        args.jwt_secret_file.as_deref(),
        args.jwt_refresh_secret_file.as_deref(),
    ) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database, args.db_connect_attempts).await else {
        std::process::exit(1);
    };

    let Some(config) = build_config(
        args.base,
        db,
        secrets,
        args.bcrypt_cost,
        args.login_rate_limit,
    ) else {
        std::process::exit(1);
    };

    init_cleanup(&config.db, &config.jwt).await;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, "Listening"),
        Err(e) => error!(error = %e, "Failed to read local address"),
    }

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
