use clap::Parser;
use commission_engine::traits::CommissionLedgerDatabase;
use commission_server::{
    cli::{display_envs, Arguments, Command},
    command_handler::run_command,
    config::ServerConfig,
    errors::ServerError,
    notifications::notification_hooks,
    server::{open_database, run_server},
};
use dotenvy::dotenv;
use log::*;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let args = Arguments::parse();
    let config = ServerConfig::from_env_or_default();
    match run(config, args.command).await {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        },
    }
}

async fn run(config: ServerConfig, command: Command) -> Result<String, ServerError> {
    match command {
        Command::Serve => {
            info!("🚀️ Starting commission server");
            run_server(config).await?;
            Ok("Bye!".to_string())
        },
        Command::Migrate => {
            let mut db = open_database(&config).await?;
            db.close().await?;
            Ok(format!("{} is up to date", config.database_url))
        },
        Command::Envs => {
            display_envs();
            Ok(String::default())
        },
        command => run_command(&config, command, notification_hooks()).await,
    }
}
