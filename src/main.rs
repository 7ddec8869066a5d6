use clap::Parser;
use color_eyre::Result;
use reeljournal::{
    CatalogClient, CatalogSync, Config, Database, Journal, Profile,
    cli::{self, Cli, Commands, Session},
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;

    let cli = Cli::parse();

    // Determine profile: --dev flag enables dev mode, otherwise use prod
    let profile = if cli.dev { Profile::Dev } else { Profile::Prod };

    // Logs go to stderr so --json output stays clean; RUST_LOG wins when set
    let default_level = if cli.dev { "reeljournal=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(std::path::Path::new(path))?,
        None => Config::load_with_profile(profile)?,
    };
    if config.api_key.is_empty() {
        tracing::warn!("No TMDb API key configured; only cached movies are available");
    }

    let db_path = config.get_database_path();
    let db = Database::new(
        db_path.to_str()
            .ok_or_else(|| color_eyre::eyre::eyre!("Database path contains invalid UTF-8"))?,
    )?;
    let client = CatalogClient::from_config(&config)?;

    let username = cli.user.clone().unwrap_or_else(|| config.default_user.clone());
    let username = username.trim();
    if username.is_empty() {
        return Err(color_eyre::eyre::eyre!("User name must not be empty"));
    }
    let user = db.get_or_create_user(username)?;

    let sync = CatalogSync::new(&client, &db);
    let session = Session {
        config: &config,
        sync,
        journal: Journal::new(sync, user),
        json: cli.json,
    };

    let command = cli.command.unwrap_or(Commands::Browse { query: None, page: None });
    cli::run(command, &session)?;

    Ok(())
}
