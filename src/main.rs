use clap::{Parser, Subcommand};
use folio::settings::{Logging, Settings};
use folio::users::UserService;
use folio::{seed, storage, tokens, web};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "folio", version, about = "Article publishing REST API")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run migrations and start the HTTP server (default)
    Serve,
    /// Create the configured admin account if it is missing
    SeedAdmin,
}

fn init_tracing(cfg: &Logging) {
    let env_filter = if cfg.silent {
        EnvFilter::new("off")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if cfg.json {
        fmt().json().with_env_filter(env_filter).init();
    } else {
        fmt().with_env_filter(env_filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;
    init_tracing(&settings.logging);
    tracing::info!(?settings, "Loaded configuration");

    // init storage (database)
    let db = storage::init(&settings.database).await.into_diagnostic()?;
    storage::migrate(&db).await.into_diagnostic()?;

    let users = UserService::new(db.clone());

    match cli.command.unwrap_or(Command::Serve) {
        Command::SeedAdmin => {
            if settings.admin.password.is_none() {
                return Err(miette::miette!(
                    help = "set admin.password in the config file or FOLIO__ADMIN__PASSWORD",
                    "no admin password configured"
                ));
            }
            seed::ensure_default_admin(&users, &settings.admin).await?;
        }
        Command::Serve => {
            seed::ensure_default_admin(&users, &settings.admin).await?;

            // init signing key (generate if missing)
            let tokens = tokens::TokenManager::new(&settings.jwt).into_diagnostic()?;

            web::serve(web::AppState::new(settings, db, tokens)).await?;
        }
    }
    Ok(())
}
