mod signals;

use adsignal_core::AppConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "adsignal-cli")]
#[command(about = "Temporal strategic signal engine command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Print the trend radar as JSON
    Radar {
        /// Total window length in days (clamped to 7..=180)
        #[arg(long)]
        days: Option<i64>,

        /// Restrict to one product category guess
        #[arg(long)]
        category: Option<String>,

        /// Entries per rising/falling list (clamped to 3..=10)
        #[arg(long)]
        top: Option<i64>,
    },
    /// Run one weekly pulse pass and append its report
    Pulse,
    /// List recent pulse reports, newest first
    Reports {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Verify the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("adsignal-cli ready; see --help for commands");
        return Ok(());
    };

    let config = adsignal_core::load_app_config()?;
    init_tracing(&config)?;

    let pool_config = adsignal_db::PoolConfig::from_app_config(&config);
    let pool = adsignal_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            adsignal_db::health_check(&pool).await?;
            println!("database ok");
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let applied = adsignal_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::Radar {
            days,
            category,
            top,
        } => signals::run_radar_command(&pool, days, category, top).await?,
        Commands::Pulse => signals::run_pulse_command(&config, &pool).await?,
        Commands::Reports { limit } => signals::run_reports_command(&pool, limit).await?,
    }

    Ok(())
}

// Logs go to stderr so stdout stays machine-readable JSON.
fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
