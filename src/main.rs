use std::error::Error;
use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;

use taskdesk::auth::Authenticator;
use taskdesk::user::{NewUser, Role};
use taskdesk::{logging, sms, AppState, Config, TaskStore};

#[derive(Debug, Parser)]
#[command(name = "taskdesk", version, about = "Role-based task assignment service")]
struct Cli {
    /// JSON config file, deep-merged over the defaults.
    #[arg(long, global = true, env = "TASKDESK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print a bearer token for a user id.
    Token {
        #[arg(long)]
        user_id: String,
        #[arg(long, default_value = "user")]
        role: Role,
    },
    /// Register a user directly in the data file.
    AddUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "user")]
        role: Role,
        #[arg(long)]
        department: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let log_level = logging::init();
    let mut config = Config::load(cli.config.as_deref())?;
    log_level.apply(&config.log_level);

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            config.validate()?;
            let store = TaskStore::open(&config.data_file)?;
            let sender = sms::from_config(&config.sms)?;
            taskdesk::server::serve(AppState::new(config, store, sender)).await?;
        }
        Command::Token { user_id, role } => {
            config.validate()?;
            let auth = Authenticator::new(&config.jwt_secret, config.token_ttl_hours);
            println!("{}", auth.issue(&user_id, role)?);
        }
        Command::AddUser {
            name,
            email,
            role,
            department,
        } => {
            let store = TaskStore::open(&config.data_file)?;
            let user = store.add_user(
                NewUser {
                    name,
                    email,
                    role,
                    department,
                },
                Utc::now(),
            )?;
            info!(user_id = %user.id, "user added");
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
    }
    Ok(())
}
