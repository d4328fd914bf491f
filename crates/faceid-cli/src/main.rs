use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use faceid_core::{Descriptor, Fit, LiveConfig, Person};
use serde_json::Value;

mod client;
mod photo;
mod session;
mod watch;

use client::ApiClient;

const DEFAULT_SERVER: &str = "http://127.0.0.1:3000";

#[derive(Parser)]
#[command(name = "faceid", about = "FaceID assistant CLI", version)]
struct Cli {
    /// faceidd base URL (default: $FACEID_SERVER or http://127.0.0.1:3000)
    #[arg(long, global = true)]
    server: Option<String>,
    /// Session file (default: $XDG_DATA_HOME/faceid/session)
    #[arg(long, global = true)]
    session: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and sign in
    Signup {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign out and forget the saved session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Manage registered people
    People {
        #[command(subcommand)]
        command: PeopleCommand,
    },
    /// Match a descriptor against your gallery
    Match {
        /// JSON file with a 128-number descriptor
        #[arg(long)]
        descriptor: PathBuf,
    },
    /// Run live recognition over detector output (JSON lines)
    Watch {
        /// Observation file; stdin when omitted or "-"
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
        /// Display size as WIDTHxHEIGHT (default: frame size)
        #[arg(long, value_parser = watch::parse_display)]
        display: Option<(u32, u32)>,
        #[arg(long, value_enum, default_value_t = FitArg::Cover)]
        fit: FitArg,
        /// Mirror boxes horizontally (user-facing camera)
        #[arg(long)]
        mirror: bool,
        /// Match distance threshold
        #[arg(long)]
        threshold: Option<f32>,
        /// Refetch the gallery every N seconds
        #[arg(long)]
        refresh_secs: Option<u64>,
        /// Print every tick as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PeopleCommand {
    /// List registered people
    List {
        /// Case-insensitive filter on name or info
        #[arg(long)]
        search: Option<String>,
    },
    /// Register a person from a descriptor file
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        info: String,
        #[arg(long)]
        descriptor: PathBuf,
        /// Photo the descriptor came from; checked for poor lighting
        #[arg(long)]
        photo: Option<PathBuf>,
        /// Register even if the photo's lighting looks poor
        #[arg(long)]
        force: bool,
    },
    /// Remove a person by name
    Remove {
        name: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FitArg {
    Cover,
    Contain,
}

impl From<FitArg> for Fit {
    fn from(arg: FitArg) -> Self {
        match arg {
            FitArg::Cover => Fit::Cover,
            FitArg::Contain => Fit::Contain,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let server = cli
        .server
        .or_else(|| std::env::var("FACEID_SERVER").ok())
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());
    let session_path = cli.session.unwrap_or_else(session::default_path);
    let token = session::load(&session_path)
        .with_context(|| format!("failed to read {}", session_path.display()))?;
    let client = ApiClient::new(&server, token)?;

    match cli.command {
        Commands::Signup {
            first_name,
            last_name,
            email,
            password,
        } => {
            let password = password_or_prompt(password)?;
            let token = client
                .signup(&first_name, &last_name, &email, &password)
                .await?;
            save_session(&session_path, &token)?;
            println!("Account created for {email}");
        }
        Commands::Login { email, password } => {
            let password = password_or_prompt(password)?;
            let token = client.login(&email, &password).await?;
            save_session(&session_path, &token)?;
            println!("Logged in as {email}");
        }
        Commands::Logout => {
            if let Err(e) = client.logout().await {
                tracing::warn!(error = %e, "server logout failed; clearing local session anyway");
            }
            session::clear(&session_path)?;
            println!("Logged out");
        }
        Commands::Whoami => {
            let user = client.me().await?;
            println!(
                "{} {} <{}>",
                user["firstName"].as_str().unwrap_or_default(),
                user["lastName"].as_str().unwrap_or_default(),
                user["email"].as_str().unwrap_or_default()
            );
        }
        Commands::People { command } => people(&client, command).await?,
        Commands::Match { descriptor } => {
            let query = read_descriptor(&descriptor)?;
            let result = client.match_descriptor(&query).await?;
            match (result.matched, result.person_name, result.distance) {
                (true, Some(name), Some(d)) => println!("Match: {name} (distance {d:.3})"),
                (_, _, Some(d)) => println!("No match (nearest distance {d:.3})"),
                _ => println!("No match (gallery is empty)"),
            }
        }
        Commands::Watch {
            input,
            interval_ms,
            display,
            fit,
            mirror,
            threshold,
            refresh_secs,
            json,
        } => {
            let mut config = LiveConfig {
                interval_ms,
                display_size: display,
                fit: fit.into(),
                mirrored: mirror,
                ..LiveConfig::default()
            };
            if let Some(threshold) = threshold {
                config.match_threshold = threshold;
            }
            let opts = watch::WatchOptions {
                input,
                config,
                refresh: refresh_secs.filter(|s| *s > 0).map(Duration::from_secs),
                json,
            };
            watch::run(&client, opts).await?;
        }
    }

    Ok(())
}

async fn people(client: &ApiClient, command: PeopleCommand) -> Result<()> {
    match command {
        PeopleCommand::List { search } => {
            let people = filter_people(client.list_people().await?, search.as_deref());
            if people.is_empty() {
                println!("No people registered");
            }
            for p in people {
                println!("{:<24} {:<40} {}", p.name, p.info, p.created_at);
            }
        }
        PeopleCommand::Add {
            name,
            info,
            descriptor,
            photo,
            force,
        } => {
            let descriptor = read_descriptor(&descriptor)?;
            if let Some(path) = photo {
                if let Some(warning) = photo::check_photo(&path)? {
                    eprintln!("warning: {}", warning.message());
                    if !force {
                        bail!("photo lighting is poor; retake it or pass --force");
                    }
                }
            }
            let person = client.add_person(&name, &info, &descriptor).await?;
            println!(
                "Registered {} ({})",
                person["name"].as_str().unwrap_or(&name),
                person["id"].as_str().unwrap_or_default()
            );
        }
        PeopleCommand::Remove { name, yes } => {
            if !yes && !confirm(&format!("Remove {name}?"))? {
                println!("Aborted");
                return Ok(());
            }
            client.remove_person(&name).await?;
            println!("Removed {name}");
        }
    }
    Ok(())
}

fn filter_people(people: Vec<Person>, search: Option<&str>) -> Vec<Person> {
    let Some(needle) = search.map(str::to_lowercase).filter(|s| !s.is_empty()) else {
        return people;
    };
    people
        .into_iter()
        .filter(|p| {
            p.name.to_lowercase().contains(&needle) || p.info.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Descriptor file: a bare JSON array or an object with a `descriptor` field.
fn read_descriptor(path: &Path) -> Result<Descriptor> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_descriptor(&raw).with_context(|| format!("invalid descriptor in {}", path.display()))
}

fn parse_descriptor(raw: &str) -> Result<Descriptor> {
    let value: Value = serde_json::from_str(raw)?;
    let array = match value {
        Value::Object(mut map) => map
            .remove("descriptor")
            .context("object has no \"descriptor\" field")?,
        other => other,
    };
    Ok(serde_json::from_value(array)?)
}

fn save_session(path: &Path, token: &str) -> Result<()> {
    session::save(path, token).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), "session saved");
    Ok(())
}

fn password_or_prompt(password: Option<String>) -> Result<String> {
    if let Some(p) = password {
        return Ok(p);
    }
    eprint!("Password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let line = line.trim_end_matches(['\r', '\n']).to_string();
    if line.is_empty() {
        bail!("password is required");
    }
    Ok(line)
}

fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N] ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}
