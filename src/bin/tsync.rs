//! tsync — threatsync CLI client
//!
//! Terminal interface to the threat dashboard API.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use threatsync::api::models::{
    Acknowledgement, Incident, IncidentQuery, IncidentStatus, Registration, Severity, Source,
    SourceCreate, SourceType, TrendsQuery,
};
use threatsync::api::{mutations, queries};
use threatsync::{Config, SyncClient, ThreatSyncBuilder};

/// threatsync CLI client
#[derive(Parser)]
#[command(name = "tsync")]
#[command(version = threatsync::version::PKG_VERSION)]
#[command(about = "Threat dashboard API client")]
struct Args {
    /// Config file (default: ~/.threatsync/config.toml)
    #[arg(short, long, env = "THREATSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Print raw JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and persist the credential
    Login {
        username: String,
        /// Password (or omit to read from stdin)
        #[arg(long, env = "THREATSYNC_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Forget the persisted credential
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Create an account
    Register {
        username: String,
        email: String,
        /// Password (or omit to read from stdin)
        #[arg(long, env = "THREATSYNC_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// List incidents
    Incidents {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        per_page: u32,
        /// Filter by severity (repeatable)
        #[arg(long)]
        severity: Vec<Severity>,
        /// Filter by status (repeatable)
        #[arg(long)]
        status: Vec<IncidentStatus>,
        #[arg(long)]
        search: Option<String>,
    },

    /// Show one incident
    Incident { id: String },

    /// Full-text incident search
    Search {
        text: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        per_page: u32,
    },

    /// List sources
    Sources,

    /// Add a source
    AddSource {
        name: String,
        url: String,
        /// forum, paste_site, social_media, blog, github, security_feed, news
        #[arg(long, default_value = "security_feed")]
        source_type: SourceType,
        /// Seconds between scrapes
        #[arg(long, default_value_t = 3600)]
        interval: u32,
    },

    /// Delete a source
    DeleteSource { id: String },

    /// Trigger an immediate scrape of a source
    Scrape { id: String },

    /// Show dashboard statistics
    Dashboard,

    /// Show incident trends
    Trends {
        #[arg(long, default_value_t = 30)]
        days: u32,
        #[arg(long)]
        severity: Option<Severity>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    let client = ThreatSyncBuilder::from_config(&config).build()?;

    // Commands that don't need a session
    match &args.command {
        Command::Login { username, password } => {
            let password = resolve_secret(password.clone(), "login")?;
            let session = client.sign_in(username, &password).await?;
            if let Some(identity) = session.identity() {
                println!("signed in as {} <{}>", identity.username, identity.email);
            }
            return Ok(());
        }
        Command::Logout => {
            client.sign_out()?;
            println!("signed out");
            return Ok(());
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let password = resolve_secret(password.clone(), "register")?;
            let identity = client
                .register(&Registration {
                    username: username.clone(),
                    email: email.clone(),
                    password,
                })
                .await?;
            println!("registered {} ({})", identity.username, identity.id);
            return Ok(());
        }
        _ => {}
    }

    let session = client.restore().await?;
    if !session.is_authenticated() {
        return Err("not signed in (run `tsync login <username>`)".into());
    }

    run(&client, args.command, args.json).await
}

async fn run(
    client: &SyncClient,
    command: Command,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Whoami => {
            let identity = client.fetch(&queries::me()).await?;
            if json {
                return print_json(&identity);
            }
            println!("username: {}", identity.username);
            println!("email:    {}", identity.email);
            println!("admin:    {}", identity.is_admin);
        }

        Command::Incidents {
            page,
            per_page,
            severity,
            status,
            search,
        } => {
            let mut query = IncidentQuery::new().page(page).per_page(per_page);
            query.severity = severity;
            query.status = status;
            if let Some(search) = search {
                query = query.search(search);
            }
            let listing = client.fetch(&queries::incidents(&query)).await?;
            if json {
                return print_json(&listing);
            }
            println!(
                "page {}/{} ({} incidents)",
                listing.page, listing.pages, listing.total
            );
            for incident in &listing.items {
                print_incident_line(incident);
            }
        }

        Command::Incident { id } => {
            let incident = client.fetch(&queries::incident(&id)).await?;
            if json {
                return print_json(&incident);
            }
            print_incident_line(&incident);
            if let Some(description) = &incident.description {
                println!("\n{description}");
            }
            if !incident.tags.is_empty() {
                println!("\ntags: {}", incident.tags.join(", "));
            }
        }

        Command::Search {
            text,
            page,
            per_page,
        } => {
            if text.trim().chars().count() < 3 {
                return Err("search: query must be at least 3 characters".into());
            }
            let listing = client
                .fetch(&queries::search_incidents(&text, page, per_page))
                .await?;
            if json {
                return print_json(&listing);
            }
            println!("{} matches", listing.total);
            for incident in &listing.items {
                print_incident_line(incident);
            }
        }

        Command::Sources => {
            let sources = client.fetch(&queries::sources()).await?;
            if json {
                return print_json(&sources);
            }
            if sources.is_empty() {
                println!("no sources");
            }
            for source in &sources {
                print_source_line(source);
            }
        }

        Command::AddSource {
            name,
            url,
            source_type,
            interval,
        } => {
            let payload = SourceCreate::new(name, url, source_type).scraping_interval(interval);
            let source: Source = client
                .mutate_as(&mutations::create_source(&payload)?)
                .await?;
            if json {
                return print_json(&source);
            }
            print_source_line(&source);
        }

        Command::DeleteSource { id } => {
            let ack: Acknowledgement = client.mutate_as(&mutations::delete_source(&id)).await?;
            println!("{}", ack.message);
        }

        Command::Scrape { id } => {
            let ack: Acknowledgement = client.mutate_as(&mutations::trigger_scrape(&id)).await?;
            println!("{}", ack.message);
        }

        Command::Dashboard => {
            let data = client.fetch(&queries::dashboard()).await?;
            if json {
                return print_json(&data);
            }
            let stats = &data.stats;
            println!("total:         {}", stats.total_incidents);
            println!(
                "by severity:   critical={} high={} medium={} low={}",
                stats.critical_incidents,
                stats.high_incidents,
                stats.medium_incidents,
                stats.low_incidents
            );
            println!(
                "by status:     open={} investigating={} resolved={}",
                stats.open_incidents, stats.investigating_incidents, stats.resolved_incidents
            );
            if !data.sector_stats.is_empty() {
                println!("\nsectors:");
                for sector in &data.sector_stats {
                    println!(
                        "  {:<20} {:>5} ({} critical)",
                        sector.sector_name, sector.incident_count, sector.critical_count
                    );
                }
            }
            if !data.recent_incidents.is_empty() {
                println!("\nrecent:");
                for incident in &data.recent_incidents {
                    print_incident_line(incident);
                }
            }
        }

        Command::Trends { days, severity } => {
            let mut query = TrendsQuery::days(days);
            query.severity = severity;
            let trends = client.fetch(&queries::trends(&query)).await?;
            print_json(&trends)?;
        }

        Command::Login { .. } | Command::Logout | Command::Register { .. } => {
            unreachable!("handled before session restore")
        }
    }

    Ok(())
}

/// Resolve a secret from an optional argument or stdin.
fn resolve_secret(
    arg: Option<String>,
    command: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    if let Some(secret) = arg {
        return Ok(secret);
    }
    if io::stdin().is_terminal() {
        return Err(format!("{command}: no password provided (pass --password or pipe it)").into());
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    let trimmed = buf.trim_end_matches(['\r', '\n']).to_string();
    if trimmed.is_empty() {
        return Err(format!("{command}: empty password on stdin").into());
    }
    Ok(trimmed)
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_incident_line(incident: &Incident) {
    println!(
        "{:<36}  {:<8}  {:<14}  {}",
        incident.id,
        incident.severity.as_str(),
        incident.status.as_str(),
        incident.title
    );
}

fn print_source_line(source: &Source) {
    let state = if source.is_active { "active" } else { "paused" };
    println!(
        "{:<36}  {:<6}  every {:>5}s  {} ({})",
        source.id, state, source.scraping_interval, source.name, source.url
    );
}
