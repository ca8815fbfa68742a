//! Command-line front end for the SCUM admin dashboard.
//!
//! ```sh
//! scum-admin login --email ops@example.com --password secret
//! scum-admin watch
//! scum-admin logout
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use scum_admin_client::config::API_BASE_ENV;
use scum_admin_client::sync::Resource;
use scum_admin_client::{AdminClient, AuthMode, ClientConfig, Credentials, Role, SyncEvent};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the administration API
    #[arg(long, env = API_BASE_ENV)]
    api_base: Option<String>,

    /// File holding the persisted session
    #[arg(long)]
    session_file: Option<PathBuf>,

    /// Seconds between poll cycles
    #[arg(long, default_value = "10")]
    interval: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with an existing account
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SCUM_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SCUM_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
        /// Account role (`user` or `admin`)
        #[arg(long, default_value = "user")]
        role: Role,
    },
    /// Forget the persisted session
    Logout,
    /// Fetch one snapshot and print the dashboard
    Show,
    /// Print the dashboard on every change until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.api_base {
        Some(base) => ClientConfig::new(base),
        None => ClientConfig::from_env(),
    }
    .with_poll_interval(Duration::from_secs(args.interval));
    if let Some(path) = &args.session_file {
        config = config.with_session_path(path);
    }
    info!(base_url = %config.base_url, "using API");

    let mut client = AdminClient::from_config(config)?;

    match args.command {
        Command::Login { email, password } => {
            client.set_mode(AuthMode::Login);
            authenticate(&mut client, Credentials::new(email, password)).await
        }
        Command::Register {
            email,
            password,
            role,
        } => {
            client.set_mode(AuthMode::Register);
            authenticate(&mut client, Credentials::new(email, password).with_role(role)).await
        }
        Command::Logout => {
            client.logout()?;
            println!("Logged out.");
            Ok(())
        }
        Command::Show => show(&mut client).await,
        Command::Watch => watch(&mut client).await,
    }
}

async fn authenticate(
    client: &mut AdminClient,
    credentials: Credentials,
) -> Result<(), Box<dyn std::error::Error>> {
    match client.submit(&credentials).await {
        Ok(session) => {
            println!("Signed in as {} · {}", session.user.email, session.user.role);
            Ok(())
        }
        Err(e) => {
            println!("{}", client.view());
            Err(e.into())
        }
    }
}

async fn show(client: &mut AdminClient) -> Result<(), Box<dyn std::error::Error>> {
    if !client.resume() {
        println!("{}", client.view());
        return Err("not signed in".into());
    }
    let Some(mut events) = client.take_sync_events() else {
        return Err("sync engine is not running".into());
    };

    // Wait until both resources of the first cycle have reported.
    let deadline = client.config().request_timeout + Duration::from_secs(1);
    let mut pending: HashSet<Resource> = [Resource::Status, Resource::Vehicles].into();
    let first_cycle = async {
        while let Some(event) = events.recv().await {
            match event {
                SyncEvent::StatusUpdated { .. } => pending.remove(&Resource::Status),
                SyncEvent::VehiclesUpdated { .. } => pending.remove(&Resource::Vehicles),
                SyncEvent::PollFailed { resource, reason } => {
                    warn!("{resource} unavailable: {reason}");
                    pending.remove(&resource)
                }
                SyncEvent::Stopped => break,
            };
            if pending.is_empty() {
                break;
            }
        }
    };
    if tokio::time::timeout(deadline, first_cycle).await.is_err() {
        warn!("timed out waiting for the first poll cycle");
    }

    println!("{}", client.view());
    Ok(())
}

async fn watch(client: &mut AdminClient) -> Result<(), Box<dyn std::error::Error>> {
    if !client.resume() {
        println!("{}", client.view());
        return Err("not signed in".into());
    }
    let Some(mut state) = client.subscribe_sync() else {
        return Err("sync engine is not running".into());
    };

    println!("{}", client.view());
    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() || !state.borrow_and_update().is_active() {
                    break;
                }
                println!("\n{}", client.view());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }
    Ok(())
}
