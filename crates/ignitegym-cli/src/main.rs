//! Ignite Gym CLI - a terminal front end for the Ignite Gym session core.
//!
//! Restores the stored session on start, then runs one command against it:
//! sign up, sign in, sign out, show the current user, or edit the profile.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ignitegym_core::api::PasswordChange;
use ignitegym_core::{ApiClient, Config, CredentialStore, SessionManager};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directory for log files; logs go to stderr when unset
const LOG_DIR_ENV: &str = "IGNITEGYM_LOG_DIR";

const USAGE: &str = "\
Usage: ignitegym <command>

Commands:
  signup            Create an account and sign in
  login [email]     Sign in
  logout            Sign out and forget the stored session
  whoami            Show the signed-in user
  rename <name>     Change your display name
  passwd            Change your password";

/// Initialize the tracing subscriber for logging.
///
/// Returns the appender guard when logging to a file; it must live until exit.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "ignitegym.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    let mut config = Config::load()?;
    let api = ApiClient::new(&config.api_url()).context("Failed to create API client")?;
    let store = CredentialStore::new(config.open_store()?);
    let session = SessionManager::mount(store, Arc::new(api.clone()));

    info!(api_url = api.base_url(), "Restoring session");
    session.restore_session().await;

    let result = match command.as_str() {
        "signup" => signup(&session, &mut config).await,
        "login" => login(&session, &mut config, args.get(1).cloned()).await,
        "logout" => logout(&session).await,
        "whoami" => whoami(&session, &api),
        "rename" => rename(&session, &args[1..]).await,
        "passwd" => passwd(&session).await,
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    };

    session.unmount();
    result
}

async fn signup(session: &SessionManager, config: &mut Config) -> Result<()> {
    let name = prompt("Name: ")?;
    let email = prompt("Email: ")?;
    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    let user = session.sign_up(&name, &email, &password).await?;
    remember_email(config, email);
    println!("Welcome, {}!", user.name);
    Ok(())
}

async fn login(session: &SessionManager, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => match config.last_email.clone() {
            Some(last) => {
                let input = prompt(&format!("Email [{}]: ", last))?;
                if input.is_empty() {
                    last
                } else {
                    input
                }
            }
            None => prompt("Email: ")?,
        },
    };
    let password = rpassword::prompt_password("Password: ")?;

    let user = session.sign_in(&email, &password).await?;
    remember_email(config, email);
    println!("Signed in as {}", user.name);
    Ok(())
}

async fn logout(session: &SessionManager) -> Result<()> {
    session.sign_out().await?;
    println!("Signed out");
    Ok(())
}

fn whoami(session: &SessionManager, api: &ApiClient) -> Result<()> {
    let user = session.user();
    if user.is_empty() {
        println!("Not signed in");
        return Ok(());
    }

    println!("{} <{}>", user.name, user.email);
    if let Some(ref avatar) = user.avatar {
        println!("Avatar: {}", api.avatar_url(avatar));
    }
    Ok(())
}

async fn rename(session: &SessionManager, words: &[String]) -> Result<()> {
    let name = words.join(" ");
    if name.trim().is_empty() {
        bail!("Usage: ignitegym rename <name>");
    }
    let user = session.update_profile(name.trim(), None).await?;
    println!("Name changed to {}", user.name);
    Ok(())
}

async fn passwd(session: &SessionManager) -> Result<()> {
    let name = session.user().name;
    let old_password = rpassword::prompt_password("Current password: ")?;
    let new_password = rpassword::prompt_password("New password: ")?;
    if new_password.len() < 6 {
        bail!("Password must be at least 6 characters");
    }

    session
        .update_profile(
            &name,
            Some(PasswordChange {
                old_password,
                new_password,
            }),
        )
        .await?;
    println!("Password changed");
    Ok(())
}

fn remember_email(config: &mut Config, email: String) {
    config.last_email = Some(email);
    if let Err(e) = config.save() {
        tracing::warn!(error = %e, "Failed to save config");
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
