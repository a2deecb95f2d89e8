//! calq - command line tool for the Calq analytics API
//!
//! This tool provides commands for:
//! - Checking client configuration
//! - Inspecting and building session cookie values
//! - Sending one-off Track, Profile and Transfer calls
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/calq/config.toml (~/.config/calq/config.toml)
//! - Logs: $XDG_STATE_HOME/calq/calq.log (~/.local/state/calq/calq.log)

use anyhow::{bail, Context, Result};
use calq_core::api::{ApiProcessor, Dispatcher};
use calq_core::session::{new_anonymous_actor, CookieState, UNKNOWN_IP};
use calq_core::{Config, Properties};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "calq")]
#[command(about = "Send actions to Calq and inspect session cookies")]
#[command(version)]
struct Args {
    /// Verbose output (writes a log file)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show client configuration
    Status,

    /// Decode a session cookie value and print its state
    DecodeCookie {
        /// Raw cookie value
        value: String,
    },

    /// Build a session cookie value
    EncodeCookie {
        /// Actor id (default: new anonymous id)
        #[arg(long)]
        actor: Option<String>,

        /// Mark the actor as identified
        #[arg(long)]
        identified: bool,

        /// Mark the actor as having tracked actions
        #[arg(long)]
        has_action: bool,

        /// Global property as key=value (repeatable)
        #[arg(short = 'g', long = "global", value_parser = parse_property)]
        globals: Vec<(String, Value)>,
    },

    /// Track an action
    Track {
        /// Action name
        action: String,

        /// Actor id (default: new anonymous id)
        #[arg(long)]
        actor: Option<String>,

        /// Property as key=value (repeatable)
        #[arg(short, long = "prop", value_parser = parse_property)]
        props: Vec<(String, Value)>,

        /// Source IP for geolocation
        #[arg(long)]
        ip: Option<String>,
    },

    /// Save profile properties for an identified actor
    Profile {
        /// Actor id
        actor: String,

        /// Property as key=value (repeatable)
        #[arg(short, long = "prop", value_parser = parse_property, required = true)]
        props: Vec<(String, Value)>,
    },

    /// Merge an anonymous actor's history into another actor
    Transfer {
        old_actor: String,
        new_actor: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = if args.verbose {
        Some(calq_core::logging::init(&config.logging).context("failed to initialize logging")?)
    } else {
        None
    };

    match args.command {
        Command::Status => cmd_status(&config),
        Command::DecodeCookie { value } => cmd_decode_cookie(&value),
        Command::EncodeCookie {
            actor,
            identified,
            has_action,
            globals,
        } => cmd_encode_cookie(actor, identified, has_action, globals),
        Command::Track {
            action,
            actor,
            props,
            ip,
        } => cmd_track(&config, &action, actor, props, ip),
        Command::Profile { actor, props } => cmd_profile(&config, &actor, props),
        Command::Transfer {
            old_actor,
            new_actor,
        } => cmd_transfer(&config, &old_actor, &new_actor),
    }
}

/// Parse `key=value`; the value is read as JSON when possible, else as a string
fn parse_property(s: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", s))?;
    if key.is_empty() {
        return Err("property name must not be empty".to_string());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::from(value));
    Ok((key.to_string(), value))
}

fn to_properties(pairs: Vec<(String, Value)>) -> Properties {
    pairs.into_iter().collect()
}

fn cmd_status(config: &Config) -> Result<()> {
    println!("Calq Client Configuration");
    println!("=========================");
    println!();
    println!("Config File:     {}", Config::config_path().display());
    println!(
        "Write Key:       {}",
        if config.write_key.is_some() {
            "<set>"
        } else {
            "<not set>"
        }
    );
    println!(
        "API Server:      {}://{}",
        config.api.scheme(),
        config.api.host
    );
    println!("Max Queue Size:  {}", config.api.max_queue_size);
    println!("Max Retries:     {}", config.api.max_retries);
    println!(
        "Timeouts:        {}s connect, {}s total",
        config.api.connect_timeout_secs, config.api.timeout_secs
    );
    println!("Cookie Name:     {}", config.cookie.name);
    println!(
        "Cookie Domain:   {}",
        config.cookie.domain.as_deref().unwrap_or("<host only>")
    );
    println!("Cookie Expiry:   {} days", config.cookie.expires_days);

    println!();
    match config.validate() {
        Ok(()) => println!("Status: Ready to send"),
        Err(e) => println!("Status: Not ready ({})", e),
    }

    Ok(())
}

fn cmd_decode_cookie(value: &str) -> Result<()> {
    let Some(state) = CookieState::decode(value) else {
        bail!("not a valid Calq session cookie");
    };

    println!("Actor:           {}", state.actor);
    println!("Anonymous:       {}", state.is_anon);
    println!("Has Action:      {}", state.has_action);
    println!(
        "Global Props:    {}",
        serde_json::to_string_pretty(&state.action_global)?
    );
    if !state.extra.is_empty() {
        println!(
            "Other Fields:    {}",
            serde_json::to_string_pretty(&state.extra)?
        );
    }
    Ok(())
}

fn cmd_encode_cookie(
    actor: Option<String>,
    identified: bool,
    has_action: bool,
    globals: Vec<(String, Value)>,
) -> Result<()> {
    let state = CookieState {
        actor: actor.unwrap_or_else(new_anonymous_actor),
        has_action,
        is_anon: !identified,
        action_global: to_properties(globals),
        extra: Properties::new(),
    };
    println!("{}", state.encode());
    Ok(())
}

/// Build an HTTP processor from a validated configuration
fn processor(config: &Config) -> Result<ApiProcessor<calq_core::api::ReqwestTransport>> {
    config.validate().context("invalid configuration")?;
    let write_key = config.write_key.as_deref().unwrap_or_default();
    ApiProcessor::new(write_key, &config.api).context("failed to create API client")
}

fn cmd_track(
    config: &Config,
    action: &str,
    actor: Option<String>,
    props: Vec<(String, Value)>,
    ip: Option<String>,
) -> Result<()> {
    let mut api = processor(config)?;
    let actor = actor.unwrap_or_else(new_anonymous_actor);

    let mut api_props = Properties::new();
    api_props.insert(
        calq_core::api::reserved::api::IP_ADDRESS.to_string(),
        Value::from(ip.as_deref().unwrap_or(UNKNOWN_IP)),
    );

    api.track(&actor, action, Some(api_props), Some(to_properties(props)))
        .context("invalid track call")?;
    api.flush().context("failed to deliver track call")?;
    tracing::info!(actor = %actor, action, "track delivered");

    println!("Tracked {:?} for actor {}", action, actor);
    Ok(())
}

fn cmd_profile(config: &Config, actor: &str, props: Vec<(String, Value)>) -> Result<()> {
    let mut api = processor(config)?;
    api.profile(actor, to_properties(props))
        .context("invalid profile call")?;
    api.flush().context("failed to deliver profile call")?;
    tracing::info!(actor, "profile delivered");

    println!("Saved profile for actor {}", actor);
    Ok(())
}

fn cmd_transfer(config: &Config, old_actor: &str, new_actor: &str) -> Result<()> {
    let mut api = processor(config)?;
    api.transfer(old_actor, new_actor)
        .context("invalid transfer call")?;
    api.flush().context("failed to deliver transfer call")?;
    tracing::info!(old_actor, new_actor, "transfer delivered");

    println!("Transferred {} to {}", old_actor, new_actor);
    Ok(())
}
