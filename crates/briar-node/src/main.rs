//! Briar node binary.
//!
//! # Usage
//!
//! ```bash
//! # Agree on a secret and epoch out of band
//! briar-node generate-secret
//!
//! # Alice (initiator) and Bob register each other
//! briar-node --db alice.redb add-contact --contact 1 --secret <hex> --epoch-ms <ms> --initiator
//! briar-node --db bob.redb add-contact --contact 7 --secret <hex> --epoch-ms <ms> --inactive
//!
//! # Bob replies once Alice's first stream arrives, or after
//! briar-node --db bob.redb activate-contact --contact 7
//!
//! # Bob listens, Alice sends
//! briar-node --db bob.redb listen --bind 0.0.0.0:4433
//! briar-node --db alice.redb send --to 127.0.0.1:4433 --contact 1 "hello"
//! ```

use std::{io::Write, path::PathBuf, time::Duration};

use briar_node::{Node, NodeConfig, SystemEnv, generate_secret, parse_secret};
use briar_transport::{ContactId, Environment};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Briar transport node
#[derive(Parser, Debug)]
#[command(name = "briar-node")]
#[command(about = "Encrypted, unlinkable streams between Briar contacts over TCP")]
#[command(version)]
struct Args {
    /// Path to the key database
    #[arg(long, default_value = "briar.redb")]
    db: PathBuf,

    /// Maximum transport latency in seconds (sets the rotation period)
    #[arg(long, default_value = "30")]
    max_latency_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a fresh master secret and the current time as an epoch
    GenerateSecret,

    /// Derive and store keys for a contact
    AddContact {
        /// Local identifier for the contact
        #[arg(long)]
        contact: u32,

        /// Shared master secret, 64 hex digits
        #[arg(long)]
        secret: String,

        /// Time the secret was agreed, in ms since the Unix epoch
        #[arg(long)]
        epoch_ms: u64,

        /// Set on exactly one of the two contacts
        #[arg(long)]
        initiator: bool,

        /// Send nothing until the contact's first stream arrives
        #[arg(long)]
        inactive: bool,
    },

    /// Allow sending to a contact added with --inactive
    ActivateContact {
        /// Local identifier for the contact
        #[arg(long)]
        contact: u32,
    },

    /// Delete a contact's keys
    RemoveContact {
        /// Local identifier for the contact
        #[arg(long)]
        contact: u32,
    },

    /// Accept incoming streams
    Listen {
        /// Address to bind to
        #[arg(short, long, default_value = "0.0.0.0:4433")]
        bind: String,
    },

    /// Send one message to a contact
    Send {
        /// Address of the contact's listener
        #[arg(long)]
        to: String,

        /// Local identifier for the contact
        #[arg(long)]
        contact: u32,

        /// Message to send
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    if let Command::GenerateSecret = args.command {
        let env = SystemEnv::new();
        writeln!(std::io::stdout(), "{} {}", generate_secret(&env), env.wall_clock_ms())?;
        return Ok(());
    }

    let config = NodeConfig {
        max_latency: Duration::from_secs(args.max_latency_secs),
        ..NodeConfig::new(args.db)
    };
    let node = Node::open(&config)?;

    match args.command {
        Command::GenerateSecret => {},
        Command::AddContact { contact, secret, epoch_ms, initiator, inactive } => {
            let master = parse_secret(&secret)?;
            node.add_contact(ContactId(contact), &master, epoch_ms, initiator, !inactive)?;
            tracing::info!("Added {}", ContactId(contact));
        },
        Command::ActivateContact { contact } => {
            if node.activate_contact(ContactId(contact))? {
                tracing::info!("Activated {}", ContactId(contact));
            } else {
                tracing::info!("{} has no inactive keys", ContactId(contact));
            }
        },
        Command::RemoveContact { contact } => {
            node.remove_contact(ContactId(contact))?;
            tracing::info!("Removed {}", ContactId(contact));
        },
        Command::Listen { bind } => {
            node.bind(&bind).await?.run().await?;
        },
        Command::Send { to, contact, message } => {
            node.send(&to, ContactId(contact), message.as_bytes()).await?;
        },
    }

    Ok(())
}
