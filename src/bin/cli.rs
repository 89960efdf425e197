//! rwsplit CLI Client
//!
//! Command-line interface for talking to the proxy (or a backend directly).

use bytes::Bytes;
use clap::{Parser, Subcommand};
use rwsplit::protocol::Reply;
use rwsplit::{Client, Expiry};

/// rwsplit CLI
#[derive(Parser, Debug)]
#[command(name = "rwsplit-cli")]
#[command(about = "CLI for a RESP key-value store behind rwsplit")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8889")]
    server: String,

    /// Password sent with AUTH after connecting
    #[arg(short, long)]
    password: Option<String>,

    /// Database index sent with SELECT after connecting
    #[arg(short = 'n', long, default_value = "0")]
    db: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,

        /// Expire after this many seconds
        #[arg(long, conflicts_with = "px")]
        ex: Option<u64>,

        /// Expire after this many milliseconds
        #[arg(long)]
        px: Option<u64>,
    },

    /// Get a hash field
    Hget { key: String, field: String },

    /// Set a hash field
    Hset {
        key: String,
        field: String,
        value: String,
    },

    /// Get all fields of a hash
    Hgetall { key: String },

    /// Send any command verbatim
    Raw {
        #[arg(required = true, num_args = 1..)]
        args: Vec<String>,
    },
}

fn main() {
    let args = Args::parse();

    let client = match Client::connect(&args.server, args.password.as_deref(), args.db) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Could not connect to {}: {}", args.server, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = execute(&client, args.command) {
        eprintln!("(error) {}", e);
        std::process::exit(1);
    }

    client.close();
}

fn execute(client: &Client, command: Commands) -> rwsplit::Result<()> {
    match command {
        Commands::Get { key } => println!("{}", format_optional(client.get(key)?)),
        Commands::Set { key, value, ex, px } => {
            let expiry = match (ex, px) {
                (Some(s), _) => Expiry::Seconds(s),
                (None, Some(ms)) => Expiry::Millis(ms),
                (None, None) => Expiry::None,
            };
            client.set(key, value, expiry)?;
            println!("OK");
        }
        Commands::Hget { key, field } => println!("{}", format_optional(client.hget(key, field)?)),
        Commands::Hset { key, field, value } => {
            println!("(integer) {}", client.hset(key, field, value)?)
        }
        Commands::Hgetall { key } => {
            let pairs = client.hgetall(key)?;
            if pairs.is_empty() {
                println!("(empty array)");
            }
            for (i, (field, value)) in pairs.iter().enumerate() {
                println!("{}) {}", i * 2 + 1, quote(field));
                println!("{}) {}", i * 2 + 2, quote(value));
            }
        }
        Commands::Raw { args } => println!("{}", format_reply(&client.run(&args)?, 0)),
    }
    Ok(())
}

fn format_optional(value: Option<Bytes>) -> String {
    match value {
        Some(v) => quote(&v),
        None => "(nil)".to_string(),
    }
}

fn quote(bytes: &[u8]) -> String {
    format!("{:?}", String::from_utf8_lossy(bytes))
}

/// Render a reply the way redis-cli does
fn format_reply(reply: &Reply, indent: usize) -> String {
    match reply {
        Reply::Integer(n) => format!("(integer) {}", n),
        Reply::SimpleString(s) => String::from_utf8_lossy(s).into_owned(),
        Reply::Error(e) => format!("(error) {}", String::from_utf8_lossy(e)),
        Reply::BulkString(v) => format_optional(v.clone()),
        Reply::Array(items) if items.is_empty() => "(empty array)".to_string(),
        Reply::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let pad = if i == 0 { String::new() } else { " ".repeat(indent) };
                let prefix = format!("{}) ", i + 1);
                let nested = format_reply(item, indent + prefix.len());
                format!("{}{}{}", pad, prefix, nested)
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
