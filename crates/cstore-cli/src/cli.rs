use std::path::PathBuf;

use chrono::{DateTime, Local};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cstore",
    about = "cstore — time-partitioned content store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Where the content store lives.
#[derive(Args, Debug, Default)]
pub struct StoreArgs {
    /// TOML store configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Root directory of the primary store (overrides the config file)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
    /// Open the primary store read-only
    #[arg(long, global = true)]
    pub read_only: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print a freshly generated content URL
    NewUrl,
    /// Validate a content URL and show its parts
    Check(CheckArgs),
    /// Store a file and print its content URL
    Put(PutArgs),
    /// Write stored content to a file or stdout
    Get(GetArgs),
    /// Report whether content is stored under a URL
    Exists(ExistsArgs),
    /// List content URLs created in a time range
    List(ListArgs),
    /// Delete stored content
    Delete(DeleteArgs),
}

#[derive(Args)]
pub struct CheckArgs {
    pub url: String,
}

#[derive(Args)]
pub struct PutArgs {
    pub file: PathBuf,
    /// Store under this URL instead of a generated one
    #[arg(long)]
    pub url: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub url: String,
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct ExistsArgs {
    pub url: String,
}

#[derive(Args)]
pub struct ListArgs {
    /// Inclusive lower bound (RFC 3339)
    #[arg(long, value_parser = parse_time)]
    pub from: Option<DateTime<Local>>,
    /// Exclusive upper bound (RFC 3339)
    #[arg(long, value_parser = parse_time)]
    pub to: Option<DateTime<Local>>,
}

#[derive(Args)]
pub struct DeleteArgs {
    pub url: String,
}

fn parse_time(s: &str) -> Result<DateTime<Local>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Local))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_bounds() {
        let cli = Cli::try_parse_from([
            "cstore",
            "list",
            "--from",
            "2024-06-10T01:00:00Z",
            "--to",
            "2024-06-10T05:00:00+02:00",
        ])
        .unwrap();
        let Command::List(args) = cli.command else {
            panic!("expected list");
        };
        assert!(args.from.unwrap() < args.to.unwrap());
        assert_eq!((args.to.unwrap() - args.from.unwrap()).num_hours(), 2);
    }

    #[test]
    fn rejects_bad_timestamp() {
        assert!(Cli::try_parse_from(["cstore", "list", "--from", "yesterday"]).is_err());
    }

    #[test]
    fn global_store_flags() {
        let cli = Cli::try_parse_from([
            "cstore",
            "exists",
            "store://2024/1/1/0/0/x.bin",
            "--root",
            "/tmp/cs",
            "--read-only",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.store.root, Some(PathBuf::from("/tmp/cs")));
        assert!(cli.store.read_only);
        assert_eq!(cli.format, OutputFormat::Json);
    }
}
