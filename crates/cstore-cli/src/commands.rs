use std::fs::File;
use std::io::{self, BufReader, Write};
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use cstore_store::{ContentContext, ContentStore, StoreConfig};
use cstore_types::{ContentUrl, UrlTimeRange};
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::NewUrl => cmd_new_url(format),
        Command::Check(args) => cmd_check(args, format),
        Command::Put(args) => cmd_put(open_store(&cli.store)?.as_ref(), args, format),
        Command::Get(args) => cmd_get(open_store(&cli.store)?.as_ref(), args),
        Command::Exists(args) => cmd_exists(open_store(&cli.store)?.as_ref(), args, format),
        Command::List(args) => cmd_list(open_store(&cli.store)?.as_ref(), args, format),
        Command::Delete(args) => cmd_delete(open_store(&cli.store)?.as_ref(), args, format),
    }
}

/// Build the store from the config file, then apply command-line overrides.
pub fn store_config(args: &StoreArgs) -> anyhow::Result<StoreConfig> {
    let mut config = match &args.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    if let Some(root) = &args.root {
        config.store.root = root.clone();
    }
    if args.read_only {
        config.store.read_only = true;
    }
    Ok(config)
}

fn open_store(args: &StoreArgs) -> anyhow::Result<Arc<dyn ContentStore>> {
    let config = store_config(args)?;
    tracing::debug!(root = %config.store.root.display(), "opening content store");
    Ok(config.open()?)
}

fn parse_url(url: &str) -> anyhow::Result<ContentUrl> {
    ContentUrl::parse(url).with_context(|| format!("not a content URL: {url}"))
}

fn cmd_new_url(format: OutputFormat) -> anyhow::Result<()> {
    let url = ContentUrl::generate();
    match format {
        OutputFormat::Text => println!("{url}"),
        OutputFormat::Json => println!("{}", json!({ "url": url })),
    }
    Ok(())
}

fn cmd_check(args: CheckArgs, format: OutputFormat) -> anyhow::Result<()> {
    let url = parse_url(&args.url)?;
    let embedded = url.embedded_time();
    match format {
        OutputFormat::Text => {
            println!("{} {}", "✓".green().bold(), url);
            println!("  Protocol: {}", url.protocol().cyan());
            println!("  Path: {}", url.relative_part());
            match embedded {
                Some(time) => println!("  Created: {}", time.to_rfc3339().yellow()),
                None => println!("  Created: {}", "(no date partition)".dimmed()),
            }
        }
        OutputFormat::Json => println!(
            "{}",
            json!({
                "url": url,
                "protocol": url.protocol(),
                "path": url.relative_part(),
                "created": embedded.map(|t| t.to_rfc3339()),
            })
        ),
    }
    Ok(())
}

fn cmd_put(store: &dyn ContentStore, args: PutArgs, format: OutputFormat) -> anyhow::Result<()> {
    let url = args.url.as_deref().map(parse_url).transpose()?;
    let mut input = BufReader::new(
        File::open(&args.file).with_context(|| format!("cannot open {}", args.file.display()))?,
    );
    let mut writer = store.writer(ContentContext::new(None, url))?;
    io::copy(&mut input, &mut writer)?;
    let url = writer.url().clone();
    let len = writer.close()?;
    match format {
        OutputFormat::Text => println!("{} Stored {} bytes at {}", "✓".green().bold(), len, url.to_string().yellow()),
        OutputFormat::Json => println!("{}", json!({ "url": url, "size": len })),
    }
    Ok(())
}

fn cmd_get(store: &dyn ContentStore, args: GetArgs) -> anyhow::Result<()> {
    let url = parse_url(&args.url)?;
    let mut input = store.reader(&url)?.open()?;
    match &args.out {
        Some(path) => {
            let mut out = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
            io::copy(&mut input, &mut out)?;
            out.flush()?;
        }
        None => {
            let mut out = io::stdout().lock();
            io::copy(&mut input, &mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}

fn cmd_exists(store: &dyn ContentStore, args: ExistsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let url = parse_url(&args.url)?;
    let exists = store.exists(&url)?;
    match format {
        OutputFormat::Text => println!("{exists}"),
        OutputFormat::Json => println!("{}", json!({ "url": url, "exists": exists })),
    }
    Ok(())
}

fn cmd_list(store: &dyn ContentStore, args: ListArgs, format: OutputFormat) -> anyhow::Result<()> {
    let range = UrlTimeRange::new(args.from, args.to);
    let urls = store.urls(range.from, range.to)?;
    match format {
        OutputFormat::Text => {
            for url in &urls {
                println!("{url}");
            }
            eprintln!("{} URLs in {}", urls.len().to_string().bold(), range);
        }
        OutputFormat::Json => println!("{}", json!({ "urls": urls })),
    }
    Ok(())
}

fn cmd_delete(store: &dyn ContentStore, args: DeleteArgs, format: OutputFormat) -> anyhow::Result<()> {
    let url = parse_url(&args.url)?;
    let deleted = store.delete(&url)?;
    match format {
        OutputFormat::Text if deleted => println!("{} Deleted {}", "✓".green(), url),
        OutputFormat::Text => println!("Nothing stored at {}", url.to_string().dimmed()),
        OutputFormat::Json => println!("{}", json!({ "url": url, "deleted": deleted })),
    }
    Ok(())
}
