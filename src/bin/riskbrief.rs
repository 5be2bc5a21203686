use std::rc::Rc;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use riskbrief::{
    CachePeriod, Database, DisplayRisk, FeedData, FeedSnapshot, KeyValueStore, ReportKind,
    RiskBrief, SearchStatus,
};

#[derive(Parser)]
#[command(name = "riskbrief", about = "AI-sourced executive risk briefings")]
struct Cli {
    /// Database path (default: ~/.riskbrief/riskbrief.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a report, from cache when one exists for the current period
    Show {
        /// daily, weekly, monthly, yearly, fraud or cyber
        #[arg(value_parser = parse_kind)]
        kind: ReportKind,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Query the model for a report, ignoring the cache
    Refresh {
        #[arg(value_parser = parse_kind)]
        kind: ReportKind,
        #[arg(long)]
        json: bool,
    },
    /// Load every report
    Dashboard {
        #[arg(long)]
        json: bool,
    },
    /// Inspect or clear cached reports
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show which reports are cached for the current period
    Status,
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached entries
    List,
    /// Remove cached entries for one report, or all of them
    Clear {
        #[arg(value_parser = parse_kind)]
        kind: Option<ReportKind>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

fn parse_kind(s: &str) -> Result<ReportKind, String> {
    s.parse().map_err(|e: riskbrief::Error| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => Database::open_at(path).await?,
        None => Database::open().await?,
    };

    match cli.command {
        Commands::Status => {
            print_status(&db).await?;
        }
        Commands::Config { action } => {
            handle_config(&db, action).await?;
        }
        Commands::Cache { action } => {
            handle_cache(&db, action).await?;
        }
        Commands::Show { kind, json } => {
            let brief = open_brief(db).await?;
            render(&brief.show(kind).await, json)?;
        }
        Commands::Refresh { kind, json } => {
            let brief = open_brief(db).await?;
            render(&brief.refresh(kind).await, json)?;
        }
        Commands::Dashboard { json } => {
            let brief = open_brief(db).await?;
            let snapshots = brief.load_all().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshots)?);
            } else {
                for snap in &snapshots {
                    print_snapshot(snap);
                    println!();
                }
            }
        }
    }

    Ok(())
}

async fn open_brief(db: Database) -> anyhow::Result<RiskBrief> {
    let client = riskbrief::create_client(&db).await?;
    let store: Arc<dyn KeyValueStore> = Arc::new(db);
    Ok(RiskBrief::new(store, Rc::from(client)))
}

fn render(snap: &FeedSnapshot, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snap)?);
    } else {
        print_snapshot(snap);
    }
    Ok(())
}

fn print_snapshot(snap: &FeedSnapshot) {
    println!("{}", snap.kind.title());
    println!("{}", "=".repeat(snap.kind.title().len()));

    match snap.search_status {
        Some(SearchStatus::Found) => println!("New items found."),
        Some(SearchStatus::NotFound) => println!("No new items found."),
        _ => {}
    }
    if snap.loading {
        println!("Loading...");
    }
    if let Some(err) = &snap.error {
        println!("Error: {err}");
    }
    if snap.data.is_empty() {
        if snap.error.is_none() && !snap.loading {
            println!("No items.");
        }
        return;
    }

    match &snap.data {
        FeedData::Risks(risks) => {
            for (i, item) in risks.iter().enumerate() {
                print_card(i + 1, item);
            }
        }
        FeedData::Daily(brief) => {
            for (date, risks) in brief.iter_newest_first() {
                println!("\n[{date}]");
                for (i, risk) in risks.iter().enumerate() {
                    print_card(i + 1, &DisplayRisk::new(risk.clone()));
                }
            }
        }
    }
}

fn print_card(n: usize, item: &DisplayRisk) {
    let risk = &item.risk;
    let marker = if item.is_new { "  [NEW]" } else { "" };
    println!("\n{n}. {}{marker}", risk.title);
    println!("   {}", risk.summary);
    if let Some(date) = &risk.date {
        println!("   Date: {date}");
    }
    if let Some(link) = &risk.link {
        println!("   Link: {link}");
    }
    if !risk.sources.is_empty() {
        println!("   Sources:");
        for s in &risk.sources {
            println!("     - {} <{}>", s.title, s.uri);
        }
    }
}

async fn print_status(db: &Database) -> anyhow::Result<()> {
    let entries = db
        .reader()
        .call(|conn| riskbrief::storage::repository::list_cache_entries(conn))
        .await?;
    let today = riskbrief::date_util::today();

    println!("Cache Status ({today})");
    for kind in ReportKind::ALL {
        let current = riskbrief::feed::cache::cache_key(kind, &CachePeriod::current(kind, today));
        let line = match entries.iter().find(|e| e.key == current) {
            Some(e) => format!("cached, {} bytes, updated {}", e.bytes, e.updated_at),
            None => "not cached".to_string(),
        };
        println!("  {:<28} {line}", kind.title());
    }

    let stale = entries
        .iter()
        .filter_map(|e| riskbrief::feed::cache::parse_cache_key(&e.key))
        .filter(|info| info.is_stale(today))
        .count();
    if stale > 0 {
        println!("  {stale} stale entries (removed on next fetch)");
    }
    Ok(())
}

async fn handle_cache(db: &Database, action: CacheAction) -> anyhow::Result<()> {
    match action {
        CacheAction::List => {
            let entries = db
                .reader()
                .call(|conn| riskbrief::storage::repository::list_cache_entries(conn))
                .await?;
            let today = riskbrief::date_util::today();
            let mut shown = 0;
            for e in &entries {
                let Some(info) = riskbrief::feed::cache::parse_cache_key(&e.key) else {
                    continue;
                };
                let stale = if info.is_stale(today) { "  (stale)" } else { "" };
                println!(
                    "{:<28} {:<10} {:>8} bytes  {}{stale}",
                    info.key, info.period, e.bytes, e.updated_at
                );
                shown += 1;
            }
            if shown == 0 {
                println!("Cache is empty.");
            }
        }
        CacheAction::Clear { kind } => {
            let removed = riskbrief::feed::cache::clear(db, kind).await?;
            println!("Removed {removed} cache entries.");
        }
    }
    Ok(())
}

async fn handle_config(db: &Database, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let val: Option<String> = db
                .reader()
                .call({
                    let key = key.clone();
                    move |conn| riskbrief::storage::repository::get_config(conn, &key)
                })
                .await?;
            match val {
                Some(v) => println!("{key} = {v}"),
                None => println!("{key} is not set"),
            }
        }
        ConfigAction::Set { key, value } => {
            db.writer()
                .call(move |conn| riskbrief::storage::repository::set_config(conn, &key, &value))
                .await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items: Vec<(String, String)> = db
                .reader()
                .call(|conn| riskbrief::storage::repository::list_config(conn))
                .await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}
