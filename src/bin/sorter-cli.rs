use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use media_sorter_lib::mirror::{SortKey, TypeFilter};
use media_sorter_lib::{
    logging, AutoSortRule, BatchOutcome, BatchProgress, LogEntry, LogLevel, Location, RenamePattern, Runtime,
    SelectionScope, SessionHandle, SorterConfig, ViewQuery,
};

#[derive(Parser)]
#[command(name = "sorter-cli")]
#[command(about = "Sort downloaded media into categories on a media server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "sorter.yaml")]
    config: PathBuf,

    /// Overrides `server_url` from the config file
    #[arg(short, long)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show categories and the unsorted listing
    Status {
        #[arg(short, long)]
        filter: Option<String>,

        #[arg(short = 't', long, value_parser = clap::value_parser!(TypeFilter))]
        r#type: Option<TypeFilter>,

        #[arg(long)]
        sort: Option<SortKey>,
    },
    /// Move one file. Locations are `download`, `<category>` or `<category>/<subfolder>`
    Move {
        file: String,
        #[arg(long, default_value = "download")]
        from: Location,
        #[arg(long)]
        to: Location,
    },
    /// Move several files from one location
    BatchMove {
        #[arg(long, default_value = "download")]
        from: Location,
        #[arg(long)]
        to: Location,
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Rename one file; the original extension is kept
    Rename {
        #[arg(long = "in", default_value = "download")]
        location: Location,
        old: String,
        new: String,
    },
    /// Rename several files with a prefix, suffix or replacement
    BatchRename {
        #[arg(long = "in", default_value = "download")]
        location: Location,
        #[arg(long, group = "pattern")]
        prefix: Option<String>,
        #[arg(long, group = "pattern")]
        suffix: Option<String>,
        /// `from=to`
        #[arg(long, group = "pattern", value_parser = parse_pair)]
        replace: Option<(String, String)>,
        #[arg(required = true)]
        files: Vec<String>,
    },
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Apply auto-sort rules to everything currently unsorted
    AutoSort {
        /// `keyword=category`; replaces the saved rules when given
        #[arg(short, long, value_parser = parse_pair)]
        rule: Vec<(String, String)>,
    },
    /// Recreate the server's download folder when it has gone missing
    CreateDownloadFolder,
    /// Follow server notifications and print what happens
    Watch,
}

#[derive(Subcommand)]
enum CategoryCommand {
    Create { name: String },
    Delete { name: String },
    Rename { old: String, new: String },
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((left, right)) if !left.trim().is_empty() => Ok((left.trim().to_string(), right.trim().to_string())),
        _ => Err(format!("expected `left=right`, got '{s}'")),
    }
}

fn level_icon(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "ℹ️ ",
        LogLevel::Success => "✅",
        LogLevel::Warning => "⚠️ ",
        LogLevel::Error => "❌",
    }
}

fn print_entry(entry: &LogEntry) {
    match &entry.code {
        Some(code) => println!("{} {} [{}]", level_icon(entry.level), entry.message, code),
        None => println!("{} {}", level_icon(entry.level), entry.message),
    }
}

fn progress_bar(total: u64, message: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    Ok(pb)
}

fn print_outcome(outcome: &BatchOutcome) {
    println!("📊 Results:");
    println!("   Succeeded: {}", outcome.success_count);
    println!("   Failed: {}", outcome.fail_count);
    for (file, error) in &outcome.failures {
        eprintln!("   ⚠️  [{}] {}: {}", error.code(), file, error);
    }
}

/// Opens `location` and selects exactly `files` in it.
async fn select_files(session: &SessionHandle, location: &Location, files: &[String]) -> anyhow::Result<SelectionScope> {
    let scope = match location {
        Location::Unsorted => SelectionScope::Unsorted,
        Location::Category(name) => {
            session.open_category(name).await?;
            SelectionScope::Open
        }
        Location::Subfolder(category, name) => {
            session.open_subfolder(category, name).await?;
            SelectionScope::Open
        }
    };
    session.clear_selection(scope).await?;
    for file in files {
        session.toggle_selection(scope, file).await?;
    }
    Ok(scope)
}

async fn open_for_file(session: &SessionHandle, location: &Location) -> anyhow::Result<()> {
    match location {
        Location::Unsorted => {}
        Location::Category(name) => session.open_category(name).await?,
        Location::Subfolder(category, name) => session.open_subfolder(category, name).await?,
    }
    Ok(())
}

async fn run(cli: Cli, runtime: &Runtime) -> anyhow::Result<()> {
    let session = &runtime.session;

    match cli.command {
        Command::Status { filter, r#type, sort } => {
            let current = session.get_unsorted_view().await?.query;
            let query = ViewQuery {
                filter_text: filter.unwrap_or(current.filter_text),
                filter_type: r#type.unwrap_or(current.filter_type),
                sort_key: sort.unwrap_or(current.sort_key),
            };
            session.set_view_query(query).await?;

            let status = session.status().await?;
            println!("📂 Categories ({}):", status.categories.len());
            for category in &status.categories {
                println!("   {:<30} {:>6}", category.name, category.file_count);
            }
            println!();

            if status.unsorted_folder_missing {
                println!("⚠️  The download folder is missing; run `sorter-cli create-download-folder`");
                return Ok(());
            }
            let view = session.get_unsorted_view().await?;
            println!("📥 Unsorted ({} shown of {}):", view.files.len(), view.total);
            for file in &view.files {
                println!(
                    "   {:<40} {:>10} bytes  {}",
                    file.name,
                    file.size,
                    file.modified_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Command::Move { file, from, to } => {
            open_for_file(session, &from).await?;
            session.request_move(&file, from.clone(), to.clone()).await?;
            println!("✅ Moved {file}: {from} → {to}");
        }
        Command::BatchMove { from, to, files } => {
            let scope = select_files(session, &from, &files).await?;
            let pb = progress_bar(files.len() as u64, "Moving...")?;
            let bar = pb.clone();
            let outcome = session
                .request_batch_move(
                    scope,
                    to.clone(),
                    Some(Box::new(move |p: &BatchProgress| {
                        bar.set_position(p.index as u64 + 1);
                        bar.set_message(p.file_name.clone());
                    })),
                )
                .await?;
            pb.finish_with_message(format!("Moved to {to}"));
            println!();
            print_outcome(&outcome);
        }
        Command::Rename { location, old, new } => {
            open_for_file(session, &location).await?;
            let renamed = session.request_rename(location, &old, &new).await?;
            println!("✅ Renamed {old} → {renamed}");
        }
        Command::BatchRename {
            location,
            prefix,
            suffix,
            replace,
            files,
        } => {
            let pattern = match (prefix, suffix, replace) {
                (Some(text), _, _) => RenamePattern::Prefix { text },
                (_, Some(text), _) => RenamePattern::Suffix { text },
                (_, _, Some((from, to))) => RenamePattern::Replace { from, to },
                _ => anyhow::bail!("One of --prefix, --suffix or --replace is required"),
            };
            let scope = select_files(session, &location, &files).await?;
            let pb = progress_bar(files.len() as u64, "Renaming...")?;
            let bar = pb.clone();
            let outcome = session
                .request_batch_rename(
                    scope,
                    pattern,
                    Some(Box::new(move |p: &BatchProgress| {
                        bar.set_position(p.index as u64 + 1);
                        bar.set_message(p.file_name.clone());
                    })),
                )
                .await?;
            pb.finish_with_message("Rename complete");
            println!();
            print_outcome(&outcome);
        }
        Command::Category(CategoryCommand::Create { name }) => {
            session.create_category(&name).await?;
            println!("✅ Created category {}", name.trim());
        }
        Command::Category(CategoryCommand::Delete { name }) => {
            session.delete_category(&name).await?;
            println!("✅ Deleted category {name}; its files are back in the unsorted area");
        }
        Command::Category(CategoryCommand::Rename { old, new }) => {
            session.rename_category(&old, &new).await?;
            println!("✅ Renamed category {old} → {}", new.trim());
        }
        Command::AutoSort { rule } => {
            if !rule.is_empty() {
                let rules = rule
                    .into_iter()
                    .map(|(keyword, category)| AutoSortRule::new(keyword, category))
                    .collect();
                session.set_rules(rules).await?;
            }
            let rules = session.rules().await?;
            if rules.is_empty() {
                println!("ℹ️  No auto-sort rules configured");
                return Ok(());
            }
            println!("🔍 Applying {} rule(s)...", rules.len());
            let report = session.apply_auto_sort().await?;
            println!("📊 Results:");
            println!("   Moved: {}", report.moved);
            println!("   Skipped (deleted category): {}", report.skipped);
            println!("   Failed: {}", report.failed);
        }
        Command::CreateDownloadFolder => {
            let missing = session.check_folder_status().await?.is_some_and(|s| !s.download_folder);
            if !missing {
                println!("ℹ️  The download folder already exists");
                return Ok(());
            }
            session.create_unsorted_folder().await?;
            println!("✅ Created the download folder");
        }
        Command::Watch => {
            println!("👀 Watching for changes (Ctrl-C to stop)...");
            let mut feed = runtime.log.subscribe();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    entry = feed.recv() => match entry {
                        Ok(entry) => print_entry(&entry),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            eprintln!("⚠️  {skipped} notification(s) skipped");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            println!();
            println!("👋 Stopped watching");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing("warn,media_sorter_lib=info")?;
    let cli = Cli::parse();

    let mut config = SorterConfig::load(&cli.config).await?;
    if let Some(server) = &cli.server {
        config.server_url = server.clone();
    }

    let follow_events = matches!(cli.command, Command::Watch);
    let runtime = media_sorter_lib::start(&config, follow_events).await?;

    let result = run(cli, &runtime).await;
    runtime.shutdown().await;

    if let Err(e) = result {
        eprintln!("❌ Error: {e}");
        std::process::exit(1);
    }
    Ok(())
}
