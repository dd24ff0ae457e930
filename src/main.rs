use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use subwatch::detect::Detector;
use subwatch::git::GitRepo;
use subwatch::models::{ScanResult, Subscription};
use subwatch::store::history::ScanHistory;
use subwatch::store::projects::ProjectStore;
use subwatch::store::ConfigStore;
use subwatch::subscribe::{self, SubscribeOptions};
use subwatch::update_doc;
use subwatch::updater::Updater;

#[derive(Parser)]
#[command(name = "subwatch", version, about = "Subscribe to regions of code and find out when they really change")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize subwatch in the current repository
    Init {
        /// Baseline ref to anchor subscriptions at (defaults to HEAD)
        #[arg(long)]
        baseline: Option<String>,
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
    /// Add a subscription
    Add {
        /// 'path:N', 'path:N-M', 'path::QualName', or 'path::kind:QualName'
        location: String,
        /// Label for the subscription
        #[arg(short, long)]
        label: Option<String>,
        /// Description
        #[arg(short, long)]
        desc: Option<String>,
        /// Anchor context lines on each side
        #[arg(long, default_value = "2")]
        context: usize,
        /// Track every direct member of the target container
        #[arg(long)]
        include_members: bool,
        /// Include underscore-prefixed members (Python only)
        #[arg(long)]
        include_private: bool,
        /// Report container decorator changes on member scans
        #[arg(long)]
        track_decorators: bool,
        /// Trigger when the target turns up in multiple files
        #[arg(long)]
        trigger_on_duplicate: bool,
    },
    /// List subscriptions
    List {
        /// Include inactive subscriptions
        #[arg(short, long)]
        all: bool,
        /// Show anchors and descriptions
        #[arg(short, long)]
        verbose: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove (deactivate) a subscription
    Remove {
        /// Subscription id or unique prefix
        subscription_id: String,
        /// Delete instead of deactivating
        #[arg(long)]
        hard: bool,
    },
    /// Scan for changes against the baseline
    Scan {
        /// Base ref (defaults to the stored baseline)
        #[arg(long)]
        base: Option<String>,
        /// Target ref; 'WORKING' compares against the working tree
        #[arg(long, default_value = "HEAD")]
        target: String,
        /// Output the update document as JSON
        #[arg(long)]
        json: bool,
        /// Write the JSON update document to a file
        #[arg(long, value_name = "PATH")]
        write_updates: Option<PathBuf>,
        /// Write a markdown summary to a file
        #[arg(long, value_name = "PATH")]
        write_md: Option<PathBuf>,
        /// Exit with code 2 when any subscription triggered
        #[arg(long)]
        fail_on_trigger: bool,
        /// Record the scan in history (repo must be a registered project)
        #[arg(long)]
        save_history: bool,
    },
    /// Apply update proposals from an update document
    Apply {
        /// Path to the JSON update document
        update_doc: PathBuf,
        /// Validate without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Manage registered projects
    Projects {
        #[command(subcommand)]
        command: ProjectsCommand,
    },
    /// Browse persisted scan history
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

#[derive(Subcommand)]
enum ProjectsCommand {
    /// Register a git repository
    Add {
        /// Path to the repository
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Display name (defaults to the directory name)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// List registered projects
    List {
        #[arg(long)]
        json: bool,
    },
    /// Remove a project
    Remove {
        /// Project id or unique prefix
        id: String,
    },
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// List scans for a project, newest first
    List {
        /// Project id or unique prefix
        project: String,
        #[arg(long)]
        json: bool,
    },
    /// Show one scan's full update document
    Show {
        /// Project id or unique prefix
        project: String,
        /// Scan id or unique prefix
        scan_id: String,
    },
    /// Clear a project's scan history
    Clear {
        /// Project id or unique prefix
        project: String,
    },
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { baseline, force } => cmd_init(baseline.as_deref(), force),
        Commands::Add {
            location,
            label,
            desc,
            context,
            include_members,
            include_private,
            track_decorators,
            trigger_on_duplicate,
        } => cmd_add(
            &location,
            SubscribeOptions {
                label,
                description: desc,
                context,
                include_members,
                include_private,
                track_decorators,
                trigger_on_duplicate,
            },
        ),
        Commands::List { all, verbose, json } => cmd_list(all, verbose, json),
        Commands::Remove {
            subscription_id,
            hard,
        } => cmd_remove(&subscription_id, hard),
        Commands::Scan {
            base,
            target,
            json,
            write_updates,
            write_md,
            fail_on_trigger,
            save_history,
        } => cmd_scan(
            base.as_deref(),
            &target,
            json,
            write_updates.as_deref(),
            write_md.as_deref(),
            fail_on_trigger,
            save_history,
        ),
        Commands::Apply { update_doc, dry_run } => cmd_apply(&update_doc, dry_run),
        Commands::Projects { command } => match command {
            ProjectsCommand::Add { path, name } => cmd_projects_add(&path, name.as_deref()),
            ProjectsCommand::List { json } => cmd_projects_list(json),
            ProjectsCommand::Remove { id } => cmd_projects_remove(&id),
        },
        Commands::History { command } => match command {
            HistoryCommand::List { project, json } => cmd_history_list(&project, json),
            HistoryCommand::Show { project, scan_id } => cmd_history_show(&project, &scan_id),
            HistoryCommand::Clear { project } => cmd_history_clear(&project),
        },
    }
}

fn open_store() -> Result<(ConfigStore, GitRepo)> {
    let repo = GitRepo::discover(Path::new("."))?;
    let store = ConfigStore::new(repo.root());
    Ok((store, repo))
}

fn cmd_init(baseline: Option<&str>, force: bool) -> Result<i32> {
    let (store, repo) = open_store()?;

    let baseline = baseline.unwrap_or("HEAD");
    let baseline_hash = repo.resolve_ref(baseline)?;

    store.init(&baseline_hash, force)?;

    println!("Initialized subwatch at {}", store.config_dir().display());
    println!("Baseline: {} ({baseline})", &baseline_hash[..12]);
    Ok(0)
}

fn cmd_add(location: &str, opts: SubscribeOptions) -> Result<i32> {
    let (store, repo) = open_store()?;
    let baseline = store.get_baseline()?;

    let sub = subscribe::create_subscription(&repo, &baseline, location, &opts)?;
    store.add_subscription(sub.clone())?;

    println!("Added subscription: {}", &sub.id[..8]);
    println!("  Location: {}", format_location(&sub));
    if let Some(label) = &sub.label {
        println!("  Label: {label}");
    }
    if let Some(semantic) = &sub.semantic {
        println!("  Target: {} {} ({})", semantic.kind, semantic.qualname, semantic.language);
        if semantic.include_members {
            let count = semantic.baseline_members.as_ref().map_or(0, |m| m.len());
            println!("  Tracking {count} member(s)");
        }
    } else {
        println!("  Watching {} line(s)", sub.end_line - sub.start_line + 1);
    }
    Ok(0)
}

fn cmd_list(all: bool, verbose: bool, json: bool) -> Result<i32> {
    let (store, _) = open_store()?;
    let config = store.load()?;

    let subs: Vec<&Subscription> = config
        .subscriptions
        .iter()
        .filter(|s| all || s.active)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&subs)?);
        return Ok(0);
    }

    if subs.is_empty() {
        println!("No subscriptions found.");
        return Ok(0);
    }

    println!("Subscriptions ({}):", subs.len());
    println!("Baseline: {}", &config.repo.baseline_ref[..12.min(config.repo.baseline_ref.len())]);
    println!();
    for sub in subs {
        println!("{}", format_subscription(sub, verbose));
    }
    Ok(0)
}

fn cmd_remove(subscription_id: &str, hard: bool) -> Result<i32> {
    let (store, _) = open_store()?;
    let sub = store.remove_subscription(subscription_id, hard)?;

    let action = if hard { "Removed" } else { "Deactivated" };
    println!("{action} subscription: {}", &sub.id[..8]);
    if let Some(label) = &sub.label {
        println!("  Label: {label}");
    }
    Ok(0)
}

#[allow(clippy::too_many_arguments)]
fn cmd_scan(
    base: Option<&str>,
    target: &str,
    json: bool,
    write_updates: Option<&Path>,
    write_md: Option<&Path>,
    fail_on_trigger: bool,
    save_history: bool,
) -> Result<i32> {
    let (store, repo) = open_store()?;
    let config = store.load()?;

    let base_ref = match base {
        Some(b) => repo.resolve_ref(b)?,
        None => repo.resolve_ref(&config.repo.baseline_ref)?,
    };
    let target_ref = if target.eq_ignore_ascii_case("WORKING") {
        None
    } else {
        Some(repo.resolve_ref(target)?)
    };

    if target_ref.as_deref() == Some(base_ref.as_str()) {
        println!("Base and target refs are the same. No changes to scan.");
        return Ok(0);
    }

    let detector = Detector::new(&repo);
    let result = detector.scan(&config.subscriptions, &base_ref, target_ref.as_deref())?;

    if json {
        let doc = update_doc::from_scan(&result);
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        print_scan_result(&result);
    }

    if let Some(path) = write_updates {
        update_doc::write_update_doc(&result, path)?;
        println!("Wrote update document: {}", path.display());
    }
    if let Some(path) = write_md {
        update_doc::write_markdown_doc(&result, path)?;
        println!("Wrote markdown summary: {}", path.display());
    }

    if save_history {
        let projects = ProjectStore::new(None);
        match projects.find_by_path(repo.root())? {
            Some(project) => {
                let doc = serde_json::to_value(update_doc::from_scan(&result))?;
                let record = ScanHistory::new(None).record(&project.id, doc)?;
                println!("Saved scan {} to history", &record.id[..8]);
            }
            None => eprintln!(
                "warning: {} is not a registered project; run 'subwatch projects add'",
                repo.root().display()
            ),
        }
    }

    if fail_on_trigger && !result.triggers.is_empty() {
        return Ok(2);
    }
    Ok(0)
}

fn print_scan_result(result: &ScanResult) {
    println!(
        "Scan: {} -> {}",
        &result.base_ref[..12.min(result.base_ref.len())],
        &result.target_ref[..12.min(result.target_ref.len())]
    );
    println!();

    if !result.triggers.is_empty() {
        println!("TRIGGERED ({}):", result.triggers.len());
        for trigger in &result.triggers {
            let sub = &trigger.subscription;
            let label = sub.label.as_deref().map(|l| format!(" [{l}]")).unwrap_or_default();
            let reasons: Vec<&str> = trigger.reasons.iter().map(|r| r.as_str()).collect();
            println!("  {}{label}", &sub.id[..8]);
            println!(
                "    Location: {}:{}-{}",
                trigger.path, trigger.start_line, trigger.end_line
            );
            println!("    Reason: {}", reasons.join(", "));
            if let Some(change_type) = trigger.change_type {
                println!("    Change type: {change_type}");
            }
        }
        println!();
    }

    if !result.proposals.is_empty() {
        println!("PROPOSED UPDATES ({}):", result.proposals.len());
        for prop in &result.proposals {
            let sub = &prop.subscription;
            let label = sub.label.as_deref().map(|l| format!(" [{l}]")).unwrap_or_default();
            let reasons: Vec<&str> = prop.reasons.iter().map(|r| r.as_str()).collect();
            println!("  {}{label}", &sub.id[..8]);
            println!(
                "    {}:{}-{} -> {}:{}-{}",
                prop.old_path, prop.old_start, prop.old_end, prop.new_path, prop.new_start, prop.new_end
            );
            println!("    Reason: {}", reasons.join(", "));
            if let Some(shift) = prop.shift {
                println!("    Shift: {shift:+}");
            }
        }
        println!();
    }

    if !result.unchanged.is_empty() {
        println!("UNCHANGED ({}):", result.unchanged.len());
        for sub in &result.unchanged {
            let label = sub.label.as_deref().map(|l| format!(" [{l}]")).unwrap_or_default();
            println!("  {}{label}", &sub.id[..8]);
        }
        println!();
    }
}

fn cmd_apply(doc_path: &Path, dry_run: bool) -> Result<i32> {
    let (store, repo) = open_store()?;

    let doc = update_doc::read_update_doc(doc_path)
        .with_context(|| format!("loading update document {}", doc_path.display()))?;

    let updater = Updater::new(&store, &repo);
    let outcome = updater.apply(&doc, dry_run)?;

    for warning in &outcome.warnings {
        eprintln!("warning: {warning}");
    }

    if dry_run {
        println!("Dry run: {} proposal(s) would apply", outcome.applied.len());
    } else {
        println!("Applied {} proposal(s)", outcome.applied.len());
        if !outcome.applied.is_empty() {
            if doc.target_ref == "WORKING" {
                println!("Baseline unchanged (working-tree update)");
            } else {
                println!("Baseline advanced to {}", &doc.target_ref[..12.min(doc.target_ref.len())]);
            }
        }
    }
    for id in &outcome.applied {
        println!("  {}", &id[..8]);
    }
    Ok(0)
}

fn cmd_projects_add(path: &Path, name: Option<&str>) -> Result<i32> {
    let store = ProjectStore::new(None);
    let project = store.add_project(path, name)?;
    println!("Registered project: {} ({})", project.name, &project.id[..8]);
    println!("  Path: {}", project.path);
    Ok(0)
}

fn cmd_projects_list(json: bool) -> Result<i32> {
    let store = ProjectStore::new(None);
    let projects = store.list_projects()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&projects)?);
        return Ok(0);
    }

    if projects.is_empty() {
        println!("No registered projects.");
        return Ok(0);
    }
    for project in projects {
        println!("{}  {}  {}", &project.id[..8], project.name, project.path);
    }
    Ok(0)
}

fn cmd_projects_remove(id: &str) -> Result<i32> {
    let store = ProjectStore::new(None);
    let project = store.remove_project(id)?;
    println!("Removed project: {} ({})", project.name, &project.id[..8]);
    Ok(0)
}

fn cmd_history_list(project: &str, json: bool) -> Result<i32> {
    let project = ProjectStore::new(None).get_project(project)?;
    let records = ScanHistory::new(None).list(&project.id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(0);
    }

    if records.is_empty() {
        println!("No scans recorded for {}.", project.name);
        return Ok(0);
    }
    for record in records {
        println!(
            "{}  {}  {} -> {}  triggers={} proposals={}",
            &record.id[..8],
            record.created_at,
            &record.base_ref[..12.min(record.base_ref.len())],
            &record.target_ref[..12.min(record.target_ref.len())],
            record.trigger_count,
            record.proposal_count,
        );
    }
    Ok(0)
}

fn cmd_history_show(project: &str, scan_id: &str) -> Result<i32> {
    let project = ProjectStore::new(None).get_project(project)?;
    let record = ScanHistory::new(None).get(&project.id, scan_id)?;
    println!("{}", serde_json::to_string_pretty(&record.scan_result)?);
    Ok(0)
}

fn cmd_history_clear(project: &str) -> Result<i32> {
    let project = ProjectStore::new(None).get_project(project)?;
    let count = ScanHistory::new(None).clear(&project.id)?;
    println!("Cleared {count} scan(s) for {}", project.name);
    Ok(0)
}

fn format_location(sub: &Subscription) -> String {
    if sub.start_line == sub.end_line {
        format!("{}:{}", sub.path, sub.start_line)
    } else {
        format!("{}:{}-{}", sub.path, sub.start_line, sub.end_line)
    }
}

fn format_subscription(sub: &Subscription, verbose: bool) -> String {
    let status = if sub.active { "active" } else { "inactive" };
    let label = sub.label.as_deref().map(|l| format!(" [{l}]")).unwrap_or_default();
    let mut out = format!("{}  {}{label} ({status})", &sub.id[..8], format_location(sub));

    if let Some(semantic) = &sub.semantic {
        out.push_str(&format!(
            "\n         Target: {} {} ({})",
            semantic.kind, semantic.qualname, semantic.language
        ));
    }
    if verbose {
        if let Some(description) = &sub.description {
            out.push_str(&format!("\n         Description: {description}"));
        }
        if let Some(anchors) = &sub.anchors {
            out.push_str("\n         Lines:");
            for line in &anchors.lines {
                let display: String = if line.chars().count() > 60 {
                    format!("{}...", line.chars().take(60).collect::<String>())
                } else {
                    line.clone()
                };
                out.push_str(&format!("\n           | {display}"));
            }
        }
    }
    out
}
