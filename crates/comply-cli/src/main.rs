//! `comply` CLI — local CMMC/NIST 800-171 assessment tracker.
//!
//! All state lives as JSON documents in a local data directory. There is
//! no server and no account: one assessor, one machine. Running two
//! copies against the same directory is last-write-wins with no conflict
//! detection.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::io::{BufRead, Write as _};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;

use comply_core::client::{AssessmentLevel, ClientPortfolio, NewClient};
use comply_core::evidence::{EvidenceKind, NewEvidence, ObjectiveStatus, TrackerStore};
use comply_core::export::{self, ImportPlan, STORE_PREFIX};
use comply_core::form::{DeleteConfirmation, FormSession, SubmitOutcome};
use comply_core::notify::{Notice, NoticeKind, Notifier};
use comply_core::persist::PersistenceAdapter;
use comply_core::settings::{CloudProvider, SettingsStore, Theme};
use comply_core::view::{self, Accent};
use comply_storage::{FileBackend, StorageBackend};

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const GRAY: &str = "\x1b[90m";

fn accent_code(accent: Accent) -> &'static str {
    match accent {
        Accent::Blue => BLUE,
        Accent::Green => GREEN,
        Accent::Yellow => YELLOW,
        Accent::Red => RED,
        Accent::Magenta => MAGENTA,
        Accent::Cyan => CYAN,
        Accent::Gray => GRAY,
    }
}

// ── CLI structure ────────────────────────────────────────────────────

/// comply — CMMC/NIST 800-171 assessment tracking, kept local.
#[derive(Parser)]
#[command(
    name = "comply",
    version,
    about = "comply CLI — track assessment objectives, evidence, and clients",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         COMPLY_DATA_DIR   Data directory (default: ./comply-data)\n  \
         COMPLY_LOG        Log filter (default: warn)\n\n\
         {DIM}Examples:{RESET}\n  \
         comply objective set-status AC.L2-3.1.1 in_progress\n  \
         comply evidence add AC.L2-3.1.1 --title 'Access Policy' --kind policy\n  \
         comply client add --name 'Globex Manufacturing' --level 2 --sprs 88\n  \
         comply export --output assessment.json"
    ),
)]
struct Cli {
    /// Data directory holding the local stores.
    #[arg(long, env = "COMPLY_DATA_DIR", default_value = "./comply-data")]
    data_dir: PathBuf,

    /// Disable colored output.
    #[arg(long, default_value = "false")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show an overview of all local stores.
    Status,
    /// Per-objective status and notes.
    Objective {
        #[command(subcommand)]
        action: ObjectiveCommands,
    },
    /// Evidence attached to assessment objectives.
    Evidence {
        #[command(subcommand)]
        action: EvidenceCommands,
    },
    /// Client portfolio operations.
    Client {
        #[command(subcommand)]
        action: ClientCommands,
    },
    /// Assessor, provider, and theme settings.
    Settings {
        #[command(subcommand)]
        action: SettingsCommands,
    },
    /// Export all local state as pretty-printed JSON.
    Export {
        /// Write to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Import a previously exported JSON file.
    Import {
        /// Path to the export file.
        file: PathBuf,
        /// Skip the confirmation prompt.
        #[arg(long, default_value = "false")]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ObjectiveCommands {
    /// Show one objective's status, notes, and evidence.
    Show {
        /// Objective ID, e.g. AC.L2-3.1.1.
        id: String,
    },
    /// Set an objective's implementation status.
    SetStatus {
        /// Objective ID, e.g. AC.L2-3.1.1.
        id: String,
        /// not_started, in_progress, implemented, or not_applicable.
        status: String,
    },
    /// Replace an objective's notes.
    Note {
        /// Objective ID, e.g. AC.L2-3.1.1.
        id: String,
        /// The note text.
        text: String,
    },
}

#[derive(Subcommand)]
enum EvidenceCommands {
    /// Attach a new evidence item to an objective.
    Add {
        /// Objective ID, e.g. AC.L2-3.1.1.
        objective: String,
        /// Evidence title (required).
        #[arg(long)]
        title: String,
        /// document, screenshot, log, configuration, policy, certificate,
        /// report, or other.
        #[arg(long, default_value = "other")]
        kind: String,
        /// Free-form description.
        #[arg(long, default_value = "")]
        description: String,
        /// Pointer to the artifact (path, URL, ticket).
        #[arg(long, default_value = "")]
        file_ref: String,
    },
    /// List an objective's evidence.
    List {
        /// Objective ID, e.g. AC.L2-3.1.1.
        objective: String,
    },
    /// Remove one evidence item.
    Remove {
        /// Objective ID, e.g. AC.L2-3.1.1.
        objective: String,
        /// The evidence item's ID (see `evidence list`).
        evidence_id: String,
        /// Skip the confirmation prompt.
        #[arg(long, default_value = "false")]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ClientCommands {
    /// Add a client to the portfolio.
    Add {
        /// Client organization name (required).
        #[arg(long)]
        name: String,
        /// CMMC assessment level (1-3).
        #[arg(long, default_value = "1")]
        level: u8,
        #[arg(long, default_value = "")]
        industry: String,
        /// SPRS score (-203..=110).
        #[arg(long)]
        sprs: Option<i64>,
        #[arg(long, default_value = "")]
        contact: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// List the portfolio.
    List,
    /// Update one field on a client record.
    Update {
        /// The client's ID (see `client list`).
        id: String,
        /// Field name, e.g. sprs_score, completion_percent, industry.
        #[arg(long)]
        field: String,
        /// New value; parsed as JSON where possible, else taken as a string.
        #[arg(long)]
        value: String,
    },
    /// Edit several fields at once; all of them commit or none do.
    Edit {
        /// The client's ID (see `client list`).
        id: String,
        /// FIELD=VALUE pair; repeatable. Values parse as JSON where
        /// possible, else as strings.
        #[arg(long = "set", value_name = "FIELD=VALUE", required = true)]
        set: Vec<String>,
    },
    /// Remove a client.
    Remove {
        /// The client's ID (see `client list`).
        id: String,
        /// Skip the confirmation prompt.
        #[arg(long, default_value = "false")]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show the current settings.
    Get,
    /// Change one or more settings.
    Set {
        /// Assessor name stamped into updated_by on mutations.
        #[arg(long)]
        assessor: Option<String>,
        /// aws, azure, gcp, or other.
        #[arg(long)]
        provider: Option<String>,
        /// light or dark.
        #[arg(long)]
        theme: Option<String>,
    },
}

// ── Application wiring ───────────────────────────────────────────────

/// All stores over one data directory, plus the notification center.
struct App {
    adapter: PersistenceAdapter,
    settings: SettingsStore,
    tracker: TrackerStore,
    portfolio: ClientPortfolio,
    notifier: Notifier,
    no_color: bool,
}

impl App {
    async fn open(data_dir: &Path, no_color: bool) -> Result<Self> {
        let backend = FileBackend::open(data_dir)
            .with_context(|| format!("cannot open data directory '{}'", data_dir.display()))?;
        let adapter = PersistenceAdapter::new(Arc::new(backend) as Arc<dyn StorageBackend>);

        let settings = SettingsStore::open(adapter.clone()).await?;
        let actor = settings.actor_handle();
        let tracker = TrackerStore::new(adapter.clone(), Arc::clone(&actor));
        let portfolio = ClientPortfolio::new(adapter.clone(), actor);

        Ok(Self {
            adapter,
            settings,
            tracker,
            portfolio,
            notifier: Notifier::new(),
            no_color,
        })
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.no_color {
            text.to_owned()
        } else {
            format!("{code}{text}{RESET}")
        }
    }

    fn badge(&self, badge: view::Badge) -> String {
        self.paint(accent_code(badge.accent), badge.label)
    }

    /// Print accumulated notices. The process is about to exit, so
    /// everything gets swept afterward.
    fn flush_notices(&self) {
        for notice in self.notifier.active() {
            println!("{}", self.render_notice(&notice));
        }
        self.notifier.sweep(chrono::Utc::now() + chrono::Duration::hours(1));
    }

    fn render_notice(&self, notice: &Notice) -> String {
        let (mark, code) = match notice.kind {
            NoticeKind::Success => ("✓", GREEN),
            NoticeKind::Error => ("✗", RED),
            NoticeKind::Info => ("·", CYAN),
        };
        format!("{} {}", self.paint(code, mark), notice.message)
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_env("COMPLY_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{RED}✗ {e:#}{RESET}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let no_color = cli.no_color || std::env::var_os("NO_COLOR").is_some();
    let app = App::open(&cli.data_dir, no_color).await?;

    let result = match cli.command {
        Commands::Status => cmd_status(&app).await,
        Commands::Objective { action } => cmd_objective(&app, action).await,
        Commands::Evidence { action } => cmd_evidence(&app, action).await,
        Commands::Client { action } => cmd_client(&app, action).await,
        Commands::Settings { action } => cmd_settings(&app, action).await,
        Commands::Export { output } => cmd_export(&app, output).await,
        Commands::Import { file, yes } => cmd_import(&app, &file, yes).await,
    };

    app.flush_notices();
    result
}

// ── Commands ─────────────────────────────────────────────────────────

async fn cmd_status(app: &App) -> Result<()> {
    let settings = app.settings.settings().await?;
    let records = app.tracker.store().list().await?;
    let summary = view::tracker_summary(&records);
    let clients = app.portfolio.clients().await?;

    println!("{}", app.paint(BOLD, "comply status"));
    println!(
        "  assessor:   {}",
        if settings.assessor.is_empty() {
            app.paint(DIM, "(not set)")
        } else {
            settings.assessor.clone()
        }
    );
    println!("  provider:   {}", settings.provider.as_str());
    println!("  theme:      {}", settings.theme.as_str());
    println!();
    println!(
        "  objectives: {} tracked ({} implemented, {} in progress, {} not started, {} n/a)",
        summary.objectives,
        summary.implemented,
        summary.in_progress,
        summary.not_started,
        summary.not_applicable,
    );
    println!("  evidence:   {} items", summary.evidence_items);
    println!("  clients:    {}", clients.len());
    Ok(())
}

async fn cmd_objective(app: &App, action: ObjectiveCommands) -> Result<()> {
    match action {
        ObjectiveCommands::Show { id } => {
            let record = app.tracker.objective(&id).await?;
            print_objective(app, &record);
        }
        ObjectiveCommands::SetStatus { id, status } => {
            let Some(parsed) = ObjectiveStatus::parse(&status) else {
                bail!(
                    "unknown status '{status}' (expected not_started, in_progress, \
                     implemented, or not_applicable)"
                );
            };
            app.tracker.set_status(&id, parsed).await?;
            app.notifier.success(format!("{id} marked {status}"));
        }
        ObjectiveCommands::Note { id, text } => {
            app.tracker.set_notes(&id, &text).await?;
            app.notifier.success(format!("note saved for {id}"));
        }
    }
    Ok(())
}

fn print_objective(app: &App, record: &comply_core::store::Record) {
    let panel = view::evidence_list(record);
    println!(
        "{} [{}] {}",
        app.paint(BOLD, &panel.objective_id),
        app.badge(panel.status_badge),
        app.paint(DIM, &panel.count_label),
    );
    if !panel.notes.is_empty() {
        println!("  notes: {}", panel.notes);
    }
    match panel.empty_state {
        Some(message) => println!("  {}", app.paint(DIM, message)),
        None => {
            for row in &panel.rows {
                let mut line = format!("  [{}] {} {}", app.badge(row.badge), row.title, app.paint(DIM, &row.id));
                if !row.description.is_empty() {
                    line.push_str(&format!(" — {}", row.description));
                }
                println!("{line}");
            }
        }
    }
}

async fn cmd_evidence(app: &App, action: EvidenceCommands) -> Result<()> {
    match action {
        EvidenceCommands::Add {
            objective,
            title,
            kind,
            description,
            file_ref,
        } => {
            let kind = parse_evidence_kind(&kind)?;
            let id = app
                .tracker
                .add_evidence(
                    &objective,
                    NewEvidence {
                        title,
                        kind,
                        description,
                        file_reference: file_ref,
                    },
                )
                .await?;
            app.notifier
                .success(format!("evidence {id} added to {objective}"));

            // Re-render the affected panel so the count stays in view.
            let record = app.tracker.objective(&objective).await?;
            print_objective(app, &record);
        }
        EvidenceCommands::List { objective } => {
            let record = app.tracker.objective(&objective).await?;
            print_objective(app, &record);
        }
        EvidenceCommands::Remove {
            objective,
            evidence_id,
            yes,
        } => {
            let mut confirmation = DeleteConfirmation::request(objective.clone());
            if !confirm(app, &format!("Remove evidence {evidence_id} from {objective}?"), yes)? {
                confirmation.cancel();
                app.notifier.info("removal cancelled");
                return Ok(());
            }
            confirmation
                .confirm_item(app.tracker.store(), "evidence", &evidence_id)
                .await?;
            app.notifier
                .success(format!("evidence {evidence_id} removed from {objective}"));
        }
    }
    Ok(())
}

async fn cmd_client(app: &App, action: ClientCommands) -> Result<()> {
    match action {
        ClientCommands::Add {
            name,
            level,
            industry,
            sprs,
            contact,
            email,
            notes,
        } => {
            let Some(assessment_level) = AssessmentLevel::parse(level) else {
                bail!("assessment level must be 1, 2, or 3 (got {level})");
            };
            let id = app
                .portfolio
                .add_client(NewClient {
                    name: name.clone(),
                    assessment_level,
                    industry,
                    sprs_score: sprs,
                    contact,
                    email,
                    notes,
                })
                .await?;
            app.notifier.success(format!("client '{name}' added ({id})"));
        }
        ClientCommands::List => {
            let clients = app.portfolio.clients().await?;
            let table = view::client_table(&clients);
            println!(
                "{} {}",
                app.paint(BOLD, "clients"),
                app.paint(DIM, &table.total_label)
            );
            match table.empty_state {
                Some(message) => println!("  {}", app.paint(DIM, message)),
                None => {
                    for row in &table.rows {
                        println!(
                            "  {} — {} · {} · SPRS {} · {} {}",
                            app.paint(BOLD, &row.name),
                            row.level_label,
                            if row.industry.is_empty() { "—" } else { row.industry.as_str() },
                            row.sprs_label,
                            row.completion_label,
                            app.paint(DIM, &row.id),
                        );
                    }
                }
            }
        }
        ClientCommands::Update { id, field, value } => {
            // Take the value as JSON when it parses, else as a raw string,
            // so `--value 88` is a number and `--value Aerospace` a string.
            let parsed: Value = serde_json::from_str(&value)
                .unwrap_or_else(|_| Value::String(value.clone()));
            app.portfolio.update_client(&id, &field, parsed).await?;
            app.notifier.success(format!("client {id}: {field} updated"));
        }
        ClientCommands::Edit { id, set } => {
            let mut session = FormSession::open(app.portfolio.store(), &id).await?;
            for pair in &set {
                let Some((field, raw)) = pair.split_once('=') else {
                    bail!("--set expects FIELD=VALUE, got '{pair}'");
                };
                let value: Value = serde_json::from_str(raw)
                    .unwrap_or_else(|_| Value::String(raw.to_owned()));
                session.set_field(field, value);
            }
            match session.submit(app.portfolio.store()).await? {
                SubmitOutcome::Committed => {
                    app.notifier.success(format!("client {id} updated"));
                }
                SubmitOutcome::Rejected => {
                    let message = session
                        .inline_error()
                        .unwrap_or("validation failed")
                        .to_owned();
                    session.cancel();
                    bail!("{message}");
                }
            }
        }
        ClientCommands::Remove { id, yes } => {
            let mut confirmation = DeleteConfirmation::request(id.clone());
            if !confirm(app, &format!("Remove client {id} from the portfolio?"), yes)? {
                confirmation.cancel();
                app.notifier.info("removal cancelled");
                return Ok(());
            }
            confirmation.confirm_record(app.portfolio.store()).await?;
            app.notifier.success(format!("client {id} removed"));
        }
    }
    Ok(())
}

async fn cmd_settings(app: &App, action: SettingsCommands) -> Result<()> {
    match action {
        SettingsCommands::Get => {
            let settings = app.settings.settings().await?;
            println!("assessor: {}", settings.assessor);
            println!("provider: {}", settings.provider.as_str());
            println!("theme:    {}", settings.theme.as_str());
        }
        SettingsCommands::Set {
            assessor,
            provider,
            theme,
        } => {
            if assessor.is_none() && provider.is_none() && theme.is_none() {
                bail!("nothing to set — pass --assessor, --provider, or --theme");
            }
            if let Some(name) = assessor {
                app.settings.set_assessor(&name).await?;
                app.notifier.success(format!("assessor set to '{name}'"));
            }
            if let Some(raw) = provider {
                let Some(parsed) = CloudProvider::parse(&raw) else {
                    bail!("unknown provider '{raw}' (expected aws, azure, gcp, or other)");
                };
                app.settings.set_provider(parsed).await?;
                app.notifier.success(format!("provider set to {raw}"));
            }
            if let Some(raw) = theme {
                let Some(parsed) = Theme::parse(&raw) else {
                    bail!("unknown theme '{raw}' (expected light or dark)");
                };
                app.settings.set_theme(parsed).await?;
                app.notifier.success(format!("theme set to {raw}"));
            }
        }
    }
    Ok(())
}

async fn cmd_export(app: &App, output: Option<PathBuf>) -> Result<()> {
    let bundle = export::export_all(&app.adapter, STORE_PREFIX).await?;
    let text = bundle.to_pretty_json()?;

    match output {
        Some(path) => {
            std::fs::write(&path, &text)
                .with_context(|| format!("cannot write '{}'", path.display()))?;
            app.notifier.success(format!(
                "{} stores exported to {}",
                bundle.stores.len(),
                path.display()
            ));
        }
        None => println!("{text}"),
    }
    Ok(())
}

async fn cmd_import(app: &App, file: &Path, yes: bool) -> Result<()> {
    let payload = std::fs::read_to_string(file)
        .with_context(|| format!("import file not found: '{}'", file.display()))?;

    let plan = match ImportPlan::parse(&payload) {
        Ok(plan) => plan,
        Err(e) => {
            app.notifier.error(format!("import aborted: {e}"));
            bail!("import aborted: {e}");
        }
    };

    if plan.is_empty() {
        app.notifier.info("import file contains no stores; nothing to do");
        return Ok(());
    }

    println!(
        "About to import {} key(s): {}",
        plan.len(),
        plan.keys().join(", ")
    );
    if !confirm(app, "Merge these into local storage?", yes)? {
        app.notifier.info("import cancelled");
        return Ok(());
    }

    let written = plan.apply(&app.adapter).await?;
    app.notifier.success(format!("{written} store(s) imported"));
    Ok(())
}

// ── Prompt helper ────────────────────────────────────────────────────

/// Ask for a y/N confirmation on stdin unless `--yes` was passed.
fn confirm(app: &App, question: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    print!("{} {} ", question, app.paint(DIM, "[y/N]"));
    std::io::stdout().flush().context("cannot flush stdout")?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("cannot read confirmation")?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

fn parse_evidence_kind(raw: &str) -> Result<EvidenceKind> {
    let kind = EvidenceKind::parse_lossy(raw);
    if kind == EvidenceKind::Other && raw != "other" {
        bail!(
            "unknown evidence kind '{raw}' (expected document, screenshot, log, \
             configuration, policy, certificate, report, or other)"
        );
    }
    Ok(kind)
}
