//! studentcard - view student ID cards from the terminal, online or offline.
//!
//! Card and manifest lookups run through the offline cache controller, so a
//! card seen once stays viewable without a connection. The dashboard commands
//! (login, stats, students, imports, jobs, users, verify) talk to the backend
//! directly.

mod host;

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use studentcard_core::api::{ApiClient, StudentFilter};
use studentcard_core::auth::Session;
use studentcard_core::cache::CacheStorage;
use studentcard_core::config::Config;
use studentcard_core::controller::{ControlMessage, MessageOutcome};
use studentcard_core::models::{GenerationJob, ImportJob, NewStudent, SecureCard, Student};
use studentcard_core::registration::RegisterOutcome;
use studentcard_core::routes::RouteTable;
use studentcard_core::CardView;

use host::Host;

/// How often `jobs --watch` refreshes the job list.
const JOB_POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Parser, Debug)]
#[command(name = "studentcard", version, about = "Offline-capable student ID cards")]
struct Cli {
    /// Also write logs to a daily rotating file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show a student's card (served from cache when offline)
    Card {
        matricule: String,
        /// Print the raw card JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the web-app manifest of a student's card
    Manifest { matricule: String },
    /// Install the configured controller version now
    Install,
    /// Delete every cache store
    ClearCache,
    /// List cache stores and their entries
    Stores,
    /// Show the request routing table, or how one path is routed
    Routes { path: Option<String> },
    /// Log in to the backend and remember the session
    Login { email: Option<String> },
    /// Forget the saved session
    Logout,
    /// Verify the content of a scanned card QR code
    Verify { qr_content: String },
    /// Show dashboard statistics
    Stats,
    /// List students
    Students {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        program: Option<String>,
        /// Only active (true) or inactive (false) students
        #[arg(long)]
        active: Option<bool>,
    },
    /// Show one student and the link to their card
    Student { id: i64 },
    /// Create a student
    AddStudent {
        matricule: String,
        first_name: String,
        last_name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        program: Option<String>,
        #[arg(long)]
        academic_year: Option<String>,
        /// Expiration date, YYYY-MM-DD
        #[arg(long)]
        expiration_date: Option<String>,
    },
    /// List program names
    Programs,
    /// List card generation jobs
    Jobs {
        /// Keep refreshing until every job has finished
        #[arg(long)]
        watch: bool,
    },
    /// List CSV imports
    Imports,
    /// Import students from a CSV file
    Import { file: PathBuf },
    /// Download the CSV import template
    ImportTemplate {
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List dashboard users (admin only)
    Users,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "studentcard.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_ref());

    let config = Config::load().context("Failed to load configuration")?;
    info!(origin = %config.origin, version = %config.version, "studentcard starting");

    match cli.command {
        Command::Card { matricule, json } => show_card(config, &matricule, json).await,
        Command::Manifest { matricule } => show_manifest(config, &matricule).await,
        Command::Install => install(config).await,
        Command::ClearCache => clear_cache(config).await,
        Command::Stores => list_stores(config).await,
        Command::Login { email } => login(config, email).await,
        Command::Logout => logout(&config),
        Command::Verify { qr_content } => verify(&config, &qr_content).await,
        Command::Routes { path } => show_routes(&config, path.as_deref()),
        Command::Stats => show_stats(&config).await,
        Command::Students {
            search,
            program,
            active,
        } => {
            let filter = StudentFilter {
                search,
                program,
                is_active: active,
            };
            list_students(&config, &filter).await
        }
        Command::Student { id } => show_student(&config, id).await,
        Command::AddStudent {
            matricule,
            first_name,
            last_name,
            email,
            program,
            academic_year,
            expiration_date,
        } => {
            let student = NewStudent {
                matricule,
                first_name,
                last_name,
                email,
                program,
                academic_year,
                expiration_date,
                photo_url: None,
            };
            add_student(&config, &student).await
        }
        Command::Programs => list_programs(&config).await,
        Command::Jobs { watch } => list_jobs(&config, watch).await,
        Command::Imports => list_imports(&config).await,
        Command::Import { file } => import_csv(&config, &file).await,
        Command::ImportTemplate { output } => import_template(&config, output.as_deref()).await,
        Command::Users => list_users(&config).await,
    }
}

// ===== Card viewer =====

async fn open_host(config: Config) -> Result<Host> {
    let host = Host::open(config)?;
    host.start().await?;
    Ok(host)
}

async fn show_card(config: Config, matricule: &str, json: bool) -> Result<()> {
    let host = open_host(config).await?;
    let viewer = host.viewer()?;

    match viewer.load_card(matricule).await? {
        CardView::Card(card) if json => {
            println!("{}", serde_json::to_string_pretty(&card)?);
        }
        CardView::Card(card) => print_card(&card),
        CardView::Offline(notice) => {
            eprintln!("✗ {}: {}", notice.error, notice.message);
        }
        CardView::Unavailable { status, detail } => {
            eprintln!("✗ {} ({})", detail, status);
        }
    }
    Ok(())
}

fn print_card(card: &SecureCard) {
    let student = &card.student;
    println!("{}", student.full_name());
    println!("  Matricule:  {}", student.matricule);
    if let Some(ref program) = student.program {
        println!("  Program:    {}", program);
    }
    if let Some(ref year) = student.academic_year {
        println!("  Year:       {}", year);
    }
    match student.expires_on() {
        Some(date) => println!("  Expires:    {}", date.format("%d/%m/%Y")),
        None => println!("  Expires:    -"),
    }
    let status = if card.is_expired { "EXPIRED" } else { "valid" };
    println!("  Status:     {}", status);
    println!("  Card URL:   {}", card.card_url);
    println!("  QR code:    {} bytes (base64)", card.qr_code_base64.len());
    if !card.message.is_empty() {
        println!("  {}", card.message);
    }
}

async fn show_manifest(config: Config, matricule: &str) -> Result<()> {
    let host = open_host(config).await?;
    let viewer = host.viewer()?;

    match viewer.load_manifest(matricule).await {
        Some(manifest) => println!("{}", serde_json::to_string_pretty(&manifest)?),
        None => eprintln!("No manifest available for {}", matricule),
    }
    Ok(())
}

// ===== Cache maintenance =====

async fn install(config: Config) -> Result<()> {
    let host = Host::open(config)?;
    match host.install().await? {
        RegisterOutcome::Activated { evicted } => {
            println!("✓ Version {} active", host.config.version);
            for store in evicted {
                println!("  removed stale store {}", store);
            }
        }
        RegisterOutcome::Waiting => {
            println!("Version {} installed, waiting to activate", host.config.version);
        }
    }
    Ok(())
}

async fn clear_cache(config: Config) -> Result<()> {
    let host = open_host(config).await?;
    let stores = match host.registration.post_message(ControlMessage::ClearCache).await? {
        MessageOutcome::Cleared { stores } => stores,
        _ => {
            // No controller could start (offline first run); clear directly.
            let stores = host.storage.keys().await?;
            for store in &stores {
                host.storage.delete(store).await?;
            }
            stores
        }
    };
    println!("✓ Removed {} cache store(s)", stores.len());
    Ok(())
}

async fn list_stores(config: Config) -> Result<()> {
    let host = Host::open(config)?;
    let current = host.config.controller_config();
    let names = studentcard_core::cache::CacheNames::new(&current.app_name, &current.version);

    let stores = host.storage.keys().await?;
    if stores.is_empty() {
        println!("No cache stores");
        return Ok(());
    }
    for store in stores {
        let marker = if names.is_current(&store) { "current" } else { "stale" };
        let entries = host.storage.entries(&store).await?;
        println!("{} ({}, {} entries)", store, marker, entries.len());
        for entry in entries {
            println!(
                "  {} {} [{}] {}",
                entry.request.method,
                entry.request.url,
                entry.response.status,
                entry.cached_at.format("%Y-%m-%d %H:%M")
            );
        }
    }
    if let Some(state) = host.controller_state().await {
        println!("Controller: {}", state);
    }
    Ok(())
}

fn show_routes(config: &Config, path: Option<&str>) -> Result<()> {
    let table = RouteTable::from_config(&config.controller_config());
    match path {
        Some(path) => {
            let route = table.classify_path(path);
            println!("{} -> {}: {}", path, route, route.policy());
        }
        None => {
            for (i, rule) in table.rules().iter().enumerate() {
                println!("{}. {:<16} {}", i + 1, rule.route, rule.matcher);
                println!("   {}", rule.route.policy());
            }
        }
    }
    Ok(())
}

// ===== Dashboard =====

fn session(config: &Config) -> Result<Session> {
    let mut session = Session::new(config.cache_dir()?);
    session.load()?;
    Ok(session)
}

fn authed_client(config: &Config) -> Result<ApiClient> {
    let session = session(config)?;
    let token = session
        .token()
        .ok_or_else(|| anyhow::anyhow!("Not logged in (or session expired). Run `studentcard login` first."))?;
    Ok(ApiClient::new(&config.api_base)?.with_token(token.to_string()))
}

async fn login(mut config: Config, email: Option<String>) -> Result<()> {
    let email = email
        .or_else(|| config.last_email.clone())
        .ok_or_else(|| anyhow::anyhow!("Email required"))?;
    let password = rpassword::prompt_password(format!("Password for {}: ", email))?;

    let client = ApiClient::new(&config.api_base)?;
    let data = client.authenticate(&email, &password).await?;
    let user = client.with_token(data.token.clone()).current_user().await.ok();

    let mut session = Session::new(config.cache_dir()?);
    let expires = data.minutes_until_expiry();
    session.update(data);
    session.save()?;

    config.last_email = Some(email.clone());
    config.save()?;

    match user {
        Some(user) => println!("✓ Logged in as {}", user.display_name()),
        None => println!("✓ Logged in as {}", email),
    }
    println!("  Session valid for {} minutes", expires);
    Ok(())
}

fn logout(config: &Config) -> Result<()> {
    session(config)?.clear()?;
    println!("✓ Logged out");
    Ok(())
}

async fn verify(config: &Config, qr_content: &str) -> Result<()> {
    let client = authed_client(config)?;
    let result = client.verify_qr(qr_content).await?;

    let mark = if result.valid { "✓" } else { "✗" };
    println!("{} {}", mark, result.message);
    if let Some(student) = result.student {
        print_student_row(&student);
    }
    Ok(())
}

async fn show_stats(config: &Config) -> Result<()> {
    let client = authed_client(config)?;
    let stats = client.dashboard_stats().await?;
    let counts = &stats.students;

    println!("Students:       {} ({} active, {} inactive)", counts.total, counts.active, counts.inactive);
    println!("Expired:        {}", counts.expired);
    println!("Expiring soon:  {}", counts.expiring_soon);
    println!("New this month: {}", counts.new_this_month);

    let top = stats.top_programs(5);
    if !top.is_empty() {
        println!();
        println!("Top programs");
        for program in top {
            println!("  {:<30} {}", program.name, program.count);
        }
    }
    if !stats.recent_imports.is_empty() {
        println!();
        println!("Recent imports");
        for import in &stats.recent_imports {
            println!(
                "  {:<30} {:<10} {}/{}",
                import.filename, import.status, import.successful_rows, import.total_rows
            );
        }
    }
    Ok(())
}

async fn list_students(config: &Config, filter: &StudentFilter) -> Result<()> {
    let client = authed_client(config)?;
    let students = client.list_students(filter).await?;
    if students.is_empty() {
        println!("No students found");
    }
    for student in &students {
        print_student_row(student);
    }
    Ok(())
}

async fn show_student(config: &Config, id: i64) -> Result<()> {
    let client = authed_client(config)?;
    let student = client.get_student(id).await?;

    println!("{}", student.full_name());
    println!("  Matricule:  {}", student.matricule);
    if let Some(ref email) = student.email {
        println!("  Email:      {}", email);
    }
    if let Some(ref program) = student.program {
        println!("  Program:    {}", program);
    }
    match student.expires_on() {
        Some(date) => println!("  Expires:    {}", date.format("%d/%m/%Y")),
        None => println!("  Expires:    -"),
    }
    println!(
        "  Card:       {}/card/{}",
        config.origin.trim_end_matches('/'),
        student.matricule
    );
    Ok(())
}

async fn add_student(config: &Config, student: &NewStudent) -> Result<()> {
    let client = authed_client(config)?;
    let created = client.create_student(student).await?;
    println!("✓ Created {} (id {})", created.full_name(), created.id);
    print_student_row(&created);
    Ok(())
}

async fn list_programs(config: &Config) -> Result<()> {
    let client = authed_client(config)?;
    for program in client.list_programs().await? {
        println!("{}", program);
    }
    Ok(())
}

async fn list_jobs(config: &Config, watch: bool) -> Result<()> {
    let client = authed_client(config)?;
    loop {
        let jobs = client.list_jobs().await?;
        if jobs.is_empty() {
            println!("No generation jobs");
        }
        for job in &jobs {
            print_job_row(job);
        }

        if !watch || jobs.iter().all(GenerationJob::is_finished) {
            return Ok(());
        }
        tokio::time::sleep(JOB_POLL_INTERVAL).await;
        println!();
    }
}

fn print_job_row(job: &GenerationJob) {
    println!(
        "  #{:<5} {:<12} {:<10} {:<12} {}",
        job.id,
        job.job_type,
        job.provider,
        job.status,
        job.completed_at.as_deref().unwrap_or(&job.created_at)
    );
}

async fn list_imports(config: &Config) -> Result<()> {
    let client = authed_client(config)?;
    let imports = client.list_imports().await?;
    if imports.is_empty() {
        println!("No imports");
    }
    for import in &imports {
        print_import_row(import);
    }
    Ok(())
}

fn print_import_row(import: &ImportJob) {
    println!(
        "  {:<30} {:<10} {}/{} imported, {} failed  {}",
        import.filename,
        import.status,
        import.successful_rows,
        import.total_rows,
        import.failed_rows,
        import.created_at.as_deref().unwrap_or("-")
    );
}

async fn import_csv(config: &Config, file: &Path) -> Result<()> {
    let contents = std::fs::read(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "import.csv".to_string());

    let client = authed_client(config)?;
    let result = client.upload_import(&file_name, contents).await?;
    println!(
        "✓ Imported {}/{} rows ({} failed)",
        result.successful_rows, result.total_rows, result.failed_rows
    );
    Ok(())
}

async fn import_template(config: &Config, output: Option<&Path>) -> Result<()> {
    let client = authed_client(config)?;
    let template = client.download_import_template().await?;
    match output {
        Some(path) => {
            std::fs::write(path, template)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✓ Template saved to {}", path.display());
        }
        None => print!("{}", template),
    }
    Ok(())
}

async fn list_users(config: &Config) -> Result<()> {
    let client = authed_client(config)?;
    for user in client.list_users().await? {
        let status = if user.is_active { "active" } else { "inactive" };
        println!(
            "  {:<32} {:<24} {:<8} {}",
            user.email,
            user.full_name.as_deref().unwrap_or("-"),
            user.role.as_deref().unwrap_or("-"),
            status
        );
    }
    Ok(())
}

fn print_student_row(student: &Student) {
    let status = if student.is_expired {
        "expired"
    } else if student.is_active {
        "active"
    } else {
        "inactive"
    };
    println!(
        "  {:<10} {:<30} {:<24} {}",
        student.matricule,
        student.full_name(),
        student.program.as_deref().unwrap_or("-"),
        status
    );
}
