//! deepchat: terminal front end for the CSV chat and deep-analysis backend.
//!
//! # Subcommands
//! - `login <email> [--password <otp>]`, `logout`, `whoami`
//! - `sessions [--page N] [--limit N] [--search TEXT]`
//! - `show <id>`, `upload <file>`, `delete <id> [--yes]`
//! - `chat <id>` (interactive), `ask <id> <query>`
//! - `feedback <message_id> <up|down>`, `summary <id>`
//! - `analysis <id> [--start] [--no-wait]`, `report <id> [--output PATH]`

mod chat;
mod console;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use deepchat_core::dashboard::DEFAULT_PAGE_SIZE;
use deepchat_core::models::{AnalysisPhase, Feedback, Message, Session};
use deepchat_core::{
    AnalysisTracker, ApiClient, AuthContext, CsvUpload, Dashboard, DeepchatConfig, DeepchatError,
    FileCredentialStore, IdentityStore, Notifier, Route, SendOutcome, SubmitRejected,
    Transcript, UploadPolicy,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

use chat::{ChatCommand, HELP};
use console::ConsoleNotifier;

const DEFAULT_CONFIG: &str = "deepchat.toml";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "deepchat",
    version,
    about = "Chat with CSV data and track deep analysis from the terminal"
)]
struct Cli {
    /// Config file (TOML). Missing files fall back to defaults.
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: String,

    /// Backend URL (overrides [api] base_url)
    #[arg(long, env = "DEEPCHAT_API__BASE_URL")]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Log in with a one-time password sent to your email
    Login {
        email: String,

        /// One-time password; when omitted one is requested and prompted for
        #[arg(long)]
        password: Option<String>,
    },

    /// Forget the stored credentials
    Logout,

    /// Show the logged-in account
    Whoami,

    /// List sessions
    Sessions {
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(short = 'n', long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: u32,

        /// Only show sessions whose file name or id contains this text
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Show one session with its suggested questions
    Show { session_id: String },

    /// Upload a CSV file and create a session
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Delete a session
    Delete {
        session_id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Interactive chat about a session's data
    Chat { session_id: String },

    /// Ask a single question and print the answer
    Ask { session_id: String, query: String },

    /// Rate an assistant answer
    Feedback {
        message_id: String,

        #[arg(value_enum)]
        vote: Vote,
    },

    /// Print the chat summary of a session
    Summary { session_id: String },

    /// Show, start or watch the deep analysis of a session
    Analysis {
        session_id: String,

        /// Start an analysis when none is running
        #[arg(long)]
        start: bool,

        /// Print the current status and exit instead of watching
        #[arg(long)]
        no_wait: bool,
    },

    /// Download the deep analysis report
    Report {
        session_id: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Vote {
    Up,
    Down,
}

impl From<Vote> for Feedback {
    fn from(vote: Vote) -> Self {
        match vote {
            Vote::Up => Feedback::ThumbsUp,
            Vote::Down => Feedback::ThumbsDown,
        }
    }
}

// ============================================================================
// Application wiring
// ============================================================================

struct App {
    config: DeepchatConfig,
    api: ApiClient,
    notifier: Arc<ConsoleNotifier>,
}

impl App {
    fn new(config: DeepchatConfig) -> anyhow::Result<Self> {
        let path = config.storage.resolved_credentials_path();
        tracing::debug!(path = %path.display(), "Using credentials file");

        let identity = Arc::new(IdentityStore::init(Arc::new(FileCredentialStore::new(path))));
        let api = ApiClient::new(&config.api, identity)?;

        Ok(Self {
            config,
            api,
            notifier: Arc::new(ConsoleNotifier),
        })
    }

    fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }

    fn auth(&self) -> AuthContext {
        AuthContext::new(self.api.clone(), self.notifier())
    }

    fn dashboard(&self) -> Dashboard {
        Dashboard::new(
            self.api.clone(),
            self.notifier(),
            UploadPolicy::from(&self.config.upload),
        )
    }

    fn tracker(&self, session_id: &str) -> AnalysisTracker {
        AnalysisTracker::new(
            Arc::new(self.api.clone()),
            self.notifier(),
            session_id,
            self.config.analysis.poll_interval(),
        )
    }

    /// Apply the auth guard to a protected route.
    fn enter(&self, route: Route) -> anyhow::Result<Route> {
        match route.resolve(self.api.identity().is_authenticated()) {
            Route::Login => bail!("not logged in; run `deepchat login <email>` first"),
            route => Ok(route),
        }
    }

    async fn load_session(&self, route: &Route) -> anyhow::Result<Session> {
        let session_id = route.session_id().unwrap_or_default();
        match self.api.get_session(session_id).await {
            Ok(session) => Ok(session),
            Err(e) => {
                if route.after_load_error(&e) == Some(Route::Dashboard) {
                    self.notifier.error("Failed to load session");
                }
                Err(e.into())
            }
        }
    }

    /// Message history; a failed load is reported and leaves the chat empty.
    async fn load_history(&self, session_id: &str) -> anyhow::Result<Vec<Message>> {
        match self.api.session_messages(session_id).await {
            Ok(messages) => Ok(messages),
            Err(DeepchatError::SessionExpired) => Err(DeepchatError::SessionExpired.into()),
            Err(e) => {
                tracing::debug!(session_id, error = %e, "Message history unavailable");
                self.notifier.error("Failed to load messages");
                Ok(Vec::new())
            }
        }
    }
}

async fn prompt(label: &str) -> anyhow::Result<String> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(label.as_bytes()).await?;
    stderr.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    Ok(line.trim().to_string())
}

// ============================================================================
// Auth commands
// ============================================================================

async fn do_login(app: &App, email: &str, password: Option<String>) -> anyhow::Result<()> {
    let auth = app.auth();
    if Route::Login.resolve(auth.is_authenticated()) != Route::Login {
        let who = auth.current().map(|i| i.email().to_string()).unwrap_or_default();
        eprintln!("Already logged in as {}. Run `deepchat logout` first.", who);
        return Ok(());
    }

    let password = match password {
        Some(password) => password,
        None => {
            if !auth.request_login(email).await {
                bail!("login request was not accepted");
            }
            prompt("One-time password: ").await?
        }
    };

    if !auth.login(email, &password).await {
        bail!("login failed");
    }
    Ok(())
}

fn do_whoami(app: &App) {
    match app.auth().current() {
        Some(identity) => println!("{}", identity.email()),
        None => println!("Not logged in"),
    }
}

// ============================================================================
// Session commands
// ============================================================================

async fn do_sessions(
    app: &App,
    page: u32,
    limit: u32,
    search: Option<&str>,
) -> anyhow::Result<()> {
    app.enter(Route::Dashboard)?;
    let mut dashboard = app.dashboard().with_page_size(limit);
    dashboard.load(page).await?;

    let rows = dashboard.filtered(search.unwrap_or(""));
    if rows.is_empty() {
        eprintln!("No sessions found");
    }
    for session in rows {
        println!("{}", console::session_row(session));
    }
    println!(
        "\nPage {} of {} ({} sessions)",
        dashboard.current_page(),
        dashboard.total_pages(),
        dashboard.total_count()
    );
    Ok(())
}

async fn do_show(app: &App, session_id: String) -> anyhow::Result<()> {
    let route = app.enter(Route::Chat(session_id))?;
    let session = app.load_session(&route).await?;

    println!("Session:  {}", session.session_id);
    println!("File:     {}", session.display_name());
    if let Some(info) = &session.file_info {
        if let (Some(rows), Some(cols)) = (info.total_rows, info.total_columns) {
            println!("Shape:    {} rows x {} columns", rows, cols);
        }
        if !info.column_names.is_empty() {
            println!("Columns:  {}", info.column_names.join(", "));
        }
    }
    if let Some(created) = &session.created_at {
        println!("Created:  {}", created);
    }
    if !session.smart_questions.is_empty() {
        println!(
            "\nSuggested questions:\n{}",
            console::render_smart_questions(&session.smart_questions)
        );
    }
    Ok(())
}

async fn do_upload(app: &App, files: &[PathBuf]) -> anyhow::Result<()> {
    app.enter(Route::Dashboard)?;
    let policy = UploadPolicy::from(&app.config.upload);

    let mut uploads = Vec::with_capacity(files.len());
    for path in files {
        match CsvUpload::from_path(path, &policy).await {
            Ok(upload) => uploads.push(upload),
            Err(e) => {
                app.notifier.error(&e.user_message("Failed to upload CSV"));
                return Err(e).with_context(|| format!("cannot upload {}", path.display()));
            }
        }
    }

    let session_id = app.dashboard().upload(uploads).await?;
    println!("{}", session_id);
    eprintln!("Start chatting: deepchat chat {}", session_id);
    Ok(())
}

async fn do_delete(app: &App, session_id: &str, yes: bool) -> anyhow::Result<()> {
    app.enter(Route::Dashboard)?;
    if !yes {
        let answer = prompt(&format!("Delete session {}? [y/N] ", session_id)).await?;
        if !matches!(answer.to_lowercase().as_str(), "y" | "yes") {
            eprintln!("Cancelled");
            return Ok(());
        }
    }

    let mut dashboard = app.dashboard();
    dashboard.delete(session_id).await?;
    Ok(())
}

// ============================================================================
// Chat commands
// ============================================================================

/// Send one message. `Ok(false)` means nothing was answered; only an
/// expired session is an error.
async fn send_and_print(
    app: &App,
    transcript: &mut Transcript,
    input: &str,
) -> anyhow::Result<bool> {
    match transcript.send(&app.api, input).await {
        Ok(SendOutcome::Replied(message)) => {
            println!("{}\n", console::render_message(&message));
            Ok(true)
        }
        Ok(SendOutcome::Rejected(SubmitRejected::Empty)) => Ok(false),
        Ok(SendOutcome::Rejected(SubmitRejected::Busy)) => {
            eprintln!("Still waiting for the previous answer");
            Ok(false)
        }
        Err(DeepchatError::SessionExpired) => Err(DeepchatError::SessionExpired.into()),
        Err(e) => {
            app.notifier.error(&e.user_message("Failed to send message"));
            Ok(false)
        }
    }
}

async fn submit_feedback(app: &App, message_id: &str, feedback: Feedback) -> anyhow::Result<bool> {
    match app.api.submit_feedback(message_id, feedback).await {
        Ok(_) => {
            app.notifier.success("Feedback submitted!");
            Ok(true)
        }
        Err(DeepchatError::SessionExpired) => Err(DeepchatError::SessionExpired.into()),
        Err(e) => {
            tracing::debug!(message_id, error = %e, "Feedback rejected");
            app.notifier.error("Failed to submit feedback");
            Ok(false)
        }
    }
}

async fn print_summary(app: &App, session_id: &str) -> anyhow::Result<bool> {
    match app.api.chat_summary(session_id).await {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(true)
        }
        Err(DeepchatError::SessionExpired) => Err(DeepchatError::SessionExpired.into()),
        Err(e) => {
            app.notifier
                .error(&e.user_message("Failed to load chat summary"));
            Ok(false)
        }
    }
}

async fn rate_last_answer(
    app: &App,
    transcript: &Transcript,
    feedback: Feedback,
) -> anyhow::Result<()> {
    match transcript.last_assistant_message() {
        Some(message) => {
            submit_feedback(app, &message.id, feedback).await?;
        }
        None => eprintln!("No answer to rate yet"),
    }
    Ok(())
}

async fn do_ask(app: &App, session_id: String, query: &str) -> anyhow::Result<()> {
    let route = app.enter(Route::Chat(session_id))?;
    let session_id = route.session_id().unwrap_or_default();
    let history = app.load_history(session_id).await?;

    let mut transcript = Transcript::with_history(session_id, history);
    if !send_and_print(app, &mut transcript, query).await? {
        bail!("no answer received");
    }
    Ok(())
}

async fn do_chat(app: &App, session_id: String) -> anyhow::Result<()> {
    let route = app.enter(Route::Chat(session_id))?;
    let session = app.load_session(&route).await?;
    let history = app.load_history(&session.session_id).await?;
    let mut transcript = Transcript::with_history(session.session_id.clone(), history);

    println!(
        "Chatting about {} ({})\n",
        session.display_name(),
        session.session_id
    );
    for message in transcript.messages() {
        println!("{}\n", console::render_message(message));
    }
    if !session.smart_questions.is_empty() {
        println!(
            "Suggested questions:\n{}\n",
            console::render_smart_questions(&session.smart_questions)
        );
    }
    eprintln!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match ChatCommand::parse(&line) {
            ChatCommand::Send(text) => {
                send_and_print(app, &mut transcript, &text).await?;
            }
            ChatCommand::Question(n) => match session.smart_questions.get(n - 1) {
                Some(question) => {
                    println!("> {}", question);
                    send_and_print(app, &mut transcript, question).await?;
                }
                None => eprintln!("There is no suggested question {}", n),
            },
            ChatCommand::ThumbsUp => {
                rate_last_answer(app, &transcript, Feedback::ThumbsUp).await?;
            }
            ChatCommand::ThumbsDown => {
                rate_last_answer(app, &transcript, Feedback::ThumbsDown).await?;
            }
            ChatCommand::Summary => {
                print_summary(app, &session.session_id).await?;
            }
            ChatCommand::Analysis => {
                let tracker = app.tracker(&session.session_id);
                // Only the current status is wanted; dropping the handle stops polling.
                drop(tracker.resume().await);
                println!("{}\n", console::render_snapshot(&tracker.snapshot()));
            }
            ChatCommand::Help => println!("{}", HELP),
            ChatCommand::Exit => break,
            ChatCommand::Invalid(reason) => eprintln!("{}", reason),
        }
    }
    Ok(())
}

// ============================================================================
// Deep analysis commands
// ============================================================================

async fn do_analysis(
    app: &App,
    session_id: String,
    start: bool,
    no_wait: bool,
) -> anyhow::Result<()> {
    let route = app.enter(Route::Analysis(session_id))?;
    let session = app.load_session(&route).await?;
    let tracker = app.tracker(&session.session_id);
    let mut updates = tracker.subscribe();

    let handle = match tracker.resume().await {
        Some(handle) => Some(handle),
        None if start => Some(tracker.start().await?),
        None => None,
    };

    let Some(handle) = handle.filter(|_| !no_wait) else {
        let snapshot = tracker.snapshot();
        println!("{}", console::render_snapshot(&snapshot));
        if snapshot.phase == AnalysisPhase::NotStarted {
            eprintln!(
                "Run `deepchat analysis {} --start` to begin.",
                session.session_id
            );
        }
        return Ok(());
    };

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                println!("{}\n", console::render_snapshot(&snapshot));
                if snapshot.phase.is_terminal() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                handle.cancel();
                eprintln!("Stopped watching; the analysis continues on the server.");
                break;
            }
        }
    }
    handle.finished().await;
    Ok(())
}

/// File name for a downloaded report, keeping the URL's extension.
fn default_report_name(session_id: &str, url: &str) -> String {
    let last = url
        .split(['?', '#'])
        .next()
        .unwrap_or("")
        .rsplit('/')
        .next()
        .unwrap_or("");
    let ext = match last.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext,
        _ => "html",
    };
    format!("deep-analysis-{}.{}", session_id, ext)
}

async fn do_report(app: &App, session_id: String, output: Option<PathBuf>) -> anyhow::Result<()> {
    let route = app.enter(Route::Analysis(session_id))?;
    let session_id = route.session_id().unwrap_or_default();

    let status = app.api.analysis_status(session_id).await?;
    let Some(url) = status.and_then(|s| s.report_url) else {
        bail!("no report available for session {} yet", session_id);
    };

    let bytes = app.api.download(&url).await?;
    let output = output.unwrap_or_else(|| PathBuf::from(default_report_name(session_id, &url)));
    tokio::fs::write(&output, &bytes)
        .await
        .with_context(|| format!("cannot write {}", output.display()))?;

    eprintln!("Saved report to {} ({} bytes)", output.display(), bytes.len());
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

async fn run(command: Commands, config: DeepchatConfig) -> anyhow::Result<()> {
    let app = App::new(config)?;

    match command {
        Commands::Login { email, password } => do_login(&app, &email, password).await,
        Commands::Logout => {
            app.auth().logout();
            Ok(())
        }
        Commands::Whoami => {
            do_whoami(&app);
            Ok(())
        }
        Commands::Sessions {
            page,
            limit,
            search,
        } => do_sessions(&app, page, limit, search.as_deref()).await,
        Commands::Show { session_id } => do_show(&app, session_id).await,
        Commands::Upload { files } => do_upload(&app, &files).await,
        Commands::Delete { session_id, yes } => do_delete(&app, &session_id, yes).await,
        Commands::Chat { session_id } => do_chat(&app, session_id).await,
        Commands::Ask { session_id, query } => do_ask(&app, session_id, &query).await,
        Commands::Feedback { message_id, vote } => {
            app.enter(Route::Dashboard)?;
            if !submit_feedback(&app, &message_id, vote.into()).await? {
                bail!("feedback was not recorded");
            }
            Ok(())
        }
        Commands::Summary { session_id } => {
            let route = app.enter(Route::Chat(session_id))?;
            if !print_summary(&app, route.session_id().unwrap_or_default()).await? {
                bail!("no summary available");
            }
            Ok(())
        }
        Commands::Analysis {
            session_id,
            start,
            no_wait,
        } => do_analysis(&app, session_id, start, no_wait).await,
        Commands::Report { session_id, output } => do_report(&app, session_id, output).await,
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = match DeepchatConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("deepchat: failed to load config from {}: {}", cli.config, e);
            std::process::exit(1);
        }
    };
    if let Some(server) = cli.server {
        config.api.base_url = server;
    }

    // RUST_LOG wins over [logging] level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli.command, config).await {
        match e.downcast_ref::<DeepchatError>() {
            Some(DeepchatError::SessionExpired) => {
                eprintln!("deepchat: {} (run `deepchat login <email>`)", e)
            }
            _ => eprintln!("deepchat: {:#}", e),
        }
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
