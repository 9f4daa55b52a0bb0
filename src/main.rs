//! gradedesk - command-line client for the GradeDesk grading API.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gradedesk::{ClientApp, ClientConfig, ClientError, RegisterRequest, Role, Route};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gradedesk")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in and persist the session
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },

    /// Create an account, then log in with it
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
        /// teacher or student
        #[arg(long)]
        role: Role,
        /// e.g. teacher-101 or student-101
        #[arg(long)]
        invite_code: String,
        /// Required for students
        #[arg(long)]
        student_id: Option<String>,
    },

    /// Drop the persisted session
    Logout,

    /// Show the current session and verify it against the server
    Whoami,

    /// List assignments visible to the current user
    #[command(alias = "ls")]
    Assignments,

    /// Download the class summary workbook for an assignment
    DownloadExcel {
        #[arg(long)]
        id: i64,
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "gradedesk=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::load(cli.config.as_deref())?;
    let app = ClientApp::from_config(config)?;
    // A CLI has no loading screen to show; wait for the restore itself.
    app.boot().await.restored().await;

    match cli.command {
        Commands::Login { username, password } => {
            app.session
                .login(&username, &password)
                .await
                .map_err(|e| failure(&e, "login failed, check username and password"))?;
            print_session(&app);
        }
        Commands::Register {
            username,
            password,
            role,
            invite_code,
            student_id,
        } => {
            let request = RegisterRequest {
                username,
                password,
                role,
                invite_code,
                student_id,
            };
            app.session
                .register(&request)
                .await
                .map_err(|e| failure(&e, "registration failed, check your details"))?;
            print_session(&app);
        }
        Commands::Logout => {
            app.session.logout();
            println!("Logged out.");
        }
        Commands::Whoami => {
            if !app.session.is_authenticated() {
                println!("Not logged in.");
                return Ok(());
            }
            let user = app.api.me().await.map_err(|e| session_failure(&app, &e))?;
            println!("{} ({}), class {}", user.username, user.role, user.class_id);
        }
        Commands::Assignments => {
            require_login(&app)?;
            let assignments = app
                .api
                .list_assignments()
                .await
                .map_err(|e| session_failure(&app, &e))?;
            if assignments.is_empty() {
                println!("No assignments.");
            }
            for a in assignments {
                println!("{:>5}  {:<10}  {}", a.id, a.status.as_str(), a.title);
            }
        }
        Commands::DownloadExcel { id, out } => {
            require_login(&app)?;
            let bytes = app
                .api
                .download_excel(id)
                .await
                .map_err(|e| session_failure(&app, &e))?;
            std::fs::write(&out, &bytes).with_context(|| format!("writing {}", out.display()))?;
            println!("Saved {} bytes to {}", bytes.len(), out.display());
        }
    }

    Ok(())
}

fn print_session(app: &ClientApp) {
    if let Some(user) = app.session.user() {
        println!("Logged in as {} ({})", user.username, user.role);
    }
}

fn require_login(app: &ClientApp) -> Result<()> {
    if !app.session.is_authenticated() {
        bail!("not logged in; run `gradedesk login` first");
    }
    Ok(())
}

fn failure(error: &ClientError, fallback: &str) -> anyhow::Error {
    anyhow::anyhow!(error.user_message(fallback))
}

/// Errors from session-bound calls. A 401 has already evicted the session.
fn session_failure(app: &ClientApp, error: &ClientError) -> anyhow::Error {
    if app.navigator.current() == Route::Login {
        return anyhow::anyhow!("session expired; run `gradedesk login` again");
    }
    failure(error, "request failed")
}
