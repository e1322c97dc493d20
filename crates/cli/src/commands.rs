//! Subcommand implementations.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use thirdchair_client::api::AnalysisApi;
use thirdchair_client::auth::AuthService;
use thirdchair_client::chat::ChatService;
use thirdchair_client::config::ClientConfig;
use thirdchair_client::events::WorkflowEvent;
use thirdchair_client::workflow::{AnalysisWorkflow, WorkflowSpec};
use thirdchair_core::render::{
    render_issues, render_job_status, render_progress_line, render_report,
};
use thirdchair_core::session::{Credentials, FileTokenStore, Session};
use thirdchair_core::staging::{StagedFile, StagingBuffer};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

fn open_session(config: &ClientConfig) -> Result<Arc<Session>> {
    let session = Session::new(FileTokenStore::new(&config.session_file)).with_context(|| {
        format!("Failed to open session file {}", config.session_file.display())
    })?;
    Ok(Arc::new(session))
}

fn build_api(config: &ClientConfig) -> Result<Arc<AnalysisApi>> {
    Ok(Arc::new(
        AnalysisApi::new(config).context("Failed to build HTTP client")?,
    ))
}

pub async fn login(
    config: &ClientConfig,
    username: String,
    password: Option<String>,
) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => read_password().await?,
    };

    let auth = AuthService::new(build_api(config)?, open_session(config)?);
    auth.login(&Credentials::new(username, password)).await?;

    println!("Signed in. Token stored in {}", config.session_file.display());
    Ok(())
}

pub fn logout(config: &ClientConfig) -> Result<()> {
    open_session(config)?.sign_out()?;
    println!("Signed out.");
    Ok(())
}

pub fn status(config: &ClientConfig) -> Result<()> {
    let session = open_session(config)?;
    let state = if session.is_signed_in() {
        "signed in"
    } else {
        "not signed in"
    };

    println!("Session:      {state}");
    println!("Session file: {}", config.session_file.display());
    println!("API URL:      {}", config.api_url);
    println!("Stream URL:   {}", config.ws_url);
    Ok(())
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

pub async fn upload(config: &ClientConfig, files: &[PathBuf]) -> Result<()> {
    let staging = stage(files).await?;
    let chat = ChatService::new(build_api(config)?, open_session(config)?);

    chat.upload_documents(staging.files()).await?;
    println!("Uploaded {} document(s).", staging.len());
    Ok(())
}

pub async fn chat(config: &ClientConfig, files: &[PathBuf], question: Option<&str>) -> Result<()> {
    let mut chat = ChatService::new(build_api(config)?, open_session(config)?);

    if !files.is_empty() {
        let staging = stage(files).await?;
        chat.upload_documents(staging.files()).await?;
        println!("Uploaded {} document(s).", staging.len());
    }

    if let Some(question) = question {
        if let Some(reply) = chat.send(question).await {
            println!("{}", reply.text);
        }
        return Ok(());
    }

    // Interactive: one question per line until EOF or `exit`.
    let mut lines = stdin_lines();
    while let Some(line) = prompt(&mut lines, "> ").await? {
        if matches!(line.trim(), "exit" | "quit") {
            break;
        }
        if let Some(reply) = chat.send(&line).await {
            println!("{}", reply.text);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

pub async fn analyze(
    config: &ClientConfig,
    spec: WorkflowSpec,
    files: &[PathBuf],
    category: Option<&str>,
    json_output: bool,
) -> Result<()> {
    let mut staging = stage(files).await?;
    for file in staging.files() {
        tracing::info!(name = file.name(), size = %file.display_size(), "Staged document");
    }

    let workflow =
        AnalysisWorkflow::from_config(config, spec).context("Failed to build HTTP client")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, cancelling analysis");
                cancel.cancel();
            }
        });
    }

    let printer = tokio::spawn(print_progress(workflow.subscribe()));
    let outcome = workflow.run(&mut staging, &cancel).await;
    let job = workflow.snapshot().await;

    // Dropping the workflow closes the event channel and ends the printer.
    drop(workflow);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Progress printer failed");
    }

    if let Some(job) = &job {
        eprintln!("{}", render_job_status(job));
    }

    let result = outcome?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    print!("{}", render_report(&result));
    if let Some(category) = category {
        println!("\nIssues ({category}):");
        print!("{}", render_issues(&result.issues_in_category(category)));
    }
    Ok(())
}

async fn print_progress(mut rx: tokio::sync::broadcast::Receiver<WorkflowEvent>) {
    loop {
        match rx.recv().await {
            Ok(WorkflowEvent::ProgressUpdated {
                message,
                agent,
                percent,
                ..
            }) => eprintln!("{}", render_progress_line(percent, &agent, &message)),
            Ok(WorkflowEvent::StreamDisconnected { job_id }) => {
                tracing::debug!(job_id = %job_id, "Progress stream ended");
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Progress display fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn stage(paths: &[PathBuf]) -> Result<StagingBuffer> {
    let mut staging = StagingBuffer::new();
    for path in paths {
        staging.add([StagedFile::from_path(path).await?]);
    }
    Ok(staging)
}

fn stdin_lines() -> Lines<BufReader<Stdin>> {
    BufReader::new(tokio::io::stdin()).lines()
}

/// Prompt for the password on the terminal without echoing it.
async fn read_password() -> Result<String> {
    tokio::task::spawn_blocking(|| rpassword::prompt_password("Password: "))
        .await
        .context("Password prompt task failed")?
        .context("Failed to read password")
}

/// Print `label` and read one line from stdin. `None` on EOF.
async fn prompt(lines: &mut Lines<BufReader<Stdin>>, label: &str) -> Result<Option<String>> {
    print!("{label}");
    std::io::stdout().flush()?;

    lines.next_line().await.context("Failed to read from stdin")
}
