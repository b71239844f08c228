mod face;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use autoapply::answers::{AnswerResolver, AnswerTable};
use autoapply::brain::OpenAiAnalyzer;
use autoapply::browser::PopupQueue;
use autoapply::config::Settings;
use autoapply::hands::ChromeSession;
use autoapply::plan::{PlanSource, SharedAnalyzer};
use autoapply::sites::HandlerRegistry;
use autoapply::{Applicant, ApplicationResult, Navigator, Profile, ProgressEvent};
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agent", version, about = "Fill multi-page job applications in Chrome")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one application attempt and print the result as JSON.
    Apply {
        #[arg(long)]
        url: String,

        #[command(flatten)]
        inputs: Inputs,
    },
    /// Keep a browser open and apply to URLs posted to /apply.
    Serve {
        #[arg(long, default_value_t = 3000)]
        port: u16,

        #[command(flatten)]
        inputs: Inputs,
    },
}

#[derive(Args, Clone)]
struct Inputs {
    /// Applicant profile: a flat JSON object of strings.
    #[arg(long, env = "AUTOAPPLY_PROFILE")]
    profile: PathBuf,

    #[arg(long, env = "AUTOAPPLY_RESUME")]
    resume: Option<PathBuf>,

    /// Settings TOML.
    #[arg(long, env = "AUTOAPPLY_CONFIG")]
    config: Option<PathBuf>,

    /// Answers TOML replacing the built-in table.
    #[arg(long)]
    answers: Option<PathBuf>,
}

/// Everything an attempt needs besides the browser.
struct Engine {
    settings: Settings,
    applicant: Applicant,
    resolver: AnswerResolver,
    plans: PlanSource,
}

impl Engine {
    fn load(inputs: &Inputs) -> Result<Self> {
        let settings = Settings::load(inputs.config.as_deref()).context("loading settings")?;
        let profile = load_profile(&inputs.profile)?;

        if let Some(resume) = inputs.resume.as_deref().filter(|p| !p.is_file()) {
            anyhow::bail!("resume not found: {}", resume.display());
        }

        let table = match &inputs.answers {
            Some(path) => AnswerTable::from_file(path).context("loading answers")?,
            None => AnswerTable::defaults(),
        };
        let resolver = AnswerResolver::new(table.with_profile(&profile));

        let analyzer: Option<SharedAnalyzer> = if settings.analyzer.enabled {
            match OpenAiAnalyzer::from_env(&settings.analyzer) {
                Ok(analyzer) => Some(Box::new(analyzer)),
                Err(err) => {
                    warn!(error = %err, "AI fallback disabled");
                    None
                }
            }
        } else {
            None
        };
        let plans = PlanSource::new(HandlerRegistry::with_builtin(), analyzer);

        Ok(Self {
            settings,
            applicant: Applicant {
                profile,
                resume: inputs.resume.clone(),
            },
            resolver,
            plans,
        })
    }

    fn launch(&self) -> Result<(ChromeSession, PopupQueue)> {
        info!("launching Chrome");
        ChromeSession::launch(&self.settings.browser, self.settings.navigation.popup_poll_ms)
            .context("launching Chrome")
    }

    fn apply(
        &self,
        session: &ChromeSession,
        popups: &PopupQueue,
        url: &str,
        cancel: CancellationToken,
        events: Option<broadcast::Sender<ProgressEvent>>,
    ) -> ApplicationResult {
        let mut navigator = Navigator::new(
            session,
            &self.plans,
            &self.applicant,
            &self.resolver,
            self.settings.navigation.clone(),
            self.settings.detector.clone(),
        )
        .with_popups(popups)
        .with_cancel(cancel);
        if let Some(events) = events {
            navigator = navigator.with_events(events);
        }
        navigator.apply(url)
    }
}

fn load_profile(path: &Path) -> Result<Profile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading profile {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing profile {}", path.display()))
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autoapply=info,agent=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Apply { url, inputs } => run_apply(url, inputs).await,
        Command::Serve { port, inputs } => run_serve(port, inputs).await.map(|()| ExitCode::SUCCESS),
    }
}

async fn run_apply(url: String, inputs: Inputs) -> Result<ExitCode> {
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    // The engine holds a blocking HTTP client; build and drop it off the runtime.
    let result = tokio::task::spawn_blocking(move || -> Result<ApplicationResult> {
        let engine = Engine::load(&inputs)?;
        let (session, popups) = engine.launch()?;
        Ok(engine.apply(&session, &popups, &url, cancel, None))
    })
    .await
    .context("application worker panicked")??;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_serve(port: u16, inputs: Inputs) -> Result<()> {
    let (mut job_rx, event_tx) = face::start_server(port).await?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let handle = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let engine = Engine::load(&inputs)?;
        let (session, popups) = engine.launch()?;
        info!("waiting for jobs");

        while let Some(url) = handle.block_on(next_job(&mut job_rx, &cancel)) {
            let result = engine.apply(
                &session,
                &popups,
                &url,
                cancel.child_token(),
                Some(event_tx.clone()),
            );
            info!(status = ?result.status, %url, "attempt done");
        }
        Ok(())
    })
    .await
    .context("application worker panicked")?
}

async fn next_job(jobs: &mut mpsc::Receiver<String>, cancel: &CancellationToken) -> Option<String> {
    tokio::select! {
        job = jobs.recv() => job,
        _ = cancel.cancelled() => None,
    }
}
