use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::sync::{oneshot, watch};
use tracing_subscriber::EnvFilter;

use historian::config::HistorianConfig;
use historian::github::OctocrabClient;
use historian::plan::{
    ContentServicePlanGenerator, FallbackPlanGenerator, PlanGenerator, TemplatePlanGenerator,
};
use historian::scheduler::{BatchScheduler, RunSummary};
use historian::state::{LineLevel, RunState, RunStateHandle};
use historian::{ActivityType, RunError};

#[derive(Parser)]
#[command(
    name = "historian",
    about = "Generate repository activity in rate-limited concurrent batches",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: ./historian.toml if present)
    #[arg(long, global = true, env = "HISTORIAN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a run against the repository
    Run(RunArgs),

    /// Print the plan a run would execute, as JSON
    Plan(PlanArgs),
}

// Overrides shared by both subcommands.
#[derive(Args, Debug, Default)]
struct PlanArgs {
    /// Target repository (owner/repo or github.com URL)
    #[arg(long)]
    repo: Option<String>,

    /// Primary language, used in generated titles
    #[arg(long)]
    language: Option<String>,

    /// Issues to create
    #[arg(long)]
    issues: Option<u32>,

    /// Pull requests to create
    #[arg(long)]
    prs: Option<u32>,

    /// Commits to push
    #[arg(long)]
    commits: Option<u32>,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    #[command(flatten)]
    plan: PlanArgs,

    /// GitHub token (falls back to GITHUB_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Leave pull requests open instead of merging them
    #[arg(long)]
    no_auto_merge: bool,

    /// Operations executed concurrently per chunk
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Pause between chunks, in milliseconds
    #[arg(long)]
    cooldown_ms: Option<u64>,
}

impl PlanArgs {
    fn apply(&self, config: &mut HistorianConfig) {
        if let Some(repo) = &self.repo {
            config.github.repo = repo.clone();
        }
        if let Some(language) = &self.language {
            config.plan.language = language.clone();
        }
        if let Some(issues) = self.issues {
            config.counts.issues = issues;
        }
        if let Some(prs) = self.prs {
            config.counts.prs = prs;
        }
        if let Some(commits) = self.commits {
            config.counts.commits = commits;
        }
    }
}

impl RunArgs {
    fn apply(&self, config: &mut HistorianConfig) {
        self.plan.apply(config);
        if let Some(token) = &self.token {
            config.github.token = token.clone();
        }
        if self.no_auto_merge {
            config.run.auto_merge = false;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.run.chunk_size = chunk_size;
        }
        if let Some(cooldown_ms) = self.cooldown_ms {
            config.run.cooldown_ms = cooldown_ms;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match HistorianConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} {}", error_prefix(), err);
            return ExitCode::from(2);
        }
    };

    match cli.command {
        Commands::Run(args) => {
            args.apply(&mut config);
            if let Err(err) = config.validate() {
                eprintln!("{} {}", error_prefix(), err);
                return ExitCode::from(2);
            }
            run_command(&config).await
        }
        Commands::Plan(args) => {
            args.apply(&mut config);
            plan_command(&config).await
        }
    }
}

/// `error:` label for stderr, colored only when stderr is a terminal.
fn error_prefix() -> String {
    if std::io::stderr().is_terminal() {
        "error:".red().bold().to_string()
    } else {
        "error:".to_string()
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("historian=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_planner(config: &HistorianConfig) -> Arc<dyn PlanGenerator> {
    let Some(api_key) = config.plan.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
        return Arc::new(TemplatePlanGenerator::new());
    };
    match ContentServicePlanGenerator::new(api_key) {
        Ok(service) => Arc::new(FallbackPlanGenerator::new(
            service
                .with_endpoint(config.plan.endpoint.as_str())
                .with_model(config.plan.model.as_str()),
        )),
        Err(err) => {
            tracing::warn!(error = %err, "content service unavailable, using templates");
            Arc::new(TemplatePlanGenerator::new())
        }
    }
}

async fn plan_command(config: &HistorianConfig) -> ExitCode {
    let run = config.to_run_config();
    let total = run.total();
    if total == 0 {
        eprintln!("{} {}", error_prefix(), RunError::NothingRequested);
        return ExitCode::FAILURE;
    }

    let planner = build_planner(config);
    let plan = match planner.generate(&run.language, &run.repo, total).await {
        Ok(plan) => plan,
        Err(err) => {
            eprintln!("{} {}", error_prefix(), err);
            return ExitCode::FAILURE;
        }
    };
    match serde_json::to_string_pretty(&plan) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{} {}", error_prefix(), err);
            ExitCode::FAILURE
        }
    }
}

async fn run_command(config: &HistorianConfig) -> ExitCode {
    let mut client = OctocrabClient::new(config.request_timeout(), config.contributors.clone());
    if let Some(api_base) = &config.github.api_base {
        client = client.with_api_base(api_base.as_str());
    }

    let state = RunStateHandle::new();
    let scheduler =
        BatchScheduler::new(Arc::new(client), build_planner(config)).with_state(state.clone());

    let cancel = scheduler.cancel_handle();
    if let Err(err) = ctrlc::set_handler(move || {
        eprintln!("Cancelling after in-flight operations finish...");
        cancel.cancel();
    }) {
        tracing::warn!(error = %err, "could not install Ctrl-C handler");
    }

    let (done_tx, done_rx) = oneshot::channel();
    let observer = tokio::spawn(observe(state.subscribe(), done_rx, Console::new()));

    let result = scheduler.start(&config.to_run_config()).await;
    let _ = done_tx.send(());
    match observer.await {
        Ok(console) => console.finish(),
        Err(err) => tracing::warn!(error = %err, "progress observer failed"),
    }

    match result {
        Ok(summary) => {
            print_report(&state.snapshot(), &summary);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{} {}", error_prefix(), err);
            ExitCode::FAILURE
        }
    }
}

/// Progress bar plus the log lines already printed.
struct Console {
    bar: ProgressBar,
    seen: u64,
    color: bool,
}

impl Console {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        let template = "{spinner} [{bar:40.cyan/blue}] {pos}/{len} {msg}";
        let style = ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        Self {
            bar,
            seen: 0,
            color: std::io::stdout().is_terminal(),
        }
    }

    fn render(&mut self, state: &RunState) {
        for line in state.logs.since(self.seen) {
            let painted = paint(line, self.color);
            if self.bar.is_hidden() {
                println!("{}", painted);
            } else {
                self.bar.println(painted);
            }
        }
        self.seen = state.logs.appended();

        if state.total > 0 {
            self.bar.set_length(state.total as u64);
            self.bar.set_position(state.completed as u64);
            self.bar.set_message(format!("{:.0}%", state.progress));
        }
    }

    fn finish(self) {
        self.bar.finish_and_clear();
    }
}

async fn observe(
    mut rx: watch::Receiver<RunState>,
    mut done: oneshot::Receiver<()>,
    mut console: Console,
) -> Console {
    let initial = rx.borrow_and_update().clone();
    console.render(&initial);
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                console.render(&snapshot);
            }
            _ = &mut done => break,
        }
    }
    // Lines written between the last wake-up and the end of the run.
    let last = rx.borrow().clone();
    console.render(&last);
    console
}

fn paint(line: &str, color: bool) -> String {
    if !color {
        return line.to_string();
    }
    match LineLevel::of(line) {
        LineLevel::Error => line.red().to_string(),
        LineLevel::Warning => line.yellow().to_string(),
        LineLevel::Success => line.green().to_string(),
        LineLevel::Info => line.to_string(),
    }
}

fn print_report(state: &RunState, summary: &RunSummary) {
    println!();
    println!("{:<8} {:<8} {:<10} TITLE", "TYPE", "ID", "STATUS");
    for item in &state.items {
        println!(
            "{:<8} {:<8} {:<10} {}",
            item.kind.as_label(),
            item.id,
            item.status.as_str(),
            item.title
        );
    }
    println!();
    println!(
        "{} attempted, {} created, {} merged, {} failed, {} skipped",
        summary.attempted, summary.created, summary.merged, summary.failed, summary.skipped
    );
    let counts: Vec<String> = [
        ActivityType::Issue,
        ActivityType::PullRequest,
        ActivityType::Commit,
    ]
    .into_iter()
    .map(|kind| format!("{}: {}", kind, summary.stats.count_for(kind)))
    .collect();
    println!("{}", counts.join("  "));
}
