//! braindump - capture an in-progress coding-agent session and hand it off
//! to a different tool.
//!
//! The heavy lifting lives in braindump-core; this binary is the command
//! surface: `detect`, `list`, `capture`, `handoff`, `watch`, `resume`,
//! `info`.
//!
//! Exit codes: 0 success, 1 detection failure or bad argument, 2 listing
//! error, 3 capture or handoff error.

mod deliver;

use anyhow::{Context, Result};
use braindump_core::adapters;
use braindump_core::config::Config;
use braindump_core::handoff::{self, HandoffOptions};
use braindump_core::registry;
use braindump_core::watch::{self, WatchOptions, Watcher};
use braindump_core::Agent;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "braindump")]
#[command(about = "Hand off an in-progress AI coding session to another tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect which agents have session storage on this machine
    Detect,

    /// List discoverable sessions
    List {
        /// Source agent (detected when omitted)
        #[arg(long)]
        source: Option<Agent>,
        /// Only sessions recorded in this project directory
        #[arg(long)]
        project: Option<PathBuf>,
        /// Emit a JSON array
        #[arg(long)]
        json: bool,
        /// Emit one JSON object per line
        #[arg(long, conflicts_with = "json")]
        jsonl: bool,
    },

    /// Capture a session to .handoff/session.json
    Capture {
        #[arg(long)]
        source: Option<Agent>,
        /// Session identifier (latest when omitted)
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        project: Option<PathBuf>,
    },

    /// Build the handoff document and deliver it
    Handoff {
        #[arg(long)]
        source: Option<Agent>,
        /// Target agent id, "file", or "clipboard"
        #[arg(long, default_value = "file")]
        target: String,
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        project: Option<PathBuf>,
        /// Token budget override
        #[arg(long)]
        tokens: Option<usize>,
        /// Build everything, write nothing
        #[arg(long)]
        dry_run: bool,
        /// Skip the clipboard copy
        #[arg(long)]
        no_clipboard: bool,
        /// Launch the target tool with the resume prompt
        #[arg(long)]
        launch: bool,
        /// Output path override
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Watch agent session lists and report changes
    Watch {
        /// Comma-separated agent ids (all detected when omitted)
        #[arg(long)]
        agents: Option<String>,
        /// Poll interval in seconds
        #[arg(long)]
        interval: Option<u64>,
        #[arg(long)]
        project: Option<PathBuf>,
        /// Take one snapshot and exit
        #[arg(long)]
        once: bool,
    },

    /// Print a previously written resume document
    Resume {
        /// Path to the document (default ./.handoff/RESUME.md)
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show registry metadata for all supported agents
    Info,
}

fn failure_code(command: &Commands) -> i32 {
    match command {
        Commands::Detect | Commands::Info => 1,
        Commands::List { .. } | Commands::Watch { .. } => 2,
        Commands::Capture { .. } | Commands::Handoff { .. } | Commands::Resume { .. } => 3,
    }
}

fn main() {
    // clap's own exit path would report usage errors with its code 2; the
    // contract here is 1 for any bad argument, 0 for --help/--version.
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(if e.use_stderr() { 1 } else { 0 });
    });

    let config = Config::load().unwrap_or_default();
    // Logging goes to the XDG state file; stdout belongs to command output.
    let _log_guard = braindump_core::logging::init(&config.logging).ok();

    let code = match run(&cli.command, &config) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {:#}", e);
            failure_code(&cli.command)
        }
    };
    std::process::exit(code);
}

fn run(command: &Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Detect => cmd_detect(config),
        Commands::List {
            source,
            project,
            json,
            jsonl,
        } => cmd_list(config, *source, project.as_deref(), *json, *jsonl),
        Commands::Capture {
            source,
            session,
            project,
        } => cmd_capture(config, *source, session.as_deref(), project.clone()),
        Commands::Handoff {
            source,
            target,
            session,
            project,
            tokens,
            dry_run,
            no_clipboard,
            launch,
            output,
        } => cmd_handoff(config, HandoffArgs {
            source: *source,
            target: target.clone(),
            session: session.clone(),
            project: project.clone(),
            tokens: *tokens,
            dry_run: *dry_run,
            no_clipboard: *no_clipboard,
            launch: *launch,
            output: output.clone(),
        }),
        Commands::Watch {
            agents,
            interval,
            project,
            once,
        } => cmd_watch(config, agents.as_deref(), *interval, project.clone(), *once),
        Commands::Resume { file } => cmd_resume(file.clone()),
        Commands::Info => cmd_info(config),
    }
}

fn cmd_detect(config: &Config) -> Result<()> {
    let detected = adapters::detect_agents(&config.agents);
    if detected.is_empty() {
        anyhow::bail!(
            "no supported agent session storage found; \
             expected one of: {}",
            Agent::ALL.map(|a| a.as_str()).join(", ")
        );
    }
    println!("Detected {} agent(s):", detected.len());
    for agent in detected {
        println!("  - {} ({})", agent, agent.display_name());
    }
    Ok(())
}

fn cmd_list(
    config: &Config,
    source: Option<Agent>,
    project: Option<&std::path::Path>,
    json: bool,
    jsonl: bool,
) -> Result<()> {
    let adapter = handoff::resolve_adapter(source, &config.agents)
        .context("failed to resolve source agent")?;
    let sessions = adapter
        .list_sessions(project)
        .with_context(|| format!("failed to list {} sessions", adapter.agent()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }
    if jsonl {
        for session in &sessions {
            println!("{}", serde_json::to_string(session)?);
        }
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No sessions found for {}.", adapter.agent());
        return Ok(());
    }
    println!("{} session(s) for {}:", sessions.len(), adapter.agent());
    for session in &sessions {
        let when = session
            .last_active_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let count = session
            .message_count
            .map(|c| format!("{} msgs", c))
            .unwrap_or_else(|| "? msgs".to_string());
        println!("  {}  {}  {}", session.id, when, count);
        if let Some(ref preview) = session.preview {
            println!("      {}", preview);
        }
    }
    Ok(())
}

fn cmd_capture(
    config: &Config,
    source: Option<Agent>,
    session: Option<&str>,
    project: Option<PathBuf>,
) -> Result<()> {
    let captured =
        handoff::capture_session(source, session, project.as_deref(), &config.agents)
            .context("capture failed")?;
    let path = handoff::write_session_json(&captured).context("failed to write session.json")?;

    println!("Captured {} session {}", captured.source, captured.session_id);
    println!(
        "  {} messages, ~{} tokens, {} file change(s)",
        captured.conversation.message_count,
        captured.conversation.estimated_tokens,
        captured.file_changes.len()
    );
    println!("  -> {}", path.display());
    Ok(())
}

struct HandoffArgs {
    source: Option<Agent>,
    target: String,
    session: Option<String>,
    project: Option<PathBuf>,
    tokens: Option<usize>,
    dry_run: bool,
    no_clipboard: bool,
    launch: bool,
    output: Option<PathBuf>,
}

fn cmd_handoff(config: &Config, args: HandoffArgs) -> Result<()> {
    let report = handoff::run(HandoffOptions {
        source: args.source,
        target: args.target.clone(),
        session_id: args.session,
        project: args.project,
        token_budget: args.tokens,
        output: args.output,
        dry_run: args.dry_run,
        overrides: config.agents.clone(),
    })
    .context("handoff failed")?;

    println!(
        "Handoff for {} session {} -> {}",
        report.session.source, report.session.session_id, args.target
    );
    println!(
        "  layers: {} included, {} dropped ({} / {} tokens)",
        report.included_layers.len(),
        report.dropped_layers.len(),
        report.total_tokens,
        report.budget
    );
    if !report.dropped_layers.is_empty() {
        println!("  dropped: {}", report.dropped_layers.join(", "));
    }
    if report.written {
        println!("  -> {}", report.output_path.display());
    } else {
        println!("  (dry run, nothing written)");
    }

    let wants_clipboard = !args.no_clipboard && !args.dry_run;
    if wants_clipboard {
        match deliver::copy_to_clipboard(&report.prompt) {
            Ok(()) => println!("  copied to clipboard"),
            Err(e) => {
                // clipboard loss never fails the pipeline
                eprintln!("warning: clipboard copy failed: {}", e);
                tracing::warn!(error = %e, "clipboard copy failed");
            }
        }
    }

    if args.launch && !args.dry_run {
        let prompt_text =
            braindump_core::prompt::delivery_prompt(&report.prompt, &report.output_path);
        deliver::launch_target(&args.target, &prompt_text, &report.session.project.path)
            .context("launch failed")?;
    }

    Ok(())
}

fn parse_agent_csv(csv: &str) -> Result<Vec<Agent>> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Agent>()
                .map_err(|e| anyhow::anyhow!("bad --agents entry: {}", e))
        })
        .collect()
}

fn cmd_watch(
    config: &Config,
    agents: Option<&str>,
    interval: Option<u64>,
    project: Option<PathBuf>,
    once: bool,
) -> Result<()> {
    let options = WatchOptions {
        agents: agents.map(parse_agent_csv).transpose()?,
        interval: interval
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_millis(config.watch.interval_ms)),
        project,
        overrides: config.agents.clone(),
    };

    if once {
        let state = watch::take_snapshot(&options);
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    let mut watcher = Watcher::start(options, |event| {
        let stamp = event.timestamp.format("%H:%M:%S");
        let count = event
            .message_count
            .map(|c| format!(" ({} msgs)", c))
            .unwrap_or_default();
        let kind = match event.kind {
            watch::WatchEventKind::NewSession => "new-session",
            watch::WatchEventKind::SessionUpdate => "session-update",
            watch::WatchEventKind::RateLimit => "rate-limit",
        };
        println!("[{}] {} {} {}{}", stamp, kind, event.agent, event.session_id, count);
        if let Some(ref details) = event.details {
            println!("          {}", details);
        }
    })
    .context("failed to start watcher")?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    println!("Watching (Ctrl+C to stop)...");
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }
    watcher.stop();
    Ok(())
}

fn cmd_resume(file: Option<PathBuf>) -> Result<()> {
    let path = file.unwrap_or_else(|| {
        PathBuf::from(".")
            .join(handoff::HANDOFF_DIR)
            .join(handoff::RESUME_FILE)
    });
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    print!("{}", content);
    Ok(())
}

fn cmd_info(config: &Config) -> Result<()> {
    println!("Supported agents:");
    for spec in registry::all_specs() {
        let adapter = adapters::adapter_for_with_overrides(spec.agent, &config.agents);
        let detected = if adapter.detect() { "detected" } else { "not found" };
        let root = config
            .agents
            .path_for(spec.agent)
            .cloned()
            .or_else(|| registry::storage_root(spec.agent, registry::Platform::current()))
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "  {:<12} {:<20} {}  ctx {} / budget {}",
            spec.agent.as_str(),
            spec.display_name,
            detected,
            spec.context_window,
            spec.usable_tokens
        );
        println!("               storage: {}", root);
        println!("               memory:  {}", spec.memory_files.join(", "));
    }
    Ok(())
}
