use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use vision_pilot::agent::{CancelToken, LoopSettings, TaskController};
use vision_pilot::capture::{ScreenCapture, XcapCapture};
use vision_pilot::config::Config;
use vision_pilot::executor::{ActionExecutor, ExecutorSettings, PromptConfirmer};
use vision_pilot::input::EnigoDriver;
use vision_pilot::logging;
use vision_pilot::protocol::suggester::GroqSuggester;

const EXIT_COMMANDS: [&str; 3] = ["exit", "quit", "q"];

/// Desktop automation driven by a vision-language model.
#[derive(Parser, Debug)]
#[command(
    name = "vision-pilot",
    version,
    after_help = "Examples:\n  vision-pilot --task \"Open Firefox and search for Groq AI\"\n  vision-pilot --interactive\n  vision-pilot --verbose --task \"Create a new text file\"\n\nEnvironment:\n  GROQ_API_KEY    vision API key (required)"
)]
struct Cli {
    /// Run a single task and exit (0 on success, 1 otherwise)
    #[arg(short, long)]
    task: Option<String>,

    /// Read tasks from stdin until `exit`
    #[arg(short, long)]
    interactive: bool,

    /// Debug logging and per-step screenshots
    #[arg(short, long)]
    verbose: bool,

    /// Check configuration, screen capture and input, then exit
    #[arg(long)]
    test: bool,

    /// YAML config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", "❌ Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    dotenv::dotenv().ok();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.verbose {
        config.screenshot.save_debug = true;
    }
    let _guard = logging::init(&config.logging.level, cli.verbose, &config.logging.file);

    print_banner(&config);

    if let Err(e) = config.validate() {
        error!("invalid configuration: {}", e);
        eprintln!("{} {}", "❌ Configuration error:".red().bold(), e);
        return Ok(ExitCode::FAILURE);
    }

    if cli.test {
        return self_check(&config);
    }

    if cli.task.is_none() && !cli.interactive {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(ExitCode::FAILURE);
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("Failed to install Ctrl-C handler")?;

    let mut controller = build_controller(&config, cancel.clone())?;

    if let Some(task) = cli.task {
        let report = controller.run_task(&task);
        return Ok(if report.succeeded() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    interactive(&mut controller, &cancel)?;
    Ok(ExitCode::SUCCESS)
}

fn print_banner(config: &Config) {
    let rule = "=".repeat(70);
    println!("\n{}", rule);
    println!("{}", "🤖 VISION PILOT - DESKTOP CONTROL".bold());
    println!("{}", rule);
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Model: {}", config.api.model);
    println!("{}\n", rule);
}

fn build_controller(config: &Config, cancel: CancelToken) -> Result<TaskController> {
    let capture = XcapCapture::new(&config.screenshot);
    let suggester = GroqSuggester::from_config(config).context("Failed to create API client")?;
    let driver = EnigoDriver::new(&config.input).context("Failed to initialise input driver")?;
    let confirmer = PromptConfirmer::stdin(cancel.clone());
    let executor = ActionExecutor::new(
        Box::new(driver),
        Box::new(confirmer),
        ExecutorSettings::from_config(config),
    )
    .context("Failed to read screen size")?;

    Ok(TaskController::new(
        Box::new(capture),
        Box::new(suggester),
        executor,
        config.validation_policy(),
        LoopSettings::from_config(config),
        cancel,
    ))
}

fn interactive(controller: &mut TaskController, cancel: &CancelToken) -> Result<()> {
    let rule = "=".repeat(70);
    println!("\n{}", rule);
    println!("{}", "🎮 INTERACTIVE MODE".bold());
    println!("{}", rule);
    println!("Enter tasks to execute.");
    println!("Example: 'Open Firefox and search for Groq AI'");
    println!("Commands: 'exit' or 'quit' to leave");
    println!("{}\n", rule);

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("📝 Task: ");
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 || cancel.is_cancelled() {
            println!("\n👋 Goodbye!");
            break;
        }

        let task = line.trim();
        if task.is_empty() {
            continue;
        }
        if EXIT_COMMANDS.contains(&task.to_lowercase().as_str()) {
            println!("👋 Goodbye!");
            break;
        }

        controller.run_task(task);
        cancel.reset();
    }
    Ok(())
}

fn self_check(config: &Config) -> Result<ExitCode> {
    println!("{}", "🧪 Self-check".bold());
    println!("{}", "-".repeat(70));
    let mut healthy = true;

    let summary = config.summary();
    println!(
        "✓ Config: model {}, safety {}, max steps {}, screenshot interval {:.1}s",
        summary.model,
        if summary.safety_enabled { "on" } else { "off" },
        summary.max_steps,
        summary.screenshot_interval_secs
    );

    let mut capture = XcapCapture::new(&config.screenshot);
    match capture.screen_size() {
        Ok((w, h)) => println!("✓ Screen: {}x{}", w, h),
        Err(e) => {
            healthy = false;
            println!("{} {}", "✗ Screen:".red(), e);
        }
    }
    match capture.capture_and_encode() {
        Ok(image) => println!("✓ Screenshot: {}x{} ({} bytes)", image.width, image.height, image.len()),
        Err(e) => {
            healthy = false;
            println!("{} {}", "✗ Screenshot:".red(), e);
        }
    }

    let suggester = GroqSuggester::from_config(config).context("Failed to create API client")?;
    println!("✓ Vision API: {} (key configured: {})", suggester.model(), suggester.is_configured());

    match EnigoDriver::new(&config.input).and_then(|driver| {
        ActionExecutor::new(
            Box::new(driver),
            Box::new(PromptConfirmer::stdin(CancelToken::new())),
            ExecutorSettings::from_config(config),
        )
    }) {
        Ok(executor) => {
            let stats = executor.stats();
            println!(
                "✓ Action executor: {}x{} (fail-safe {})",
                stats.screen_size.0,
                stats.screen_size.1,
                if stats.failsafe_enabled { "on" } else { "off" }
            );
            if let Ok((x, y)) = executor.mouse_position() {
                println!("✓ Mouse position: ({}, {})", x, y);
            }
        }
        Err(e) => {
            healthy = false;
            println!("{} {}", "✗ Action executor:".red(), e);
        }
    }

    println!("{}", "-".repeat(70));
    if healthy {
        info!("self-check passed");
        println!("{}\n", "✅ All checks passed!".green());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{}\n", "❌ Some checks failed".red());
        Ok(ExitCode::FAILURE)
    }
}
