// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! newfiles: AI content for new empty files
//!
//! Watches a directory and fills newly created empty files with content
//! generated by a language or image model, chosen by file extension.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use newfiles::config::{Settings, SettingsOverride};
use newfiles::generator::{ContentSynthesizer, GenerationBackend};
use newfiles::logging;
use newfiles::openai::OpenAiClient;
use newfiles::processor::{FileProcessor, ProcessOutcome};
use newfiles::watcher::{FileWatcher, WatchHandler, WatchPool};
use newfiles::{NewfilesError, Result};

const DEFAULT_TEXT_PROMPT: &str = "\
You are writing the initial content of a new file named {filename}.
Produce complete, useful content appropriate for a .{extension} file.
Return only the file content, without commentary or code fences.
";

const DEFAULT_IMAGE_PROMPT: &str = "\
Create an image that fits a file named {filename}.
Interpret the words in the name as the subject of the picture.
";

/// newfiles CLI - AI content for new empty files
#[derive(Parser, Debug)]
#[command(name = "newfiles")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Fill new empty files with AI-generated content", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config/config.json", global = true)]
    config: PathBuf,

    /// Directory to monitor (overrides config)
    #[arg(short, long, global = true)]
    directory: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the directory for new files and fill them
    Watch {
        /// Settle delay in seconds (overrides config)
        #[arg(long)]
        delay: Option<f64>,

        /// Only watch the top-level directory
        #[arg(long)]
        no_recursive: bool,
    },

    /// Generate content for a single existing file
    Process {
        /// File to fill
        path: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Write a starter configuration and default prompts
    Init {
        /// Directory to initialize (default: current)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing files
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Validate configuration and referenced paths
    Validate,

    /// Write a configuration file with every default filled in
    Generate {
        /// Where to write it (default: the --config path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Force overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    // these commands write config instead of reading it
    let writes_config = matches!(
        &cli.command,
        Some(Commands::Init { .. }) | Some(Commands::Config { action: ConfigCommands::Generate { .. } })
    );
    if writes_config {
        if let Err(e) = logging::init(level, None) {
            eprintln!("Error: failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
        return exit_code(match &cli.command {
            Some(Commands::Init { dir, force }) => run_init(dir.clone(), *force),
            Some(Commands::Config { action: ConfigCommands::Generate { output, force } }) => {
                run_config_generate(output.as_deref().unwrap_or(&cli.config), *force)
            }
            _ => Ok(()),
        });
    }

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = match logging::init(level, settings.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Some(Commands::Watch { delay, no_recursive }) => run_watch(settings, delay, no_recursive).await,
        Some(Commands::Process { path }) => run_process(settings, path).await,
        Some(Commands::Config { action }) => run_config_command(settings, action, &cli.config),
        Some(Commands::Init { .. }) => Ok(()),
        None => run_watch(settings, None, false).await,
    };

    exit_code(result)
}

fn exit_code(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Load the config file and apply the directory override
fn load_settings(cli: &Cli) -> Result<Settings> {
    let settings = Settings::load(&cli.config)?;
    match &cli.directory {
        Some(dir) => settings.with_override(SettingsOverride::MonitoredDirectory(dir.clone())),
        None => Ok(settings),
    }
}

fn build_processor(settings: Arc<Settings>) -> Result<FileProcessor> {
    let backend: Arc<dyn GenerationBackend> = Arc::new(OpenAiClient::from_env(&settings.generation)?);
    let synthesizer = ContentSynthesizer::from_settings(backend, &settings);
    Ok(FileProcessor::new(settings, synthesizer))
}

/// Run the watch mode (main event loop)
async fn run_watch(settings: Settings, delay: Option<f64>, no_recursive: bool) -> Result<()> {
    let mut settings = settings;
    if let Some(delay) = delay {
        settings = settings.with_override(SettingsOverride::Delay(delay))?;
    }
    if no_recursive {
        settings = settings.with_override(SettingsOverride::MonitorSubdirectories(false))?;
    }

    let directory = settings.monitored_directory.clone();
    if !directory.is_dir() {
        return Err(NewfilesError::MonitoredDirectoryMissing(directory));
    }

    let settings = Arc::new(settings);
    let processor = build_processor(Arc::clone(&settings))?;

    info!(
        "Settle delay {:?}, {} workers, {} extension mappings",
        settings.settle_delay(),
        settings.workers,
        settings.extension_settings.len()
    );

    let pool = WatchPool::spawn(WatchHandler::new(processor), settings.workers, settings.queue_capacity);

    let mut watcher = FileWatcher::new()?;
    watcher.watch(&directory, settings.monitor_subdirectories)?;

    // Setup graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = terminate => info!("Received SIGTERM, shutting down..."),
        }

        let _ = shutdown_tx.send(true);
    });

    info!("Monitoring directory: {:?}", directory);
    info!("Press Ctrl+C to stop.");

    // Main event loop
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let next = tokio::task::block_in_place(|| watcher.next_event(Duration::from_millis(100)));
        match next {
            Some(Ok(event)) => {
                pool.submit(event).await;
            }
            Some(Err(e)) => {
                warn!("Watch error: {}", e);
            }
            None => {}
        }
    }

    watcher.unwatch()?;
    info!("Waiting for queued files to finish...");
    pool.shutdown().await;

    info!("newfiles stopped.");
    Ok(())
}

/// Fill a single file once
async fn run_process(settings: Settings, path: PathBuf) -> Result<()> {
    let processor = build_processor(Arc::new(settings))?;

    match processor.process(&path).await {
        ProcessOutcome::Written { kind, bytes } => {
            println!("{}: wrote {} bytes ({:?})", path.display(), bytes, kind);
            Ok(())
        }
        ProcessOutcome::Failed { reason } => Err(NewfilesError::ProcessingFailed { path, reason }),
    }
}

/// Run config commands
fn run_config_command(settings: Settings, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&settings)?;
            println!("{}", json);
        }
        ConfigCommands::Validate => {
            println!("Configuration at {:?} is valid", config_path);
            println!("  Monitored directory: {:?}", settings.monitored_directory);
            println!("  Delay: {}s", settings.delay);
            println!("  Recursive: {}", settings.monitor_subdirectories);

            let mut prompts = vec![
                settings.default_text_prompt_file.clone(),
                settings.default_image_prompt_file.clone(),
            ];
            let mut extensions: Vec<_> = settings.extension_settings.iter().collect();
            extensions.sort_by(|a, b| a.0.cmp(b.0));
            for (ext, cfg) in extensions {
                println!("  .{} -> {} ({:?})", ext, cfg.model, cfg.prompt_file);
                prompts.push(cfg.prompt_file.clone());
            }

            for prompt in prompts.iter().filter(|p| !p.is_file()) {
                warn!("Prompt file not found: {:?}", prompt);
            }

            if !settings.monitored_directory.is_dir() {
                return Err(NewfilesError::MonitoredDirectoryMissing(settings.monitored_directory));
            }
        }
        ConfigCommands::Generate { .. } => {}
    }

    Ok(())
}

/// Write the default configuration to `output`
fn run_config_generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(NewfilesError::ConfigParse(format!(
            "{} already exists. Use --force to overwrite",
            output.display()
        )));
    }

    Settings::default().save(output)?;
    println!("Default configuration written to {:?}", output);
    Ok(())
}

/// Initialize a new newfiles setup
fn run_init(dir: Option<PathBuf>, force: bool) -> Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("config").join("config.json");

    if config_path.exists() && !force {
        return Err(NewfilesError::ConfigParse(
            "config/config.json already exists. Use --force to overwrite".to_string(),
        ));
    }

    let settings = Settings::default();
    settings.save(&config_path)?;

    let prompts = [
        (target.join(&settings.default_text_prompt_file), DEFAULT_TEXT_PROMPT),
        (target.join(&settings.default_image_prompt_file), DEFAULT_IMAGE_PROMPT),
    ];
    for (path, body) in prompts {
        if path.exists() && !force {
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, body)?;
    }

    println!("newfiles initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - config/config.json");
    println!("  - {}", settings.default_text_prompt_file.display());
    println!("  - {}", settings.default_image_prompt_file.display());
    println!("\nNext steps:");
    println!("  1. Export {}", settings.generation.api_key_env);
    println!("  2. Start watching: newfiles watch --directory <dir>");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["newfiles"]).unwrap();
        assert!(!cli.verbose);
        assert_eq!(cli.config, PathBuf::from("config/config.json"));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_watch_command() {
        let cli = Cli::try_parse_from([
            "newfiles", "watch", "--delay", "1.5", "--directory", "/tmp/test"
        ]).unwrap();

        assert_eq!(cli.directory, Some(PathBuf::from("/tmp/test")));
        match cli.command {
            Some(Commands::Watch { delay, no_recursive }) => {
                assert_eq!(delay, Some(1.5));
                assert!(!no_recursive);
            }
            _ => panic!("Expected Watch command"),
        }
    }

    #[test]
    fn test_cli_process_command() {
        let cli = Cli::try_parse_from([
            "newfiles", "--config", "other.json", "process", "/tmp/note.txt"
        ]).unwrap();

        assert_eq!(cli.config, PathBuf::from("other.json"));
        match cli.command {
            Some(Commands::Process { path }) => assert_eq!(path, PathBuf::from("/tmp/note.txt")),
            _ => panic!("Expected Process command"),
        }
    }

    #[test]
    fn test_cli_config_generate_command() {
        let cli = Cli::try_parse_from([
            "newfiles", "config", "generate", "--output", "/tmp/generated.json"
        ]).unwrap();

        match cli.command {
            Some(Commands::Config { action: ConfigCommands::Generate { output, force } }) => {
                assert_eq!(output, Some(PathBuf::from("/tmp/generated.json")));
                assert!(!force);
            }
            _ => panic!("Expected Config Generate command"),
        }
    }

    #[test]
    fn test_config_generate_writes_loadable_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("nested").join("config.json");

        run_config_generate(&output, false).unwrap();
        let loaded = Settings::load(&output).unwrap();
        assert_eq!(loaded, Settings::default());

        assert!(run_config_generate(&output, false).is_err());
        assert!(run_config_generate(&output, true).is_ok());
    }

    #[test]
    fn test_load_settings_applies_directory_override() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = dir.path().join("config.json");
        std::fs::write(&config, r#"{ "monitored_directory": "/original" }"#).unwrap();

        let cli = Cli::try_parse_from([
            "newfiles", "--config", config.to_str().unwrap(), "--directory", "/override"
        ]).unwrap();

        let settings = load_settings(&cli).unwrap();
        assert_eq!(settings.monitored_directory, PathBuf::from("/override"));
    }

    #[test]
    fn test_init_writes_config_and_prompts() {
        let dir = tempfile::TempDir::new().unwrap();
        run_init(Some(dir.path().to_path_buf()), false).unwrap();

        assert!(dir.path().join("config/config.json").is_file());
        let text = std::fs::read_to_string(dir.path().join("prompts/default_text.md")).unwrap();
        assert!(text.contains("{filename}"));
        assert!(run_init(Some(dir.path().to_path_buf()), false).is_err());
    }
}
