use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use searchprime::output;
use searchprime::query::build_priming_sql;
use searchprime::service::{CachePolicy, MemoryIndex, SearchBackend, ServiceRegistry};
use searchprime::utils::progress::crawl_spinner;
use searchprime::utils::{AppConfig, KnownFolder, resolve_known_folder};
use searchprime::{FileSearchProvider, SearchOptions};
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "searchprime")]
#[command(about = "Search-as-you-type over a file index with primed, reusable scope queries")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Args, Clone, Default)]
struct ScopeArgs {
    /// Folder to search in (repeatable; none means everything)
    #[arg(short = 'i', long = "include")]
    include: Vec<String>,

    /// Folder to leave out (repeatable)
    #[arg(short = 'x', long = "exclude")]
    exclude: Vec<String>,

    /// Well-known folder to search in (repeatable)
    #[arg(long, value_enum)]
    known: Vec<KnownFolder>,
}

impl ScopeArgs {
    /// Included folders with known folders resolved and appended
    fn included(&self) -> Result<Vec<String>> {
        let mut included = self.include.clone();
        for folder in &self.known {
            let path = resolve_known_folder(*folder)?;
            included.push(path.to_string_lossy().into_owned());
        }
        Ok(included)
    }
}

#[derive(Args, Clone, Default)]
struct BackendArgs {
    /// Crawl these roots in process instead of querying the daemon
    #[arg(long)]
    local: Vec<PathBuf>,

    /// Daemon socket path
    #[arg(long)]
    socket: Option<PathBuf>,
}

#[derive(Args, Clone, Default)]
struct DisplayArgs {
    /// Stop after this many results
    #[arg(short = 'n', long)]
    max_results: Option<usize>,

    /// Show size and name next to each path
    #[arg(short, long)]
    long: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the priming query, and the derived query for TEXT (which needs a backend)
    Sql {
        text: Option<String>,

        #[command(flatten)]
        scope: ScopeArgs,

        #[command(flatten)]
        backend: BackendArgs,
    },
    /// Prime the scope and run one search
    Search {
        text: String,

        #[command(flatten)]
        scope: ScopeArgs,

        #[command(flatten)]
        backend: BackendArgs,

        #[command(flatten)]
        display: DisplayArgs,
    },
    /// Count every item in the index
    Count {
        #[command(flatten)]
        backend: BackendArgs,
    },
    /// Check whether a path is inside the index crawl scope
    Scope {
        path: String,

        #[command(flatten)]
        backend: BackendArgs,
    },
    /// Prime once, then search for every line read from stdin
    Repl {
        #[command(flatten)]
        scope: ScopeArgs,

        #[command(flatten)]
        backend: BackendArgs,

        #[command(flatten)]
        display: DisplayArgs,
    },
    /// Manage the index server daemon
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
}

#[derive(Subcommand)]
enum DaemonAction {
    /// Crawl and serve in the foreground (Ctrl+C to stop)
    Run {
        /// Roots to crawl (defaults to the configured roots)
        roots: Vec<PathBuf>,
    },
    /// Stop the running daemon
    Stop,
    /// Check daemon status
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("using default configuration: {:#}", e);
        AppConfig::default()
    });
    let color = !cli.no_color;

    match cli.command {
        Commands::Sql {
            text,
            scope,
            backend,
        } => {
            let included = scope.included()?;
            let mut out = output::stdout(color);
            output::print_sql(&mut out, "priming", build_priming_sql(&included, &scope.exclude).as_str())?;

            if let Some(text) = text {
                let mut provider = open_provider(&backend, &config)?;
                provider.prepare(&included, &scope.exclude)?;
                let derived = provider.session().derive_search_query(&text)?;
                output::print_sql(&mut out, "derived", derived.as_str())?;
            }
        }
        Commands::Search {
            text,
            scope,
            backend,
            display,
        } => {
            let mut provider = open_provider(&backend, &config)?;
            provider.prepare(&scope.included()?, &scope.exclude)?;
            run_search(&provider, &text, &display, color)?;
        }
        Commands::Count { backend } => {
            let provider = open_provider(&backend, &config)?;
            let count = provider.count_all()?;
            output::print_count(&mut output::stdout(color), "items in index", count)?;
        }
        Commands::Scope { path, backend } => {
            let registry = open_registry(&backend, &config)?;
            let included = registry.is_path_included_in_index(&path)?;
            println!(
                "{} is {}in the crawl scope",
                path,
                if included { "" } else { "not " }
            );
        }
        Commands::Repl {
            scope,
            backend,
            display,
        } => {
            let mut provider = open_provider(&backend, &config)?;
            provider.prepare(&scope.included()?, &scope.exclude)?;
            eprintln!("primed; type a search and press enter (Ctrl+D to quit)");

            for line in std::io::stdin().lock().lines() {
                let line = line?;
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if let Err(e) = run_search(&provider, text, &display, color) {
                    eprintln!("error: {:#}", e);
                }
            }
        }
        Commands::Daemon { action } => {
            handle_daemon_command(action, &config)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run_search(provider: &FileSearchProvider, text: &str, display: &DisplayArgs, color: bool) -> Result<()> {
    let options = SearchOptions {
        max_results: display.max_results,
    };
    let results = provider.search_with_options(text, &options)?;

    let mut out = output::stdout(color);
    output::print_results(&mut out, &results, display.long)?;
    if display.long {
        output::print_count(&mut out, "results", results.len() as u64)?;
    }
    Ok(())
}

fn open_provider(backend: &BackendArgs, config: &AppConfig) -> Result<FileSearchProvider> {
    let registry = open_registry(backend, config)?;
    Ok(FileSearchProvider::from_registry(&registry, config.effective_batch_size())?)
}

fn open_registry(backend: &BackendArgs, config: &AppConfig) -> Result<ServiceRegistry> {
    let policy = if config.cache_service_handles {
        CachePolicy::cached()
    } else {
        CachePolicy::uncached()
    };
    Ok(ServiceRegistry::new(open_backend(backend)?, policy))
}

fn open_backend(backend: &BackendArgs) -> Result<Arc<dyn SearchBackend>> {
    if !backend.local.is_empty() {
        return Ok(crawl(&backend.local)?);
    }
    remote_backend(backend)
}

#[cfg(all(unix, feature = "daemon"))]
fn remote_backend(backend: &BackendArgs) -> Result<Arc<dyn SearchBackend>> {
    use searchprime::server::{RemoteBackend, get_socket_path};

    let socket = backend.socket.clone().unwrap_or_else(get_socket_path);
    if !socket.exists() {
        bail!(
            "no daemon listening on {}; start one with 'searchprime daemon run' or pass --local <root>",
            socket.display()
        );
    }
    Ok(RemoteBackend::new(socket))
}

#[cfg(not(all(unix, feature = "daemon")))]
fn remote_backend(_backend: &BackendArgs) -> Result<Arc<dyn SearchBackend>> {
    bail!("the index daemon is not available in this build; pass --local <root>")
}

/// Crawl `roots` into an in-process index behind a spinner
fn crawl(roots: &[PathBuf]) -> Result<Arc<MemoryIndex>> {
    let spinner = crawl_spinner(!std::io::stderr().is_terminal());
    let index = MemoryIndex::crawl(roots, |path| {
        spinner.inc(1);
        spinner.set_message(path.display().to_string());
    })
    .context("Failed to crawl roots")?;
    spinner.finish_and_clear();
    Ok(index)
}

#[cfg(not(all(unix, feature = "daemon")))]
fn handle_daemon_command(_action: DaemonAction, _config: &AppConfig) -> Result<()> {
    bail!("the index daemon is not available in this build")
}

#[cfg(all(unix, feature = "daemon"))]
fn handle_daemon_command(action: DaemonAction, config: &AppConfig) -> Result<()> {
    use searchprime::server::{RemoteBackend, daemon, get_socket_path, is_daemon_running};

    match action {
        DaemonAction::Run { roots } => {
            if is_daemon_running() {
                println!("Daemon is already running. Stop it first with 'searchprime daemon stop'");
                return Ok(());
            }

            let roots = if roots.is_empty() {
                config.effective_crawl_roots()
            } else {
                roots
            };
            if roots.is_empty() {
                bail!("no crawl roots: pass them on the command line or set crawl_roots in the config");
            }

            let index = crawl(&roots)?;
            println!(
                "Serving {} items on {} (Ctrl+C to stop)...",
                index.len(),
                get_socket_path().display()
            );
            daemon::run_foreground(index)?;
        }

        DaemonAction::Stop => {
            if !is_daemon_running() {
                println!("Daemon is not running");
                return Ok(());
            }

            println!("Stopping daemon...");

            // Try graceful shutdown first
            if RemoteBackend::local().shutdown().is_ok() {
                std::thread::sleep(std::time::Duration::from_millis(500));
            }

            // Force stop if still running
            if is_daemon_running() {
                daemon::stop_daemon()?;
            }

            println!("Daemon stopped");
        }

        DaemonAction::Status => {
            if !is_daemon_running() {
                println!("Daemon is not running");
                return Ok(());
            }

            match RemoteBackend::local().status() {
                Ok(status) => {
                    println!("searchprime daemon status:");
                    println!("  Uptime: {}s", status.uptime_secs);
                    println!("  Items: {}", status.items);
                    println!("  Queries served: {}", status.queries_served);
                    println!("  Open cursors: {}", status.open_cursors);
                    println!("  Connections: {}", status.connections);
                    if !status.crawl_roots.is_empty() {
                        println!("  Crawl roots:");
                        for root in &status.crawl_roots {
                            println!("    - {}", root);
                        }
                    }
                }
                Err(e) => {
                    println!("Daemon is running but not responding: {}", e);
                }
            }
        }
    }

    Ok(())
}
