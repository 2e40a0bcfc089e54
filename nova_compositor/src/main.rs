//! Entry point of the `nova-compmgr` compositing manager.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use nova_compositor::cli::{self, Command, Options, USAGE};
use nova_compositor::runtime::{self, Exit};
use nova_compositor::stream::StreamTransport;
use nova_compositor::{backends, plugins};
use novade_compositor_core::compositor::Compositor;
use novade_core::config::{ConfigLoader, LoadedConfig};
use novade_core::error::{ConfigError, CoreError};
use novade_core::logging;
use novade_core::utils::require_existing_dir;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let options = match cli::parse(std::env::args_os().skip(1)) {
        Ok(Command::Help) => {
            println!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        Ok(Command::Version) => {
            println!("nova-compmgr {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        Ok(Command::Run(options)) => options,
        Err(e) => {
            eprintln!("nova-compmgr: {}", e);
            eprintln!("{}", USAGE);
            return ExitCode::FAILURE;
        }
    };

    let loaded = match load_config(&options) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("nova-compmgr: {}", e);
            if matches!(e, CoreError::Config(ConfigError::ReadError { .. })) {
                eprintln!("{}", USAGE);
            }
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init_logging(&loaded.config.logging, false) {
        logging::init_minimal_logging();
        warn!(error = %e, "Falling back on stderr logging");
    }
    match &loaded.source {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("No configuration file found, using defaults"),
    }

    match run(&options, &loaded) {
        Ok(Exit::Signal(signal)) => {
            info!(?signal, "Compositing manager stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("nova-compmgr: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(options: &Options) -> Result<LoadedConfig, CoreError> {
    match &options.config {
        Some(path) => ConfigLoader::load_from_path(path),
        None => ConfigLoader::load(),
    }
}

fn check_search_path(kind: &str, path: Option<&Path>) -> Result<()> {
    if let Some(path) = path {
        require_existing_dir(path).with_context(|| format!("invalid {} path {}", kind, path.display()))?;
        info!(path = %path.display(), "Using {} search path", kind);
    }
    Ok(())
}

fn run(options: &Options, loaded: &LoadedConfig) -> Result<Exit> {
    let config = &loaded.config;
    check_search_path("rendering", options.rendering_path.as_deref())?;
    check_search_path("plugins", options.plugins_path.as_deref())?;

    let backend = backends::create(&config.rendering).ok_or_else(|| {
        anyhow!(
            "unknown rendering backend '{}' (available: {})",
            config.rendering,
            backends::AVAILABLE.join(", ")
        )
    })?;
    let dispatch = plugins::load(&config.plugins)
        .with_context(|| format!("available plugins: {}", plugins::AVAILABLE.join(", ")))?;

    let socket = options
        .display_socket()
        .ok_or_else(|| anyhow!("no display given; use --display or set {}", cli::DISPLAY_ENV))?;
    let transport = StreamTransport::connect(&socket)
        .with_context(|| format!("cannot connect to display server at {}", socket.display()))?;
    let readiness = transport
        .try_clone_stream()
        .context("cannot watch the display connection")?;

    let mut compositor = Compositor::new(transport, backend, dispatch, config);
    if let Err(e) = compositor.initialize() {
        if let Err(teardown) = compositor.shutdown() {
            warn!(error = %teardown, "Teardown after failed startup was incomplete");
        }
        return Err(e).context("compositing manager failed to start");
    }

    let (compositor, result) = runtime::run(compositor, readiness);
    let teardown = compositor.shutdown();
    let exit = result.context("compositing manager stopped")?;
    teardown.context("teardown failed")?;
    Ok(exit)
}
