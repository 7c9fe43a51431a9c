use clap::Parser;
use clap::error::ErrorKind;
use tracing::info;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ccwatch::app;
use ccwatch::options::Args;

fn default_log_path() -> std::path::PathBuf {
    dirs_or_tmp().join("ccwatch.log")
}

fn dirs_or_tmp() -> std::path::PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        let dir = std::path::PathBuf::from(home).join(".ccwatch");
        if std::fs::create_dir_all(&dir).is_ok() {
            return dir;
        }
    }
    std::env::temp_dir()
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) => {
            let code = match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = error.print();
            std::process::exit(code);
        }
    };

    // Diagnostics keep their colors even through the worker pipes; the
    // parent's stderr is the only terminal that matters.
    colored::control::set_override(!args.plain);

    // Keep stderr clean for diagnostics; the file log carries the detail.
    let stderr_filter = if args.verbose {
        EnvFilter::new("ccwatch=info")
    } else {
        EnvFilter::new("ccwatch=warn")
    };
    let file_filter = if args.verbose {
        EnvFilter::new("ccwatch=debug")
    } else {
        EnvFilter::new("ccwatch=info")
    };

    let log_path = args.log_file.clone().unwrap_or_else(default_log_path);
    let file_appender = tracing_appender::rolling::never(
        log_path.parent().unwrap_or(std::path::Path::new(".")),
        log_path
            .file_name()
            .unwrap_or(std::ffi::OsStr::new("ccwatch.log")),
    );

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(false)
        .with_filter(file_filter);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_filter(stderr_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .init();

    if args.worker.is_none() {
        info!("Starting ccwatch v{}", env!("CARGO_PKG_VERSION"));
        info!("Log file: {}", log_path.display());
    }

    if let Err(error) = app::run(&args) {
        eprintln!("ccwatch: {error}");
        std::process::exit(error.exit_code());
    }
}
