/// Logging initialization.
///
/// Installs a `tracing-subscriber` registry with an env filter (`RUST_LOG` wins over the
/// default), a stderr layer, and an append-only file layer at `<data_dir>/agora.log` so logs
/// can be pulled off a device after the fact.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_logging(data_dir: &str) {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());

    let log_path = std::path::Path::new(data_dir).join("agora.log");
    let _ = std::fs::create_dir_all(data_dir);
    let file_layer = if let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_target(true),
        )
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
}

const DEFAULT_FILTER: &str = "agora_core=debug,agora_sqlite_storage=info,info";
