use invitation::{
    auth_server::AuthServer,
    config::Config,
    cryptography::FileKeySource,
    error::{Error, StartupError},
    user_manager::UserManager,
};
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// The returned guard flushes the log file on drop, keep it until exit.
fn init_tracing(config: &Config) -> Result<Option<WorkerGuard>, Error> {
    let level = config.get_log_level()?;
    match config.log_directory.as_ref() {
        Some(log_directory) => {
            let file_appender = tracing_appender::rolling::daily(log_directory, "invitation.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_ansi(false)
                .with_writer(std::io::stdout.and(non_blocking))
                .try_init()
                .map_err(|err| StartupError::Logging(err.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_max_level(level)
                .try_init()
                .map_err(|err| StartupError::Logging(err.to_string()))?;
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load(std::env::args().nth(1).map(PathBuf::from))?;
    let _guard = init_tracing(&config)?;

    let account_store = match config.users_path.as_ref() {
        Some(users_path) => UserManager::from_file(users_path, config.min_password_length)?,
        None => {
            warn!("No users_path configured, running with an empty in-memory account store");
            UserManager::new(Vec::new(), config.min_password_length)?
        }
    };
    let key_source = FileKeySource::new(config.keys_path.to_owned());
    info!("Trusted keys are read from {}", key_source.get_path().display());

    let auth_server = AuthServer::builder::<FileKeySource, UserManager>()
        .issuer_url(config.issuer_url.to_owned())
        .key_source(Arc::new(key_source))
        .account_store(Arc::new(account_store))
        .listen_address(config.listen_address)
        .invitation_path(config.invitation_path.to_owned())
        .start_server()
        .await?;

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for shutdown signal: {}", err);
    }
    info!("Shutting down");
    auth_server.shutdown().await
}
