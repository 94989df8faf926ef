use std::net::SocketAddr;

use color_eyre::Result;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use nowplaying::config::Config;
use nowplaying::logging::{self, DiagnosticLog};
use nowplaying::server::{self, Router, Templates};
use nowplaying::spotify::api::Spotify;
use nowplaying::spotify::{CredentialStore, TokenRefresher};

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(err) => {
                log::warn!("failed to listen for SIGTERM: {err}");
                let _ = ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    logging::init();

    let config = Config::load();

    // Credential problems are fatal: never serve without a valid set
    let refresher = TokenRefresher::load(
        CredentialStore::new(&config.credentials),
        DiagnosticLog::new(&config.log_file),
        config.refresher(),
    )?;

    let port = refresher.credentials().port;
    let router = Router::new(
        refresher.handle(),
        Spotify::new(&config.api_url, config.timeout())?,
        Templates::new(&config.templates),
    );

    let listener = TcpListener::bind(SocketAddr::new(config.host, port)).await?;
    refresher.start();
    log::info!("🌍 What I Am Playing web server running on port {port}!");

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(server::serve(listener, router, shutdown.clone()));

    shutdown_signal().await;
    log::info!("Stopping server...");
    shutdown.cancel();
    server.await??;
    refresher.stop().await;
    log::info!("Bye!");
    Ok(())
}
