//! Server (spec.md §4.G): wires the Group Registry, Large-Message Store
//! and Router behind the Transport Listener, owns `start`/`stop`.
//!
//! TLS setup (`build_tls_acceptor`) follows the teacher's
//! `Server::build_tls_acceptor` almost verbatim (rustls-pemfile cert/key
//! loading, `with_no_client_auth`). Serving an axum `Router` over a TLS
//! stream needs one extra step the teacher's raw-IRC-over-TLS code didn't:
//! a `hyper` HTTP/1 connection driver per accepted stream, since
//! `axum::serve` only runs over a bare `TcpListener`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;

use crate::config::ServerConfig;
use crate::registry::GroupRegistry;
use crate::router::Router as FrameRouter;
use crate::slot::LargeMessageStore;
use crate::web::{build_router, AppState};

pub struct Server {
    config: ServerConfig,
    registry: Arc<GroupRegistry>,
    store: Arc<LargeMessageStore>,
    router: Arc<FrameRouter>,
}

/// A bound, running server. Dropping this without calling [`ServerHandle::stop`]
/// leaves the accept loop and reaper task running in the background.
pub struct ServerHandle {
    pub addr: SocketAddr,
    accept_task: JoinHandle<Result<()>>,
    reaper_task: JoinHandle<()>,
    registry: Arc<GroupRegistry>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(GroupRegistry::new());
        let store = Arc::new(LargeMessageStore::new());
        let router = Arc::new(FrameRouter::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            config.max_payload,
        ));
        Self {
            config,
            registry,
            store,
            router,
        }
    }

    fn app_state(&self) -> Arc<AppState> {
        Arc::new(AppState {
            config: self.config.clone(),
            registry: Arc::clone(&self.registry),
            store: Arc::clone(&self.store),
            router: Arc::clone(&self.router),
        })
    }

    fn build_tls_acceptor(&self) -> Result<Option<TlsAcceptor>> {
        if !self.config.tls_enabled() {
            return Ok(None);
        }
        if self.config.pfx_path.is_some() && self.config.cert_path.is_none() {
            anyhow::bail!(
                "pfx_path is set but cert_path/key_path are not: PKCS#12 bundles are not \
                 supported, provide a PEM certificate and key instead (see DESIGN.md)"
            );
        }
        let cert_path = self
            .config
            .cert_path
            .as_deref()
            .context("ssl enabled but cert_path not set")?;
        let key_path = self
            .config
            .key_path
            .as_deref()
            .context("ssl enabled but key_path not set")?;

        let cert_pem =
            std::fs::read(cert_path).with_context(|| format!("failed to read TLS cert: {cert_path}"))?;
        let key_pem =
            std::fs::read(key_path).with_context(|| format!("failed to read TLS key: {key_path}"))?;

        let certs: Vec<_> = rustls_pemfile::certs(&mut &cert_pem[..])
            .collect::<Result<Vec<_>, _>>()
            .context("failed to parse TLS certificates")?;
        let key = rustls_pemfile::private_key(&mut &key_pem[..])
            .context("failed to parse TLS private key")?
            .context("no private key found in PEM file")?;

        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .context("invalid TLS configuration")?;

        Ok(Some(TlsAcceptor::from(Arc::new(tls_config))))
    }

    /// Bind the listener and start serving. Resolves once the socket is
    /// bound; fails with a descriptive error otherwise (spec.md §4.G).
    pub async fn start(self) -> Result<ServerHandle> {
        let tls_acceptor = self.build_tls_acceptor()?;
        let listen_addr = self.config.listen_addr();
        let listener = TcpListener::bind(&listen_addr)
            .await
            .with_context(|| format!("failed to bind {listen_addr}"))?;
        let addr = listener.local_addr()?;
        tracing::info!(%addr, tls = tls_acceptor.is_some(), "router listening");

        let app = build_router(self.app_state());
        let reaper_task = spawn_reaper(Arc::clone(&self.store));

        let accept_task = tokio::spawn(async move {
            match tls_acceptor {
                Some(acceptor) => serve_tls(listener, acceptor, app).await,
                None => axum::serve(listener, app.into_make_service())
                    .await
                    .context("HTTP accept loop failed"),
            }
        });

        Ok(ServerHandle {
            addr,
            accept_task,
            reaper_task,
            registry: self.registry,
        })
    }

    /// Start the server and block until SIGINT/SIGTERM, then stop cleanly.
    pub async fn run(self) -> Result<()> {
        let handle = self.start().await?;
        tracing::info!(addr = %handle.addr, "router ready");

        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
        handle.stop().await
    }
}

impl ServerHandle {
    /// Close the listener and every active session, triggering the normal
    /// disconnect-broadcast path for each (spec.md §4.G).
    pub async fn stop(self) -> Result<()> {
        self.accept_task.abort();
        self.reaper_task.abort();
        for peer in self.registry.all() {
            peer.close();
        }
        Ok(())
    }
}

fn spawn_reaper(store: Arc<LargeMessageStore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            let swept = store.sweep_expired();
            if swept > 0 {
                tracing::debug!(swept, "swept expired sideband slots");
            }
        }
    })
}

async fn serve_tls(listener: TcpListener, acceptor: TlsAcceptor, app: axum::Router) -> Result<()> {
    loop {
        let (stream, _) = listener.accept().await.context("TLS accept failed")?;
        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("TLS handshake failed: {e}");
                    return;
                }
            };
            let io = TokioIo::new(tls_stream);
            let service = TowerToHyperService::new(app);
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service)
                .with_upgrades()
                .await
            {
                tracing::warn!("connection error: {e}");
            }
        });
    }
}
