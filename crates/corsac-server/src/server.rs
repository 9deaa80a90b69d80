//! TCP acceptor: connection accounting, dispatch to per-connection tasks,
//! graceful stop.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use corsac_core::Database;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Notify};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::Result;

/// Signals a running server to stop. Held by the signal handler as the
/// single owner of shutdown, instead of ambient process state.
#[derive(Clone)]
pub struct StopHandle {
    shutdown: broadcast::Sender<()>,
}

impl StopHandle {
    /// Ask the server to stop. Idempotent.
    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }
}

/// The TCP server: listen socket, connection cap, worker dispatch.
pub struct Server {
    config: ServerConfig,
    db: Arc<Database>,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    shutdown: broadcast::Sender<()>,
    connection_count: Arc<AtomicUsize>,
    total_requests: Arc<AtomicU64>,
    drained: Arc<Notify>,
}

impl Server {
    /// Bind the listen socket. The engine must already be initialized.
    pub async fn bind(config: ServerConfig, db: Arc<Database>) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.listen_addr()).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown, _) = broadcast::channel(2);
        tracing::info!(%local_addr, "server listening");

        Ok(Self {
            config,
            db,
            listener: Some(listener),
            local_addr,
            shutdown,
            connection_count: Arc::new(AtomicUsize::new(0)),
            total_requests: Arc::new(AtomicU64::new(0)),
            drained: Arc::new(Notify::new()),
        })
    }

    /// The bound address; useful when the configured port was 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle that stops this server.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Live connection count.
    pub fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::Relaxed)
    }

    /// Requests dispatched since start.
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Accept connections until stopped, then wait for every connection
    /// task to tear down before returning.
    pub async fn run(&mut self) -> Result<()> {
        let listener = self.listener.take().expect("server already ran");
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.dispatch(stream, peer),
                    Err(err) => {
                        tracing::error!(%err, "accept failed");
                    }
                },
                _ = shutdown_rx.recv() => break,
            }
        }

        // Closing the listener cancels pending accepts; in-flight requests
        // finish inside their connection tasks.
        drop(listener);
        tracing::info!("acceptor stopped, draining connections");
        loop {
            let drained = self.drained.notified();
            if self.connection_count.load(Ordering::Acquire) == 0 {
                break;
            }
            drained.await;
        }
        tracing::info!("server stopped");
        Ok(())
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        let current = self.connection_count.load(Ordering::Acquire);
        if current >= self.config.max_connections {
            // Over the cap: the socket was accepted and is now closed with
            // no response frame.
            tracing::warn!(%peer, current, cap = self.config.max_connections,
                "connection cap reached, closing");
            drop(stream);
            return;
        }

        self.connection_count.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(%peer, "connection accepted");

        let connection = Connection::new(
            stream,
            Arc::clone(&self.db),
            Arc::clone(&self.total_requests),
            self.config.scan_limit,
        );
        let shutdown_rx = self.shutdown.subscribe();
        let connection_count = Arc::clone(&self.connection_count);
        let drained = Arc::clone(&self.drained);
        tokio::spawn(async move {
            connection.serve(shutdown_rx).await;
            tracing::debug!(%peer, "connection closed");
            connection_count.fetch_sub(1, Ordering::AcqRel);
            drained.notify_waiters();
        });
    }
}
