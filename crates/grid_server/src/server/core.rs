//! Core grid server implementation.
//!
//! This module contains the `GridServer` struct, which wires the listening
//! socket, the reactor, the worker pool and the shared graph together and
//! owns the threads that drive them.

use crate::{
    config::ServerConfig,
    connection::ConnectionContext,
    error::ServerError,
    grid::StatsSnapshot,
    messaging::GridService,
    pool::WorkerPool,
    reactor::{Acceptor, Reactor},
};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info};

/// The grid server.
///
/// `GridServer` binds the listening socket on construction and starts
/// serving once [`start`](Self::start) is called.
///
/// # Threads
///
/// * **Reactor threads** (`grid-reactor-<n>`) wait on the shared epoll set,
///   accept connections, read frames and apply walks and resets.
/// * **Worker threads** (`grid-worker-<n>`) run path queries and write
///   their responses.
///
/// # Shutdown
///
/// [`stop`](Self::stop) only signals; [`wait`](Self::wait) joins the
/// reactor threads, then drains and joins the worker pool.
pub struct GridServer {
    config: ServerConfig,
    local_addr: SocketAddr,
    reactor: Arc<Reactor>,
    pool: Arc<WorkerPool>,
    service: Arc<GridService>,
    threads: Mutex<Vec<JoinHandle<Result<(), ServerError>>>>,
}

impl GridServer {
    /// Binds the listening socket and prepares the reactor and worker pool.
    ///
    /// # Arguments
    ///
    /// * `config` - Configuration parameters for server behavior
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] for zero thread counts,
    /// [`ServerError::Network`] when the socket cannot be created, bound or
    /// put into listening mode, and the reactor or pool error when either
    /// fails to initialize.
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        Self::bind_with_service(config, Arc::new(GridService::new()))
    }

    /// Like [`bind`](Self::bind), serving an existing graph.
    pub fn bind_with_service(
        config: ServerConfig,
        service: Arc<GridService>,
    ) -> Result<Self, ServerError> {
        if config.reactor_threads == 0 {
            return Err(ServerError::Config("reactor_threads must be at least 1".into()));
        }
        if config.worker_threads == 0 {
            return Err(ServerError::Config("worker_threads must be at least 1".into()));
        }

        let listener = Self::create_listener(&config)?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Network(format!("Failed to read local address: {e}")))?;

        let reactor = Arc::new(Reactor::new(config.max_events, config.poll_timeout())?);
        let pool = Arc::new(WorkerPool::new(config.worker_threads)?);

        let context = Arc::new(ConnectionContext {
            service: service.clone(),
            pool: pool.clone(),
            max_frame_len: config.max_frame_len,
        });
        reactor.register(Box::new(Acceptor::new(listener, context)))?;

        info!("✅ Listener bound on {}", local_addr);

        Ok(Self {
            config,
            local_addr,
            reactor,
            pool,
            service,
            threads: Mutex::new(Vec::new()),
        })
    }

    fn create_listener(config: &ServerConfig) -> Result<TcpListener, ServerError> {
        let socket = Socket::new(
            Domain::for_address(config.bind_address),
            Type::STREAM,
            Some(Protocol::TCP),
        )
        .map_err(|e| ServerError::Network(format!("Socket creation failed: {e}")))?;
        socket.set_reuse_address(true).ok();

        socket
            .bind(&config.bind_address.into())
            .map_err(|e| ServerError::Network(format!("Bind failed: {e}")))?;

        socket
            .listen(config.backlog)
            .map_err(|e| ServerError::Network(format!("Listen failed: {e}")))?;

        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::Network(format!("Failed to set non-blocking mode: {e}")))?;

        Ok(socket.into())
    }

    /// Spawns the reactor threads. Returns immediately.
    pub fn start(&self) -> Result<(), ServerError> {
        let mut threads = self.threads.lock();
        if !threads.is_empty() {
            return Err(ServerError::Internal("server already started".into()));
        }

        info!(
            "🚀 Starting grid server on {} ({} reactor thread(s), {} worker thread(s))",
            self.local_addr, self.config.reactor_threads, self.config.worker_threads
        );

        for index in 0..self.config.reactor_threads {
            let reactor = self.reactor.clone();
            let spawned = thread::Builder::new()
                .name(format!("grid-reactor-{index}"))
                .spawn(move || {
                    reactor.run().map_err(|e| {
                        error!("❌ Reactor thread {} failed: {}", index, e);
                        reactor.shutdown();
                        ServerError::from(e)
                    })
                });

            match spawned {
                Ok(handle) => threads.push(handle),
                Err(e) => {
                    self.reactor.shutdown();
                    return Err(ServerError::Internal(format!(
                        "Failed to spawn reactor thread: {e}"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Requests shutdown without waiting for it.
    pub fn stop(&self) {
        info!("🛑 Shutdown requested");
        self.reactor.shutdown();
    }

    pub fn is_stopped(&self) -> bool {
        self.reactor.is_shutdown()
    }

    /// Blocks until every reactor thread has exited, then drains and joins
    /// the worker pool.
    ///
    /// Returns the first error any reactor thread reported.
    pub fn wait(&self) -> Result<(), ServerError> {
        let threads = std::mem::take(&mut *self.threads.lock());

        let mut first_error = None;
        for handle in threads {
            let outcome = handle
                .join()
                .unwrap_or_else(|_| Err(ServerError::Internal("reactor thread panicked".into())));
            if let Err(e) = outcome {
                self.reactor.shutdown();
                first_error.get_or_insert(e);
            }
        }

        self.pool.shutdown();
        info!("✅ Grid server stopped");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// [`stop`](Self::stop) followed by [`wait`](Self::wait).
    pub fn shutdown(&self) -> Result<(), ServerError> {
        self.stop();
        self.wait()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<GridService> {
        &self.service
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.service.stats()
    }

    /// Registered entries, the listener included.
    pub fn connections(&self) -> usize {
        self.reactor.len().saturating_sub(1)
    }
}

impl Drop for GridServer {
    fn drop(&mut self) {
        if !self.threads.lock().is_empty() {
            let _ = self.shutdown();
        }
    }
}
