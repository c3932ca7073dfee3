//! TCP accept loop.

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use tokio::net::{TcpListener, ToSocketAddrs};

use crate::{
    connection::{self, Config},
    handler::HandlerFactory,
    Result,
};

/// Accepts TCP connections and serves each one on its own task.
///
/// The factory routes request lines to handlers; see the crate-level example
/// for a typical setup.
pub struct Server {
    listener: TcpListener,
    factory: Arc<dyn HandlerFactory>,
    config: Config,
}

impl Server {
    /// Binds to `addr` without accepting yet.
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        factory: Arc<dyn HandlerFactory>,
        config: Config,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            factory,
            config,
        })
    }

    /// The locally bound address, useful when binding to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever. Per-connection failures are logged, not
    /// propagated; only accept errors end the loop.
    pub async fn run(self) -> Result<()> {
        let live = Arc::new(AtomicUsize::new(0));

        loop {
            let (stream, peer) = self.listener.accept().await?;
            let count = live.fetch_add(1, Ordering::Relaxed) + 1;
            log::debug!("accepted connection from {peer} ({count} live)");

            let factory = Arc::clone(&self.factory);
            let config = self.config.clone();
            let live = Arc::clone(&live);
            tokio::spawn(async move {
                match connection::serve(stream, factory, config).await {
                    Ok(()) => log::debug!("connection from {peer} closed"),
                    Err(err) => log::warn!("connection from {peer} failed: {err}"),
                }
                live.fetch_sub(1, Ordering::Relaxed);
            });
        }
    }
}
