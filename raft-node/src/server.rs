use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::Future;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time;
use tracing::{debug, error, info};

use raft_core::{Connection, Shutdown};

use crate::config::ClusterConfig;
use crate::error::Result;
use crate::node::{Node, Status, Tick};
use crate::state::CommitCallback;
use crate::transport::Transport;

/// Shared handle to the protocol state. Whoever holds the lock is the
/// single writer.
pub(crate) type SharedNode = Arc<Mutex<Node>>;

/// A running consensus node: the accept loop, the supervisor loop, and the
/// shared protocol state, tied together by a broadcast shutdown channel and
/// a completion channel that drains when every task has wound down.
pub struct RaftNode {
    node: SharedNode,
    config: ClusterConfig,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: mpsc::UnboundedSender<()>,
    shutdown_complete_rx: mpsc::UnboundedReceiver<()>,
}

impl RaftNode {
    pub fn new(config: ClusterConfig) -> Result<RaftNode> {
        config.validate()?;
        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, shutdown_complete_rx) = mpsc::unbounded_channel();
        Ok(RaftNode {
            node: Arc::new(Mutex::new(Node::new(&config))),
            config,
            notify_shutdown,
            shutdown_complete_tx,
            shutdown_complete_rx,
        })
    }

    /// Registers a callback invoked for every committed entry as it is
    /// applied. Register before `start`, or entries applied in between are
    /// missed.
    pub async fn on_commit(&self, callback: CommitCallback) {
        self.node.lock().await.set_on_commit(callback);
    }

    /// Spawns the accept loop and the supervisor on `listener`, whose port
    /// must be the configured listen port.
    pub fn start(&mut self, listener: TcpListener) {
        let transport = Transport::new(
            self.config.listen.clone(),
            self.config.timing.rpc_timeout(),
        );

        let mut server = Listener {
            listener,
            node: self.node.clone(),
            notify_shutdown: self.notify_shutdown.clone(),
            shutdown_complete_tx: self.shutdown_complete_tx.clone(),
        };
        let mut accept_shutdown = Shutdown::new(self.notify_shutdown.subscribe());
        let accept_complete = self.shutdown_complete_tx.clone();
        tokio::spawn(async move {
            let _shutdown_complete = accept_complete;
            tokio::select! {
                res = server.run() => {
                    // Startup bind failures surface before this point; an
                    // accept loop dying later is fatal for this peer.
                    if let Err(err) = res {
                        error!(cause = %err, "accept loop failed");
                    }
                }
                _ = accept_shutdown.recv() => {}
            }
        });

        tokio::spawn(supervise(
            self.node.clone(),
            transport,
            self.config.timing.tick_interval(),
            Shutdown::new(self.notify_shutdown.subscribe()),
            self.shutdown_complete_tx.clone(),
        ));
    }

    /// Submits a command. True only while this node is the leader;
    /// replication follows asynchronously.
    pub async fn submit(&self, command: &str) -> bool {
        self.node.lock().await.submit(command)
    }

    pub async fn status(&self) -> Status {
        self.node.lock().await.status()
    }

    /// Stops the node: closes the listener, cancels the supervisor, and
    /// waits until every in-flight task has drained.
    pub async fn stop(self) {
        let RaftNode {
            notify_shutdown,
            shutdown_complete_tx,
            mut shutdown_complete_rx,
            ..
        } = self;
        let _ = notify_shutdown.send(());
        drop(notify_shutdown);
        drop(shutdown_complete_tx);
        let _ = shutdown_complete_rx.recv().await;
    }
}

/// Binds the configured listen address and runs a node until `shutdown`
/// completes. Failure to bind is fatal and propagates to the caller.
pub async fn run(config: ClusterConfig, shutdown: impl Future) -> Result<()> {
    let listener = TcpListener::bind(&config.listen.id()).await?;
    info!("listening on {}", config.listen);

    let mut node = RaftNode::new(config)?;
    node.start(listener);

    shutdown.await;
    info!("shutting down");
    node.stop().await;
    Ok(())
}

/// The accept loop. Every accepted connection is handed to its own
/// `RequestHandler` task.
struct Listener {
    listener: TcpListener,
    node: SharedNode,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: mpsc::UnboundedSender<()>,
}

impl Listener {
    async fn run(&mut self) -> raft_core::Result<()> {
        loop {
            let (socket, addr) = self.accept().await?;
            let mut handler = RequestHandler {
                connection: Connection::new(socket),
                node: self.node.clone(),
                shutdown: Shutdown::new(self.notify_shutdown.subscribe()),
                _shutdown_complete: self.shutdown_complete_tx.clone(),
            };
            tokio::spawn(async move {
                if let Err(err) = handler.run().await {
                    // A malformed or truncated request costs only its own
                    // connection.
                    debug!("connection error from {}: {}", addr, err);
                }
            });
        }
    }

    async fn accept(&mut self) -> raft_core::Result<(TcpStream, SocketAddr)> {
        let mut backoff = 1;
        loop {
            match self.listener.accept().await {
                Ok((socket, addr)) => return Ok((socket, addr)),
                Err(err) => {
                    if backoff > 64 {
                        return Err(err.into());
                    }
                }
            }

            time::delay_for(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}

/// Serves exactly one request/response exchange, then lets the connection
/// close. A reply on this connection can only ever answer the request that
/// arrived on it.
struct RequestHandler {
    connection: Connection,
    node: SharedNode,
    shutdown: Shutdown,
    _shutdown_complete: mpsc::UnboundedSender<()>,
}

impl RequestHandler {
    async fn run(&mut self) -> raft_core::Result<()> {
        let maybe_message = tokio::select! {
            res = self.connection.read_message() => res?,
            _ = self.shutdown.recv() => return Ok(()),
        };
        let message = match maybe_message {
            Some(message) => message,
            None => return Ok(()),
        };

        // The lock spans the whole handler, serializing it with the
        // supervisor and every other connection.
        let reply = { self.node.lock().await.handle_message(message) };
        if let Some(reply) = reply {
            self.connection.write_message(&reply).await?;
        }
        Ok(())
    }
}

/// The supervisor: the only task that drives time forward. Each pass holds
/// the lock to mutate, releases it across the network fan-out, then takes
/// it again to fold the replies back in before the next mutation.
async fn supervise(
    node: SharedNode,
    transport: Transport,
    tick_interval: Duration,
    mut shutdown: Shutdown,
    _shutdown_complete: mpsc::UnboundedSender<()>,
) {
    let mut ticker = time::interval(tick_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.recv() => return,
        }

        let action = { node.lock().await.tick() };
        match action {
            Tick::Idle => {}
            Tick::Election(ballot) => {
                // Every reply is gathered before the tally so a later
                // election cannot race this one.
                let replies = join_all(
                    ballot
                        .voters
                        .iter()
                        .map(|voter| transport.send_with_response(voter, &ballot.request)),
                )
                .await;
                node.lock().await.tally_votes(ballot.term, replies);
            }
            Tick::Replicate { term, batches } => {
                let transport = &transport;
                let replies = join_all(batches.iter().map(|(peer, request)| async move {
                    (peer, transport.send_with_response(peer, request).await)
                }))
                .await;
                let mut node = node.lock().await;
                for (peer, reply) in replies {
                    node.record_append_response(term, peer, reply);
                }
            }
        }
    }
}
