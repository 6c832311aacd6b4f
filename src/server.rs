use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, ToSocketAddrs},
    sync::watch,
};

use crate::{
    reply::Reply,
    session::{self, Callback, DeliveryError, Session, Step},
    smtp::{self, write_reply, Body, LineReader},
    Config, Message,
};

/// An error running the server.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not bind listener: {0}")]
    Bind(#[source] std::io::Error),
    #[error("could not accept connection: {0}")]
    Accept(#[source] std::io::Error),
    #[error("server is closed")]
    Closed,
    #[error("server is not listening yet")]
    NotListening,
    #[error("server is already serving")]
    AlreadyServing,
}

/// An SMTP server handing every received message to a callback.
///
/// Configure the server with [`Server::config_mut`],
/// then share it (usually in an [`Arc`]) between the task running
/// [`Server::listen_and_serve`] and whoever calls [`Server::close`].
pub struct Server {
    config: Config,
    callback: Callback,
    address: watch::Sender<Option<SocketAddr>>,
    closed: watch::Sender<bool>,
    serving: AtomicBool,
}

impl Server {
    /// Create a server with the default configuration.
    ///
    /// The callback is called once for every accepted message,
    /// from the task of the connection that sent it.
    /// Returning an error rejects the message with a 554 reply.
    pub fn new<F, E>(callback: F) -> Self
    where
        F: Fn(Message) -> Result<(), E> + Send + Sync + 'static,
        E: Into<DeliveryError>,
    {
        Self::with_config(callback, Config::default())
    }

    pub fn with_config<F, E>(callback: F, config: Config) -> Self
    where
        F: Fn(Message) -> Result<(), E> + Send + Sync + 'static,
        E: Into<DeliveryError>,
    {
        Self {
            config,
            callback: session::callback(callback),
            address: watch::channel(None).0,
            closed: watch::channel(false).0,
            serving: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Change the configuration.
    ///
    /// Changes only apply to later calls of
    /// [`Server::listen_and_serve`].
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Bind to the address and serve clients until closed.
    ///
    /// Every accepted connection is served by its own task.
    /// Returns `Ok` after [`Server::close`],
    /// or the error that stopped the listener.
    /// A server serves only once; afterwards it stays closed.
    pub async fn listen_and_serve(
        &self,
        address: impl ToSocketAddrs,
    ) -> Result<(), Error> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(Error::Closed);
        }
        if self.serving.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyServing);
        }
        let result = self.serve(address, &mut closed).await;
        self.closed.send_replace(true);
        #[cfg(feature = "tracing")]
        {
            use tracing::{event, Level};
            event!(Level::INFO, ?result, "smtp server stopped");
        }
        result
    }

    async fn serve(
        &self,
        address: impl ToSocketAddrs,
        closed: &mut watch::Receiver<bool>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(address).await.map_err(Error::Bind)?;
        let local_address = listener.local_addr().map_err(Error::Bind)?;
        self.address.send_replace(Some(local_address));
        #[cfg(feature = "tracing")]
        {
            use tracing::{event, Level};
            event!(
                Level::INFO,
                address = %local_address,
                "smtp server listening"
            );
        }

        let config = Arc::new(self.config.clone());
        loop {
            tokio::select! {
                biased;
                changed = closed.changed() => {
                    if changed.is_err() || *closed.borrow() {
                        return Ok(());
                    }
                }
                result = listener.accept() => match result {
                    Ok((socket, client_address)) => {
                        tokio::spawn(task(
                            socket,
                            client_address,
                            config.clone(),
                            self.callback.clone(),
                        ));
                    }
                    Err(e) => return Err(Error::Accept(e)),
                },
            }
        }
    }

    /// Return the address and port to which this server bound.
    pub fn address(&self) -> Result<SocketAddr, Error> {
        let address = *self.address.borrow();
        address.ok_or(Error::NotListening)
    }

    /// Wait until the server is listening and return its address.
    ///
    /// Fails if the server is closed before it started listening.
    pub async fn listening(&self) -> Result<SocketAddr, Error> {
        let mut address = self.address.subscribe();
        let mut closed = self.closed.subscribe();
        loop {
            let current = *address.borrow_and_update();
            if let Some(current) = current {
                return Ok(current);
            }
            if *closed.borrow_and_update() {
                return Err(Error::Closed);
            }
            tokio::select! {
                _ = address.changed() => {}
                _ = closed.changed() => {}
            }
        }
    }

    /// Stop accepting connections.
    ///
    /// Connections already accepted are served to the end.
    /// Fails if the server was already closed.
    pub fn close(&self) -> Result<(), Error> {
        if self.closed.send_replace(true) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

async fn task(
    socket: tokio::net::TcpStream,
    client_address: SocketAddr,
    config: Arc<Config>,
    callback: Callback,
) {
    #[cfg(feature = "tracing")]
    {
        use tracing::{event, Level};
        event!(Level::DEBUG, client = %client_address, "connection accepted");
    }
    let result = run(socket, config, callback).await;
    #[cfg(feature = "tracing")]
    {
        use tracing::{event, Level};
        match result {
            Ok(()) => event!(
                Level::DEBUG,
                client = %client_address,
                "connection closed"
            ),
            Err(error) => event!(
                Level::DEBUG,
                client = %client_address,
                %error,
                "connection dropped"
            ),
        }
    }
    #[cfg(not(feature = "tracing"))]
    let _ = (result, client_address);
}

/// Serve one client until it quits or the connection fails.
///
/// Errors end the session without a further reply.
pub(crate) async fn run(
    stream: impl AsyncRead + AsyncWrite,
    config: Arc<Config>,
    callback: Callback,
) -> Result<(), smtp::Error> {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = LineReader::new(reader, config.max_line_length);
    let mut session = Session::from_parts(config.clone(), callback);

    write_reply(&mut writer, &session.greeting(), config.write_timeout).await?;
    loop {
        let line = match reader.read_line(config.read_timeout).await {
            Ok(line) => line,
            Err(smtp::Error::LineTooLong { .. }) => {
                let reply = Reply::line_too_long();
                write_reply(&mut writer, &reply, config.write_timeout).await?;
                continue;
            }
            Err(error) => return Err(error),
        };
        let reply = match session.handle_line(&line) {
            Step::Reply(reply) => reply,
            Step::Data(reply) => {
                write_reply(&mut writer, &reply, config.write_timeout).await?;
                let body = reader
                    .read_body(config.read_timeout, config.max_message_size)
                    .await?;
                match body {
                    Body::Complete(body) => session.deliver(body),
                    Body::TooLarge => session.discard(Reply::new(
                        552,
                        "Message exceeds fixed maximum message size",
                    )),
                }
            }
            Step::Quit(reply) => {
                write_reply(&mut writer, &reply, config.write_timeout).await?;
                return Ok(());
            }
        };
        write_reply(&mut writer, &reply, config.write_timeout).await?;
    }
}
