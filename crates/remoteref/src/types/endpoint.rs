//! Endpoints and socket factories
//!
//! An endpoint is the routing key for connections: host, port, and the
//! optional factories used to open client sockets and bind listeners.
//! Only host and port go on the wire; a received endpoint always uses the
//! receiver's default factories.

use async_trait::async_trait;
use bytes::{Buf, BufMut};
use remote_marshal::{Marshal, Unmarshal};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

/// Opens client connections for an endpoint
#[async_trait]
pub trait ClientSocketFactory: Send + Sync + 'static {
    /// Stable identifier used for endpoint equality
    fn id(&self) -> &str;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream>;
}

/// Binds listeners for exported endpoints
#[async_trait]
pub trait ServerSocketFactory: Send + Sync + 'static {
    /// Stable identifier used for endpoint equality
    fn id(&self) -> &str;

    async fn bind(&self, host: &str, port: u16) -> io::Result<TcpListener>;
}

/// Plain TCP connect
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultClientSocketFactory;

#[async_trait]
impl ClientSocketFactory for DefaultClientSocketFactory {
    fn id(&self) -> &str {
        "tcp"
    }

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Plain TCP bind
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultServerSocketFactory;

#[async_trait]
impl ServerSocketFactory for DefaultServerSocketFactory {
    fn id(&self) -> &str {
        "tcp"
    }

    async fn bind(&self, host: &str, port: u16) -> io::Result<TcpListener> {
        TcpListener::bind((host, port)).await
    }
}

/// Connection routing key
#[derive(Clone)]
pub struct Endpoint {
    host: String,
    port: u16,
    client_factory: Option<Arc<dyn ClientSocketFactory>>,
    server_factory: Option<Arc<dyn ServerSocketFactory>>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            client_factory: None,
            server_factory: None,
        }
    }

    pub fn with_client_factory(mut self, factory: Arc<dyn ClientSocketFactory>) -> Self {
        self.client_factory = Some(factory);
        self
    }

    pub fn with_server_factory(mut self, factory: Arc<dyn ServerSocketFactory>) -> Self {
        self.server_factory = Some(factory);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn client_factory(&self) -> Option<&Arc<dyn ClientSocketFactory>> {
        self.client_factory.as_ref()
    }

    pub fn server_factory(&self) -> Option<&Arc<dyn ServerSocketFactory>> {
        self.server_factory.as_ref()
    }

    /// Same endpoint on a different port
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            port,
            ..self.clone()
        }
    }

    /// Open a client connection through the endpoint's factory
    pub async fn connect(&self) -> io::Result<TcpStream> {
        match &self.client_factory {
            Some(factory) => factory.connect(&self.host, self.port).await,
            None => DefaultClientSocketFactory.connect(&self.host, self.port).await,
        }
    }

    /// Bind a listener through the endpoint's factory
    pub async fn bind(&self) -> io::Result<TcpListener> {
        match &self.server_factory {
            Some(factory) => factory.bind(&self.host, self.port).await,
            None => DefaultServerSocketFactory.bind(&self.host, self.port).await,
        }
    }

    fn factory_ids(&self) -> (Option<&str>, Option<&str>) {
        (
            self.client_factory.as_ref().map(|f| f.id()),
            self.server_factory.as_ref().map(|f| f.id()),
        )
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.factory_ids() == other.factory_ids()
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
        self.factory_ids().hash(state);
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (client, server) = self.factory_ids();
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_factory", &client)
            .field("server_factory", &server)
            .finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl Marshal for Endpoint {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> remote_marshal::Result<()> {
        self.host.marshal(buf)?;
        self.port.marshal(buf)
    }
}

impl Unmarshal for Endpoint {
    fn unmarshal<B: Buf>(buf: &mut B) -> remote_marshal::Result<Self> {
        let host = String::unmarshal(buf)?;
        let port = u16::unmarshal(buf)?;
        Ok(Self::new(host, port))
    }
}
