//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use remote_marshal::{Buf, BufMut, Marshal, Unmarshal};
use remoteref::protocol::{Message, ReturnFrame};
use remoteref::transport::{FrameTransport, DEFAULT_MAX_FRAME_SIZE};
use remoteref::{
    CallProtocol, Channel, ChannelFactory, DeclaredError, Dispatcher, Endpoint, ExportOptions,
    InterfaceDef, MethodDef, MethodTableBuilder, RemoteObject, RemoteRuntime, Stub,
    StubResolver, StubTemplate,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

/// Initialize test logging once; `RUST_LOG` overrides the default level
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Calculator
// ============================================================================

pub const CALC_INTERFACE: &str = "tests.Calculator";

pub const ADD: MethodDef = MethodDef::new(CALC_INTERFACE, "add(int,int)", "int");
pub const DIVIDE: MethodDef = MethodDef::new(CALC_INTERFACE, "divide(int,int)", "int");
pub const ECHO: MethodDef = MethodDef::new(CALC_INTERFACE, "echo(String)", "String");
/// Panics for any non-zero argument
pub const BOOM: MethodDef = MethodDef::new(CALC_INTERFACE, "boom(int)", "int");

pub const CALCULATOR: InterfaceDef = InterfaceDef::new(CALC_INTERFACE, &[ADD, DIVIDE, ECHO, BOOM]);

pub const CALCULATOR_TYPE: &str = "tests.CalculatorImpl";

/// Error declared by `divide`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathError {
    pub message: String,
}

impl fmt::Display for MathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Marshal for MathError {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> remote_marshal::Result<()> {
        self.message.marshal(buf)
    }
}

impl Unmarshal for MathError {
    fn unmarshal<B: Buf>(buf: &mut B) -> remote_marshal::Result<Self> {
        Ok(Self {
            message: String::unmarshal(buf)?,
        })
    }
}

impl DeclaredError for MathError {
    const TYPE_NAME: &'static str = "tests.MathError";
}

/// Calculator that counts how often its methods ran
#[derive(Default)]
pub struct Calculator {
    pub calls: AtomicUsize,
}

impl Calculator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RemoteObject for Calculator {
    fn interfaces(&self) -> &'static [&'static InterfaceDef] {
        &[&CALCULATOR]
    }

    fn type_name(&self) -> &'static str {
        CALCULATOR_TYPE
    }

    fn bind_methods(self: Arc<Self>, methods: MethodTableBuilder) -> MethodTableBuilder {
        let this = Arc::clone(&self);
        methods
            .infallible(ADD, move |(a, b): (i32, i32)| {
                this.calls.fetch_add(1, Ordering::SeqCst);
                async move { a.wrapping_add(b) }
            })
            .method(DIVIDE, |(a, b): (i32, i32)| async move {
                if b == 0 {
                    return Err(MathError {
                        message: format!("cannot divide {} by zero", a),
                    });
                }
                Ok(a / b)
            })
            .infallible(ECHO, |(text,): (String,)| async move { text })
            .infallible(BOOM, |(code,): (i32,)| async move {
                if code != 0 {
                    panic!("boom {}", code);
                }
                code
            })
    }
}

/// Static stub template for [`Calculator`] using operation indices
pub fn calculator_template() -> StubTemplate {
    StubTemplate::new(
        StubResolver::expected_name(CALCULATOR_TYPE),
        CallProtocol::Indexed,
        vec![ADD, DIVIDE, ECHO, BOOM],
    )
}

pub async fn export_calculator(runtime: &RemoteRuntime) -> (Arc<Calculator>, Stub) {
    let calculator = Arc::new(Calculator::default());
    let stub = runtime
        .export(Arc::clone(&calculator), ExportOptions::new())
        .await
        .unwrap();
    (calculator, stub)
}

// ============================================================================
// Gate: a call that blocks until the test releases it
// ============================================================================

pub const WAIT: MethodDef = MethodDef::new("tests.Gate", "wait(int)", "int");
pub const GATE: InterfaceDef = InterfaceDef::new("tests.Gate", &[WAIT]);

#[derive(Default)]
pub struct Gate {
    /// Signalled when a call has been dispatched
    pub entered: Notify,
    /// Signalled by the test to let the call finish
    pub release: Notify,
}

impl RemoteObject for Gate {
    fn interfaces(&self) -> &'static [&'static InterfaceDef] {
        &[&GATE]
    }

    fn bind_methods(self: Arc<Self>, methods: MethodTableBuilder) -> MethodTableBuilder {
        methods.infallible(WAIT, move |(value,): (i32,)| {
            let gate = Arc::clone(&self);
            async move {
                gate.entered.notify_one();
                gate.release.notified().await;
                value
            }
        })
    }
}

// ============================================================================
// Geometry: nested objects and arrays
// ============================================================================

pub const GEOMETRY_INTERFACE: &str = "tests.Geometry";

pub const TRANSLATE: MethodDef =
    MethodDef::new(GEOMETRY_INTERFACE, "translate(Polygon,Point)", "Polygon");
pub const SUM: MethodDef = MethodDef::new(GEOMETRY_INTERFACE, "sum(long[])", "long");
pub const CORNERS: MethodDef = MethodDef::new(GEOMETRY_INTERFACE, "corners(Polygon)", "Point[4]");

pub const GEOMETRY: InterfaceDef =
    InterfaceDef::new(GEOMETRY_INTERFACE, &[TRANSLATE, SUM, CORNERS]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Marshal for Point {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> remote_marshal::Result<()> {
        self.x.marshal(buf)?;
        self.y.marshal(buf)
    }
}

impl Unmarshal for Point {
    fn unmarshal<B: Buf>(buf: &mut B) -> remote_marshal::Result<Self> {
        Ok(Self {
            x: i32::unmarshal(buf)?,
            y: i32::unmarshal(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polygon {
    pub name: String,
    pub vertices: Vec<Point>,
    pub label: Option<Box<Polygon>>,
}

impl Marshal for Polygon {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> remote_marshal::Result<()> {
        self.name.marshal(buf)?;
        self.vertices.marshal(buf)?;
        self.label.marshal(buf)
    }
}

impl Unmarshal for Polygon {
    fn unmarshal<B: Buf>(buf: &mut B) -> remote_marshal::Result<Self> {
        Ok(Self {
            name: String::unmarshal(buf)?,
            vertices: Vec::unmarshal(buf)?,
            label: Option::unmarshal(buf)?,
        })
    }
}

impl Polygon {
    pub fn translate(&self, by: Point) -> Polygon {
        Polygon {
            name: self.name.clone(),
            vertices: self
                .vertices
                .iter()
                .map(|p| Point {
                    x: p.x + by.x,
                    y: p.y + by.y,
                })
                .collect(),
            label: self.label.as_ref().map(|l| Box::new(l.translate(by))),
        }
    }

    /// Bounding box corners, clockwise from the lower left
    pub fn corners(&self) -> [Point; 4] {
        let min_x = self.vertices.iter().map(|p| p.x).min().unwrap_or(0);
        let max_x = self.vertices.iter().map(|p| p.x).max().unwrap_or(0);
        let min_y = self.vertices.iter().map(|p| p.y).min().unwrap_or(0);
        let max_y = self.vertices.iter().map(|p| p.y).max().unwrap_or(0);
        [
            Point { x: min_x, y: min_y },
            Point { x: min_x, y: max_y },
            Point { x: max_x, y: max_y },
            Point { x: max_x, y: min_y },
        ]
    }
}

pub struct Geometry;

impl RemoteObject for Geometry {
    fn interfaces(&self) -> &'static [&'static InterfaceDef] {
        &[&GEOMETRY]
    }

    fn bind_methods(self: Arc<Self>, methods: MethodTableBuilder) -> MethodTableBuilder {
        methods
            .infallible(TRANSLATE, |(polygon, by): (Polygon, Point)| async move {
                polygon.translate(by)
            })
            .infallible(SUM, |(values,): (Vec<i64>,)| async move {
                values.iter().sum::<i64>()
            })
            .infallible(CORNERS, |(polygon,): (Polygon,)| async move {
                polygon.corners()
            })
    }
}

// ============================================================================
// Transports
// ============================================================================

/// Channel factory that serves every channel in-process over a duplex pipe
pub struct LoopbackChannels {
    dispatcher: Arc<Dispatcher>,
    pub opened: AtomicUsize,
}

impl LoopbackChannels {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            opened: AtomicUsize::new(0),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelFactory for LoopbackChannels {
    async fn acquire(&self, endpoint: &Endpoint) -> io::Result<Channel> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let (client, server) = tokio::io::duplex(64 * 1024);
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            let _ = dispatcher.serve_connection(server, "loopback").await;
        });
        Ok(Channel::new(endpoint.clone(), client, DEFAULT_MAX_FRAME_SIZE))
    }

    fn release(&self, _channel: Channel, _reusable: bool) {}
}

/// Endpoint on a port nothing listens on
pub async fn dead_endpoint() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Endpoint::new("127.0.0.1", port)
}

/// TCP server that hands each accepted connection to `serve`.
///
/// Returns the endpoint and a count of accepted connections.
pub async fn raw_server<F, Fut>(serve: F) -> (Endpoint, Arc<AtomicUsize>)
where
    F: Fn(FrameTransport<TcpStream>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(serve(FrameTransport::new(stream)));
        }
    });
    (Endpoint::new("127.0.0.1", port), accepted)
}

/// Host that answers a single call with `value` and then goes away: the
/// listener closes before the reply is written, and the connection right
/// after it.
pub async fn single_call_host<T>(value: T) -> Endpoint
where
    T: Marshal + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let accepted = listener.accept().await;
        drop(listener);
        if let Ok((stream, _)) = accepted {
            let mut transport = FrameTransport::new(stream);
            if let Ok(Some(_)) = transport.read_frame().await {
                reply_normal(&mut transport, &value).await;
            }
        }
    });
    Endpoint::new("127.0.0.1", port)
}

/// Write a normal return carrying `value`
pub async fn reply_normal<T: Marshal>(transport: &mut FrameTransport<TcpStream>, value: &T) {
    let body = remote_marshal::to_bytes(value).unwrap();
    transport
        .write_message(&Message::Return(ReturnFrame::Normal(body)))
        .await
        .unwrap();
}
