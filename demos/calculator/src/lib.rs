//! Calculator example
//!
//! A calculator object exported under a well-known identity, with a typed
//! client wrapper. The same object can be reached through a forwarding
//! proxy (method hashes) or a registered static stub (operation indices).

use std::fmt;
use std::sync::Arc;

use remote_marshal::{Buf, BufMut, Marshal, Unmarshal};
use remoteref::{
    call, CallProtocol, DeclaredError, Endpoint, InterfaceDef, InvocationHandler, MethodDef,
    MethodTableBuilder, ObjectIdentity, RemoteObject, RemoteReference, RemoteRuntime, Stub,
    StubDescriptor, StubKind, StubResolver, StubTemplate,
};
use tracing::info;

pub const INTERFACE: &str = "calculator.Calculator";

pub const ADD: MethodDef = MethodDef::new(INTERFACE, "add(int,int)", "int");
pub const SUBTRACT: MethodDef = MethodDef::new(INTERFACE, "subtract(int,int)", "int");
pub const MULTIPLY: MethodDef = MethodDef::new(INTERFACE, "multiply(int,int)", "int");
pub const DIVIDE: MethodDef = MethodDef::new(INTERFACE, "divide(int,int)", "(int,int)");

pub const CALCULATOR: InterfaceDef =
    InterfaceDef::new(INTERFACE, &[ADD, SUBTRACT, MULTIPLY, DIVIDE]);

/// Well-known object number the server exports the calculator under
pub const CALCULATOR_OBJECT: u64 = 0x10;

/// Implementation type name, stable across builds
pub const TYPE_NAME: &str = "calculator.CalculatorImpl";

/// Errors the calculator declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalcError {
    DivisionByZero,
    Overflow,
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::Overflow => write!(f, "arithmetic overflow"),
        }
    }
}

impl Marshal for CalcError {
    fn marshal<B: BufMut>(&self, buf: &mut B) -> remote_marshal::Result<()> {
        let tag: u8 = match self {
            Self::DivisionByZero => 1,
            Self::Overflow => 2,
        };
        tag.marshal(buf)
    }
}

impl Unmarshal for CalcError {
    fn unmarshal<B: Buf>(buf: &mut B) -> remote_marshal::Result<Self> {
        match u8::unmarshal(buf)? {
            1 => Ok(Self::DivisionByZero),
            2 => Ok(Self::Overflow),
            tag => Err(remote_marshal::MarshalError::InvalidTag {
                type_name: "CalcError",
                tag,
            }),
        }
    }
}

impl DeclaredError for CalcError {
    const TYPE_NAME: &'static str = "calculator.CalcError";
}

fn checked(value: Option<i32>) -> Result<i32, CalcError> {
    value.ok_or(CalcError::Overflow)
}

/// Server-side calculator
#[derive(Debug, Default)]
pub struct CalculatorImpl;

impl RemoteObject for CalculatorImpl {
    fn interfaces(&self) -> &'static [&'static InterfaceDef] {
        &[&CALCULATOR]
    }

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn bind_methods(self: Arc<Self>, methods: MethodTableBuilder) -> MethodTableBuilder {
        methods
            .method(ADD, |(a, b): (i32, i32)| async move {
                let sum = checked(a.checked_add(b))?;
                info!("Add({}, {}) = {}", a, b, sum);
                Ok::<_, CalcError>(sum)
            })
            .method(SUBTRACT, |(a, b): (i32, i32)| async move {
                let difference = checked(a.checked_sub(b))?;
                info!("Subtract({}, {}) = {}", a, b, difference);
                Ok::<_, CalcError>(difference)
            })
            .method(MULTIPLY, |(a, b): (i32, i32)| async move {
                let product = checked(a.checked_mul(b))?;
                info!("Multiply({}, {}) = {}", a, b, product);
                Ok::<_, CalcError>(product)
            })
            .method(DIVIDE, |(a, b): (i32, i32)| async move {
                if b == 0 {
                    return Err(CalcError::DivisionByZero);
                }
                let quotient = checked(a.checked_div(b))?;
                let remainder = checked(a.checked_rem(b))?;
                info!("Divide({}, {}) = {} remainder {}", a, b, quotient, remainder);
                Ok::<_, CalcError>((quotient, remainder))
            })
    }
}

/// Static stub template using the legacy indexed protocol
pub fn stub_template() -> StubTemplate {
    StubTemplate::new(
        StubResolver::expected_name(TYPE_NAME),
        CallProtocol::Indexed,
        vec![ADD, SUBTRACT, MULTIPLY, DIVIDE],
    )
}

/// Typed calculator client
#[derive(Clone)]
pub struct CalculatorClient {
    handler: Arc<dyn InvocationHandler>,
}

impl CalculatorClient {
    pub fn new(handler: Arc<dyn InvocationHandler>) -> Self {
        Self { handler }
    }

    pub fn from_stub(stub: &Stub) -> Self {
        Self::new(Arc::clone(stub.handler()))
    }

    /// Client for the well-known calculator at `endpoint`
    pub fn connect(runtime: &RemoteRuntime, endpoint: Endpoint, legacy: bool) -> Self {
        let kind = if legacy {
            let template = stub_template();
            StubKind::Static {
                name: template.name,
                protocol: template.protocol,
                operations: template.operations.iter().map(MethodDef::hash).collect(),
            }
        } else {
            StubKind::Forwarding
        };
        let stub = runtime.attach(StubDescriptor {
            reference: RemoteReference::new(
                endpoint,
                ObjectIdentity::well_known(CALCULATOR_OBJECT),
            ),
            kind,
            interfaces: vec![INTERFACE.to_string()],
        });
        Self::from_stub(&stub)
    }

    pub async fn add(&self, a: i32, b: i32) -> remoteref::Result<i32> {
        call(self.handler.as_ref(), &ADD, &(a, b)).await
    }

    pub async fn subtract(&self, a: i32, b: i32) -> remoteref::Result<i32> {
        call(self.handler.as_ref(), &SUBTRACT, &(a, b)).await
    }

    pub async fn multiply(&self, a: i32, b: i32) -> remoteref::Result<i32> {
        call(self.handler.as_ref(), &MULTIPLY, &(a, b)).await
    }

    /// Quotient and remainder
    pub async fn divide(&self, a: i32, b: i32) -> remoteref::Result<(i32, i32)> {
        call(self.handler.as_ref(), &DIVIDE, &(a, b)).await
    }
}
