//! Exportable implementations

use super::method_table::MethodTableBuilder;
use crate::types::InterfaceDef;
use std::sync::Arc;

/// An implementation that can be exported for remote invocation.
///
/// The implementation lists the interfaces it is remote-capable through and
/// binds one handler per declared method:
///
/// ```
/// use std::sync::Arc;
/// use remoteref::{InterfaceDef, MethodDef, MethodTableBuilder, RemoteObject};
///
/// const ADD: MethodDef = MethodDef::new("demo.Adder", "add(int,int)", "int");
/// const ADDER: InterfaceDef = InterfaceDef::new("demo.Adder", &[ADD]);
///
/// struct Adder;
///
/// impl RemoteObject for Adder {
///     fn interfaces(&self) -> &'static [&'static InterfaceDef] {
///         &[&ADDER]
///     }
///
///     fn bind_methods(self: Arc<Self>, methods: MethodTableBuilder) -> MethodTableBuilder {
///         methods.infallible(ADD, |(a, b): (i32, i32)| async move { a + b })
///     }
/// }
/// ```
pub trait RemoteObject: Send + Sync + 'static {
    /// Remote-capable interfaces, in declaration order
    fn interfaces(&self) -> &'static [&'static InterfaceDef];

    /// Name used to look up a pre-generated stub
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Bind a handler for every declared method
    fn bind_methods(self: Arc<Self>, methods: MethodTableBuilder) -> MethodTableBuilder;
}
