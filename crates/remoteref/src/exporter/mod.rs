//! Server-side export machinery
//!
//! - `object`: the `RemoteObject` trait implementations provide
//! - `method_table`: build-once hash -> handler maps and legacy skeletons
//! - `table`: the per-runtime export table with in-flight accounting

mod method_table;
mod object;
mod table;

pub use method_table::{
    HandlerFuture, MethodEntry, MethodHandler, MethodTable, MethodTableBuilder, Skeleton,
};
pub use object::RemoteObject;
pub use table::{CallGuard, ExportEntry, ExportTable};
