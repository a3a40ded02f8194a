//! Engine core: gated dispatch, result streaming, detached runs.
//!
//! Internal modules:
//! - [`gate`]: counting-permit bound on outstanding tasks;
//! - [`dispatcher`]: epoch loop, job construction, event-driven drain;
//! - [`stream`]: result channel protocol and the consuming stream;
//! - [`detached`]: fire-and-forget mode with the advisory deadline;
//! - [`phase`]: per-invocation lifecycle state machine;
//! - [`core`]: the [`Engine`] facade and builder.

mod core;
mod detached;
mod dispatcher;
mod gate;
mod phase;
mod stream;

pub use self::core::{parallel_map, Engine, EngineBuilder};
pub use detached::DetachedReport;
pub use phase::Phase;
pub use stream::{FlatStream, ResultStream, RunSummary};
