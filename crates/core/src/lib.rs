pub mod config;
pub mod context;
pub mod error;
pub mod ids;
pub mod model;
pub mod random;

pub use context::{TRACEPARENT_HEADER, TraceContext, TraceFlags};
pub use error::{PaytraceError, Result};
pub use random::RandomSource;
