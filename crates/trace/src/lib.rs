pub mod export;
pub mod propagation;
pub mod sink;
pub mod span;

pub use export::SpanExporter;
pub use sink::{SinkConfig, SpanSink};
pub use span::{Span, Tracer};
