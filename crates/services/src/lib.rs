pub mod client;
pub mod error;
pub mod fraud;
pub mod injector;
pub mod notification;
pub mod payment;
pub mod server;
pub mod state;

pub use error::HopError;
pub use injector::{Injector, WorkOutcome, WorkProfile};
pub use server::{Hop, bind_hops, build_state, run_hops, serve_hop};
pub use state::{HopSettings, HopState};
