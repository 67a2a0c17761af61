//! Inbound adapter, result dispatcher and their bus bindings.

pub mod bus_adapter;
pub mod dispatcher;
pub mod handler;
pub mod validation;

pub use bus_adapter::{BusCommandSender, ConnectionMonitor, ResultRouter, TransportStatus};
pub use dispatcher::{DispatchOutcome, ResultDispatcher, ResultEvent};
pub use handler::PromptHandler;
pub use validation::parse_prompt_request;
