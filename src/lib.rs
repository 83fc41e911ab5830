pub mod action;
pub mod config;
pub mod connectivity;
pub mod device_client;
pub mod error;
pub mod formatting;
pub mod http_client;
pub mod parser;
pub mod system_network;

pub use action::{Action, ActionValue};
pub use device_client::{ActionOutcome, DeviceClient, ProtocolTiming};
pub use error::ActionError;
