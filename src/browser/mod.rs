//! Browser automation engine: CDP client, element waiter, insertion and
//! submission strategies, delivery orchestration, and selector inference.

pub mod client;
pub mod deliver;
pub mod driver;
pub mod input;
pub mod picker;
pub mod selector;
pub mod submit;
pub mod waiter;

pub use client::BrowserClient;
pub use deliver::Orchestrator;
pub use driver::CdpDriver;
