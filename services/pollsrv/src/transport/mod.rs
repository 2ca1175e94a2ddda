//! Register read transports

pub mod mock;
pub mod rtu;
pub mod simulated;
pub mod traits;

pub use mock::{MockCall, MockTransport};
pub use rtu::{RtuConfig, RtuTransport};
pub use simulated::SimulatedTransport;
pub use traits::{ReadRequest, Transport};
