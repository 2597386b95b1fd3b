//! Adapter layer modules for external system integration.
//!
//! Provides adapters for:
//! - Device transport sessions (PC/SC backend behind `pcsc-backend`,
//!   in-memory mock for tests and development)
//! - Certificate authority issue/revoke commands
//! - Hardware entropy-source presence probing

pub mod ca;
pub mod entropy;
pub mod mock;
#[cfg(feature = "pcsc-backend")]
pub mod pcsc;
pub mod transport;

pub use ca::{CaClient, CommandCaClient, MockCaClient};
pub use entropy::{DeviceNodeEntropy, EntropySource, NoEntropySource};
pub use mock::{MockDeviceState, MockProvider, MockTransport};
#[cfg(feature = "pcsc-backend")]
pub use pcsc::PcscProvider;
pub use transport::{DeviceTransport, TransportProvider};
