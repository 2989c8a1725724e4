//! moist-registry: per-device state folded from a stream of decoded packets
//!
//! One [`DeviceRegistry`] owns every [`DeviceHistory`] exclusively; callers
//! mutate state only through [`DeviceRegistry::record_packet`] and read it
//! back through clone/borrow queries. Designed for a single ingestion
//! writer with fan-out readers; the serving layer puts the explicit lock
//! around it.

mod error;
pub use error::{RegistryError, Result};

mod history;
pub use history::DeviceHistory;

mod registry;
pub use registry::{DeviceOverview, DeviceRegistry};
