/// Telemetry retrieval and the device catalog

mod query;
mod registry;

pub use query::{SearchFilter, TelemetryQueryEngine, DEFAULT_PAGE_SIZE};
pub use registry::{DeviceRegistry, RegisterDeviceRequest, UpdateDeviceRequest};
