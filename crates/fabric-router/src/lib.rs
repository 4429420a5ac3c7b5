pub mod control_channel;
pub mod dial;
pub mod registry;

pub use dial::{DialWorkerPool, Dialer, NullDialer};
pub use registry::LinkRegistry;
