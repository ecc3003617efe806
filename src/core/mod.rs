//! Device model and session management.
//!
//! ```text
//! core/
//! ├── naming.rs     - Name sanitizing and topic layout
//! ├── error.rs      - Configuration and decode errors
//! ├── session.rs    - Broker session shared with devices and functions
//! ├── function.rs   - Capability contract and the Function enum
//! ├── device.rs     - Device aggregate, discovery and routing
//! └── connector.rs  - Connect, poll and reconnect backoff
//! ```

pub mod connector;
pub mod device;
pub mod error;
pub mod function;
pub mod naming;
pub mod session;

pub use connector::{Connector, DeviceId, LinkState, BACKOFF_LADDER_MS};
pub use device::{Device, DeviceInfo};
pub use error::{DecodeError, Error, Result};
pub use function::{Capability, Function, FunctionCore};
pub use session::SessionLink;
