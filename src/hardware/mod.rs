//! Relay outputs and sensor inputs of the board
//!
//! ```text
//! hardware/
//! ├── pin_poller.rs        - one polling thread per input pin, reports level changes
//! ├── input_dispatcher.rs  - single consumer of all poller events, keeps latest levels
//! ├── relay_actuator.rs    - pulse generation on the relay outputs
//! └── hardware_handle.rs   - pin claiming, poller lifecycle and shutdown
//! ```

pub mod hardware_handle;
pub mod input_dispatcher;
pub mod pin_poller;
pub mod relay_actuator;

pub use hardware_handle::{HardwareError, HardwareHandle, HardwareSettings};
pub use input_dispatcher::InputDispatcher;
pub use pin_poller::InputChange;
pub use relay_actuator::{ActuatorError, RelayActuator};
