//! Process-facing queue API: handles, modes and URL groups.

pub mod handle;
pub mod mode;
pub mod url_group;

pub use handle::{ControllerQueue, QueueHandle, QueueReceiver, ReceiverQueue, RequestQueue};
pub use mode::{Controller, Mode, QueueMode, Receiver};
pub use url_group::UrlGroup;
