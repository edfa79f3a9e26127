//! Attendance service models

pub mod device;
pub mod entry;
pub mod session;

// Re-export for convenience
pub use device::DeviceMap;
pub use entry::{Entry, EntryDraft};
pub use session::{ClosedSession, Session, SessionKey, SessionStatus};
