pub mod access;
pub mod broadcast;
pub mod error;
pub mod presence;
pub mod registry;
pub mod synchronizer;

pub use broadcast::OperationBroadcaster;
pub use error::SyncError;
pub use presence::PresenceTracker;
pub use registry::{LeaveOutcome, Outbound, RoomMember, SessionRegistry};
pub use synchronizer::{AppliedOperation, DocSynchronizer};
