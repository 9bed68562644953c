/// Listen party coordination
pub mod hub;
pub mod registry;

pub use hub::{ConnectionId, GuestTicket, HubHandle, Origin, Outbound, SessionInfo};
pub use registry::SessionRegistry;
