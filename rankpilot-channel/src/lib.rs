pub mod capacity;
pub mod channel;

pub use capacity::{CapacityError, CapacityTracker, ChannelCapacity};
pub use channel::Channel;
