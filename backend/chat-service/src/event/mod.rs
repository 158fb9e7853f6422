pub mod bus;

pub use bus::{ChatEvent, EventBus};
