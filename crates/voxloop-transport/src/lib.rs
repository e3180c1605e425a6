pub mod session;
pub mod wire;

pub use session::{LiveSender, LiveSession};
