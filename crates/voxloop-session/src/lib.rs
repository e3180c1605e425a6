pub mod controller;
pub mod history;
pub mod transcript;

pub use controller::SessionController;
pub use history::{FileHistory, HistorySink, MemoryHistory};
pub use transcript::TurnAccumulator;
