pub mod dispatcher;
pub mod error;
pub mod models;
pub mod render;
pub mod session;
pub mod surface;

pub use dispatcher::{Dispatcher, TurnState};
pub use error::ChatError;
pub use models::*;
pub use render::{ChartFragment, ChartScript, Reply, Table};
pub use session::{Canceller, ChatSession, TurnOutcome};
pub use surface::*;
