pub mod session;
pub mod token;

pub use session::*;
pub use token::*;
