pub mod document;
pub mod events;
pub mod operation;
pub mod session;
pub mod health;
pub mod diagnostics;
pub mod error;

pub use document::*;
pub use events::*;
pub use operation::*;
pub use session::*;
pub use health::*;
pub use diagnostics::*;
pub use error::*;
