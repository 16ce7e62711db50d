//! Auth-domain identifiers, audiences, and secret wrappers.

pub mod audience;
pub mod id;
pub mod secret;

pub use audience::*;
pub use id::*;
pub use secret::*;
