mod acl;
mod action;
mod identifier;
mod snippet;

pub use acl::*;
pub use action::*;
pub use identifier::*;
pub use snippet::*;
