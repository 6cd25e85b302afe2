//! Anonymous Active Directory account enumeration over LDAP ping.

pub mod candidates;
pub mod cli;
pub mod discover;
pub mod namegen;
pub mod pipeline;
pub mod rootdse;
pub mod select;
pub mod session;
