//! Wire types shared between the desk client and the simulation server.

pub mod domain;
pub mod error;
pub mod protocol;
