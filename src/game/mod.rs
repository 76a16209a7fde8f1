//! Game server plugin link.
//!
//! - `frames`: JSON frame types exchanged with the plugin
//! - `codec`: newline-delimited framing
//! - `link`: TCP server and frame dispatch

pub mod codec;
pub mod frames;
pub mod link;

pub use link::GameLink;
