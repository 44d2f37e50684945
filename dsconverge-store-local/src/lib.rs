//! Local backends for dsconverge: a directory server simulated in a file,
//! and the event log both it and the managed state are kept in.

pub mod journal;
pub mod server;

pub use journal::Journal;
pub use server::LocalServer;
