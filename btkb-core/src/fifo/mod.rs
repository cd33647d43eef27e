//! The command rendezvous: a named FIFO, the thread that reads it, and the
//! backlog queue the relay consumes.

pub mod backlog;
pub mod reader;

pub use backlog::{Backlog, BacklogSender, LineRead, backlog};
pub use reader::{CommandStreamReader, FifoOptions, make_fifo, remove_fifo};
