//! The Relto auth daemon.
//!
//! A single worker task owns the database pool, the global SDL registry,
//! and the login-restriction flag, and consumes a tagged message stream
//! one request at a time. Connection handlers enqueue requests and await
//! their oneshot replies; vault mutations fan out to interested sessions
//! through per-session broadcast channels before the originator sees its
//! reply.

pub mod broadcast;
pub mod daemon;
pub mod game;
pub mod message;
pub mod session;

pub use broadcast::BroadcastFrame;
pub use daemon::{bootstrap, AuthDaemon, BootstrapState};
pub use game::{GameLink, NoGameLink};
pub use message::AuthMessage;
pub use session::{Session, SessionTable};
