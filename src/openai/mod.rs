//! # Upstream Collaborators
//!
//! Everything that talks to the OpenAI Realtime API on behalf of a session:
//! - `token`: mints the ephemeral session credential (request/response)
//! - `realtime`: opens and owns the realtime WebSocket connection
//! - `events`: translates upstream events into the client-facing vocabulary

pub mod events;
pub mod realtime;
pub mod token;

pub use events::{translate, Translation};
pub use realtime::{FromUpstream, UpstreamHandle};
pub use token::mint_ephemeral_token;
