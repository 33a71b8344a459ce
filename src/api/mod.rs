//! Purpose: Define the public API boundary for the client surface.
//! Exports: Session config, client, typed resources, pagination types.
//! Role: The only public path to transport and pagination internals.
//! Invariants: Wire envelope details stay private to their modules.

mod client;
mod pages;
mod resources;
mod session;
mod transport;

pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::record::{FieldValue, Record};
pub use client::{CategoryRef, ElabClient, TeamRef, TeamScope};
pub use pages::{DEFAULT_PAGE_SIZE, Filter, ListQuery, RecordPages};
pub use resources::{Attachment, Experiment, Item, Listable, Listing, Team, User};
pub use session::{Session, TlsPolicy};
pub use transport::Transport;

pub(crate) use resources::attachments_of;
