//! Draft synchronization engine.
//!
//! Keeps a user's local edit of a server-owned value separate from the last
//! known server value, and reconciles the two in the background:
//! - background refetches only run while there is no local draft
//! - bursts of edits are debounced into one save, bounded by a max wait
//! - saves are applied optimistically and rolled back if the server rejects them
//!
//! Presentation code talks to a [`Binding`], whose value is always the draft
//! if one exists and the cached server value otherwise.

mod binding;
mod cache;
mod debounce;
mod draft;
mod engine;
mod event;
mod key;
mod mutation;
mod poller;
mod store;
mod worker;

pub use binding::Binding;
pub use cache::{CacheEntry, FetchTicket, RemoteCache};
pub use debounce::{DebounceState, Debouncer};
pub use draft::DraftStore;
pub use engine::{SyncConfig, SyncEngine};
pub use event::{SyncEvent, SyncStatus};
pub use key::ResourceKey;
pub use mutation::{PendingMutation, Settled};
pub use store::{FetchDiscard, SyncStore};
