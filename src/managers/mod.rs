// bookmark-sync state managers
// Managers own in-process state: the session identity, the bookmark list, and the mutations applied to it.

pub mod bookmark_store;
pub mod mutation_dispatcher;
pub mod session_holder;
