//! Resource store and watch source adapters
//!
//! - `api`: API-server backed `ResourceStore`
//! - `watch`: kube-runtime backed `WatchSource`
//! - `memory`: in-process `ResourceStore` for tests and dry runs

pub mod api;
pub mod memory;
pub mod watch;

pub use api::KubeResourceStore;
pub use memory::InMemoryStore;
pub use watch::{EventTranslator, KubeWatchSource};
