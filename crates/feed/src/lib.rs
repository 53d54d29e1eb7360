//! Concrete collaborators that make the relay runnable without a live
//! message network.
//!
//! - `source` - JSON-lines [`MessageSource`](mediarelay_core::relay::MessageSource)
//! - `directory` - Sender names learned from the feed
//! - `fetcher` - Copies local files into the media directory layout
//! - `outbox` - Replies to self as JSON lines

pub mod directory;
pub mod fetcher;
pub mod outbox;
pub mod source;

pub use directory::PeerDirectory;
pub use fetcher::LocalMediaFetcher;
pub use outbox::JsonLinesOutbox;
pub use source::JsonLinesSource;
