pub mod build;
pub mod compact;
pub mod filter;
pub mod phrase;
pub mod posting;
pub mod posting_store;
pub mod reader;
pub mod session;
pub mod stats;
pub mod types;

pub use phrase::{PhraseMatcher, Proximity};
pub use posting_store::PostingStore;
pub use reader::IndexReader;
pub use session::IndexSession;
pub use types::*;
