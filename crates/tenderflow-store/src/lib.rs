pub mod cache;
pub mod key;
pub mod persistence;

pub use cache::ResultCache;
pub use key::cache_key;
pub use persistence::{load_results, save_results, ResultFormat};
