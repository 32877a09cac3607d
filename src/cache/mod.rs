pub mod path_cache;
pub mod short_link_cache;

pub use path_cache::{PathCache, PathCacheKey};
pub use short_link_cache::ShortLinkCache;
