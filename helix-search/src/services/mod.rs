pub mod cancel;
pub mod msearch;
pub mod search;

pub use cancel::{CancellationToken, DropGuard};
pub use msearch::{PairDecoder, RawPair};
pub use search::{SearchCoordinator, merge_hits};
