pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod feature;
pub mod hash;
pub mod index;
pub mod query;
pub mod search;
pub mod utils;

pub use config::{ExtractOptions, Opts};
pub use error::{ImageError, ImageResult};
pub use extract::{ImageEnricher, ImageFieldMapping};
pub use feature::{DescriptorKind, FeatureVector};
pub use hash::{HashContext, HashFamily};
pub use query::{ImageQuery, ImageQueryBuilder};
pub use search::Searcher;
