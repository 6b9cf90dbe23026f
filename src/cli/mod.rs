mod add;
mod gen_hash;
mod search;

pub use add::*;
pub use gen_hash::*;
pub use search::*;

use crate::config::Opts;

/// 存储图片路径的字段
pub const PATH_FIELD: &str = "path";

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}
