mod freshness;
mod refresh;

pub use freshness::FreshnessTicker;
pub(crate) use refresh::run_refresh;
pub use refresh::RefreshTask;
