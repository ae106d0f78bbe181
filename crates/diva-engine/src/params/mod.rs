pub mod cache;
pub mod fingerprint;
pub mod highlighter;
pub mod matcher;

pub use cache::{CacheRecord, ParamCache};
pub use highlighter::Highlighter;
pub use matcher::{
    expand_data_wildcards, match_order, match_params, match_process_data, DataItem,
    MatchedParams, ParamValue, ReservedContext,
};
