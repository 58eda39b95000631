pub mod http;
pub mod logger;
pub mod time;

pub use time::{parse_timemark, TimeValue};
