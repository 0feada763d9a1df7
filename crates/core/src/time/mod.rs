pub mod utc_day;

pub use utc_day::{day_bounds, parse_date, resolve_target_date};
