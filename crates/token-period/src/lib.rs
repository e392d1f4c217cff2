//! Mining token periods.
//!
//! A mining token covers a fixed, calendar-aligned time range. The range is
//! packed into a single 256-bit token id as `(start_ts << 128) | end_ts` so
//! that the id alone is enough to recover the bucket it represents.
//!
//! ```
//! use mining_token_period::{Granularity, Period, day, generator};
//!
//! let start = day::parse_day("2022-02-03").unwrap();
//! let end = day::parse_day("2022-03-03").unwrap();
//! let weeks = generator::generate(start, end, Granularity::Weekly).unwrap();
//!
//! let id = weeks[0].token_id();
//! assert_eq!(Period::decode(id).unwrap(), weeks[0]);
//! ```

pub mod codec;
pub mod day;
mod error;
pub mod generator;
mod granularity;
mod period;

pub use codec::TokenId;
pub use error::{PeriodError, Result};
pub use granularity::Granularity;
pub use period::Period;
