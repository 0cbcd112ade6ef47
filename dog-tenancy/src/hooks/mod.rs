pub mod filter;
pub mod stamp;

pub use filter::*;
pub use stamp::*;
