pub mod auction;
pub mod bid;
pub mod config;
pub mod deal;
pub mod primitives;

pub use auction::*;
pub use bid::*;
pub use config::*;
pub use deal::*;
pub use primitives::*;
