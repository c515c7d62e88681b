pub mod close;
pub mod engine;
pub mod error;
pub mod events;
pub mod lanes;
pub mod processor;
pub mod results;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod validation;

pub use close::*;
pub use engine::*;
pub use error::*;
pub use events::*;
pub use lanes::*;
pub use processor::*;
pub use results::*;
pub use scheduler::*;
pub use store::*;
pub use types::*;
pub use validation::*;
