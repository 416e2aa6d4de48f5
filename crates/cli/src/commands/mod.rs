pub mod mutate;
pub mod report;
pub mod util;

pub use mutate::*;
pub use report::*;
pub use util::*;
