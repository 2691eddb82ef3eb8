pub mod deriver;
pub mod indicators;


pub use deriver::*;
pub use indicators::*;
