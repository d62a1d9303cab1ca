//! Target schema description model

mod column;
mod table;

pub use column::*;
pub use table::*;
