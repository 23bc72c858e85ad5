//! Table naming and direct table access.

mod direct;
mod name;

pub use direct::*;
pub use name::*;

#[cfg(test)]
mod direct_test;
#[cfg(test)]
mod name_test;
