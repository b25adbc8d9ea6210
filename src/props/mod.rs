//! Derived props and the comparisons that decide whether a consumer re-renders.

mod equality;
mod value;

pub use equality::{shallow_equal, Identical, ShallowEq};
pub use value::{PropValue, Props};
