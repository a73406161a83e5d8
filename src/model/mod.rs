pub mod design;
pub mod ols;
