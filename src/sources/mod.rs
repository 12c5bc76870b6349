pub mod browser;
pub mod direct;
