pub mod bucket;
pub mod local;
