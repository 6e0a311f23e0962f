pub(crate) mod paths;
pub(crate) mod serde;
pub mod time;
