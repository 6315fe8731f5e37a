pub mod bundle;
pub mod decoder;
pub mod locator;
pub mod pipeline;
