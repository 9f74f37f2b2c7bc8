pub mod cache;
pub mod client;
pub mod model;
pub mod resource;

pub use cache::*;
pub use client::*;
pub use resource::*;
