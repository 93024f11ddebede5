pub mod clustering;
pub mod compose;
pub mod editorial;
pub mod headlines;
pub mod scoring;

pub use compose::{build_editorial_market, compose_feed, FeedInputs};
