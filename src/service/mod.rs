pub mod client;
pub mod protocol;
pub mod updates;

pub use client::{RecognitionService, ServiceClient};
pub use updates::spawn_push_channel;
