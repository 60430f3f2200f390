pub mod discovery;
pub mod ffmpeg_backend;
pub mod jpeg;
pub mod service;
pub mod still;
pub mod traits;
