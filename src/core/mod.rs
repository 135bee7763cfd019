pub mod catalog;
pub mod duplicate;
pub mod hash;
pub mod ingest;
pub mod perceptual;
pub mod photo;
pub mod pixels;
pub mod quality;
pub mod thumbnail;
