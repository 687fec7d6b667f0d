pub mod continuity;
pub mod recording;
