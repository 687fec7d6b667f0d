pub mod container_writer;
pub mod library;
pub mod metadata;
pub mod paths;
