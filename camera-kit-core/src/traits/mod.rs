pub mod camera_device;
pub mod capture_delegate;
pub mod frame_sink;
pub mod media_library;
