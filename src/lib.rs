pub mod camera;
pub mod config;
pub mod csv_loader;
pub mod gesture_classifier;
pub mod gesture_debouncer;
pub mod landmarks;
pub mod navigation;
pub mod panorama;
pub mod pipeline;
pub mod types;
