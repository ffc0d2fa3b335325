pub mod camera;
pub mod pick;

pub use camera::{CameraMatrices, ViewportState};
pub use pick::{pick, PickRequest, PickResult};
