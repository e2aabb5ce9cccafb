mod backend;
mod backends;
mod result;

pub use backend::DetectorBackend;
pub use backends::ScriptedBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{
    split_detections, Detection, FrameDetections, ObjectClass, COCO_MOTORCYCLE, COCO_PERSON,
};
