use serde::{Deserialize, Serialize};

use crate::geometry::BBox;

/// COCO class index for people.
pub const COCO_PERSON: u32 = 0;
/// COCO class index for motorcycles.
pub const COCO_MOTORCYCLE: u32 = 3;

/// Object categories the pipeline distinguishes.
///
/// Only `Person` and `Motorcycle` take part in matching; the rest are kept
/// for the raw detection record.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClass {
    Person,
    Bicycle,
    Car,
    Motorcycle,
    Bus,
    Unknown,
}

impl ObjectClass {
    /// Label for a class index of a COCO-trained detector.
    pub fn from_coco_id(class_id: u32) -> Self {
        match class_id {
            0 => ObjectClass::Person,
            1 => ObjectClass::Bicycle,
            2 => ObjectClass::Car,
            3 => ObjectClass::Motorcycle,
            4 => ObjectClass::Bus,
            _ => ObjectClass::Unknown,
        }
    }
}

/// One detector output box. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_id: u32,
    pub class_name: ObjectClass,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: BBox,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, bbox: BBox) -> Self {
        Self {
            class_id,
            class_name: ObjectClass::from_coco_id(class_id),
            confidence,
            bbox,
        }
    }

    pub fn person(confidence: f32, bbox: BBox) -> Self {
        Self::new(COCO_PERSON, confidence, bbox)
    }

    pub fn motorcycle(confidence: f32, bbox: BBox) -> Self {
        Self::new(COCO_MOTORCYCLE, confidence, bbox)
    }
}

/// A frame's detections partitioned by role.
#[derive(Clone, Debug, Default)]
pub struct FrameDetections {
    pub motorcycles: Vec<Detection>,
    pub people: Vec<Detection>,
    /// Every box the detector returned, in detector order.
    pub boxes: Vec<Detection>,
}

/// Split raw detector output into motorcycles and people.
pub fn split_detections(detections: Vec<Detection>) -> FrameDetections {
    let mut out = FrameDetections::default();
    for det in &detections {
        match det.class_name {
            ObjectClass::Motorcycle => out.motorcycles.push(det.clone()),
            ObjectClass::Person => out.people.push(det.clone()),
            _ => {}
        }
    }
    out.boxes = detections;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keeps_all_boxes_and_routes_roles() {
        let dets = vec![
            Detection::person(0.9, BBox::new(0.0, 0.0, 10.0, 10.0)),
            Detection::new(2, 0.8, BBox::new(0.0, 0.0, 50.0, 50.0)),
            Detection::motorcycle(0.7, BBox::new(5.0, 5.0, 40.0, 40.0)),
        ];
        let split = split_detections(dets);
        assert_eq!(split.people.len(), 1);
        assert_eq!(split.motorcycles.len(), 1);
        assert_eq!(split.boxes.len(), 3);
        assert_eq!(split.boxes[1].class_name, ObjectClass::Car);
    }

    #[test]
    fn detection_serialises_with_class_and_box_keys() {
        let det = Detection::motorcycle(0.5, BBox::new(1.0, 2.0, 3.0, 4.0));
        let value = serde_json::to_value(&det).unwrap();
        assert_eq!(value["class"], 3);
        assert_eq!(value["class_name"], "motorcycle");
        assert_eq!(value["box"][3], 4.0);
    }
}
