//! Pairing detected people with the motorcycle they ride.

use serde::{Deserialize, Serialize};

use crate::detect::Detection;
use crate::geometry::iou;

/// Spatial thresholds for rider eligibility.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// How far below the motorcycle center a person center may sit, in pixels.
    pub vertical_tolerance: f32,
    pub min_iou: f32,
    pub max_center_distance: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            vertical_tolerance: 50.0,
            min_iou: 0.10,
            max_center_distance: 100.0,
        }
    }
}

/// A person associated with the motorcycle nearest to it.
#[derive(Clone, Copy, Debug)]
pub struct RiderMatch<'a> {
    pub person: &'a Detection,
    pub motorcycle: &'a Detection,
    pub distance: f32,
}

#[derive(Clone, Debug, Default)]
pub struct RiderMatcher {
    config: MatcherConfig,
}

impl RiderMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Match each person to at most one motorcycle.
    ///
    /// A person is eligible for a motorcycle when its center is not more than
    /// `vertical_tolerance` below the motorcycle center and the boxes either
    /// overlap by more than `min_iou` or have centers closer than
    /// `max_center_distance`. The nearest eligible motorcycle wins; ties keep
    /// the earlier one. Output follows the order of `people`.
    pub fn match_riders<'a>(
        &self,
        people: &'a [Detection],
        motorcycles: &'a [Detection],
    ) -> Vec<RiderMatch<'a>> {
        let mut matches = Vec::new();

        for person in people {
            let p_center = person.bbox.center();
            let mut best: Option<(&Detection, f32)> = None;

            for moto in motorcycles {
                let m_center = moto.bbox.center();
                if p_center.y >= m_center.y + self.config.vertical_tolerance {
                    continue;
                }

                let overlap = iou(&person.bbox, &moto.bbox);
                let distance = p_center.distance(&m_center);
                if overlap <= self.config.min_iou && distance >= self.config.max_center_distance {
                    continue;
                }

                if best.map_or(true, |(_, d)| distance < d) {
                    best = Some((moto, distance));
                }
            }

            if let Some((motorcycle, distance)) = best {
                matches.push(RiderMatch {
                    person,
                    motorcycle,
                    distance,
                });
            }
        }

        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;

    fn matcher() -> RiderMatcher {
        RiderMatcher::default()
    }

    #[test]
    fn identical_boxes_always_match() {
        let people = [Detection::person(0.9, BBox::new(100.0, 100.0, 200.0, 300.0))];
        let motos = [Detection::motorcycle(0.9, BBox::new(100.0, 100.0, 200.0, 300.0))];
        let matches = matcher().match_riders(&people, &motos);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].distance, 0.0);
    }

    #[test]
    fn distant_person_is_unmatched() {
        let people = [Detection::person(0.9, BBox::new(1000.0, 0.0, 1050.0, 100.0))];
        let motos = [Detection::motorcycle(0.9, BBox::new(0.0, 0.0, 100.0, 100.0))];
        assert!(matcher().match_riders(&people, &motos).is_empty());
    }

    #[test]
    fn person_far_below_motorcycle_is_unmatched() {
        // Overlapping, but the person center is 60px below the motorcycle center.
        let people = [Detection::person(0.9, BBox::new(0.0, 60.0, 100.0, 160.0))];
        let motos = [Detection::motorcycle(0.9, BBox::new(0.0, 0.0, 100.0, 100.0))];
        assert!(matcher().match_riders(&people, &motos).is_empty());
    }

    #[test]
    fn nearest_motorcycle_wins() {
        let people = [Detection::person(0.9, BBox::new(100.0, 50.0, 140.0, 150.0))];
        let motos = [
            Detection::motorcycle(0.9, BBox::new(40.0, 100.0, 140.0, 180.0)),
            Detection::motorcycle(0.9, BBox::new(90.0, 100.0, 150.0, 180.0)),
        ];
        let matches = matcher().match_riders(&people, &motos);
        assert_eq!(matches.len(), 1);
        assert!(std::ptr::eq(matches[0].motorcycle, &motos[1]));
    }

    #[test]
    fn tie_keeps_first_motorcycle() {
        let people = [Detection::person(0.9, BBox::new(40.0, 0.0, 60.0, 40.0))];
        let motos = [
            Detection::motorcycle(0.9, BBox::new(0.0, 0.0, 40.0, 40.0)),
            Detection::motorcycle(0.9, BBox::new(60.0, 0.0, 100.0, 40.0)),
        ];
        let matches = matcher().match_riders(&people, &motos);
        assert!(std::ptr::eq(matches[0].motorcycle, &motos[0]));
    }

    #[test]
    fn motorcycle_may_carry_several_riders() {
        let people = [
            Detection::person(0.9, BBox::new(100.0, 80.0, 150.0, 200.0)),
            Detection::person(0.8, BBox::new(130.0, 80.0, 180.0, 200.0)),
        ];
        let motos = [Detection::motorcycle(0.9, BBox::new(90.0, 120.0, 200.0, 240.0))];
        let matches = matcher().match_riders(&people, &motos);
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| std::ptr::eq(m.motorcycle, &motos[0])));
    }
}
