use geo::Point;
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

/// A coordinate is usable when it lies on the globe and is not the (0, 0)
/// "no fix" sentinel some cameras write instead of omitting the tags.
pub fn is_valid_coordinate(lat: f64, lng: f64) -> bool {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return false;
    }
    !(lat == 0.0 && lng == 0.0)
}

pub fn round_to_decimals(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Round a point (x = longitude, y = latitude) to the given decimal precision.
pub fn round_point(point: Point, decimals: u32) -> Point {
    Point::new(
        round_to_decimals(point.x(), decimals),
        round_to_decimals(point.y(), decimals),
    )
}

#[derive(Clone)]
pub struct HashableCoord {
    lng_scaled: i64,
    lat_scaled: i64,
    rounded: Point,
}

impl HashableCoord {
    pub fn new(point: Point, decimals: u32) -> Self {
        let factor = 10f64.powi(decimals as i32);
        let rounded = round_point(point, decimals);
        HashableCoord {
            lng_scaled: (rounded.x() * factor).round() as i64,
            lat_scaled: (rounded.y() * factor).round() as i64,
            rounded,
        }
    }

    pub fn point(&self) -> Point {
        self.rounded
    }
}

impl PartialEq for HashableCoord {
    fn eq(&self, other: &Self) -> bool {
        self.lng_scaled == other.lng_scaled && self.lat_scaled == other.lat_scaled
    }
}

impl Eq for HashableCoord {}

impl Hash for HashableCoord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.lng_scaled.hash(state);
        self.lat_scaled.hash(state);
    }
}

#[derive(Debug)]
pub struct DedupeStats {
    pub final_count: usize,
    pub removed_count: usize,
    pub removal_percentage: f64,
}

impl DedupeStats {
    pub fn print(&self) {
        println!(
            "Removed {} duplicate coordinates ({:.2}% reduction)",
            self.removed_count, self.removal_percentage
        );
        println!("Final coordinate count: {}", self.final_count);
    }
}

/// Round every point to `decimals` and drop exact duplicates. Output order is
/// not the input order (set semantics).
pub fn dedupe_batch(points: Vec<Point>, decimals: u32) -> (Vec<Point>, DedupeStats) {
    let original_count = points.len();

    if original_count == 0 {
        return (
            points,
            DedupeStats {
                final_count: 0,
                removed_count: 0,
                removal_percentage: 0.0,
            },
        );
    }

    let unique: HashSet<HashableCoord> = points
        .into_par_iter()
        .progress_count(original_count as u64)
        .map(|p| HashableCoord::new(p, decimals))
        .collect();

    let deduped: Vec<Point> = unique.into_iter().map(|c| c.point()).collect();

    let final_count = deduped.len();
    let removed_count = original_count - final_count;
    let removal_percentage = (removed_count as f64 / original_count as f64) * 100.0;

    (
        deduped,
        DedupeStats {
            final_count,
            removed_count,
            removal_percentage,
        },
    )
}
