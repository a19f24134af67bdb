use chrono::{Duration, NaiveDateTime};
use geo::Point;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// A named time interval during which location samples reflect travel in
/// progress rather than a destination.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitWindow {
    pub name: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification<'a> {
    Included,
    Excluded(&'a str),
}

/// Test an instant against the configured windows, each widened by `buffer`
/// on both sides, inclusive. First match wins; windows are checked in
/// configuration order and need not be sorted or disjoint. Records without
/// an instant are conservatively kept.
pub fn classify<'a>(
    instant: Option<NaiveDateTime>,
    windows: &'a [TransitWindow],
    buffer: Duration,
) -> Classification<'a> {
    let Some(instant) = instant else {
        return Classification::Included;
    };
    for window in windows {
        let start = window.start - buffer;
        let end = window.end + buffer;
        if start <= instant && instant <= end {
            return Classification::Excluded(&window.name);
        }
    }
    Classification::Included
}

/// Excluded points retained per window, in instant order, for the companion
/// route structures.
#[derive(Default)]
pub struct TransitLog {
    routes: BTreeMap<String, Vec<(NaiveDateTime, Point)>>,
}

impl TransitLog {
    pub fn record(&mut self, window_name: &str, instant: NaiveDateTime, point: Point) {
        self.routes
            .entry(window_name.to_string())
            .or_default()
            .push((instant, point));
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn point_count(&self) -> usize {
        self.routes.values().map(|points| points.len()).sum()
    }

    /// Write `var transitRoutes = {...};` and `var transitSegments = [...];`
    /// as a source-embeddable companion to the heat store.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        let mut routes = serde_json::Map::new();
        let mut segments = Vec::new();

        for (name, points) in &self.routes {
            let mut ordered = points.clone();
            ordered.sort_by_key(|(instant, _)| *instant);

            let coords: Vec<serde_json::Value> = ordered
                .iter()
                .map(|(_, p)| serde_json::json!([p.y(), p.x()]))
                .collect();

            if let (Some((_, first)), Some((_, last))) = (ordered.first(), ordered.last()) {
                segments.push(serde_json::json!({
                    "name": name,
                    "start": [first.y(), first.x()],
                    "end": [last.y(), last.x()],
                }));
            }
            routes.insert(name.clone(), serde_json::Value::Array(coords));
        }

        let content = format!(
            "var transitRoutes = {};\nvar transitSegments = {};",
            serde_json::Value::Object(routes),
            serde_json::Value::Array(segments),
        );
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)
    }
}
