mod config;
mod coordinate;
mod extract;
mod heat_store;
mod report;
mod scan_index;
mod timestamp;
mod transit;

use chrono::Datelike;
use config::PipelineConfig;
use coordinate::{dedupe_batch, is_valid_coordinate, round_point, round_to_decimals};
use extract::exif::ExifExtractor;
use extract::landmark::{CommandDetector, LandmarkExtractor};
use extract::takeout::TakeoutExtractor;
use extract::{Extractor, RawRecord};
use geo::Point;
use heat_store::HeatStore;
use report::{LocatedRecord, Reports, UnlocatedRecord};
use scan_index::ScanIndex;
use std::collections::BTreeMap;
use std::process;
use transit::{Classification, TransitLog};

#[derive(Default)]
struct RunSummary {
    files_seen: usize,
    files_reprocessed: usize,
    located: usize,
    unlocated: usize,
    transit_excluded: usize,
    unparsable_time: usize,
}

impl RunSummary {
    fn print(&self) {
        println!("\n--- Summary ---");
        println!("Files seen: {}", self.files_seen);
        println!("Files reprocessed this run: {}", self.files_reprocessed);
        println!("Photos with location: {}", self.located);
        println!("Photos without location: {}", self.unlocated);
        println!("Excluded as transit: {}", self.transit_excluded);
        println!("Timestamps unparsable: {}", self.unparsable_time);
    }
}

fn main() {
    let config = match PipelineConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if !config.root_dir.exists() {
        eprintln!("✗ photo root does not exist: {}", config.root_dir.display());
        process::exit(1);
    }

    let mut summary = RunSummary::default();

    let mut index = ScanIndex::load(&config.index_path());
    println!("Scan index: {} known files", index.len());

    // 1. extraction
    let mut records: Vec<RawRecord> = Vec::new();
    for extractor in build_extractors(&config) {
        println!("\n--- Running {} ---", extractor.name());
        match extractor.extract(&mut index) {
            Ok(extraction) => {
                summary.files_seen += extraction.files_seen;
                summary.files_reprocessed += extraction.files_processed;
                records.extend(extraction.records);
            }
            Err(e) => {
                println!("✗ {} failed: {}", extractor.name(), e);
            }
        }
    }

    // 2. validity partition and report update
    println!("\n--- Updating reports ---");
    let (located, unlocated) = partition_records(records, config.report_decimals);

    let mut reports = Reports::load(&config.located_path(), &config.unlocated_path());
    reports.absorb(located, unlocated);
    summary.located = reports.located.len();
    summary.unlocated = reports.unlocated.len();

    if let Err(e) = reports.write(&config.located_path(), &config.unlocated_path()) {
        println!("✗ failed to write report JSON: {}", e);
    }
    if let Err(e) = reports.write_csv(&config.csv_path()) {
        println!("✗ failed to write scan report CSV: {}", e);
    }
    println!(
        "✓ {} located / {} unlocated photos on record",
        summary.located, summary.unlocated
    );

    // 3. transit classification and heat merge over the cumulative set
    println!("\n--- Merging heat data ---");
    let windows = config.windows();
    let buffer = config.transit_buffer();
    let mut transit_log = TransitLog::default();
    let mut incoming: Vec<(Point, Option<String>)> = Vec::new();

    for record in &reports.located {
        let instant = record.time.as_deref().and_then(timestamp::normalize);
        if record.time.is_some() && instant.is_none() {
            summary.unparsable_time += 1;
        }

        match transit::classify(instant, &windows, buffer) {
            Classification::Excluded(name) => {
                summary.transit_excluded += 1;
                if config.keep_transit_points {
                    // absent instants are never excluded, so this is Some
                    if let Some(instant) = instant {
                        let point = Point::new(record.lng, record.lat);
                        transit_log.record(
                            name,
                            instant,
                            round_point(point, config.report_decimals),
                        );
                    }
                }
            }
            Classification::Included => {
                let point = round_point(Point::new(record.lng, record.lat), config.heat_decimals);
                let year = instant.map(|dt| dt.year().to_string());
                incoming.push((point, year));
            }
        }
    }

    println!("Deduplicating {} city-level coordinates...", incoming.len());
    let (_, stats) = dedupe_batch(
        incoming.iter().map(|(point, _)| *point).collect(),
        config.heat_decimals,
    );
    stats.print();

    let mut store = HeatStore::load(&config.heat_path(), config.heat_decimals);
    let before: BTreeMap<String, usize> = store.summary().into_iter().collect();
    store.merge(&incoming);

    for (bucket, merged) in store.summary() {
        let existing = before.get(&bucket).copied().unwrap_or(0);
        println!("  • {}: {} → {} coordinates", bucket, existing, merged);
    }

    match store.write(&config.heat_path(), &config.heat_backup_path()) {
        Ok(()) => println!("✓ Wrote {}", config.heat_path().display()),
        Err(e) => println!("✗ failed to write heat data: {}", e),
    }

    if config.keep_transit_points && !transit_log.is_empty() {
        match transit_log.write(&config.transit_routes_path()) {
            Ok(()) => println!(
                "✓ Wrote {} transit points to {}",
                transit_log.point_count(),
                config.transit_routes_path().display()
            ),
            Err(e) => println!("✗ failed to write transit routes: {}", e),
        }
    }

    // 4. persist the index last: a crash before this line only costs
    // redundant reprocessing next run, never outputs behind the index
    if let Err(e) = index.save(&config.index_path()) {
        println!(
            "✗ failed to persist scan index: {} (next run will reprocess)",
            e
        );
    }

    summary.print();
}

fn build_extractors(config: &PipelineConfig) -> Vec<Box<dyn Extractor>> {
    let mut extractors: Vec<Box<dyn Extractor>> = vec![Box::new(ExifExtractor::new(
        config.root_dir.clone(),
        config.extensions.clone(),
    ))];

    if let Some(takeout_dir) = &config.takeout_dir {
        extractors.push(Box::new(TakeoutExtractor::new(takeout_dir.clone())));
    }

    if config.landmark.enabled {
        match CommandDetector::new(&config.landmark.command, config.landmark.max_results) {
            Some(detector) => extractors.push(Box::new(LandmarkExtractor::new(
                config.root_dir.clone(),
                config.extensions.clone(),
                detector,
                config.landmark.pause(),
            ))),
            None => println!("⚠ landmark recognition enabled but no detector command configured"),
        }
    }

    extractors
}

/// Split raw records on the coordinate validity predicate. Valid coordinates
/// are kept at report precision; everything else joins the unlocated set.
fn partition_records(
    records: Vec<RawRecord>,
    report_decimals: u32,
) -> (Vec<LocatedRecord>, Vec<UnlocatedRecord>) {
    let mut located = Vec::new();
    let mut unlocated = Vec::new();

    for record in records {
        match (record.lat, record.lng) {
            (Some(lat), Some(lng)) if is_valid_coordinate(lat, lng) => {
                located.push(LocatedRecord {
                    file: record.file,
                    lat: round_to_decimals(lat, report_decimals),
                    lng: round_to_decimals(lng, report_decimals),
                    time: record.time,
                });
            }
            _ => unlocated.push(UnlocatedRecord { file: record.file }),
        }
    }

    (located, unlocated)
}
