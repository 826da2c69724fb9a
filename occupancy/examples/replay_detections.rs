// Replay recorded detections through the occupancy pipeline
//
// Usage: cargo run --example replay_detections -- <detections.jsonl> [monitor.toml]
//
// Each input line is one frame: a JSON array of [x, y] centroids, e.g.
//   [[320.0, 250.0], [100.5, 40.0]]
use centrack::Point;
use occupancy::{MonitorConfig, OccupancyMonitor};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::time::{Duration, Instant};

const FRAME_INTERVAL: Duration = Duration::from_millis(33);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let Some(input) = args.get(1) else {
        eprintln!("usage: {} <detections.jsonl> [monitor.toml]", args[0]);
        std::process::exit(2);
    };
    let config = match args.get(2) {
        Some(path) => MonitorConfig::from_file(path)?,
        None => MonitorConfig::default(),
    };

    log::info!("Replaying {} (line_y={})", input, config.counting.line_y);
    let mut monitor = OccupancyMonitor::new(config)?;

    // Frame times are synthetic so disappearance windows behave as at 30fps
    let start = Instant::now();
    let reader = BufReader::new(File::open(input)?);
    let mut frames = 0_u32;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let raw: Vec<[f32; 2]> = match serde_json::from_str(&line) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Skipping line {}: {}", line_no + 1, e);
                continue;
            }
        };
        let detections: Vec<Point> = raw.into_iter().map(Point::from).collect();

        let now = start + FRAME_INTERVAL * frames;
        frames += 1;
        let counts = monitor.process_frame_at(&detections, now, chrono::Local::now())?;
        if counts.entries > 0 || counts.exits > 0 {
            println!(
                "frame {:>6}: +{} -{} -> occupancy {}",
                frames,
                counts.entries,
                counts.exits,
                monitor.stats().current_occupancy
            );
        }
    }

    let stats = monitor.stats();
    println!("\n📊 Replay summary");
    println!("   Frames:       {}", frames);
    println!("   Entries:      {}", stats.total_entries);
    println!("   Exits:        {}", stats.total_exits);
    println!("   Occupancy:    {}", stats.current_occupancy);
    println!(
        "   Open sessions: {}",
        monitor.dwell_store().active_count()
    );

    let dwell = monitor.dwell_store().statistics(1)?;
    if dwell.total_visits > 0 {
        println!(
            "   Avg dwell:    {:.1} min over {} visits",
            dwell.avg_dwell_minutes, dwell.total_visits
        );
    }

    monitor.shutdown()?;
    Ok(())
}
