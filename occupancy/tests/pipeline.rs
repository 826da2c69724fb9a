use centrack::{CrossingDirection, Point};
use chrono::{Duration as ChronoDuration, Local};
use occupancy::{MonitorConfig, OccupancyMonitor};
use std::path::Path;
use std::time::{Duration, Instant};

fn config(dir: &Path) -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.counting.line_y = 300.0;
    config.dwell.db_path = dir.join("dwell_time.db");
    config.occupancy.db_path = dir.join("occupancy.db");
    config.occupancy.interval_secs = 3600.0;
    config
}

/// Feed one person walking through `ys` at x, one frame every 33ms from `start`
fn walk(
    monitor: &mut OccupancyMonitor,
    start: Instant,
    x: f32,
    ys: &[f32],
    timestamp: chrono::DateTime<Local>,
) -> (u32, u32) {
    ys.iter().enumerate().fold((0, 0), |(entries, exits), (i, &y)| {
        let now = start + Duration::from_millis(33 * i as u64);
        let counts = monitor
            .process_frame_at(&[Point::new(x, y)], now, timestamp)
            .unwrap();
        (entries + counts.entries, exits + counts.exits)
    })
}

/// Empty frames long enough for every identity to retire
fn clear_scene(monitor: &mut OccupancyMonitor, at: Instant) {
    monitor
        .process_frame_at(&[], at, Local::now())
        .unwrap();
}

#[test]
fn visit_is_counted_timed_and_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let mut monitor = OccupancyMonitor::new(config(dir.path())).unwrap();
    let start = Instant::now();
    let entered_at = Local::now() - ChronoDuration::minutes(47);

    let (entries, exits) = walk(&mut monitor, start, 320.0, &[250.0, 270.0, 290.0, 310.0], entered_at);
    assert_eq!((entries, exits), (1, 0));
    assert_eq!(monitor.stats().current_occupancy, 1);
    clear_scene(&mut monitor, start + Duration::from_secs(5));

    let (entries, exits) = walk(
        &mut monitor,
        start + Duration::from_secs(6),
        320.0,
        &[330.0, 310.0, 290.0],
        Local::now(),
    );
    assert_eq!((entries, exits), (0, 1));
    assert_eq!(monitor.stats().current_occupancy, 0);

    // Different identities walked in and out, so the ledger has one open session
    // for the first and an unmatched exit for the second
    let store = monitor.dwell_store();
    assert_eq!(store.active_count(), 1);
    assert_eq!(store.active_sessions()[0].track_id, 1);

    let events = monitor.snapshotter().events(1).unwrap();
    let kinds: Vec<CrossingDirection> = events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![CrossingDirection::Entry, CrossingDirection::Exit]);
    assert_eq!(events[1].occupancy_after, 0);

    monitor.shutdown().unwrap();
    assert_eq!(monitor.snapshotter().history(1).unwrap().len(), 1);
}

#[test]
fn jitter_on_the_line_counts_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut monitor = OccupancyMonitor::new(config(dir.path())).unwrap();
    let (entries, exits) = walk(
        &mut monitor,
        Instant::now(),
        200.0,
        &[280.0, 290.0, 305.0, 295.0, 302.0, 298.0, 303.0, 297.0, 306.0],
        Local::now(),
    );
    assert_eq!(entries + exits, 1);
    assert_eq!(monitor.dwell_store().active_count(), 1);
}

#[test]
fn restart_recovers_open_sessions_without_reusing_ids() {
    let dir = tempfile::tempdir().unwrap();
    let entered_at = Local::now() - ChronoDuration::minutes(130);
    {
        let mut monitor = OccupancyMonitor::new(config(dir.path())).unwrap();
        walk(&mut monitor, Instant::now(), 100.0, &[280.0, 290.0, 310.0], entered_at);
        monitor.shutdown().unwrap();
    }

    let mut monitor = OccupancyMonitor::new(config(dir.path())).unwrap();
    let store = monitor.dwell_store();
    let active = store.active_sessions();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].track_id, 1);
    assert_eq!(
        active[0].entry_time.timestamp_micros(),
        entered_at.timestamp_micros()
    );
    assert_eq!(store.campers(None).len(), 1);

    // The next identity must not be confused with the recovered session
    let (_, exits) = walk(&mut monitor, Instant::now(), 100.0, &[320.0, 310.0, 290.0], Local::now());
    assert_eq!(exits, 1);
    assert_eq!(monitor.dwell_store().active_count(), 1);
    assert_eq!(monitor.stats().current_occupancy, 0);
}

#[test]
fn daily_reset_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let mut monitor = OccupancyMonitor::new(config(dir.path())).unwrap();
    walk(&mut monitor, Instant::now(), 100.0, &[280.0, 290.0, 310.0], Local::now());

    monitor.daily_reset();
    assert_eq!(monitor.stats().total_entries, 0);
    assert_eq!(monitor.snapshotter().current().current_occupancy, 1);

    let report_path = dir.path().join("report.json");
    let report = monitor.dwell_store().export_report(&report_path, 30).unwrap();
    assert_eq!(report.active_sessions.len(), 1);
    assert!(report_path.exists());
}
