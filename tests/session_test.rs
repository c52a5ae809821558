use chargelog::config::Config;
use chargelog::error::ChargelogError;
use chargelog::events::{EventBus, TransferEventKind};
use chargelog::sample::{ACCEPTED_LOG_HEADER, ChargingSample, Triad};
use chargelog::session::{PushOutcome, SessionManager};
use chargelog::validation::ValidationOutcome;
use chrono::NaiveDate;
use std::sync::Arc;
use tempfile::TempDir;

fn manager() -> (TempDir, SessionManager) {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config {
        data_root: tmp.path().to_string_lossy().to_string(),
        ..Config::default()
    };
    (tmp, SessionManager::new(&config, EventBus::new(256)))
}

fn reference_sample(vehicle_id: &str, row_index: u64) -> ChargingSample {
    ChargingSample {
        vehicle_id: vehicle_id.to_string(),
        timestamp: NaiveDate::from_ymd_opt(2023, 8, 4)
            .unwrap()
            .and_hms_opt(10, 15, 0)
            .unwrap(),
        voltage_rms: Triad::new(218.0, 220.0, 222.0),
        current_rms: Triad::new(9.5, 10.0, 10.5),
        real_power: Triad::new(2000.0, 2100.0, 2200.0),
        reactive_power: Triad::new(100.0, 110.0, 120.0),
        apparent_power: Triad::new(2050.0, 2150.0, 2250.0),
        frequency: Triad::new(49.9, 50.0, 50.1),
        row_index,
    }
}

#[test]
fn second_start_without_end_is_rejected() {
    let (_tmp, m) = manager();
    m.start_session("Tesla_Model3").unwrap();
    let err = m.start_session("Tesla_Model3").unwrap_err();
    assert!(matches!(err, ChargelogError::SessionAlreadyActive { .. }));
}

#[test]
fn reference_sample_appends_one_line_in_canonical_order() {
    let (_tmp, m) = manager();
    m.start_session("Tesla_Model3").unwrap();
    let outcome = m.push_sample(&reference_sample("Tesla_Model3", 1)).unwrap();
    assert_eq!(outcome, PushOutcome::Accepted { sample_count: 1 });
    let summary = m.end_session("Tesla_Model3").unwrap();

    let contents = std::fs::read_to_string(&summary.accepted_log).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[1],
        "2023-08-04 10:15:00,218,220,222,9.5,10,10.5,2000,2100,2200,100,110,120,2050,2150,2250,49.9,50,50.1,1"
    );
}

#[test]
fn end_after_zero_pushes_leaves_only_headers() {
    let (tmp, m) = manager();
    let id = m.start_session("Kia_EV6").unwrap();
    let summary = m.end_session("Kia_EV6").unwrap();
    assert_eq!(summary.session_id, id);
    assert_eq!(summary.sample_count, 0);
    assert!(summary.accepted_log.starts_with(tmp.path().join("Kia_EV6")));
    assert!(
        summary
            .accepted_log
            .ends_with(format!("session_{id}.csv"))
    );

    assert_eq!(
        std::fs::read_to_string(&summary.accepted_log).unwrap(),
        format!("{}\n", ACCEPTED_LOG_HEADER.join(","))
    );
    assert_eq!(
        std::fs::read_to_string(&summary.rejected_log).unwrap(),
        "Timestamp,Reason,RawData\n"
    );
}

#[test]
fn voltage_violation_wins_over_current_violation() {
    let (_tmp, m) = manager();
    m.start_session("Audi_eTron").unwrap();
    let mut sample = reference_sample("Audi_eTron", 5);
    sample.voltage_rms.avg = 0.0;
    sample.current_rms.min = -1.0;
    let outcome = m.push_sample(&sample).unwrap();
    assert_eq!(outcome, PushOutcome::Rejected(ValidationOutcome::InvalidVoltage));

    let summary = m.end_session("Audi_eTron").unwrap();
    assert_eq!(summary.sample_count, 0);
    let rejects = std::fs::read_to_string(&summary.rejected_log).unwrap();
    assert_eq!(
        rejects.lines().nth(1).unwrap(),
        "2023-08-04 10:15:00,Invalid voltage values,Row5"
    );
}

#[test]
fn voltage_spike_warning_without_current_spike() {
    let (_tmp, m) = manager();
    let mut rx = m.events().subscribe();
    m.start_session("Hyundai_Ioniq5").unwrap();

    m.push_sample(&reference_sample("Hyundai_Ioniq5", 1)).unwrap();
    let mut next = reference_sample("Hyundai_Ioniq5", 2);
    next.voltage_rms.avg = 235.0;
    m.push_sample(&next).unwrap();

    let warnings: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter(|e| e.kind == TransferEventKind::WarningRaised)
        .map(|e| e.message)
        .collect();
    assert_eq!(warnings, vec!["Voltage spike detected: ΔV=15.00V".to_string()]);
}

#[test]
fn vehicles_are_isolated() {
    let (_tmp, m) = manager();
    m.start_session("A").unwrap();
    m.start_session("B").unwrap();
    for row in 1..=3 {
        m.push_sample(&reference_sample("A", row)).unwrap();
    }
    m.push_sample(&reference_sample("B", 1)).unwrap();

    let a = m.end_session("A").unwrap();
    let b = m.end_session("B").unwrap();
    assert_eq!(a.sample_count, 3);
    assert_eq!(b.sample_count, 1);
    assert_ne!(a.accepted_log, b.accepted_log);
    assert_eq!(
        std::fs::read_to_string(&b.accepted_log).unwrap().lines().count(),
        2
    );
}

#[test]
fn concurrent_pushes_for_many_vehicles() {
    let (_tmp, m) = manager();
    let m = Arc::new(m);
    let vehicles: Vec<String> = (0..8).map(|i| format!("vehicle_{i}")).collect();
    for v in &vehicles {
        m.start_session(v).unwrap();
    }

    let handles: Vec<_> = vehicles
        .iter()
        .cloned()
        .map(|v| {
            let m = Arc::clone(&m);
            std::thread::spawn(move || {
                for row in 1..=25 {
                    m.push_sample(&reference_sample(&v, row)).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    for v in &vehicles {
        let summary = m.end_session(v).unwrap();
        assert_eq!(summary.sample_count, 25);
        let lines = std::fs::read_to_string(&summary.accepted_log)
            .unwrap()
            .lines()
            .count();
        assert_eq!(lines, 26);
    }
}

#[test]
fn racing_starts_open_exactly_one_session() {
    let (_tmp, m) = manager();
    let m = Arc::new(m);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let m = Arc::clone(&m);
            std::thread::spawn(move || m.start_session("Contested").is_ok())
        })
        .collect();
    let wins = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(wins, 1);
    assert_eq!(m.active_sessions().len(), 1);
}

#[test]
fn push_after_end_reports_no_session() {
    let (_tmp, m) = manager();
    m.start_session("Volvo_EX30").unwrap();
    m.end_session("Volvo_EX30").unwrap();
    let err = m
        .push_sample(&reference_sample("Volvo_EX30", 1))
        .unwrap_err();
    assert!(matches!(err, ChargelogError::NoActiveSession { .. }));
}

#[test]
fn concurrent_pushes_for_one_vehicle_write_whole_lines() {
    let (_tmp, m) = manager();
    let m = Arc::new(m);
    m.start_session("Shared").unwrap();

    let handles: Vec<_> = (0..8_u64)
        .map(|t| {
            let m = Arc::clone(&m);
            std::thread::spawn(move || {
                for i in 1..=25 {
                    m.push_sample(&reference_sample("Shared", t * 25 + i)).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let summary = m.end_session("Shared").unwrap();
    assert_eq!(summary.sample_count, 200);

    let contents = std::fs::read_to_string(&summary.accepted_log).unwrap();
    let mut rows: Vec<u64> = contents
        .lines()
        .skip(1)
        .map(|line| {
            let fields: Vec<&str> = line.split(',').collect();
            assert_eq!(fields.len(), ACCEPTED_LOG_HEADER.len(), "torn line: {line}");
            fields[fields.len() - 1].parse().unwrap()
        })
        .collect();
    rows.sort_unstable();
    assert_eq!(rows, (1..=200).collect::<Vec<u64>>());
}

#[test]
fn pushes_racing_end_are_logged_or_refused() {
    let (_tmp, m) = manager();
    let m = Arc::new(m);
    m.start_session("Racing").unwrap();
    let barrier = Arc::new(std::sync::Barrier::new(5));

    let pushers: Vec<_> = (0..4_u64)
        .map(|t| {
            let m = Arc::clone(&m);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                let mut accepted = 0_u64;
                let mut refused = 0_u64;
                for i in 1..=500 {
                    match m.push_sample(&reference_sample("Racing", t * 1000 + i)) {
                        Ok(PushOutcome::Accepted { .. }) => accepted += 1,
                        Err(ChargelogError::NoActiveSession { .. }) => refused += 1,
                        other => panic!("unexpected push result: {other:?}"),
                    }
                }
                (accepted, refused)
            })
        })
        .collect();

    let ender = {
        let m = Arc::clone(&m);
        let barrier = Arc::clone(&barrier);
        std::thread::spawn(move || {
            barrier.wait();
            std::thread::sleep(std::time::Duration::from_millis(2));
            m.end_session("Racing").unwrap()
        })
    };

    let (accepted, refused) = pushers
        .into_iter()
        .map(|h| h.join().unwrap())
        .fold((0, 0), |(a, r), (pa, pr)| (a + pa, r + pr));
    let summary = ender.join().unwrap();

    assert_eq!(accepted + refused, 2000);
    assert_eq!(summary.sample_count, accepted);
    let lines = std::fs::read_to_string(&summary.accepted_log)
        .unwrap()
        .lines()
        .count() as u64;
    assert_eq!(lines - 1, accepted);
    assert!(!m.is_active("Racing"));
}

#[test]
fn unparsed_rows_count_as_rejected() {
    let (_tmp, m) = manager();
    m.start_session("Hyundai_Ioniq5").unwrap();
    m.record_unparsed("Hyundai_Ioniq5", 3, "Parse error - empty line")
        .unwrap();
    let summary = m.end_session("Hyundai_Ioniq5").unwrap();

    assert_eq!(summary.sample_count, 0);
    assert_eq!(summary.rejected_count, 1);
    let rejects = std::fs::read_to_string(&summary.rejected_log).unwrap();
    assert!(rejects.ends_with(",Parse error - empty line,Row3\n"));

    let err = m
        .record_unparsed("Hyundai_Ioniq5", 4, "Parse error - empty line")
        .unwrap_err();
    assert!(matches!(err, ChargelogError::NoActiveSession { .. }));
}
