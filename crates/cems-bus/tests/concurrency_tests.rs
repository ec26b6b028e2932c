//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "integration-tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Multi-threaded ordering and isolation tests for the live metrics bus."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use cems_bus::LiveMetricsBus;
use cems_common::{BusConfig, ClassroomId};
use tokio::time::{sleep, timeout};

fn classroom(raw: u32) -> ClassroomId {
    ClassroomId::new(raw).expect("positive id")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_sink_does_not_hold_up_other_classrooms() -> Result<()> {
    let bus = LiveMetricsBus::new(&BusConfig::default())?;
    let _slow = bus.subscribe_fn(classroom(2), |sample| {
        if !sample.offline {
            std::thread::sleep(Duration::from_millis(1_500));
        }
    });

    let switcher = {
        let bus = bus.clone();
        std::thread::spawn(move || bus.set_switch_state(classroom(2), true))
    };
    sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    bus.set_switch_state(classroom(7), true);
    let elapsed = started.elapsed();
    assert!(elapsed < Duration::from_millis(500), "switching 7 took {elapsed:?}");
    assert!(bus.is_generating(classroom(7)));

    switcher.join().expect("switcher thread");
    assert_eq!(bus.shutdown(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sink_may_switch_another_classroom_from_a_helper_thread() -> Result<()> {
    let bus = LiveMetricsBus::new(&BusConfig::default())?;
    let handle = bus.clone();
    let _chain = bus.subscribe_fn(classroom(8), move |sample| {
        if sample.offline {
            return;
        }
        let bus = handle.clone();
        std::thread::spawn(move || bus.set_switch_state(classroom(9), true))
            .join()
            .expect("helper thread");
    });

    let switching = bus.clone();
    timeout(
        Duration::from_secs(5),
        tokio::task::spawn_blocking(move || switching.set_switch_state(classroom(8), true)),
    )
    .await??;

    assert!(bus.is_generating(classroom(8)));
    assert!(bus.is_generating(classroom(9)));
    assert_eq!(bus.shutdown(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_live_sample_after_switch_off_returns() -> Result<()> {
    let config = BusConfig {
        tick_interval: Duration::from_millis(1),
        ..BusConfig::default()
    };
    let bus = LiveMetricsBus::new(&config)?;
    let ids: Vec<ClassroomId> = (2..=20).map(classroom).collect();
    let violations = Arc::new(AtomicUsize::new(0));
    let offlines = Arc::new(AtomicUsize::new(0));

    let mut flags = Vec::new();
    let mut subs = Vec::new();
    for &id in &ids {
        let off_returned = Arc::new(AtomicBool::new(false));
        let seen_off = off_returned.clone();
        let violations = violations.clone();
        let offlines = offlines.clone();
        subs.push(bus.subscribe_fn(id, move |sample| {
            if sample.offline {
                offlines.fetch_add(1, Ordering::SeqCst);
            } else if seen_off.load(Ordering::SeqCst) {
                violations.fetch_add(1, Ordering::SeqCst);
            }
        }));
        flags.push(off_returned);
    }

    for &id in &ids {
        bus.set_switch_state(id, true);
    }
    sleep(Duration::from_millis(50)).await;

    let switching = bus.clone();
    let targets = ids.clone();
    tokio::task::spawn_blocking(move || {
        for (id, flag) in targets.into_iter().zip(flags) {
            switching.set_switch_state(id, false);
            flag.store(true, Ordering::SeqCst);
        }
    })
    .await?;
    sleep(Duration::from_millis(50)).await;

    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert_eq!(offlines.load(Ordering::SeqCst), ids.len());
    assert!(bus.active_classrooms().is_empty());
    Ok(())
}
