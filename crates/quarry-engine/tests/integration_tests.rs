use std::{
    fs,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use config::{MANAGER_SECTION, Value};
use parking_lot::Mutex;
use quarry_engine::{Data, Error, Manager, Target, Unit};
use quarry_engine::test_support::{ListFinder, Recorded, RecordingMonitor, ScriptedUnit, test_options};

/// An identity unit: registers its target's payload as data exactly once.
fn echo_finder(strict: bool, recurse: bool) -> Arc<ListFinder> {
    ListFinder::new(move |_mgr, target| {
        let mut unit = ScriptedUnit::new("echo", target.clone()).with_evaluate(
            move |mgr, unit, _case| {
                mgr.register_data(unit, Data::from(unit.target().payload()), recurse);
                Ok(())
            },
        );
        if strict {
            unit = unit.with_strict_flags();
        }
        vec![unit.build()]
    })
}

#[test]
fn trivial_match_fires_single_flag() {
    let mut opts = test_options("trivial");
    opts.set(MANAGER_SECTION, "threads", Value::Integer(2));
    opts.set(MANAGER_SECTION, "max-depth", Value::Integer(10));

    let monitor = RecordingMonitor::new();
    let mgr = Manager::new(opts, echo_finder(false, true), monitor.clone());

    mgr.queue_target(b"noise FLAG{abc} noise".as_slice(), None)
        .expect("queue root")
        .expect("non-empty target");
    mgr.start().expect("start");
    let clean = mgr.join(None).expect("join");

    assert!(clean, "drain should be clean");
    assert_eq!(monitor.flags(), vec!["FLAG{abc}".to_string()]);
    assert_eq!(monitor.data_count(), 1, "exactly one on_data expected");
    assert_eq!(monitor.completions(), vec![false]);
}

#[test]
fn strict_flag_rejected_when_embedded() {
    let mut opts = test_options("strict-reject");
    opts.set(MANAGER_SECTION, "threads", Value::Integer(2));

    let monitor = RecordingMonitor::new();
    let mgr = Manager::new(opts, echo_finder(true, false), monitor.clone());

    mgr.queue_target(b"prefix FLAG{abc}".as_slice(), None)
        .expect("queue root")
        .expect("non-empty target");
    mgr.start().expect("start");
    let clean = mgr.join(None).expect("join");

    assert!(clean);
    assert!(monitor.flags().is_empty(), "embedded strict flag must not fire");
    assert_eq!(monitor.data_count(), 1);
    assert_eq!(monitor.completions(), vec![false]);
}

#[test]
fn strict_flag_accepted_when_standalone() {
    let opts = test_options("strict-accept");

    let monitor = RecordingMonitor::new();
    let mgr = Manager::new(opts, echo_finder(true, true), monitor.clone());

    mgr.queue_target(b"FLAG{abc}".as_slice(), None)
        .expect("queue root")
        .expect("non-empty target");
    mgr.start().expect("start");
    assert!(mgr.join(None).expect("join"));

    assert_eq!(monitor.flags(), vec!["FLAG{abc}".to_string()]);
}

#[test]
fn xml_stripped_form_satisfies_strict_flags() {
    let opts = test_options("xml-strip");

    let monitor = RecordingMonitor::new();
    let mgr = Manager::new(opts, echo_finder(true, true), monitor.clone());

    mgr.queue_target(b"<x>FLAG{abc}</x>".as_slice(), None)
        .expect("queue root")
        .expect("non-empty target");
    mgr.start().expect("start");
    assert!(mgr.join(None).expect("join"));

    assert_eq!(monitor.flags(), vec!["FLAG{abc}".to_string()]);
}

#[test]
fn depth_limit_stops_self_recursion() {
    let mut opts = test_options("depth-limit");
    opts.set(MANAGER_SECTION, "threads", Value::Integer(2));
    opts.set(MANAGER_SECTION, "max-depth", Value::Integer(2));

    let monitor = RecordingMonitor::new();
    let mgr = Manager::new(opts, echo_finder(false, true), monitor.clone());

    mgr.queue_target(b"seed payload".as_slice(), None)
        .expect("queue root")
        .expect("non-empty target");
    mgr.start().expect("start");
    let clean = mgr.join(None).expect("join");

    assert!(clean, "run must drain rather than hang");
    assert_eq!(monitor.depth_limit_count(), 1, "one depth-limit event expected");
    assert_eq!(
        monitor.data_count(),
        2,
        "one registration per depth below the limit"
    );
    let depths: Vec<u32> = monitor
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Recorded::DepthLimit(d) => Some(d),
            _ => None,
        })
        .collect();
    assert_eq!(depths, vec![1], "the depth-limited parent sits at depth 1");
}

#[test]
fn timeout_reports_after_in_flight_case_finishes() {
    let mut opts = test_options("timeout");
    opts.set(MANAGER_SECTION, "threads", Value::Integer(1));

    let evaluated = Arc::new(AtomicUsize::new(0));
    let evaluated2 = evaluated.clone();
    let finder = ListFinder::new(move |_mgr, target| {
        let evaluated = evaluated2.clone();
        vec![
            ScriptedUnit::new("sleeper", target.clone())
                .with_cases(2)
                .with_evaluate(move |_mgr, _unit, _case| {
                    evaluated.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_secs(2));
                    Ok(())
                })
                .build(),
        ]
    });

    let monitor = RecordingMonitor::new();
    let mgr = Manager::new(opts, finder, monitor.clone());

    mgr.queue_target(b"anything".as_slice(), None)
        .expect("queue root")
        .expect("non-empty target");
    mgr.start().expect("start");

    let start = Instant::now();
    let clean = mgr.join(Some(Duration::from_millis(500))).expect("join");
    let elapsed = start.elapsed();

    assert!(!clean, "join must report the timeout");
    assert_eq!(monitor.completions(), vec![true]);
    assert_eq!(
        evaluated.load(Ordering::SeqCst),
        1,
        "only the in-flight case runs to completion"
    );
    assert!(
        elapsed >= Duration::from_millis(1500),
        "the in-flight case finishes before join returns, took {:?}",
        elapsed
    );
    assert!(
        elapsed < Duration::from_secs(4),
        "the second case must not run, took {:?}",
        elapsed
    );
}

#[test]
fn register_flag_is_idempotent_on_completion() {
    let opts = test_options("idempotent");
    let monitor = RecordingMonitor::new();
    let mgr = Manager::new(opts, ListFinder::new(|_, _| vec![]), monitor.clone());

    let target = Target::new(b"payload".as_slice(), None);
    let unit = ScriptedUnit::new("manual", target.clone()).build();

    mgr.register_flag(&unit, "FLAG{abc}");
    assert!(target.completed());
    mgr.register_flag(&unit, "FLAG{abc}");
    assert!(target.completed(), "completion is monotonic");
    assert_eq!(monitor.flags().len(), 2, "the monitor hears every call");
}

#[test]
fn completed_origin_discards_queued_work_without_evaluate() {
    let opts = test_options("discard");
    let monitor = RecordingMonitor::new();
    let mgr = Manager::new(opts, ListFinder::new(|_, _| vec![]), monitor.clone());

    let evaluated = Arc::new(AtomicUsize::new(0));
    let evaluated2 = evaluated.clone();
    let target = Target::new(b"payload".as_slice(), None);
    let unit = ScriptedUnit::new("stale", target)
        .with_evaluate(move |_mgr, _unit, _case| {
            evaluated2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build();

    mgr.queue(unit.clone());
    mgr.register_flag(&unit, "FLAG{done}");

    mgr.start().expect("start");
    assert!(mgr.join(None).expect("join"));
    assert_eq!(
        evaluated.load(Ordering::SeqCst),
        0,
        "work for a completed origin must be discarded"
    );
}

#[test]
fn root_targets_are_refused_after_join() {
    let opts = test_options("post-join");
    let monitor = RecordingMonitor::new();
    let mgr = Manager::new(opts, echo_finder(false, false), monitor.clone());

    mgr.start().expect("start");
    assert!(mgr.join(None).expect("join"));

    let err = mgr
        .queue_target(b"late root".as_slice(), None)
        .expect_err("roots are refused after join");
    assert!(matches!(err, Error::State(_)));

    // Recursion through a live parent remains legal while the tree drains.
    let target = Target::new(b"parent payload".as_slice(), None);
    let parent = ScriptedUnit::new("parent", target).build();
    let derived = mgr
        .queue_target(b"derived".as_slice(), Some(&parent))
        .expect("derived targets stay legal");
    assert!(derived.is_some());
}

#[test]
fn whitespace_payloads_are_ignored() {
    let opts = test_options("whitespace");
    let monitor = RecordingMonitor::new();
    let mgr = Manager::new(opts, echo_finder(false, false), monitor.clone());

    let queued = mgr
        .queue_target(b"  \t\r\n  ".as_slice(), None)
        .expect("no error for empty payloads");
    assert!(queued.is_none());
}

#[test]
fn enumerate_failure_is_reported_and_skipped() {
    let opts = test_options("enumerate-error");
    let finder = ListFinder::new(|_mgr, target| {
        vec![
            ScriptedUnit::new("broken", target.clone())
                .with_enumerate_error()
                .build(),
        ]
    });

    let monitor = RecordingMonitor::new();
    let mgr = Manager::new(opts, finder, monitor.clone());

    mgr.queue_target(b"anything".as_slice(), None)
        .expect("queue root")
        .expect("non-empty target");
    mgr.start().expect("start");
    assert!(mgr.join(None).expect("join"));

    assert_eq!(monitor.exception_count(), 1);
    assert_eq!(monitor.completions(), vec![false]);
}

#[test]
fn evaluate_failure_does_not_kill_the_worker() {
    let mut opts = test_options("evaluate-error");
    opts.set(MANAGER_SECTION, "threads", Value::Integer(1));

    let finder = ListFinder::new(|_mgr, target| {
        vec![
            ScriptedUnit::new("faulty", target.clone())
                .with_priority(10)
                .with_evaluate(|_mgr, _unit, _case| Err(Error::Unit("boom".into())))
                .build(),
            ScriptedUnit::new("healthy", target.clone())
                .with_priority(90)
                .with_evaluate(|mgr, unit, _case| {
                    mgr.register_data(unit, Data::from("quiet result"), false);
                    Ok(())
                })
                .build(),
        ]
    });

    let monitor = RecordingMonitor::new();
    let mgr = Manager::new(opts, finder, monitor.clone());

    mgr.queue_target(b"anything".as_slice(), None)
        .expect("queue root")
        .expect("non-empty target");
    mgr.start().expect("start");
    assert!(mgr.join(None).expect("join"));

    assert_eq!(monitor.exception_count(), 1);
    assert_eq!(monitor.data_count(), 1, "the healthy unit still ran");
}

#[test]
fn lower_priority_value_is_served_first() {
    let mut opts = test_options("priority");
    opts.set(MANAGER_SECTION, "threads", Value::Integer(1));

    let order = Arc::new(Mutex::new(Vec::new()));
    let order_a = order.clone();
    let order_b = order.clone();
    let finder = ListFinder::new(move |_mgr, target| {
        let order_a = order_a.clone();
        let order_b = order_b.clone();
        vec![
            ScriptedUnit::new("late", target.clone())
                .with_priority(90)
                .with_evaluate(move |_mgr, _unit, _case| {
                    order_b.lock().push("late");
                    Ok(())
                })
                .build(),
            ScriptedUnit::new("early", target.clone())
                .with_priority(10)
                .with_evaluate(move |_mgr, _unit, _case| {
                    order_a.lock().push("early");
                    Ok(())
                })
                .build(),
        ]
    });

    let monitor = RecordingMonitor::new();
    let mgr = Manager::new(opts, finder, monitor);

    mgr.queue_target(b"anything".as_slice(), None)
        .expect("queue root")
        .expect("non-empty target");
    mgr.start().expect("start");
    assert!(mgr.join(None).expect("join"));

    assert_eq!(*order.lock(), vec!["early", "late"]);
}

#[test]
fn each_case_is_evaluated_exactly_once() {
    let mut opts = test_options("single-consumer");
    opts.set(MANAGER_SECTION, "threads", Value::Integer(4));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    let finder = ListFinder::new(move |_mgr, target| {
        let seen = seen2.clone();
        vec![
            ScriptedUnit::new("fanout", target.clone())
                .with_cases(20)
                .with_evaluate(move |_mgr, _unit, case| {
                    seen.lock().push(case);
                    Ok(())
                })
                .build(),
        ]
    });

    let monitor = RecordingMonitor::new();
    let mgr = Manager::new(opts, finder, monitor);

    mgr.queue_target(b"anything".as_slice(), None)
        .expect("queue root")
        .expect("non-empty target");
    mgr.start().expect("start");
    assert!(mgr.join(None).expect("join"));

    let mut cases = seen.lock().clone();
    cases.sort_unstable();
    assert_eq!(cases, (0..20).collect::<Vec<_>>());
}

#[test]
fn global_recurse_switch_disables_recursion() {
    let mut opts = test_options("no-recurse");
    opts.set(MANAGER_SECTION, "recurse", Value::Boolean(false));

    let monitor = RecordingMonitor::new();
    let mgr = Manager::new(opts, echo_finder(false, true), monitor.clone());

    mgr.queue_target(b"no flag here".as_slice(), None)
        .expect("queue root")
        .expect("non-empty target");
    mgr.start().expect("start");
    assert!(mgr.join(None).expect("join"));

    assert_eq!(monitor.data_count(), 1, "no derived targets when recursion is off");
    assert_eq!(monitor.depth_limit_count(), 0);
}

#[test]
fn graceful_interrupt_drains_in_flight_case() {
    let mut opts = test_options("interrupt");
    opts.set(MANAGER_SECTION, "threads", Value::Integer(1));

    let evaluated = Arc::new(AtomicUsize::new(0));
    let evaluated2 = evaluated.clone();
    let finder = ListFinder::new(move |_mgr, target| {
        let evaluated = evaluated2.clone();
        vec![
            ScriptedUnit::new("slow", target.clone())
                .with_cases(3)
                .with_evaluate(move |_mgr, _unit, _case| {
                    evaluated.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(300));
                    Ok(())
                })
                .build(),
        ]
    });

    let monitor = RecordingMonitor::new();
    let mgr = Manager::new(opts, finder, monitor.clone());

    mgr.queue_target(b"anything".as_slice(), None)
        .expect("queue root")
        .expect("non-empty target");
    mgr.start().expect("start");

    let interrupter = {
        let mgr = mgr.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            mgr.interrupt();
        })
    };

    let clean = mgr.join(None).expect("join");
    interrupter.join().expect("interrupter");

    assert!(clean, "an interrupted run is not a timeout");
    assert_eq!(monitor.completions(), vec![false]);
    assert_eq!(
        evaluated.load(Ordering::SeqCst),
        1,
        "the in-flight case finishes, the rest are abandoned"
    );
}

#[test]
fn start_refuses_existing_output_directory() {
    let opts = test_options("outdir-exists");
    let outdir = opts
        .get_str(MANAGER_SECTION, "outdir")
        .expect("outdir configured");
    fs::create_dir_all(&outdir).expect("pre-create outdir");

    let mgr = Manager::new(opts, ListFinder::new(|_, _| vec![]), RecordingMonitor::new());
    let err = mgr.start().expect_err("pre-existing outdir is fatal");
    assert!(matches!(err, Error::OutputDirExists(_)));
}

#[test]
fn start_requires_flag_format() {
    let mut opts = test_options("no-flag-format");
    // Rebuild without the pattern but keep the throwaway outdir.
    let outdir = opts
        .get_str(MANAGER_SECTION, "outdir")
        .expect("outdir configured");
    opts = config::Options::new();
    opts.set(MANAGER_SECTION, "outdir", Value::String(outdir));

    let mgr = Manager::new(opts, ListFinder::new(|_, _| vec![]), RecordingMonitor::new());
    let err = mgr.start().expect_err("missing flag-format is fatal");
    assert!(matches!(err, Error::MissingFlagFormat));
}

#[test]
fn start_twice_is_an_error() {
    let opts = test_options("double-start");
    let mgr = Manager::new(opts, ListFinder::new(|_, _| vec![]), RecordingMonitor::new());

    mgr.start().expect("first start");
    let err = mgr.start().expect_err("second start must fail");
    assert!(matches!(err, Error::State(_)));

    assert!(mgr.join(None).expect("join"));
}

#[test]
fn aggregate_data_is_searched_element_wise() {
    let opts = test_options("aggregate");
    let finder = ListFinder::new(|_mgr, target| {
        vec![
            ScriptedUnit::new("multi", target.clone())
                .with_evaluate(|mgr, unit, _case| {
                    let data = Data::Items(vec![
                        Data::from("nothing here"),
                        Data::from("FLAG{nested}"),
                    ]);
                    mgr.register_data(unit, data, false);
                    Ok(())
                })
                .build(),
        ]
    });

    let monitor = RecordingMonitor::new();
    let mgr = Manager::new(opts, finder, monitor.clone());

    mgr.queue_target(b"anything".as_slice(), None)
        .expect("queue root")
        .expect("non-empty target");
    mgr.start().expect("start");
    assert!(mgr.join(None).expect("join"));

    assert_eq!(monitor.flags(), vec!["FLAG{nested}".to_string()]);
}
