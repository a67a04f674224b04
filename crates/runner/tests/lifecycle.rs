//! End-to-end job lifecycle tests. Worker scripts are bash, run through the
//! same launcher path real jobs take.

#![cfg(unix)]

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use fanfinder_core::browser::BrowserSignature;
use fanfinder_core::job_type::JobType;
use fanfinder_events::{Audience, JobEvent};
use fanfinder_runner::{JobError, Termination};

use common::*;

const LONG_RUNNING: &str = "echo ready\nexec sleep 30\n";

// ---------------------------------------------------------------------------
// Natural exit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn successful_run_streams_output_and_finishes_once() {
    let mut h = harness();
    write_script(
        h.dir.path(),
        JobType::Discovery,
        "echo 'Logging in'\n\
         echo 'New user found: alice (1/2 - 50.0%)'\n\
         echo ''\n\
         echo 'Collected user: bob (2/2 - 100.0%)'\n\
         exit 0\n",
    );
    let k = key(JobType::Discovery, 1);

    let started = h
        .manager
        .start(request(JobType::Discovery, 1, Some("conn-1")))
        .unwrap();
    assert_eq!(started.key, "discovery-1");

    let dispatches = until_terminal(&mut h.events, k).await;
    let public: Vec<_> = dispatches
        .iter()
        .filter(|d| d.audience == Audience::All)
        .cloned()
        .collect();

    assert_eq!(
        types_of(&public),
        vec![
            "job_started",
            "job_output",
            "job_output",
            "job_output",
            "user_collected",
            "job_progress",
            "job_output",
            "user_collected",
            "job_progress",
            "job_output",
            "job_finished",
        ]
    );
    assert_eq!(count_of(&dispatches, "job_finished"), 1);

    assert_matches!(
        &public[0].event,
        JobEvent::JobStarted { pid, .. } if *pid == started.pid
    );
    assert_matches!(
        &public[5].event,
        JobEvent::JobProgress { collected: 1, target: 2, percent, .. } if (*percent - 50.0).abs() < f64::EPSILON
    );
    assert_matches!(
        &public[10].event,
        JobEvent::JobFinished { success: true, exit_code: 0, collected: 2, .. }
    );

    assert!(h.manager.registry().is_empty());

    let next = next_dispatch(&mut h.events).await;
    assert_matches!(
        next.event,
        JobEvent::JobTypeUnblocked { job_type: JobType::Keyword, .. }
    );
}

#[tokio::test]
async fn failing_run_reports_exit_code() {
    let mut h = harness();
    write_script(h.dir.path(), JobType::Keyword, "echo 'Something failed' >&2\nexit 3\n");
    let k = key(JobType::Keyword, 2);

    h.manager.start(request(JobType::Keyword, 2, None)).unwrap();
    let dispatches = until_terminal(&mut h.events, k).await;

    assert_matches!(
        &dispatches.last().unwrap().event,
        JobEvent::JobFinished { success: false, exit_code: 3, collected: 0, .. }
    );
    assert!(dispatches.iter().any(|d| matches!(
        &d.event,
        JobEvent::JobOutput { line, .. } if line == "Something failed"
    )));
    assert!(h.manager.registry().lookup(&k).is_none());
}

#[tokio::test]
async fn exit_is_seen_while_a_descendant_holds_the_output_pipe() {
    let mut h = harness();
    write_script(h.dir.path(), JobType::Discovery, "sleep 8 &\necho done\nexit 0\n");
    let k = key(JobType::Discovery, 3);

    h.manager.start(request(JobType::Discovery, 3, None)).unwrap();
    let dispatches = tokio::time::timeout(Duration::from_secs(4), until_terminal(&mut h.events, k))
        .await
        .expect("job_finished waited for the background sleep");

    assert!(dispatches.iter().any(|d| matches!(
        &d.event,
        JobEvent::JobOutput { line, .. } if line == "done"
    )));
    assert_matches!(
        &dispatches.last().unwrap().event,
        JobEvent::JobFinished { success: true, exit_code: 0, .. }
    );
    assert!(h.manager.registry().lookup(&k).is_none());
}

// ---------------------------------------------------------------------------
// Launch errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_start_is_rejected_without_touching_the_first() {
    let mut h = harness();
    write_script(h.dir.path(), JobType::Discovery, LONG_RUNNING);
    let k = key(JobType::Discovery, 1);

    let first = h.manager.start(request(JobType::Discovery, 1, None)).unwrap();
    wait_for_output(&mut h.events, k, "ready").await;

    let second = h.manager.start(request(JobType::Discovery, 1, Some("conn-2")));
    assert_matches!(second, Err(JobError::DuplicateInstance(dup)) if dup == k);
    assert_eq!(h.manager.registry().len(), 1);
    assert_eq!(h.manager.registry().lookup(&k).unwrap().pid, first.pid);

    let error = loop {
        let d = next_dispatch(&mut h.events).await;
        if d.event.event_type() == "job_error" {
            break d;
        }
    };
    assert_eq!(error.audience, Audience::Observer("conn-2".to_string()));

    h.manager.stop(k).await;
}

#[tokio::test]
async fn missing_script_is_reported_to_the_requester_only() {
    let mut h = harness();
    let k = key(JobType::Keyword, 1);

    let result = h.manager.start(request(JobType::Keyword, 1, Some("conn-7")));
    assert_matches!(
        result,
        Err(JobError::ScriptNotFound { script: "keywordSearch.py", .. })
    );
    assert!(h.manager.registry().is_empty());

    let dispatches = until_error(&mut h.events).await;
    for d in &dispatches {
        assert_eq!(d.audience, Audience::Observer("conn-7".to_string()));
    }
    assert_eq!(dispatches.last().unwrap().event.instance(), Some(k));

    // The failed attempt released the key.
    write_script(h.dir.path(), JobType::Keyword, "exit 0\n");
    h.manager.start(request(JobType::Keyword, 1, None)).unwrap();
    until_terminal(&mut h.events, k).await;
}

#[tokio::test]
async fn invalid_requests_never_reach_the_registry() {
    let h = harness();
    write_script(h.dir.path(), JobType::Discovery, "exit 0\n");

    let mut no_model = request(JobType::Discovery, 1, None);
    no_model.settings.model_id = "  ".to_string();
    assert_matches!(h.manager.start(no_model), Err(JobError::InvalidRequest(_)));

    let mut no_target = request(JobType::Discovery, 1, None);
    no_target.settings.target_users = 0;
    assert_matches!(h.manager.start(no_target), Err(JobError::InvalidRequest(_)));

    assert_matches!(
        h.manager.start(request(JobType::Discovery, 0, None)),
        Err(JobError::InvalidRequest(_))
    );
    assert!(h.manager.registry().is_empty());
}

#[tokio::test]
async fn missing_interpreter_is_a_spawn_failure() {
    let mut h = harness();
    write_script(h.dir.path(), JobType::Discovery, "exit 0\n");
    let config = fanfinder_runner::RunnerConfig {
        interpreter: "no-such-interpreter-91c2".to_string(),
        script_dirs: vec![h.dir.path().to_path_buf()],
        ..Default::default()
    };
    let manager = fanfinder_runner::JobManager::new(config, h.manager.event_bus().clone());

    assert_matches!(
        manager.start(request(JobType::Discovery, 1, Some("conn-3"))),
        Err(JobError::SpawnFailure(_))
    );
    assert!(manager.registry().is_empty());
    let dispatches = until_error(&mut h.events).await;
    assert_eq!(
        dispatches.last().unwrap().audience,
        Audience::Observer("conn-3".to_string())
    );
}

// ---------------------------------------------------------------------------
// Stop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stopping_an_absent_instance_emits_one_stopped_event() {
    let mut h = harness();
    let k = key(JobType::Keyword, 4);

    let report = h.manager.stop(k).await;
    assert_eq!(report.termination, Termination::NotRunning);
    assert!(!report.was_running());

    let dispatches = until_terminal(&mut h.events, k).await;
    assert_eq!(types_of(&dispatches), vec!["job_stopped"]);
    assert_no_more_events_for(&mut h.events, k).await;
}

#[tokio::test]
async fn stop_terminates_gracefully_and_never_finishes() {
    let mut h = harness();
    write_script(h.dir.path(), JobType::Discovery, LONG_RUNNING);
    let k = key(JobType::Discovery, 1);

    h.manager.start(request(JobType::Discovery, 1, None)).unwrap();
    wait_for_output(&mut h.events, k, "ready").await;

    let report = h.manager.stop(k).await;
    assert_eq!(report.termination, Termination::Graceful);
    assert!(h.manager.registry().is_empty());

    let dispatches = until_terminal(&mut h.events, k).await;
    assert_eq!(dispatches.last().unwrap().event.event_type(), "job_stopped");
    assert_eq!(count_of(&dispatches, "job_finished"), 0);
    assert_no_more_events_for(&mut h.events, k).await;

    // Second stop of the same key: already stopped, still one event.
    let again = h.manager.stop(k).await;
    assert_eq!(again.termination, Termination::NotRunning);
}

#[tokio::test]
async fn stubborn_job_is_force_killed_with_its_children() {
    let mut h = harness_with(
        BrowserSignature::new(["sleep"], ["--no-sandbox"]),
        Duration::from_millis(300),
    );
    write_script(
        h.dir.path(),
        JobType::Keyword,
        "trap '' TERM\nsleep 300 &\nsleep 300 &\nsleep 0.5\necho ready\nwait\n",
    );
    let k = key(JobType::Keyword, 1);

    h.manager.start(request(JobType::Keyword, 1, None)).unwrap();
    wait_for_output(&mut h.events, k, "ready").await;

    let report = h.manager.stop(k).await;
    assert_eq!(report.termination, Termination::Forced);
    assert_eq!(report.browsers_found, 2);
    assert_eq!(report.browsers_killed, 2);
    assert!(h.manager.registry().is_empty());

    let dispatches = until_terminal(&mut h.events, k).await;
    assert_eq!(dispatches.last().unwrap().event.event_type(), "job_stopped");
}

#[tokio::test]
async fn concurrent_stops_share_one_stopped_event() {
    let mut h = harness_with(BrowserSignature::default(), Duration::from_millis(500));
    write_script(
        h.dir.path(),
        JobType::Keyword,
        "trap '' TERM\necho ready\nwhile true; do sleep 0.1; done\n",
    );
    let k = key(JobType::Keyword, 1);

    h.manager.start(request(JobType::Keyword, 1, None)).unwrap();
    wait_for_output(&mut h.events, k, "ready").await;

    let (first, second) = tokio::join!(h.manager.stop(k), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.manager.stop(k).await
    });
    assert_eq!(first.termination, Termination::Forced);
    assert_eq!(second.termination, Termination::Forced);
    assert_eq!(second.pid, first.pid);
    assert!(h.manager.registry().is_empty());

    let dispatches = until_terminal(&mut h.events, k).await;
    assert_eq!(count_of(&dispatches, "job_stopped"), 1);
    assert!(dispatches.iter().any(|d| matches!(
        &d.event,
        JobEvent::JobOutput { line, .. } if line.contains("force killed")
    )));
    assert_no_more_events_for(&mut h.events, k).await;
}

// ---------------------------------------------------------------------------
// Multiple instances
// ---------------------------------------------------------------------------

#[tokio::test]
async fn same_number_of_different_types_run_independently() {
    let mut h = harness();
    write_script(h.dir.path(), JobType::Discovery, LONG_RUNNING);
    write_script(h.dir.path(), JobType::Keyword, LONG_RUNNING);
    let discovery = key(JobType::Discovery, 1);
    let keyword = key(JobType::Keyword, 1);

    h.manager.start(request(JobType::Discovery, 1, None)).unwrap();
    h.manager.start(request(JobType::Keyword, 1, None)).unwrap();
    assert_eq!(h.manager.registry().len(), 2);

    let status = h.manager.status();
    assert!(status.running);
    assert_eq!(status.job_type, Some(JobType::Keyword));
    assert_eq!(status.instances.len(), 2);

    h.manager.stop(discovery).await;
    assert!(h.manager.registry().lookup(&discovery).is_none());
    assert!(h.manager.registry().lookup(&keyword).is_some());
    assert!(h.manager.registry().is_running(JobType::Keyword));

    let (reports, _) = h.manager.shutdown().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].key, "keyword-1");
    assert!(h.manager.registry().is_empty());
    assert!(!h.manager.status().running);

    // Drain so the receiver is not dropped mid-test with pending events.
    until_terminal(&mut h.events, keyword).await;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn until_error(
    events: &mut tokio::sync::broadcast::Receiver<fanfinder_events::Dispatch>,
) -> Vec<fanfinder_events::Dispatch> {
    let mut out = Vec::new();
    loop {
        let d = next_dispatch(events).await;
        let done = d.event.event_type() == "job_error";
        out.push(d);
        if done {
            return out;
        }
    }
}

async fn assert_no_more_events_for(
    events: &mut tokio::sync::broadcast::Receiver<fanfinder_events::Dispatch>,
    k: fanfinder_core::instance::InstanceKey,
) {
    let quiet = tokio::time::timeout(Duration::from_millis(300), async {
        loop {
            match events.recv().await {
                Ok(d) if d.event.instance() == Some(k) => return d,
                Ok(_) => continue,
                Err(e) => panic!("event bus error: {e}"),
            }
        }
    })
    .await;
    if let Ok(d) = quiet {
        panic!("unexpected event after terminal: {:?}", d.event);
    }
}
