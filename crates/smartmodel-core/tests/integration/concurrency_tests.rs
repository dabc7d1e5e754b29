use std::collections::HashMap;
use std::thread;

use smartmodel_core::testutil::{MockClient, person_descriptor};
use smartmodel_core::{EventKind, EventStream, ExtractionLoop};
use uuid::Uuid;

use crate::integration::common::isolated_loop;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_extractions_share_one_stream() {
    let (extraction, events) = isolated_loop(2);
    let mut sub = events.subscribe();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let extraction = extraction.clone();
            let descriptor = person_descriptor();
            // Odd tasks need one corrective round.
            let client = if i % 2 == 0 {
                MockClient::with_responses(vec![Ok(format!(r#"{{"name":"P{i}","age":{i}}}"#))])
            } else {
                MockClient::with_responses(vec![
                    Ok(r#"{"name":"broken"}"#.into()),
                    Ok(format!(r#"{{"name":"P{i}","age":{i}}}"#)),
                ])
            };
            tokio::spawn(async move {
                extraction
                    .extract_async_with_report(&format!("person {i}"), &descriptor, &client)
                    .await
            })
        })
        .collect();

    let mut ids = Vec::new();
    for (i, handle) in handles.into_iter().enumerate() {
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.value.age, i as i64);
        assert_eq!(report.attempts, if i % 2 == 0 { 1 } else { 2 });
        ids.push(report.extraction_id);
    }

    let published = sub.drain();
    assert_eq!(published.len(), 12);

    let mut per_call: HashMap<Uuid, Vec<(u32, EventKind)>> = HashMap::new();
    for event in &published {
        per_call
            .entry(event.extraction_id)
            .or_default()
            .push((event.attempt, event.kind));
    }
    assert_eq!(per_call.len(), 8);
    for id in ids {
        let seq = &per_call[&id];
        assert_eq!(seq.last().map(|(_, kind)| *kind), Some(EventKind::Success));
        let attempts: Vec<_> = seq.iter().map(|(attempt, _)| *attempt).collect();
        assert_eq!(attempts, (0..seq.len() as u32).collect::<Vec<_>>());
    }
}

#[test]
fn blocking_extractions_across_threads_with_live_subscriber() {
    let events = EventStream::new(256);
    let mut sub = events.subscribe();

    let consumer = thread::spawn(move || {
        let mut successes = 0;
        while successes < 4 {
            match sub.blocking_recv() {
                Some(event) if event.kind == EventKind::Success => successes += 1,
                Some(_) => {}
                None => break,
            }
        }
        successes
    });

    let extraction = isolated_loop(1).0.with_events(events.clone());
    let workers: Vec<_> = (0..4)
        .map(|i| {
            let extraction = extraction.clone();
            thread::spawn(move || {
                let client = MockClient::with_responses(vec![
                    Ok("not yet".into()),
                    Ok(format!(r#"{{"name":"T{i}","age":40}}"#)),
                ]);
                extraction.extract("someone aged 40", &person_descriptor(), &client)
            })
        })
        .collect();

    for worker in workers {
        assert_eq!(worker.join().unwrap().unwrap().age, 40);
    }
    assert_eq!(consumer.join().unwrap(), 4);
    assert!(events.latest().is_some());
}

#[test]
fn subscribers_come_and_go_while_publishing() {
    let events = EventStream::new(16);
    let extraction = isolated_loop(0).0.with_events(events.clone());

    let churn: Vec<_> = (0..4)
        .map(|_| {
            let events = events.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    let sub = events.subscribe();
                    drop(sub);
                }
            })
        })
        .collect();

    for _ in 0..50 {
        let client = MockClient::always(Ok(r#"{"name":"Ana","age":30}"#.into()));
        extraction
            .extract("Ana, 30", &person_descriptor(), &client)
            .unwrap();
    }
    for handle in churn {
        handle.join().unwrap();
    }
    assert_eq!(events.subscriber_count(), 0);
}

#[test]
fn default_loop_publishes_to_global_stream() {
    let mut sub = EventStream::global().subscribe();
    let extraction = ExtractionLoop::new();
    let client = MockClient::with_responses(vec![Ok(r#"{"name":"Ana","age":30}"#.into())]);

    let report = extraction
        .extract_with_report("Ana, 30", &person_descriptor(), &client)
        .unwrap();

    // Other tests may publish globally too; look for ours.
    let ours: Vec<_> = sub
        .drain()
        .into_iter()
        .filter(|e| e.extraction_id == report.extraction_id)
        .collect();
    assert_eq!(ours.len(), 1);
    assert_eq!(ours[0].kind, EventKind::Success);
}
