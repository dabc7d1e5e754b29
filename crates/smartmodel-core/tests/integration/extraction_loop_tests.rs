use smartmodel_core::testutil::{MockClient, Person, person_descriptor};
use smartmodel_core::{AttemptFailure, ClientError, EventKind, ValidationError, ViolationKind};

use crate::integration::common::{contact_descriptor, drain, isolated_loop};

const VALID_ANA: &str = r#"{"name":"Ana","age":30}"#;

#[test]
fn ana_first_call_succeeds_with_one_event() {
    let (extraction, events) = isolated_loop(3);
    let mut sub = events.subscribe();
    let client = MockClient::with_responses(vec![Ok(VALID_ANA.into())]);

    let person = extraction
        .extract("My name is Ana, I am 30", &person_descriptor(), &client)
        .unwrap();

    assert_eq!(
        person,
        Person {
            name: "Ana".into(),
            age: 30
        }
    );
    let published = drain(&mut sub);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].kind, EventKind::Success);
    assert_eq!(published.iter().filter(|e| e.is_failure()).count(), 0);
}

#[test]
fn ana_missing_age_then_valid() {
    let (extraction, events) = isolated_loop(3);
    let mut sub = events.subscribe();
    let client = MockClient::with_responses(vec![
        Ok(r#"{"name":"Ana"}"#.into()),
        Ok(VALID_ANA.into()),
    ]);

    let person = extraction
        .extract("My name is Ana, I am 30", &person_descriptor(), &client)
        .unwrap();

    assert_eq!(person.age, 30);
    assert_eq!(client.calls(), 2);
    let kinds: Vec<_> = drain(&mut sub).iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::ValidationFailed, EventKind::Success]);
}

#[test]
fn zero_retries_makes_exactly_one_call() {
    let (extraction, events) = isolated_loop(0);
    let mut sub = events.subscribe();
    let client = MockClient::always(Ok("I'd rather not say.".into()));

    let err = extraction
        .extract("My name is Ana, I am 30", &person_descriptor(), &client)
        .unwrap_err();

    assert_eq!(client.calls(), 1);
    assert_eq!(err.attempts, 1);
    assert!(matches!(
        err.last_failure(),
        AttemptFailure::Validation(ValidationError::Unparsable { .. })
    ));

    let published = drain(&mut sub);
    assert_eq!(published.len(), 1);
    assert!(published[0].is_failure());
    assert!(!published[0].will_retry);
}

#[test]
fn success_on_attempt_k_publishes_k_plus_one_events() {
    let max_retries = 4;
    for k in 0..=max_retries {
        let (extraction, events) = isolated_loop(max_retries);
        let mut sub = events.subscribe();

        let mut script: Vec<Result<String, ClientError>> =
            (0..k).map(|_| Ok(r#"{"name":"Ana","age":-1}"#.to_string())).collect();
        script.push(Ok(VALID_ANA.into()));
        let client = MockClient::with_responses(script);

        let report = extraction
            .extract_with_report("Ana, 30", &person_descriptor(), &client)
            .unwrap();

        let published = drain(&mut sub);
        assert_eq!(report.attempts, k + 1);
        assert_eq!(client.calls(), (k + 1) as usize);
        assert_eq!(published.len(), (k + 1) as usize);
        assert_eq!(published.iter().filter(|e| e.is_failure()).count(), k as usize);
        assert_eq!(published.last().map(|e| e.kind), Some(EventKind::Success));
        let attempts: Vec<_> = published.iter().map(|e| e.attempt).collect();
        assert_eq!(attempts, (0..=k).collect::<Vec<_>>());
    }
}

#[test]
fn always_invalid_exhausts_after_max_retries_plus_one() {
    for max_retries in [0, 1, 5] {
        let (extraction, events) = isolated_loop(max_retries);
        let mut sub = events.subscribe();
        let client = MockClient::always(Ok(r#"{"name":"Ana"}"#.into()));

        let err = extraction
            .extract("Ana, 30", &person_descriptor(), &client)
            .unwrap_err();

        assert_eq!(err.attempts, max_retries + 1);
        assert_eq!(client.calls(), (max_retries + 1) as usize);
        assert_eq!(drain(&mut sub).len(), (max_retries + 1) as usize);
    }
}

#[test]
fn client_error_counts_like_validation_failure() {
    let (extraction, events) = isolated_loop(3);
    let mut sub = events.subscribe();
    let client = MockClient::with_responses(vec![
        Err(ClientError::Network("connection reset".into())),
        Ok(VALID_ANA.into()),
    ]);

    let report = extraction
        .extract_with_report("Ana, 30", &person_descriptor(), &client)
        .unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(client.calls(), 2);
    let kinds: Vec<_> = drain(&mut sub).iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::ClientError, EventKind::Success]);
}

#[test]
fn mixed_failures_share_one_budget() {
    let (extraction, _events) = isolated_loop(2);
    let client = MockClient::with_responses(vec![
        Err(ClientError::RateLimited),
        Ok("nope".into()),
        Err(ClientError::Timeout(5)),
        Ok(VALID_ANA.into()),
    ]);

    let err = extraction
        .extract("Ana, 30", &person_descriptor(), &client)
        .unwrap_err();

    assert_eq!(client.calls(), 3);
    assert!(matches!(
        err.last_failure(),
        AttemptFailure::Client(ClientError::Timeout(5))
    ));
}

#[test]
fn corrective_prompts_are_bounded_to_previous_attempt() {
    let (extraction, _events) = isolated_loop(4);
    let client = MockClient::with_responses(vec![
        Ok(r#"{"name":"MARKER-ONE"}"#.into()),
        Ok(r#"{"name":"MARKER-TWO"}"#.into()),
        Ok(r#"{"name":"MARKER-THREE"}"#.into()),
        Ok(VALID_ANA.into()),
    ]);

    extraction
        .extract("Ana, 30", &person_descriptor(), &client)
        .unwrap();

    let prompts = client.prompts();
    for (i, marker) in ["MARKER-ONE", "MARKER-TWO", "MARKER-THREE"].iter().enumerate() {
        assert!(prompts[i + 1].contains(marker));
        for older in &prompts[i + 2..] {
            assert!(!older.contains(marker));
        }
    }
    assert!(prompts[1..].iter().all(|p| p.len() > prompts[0].len()));
}

#[test]
fn nested_schema_reports_every_field_then_recovers() {
    let (extraction, events) = isolated_loop(2);
    let mut sub = events.subscribe();
    let client = MockClient::with_responses(vec![
        Ok(r#"{"name":"","email":"nope","tags":"vip","address":{"country":"DE"}}"#.into()),
        Ok(r#"```json
{"name":"Ana","email":null,"tags":["vip"],"address":{"city":"Porto","country":"PT"}}
```"#
            .into()),
    ]);

    let contact = extraction
        .extract("Ana from Porto, VIP customer", &contact_descriptor(), &client)
        .unwrap();

    assert_eq!(contact.address.city, "Porto");
    assert_eq!(contact.email, None);
    assert_eq!(contact.tags, vec!["vip".to_string()]);

    let published = drain(&mut sub);
    let first = &published[0];
    assert_eq!(first.kind, EventKind::ValidationFailed);
    for fragment in ["/name", "/email", "/tags", "/address/city", "/address/country"] {
        assert!(first.message.contains(fragment), "missing {fragment} in {}", first.message);
    }

    let corrective = &client.prompts()[1];
    assert!(corrective.contains("/address/city (missing)"));
    assert!(corrective.contains("/tags (mistyped)"));
    assert!(corrective.contains("/address/country (constraint)"));
}

#[test]
fn validation_is_pure_and_repeatable() {
    let descriptor = contact_descriptor();
    let raw = r#"{"name":"Ana","tags":[],"address":{"city":"Porto","country":"XX"}}"#;

    let first = descriptor.validate(raw).unwrap_err();
    let second = descriptor.validate(raw).unwrap_err();
    assert_eq!(first, second);
    assert_eq!(first.violations().len(), 1);
    assert_eq!(first.violations()[0].kind, ViolationKind::Constraint);
    assert_eq!(descriptor.schema().fields().len(), 4);
}

#[tokio::test]
async fn async_extraction_follows_same_contract() {
    let (extraction, events) = isolated_loop(1);
    let mut sub = events.subscribe();
    let client = MockClient::with_responses(vec![
        Ok(r#"{"name":"Ana"}"#.into()),
        Ok(VALID_ANA.into()),
    ]);

    let person = extraction
        .extract_async("My name is Ana, I am 30", &person_descriptor(), &client)
        .await
        .unwrap();

    assert_eq!(person.name, "Ana");
    let first = sub.recv().await.unwrap();
    let second = sub.recv().await.unwrap();
    assert_eq!(first.kind, EventKind::ValidationFailed);
    assert_eq!(second.kind, EventKind::Success);
    assert_eq!(first.extraction_id, second.extraction_id);
}

#[tokio::test]
async fn async_exhaustion_is_bounded() {
    let (extraction, _events) = isolated_loop(3);
    let client = MockClient::always(Err(ClientError::Authentication("bad key".into())));

    let err = extraction
        .extract_async("Ana, 30", &person_descriptor(), &client)
        .await
        .unwrap_err();

    assert_eq!(err.attempts, 4);
    assert_eq!(client.calls(), 4);
    assert!(err.to_string().contains("Authentication failed"));
}
