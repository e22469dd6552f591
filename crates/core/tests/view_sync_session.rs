//! Integration test: replay a recorded two-thread GPU debug session through
//! the view sync controller and check the messages each view receives.

use async_trait::async_trait;
use lanescope_core::rpc::{EvalContext, ScriptedSession, StackFrame, ThreadInfo};
use lanescope_core::{
    DebugSession, JsonFileStore, MemoryStore, RpcError, Settings, StopEvent, ViewSync,
};
use lanescope_protocol::{CoreMessage, ViewKind};

const TRANSCRIPT: &str = include_str!("fixtures/two_threads.json");

fn breakpoint_on_lane(lane: u32) -> StopEvent {
    StopEvent {
        reason: "breakpoint".into(),
        thread_id: Some(1),
        lane: Some(lane),
        hit_lanes_mask: Some("0x2".into()),
        breakpoint_type: None,
    }
}

fn html(message: &CoreMessage) -> &str {
    match message {
        CoreMessage::Change { html }
        | CoreMessage::AddSimdWatch { html }
        | CoreMessage::RefreshWatches { html }
        | CoreMessage::ExpandVarObject { html, .. } => html,
        other => panic!("message carries no html: {other:?}"),
    }
}

#[tokio::test]
async fn stop_watch_expand_and_remove() {
    let session = ScriptedSession::from_json(TRANSCRIPT).expect("transcript parses");
    let sync = ViewSync::new(Some(session), MemoryStore::new(), Settings::default()).unwrap();

    // Stop: thread 2 has no SIMD data and is left out of the table.
    let messages = sync.on_stop(breakpoint_on_lane(1)).await;
    assert_eq!(messages.len(), 2);
    let table = html(&messages[0]);
    assert!(table.contains(r#"id="lane-1-1" class="lane hit current""#));
    assert!(table.contains(r#"id="lane-1-0" class="lane active""#));
    assert!(table.contains(r#"id="lane-1-7" class="lane inactive""#));
    assert!(table.contains("<td>vadd.cl:12</td><td>0,1,0</td>"));
    assert!(!table.contains("thread-2"));

    // Add a watch: the stale object is deleted and creation retried once.
    let messages = sync
        .dispatch_json(r#"{"command":"addSimdWatch","uniqueId":"w1","expression":"pt"}"#)
        .await;
    assert_eq!(messages.len(), 1);
    let rows = html(&messages[0]);
    assert!(rows.contains(r#"<tr id="simd_w1" "#));
    assert!(rows.contains(r#"<tr id="simd_w1-0" "#));
    assert!(rows.contains(r#"<tr id="simd_w1-1" "#));
    let calls = sync.session().unwrap();
    assert_eq!(calls.count_calls("-exec -var-delete simd_w1"), 1);
    assert_eq!(calls.count_calls("-exec -var-create"), 2);

    // First toggle fetches, later toggles only flip visibility.
    let messages = sync
        .dispatch_json(r#"{"command":"expandVarObject","id":"simd_w1-0"}"#)
        .await;
    let [CoreMessage::ExpandVarObject { anchor, html }] = messages.as_slice() else {
        panic!("expected an expansion, got {messages:?}");
    };
    assert_eq!(anchor, "simd_w1-0");
    assert!(html.contains(r#"<tr id="simd_w1-0.x" "#));
    assert!(html.contains(r#"<tr id="simd_w1-0.y" "#));

    let collapse = sync
        .dispatch_json(r#"{"command":"expandVarObject","id":"simd_w1-0"}"#)
        .await;
    assert_eq!(
        collapse,
        vec![CoreMessage::SetRowVisibility {
            rows: vec!["simd_w1-0.x".into(), "simd_w1-0.y".into()],
            visible: false,
        }]
    );
    let reopen = sync
        .dispatch_json(r#"{"command":"expandVarObject","id":"simd_w1-0"}"#)
        .await;
    assert!(matches!(
        reopen.as_slice(),
        [CoreMessage::SetRowVisibility { visible: true, .. }]
    ));
    assert_eq!(
        sync.session()
            .unwrap()
            .count_calls("-exec -var-list-children --all-values simd_w1-0"),
        1
    );

    let messages = sync
        .dispatch_json(r#"{"command":"resolvePath","name":"simd_w1-0.x"}"#)
        .await;
    assert_eq!(
        messages,
        vec![CoreMessage::PathExpression {
            name: "simd_w1-0.x".into(),
            expression: "(pt).x".into(),
        }]
    );

    let messages = sync
        .dispatch_json(
            r#"{"command":"changeLane","id":"lane-1-3","previousLane":null,"viewType":"simdTable"}"#,
        )
        .await;
    assert_eq!(
        messages,
        vec![CoreMessage::ChangeLane {
            previous_lane: Some("lane-1-1".into()),
            current_lane: "lane-1-3".into(),
            view_type: ViewKind::SimdTable,
        }]
    );

    let messages = sync
        .dispatch_json(r#"{"command":"removeSIMDWatch","uniqueId":"w1"}"#)
        .await;
    assert_eq!(
        messages,
        vec![CoreMessage::RemoveSimdWatch {
            unique_id: "w1".into()
        }]
    );
    assert!(sync.watch_tree().is_empty());
    assert_eq!(
        sync.session().unwrap().count_calls("-exec -var-delete simd_w1"),
        2
    );
}

#[tokio::test]
async fn persisted_watches_and_html_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    {
        let detached: ViewSync<ScriptedSession, _> =
            ViewSync::new(None, JsonFileStore::open(&path), Settings::default()).unwrap();
        assert!(
            detached
                .dispatch_json(r#"{"command":"addSimdWatch","uniqueId":"w1","expression":" pt "}"#)
                .await
                .is_empty()
        );
        detached
            .dispatch_json(r#"{"command":"saveHTMLState","viewType":"simdWatch","html":"<table></table>"}"#)
            .await;
    }

    let session = ScriptedSession::from_json(TRANSCRIPT).unwrap();
    let sync = ViewSync::new(Some(session), JsonFileStore::open(&path), Settings::default()).unwrap();
    assert_eq!(
        sync.restored_html(ViewKind::SimdWatch).as_deref(),
        Some("<table></table>")
    );

    let messages = sync.on_stop(breakpoint_on_lane(0)).await;
    let watches = html(&messages[1]);
    assert!(watches.contains(r#"<tr id="simd_w1" "#));
    assert!(watches.contains(r#"<tr id="simd_w1-1" "#));
    assert!(!watches.contains("failed"));
}

/// Yields before every answer so concurrent handlers interleave.
struct YieldingSession(ScriptedSession);

#[async_trait(?Send)]
impl DebugSession for YieldingSession {
    async fn list_threads(&self) -> Result<Vec<ThreadInfo>, RpcError> {
        tokio::task::yield_now().await;
        self.0.list_threads().await
    }

    async fn top_frame(&self, thread_id: u64) -> Result<Option<StackFrame>, RpcError> {
        tokio::task::yield_now().await;
        self.0.top_frame(thread_id).await
    }

    async fn evaluate(
        &self,
        expression: &str,
        frame_id: Option<u64>,
        context: EvalContext,
        format_hex: bool,
    ) -> Result<String, RpcError> {
        tokio::task::yield_now().await;
        self.0
            .evaluate(expression, frame_id, context, format_hex)
            .await
    }
}

#[tokio::test]
async fn older_refresh_is_dropped_when_a_newer_one_starts() {
    let session = YieldingSession(ScriptedSession::from_json(TRANSCRIPT).unwrap());
    let sync = ViewSync::new(Some(session), MemoryStore::new(), Settings::default()).unwrap();

    let (first, second) = futures::join!(sync.refresh(), sync.refresh());
    assert!(first.is_empty());
    assert_eq!(second.len(), 2);
    assert!(sync.snapshot().is_some());
}

#[tokio::test]
async fn unknown_breakpoint_kind_shows_error_view() {
    let session = ScriptedSession::from_json(TRANSCRIPT).unwrap();
    let sync = ViewSync::new(Some(session), MemoryStore::new(), Settings::default()).unwrap();
    let messages = sync
        .on_stop(StopEvent {
            breakpoint_type: Some("tracepoint".into()),
            ..breakpoint_on_lane(0)
        })
        .await;
    assert_eq!(messages.len(), 1);
    assert!(html(&messages[0]).contains("simd-error"));
    assert!(sync.snapshot().is_none());
}

#[tokio::test]
async fn concurrent_expansions_of_one_row_fetch_once() {
    let session = YieldingSession(ScriptedSession::from_json(TRANSCRIPT).unwrap());
    let sync = ViewSync::new(Some(session), MemoryStore::new(), Settings::default()).unwrap();
    sync.on_stop(breakpoint_on_lane(1)).await;
    sync.dispatch_json(r#"{"command":"addSimdWatch","uniqueId":"w1","expression":"pt"}"#)
        .await;

    let expand = r#"{"command":"expandVarObject","id":"simd_w1-0"}"#;
    let (first, second) = futures::join!(sync.dispatch_json(expand), sync.dispatch_json(expand));
    let messages: Vec<CoreMessage> = first.into_iter().chain(second).collect();
    let [CoreMessage::ExpandVarObject { anchor, .. }] = messages.as_slice() else {
        panic!("expected a single expansion, got {messages:?}");
    };
    assert_eq!(anchor, "simd_w1-0");
    assert_eq!(
        sync.session()
            .unwrap()
            .0
            .count_calls("-exec -var-list-children --all-values simd_w1-0"),
        1
    );
}
