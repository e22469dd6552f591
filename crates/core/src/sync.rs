//! View render/sync controller.
//!
//! ```text
//!   view ──ViewEvent──▶ ViewSync::dispatch ──▶ DebugSession (RPC)
//!                           │                  StateStore
//!                           ▼
//!   view ◀──CoreMessage── ordered messages
//! ```
//!
//! Handlers run on one cooperative event loop. The state lock is never held
//! across an `.await`; anything read before a suspension point is
//! re-validated after it. Full refreshes carry a generation ticket so a
//! slow refresh cannot overwrite a newer one.

use std::sync::atomic::{AtomicU64, Ordering};

use lanescope_protocol::{
    CoreMessage, LaneRef, LaneSymbols, SimdSnapshot, ThreadFilter, ViewEvent, ViewKind,
};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::config::{ConfigError, Settings};
use crate::error::CoreError;
use crate::filter;
use crate::mi::MiCommand;
use crate::rpc::{DebugSession, EvalContext, run_mi};
use crate::snapshot::{SnapshotBuilder, StopContext};
use crate::stop::StopEvent;
use crate::store::{self, StateStore, THREAD_FILTER_KEY, html_state_key};
use crate::views;
use crate::watch::engine::query_simd_width;
use crate::watch::{Toggle, WatchEngine, WatchList, WatchTree};

const CREATE_FAILED: &str = "variable object could not be created";

#[derive(Debug, Default)]
struct SyncState {
    snapshot: Option<SimdSnapshot>,
    stop: Option<StopContext>,
    /// Explicit lane selection; overrides the stop lane until the next stop.
    focus: Option<LaneRef>,
    tree: WatchTree,
    /// SIMD width the current watch objects were created with.
    width: u32,
}

pub struct ViewSync<S, St> {
    session: Option<S>,
    store: St,
    settings: Settings,
    symbols: LaneSymbols,
    state: Mutex<SyncState>,
    generation: AtomicU64,
}

impl<S: DebugSession, St: StateStore> ViewSync<S, St> {
    /// Fails when the configured lane symbols are invalid.
    pub fn new(session: Option<S>, store: St, settings: Settings) -> Result<Self, ConfigError> {
        let symbols = settings.lane_symbols()?;
        Ok(Self {
            session,
            store,
            settings,
            symbols,
            state: Mutex::new(SyncState::default()),
            generation: AtomicU64::new(0),
        })
    }

    /// Attach or detach the debug session. Per-session state is dropped;
    /// persisted state is kept.
    pub fn set_session(&mut self, session: Option<S>) {
        self.session = session;
        *self.state.get_mut() = SyncState::default();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn session(&self) -> Option<&S> {
        self.session.as_ref()
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    pub fn symbols(&self) -> &LaneSymbols {
        &self.symbols
    }

    pub fn snapshot(&self) -> Option<SimdSnapshot> {
        self.state.lock().snapshot.clone()
    }

    pub fn watch_tree(&self) -> WatchTree {
        self.state.lock().tree.clone()
    }

    /// The last applied thread filter.
    pub fn thread_filter(&self) -> ThreadFilter {
        store::load_or_default::<ThreadFilter, _>(&self.store, THREAD_FILTER_KEY).migrated()
    }

    /// Serialised HTML a view saved before being torn down.
    pub fn restored_html(&self, view: ViewKind) -> Option<String> {
        match self.store.get(&html_state_key(view)) {
            Some(Value::String(html)) => Some(html),
            _ => None,
        }
    }

    fn active_session(&self) -> Option<&S> {
        self.session.as_ref().filter(|s| s.is_active())
    }

    fn require_session(&self) -> Result<&S, CoreError> {
        self.active_session().ok_or(CoreError::NoSession)
    }

    fn engine<'a>(&'a self, session: &'a S, width: u32) -> WatchEngine<'a, S> {
        WatchEngine::new(session, width).with_max_anonymous_depth(self.settings.max_anonymous_depth)
    }

    /// Parse and dispatch a raw view message. Malformed messages are
    /// dropped.
    pub async fn dispatch_json(&self, text: &str) -> Vec<CoreMessage> {
        match serde_json::from_str::<ViewEvent>(text) {
            Ok(event) => self.dispatch(event).await,
            Err(err) => {
                warn!(%err, "dropping malformed view event");
                Vec::new()
            }
        }
    }

    pub async fn dispatch(&self, event: ViewEvent) -> Vec<CoreMessage> {
        debug!(?event, "view event");
        let result = match event {
            ViewEvent::ChangeLane {
                id,
                previous_lane,
                view_type,
            } => self.change_lane(id, previous_lane, view_type).await,
            ViewEvent::AddSimdWatch {
                unique_id,
                expression,
            } => self.add_watch(unique_id, &expression).await,
            ViewEvent::RemoveSimdWatch { unique_id } => self.remove_watch(unique_id).await,
            ViewEvent::ExpandVarObject { id } => self.expand(id).await,
            ViewEvent::SaveHtmlState { view_type, html } => self.save_html(view_type, html),
            ViewEvent::ApplyFilter { filter } => self.apply_filter(filter).await,
            ViewEvent::ClearFilter => self.clear_filter().await,
            ViewEvent::ClearSimdWatches => self.clear_watches().await,
            ViewEvent::Refresh => return self.refresh().await,
            ViewEvent::ResolvePath { name } => self.resolve_path(name).await,
        };
        result.unwrap_or_else(report)
    }

    /// Handle a debugger stop: record the stop context and rebuild both
    /// views.
    #[instrument(skip_all, fields(reason = %event.reason))]
    pub async fn on_stop(&self, event: StopEvent) -> Vec<CoreMessage> {
        let reason = match event.reason() {
            Ok(reason) => reason,
            Err(err) => {
                error!(%err, "cannot handle stop");
                return vec![CoreMessage::Change {
                    html: views::render_error(&err.to_string()),
                }];
            }
        };
        debug!(?reason, thread = ?event.thread_id, "debugger stopped");
        {
            let mut state = self.state.lock();
            state.stop = Some(event.context(&reason));
            state.focus = None;
        }
        self.refresh().await
    }

    /// Rebuild the lane table and re-create every persisted watch.
    #[instrument(skip_all)]
    pub async fn refresh(&self) -> Vec<CoreMessage> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(session) = self.active_session() else {
            self.state.lock().snapshot = None;
            return vec![CoreMessage::Change {
                html: views::render_idle(),
            }];
        };

        match self.rebuild(session).await {
            Ok((snapshot, tree, width)) => {
                if self.generation.load(Ordering::SeqCst) != ticket {
                    debug!(ticket, "refresh superseded, dropping result");
                    return Vec::new();
                }
                let messages = vec![
                    CoreMessage::Change {
                        html: views::render_simd_table(&snapshot, &self.symbols),
                    },
                    CoreMessage::RefreshWatches {
                        html: views::render_watch_table(&tree),
                    },
                ];
                let mut state = self.state.lock();
                state.snapshot = Some(snapshot);
                state.tree = tree;
                state.width = width;
                messages
            }
            Err(err) if err.is_transient() => {
                debug!(%err, "refresh raced a running target");
                Vec::new()
            }
            Err(CoreError::NoSession) => vec![CoreMessage::Change {
                html: views::render_idle(),
            }],
            Err(err) => {
                error!(%err, "refresh failed");
                vec![CoreMessage::Change {
                    html: views::render_error(&err.to_string()),
                }]
            }
        }
    }

    async fn rebuild(&self, session: &S) -> Result<(SimdSnapshot, WatchTree, u32), CoreError> {
        let (stop, focus, stale) = {
            let state = self.state.lock();
            (state.stop.clone(), state.focus, state.tree.root_names())
        };

        let snapshot = SnapshotBuilder::new(session, &self.settings.expressions)
            .build(stop.as_ref(), focus)
            .await?;
        let width = match query_simd_width(session).await {
            Ok(Some(width)) => width,
            Ok(None) => fallback_width(&snapshot, stop.as_ref()),
            Err(err) => {
                debug!(%err, "no SIMD width from backend, using snapshot");
                fallback_width(&snapshot, stop.as_ref())
            }
        };

        let engine = self.engine(session, width);
        engine.delete_quietly(&stale).await;
        let requests = WatchList::new(&self.store).load();
        let results = engine.fetch_vars(&requests).await;

        let mut tree = WatchTree::new();
        for (request, result) in requests.iter().zip(results) {
            match result {
                Some(result) => {
                    tree.insert_watch(&result);
                }
                None => {
                    tree.insert_failed(request, CREATE_FAILED);
                }
            }
        }
        Ok((snapshot, tree, width))
    }

    async fn change_lane(
        &self,
        id: String,
        previous_lane: Option<String>,
        view_type: ViewKind,
    ) -> Result<Vec<CoreMessage>, CoreError> {
        let Some(target) = LaneRef::parse_cell_id(&id) else {
            warn!(%id, "ignoring malformed lane id");
            return Ok(Vec::new());
        };
        let session = self.require_session()?;
        let select = MiCommand::SelectLane {
            thread_id: target.thread_id,
            lane: target.lane,
        };
        run_mi(session, &select, None).await?;

        let previous = {
            let mut state = self.state.lock();
            state.focus = Some(target);
            state
                .snapshot
                .as_mut()
                .and_then(|snapshot| snapshot.select_lane(target))
        };
        Ok(vec![CoreMessage::ChangeLane {
            previous_lane: previous.map(|lane| lane.cell_id()).or(previous_lane),
            current_lane: id,
            view_type,
        }])
    }

    async fn add_watch(
        &self,
        unique_id: Option<String>,
        expression: &str,
    ) -> Result<Vec<CoreMessage>, CoreError> {
        if expression.trim().is_empty() {
            debug!("ignoring empty watch expression");
            return Ok(Vec::new());
        }
        let request = WatchList::new(&self.store).add(unique_id, expression)?;
        let Some(session) = self.active_session() else {
            debug!(id = %request.unique_id, "no session, watch kept for the next stop");
            return Ok(Vec::new());
        };

        let width = self.watch_width(session).await;
        let fetched = self.engine(session, width).fetch_var(&request).await;
        let rows = {
            let mut state = self.state.lock();
            match fetched {
                Ok(Some(result)) => state.tree.insert_watch(&result),
                Ok(None) => vec![state.tree.insert_failed(&request, CREATE_FAILED)],
                Err(err) if err.is_transient() => {
                    debug!(%err, "watch creation raced a running target");
                    return Ok(Vec::new());
                }
                Err(err) => {
                    warn!(expression = %request.expression, %err, "watch evaluation failed");
                    vec![state.tree.insert_failed(&request, err.to_string())]
                }
            }
        };
        Ok(vec![CoreMessage::AddSimdWatch {
            html: views::render_rows(&rows),
        }])
    }

    /// Lane width for a watch created between refreshes. Before the first
    /// successful refresh the backend is asked directly.
    async fn watch_width(&self, session: &S) -> u32 {
        let known = self.state.lock().width;
        if known > 0 {
            return known;
        }
        match query_simd_width(session).await {
            Ok(Some(width)) => width,
            Ok(None) => 0,
            Err(err) => {
                debug!(%err, "no SIMD width from backend, creating unscoped watch");
                0
            }
        }
    }

    async fn remove_watch(&self, unique_id: String) -> Result<Vec<CoreMessage>, CoreError> {
        if !WatchList::new(&self.store).remove(&unique_id)? {
            debug!(%unique_id, "watch was not persisted");
        }
        let removed = self.state.lock().tree.remove_watch(&unique_id);
        if let (Some(root), Some(session)) = (removed.first(), self.active_session()) {
            self.engine(session, 0)
                .delete_quietly(std::slice::from_ref(root))
                .await;
        }
        Ok(vec![CoreMessage::RemoveSimdWatch { unique_id }])
    }

    async fn expand(&self, id: String) -> Result<Vec<CoreMessage>, CoreError> {
        let toggle = self.state.lock().tree.toggle(&id)?;
        let name = match toggle {
            Toggle::Fetch { name } => name,
            Toggle::Collapse { rows } => return Ok(visibility(rows, false)),
            Toggle::Expand { rows } => return Ok(visibility(rows, true)),
            Toggle::Busy => {
                debug!(%id, "expansion already in flight");
                return Ok(Vec::new());
            }
            Toggle::Leaf => return Ok(Vec::new()),
        };

        let ticket = self.generation.load(Ordering::SeqCst);
        let fetched = match self.active_session() {
            Some(session) => self.engine(session, 0).get_next_child(&name).await,
            None => Err(CoreError::NoSession),
        };

        let mut state = self.state.lock();
        if self.generation.load(Ordering::SeqCst) != ticket {
            // the tree may already have been replaced
            if state.tree.abort_expand(&id).is_ok() {
                debug!(%id, "refresh started during expansion, dropping children");
            }
            return Ok(Vec::new());
        }
        match fetched {
            Ok(children) => {
                let rows = state.tree.complete_expand(&id, children)?;
                Ok(vec![CoreMessage::ExpandVarObject {
                    anchor: id,
                    html: views::render_rows(&rows),
                }])
            }
            Err(err) => {
                state.tree.abort_expand(&id)?;
                Err(err)
            }
        }
    }

    fn save_html(&self, view: ViewKind, html: String) -> Result<Vec<CoreMessage>, CoreError> {
        self.store.set(&html_state_key(view), Value::String(html))?;
        Ok(Vec::new())
    }

    async fn apply_filter(&self, filter: ThreadFilter) -> Result<Vec<CoreMessage>, CoreError> {
        let filter = filter.migrated();
        store::save(&self.store, THREAD_FILTER_KEY, &filter)?;
        if let Some(command) = filter::compile(&filter) {
            let session = self.require_session()?;
            session
                .evaluate(&command, None, EvalContext::Repl, false)
                .await?;
        }
        Ok(self.refresh().await)
    }

    async fn clear_filter(&self) -> Result<Vec<CoreMessage>, CoreError> {
        store::save(&self.store, THREAD_FILTER_KEY, &ThreadFilter::default())?;
        let all_threads = ThreadFilter {
            thread_value: Some("*".to_string()),
            ..ThreadFilter::default()
        };
        if let (Some(session), Some(command)) =
            (self.active_session(), filter::compile(&all_threads))
        {
            session
                .evaluate(&command, None, EvalContext::Repl, false)
                .await?;
        }
        Ok(self.refresh().await)
    }

    async fn clear_watches(&self) -> Result<Vec<CoreMessage>, CoreError> {
        WatchList::new(&self.store).clear()?;
        let roots = self.state.lock().tree.clear();
        if let Some(session) = self.active_session() {
            self.engine(session, 0).delete_quietly(&roots).await;
        }
        Ok(vec![CoreMessage::ClearSimdWatches])
    }

    async fn resolve_path(&self, name: String) -> Result<Vec<CoreMessage>, CoreError> {
        let session = self.require_session()?;
        match self.engine(session, 0).path_expression(&name).await? {
            Some(expression) => Ok(vec![CoreMessage::PathExpression { name, expression }]),
            None => {
                warn!(%name, "backend returned no path expression");
                Ok(Vec::new())
            }
        }
    }
}

/// Turn a handler failure into view messages. Transient races and a
/// missing session are silent.
fn report(err: CoreError) -> Vec<CoreMessage> {
    if err.is_transient() {
        debug!(%err, "hiding transient failure");
        return Vec::new();
    }
    if matches!(err, CoreError::NoSession) {
        debug!("no active debug session");
        return Vec::new();
    }
    error!(%err, "view event failed");
    vec![CoreMessage::Error {
        message: err.to_string(),
    }]
}

fn visibility(rows: Vec<String>, visible: bool) -> Vec<CoreMessage> {
    if rows.is_empty() {
        return Vec::new();
    }
    vec![CoreMessage::SetRowVisibility { rows, visible }]
}

/// Width of the focused (else stopped) thread, else the widest thread.
fn fallback_width(snapshot: &SimdSnapshot, stop: Option<&StopContext>) -> u32 {
    snapshot
        .current_lane()
        .map(|lane| lane.thread_id)
        .or_else(|| stop.and_then(|s| s.thread_id))
        .and_then(|thread_id| snapshot.thread(thread_id))
        .map_or_else(|| snapshot.max_width(), |thread| thread.simd_width)
}
