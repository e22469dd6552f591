use futures::FutureExt;
use futures::future::{LocalBoxFuture, join_all};
use futures::stream::{FuturesUnordered, StreamExt};
use lanescope_protocol::{VariableNode, WatchRequest};
use tracing::{debug, instrument, warn};

use crate::config::DEFAULT_MAX_ANONYMOUS_DEPTH;
use crate::error::CoreError;
use crate::mask;
use crate::mi::{self, MiCommand};
use crate::rpc::{DebugSession, RpcError, run_mi};

/// A watch request resolved against the backend: its lane-scoped root
/// object and one child per lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchResult {
    pub request: WatchRequest,
    pub root: VariableNode,
    pub lanes: Vec<VariableNode>,
}

/// Creates and expands backend variable objects for watch requests,
/// scoped to every lane of the current SIMD width.
pub struct WatchEngine<'a, S: ?Sized> {
    session: &'a S,
    width: u32,
    max_anonymous_depth: usize,
}

impl<'a, S: DebugSession + ?Sized> WatchEngine<'a, S> {
    pub fn new(session: &'a S, width: u32) -> Self {
        Self {
            session,
            width,
            max_anonymous_depth: DEFAULT_MAX_ANONYMOUS_DEPTH,
        }
    }

    pub fn with_max_anonymous_depth(mut self, depth: usize) -> Self {
        self.max_anonymous_depth = depth;
        self
    }

    /// Resolve every request concurrently.
    ///
    /// Slot `i` of the result belongs to `requests[i]` whatever order the
    /// fetches complete in. A failed request leaves its slot `None`.
    #[instrument(skip_all, fields(requests = requests.len()))]
    pub async fn fetch_vars(&self, requests: &[WatchRequest]) -> Vec<Option<WatchResult>> {
        let mut slots: Vec<Option<WatchResult>> = requests.iter().map(|_| None).collect();
        let mut pending: FuturesUnordered<_> = requests
            .iter()
            .enumerate()
            .map(|(index, request)| async move { (index, self.fetch_var(request).await) })
            .collect();

        while let Some((index, result)) = pending.next().await {
            slots[index] = match result {
                Ok(resolved) => resolved,
                Err(err) => {
                    warn!(expression = %requests[index].expression, %err, "watch fetch failed");
                    None
                }
            };
        }
        slots
    }

    /// Resolve one request: its root object and, for aggregates, the per-lane
    /// children.
    pub async fn fetch_var(&self, request: &WatchRequest) -> Result<Option<WatchResult>, CoreError> {
        let Some(root) = self.ensure_variable_creation(request).await? else {
            return Ok(None);
        };
        let lanes = if root.has_children() {
            self.get_next_child(&root.name).await?
        } else {
            Vec::new()
        };
        Ok(Some(WatchResult {
            request: request.clone(),
            root,
            lanes,
        }))
    }

    /// Create the lane-scoped variable object for `request`.
    ///
    /// A duplicate-name collision deletes the stale object and retries
    /// once, even when the delete itself fails; if the retry fails too the
    /// result is `Ok(None)`. Any other
    /// first failure is returned as an error.
    pub async fn ensure_variable_creation(
        &self,
        request: &WatchRequest,
    ) -> Result<Option<VariableNode>, CoreError> {
        let name = request.var_name();
        let create = MiCommand::VarCreate {
            name: name.clone(),
            lanes_mask: (self.width > 0).then(|| mask::full_lanes_mask(self.width)),
            expression: request.expression.clone(),
        };

        match run_mi(self.session, &create, None).await {
            Ok(reply) => Ok(Some(mi::parse_variable(&reply)?)),
            Err(err) if err.is_duplicate_name() => {
                debug!(%name, "variable object exists, recreating");
                let delete = MiCommand::VarDelete { name: name.clone() };
                if let Err(err) = run_mi(self.session, &delete, None).await {
                    warn!(%name, %err, "stale variable object delete failed, retrying anyway");
                }
                match run_mi(self.session, &create, None).await {
                    Ok(reply) => Ok(Some(mi::parse_variable(&reply)?)),
                    Err(err) => {
                        warn!(%name, %err, "variable object creation failed after retry");
                        Ok(None)
                    }
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Immediate children of `name`, with anonymous aggregates replaced in
    /// place by their own children.
    pub fn get_next_child<'b>(
        &'b self,
        name: &'b str,
    ) -> LocalBoxFuture<'b, Result<Vec<VariableNode>, CoreError>> {
        self.expand_level(name, 0)
    }

    fn expand_level<'b>(
        &'b self,
        name: &'b str,
        depth: usize,
    ) -> LocalBoxFuture<'b, Result<Vec<VariableNode>, CoreError>> {
        async move {
            let list = MiCommand::VarListChildren {
                name: name.to_string(),
            };
            let reply = run_mi(self.session, &list, None).await?;
            let mut nodes = Vec::new();
            for child in mi::parse_children(&reply) {
                if !child.is_anonymous() {
                    nodes.push(child);
                } else if depth >= self.max_anonymous_depth {
                    warn!(name = %child.name, depth, "anonymous nesting too deep, dropping child");
                } else {
                    nodes.extend(self.expand_level(&child.name, depth + 1).await?);
                }
            }
            Ok(nodes)
        }
        .boxed_local()
    }

    /// Source-level expression addressing a variable object.
    pub async fn path_expression(&self, name: &str) -> Result<Option<String>, CoreError> {
        let command = MiCommand::VarInfoPathExpression {
            name: name.to_string(),
        };
        let reply = run_mi(self.session, &command, None).await?;
        Ok(mi::parse_path_expression(&reply))
    }

    /// Delete backend objects. Failures are logged and otherwise ignored.
    pub async fn delete_quietly(&self, names: &[String]) {
        let deletes = names.iter().map(|name| async move {
            let command = MiCommand::VarDelete { name: name.clone() };
            if let Err(err) = run_mi(self.session, &command, None).await {
                debug!(%name, %err, "ignoring failed variable delete");
            }
        });
        join_all(deletes).await;
    }
}

/// Ask the backend for the current thread's SIMD width.
pub async fn query_simd_width<S: DebugSession + ?Sized>(
    session: &S,
) -> Result<Option<u32>, RpcError> {
    let reply = run_mi(session, &MiCommand::ThreadSimdWidth, None).await?;
    Ok(mi::parse_simd_width(&reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{Reply, ScriptedSession};

    const DUPLICATE: &str = "Duplicate variable object name";

    fn request() -> WatchRequest {
        WatchRequest::new("w1", "a[i]")
    }

    fn create_cmd() -> String {
        "-exec -var-create --lanes-mask 0xff simd_w1 * a[i]".to_string()
    }

    const ROOT: &str = r#"name="simd_w1",numchild="2",value="{...}",type="int",thread-id="1",has_more="0""#;
    const LANES: &str = r#"numchild="2",children=[child={name="simd_w1-0",exp="0",numchild="0",value="3",type="int",thread-id="1"},child={name="simd_w1-1",exp="1",numchild="0",value="4",type="int",thread-id="1"}]"#;

    #[tokio::test]
    async fn duplicate_name_is_retried_once() {
        let session = ScriptedSession::new()
            .reply(None, &create_cmd(), Reply::error(DUPLICATE))
            .reply(None, &create_cmd(), Reply::ok(ROOT))
            .reply(None, "-exec -var-delete simd_w1", Reply::ok("^done"));
        let engine = WatchEngine::new(&session, 8);

        let node = engine.ensure_variable_creation(&request()).await.unwrap();
        assert_eq!(node.unwrap().name, "simd_w1");
        assert_eq!(session.count_calls("-exec -var-delete"), 1);
        assert_eq!(session.count_calls("-exec -var-create"), 2);
    }

    #[tokio::test]
    async fn second_collision_returns_failure_without_more_retries() {
        let session = ScriptedSession::new()
            .reply(None, &create_cmd(), Reply::error(DUPLICATE))
            .reply(None, "-exec -var-delete simd_w1", Reply::ok("^done"));
        let engine = WatchEngine::new(&session, 8);

        let node = engine.ensure_variable_creation(&request()).await.unwrap();
        assert!(node.is_none());
        assert_eq!(session.count_calls("-exec -var-delete"), 1);
        assert_eq!(session.count_calls("-exec -var-create"), 2);
    }

    #[tokio::test]
    async fn failed_delete_still_retries_once() {
        let session = ScriptedSession::new()
            .reply(None, &create_cmd(), Reply::error(DUPLICATE))
            .reply(None, &create_cmd(), Reply::ok(ROOT))
            .reply(
                None,
                "-exec -var-delete simd_w1",
                Reply::error("Variable object not found"),
            );
        let engine = WatchEngine::new(&session, 8);

        let node = engine.ensure_variable_creation(&request()).await.unwrap();
        assert_eq!(node.unwrap().name, "simd_w1");
        assert_eq!(session.count_calls("-exec -var-delete"), 1);
        assert_eq!(session.count_calls("-exec -var-create"), 2);
    }

    #[tokio::test]
    async fn other_errors_propagate_without_retry() {
        let session = ScriptedSession::new().reply(
            None,
            &create_cmd(),
            Reply::error("No symbol \"a\" in current context."),
        );
        let engine = WatchEngine::new(&session, 8);

        let result = engine.ensure_variable_creation(&request()).await;
        assert!(matches!(result, Err(CoreError::Rpc(RpcError::Backend(_)))));
        assert_eq!(session.count_calls("-exec -var-create"), 1);
        assert_eq!(session.count_calls("-exec -var-delete"), 0);
    }

    #[tokio::test]
    async fn zero_width_creates_unscoped_object() {
        let session = ScriptedSession::new().reply(
            None,
            "-exec -var-create simd_w1 * a[i]",
            Reply::ok(ROOT),
        );
        let engine = WatchEngine::new(&session, 0);
        assert!(engine.ensure_variable_creation(&request()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn fetch_vars_keeps_request_order() {
        let session = ScriptedSession::new()
            .reply(None, &create_cmd(), Reply::ok(ROOT))
            .reply(
                None,
                "-exec -var-list-children --all-values simd_w1",
                Reply::ok(LANES),
            )
            .reply(
                None,
                "-exec -var-create --lanes-mask 0xff simd_w2 * b",
                Reply::error("No symbol \"b\" in current context."),
            )
            .reply(
                None,
                "-exec -var-create --lanes-mask 0xff simd_w3 * c",
                Reply::ok(r#"name="simd_w3",numchild="0",value="1",type="int""#),
            );
        let engine = WatchEngine::new(&session, 8);
        let requests = vec![
            request(),
            WatchRequest::new("w2", "b"),
            WatchRequest::new("w3", "c"),
        ];

        let results = engine.fetch_vars(&requests).await;
        assert_eq!(results.len(), 3);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.request.unique_id, "w1");
        let lanes: Vec<Option<u32>> = first.lanes.iter().map(|l| l.lane).collect();
        assert_eq!(lanes, vec![Some(0), Some(1)]);
        assert!(results[1].is_none());
        let third = results[2].as_ref().unwrap();
        assert_eq!(third.request.unique_id, "w3");
        assert!(third.lanes.is_empty());
    }

    #[tokio::test]
    async fn anonymous_children_are_flattened_in_place() {
        let session = ScriptedSession::new()
            .reply(
                None,
                "-exec -var-list-children --all-values s",
                Reply::ok(
                    r#"[child={name="s.a",exp="a",numchild="0",value="1",type="int"},child={name="s.1_anon",exp="<anonymous union>",numchild="2"},child={name="s.z",exp="z",numchild="0",value="9",type="int"}]"#,
                ),
            )
            .reply(
                None,
                "-exec -var-list-children --all-values s.1_anon",
                Reply::ok(
                    r#"[child={name="s.1_anon.f",exp="f",numchild="0",value="1.5",type="float"},child={name="s.1_anon.2_anon",exp="<anonymous struct>",numchild="1"}]"#,
                ),
            )
            .reply(
                None,
                "-exec -var-list-children --all-values s.1_anon.2_anon",
                Reply::ok(r#"[child={name="s.1_anon.2_anon.q",exp="q",numchild="0",value="0",type="char"}]"#),
            );
        let engine = WatchEngine::new(&session, 8);

        let children = engine.get_next_child("s").await.unwrap();
        let exps: Vec<&str> = children.iter().map(|c| c.exp.as_str()).collect();
        assert_eq!(exps, vec!["a", "f", "q", "z"]);
    }

    #[tokio::test]
    async fn self_referential_anonymous_chain_is_bounded() {
        let session = ScriptedSession::new().reply(
            None,
            "-exec -var-list-children --all-values loop",
            Reply::ok(r#"[child={name="loop",exp="<anonymous>",numchild="1"},child={name="loop.x",exp="x",numchild="0",type="int"}]"#),
        );
        let engine = WatchEngine::new(&session, 8).with_max_anonymous_depth(2);

        let children = engine.get_next_child("loop").await.unwrap();
        // depth 0, 1 and 2 each contribute `x`; the anonymous child at
        // depth 2 is dropped.
        assert_eq!(children.len(), 3);
        assert!(children.iter().all(|c| c.exp == "x"));
        assert_eq!(
            session.count_calls("-exec -var-list-children --all-values loop"),
            3
        );
    }

    #[tokio::test]
    async fn path_expression_and_width() {
        let session = ScriptedSession::new()
            .reply(
                None,
                "-exec -var-info-path-expression simd_w1-3.a",
                Reply::ok(r#"path_expr="(a[i]).a""#),
            )
            .reply(None, "-exec -thread-simd-width", Reply::ok(r#"width="16""#));
        let engine = WatchEngine::new(&session, 8);
        assert_eq!(
            engine.path_expression("simd_w1-3.a").await.unwrap().as_deref(),
            Some("(a[i]).a")
        );
        assert_eq!(query_simd_width(&session).await.unwrap(), Some(16));
    }

    #[tokio::test]
    async fn quiet_delete_swallows_errors() {
        let session = ScriptedSession::new()
            .reply(None, "-exec -var-delete simd_a", Reply::ok("^done"))
            .reply(None, "-exec -var-delete simd_b", Reply::error("Variable object not found"));
        let engine = WatchEngine::new(&session, 8);
        engine
            .delete_quietly(&["simd_a".to_string(), "simd_b".to_string()])
            .await;
        assert_eq!(session.count_calls("-exec -var-delete"), 2);
    }
}
