//! Backend dispatcher with local fallback.
//!
//! When a remote backend is configured, calls go there first. Two error
//! codes from the remote side, `UNSUPPORTED_TOOL` and `LOCAL_ONLY_ACTION`
//! (plus the legacy phrase "not supported in SaaS mode" anywhere in the
//! message), cause a retry against the local backend. Any other error
//! propagates verbatim.

use serde_json::Value;
use tracing::debug;

use crate::backend::{Backend, LocalBackend};
use crate::error::Result;

/// Dispatches tool calls to a remote backend with local fallback, or
/// straight to the local backend when no remote is configured.
pub struct Dispatcher {
    remote: Option<Box<dyn Backend>>,
    local: LocalBackend,
}

impl Dispatcher {
    /// Local-only dispatcher.
    #[must_use]
    pub fn local(local: LocalBackend) -> Self {
        Self {
            remote: None,
            local,
        }
    }

    /// Remote-first dispatcher with local fallback.
    #[must_use]
    pub fn with_remote(remote: Box<dyn Backend>, local: LocalBackend) -> Self {
        Self {
            remote: Some(remote),
            local,
        }
    }

    /// Access the local backend (for startup wiring and tests).
    #[must_use]
    pub fn local_backend_mut(&mut self) -> &mut LocalBackend {
        &mut self.local
    }

    /// Execute a tool call, applying the fallback rule.
    pub fn execute(&mut self, tool: &str, action: &str, params: Value) -> Result<Value> {
        if let Some(remote) = &mut self.remote {
            match remote.execute(tool, action, params.clone()) {
                Ok(result) => return Ok(result),
                Err(e) if e.triggers_local_fallback() => {
                    debug!(tool, action, error = %e, "Remote declined, retrying locally");
                }
                Err(e) => return Err(e),
            }
        }
        self.local.execute(tool, action, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::Engine;
    use serde_json::json;

    /// Remote stub that fails every call with a configured error.
    struct FailingRemote {
        error: fn() -> Error,
        calls: std::rc::Rc<std::cell::Cell<usize>>,
    }

    impl Backend for FailingRemote {
        fn execute(&mut self, _tool: &str, _action: &str, _params: Value) -> Result<Value> {
            self.calls.set(self.calls.get() + 1);
            Err((self.error)())
        }
    }

    fn local() -> LocalBackend {
        LocalBackend::new(Engine::open_memory("demo").unwrap())
    }

    fn dispatcher_with(error: fn() -> Error) -> (Dispatcher, std::rc::Rc<std::cell::Cell<usize>>) {
        let calls = std::rc::Rc::new(std::cell::Cell::new(0));
        let remote = FailingRemote {
            error,
            calls: calls.clone(),
        };
        (Dispatcher::with_remote(Box::new(remote), local()), calls)
    }

    #[test]
    fn unsupported_tool_falls_back_to_local() {
        let (mut dispatcher, calls) = dispatcher_with(|| Error::UnsupportedTool {
            tool: "decision".to_string(),
        });

        let result = dispatcher
            .execute("decision", "set", json!({ "key": "k", "value": "v" }))
            .unwrap();
        assert_eq!(result["key"], "k");
        assert_eq!(calls.get(), 1, "remote was tried first");
    }

    #[test]
    fn local_only_action_falls_back() {
        let (mut dispatcher, _) = dispatcher_with(|| Error::LocalOnlyAction {
            tool: "task".to_string(),
            action: "move".to_string(),
        });

        let created = dispatcher
            .execute("task", "create", json!({ "title": "t" }))
            .unwrap();
        assert!(created["id"].is_i64());
    }

    #[test]
    fn legacy_saas_phrase_falls_back() {
        let (mut dispatcher, _) =
            dispatcher_with(|| Error::Remote("action not supported in SaaS mode".to_string()));

        let result = dispatcher
            .execute("decision", "set", json!({ "key": "k", "value": "v" }))
            .unwrap();
        assert_eq!(result["key"], "k");
    }

    #[test]
    fn other_remote_errors_propagate_verbatim() {
        let (mut dispatcher, _) =
            dispatcher_with(|| Error::Remote("connection reset by peer".to_string()));

        let err = dispatcher
            .execute("decision", "set", json!({ "key": "k", "value": "v" }))
            .unwrap_err();
        assert!(err.to_string().contains("connection reset by peer"));
    }

    #[test]
    fn no_remote_goes_straight_to_local() {
        let mut dispatcher = Dispatcher::local(local());
        let result = dispatcher
            .execute("decision", "set", json!({ "key": "k", "value": "v" }))
            .unwrap();
        assert_eq!(result["key"], "k");
    }
}
