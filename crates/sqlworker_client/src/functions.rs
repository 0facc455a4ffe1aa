//! Client-owned user function handles.

use crate::error::{ClientError, ClientResult};
use parking_lot::RwLock;
use sqlworker_protocol::{FunctionKind, FunctionProxy, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Fire-and-forget function called with the SQL arguments.
pub type CallbackFn = Arc<dyn Fn(Vec<Value>) + Send + Sync>;

/// Function whose return value is used by the SQL statement.
pub type ScalarFn = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Handle {
    Callback(CallbackFn),
    Scalar(ScalarFn),
}

impl Handle {
    pub(crate) fn kind(&self) -> FunctionKind {
        match self {
            Handle::Callback(_) => FunctionKind::Callback,
            Handle::Scalar(_) => FunctionKind::Scalar,
        }
    }
}

/// Name → handle table. The engine looks scalars up through
/// [`FunctionProxy`]; callbacks are invoked by the dispatcher.
#[derive(Default)]
pub(crate) struct FunctionRegistry {
    handles: RwLock<HashMap<String, Handle>>,
}

impl FunctionRegistry {
    pub(crate) fn insert(&self, name: &str, handle: Handle) -> ClientResult<()> {
        let mut handles = self.handles.write();
        if handles.contains_key(name) {
            return Err(ClientError::FunctionExists(name.to_string()));
        }
        handles.insert(name.to_string(), handle);
        Ok(())
    }

    pub(crate) fn remove(&self, name: &str) {
        self.handles.write().remove(name);
    }

    /// Invokes the callback `name`; returns false if there is none.
    pub(crate) fn invoke_callback(&self, name: &str, args: Vec<Value>) -> bool {
        let handle = self.handles.read().get(name).cloned();
        match handle {
            Some(Handle::Callback(f)) => {
                f(args);
                true
            }
            _ => false,
        }
    }
}

impl FunctionProxy for FunctionRegistry {
    fn call_scalar(&self, name: &str, args: &[Value]) -> Result<Value, String> {
        let handle = self.handles.read().get(name).cloned();
        match handle {
            Some(Handle::Scalar(f)) => f(args),
            Some(Handle::Callback(_)) => Err(format!("{name} is a callback function")),
            None => Err(format!("no scalar function named {name:?}")),
        }
    }
}
