//! Scalar function proxy seam.

use crate::value::Value;

/// Calls client-owned scalar functions on behalf of the engine.
///
/// The engine only knows function *names*. When a statement calls a
/// registered scalar function, the engine asks the proxy to run the
/// client's handle synchronously and uses the returned value as the SQL
/// result. The client keeps ownership of every handle.
pub trait FunctionProxy: Send + Sync {
    /// Invokes the scalar function registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns a message if no scalar function has that name or the
    /// function itself fails; the engine surfaces it as a SQL error.
    fn call_scalar(&self, name: &str, args: &[Value]) -> Result<Value, String>;
}

/// A proxy with no functions; every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFunctions;

impl FunctionProxy for NoFunctions {
    fn call_scalar(&self, name: &str, _args: &[Value]) -> Result<Value, String> {
        Err(format!("no scalar function named {name:?}"))
    }
}
