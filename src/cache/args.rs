//! Call arguments and signature binding
//!
//! A stage declares its `Signature`; a call supplies `CallArgs`. Binding turns
//! the two into `BoundArgs`: every named parameter resolved (explicitly or by
//! default), surplus positional values in the variadic slot, surplus keyword
//! values in the variadic-keyword map. Binding is pure and never touches the
//! cache.

use crate::codec;
use crate::error::{ArgumentError, CacheError, CacheResult};
use serde::Serialize;
use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A single argument value
///
/// Serializable values are encoded once, up front, so fingerprinting never
/// re-runs their `Serialize` impl. Opaque values (locks, handles, clients)
/// can be passed to a stage but make the call uncacheable unless excluded.
#[derive(Clone)]
pub struct Arg {
    encoded: Result<serde_json::Value, String>,
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Arg {
    /// Wrap a serializable value
    pub fn new<T: Serialize + Any + Send + Sync>(value: T) -> Self {
        Self {
            encoded: codec::to_canonical(&value),
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Wrap a value that has no durable representation
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            encoded: Err(format!("{} has no serializable form", type_name::<T>())),
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Canonical encoded form, or why there is none
    pub fn encoded(&self) -> Result<&serde_json::Value, &str> {
        self.encoded.as_ref().map_err(String::as_str)
    }

    /// Borrow the value as `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Rust type name of the wrapped value
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.encoded {
            Ok(v) => write!(f, "Arg({})", v),
            Err(_) => write!(f, "Arg(<opaque {}>)", self.type_name),
        }
    }
}

/// Arguments for one call, in call order
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    positional: Vec<Arg>,
    keyword: Vec<(String, Arg)>,
}

impl CallArgs {
    /// Create an empty argument list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    pub fn arg<T: Serialize + Any + Send + Sync>(mut self, value: T) -> Self {
        self.positional.push(Arg::new(value));
        self
    }

    /// Append an opaque positional argument
    pub fn arg_opaque<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.positional.push(Arg::opaque(value));
        self
    }

    /// Append a keyword argument
    pub fn kwarg<T: Serialize + Any + Send + Sync>(mut self, name: &str, value: T) -> Self {
        self.keyword.push((name.to_string(), Arg::new(value)));
        self
    }

    /// Append an opaque keyword argument
    pub fn kwarg_opaque<T: Any + Send + Sync>(mut self, name: &str, value: T) -> Self {
        self.keyword.push((name.to_string(), Arg::opaque(value)));
        self
    }
}

#[derive(Debug, Clone)]
struct Param {
    name: String,
    default: Option<Arg>,
}

/// Declared shape of a stage's parameters
///
/// The signature name is the stage's identity: it becomes the checkpoint
/// name unless one is given explicitly, so it must stay stable across runs.
#[derive(Debug, Clone)]
pub struct Signature {
    name: String,
    params: Vec<Param>,
    var_positional: bool,
    var_keyword: bool,
}

impl Signature {
    /// Start a signature for the stage called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            var_positional: false,
            var_keyword: false,
        }
    }

    /// Add a required named parameter
    pub fn param(mut self, name: &str) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            default: None,
        });
        self
    }

    /// Add a named parameter with a default value
    pub fn param_default<T>(mut self, name: &str, default: T) -> Self
    where
        T: Serialize + Any + Send + Sync,
    {
        self.params.push(Param {
            name: name.to_string(),
            default: Some(Arg::new(default)),
        });
        self
    }

    /// Accept surplus positional arguments
    pub fn var_positional(mut self) -> Self {
        self.var_positional = true;
        self
    }

    /// Accept surplus keyword arguments
    pub fn var_keyword(mut self) -> Self {
        self.var_keyword = true;
        self
    }

    /// Declared stage name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bind call arguments to this signature, filling defaults
    pub fn bind(&self, call: CallArgs) -> CacheResult<BoundArgs> {
        let fail = |reason: String| CacheError::Binding {
            checkpoint: self.name.clone(),
            reason,
        };

        let mut slots: Vec<Option<Arg>> = vec![None; self.params.len()];
        let mut varargs = Vec::new();
        let given = call.positional.len();

        for (i, arg) in call.positional.into_iter().enumerate() {
            if i < slots.len() {
                slots[i] = Some(arg);
            } else if self.var_positional {
                varargs.push(arg);
            } else {
                return Err(fail(format!(
                    "takes {} positional argument(s) but {} were given",
                    self.params.len(),
                    given
                )));
            }
        }

        let mut kwargs = BTreeMap::new();
        for (name, arg) in call.keyword {
            if let Some(i) = self.params.iter().position(|p| p.name == name) {
                if slots[i].is_some() {
                    return Err(fail(format!("got multiple values for argument '{name}'")));
                }
                slots[i] = Some(arg);
            } else if self.var_keyword {
                if kwargs.contains_key(&name) {
                    return Err(fail(format!("got multiple values for keyword '{name}'")));
                }
                kwargs.insert(name, arg);
            } else {
                return Err(fail(format!("got an unexpected keyword argument '{name}'")));
            }
        }

        let mut named = Vec::with_capacity(self.params.len());
        for (param, slot) in self.params.iter().zip(slots) {
            let arg = match slot.or_else(|| param.default.clone()) {
                Some(arg) => arg,
                None => {
                    return Err(fail(format!(
                        "missing required argument '{}'",
                        param.name
                    )))
                }
            };
            named.push((param.name.clone(), arg));
        }

        Ok(BoundArgs {
            named,
            varargs,
            kwargs,
        })
    }
}

/// Arguments after binding to a signature
///
/// Named parameters keep declaration order, variadic values keep call order
/// and variadic keywords are sorted by key.
#[derive(Debug, Clone)]
pub struct BoundArgs {
    named: Vec<(String, Arg)>,
    varargs: Vec<Arg>,
    kwargs: BTreeMap<String, Arg>,
}

impl BoundArgs {
    /// Named parameters in declaration order
    pub fn named(&self) -> impl Iterator<Item = (&str, &Arg)> {
        self.named.iter().map(|(n, a)| (n.as_str(), a))
    }

    /// Variadic positional values in call order
    pub fn varargs_raw(&self) -> &[Arg] {
        &self.varargs
    }

    /// Variadic keyword values sorted by key
    pub fn kwargs(&self) -> impl Iterator<Item = (&str, &Arg)> {
        self.kwargs.iter().map(|(n, a)| (n.as_str(), a))
    }

    /// Look up a named parameter or variadic keyword by name
    pub fn find(&self, name: &str) -> Option<&Arg> {
        self.named
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| a)
            .or_else(|| self.kwargs.get(name))
    }

    /// Typed access to a named parameter or variadic keyword
    pub fn get<T: Any>(&self, name: &str) -> Result<&T, ArgumentError> {
        self.opt(name)?
            .ok_or_else(|| ArgumentError::Missing(name.to_string()))
    }

    /// Typed access that tolerates an absent argument
    pub fn opt<T: Any>(&self, name: &str) -> Result<Option<&T>, ArgumentError> {
        match self.find(name) {
            None => Ok(None),
            Some(arg) => arg
                .downcast_ref::<T>()
                .map(Some)
                .ok_or_else(|| ArgumentError::WrongType {
                    name: name.to_string(),
                    expected: type_name::<T>(),
                    found: arg.type_name(),
                }),
        }
    }

    /// Typed access to every variadic positional value
    pub fn varargs<T: Any>(&self) -> Result<Vec<&T>, ArgumentError> {
        self.varargs
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                arg.downcast_ref::<T>().ok_or_else(|| ArgumentError::WrongType {
                    name: format!("*args[{i}]"),
                    expected: type_name::<T>(),
                    found: arg.type_name(),
                })
            })
            .collect()
    }
}
