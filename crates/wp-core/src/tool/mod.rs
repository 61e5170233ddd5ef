//! Capability registry
//!
//! Every action the planner can take is registered here at startup, either
//! as a local browser action or as a remote tool. Requests are validated
//! against the registered parameter specs before anything is dispatched.

mod definition;
mod page;
mod registry;
mod traits;
mod validate;

pub use definition::{
    ActionSpec, ParamKind, ParamSpec, Predicate, SideEffect, TargetKind, ToolDescriptor, object_schema,
    params_from_schema,
};
pub use page::PageContext;
pub use registry::{CapabilityRegistry, DEFAULT_ACTION_TIMEOUT, RegistryError};
pub use traits::{
    ActionError, ActionErrorKind, ActionPage, ActionRequest, ActionResult, BrowserAction, JsonMap, RemoteTool,
    ToolError, ToolInput, param_bool, param_i64, param_str, param_u64,
};
pub use validate::{ValidationError, validate_params};
