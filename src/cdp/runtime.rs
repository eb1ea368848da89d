//! `Runtime.*` — execution contexts, script evaluation, console API
//! (spec.md §4.5).

use serde::{Deserialize, Serialize};

use super::command;
use crate::protocol::EmptyResponse;

pub type ExecutionContextId = i64;
pub type RemoteObjectId = String;

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnableParams {}
command!(EnableParams, "Runtime.enable", EmptyResponse);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateParams {
    pub expression: String,
    pub context_id: ExecutionContextId,
    pub object_group: String,
    pub include_command_line_api: bool,
    pub silent: bool,
    pub return_by_value: bool,
    pub generate_preview: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteObject {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "objectId", default)]
    pub object_id: Option<RemoteObjectId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvaluateResponse {
    pub result: RemoteObject,
    #[serde(rename = "exceptionDetails", default)]
    pub exception_details: Option<serde_json::Value>,
}
command!(EvaluateParams, "Runtime.evaluate", EvaluateResponse);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPropertiesParams {
    pub object_id: RemoteObjectId,
    pub own_properties: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(default)]
    pub value: Option<RemoteObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetPropertiesResponse {
    pub result: Vec<PropertyDescriptor>,
}
command!(GetPropertiesParams, "Runtime.getProperties", GetPropertiesResponse);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContextDescription {
    pub id: ExecutionContextId,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub aux_data: Option<serde_json::Value>,
}

impl ExecutionContextDescription {
    /// `frameId` lives either directly on the context (newer protocol
    /// versions) or inside `auxData.frameId` (spec.md §4.5).
    pub fn frame_id(&self) -> Option<String> {
        self.aux_data
            .as_ref()
            .and_then(|v| v.get("frameId"))
            .and_then(|v| v.as_str())
            .map(str::to_owned)
    }

    pub fn is_extension(&self) -> bool {
        self.aux_data
            .as_ref()
            .and_then(|v| v.get("type"))
            .and_then(|v| v.as_str())
            == Some("Extension")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventExecutionContextCreated {
    pub context: ExecutionContextDescription,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventExecutionContextDestroyed {
    pub execution_context_id: ExecutionContextId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallFrame {
    #[serde(rename = "functionName")]
    pub function_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTrace {
    #[serde(default, rename = "callFrames")]
    pub call_frames: Vec<CallFrame>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventConsoleApiCalled {
    #[serde(rename = "type")]
    pub ty: String,
    pub args: Vec<RemoteObject>,
    pub execution_context_id: ExecutionContextId,
    pub timestamp: f64,
    #[serde(default, rename = "stackTrace")]
    pub stack_trace: Option<StackTrace>,
}

impl EventConsoleApiCalled {
    /// The top frame's function name, if the peer included a stack trace.
    pub fn function_name(&self) -> Option<&str> {
        self.stack_trace
            .as_ref()
            .and_then(|st| st.call_frames.first())
            .map(|f| f.function_name.as_str())
    }
}
