//! `DOM.*` — the mirrored document tree (spec.md §4.6).

use serde::{Deserialize, Serialize};

use super::command;
use crate::protocol::EmptyResponse;

pub type NodeId = i64;

pub const ELEMENT_NODE: i64 = 1;
pub const TEXT_NODE: i64 = 3;
pub const COMMENT_NODE: i64 = 8;
pub const DOCUMENT_NODE: i64 = 9;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    pub node_id: NodeId,
    pub node_type: i64,
    pub node_name: String,
    #[serde(default)]
    pub node_value: Option<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub children: Vec<NodeData>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnableParams {}
command!(EnableParams, "DOM.enable", EmptyResponse);

#[derive(Debug, Clone, Default, Serialize)]
pub struct GetDocumentParams {}
#[derive(Debug, Clone, Deserialize)]
pub struct GetDocumentResponse {
    pub root: NodeData,
}
command!(GetDocumentParams, "DOM.getDocument", GetDocumentResponse);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestChildNodesParams {
    pub node_id: NodeId,
    pub depth: i64,
}
command!(RequestChildNodesParams, "DOM.requestChildNodes", EmptyResponse);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAttributeValueParams {
    pub node_id: NodeId,
    pub name: String,
    pub value: String,
}
command!(SetAttributeValueParams, "DOM.setAttributeValue", EmptyResponse);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetNodeValueParams {
    pub node_id: NodeId,
    pub value: String,
}
command!(SetNodeValueParams, "DOM.setNodeValue", EmptyResponse);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySelectorParams {
    pub node_id: NodeId,
    pub selector: String,
}
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySelectorResponse {
    pub node_id: NodeId,
}
command!(QuerySelectorParams, "DOM.querySelector", QuerySelectorResponse);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetFileInputFilesParams {
    pub files: Vec<String>,
    pub node_id: NodeId,
}
command!(SetFileInputFilesParams, "DOM.setFileInputFiles", EmptyResponse);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAttributeModified {
    pub node_id: NodeId,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSetChildNodes {
    pub parent_id: NodeId,
    pub nodes: Vec<NodeData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventChildNodeInserted {
    pub parent_node_id: NodeId,
    pub node: NodeData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventChildNodeRemoved {
    pub parent_node_id: NodeId,
    pub node_id: NodeId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSetNodeValue {
    pub node_id: NodeId,
    pub value: String,
}
