//! `DomHandler` — DOM mirror, mutation listener fan-out, lazy cached XPath,
//! file-input upload (spec.md §4.6).
//!
//! Grounded on the teacher's `src/handler/domworld.rs` (isolated-world and
//! node bookkeeping off `DOM.*` events); this crate keeps only the plain
//! tree mirror, since XPath resolution and upload are spec'd as operations
//! against that mirror rather than against a live isolated world. The XPath
//! search is deliberately the "sufficient for our own mirror" matcher spec.md
//! §4.6 calls for, not a general XPath engine — it only ever tests
//! candidates produced by its own climbing algorithm against its own node
//! set, so there is no external collaborator to inject here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::cdp::dom::{
    EnableParams, EventAttributeModified, EventChildNodeInserted, EventChildNodeRemoved,
    EventSetChildNodes, EventSetNodeValue, GetDocumentParams, NodeData, NodeId,
    QuerySelectorParams, RequestChildNodesParams, SetAttributeValueParams, SetFileInputFilesParams,
    SetNodeValueParams, COMMENT_NODE, ELEMENT_NODE, TEXT_NODE,
};
use crate::debugger::Debugger;
use crate::error::{CdpError, Result};
use crate::handler::{impl_as_any, parse_params, Handler};

/// Node names whose attribute changes never invalidate a cached XPath
/// (spec.md §4.6) — these are treated as structurally stable landmarks.
const XPATH_STABLE_NODES: &[&str] = &["BODY", "SCRIPT", "STYLE", "LINK"];

#[derive(Debug, Clone)]
struct NodeRecord {
    node_type: i64,
    node_name: String,
    node_value: Option<String>,
    attributes: HashMap<String, String>,
    parent_id: Option<NodeId>,
    children: Vec<NodeId>,
}

fn flatten_attributes(pairs: &[String]) -> HashMap<String, String> {
    pairs
        .chunks(2)
        .filter_map(|pair| match pair {
            [name, value] => Some((name.clone(), value.clone())),
            _ => None,
        })
        .collect()
}

type AttrModifiedCb = Box<dyn Fn(NodeId, &str, &str) + Send + Sync>;
type TextModifiedCb = Box<dyn Fn(NodeId, &str) + Send + Sync>;
type NodeInsertedCb = Box<dyn Fn(NodeId, Option<NodeId>) + Send + Sync>;
type NodeRemovedCb = Box<dyn Fn(NodeId) + Send + Sync>;
type DocumentUpdatedCb = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Listeners {
    document_updated: Vec<DocumentUpdatedCb>,
    attr_modified: Vec<AttrModifiedCb>,
    text_modified: Vec<TextModifiedCb>,
    node_inserted: Vec<NodeInsertedCb>,
    node_removed: Vec<NodeRemovedCb>,
}

#[derive(Default)]
struct Inner {
    root: Option<NodeId>,
    nodes: HashMap<NodeId, NodeRecord>,
    xpath_cache: HashMap<NodeId, String>,
}

impl Inner {
    fn materialize(&mut self, node: &NodeData, parent_id: Option<NodeId>) -> bool {
        if !matches!(node.node_type, ELEMENT_NODE | TEXT_NODE | COMMENT_NODE) {
            return false;
        }
        self.nodes.insert(
            node.node_id,
            NodeRecord {
                node_type: node.node_type,
                node_name: node.node_name.clone(),
                node_value: node.node_value.clone(),
                attributes: flatten_attributes(&node.attributes),
                parent_id,
                children: Vec::new(),
            },
        );
        if let Some(parent_id) = parent_id {
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                if !parent.children.contains(&node.node_id) {
                    parent.children.push(node.node_id);
                }
            }
        }
        for child in &node.children {
            self.materialize(child, Some(node.node_id));
        }
        true
    }

    fn evict_subtree(&mut self, node_id: NodeId) {
        let children = self.nodes.get(&node_id).map(|n| n.children.clone()).unwrap_or_default();
        for child in children {
            self.evict_subtree(child);
        }
        self.nodes.remove(&node_id);
        self.xpath_cache.remove(&node_id);
    }

    fn invalidate_cache(&mut self, node_id: NodeId) {
        let stable = self
            .nodes
            .get(&node_id)
            .map(|n| XPATH_STABLE_NODES.contains(&n.node_name.to_ascii_uppercase().as_str()))
            .unwrap_or(false);
        if !stable {
            self.xpath_cache.remove(&node_id);
        }
    }

    fn step(&self, node_id: NodeId) -> Option<String> {
        let node = self.nodes.get(&node_id)?;
        let mut attrs: Vec<(&String, &String)> =
            node.attributes.iter().filter(|(name, _)| name.as_str() != "style").collect();
        attrs.sort_by(|a, b| a.0.cmp(b.0));
        if attrs.is_empty() {
            Some(format!("/{}", node.node_name))
        } else {
            let cond = attrs
                .iter()
                .map(|(name, value)| format!("{name}=\"{value}\""))
                .collect::<Vec<_>>()
                .join(" and ");
            Some(format!("/{}[{}]", node.node_name, cond))
        }
    }

    /// The chain `[node_id, parent, grandparent, …]`, stopping once `body`
    /// has been included or there are no more ancestors.
    fn chain(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut chain = vec![node_id];
        let mut current = node_id;
        loop {
            let record = match self.nodes.get(&current) {
                Some(r) => r,
                None => break,
            };
            if record.node_name.eq_ignore_ascii_case("body") {
                break;
            }
            match record.parent_id {
                Some(parent_id) => {
                    chain.push(parent_id);
                    current = parent_id;
                }
                None => break,
            }
        }
        chain
    }

    fn candidate_at_depth(&self, chain: &[NodeId], depth: usize) -> Option<String> {
        if chain.len() < depth {
            return None;
        }
        let mut path = String::new();
        for &id in chain[..depth].iter().rev() {
            path.push_str(&self.step(id)?);
        }
        Some(path)
    }

    fn count_matches(&self, candidate: &str, depth: usize) -> usize {
        self.nodes
            .keys()
            .filter(|&&id| {
                let chain = self.chain(id);
                self.candidate_at_depth(&chain, depth).as_deref() == Some(candidate)
            })
            .count()
    }

    /// Climbs from `node_id` toward `body`, returning the shallowest
    /// candidate that resolves uniquely (spec.md §4.6).
    fn resolve_xpath(&self, node_id: NodeId) -> Result<String> {
        let chain = self.chain(node_id);
        for depth in 1..=chain.len() {
            let candidate = match self.candidate_at_depth(&chain, depth) {
                Some(c) => c,
                None => continue,
            };
            match self.count_matches(&candidate, depth) {
                1 => return Ok(candidate),
                0 => return Err(CdpError::NodeNotFound(format!("xpath for node {node_id} matched nothing")).into()),
                _ => continue,
            }
        }
        Err(CdpError::NodeNotFound(format!("xpath for node {node_id} could not be disambiguated")))
    }
}

/// Mirrors the document tree, fans out mutation events to registered
/// listeners, and resolves cached XPaths (spec.md §4.6).
#[derive(Default)]
pub struct DomHandler {
    inner: Mutex<Inner>,
    listeners: Mutex<Listeners>,
}

impl DomHandler {
    pub fn on_document_updated(&self, cb: impl Fn() + Send + Sync + 'static) {
        self.listeners.lock().unwrap().document_updated.push(Box::new(cb));
    }

    pub fn on_node_attr_modified(&self, cb: impl Fn(NodeId, &str, &str) + Send + Sync + 'static) {
        self.listeners.lock().unwrap().attr_modified.push(Box::new(cb));
    }

    pub fn on_node_text_modified(&self, cb: impl Fn(NodeId, &str) + Send + Sync + 'static) {
        self.listeners.lock().unwrap().text_modified.push(Box::new(cb));
    }

    pub fn on_node_inserted(&self, cb: impl Fn(NodeId, Option<NodeId>) + Send + Sync + 'static) {
        self.listeners.lock().unwrap().node_inserted.push(Box::new(cb));
    }

    pub fn on_node_removed(&self, cb: impl Fn(NodeId) + Send + Sync + 'static) {
        self.listeners.lock().unwrap().node_removed.push(Box::new(cb));
    }

    fn fetch_document(&self, debugger: &Arc<Debugger>) -> Result<NodeId> {
        let resp = debugger.send_request(None, GetDocumentParams {})?;
        let mut inner = self.inner.lock().unwrap();
        inner.nodes.clear();
        inner.xpath_cache.clear();
        inner.materialize(&resp.root, None);
        inner.root = Some(resp.root.node_id);
        Ok(resp.root.node_id)
    }

    fn handle_set_child_nodes(&self, event: EventSetChildNodes) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.nodes.contains_key(&event.parent_id) {
            return Err(CdpError::MessageNotHandled);
        }
        let mut inserted = Vec::new();
        for node in &event.nodes {
            if inner.materialize(node, Some(event.parent_id)) {
                inserted.push(node.node_id);
            }
        }
        drop(inner);
        let listeners = self.listeners.lock().unwrap();
        for id in inserted {
            for cb in &listeners.node_inserted {
                cb(id, Some(event.parent_id));
            }
        }
        Ok(())
    }

    fn handle_child_node_inserted(&self, event: EventChildNodeInserted) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.nodes.contains_key(&event.parent_node_id) {
            return Err(CdpError::MessageNotHandled);
        }
        let node_id = event.node.node_id;
        let materialized = inner.materialize(&event.node, Some(event.parent_node_id));
        drop(inner);
        if materialized {
            for cb in &self.listeners.lock().unwrap().node_inserted {
                cb(node_id, Some(event.parent_node_id));
            }
        }
        Ok(())
    }

    fn handle_child_node_removed(&self, event: EventChildNodeRemoved) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(parent) = inner.nodes.get_mut(&event.parent_node_id) {
            parent.children.retain(|c| *c != event.node_id);
        }
        inner.evict_subtree(event.node_id);
        drop(inner);
        for cb in &self.listeners.lock().unwrap().node_removed {
            cb(event.node_id);
        }
        Ok(())
    }

    fn handle_attribute_modified(&self, event: EventAttributeModified) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(node) = inner.nodes.get_mut(&event.node_id) {
            node.attributes.insert(event.name.clone(), event.value.clone());
        }
        inner.invalidate_cache(event.node_id);
        drop(inner);
        for cb in &self.listeners.lock().unwrap().attr_modified {
            cb(event.node_id, &event.name, &event.value);
        }
        Ok(())
    }

    fn handle_set_node_value(&self, event: EventSetNodeValue) -> Result<()> {
        if let Some(node) = self.inner.lock().unwrap().nodes.get_mut(&event.node_id) {
            node.node_value = Some(event.value.clone());
        }
        for cb in &self.listeners.lock().unwrap().text_modified {
            cb(event.node_id, &event.value);
        }
        Ok(())
    }

    /// Resolves and caches `node_id`'s XPath, climbing toward `body` until a
    /// candidate matches exactly one node in the mirror (spec.md §4.6).
    pub fn xpath_for(&self, node_id: NodeId) -> Result<String> {
        if let Some(cached) = self.inner.lock().unwrap().xpath_cache.get(&node_id).cloned() {
            return Ok(cached);
        }
        let resolved = self.inner.lock().unwrap().resolve_xpath(node_id)?;
        self.inner.lock().unwrap().xpath_cache.insert(node_id, resolved.clone());
        Ok(resolved)
    }

    /// `querySelector` under the document root, then `setFileInputFiles`
    /// (spec.md §4.6).
    pub fn upload_files(
        &self,
        debugger: &Arc<Debugger>,
        session_id: Option<&str>,
        paths: Vec<String>,
        selector: Option<&str>,
    ) -> Result<()> {
        let selector = selector.unwrap_or("input[type=\"file\"]");
        let root = match self.inner.lock().unwrap().root {
            Some(root) => root,
            None => self.fetch_document(debugger)?,
        };
        let found = debugger.send_request(
            session_id,
            QuerySelectorParams { node_id: root, selector: selector.to_string() },
        )?;
        debugger.send_request(
            session_id,
            SetFileInputFilesParams { files: paths, node_id: found.node_id },
        )?;
        Ok(())
    }

    /// `DOM.setAttributeValue`; the mirror is updated in place once the
    /// peer echoes back the corresponding `attributeModified` event rather
    /// than optimistically here (spec.md §3: mutation events update
    /// attributes in place).
    pub fn set_attribute_value(
        &self,
        debugger: &Arc<Debugger>,
        session_id: Option<&str>,
        node_id: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        debugger.send_request(
            session_id,
            SetAttributeValueParams { node_id, name: name.into(), value: value.into() },
        )?;
        Ok(())
    }

    /// `DOM.setNodeValue` — the text-mutation counterpart of
    /// `set_attribute_value`.
    pub fn set_node_value(
        &self,
        debugger: &Arc<Debugger>,
        session_id: Option<&str>,
        node_id: NodeId,
        value: impl Into<String>,
    ) -> Result<()> {
        debugger.send_request(session_id, SetNodeValueParams { node_id, value: value.into() })?;
        Ok(())
    }

    /// `DOM.requestChildNodes` — forces the peer to push `setChildNodes` for
    /// a node whose children weren't included in the initial `getDocument`
    /// (the protocol's lazy-children convention).
    pub fn request_child_nodes(
        &self,
        debugger: &Arc<Debugger>,
        session_id: Option<&str>,
        node_id: NodeId,
        depth: i64,
    ) -> Result<()> {
        debugger.send_request(session_id, RequestChildNodesParams { node_id, depth })?;
        Ok(())
    }
}

impl Handler for DomHandler {
    fn namespace(&self) -> &'static str {
        "DOM"
    }

    fn on_attached(&self, debugger: &Arc<Debugger>) -> Result<()> {
        debugger.send_request(None, EnableParams {})?;
        self.fetch_document(debugger)?;
        for cb in &self.listeners.lock().unwrap().document_updated {
            cb();
        }
        Ok(())
    }

    fn on_recv_notify_msg(
        &self,
        _debugger: &Arc<Debugger>,
        submethod: &str,
        params: Value,
        _session_id: Option<&str>,
    ) -> Result<()> {
        match submethod {
            "setChildNodes" => self.handle_set_child_nodes(parse_params(params)?),
            "childNodeInserted" => self.handle_child_node_inserted(parse_params(params)?),
            "childNodeRemoved" => self.handle_child_node_removed(parse_params(params)?),
            "attributeModified" => self.handle_attribute_modified(parse_params(params)?),
            "setNodeValue" => self.handle_set_node_value(parse_params(params)?),
            "documentUpdated" => {
                for cb in &self.listeners.lock().unwrap().document_updated {
                    cb();
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    impl_as_any!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: NodeId, name: &str, attrs: &[(&str, &str)]) -> NodeData {
        let mut flat = Vec::new();
        for (k, v) in attrs {
            flat.push(k.to_string());
            flat.push(v.to_string());
        }
        NodeData {
            node_id: id,
            node_type: ELEMENT_NODE,
            node_name: name.into(),
            node_value: None,
            attributes: flat,
            children: Vec::new(),
        }
    }

    #[test]
    fn non_element_children_are_skipped() {
        let handler = DomHandler::default();
        let mut inner = handler.inner.lock().unwrap();
        let mut root = leaf(1, "BODY", &[]);
        root.children = vec![leaf(2, "DIV", &[]), {
            let mut comment = leaf(3, "#comment", &[]);
            comment.node_type = 33; // neither element, text, nor comment constant
            comment
        }];
        inner.materialize(&root, None);
        assert!(inner.nodes.contains_key(&2));
        assert!(!inner.nodes.contains_key(&3));
    }

    #[test]
    fn xpath_resolves_unique_attribute_match() {
        let handler = DomHandler::default();
        {
            let mut inner = handler.inner.lock().unwrap();
            let mut body = leaf(1, "BODY", &[]);
            body.children = vec![
                leaf(2, "DIV", &[("id", "a")]),
                leaf(3, "DIV", &[("id", "b")]),
            ];
            inner.materialize(&body, None);
        }
        let xpath = handler.xpath_for(3).unwrap();
        assert_eq!(xpath, "/BODY/DIV[id=\"b\"]");
        // cached: a second call must not re-derive a different answer.
        assert_eq!(handler.xpath_for(3).unwrap(), xpath);
    }

    #[test]
    fn attribute_change_invalidates_cache_except_for_stable_nodes() {
        let handler = DomHandler::default();
        {
            let mut inner = handler.inner.lock().unwrap();
            let body = leaf(1, "BODY", &[]);
            inner.materialize(&body, None);
            inner.xpath_cache.insert(1, "/BODY".into());
        }
        handler
            .handle_attribute_modified(EventAttributeModified { node_id: 1, name: "class".into(), value: "x".into() })
            .unwrap();
        assert!(handler.inner.lock().unwrap().xpath_cache.contains_key(&1));
    }

    #[test]
    fn missing_parent_on_set_child_nodes_retries() {
        let handler = DomHandler::default();
        let err = handler
            .handle_set_child_nodes(EventSetChildNodes { parent_id: 99, nodes: vec![] })
            .unwrap_err();
        assert!(matches!(err, CdpError::MessageNotHandled));
    }
}
