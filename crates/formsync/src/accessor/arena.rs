//! Accessor storage
//!
//! Every accessor lives in one arena keyed by [`AccessorId`]. Ids are never
//! reused, so a handle to a destroyed accessor fails instead of aliasing a
//! newer one. A node knows its parent and the step leading to it; paths are
//! computed by walking up, which makes renumbering a matter of rewriting one
//! step per shifted row.

use super::{AccessorId, AccessorKind};
use crate::definition::{Entry, FieldSpec, Form};
use crate::error::FormError;
use crate::path::{is_int, TreePath};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Edge from a parent to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    Root,
    Key(String),
    Index(usize),
}

#[derive(Debug)]
pub(crate) struct FieldNode {
    pub(crate) spec: Arc<dyn FieldSpec>,
    pub(crate) raw: Value,
    pub(crate) error: Option<String>,
    /// Received a `set_raw` since creation
    pub(crate) touched: bool,
    pub(crate) last_derived: Option<Value>,
}

#[derive(Debug)]
pub(crate) struct FormNode {
    pub(crate) definition: Arc<Form>,
    pub(crate) children: IndexMap<String, AccessorId>,
    /// Row created by an insertion rather than by loading the record
    pub(crate) just_added: bool,
}

#[derive(Debug)]
pub(crate) struct RepeatingNode {
    pub(crate) definition: Arc<Form>,
    pub(crate) rows: BTreeMap<usize, AccessorId>,
    pub(crate) error: Option<String>,
}

#[derive(Debug)]
pub(crate) enum NodeKind {
    Field(FieldNode),
    Form(FormNode),
    Repeating(RepeatingNode),
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) parent: Option<AccessorId>,
    pub(crate) step: Step,
    pub(crate) kind: NodeKind,
}

impl Node {
    pub(crate) fn kind(&self) -> AccessorKind {
        match self.kind {
            NodeKind::Field(_) => AccessorKind::Field,
            NodeKind::Form(_) => AccessorKind::Form,
            NodeKind::Repeating(_) => AccessorKind::RepeatingForm,
        }
    }
}

/// Raw for a field given its tree value
///
/// Missing keys and `null` for converters that cannot hold `null` render as
/// the empty raw.
pub(crate) fn render_raw(spec: &dyn FieldSpec, value: Option<&Value>) -> Result<Value, FormError> {
    match value {
        None => spec.empty_raw(),
        Some(value) => spec.render(value).or_else(|err| {
            if value.is_null() {
                spec.empty_raw()
            } else {
                Err(err)
            }
        }),
    }
}

#[derive(Debug, Default)]
pub(crate) struct Arena {
    nodes: HashMap<AccessorId, Node>,
    next_id: u64,
}

impl Arena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, parent: Option<AccessorId>, step: Step, kind: NodeKind) -> AccessorId {
        self.next_id += 1;
        let id = AccessorId(self.next_id);
        self.nodes.insert(id, Node { parent, step, kind });
        id
    }

    pub(crate) fn get(&self, id: AccessorId) -> Result<&Node, FormError> {
        self.nodes.get(&id).ok_or(FormError::StaleAccessor(id))
    }

    pub(crate) fn get_mut(&mut self, id: AccessorId) -> Result<&mut Node, FormError> {
        self.nodes.get_mut(&id).ok_or(FormError::StaleAccessor(id))
    }

    fn wrong_kind(&self, id: AccessorId, expected: &'static str) -> FormError {
        FormError::WrongKind {
            path: self.path(id).map(|p| p.to_string()).unwrap_or_default(),
            expected,
        }
    }

    pub(crate) fn field(&self, id: AccessorId) -> Result<&FieldNode, FormError> {
        match &self.get(id)?.kind {
            NodeKind::Field(field) => Ok(field),
            _ => Err(self.wrong_kind(id, "field")),
        }
    }

    pub(crate) fn field_mut(&mut self, id: AccessorId) -> Result<&mut FieldNode, FormError> {
        if !matches!(self.get(id)?.kind, NodeKind::Field(_)) {
            return Err(self.wrong_kind(id, "field"));
        }
        match &mut self.get_mut(id)?.kind {
            NodeKind::Field(field) => Ok(field),
            _ => Err(FormError::StaleAccessor(id)),
        }
    }

    pub(crate) fn form(&self, id: AccessorId) -> Result<&FormNode, FormError> {
        match &self.get(id)?.kind {
            NodeKind::Form(form) => Ok(form),
            _ => Err(self.wrong_kind(id, "form")),
        }
    }

    pub(crate) fn repeating(&self, id: AccessorId) -> Result<&RepeatingNode, FormError> {
        match &self.get(id)?.kind {
            NodeKind::Repeating(repeating) => Ok(repeating),
            _ => Err(self.wrong_kind(id, "repeating form")),
        }
    }

    pub(crate) fn repeating_mut(&mut self, id: AccessorId) -> Result<&mut RepeatingNode, FormError> {
        if !matches!(self.get(id)?.kind, NodeKind::Repeating(_)) {
            return Err(self.wrong_kind(id, "repeating form"));
        }
        match &mut self.get_mut(id)?.kind {
            NodeKind::Repeating(repeating) => Ok(repeating),
            _ => Err(FormError::StaleAccessor(id)),
        }
    }

    /// Tree address of a node
    pub(crate) fn path(&self, id: AccessorId) -> Result<TreePath, FormError> {
        let mut steps = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            let node = self.get(id)?;
            match &node.step {
                Step::Root => {}
                Step::Key(key) => steps.push(key.clone()),
                Step::Index(index) => steps.push(index.to_string()),
            }
            current = node.parent;
        }
        steps.reverse();
        Ok(TreePath::new(steps))
    }

    /// Build a form node and everything below it from a record
    pub(crate) fn build_form(
        &mut self,
        parent: Option<AccessorId>,
        step: Step,
        definition: &Arc<Form>,
        record: Option<&Value>,
        just_added: bool,
    ) -> Result<AccessorId, FormError> {
        let id = self.alloc(
            parent,
            step,
            NodeKind::Form(FormNode {
                definition: Arc::clone(definition),
                children: IndexMap::new(),
                just_added,
            }),
        );
        for (key, entry) in definition.entries() {
            let value = record.and_then(|r| r.get(key));
            let child = self.build_entry(id, key, entry, record, value, just_added)?;
            if let NodeKind::Form(form) = &mut self.get_mut(id)?.kind {
                form.children.insert(key.to_string(), child);
            }
        }
        Ok(id)
    }

    fn build_entry(
        &mut self,
        parent: AccessorId,
        key: &str,
        entry: &Entry,
        record: Option<&Value>,
        value: Option<&Value>,
        just_added: bool,
    ) -> Result<AccessorId, FormError> {
        let step = Step::Key(key.to_string());
        match entry {
            Entry::Field(spec) => {
                let raw = render_raw(spec.as_ref(), value)?;
                // derived fields start from what the record implies now and
                // only write when that changes
                let last_derived = spec
                    .derive(record.unwrap_or(&Value::Null))
                    .and_then(Result::ok);
                Ok(self.alloc(
                    Some(parent),
                    step,
                    NodeKind::Field(FieldNode {
                        spec: Arc::clone(spec),
                        raw,
                        error: None,
                        touched: false,
                        last_derived,
                    }),
                ))
            }
            Entry::SubForm(sub_form) => {
                self.build_form(Some(parent), step, sub_form.definition(), value, just_added)
            }
            Entry::RepeatingForm(repeating) => {
                let id = self.alloc(
                    Some(parent),
                    step,
                    NodeKind::Repeating(RepeatingNode {
                        definition: Arc::clone(repeating.definition()),
                        rows: BTreeMap::new(),
                        error: None,
                    }),
                );
                if let Some(items) = value.and_then(Value::as_array) {
                    for (index, item) in items.iter().enumerate() {
                        self.build_row(id, index, Some(item), false)?;
                    }
                }
                Ok(id)
            }
        }
    }

    /// Create the row accessor for `index` of a list
    pub(crate) fn build_row(
        &mut self,
        list: AccessorId,
        index: usize,
        value: Option<&Value>,
        just_added: bool,
    ) -> Result<AccessorId, FormError> {
        let definition = Arc::clone(&self.repeating(list)?.definition);
        let row = self.build_form(Some(list), Step::Index(index), &definition, value, just_added)?;
        self.repeating_mut(list)?.rows.insert(index, row);
        Ok(row)
    }

    /// Drop a node and all its descendants
    pub(crate) fn remove_subtree(&mut self, id: AccessorId) {
        for child in self.children(id) {
            self.remove_subtree(child);
        }
        self.nodes.remove(&id);
    }

    /// Direct children in order (declaration order or index order)
    pub(crate) fn children(&self, id: AccessorId) -> Vec<AccessorId> {
        match self.nodes.get(&id).map(|n| &n.kind) {
            Some(NodeKind::Form(form)) => form.children.values().copied().collect(),
            Some(NodeKind::Repeating(repeating)) => repeating.rows.values().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// All descendants, depth-first pre-order, excluding `id` itself
    pub(crate) fn descendants(&self, id: AccessorId) -> Vec<AccessorId> {
        let mut result = Vec::new();
        for child in self.children(id) {
            result.push(child);
            result.extend(self.descendants(child));
        }
        result
    }

    /// Descend one step
    pub(crate) fn step_into(&self, id: AccessorId, step: &str) -> Result<AccessorId, FormError> {
        match &self.get(id)?.kind {
            NodeKind::Form(form) => form
                .children
                .get(step)
                .copied()
                .ok_or_else(|| FormError::UnknownPath(self.child_display(id, step))),
            NodeKind::Repeating(repeating) => {
                if !is_int(step) {
                    return Err(FormError::ExpectedIndex {
                        path: self.path(id)?.to_string(),
                        step: step.to_string(),
                    });
                }
                let index: usize = step
                    .parse()
                    .map_err(|_| FormError::UnknownPath(self.child_display(id, step)))?;
                repeating
                    .rows
                    .get(&index)
                    .copied()
                    .ok_or_else(|| FormError::MissingIndex {
                        path: self.path(id).map(|p| p.to_string()).unwrap_or_default(),
                        index,
                    })
            }
            NodeKind::Field(_) => Err(FormError::UnknownPath(self.child_display(id, step))),
        }
    }

    fn child_display(&self, id: AccessorId, step: &str) -> String {
        self.path(id)
            .map(|p| p.child(step).to_string())
            .unwrap_or_else(|_| step.to_string())
    }

    /// Resolve steps relative to `from`
    pub(crate) fn locate<S: AsRef<str>>(
        &self,
        from: AccessorId,
        steps: &[S],
    ) -> Result<AccessorId, FormError> {
        steps
            .iter()
            .try_fold(from, |id, step| self.step_into(id, step.as_ref()))
    }

    /// Deepest accessor along `path` and how many steps it consumed
    pub(crate) fn locate_nearest(&self, from: AccessorId, path: &TreePath) -> (AccessorId, usize) {
        let mut current = from;
        for (depth, step) in path.iter().enumerate() {
            match self.step_into(current, step) {
                Ok(next) => current = next,
                Err(_) => return (current, depth),
            }
        }
        (current, path.len())
    }

    /// Make room at `index` and build a fresh row there
    pub(crate) fn insert_row(
        &mut self,
        list: AccessorId,
        index: usize,
        value: Option<&Value>,
    ) -> Result<AccessorId, FormError> {
        let moves: Vec<(usize, usize)> = self
            .repeating(list)?
            .rows
            .range(index..)
            .map(|(i, _)| (*i, *i + 1))
            .collect();
        self.renumber(list, &moves)?;
        self.build_row(list, index, value, true)
    }

    /// Destroy the row at `index` and close the gap
    ///
    /// Returns `false` if there was no row at `index`.
    pub(crate) fn remove_row(&mut self, list: AccessorId, index: usize) -> Result<bool, FormError> {
        let Some(row) = self.repeating_mut(list)?.rows.remove(&index) else {
            return Ok(false);
        };
        self.remove_subtree(row);
        let moves: Vec<(usize, usize)> = self
            .repeating(list)?
            .rows
            .range(index + 1..)
            .map(|(i, _)| (*i, *i - 1))
            .collect();
        self.renumber(list, &moves)?;
        Ok(true)
    }

    /// Relabel rows without rebuilding them
    ///
    /// All moved keys are taken out first and reinserted afterwards, so
    /// overlapping source and target ranges never clobber each other.
    fn renumber(&mut self, list: AccessorId, moves: &[(usize, usize)]) -> Result<(), FormError> {
        let repeating = self.repeating_mut(list)?;
        let taken: Vec<(usize, AccessorId)> = moves
            .iter()
            .filter_map(|(from, to)| repeating.rows.remove(from).map(|row| (*to, row)))
            .collect();
        for (to, row) in &taken {
            repeating.rows.insert(*to, *row);
        }
        for (to, row) in taken {
            self.get_mut(row)?.step = Step::Index(to);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Field, RepeatingForm, SubForm};
    use formsync_convert::converters;
    use serde_json::json;

    fn definition() -> Arc<Form> {
        Arc::new(
            Form::new()
                .field("name", Field::new(converters::string()))
                .sub_form(
                    "address",
                    SubForm::new(Form::new().field("city", Field::new(converters::string()))),
                )
                .repeating_form(
                    "items",
                    RepeatingForm::new(Form::new().field("n", Field::new(converters::integer()))),
                ),
        )
    }

    fn build(record: Value) -> (Arena, AccessorId) {
        let mut arena = Arena::new();
        let root = arena
            .build_form(None, Step::Root, &definition(), Some(&record), false)
            .unwrap();
        (arena, root)
    }

    fn raw_at(arena: &Arena, root: AccessorId, path: &str) -> Value {
        let steps = crate::path::path_to_steps(path);
        let id = arena.locate(root, &steps).unwrap();
        arena.field(id).unwrap().raw.clone()
    }

    #[test]
    fn builds_mirroring_record() {
        let (arena, root) = build(json!({
            "name": "x",
            "address": {"city": "Oslo"},
            "items": [{"n": 1}, {"n": 2}]
        }));
        assert_eq!(raw_at(&arena, root, "/name"), json!("x"));
        assert_eq!(raw_at(&arena, root, "/address/city"), json!("Oslo"));
        assert_eq!(raw_at(&arena, root, "/items/1/n"), json!("2"));
        let list = arena.locate(root, &["items"]).unwrap();
        assert_eq!(arena.repeating(list).unwrap().rows.len(), 2);
    }

    #[test]
    fn missing_keys_render_empty() {
        let (arena, root) = build(json!({}));
        assert_eq!(raw_at(&arena, root, "/name"), json!(""));
        assert_eq!(raw_at(&arena, root, "/address/city"), json!(""));
    }

    #[test]
    fn locate_errors() {
        let (arena, root) = build(json!({"items": [{"n": 1}]}));
        assert!(matches!(
            arena.locate(root, &["items", "x"]),
            Err(FormError::ExpectedIndex { .. })
        ));
        assert!(matches!(
            arena.locate(root, &["items", "4"]),
            Err(FormError::MissingIndex { index: 4, .. })
        ));
        assert!(matches!(
            arena.locate(root, &["nope"]),
            Err(FormError::UnknownPath(_))
        ));
    }

    #[test]
    fn nearest_stops_at_field() {
        let (arena, root) = build(json!({"name": "x"}));
        let (id, depth) = arena.locate_nearest(root, &"/name/deeper".parse().unwrap());
        assert_eq!(depth, 1);
        assert!(arena.field(id).is_ok());
    }

    #[test]
    fn remove_row_renumbers_in_place() {
        let (mut arena, root) = build(json!({"items": [{"n": 1}, {"n": 2}, {"n": 3}]}));
        let list = arena.locate(root, &["items"]).unwrap();
        let last = arena.locate(root, &["items", "2"]).unwrap();

        assert!(arena.remove_row(list, 0).unwrap());
        assert_eq!(arena.locate(root, &["items", "1"]).unwrap(), last);
        assert_eq!(arena.path(last).unwrap().to_string(), "/items/1");
        assert!(!arena.remove_row(list, 7).unwrap());
    }

    #[test]
    fn insert_row_shifts_up() {
        let (mut arena, root) = build(json!({"items": [{"n": 1}, {"n": 2}]}));
        let list = arena.locate(root, &["items"]).unwrap();
        let first = arena.locate(root, &["items", "0"]).unwrap();

        let new = arena.insert_row(list, 0, Some(&json!({"n": 9}))).unwrap();
        assert_eq!(arena.locate(root, &["items", "0"]).unwrap(), new);
        assert_eq!(arena.locate(root, &["items", "1"]).unwrap(), first);
        assert!(arena.form(new).unwrap().just_added);
        assert_eq!(raw_at(&arena, root, "/items/0/n"), json!("9"));
    }

    #[test]
    fn removed_ids_become_stale() {
        let (mut arena, root) = build(json!({"items": [{"n": 1}]}));
        let list = arena.locate(root, &["items"]).unwrap();
        let field = arena.locate(root, &["items", "0", "n"]).unwrap();
        arena.remove_row(list, 0).unwrap();
        assert!(matches!(arena.get(field), Err(FormError::StaleAccessor(_))));
    }

    #[test]
    fn descendants_pre_order() {
        let (arena, root) = build(json!({"items": [{"n": 1}]}));
        let paths: Vec<String> = arena
            .descendants(root)
            .into_iter()
            .map(|id| arena.path(id).unwrap().to_string())
            .collect();
        assert_eq!(
            paths,
            vec!["/name", "/address", "/address/city", "/items", "/items/0", "/items/0/n"]
        );
    }
}
