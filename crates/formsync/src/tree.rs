//! The observable data tree
//!
//! A JSON document addressed by [`TreePath`]. It is mutated only through
//! [`Patch`], which comes in exactly three kinds: add, remove and replace.

use crate::error::FormError;
use crate::path::TreePath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structural operation on the data tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Patch {
    /// Insert into a list (shifting later entries) or add a record key
    Add { path: String, value: Value },
    /// Delete a list entry (shifting later entries) or a record key
    Remove { path: String },
    /// Overwrite the node at path
    Replace { path: String, value: Value },
}

impl Patch {
    /// Add patch
    #[inline]
    pub fn add(path: impl ToString, value: Value) -> Self {
        Self::Add {
            path: path.to_string(),
            value,
        }
    }

    /// Remove patch
    #[inline]
    pub fn remove(path: impl ToString) -> Self {
        Self::Remove {
            path: path.to_string(),
        }
    }

    /// Replace patch
    #[inline]
    pub fn replace(path: impl ToString, value: Value) -> Self {
        Self::Replace {
            path: path.to_string(),
            value,
        }
    }

    /// Target address
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. } | Self::Remove { path } | Self::Replace { path, .. } => path,
        }
    }

    /// Same patch with its path taken relative to `base`
    pub fn rebase(&self, base: &TreePath) -> Result<Self, FormError> {
        let relative: TreePath = self.path().parse()?;
        let path = base.join(&relative).to_string();
        Ok(match self {
            Self::Add { value, .. } => Self::Add {
                path,
                value: value.clone(),
            },
            Self::Remove { .. } => Self::Remove { path },
            Self::Replace { value, .. } => Self::Replace {
                path,
                value: value.clone(),
            },
        })
    }
}

/// The backing record of a form session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTree {
    root: Value,
}

impl DataTree {
    /// Wrap a record
    #[inline]
    #[must_use]
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// Whole record
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Read by address
    #[inline]
    #[must_use]
    pub fn get(&self, path: &TreePath) -> Option<&Value> {
        self.root.pointer(&path.to_string())
    }

    /// Length of the list at path, if it is a list
    #[inline]
    #[must_use]
    pub fn list_len(&self, path: &TreePath) -> Option<usize> {
        self.get(path).and_then(Value::as_array).map(Vec::len)
    }

    /// Consume into the record
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> Value {
        self.root
    }

    /// Apply one patch atomically
    ///
    /// # Errors
    /// Returns [`FormError::InvalidPatch`] if the target (or its parent) does
    /// not exist or has the wrong shape; the tree is left untouched.
    pub fn apply(&mut self, patch: &Patch) -> Result<(), FormError> {
        let path: TreePath = patch.path().parse()?;
        match patch {
            Patch::Replace { value, .. } => self.replace(&path, value.clone()),
            Patch::Add { value, .. } => self.add(&path, value.clone()),
            Patch::Remove { .. } => self.remove(&path).map(|_| ()),
        }
    }

    fn parent_mut(&mut self, path: &TreePath) -> Result<(&mut Value, String), FormError> {
        let (parent, last) = match (path.parent(), path.last()) {
            (Some(parent), Some(last)) => (parent, last.to_string()),
            _ => return Err(FormError::invalid_patch(path.to_string(), "no parent")),
        };
        let node = self
            .root
            .pointer_mut(&parent.to_string())
            .ok_or_else(|| FormError::invalid_patch(path.to_string(), "parent does not exist"))?;
        Ok((node, last))
    }

    fn replace(&mut self, path: &TreePath, value: Value) -> Result<(), FormError> {
        if path.is_root() {
            self.root = value;
            return Ok(());
        }
        let display = path.to_string();
        let (parent, last) = self.parent_mut(path)?;
        match parent {
            Value::Object(map) => {
                map.insert(last, value);
                Ok(())
            }
            Value::Array(items) => {
                let slot = last
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(|| FormError::invalid_patch(display, "index out of range"))?;
                *slot = value;
                Ok(())
            }
            _ => Err(FormError::invalid_patch(display, "parent is not a container")),
        }
    }

    fn add(&mut self, path: &TreePath, value: Value) -> Result<(), FormError> {
        let display = path.to_string();
        let (parent, last) = self.parent_mut(path)?;
        match parent {
            Value::Object(map) => {
                map.insert(last, value);
                Ok(())
            }
            Value::Array(items) => {
                let index = if last == "-" {
                    items.len()
                } else {
                    last.parse::<usize>()
                        .ok()
                        .filter(|i| *i <= items.len())
                        .ok_or_else(|| FormError::invalid_patch(display, "index out of range"))?
                };
                items.insert(index, value);
                Ok(())
            }
            _ => Err(FormError::invalid_patch(display, "parent is not a container")),
        }
    }

    fn remove(&mut self, path: &TreePath) -> Result<Value, FormError> {
        let display = path.to_string();
        let (parent, last) = self.parent_mut(path)?;
        match parent {
            Value::Object(map) => map
                .remove(&last)
                .ok_or_else(|| FormError::invalid_patch(display, "key does not exist")),
            Value::Array(items) => {
                let index = last
                    .parse::<usize>()
                    .ok()
                    .filter(|i| *i < items.len())
                    .ok_or_else(|| FormError::invalid_patch(display, "index out of range"))?;
                Ok(items.remove(index))
            }
            _ => Err(FormError::invalid_patch(display, "parent is not a container")),
        }
    }
}

/// Read a value by slash-separated address
#[must_use]
pub fn get_by_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path: TreePath = path.parse().ok()?;
    value.pointer(&path.to_string())
}

/// Delete a value by slash-separated address, returning it
pub fn delete_by_path(value: &mut Value, path: &str) -> Option<Value> {
    let path: TreePath = path.parse().ok()?;
    let mut tree = DataTree::new(std::mem::take(value));
    let removed = tree.remove(&path).ok();
    *value = tree.into_inner();
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tree() -> DataTree {
        DataTree::new(json!({"a": 1, "items": [{"n": "x"}, {"n": "y"}]}))
    }

    #[test]
    fn get_by_tree_path() {
        let t = tree();
        assert_eq!(t.get(&"/items/1/n".parse().unwrap()), Some(&json!("y")));
        assert_eq!(t.list_len(&"/items".parse().unwrap()), Some(2));
        assert!(t.get(&"/missing".parse().unwrap()).is_none());
    }

    #[test]
    fn replace_value() {
        let mut t = tree();
        t.apply(&Patch::replace("/a", json!(2))).unwrap();
        t.apply(&Patch::replace("/items/0/n", json!("z"))).unwrap();
        assert_eq!(t.root(), &json!({"a": 2, "items": [{"n": "z"}, {"n": "y"}]}));
    }

    #[test]
    fn replace_out_of_range_leaves_tree() {
        let mut t = tree();
        let err = t.apply(&Patch::replace("/items/5", json!({}))).unwrap_err();
        assert!(matches!(err, FormError::InvalidPatch { .. }));
        assert_eq!(t, tree());
    }

    #[test]
    fn add_shifts_list() {
        let mut t = tree();
        t.apply(&Patch::add("/items/0", json!({"n": "w"}))).unwrap();
        t.apply(&Patch::add("/items/-", json!({"n": "end"}))).unwrap();
        assert_eq!(
            t.root()["items"],
            json!([{"n": "w"}, {"n": "x"}, {"n": "y"}, {"n": "end"}])
        );
    }

    #[test]
    fn remove_shifts_list() {
        let mut t = tree();
        t.apply(&Patch::remove("/items/0")).unwrap();
        assert_eq!(t.root()["items"], json!([{"n": "y"}]));
        assert!(t.apply(&Patch::remove("/items/3")).is_err());
    }

    #[test]
    fn patch_serde_shape() {
        let patch: Patch =
            serde_json::from_value(json!({"op": "replace", "path": "/a", "value": 3})).unwrap();
        assert_eq!(patch, Patch::replace("/a", json!(3)));
        assert_eq!(
            serde_json::to_value(Patch::remove("/a")).unwrap(),
            json!({"op": "remove", "path": "/a"})
        );
    }

    #[test]
    fn rebase_onto_node() {
        let base: TreePath = "/items/1".parse().unwrap();
        assert_eq!(
            Patch::replace("n", json!("q")).rebase(&base).unwrap(),
            Patch::replace("/items/1/n", json!("q"))
        );
        assert_eq!(
            Patch::remove("/n").rebase(&TreePath::root()).unwrap(),
            Patch::remove("/n")
        );
    }

    #[test]
    fn path_helpers() {
        let mut value = json!({"a": {"b": [1, 2]}});
        assert_eq!(get_by_path(&value, "/a/b/1"), Some(&json!(2)));
        assert_eq!(get_by_path(&value, "a/b/0"), Some(&json!(1)));
        assert_eq!(delete_by_path(&mut value, "/a/b/0"), Some(json!(1)));
        assert_eq!(value, json!({"a": {"b": [2]}}));
        assert_eq!(delete_by_path(&mut value, "/nope"), None);
    }
}
