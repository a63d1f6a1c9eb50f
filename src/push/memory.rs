use std::cmp::Ordering;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::store::document::field_value;
use crate::store::emulator::compare_values;
use crate::store::error::{invalid_argument, StoreResult};
use crate::store::path::ResourcePath;

use super::PushBackend;

const KEY_INDEX: &str = "$key";

/// Tree store held as one JSON value. The default push backend when no push
/// base URL is configured; interprets the translator's native parameters the
/// way the real service does (ascending scan over one index, equality
/// restriction, first/last limits).
#[derive(Clone)]
pub struct InMemoryPushBackend {
    tree: Arc<Mutex<Value>>,
}

impl Default for InMemoryPushBackend {
    fn default() -> Self {
        Self {
            tree: Arc::new(Mutex::new(Value::Object(Map::new()))),
        }
    }
}

impl InMemoryPushBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PushBackend for InMemoryPushBackend {
    async fn get(&self, path: &ResourcePath, query: &[(String, String)]) -> StoreResult<Value> {
        let node = {
            let tree = self.tree.lock().unwrap();
            value_at_path(&tree, path).cloned().unwrap_or(Value::Null)
        };
        if query.is_empty() {
            return Ok(node);
        }
        apply_native_query(node, query)
    }

    async fn set(&self, path: &ResourcePath, value: Value) -> StoreResult<()> {
        let mut tree = self.tree.lock().unwrap();
        set_at_path(&mut tree, path.segments(), value);
        Ok(())
    }

    async fn merge(&self, path: &ResourcePath, entries: Map<String, Value>) -> StoreResult<()> {
        let mut tree = self.tree.lock().unwrap();
        for (child, value) in entries {
            let mut segments = path.segments().to_vec();
            segments.push(child);
            set_at_path(&mut tree, &segments, value);
        }
        Ok(())
    }

    async fn delete(&self, path: &ResourcePath) -> StoreResult<()> {
        let mut tree = self.tree.lock().unwrap();
        delete_at_path(&mut tree, path.segments());
        Ok(())
    }
}

fn value_at_path<'a>(root: &'a Value, path: &ResourcePath) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.segments() {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn set_at_path(root: &mut Value, segments: &[String], value: Value) {
    if segments.is_empty() {
        *root = value;
        return;
    }
    let mut current = root;
    for segment in &segments[..segments.len() - 1] {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = current
            .as_object_mut()
            .unwrap()
            .entry(segment.clone())
            .or_insert(Value::Object(Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    current
        .as_object_mut()
        .unwrap()
        .insert(segments.last().unwrap().clone(), value);
}

fn delete_at_path(root: &mut Value, segments: &[String]) {
    if segments.is_empty() {
        *root = Value::Null;
        return;
    }
    let mut current = root;
    for segment in &segments[..segments.len() - 1] {
        match current.as_object_mut() {
            Some(children) => match children.get_mut(segment) {
                Some(next) => current = next,
                None => return,
            },
            None => return,
        }
    }
    if let Some(children) = current.as_object_mut() {
        children.remove(segments.last().unwrap());
    }
}

/// Runs the native parameter list over a node's direct children: order by
/// the index ascending (absent values first, then key), restrict to an
/// equality match, cut to the first or last N. The surviving children come
/// back as an object, so wire order is not part of the contract.
fn apply_native_query(node: Value, query: &[(String, String)]) -> StoreResult<Value> {
    let Value::Object(children) = node else {
        return Ok(node);
    };

    let mut index = KEY_INDEX.to_string();
    let mut equal_to: Option<Value> = None;
    let mut limit_first: Option<usize> = None;
    let mut limit_last: Option<usize> = None;

    for (key, raw) in query {
        match key.as_str() {
            "orderBy" => {
                index = serde_json::from_str::<String>(raw).map_err(|err| {
                    invalid_argument(format!("Invalid orderBy parameter '{raw}': {err}"))
                })?;
            }
            "equalTo" => {
                equal_to = Some(serde_json::from_str(raw).map_err(|err| {
                    invalid_argument(format!("Invalid equalTo parameter '{raw}': {err}"))
                })?);
            }
            "limitToFirst" => {
                limit_first = Some(parse_limit(raw)?);
            }
            "limitToLast" => {
                limit_last = Some(parse_limit(raw)?);
            }
            other => {
                return Err(invalid_argument(format!(
                    "Unsupported query parameter '{other}'"
                )));
            }
        }
    }

    let mut entries: Vec<(String, Value)> = children.into_iter().collect();
    entries.sort_by(|(left_key, left), (right_key, right)| {
        index_ordering(&index, left_key, left, right_key, right)
    });

    if let Some(expected) = &equal_to {
        entries.retain(|(key, value)| index_value(&index, key, value).as_ref() == Some(expected));
    }

    if let Some(limit) = limit_first {
        entries.truncate(limit);
    }
    if let Some(limit) = limit_last {
        if entries.len() > limit {
            entries.drain(0..entries.len() - limit);
        }
    }

    Ok(Value::Object(entries.into_iter().collect()))
}

fn parse_limit(raw: &str) -> StoreResult<usize> {
    raw.parse::<u32>()
        .map(|limit| limit as usize)
        .map_err(|err| invalid_argument(format!("Invalid limit parameter '{raw}': {err}")))
}

fn index_value(index: &str, key: &str, value: &Value) -> Option<Value> {
    if index == KEY_INDEX {
        return Some(Value::String(key.to_string()));
    }
    value
        .as_object()
        .and_then(|fields| field_value(fields, index))
        .cloned()
}

fn index_ordering(
    index: &str,
    left_key: &str,
    left: &Value,
    right_key: &str,
    right: &Value,
) -> Ordering {
    let by_index = match (
        index_value(index, left_key, left),
        index_value(index, right_key, right),
    ) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(&a, &b).unwrap_or(Ordering::Equal),
    };
    by_index.then_with(|| left_key.cmp(right_key))
}
