//! Dot-path assignment into a payload's JSON field object.
//!
//! Paths address object keys and array indices: `title`, `list`,
//! `list.0.name`. Assignment never creates intermediate containers; the
//! parent of the final segment must already exist. Whether the final key is
//! allowed at all is decided by the caller against the kind's schema.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("empty field path")]
    EmptyPath,
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("index {index} out of range in `{path}`")]
    IndexOutOfRange { path: String, index: usize },
    #[error("`{0}` is not an object or array")]
    NotAContainer(String),
    #[error("`{0}` would change an entry identity")]
    EntryIdentity(String),
    #[error("duplicate entry id `{0}`")]
    DuplicateEntryId(String),
}

/// First segment of `path` (the top-level payload field it edits).
pub fn root_field(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

/// Path of the entry a path points into: `list.3.name` gives `list.3` when
/// `list` is the entries field. `None` for paths outside any single entry.
pub fn entry_slot<'a>(path: &'a str, entries_field: &str) -> Option<&'a str> {
    let mut segments = path.splitn(3, '.');
    if segments.next()? != entries_field {
        return None;
    }
    let index = segments.next()?;
    index.parse::<usize>().ok()?;
    Some(&path[..entries_field.len() + 1 + index.len()])
}

pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Write `value` at `path` inside `root`.
pub fn assign(root: &mut Value, path: &str, value: Value) -> Result<(), FieldError> {
    if path.is_empty() {
        return Err(FieldError::EmptyPath);
    }
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = segments.split_last().ok_or(FieldError::EmptyPath)?;

    let mut current = root;
    for segment in parents {
        current = step(current, segment, path)?;
    }

    match current {
        Value::Object(map) => {
            map.insert((*last).to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = parse_index(last, path)?;
            let slot = items.get_mut(index).ok_or(FieldError::IndexOutOfRange {
                path: path.to_string(),
                index,
            })?;
            *slot = value;
            Ok(())
        }
        _ => Err(FieldError::NotAContainer(path.to_string())),
    }
}

fn step<'a>(current: &'a mut Value, segment: &str, path: &str) -> Result<&'a mut Value, FieldError> {
    match current {
        Value::Object(map) => map
            .get_mut(segment)
            .ok_or_else(|| FieldError::UnknownField(path.to_string())),
        Value::Array(items) => {
            let index = parse_index(segment, path)?;
            items.get_mut(index).ok_or(FieldError::IndexOutOfRange {
                path: path.to_string(),
                index,
            })
        }
        _ => Err(FieldError::NotAContainer(path.to_string())),
    }
}

fn parse_index(segment: &str, path: &str) -> Result<usize, FieldError> {
    segment
        .parse::<usize>()
        .map_err(|_| FieldError::UnknownField(path.to_string()))
}
