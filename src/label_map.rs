//! Class-name to integer-id lookup used when building training records.
//!
//! Ids are positive; `0` is reserved as background by most detection
//! trainers. A map can be loaded from:
//!
//! - YAML (`.yaml`/`.yml`) or JSON (`.json`): a mapping `{ airplane: 1, car: 2 }`
//! - TF Object Detection text protos (`.pbtxt`):
//!
//! ```text
//! item {
//!   id: 1
//!   name: 'airplane'
//! }
//! ```
//!
//! or derived from a table with [`LabelMap::from_classes`].

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::RecordprepError;

/// An injected class-name → id mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelMap {
    ids: BTreeMap<String, u32>,
}

impl LabelMap {
    /// Builds a map from `(name, id)` pairs.
    ///
    /// # Errors
    /// Rejects empty names, id `0`, repeated names, and ids shared by two names.
    pub fn new<I, S>(entries: I) -> Result<Self, RecordprepError>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        Self::build(entries, Path::new("<memory>"))
    }

    /// Assigns ids `1..=N` to the distinct names in lexicographic order.
    pub fn from_classes<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();

        let ids = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| (name, (idx + 1) as u32))
            .collect();
        Self { ids }
    }

    /// Loads a label map, choosing the parser from the file extension.
    pub fn read(path: &Path) -> Result<Self, RecordprepError> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let text = fs::read_to_string(path).map_err(RecordprepError::Io)?;
        match ext.as_str() {
            "yaml" | "yml" => parse_mapping(&text, path, |t| {
                serde_yaml::from_str(t).map_err(|e| e.to_string())
            }),
            "json" => parse_mapping(&text, path, |t| {
                serde_json::from_str(t).map_err(|e| e.to_string())
            }),
            "pbtxt" => parse_pbtxt(&text, path),
            other => Err(RecordprepError::UnsupportedFormat(format!(
                "label map extension '{}' (supported: yaml, yml, json, pbtxt)",
                other
            ))),
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, RecordprepError> {
        parse_mapping(text, Path::new("<memory>"), |t| {
            serde_yaml::from_str(t).map_err(|e| e.to_string())
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self, RecordprepError> {
        parse_mapping(text, Path::new("<memory>"), |t| {
            serde_json::from_str(t).map_err(|e| e.to_string())
        })
    }

    pub fn from_pbtxt_str(text: &str) -> Result<Self, RecordprepError> {
        parse_pbtxt(text, Path::new("<memory>"))
    }

    /// Returns the id for `class_name`, if mapped.
    pub fn get(&self, class_name: &str) -> Option<u32> {
        self.ids.get(class_name).copied()
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.ids.contains_key(class_name)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.ids.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// Renders the map as a TF Object Detection `.pbtxt`, ordered by id.
    pub fn to_pbtxt(&self) -> String {
        let mut entries: Vec<(&str, u32)> = self.iter().collect();
        entries.sort_by_key(|(_, id)| *id);

        let mut out = String::new();
        for (name, id) in entries {
            writeln!(out, "item {{\n  id: {id}\n  name: '{}'\n}}", escape_pbtxt(name))
                .expect("write to string");
        }
        out
    }

    fn build<I, S>(entries: I, path: &Path) -> Result<Self, RecordprepError>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let invalid = |message: String| RecordprepError::LabelMapInvalid {
            path: path.to_path_buf(),
            message,
        };

        let mut ids = BTreeMap::new();
        let mut names_by_id: BTreeMap<u32, String> = BTreeMap::new();

        for (name, id) in entries {
            let name = name.into();
            if name.is_empty() {
                return Err(invalid("empty class name".to_string()));
            }
            if id == 0 {
                return Err(invalid(format!(
                    "class '{name}' has id 0; ids must be positive"
                )));
            }
            if let Some(other) = names_by_id.get(&id) {
                return Err(invalid(format!(
                    "id {id} is assigned to both '{other}' and '{name}'"
                )));
            }
            if ids.contains_key(&name) {
                return Err(invalid(format!("class '{name}' is listed twice")));
            }
            names_by_id.insert(id, name.clone());
            ids.insert(name, id);
        }

        Ok(Self { ids })
    }
}

/// Escapes a class name for a single-quoted text-format string.
fn escape_pbtxt(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn parse_mapping<F>(text: &str, path: &Path, parse: F) -> Result<LabelMap, RecordprepError>
where
    F: FnOnce(&str) -> Result<BTreeMap<String, i64>, String>,
{
    let raw = parse(text).map_err(|message| RecordprepError::LabelMapParse {
        path: path.to_path_buf(),
        message,
    })?;

    let mut entries = Vec::with_capacity(raw.len());
    for (name, id) in raw {
        let id = u32::try_from(id).map_err(|_| RecordprepError::LabelMapInvalid {
            path: path.to_path_buf(),
            message: format!("class '{name}' has id {id}; expected a positive u32"),
        })?;
        entries.push((name, id));
    }

    LabelMap::build(entries, path)
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Colon,
    Open,
    Close,
}

fn tokenize_pbtxt(text: &str, path: &Path) -> Result<Vec<Token>, RecordprepError> {
    let error = |message: String| RecordprepError::LabelMapParse {
        path: path.to_path_buf(),
        message,
    };

    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            ':' => {
                chars.next();
                tokens.push(Token::Colon);
            }
            '{' => {
                chars.next();
                tokens.push(Token::Open);
            }
            '}' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '\'' | '"' => {
                let quote = ch;
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some('n') => value.push('\n'),
                            Some('r') => value.push('\r'),
                            Some('t') => value.push('\t'),
                            Some(escaped) => value.push(escaped),
                            None => return Err(error("unterminated string".to_string())),
                        },
                        Some(c) if c == quote => break,
                        Some(c) => value.push(c),
                        None => return Err(error("unterminated string".to_string())),
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut raw = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '-' {
                        raw.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = raw
                    .parse::<i64>()
                    .map_err(|_| error(format!("invalid integer '{raw}'")))?;
                tokens.push(Token::Int(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(error(format!("unexpected character '{other}'"))),
        }
    }

    Ok(tokens)
}

fn parse_pbtxt(text: &str, path: &Path) -> Result<LabelMap, RecordprepError> {
    let error = |message: String| RecordprepError::LabelMapParse {
        path: path.to_path_buf(),
        message,
    };

    let tokens = tokenize_pbtxt(text, path)?;
    let mut iter = tokens.into_iter();
    let mut entries = Vec::new();

    while let Some(token) = iter.next() {
        match token {
            Token::Ident(ref ident) if ident == "item" => {}
            other => return Err(error(format!("expected 'item', found {other:?}"))),
        }
        // `item:` with a colon is also accepted by protobuf text format.
        let mut next = iter.next();
        if next == Some(Token::Colon) {
            next = iter.next();
        }
        if next != Some(Token::Open) {
            return Err(error("expected '{' after 'item'".to_string()));
        }

        let mut id: Option<i64> = None;
        let mut name: Option<String> = None;
        loop {
            let field = match iter.next() {
                Some(Token::Close) => break,
                Some(Token::Ident(field)) => field,
                Some(other) => return Err(error(format!("unexpected {other:?} in item"))),
                None => return Err(error("unterminated item".to_string())),
            };
            if iter.next() != Some(Token::Colon) {
                return Err(error(format!("expected ':' after '{field}'")));
            }
            let value = iter
                .next()
                .ok_or_else(|| error(format!("missing value for '{field}'")))?;

            match (field.as_str(), value) {
                ("id", Token::Int(value)) => id = Some(value),
                ("name", Token::Str(value)) => name = Some(value),
                ("display_name", Token::Str(_)) => {}
                (field, value) => {
                    return Err(error(format!("unexpected value {value:?} for '{field}'")))
                }
            }
        }

        let name = name.ok_or_else(|| error("item without 'name'".to_string()))?;
        let id = id.ok_or_else(|| error(format!("item '{name}' without 'id'")))?;
        let id = u32::try_from(id).map_err(|_| RecordprepError::LabelMapInvalid {
            path: path.to_path_buf(),
            message: format!("class '{name}' has id {id}; expected a positive u32"),
        })?;
        entries.push((name, id));
    }

    LabelMap::build(entries, path)
}

/// Reads a label map from `path`, or derives one when no path is given.
pub fn load_or_derive<'a, I>(
    path: Option<&Path>,
    class_names: I,
) -> Result<LabelMap, RecordprepError>
where
    I: IntoIterator<Item = &'a str>,
{
    match path {
        Some(path) => LabelMap::read(path),
        None => Ok(LabelMap::from_classes(class_names)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_classes_assigns_sorted_ids() {
        let map = LabelMap::from_classes(["person", "airplane", "car", "airplane"]);
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("airplane"), Some(1));
        assert_eq!(map.get("car"), Some(2));
        assert_eq!(map.get("person"), Some(3));
        assert_eq!(map.get("dog"), None);
    }

    #[test]
    fn yaml_and_json_mappings() {
        let yaml = LabelMap::from_yaml_str("airplane: 1\ncar: 2\n").expect("parse yaml");
        let json = LabelMap::from_json_str(r#"{"airplane": 1, "car": 2}"#).expect("parse json");
        assert_eq!(yaml, json);
        assert_eq!(yaml.get("car"), Some(2));
    }

    #[test]
    fn pbtxt_items() {
        let text = "# detection classes\n\
                    item {\n  id: 1\n  name: 'airplane'\n}\n\
                    item {\n  name: \"car\"\n  id: 2\n  display_name: \"Car\"\n}\n";
        let map = LabelMap::from_pbtxt_str(text).expect("parse pbtxt");
        assert_eq!(map.get("airplane"), Some(1));
        assert_eq!(map.get("car"), Some(2));
    }

    #[test]
    fn pbtxt_roundtrip_keeps_ids() {
        let map = LabelMap::new([("it's", 3u32), ("airplane", 1)]).expect("build map");
        let text = map.to_pbtxt();
        assert!(text.starts_with("item {\n  id: 1\n  name: 'airplane'\n}\n"));
        assert_eq!(LabelMap::from_pbtxt_str(&text).expect("parse pbtxt"), map);
    }

    #[test]
    fn pbtxt_escapes_control_characters() {
        let map = LabelMap::new([("two\nlines", 1u32), ("tab\there", 2), ("back\\slash", 3)])
            .expect("build map");
        let text = map.to_pbtxt();

        assert!(text.contains("name: 'two\\nlines'"));
        assert!(text.contains("name: 'tab\\there'"));
        assert!(text.contains("name: 'back\\\\slash'"));
        // Every quoted name sits on its own line.
        assert_eq!(text.lines().count(), 3 * 4);
        assert_eq!(LabelMap::from_pbtxt_str(&text).expect("parse pbtxt"), map);
    }

    #[test]
    fn rejects_zero_and_negative_ids() {
        assert!(matches!(
            LabelMap::from_yaml_str("airplane: 0\n"),
            Err(RecordprepError::LabelMapInvalid { .. })
        ));
        assert!(matches!(
            LabelMap::from_json_str(r#"{"airplane": -1}"#),
            Err(RecordprepError::LabelMapInvalid { .. })
        ));
    }

    #[test]
    fn rejects_shared_ids() {
        let err = LabelMap::new([("a", 1u32), ("b", 1)]).unwrap_err();
        assert!(err.to_string().contains("assigned to both"));
    }

    #[test]
    fn pbtxt_missing_name_is_a_parse_error() {
        let err = LabelMap::from_pbtxt_str("item { id: 1 }").unwrap_err();
        assert!(matches!(err, RecordprepError::LabelMapParse { .. }));
    }

    #[test]
    fn read_picks_parser_by_extension() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join("labels.yml");
        fs::write(&path, "airplane: 7\n").expect("write label map");
        assert_eq!(LabelMap::read(&path).expect("read").get("airplane"), Some(7));

        let unknown = temp.path().join("labels.txt");
        fs::write(&unknown, "airplane").expect("write label map");
        assert!(matches!(
            LabelMap::read(&unknown),
            Err(RecordprepError::UnsupportedFormat(_))
        ));
    }
}
