use crate::error::{PipelineError, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// A raw scalar as delivered by the format reader. No coercion happens at
/// parse time; numeric interpretation is done by [`crate::coerce`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Empty,
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            Value::Empty
        } else {
            Value::Text(s)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Text(s) => s.trim().is_empty(),
            Value::Number(_) => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Empty => Ok(()),
        }
    }
}

/// One parsed record: header -> value, in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, header: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v)
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(h, _)| h.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(h, v)| (h.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when every cell is blank (a spacer line in the export).
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.is_empty())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (header, value) in &self.fields {
            map.serialize_entry(header, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping header names to scalar values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Row, A::Error> {
                let mut fields = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((header, value)) = access.next_entry::<String, Value>()? {
                    fields.push((header, value));
                }
                Ok(Row { fields })
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

/// Ordered, collision-free header names of a parsed file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(Vec<String>);

impl Schema {
    /// Trim raw headers and rename repeats to `name_1`, `name_2`, ... in order
    /// of appearance. A suffixed name that already exists elsewhere in the
    /// header row is skipped so no two columns share a name.
    pub fn from_raw_headers<S: AsRef<str>>(raw: &[S]) -> Self {
        let trimmed: Vec<&str> = raw.iter().map(|h| h.as_ref().trim()).collect();
        let reserved: HashSet<&str> = trimmed.iter().copied().collect();
        let mut emitted: HashSet<String> = HashSet::with_capacity(trimmed.len());
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut names = Vec::with_capacity(trimmed.len());

        for header in trimmed {
            let count = seen.entry(header).or_insert(0);
            let name = if *count == 0 && !emitted.contains(header) {
                header.to_string()
            } else {
                let mut n = (*count).max(1);
                loop {
                    let candidate = format!("{}_{}", header, n);
                    if !emitted.contains(&candidate) && !reserved.contains(candidate.as_str()) {
                        break candidate;
                    }
                    n += 1;
                }
            };
            *count += 1;
            emitted.insert(name.clone());
            names.push(name);
        }

        Schema(names)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build a row by pairing each schema name with the value at the same
    /// column position. Short records are padded with `Empty`.
    pub fn row_from_values(&self, values: Vec<Value>) -> Row {
        let mut values = values.into_iter();
        let fields = self
            .0
            .iter()
            .map(|name| (name.clone(), values.next().unwrap_or(Value::Empty)))
            .collect();
        Row::new(fields)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Electrical survey export (XLI).
    Primary,
    /// Inspection export (ICE).
    Secondary,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Primary, Role::Secondary];

    fn tag(self) -> &'static str {
        match self {
            Role::Primary => "XLI",
            Role::Secondary => "ICE",
        }
    }

    pub fn data_key(self) -> String {
        format!("dataset{}", self.tag())
    }

    pub fn name_key(self) -> String {
        format!("fileName{}", self.tag())
    }

    pub fn markers_key(self) -> String {
        format!("markers{}", self.tag())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => f.write_str("primary"),
            Role::Secondary => f.write_str("secondary"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" | "xli" => Ok(Role::Primary),
            "secondary" | "ice" => Ok(Role::Secondary),
            other => Err(format!("unknown role `{}` (expected primary or secondary)", other)),
        }
    }
}

/// Identity of a stored dataset. Assigned by the store on every save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct DatasetId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub role: Role,
    pub id: DatasetId,
    pub file_name: Option<String>,
    pub schema: Schema,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn new(role: Role, schema: Schema, rows: Vec<Row>) -> Self {
        Self {
            role,
            id: DatasetId::default(),
            file_name: None,
            schema,
            rows,
        }
    }

    pub fn empty(role: Role) -> Self {
        Self::new(role, Schema::default(), Vec::new())
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Same rows and schema, ignoring store-assigned identity.
    pub fn same_content(&self, other: &Dataset) -> bool {
        self.schema == other.schema && self.rows == other.rows
    }

    /// Create a dataset from a JSON array of objects, the record layout used
    /// by earlier exports. Keys of the first object define the schema.
    pub fn from_json_records(role: Role, value: &JsonValue) -> Result<Self> {
        let array = value
            .as_array()
            .ok_or_else(|| PipelineError::malformed("input data must be a JSON array of objects"))?;

        if array.is_empty() {
            return Err(PipelineError::malformed("input data array is empty"));
        }

        let first_obj = array[0]
            .as_object()
            .ok_or_else(|| PipelineError::malformed("items in array must be objects"))?;

        let raw_headers: Vec<String> = first_obj.keys().cloned().collect();
        let schema = Schema::from_raw_headers(&raw_headers);

        let mut rows = Vec::with_capacity(array.len());
        for item in array {
            let obj = item
                .as_object()
                .ok_or_else(|| PipelineError::malformed("items in array must be objects"))?;

            let mut values = Vec::with_capacity(raw_headers.len());
            for header in &raw_headers {
                let value = match obj.get(header) {
                    Some(JsonValue::String(s)) => Value::text(s.clone()),
                    Some(JsonValue::Number(n)) => n.as_f64().map(Value::Number).unwrap_or(Value::Empty),
                    Some(JsonValue::Bool(b)) => Value::Text(b.to_string()),
                    Some(JsonValue::Null) | None => Value::Empty,
                    _ => {
                        return Err(PipelineError::malformed(format!(
                            "unsupported value type for field '{}'",
                            header
                        )))
                    }
                };
                values.push(value);
            }
            rows.push(schema.row_from_values(values));
        }

        Ok(Self::new(role, schema, rows))
    }
}
