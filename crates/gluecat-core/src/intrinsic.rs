//! CloudFormation property values and intrinsic functions
//!
//! `Value` is the property tree of a template. Intrinsics (`Ref`,
//! `Fn::GetAtt`, `Fn::Sub`, `Fn::Join`, `Fn::Select`, `Fn::GetAZs`) are
//! first-class variants so references between resources can be checked
//! before a template leaves the process.

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Ordered property map of a resource or nested object
pub type Properties = IndexMap<String, Value>;

/// Pseudo parameters resolved by CloudFormation at deploy time
pub mod pseudo {
    pub const ACCOUNT_ID: &str = "AWS::AccountId";
    pub const PARTITION: &str = "AWS::Partition";
    pub const NO_VALUE: &str = "AWS::NoValue";

    pub fn is_pseudo(name: &str) -> bool {
        name.starts_with("AWS::")
    }
}

/// Build a [`Properties`] map from `key => value` pairs.
#[macro_export]
macro_rules! props {
    () => {
        $crate::intrinsic::Properties::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::intrinsic::Properties::new();
        $(
            map.insert(($key).to_string(), $crate::intrinsic::Value::from($value));
        )+
        map
    }};
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Str(String),
    List(Vec<Value>),
    Map(Properties),
    /// `{"Ref": logical_id}`
    Ref(String),
    /// `{"Fn::GetAtt": [logical_id, attribute]}`
    GetAtt(String, String),
    /// `{"Fn::Sub": template}`
    Sub(String),
    /// `{"Fn::Join": [separator, [parts...]]}`
    Join(String, Vec<Value>),
    /// `{"Fn::Select": [index, list]}`
    Select(u32, Box<Value>),
    /// `{"Fn::GetAZs": region}`
    GetAzs(String),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn reference(logical_id: impl Into<String>) -> Self {
        Value::Ref(logical_id.into())
    }

    pub fn get_att(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Value::GetAtt(logical_id.into(), attribute.into())
    }

    pub fn sub(template: impl Into<String>) -> Self {
        Value::Sub(template.into())
    }

    pub fn join(separator: impl Into<String>, parts: Vec<Value>) -> Self {
        Value::Join(separator.into(), parts)
    }

    /// `Fn::Select [index, Fn::GetAZs ""]`
    pub fn availability_zone(index: u32) -> Self {
        Value::Select(index, Box::new(Value::GetAzs(String::new())))
    }

    pub fn account_id() -> Self {
        Value::Ref(pseudo::ACCOUNT_ID.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numbers, or strings holding a number (CloudFormation accepts both)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            Value::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Properties> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key of a nested object
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Logical id targeted by a `Ref`
    pub fn ref_target(&self) -> Option<&str> {
        match self {
            Value::Ref(target) => Some(target),
            _ => None,
        }
    }

    /// Fold the value into a plain string when it holds no unresolved references.
    pub fn literal(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Join(separator, parts) => {
                let parts = parts
                    .iter()
                    .map(Value::literal)
                    .collect::<Option<Vec<_>>>()?;
                Some(parts.join(separator))
            }
            _ => None,
        }
    }

    /// Collect every logical id this value depends on (pseudo parameters excluded).
    pub fn collect_references(&self, out: &mut Vec<String>) {
        match self {
            Value::Ref(target) | Value::GetAtt(target, _) => {
                if !pseudo::is_pseudo(target) {
                    out.push(target.clone());
                }
            }
            Value::Sub(template) => out.extend(sub_references(template)),
            Value::Join(_, parts) | Value::List(parts) => {
                for part in parts {
                    part.collect_references(out);
                }
            }
            Value::Select(_, inner) => inner.collect_references(out),
            Value::Map(map) => {
                for value in map.values() {
                    value.collect_references(out);
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::Str(_) | Value::GetAzs(_) => {}
        }
    }
}

/// Names interpolated by a `Fn::Sub` template (`${Name}` / `${Name.Attr}`).
fn sub_references(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let inner = &after[..end];
        // ${!Literal} escapes interpolation
        if !inner.starts_with('!') {
            let name = inner.split('.').next().unwrap_or(inner);
            if !name.is_empty() && !pseudo::is_pseudo(name) {
                names.push(name.to_string());
            }
        }
        rest = &after[end + 1..];
    }
    names
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Str(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self {
        Value::Number(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items.into_iter().map(Value::Str).collect())
    }
}

impl From<Properties> for Value {
    fn from(map: Properties) -> Self {
        Value::Map(map)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => items.serialize(serializer),
            Value::Map(map) => map.serialize(serializer),
            Value::Ref(target) => single_entry(serializer, "Ref", target),
            Value::GetAtt(target, attribute) => {
                single_entry(serializer, "Fn::GetAtt", &[target, attribute])
            }
            Value::Sub(template) => single_entry(serializer, "Fn::Sub", template),
            Value::Join(separator, parts) => {
                single_entry(serializer, "Fn::Join", &(separator, parts))
            }
            Value::Select(index, list) => single_entry(serializer, "Fn::Select", &(index, list)),
            Value::GetAzs(region) => single_entry(serializer, "Fn::GetAZs", region),
        }
    }
}

fn single_entry<S, T>(serializer: S, key: &str, value: &T) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize + ?Sized,
{
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry(key, value)?;
    map.end()
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Value::try_from(raw).map_err(de::Error::custom)
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = String;

    fn try_from(raw: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value as Json;

        Ok(match raw {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n),
            Json::String(s) => Value::Str(s),
            Json::Array(items) => Value::List(
                items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Json::Object(map) => {
                if map.len() == 1 {
                    if let Some((key, inner)) = map.iter().next() {
                        if let Some(intrinsic) = parse_intrinsic(key, inner)? {
                            return Ok(intrinsic);
                        }
                    }
                }
                let mut props = Properties::with_capacity(map.len());
                for (key, value) in map {
                    props.insert(key, Value::try_from(value)?);
                }
                Value::Map(props)
            }
        })
    }
}

fn parse_intrinsic(key: &str, inner: &serde_json::Value) -> Result<Option<Value>, String> {
    use serde_json::Value as Json;

    let malformed = || format!("malformed {} intrinsic: {}", key, inner);
    let value = match key {
        "Ref" => Value::Ref(inner.as_str().ok_or_else(malformed)?.to_string()),
        "Fn::Sub" => Value::Sub(inner.as_str().ok_or_else(malformed)?.to_string()),
        "Fn::GetAZs" => Value::GetAzs(inner.as_str().unwrap_or_default().to_string()),
        "Fn::GetAtt" => match inner {
            Json::Array(parts) if parts.len() == 2 => Value::GetAtt(
                parts[0].as_str().ok_or_else(malformed)?.to_string(),
                parts[1].as_str().ok_or_else(malformed)?.to_string(),
            ),
            // Short "Resource.Attribute" form
            Json::String(dotted) => {
                let (target, attribute) = dotted.split_once('.').ok_or_else(malformed)?;
                Value::GetAtt(target.to_string(), attribute.to_string())
            }
            _ => return Err(malformed()),
        },
        "Fn::Join" => match inner {
            Json::Array(parts) if parts.len() == 2 => {
                let separator = parts[0].as_str().ok_or_else(malformed)?.to_string();
                let items = parts[1].as_array().ok_or_else(malformed)?;
                Value::Join(
                    separator,
                    items
                        .iter()
                        .cloned()
                        .map(Value::try_from)
                        .collect::<Result<_, _>>()?,
                )
            }
            _ => return Err(malformed()),
        },
        "Fn::Select" => match inner {
            Json::Array(parts) if parts.len() == 2 => {
                let index = match &parts[0] {
                    Json::Number(n) => n.as_u64(),
                    Json::String(s) => s.parse().ok(),
                    _ => None,
                }
                .and_then(|i| u32::try_from(i).ok())
                .ok_or_else(malformed)?;
                Value::Select(index, Box::new(Value::try_from(parts[1].clone())?))
            }
            _ => return Err(malformed()),
        },
        _ => return Ok(None),
    };
    Ok(Some(value))
}
