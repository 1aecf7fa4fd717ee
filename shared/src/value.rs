use std::fmt;

/// A single member of a [`Value::Record`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Item {
    /// A tagged attribute, e.g. `@update(key:"a")`.
    Attr(String, Value),
    /// A keyed field, e.g. `name:"unit-7"`.
    Slot(Value, Value),
    /// A plain positional member.
    Item(Value),
}

impl Item {
    pub fn attr(tag: impl Into<String>, body: Value) -> Self {
        Item::Attr(tag.into(), body)
    }

    pub fn slot(key: impl Into<Value>, value: impl Into<Value>) -> Self {
        Item::Slot(key.into(), value.into())
    }

    pub fn of(value: impl Into<Value>) -> Self {
        Item::Item(value.into())
    }
}

/// The structural value used as every envelope and command payload.
///
/// Values are immutable once built, structurally comparable, and totally
/// ordered so they can serve as ordered map-downlink keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    /// No value at all. `Absent` is the result of every failed projection.
    Absent,
    /// Present but empty, distinct from `Absent`.
    Extant,
    Bool(bool),
    Int(i64),
    Text(String),
    Record(Vec<Item>),
}

/// Shared `Absent` to hand out as `&Value` from projections.
pub const ABSENT: Value = Value::Absent;

impl Value {
    pub fn text(text: impl Into<String>) -> Self {
        Value::Text(text.into())
    }

    pub fn record(items: Vec<Item>) -> Self {
        Value::Record(items)
    }

    /// A record with a single leading attribute: `@tag(header)` + body items.
    pub fn of_attr(tag: impl Into<String>, header: Value) -> Self {
        Value::Record(vec![Item::Attr(tag.into(), header)])
    }

    pub fn is_defined(&self) -> bool {
        !matches!(self, Value::Absent)
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Value::Record(_))
    }

    /// The tag of the first attribute, if this is an attributed record.
    pub fn tag(&self) -> Option<&str> {
        if let Value::Record(items) = self {
            if let Some(Item::Attr(tag, _)) = items.first() {
                return Some(tag);
            }
        }
        None
    }

    /// The body of the first attribute, if any.
    pub fn header(&self) -> &Value {
        if let Value::Record(items) = self {
            if let Some(Item::Attr(_, body)) = items.first() {
                return body;
            }
        }
        &ABSENT
    }

    /// The first slot whose key is `Text(key)`.
    pub fn get(&self, key: &str) -> &Value {
        if let Value::Record(items) = self {
            for item in items {
                if let Item::Slot(Value::Text(k), value) = item {
                    if k == key {
                        return value;
                    }
                }
            }
        }
        &ABSENT
    }

    /// The `index`th positional (non-attribute) member.
    pub fn get_item(&self, index: usize) -> &Value {
        if let Value::Record(items) = self {
            let mut i = 0;
            for item in items {
                match item {
                    Item::Attr(_, _) => continue,
                    Item::Slot(_, value) | Item::Item(value) => {
                        if i == index {
                            return value;
                        }
                        i += 1;
                    }
                }
            }
        }
        &ABSENT
    }

    /// Everything after the leading attributes, unwrapped when the remainder
    /// is a single plain member. Non-records pass through unchanged.
    pub fn after_attrs(&self) -> Value {
        let Value::Record(items) = self else {
            return self.clone();
        };
        let rest: Vec<Item> = items
            .iter()
            .skip_while(|item| matches!(item, Item::Attr(_, _)))
            .cloned()
            .collect();
        match rest.as_slice() {
            [] => Value::Absent,
            [Item::Item(value)] => value.clone(),
            _ => Value::Record(rest),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Absent
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::codec::write_value(self))
    }
}
