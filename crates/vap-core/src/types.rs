//! Skill data model

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq, SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::{Error, DEFAULT_PORT, VAP_VERSION};

/// Value type carried in capability payloads.
///
/// Mirrors the MessagePack data model; `bin` fields decode to [`Value::Bytes`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a MessagePack value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(i64::try_from(v)
            .map(Value::Int)
            .unwrap_or(Value::Float(v as f64)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Value, E> {
        Ok(Value::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Value, E> {
        Ok(Value::Bytes(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut entries = HashMap::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, Value>()? {
            entries.insert(key, value);
        }
        Ok(Value::Map(entries))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

/// A language supported by the voice assistant.
///
/// Always written as the positional tuple `(language, country, extra)`;
/// reading accepts both that tuple and a map with the same field names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct LanguageTag {
    /// The language code
    pub language: String,
    /// The country code of the language
    #[serde(default)]
    pub country: Option<String>,
    /// Extra subtag (script, variant)
    #[serde(default)]
    pub extra: Option<String>,
}

impl LanguageTag {
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            country: None,
            extra: None,
        }
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }

    pub fn with_extra(mut self, extra: &str) -> Self {
        self.extra = Some(extra.to_string());
        self
    }

    /// Whether two tags name the same language: equal language codes, and
    /// equal countries unless either side leaves the country open.
    pub fn matches(&self, other: &LanguageTag) -> bool {
        if !self.language.eq_ignore_ascii_case(&other.language) {
            return false;
        }
        match (&self.country, &other.country) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => true,
        }
    }
}

impl Serialize for LanguageTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.language)?;
        tuple.serialize_element(&self.country)?;
        tuple.serialize_element(&self.extra)?;
        tuple.end()
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.language)?;
        if let Some(country) = &self.country {
            write!(f, "-{}", country)?;
        }
        if let Some(extra) = &self.extra {
            write!(f, "-{}", extra)?;
        }
        Ok(())
    }
}

impl FromStr for LanguageTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(['-', '_']);
        let language = parts
            .next()
            .filter(|l| !l.is_empty() && l.chars().all(|c| c.is_ascii_alphabetic()))
            .ok_or_else(|| Error::InvalidLanguageTag(s.to_string()))?;

        let country = parts.next().map(str::to_string);
        let rest: Vec<&str> = parts.collect();
        if country.as_deref() == Some("") || rest.iter().any(|p| p.is_empty()) {
            return Err(Error::InvalidLanguageTag(s.to_string()));
        }
        let extra = (!rest.is_empty()).then(|| rest.join("-"));

        Ok(Self {
            language: language.to_string(),
            country,
            extra,
        })
    }
}

/// Identity a skill presents when connecting to the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillDescriptor {
    /// A skill id in the form of org.organization.skill
    pub id: String,
    /// A human readable name for the skill
    pub name: String,
    #[serde(rename = "vapVersion")]
    pub protocol_version: String,
    /// Opaque token, passed through untouched
    #[serde(rename = "uniqueAuthenticationToken")]
    pub auth_token: Option<String>,
}

impl SkillDescriptor {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            protocol_version: VAP_VERSION.to_string(),
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
}

impl From<&str> for Utterance {
    fn from(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

/// A slot inside an intent, filled with values of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDefinition {
    pub name: String,
    pub entity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentDefinition {
    pub name: String,
    pub utterances: Vec<Utterance>,
    #[serde(default)]
    pub slots: Vec<SlotDefinition>,
}

impl IntentDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            utterances: Vec::new(),
            slots: Vec::new(),
        }
    }

    pub fn with_utterance(mut self, text: &str) -> Self {
        self.utterances.push(text.into());
        self
    }

    pub fn with_slot(mut self, name: &str, entity: &str) -> Self {
        self.slots.push(SlotDefinition {
            name: name.to_string(),
            entity: entity.to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityValue {
    pub value: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    #[serde(default)]
    pub strict: bool,
    pub data: Vec<EntityValue>,
}

/// Intents and entities understood in one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NluData {
    pub language: LanguageTag,
    pub intents: Vec<IntentDefinition>,
    #[serde(default)]
    pub entities: Vec<EntityDefinition>,
}

/// Full NLU upload, one entry per language
pub type NluDataset = Vec<NluData>;

/// A named unit of data exchanged with clients.
///
/// `name` selects the variant; every other field is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(flatten)]
    pub data: HashMap<String, Value>,
}

impl Capability {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            data: HashMap::new(),
        }
    }

    /// Plain text capability
    pub fn text(text: &str) -> Self {
        Self::new("text").with("text", text)
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

/// Capabilities addressed to (or coming from) one client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilitySet {
    pub client_id: String,
    pub capabilities: Vec<Capability>,
}

impl ClientCapabilitySet {
    pub fn new(client_id: &str, capabilities: Vec<Capability>) -> Self {
        Self {
            client_id: client_id.to_string(),
            capabilities,
        }
    }

    /// First capability with the given name, in sequence order
    pub fn find(&self, name: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.name == name)
    }
}

/// Where the registry lives, as resolved by discovery
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistryHandle {
    pub host: String,
    pub port: u16,
    /// Base path, without leading or trailing slashes
    pub path: String,
}

impl RegistryHandle {
    pub fn new(host: &str, path: &str) -> Self {
        Self {
            host: host.to_string(),
            port: DEFAULT_PORT,
            path: path.trim_matches('/').to_string(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Path of a resource below the registry base
    pub fn resource(&self, suffix: &str) -> String {
        let suffix = suffix.trim_matches('/');
        if self.path.is_empty() {
            suffix.to_string()
        } else {
            format!("{}/{}", self.path, suffix)
        }
    }
}

impl fmt::Display for RegistryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "coap://{}:{}/{}", self.host, self.port, self.path)
    }
}
