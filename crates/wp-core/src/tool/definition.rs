//! Capability definitions
//!
//! An [`ActionSpec`] describes one entry of the planner's action catalog:
//! its parameters (with validation predicates), where it runs, and what it
//! does to the page. Remote tools describe themselves with a
//! [`ToolDescriptor`], which converts into an `ActionSpec`.

use std::time::Duration;

use regex::Regex;
use serde_json::{Map, Value as JsonValue, json};

/// Parameter value type
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Enum(Vec<String>),
    /// Integer that must reference an element of the current snapshot
    ElementIndex,
    Url,
    /// Any JSON value (object/array parameters of remote tools)
    Json,
}

impl ParamKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamKind::String | ParamKind::Enum(_) | ParamKind::Url => "string",
            ParamKind::Integer | ParamKind::ElementIndex => "integer",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Json => "any",
        }
    }
}

/// Extra constraint checked after the type
#[derive(Debug, Clone)]
pub enum Predicate {
    NonEmpty,
    MinInt(i64),
    MaxInt(i64),
    MaxLength(usize),
    Pattern(Regex),
    /// The referenced element must be interactive
    Interactive,
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub description: String,
    pub predicates: Vec<Predicate>,
}

impl ParamSpec {
    /// Create a required parameter
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: String::new(),
            predicates: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    fn schema(&self) -> JsonValue {
        let mut schema = match &self.kind {
            ParamKind::Enum(values) => json!({"type": "string", "enum": values}),
            ParamKind::Url => json!({"type": "string", "format": "uri"}),
            ParamKind::ElementIndex => json!({"type": "integer", "minimum": 0}),
            ParamKind::Json => json!({}),
            kind => json!({"type": kind.type_name()}),
        };

        if let Some(obj) = schema.as_object_mut() {
            if !self.description.is_empty() {
                obj.insert("description".to_string(), json!(self.description));
            }
            for predicate in &self.predicates {
                match predicate {
                    Predicate::NonEmpty if self.kind == ParamKind::String => {
                        obj.insert("minLength".to_string(), json!(1));
                    }
                    Predicate::MinInt(min) => {
                        obj.insert("minimum".to_string(), json!(min));
                    }
                    Predicate::MaxInt(max) => {
                        obj.insert("maximum".to_string(), json!(max));
                    }
                    Predicate::MaxLength(max) => {
                        obj.insert("maxLength".to_string(), json!(max));
                    }
                    Predicate::Pattern(re) => {
                        obj.insert("pattern".to_string(), json!(re.as_str()));
                    }
                    _ => {}
                }
            }
        }

        schema
    }
}

/// Where a capability executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    LocalBrowser,
    RemoteTool,
}

/// Declared effect on the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    None,
    Navigates,
    MutatesPage,
    ExternalCall,
}

impl SideEffect {
    /// The page must be re-extracted after this effect
    pub fn changes_page(&self) -> bool {
        matches!(self, SideEffect::Navigates | SideEffect::MutatesPage)
    }
}

#[derive(Debug, Clone)]
pub struct ActionSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    pub target: TargetKind,
    pub effect: SideEffect,
    pub depends_on_page: bool,
    /// Overrides the registry's default action timeout
    pub timeout: Option<Duration>,
}

impl ActionSpec {
    /// A local browser action with no parameters and no side effect
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            target: TargetKind::LocalBrowser,
            effect: SideEffect::None,
            depends_on_page: true,
            timeout: None,
        }
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn effect(mut self, effect: SideEffect) -> Self {
        self.effect = effect;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn param_spec(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// JSON schema of the parameters, as sent to the planner
    pub fn input_schema(&self) -> JsonValue {
        object_schema(&self.params)
    }
}

/// Build an object schema from parameter specs
pub fn object_schema(params: &[ParamSpec]) -> JsonValue {
    let properties: Map<String, JsonValue> = params
        .iter()
        .map(|p| (p.name.clone(), p.schema()))
        .collect();

    let required: Vec<&str> = params
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// Derive parameter specs from a JSON object schema
///
/// Used for tools that publish a plain JSON schema. Unknown or composite
/// property types map to [`ParamKind::Json`].
pub fn params_from_schema(schema: &JsonValue) -> Vec<ParamSpec> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(JsonValue::as_array)
        .map(|r| r.iter().filter_map(JsonValue::as_str).collect())
        .unwrap_or_default();

    let Some(properties) = schema.get("properties").and_then(JsonValue::as_object) else {
        return Vec::new();
    };

    properties
        .iter()
        .map(|(name, prop)| {
            let kind = match (prop.get("enum").and_then(JsonValue::as_array), prop.get("type").and_then(JsonValue::as_str)) {
                (Some(values), _) => ParamKind::Enum(
                    values
                        .iter()
                        .filter_map(JsonValue::as_str)
                        .map(str::to_string)
                        .collect(),
                ),
                (None, Some("string")) if prop.get("format").and_then(JsonValue::as_str) == Some("uri") => ParamKind::Url,
                (None, Some("string")) => ParamKind::String,
                (None, Some("integer")) => ParamKind::Integer,
                (None, Some("number")) => ParamKind::Number,
                (None, Some("boolean")) => ParamKind::Boolean,
                _ => ParamKind::Json,
            };

            let mut spec = ParamSpec::new(name.clone(), kind);
            if let Some(description) = prop.get("description").and_then(JsonValue::as_str) {
                spec = spec.describe(description);
            }
            if !required.contains(&name.as_str()) {
                spec = spec.optional();
            }
            spec
        })
        .collect()
}

/// Self-description of a remote tool
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input: Vec<ParamSpec>,
    pub output_schema: JsonValue,
    pub concurrency_limit: usize,
    pub timeout: Duration,
    /// The tool receives the page URL and a screenshot
    pub depends_on_page: bool,
    pub version: String,
    pub tags: Vec<String>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input: Vec::new(),
            output_schema: json!({"type": "object"}),
            concurrency_limit: 1,
            timeout: Duration::from_secs(30),
            depends_on_page: false,
            version: "1.0.0".to_string(),
            tags: Vec::new(),
        }
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.input.push(param);
        self
    }

    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn depends_on_page(mut self, depends: bool) -> Self {
        self.depends_on_page = depends;
        self
    }

    pub fn output_schema(mut self, schema: JsonValue) -> Self {
        self.output_schema = schema;
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn to_action_spec(&self) -> ActionSpec {
        ActionSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            params: self.input.clone(),
            target: TargetKind::RemoteTool,
            effect: SideEffect::ExternalCall,
            depends_on_page: self.depends_on_page,
            timeout: Some(self.timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_schema() {
        let spec = ActionSpec::new("type", "Type text into an input")
            .param(
                ParamSpec::new("index", ParamKind::ElementIndex)
                    .describe("Element to type into")
                    .with(Predicate::Interactive),
            )
            .param(ParamSpec::new("text", ParamKind::String).with(Predicate::MaxLength(500)))
            .param(ParamSpec::new("clear", ParamKind::Boolean).optional())
            .effect(SideEffect::MutatesPage);

        let schema = spec.input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["index"]["type"], "integer");
        assert_eq!(schema["properties"]["index"]["description"], "Element to type into");
        assert_eq!(schema["properties"]["text"]["maxLength"], 500);
        assert_eq!(schema["required"], json!(["index", "text"]));
        assert!(spec.effect.changes_page());
    }

    #[test]
    fn test_enum_and_url_schema() {
        let spec = ActionSpec::new("scroll", "Scroll")
            .param(ParamSpec::new("direction", ParamKind::Enum(vec!["up".into(), "down".into()])))
            .param(ParamSpec::new("url", ParamKind::Url).optional());

        let schema = spec.input_schema();
        assert_eq!(schema["properties"]["direction"]["enum"], json!(["up", "down"]));
        assert_eq!(schema["properties"]["url"]["format"], "uri");
    }

    #[test]
    fn test_descriptor_to_action_spec() {
        let descriptor = ToolDescriptor::new("detect", "Find objects")
            .param(ParamSpec::new("image_url", ParamKind::Url).optional())
            .concurrency_limit(3)
            .timeout(Duration::from_secs(5))
            .depends_on_page(true)
            .tag("vision");

        let spec = descriptor.to_action_spec();
        assert_eq!(spec.target, TargetKind::RemoteTool);
        assert_eq!(spec.effect, SideEffect::ExternalCall);
        assert!(spec.depends_on_page);
        assert_eq!(spec.timeout, Some(Duration::from_secs(5)));
        assert!(!spec.effect.changes_page());
    }

    #[test]
    fn test_params_from_schema() {
        let schema = json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search terms"},
                "limit": {"type": "integer"},
                "mode": {"type": "string", "enum": ["fast", "full"]},
                "filters": {"type": "object"}
            },
            "required": ["query"]
        });

        let params = params_from_schema(&schema);
        let find = |name: &str| params.iter().find(|p| p.name == name).unwrap();

        assert!(find("query").required);
        assert_eq!(find("query").description, "Search terms");
        assert_eq!(find("limit").kind, ParamKind::Integer);
        assert!(!find("limit").required);
        assert_eq!(find("mode").kind, ParamKind::Enum(vec!["fast".into(), "full".into()]));
        assert_eq!(find("filters").kind, ParamKind::Json);
    }
}
