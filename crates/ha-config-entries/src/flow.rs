//! Config and options flows
//!
//! A flow is a small multi-step form conversation an integration runs to
//! create a config entry (config flow) or to reconfigure one (options flow).
//! The [`FlowManager`] keeps in-progress flows between steps and applies the
//! final result to the config entries manager.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::entry::{ConfigEntry, ConfigEntrySource, ConfigEntryUpdate};
use crate::hass::HomeAssistant;
use crate::manager::ConfigEntriesError;

/// User input submitted to a flow step
pub type FlowInput = HashMap<String, Value>;

/// Flow errors
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Flow not found: {0}")]
    UnknownFlow(String),

    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("No integration registered for domain {0}")]
    UnknownHandler(String),

    #[error("Integration {0} has no config flow")]
    NoConfigFlow(String),

    #[error("Integration {0} has no options flow")]
    NoOptionsFlow(String),

    #[error(transparent)]
    ConfigEntries(#[from] ConfigEntriesError),
}

pub type FlowManagerResult<T> = Result<T, FlowError>;

/// Input widget of a form field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Select,
    MultiSelect,
}

/// One field of a form schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// value -> label, in display order (select fields only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<IndexMap<String, String>>,
}

impl FormField {
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            default: None,
            options: None,
        }
    }

    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            required: false,
            ..Self::required(name, field_type)
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Sets the default only when a value is present
    pub fn with_default_opt(mut self, default: Option<Value>) -> Self {
        self.default = default.filter(|v| !v.is_null());
        self
    }

    pub fn with_options(mut self, options: IndexMap<String, String>) -> Self {
        self.options = Some(options);
        self
    }

    /// Check a submitted value against the field type
    ///
    /// Float fields accept numeric strings. Select fields only accept
    /// listed values.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match (self.field_type, value) {
            (FieldType::String, Value::String(_)) => Some(value.clone()),
            (FieldType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => {
                Some(value.clone())
            }
            (FieldType::Float, Value::Number(n)) => n.as_f64().map(Value::from),
            (FieldType::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::from),
            (FieldType::Select, Value::String(s)) if self.allows(s) => Some(value.clone()),
            (FieldType::MultiSelect, Value::Array(items))
                if items
                    .iter()
                    .all(|item| item.as_str().is_some_and(|s| self.allows(s))) =>
            {
                Some(value.clone())
            }
            _ => None,
        }
    }

    fn allows(&self, choice: &str) -> bool {
        self.options
            .as_ref()
            .map_or(true, |options| options.contains_key(choice))
    }
}

/// Field error code for a value that does not fit its field
pub const ERROR_INVALID: &str = "invalid";

/// Field error code for a missing required value
pub const ERROR_REQUIRED: &str = "required";

/// Check user input against a form schema
///
/// Missing fields take their default. Keys outside the schema pass through
/// unchanged. On failure returns field name -> error code.
pub fn validate_input(
    schema: &[FormField],
    input: &FlowInput,
) -> Result<FlowInput, HashMap<String, String>> {
    let mut data = input.clone();
    let mut errors = HashMap::new();

    for field in schema {
        match input.get(&field.name).filter(|v| !v.is_null()) {
            Some(value) => match field.coerce(value) {
                Some(value) => {
                    data.insert(field.name.clone(), value);
                }
                None => {
                    errors.insert(field.name.clone(), ERROR_INVALID.to_string());
                }
            },
            None => match &field.default {
                Some(default) => {
                    data.insert(field.name.clone(), default.clone());
                }
                None if field.required => {
                    errors.insert(field.name.clone(), ERROR_REQUIRED.to_string());
                }
                None => {}
            },
        }
    }

    if errors.is_empty() {
        Ok(data)
    } else {
        Err(errors)
    }
}

/// Outcome of a flow step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    /// Show a form and wait for input
    Form {
        step_id: String,
        data_schema: Vec<FormField>,
        errors: HashMap<String, String>,
        description_placeholders: HashMap<String, String>,
    },
    /// Finish the flow and store `data`
    CreateEntry {
        title: String,
        data: FlowInput,
        #[serde(skip_serializing_if = "Option::is_none")]
        unique_id: Option<String>,
    },
    /// Finish the flow without storing anything
    Abort { reason: String },
}

impl FlowResult {
    pub fn form(step_id: impl Into<String>, data_schema: Vec<FormField>) -> Self {
        FlowResult::Form {
            step_id: step_id.into(),
            data_schema,
            errors: HashMap::new(),
            description_placeholders: HashMap::new(),
        }
    }

    pub fn abort(reason: impl Into<String>) -> Self {
        FlowResult::Abort {
            reason: reason.into(),
        }
    }

    /// Attach a `base` error to a form result
    pub fn with_error(mut self, code: impl Into<String>) -> Self {
        if let FlowResult::Form { ref mut errors, .. } = self {
            errors.insert("base".to_string(), code.into());
        }
        self
    }

    /// Attach per-field errors to a form result
    pub fn with_field_errors(mut self, field_errors: HashMap<String, String>) -> Self {
        if let FlowResult::Form { ref mut errors, .. } = self {
            errors.extend(field_errors);
        }
        self
    }

    pub fn with_placeholders(mut self, placeholders: HashMap<String, String>) -> Self {
        if let FlowResult::Form {
            ref mut description_placeholders,
            ..
        } = self
        {
            *description_placeholders = placeholders;
        }
        self
    }

    /// Form error code under `base`, if any
    pub fn base_error(&self) -> Option<&str> {
        self.field_error("base")
    }

    pub fn field_error(&self, field: &str) -> Option<&str> {
        match self {
            FlowResult::Form { errors, .. } => errors.get(field).map(String::as_str),
            _ => None,
        }
    }
}

/// A multi-step flow handler
#[async_trait]
pub trait ConfigFlow: Send + Sync {
    /// First step run when the flow starts
    fn init_step(&self) -> &'static str {
        "user"
    }

    async fn step(
        &mut self,
        hass: &HomeAssistant,
        step_id: &str,
        user_input: Option<FlowInput>,
    ) -> FlowManagerResult<FlowResult>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FlowKind {
    Config,
    Options { entry_id: String },
}

struct ActiveFlow {
    handler: String,
    kind: FlowKind,
    step_id: String,
    flow: Box<dyn ConfigFlow>,
}

/// Result of a flow step as seen by the caller
#[derive(Debug, Clone, Serialize)]
pub struct FlowResponse {
    pub flow_id: String,
    pub handler: String,
    #[serde(flatten)]
    pub result: FlowResult,
    /// Entry created or updated when the flow finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
}

/// Summary of an in-progress flow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowSummary {
    pub flow_id: String,
    pub handler: String,
    pub step_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
}

/// Keeps in-progress flows between steps
#[derive(Default)]
pub struct FlowManager {
    flows: DashMap<String, ActiveFlow>,
}

impl FlowManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a config flow for a domain
    pub async fn start_flow(
        &self,
        hass: &HomeAssistant,
        domain: &str,
    ) -> FlowManagerResult<FlowResponse> {
        let integration = hass
            .config_entries
            .integration(domain)
            .ok_or_else(|| FlowError::UnknownHandler(domain.to_string()))?;
        let flow = integration
            .config_flow(hass)
            .ok_or_else(|| FlowError::NoConfigFlow(domain.to_string()))?;

        self.run(hass, domain.to_string(), FlowKind::Config, flow)
            .await
    }

    /// Start an options flow for an existing entry
    pub async fn start_options_flow(
        &self,
        hass: &HomeAssistant,
        entry_id: &str,
    ) -> FlowManagerResult<FlowResponse> {
        let entry = hass
            .config_entries
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        let integration = hass
            .config_entries
            .integration(&entry.domain)
            .ok_or_else(|| FlowError::UnknownHandler(entry.domain.clone()))?;
        let flow = integration
            .options_flow(hass, &entry)
            .ok_or_else(|| FlowError::NoOptionsFlow(entry.domain.clone()))?;

        let kind = FlowKind::Options {
            entry_id: entry.entry_id.clone(),
        };
        self.run(hass, entry.domain, kind, flow).await
    }

    /// Submit input to the current step of a flow
    pub async fn progress_flow(
        &self,
        hass: &HomeAssistant,
        flow_id: &str,
        user_input: FlowInput,
    ) -> FlowManagerResult<FlowResponse> {
        let (flow_id, active) = self
            .flows
            .remove(flow_id)
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;
        let ActiveFlow {
            handler,
            kind,
            step_id,
            flow,
        } = active;

        self.run_step(hass, flow_id, handler, kind, flow, step_id, Some(user_input))
            .await
    }

    /// Drop an in-progress flow
    pub fn abort_flow(&self, flow_id: &str) -> FlowManagerResult<()> {
        self.flows
            .remove(flow_id)
            .map(|_| debug!("Aborted flow {}", flow_id))
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))
    }

    pub fn list_flows(&self) -> Vec<FlowSummary> {
        let mut flows: Vec<FlowSummary> = self
            .flows
            .iter()
            .map(|r| FlowSummary {
                flow_id: r.key().clone(),
                handler: r.handler.clone(),
                step_id: r.step_id.clone(),
                entry_id: match &r.kind {
                    FlowKind::Options { entry_id } => Some(entry_id.clone()),
                    FlowKind::Config => None,
                },
            })
            .collect();
        flows.sort_by(|a, b| a.flow_id.cmp(&b.flow_id));
        flows
    }

    async fn run(
        &self,
        hass: &HomeAssistant,
        handler: String,
        kind: FlowKind,
        flow: Box<dyn ConfigFlow>,
    ) -> FlowManagerResult<FlowResponse> {
        let flow_id = ulid::Ulid::new().to_string();
        let step_id = flow.init_step().to_string();
        debug!("Starting {:?} flow {} for {}", kind, flow_id, handler);
        self.run_step(hass, flow_id, handler, kind, flow, step_id, None)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_step(
        &self,
        hass: &HomeAssistant,
        flow_id: String,
        handler: String,
        kind: FlowKind,
        mut flow: Box<dyn ConfigFlow>,
        step_id: String,
        user_input: Option<FlowInput>,
    ) -> FlowManagerResult<FlowResponse> {
        let result = flow.step(hass, &step_id, user_input).await?;

        let entry_id = match &result {
            FlowResult::Form { step_id, .. } => {
                self.flows.insert(
                    flow_id.clone(),
                    ActiveFlow {
                        handler: handler.clone(),
                        kind,
                        step_id: step_id.clone(),
                        flow,
                    },
                );
                None
            }
            FlowResult::CreateEntry {
                title,
                data,
                unique_id,
            } => match kind {
                FlowKind::Config => {
                    let mut entry = ConfigEntry::new(&handler, title)
                        .with_data(data.clone())
                        .with_source(ConfigEntrySource::User);
                    if let Some(unique_id) = unique_id {
                        entry = entry.with_unique_id(unique_id);
                    }

                    let entry = match hass.config_entries.add(entry).await {
                        Ok(entry) => entry,
                        Err(ConfigEntriesError::AlreadyExists { .. }) => {
                            return Ok(FlowResponse {
                                flow_id,
                                handler,
                                result: FlowResult::abort("already_configured"),
                                entry_id: None,
                            });
                        }
                        Err(err) => return Err(err.into()),
                    };
                    info!("Flow {} created entry {}", flow_id, entry.entry_id);

                    if let Err(err) = hass.config_entries.setup(hass, &entry.entry_id).await {
                        warn!("Entry {} created but setup failed: {}", entry.entry_id, err);
                    }
                    Some(entry.entry_id)
                }
                FlowKind::Options { entry_id } => {
                    let update = ConfigEntryUpdate::new().data(data.clone());
                    hass.config_entries.update(hass, &entry_id, update).await?;
                    info!("Flow {} updated entry {}", flow_id, entry_id);
                    Some(entry_id)
                }
            },
            FlowResult::Abort { reason } => {
                debug!("Flow {} aborted: {}", flow_id, reason);
                None
            }
        };

        Ok(FlowResponse {
            flow_id,
            handler,
            result,
            entry_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::Integration;
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Asks for a name, then creates an entry keyed by it
    struct NameFlow {
        init: &'static str,
    }

    #[async_trait]
    impl ConfigFlow for NameFlow {
        fn init_step(&self) -> &'static str {
            self.init
        }

        async fn step(
            &mut self,
            _hass: &HomeAssistant,
            step_id: &str,
            user_input: Option<FlowInput>,
        ) -> FlowManagerResult<FlowResult> {
            match (step_id, user_input) {
                ("user" | "init", None) => Ok(FlowResult::form(
                    "name",
                    vec![FormField::required("name", FieldType::String)],
                )),
                ("name", Some(input)) => {
                    let Some(name) = input.get("name").and_then(Value::as_str) else {
                        return Ok(FlowResult::form("name", vec![]).with_error("name_missing"));
                    };
                    Ok(FlowResult::CreateEntry {
                        title: name.to_string(),
                        data: input.clone(),
                        unique_id: Some(name.to_lowercase()),
                    })
                }
                (other, _) => Err(FlowError::UnknownStep(other.to_string())),
            }
        }
    }

    struct Named;

    #[async_trait]
    impl Integration for Named {
        fn domain(&self) -> &str {
            "named"
        }

        async fn setup_entry(
            &self,
            _hass: &HomeAssistant,
            _entry: &ConfigEntry,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn unload_entry(
            &self,
            _hass: &HomeAssistant,
            _entry: &ConfigEntry,
        ) -> anyhow::Result<bool> {
            Ok(true)
        }

        fn config_flow(&self, _hass: &HomeAssistant) -> Option<Box<dyn ConfigFlow>> {
            Some(Box::new(NameFlow { init: "user" }))
        }

        fn options_flow(
            &self,
            _hass: &HomeAssistant,
            _entry: &ConfigEntry,
        ) -> Option<Box<dyn ConfigFlow>> {
            Some(Box::new(NameFlow { init: "init" }))
        }
    }

    fn create_test_hass() -> (TempDir, HomeAssistant) {
        let temp_dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(temp_dir.path());
        hass.config_entries.register_integration(Arc::new(Named));
        (temp_dir, hass)
    }

    fn input(name: &str) -> FlowInput {
        HashMap::from([("name".to_string(), json!(name))])
    }

    #[tokio::test]
    async fn test_config_flow_creates_and_sets_up_entry() {
        let (_dir, hass) = create_test_hass();

        let started = hass.flows.start_flow(&hass, "named").await.unwrap();
        assert!(matches!(started.result, FlowResult::Form { ref step_id, .. } if step_id == "name"));
        assert_eq!(hass.flows.list_flows().len(), 1);

        let done = hass
            .flows
            .progress_flow(&hass, &started.flow_id, input("Kitchen"))
            .await
            .unwrap();

        let entry_id = done.entry_id.unwrap();
        let entry = hass.config_entries.get(&entry_id).unwrap();
        assert_eq!(entry.title, "Kitchen");
        assert_eq!(entry.unique_id.as_deref(), Some("kitchen"));
        assert!(entry.is_loaded());
        assert!(hass.flows.list_flows().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_unique_id_aborts() {
        let (_dir, hass) = create_test_hass();

        for expected in [None, Some("already_configured")] {
            let started = hass.flows.start_flow(&hass, "named").await.unwrap();
            let done = hass
                .flows
                .progress_flow(&hass, &started.flow_id, input("Kitchen"))
                .await
                .unwrap();
            match expected {
                None => assert!(done.entry_id.is_some()),
                Some(reason) => assert_eq!(done.result, FlowResult::abort(reason)),
            }
        }
        assert_eq!(hass.config_entries.len(), 1);
    }

    #[tokio::test]
    async fn test_form_error_keeps_flow() {
        let (_dir, hass) = create_test_hass();

        let started = hass.flows.start_flow(&hass, "named").await.unwrap();
        let retry = hass
            .flows
            .progress_flow(&hass, &started.flow_id, FlowInput::new())
            .await
            .unwrap();

        assert_eq!(retry.result.base_error(), Some("name_missing"));
        assert_eq!(retry.flow_id, started.flow_id);
        assert_eq!(hass.flows.list_flows().len(), 1);

        hass.flows.abort_flow(&started.flow_id).unwrap();
        assert!(hass.flows.list_flows().is_empty());
        assert!(matches!(
            hass.flows.abort_flow(&started.flow_id),
            Err(FlowError::UnknownFlow(_))
        ));
    }

    #[tokio::test]
    async fn test_options_flow_updates_entry_in_place() {
        let (_dir, hass) = create_test_hass();

        let started = hass.flows.start_flow(&hass, "named").await.unwrap();
        let created = hass
            .flows
            .progress_flow(&hass, &started.flow_id, input("Kitchen"))
            .await
            .unwrap();
        let entry_id = created.entry_id.unwrap();

        let notified = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&notified);
        hass.config_entries.add_update_listener(
            &entry_id,
            Arc::new(move |_: HomeAssistant, _: ConfigEntry| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
                .boxed()
            }),
        );

        let options = hass.flows.start_options_flow(&hass, &entry_id).await.unwrap();
        let done = hass
            .flows
            .progress_flow(&hass, &options.flow_id, input("Pantry"))
            .await
            .unwrap();

        assert_eq!(done.entry_id.as_deref(), Some(entry_id.as_str()));
        assert_eq!(hass.config_entries.len(), 1);
        let entry = hass.config_entries.get(&entry_id).unwrap();
        assert_eq!(entry.data["name"], json!("Pantry"));
        assert_eq!(entry.title, "Kitchen");
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_handler() {
        let (_dir, hass) = create_test_hass();
        assert!(matches!(
            hass.flows.start_flow(&hass, "hue").await,
            Err(FlowError::UnknownHandler(_))
        ));
    }

    fn schema() -> Vec<FormField> {
        vec![
            FormField::required("port", FieldType::Integer).with_default(7000),
            FormField::required("step", FieldType::Float),
            FormField::optional("sensor", FieldType::Select).with_options(IndexMap::from([(
                "sensor.hall".to_string(),
                "Hall".to_string(),
            )])),
            FormField::optional("modes", FieldType::MultiSelect).with_options(IndexMap::from([
                ("cool".to_string(), "Cool".to_string()),
                ("heat".to_string(), "Heat".to_string()),
            ])),
        ]
    }

    fn data(value: Value) -> FlowInput {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_validate_input_coerces_and_fills_defaults() {
        let valid = validate_input(
            &schema(),
            &data(json!({"step": "0.5", "sensor": "sensor.hall", "modes": ["heat"], "extra": 1})),
        )
        .unwrap();

        assert_eq!(valid["port"], json!(7000));
        assert_eq!(valid["step"], json!(0.5));
        assert_eq!(valid["modes"], json!(["heat"]));
        assert_eq!(valid["extra"], json!(1));

        let valid = validate_input(&schema(), &data(json!({"step": 1}))).unwrap();
        assert_eq!(valid["step"], json!(1.0));
    }

    #[test]
    fn test_validate_input_reports_field_errors() {
        let errors = validate_input(
            &schema(),
            &data(json!({
                "port": "7000",
                "step": "half",
                "sensor": "sensor.attic",
                "modes": ["cool", "dry"],
            })),
        )
        .unwrap_err();

        assert_eq!(errors.len(), 4);
        for field in ["port", "step", "sensor", "modes"] {
            assert_eq!(errors[field], ERROR_INVALID, "field {field}");
        }

        let errors = validate_input(&schema(), &data(json!({"port": 7000.5}))).unwrap_err();
        assert_eq!(errors["port"], ERROR_INVALID);
        assert_eq!(errors["step"], ERROR_REQUIRED);
    }

    #[test]
    fn test_field_errors_on_form() {
        let form = FlowResult::form("name", vec![])
            .with_error("device_not_found")
            .with_field_errors(HashMap::from([("uid".to_string(), "invalid".to_string())]));

        assert_eq!(form.base_error(), Some("device_not_found"));
        assert_eq!(form.field_error("uid"), Some("invalid"));
        assert_eq!(FlowResult::abort("x").field_error("uid"), None);
    }

    #[test]
    fn test_form_field_serialization() {
        let field = FormField::required("port", FieldType::Integer).with_default(7000);
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(
            json,
            json!({"name": "port", "type": "integer", "required": true, "default": 7000})
        );
    }
}
