//! Config flow (onboarding) and options flow (reconfiguration)

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ha_config_entries::{
    validate_input, ConfigEntry, ConfigFlow, FieldType, FlowError, FlowInput, FlowManagerResult,
    FlowResult, FormField, HomeAssistant,
};
use ha_core::Platform;
use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::config::{GreeConfig, DEFAULT_PORT, DEFAULT_TARGET_TEMP_STEP, DEFAULT_TIMEOUT};
use crate::device::DeviceParams;
use crate::error::GreeResult;
use crate::feature::{DEFAULT_FEATURES, FEATURES};
use crate::hub::DeviceHub;
use crate::identity::DeviceIdentity;
use crate::modes::{fan_mode_labels, hvac_mode_labels, DEFAULT_HVAC_MODES, FAN_MODES};
use crate::validation::check_input;
use crate::DOMAIN;

pub const STEP_USER: &str = "user";
pub const STEP_INIT: &str = "init";
pub const STEP_INFO: &str = "info";

pub const ERROR_DEVICE_NOT_FOUND: &str = "device_not_found";
pub const ABORT_ALREADY_CONFIGURED: &str = "already_configured";

/// Sensor entities for the temperature sensor select
///
/// Keyed by entity id, labelled `"<friendly name> (<entity id>)"`, sorted
/// by entity id.
pub fn sensor_choices(hass: &HomeAssistant) -> IndexMap<String, String> {
    let mut states = hass.states.domain_states(Platform::Sensor.as_str());
    states.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
    states
        .iter()
        .map(|state| {
            (
                state.entity_id.to_string(),
                format!("{} ({})", state.friendly_name(), state.entity_id),
            )
        })
        .collect()
}

fn feature_labels() -> IndexMap<String, String> {
    FEATURES
        .iter()
        .map(|f| (f.as_str().to_string(), f.label().to_string()))
        .collect()
}

/// Form fields, defaulted from `input`; the options form omits the
/// connection fields
pub fn data_schema(hass: &HomeAssistant, input: &FlowInput, options: bool) -> Vec<FormField> {
    let current = |key: &str| input.get(key).cloned();
    let or = |key: &str, default: Value| current(key).filter(|v| !v.is_null()).unwrap_or(default);

    let mut schema = Vec::new();
    if !options {
        schema.extend([
            FormField::required("host", FieldType::String).with_default_opt(current("host")),
            FormField::required("port", FieldType::Integer).with_default(or("port", json!(DEFAULT_PORT))),
            FormField::required("mac_addr", FieldType::String).with_default_opt(current("mac_addr")),
        ]);
    }

    schema.extend([
        FormField::optional("name", FieldType::String).with_default_opt(current("name")),
        FormField::required("temp_step", FieldType::Float)
            .with_default(or("temp_step", json!(DEFAULT_TARGET_TEMP_STEP))),
        FormField::optional("temp_sensor", FieldType::Select)
            .with_options(sensor_choices(hass))
            .with_default_opt(current("temp_sensor")),
        FormField::optional("function", FieldType::MultiSelect)
            .with_options(feature_labels())
            .with_default(or("function", json!(DEFAULT_FEATURES))),
        FormField::optional("hvac_modes", FieldType::MultiSelect)
            .with_options(hvac_mode_labels())
            .with_default(or("hvac_modes", json!(DEFAULT_HVAC_MODES))),
        FormField::optional("fan_modes", FieldType::MultiSelect)
            .with_options(fan_mode_labels())
            .with_default(or("fan_modes", json!(FAN_MODES))),
        FormField::optional("encryption_key", FieldType::String)
            .with_default_opt(current("encryption_key")),
        FormField::optional("uid", FieldType::Integer).with_default_opt(current("uid")),
        FormField::required("timeout", FieldType::Integer)
            .with_default(or("timeout", json!(DEFAULT_TIMEOUT))),
    ]);
    schema
}

/// Form errors keyed by field
type FormErrors = HashMap<String, String>;

fn base(code: &str) -> FormErrors {
    HashMap::from([("base".to_string(), code.to_string())])
}

async fn connect(hub: &DeviceHub, data: &FlowInput) -> GreeResult<DeviceIdentity> {
    let config = GreeConfig::from_data(data)?;
    hub.probe(&DeviceParams::from_config(&config)).await?;
    Ok(config.identity())
}

/// Parse the data and try to reach the device
async fn reach_device(hub: &DeviceHub, data: &FlowInput) -> Result<DeviceIdentity, FormErrors> {
    connect(hub, data).await.map_err(|err| {
        error!("Gree device not reachable: {}", err);
        base(ERROR_DEVICE_NOT_FOUND)
    })
}

fn display(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(value) => value.to_string(),
        None => String::new(),
    }
}

// =============================================================================
// Config flow
// =============================================================================

pub struct GreeConfigFlow {
    hub: Arc<DeviceHub>,
}

impl GreeConfigFlow {
    pub fn new(hub: Arc<DeviceHub>) -> Self {
        Self { hub }
    }

    /// Entry for a complete submission, or the form errors
    async fn submit(
        &self,
        hass: &HomeAssistant,
        input: &FlowInput,
    ) -> Result<FlowResult, FormErrors> {
        let data = validate_input(&data_schema(hass, input, false), input)?;
        check_input(&data).map_err(|err| base(err.code()))?;
        let identity = reach_device(&self.hub, &data).await?;

        let unique_id = identity.mac().to_string();
        if hass
            .config_entries
            .get_by_unique_id(DOMAIN, &unique_id)
            .is_some()
        {
            debug!("Device {} is already configured", unique_id);
            return Ok(FlowResult::abort(ABORT_ALREADY_CONFIGURED));
        }
        Ok(FlowResult::CreateEntry {
            title: identity.name().to_string(),
            data,
            unique_id: Some(unique_id),
        })
    }

    async fn step_info(
        &self,
        hass: &HomeAssistant,
        user_input: Option<FlowInput>,
    ) -> FlowManagerResult<FlowResult> {
        let input = user_input.unwrap_or_default();
        let mut errors = FormErrors::new();

        if input.contains_key("host") && input.contains_key("port") {
            match self.submit(hass, &input).await {
                Ok(result) => return Ok(result),
                Err(form_errors) => errors = form_errors,
            }
        }

        Ok(FlowResult::form(STEP_INFO, data_schema(hass, &input, false))
            .with_field_errors(errors))
    }
}

#[async_trait]
impl ConfigFlow for GreeConfigFlow {
    fn init_step(&self) -> &'static str {
        STEP_USER
    }

    async fn step(
        &mut self,
        hass: &HomeAssistant,
        step_id: &str,
        user_input: Option<FlowInput>,
    ) -> FlowManagerResult<FlowResult> {
        match step_id {
            STEP_USER => self.step_info(hass, None).await,
            STEP_INFO => self.step_info(hass, user_input).await,
            other => Err(FlowError::UnknownStep(other.to_string())),
        }
    }
}

// =============================================================================
// Options flow
// =============================================================================

pub struct GreeOptionsFlow {
    hub: Arc<DeviceHub>,
    entry: ConfigEntry,
}

impl GreeOptionsFlow {
    pub fn new(hub: Arc<DeviceHub>, entry: ConfigEntry) -> Self {
        Self { hub, entry }
    }

    /// Updated data for a submission, connection fields kept from the entry
    async fn submit(
        &self,
        hass: &HomeAssistant,
        input: &FlowInput,
    ) -> Result<FlowResult, FormErrors> {
        let mut data = validate_input(&data_schema(hass, input, true), input)?;
        for key in ["host", "port", "mac_addr"] {
            if let Some(value) = self.entry.data.get(key) {
                data.insert(key.to_string(), value.clone());
            }
        }
        let identity = reach_device(&self.hub, &data).await?;

        Ok(FlowResult::CreateEntry {
            title: identity.name().to_string(),
            data,
            unique_id: None,
        })
    }

    /// Input without `host` is a submission
    async fn step_info(
        &self,
        hass: &HomeAssistant,
        user_input: Option<FlowInput>,
    ) -> FlowManagerResult<FlowResult> {
        let data = &self.entry.data;
        let input = user_input.unwrap_or_default();
        let mut errors = FormErrors::new();

        if !input.contains_key("host") {
            match self.submit(hass, &input).await {
                Ok(result) => return Ok(result),
                Err(form_errors) => errors = form_errors,
            }
        }

        let placeholders = HashMap::from([
            (
                "ip".to_string(),
                format!("{}:{}", display(data.get("host")), display(data.get("port"))),
            ),
            ("mac".to_string(), display(data.get("mac_addr"))),
        ]);
        Ok(FlowResult::form(STEP_INFO, data_schema(hass, &input, true))
            .with_placeholders(placeholders)
            .with_field_errors(errors))
    }
}

#[async_trait]
impl ConfigFlow for GreeOptionsFlow {
    fn init_step(&self) -> &'static str {
        STEP_INIT
    }

    async fn step(
        &mut self,
        hass: &HomeAssistant,
        step_id: &str,
        user_input: Option<FlowInput>,
    ) -> FlowManagerResult<FlowResult> {
        match step_id {
            STEP_INIT => {
                let current = self.entry.data.clone();
                self.step_info(hass, Some(current)).await
            }
            STEP_INFO => self.step_info(hass, user_input).await,
            other => Err(FlowError::UnknownStep(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::FakeConnector;
    use ha_core::{Context, EntityId};
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn setup() -> (TempDir, HomeAssistant, Arc<FakeConnector>, Arc<DeviceHub>) {
        let temp_dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(temp_dir.path());
        let connector = Arc::new(FakeConnector::default());
        let hub = Arc::new(DeviceHub::new(connector.clone()));
        (temp_dir, hass, connector, hub)
    }

    fn user_input() -> FlowInput {
        serde_json::from_value(json!({
            "host": "192.168.1.20",
            "port": 7000,
            "mac_addr": "AA:BB:CC:DD:EE:FF",
            "name": "Bedroom",
        }))
        .unwrap()
    }

    fn field<'a>(result: &'a FlowResult, name: &str) -> Option<&'a FormField> {
        match result {
            FlowResult::Form { data_schema, .. } => data_schema.iter().find(|f| f.name == name),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_user_step_shows_form() {
        let (_dir, hass, _connector, hub) = setup();
        let mut flow = GreeConfigFlow::new(hub);

        let result = flow.step(&hass, STEP_USER, None).await.unwrap();

        assert!(matches!(result, FlowResult::Form { ref step_id, .. } if step_id == STEP_INFO));
        assert_eq!(result.base_error(), None);
        assert_eq!(field(&result, "port").unwrap().default, Some(json!(7000)));
        assert_eq!(
            field(&result, "function").unwrap().default,
            Some(json!(["lights", "health", "sleep"]))
        );
        assert_eq!(field(&result, "timeout").unwrap().default, Some(json!(10)));
    }

    #[tokio::test]
    async fn test_validation_error_keeps_input() {
        let (_dir, hass, connector, hub) = setup();
        let mut flow = GreeConfigFlow::new(hub);

        let mut input = user_input();
        input.insert("host".to_string(), json!("256.1.1.1"));
        let result = flow.step(&hass, STEP_INFO, Some(input)).await.unwrap();

        assert_eq!(result.base_error(), Some("ip_format_error"));
        assert_eq!(field(&result, "host").unwrap().default, Some(json!("256.1.1.1")));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_entry() {
        let (_dir, hass, _connector, hub) = setup();
        let mut flow = GreeConfigFlow::new(hub.clone());

        let result = flow.step(&hass, STEP_INFO, Some(user_input())).await.unwrap();

        match result {
            FlowResult::CreateEntry {
                title,
                data,
                unique_id,
            } => {
                assert_eq!(title, "Bedroom");
                assert_eq!(unique_id.as_deref(), Some("aabbccddeeff"));
                for (key, value) in user_input() {
                    assert_eq!(data[&key], value, "field {key}");
                }
                assert_eq!(data["temp_step"], json!(0.5));
                assert_eq!(data["timeout"], json!(10));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(hub.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_sensor_rejected() {
        let (_dir, hass, connector, hub) = setup();
        let mut flow = GreeConfigFlow::new(hub);

        let mut input = user_input();
        input.insert("temp_sensor".to_string(), json!("sensor.does_not_exist"));
        let result = flow.step(&hass, STEP_INFO, Some(input)).await.unwrap();

        assert_eq!(result.field_error("temp_sensor"), Some("invalid"));
        assert_eq!(result.base_error(), None);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
        assert_eq!(
            field(&result, "temp_sensor").unwrap().default,
            Some(json!("sensor.does_not_exist"))
        );
    }

    #[tokio::test]
    async fn test_known_sensor_accepted() {
        let (_dir, hass, _connector, hub) = setup();
        hass.states.set(
            EntityId::new("sensor", "hall").unwrap(),
            "21",
            HashMap::new(),
            Context::new(),
        );
        let mut flow = GreeConfigFlow::new(hub);

        let mut input = user_input();
        input.insert("temp_sensor".to_string(), json!("sensor.hall"));
        let result = flow.step(&hass, STEP_INFO, Some(input)).await.unwrap();

        match result {
            FlowResult::CreateEntry { data, .. } => {
                assert_eq!(data["temp_sensor"], json!("sensor.hall"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mistyped_integer_fields_rejected() {
        let (_dir, hass, connector, hub) = setup();
        let mut flow = GreeConfigFlow::new(hub);

        let mut input = user_input();
        input.insert("uid".to_string(), json!("abc"));
        input.insert("timeout".to_string(), json!(2.5));
        let result = flow.step(&hass, STEP_INFO, Some(input)).await.unwrap();

        assert_eq!(result.field_error("uid"), Some("invalid"));
        assert_eq!(result.field_error("timeout"), Some("invalid"));
        assert_ne!(result.base_error(), Some(ERROR_DEVICE_NOT_FOUND));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);

        let mut input = user_input();
        input.insert("port".to_string(), json!("7000"));
        let result = flow.step(&hass, STEP_INFO, Some(input)).await.unwrap();
        assert_eq!(result.field_error("port"), Some("invalid"));
    }

    #[tokio::test]
    async fn test_temp_step_string_coerced() {
        let (_dir, hass, _connector, hub) = setup();
        let mut flow = GreeConfigFlow::new(hub);

        let mut input = user_input();
        input.insert("temp_step".to_string(), json!("0.5"));
        let result = flow.step(&hass, STEP_INFO, Some(input)).await.unwrap();

        match result {
            FlowResult::CreateEntry { data, .. } => assert_eq!(data["temp_step"], json!(0.5)),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_device() {
        let (_dir, hass, connector, hub) = setup();
        connector.unreachable.store(true, Ordering::SeqCst);
        let mut flow = GreeConfigFlow::new(hub);

        let result = flow.step(&hass, STEP_INFO, Some(user_input())).await.unwrap();
        assert_eq!(result.base_error(), Some(ERROR_DEVICE_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_already_configured() {
        let (_dir, hass, _connector, hub) = setup();
        hass.config_entries
            .add(ConfigEntry::new(DOMAIN, "Bedroom").with_unique_id("aabbccddeeff"))
            .await
            .unwrap();
        let mut flow = GreeConfigFlow::new(hub);

        let result = flow.step(&hass, STEP_INFO, Some(user_input())).await.unwrap();
        assert_eq!(result, FlowResult::abort(ABORT_ALREADY_CONFIGURED));
    }

    #[tokio::test]
    async fn test_sensor_choices_sorted_with_labels() {
        let (_dir, hass, _connector, _hub) = setup();
        hass.states.set(
            EntityId::new("sensor", "upstairs").unwrap(),
            "21",
            HashMap::from([("friendly_name".to_string(), json!("Upstairs"))]),
            Context::new(),
        );
        hass.states.set(
            EntityId::new("sensor", "attic").unwrap(),
            "30",
            HashMap::new(),
            Context::new(),
        );
        hass.states.set(
            EntityId::new("switch", "fan").unwrap(),
            "on",
            HashMap::new(),
            Context::new(),
        );

        let choices = sensor_choices(&hass);
        assert_eq!(
            choices.into_iter().collect::<Vec<_>>(),
            vec![
                (
                    "sensor.attic".to_string(),
                    "sensor.attic (sensor.attic)".to_string()
                ),
                (
                    "sensor.upstairs".to_string(),
                    "Upstairs (sensor.upstairs)".to_string()
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_options_flow_init_shows_form() {
        let (_dir, hass, connector, hub) = setup();
        let entry = ConfigEntry::new(DOMAIN, "Bedroom").with_data(user_input());
        let mut flow = GreeOptionsFlow::new(hub, entry);

        let result = flow.step(&hass, STEP_INIT, None).await.unwrap();

        match &result {
            FlowResult::Form {
                step_id,
                description_placeholders,
                ..
            } => {
                assert_eq!(step_id, STEP_INFO);
                assert_eq!(description_placeholders["ip"], "192.168.1.20:7000");
                assert_eq!(description_placeholders["mac"], "AA:BB:CC:DD:EE:FF");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(field(&result, "host").is_none());
        assert_eq!(field(&result, "name").unwrap().default, Some(json!("Bedroom")));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_options_flow_keeps_connection_fields() {
        let (_dir, hass, _connector, hub) = setup();
        let entry = ConfigEntry::new(DOMAIN, "Bedroom").with_data(user_input());
        let mut flow = GreeOptionsFlow::new(hub, entry);

        let submitted: FlowInput = serde_json::from_value(json!({
            "name": "Guest Room",
            "function": ["air"],
            "timeout": 5,
        }))
        .unwrap();
        let result = flow.step(&hass, STEP_INFO, Some(submitted)).await.unwrap();

        match result {
            FlowResult::CreateEntry {
                title,
                data,
                unique_id,
            } => {
                assert_eq!(title, "Guest Room");
                assert!(unique_id.is_none());
                assert_eq!(data["host"], json!("192.168.1.20"));
                assert_eq!(data["mac_addr"], json!("AA:BB:CC:DD:EE:FF"));
                assert_eq!(data["function"], json!(["air"]));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_options_flow_rejects_unknown_mode() {
        let (_dir, hass, connector, hub) = setup();
        let entry = ConfigEntry::new(DOMAIN, "Bedroom").with_data(user_input());
        let mut flow = GreeOptionsFlow::new(hub, entry);

        let submitted: FlowInput = serde_json::from_value(json!({
            "hvac_modes": ["cool", "turbo"],
            "temp_step": "1",
        }))
        .unwrap();
        let result = flow.step(&hass, STEP_INFO, Some(submitted)).await.unwrap();

        assert_eq!(result.field_error("hvac_modes"), Some("invalid"));
        assert_eq!(result.field_error("temp_step"), None);
        assert!(field(&result, "host").is_none());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_options_flow_unreachable_device() {
        let (_dir, hass, connector, hub) = setup();
        connector.unreachable.store(true, Ordering::SeqCst);
        let entry = ConfigEntry::new(DOMAIN, "Bedroom").with_data(user_input());
        let mut flow = GreeOptionsFlow::new(hub, entry);

        let result = flow
            .step(&hass, STEP_INFO, Some(FlowInput::new()))
            .await
            .unwrap();
        assert_eq!(result.base_error(), Some(ERROR_DEVICE_NOT_FOUND));
    }
}
