//! Shared harness for gree2 integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use ha_config_entries::{FlowInput, HomeAssistant};
use ha_gree2::{
    ClimateDevice, DeviceConnector, DeviceError, DeviceParams, FanMode, Gree2, HvacMode,
    StateDelta,
};
use serde_json::json;
use tempfile::TempDir;

/// Air conditioner kept in memory
pub struct MockDevice {
    options: DashMap<String, i64>,
    sent: Mutex<Vec<StateDelta>>,
    pub params: DeviceParams,
}

impl MockDevice {
    fn new(params: DeviceParams) -> Self {
        let options = DashMap::new();
        for (key, value) in [("Pow", 1), ("Mod", 0), ("SetTem", 25), ("WdSpd", 0)] {
            options.insert(key.to_string(), value);
        }
        Self {
            options,
            sent: Mutex::new(Vec::new()),
            params,
        }
    }

    pub fn sent(&self) -> Vec<StateDelta> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_option(&self, key: &str, value: i64) {
        self.options.insert(key.to_string(), value);
    }
}

#[async_trait]
impl ClimateDevice for MockDevice {
    fn option(&self, key: &str) -> Option<i64> {
        self.options.get(key).map(|v| *v)
    }

    async fn sync_state(&self, delta: &StateDelta) -> Result<(), DeviceError> {
        for (key, value) in delta {
            self.options.insert(key.clone(), *value);
        }
        self.sent.lock().unwrap().push(delta.clone());
        Ok(())
    }

    fn hvac_mode(&self) -> HvacMode {
        match (self.option("Pow"), self.option("Mod")) {
            (Some(0), _) => HvacMode::Off,
            (_, Some(1)) => HvacMode::Cool,
            (_, Some(4)) => HvacMode::Heat,
            _ => HvacMode::Auto,
        }
    }

    fn fan_mode(&self) -> Option<FanMode> {
        Some(FanMode::Auto)
    }

    fn target_temperature(&self) -> Option<f64> {
        self.option("SetTem").map(|t| t as f64)
    }

    fn current_temperature(&self) -> Option<f64> {
        None
    }

    async fn set_hvac_mode(&self, mode: HvacMode) -> Result<(), DeviceError> {
        let delta = match mode {
            HvacMode::Off => StateDelta::from([("Pow".to_string(), 0)]),
            HvacMode::Cool => StateDelta::from([("Pow".to_string(), 1), ("Mod".to_string(), 1)]),
            HvacMode::Heat => StateDelta::from([("Pow".to_string(), 1), ("Mod".to_string(), 4)]),
            _ => StateDelta::from([("Pow".to_string(), 1), ("Mod".to_string(), 0)]),
        };
        self.sync_state(&delta).await
    }

    async fn set_fan_mode(&self, _mode: FanMode) -> Result<(), DeviceError> {
        Ok(())
    }

    async fn set_temperature(&self, temperature: f64) -> Result<(), DeviceError> {
        self.sync_state(&StateDelta::from([(
            "SetTem".to_string(),
            temperature as i64,
        )]))
        .await
    }

    async fn update(&self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// Connector that can be switched offline
#[derive(Default)]
pub struct MockConnector {
    pub offline: AtomicBool,
    pub connects: AtomicUsize,
    devices: DashMap<String, Arc<MockDevice>>,
}

impl MockConnector {
    pub fn device(&self, mac: &str) -> Arc<MockDevice> {
        self.devices
            .get(mac)
            .map(|d| Arc::clone(&d))
            .expect("device was never connected")
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceConnector for MockConnector {
    async fn connect(&self, params: &DeviceParams) -> Result<Arc<dyn ClimateDevice>, DeviceError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(DeviceError::Unreachable {
                host: params.host.clone(),
                port: params.port,
            });
        }
        let device = Arc::new(MockDevice::new(params.clone()));
        self.devices.insert(params.mac.clone(), Arc::clone(&device));
        Ok(device)
    }
}

/// A host with gree2 registered, rooted in a temp dir
pub struct TestHass {
    pub hass: HomeAssistant,
    pub gree: Arc<Gree2>,
    pub connector: Arc<MockConnector>,
    _dir: TempDir,
}

impl TestHass {
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("ha_gree2=debug,ha_config_entries=debug")
            .try_init();

        let dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(dir.path());
        let connector = Arc::new(MockConnector::default());
        let gree = Gree2::new(connector.clone());
        gree.register(&hass);

        Self {
            hass,
            gree,
            connector,
            _dir: dir,
        }
    }
}

/// Form input for the device at 192.168.1.20
pub fn device_input() -> FlowInput {
    serde_json::from_value(json!({
        "host": "192.168.1.20",
        "port": 7000,
        "mac_addr": "AA:BB:CC:DD:EE:FF",
        "temp_step": 1,
        "function": ["lights", "sleep"],
        "hvac_modes": ["cool", "heat"],
        "timeout": 10,
    }))
    .unwrap()
}
