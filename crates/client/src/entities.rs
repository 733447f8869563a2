//! Entity model: catalog descriptors, state updates, log entries, and the
//! option-bearing command types.

use std::time::Duration;

use esphome_proto::messages::{
    ApiMessage, CoverCommandRequest, FanCommandRequest, LightCommandRequest, LogLevel,
};

/// One entity from the device catalog, keyed by its stable numeric key.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    /// Stable numeric key used in state updates and commands.
    pub key: u32,
    /// Object identifier (stable, machine-oriented).
    pub object_id: String,
    /// Display name.
    pub name: String,
    /// Unique identifier, when the device reports one.
    pub unique_id: String,
    /// Kind-specific metadata.
    pub kind: EntityKind,
}

/// Kind-specific entity metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    BinarySensor {
        device_class: String,
        is_status: bool,
    },
    Cover {
        device_class: String,
        assumed_state: bool,
        supports_position: bool,
        supports_tilt: bool,
        supports_stop: bool,
    },
    Fan {
        supports_oscillation: bool,
        supports_speed: bool,
        supports_direction: bool,
        supported_speed_count: i32,
        supported_preset_modes: Vec<String>,
    },
    Light {
        effects: Vec<String>,
        supported_color_modes: Vec<i32>,
        min_mireds: f32,
        max_mireds: f32,
    },
    Sensor {
        unit_of_measurement: String,
        accuracy_decimals: i32,
        device_class: String,
        state_class: i32,
        force_update: bool,
    },
    Switch {
        device_class: String,
        assumed_state: bool,
    },
    TextSensor {
        device_class: String,
    },
}

impl EntityInfo {
    /// The category tag for this entity.
    pub fn category(&self) -> &'static str {
        match self.kind {
            EntityKind::BinarySensor { .. } => "binary_sensor",
            EntityKind::Cover { .. } => "cover",
            EntityKind::Fan { .. } => "fan",
            EntityKind::Light { .. } => "light",
            EntityKind::Sensor { .. } => "sensor",
            EntityKind::Switch { .. } => "switch",
            EntityKind::TextSensor { .. } => "text_sensor",
        }
    }

    /// Build a descriptor from a catalog-enumeration message, if it is one.
    pub(crate) fn from_message(msg: &ApiMessage) -> Option<EntityInfo> {
        Some(match msg {
            ApiMessage::ListEntitiesBinarySensorResponse(m) => EntityInfo {
                key: m.key,
                object_id: m.object_id.clone(),
                name: m.name.clone(),
                unique_id: m.unique_id.clone(),
                kind: EntityKind::BinarySensor {
                    device_class: m.device_class.clone(),
                    is_status: m.is_status_binary_sensor,
                },
            },
            ApiMessage::ListEntitiesCoverResponse(m) => EntityInfo {
                key: m.key,
                object_id: m.object_id.clone(),
                name: m.name.clone(),
                unique_id: m.unique_id.clone(),
                kind: EntityKind::Cover {
                    device_class: m.device_class.clone(),
                    assumed_state: m.assumed_state,
                    supports_position: m.supports_position,
                    supports_tilt: m.supports_tilt,
                    supports_stop: m.supports_stop,
                },
            },
            ApiMessage::ListEntitiesFanResponse(m) => EntityInfo {
                key: m.key,
                object_id: m.object_id.clone(),
                name: m.name.clone(),
                unique_id: m.unique_id.clone(),
                kind: EntityKind::Fan {
                    supports_oscillation: m.supports_oscillation,
                    supports_speed: m.supports_speed,
                    supports_direction: m.supports_direction,
                    supported_speed_count: m.supported_speed_count,
                    supported_preset_modes: m.supported_preset_modes.clone(),
                },
            },
            ApiMessage::ListEntitiesLightResponse(m) => EntityInfo {
                key: m.key,
                object_id: m.object_id.clone(),
                name: m.name.clone(),
                unique_id: m.unique_id.clone(),
                kind: EntityKind::Light {
                    effects: m.effects.clone(),
                    supported_color_modes: m.supported_color_modes.clone(),
                    min_mireds: m.min_mireds,
                    max_mireds: m.max_mireds,
                },
            },
            ApiMessage::ListEntitiesSensorResponse(m) => EntityInfo {
                key: m.key,
                object_id: m.object_id.clone(),
                name: m.name.clone(),
                unique_id: m.unique_id.clone(),
                kind: EntityKind::Sensor {
                    unit_of_measurement: m.unit_of_measurement.clone(),
                    accuracy_decimals: m.accuracy_decimals,
                    device_class: m.device_class.clone(),
                    state_class: m.state_class,
                    force_update: m.force_update,
                },
            },
            ApiMessage::ListEntitiesSwitchResponse(m) => EntityInfo {
                key: m.key,
                object_id: m.object_id.clone(),
                name: m.name.clone(),
                unique_id: m.unique_id.clone(),
                kind: EntityKind::Switch {
                    device_class: m.device_class.clone(),
                    assumed_state: m.assumed_state,
                },
            },
            ApiMessage::ListEntitiesTextSensorResponse(m) => EntityInfo {
                key: m.key,
                object_id: m.object_id.clone(),
                name: m.name.clone(),
                unique_id: m.unique_id.clone(),
                kind: EntityKind::TextSensor {
                    device_class: m.device_class.clone(),
                },
            },
            _ => return None,
        })
    }
}

/// One state update from the subscription stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    BinarySensor(BinarySensorState),
    Cover(CoverState),
    Fan(FanState),
    Light(LightState),
    Sensor(SensorState),
    Switch(SwitchState),
    TextSensor(TextSensorState),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinarySensorState {
    pub key: u32,
    pub state: bool,
    pub missing_state: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverState {
    pub key: u32,
    pub position: f32,
    pub tilt: f32,
    pub current_operation: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FanState {
    pub key: u32,
    pub state: bool,
    pub oscillating: bool,
    pub speed_level: i32,
    pub direction: i32,
    pub preset_mode: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightState {
    pub key: u32,
    pub state: bool,
    pub brightness: f32,
    pub color_mode: i32,
    pub color_brightness: f32,
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub white: f32,
    pub color_temperature: f32,
    pub cold_white: f32,
    pub warm_white: f32,
    pub effect: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorState {
    pub key: u32,
    pub state: f32,
    pub missing_state: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchState {
    pub key: u32,
    pub state: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextSensorState {
    pub key: u32,
    pub state: String,
    pub missing_state: bool,
}

impl StateUpdate {
    /// The key of the entity this update belongs to.
    pub fn key(&self) -> u32 {
        match self {
            StateUpdate::BinarySensor(s) => s.key,
            StateUpdate::Cover(s) => s.key,
            StateUpdate::Fan(s) => s.key,
            StateUpdate::Light(s) => s.key,
            StateUpdate::Sensor(s) => s.key,
            StateUpdate::Switch(s) => s.key,
            StateUpdate::TextSensor(s) => s.key,
        }
    }

    /// Build a state record from a state-response message, if it is one.
    pub(crate) fn from_message(msg: &ApiMessage) -> Option<StateUpdate> {
        Some(match msg {
            ApiMessage::BinarySensorStateResponse(m) => StateUpdate::BinarySensor(BinarySensorState {
                key: m.key,
                state: m.state,
                missing_state: m.missing_state,
            }),
            ApiMessage::CoverStateResponse(m) => StateUpdate::Cover(CoverState {
                key: m.key,
                position: m.position,
                tilt: m.tilt,
                current_operation: m.current_operation,
            }),
            ApiMessage::FanStateResponse(m) => StateUpdate::Fan(FanState {
                key: m.key,
                state: m.state,
                oscillating: m.oscillating,
                speed_level: m.speed_level,
                direction: m.direction,
                preset_mode: m.preset_mode.clone(),
            }),
            ApiMessage::LightStateResponse(m) => StateUpdate::Light(LightState {
                key: m.key,
                state: m.state,
                brightness: m.brightness,
                color_mode: m.color_mode,
                color_brightness: m.color_brightness,
                red: m.red,
                green: m.green,
                blue: m.blue,
                white: m.white,
                color_temperature: m.color_temperature,
                cold_white: m.cold_white,
                warm_white: m.warm_white,
                effect: m.effect.clone(),
            }),
            ApiMessage::SensorStateResponse(m) => StateUpdate::Sensor(SensorState {
                key: m.key,
                state: m.state,
                missing_state: m.missing_state,
            }),
            ApiMessage::SwitchStateResponse(m) => StateUpdate::Switch(SwitchState {
                key: m.key,
                state: m.state,
            }),
            ApiMessage::TextSensorStateResponse(m) => StateUpdate::TextSensor(TextSensorState {
                key: m.key,
                state: m.state.clone(),
                missing_state: m.missing_state,
            }),
            _ => return None,
        })
    }
}

/// One entry from the log subscription stream.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Severity the device assigned.
    pub level: LogLevel,
    /// The log line, lossily decoded.
    pub message: String,
    /// Whether the device reported dropping earlier lines.
    pub send_failed: bool,
}

/// Options for a light command. Provided values get their companion
/// `has_*` flags set on the wire; everything else is left untouched on
/// the device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightCommand {
    pub state: Option<bool>,
    pub brightness: Option<f32>,
    pub rgb: Option<(f32, f32, f32)>,
    pub white: Option<f32>,
    pub color_temperature: Option<f32>,
    pub color_brightness: Option<f32>,
    pub color_mode: Option<i32>,
    pub cold_white: Option<f32>,
    pub warm_white: Option<f32>,
    pub transition_length: Option<Duration>,
    pub flash_length: Option<Duration>,
    pub effect: Option<String>,
}

impl LightCommand {
    pub(crate) fn into_request(self, key: u32) -> LightCommandRequest {
        let mut req = LightCommandRequest {
            key,
            ..LightCommandRequest::default()
        };
        if let Some(state) = self.state {
            req.has_state = true;
            req.state = state;
        }
        if let Some(brightness) = self.brightness {
            req.has_brightness = true;
            req.brightness = brightness;
        }
        if let Some((red, green, blue)) = self.rgb {
            req.has_rgb = true;
            req.red = red;
            req.green = green;
            req.blue = blue;
        }
        if let Some(white) = self.white {
            req.has_white = true;
            req.white = white;
        }
        if let Some(color_temperature) = self.color_temperature {
            req.has_color_temperature = true;
            req.color_temperature = color_temperature;
        }
        if let Some(color_brightness) = self.color_brightness {
            req.has_color_brightness = true;
            req.color_brightness = color_brightness;
        }
        if let Some(color_mode) = self.color_mode {
            req.has_color_mode = true;
            req.color_mode = color_mode;
        }
        if let Some(cold_white) = self.cold_white {
            req.has_cold_white = true;
            req.cold_white = cold_white;
        }
        if let Some(warm_white) = self.warm_white {
            req.has_warm_white = true;
            req.warm_white = warm_white;
        }
        if let Some(transition) = self.transition_length {
            req.has_transition_length = true;
            req.transition_length = transition.as_millis() as u32;
        }
        if let Some(flash) = self.flash_length {
            req.has_flash_length = true;
            req.flash_length = flash.as_millis() as u32;
        }
        if let Some(effect) = self.effect {
            req.has_effect = true;
            req.effect = effect;
        }
        req
    }
}

/// Options for a fan command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FanCommand {
    pub state: Option<bool>,
    pub speed: Option<i32>,
    pub speed_level: Option<i32>,
    pub oscillating: Option<bool>,
    pub direction: Option<i32>,
    pub preset_mode: Option<String>,
}

impl FanCommand {
    pub(crate) fn into_request(self, key: u32) -> FanCommandRequest {
        let mut req = FanCommandRequest {
            key,
            ..FanCommandRequest::default()
        };
        if let Some(state) = self.state {
            req.has_state = true;
            req.state = state;
        }
        if let Some(speed) = self.speed {
            req.has_speed = true;
            req.speed = speed;
        }
        if let Some(speed_level) = self.speed_level {
            req.has_speed_level = true;
            req.speed_level = speed_level;
        }
        if let Some(oscillating) = self.oscillating {
            req.has_oscillating = true;
            req.oscillating = oscillating;
        }
        if let Some(direction) = self.direction {
            req.has_direction = true;
            req.direction = direction;
        }
        if let Some(preset_mode) = self.preset_mode {
            req.has_preset_mode = true;
            req.preset_mode = preset_mode;
        }
        req
    }
}

/// Options for a cover command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoverCommand {
    pub position: Option<f32>,
    pub tilt: Option<f32>,
    pub stop: bool,
}

impl CoverCommand {
    pub(crate) fn into_request(self, key: u32) -> CoverCommandRequest {
        let mut req = CoverCommandRequest {
            key,
            stop: self.stop,
            ..CoverCommandRequest::default()
        };
        if let Some(position) = self.position {
            req.has_position = true;
            req.position = position;
        }
        if let Some(tilt) = self.tilt {
            req.has_tilt = true;
            req.tilt = tilt;
        }
        req
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esphome_proto::messages::{
        ListEntitiesSensorResponse, ListEntitiesSwitchResponse, SwitchStateResponse,
    };

    #[test]
    fn test_entity_from_switch_listing() {
        let msg = ApiMessage::ListEntitiesSwitchResponse(ListEntitiesSwitchResponse {
            object_id: "relay_1".into(),
            key: 42,
            name: "Relay 1".into(),
            unique_id: "switch-relay_1".into(),
            assumed_state: true,
            ..Default::default()
        });
        let entity = EntityInfo::from_message(&msg).unwrap();
        assert_eq!(entity.key, 42);
        assert_eq!(entity.object_id, "relay_1");
        assert_eq!(entity.category(), "switch");
        assert!(matches!(
            entity.kind,
            EntityKind::Switch {
                assumed_state: true,
                ..
            }
        ));
    }

    #[test]
    fn test_entity_from_sensor_listing() {
        let msg = ApiMessage::ListEntitiesSensorResponse(ListEntitiesSensorResponse {
            object_id: "temp".into(),
            key: 7,
            name: "Temperature".into(),
            unit_of_measurement: "°C".into(),
            accuracy_decimals: 1,
            ..Default::default()
        });
        let entity = EntityInfo::from_message(&msg).unwrap();
        assert_eq!(entity.category(), "sensor");
        match entity.kind {
            EntityKind::Sensor {
                unit_of_measurement,
                accuracy_decimals,
                ..
            } => {
                assert_eq!(unit_of_measurement, "°C");
                assert_eq!(accuracy_decimals, 1);
            }
            other => panic!("wrong kind: {other:?}"),
        }
    }

    #[test]
    fn test_non_listing_message_is_not_an_entity() {
        let msg = ApiMessage::SwitchStateResponse(SwitchStateResponse {
            key: 1,
            state: true,
        });
        assert!(EntityInfo::from_message(&msg).is_none());
        assert!(StateUpdate::from_message(&msg).is_some());
    }

    #[test]
    fn test_state_update_key() {
        let msg = ApiMessage::SwitchStateResponse(SwitchStateResponse {
            key: 99,
            state: false,
        });
        let update = StateUpdate::from_message(&msg).unwrap();
        assert_eq!(update.key(), 99);
        assert_eq!(
            update,
            StateUpdate::Switch(SwitchState {
                key: 99,
                state: false
            })
        );
    }

    #[test]
    fn test_light_command_sets_has_flags() {
        let req = LightCommand {
            state: Some(true),
            brightness: Some(0.8),
            rgb: Some((1.0, 0.0, 0.5)),
            transition_length: Some(Duration::from_millis(250)),
            ..Default::default()
        }
        .into_request(5);

        assert_eq!(req.key, 5);
        assert!(req.has_state && req.state);
        assert!(req.has_brightness);
        assert!(req.has_rgb);
        assert_eq!((req.red, req.green, req.blue), (1.0, 0.0, 0.5));
        assert!(req.has_transition_length);
        assert_eq!(req.transition_length, 250);
        assert!(!req.has_effect);
        assert!(!req.has_color_temperature);
    }

    #[test]
    fn test_fan_command_sets_companion_flags_only_for_provided_values() {
        let req = FanCommand {
            state: Some(true),
            speed_level: Some(4),
            ..Default::default()
        }
        .into_request(3);

        assert!(req.has_state && req.state);
        assert!(req.has_speed_level);
        assert_eq!(req.speed_level, 4);
        assert!(!req.has_oscillating);
        assert!(!req.has_speed);
        assert!(!req.has_direction);
        assert!(!req.has_preset_mode);
    }

    #[test]
    fn test_cover_command_stop() {
        let req = CoverCommand {
            stop: true,
            ..Default::default()
        }
        .into_request(11);
        assert!(req.stop);
        assert!(!req.has_position);
        assert!(!req.has_tilt);
    }
}
