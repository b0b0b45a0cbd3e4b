use crate::{overlay::OverlayMode, sampler::SampleMode};
use serde::Deserialize;
use watch_worker::{ModelConfig, WorkerConfig};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub camera: CameraConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct CameraConfig {
    #[serde(default = "default_max_probe")]
    pub max_probe: u32,
    #[serde(default = "default_stream_fps")]
    pub stream_fps: u64,
    #[serde(default = "default_sample_mode")]
    pub sample_mode: SampleMode,
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    #[serde(default)]
    pub default_device: Option<String>,
}

fn default_max_probe() -> u32 {
    4
}

fn default_stream_fps() -> u64 {
    30
}

fn default_sample_mode() -> SampleMode {
    SampleMode::Manual
}

fn default_sample_interval_ms() -> u64 {
    5000
}

fn fps_to_delay_ms(fps: u64) -> u64 {
    (1000.0 / fps.max(1) as f64).round() as u64
}

impl CameraConfig {
    pub fn get_stream_delay_ms(&self) -> u64 {
        fps_to_delay_ms(self.stream_fps)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OverlayConfig {
    #[serde(default)]
    pub mode: OverlayMode,
}

#[derive(Debug, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("PW")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
server:
  host: 127.0.0.1
  port: 8080
log_level: INFO
camera:
  sample_mode: periodic
model:
  onnx_file: yolov8n.onnx
  model_dir: models
  labels_file: labels.txt
"#;

    fn parse(yaml: &str) -> Result<Config, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn test_defaults() {
        let config = parse(BASE).unwrap();

        assert_eq!(config.server.get_address(), "127.0.0.1:8080");
        assert_eq!(config.log_level.as_str(), "info");
        assert_eq!(config.camera.sample_mode, SampleMode::Periodic);
        assert_eq!(config.camera.sample_interval_ms, 5000);
        assert_eq!(config.camera.max_probe, 4);
        assert_eq!(config.camera.get_stream_delay_ms(), 33);
        assert_eq!(config.overlay.mode, OverlayMode::Replace);
        assert_eq!(config.worker.detection.threshold, 0.5);
        assert!(config.camera.default_device.is_none());
    }

    #[test]
    fn test_overlay_append_mode() {
        let yaml = format!("{}overlay:\n  mode: append\n", BASE);
        let config = parse(&yaml).unwrap();
        assert_eq!(config.overlay.mode, OverlayMode::Append);
    }

    #[test]
    fn test_invalid_log_level() {
        let yaml = BASE.replace("log_level: INFO", "log_level: trace");
        assert!(parse(&yaml).is_err());
    }

    #[test]
    fn test_environment() {
        let env: Environment = "Production".to_string().try_into().unwrap();
        assert_eq!(env.as_str(), "production");
        assert!(Environment::try_from("staging".to_string()).is_err());
    }
}
