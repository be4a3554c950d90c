use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;

/// Настройки маршрутизатора каналов.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Разбирать ли строковые сообщения как JSON перед рассылкой.
    pub decode_json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub router: RouterConfig,
    pub logging: LoggingConfig,
    /// Ёмкость буфера уведомлений транспорта
    pub event_capacity: usize,
}

impl Settings {
    /// Загружает настройки из значений по умолчанию и переменных окружения
    /// с префиксом `CHANROUTE_` (вложенность через `__`, например
    /// `CHANROUTE_ROUTER__DECODE_JSON=true`).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// То же, что [`Settings::load`], но сначала читает необязательный файл.
    pub fn load_from(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            // Добавляем значения по умолчанию
            .set_default("router.decode_json", false)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "compact")?
            .set_default("logging.with_ansi", true)?
            .set_default("logging.with_target", true)?
            .set_default("event_capacity", 1024)?;

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }

        let cfg = builder
            // Переменные окружения перекрывают файл
            .add_source(
                Environment::with_prefix("CHANROUTE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }
}
