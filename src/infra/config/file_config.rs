use serde::Deserialize;

use crate::infra::config::{ApiConfig, AppConfig, ChatConfig, LogConfig};

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub logging: Option<FileLogConfig>,
    pub api: Option<FileApiConfig>,
    pub chat: Option<FileChatConfig>,
}

impl FileConfig {
    pub fn merge_into(self, config: &mut AppConfig) {
        if let Some(logging) = self.logging {
            logging.merge_into(&mut config.logging);
        }

        if let Some(api) = self.api {
            api.merge_into(&mut config.api);
        }

        if let Some(chat) = self.chat {
            chat.merge_into(&mut config.chat);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileLogConfig {
    pub level: Option<String>,
}

impl FileLogConfig {
    fn merge_into(self, config: &mut LogConfig) {
        if let Some(level) = self.level {
            config.level = level;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileApiConfig {
    pub base_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
}

impl FileApiConfig {
    fn merge_into(self, config: &mut ApiConfig) {
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }

        if let Some(timeout_ms) = self.request_timeout_ms {
            config.request_timeout_ms = timeout_ms;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileChatConfig {
    pub typing_idle_ms: Option<u64>,
    pub refresh_debounce_ms: Option<u64>,
    pub read_receipt_batch_max: Option<usize>,
}

impl FileChatConfig {
    fn merge_into(self, config: &mut ChatConfig) {
        if let Some(idle_ms) = self.typing_idle_ms {
            config.typing_idle_ms = idle_ms;
        }

        if let Some(debounce_ms) = self.refresh_debounce_ms {
            config.refresh_debounce_ms = debounce_ms;
        }

        // A zero batch size would never send anything.
        if let Some(batch_max) = self.read_receipt_batch_max.filter(|max| *max > 0) {
            config.read_receipt_batch_max = batch_max;
        }
    }
}
