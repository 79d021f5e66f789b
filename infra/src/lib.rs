pub mod http;
pub mod offline;
pub mod redis;
pub mod twilio;

use settings::AppSettings;

#[derive(Clone)]
pub struct AppState {
    pub app_settings: AppSettings,
    pub http_client: reqwest::Client,
}
