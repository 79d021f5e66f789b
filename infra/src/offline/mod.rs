mod memory;
mod network;

pub use memory::*;
pub use network::*;

use domain::models::OfflineConfig;
use settings::{HttpSettings, OfflineSettings};

/// 設定からオフラインキャッシュの設定を構築する。
///
/// オリジンはHTTPサーバー設定から生成する。
pub fn offline_config(http: &HttpSettings, offline: &OfflineSettings) -> OfflineConfig {
    OfflineConfig {
        cache_name: offline.cache_name.clone(),
        precache_urls: offline.precache_urls.clone(),
        fallback_document: offline.fallback_document.clone(),
        ..OfflineConfig::new(http.origin())
    }
}
