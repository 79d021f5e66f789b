use std::collections::HashMap;

use tokio::sync::RwLock;

use domain::{DomainResult, models::AssetResponse, repositories::CacheStorage};

/// メモリキャッシュストレージ
///
/// プロセスが終了するとキャッシュは失われる。
/// キャッシュは作成した順に保持する。
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<Vec<(String, HashMap<String, AssetResponse>)>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn open_cache<'a>(
    caches: &'a mut Vec<(String, HashMap<String, AssetResponse>)>,
    cache_name: &str,
) -> &'a mut HashMap<String, AssetResponse> {
    let index = match caches.iter().position(|(name, _)| name == cache_name) {
        Some(index) => index,
        None => {
            caches.push((cache_name.to_string(), HashMap::new()));
            caches.len() - 1
        }
    };
    &mut caches[index].1
}

#[async_trait::async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, cache_name: &str) -> DomainResult<()> {
        let mut caches = self.caches.write().await;
        open_cache(&mut caches, cache_name);
        Ok(())
    }

    async fn keys(&self) -> DomainResult<Vec<String>> {
        let caches = self.caches.read().await;
        Ok(caches.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn delete(&self, cache_name: &str) -> DomainResult<bool> {
        let mut caches = self.caches.write().await;
        let before = caches.len();
        caches.retain(|(name, _)| name != cache_name);
        Ok(caches.len() < before)
    }

    async fn put(&self, cache_name: &str, url: &str, response: AssetResponse) -> DomainResult<()> {
        let mut caches = self.caches.write().await;
        open_cache(&mut caches, cache_name).insert(url.to_string(), response);
        Ok(())
    }

    async fn put_all(
        &self,
        cache_name: &str,
        entries: Vec<(String, AssetResponse)>,
    ) -> DomainResult<()> {
        let mut caches = self.caches.write().await;
        open_cache(&mut caches, cache_name).extend(entries);
        Ok(())
    }

    async fn get(&self, cache_name: &str, url: &str) -> DomainResult<Option<AssetResponse>> {
        let caches = self.caches.read().await;
        Ok(caches
            .iter()
            .find(|(name, _)| name == cache_name)
            .and_then(|(_, cache)| cache.get(url).cloned()))
    }

    async fn match_any(&self, url: &str) -> DomainResult<Option<AssetResponse>> {
        let caches = self.caches.read().await;
        Ok(caches.iter().find_map(|(_, cache)| cache.get(url).cloned()))
    }
}
