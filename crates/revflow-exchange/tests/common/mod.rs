use revflow_cloud::{ApiCall, InMemoryExchange, RevisionUpdate};
use revflow_config::EngineConfig;
use revflow_exchange::RevisionManager;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// テスト用のローカルファイル置き場
#[allow(dead_code)]
pub struct TestFiles {
    pub root: TempDir,
}

#[allow(dead_code)]
impl TestFiles {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.root.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }
}

/// `RUST_LOG` が指定されていればテスト出力にログを流す
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        create_timeout_secs: 120,
        update_timeout_secs: 120,
        delete_timeout_secs: 60,
        poll_interval_secs: 5,
        upload_timeout_secs: 10,
        ..Default::default()
    }
}

pub fn setup() -> (Arc<InMemoryExchange>, RevisionManager<InMemoryExchange>) {
    setup_with(test_config())
}

pub fn setup_with(
    config: EngineConfig,
) -> (Arc<InMemoryExchange>, RevisionManager<InMemoryExchange>) {
    init_tracing();
    let api = Arc::new(InMemoryExchange::new());
    let manager = RevisionManager::new(Arc::clone(&api), config);
    (api, manager)
}

#[allow(dead_code)]
pub fn revision_updates(api: &InMemoryExchange) -> Vec<RevisionUpdate> {
    api.calls()
        .into_iter()
        .filter_map(|call| match call {
            ApiCall::UpdateRevision { update, .. } => Some(update),
            _ => None,
        })
        .collect()
}
