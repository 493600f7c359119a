use crate::config::AppConfig;
use crate::services::relay::PromptRelay;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub relay: Arc<PromptRelay>,
}
