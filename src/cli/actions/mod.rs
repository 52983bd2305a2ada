pub mod run;

use crate::config::Settings;

/// Parsed invocation, produced by the dispatch layer.
#[derive(Debug, Clone)]
pub enum Action {
    Run { settings: Settings },
}
