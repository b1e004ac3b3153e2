use crate::model::AppState;
use crate::queue::SaveReason;
use crate::warning::StorageWarning;

/// Details passed to [`SaveHooks::on_saved`] alongside the stamped payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveInfo {
    pub reason: SaveReason,
    pub warnings: Vec<StorageWarning>,
}

pub type SavedHook = Box<dyn Fn(&AppState, &SaveInfo) + Send + Sync>;
pub type WarningHook = Box<dyn Fn(&StorageWarning) + Send + Sync>;

/// Callbacks invoked from the save worker after every persist.
///
/// Both run synchronously inside the write's continuation, one call per
/// event, and must not block.
#[derive(Default)]
pub struct SaveHooks {
    pub on_saved: Option<SavedHook>,
    pub on_warning: Option<WarningHook>,
}

impl SaveHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_saved(mut self, hook: impl Fn(&AppState, &SaveInfo) + Send + Sync + 'static) -> Self {
        self.on_saved = Some(Box::new(hook));
        self
    }

    pub fn on_warning(mut self, hook: impl Fn(&StorageWarning) + Send + Sync + 'static) -> Self {
        self.on_warning = Some(Box::new(hook));
        self
    }

    pub(crate) fn saved(&self, payload: &AppState, info: &SaveInfo) {
        if let Some(hook) = &self.on_saved {
            hook(payload, info);
        }
    }

    pub(crate) fn warn(&self, warning: &StorageWarning) {
        if let Some(hook) = &self.on_warning {
            hook(warning);
        }
    }
}
