use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
};

use crate::trigger::SplitTrigger;

/// How an index is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Start from an empty blob heap and key table, overwriting old files.
    Create,
    /// Read-write over existing files.
    Update,
    /// Read existing files; every mutation fails with write protection.
    ReadOnly,
    /// Validate and repair the blob heap of existing files, then read them.
    Restore,
}

impl AccessMode {
    pub fn is_writable(&self) -> bool {
        matches!(self, AccessMode::Create | AccessMode::Update)
    }
}

impl Display for AccessMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessMode::Create => write!(f, "create"),
            AccessMode::Update => write!(f, "update"),
            AccessMode::ReadOnly => write!(f, "read-only"),
            AccessMode::Restore => write!(f, "restore"),
        }
    }
}

/// Options of a [`Gix`](crate::Gix) instance.
#[derive(Debug, Clone)]
pub struct GixOption {
    pub(crate) path: PathBuf,
    pub(crate) name: String,
    pub(crate) mode: AccessMode,
    pub(crate) cache_capacity: usize,
    pub(crate) cache_refresh_ratio: f64,
    pub(crate) split_trigger: SplitTrigger,
    pub(crate) split_retention: f64,
}

impl<P> From<P> for GixOption
where
    P: Into<PathBuf>,
{
    fn from(path: P) -> Self {
        GixOption {
            path: path.into(),
            name: "index".to_string(),
            mode: AccessMode::ReadOnly,
            cache_capacity: 100_000_000,
            cache_refresh_ratio: 0.1,
            split_trigger: SplitTrigger::default(),
            split_retention: 0.9,
        }
    }
}

impl GixOption {
    pub fn path(self, path: impl Into<PathBuf>) -> Self {
        GixOption {
            path: path.into(),
            ..self
        }
    }

    pub fn name(self, name: impl Into<String>) -> Self {
        GixOption {
            name: name.into(),
            ..self
        }
    }

    pub fn mode(self, mode: AccessMode) -> Self {
        GixOption { mode, ..self }
    }

    /// Resident item-set bytes the cache evicts down to.
    pub fn cache_capacity(self, cache_capacity: usize) -> Self {
        GixOption {
            cache_capacity,
            ..self
        }
    }

    /// Fraction of the cache capacity that uncommitted growth may reach
    /// before a cache clean-up pass runs.
    pub fn cache_refresh_ratio(self, cache_refresh_ratio: f64) -> Self {
        GixOption {
            cache_refresh_ratio,
            ..self
        }
    }

    pub fn split_trigger(self, split_trigger: SplitTrigger) -> Self {
        GixOption {
            split_trigger,
            ..self
        }
    }

    /// Share of a full working buffer that must survive a local merge for
    /// the buffer to still be pushed into a child segment.
    pub fn split_retention(self, split_retention: f64) -> Self {
        GixOption {
            split_retention,
            ..self
        }
    }
}

impl GixOption {
    pub(crate) fn main_path(&self) -> PathBuf {
        self.path.join(format!("{}.gix", self.name))
    }

    pub(crate) fn blob_path(&self) -> PathBuf {
        self.path.join(format!("{}.gixdat", self.name))
    }

    pub(crate) fn refresh_threshold(&self) -> i64 {
        (self.cache_refresh_ratio * self.cache_capacity as f64) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_paths() {
        let option = GixOption::from("/tmp/idx").name("terms");

        assert_eq!(option.mode, AccessMode::ReadOnly);
        assert_eq!(option.main_path(), PathBuf::from("/tmp/idx/terms.gix"));
        assert_eq!(option.blob_path(), PathBuf::from("/tmp/idx/terms.gixdat"));
        assert_eq!(option.refresh_threshold(), 10_000_000);
        assert_eq!(option.split_trigger, SplitTrigger::SizeOfMem(10 * 1024 * 1024));
    }

    #[test]
    fn test_writable_modes() {
        assert!(AccessMode::Create.is_writable());
        assert!(AccessMode::Update.is_writable());
        assert!(!AccessMode::ReadOnly.is_writable());
        assert!(!AccessMode::Restore.is_writable());
    }
}
