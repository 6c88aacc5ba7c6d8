use crate::error::{GextError, Result};

/// Extension metadata sent back to the host on INFO_REQUEST (spec §6
/// "Extension info contract"). Required fields are validated the way the
/// teacher validates its `Config` in `config/loader.rs::validate_config`.
#[derive(Debug, Clone)]
pub struct ExtensionInfo {
    pub title: String,
    pub author: String,
    pub version: String,
    pub description: String,
    pub use_click_trigger: bool,
    pub can_leave: bool,
    pub can_delete: bool,
    pub file: Option<String>,
    pub cookie: Option<String>,
}

impl ExtensionInfo {
    pub fn new(title: impl Into<String>, author: impl Into<String>, version: impl Into<String>, description: impl Into<String>) -> Self {
        ExtensionInfo {
            title: title.into(),
            author: author.into(),
            version: version.into(),
            description: description.into(),
            use_click_trigger: false,
            can_leave: true,
            can_delete: true,
            file: None,
            cookie: None,
        }
    }

    pub fn with_use_click_trigger(mut self, value: bool) -> Self {
        self.use_click_trigger = value;
        self
    }

    pub fn with_can_leave(mut self, value: bool) -> Self {
        self.can_leave = value;
        self
    }

    pub fn with_can_delete(mut self, value: bool) -> Self {
        self.can_delete = value;
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    /// `title`/`author`/`version`/`description` are required and must be
    /// non-empty; an empty required field is as good as a missing one.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("title", &self.title),
            ("author", &self.author),
            ("version", &self.version),
            ("description", &self.description),
        ] {
            if value.is_empty() {
                return Err(GextError::Config(format!(
                    "extension info error: {name} field missing"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_missing_required_field() {
        let info = ExtensionInfo::new("", "A", "V", "D");
        assert!(info.validate().is_err());
    }

    #[test]
    fn validate_accepts_minimal_info() {
        let info = ExtensionInfo::new("T", "A", "V", "D");
        assert!(info.validate().is_ok());
        assert!(!info.use_click_trigger);
        assert!(info.can_leave);
        assert!(info.can_delete);
    }
}
