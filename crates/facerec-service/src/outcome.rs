use serde::{Deserialize, Serialize};

/// How the UI styles a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toast {
    Success,
    Error,
    Info,
}

impl Toast {
    /// Classify a message by its prefix. Empty messages get no toast.
    pub fn for_message(message: &str) -> Option<Toast> {
        if message.is_empty() {
            None
        } else if message.starts_with("Success") {
            Some(Toast::Success)
        } else if message.starts_with("Error") {
            Some(Toast::Error)
        } else {
            Some(Toast::Info)
        }
    }
}

/// Result of a user action: the message shown and whether it took effect.
///
/// The `Success:` / `Error:` / `Info:` prefix is the only styling signal the
/// UI gets, so messages are always built through these constructors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub message: String,
    pub success: bool,
}

impl Outcome {
    pub fn success(message: impl AsRef<str>) -> Self {
        Self {
            message: format!("Success: {}", message.as_ref()),
            success: true,
        }
    }

    pub fn error(message: impl AsRef<str>) -> Self {
        Self {
            message: format!("Error: {}", message.as_ref()),
            success: false,
        }
    }

    /// Informational, no change made.
    pub fn info(message: impl AsRef<str>) -> Self {
        Self {
            message: format!("Info: {}", message.as_ref()),
            success: false,
        }
    }

    pub fn toast(&self) -> Option<Toast> {
        Toast::for_message(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_prefix_messages() {
        assert_eq!(Outcome::success("done").message, "Success: done");
        assert_eq!(Outcome::error("nope").message, "Error: nope");
        assert_eq!(Outcome::info("same").message, "Info: same");
        assert!(Outcome::success("done").success);
        assert!(!Outcome::info("same").success);
    }

    #[test]
    fn test_toast_follows_prefix() {
        assert_eq!(Outcome::success("x").toast(), Some(Toast::Success));
        assert_eq!(Outcome::error("x").toast(), Some(Toast::Error));
        assert_eq!(Outcome::info("x").toast(), Some(Toast::Info));
        assert_eq!(Toast::for_message(""), None);
        assert_eq!(Toast::for_message("anything else"), Some(Toast::Info));
    }
}
