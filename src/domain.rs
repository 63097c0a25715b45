use serde::{Deserialize, Serialize};

pub const TITLE_MAX_CHARS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Running,
    Ready,
    Loading,
    Paused,
}

impl Status {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Ready => "Ready",
            Self::Loading => "Loading",
            Self::Paused => "Paused",
        }
    }

    pub const fn marker(self) -> &'static str {
        match self {
            Self::Running => "●",
            Self::Ready => "○",
            Self::Loading => "◌",
            Self::Paused => "⏸",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub added: usize,
    pub removed: usize,
    pub content: String,
    #[serde(skip)]
    pub error: Option<String>,
}

impl DiffStats {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.content.is_empty()
    }

    pub fn with_error(message: String) -> Self {
        Self {
            error: Some(message),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleError {
    Empty,
    TooLong,
    InvalidCharacter(char),
}

impl TitleError {
    pub fn message(&self) -> String {
        match self {
            Self::Empty => "title cannot be empty".to_string(),
            Self::TooLong => {
                format!("title cannot be longer than {TITLE_MAX_CHARS} characters")
            }
            Self::InvalidCharacter(character) => {
                format!("title cannot contain '{character}'")
            }
        }
    }
}

// Titles become worktree directory names, so anything that breaks a
// single path component is rejected outright.
pub fn title_character_is_valid(character: char) -> bool {
    !matches!(character, '/' | '\\' | ':' | '\0' | '\n' | '\t')
}

pub fn validate_title(title: &str) -> Result<(), TitleError> {
    if title.is_empty() {
        return Err(TitleError::Empty);
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(TitleError::TooLong);
    }
    if let Some(invalid) = title.chars().find(|value| !title_character_is_valid(*value)) {
        return Err(TitleError::InvalidCharacter(invalid));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{DiffStats, Status, TITLE_MAX_CHARS, TitleError, validate_title};

    #[test]
    fn diff_stats_empty_requires_all_three_zero() {
        assert!(DiffStats::default().is_empty());
        assert!(
            !DiffStats {
                added: 1,
                ..DiffStats::default()
            }
            .is_empty()
        );
        assert!(
            !DiffStats {
                content: "diff --git a/x b/x".to_string(),
                ..DiffStats::default()
            }
            .is_empty()
        );
    }

    #[test]
    fn validate_title_enforces_length_and_charset() {
        assert_eq!(validate_title(""), Err(TitleError::Empty));
        assert_eq!(validate_title("demo"), Ok(()));
        assert_eq!(validate_title("a b.c-d_e"), Ok(()));
        assert_eq!(validate_title("a/b"), Err(TitleError::InvalidCharacter('/')));

        let long = "x".repeat(TITLE_MAX_CHARS + 1);
        assert_eq!(validate_title(&long), Err(TitleError::TooLong));
        let max = "x".repeat(TITLE_MAX_CHARS);
        assert_eq!(validate_title(&max), Ok(()));
    }

    #[test]
    fn status_round_trips_through_serde() {
        for status in [Status::Running, Status::Ready, Status::Loading, Status::Paused] {
            let encoded = serde_json::to_string(&status).expect("status should encode");
            let decoded: Status = serde_json::from_str(&encoded).expect("status should decode");
            assert_eq!(decoded, status);
        }
    }
}
