use std::sync::Mutex;

// Prompt phrases are matched literally and case-sensitively against the
// captured pane text. Families are keyed by a substring of the program
// command line, so "aider --model sonnet" still resolves to Aider.
pub struct PromptFamily {
    pub program_needle: &'static str,
    pub phrases: &'static [&'static str],
}

pub const PROMPT_FAMILIES: [PromptFamily; 3] = [
    PromptFamily {
        program_needle: "claude",
        phrases: &[
            "No, and tell Claude what to do differently",
            "Do you want to proceed?",
            "Do you want to make this edit",
        ],
    },
    PromptFamily {
        program_needle: "aider",
        phrases: &[
            "(Y)es/(N)o/(D)on't ask again",
            "(Y)es/(N)o/(A)ll/(S)kip all",
        ],
    },
    PromptFamily {
        program_needle: "gemini",
        phrases: &["Yes, allow once", "Yes, allow always"],
    },
];

pub fn prompt_pending(program: &str, content: &str) -> bool {
    for family in &PROMPT_FAMILIES {
        if !program.contains(family.program_needle) {
            continue;
        }
        return family.phrases.iter().any(|phrase| content.contains(phrase));
    }

    false
}

// Remembers only the most recent content hash; the first observation has
// no prior and therefore reports a change.
pub struct StatusMonitor {
    last_hash: Mutex<Option<u64>>,
}

impl StatusMonitor {
    pub fn new() -> Self {
        Self {
            last_hash: Mutex::new(None),
        }
    }

    pub fn observe(&self, hash: u64) -> bool {
        let Ok(mut last_hash) = self.last_hash.lock() else {
            return false;
        };

        let updated = *last_hash != Some(hash);
        *last_hash = Some(hash);
        updated
    }
}

impl Default for StatusMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{StatusMonitor, prompt_pending};

    #[test]
    fn first_observation_reports_updated() {
        let monitor = StatusMonitor::new();
        assert!(monitor.observe(42));
        assert!(!monitor.observe(42));
        assert!(monitor.observe(43));
        assert!(!monitor.observe(43));
    }

    #[test]
    fn claude_prompt_is_detected_for_claude_programs_only() {
        let content = "  1. Yes\n  2. No, and tell Claude what to do differently\n";
        assert!(prompt_pending("claude", content));
        assert!(prompt_pending("claude --dangerously-skip-permissions", content));
        assert!(!prompt_pending("aider --model something", content));
    }

    #[test]
    fn aider_and_gemini_phrases_match_their_families() {
        assert!(prompt_pending(
            "aider --model something",
            "Apply edits? (Y)es/(N)o/(D)on't ask again"
        ));
        assert!(prompt_pending("gemini", "Yes, allow once"));
        assert!(!prompt_pending("gemini", "nothing to see"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(!prompt_pending("gemini", "yes, allow once"));
    }

    #[test]
    fn unknown_programs_never_report_prompts() {
        assert!(!prompt_pending("bash", "Do you want to proceed?"));
    }
}
