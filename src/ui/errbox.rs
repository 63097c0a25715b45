pub struct ErrBox {
    message: Option<String>,
    width: u16,
}

impl ErrBox {
    pub fn new() -> Self {
        Self {
            message: None,
            width: 0,
        }
    }

    pub fn set_error(&mut self, message: String) {
        self.message = Some(message);
    }

    pub fn clear(&mut self) {
        self.message = None;
    }

    pub fn set_width(&mut self, width: u16) {
        self.width = width;
    }

    pub fn is_empty(&self) -> bool {
        self.message.is_none()
    }

    pub fn line(&self) -> String {
        match &self.message {
            Some(message) => wrap_error_single_line(message, usize::from(self.width)),
            None => String::new(),
        }
    }
}

impl Default for ErrBox {
    fn default() -> Self {
        Self::new()
    }
}

// Collapses the message onto one line and ellipsizes at width - 1,
// preferring to cut at the last word boundary before the limit.
pub fn wrap_error_single_line(message: &str, width: usize) -> String {
    if width == 0 {
        return String::new();
    }

    let collapsed = message.split_whitespace().collect::<Vec<&str>>().join(" ");
    if collapsed.chars().count() <= width {
        return collapsed;
    }

    let limit = (width - 1).max(1);
    let prefix: String = collapsed.chars().take(limit).collect();
    let cut = match prefix.rfind(' ') {
        Some(index) if index > 0 => index,
        _ => prefix.len(),
    };

    format!("{}…", &prefix[..cut])
}
