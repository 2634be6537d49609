/// Up/Down cycling through previously sent user messages.
#[derive(Debug, Default, Clone)]
pub struct InputHistory {
    index: Option<usize>,
    draft: String,
}

impl InputHistory {
    /// Step to an older message. The text being edited is kept as a draft.
    pub fn previous(&mut self, messages: &[&str], current: &str) -> Option<String> {
        if messages.is_empty() {
            return None;
        }
        let index = match self.index {
            None => {
                self.draft = current.to_string();
                messages.len() - 1
            }
            Some(index) => index.saturating_sub(1).min(messages.len() - 1),
        };
        self.index = Some(index);
        Some(messages[index].to_string())
    }

    /// Step to a newer message, or back to the draft past the newest one.
    pub fn next(&mut self, messages: &[&str]) -> Option<String> {
        let index = self.index?;
        if index + 1 < messages.len() {
            self.index = Some(index + 1);
            Some(messages[index + 1].to_string())
        } else {
            self.index = None;
            Some(std::mem::take(&mut self.draft))
        }
    }

    pub fn reset(&mut self) {
        self.index = None;
        self.draft.clear();
    }

    pub fn is_browsing(&self) -> bool {
        self.index.is_some()
    }
}
