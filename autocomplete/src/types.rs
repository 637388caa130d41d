use serde::{Deserialize, Serialize};

/// A display-ready completion.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub completion_id: String,
    pub filepath: String,
    pub text: String,
}

/// The caret's view of the file: everything before and after the cursor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileContext {
    pub prefix: String,
    pub suffix: String,
}

impl FileContext {
    /// Split `contents` at a zero-based line/character position.
    pub fn at_cursor(contents: &str, line: u32, character: u32) -> Self {
        let mut offset = 0usize;
        for (i, l) in contents.split('\n').enumerate() {
            if i as u32 == line {
                offset += (character as usize).min(l.len());
                break;
            }
            offset += l.len() + 1;
        }
        let offset = offset.min(contents.len());
        Self {
            prefix: contents[..offset].to_string(),
            suffix: contents[offset..].to_string(),
        }
    }

    /// The text of the line the cursor is on, up to the cursor.
    pub fn current_line_prefix(&self) -> &str {
        self.prefix.rsplit('\n').next().unwrap_or("")
    }

    /// First non-blank line below the cursor, used by the exact-line and
    /// similar-line stop filters.
    pub fn line_below_cursor(&self) -> &str {
        self.suffix
            .split('\n')
            .skip(1)
            .find(|line| !line.trim().is_empty())
            .map(str::trim_end)
            .unwrap_or("")
    }
}
