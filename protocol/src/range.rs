use serde::Deserialize;
use serde::Serialize;

/// Zero-based cursor position.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, pos: Position) -> bool {
        let after_start = pos.line > self.start.line
            || (pos.line == self.start.line && pos.character >= self.start.character);
        let before_end = pos.line < self.end.line
            || (pos.line == self.end.line && pos.character <= self.end.character);
        after_start && before_end
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RangeInFile {
    pub filepath: String,
    pub range: Range,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RangeInFileWithContents {
    pub filepath: String,
    pub range: Range,
    pub contents: String,
}
