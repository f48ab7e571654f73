//! Parser for the free-text body of a var_send dump.
//!
//! The body is line oriented. Each variable starts with a marker line and is
//! followed by optional facet lines and an optional nested content block:
//!
//! ```text
//! --- Variable #1 ---
//! Type: array
//! Array with 2 elements
//! Array contents:
//! array (
//!   0 => 1,
//!   1 => 2,
//! )
//! --- Variable #2 ---
//! Type: string
//! Value: hello
//! ---END---
//! ```
//!
//! Marker lines are trimmed before they are classified. Content lines are
//! banked verbatim, so indentation inside nested dumps survives.
//!
//! Parsing never fails. Unrecognised or malformed lines are skipped, and
//! whatever variables could be recognised are returned.

use serde::Serialize;

const VARIABLE_MARKER: &str = "--- Variable #";
const END_MARKER: &str = "---END---";
const TYPE_PREFIX: &str = "Type: ";
const VALUE_PREFIX: &str = "Value: ";
const ARRAY_PREFIX: &str = "Array with ";
const OBJECT_PREFIX: &str = "Object of class ";
const ARRAY_CONTENTS: &str = "Array contents:";
const OBJECT_CONTENTS: &str = "Object contents:";

/// Kind assigned to a variable until a `Type:` line says otherwise.
pub const UNKNOWN_KIND: &str = "unknown";

/// Optional facets of a variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VariableMetadata {
    /// Declared element count of an array, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_count: Option<String>,
    /// Class name of an object, without quotes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Nested content block, newline-joined with blank lines preserved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
}

impl VariableMetadata {
    /// True if no facet is set.
    pub fn is_empty(&self) -> bool {
        self.element_count.is_none() && self.class_name.is_none() && self.contents.is_none()
    }
}

/// One variable recovered from a dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableRecord {
    /// Ordinal as declared in the marker line (not validated).
    pub number: u32,
    /// Free-form type label.
    #[serde(rename = "type")]
    pub kind: String,
    /// Short value summary; empty when none applies.
    pub value: String,
    /// Optional facets.
    pub metadata: VariableMetadata,
}

impl VariableRecord {
    fn new(number: u32) -> Self {
        Self {
            number,
            kind: UNKNOWN_KIND.to_string(),
            value: String::new(),
            metadata: VariableMetadata::default(),
        }
    }
}

/// Parse a dump body into its variables, in declaration order.
pub fn parse_variables(text: &str) -> Vec<VariableRecord> {
    let mut parser = VariableParser::default();
    for line in text.trim_end().lines() {
        parser.feed(line);
    }
    parser.finish()
}

/// Classification of a single trimmed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line<'a> {
    VariableStart(u32),
    End,
    Type(&'a str),
    Value(&'a str),
    ArrayWith(&'a str),
    ObjectOfClass(&'a str),
    ContentsStart,
    Other,
}

impl Line<'_> {
    /// Lines that close an open content block.
    fn terminates_contents(self) -> bool {
        matches!(self, Line::VariableStart(_) | Line::End)
    }
}

fn classify(line: &str) -> Line<'_> {
    if let Some(rest) = line.strip_prefix(VARIABLE_MARKER) {
        let token = rest.split(' ').next().unwrap_or("");
        return match token.parse() {
            Ok(number) => Line::VariableStart(number),
            Err(_) => Line::Other,
        };
    }
    if line == END_MARKER {
        return Line::End;
    }
    if let Some(kind) = line.strip_prefix(TYPE_PREFIX) {
        return Line::Type(kind.trim());
    }
    if let Some(value) = line.strip_prefix(VALUE_PREFIX) {
        return Line::Value(value.trim());
    }
    if let Some(rest) = line.strip_prefix(ARRAY_PREFIX) {
        return match rest.split(' ').next() {
            Some(count) if !count.is_empty() => Line::ArrayWith(count),
            _ => Line::Other,
        };
    }
    if let Some(rest) = line.strip_prefix(OBJECT_PREFIX) {
        return Line::ObjectOfClass(rest.trim().trim_matches('\''));
    }
    if line.starts_with(ARRAY_CONTENTS) || line.starts_with(OBJECT_CONTENTS) {
        return Line::ContentsStart;
    }
    Line::Other
}

#[derive(Debug, Default)]
enum State<'a> {
    #[default]
    NoActiveVariable,
    ActiveVariable(VariableRecord),
    CollectingContent {
        record: VariableRecord,
        lines: Vec<&'a str>,
    },
}

#[derive(Debug, Default)]
struct VariableParser<'a> {
    state: State<'a>,
    records: Vec<VariableRecord>,
}

impl<'a> VariableParser<'a> {
    fn feed(&mut self, raw: &'a str) {
        let line = classify(raw.trim());

        // Phase one: decide whether an open content block ends here. If it
        // does not, the raw line belongs to the block and is consumed.
        if let State::CollectingContent { lines, .. } = &mut self.state {
            if !line.terminates_contents() {
                lines.push(raw);
                return;
            }
            self.close_contents();
        }

        // Phase two: the line is evaluated as a marker or facet.
        match line {
            Line::VariableStart(number) => {
                self.finish_active();
                self.state = State::ActiveVariable(VariableRecord::new(number));
            }
            Line::ContentsStart => {
                if let State::ActiveVariable(record) = std::mem::take(&mut self.state) {
                    self.state = State::CollectingContent {
                        record,
                        lines: Vec::new(),
                    };
                }
            }
            Line::Type(kind) => {
                if let Some(record) = self.active_mut() {
                    record.kind = kind.to_string();
                }
            }
            Line::Value(value) => {
                if let Some(record) = self.active_mut() {
                    record.value = value.to_string();
                }
            }
            Line::ArrayWith(count) => {
                if let Some(record) = self.active_mut() {
                    record.metadata.element_count = Some(count.to_string());
                    record.value = format!("Array with {count} elements");
                }
            }
            Line::ObjectOfClass(name) => {
                if let Some(record) = self.active_mut() {
                    record.metadata.class_name = Some(name.to_string());
                    record.value = format!("Object of class '{name}'");
                }
            }
            Line::End | Line::Other => {}
        }
    }

    fn active_mut(&mut self) -> Option<&mut VariableRecord> {
        match &mut self.state {
            State::ActiveVariable(record) => Some(record),
            _ => None,
        }
    }

    /// Flush the open content block into the record and fall back to
    /// `ActiveVariable`.
    fn close_contents(&mut self) {
        if let State::CollectingContent { mut record, lines } = std::mem::take(&mut self.state) {
            record.metadata.contents = Some(lines.join("\n"));
            self.state = State::ActiveVariable(record);
        }
    }

    fn finish_active(&mut self) {
        self.close_contents();
        if let State::ActiveVariable(record) = std::mem::take(&mut self.state) {
            self.records.push(record);
        }
    }

    fn finish(mut self) -> Vec<VariableRecord> {
        self.finish_active();
        self.records
    }
}
