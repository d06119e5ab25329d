use super::MmcifError;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, Read};
use std::path::Path;

/// A value in the flat mmCIF dictionary: a single scalar for plain
/// `_item value` assignments, or one ordered column of strings per item
/// for `loop_` constructs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CifValue {
    Scalar(String),
    List(Vec<String>),
}

impl CifValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            CifValue::Scalar(value) => Some(value),
            CifValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            CifValue::Scalar(_) => None,
            CifValue::List(values) => Some(values),
        }
    }

    /// Uniform row view: a scalar behaves like a one-row column.
    pub fn as_slice(&self) -> &[String] {
        match self {
            CifValue::Scalar(value) => std::slice::from_ref(value),
            CifValue::List(values) => values,
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            CifValue::Scalar(_) => 1,
            CifValue::List(values) => values.len(),
        }
    }
}

/// The flat key → value(s) dictionary produced from one mmCIF file.
///
/// Keys are fully qualified item names (`"_atom_site.Cartn_x"`). Duplicate
/// scalar keys overwrite, last write wins; this is the permissive reading
/// of the format.
#[derive(Debug, Clone, Default)]
pub struct CifDict {
    data_block: Option<String>,
    items: HashMap<String, CifValue>,
}

impl CifDict {
    /// Tokenizes mmCIF text into a flat dictionary.
    ///
    /// The scan is line-oriented: comment lines, `data_` headers, scalar
    /// assignments, `loop_` headers with their data rows, and `;`-delimited
    /// multi-line text fields. Loop rows may span physical lines; a
    /// multi-line text field counts as a single token of its row. A loop
    /// whose token count does not fill the declared columns fails with a
    /// malformed-loop error naming the category.
    pub fn parse(text: &str) -> Result<Self, MmcifError> {
        DictParser::new(text).run()
    }

    pub fn read_from(reader: &mut impl BufRead) -> Result<Self, MmcifError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::parse(&text)
    }

    pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self, MmcifError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// The name of the `data_` block, if the file carried one.
    pub fn data_block(&self) -> Option<&str> {
        self.data_block.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&CifValue> {
        self.items.get(key)
    }

    pub fn scalar(&self, key: &str) -> Option<&str> {
        self.items.get(key).and_then(CifValue::as_scalar)
    }

    pub fn column(&self, key: &str) -> Option<&[String]> {
        self.items.get(key).and_then(CifValue::as_list)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

enum LoopPhase {
    Header,
    Rows,
}

struct LoopState {
    keys: Vec<String>,
    columns: Vec<Vec<String>>,
    row_buf: Vec<String>,
    phase: LoopPhase,
    start_line: usize,
}

impl LoopState {
    fn new(start_line: usize) -> Self {
        Self {
            keys: Vec::new(),
            columns: Vec::new(),
            row_buf: Vec::new(),
            phase: LoopPhase::Header,
            start_line,
        }
    }

    fn category(&self) -> String {
        self.keys
            .first()
            .map(|key| key.split('.').next().unwrap_or(key).to_string())
            .unwrap_or_default()
    }

    /// Moves complete rows out of the token buffer into the columns.
    fn flush_rows(&mut self) {
        let width = self.keys.len();
        while width > 0 && self.row_buf.len() >= width {
            for (column, value) in self.columns.iter_mut().zip(self.row_buf.drain(..width)) {
                column.push(value);
            }
        }
    }
}

struct DictParser<'a> {
    lines: Vec<&'a str>,
    pos: usize,
    items: HashMap<String, CifValue>,
    data_block: Option<String>,
    pending_key: Option<(String, usize)>,
    current_loop: Option<LoopState>,
}

impl<'a> DictParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
            pos: 0,
            items: HashMap::new(),
            data_block: None,
            pending_key: None,
            current_loop: None,
        }
    }

    fn run(mut self) -> Result<CifDict, MmcifError> {
        while self.pos < self.lines.len() {
            let raw = self.lines[self.pos];
            let line_no = self.pos + 1;

            // A semicolon in the first column opens a multi-line text
            // field; the physical column matters, so check before trimming.
            if raw.starts_with(';') {
                self.take_text_field()?;
                continue;
            }

            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                self.pos += 1;
                continue;
            }

            if let Some((key, key_line)) = self.pending_key.take() {
                self.take_pending_value(key, key_line, trimmed, line_no)?;
                continue;
            }

            let lower = trimmed.to_ascii_lowercase();
            if lower.starts_with("data_") {
                self.finish_loop()?;
                self.data_block = Some(trimmed[5..].to_string());
                self.pos += 1;
                continue;
            }
            if lower == "loop_" {
                self.finish_loop()?;
                self.current_loop = Some(LoopState::new(line_no));
                self.pos += 1;
                continue;
            }

            if trimmed.starts_with('_') {
                match self.current_loop.as_mut() {
                    Some(state) if matches!(state.phase, LoopPhase::Header) => {
                        let tokens = tokenize_line(trimmed, line_no)?;
                        if tokens.len() == 1 {
                            state.keys.push(tokens.into_iter().next().unwrap());
                            state.columns.push(Vec::new());
                            self.pos += 1;
                        } else {
                            // A key-value pair ends a loop that never got
                            // data rows; reprocess it as a scalar.
                            self.finish_loop()?;
                        }
                    }
                    Some(_) => {
                        // A new item name terminates the loop's data
                        // section; reprocess this line outside the loop.
                        self.finish_loop()?;
                    }
                    None => self.take_scalar(trimmed, line_no)?,
                }
                continue;
            }

            match self.current_loop.as_mut() {
                Some(state) => {
                    if state.keys.is_empty() {
                        return Err(syntax(line_no, "loop data before any item names"));
                    }
                    state.phase = LoopPhase::Rows;
                    let tokens = tokenize_line(trimmed, line_no)?;
                    state.row_buf.extend(tokens);
                    state.flush_rows();
                    self.pos += 1;
                }
                None => return Err(syntax(line_no, "value outside of any item or loop")),
            }
        }

        if let Some((key, key_line)) = self.pending_key.take() {
            return Err(syntax(key_line, &format!("missing value for item `{}`", key)));
        }
        self.finish_loop()?;
        Ok(CifDict {
            data_block: self.data_block,
            items: self.items,
        })
    }

    fn take_scalar(&mut self, line: &str, line_no: usize) -> Result<(), MmcifError> {
        let tokens = tokenize_line(line, line_no)?;
        let mut tokens = tokens.into_iter();
        let key = tokens.next().unwrap();
        match tokens.next() {
            Some(value) => {
                if tokens.next().is_some() {
                    return Err(syntax(line_no, "trailing tokens after scalar value"));
                }
                self.items.insert(key, CifValue::Scalar(value));
            }
            None => self.pending_key = Some((key, line_no)),
        }
        self.pos += 1;
        Ok(())
    }

    /// Consumes the value of a key that appeared alone on its line.
    fn take_pending_value(
        &mut self,
        key: String,
        key_line: usize,
        line: &str,
        line_no: usize,
    ) -> Result<(), MmcifError> {
        let tokens = tokenize_line(line, line_no)?;
        match tokens.len() {
            0 => {
                // Comment-only line between key and value.
                self.pending_key = Some((key, key_line));
            }
            1 => {
                self.items
                    .insert(key, CifValue::Scalar(tokens.into_iter().next().unwrap()));
            }
            _ => return Err(syntax(line_no, "expected a single value for a bare item")),
        }
        self.pos += 1;
        Ok(())
    }

    fn take_text_field(&mut self) -> Result<(), MmcifError> {
        let start_line = self.pos + 1;
        let (value, consumed) = read_text_field(&self.lines, self.pos)?;
        self.pos += consumed;
        if let Some((key, _)) = self.pending_key.take() {
            self.items.insert(key, CifValue::Scalar(value));
            return Ok(());
        }
        if let Some(state) = self.current_loop.as_mut() {
            if state.keys.is_empty() {
                return Err(syntax(start_line, "text field inside a loop header"));
            }
            state.phase = LoopPhase::Rows;
            state.row_buf.push(value);
            state.flush_rows();
            return Ok(());
        }
        Err(syntax(start_line, "unexpected multi-line text field"))
    }

    fn finish_loop(&mut self) -> Result<(), MmcifError> {
        let Some(state) = self.current_loop.take() else {
            return Ok(());
        };
        if state.keys.is_empty() {
            return Err(syntax(state.start_line, "loop_ without item names"));
        }
        if !state.row_buf.is_empty() {
            return Err(MmcifError::MalformedLoop {
                category: state.category(),
                line: state.start_line,
            });
        }
        for (key, column) in state.keys.into_iter().zip(state.columns) {
            self.items.insert(key, CifValue::List(column));
        }
        Ok(())
    }
}

fn syntax(line: usize, message: &str) -> MmcifError {
    MmcifError::Syntax {
        line,
        message: message.to_string(),
    }
}

/// Reads a `;`-delimited multi-line text field starting at `start`.
/// Returns the field content and the number of physical lines consumed.
fn read_text_field(lines: &[&str], start: usize) -> Result<(String, usize), MmcifError> {
    let mut parts: Vec<&str> = vec![&lines[start][1..]];
    let mut pos = start + 1;
    while pos < lines.len() {
        if lines[pos].starts_with(';') {
            let content = if parts[0].is_empty() {
                parts[1..].join("\n")
            } else {
                parts.join("\n")
            };
            return Ok((content, pos - start + 1));
        }
        parts.push(lines[pos]);
        pos += 1;
    }
    Err(MmcifError::UnterminatedTextField { line: start + 1 })
}

/// Splits one physical line into tokens, honoring single- and
/// double-quoted substrings (which may contain whitespace) and trailing
/// `#` comments. This is the primary correctness hazard of the format: a
/// naive whitespace split corrupts any field with embedded spaces.
fn tokenize_line(line: &str, line_no: usize) -> Result<Vec<String>, MmcifError> {
    let bytes = line.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b' ' | b'\t' => pos += 1,
            b'#' => break,
            quote @ (b'\'' | b'"') => {
                let start = pos + 1;
                let mut end = None;
                let mut cursor = start;
                while cursor < bytes.len() {
                    // A closing quote must be followed by whitespace or
                    // end-of-line; anything else is part of the value.
                    if bytes[cursor] == quote
                        && (cursor + 1 >= bytes.len()
                            || bytes[cursor + 1] == b' '
                            || bytes[cursor + 1] == b'\t')
                    {
                        end = Some(cursor);
                        break;
                    }
                    cursor += 1;
                }
                let end = end.ok_or(MmcifError::UnterminatedQuote { line: line_no })?;
                tokens.push(line[start..end].to_string());
                pos = end + 1;
            }
            _ => {
                let start = pos;
                while pos < bytes.len() && bytes[pos] != b' ' && bytes[pos] != b'\t' {
                    pos += 1;
                }
                tokens.push(line[start..pos].to_string());
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_assignments() {
        let dict = CifDict::parse("data_demo\n_cell.length_a 50.0\n_cell.length_b 60.0\n").unwrap();
        assert_eq!(dict.data_block(), Some("demo"));
        assert_eq!(dict.scalar("_cell.length_a"), Some("50.0"));
        assert_eq!(dict.scalar("_cell.length_b"), Some("60.0"));
    }

    #[test]
    fn loop_columns_keep_row_order() {
        let dict = CifDict::parse("loop_\n_a.x\n_a.y\n1 2\n3 4\n").unwrap();
        assert_eq!(
            dict.column("_a.x"),
            Some(&["1".to_string(), "3".to_string()][..])
        );
        assert_eq!(
            dict.column("_a.y"),
            Some(&["2".to_string(), "4".to_string()][..])
        );
    }

    #[test]
    fn quoted_fields_keep_embedded_whitespace() {
        let tokens = tokenize_line("'hello world' 42", 1).unwrap();
        assert_eq!(tokens, vec!["hello world", "42"]);

        let dict = CifDict::parse("_struct.title 'a quoted title'\n").unwrap();
        assert_eq!(dict.scalar("_struct.title"), Some("a quoted title"));
    }

    #[test]
    fn quotes_may_contain_the_other_quote_and_apostrophes() {
        let tokens = tokenize_line("\"it's fine\" 'say \"hi\"'", 1).unwrap();
        assert_eq!(tokens, vec!["it's fine", "say \"hi\""]);
        // An apostrophe not followed by whitespace does not close a token.
        let tokens = tokenize_line("'don't stop' rest", 1).unwrap();
        assert_eq!(tokens, vec!["don't stop", "rest"]);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let err = CifDict::parse("_a.b 'unterminated\n").unwrap_err();
        assert!(matches!(err, MmcifError::UnterminatedQuote { line: 1 }));
    }

    #[test]
    fn comments_are_ignored_inline_and_full_line() {
        let dict = CifDict::parse("# header\n_a.b value # trailing\n").unwrap();
        assert_eq!(dict.scalar("_a.b"), Some("value"));
    }

    #[test]
    fn value_on_the_following_line() {
        let dict = CifDict::parse("_entry.id\nDEMO\n").unwrap();
        assert_eq!(dict.scalar("_entry.id"), Some("DEMO"));
    }

    #[test]
    fn missing_value_for_bare_key_is_an_error() {
        let err = CifDict::parse("_entry.id\n").unwrap_err();
        assert!(matches!(err, MmcifError::Syntax { line: 1, .. }));
    }

    #[test]
    fn multi_line_text_field_as_scalar() {
        let dict = CifDict::parse("_note.text\n;line one\nline two\n;\n").unwrap();
        assert_eq!(dict.scalar("_note.text"), Some("line one\nline two"));
    }

    #[test]
    fn multi_line_text_field_inside_a_loop_row() {
        let text = "loop_\n_q.id\n_q.body\n1\n;first\nbody\n;\n2 short\n";
        let dict = CifDict::parse(text).unwrap();
        assert_eq!(
            dict.column("_q.id"),
            Some(&["1".to_string(), "2".to_string()][..])
        );
        assert_eq!(
            dict.column("_q.body"),
            Some(&["first\nbody".to_string(), "short".to_string()][..])
        );
    }

    #[test]
    fn unterminated_text_field_is_an_error() {
        let err = CifDict::parse("_note.text\n;open\nnever closed\n").unwrap_err();
        assert!(matches!(err, MmcifError::UnterminatedTextField { line: 2 }));
    }

    #[test]
    fn loop_rows_may_span_physical_lines() {
        let text = "loop_\n_a.x\n_a.y\n_a.z\n1 2\n3\n4 5 6\n";
        let dict = CifDict::parse(text).unwrap();
        assert_eq!(
            dict.column("_a.x"),
            Some(&["1".to_string(), "4".to_string()][..])
        );
        assert_eq!(
            dict.column("_a.z"),
            Some(&["3".to_string(), "6".to_string()][..])
        );
    }

    #[test]
    fn malformed_loop_names_the_category() {
        let err = CifDict::parse("loop_\n_atom_site.id\n_atom_site.x\n1 2\n3\n").unwrap_err();
        match err {
            MmcifError::MalformedLoop { category, .. } => assert_eq!(category, "_atom_site"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_scalar_keys_overwrite_last_wins() {
        let dict = CifDict::parse("_a.b one\n_a.b two\n").unwrap();
        assert_eq!(dict.scalar("_a.b"), Some("two"));
    }

    #[test]
    fn a_following_item_terminates_loop_data() {
        let text = "loop_\n_a.x\n1\n2\n_b.y scalar\n";
        let dict = CifDict::parse(text).unwrap();
        assert_eq!(
            dict.column("_a.x"),
            Some(&["1".to_string(), "2".to_string()][..])
        );
        assert_eq!(dict.scalar("_b.y"), Some("scalar"));
    }

    #[test]
    fn empty_loop_columns_are_kept() {
        let dict = CifDict::parse("loop_\n_a.x\n_a.y\n_done.marker yes\n").unwrap();
        assert_eq!(dict.column("_a.x"), Some(&[][..]));
        assert_eq!(dict.scalar("_done.marker"), Some("yes"));
    }

    #[test]
    fn unknown_and_inapplicable_markers_stay_literal() {
        let dict = CifDict::parse("loop_\n_a.x\n_a.y\nfoo .\nbar ?\n").unwrap();
        assert_eq!(
            dict.column("_a.y"),
            Some(&[".".to_string(), "?".to_string()][..])
        );
    }

    #[test]
    fn scalar_behaves_like_a_one_row_column() {
        let value = CifValue::Scalar("x".to_string());
        assert_eq!(value.as_slice(), &["x".to_string()][..]);
        assert_eq!(value.row_count(), 1);
    }

    #[test]
    fn realistic_snippet() {
        let text = "\
data_1ABC
_symmetry.space_group_name_H-M 'P 21 21 21'
loop_
_atom_site.group_PDB
_atom_site.label_atom_id
_atom_site.Cartn_x
ATOM N 10.000
ATOM CA 11.000
";
        let dict = CifDict::parse(text).unwrap();
        assert_eq!(dict.data_block(), Some("1ABC"));
        assert_eq!(
            dict.scalar("_symmetry.space_group_name_H-M"),
            Some("P 21 21 21")
        );
        assert_eq!(
            dict.column("_atom_site.label_atom_id"),
            Some(&["N".to_string(), "CA".to_string()][..])
        );
    }
}
