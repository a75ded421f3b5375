//! Escaped-token scanner for PostgreSQL record and array literals
//!
//! Splits exactly one syntactic level of a `(f1,f2,...)` record or an
//! `{e1,e2,...}` array into [`RawSlot`]s. Nested levels are returned as
//! text and scanned again by the resolver.
//!
//! Both modes share a single token reader:
//!
//! | Input          | Record mode               | Array mode                     |
//! |----------------|---------------------------|--------------------------------|
//! | `"..."`        | quoted, `""` → `"`        | quoted, `""` → `"`             |
//! | `\x`           | literal `x`               | literal `x`                    |
//! | empty unquoted | SQL NULL                  | error                          |
//! | `NULL` unquoted| the string `NULL`         | SQL NULL                       |
//! | `""`           | empty string              | empty string                   |
//! | whitespace     | kept verbatim             | trimmed outside quotes         |
//! | `{...}`        | literal text              | nested group, returned raw     |
//!
//! Only ASCII bytes are significant to the grammar, so the reader walks
//! bytes and slices at ASCII positions, which are always UTF-8 boundaries.
//! Tokens without quotes or escapes are borrowed from the input.

use std::borrow::Cow;

use crate::error::{ScanError, ScanErrorKind};

/// Which literal syntax to scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// `(f1,f2,...)`
    Record,
    /// `{e1,e2,...}`
    Array,
}

impl ScanMode {
    #[inline]
    fn open(self) -> u8 {
        match self {
            ScanMode::Record => b'(',
            ScanMode::Array => b'{',
        }
    }

    #[inline]
    fn close(self) -> u8 {
        match self {
            ScanMode::Record => b')',
            ScanMode::Array => b'}',
        }
    }

    fn context(self) -> &'static str {
        match self {
            ScanMode::Record => "record",
            ScanMode::Array => "array",
        }
    }
}

/// One field or element of a scanned level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSlot<'a> {
    /// Unescaped text; raw `{...}` text for nested groups
    pub text: Cow<'a, str>,
    /// Explicit SQL NULL, distinct from an empty string
    pub is_sql_null: bool,
    /// Unquoted nested array group (array mode only)
    pub is_group: bool,
    /// Byte offset of the slot in the scanned text
    pub offset: usize,
}

impl<'a> RawSlot<'a> {
    fn null(offset: usize) -> Self {
        Self {
            text: Cow::Borrowed(""),
            is_sql_null: true,
            is_group: false,
            offset,
        }
    }
}

/// Scan one record or array level into its slots
pub fn scan(text: &str, mode: ScanMode) -> Result<Vec<RawSlot<'_>>, ScanError> {
    let mut scanner = Scanner {
        src: text,
        bytes: text.as_bytes(),
        pos: 0,
        mode,
    };

    scanner.skip_space();
    if mode == ScanMode::Array {
        scanner.skip_dimension_decoration()?;
    }
    scanner.expect_open()?;
    let slots = scanner.scan_items()?;

    scanner.skip_space();
    if scanner.pos < scanner.bytes.len() {
        return Err(scanner.error(ScanErrorKind::TrailingInput(mode.close() as char)));
    }
    Ok(slots)
}

/// PostgreSQL's notion of whitespace in literals
#[inline]
fn is_pg_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    mode: ScanMode,
}

impl<'a> Scanner<'a> {
    #[inline]
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    #[inline]
    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn error(&self, kind: ScanErrorKind) -> ScanError {
        self.error_at(self.pos, kind)
    }

    fn error_at(&self, position: usize, kind: ScanErrorKind) -> ScanError {
        ScanError {
            position,
            kind,
            context: self.mode.context(),
        }
    }

    fn current_char(&self) -> char {
        self.src[self.pos..].chars().next().unwrap_or('\0')
    }

    fn skip_space(&mut self) {
        while matches!(self.peek(), Some(b) if is_pg_space(b)) {
            self.pos += 1;
        }
    }

    /// Skip `[lo:hi][lo:hi]=` emitted for arrays with non-default bounds
    fn skip_dimension_decoration(&mut self) -> Result<(), ScanError> {
        if self.peek() != Some(b'[') {
            return Ok(());
        }
        match self.bytes[self.pos..].iter().position(|&b| b == b'=') {
            Some(offset) => {
                self.pos += offset + 1;
                self.skip_space();
                Ok(())
            }
            None => Err(self.error(ScanErrorKind::UnexpectedChar('['))),
        }
    }

    fn expect_open(&mut self) -> Result<(), ScanError> {
        if self.peek() == Some(self.mode.open()) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(ScanErrorKind::ExpectedOpen(self.mode.open() as char)))
        }
    }

    fn scan_items(&mut self) -> Result<Vec<RawSlot<'a>>, ScanError> {
        let close = self.mode.close();
        let mut slots = Vec::new();

        if self.mode == ScanMode::Array {
            self.skip_space();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(slots);
            }
        }

        loop {
            slots.push(self.read_slot()?);
            if self.mode == ScanMode::Array {
                self.skip_space();
            }
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b) if b == close => {
                    self.pos += 1;
                    self.check_uniform(&slots)?;
                    return Ok(slots);
                }
                Some(_) => return Err(self.error(ScanErrorKind::UnexpectedChar(self.current_char()))),
                None => return Err(self.error(ScanErrorKind::UnterminatedGroup(close as char))),
            }
        }
    }

    /// Sub-arrays and plain elements cannot share a level
    fn check_uniform(&self, slots: &[RawSlot<'a>]) -> Result<(), ScanError> {
        let Some(first) = slots.first() else {
            return Ok(());
        };
        match slots.iter().find(|s| s.is_group != first.is_group) {
            Some(odd) => Err(self.error_at(odd.offset, ScanErrorKind::MismatchedDimensions)),
            None => Ok(()),
        }
    }

    fn read_slot(&mut self) -> Result<RawSlot<'a>, ScanError> {
        if self.mode == ScanMode::Array {
            self.skip_space();
            if self.peek() == Some(b'{') {
                return self.read_group();
            }
        }

        let token_start = self.pos;
        let token = self.read_token()?;

        match self.mode {
            ScanMode::Record if !token.escaped && token.text.is_empty() => Ok(RawSlot::null(token_start)),
            ScanMode::Array if !token.escaped && token.text.is_empty() => {
                Err(self.error_at(token_start, ScanErrorKind::EmptyElement))
            }
            ScanMode::Array if !token.escaped && token.text.eq_ignore_ascii_case("NULL") => {
                Ok(RawSlot::null(token_start))
            }
            _ => Ok(RawSlot {
                text: token.text,
                is_sql_null: false,
                is_group: false,
                offset: token_start,
            }),
        }
    }

    /// Read one token up to the next unquoted delimiter or closing bracket,
    /// removing quotes and backslash escapes.
    fn read_token(&mut self) -> Result<Token<'a>, ScanError> {
        let close = self.mode.close();
        let token_start = self.pos;
        let mut owned: Option<String> = None;
        let mut run_start = self.pos;
        let mut escaped = false;
        let mut quote_start: Option<usize> = None;

        loop {
            let Some(b) = self.peek() else {
                return Err(match quote_start {
                    Some(at) => self.error_at(at, ScanErrorKind::UnterminatedQuote),
                    None => self.error(ScanErrorKind::UnterminatedGroup(close as char)),
                });
            };

            if quote_start.is_some() {
                match b {
                    b'"' if self.peek_at(1) == Some(b'"') => {
                        // keep one of the two quotes
                        owned
                            .get_or_insert_with(String::new)
                            .push_str(&self.src[run_start..self.pos + 1]);
                        self.pos += 2;
                        run_start = self.pos;
                    }
                    b'"' => {
                        owned
                            .get_or_insert_with(String::new)
                            .push_str(&self.src[run_start..self.pos]);
                        self.pos += 1;
                        run_start = self.pos;
                        quote_start = None;
                    }
                    b'\\' => {
                        let buf = owned.get_or_insert_with(String::new);
                        buf.push_str(&self.src[run_start..self.pos]);
                        self.pos = self.push_escaped(buf, self.pos + 1)?;
                        run_start = self.pos;
                    }
                    _ => self.pos += 1,
                }
                continue;
            }

            match b {
                b'"' => {
                    owned
                        .get_or_insert_with(String::new)
                        .push_str(&self.src[run_start..self.pos]);
                    quote_start = Some(self.pos);
                    escaped = true;
                    self.pos += 1;
                    run_start = self.pos;
                }
                b'\\' => {
                    let buf = owned.get_or_insert_with(String::new);
                    buf.push_str(&self.src[run_start..self.pos]);
                    self.pos = self.push_escaped(buf, self.pos + 1)?;
                    escaped = true;
                    run_start = self.pos;
                }
                b',' => break,
                b if b == close => break,
                b'{' if self.mode == ScanMode::Array => {
                    return Err(self.error(ScanErrorKind::UnexpectedChar('{')));
                }
                _ => self.pos += 1,
            }
        }

        let mut run_end = self.pos;
        if self.mode == ScanMode::Array {
            while run_end > run_start && is_pg_space(self.bytes[run_end - 1]) {
                run_end -= 1;
            }
        }

        let text = match owned {
            Some(mut buf) => {
                buf.push_str(&self.src[run_start..run_end]);
                Cow::Owned(buf)
            }
            None => Cow::Borrowed(&self.src[token_start..run_end]),
        };
        Ok(Token { text, escaped })
    }

    /// Append the character following a backslash; returns the position after it
    fn push_escaped(&self, buf: &mut String, at: usize) -> Result<usize, ScanError> {
        match self.src.get(at..).and_then(|rest| rest.chars().next()) {
            Some(c) => {
                buf.push(c);
                Ok(at + c.len_utf8())
            }
            None => Err(self.error_at(at - 1, ScanErrorKind::DanglingEscape)),
        }
    }

    /// Capture a nested `{...}` group verbatim, honouring quotes and escapes
    fn read_group(&mut self) -> Result<RawSlot<'a>, ScanError> {
        let start = self.pos;
        let mut depth = 0usize;
        let mut quote_start: Option<usize> = None;

        while let Some(b) = self.peek() {
            match b {
                b'\\' => {
                    if self.peek_at(1).is_none() {
                        return Err(self.error(ScanErrorKind::DanglingEscape));
                    }
                    self.pos += 2;
                    continue;
                }
                b'"' if quote_start.is_some() && self.peek_at(1) == Some(b'"') => {
                    self.pos += 2;
                    continue;
                }
                b'"' if quote_start.is_some() => quote_start = None,
                b'"' => quote_start = Some(self.pos),
                _ if quote_start.is_some() => {}
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        return Ok(RawSlot {
                            text: Cow::Borrowed(&self.src[start..self.pos]),
                            is_sql_null: false,
                            is_group: true,
                            offset: start,
                        });
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }

        Err(match quote_start {
            Some(at) => self.error_at(at, ScanErrorKind::UnterminatedQuote),
            None => self.error_at(start, ScanErrorKind::UnterminatedGroup('}')),
        })
    }
}

struct Token<'a> {
    text: Cow<'a, str>,
    /// Any quote or backslash was seen; such a token never signals NULL
    escaped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts<'a>(slots: &'a [RawSlot<'a>]) -> Vec<Option<&'a str>> {
        slots
            .iter()
            .map(|s| if s.is_sql_null { None } else { Some(s.text.as_ref()) })
            .collect()
    }

    #[test]
    fn test_record_simple_fields_are_borrowed() {
        let slots = scan("(1,first)", ScanMode::Record).unwrap();
        assert_eq!(texts(&slots), vec![Some("1"), Some("first")]);
        assert!(slots.iter().all(|s| matches!(s.text, Cow::Borrowed(_))));
    }

    #[test]
    fn test_record_empty_unquoted_is_null() {
        let slots = scan("(,third)", ScanMode::Record).unwrap();
        assert_eq!(texts(&slots), vec![None, Some("third")]);

        let slots = scan("(,)", ScanMode::Record).unwrap();
        assert_eq!(texts(&slots), vec![None, None]);
    }

    #[test]
    fn test_record_quoted_empty_is_empty_string() {
        let slots = scan("(1,\"\")", ScanMode::Record).unwrap();
        assert_eq!(texts(&slots), vec![Some("1"), Some("")]);
        assert!(!slots[1].is_sql_null);
    }

    #[test]
    fn test_record_single_null_field() {
        let slots = scan("()", ScanMode::Record).unwrap();
        assert_eq!(texts(&slots), vec![None]);
    }

    #[test]
    fn test_record_null_word_is_text() {
        let slots = scan("(NULL,null)", ScanMode::Record).unwrap();
        assert_eq!(texts(&slots), vec![Some("NULL"), Some("null")]);
    }

    #[test]
    fn test_record_doubled_quotes_and_backslashes() {
        let slots = scan(r#"("say ""hi""","a\\b","x,y","(p)")"#, ScanMode::Record).unwrap();
        assert_eq!(
            texts(&slots),
            vec![Some("say \"hi\""), Some("a\\b"), Some("x,y"), Some("(p)")]
        );
    }

    #[test]
    fn test_record_keeps_whitespace() {
        let slots = scan("( a , b )", ScanMode::Record).unwrap();
        assert_eq!(texts(&slots), vec![Some(" a "), Some(" b ")]);
    }

    #[test]
    fn test_record_nested_composite_stays_text() {
        let slots = scan(r#"(a,"(1,""x y"")")"#, ScanMode::Record).unwrap();
        assert_eq!(texts(&slots), vec![Some("a"), Some("(1,\"x y\")")]);
    }

    #[test]
    fn test_record_newline_and_tab_inside_quotes() {
        let slots = scan("(\"line1\nline2\",\"a\tb\")", ScanMode::Record).unwrap();
        assert_eq!(texts(&slots), vec![Some("line1\nline2"), Some("a\tb")]);
    }

    #[test]
    fn test_record_partial_quoting_concatenates() {
        let slots = scan(r#"(ab"c,d"e)"#, ScanMode::Record).unwrap();
        assert_eq!(texts(&slots), vec![Some("abc,de")]);
    }

    #[test]
    fn test_array_elements_and_null() {
        let slots = scan("{1,NULL,3}", ScanMode::Array).unwrap();
        assert_eq!(texts(&slots), vec![Some("1"), None, Some("3")]);
    }

    #[test]
    fn test_array_null_is_case_insensitive() {
        let slots = scan("{null,Null}", ScanMode::Array).unwrap();
        assert_eq!(texts(&slots), vec![None, None]);
    }

    #[test]
    fn test_array_quoted_null_is_string() {
        let slots = scan(r#"{"NULL","null"}"#, ScanMode::Array).unwrap();
        assert_eq!(texts(&slots), vec![Some("NULL"), Some("null")]);
    }

    #[test]
    fn test_array_empty() {
        assert!(scan("{}", ScanMode::Array).unwrap().is_empty());
        assert!(scan("{ }", ScanMode::Array).unwrap().is_empty());
    }

    #[test]
    fn test_array_quoted_elements_with_specials() {
        let slots = scan(r#"{"a,b","c\"d","e\\f","",plain}"#, ScanMode::Array).unwrap();
        assert_eq!(
            texts(&slots),
            vec![Some("a,b"), Some("c\"d"), Some("e\\f"), Some(""), Some("plain")]
        );
    }

    #[test]
    fn test_array_trims_unquoted_whitespace() {
        let slots = scan("{ a b , \" c \" }", ScanMode::Array).unwrap();
        assert_eq!(texts(&slots), vec![Some("a b"), Some(" c ")]);
    }

    #[test]
    fn test_array_of_composites() {
        let slots = scan(r#"{"(1,first)",NULL,"(,third)"}"#, ScanMode::Array).unwrap();
        assert_eq!(texts(&slots), vec![Some("(1,first)"), None, Some("(,third)")]);
    }

    #[test]
    fn test_array_nested_groups_returned_raw() {
        let slots = scan(r#"{{"(1,a)","(2,b)"},{"(3,c)","(4,d)"}}"#, ScanMode::Array).unwrap();
        assert_eq!(slots.len(), 2);
        assert!(slots.iter().all(|s| s.is_group));
        assert_eq!(slots[0].text, r#"{"(1,a)","(2,b)"}"#);
        assert_eq!(slots[1].text, r#"{"(3,c)","(4,d)"}"#);
    }

    #[test]
    fn test_array_level_mixing_groups_and_elements() {
        let err = scan("{{1,2},3}", ScanMode::Array).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::MismatchedDimensions);
        assert_eq!(err.position, 7);

        let err = scan("{1,{2}}", ScanMode::Array).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::MismatchedDimensions);
        assert_eq!(err.position, 3);

        let err = scan("{{1},NULL}", ScanMode::Array).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::MismatchedDimensions);
    }

    #[test]
    fn test_slot_offsets() {
        let slots = scan("{ a, \"b\"}", ScanMode::Array).unwrap();
        let offsets: Vec<usize> = slots.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![2, 5]);

        let slots = scan("(x,,\"y\")", ScanMode::Record).unwrap();
        let offsets: Vec<usize> = slots.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![1, 3, 4]);
    }

    #[test]
    fn test_array_group_with_braces_inside_quotes() {
        let slots = scan(r#"{{"}",x},{y}}"#, ScanMode::Array).unwrap();
        assert_eq!(slots[0].text, r#"{"}",x}"#);
        assert_eq!(slots[1].text, "{y}");
    }

    #[test]
    fn test_array_dimension_decoration() {
        let slots = scan("[0:1]={7,8}", ScanMode::Array).unwrap();
        assert_eq!(texts(&slots), vec![Some("7"), Some("8")]);
    }

    #[test]
    fn test_unicode_passthrough() {
        let slots = scan("{\"héllo wörld\",日本語,🎉,\"שלום\"}", ScanMode::Array).unwrap();
        assert_eq!(
            texts(&slots),
            vec![Some("héllo wörld"), Some("日本語"), Some("🎉"), Some("שלום")]
        );

        let slots = scan("(\\é,\"\\🎉\")", ScanMode::Record).unwrap();
        assert_eq!(texts(&slots), vec![Some("é"), Some("🎉")]);
    }

    #[test]
    fn test_unterminated_quote() {
        let err = scan("(1,\"abc)", ScanMode::Record).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::UnterminatedQuote);
        assert_eq!(err.position, 3);
    }

    #[test]
    fn test_missing_close() {
        let err = scan("(1,2", ScanMode::Record).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::UnterminatedGroup(')'));

        let err = scan("{{1,2}", ScanMode::Array).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::UnterminatedGroup('}'));

        let err = scan("{{1,2", ScanMode::Array).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::UnterminatedGroup('}'));
    }

    #[test]
    fn test_trailing_input() {
        let err = scan("{1,2}}", ScanMode::Array).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::TrailingInput('}'));
        assert_eq!(err.position, 5);

        assert!(scan("(1,2) ", ScanMode::Record).is_ok());
    }

    #[test]
    fn test_wrong_opening() {
        let err = scan("1,2", ScanMode::Record).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::ExpectedOpen('('));

        let err = scan("(1,2)", ScanMode::Array).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::ExpectedOpen('{'));
    }

    #[test]
    fn test_array_empty_element_is_error() {
        let err = scan("{a,,b}", ScanMode::Array).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::EmptyElement);
        assert_eq!(err.position, 3);
    }

    #[test]
    fn test_dangling_escape() {
        let err = scan("(abc\\", ScanMode::Record).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::DanglingEscape);
    }

    #[test]
    fn test_brace_inside_unquoted_array_element() {
        let err = scan("{a{b}", ScanMode::Array).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::UnexpectedChar('{'));
    }

    #[test]
    fn test_junk_after_quoted_element_group() {
        let err = scan("{{1} x}", ScanMode::Array).unwrap_err();
        assert_eq!(err.kind, ScanErrorKind::UnexpectedChar('x'));
    }
}
