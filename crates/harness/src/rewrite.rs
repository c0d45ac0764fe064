//! Resolution rewriting for thumbnail runs
//!
//! Scripts request image sizes in three ways:
//!
//! ```text
//! viewer.display()               ->  viewer.display(resolution=(N, N))
//! viewer.display((800, 600))     ->  viewer.display((N, N))
//! viewer.image(resolution=(W,H)) ->  viewer.image(resolution=(N, N))
//! ```
//!
//! Matching works on a token stream rather than on raw text, so spacing,
//! line breaks and comments inside a call do not defeat it, and string
//! literals or comments that merely mention these forms are left alone.

use std::ops::Range;

/// Rewrites every resolution request to an `N x N` square
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionRewriter {
    size: u32,
}

impl ResolutionRewriter {
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Rewrite `source`; text without a resolution request comes back unchanged
    pub fn rewrite(&self, source: &str) -> String {
        let edits = self.edits(source);
        if edits.is_empty() {
            return source.to_string();
        }

        let mut out = String::with_capacity(source.len());
        let mut cursor = 0;
        for edit in edits {
            out.push_str(&source[cursor..edit.span.start]);
            out.push_str(&edit.replacement);
            cursor = edit.span.end;
        }
        out.push_str(&source[cursor..]);
        out
    }

    /// Number of resolution requests found in `source`
    pub fn matches(&self, source: &str) -> usize {
        self.edits(source).len()
    }

    fn tuple(&self) -> String {
        format!("({n}, {n})", n = self.size)
    }

    fn edits(&self, source: &str) -> Vec<Edit> {
        let stream = TokenStream::new(source);
        let mut edits: Vec<Edit> = Vec::new();

        for i in 0..stream.len() {
            let found = self
                .keyword_form(&stream, i)
                .or_else(|| self.bare_display_form(&stream, i))
                .or_else(|| self.positional_display_form(&stream, i));

            if let Some(edit) = found {
                let overlaps = edits.last().map_or(false, |last| edit.span.start < last.span.end);
                if !overlaps {
                    edits.push(edit);
                }
            }
        }

        edits
    }

    /// `resolution = ( W , H )`
    fn keyword_form(&self, stream: &TokenStream<'_>, i: usize) -> Option<Edit> {
        if !stream.is_ident(i, "resolution") || !stream.is_punct(i + 1, '=') || !stream.is_punct(i + 2, '(') {
            return None;
        }
        let close = stream.matching_close(i + 2)?;
        if !stream.is_pair(i + 2, close) {
            return None;
        }
        Some(Edit {
            span: stream.span(i + 2, close),
            replacement: self.tuple(),
        })
    }

    /// `.display ( )`
    fn bare_display_form(&self, stream: &TokenStream<'_>, i: usize) -> Option<Edit> {
        if !stream.is_display_call(i) || !stream.is_punct(i + 3, ')') {
            return None;
        }
        Some(Edit {
            span: stream.span(i + 2, i + 3),
            replacement: format!("(resolution={})", self.tuple()),
        })
    }

    /// `.display ( ( W , H ) )`
    fn positional_display_form(&self, stream: &TokenStream<'_>, i: usize) -> Option<Edit> {
        if !stream.is_display_call(i) || !stream.is_punct(i + 3, '(') {
            return None;
        }
        let inner_close = stream.matching_close(i + 3)?;
        if !stream.is_punct(inner_close + 1, ')') || !stream.is_pair(i + 3, inner_close) {
            return None;
        }
        Some(Edit {
            span: stream.span(i + 3, inner_close),
            replacement: self.tuple(),
        })
    }
}

#[derive(Debug)]
struct Edit {
    span: Range<usize>,
    replacement: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Whitespace,
    Comment,
    Str,
    Ident,
    Number,
    Punct(char),
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: Kind,
    start: usize,
    end: usize,
}

/// Significant tokens (no whitespace or comments) over a source text
struct TokenStream<'a> {
    source: &'a str,
    tokens: Vec<Token>,
}

impl<'a> TokenStream<'a> {
    fn new(source: &'a str) -> Self {
        let tokens = lex(source)
            .into_iter()
            .filter(|t| !matches!(t.kind, Kind::Whitespace | Kind::Comment))
            .collect();
        Self { source, tokens }
    }

    fn len(&self) -> usize {
        self.tokens.len()
    }

    fn is_ident(&self, i: usize, name: &str) -> bool {
        self.tokens
            .get(i)
            .map_or(false, |t| t.kind == Kind::Ident && &self.source[t.start..t.end] == name)
    }

    fn is_punct(&self, i: usize, c: char) -> bool {
        self.tokens.get(i).map_or(false, |t| t.kind == Kind::Punct(c))
    }

    fn is_display_call(&self, i: usize) -> bool {
        self.is_punct(i, '.') && self.is_ident(i + 1, "display") && self.is_punct(i + 2, '(')
    }

    /// Byte span from the start of token `from` to the end of token `to`
    fn span(&self, from: usize, to: usize) -> Range<usize> {
        self.tokens[from].start..self.tokens[to].end
    }

    /// Index of the bracket closing the one opened at `open`
    fn matching_close(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (offset, token) in self.tokens[open..].iter().enumerate() {
            match token.kind {
                Kind::Punct('(') | Kind::Punct('[') | Kind::Punct('{') => depth += 1,
                Kind::Punct(')') | Kind::Punct(']') | Kind::Punct('}') => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(open + offset);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// True when the brackets at `open`..`close` hold exactly two
    /// non-empty elements, with an optional trailing comma
    fn is_pair(&self, open: usize, close: usize) -> bool {
        let mut depth = 0usize;
        let mut lengths = vec![0usize];

        for token in &self.tokens[open + 1..close] {
            match token.kind {
                Kind::Punct('(') | Kind::Punct('[') | Kind::Punct('{') => depth += 1,
                Kind::Punct(')') | Kind::Punct(']') | Kind::Punct('}') => {
                    depth = depth.saturating_sub(1)
                }
                Kind::Punct(',') if depth == 0 => {
                    lengths.push(0);
                    continue;
                }
                _ => {}
            }
            if let Some(last) = lengths.last_mut() {
                *last += 1;
            }
        }

        if lengths.len() == 3 && lengths[2] == 0 {
            lengths.pop();
        }
        lengths.len() == 2 && lengths.iter().all(|&n| n > 0)
    }
}

const STRING_PREFIXES: &[&str] = &["r", "u", "b", "f", "br", "rb", "fr", "rf"];

fn lex(source: &str) -> Vec<Token> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < source.len() {
        let start = pos;
        let c = match source[pos..].chars().next() {
            Some(c) => c,
            None => break,
        };

        let kind = if c.is_whitespace() || (c == '\\' && matches!(bytes.get(pos + 1), Some(b'\n') | Some(b'\r'))) {
            pos += c.len_utf8();
            while let Some(next) = source[pos..].chars().next() {
                if !next.is_whitespace() {
                    break;
                }
                pos += next.len_utf8();
            }
            Kind::Whitespace
        } else if c == '#' {
            pos = source[pos..].find('\n').map_or(source.len(), |n| pos + n);
            Kind::Comment
        } else if c == '"' || c == '\'' {
            pos = string_end(source, pos);
            Kind::Str
        } else if c == '_' || c.is_alphabetic() {
            while let Some(next) = source[pos..].chars().next() {
                if next != '_' && !next.is_alphanumeric() {
                    break;
                }
                pos += next.len_utf8();
            }
            let word = source[start..pos].to_ascii_lowercase();
            if matches!(bytes.get(pos), Some(b'"') | Some(b'\'')) && STRING_PREFIXES.contains(&word.as_str()) {
                pos = string_end(source, pos);
                Kind::Str
            } else {
                Kind::Ident
            }
        } else if c.is_ascii_digit() {
            while let Some(next) = source[pos..].chars().next() {
                if next != '.' && next != '_' && !next.is_ascii_alphanumeric() {
                    break;
                }
                pos += next.len_utf8();
            }
            Kind::Number
        } else {
            pos += c.len_utf8();
            Kind::Punct(c)
        };

        tokens.push(Token { kind, start, end: pos });
    }

    tokens
}

/// Offset just past the newline ending the line that starts at `from`,
/// carried over any string literal still open at that newline
pub(crate) fn line_end_outside_strings(source: &str, from: usize) -> usize {
    let bytes = source.as_bytes();
    let mut pos = from;

    while pos < bytes.len() {
        match bytes[pos] {
            b'\n' => return pos + 1,
            b'#' => pos = source[pos..].find('\n').map_or(bytes.len(), |n| pos + n),
            b'"' | b'\'' => pos = string_end(source, pos),
            _ => pos += 1,
        }
    }

    bytes.len()
}

/// End offset of the string literal whose opening quote is at `pos`
fn string_end(source: &str, pos: usize) -> usize {
    let bytes = source.as_bytes();
    let quote = bytes[pos];
    let triple = bytes.get(pos + 1) == Some(&quote) && bytes.get(pos + 2) == Some(&quote);
    let mut i = if triple { pos + 3 } else { pos + 1 };

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' if !triple => return i,
            b if b == quote => {
                if !triple {
                    return i + 1;
                }
                if bytes.get(i + 1) == Some(&quote) && bytes.get(i + 2) == Some(&quote) {
                    return i + 3;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }

    bytes.len()
}
