use crate::error::ShellFormatError;

use super::ast::{HereDoc, List, RedirOp, Word, WordPart};
use super::parser::Parser;

type Result<T> = std::result::Result<T, ShellFormatError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    AndIf,
    OrIf,
    DSemi,
    Semi,
    Amp,
    Pipe,
    PipeAmp,
    LParen,
    RParen,
    Redir(RedirOp),
}

impl Op {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Op::AndIf => "&&",
            Op::OrIf => "||",
            Op::DSemi => ";;",
            Op::Semi => ";",
            Op::Amp => "&",
            Op::Pipe => "|",
            Op::PipeAmp => "|&",
            Op::LParen => "(",
            Op::RParen => ")",
            Op::Redir(op) => op.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Word(Word),
    Op(Op),
    IoNumber(String),
    Newline,
    Comment(String),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// A `\` newline separated this token from the previous one.
    pub continued: bool,
    pub line: usize,
    pub column: usize,
}

struct PendingHereDoc {
    delimiter: String,
    strip_tabs: bool,
    line: usize,
    column: usize,
}

/// On-demand tokenizer over a shared character buffer.
///
/// Here-document bodies are read when the newline ending their line is
/// lexed and collected in `bodies`, in source order.
pub(crate) struct Lexer<'a> {
    src: &'a [char],
    pos: usize,
    line: usize,
    line_start: usize,
    expect_delimiter: Option<bool>,
    pending: Vec<PendingHereDoc>,
    pub(crate) bodies: Vec<HereDoc>,
    /// Open statement lists, counted across nested substitutions.
    pub(crate) depth: usize,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(src: &'a [char]) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            line_start: 0,
            expect_delimiter: None,
            pending: Vec::new(),
            bodies: Vec::new(),
            depth: 0,
        }
    }

    /// A lexer continuing from this one's position with its own here-document
    /// state, for the inside of `$( ... )`.
    fn fork(&self) -> Lexer<'a> {
        Lexer {
            src: self.src,
            pos: self.pos,
            line: self.line,
            line_start: self.line_start,
            expect_delimiter: None,
            pending: Vec::new(),
            bodies: Vec::new(),
            depth: self.depth,
        }
    }

    pub(crate) fn error(&self, line: usize, column: usize, message: impl Into<String>) -> ShellFormatError {
        ShellFormatError {
            line,
            column,
            message: message.into(),
        }
    }

    pub(crate) fn position(&self) -> (usize, usize) {
        (self.line, self.pos - self.line_start + 1)
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.src.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.line_start = self.pos;
        }
        Some(c)
    }

    pub(crate) fn next_token(&mut self) -> Result<Token> {
        let mut continued = false;
        loop {
            match self.peek() {
                Some(' ' | '\t') => {
                    self.bump();
                }
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    self.bump();
                    self.bump();
                    continued = true;
                }
                _ => break,
            }
        }

        let (line, column) = self.position();
        let kind = match self.peek() {
            None => {
                if let Some(pending) = self.pending.first() {
                    return Err(self.error(
                        pending.line,
                        pending.column,
                        format!("unclosed here-document '{}'", pending.delimiter),
                    ));
                }
                TokenKind::Eof
            }
            Some('\n') => {
                self.bump();
                self.read_heredoc_bodies()?;
                TokenKind::Newline
            }
            Some('#') => {
                let mut text = String::new();
                while let Some(c) = self.peek().filter(|&c| c != '\n') {
                    text.push(c);
                    self.bump();
                }
                TokenKind::Comment(text)
            }
            Some(c) if is_operator_start(c) => TokenKind::Op(self.read_op()),
            Some(c) if c.is_ascii_digit() => match self.read_io_number() {
                Some(fd) => TokenKind::IoNumber(fd),
                None => TokenKind::Word(self.read_word()?),
            },
            Some(_) => TokenKind::Word(self.read_word()?),
        };

        match (&kind, self.expect_delimiter.take()) {
            (TokenKind::Op(Op::Redir(op)), _) if op.is_heredoc() => {
                self.expect_delimiter = Some(*op == RedirOp::HereDocStrip);
            }
            (TokenKind::Word(word), Some(strip_tabs)) => {
                self.pending.push(PendingHereDoc {
                    delimiter: unquote(word),
                    strip_tabs,
                    line,
                    column,
                });
            }
            _ => {}
        }

        Ok(Token {
            kind,
            continued,
            line,
            column,
        })
    }

    fn read_op(&mut self) -> Op {
        let c = self.peek().unwrap_or_default();
        let next = self.peek_at(1);
        let third = self.peek_at(2);
        let (op, len) = match (c, next, third) {
            ('&', Some('&'), _) => (Op::AndIf, 2),
            ('&', Some('>'), Some('>')) => (Op::Redir(RedirOp::AllAppend), 3),
            ('&', Some('>'), _) => (Op::Redir(RedirOp::AllOut), 2),
            ('&', _, _) => (Op::Amp, 1),
            ('|', Some('|'), _) => (Op::OrIf, 2),
            ('|', Some('&'), _) => (Op::PipeAmp, 2),
            ('|', _, _) => (Op::Pipe, 1),
            (';', Some(';'), _) => (Op::DSemi, 2),
            (';', _, _) => (Op::Semi, 1),
            ('(', _, _) => (Op::LParen, 1),
            (')', _, _) => (Op::RParen, 1),
            ('<', Some('<'), Some('<')) => (Op::Redir(RedirOp::HereString), 3),
            ('<', Some('<'), Some('-')) => (Op::Redir(RedirOp::HereDocStrip), 3),
            ('<', Some('<'), _) => (Op::Redir(RedirOp::HereDoc), 2),
            ('<', Some('&'), _) => (Op::Redir(RedirOp::DupIn), 2),
            ('<', Some('>'), _) => (Op::Redir(RedirOp::ReadWrite), 2),
            ('<', _, _) => (Op::Redir(RedirOp::In), 1),
            ('>', Some('>'), _) => (Op::Redir(RedirOp::Append), 2),
            ('>', Some('&'), _) => (Op::Redir(RedirOp::DupOut), 2),
            ('>', Some('|'), _) => (Op::Redir(RedirOp::Clobber), 2),
            _ => (Op::Redir(RedirOp::Out), 1),
        };
        for _ in 0..len {
            self.bump();
        }
        op
    }

    /// Digits immediately followed by `<` or `>` name a file descriptor.
    fn read_io_number(&mut self) -> Option<String> {
        let digits = self.src[self.pos..]
            .iter()
            .take_while(|c| c.is_ascii_digit())
            .count();
        match self.peek_at(digits) {
            Some('<' | '>') => {
                let fd: String = self.src[self.pos..self.pos + digits].iter().collect();
                self.pos += digits;
                Some(fd)
            }
            _ => None,
        }
    }

    fn read_word(&mut self) -> Result<Word> {
        let mut parts = Vec::new();
        let mut lit = String::new();
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\n' | ';' | '&' | '|' | '<' | '>' | ')' => break,
                '(' if parts.is_empty() && is_array_assignment(&lit) => {
                    self.read_balanced_parens(&mut lit)?;
                }
                '(' => break,
                '\\' => {
                    self.bump();
                    match self.bump() {
                        Some('\n') => {}
                        Some(escaped) => {
                            lit.push('\\');
                            lit.push(escaped);
                        }
                        None => lit.push('\\'),
                    }
                }
                '\'' => self.read_single_quoted(&mut lit)?,
                '"' => {
                    flush(&mut lit, &mut parts);
                    let quoted = self.read_double_quoted()?;
                    parts.push(WordPart::Quoted(quoted));
                }
                '$' => self.read_dollar(&mut lit, &mut parts, false)?,
                '`' => self.read_backquoted(&mut lit)?,
                _ => {
                    lit.push(c);
                    self.bump();
                }
            }
        }
        flush(&mut lit, &mut parts);
        Ok(Word { parts })
    }

    fn read_single_quoted(&mut self, lit: &mut String) -> Result<()> {
        let (line, column) = self.position();
        self.bump();
        lit.push('\'');
        loop {
            match self.bump() {
                None => return Err(self.error(line, column, "reached EOF without closing quote '")),
                Some('\'') => break,
                Some(c) => lit.push(c),
            }
        }
        lit.push('\'');
        Ok(())
    }

    fn read_double_quoted(&mut self) -> Result<Vec<WordPart>> {
        let (line, column) = self.position();
        self.bump();
        let mut parts = Vec::new();
        let mut lit = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(self.error(line, column, "reached EOF without closing quote \""));
                }
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    match self.bump() {
                        Some('\n') => {}
                        Some(escaped) => {
                            lit.push('\\');
                            lit.push(escaped);
                        }
                        None => {
                            return Err(self.error(line, column, "reached EOF without closing quote \""));
                        }
                    }
                }
                Some('$') => self.read_dollar(&mut lit, &mut parts, true)?,
                Some('`') => self.read_backquoted(&mut lit)?,
                Some(c) => {
                    lit.push(c);
                    self.bump();
                }
            }
        }
        flush(&mut lit, &mut parts);
        Ok(parts)
    }

    fn read_backquoted(&mut self, lit: &mut String) -> Result<()> {
        let (line, column) = self.position();
        self.bump();
        lit.push('`');
        loop {
            match self.bump() {
                None => return Err(self.error(line, column, "reached EOF without closing quote `")),
                Some('\\') => {
                    lit.push('\\');
                    if let Some(escaped) = self.bump() {
                        lit.push(escaped);
                    }
                }
                Some('`') => break,
                Some(c) => lit.push(c),
            }
        }
        lit.push('`');
        Ok(())
    }

    /// `$` expansions. Inside double quotes `$'` is plain text.
    fn read_dollar(
        &mut self,
        lit: &mut String,
        parts: &mut Vec<WordPart>,
        quoted: bool,
    ) -> Result<()> {
        let (line, column) = self.position();
        match (self.peek_at(1), self.peek_at(2)) {
            (Some('('), Some('(')) => {
                for _ in 0..3 {
                    self.bump();
                }
                lit.push_str("$((");
                let mut depth = 0usize;
                loop {
                    match self.bump() {
                        None => {
                            return Err(self.error(line, column, "reached EOF without matching $(( with ))"));
                        }
                        Some('(') => {
                            depth += 1;
                            lit.push('(');
                        }
                        Some(')') if depth == 0 => {
                            if self.peek() != Some(')') {
                                return Err(self.error(line, column, "reached ) without matching $(( with ))"));
                            }
                            self.bump();
                            lit.push_str("))");
                            return Ok(());
                        }
                        Some(')') => {
                            depth -= 1;
                            lit.push(')');
                        }
                        Some(c) => lit.push(c),
                    }
                }
            }
            (Some('('), _) => {
                self.bump();
                self.bump();
                flush(lit, parts);
                let list = self.read_substitution(line, column)?;
                parts.push(WordPart::CmdSubst(list));
                Ok(())
            }
            (Some('{'), _) => {
                self.bump();
                self.bump();
                lit.push_str("${");
                let mut depth = 1usize;
                loop {
                    match self.bump() {
                        None => {
                            return Err(self.error(line, column, "reached EOF without matching ${ with }"));
                        }
                        Some('\\') => {
                            lit.push('\\');
                            if let Some(escaped) = self.bump() {
                                lit.push(escaped);
                            }
                        }
                        Some(quote @ ('\'' | '"')) => {
                            lit.push(quote);
                            while let Some(c) = self.bump() {
                                lit.push(c);
                                if c == quote {
                                    break;
                                }
                            }
                        }
                        Some('{') => {
                            depth += 1;
                            lit.push('{');
                        }
                        Some('}') => {
                            lit.push('}');
                            depth -= 1;
                            if depth == 0 {
                                return Ok(());
                            }
                        }
                        Some(c) => lit.push(c),
                    }
                }
            }
            (Some('\''), _) if !quoted => {
                self.bump();
                self.bump();
                lit.push_str("$'");
                loop {
                    match self.bump() {
                        None => return Err(self.error(line, column, "reached EOF without closing quote '")),
                        Some('\\') => {
                            lit.push('\\');
                            if let Some(escaped) = self.bump() {
                                lit.push(escaped);
                            }
                        }
                        Some('\'') => {
                            lit.push('\'');
                            return Ok(());
                        }
                        Some(c) => lit.push(c),
                    }
                }
            }
            _ => {
                self.bump();
                lit.push('$');
                Ok(())
            }
        }
    }

    /// Parse the program inside `$( ... )` with a nested parser sharing this
    /// buffer, then resume after the closing parenthesis.
    fn read_substitution(&mut self, line: usize, column: usize) -> Result<List> {
        let mut parser = Parser::new(self.fork());
        let list = parser.parse_substitution(line, column)?;
        let inner = parser.into_lexer();
        self.pos = inner.pos;
        self.line = inner.line;
        self.line_start = inner.line_start;
        Ok(list)
    }

    /// Copy `( ... )` of an array assignment verbatim.
    fn read_balanced_parens(&mut self, lit: &mut String) -> Result<()> {
        let (line, column) = self.position();
        let mut depth = 0usize;
        loop {
            match self.bump() {
                None => return Err(self.error(line, column, "reached EOF without matching ( with )")),
                Some(quote @ ('\'' | '"')) => {
                    lit.push(quote);
                    while let Some(c) = self.bump() {
                        lit.push(c);
                        if c == quote {
                            break;
                        }
                    }
                }
                Some('(') => {
                    depth += 1;
                    lit.push('(');
                }
                Some(')') => {
                    lit.push(')');
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(c) => lit.push(c),
            }
        }
    }

    fn read_heredoc_bodies(&mut self) -> Result<()> {
        for pending in std::mem::take(&mut self.pending) {
            let mut body = String::new();
            loop {
                if self.peek().is_none() {
                    return Err(self.error(
                        pending.line,
                        pending.column,
                        format!("unclosed here-document '{}'", pending.delimiter),
                    ));
                }
                let mut line = String::new();
                while let Some(c) = self.peek().filter(|&c| c != '\n') {
                    line.push(c);
                    self.bump();
                }
                self.bump();

                let candidate = if pending.strip_tabs {
                    line.trim_start_matches('\t')
                } else {
                    line.as_str()
                };
                if candidate == pending.delimiter {
                    self.bodies.push(HereDoc { body, end: line });
                    break;
                }
                body.push_str(&line);
                body.push('\n');
            }
        }
        Ok(())
    }
}

fn is_operator_start(c: char) -> bool {
    matches!(c, '&' | '|' | ';' | '(' | ')' | '<' | '>')
}

fn flush(lit: &mut String, parts: &mut Vec<WordPart>) {
    if !lit.is_empty() {
        parts.push(WordPart::Lit(std::mem::take(lit)));
    }
}

/// `name=` or `name+=` right before `(`.
fn is_array_assignment(lit: &str) -> bool {
    let Some(name) = lit.strip_suffix('=') else {
        return false;
    };
    let name = name.strip_suffix('+').unwrap_or(name);
    is_name(name)
}

pub(crate) fn is_name(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The delimiter a here-document body ends with: the word with quoting removed.
fn unquote(word: &Word) -> String {
    let mut out = String::new();
    for part in &word.parts {
        match part {
            WordPart::Lit(text) => {
                let mut chars = text.chars();
                while let Some(c) = chars.next() {
                    match c {
                        '\'' | '"' => {}
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                out.push(escaped);
                            }
                        }
                        _ => out.push(c),
                    }
                }
            }
            WordPart::Quoted(inner) => out.push_str(&unquote(&Word { parts: inner.clone() })),
            WordPart::CmdSubst(_) => {}
        }
    }
    out
}
