use crate::error::ShellFormatError;

use super::ast::{
    AndOr, AndOrOp, Break, CaseArm, Command, CommandKind, List, Pipeline, Redirect, SimpleItem,
    SimpleItemKind, Stmt, Word,
};
use super::lexer::{Lexer, Op, Token, TokenKind, is_name};

type Result<T> = std::result::Result<T, ShellFormatError>;

/// Reserved words that close a construct and so cannot start a command.
const CLOSERS: &[&str] = &["then", "elif", "else", "fi", "do", "done", "esac", "}", "in"];

/// Deepest nesting of compound commands and command substitutions accepted.
const MAX_NESTING: usize = 32;

/// Parse a complete shell program.
pub fn parse(src: &str) -> Result<List> {
    let chars: Vec<char> = src.chars().collect();
    let mut parser = Parser::new(Lexer::new(&chars));
    parser.parse_program()
}

/// What the next token means for the grammar, detached from the token
/// itself so the parser can keep consuming.
enum Head {
    Op(Op),
    Keyword(String),
    Word,
    IoNumber,
    Newline,
    Comment,
    Eof,
}

/// Recursive-descent parser with one token of lookahead.
pub(crate) struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Token>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(lexer: Lexer<'a>) -> Self {
        Self { lexer, peeked: None }
    }

    pub(crate) fn into_lexer(self) -> Lexer<'a> {
        self.lexer
    }

    fn peek(&mut self) -> Result<&Token> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        Ok(self.peeked.insert(token))
    }

    fn next(&mut self) -> Result<Token> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.lexer.next_token(),
        }
    }

    fn head(&mut self) -> Result<Head> {
        Ok(match &self.peek()?.kind {
            TokenKind::Op(op) => Head::Op(*op),
            TokenKind::Word(word) => match word.as_literal() {
                Some(text) => Head::Keyword(text.to_string()),
                None => Head::Word,
            },
            TokenKind::IoNumber(_) => Head::IoNumber,
            TokenKind::Newline => Head::Newline,
            TokenKind::Comment(_) => Head::Comment,
            TokenKind::Eof => Head::Eof,
        })
    }

    fn at_keyword(&mut self, keyword: &str) -> Result<bool> {
        Ok(matches!(self.head()?, Head::Keyword(ref k) if k == keyword))
    }

    fn unexpected(&self, token: &Token) -> ShellFormatError {
        let what = match &token.kind {
            TokenKind::Op(op) => format!("unexpected token {:?}", op.as_str()),
            TokenKind::Word(_) => "unexpected word".to_string(),
            TokenKind::IoNumber(fd) => format!("unexpected file descriptor {fd}"),
            TokenKind::Newline => "unexpected newline".to_string(),
            TokenKind::Comment(_) => "unexpected comment".to_string(),
            TokenKind::Eof => "unexpected end of input".to_string(),
        };
        self.lexer.error(token.line, token.column, what)
    }

    fn parse_program(&mut self) -> Result<List> {
        let mut list = self.parse_list(&[])?;
        let token = self.next()?;
        if token.kind != TokenKind::Eof {
            return Err(self.unexpected(&token));
        }
        self.attach_heredocs(&mut list);
        Ok(list)
    }

    /// Body of `$( ... )`; consumes the closing parenthesis.
    pub(crate) fn parse_substitution(&mut self, line: usize, column: usize) -> Result<List> {
        let mut list = self.parse_list(&[])?;
        let token = self.next()?;
        match token.kind {
            TokenKind::Op(Op::RParen) => {}
            TokenKind::Eof => {
                return Err(self
                    .lexer
                    .error(line, column, "reached EOF without matching $( with )"));
            }
            _ => return Err(self.unexpected(&token)),
        }
        self.attach_heredocs(&mut list);
        Ok(list)
    }

    fn attach_heredocs(&mut self, list: &mut List) {
        let mut bodies = std::mem::take(&mut self.lexer.bodies).into_iter();
        list.for_each_heredoc(&mut |redirect| redirect.heredoc = bodies.next());
    }

    /// Statements up to end of input, `)`, `;;` or one of the `stop` words.
    fn parse_list(&mut self, stop: &[&str]) -> Result<List> {
        if self.lexer.depth >= MAX_NESTING {
            let (line, column) = self.lexer.position();
            return Err(self.lexer.error(line, column, "commands nested too deeply"));
        }
        self.lexer.depth += 1;
        let list = self.parse_list_at_depth(stop);
        self.lexer.depth -= 1;
        list
    }

    fn parse_list_at_depth(&mut self, stop: &[&str]) -> Result<List> {
        let mut list = List::default();
        let mut newlines = 0usize;
        loop {
            match self.head()? {
                Head::Newline => {
                    self.next()?;
                    newlines += 1;
                    list.multiline = true;
                }
                Head::Comment => {
                    let token = self.next()?;
                    let text = match token.kind {
                        TokenKind::Comment(text) => text,
                        _ => return Err(self.unexpected(&token)),
                    };
                    let trailing = newlines == 0
                        && list
                            .stmts
                            .last()
                            .is_some_and(|s| s.and_or.is_some() && s.comment.is_none());
                    if trailing {
                        if let Some(last) = list.stmts.last_mut() {
                            last.comment = Some(text);
                        }
                    } else {
                        list.stmts.push(Stmt {
                            comment: Some(text),
                            newline_before: newlines > 0,
                            blank_before: newlines > 1,
                            ..Stmt::default()
                        });
                        newlines = 0;
                    }
                }
                Head::Eof | Head::Op(Op::RParen | Op::DSemi) => break,
                Head::Keyword(ref word) if stop.contains(&word.as_str()) => break,
                _ => {
                    let and_or = self.parse_and_or()?;
                    let mut stmt = Stmt {
                        and_or: Some(and_or),
                        newline_before: newlines > 0,
                        blank_before: newlines > 1,
                        ..Stmt::default()
                    };
                    newlines = 0;
                    match self.head()? {
                        Head::Op(Op::Semi) => {
                            self.next()?;
                        }
                        Head::Op(Op::Amp) => {
                            self.next()?;
                            stmt.background = true;
                        }
                        Head::Newline
                        | Head::Comment
                        | Head::Eof
                        | Head::Op(Op::RParen | Op::DSemi) => {}
                        _ => {
                            let token = self.next()?;
                            return Err(self.unexpected(&token));
                        }
                    }
                    list.stmts.push(stmt);
                }
            }
        }
        Ok(list)
    }

    /// Newlines and the comments between them, as allowed after an
    /// operator or inside a compound header. Returns whether a newline was
    /// seen, and the comments.
    fn linebreak(&mut self) -> Result<(bool, Vec<String>)> {
        let mut any = false;
        let mut comments = Vec::new();
        loop {
            match self.head()? {
                Head::Newline => {
                    any = true;
                    self.next()?;
                }
                Head::Comment => {
                    if let TokenKind::Comment(text) = self.next()?.kind {
                        comments.push(text);
                    }
                }
                _ => return Ok((any, comments)),
            }
        }
    }

    /// `continued` tells whether a `\` newline came before the operator.
    fn operator_break(&mut self, continued: bool) -> Result<Break> {
        let (newline, comments) = self.linebreak()?;
        Ok(if newline {
            Break::Newline(comments)
        } else if continued || self.peek()?.continued {
            Break::Continuation
        } else {
            Break::None
        })
    }

    fn parse_and_or(&mut self) -> Result<AndOr> {
        let first = self.parse_pipeline()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.head()? {
                Head::Op(Op::AndIf) => AndOrOp::And,
                Head::Op(Op::OrIf) => AndOrOp::Or,
                _ => break,
            };
            let continued = self.next()?.continued;
            let brk = self.operator_break(continued)?;
            rest.push((op, brk, self.parse_pipeline()?));
        }
        Ok(AndOr { first, rest })
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline> {
        let bang = self.at_keyword("!")?;
        if bang {
            self.next()?;
        }
        let first = self.parse_command()?;
        let mut rest = Vec::new();
        loop {
            let stderr_too = match self.head()? {
                Head::Op(Op::Pipe) => false,
                Head::Op(Op::PipeAmp) => true,
                _ => break,
            };
            let continued = self.next()?.continued;
            let brk = self.operator_break(continued)?;
            rest.push((stderr_too, brk, self.parse_command()?));
        }
        Ok(Pipeline { bang, first, rest })
    }

    fn parse_command(&mut self) -> Result<Command> {
        let kind = match self.head()? {
            Head::Op(Op::LParen) => {
                let open = self.next()?;
                let body = self.parse_list(&[])?;
                self.expect_op(Op::RParen, &open, "(")?;
                CommandKind::Subshell(body)
            }
            Head::Keyword(word) => match word.as_str() {
                "{" => {
                    let open = self.next()?;
                    let body = self.parse_list(&["}"])?;
                    self.expect_keyword("}", &open, "{")?;
                    CommandKind::Brace(body)
                }
                "if" => self.parse_if()?,
                "while" | "until" => self.parse_loop(word == "until")?,
                "for" => self.parse_for()?,
                "case" => self.parse_case()?,
                "function" => return self.parse_function_keyword(),
                closer if CLOSERS.contains(&closer) => {
                    let token = self.next()?;
                    return Err(self.lexer.error(
                        token.line,
                        token.column,
                        format!("{closer:?} can only be used to close a block"),
                    ));
                }
                _ => return self.parse_simple(),
            },
            Head::Word | Head::IoNumber | Head::Op(Op::Redir(_)) => return self.parse_simple(),
            _ => {
                let token = self.next()?;
                return Err(self.unexpected(&token));
            }
        };
        let redirects = self.parse_redirects()?;
        Ok(Command { kind, redirects })
    }

    fn expect_op(&mut self, op: Op, open: &Token, opener: &str) -> Result<()> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Op(found) if found == op => Ok(()),
            TokenKind::Eof => Err(self.lexer.error(
                open.line,
                open.column,
                format!("reached EOF without matching {opener} with {}", op.as_str()),
            )),
            _ => Err(self.unexpected(&token)),
        }
    }

    fn expect_keyword(&mut self, keyword: &str, open: &Token, opener: &str) -> Result<()> {
        let token = self.next()?;
        match &token.kind {
            TokenKind::Word(word) if word.as_literal() == Some(keyword) => Ok(()),
            TokenKind::Eof => Err(self.lexer.error(
                open.line,
                open.column,
                format!("reached EOF without {keyword:?} to close {opener:?}"),
            )),
            _ => Err(self.lexer.error(
                token.line,
                token.column,
                format!("{opener:?} must be followed by {keyword:?}"),
            )),
        }
    }

    fn non_empty(&self, list: List, open: &Token, opener: &str) -> Result<List> {
        if list.stmts.iter().any(|s| s.and_or.is_some()) {
            Ok(list)
        } else {
            Err(self.lexer.error(
                open.line,
                open.column,
                format!("{opener:?} must be followed by a statement list"),
            ))
        }
    }

    fn take_word(&mut self) -> Result<Option<Word>> {
        if !matches!(self.head()?, Head::Word | Head::Keyword(_)) {
            return Ok(None);
        }
        match self.next()?.kind {
            TokenKind::Word(word) => Ok(Some(word)),
            _ => Ok(None),
        }
    }

    fn parse_simple(&mut self) -> Result<Command> {
        let mut items: Vec<SimpleItem> = Vec::new();
        loop {
            let continued = self.peek()?.continued;
            match self.head()? {
                Head::Word | Head::Keyword(_) => {
                    if let Some(word) = self.take_word()? {
                        items.push(SimpleItem {
                            kind: SimpleItemKind::Word(word),
                            continued,
                        });
                    }
                    if items.len() == 1 && matches!(self.head()?, Head::Op(Op::LParen)) {
                        return self.parse_function(items.remove(0));
                    }
                }
                Head::IoNumber | Head::Op(Op::Redir(_)) => {
                    let redirect = self.parse_redirect()?;
                    items.push(SimpleItem {
                        kind: SimpleItemKind::Redirect(redirect),
                        continued,
                    });
                }
                _ => break,
            }
        }
        if items.is_empty() {
            let token = self.next()?;
            return Err(self.unexpected(&token));
        }
        Ok(Command {
            kind: CommandKind::Simple(items),
            redirects: Vec::new(),
        })
    }

    fn parse_redirect(&mut self) -> Result<Redirect> {
        let mut fd = None;
        let mut token = self.next()?;
        if let TokenKind::IoNumber(number) = token.kind {
            fd = Some(number);
            token = self.next()?;
        }
        let TokenKind::Op(Op::Redir(op)) = token.kind else {
            return Err(self.unexpected(&token));
        };
        match self.take_word()? {
            Some(target) => Ok(Redirect {
                fd,
                op,
                target,
                heredoc: None,
            }),
            None => Err(self.lexer.error(
                token.line,
                token.column,
                format!("{} must be followed by a word", op.as_str()),
            )),
        }
    }

    fn parse_redirects(&mut self) -> Result<Vec<Redirect>> {
        let mut redirects = Vec::new();
        while matches!(self.head()?, Head::IoNumber | Head::Op(Op::Redir(_))) {
            redirects.push(self.parse_redirect()?);
        }
        Ok(redirects)
    }

    /// `name() body`, after the name has been read.
    fn parse_function(&mut self, name: SimpleItem) -> Result<Command> {
        let open = self.next()?;
        let name = match &name.kind {
            SimpleItemKind::Word(word) => word.as_literal().filter(|n| is_function_name(n)),
            SimpleItemKind::Redirect(_) => None,
        }
        .map(str::to_string)
        .ok_or_else(|| self.lexer.error(open.line, open.column, "invalid function name"))?;
        self.expect_op(Op::RParen, &open, "(")?;
        self.function_body(name, false, true, &open)
    }

    fn parse_function_keyword(&mut self) -> Result<Command> {
        let open = self.next()?;
        let name = self
            .take_word()?
            .and_then(|w| w.as_literal().filter(|n| is_function_name(n)).map(str::to_string))
            .ok_or_else(|| {
                self.lexer
                    .error(open.line, open.column, "\"function\" must be followed by a name")
            })?;
        let parens = matches!(self.head()?, Head::Op(Op::LParen));
        if parens {
            let paren = self.next()?;
            self.expect_op(Op::RParen, &paren, "(")?;
        }
        self.function_body(name, true, parens, &open)
    }

    fn function_body(
        &mut self,
        name: String,
        keyword: bool,
        parens: bool,
        open: &Token,
    ) -> Result<Command> {
        let (_, comments) = self.linebreak()?;
        let compound = match self.head()? {
            Head::Op(Op::LParen) => true,
            Head::Keyword(word) => {
                matches!(word.as_str(), "{" | "if" | "while" | "until" | "for" | "case")
            }
            _ => false,
        };
        if !compound {
            return Err(self.lexer.error(
                open.line,
                open.column,
                "a function body must be a compound command",
            ));
        }
        let mut body = self.parse_command()?;
        match &mut body.kind {
            CommandKind::Brace(list) | CommandKind::Subshell(list) => {
                prepend_comments(list, comments);
            }
            _ if !comments.is_empty() => {
                return Err(self.lexer.error(
                    open.line,
                    open.column,
                    "comments before a function body must be followed by { or (",
                ));
            }
            _ => {}
        }
        Ok(Command {
            kind: CommandKind::Function {
                name,
                keyword,
                parens,
                body: Box::new(body),
            },
            redirects: Vec::new(),
        })
    }

    fn parse_if(&mut self) -> Result<CommandKind> {
        let open = self.next()?;
        let mut branches = Vec::new();
        let mut otherwise = None;

        let cond = self.parse_list(&["then"])?;
        let cond = self.non_empty(cond, &open, "if")?;
        self.expect_keyword("then", &open, "if")?;
        let body = self.parse_list(&["elif", "else", "fi"])?;
        branches.push((cond, body));

        loop {
            let token = self.next()?;
            match &token.kind {
                TokenKind::Word(word) if word.as_literal() == Some("elif") => {
                    let cond = self.parse_list(&["then"])?;
                    let cond = self.non_empty(cond, &token, "elif")?;
                    self.expect_keyword("then", &token, "elif")?;
                    let body = self.parse_list(&["elif", "else", "fi"])?;
                    branches.push((cond, body));
                }
                TokenKind::Word(word) if word.as_literal() == Some("else") => {
                    otherwise = Some(self.parse_list(&["fi"])?);
                    self.expect_keyword("fi", &open, "if")?;
                    break;
                }
                TokenKind::Word(word) if word.as_literal() == Some("fi") => break,
                TokenKind::Eof => {
                    return Err(self.lexer.error(
                        open.line,
                        open.column,
                        "reached EOF without \"fi\" to close \"if\"",
                    ));
                }
                _ => return Err(self.unexpected(&token)),
            }
        }
        Ok(CommandKind::If { branches, otherwise })
    }

    fn parse_loop(&mut self, until: bool) -> Result<CommandKind> {
        let open = self.next()?;
        let opener = if until { "until" } else { "while" };
        let cond = self.parse_list(&["do"])?;
        let cond = self.non_empty(cond, &open, opener)?;
        self.expect_keyword("do", &open, opener)?;
        let body = self.parse_list(&["done"])?;
        self.expect_keyword("done", &open, "do")?;
        Ok(CommandKind::Loop { until, cond, body })
    }

    fn parse_for(&mut self) -> Result<CommandKind> {
        let open = self.next()?;
        let var = self
            .take_word()?
            .and_then(|w| w.as_literal().filter(|n| is_name(n)).map(str::to_string))
            .ok_or_else(|| {
                self.lexer
                    .error(open.line, open.column, "\"for\" must be followed by a literal")
            })?;

        let (mut multiline, mut comments) = self.linebreak()?;
        let mut words = None;
        if self.at_keyword("in")? {
            self.next()?;
            let mut list = Vec::new();
            while let Some(word) = self.take_word()? {
                list.push(word);
            }
            words = Some(list);
        }
        if matches!(self.head()?, Head::Op(Op::Semi)) {
            self.next()?;
        }
        let (newline, more) = self.linebreak()?;
        multiline |= newline;
        comments.extend(more);
        self.expect_keyword("do", &open, "for")?;
        let mut body = self.parse_list(&["done"])?;
        self.expect_keyword("done", &open, "do")?;
        prepend_comments(&mut body, comments);
        Ok(CommandKind::For {
            var,
            words,
            body,
            multiline,
        })
    }

    fn parse_case(&mut self) -> Result<CommandKind> {
        let open = self.next()?;
        let word = self.take_word()?.ok_or_else(|| {
            self.lexer
                .error(open.line, open.column, "\"case\" must be followed by a word")
        })?;
        let (mut multiline, mut comments) = self.linebreak()?;
        self.expect_keyword("in", &open, "case")?;

        let mut arms = Vec::new();
        loop {
            let (newline, more) = self.linebreak()?;
            multiline |= newline;
            comments.extend(more);
            match self.head()? {
                Head::Keyword(ref k) if k == "esac" => {
                    self.next()?;
                    break;
                }
                Head::Eof => {
                    return Err(self.lexer.error(
                        open.line,
                        open.column,
                        "reached EOF without \"esac\" to close \"case\"",
                    ));
                }
                Head::Op(Op::LParen) => {
                    self.next()?;
                }
                _ => {}
            }

            let mut patterns = Vec::new();
            loop {
                match self.take_word()? {
                    Some(pattern) => patterns.push(pattern),
                    None => {
                        let token = self.next()?;
                        return Err(self.unexpected(&token));
                    }
                }
                if matches!(self.head()?, Head::Op(Op::Pipe)) {
                    self.next()?;
                } else {
                    break;
                }
            }
            let paren = self.peek()?.clone();
            self.expect_op(Op::RParen, &paren, "case pattern")?;

            let body = self.parse_list(&["esac"])?;
            multiline |= body.multiline;
            arms.push(CaseArm {
                comments: std::mem::take(&mut comments),
                patterns,
                body,
            });

            match self.head()? {
                Head::Op(Op::DSemi) => {
                    self.next()?;
                }
                Head::Keyword(ref k) if k == "esac" => {}
                _ => {
                    let token = self.next()?;
                    return Err(self.unexpected(&token));
                }
            }
        }
        Ok(CommandKind::Case {
            word,
            arms,
            trailing: comments,
            multiline,
        })
    }
}

/// Put comment lines from a compound header at the top of its body.
fn prepend_comments(list: &mut List, comments: Vec<String>) {
    if comments.is_empty() {
        return;
    }
    let stmts = comments.into_iter().map(|comment| Stmt {
        comment: Some(comment),
        newline_before: true,
        ..Stmt::default()
    });
    list.stmts.splice(0..0, stmts);
    list.multiline = true;
}

fn is_function_name(name: &str) -> bool {
    !name.is_empty()
        && !CLOSERS.contains(&name)
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}
